//! Status mutation service.
//!
//! Turns (order, target status) into status-change rows, shapes them the way
//! the upstream honors them, and submits one batch.
//!
//! Shaping:
//! - every row targets INPROC: sent unmodified
//! - otherwise NEW / INPROC rows are sent twice, line-scoped then
//!   whole-order; APPROVED / REJECTED rows are sent once, whole-order; any
//!   other code is sent unmodified

use std::collections::BTreeMap;
use std::fmt;

use kds_client::{business_code, Method, RequestClient, RequestOptions};
use kds_schemas::{Order, StatusChangeRow, TargetStatus};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::normalizer::extract_error_message;

pub const CHANGE_STATUS_ENDPOINT: &str = "list_stock_batch_invoice_change_status";

/// One row per line; a line-less order gets a single whole-order row.
pub fn build_rows(order: &Order, target: &TargetStatus) -> Vec<StatusChangeRow> {
    let code = order.code().to_string();
    if order.lines.is_empty() {
        return vec![StatusChangeRow {
            order_code: code,
            line_id: String::new(),
            status: target.clone(),
            department_code: String::new(),
            time_to_complete: 0,
        }];
    }
    order
        .lines
        .iter()
        .map(|l| StatusChangeRow {
            order_code: code.clone(),
            line_id: l.line_id.clone(),
            status: target.clone(),
            department_code: l.department_code.clone(),
            time_to_complete: 0,
        })
        .collect()
}

pub fn shape_batch(rows: &[StatusChangeRow]) -> Vec<StatusChangeRow> {
    if rows.iter().all(|r| r.status == TargetStatus::Inproc) {
        return rows.to_vec();
    }
    let mut out = Vec::with_capacity(rows.len() * 2);
    for r in rows {
        match r.status {
            TargetStatus::New | TargetStatus::Inproc => {
                out.push(r.clone());
                out.push(r.whole_order());
            }
            TargetStatus::Approved | TargetStatus::Rejected => out.push(r.whole_order()),
            TargetStatus::Other(_) => out.push(r.clone()),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationResult {
    pub ok: bool,
    /// Nothing to send.
    pub skipped: bool,
    pub rows_sent: usize,
    pub attempts: u32,
    /// Upstream business code when the batch failed.
    pub code: Option<String>,
    pub error: Option<String>,
}

impl MutationResult {
    pub fn into_result(self) -> Result<Self, MutationError> {
        if self.ok {
            return Ok(self);
        }
        Err(MutationError {
            code: self.code,
            message: self.error.unwrap_or_else(|| "Status update failed".to_string()),
        })
    }
}

/// A status batch the upstream did not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationError {
    pub code: Option<String>,
    pub message: String,
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status change rejected: {}", self.message)
    }
}

impl std::error::Error for MutationError {}

#[derive(Debug, Clone)]
pub struct StatusMutationService {
    client: RequestClient,
}

impl StatusMutationService {
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }

    /// Rows for moving `order` to `target` (unshaped).
    pub fn apply_status(&self, order: &Order, target: &TargetStatus) -> Vec<StatusChangeRow> {
        build_rows(order, target)
    }

    /// Shape and submit as one batch. The batch is atomic from the caller's
    /// side: no per-row outcome is tracked.
    pub async fn submit(&self, rows: &[StatusChangeRow]) -> MutationResult {
        if rows.is_empty() {
            return MutationResult {
                ok: true,
                skipped: true,
                rows_sent: 0,
                attempts: 0,
                code: None,
                error: None,
            };
        }

        let batch = shape_batch(rows);
        let body = json!({ "list_stock_batch_invoice": batch });
        let out = self
            .client
            .request_json(
                Method::Post,
                CHANGE_STATUS_ENDPOINT,
                Some(&body),
                &BTreeMap::new(),
                &RequestOptions::default(),
            )
            .await;

        let (order_code, status) = rows
            .first()
            .map(|r| (r.order_code.as_str(), r.status.as_str()))
            .unwrap_or(("", ""));
        if out.ok {
            info!(order = order_code, rows = batch.len(), status, "status batch accepted");
        } else {
            warn!(order = order_code, rows = batch.len(), error = ?out.error, "status batch rejected");
        }

        MutationResult {
            ok: out.ok,
            skipped: false,
            rows_sent: batch.len(),
            attempts: out.attempts,
            code: if out.ok { None } else { business_code(&out.data) },
            error: if out.ok {
                None
            } else {
                out.error.or_else(|| extract_error_message(&out.data))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kds_client::{ScriptedTransport, StaticToken};
    use kds_schemas::{ItemState, OrderLine, UiStatus};
    use serde_json::Value;
    use std::sync::Arc;

    fn line(id: &str, dept: &str) -> OrderLine {
        OrderLine {
            id: id.into(),
            line_id: id.into(),
            item_code: format!("ITEM-{id}"),
            name: "Dish".into(),
            department: dept.into(),
            department_code: dept.into(),
            quantity: 1.0,
            raw_status: "NEW".into(),
            item_state: ItemState::None,
        }
    }

    fn order(lines: Vec<OrderLine>) -> Order {
        Order {
            id: "A1".into(),
            business_code: "A1".into(),
            destination: "T1".into(),
            table_id: None,
            order_type: "I".into(),
            created_at: None,
            eta_minutes: 10,
            status: UiStatus::Pending,
            system_status: "NEW".into(),
            cooking: false,
            cooking_started_at: None,
            lines,
        }
    }

    #[test]
    fn rows_carry_line_and_department_with_zero_time() {
        let rows = build_rows(&order(vec![line("1", "GRL"), line("2", "BAR")]), &TargetStatus::Inproc);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].line_id, "2");
        assert_eq!(rows[1].department_code, "BAR");
        assert!(rows.iter().all(|r| r.order_code == "A1" && r.time_to_complete == 0));
    }

    #[test]
    fn line_less_order_gets_one_whole_order_row() {
        let rows = build_rows(&order(vec![]), &TargetStatus::Approved);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_whole_order());
    }

    #[test]
    fn uniform_inproc_batch_is_sent_unmodified() {
        let rows = build_rows(&order(vec![line("1", "GRL"), line("2", "BAR"), line("3", "GRL")]), &TargetStatus::Inproc);
        assert_eq!(shape_batch(&rows), rows);
    }

    #[test]
    fn new_row_is_sent_line_scoped_then_whole_order() {
        let rows = build_rows(&order(vec![line("1", "GRL")]), &TargetStatus::New);
        let shaped = shape_batch(&rows);
        assert_eq!(shaped.len(), 2);
        assert_eq!(shaped[0], rows[0]);
        assert_eq!(shaped[1].line_id, "");
        assert_eq!(shaped[1].department_code, "");
        assert_eq!(shaped[1].status, TargetStatus::New);
    }

    #[test]
    fn mixed_batch_doubles_inproc_and_flattens_approved() {
        let mut rows = build_rows(&order(vec![line("1", "GRL")]), &TargetStatus::Inproc);
        rows.extend(build_rows(&order(vec![line("2", "BAR")]), &TargetStatus::Approved));
        rows.extend(build_rows(&order(vec![line("3", "BAR")]), &TargetStatus::parse("HOLD")));
        let shaped = shape_batch(&rows);

        assert_eq!(shaped.len(), 4);
        assert_eq!(shaped[0].line_id, "1");
        assert!(shaped[1].is_whole_order());
        assert!(shaped[2].is_whole_order());
        assert_eq!(shaped[2].status, TargetStatus::Approved);
        assert_eq!(shaped[3].line_id, "3");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_is_skipped_without_a_call() {
        let t = Arc::new(ScriptedTransport::new());
        let svc = StatusMutationService::new(RequestClient::with_transport(
            "http://erp.test",
            t.clone(),
            Arc::new(StaticToken::none()),
        ));
        let res = svc.submit(&[]).await;
        assert!(res.ok && res.skipped);
        assert!(t.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_posts_one_batch_with_both_code_names() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_json(200, serde_json::json!({"response_code": "1"}));
        let svc = StatusMutationService::new(RequestClient::with_transport(
            "http://erp.test",
            t.clone(),
            Arc::new(StaticToken::new("t")),
        ));
        let o = order(vec![line("1", "GRL")]);
        let res = svc.submit(&svc.apply_status(&o, &TargetStatus::New)).await;

        assert!(res.ok);
        assert_eq!(res.rows_sent, 2);
        let reqs = t.requests();
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].url.ends_with("/list_stock_batch_invoice_change_status"));
        let body: Value = serde_json::from_str(reqs[0].body.as_deref().unwrap()).unwrap();
        let sent = body["list_stock_batch_invoice"].as_array().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["batch_invoice_number_365"], "A1");
        assert_eq!(sent[0]["batch_invoice_code_365"], "A1");
        assert_eq!(sent[0]["line_id_365"], "1");
        assert_eq!(sent[1]["line_id_365"], "");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_batch_reports_code_and_message() {
        let t = Arc::new(ScriptedTransport::new());
        for _ in 0..4 {
            t.push_json(200, serde_json::json!({"response_code": "404", "response_msg": "Invoice not found"}));
        }
        let svc = StatusMutationService::new(RequestClient::with_transport(
            "http://erp.test",
            t,
            Arc::new(StaticToken::none()),
        ));
        let res = svc
            .submit(&build_rows(&order(vec![]), &TargetStatus::Approved))
            .await;
        assert!(!res.ok);
        assert_eq!(res.attempts, 4);
        assert_eq!(res.code.as_deref(), Some("404"));

        let err = res.into_result().unwrap_err();
        assert_eq!(err.message, "(404) Invoice not found");
    }
}
