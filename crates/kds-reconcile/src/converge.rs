use std::time::Duration;

use kds_orders::{OrderReader, StatusMutationService};
use kds_schemas::{StatusChangeRow, TargetStatus};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Convergence {
    /// The order's header status equals the target after `rounds` submits.
    Converged { rounds: u32 },
    /// Still different after `rounds` submits; `last_status` is the last
    /// header status read (`None` if the order could not be read).
    Diverged {
        rounds: u32,
        last_status: Option<String>,
    },
    /// The row carries no status code; nothing was sent.
    MissingStatus,
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Convergence::Converged { .. })
    }
}

/// Submit `row`, wait `pause`, re-read, compare; up to `max_rounds` times.
pub async fn converge_status(
    mutations: &StatusMutationService,
    reader: &OrderReader,
    row: &StatusChangeRow,
    max_rounds: u32,
    pause: Duration,
) -> Convergence {
    if matches!(&row.status, TargetStatus::Other(s) if s.is_empty()) {
        return Convergence::MissingStatus;
    }

    let mut last_status = None;
    for round in 1..=max_rounds {
        let res = mutations.submit(std::slice::from_ref(row)).await;
        if !res.ok {
            warn!(order = %row.order_code, round, error = ?res.error, "converge: submit rejected");
        }
        tokio::time::sleep(pause).await;

        let current = match reader.fetch_order_by_code(&row.order_code, None).await {
            Ok(Some(order)) => Some(order.system_status),
            _ => None,
        };
        if current.as_deref() == Some(row.status.as_str()) {
            debug!(order = %row.order_code, round, "converge: status settled");
            return Convergence::Converged { rounds: round };
        }
        last_status = current;
    }

    Convergence::Diverged {
        rounds: max_rounds,
        last_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kds_client::{RequestClient, RetryPolicy, ScriptedTransport, StaticToken};
    use serde_json::json;
    use std::sync::Arc;

    fn services(t: Arc<ScriptedTransport>) -> (StatusMutationService, OrderReader) {
        let client = RequestClient::with_transport("http://erp.test", t, Arc::new(StaticToken::none()))
            .with_policy(RetryPolicy {
                retries: 0,
                ..RetryPolicy::default()
            });
        (StatusMutationService::new(client.clone()), OrderReader::new(client))
    }

    fn row(status: TargetStatus) -> StatusChangeRow {
        StatusChangeRow {
            order_code: "A1".into(),
            line_id: String::new(),
            status,
            department_code: String::new(),
            time_to_complete: 0,
        }
    }

    fn order_with_status(s: &str) -> serde_json::Value {
        json!({"response_code": "1", "list_stock_batch_invoice": [{
            "batch_invoice_number_365": "A1",
            "invoice_header": {"status_code_365": s}
        }]})
    }

    #[tokio::test(start_paused = true)]
    async fn settles_on_second_round() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_json(200, json!({"response_code": "1"}));
        t.push_json(200, order_with_status("NEW"));
        t.push_json(200, json!({"response_code": "1"}));
        t.push_json(200, order_with_status("approved"));

        let (m, r) = services(t.clone());
        let out = converge_status(&m, &r, &row(TargetStatus::Approved), 3, Duration::from_secs(1)).await;
        assert_eq!(out, Convergence::Converged { rounds: 2 });
        assert_eq!(t.requests().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_rounds() {
        let t = Arc::new(ScriptedTransport::new());
        for _ in 0..2 {
            t.push_json(200, json!({"response_code": "1"}));
            t.push_json(200, order_with_status("INPROC"));
        }
        let (m, r) = services(t);
        let out = converge_status(&m, &r, &row(TargetStatus::New), 2, Duration::from_millis(10)).await;
        assert_eq!(
            out,
            Convergence::Diverged {
                rounds: 2,
                last_status: Some("INPROC".into())
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blank_status_sends_nothing() {
        let t = Arc::new(ScriptedTransport::new());
        let (m, r) = services(t.clone());
        let out = converge_status(&m, &r, &row(TargetStatus::parse("")), 3, Duration::ZERO).await;
        assert_eq!(out, Convergence::MissingStatus);
        assert!(t.requests().is_empty());
    }
}
