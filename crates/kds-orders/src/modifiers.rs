//! Adding modifier lines to an existing order.
//!
//! Modifiers are zero-priced lines attached to a parent line (e.g. "no
//! onions" under a burger). They go through `stock_batch_invoice_add_items`,
//! separate from the status-change endpoint.

use std::collections::BTreeMap;

use kds_client::{business_code, CancellationToken, Method, RequestClient, RequestOptions};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::mutation::MutationResult;
use crate::normalizer::extract_error_message;

pub const ADD_ITEMS_ENDPOINT: &str = "stock_batch_invoice_add_items";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Modifier {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddModifiers {
    pub order_code: String,
    pub table_id: Option<String>,
    /// Line the modifiers hang off; empty attaches them to the order.
    pub parent_line_id: Option<String>,
    pub modifiers: Vec<Modifier>,
}

impl AddModifiers {
    /// Request body for `stock_batch_invoice_add_items`.
    pub fn body(&self) -> Value {
        let root = self.parent_line_id.clone().unwrap_or_default();
        let details: Vec<Value> = self
            .modifiers
            .iter()
            .enumerate()
            .map(|(i, m)| {
                json!({
                    "line_number": (i + 1).to_string(),
                    "item_code_365": m.code,
                    "item_name": m.name,
                    "line_quantity": "1",
                    "line_price_incl_vat": 0,
                    "line_total_grand": 0,
                    "is_modifier": true,
                    "is_subitem": false,
                    "exclude_print": false,
                    "root_line_id_365": root,
                })
            })
            .collect();

        let mut invoice = json!({
            "batch_invoice_number_365": self.order_code,
            "list_invoice_details": details,
        });
        if let Some(table) = self.table_id.as_deref().filter(|t| !t.is_empty()) {
            invoice["table_id"] = Value::String(table.to_string());
        }
        json!({ "batch_invoice": invoice })
    }
}

#[derive(Debug, Clone)]
pub struct ModifierService {
    client: RequestClient,
}

impl ModifierService {
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }

    /// Post the modifiers in one call. No order code or no modifiers is a
    /// skipped success.
    pub async fn add_modifiers(
        &self,
        req: &AddModifiers,
        cancel: Option<&CancellationToken>,
    ) -> MutationResult {
        if req.order_code.trim().is_empty() || req.modifiers.is_empty() {
            return MutationResult {
                ok: true,
                skipped: true,
                rows_sent: 0,
                attempts: 0,
                code: None,
                error: None,
            };
        }

        let mut opts = RequestOptions::default();
        if let Some(token) = cancel {
            opts = opts.cancel(token.clone());
        }
        let out = self
            .client
            .request_json(
                Method::Post,
                ADD_ITEMS_ENDPOINT,
                Some(&req.body()),
                &BTreeMap::new(),
                &opts,
            )
            .await;

        if out.ok {
            info!(order = %req.order_code, modifiers = req.modifiers.len(), "modifiers added");
        } else {
            warn!(order = %req.order_code, error = ?out.error, "modifiers rejected");
        }
        MutationResult {
            ok: out.ok,
            skipped: false,
            rows_sent: req.modifiers.len(),
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
    use std::sync::Arc;

    fn service(t: Arc<ScriptedTransport>) -> ModifierService {
        ModifierService::new(RequestClient::with_transport(
            "http://erp.test",
            t,
            Arc::new(StaticToken::new("t")),
        ))
    }

    fn request() -> AddModifiers {
        AddModifiers {
            order_code: "A1".into(),
            table_id: Some("12".into()),
            parent_line_id: Some("L1".into()),
            modifiers: vec![
                Modifier { code: "NO-ONION".into(), name: "No onion".into() },
                Modifier { code: "X-CHEESE".into(), name: "Extra cheese".into() },
            ],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn modifiers_post_as_zero_priced_lines_under_the_parent() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_json(200, json!({"response_code": "1"}));

        let res = service(t.clone()).add_modifiers(&request(), None).await;
        assert!(res.ok && !res.skipped);
        assert_eq!(res.rows_sent, 2);

        let reqs = t.requests();
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].url.ends_with("/stock_batch_invoice_add_items"));
        let body: Value = serde_json::from_str(reqs[0].body.as_deref().unwrap()).unwrap();
        let inv = &body["batch_invoice"];
        assert_eq!(inv["batch_invoice_number_365"], "A1");
        assert_eq!(inv["table_id"], "12");
        let lines = inv["list_invoice_details"].as_array().unwrap();
        assert_eq!(lines[1]["line_number"], "2");
        assert_eq!(lines[1]["item_code_365"], "X-CHEESE");
        assert_eq!(lines[1]["root_line_id_365"], "L1");
        assert_eq!(lines[1]["is_modifier"], true);
        assert_eq!(lines[1]["line_total_grand"], 0);
        assert_eq!(body["api_credentials"]["token"], "t");
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_to_add_is_skipped_without_a_call() {
        let t = Arc::new(ScriptedTransport::new());
        let svc = service(t.clone());

        let mut empty = request();
        empty.modifiers.clear();
        assert!(svc.add_modifiers(&empty, None).await.skipped);

        let mut no_code = request();
        no_code.order_code = " ".into();
        assert!(svc.add_modifiers(&no_code, None).await.skipped);
        assert!(t.requests().is_empty());
    }

    #[test]
    fn table_is_omitted_when_absent() {
        let mut req = request();
        req.table_id = None;
        req.parent_line_id = None;
        let body = req.body();
        assert!(body["batch_invoice"].get("table_id").is_none());
        assert_eq!(body["batch_invoice"]["list_invoice_details"][0]["root_line_id_365"], "");
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_carries_the_business_code() {
        let t = Arc::new(ScriptedTransport::new());
        for _ in 0..4 {
            t.push_json(200, json!({"response_code": "0", "response_msg": "Invoice closed"}));
        }
        let res = service(t).add_modifiers(&request(), None).await;
        assert!(!res.ok);
        assert_eq!(res.code.as_deref(), Some("0"));
        assert_eq!(res.error.as_deref(), Some("(0) Invoice closed"));
    }
}
