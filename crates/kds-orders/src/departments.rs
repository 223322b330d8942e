//! Department lookup.
//!
//! `list_item_departments` behaves differently across upstream deployments, so
//! three call shapes are tried in order and the first business success wins:
//! GET with the token in the query, GET with the header only, POST with an
//! empty filter.

use std::collections::BTreeMap;

use kds_client::{is_success_payload, CancellationToken, Method, RequestClient, RequestOptions};
use serde_json::{json, Value};
use tracing::debug;

use crate::normalizer::extract_error_message;
use crate::reader::ALL_DEPARTMENTS;
use crate::FetchCancelled;

pub const DEPARTMENTS_ENDPOINT: &str = "list_item_departments";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Department {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartmentList {
    pub departments: Vec<Department>,
    pub ok: bool,
    pub error: Option<String>,
}

impl DepartmentList {
    /// Selector entries: `"All"` first, then department names.
    pub fn names_with_all(&self) -> Vec<String> {
        std::iter::once(ALL_DEPARTMENTS.to_string())
            .chain(self.departments.iter().map(|d| d.name.clone()))
            .collect()
    }

    pub fn code_for(&self, name: &str) -> Option<&str> {
        self.departments
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.code.as_str())
    }
}

pub async fn list_departments(
    client: &RequestClient,
    cancel: Option<&CancellationToken>,
) -> Result<DepartmentList, FetchCancelled> {
    let base = match cancel {
        Some(c) => RequestOptions::default().cancel(c.clone()),
        None => RequestOptions::default(),
    };
    let none = BTreeMap::new();

    let attempts = [
        (Method::Get, None, base.clone().attach_token_in_query(true)),
        (Method::Get, None, base.clone()),
        (Method::Post, Some(json!({"filter_define": {}})), base),
    ];

    let mut first_error: Option<String> = None;
    for (strategy, (method, body, opts)) in attempts.into_iter().enumerate() {
        let out = client
            .request_json(method, DEPARTMENTS_ENDPOINT, body.as_ref(), &none, &opts)
            .await;
        if out.cancelled {
            return Err(FetchCancelled);
        }
        if is_success_payload(&out.data) {
            debug!(strategy, "department lookup succeeded");
            return Ok(DepartmentList {
                departments: parse_departments(&out.data),
                ok: true,
                error: None,
            });
        }
        if first_error.is_none() {
            first_error = extract_error_message(&out.data);
        }
    }

    Ok(DepartmentList {
        departments: Vec::new(),
        ok: false,
        error: Some(first_error.unwrap_or_default()),
    })
}

fn parse_departments(payload: &Value) -> Vec<Department> {
    let list = ["list_item_departments", "departments", "list"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_array));
    let Some(list) = list else {
        return Vec::new();
    };
    list.iter()
        .map(|d| Department {
            name: pick(d, &["item_department_name", "department_name", "name"])
                .unwrap_or_else(|| "Unknown".to_string()),
            code: pick(d, &["item_department_code_365", "department_code", "code"])
                .unwrap_or_default(),
        })
        .collect()
}

fn pick(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match v.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kds_client::{ScriptedTransport, StaticToken};
    use std::sync::Arc;

    fn client(t: Arc<ScriptedTransport>) -> RequestClient {
        RequestClient::with_transport("http://erp.test", t, Arc::new(StaticToken::new("tok")))
            .with_policy(kds_client::RetryPolicy {
                retries: 0,
                ..Default::default()
            })
    }

    #[tokio::test]
    async fn falls_back_to_post_when_gets_fail() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_json(200, json!({"response_code": "401", "response_msg": "Token required"}));
        t.push_json(500, json!({}));
        t.push_json(
            200,
            json!({"response_code": "1", "list_item_departments": [
                {"item_department_name": "Grill", "item_department_code_365": "GRL"},
                {"department_name": "Bar", "department_code": "BAR"}
            ]}),
        );

        let list = list_departments(&client(t.clone()), None).await.unwrap();
        assert!(list.ok);
        assert_eq!(list.names_with_all(), vec!["All", "Grill", "Bar"]);
        assert_eq!(list.code_for("Bar"), Some("BAR"));

        let reqs = t.requests();
        assert_eq!(reqs.len(), 3);
        assert!(reqs[0].url.contains("token=tok"));
        assert!(!reqs[1].url.contains("token="));
        assert_eq!(reqs[2].method, Method::Post);
    }

    #[tokio::test]
    async fn all_strategies_failing_reports_first_message() {
        let t = Arc::new(ScriptedTransport::new());
        t.push_json(200, json!({"response_code": "401", "response_msg": "Token required"}));
        t.push_json(200, json!({"response_code": "500"}));
        t.push_json(200, json!({"response_code": "500"}));

        let list = list_departments(&client(t), None).await.unwrap();
        assert!(!list.ok);
        assert!(list.departments.is_empty());
        assert_eq!(list.error.as_deref(), Some("Token required"));
        assert_eq!(list.names_with_all(), vec!["All"]);
    }
}
