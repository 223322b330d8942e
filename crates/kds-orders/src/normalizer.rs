//! Upstream payload normalization.
//!
//! The upstream has renamed its list/total/order fields several times; every
//! reader here accepts all known spellings and never fails. Missing data
//! degrades to empty lists, zero counts, and display defaults.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use kds_schemas::{derive_ui_status, ItemState, Order, OrderLine};
use serde_json::Value;

/// List field names, in priority order.
pub const LIST_ALIASES: &[&str] = &[
    "list_stock_batch_invoice",
    "list_invoices",
    "invoices",
    "list",
];

/// Total-count field names, in priority order.
pub const TOTAL_ALIASES: &[&str] = &[
    "total_count_list_stock_batch_invoice",
    "total_count_list_invoices",
    "total",
];

const CODE_KEYS: &[&str] = &[
    "batch_invoice_number_365",
    "batch_invoice_code_365",
    "invoice_365_code",
];
const LINE_LIST_KEYS: &[&str] = &["list_invoice_details", "list_invoice_lines", "items"];
const LINE_STATUS_KEYS: &[&str] = &["status_code_365", "status_code", "line_status_code_365"];
const CREATED_KEYS: &[&str] = &["invoice_date_utc0", "created_at"];

pub const DEFAULT_DESTINATION: &str = "Counter";
pub const DEFAULT_DEPARTMENT: &str = "General";
pub const DEFAULT_ETA_MINUTES: u32 = 10;

pub fn read_orders_list(payload: &Value) -> Vec<Value> {
    LIST_ALIASES
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

/// First alias carrying a positive count; numeric strings are accepted.
pub fn read_total_count(payload: &Value) -> u64 {
    TOTAL_ALIASES
        .iter()
        .filter_map(|k| payload.get(*k))
        .filter_map(as_count)
        .find(|n| *n > 0)
        .unwrap_or(0)
}

/// Best-effort message from whichever message field the upstream used.
pub fn extract_error_message(payload: &Value) -> Option<String> {
    kds_client::response_message(payload).or_else(|| {
        ["error_message", "message", "error"]
            .iter()
            .find_map(|k| text(payload, k))
    })
}

pub fn normalize_orders(list: &[Value], page: u32) -> Vec<Order> {
    list.iter()
        .enumerate()
        .map(|(idx, raw)| normalize_order(raw, page, idx))
        .collect()
}

pub fn normalize_order(raw: &Value, page: u32, idx: usize) -> Order {
    let empty = Value::Null;
    let header = raw.get("invoice_header").unwrap_or(&empty);
    let table = raw
        .get("table")
        .or_else(|| header.get("table"))
        .unwrap_or(&empty);

    let business_code = first_text(raw, CODE_KEYS)
        .or_else(|| first_text(header, CODE_KEYS))
        .or_else(|| text(raw, "shopping_cart_code"))
        .unwrap_or_default();
    let id = if business_code.is_empty() {
        format!("row-{}-{}", page, idx + 1)
    } else {
        business_code.clone()
    };

    let lines: Vec<OrderLine> = LINE_LIST_KEYS
        .iter()
        .find_map(|k| raw.get(*k).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(i, it)| normalize_line(it, &id, i))
                .collect()
        })
        .unwrap_or_default();

    let header_status = text(raw, "status_code_365")
        .or_else(|| text(header, "status_code_365"))
        .unwrap_or_default()
        .to_ascii_uppercase();
    let system_status = text(header, "status_code_365")
        .or_else(|| text(raw, "status_code_365"))
        .unwrap_or_default()
        .to_ascii_uppercase();
    let cooking = header_status == "INPROC" || lines.iter().any(OrderLine::is_inproc);

    let table_id = text(raw, "table_id")
        .or_else(|| text(header, "table_id"))
        .or_else(|| text(table, "table_id"))
        .or_else(|| text(table, "id"));

    let destination = text(header, "table_name")
        .or_else(|| text(header, "table_number"))
        .or_else(|| text(raw, "agent_code_365"))
        .or_else(|| text(raw, "station_code_365"))
        .unwrap_or_else(|| DEFAULT_DESTINATION.to_string());

    let created_at = CREATED_KEYS
        .iter()
        .flat_map(|k| [header.get(*k), raw.get(*k)])
        .flatten()
        .find_map(parse_timestamp);

    Order {
        status: derive_ui_status(&lines, &header_status),
        id,
        business_code,
        destination,
        table_id,
        order_type: text(header, "invoice_type")
            .or_else(|| text(raw, "invoice_type"))
            .unwrap_or_else(|| "I".to_string()),
        created_at,
        eta_minutes: DEFAULT_ETA_MINUTES,
        system_status,
        cooking,
        cooking_started_at: None,
        lines,
    }
}

/// Upstream line status, uppercased; empty when absent.
pub fn raw_line_status(line: &Value) -> String {
    first_text(line, LINE_STATUS_KEYS)
        .unwrap_or_default()
        .to_ascii_uppercase()
}

fn normalize_line(it: &Value, order_id: &str, i: usize) -> OrderLine {
    let line_id = text(it, "line_id_365").unwrap_or_default();
    let item_code = text(it, "item_code_365")
        .or_else(|| text(it, "item_code"))
        .unwrap_or_default();
    let department_code = text(it, "item_department_code_365").unwrap_or_default();

    let id = if !line_id.is_empty() {
        line_id.clone()
    } else if let Some(code) = text(it, "item_code_365") {
        code
    } else {
        format!("{}-line-{}", order_id, i + 1)
    };

    let quantity = ["line_quantity", "qty"]
        .iter()
        .filter_map(|k| it.get(*k))
        .filter_map(as_f64)
        .find(|q| *q != 0.0)
        .unwrap_or(1.0);

    OrderLine {
        id,
        name: text(it, "item_name")
            .or_else(|| text(it, "item_code_365"))
            .or_else(|| text(it, "name"))
            .unwrap_or_else(|| "Item".to_string()),
        department: if department_code.is_empty() {
            text(it, "dept").unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string())
        } else {
            department_code.clone()
        },
        line_id,
        item_code,
        department_code,
        quantity,
        raw_status: raw_line_status(it),
        item_state: ItemState::None,
    }
}

/// Per department, per item name, summed quantity.
pub fn totals_by_department(orders: &[Order]) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut acc: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for line in orders.iter().flat_map(|o| o.lines.iter()) {
        let dept = if line.department.is_empty() {
            DEFAULT_DEPARTMENT
        } else {
            line.department.as_str()
        };
        *acc.entry(dept.to_string())
            .or_default()
            .entry(line.name.clone())
            .or_insert(0.0) += line.quantity;
    }
    acc
}

// ---------------------------------------------------------------------------
// field helpers
// ---------------------------------------------------------------------------

/// Non-empty string form of a scalar field.
fn text(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| text(v, k))
}

fn as_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC), or epoch milliseconds.
fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kds_schemas::UiStatus;
    use serde_json::json;

    #[test]
    fn list_and_total_accept_every_alias() {
        assert_eq!(read_orders_list(&json!({"invoices": [{"a": 1}]})).len(), 1);
        assert_eq!(read_orders_list(&json!({"list": [{}, {}]})).len(), 2);
        assert!(read_orders_list(&json!({"list": "nope"})).is_empty());
        assert!(read_orders_list(&json!(null)).is_empty());

        assert_eq!(read_total_count(&json!({"total_count_list_invoices": "17"})), 17);
        assert_eq!(
            read_total_count(&json!({"total_count_list_stock_batch_invoice": 0, "total": 4})),
            4
        );
        assert_eq!(read_total_count(&json!({"total": "abc"})), 0);
    }

    #[test]
    fn error_message_falls_through_known_fields() {
        assert_eq!(
            extract_error_message(&json!({"api_response": {"response_msg": "Denied"}})).as_deref(),
            Some("Denied")
        );
        assert_eq!(
            extract_error_message(&json!({"message": "boom"})).as_deref(),
            Some("boom")
        );
        assert_eq!(extract_error_message(&json!({})), None);
    }

    #[test]
    fn order_fields_resolve_through_header_aliases() {
        let raw = json!({
            "invoice_header": {
                "batch_invoice_code_365": "A1",
                "table_name": "T4",
                "status_code_365": "inproc",
                "invoice_date_utc0": "2024-03-01 18:30:00"
            },
            "list_invoice_details": [
                {"line_id_365": "7", "item_name": "Burger", "item_department_code_365": "GRL",
                 "line_quantity": "2", "status_code_365": "inproc"},
                {"item_code_365": "COLA", "status_code": "new"}
            ]
        });
        let o = normalize_order(&raw, 1, 0);

        assert_eq!(o.id, "A1");
        assert_eq!(o.code(), "A1");
        assert_eq!(o.destination, "T4");
        assert_eq!(o.system_status, "INPROC");
        assert_eq!(o.status, UiStatus::Active);
        assert!(o.cooking);
        assert_eq!(o.eta_minutes, 10);
        assert_eq!(
            o.created_at.map(|d| d.to_rfc3339()),
            Some("2024-03-01T18:30:00+00:00".to_string())
        );

        assert_eq!(o.lines[0].id, "7");
        assert_eq!(o.lines[0].quantity, 2.0);
        assert_eq!(o.lines[0].department, "GRL");
        assert_eq!(o.lines[0].raw_status, "INPROC");
        assert_eq!(o.lines[1].id, "COLA");
        assert_eq!(o.lines[1].line_id, "");
        assert_eq!(o.lines[1].name, "COLA");
        assert_eq!(o.lines[1].department, "General");
        assert_eq!(o.lines[1].quantity, 1.0);
        assert_eq!(o.lines[1].raw_status, "NEW");
    }

    #[test]
    fn missing_code_gets_synthetic_id_and_defaults() {
        let o = normalize_order(&json!({"items": [{}]}), 3, 4);
        assert_eq!(o.id, "row-3-5");
        assert_eq!(o.business_code, "");
        assert_eq!(o.destination, "Counter");
        assert_eq!(o.lines[0].id, "row-3-5-line-1");
        assert_eq!(o.lines[0].name, "Item");
        assert_eq!(o.status, UiStatus::Pending);
        assert!(!o.cooking);
    }

    #[test]
    fn all_approved_class_lines_mean_completed() {
        let o = normalize_order(
            &json!({
                "batch_invoice_number_365": "Z9",
                "list_invoice_lines": [{"status_code_365": "DONE"}, {"status_code_365": "approved"}]
            }),
            1,
            0,
        );
        assert_eq!(o.status, UiStatus::Completed);
    }

    #[test]
    fn totals_sum_per_department_and_item() {
        let list = vec![
            json!({"batch_invoice_number_365": "A", "items": [
                {"item_name": "Burger", "item_department_code_365": "Grill", "qty": 2},
                {"item_name": "Cola", "item_department_code_365": "Bar"}
            ]}),
            json!({"batch_invoice_number_365": "B", "items": [
                {"item_name": "Burger", "item_department_code_365": "Grill", "qty": 1}
            ]}),
        ];
        let totals = totals_by_department(&normalize_orders(&list, 1));
        assert_eq!(totals["Grill"]["Burger"], 3.0);
        assert_eq!(totals["Bar"]["Cola"], 1.0);
    }
}
