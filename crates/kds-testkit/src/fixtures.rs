//! Order and payload builders shared by scenario tests.

use kds_schemas::{derive_ui_status, ItemState, Order, OrderLine};
use serde_json::{json, Value};

/// A line in `department` with upstream status `raw_status`. The department
/// name doubles as its code.
pub fn line(line_id: &str, department: &str, raw_status: &str) -> OrderLine {
    OrderLine {
        id: line_id.to_string(),
        line_id: line_id.to_string(),
        item_code: format!("ITEM-{line_id}"),
        name: format!("Dish {line_id}"),
        department: department.to_string(),
        department_code: department.to_string(),
        quantity: 1.0,
        raw_status: raw_status.to_string(),
        item_state: ItemState::None,
    }
}

/// An order as the normalizer would produce it from upstream data.
pub fn order(code: &str, header_status: &str, lines: Vec<OrderLine>) -> Order {
    let header = header_status.to_ascii_uppercase();
    Order {
        id: code.to_string(),
        business_code: code.to_string(),
        destination: "Table 4".to_string(),
        table_id: Some("4".to_string()),
        order_type: "I".to_string(),
        created_at: None,
        eta_minutes: 10,
        status: derive_ui_status(&lines, &header),
        cooking: header == "INPROC" || lines.iter().any(OrderLine::is_inproc),
        system_status: header,
        cooking_started_at: None,
        lines,
    }
}

/// Same order with every line checked off.
pub fn all_checked(mut order: Order) -> Order {
    for l in &mut order.lines {
        l.item_state = ItemState::Checked;
    }
    order
}

/// Upstream JSON for one order; `lines` is `(line_id, department, status)`.
pub fn upstream_order(code: &str, header_status: &str, lines: &[(&str, &str, &str)]) -> Value {
    let details: Vec<Value> = lines
        .iter()
        .map(|(id, dept, status)| {
            json!({
                "line_id_365": id,
                "item_code_365": format!("ITEM-{id}"),
                "item_name": format!("Dish {id}"),
                "item_department_code_365": dept,
                "line_quantity": 1,
                "status_code_365": status
            })
        })
        .collect();
    json!({
        "batch_invoice_number_365": code,
        "invoice_header": {
            "status_code_365": header_status,
            "table_name": "Table 4"
        },
        "list_invoice_details": details
    })
}

pub fn list_payload(orders: Vec<Value>, total: u64) -> Value {
    json!({
        "response_code": "1",
        "list_stock_batch_invoice": orders,
        "total_count_list_stock_batch_invoice": total
    })
}

pub fn ok_payload() -> Value {
    json!({ "response_code": "1" })
}

pub fn error_payload(code: &str, message: &str) -> Value {
    json!({ "api_response": { "response_code": code, "response_msg": message } })
}
