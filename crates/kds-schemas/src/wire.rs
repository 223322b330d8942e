use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::TargetStatus;

/// One unit of a status-change batch.
///
/// Internally the order is addressed by a single `order_code`; on the wire the
/// upstream expects it under both `batch_invoice_number_365` and
/// `batch_invoice_code_365`, so serialization duplicates it and
/// deserialization accepts either name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChangeRow {
    pub order_code: String,
    /// Empty = applies to the whole order.
    pub line_id: String,
    pub status: TargetStatus,
    pub department_code: String,
    pub time_to_complete: u32,
}

impl StatusChangeRow {
    /// Same row with line id and department cleared (whole-order scope).
    pub fn whole_order(&self) -> Self {
        Self {
            line_id: String::new(),
            department_code: String::new(),
            ..self.clone()
        }
    }

    pub fn is_whole_order(&self) -> bool {
        self.line_id.is_empty()
    }
}

#[derive(Serialize)]
struct WireRowOut<'a> {
    batch_invoice_number_365: &'a str,
    batch_invoice_code_365: &'a str,
    line_id_365: &'a str,
    status_code_365: &'a str,
    item_department_code_365: &'a str,
    time_to_complete: u32,
}

#[derive(Deserialize)]
struct WireRowIn {
    #[serde(default)]
    batch_invoice_number_365: Option<String>,
    #[serde(default)]
    batch_invoice_code_365: Option<String>,
    #[serde(default)]
    line_id_365: Option<String>,
    #[serde(default)]
    status_code_365: Option<String>,
    #[serde(default)]
    item_department_code_365: Option<String>,
    #[serde(default)]
    time_to_complete: Option<serde_json::Value>,
}

impl Serialize for StatusChangeRow {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        WireRowOut {
            batch_invoice_number_365: &self.order_code,
            batch_invoice_code_365: &self.order_code,
            line_id_365: &self.line_id,
            status_code_365: self.status.as_str(),
            item_department_code_365: &self.department_code,
            time_to_complete: self.time_to_complete,
        }
        .serialize(s)
    }
}

impl<'de> Deserialize<'de> for StatusChangeRow {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let w = WireRowIn::deserialize(d)?;
        let order_code = w
            .batch_invoice_number_365
            .filter(|s| !s.is_empty())
            .or(w.batch_invoice_code_365)
            .unwrap_or_default();
        // Upstream sends this as a number or a numeric string.
        let time_to_complete = match w.time_to_complete {
            Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0) as u32,
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        Ok(StatusChangeRow {
            order_code,
            line_id: w.line_id_365.unwrap_or_default(),
            status: TargetStatus::parse(&w.status_code_365.unwrap_or_default()),
            department_code: w.item_department_code_365.unwrap_or_default(),
            time_to_complete,
        })
    }
}
