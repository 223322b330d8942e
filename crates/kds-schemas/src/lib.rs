//! kds-schemas
//!
//! Shared domain model for the kitchen-display sync engine: orders as the
//! dashboard sees them, the statuses the upstream ERP understands, and the
//! flattened status-change row that goes over the wire.
//!
//! Pure data. No IO.

mod wire;

pub use wire::StatusChangeRow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Raw line/header codes that count as "finished" upstream.
pub const APPROVED_CLASS: &[&str] = &["APPROVED", "DONE", "COMPLETED"];

// ---------------------------------------------------------------------------
// TargetStatus
// ---------------------------------------------------------------------------

/// Status code sent upstream in a status-change request.
///
/// The upstream code space is open-ended; anything outside the four codes the
/// dashboard drives is preserved verbatim as [`TargetStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetStatus {
    New,
    Inproc,
    Approved,
    Rejected,
    Other(String),
}

impl TargetStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TargetStatus::New => "NEW",
            TargetStatus::Inproc => "INPROC",
            TargetStatus::Approved => "APPROVED",
            TargetStatus::Rejected => "REJECTED",
            TargetStatus::Other(s) => s.as_str(),
        }
    }

    /// Case-insensitive. Never fails: unknown codes become `Other` (uppercased).
    pub fn parse(s: &str) -> Self {
        let up = s.trim().to_ascii_uppercase();
        match up.as_str() {
            "NEW" => TargetStatus::New,
            "INPROC" => TargetStatus::Inproc,
            "APPROVED" => TargetStatus::Approved,
            "REJECTED" => TargetStatus::Rejected,
            _ => TargetStatus::Other(up),
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TargetStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TargetStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(TargetStatus::parse(&raw))
    }
}

// ---------------------------------------------------------------------------
// UiStatus / ItemState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiStatus {
    Pending,
    Active,
    Completed,
}

/// Per-line mark set by kitchen staff. Independent of the upstream line status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    None,
    Checked,
    Cancelled,
}

impl ItemState {
    /// `none -> checked -> cancelled -> none`.
    pub fn next(self) -> Self {
        match self {
            ItemState::None => ItemState::Checked,
            ItemState::Checked => ItemState::Cancelled,
            ItemState::Cancelled => ItemState::None,
        }
    }
}

// ---------------------------------------------------------------------------
// OrderLine / Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Stable display id (line id, item code, or a synthetic fallback).
    pub id: String,
    /// Upstream line id. Empty means "whole order".
    pub line_id: String,
    pub item_code: String,
    pub name: String,
    /// Display department name.
    pub department: String,
    /// Upstream department code; may be empty.
    pub department_code: String,
    pub quantity: f64,
    /// Upstream line status, uppercased.
    pub raw_status: String,
    pub item_state: ItemState,
}

impl OrderLine {
    pub fn is_inproc(&self) -> bool {
        self.raw_status.eq_ignore_ascii_case("INPROC")
    }

    pub fn is_approved_class(&self) -> bool {
        let up = self.raw_status.to_ascii_uppercase();
        APPROVED_CLASS.contains(&up.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Business code when known, otherwise a synthetic `row-<page>-<n>` id.
    pub id: String,
    /// Upstream business code (may be empty when the upstream omitted it).
    pub business_code: String,
    pub destination: String,
    pub table_id: Option<String>,
    pub order_type: String,
    pub created_at: Option<DateTime<Utc>>,
    pub eta_minutes: u32,
    pub status: UiStatus,
    /// Last known upstream header status, uppercased.
    pub system_status: String,
    pub cooking: bool,
    pub cooking_started_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Code used to address the order upstream.
    pub fn code(&self) -> &str {
        if self.business_code.is_empty() {
            &self.id
        } else {
            &self.business_code
        }
    }

    /// Every line marked `checked` (vacuously true for an order with no lines).
    pub fn all_lines_checked(&self) -> bool {
        self.lines.iter().all(|l| l.item_state == ItemState::Checked)
    }

    pub fn line_mut(&mut self, line_id: &str) -> Option<&mut OrderLine> {
        self.lines.iter_mut().find(|l| l.id == line_id)
    }
}

/// UI status as a pure function of upstream line statuses and header status.
pub fn derive_ui_status(lines: &[OrderLine], system_status: &str) -> UiStatus {
    if !lines.is_empty() && lines.iter().all(OrderLine::is_approved_class) {
        return UiStatus::Completed;
    }
    if system_status.eq_ignore_ascii_case("INPROC") || lines.iter().any(OrderLine::is_inproc) {
        return UiStatus::Active;
    }
    UiStatus::Pending
}
