//! Order repository reader.
//!
//! Paged reads of `list_stock_batch_invoice`. A read never fails on a bad
//! upstream shape: the worst case is an empty page with `ok = false`. The only
//! error a caller sees is [`FetchCancelled`], when its token fired.

use std::collections::BTreeMap;

use kds_client::{CancellationToken, Method, RequestClient, RequestOptions};
use kds_schemas::Order;
use serde_json::{json, Value};
use tracing::debug;

use crate::normalizer::{extract_error_message, normalize_orders, read_orders_list, read_total_count};
use crate::FetchCancelled;

pub const LIST_ENDPOINT: &str = "list_stock_batch_invoice";
pub const ACTIVE_STATUSES: &str = "NEW,INPROC";
pub const COMPLETED_STATUSES: &str = "APPROVED,REJECTED";
/// Department selection meaning "no filter".
pub const ALL_DEPARTMENTS: &str = "All";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilters {
    /// Comma-joined department allowlist; empty = all.
    pub departments: String,
    /// Comma-joined status allowlist, e.g. [`ACTIVE_STATUSES`]; empty = all.
    pub statuses: String,
    /// Exact business code; empty = any.
    pub order_code: String,
    /// Ask the upstream for the count only.
    pub only_counted: bool,
}

impl ListFilters {
    pub fn active(departments: impl Into<String>) -> Self {
        Self {
            departments: departments.into(),
            statuses: ACTIVE_STATUSES.to_string(),
            ..Self::default()
        }
    }

    pub fn completed(departments: impl Into<String>) -> Self {
        Self {
            departments: departments.into(),
            statuses: COMPLETED_STATUSES.to_string(),
            ..Self::default()
        }
    }

    pub fn counted(mut self) -> Self {
        self.only_counted = true;
        self
    }
}

/// Selection string sent upstream: `"All"` anywhere means no filter,
/// otherwise the names joined with `,`.
pub fn department_selection<S: AsRef<str>>(selected: &[S]) -> String {
    if selected.iter().any(|s| s.as_ref() == ALL_DEPARTMENTS) {
        return String::new();
    }
    selected
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPage {
    pub items: Vec<Order>,
    pub total: u64,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderReader {
    client: RequestClient,
}

impl OrderReader {
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    /// `page_number` and `page_size` are clamped to at least 1.
    pub async fn list_orders(
        &self,
        page_number: u32,
        page_size: u32,
        filters: &ListFilters,
        cancel: Option<&CancellationToken>,
    ) -> Result<OrderPage, FetchCancelled> {
        let page_number = page_number.max(1);
        let page_size = page_size.max(1);
        let body = filter_body(page_number, page_size, filters);

        let mut opts = RequestOptions::default();
        if let Some(c) = cancel {
            opts = opts.cancel(c.clone());
        }
        let out = self
            .client
            .request_json(Method::Post, LIST_ENDPOINT, Some(&body), &BTreeMap::new(), &opts)
            .await;
        if out.cancelled {
            return Err(FetchCancelled);
        }

        let items = normalize_orders(&read_orders_list(&out.data), page_number);
        let total = read_total_count(&out.data);
        let error = if out.ok {
            None
        } else {
            extract_error_message(&out.data).or(out.error)
        };
        debug!(
            page_number,
            page_size,
            statuses = %filters.statuses,
            items = items.len(),
            total,
            ok = out.ok,
            "order page read"
        );

        Ok(OrderPage {
            items,
            total,
            ok: out.ok,
            error,
        })
    }

    /// Total matching orders (count-only read).
    pub async fn count_orders(
        &self,
        filters: &ListFilters,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64, FetchCancelled> {
        let filters = filters.clone().counted();
        Ok(self.list_orders(1, 1, &filters, cancel).await?.total)
    }

    /// Single order by exact business code; `None` when not found or on any
    /// upstream failure.
    pub async fn fetch_order_by_code(
        &self,
        code: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Order>, FetchCancelled> {
        if code.is_empty() {
            return Ok(None);
        }
        let filters = ListFilters {
            order_code: code.to_string(),
            ..ListFilters::default()
        };
        let page = self.list_orders(1, 1, &filters, cancel).await?;
        if !page.ok {
            return Ok(None);
        }
        Ok(page.items.into_iter().next())
    }
}

fn filter_body(page_number: u32, page_size: u32, f: &ListFilters) -> Value {
    let statuses = if f.statuses.is_empty() { "all" } else { f.statuses.as_str() };
    json!({
        "filter_define": {
            "page_number": page_number,
            "page_size": page_size,
            "only_counted": if f.only_counted { "Y" } else { "N" },
            "invoice_type": "all",
            "invoice_system_status": "all",
            "invoice_status_selection": statuses,
            "item_department_selection": f.departments,
            "invoice_customer_selection": "",
            "shopping_cart_code_selection": "",
            "invoice_365_code_selection": f.order_code,
            "invoice_store_selection": "",
            "invoice_station_selection": "",
            "from_invoice_date_utc0": "",
            "to_invoice_date_utc0": "",
            "list_modifiers": [],
            "list_invoice_payments": []
        }
    })
}
