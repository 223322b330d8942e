use kds_client::CancellationToken;
use kds_orders::OrderReader;
use kds_schemas::Order;
use tracing::debug;

use crate::evaluate::{evaluate_order, ReconciliationResult};

#[derive(Debug, Clone)]
pub struct Verifier {
    reader: OrderReader,
}

impl Verifier {
    pub fn new(reader: OrderReader) -> Self {
        Self { reader }
    }

    /// Re-read `order` by business code and evaluate its lines.
    pub async fn verify(&self, order: &Order) -> Option<ReconciliationResult> {
        self.verify_code(order.code(), None).await
    }

    /// `None` when the code is empty, the order is not found, the read fails,
    /// or it is cancelled.
    pub async fn verify_code(
        &self,
        code: &str,
        cancel: Option<&CancellationToken>,
    ) -> Option<ReconciliationResult> {
        match self.reader.fetch_order_by_code(code, cancel).await {
            Ok(Some(fresh)) => Some(evaluate_order(&fresh)),
            Ok(None) => {
                debug!(order = code, "verification inconclusive: order not found");
                None
            }
            Err(_) => None,
        }
    }
}
