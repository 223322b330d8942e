//! Upstream seam for the runtime.
//!
//! The machine and the page loader only talk to [`OrderBackend`]. Production
//! wires [`RemoteBackend`] (request client, reader, mutation service,
//! verifier); scenario tests wire an in-memory fake.

use kds_client::{CancellationToken, RequestClient};
use kds_orders::{FetchCancelled, ListFilters, MutationResult, OrderPage, OrderReader, StatusMutationService};
use kds_reconcile::{ReconciliationResult, Verifier};
use kds_schemas::{Order, StatusChangeRow};

#[async_trait::async_trait]
pub trait OrderBackend: Send + Sync {
    /// Shape and submit one status batch.
    async fn submit_status(&self, rows: &[StatusChangeRow]) -> MutationResult;

    /// Re-read and evaluate; `None` = inconclusive.
    async fn verify(&self, order: &Order) -> Option<ReconciliationResult>;

    async fn list_orders(
        &self,
        page_number: u32,
        page_size: u32,
        filters: &ListFilters,
        cancel: Option<&CancellationToken>,
    ) -> Result<OrderPage, FetchCancelled>;

    async fn count_orders(
        &self,
        filters: &ListFilters,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64, FetchCancelled>;
}

#[derive(Debug, Clone)]
pub struct RemoteBackend {
    reader: OrderReader,
    mutations: StatusMutationService,
    verifier: Verifier,
}

impl RemoteBackend {
    pub fn new(client: RequestClient) -> Self {
        let reader = OrderReader::new(client.clone());
        Self {
            mutations: StatusMutationService::new(client),
            verifier: Verifier::new(reader.clone()),
            reader,
        }
    }

    pub fn reader(&self) -> &OrderReader {
        &self.reader
    }

    pub fn mutations(&self) -> &StatusMutationService {
        &self.mutations
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }
}

#[async_trait::async_trait]
impl OrderBackend for RemoteBackend {
    async fn submit_status(&self, rows: &[StatusChangeRow]) -> MutationResult {
        self.mutations.submit(rows).await
    }

    async fn verify(&self, order: &Order) -> Option<ReconciliationResult> {
        self.verifier.verify(order).await
    }

    async fn list_orders(
        &self,
        page_number: u32,
        page_size: u32,
        filters: &ListFilters,
        cancel: Option<&CancellationToken>,
    ) -> Result<OrderPage, FetchCancelled> {
        self.reader.list_orders(page_number, page_size, filters, cancel).await
    }

    async fn count_orders(
        &self,
        filters: &ListFilters,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64, FetchCancelled> {
        self.reader.count_orders(filters, cancel).await
    }
}
