//! Assembly of the runtime from a loaded [`SyncConfig`].

use std::sync::Arc;

use kds_client::{CredentialProvider, HttpTransport, RequestClient, RetryPolicy};
use kds_config::SyncConfig;
use kds_orders::{NotesCache, NotesService, OrderReader};
use tokio::sync::RwLock;

use crate::backend::{OrderBackend, RemoteBackend};
use crate::board::OrderBoard;
use crate::loader::PageLoader;
use crate::machine::{MachineSettings, OptimisticOrderMachine};
use crate::notice::NoticeBus;

pub fn retry_policy(cfg: &SyncConfig) -> RetryPolicy {
    RetryPolicy {
        retries: cfg.retries,
        timeout: cfg.timeout,
        base_delay: cfg.base_delay,
        ..RetryPolicy::default()
    }
    .with_retryable_codes(cfg.retryable_codes.iter().cloned())
}

/// Everything a front end needs, sharing one board and one notice bus.
pub struct Engine {
    pub client: RequestClient,
    pub backend: Arc<RemoteBackend>,
    pub board: Arc<RwLock<OrderBoard>>,
    pub bus: NoticeBus,
    pub machine: OptimisticOrderMachine,
    pub loader: PageLoader,
    pub notes: NotesService,
}

impl Engine {
    /// Production wiring over `reqwest`.
    pub fn build(cfg: &SyncConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let client = RequestClient::new(cfg.base_url.clone(), credentials);
        Self::from_client(cfg, client)
    }

    pub fn with_transport(
        cfg: &SyncConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let client = RequestClient::with_transport(cfg.base_url.clone(), transport, credentials);
        Self::from_client(cfg, client)
    }

    fn from_client(cfg: &SyncConfig, client: RequestClient) -> Self {
        let client = client.with_policy(retry_policy(cfg));
        let backend = Arc::new(RemoteBackend::new(client.clone()));
        let board = Arc::new(RwLock::new(OrderBoard::default()));
        let bus = NoticeBus::default();
        let dyn_backend: Arc<dyn OrderBackend> = backend.clone();

        let machine = OptimisticOrderMachine::new(
            Arc::clone(&board),
            Arc::clone(&dyn_backend),
            bus.clone(),
            MachineSettings::from_config(cfg),
        );
        let loader = PageLoader::new(dyn_backend, Arc::clone(&board), bus.clone(), cfg.page_size);
        let notes = NotesService::new(
            client.clone(),
            NotesCache::new(cfg.notes_capacity, cfg.notes_ttl),
        );

        Self {
            client,
            backend,
            board,
            bus,
            machine,
            loader,
            notes,
        }
    }

    pub fn reader(&self) -> &OrderReader {
        self.backend.reader()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kds_config::UndoTarget;
    use kds_schemas::TargetStatus;
    use std::time::Duration;

    fn cfg() -> SyncConfig {
        SyncConfig {
            base_url: "http://erp.test".into(),
            retries: 2,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(100),
            retryable_codes: vec!["500".into(), "".into()],
            page_size: 12,
            strict_verification: true,
            undo_target: UndoTarget::Inproc,
            notes_capacity: 4,
            notes_ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn policy_carries_config_values() {
        let p = retry_policy(&cfg());
        assert_eq!(p.retries, 2);
        assert_eq!(p.timeout, Duration::from_secs(5));
        assert_eq!(p.base_delay, Duration::from_millis(100));
        assert_eq!(p.retryable_codes.len(), 1);
        assert!(p.retryable_codes.contains("500"));
    }

    #[test]
    fn engine_shares_config_across_parts() {
        let engine = Engine::with_transport(
            &cfg(),
            Arc::new(kds_client::ScriptedTransport::new()),
            Arc::new(kds_client::StaticToken::none()),
        );
        assert_eq!(engine.client.policy().retries, 2);
        assert_eq!(engine.loader.page_size(), 12);
        assert!(engine.machine.settings().strict_verification);
        assert_eq!(engine.machine.settings().undo_target, TargetStatus::Inproc);
        assert_eq!(engine.reader().client().base_url(), "http://erp.test");
    }
}
