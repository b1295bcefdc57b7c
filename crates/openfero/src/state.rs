//! Shared application state, constructed once during bootstrap and handed to
//! the HTTP server, the worker pool, and the job lifecycle observer as
//! `Arc<AppState>` — the single-bootstrap-phase discipline spec §9 calls for
//! to keep Dispatcher/Broker/AlertStore references acyclic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alert_store::AlertStore;
use event_broker::EventBroker;
use openfero_core::{Alert, AlertStatus};
use orchestrator_client::{DescriptorCache, JobRef, OrchestratorClient};
use tokio::sync::{mpsc, RwLock};

use crate::config::Config;

/// One unit of work handed from the webhook handler to the worker pool: the
/// alert has already been recorded in the Alert Store (so `alert:new` is
/// guaranteed to precede any `job:*` event for it) before the task is
/// enqueued.
pub struct DispatchTask {
    pub entry_id: alert_store::EntryId,
    pub alert: Alert,
    pub status: AlertStatus,
    pub group_key: String,
}

pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<OrchestratorClient>,
    pub descriptor_cache: DescriptorCache,
    pub store: Arc<dyn AlertStore>,
    pub broker: EventBroker,
    pub dispatch_tx: mpsc::Sender<DispatchTask>,
    /// Index of non-terminal jobs by dedup key, maintained by the job
    /// lifecycle observer and consulted by intake's dedup check (§4.5.1 step
    /// 3) so a dedup hit never needs a live API round-trip.
    pub dedup_index: Arc<RwLock<HashMap<String, JobRef>>>,
    store_initialized: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        orchestrator: Arc<OrchestratorClient>,
        descriptor_cache: DescriptorCache,
        store: Arc<dyn AlertStore>,
        broker: EventBroker,
        dispatch_tx: mpsc::Sender<DispatchTask>,
    ) -> Self {
        AppState {
            config,
            orchestrator,
            descriptor_cache,
            store,
            broker,
            dispatch_tx,
            dedup_index: Arc::new(RwLock::new(HashMap::new())),
            store_initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_store_initialized(&self) {
        self.store_initialized.store(true, Ordering::SeqCst);
    }

    /// `/readiness` contract (§6): ready once the descriptor cache has
    /// completed its initial sync and the Alert Store has been initialized.
    pub fn is_ready(&self) -> bool {
        self.descriptor_cache.is_synced() && self.store_initialized.load(Ordering::SeqCst)
    }
}
