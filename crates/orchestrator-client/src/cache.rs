//! The shared indexed cache for `RemediationDescriptor`s: one
//! `reflector::Store` kept fresh by a `watcher` stream with periodic resync,
//! plus a `WaitForCacheSync`-style readiness gate.
//!
//! Grounded on the `Controller::new(...).run(...)` wiring in
//! `ph_operator::main`, generalized from "drive reconcile" to "just keep a
//! readable snapshot" since the Registry (not a reconciler) is the consumer
//! here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource};
use openfero_core::RemediationDescriptor;
use tracing::{info, warn};

use crate::error::Error;

/// Default periodic resync interval — "a belt-and-braces refresh when the
/// watch stream is healthy but events were missed" (spec §4.1).
pub const DEFAULT_RESYNC: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct DescriptorCache {
    store: Store<RemediationDescriptor>,
    synced: Arc<AtomicBool>,
}

impl DescriptorCache {
    /// Starts the watch loop as a background task and returns a handle to the
    /// cache immediately; the cache reports `false` from `is_synced` until
    /// the initial list completes.
    pub fn spawn(api: Api<RemediationDescriptor>) -> Self {
        let (store, writer) = reflector::store();
        let synced = Arc::new(AtomicBool::new(false));

        let synced_clone = synced.clone();
        tokio::spawn(async move {
            let cfg = watcher::Config::default().timeout(290);
            let mut stream = Box::pin(watcher(api, cfg).default_backoff().reflect(writer));
            loop {
                match stream.next().await {
                    Some(Ok(watcher::Event::Restarted(_))) => {
                        synced_clone.store(true, Ordering::SeqCst);
                        info!("descriptor cache initial sync complete");
                    }
                    Some(Ok(watcher::Event::Applied(_) | watcher::Event::Deleted(_))) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "descriptor watch stream error, retrying");
                    }
                    None => {
                        warn!("descriptor watch stream ended, restarting would require a fresh watcher call");
                        break;
                    }
                }
            }
        });

        DescriptorCache { store, synced }
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Blocks until the initial list completes or the deadline elapses.
    /// Failure here is fatal to component startup per §4.1.
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<(), Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.is_synced() {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::CacheSyncTimeout(timeout));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    /// Reads from the local cache; may return the empty list before initial
    /// sync (§4.1 `ListDescriptors` contract).
    pub fn list(&self) -> Vec<RemediationDescriptor> {
        self.store
            .state()
            .iter()
            .map(|obj| (**obj).clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<RemediationDescriptor> {
        self.store
            .state()
            .iter()
            .find(|obj| obj.meta().name.as_deref() == Some(name))
            .map(|obj| (**obj).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unsynced() {
        let (store, _writer) = reflector::store::<RemediationDescriptor>();
        let cache = DescriptorCache {
            store,
            synced: Arc::new(AtomicBool::new(false)),
        };
        assert!(!cache.is_synced());
        assert!(cache.list().is_empty());
    }
}
