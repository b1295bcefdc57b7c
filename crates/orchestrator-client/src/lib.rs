//! Thin adapter over the orchestrator's batch-job and custom-resource APIs
//! (component A, spec §4.1).
//!
//! Grounded on `ph_operator`'s direct use of `kube::Client` /
//! `kube::api::Api` for job creation (`autoheal_controller::execute_runbook_action`)
//! and status patches (`autoheal_controller::update_status`), generalized
//! into a standalone, reusable client rather than inline controller logic.

pub mod cache;
pub mod error;
pub mod watch;

use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use openfero_core::{RemediationDescriptor, RemediationDescriptorStatus};
use serde_json::json;
use tracing::{info, warn};

pub use cache::DescriptorCache;
pub use error::Error;
pub use watch::{WatchEvent, WatchHandle};

/// A reference to a created (or already-existing) orchestrator job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub name: String,
    pub namespace: String,
}

pub struct OrchestratorClient {
    client: Client,
    descriptor_namespace: Option<String>,
}

impl OrchestratorClient {
    /// Resolves the orchestrator environment: prefers in-cluster
    /// credentials, falling back to a supplied kubeconfig path (§4.1 (i)).
    pub async fn connect(kubeconfig: Option<&str>) -> Result<Self, Error> {
        let client = match kubeconfig {
            Some(path) => {
                let kc = kube::config::Kubeconfig::read_from(path)
                    .map_err(|e| Error::Kubeconfig(e.to_string()))?;
                let config = kube::Config::from_custom_kubeconfig(kc, &Default::default())
                    .await
                    .map_err(|e| Error::Kubeconfig(e.to_string()))?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };
        Ok(OrchestratorClient {
            client,
            descriptor_namespace: None,
        })
    }

    pub fn from_client(client: Client) -> Self {
        OrchestratorClient {
            client,
            descriptor_namespace: None,
        }
    }

    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    /// `RemediationDescriptor` is cluster-scoped, so this only matters for
    /// the `ListParams`/label-selector the caller applies; kept for callers
    /// that want a default scope hint.
    pub fn with_descriptor_namespace(mut self, ns: Option<String>) -> Self {
        self.descriptor_namespace = ns;
        self
    }

    /// Starts the descriptor cache watch loop. The returned handle serves
    /// `ListDescriptors` reads without round-trips.
    pub fn start_descriptor_cache(&self) -> DescriptorCache {
        let api: Api<RemediationDescriptor> = Api::all(self.client.clone());
        DescriptorCache::spawn(api)
    }

    /// Strongly-consistent descriptor read that bypasses the cache, used
    /// during dispatch when the cache may be stale (§4.1
    /// `ListDescriptorsFromAPI`).
    pub async fn list_descriptors_from_api(&self) -> Result<Vec<RemediationDescriptor>, Error> {
        let api: Api<RemediationDescriptor> = Api::all(self.client.clone());
        let list = api.list(&Default::default()).await?;
        Ok(list.items)
    }

    /// Creates a job, idempotent on `AlreadyExists` (§4.1 `CreateJob`
    /// contract): returns the existing ref without error instead of
    /// surfacing the conflict.
    pub async fn create_job(&self, namespace: &str, job: Job) -> Result<JobRef, Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let name = job.name_any();
        match api.create(&PostParams::default(), &job).await {
            Ok(created) => Ok(JobRef {
                name: created.name_any(),
                namespace: namespace.to_string(),
            }),
            Err(kube::Error::Api(ae)) if ae.reason == "AlreadyExists" => {
                info!(job = %name, "job already exists, treating as dedup hit");
                Ok(JobRef {
                    name,
                    namespace: namespace.to_string(),
                })
            }
            Err(e) => Err(Error::Kube(e)),
        }
    }

    /// Single-shot status patch with a resourceVersion precondition, so a
    /// concurrent writer produces a 409 the caller can retry against a fresh
    /// read (§4.5.1 step 7, §5 "server-side optimistic concurrency").
    pub async fn patch_descriptor_status(
        &self,
        name: &str,
        resource_version: &str,
        status: &RemediationDescriptorStatus,
    ) -> Result<(), Error> {
        let api: Api<RemediationDescriptor> = Api::all(self.client.clone());
        let patch = json!({
            "apiVersion": "openfero.io/v1alpha1",
            "kind": "RemediationDescriptor",
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    /// Fetches the descriptor's current `resourceVersion` for the
    /// optimistic-concurrency status-patch path above.
    pub async fn get_descriptor(&self, name: &str) -> Result<RemediationDescriptor, Error> {
        let api: Api<RemediationDescriptor> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    /// Watches jobs matching `selector` in `namespace`, invoking `handler`
    /// for every Add/Update/Delete (§4.1 `WatchJobs`). Per-object ordering is
    /// preserved because the underlying watch stream is itself per-object
    /// ordered; cross-object ordering is unspecified, matching the contract.
    pub fn watch_jobs(&self, namespace: &str, selector: Option<String>) -> WatchHandle {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        watch::spawn_job_watch(api, selector)
    }

    /// Blocks until `cache.is_synced()` or the deadline elapses; failure here
    /// is fatal to component startup (§4.1).
    pub async fn wait_for_cache_sync(
        cache: &DescriptorCache,
        timeout: Duration,
    ) -> Result<(), Error> {
        cache.wait_for_sync(timeout).await
    }
}

/// Logs and swallows a non-fatal orchestrator error, used at call sites where
/// the Dispatcher's failure policy says "log+continue" (§4.5.4).
pub fn log_and_continue(context: &str, err: &Error) {
    warn!(error = %err, context, "orchestrator API call failed, continuing");
}
