//! The Alert Store (Component C): a bounded, queryable record of alerts and
//! the jobs dispatched for them, behind a single [`AlertStore`] trait with a
//! [`local`] in-process backend and a [`replicated`] gossip-backed backend
//! for multi-replica deployments (§4.3).

pub mod error;
pub mod local;
pub mod replicated;

pub use error::Error;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openfero_core::{Alert, AlertStatus, AlertStoreEntry, JobInfo, JobPhase};

/// Opaque identity of a stored entry: `hash(groupKey ∥ alertname ∥ startsAt)`
/// (§4.3.2), computed by [`openfero_core::hashing::entry_id`] so every
/// backend and every replica lands on the same value for the same alert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn compute(group_key: &str, alert: &Alert) -> Self {
        let alertname = alert.alertname().unwrap_or_default();
        EntryId(openfero_core::hashing::entry_id(
            group_key,
            alertname,
            alert.starts_at,
        ))
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A partial update to a stored `JobInfo`, applied field-by-field so the
/// job lifecycle observer (§4.5.2) only needs to know what changed. `None`
/// fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobInfoPatch {
    pub status: Option<JobPhase>,
    pub execution_count: Option<u64>,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub last_executed_job_name: Option<String>,
}

impl JobInfoPatch {
    pub fn phase(status: JobPhase) -> Self {
        JobInfoPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Applies the patch to `info`, honoring `JobInfo`'s own monotonicity
    /// rule for the `status` field. Returns `true` if anything changed.
    pub fn apply_to(&self, info: &mut JobInfo) -> bool {
        let mut changed = false;
        if let Some(status) = self.status {
            changed |= info.apply_phase(status);
        }
        if let Some(count) = self.execution_count {
            if info.execution_count != count {
                info.execution_count = count;
                changed = true;
            }
        }
        if let Some(t) = self.last_execution_time {
            if info.last_execution_time != t {
                info.last_execution_time = t;
                changed = true;
            }
        }
        if let Some(name) = &self.last_executed_job_name {
            if &info.last_executed_job_name != name {
                info.last_executed_job_name = name.clone();
                changed = true;
            }
        }
        changed
    }
}

/// Common interface implemented by every Alert Store backend (§4.3).
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Prepares the backend for use: for [`local::LocalStore`] this is a
    /// no-op, for [`replicated::ReplicatedStore`] it joins the gossip
    /// cluster and fetches an initial snapshot from a peer.
    async fn initialize(&self) -> Result<(), Error>;

    /// Releases backend resources (e.g. leaves the gossip cluster).
    async fn close(&self) -> Result<(), Error>;

    /// Records a newly observed alert with no job materialized yet.
    async fn save_alert(
        &self,
        group_key: &str,
        alert: Alert,
        status: AlertStatus,
    ) -> Result<EntryId, Error>;

    /// Records a newly observed alert alongside the `JobInfo` of the job
    /// dispatched (or reused) for it.
    async fn save_alert_with_job_info(
        &self,
        group_key: &str,
        alert: Alert,
        status: AlertStatus,
        job_info: JobInfo,
    ) -> Result<EntryId, Error>;

    /// Attaches a `JobInfo` to an entry that was recorded with none yet (the
    /// first materialization of a job for an alert saved via `save_alert`).
    /// Overwrites any existing job_info outright; subsequent updates go
    /// through `patch_job_info`.
    async fn attach_job_info(&self, id: &EntryId, job_info: JobInfo) -> Result<(), Error>;

    /// Applies a partial `JobInfo` update to the entry addressed by `id`.
    async fn patch_job_info(&self, id: &EntryId, patch: JobInfoPatch) -> Result<(), Error>;

    /// Applies a partial `JobInfo` update to every entry whose `JobInfo`
    /// names `job_name` — the job lifecycle observer's entry point (§4.5.2),
    /// since a dedup hit means several entries share one dispatched job.
    /// Returns the number of entries updated.
    async fn patch_job_info_by_job_name(
        &self,
        job_name: &str,
        patch: JobInfoPatch,
    ) -> Result<usize, Error>;

    /// Free-text search over stored entries (§4.3), newest first, bounded by
    /// `limit` (0 means unbounded).
    async fn get_alerts(&self, query: &str, limit: usize) -> Vec<AlertStoreEntry>;

    /// Current entry count, used by readiness/metrics reporting.
    async fn len(&self) -> usize;
}
