//! Job lifecycle observer (§4.5.2): consumes the orchestrator's job watch,
//! derives a `JobPhase` from status fields, patches the matching Alert Store
//! entries, publishes `job:<phase>`, and on terminal phases patches the
//! owning descriptor's condition. Also keeps `AppState::dedup_index` current
//! so intake's dedup check never needs a live API round-trip.

use std::sync::Arc;

use alert_store::JobInfoPatch;
use chrono::Utc;
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use openfero_core::{ConditionStatus, Event, JobPhase, StatusCondition};
use orchestrator_client::{JobRef, WatchEvent, WatchHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::metrics;
use crate::state::AppState;

const GROUP_KEY_LABEL: &str = "remediation.group-key";
const DESCRIPTOR_LABEL: &str = "remediation.descriptor";

/// Derives the observed phase from a job's status fields (§4.5.2).
fn derive_phase(job: &Job) -> JobPhase {
    let Some(status) = &job.status else {
        return JobPhase::Pending;
    };
    let active = status.active.unwrap_or(0);
    let succeeded = status.succeeded.unwrap_or(0);
    let failed = status.failed.unwrap_or(0);
    let backoff_limit = job
        .spec
        .as_ref()
        .and_then(|s| s.backoff_limit)
        .unwrap_or(6);

    if active > 0 {
        JobPhase::Running
    } else if succeeded > 0 {
        JobPhase::Succeeded
    } else if failed >= backoff_limit {
        JobPhase::Failed
    } else {
        JobPhase::Pending
    }
}

fn is_terminal_job(job: &Job) -> bool {
    derive_phase(job).is_terminal()
}

/// Drains the watch handle until it closes or `shutdown` fires.
pub async fn run(state: Arc<AppState>, mut handle: WatchHandle, shutdown: CancellationToken) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("job lifecycle observer stopping on shutdown signal");
                return;
            }
            event = handle.events.recv() => event,
        };
        match event {
            Some(WatchEvent::Added(job) | WatchEvent::Modified(job)) => {
                update_dedup_index(&state, &job).await;
                handle_job_update(&state, &job).await;
            }
            Some(WatchEvent::Deleted(job)) => {
                remove_from_dedup_index(&state, &job).await;
            }
            None => {
                warn!("job lifecycle observer stream ended");
                return;
            }
        }
    }
}

async fn update_dedup_index(state: &Arc<AppState>, job: &Job) {
    let Some(group_key) = job.labels().get(GROUP_KEY_LABEL) else {
        return;
    };
    let name = job.name_any();
    let namespace = job.namespace().unwrap_or_default();

    if is_terminal_job(job) {
        let mut index = state.dedup_index.write().await;
        if index.get(group_key).is_some_and(|r| r.name == name) {
            index.remove(group_key);
        }
    } else {
        state
            .dedup_index
            .write()
            .await
            .insert(group_key.clone(), JobRef { name, namespace });
    }
}

async fn remove_from_dedup_index(state: &Arc<AppState>, job: &Job) {
    let Some(group_key) = job.labels().get(GROUP_KEY_LABEL) else {
        return;
    };
    let name = job.name_any();
    let mut index = state.dedup_index.write().await;
    if index.get(group_key).is_some_and(|r| r.name == name) {
        index.remove(group_key);
    }
}

#[instrument(skip(state, job), fields(job = %job.name_any()))]
async fn handle_job_update(state: &Arc<AppState>, job: &Job) {
    let phase = derive_phase(job);
    let job_name = job.name_any();

    let patch = JobInfoPatch::phase(phase);
    let updated = match state.store.patch_job_info_by_job_name(&job_name, patch).await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, job = %job_name, "failed to patch alert store entries for job");
            return;
        }
    };
    if updated == 0 {
        // Either no entry ever referenced this job, or the entry was evicted
        // from a bounded store — drop silently (§4.5.2).
        return;
    }

    let Some(descriptor_name) = job.labels().get(DESCRIPTOR_LABEL).cloned() else {
        return;
    };

    match phase {
        JobPhase::Running => state.broker.publish(Event::JobRunning {
            descriptor: descriptor_name.clone(),
            job_name: job_name.clone(),
        }),
        JobPhase::Succeeded => {
            metrics::JOBS_SUCCEEDED_TOTAL.inc();
            state.broker.publish(Event::JobSucceeded {
                descriptor: descriptor_name.clone(),
                job_name: job_name.clone(),
            });
        }
        JobPhase::Failed => {
            metrics::JOBS_FAILED_TOTAL.inc();
            state.broker.publish(Event::JobFailed {
                descriptor: descriptor_name.clone(),
                job_name: job_name.clone(),
                reason: None,
            });
        }
        JobPhase::Pending | JobPhase::Unknown => {}
    }

    if phase.is_terminal() {
        patch_descriptor_condition(state, &descriptor_name, phase).await;
    }
}

async fn patch_descriptor_condition(state: &Arc<AppState>, descriptor_name: &str, phase: JobPhase) {
    let current = match state.orchestrator.get_descriptor(descriptor_name).await {
        Ok(d) => d,
        Err(e) => {
            orchestrator_client::log_and_continue("descriptor condition update", &e);
            return;
        }
    };
    let Some(resource_version) = current.resource_version() else {
        return;
    };
    let mut status = current.status.clone().unwrap_or_default();
    let (type_, condition_status) = match phase {
        JobPhase::Succeeded => ("Ready", ConditionStatus::True),
        JobPhase::Failed => ("Failed", ConditionStatus::True),
        _ => return,
    };
    status.set_condition(StatusCondition {
        type_: type_.to_string(),
        status: condition_status,
        reason: Some(phase.to_string()),
        message: None,
        last_transition_time: Utc::now(),
    });

    if let Err(e) = state
        .orchestrator
        .patch_descriptor_status(descriptor_name, &resource_version, &status)
        .await
    {
        orchestrator_client::log_and_continue("terminal descriptor condition patch", &e);
    } else {
        info!(descriptor = %descriptor_name, %type_, "patched descriptor terminal condition");
    }
}
