//! Webhook intake (§4.5.1): sanitize, match, deduplicate, materialize,
//! create, record, and status-patch — split into a fast synchronous half run
//! inline in the HTTP handler (`accept`) and a slower half run on the worker
//! pool (`process`), so a batch webhook never blocks on orchestrator API
//! calls.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use chrono::Utc;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::EnvVar;
use kube::ResourceExt;
use openfero_core::{
    hashing, sanitize, Alert, AlertStatus, AlertStoreEntry, Event, HookMessage, JobInfo, JobPhase,
    RemediationDescriptor,
};
use orchestrator_client::{JobRef, OrchestratorClient};
use tracing::{debug, info, instrument, warn};

use crate::dispatcher::Error;
use crate::metrics;
use crate::registry;
use crate::state::{AppState, DispatchTask};

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY_VALUE: &str = "openfero";
const GROUP_KEY_LABEL: &str = "remediation.group-key";
const DESCRIPTOR_LABEL: &str = "remediation.descriptor";
const ENV_PREFIX: &str = "OPENFERO_";
const MAX_CREATE_ATTEMPTS: u32 = 3;

/// Validates and accepts a `HookMessage`: rejects unsupported versions, then
/// for each alert saves a bare entry (no JobInfo yet) to the Alert Store,
/// publishes `alert:new`, and enqueues dispatch work. Returns once every
/// alert has been durably recorded and enqueued — the point at which the
/// webhook handler replies `200 OK` (§4.5.1's closing paragraph).
#[instrument(skip(state, msg), fields(alerts = msg.alerts.len()))]
pub async fn accept(state: &Arc<AppState>, msg: HookMessage) -> Result<(), Error> {
    for alert in msg.alerts {
        metrics::ALERTS_RECEIVED_TOTAL.inc();

        let entry_id = state
            .store
            .save_alert(&msg.group_key, alert.clone(), msg.status)
            .await?;

        let entry = AlertStoreEntry::new(alert.clone(), msg.status, Utc::now());
        state.broker.publish(Event::AlertNew(entry));

        let task = DispatchTask {
            entry_id,
            alert,
            status: msg.status,
            group_key: msg.group_key.clone(),
        };

        // Bounded channel: a full queue applies natural back-pressure to the
        // caller (§5 "Suspension points"), rather than an unbounded buffer.
        if state.dispatch_tx.send(task).await.is_err() {
            warn!("dispatch queue closed, alert recorded but not dispatched");
        }
    }
    Ok(())
}

/// The slow half: match, dedup, materialize, create, record, status-patch.
/// Runs on a worker-pool task; any failure here is logged and counted, never
/// propagated to the (already-acknowledged) webhook caller.
#[instrument(skip(state, task), fields(alertname = task.alert.alertname()))]
pub async fn process(state: &Arc<AppState>, task: DispatchTask) {
    let Some(alertname) = task.alert.alertname().map(str::to_string) else {
        warn!("dispatch task missing alertname, dropping");
        metrics::DISPATCHER_ERRORS_TOTAL.inc();
        return;
    };

    let Some(descriptor) =
        registry::match_alert(&state.descriptor_cache, &state.orchestrator, &task.alert, task.status).await
    else {
        debug!(alertname = %alertname, "no matching enabled descriptor, alert recorded with no job");
        return;
    };

    let dedup_key = hashing::dedup_key(&task.group_key);
    let dedup_enabled = descriptor.spec.dedup_enabled();

    let existing = if dedup_enabled {
        state.dedup_index.read().await.get(&dedup_key).cloned()
    } else {
        None
    };

    let (job_ref, image, newly_created) = match existing {
        Some(job_ref) => {
            info!(job = %job_ref.name, %dedup_key, "dedup hit, reusing existing non-terminal job");
            let image = image_from_template(&descriptor);
            (job_ref, image, false)
        }
        None => {
            let job = materialize_job(&descriptor, &task.alert, task.status, &dedup_key, &state.config);
            let image = image_of(&job);
            match create_with_retry(&state.orchestrator, &state.config.job_destination_namespace, &job).await {
                Ok(job_ref) => (job_ref, image, true),
                Err(e) => {
                    warn!(error = %e, alertname = %alertname, "job creation failed after retries, marking Failed");
                    metrics::DISPATCHER_ERRORS_TOTAL.inc();
                    metrics::JOBS_FAILED_TOTAL.inc();
                    record_failed_creation(state, &task, &descriptor, &job, e.to_string()).await;
                    return;
                }
            }
        }
    };

    if newly_created {
        metrics::JOBS_CREATED_TOTAL.inc();
    }

    let job_info = JobInfo {
        descriptor_name: descriptor.name_any(),
        job_name: job_ref.name.clone(),
        namespace: job_ref.namespace.clone(),
        image,
        execution_count: 1,
        last_execution_time: Utc::now(),
        last_executed_job_name: job_ref.name.clone(),
        status: JobPhase::Pending,
    };

    if let Err(e) = state.store.attach_job_info(&task.entry_id, job_info.clone()).await {
        warn!(error = %e, "failed to attach job info to alert store entry");
    }

    if newly_created {
        state.broker.publish(Event::JobCreated(job_info.clone()));
        if dedup_enabled {
            state.dedup_index.write().await.insert(dedup_key, job_ref.clone());
        }
    }

    update_descriptor_status(&state.orchestrator, &descriptor, &job_ref.name).await;
}

async fn record_failed_creation(
    state: &Arc<AppState>,
    task: &DispatchTask,
    descriptor: &RemediationDescriptor,
    job: &Job,
    reason: String,
) {
    let job_name = job.metadata.name.clone().unwrap_or_default();
    let job_info = JobInfo {
        descriptor_name: descriptor.name_any(),
        job_name: job_name.clone(),
        namespace: state.config.job_destination_namespace.clone(),
        image: image_of(job),
        execution_count: 1,
        last_execution_time: Utc::now(),
        last_executed_job_name: job_name.clone(),
        status: JobPhase::Failed,
    };
    let _ = state.store.attach_job_info(&task.entry_id, job_info).await;
    state.broker.publish(Event::JobFailed {
        descriptor: descriptor.name_any(),
        job_name,
        reason: Some(reason),
    });
}

/// Clones the descriptor's JobTemplate into a namespaced `Job`, injecting the
/// dedup/descriptor labels, a default TTL, and per-alert-label environment
/// variables (§4.5.1 step 4).
fn materialize_job(
    descriptor: &RemediationDescriptor,
    alert: &Alert,
    status: AlertStatus,
    dedup_key: &str,
    config: &crate::config::Config,
) -> Job {
    let alertname = alert.alertname().unwrap_or_default();
    let sanitized_alertname = sanitize::sanitize_name_component(alertname);
    let sanitized_status = sanitize::sanitize_name_component(status.as_str());
    let suffix = short_random();
    let name = format!("openfero-{sanitized_alertname}-{sanitized_status}-{suffix}");

    let mut labels: BTreeMap<String, String> = descriptor.spec.job_template.labels.clone();
    labels.insert(GROUP_KEY_LABEL.to_string(), dedup_key.to_string());
    labels.insert(DESCRIPTOR_LABEL.to_string(), descriptor.name_any());
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

    let mut spec = descriptor.spec.job_template.spec.clone();
    if spec.ttl_seconds_after_finished.is_none() {
        spec.ttl_seconds_after_finished = Some(config.job_ttl_seconds);
    }
    inject_env_vars(&mut spec, alert);

    Job {
        metadata: kube::api::ObjectMeta {
            name: Some(name),
            namespace: Some(config.job_destination_namespace.clone()),
            labels: Some(labels.into_iter().collect()),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    }
}

/// Injects every alert label as `OPENFERO_<UPPER_KEY>` into every container's
/// env, skipping keys already set by the template (template wins on
/// collision, §9 "Env-var injection collisions").
fn inject_env_vars(spec: &mut k8s_openapi::api::batch::v1::JobSpec, alert: &Alert) {
    let Some(pod_spec) = spec.template.spec.as_mut() else {
        return;
    };
    for container in &mut pod_spec.containers {
        let mut env = container.env.take().unwrap_or_default();
        let existing: std::collections::HashSet<String> = env.iter().map(|e| e.name.clone()).collect();
        for (key, value) in &alert.labels {
            let name = format!("{ENV_PREFIX}{}", sanitize::sanitize_env_key(key));
            if existing.contains(&name) {
                continue;
            }
            env.push(EnvVar {
                name,
                value: Some(value.clone()),
                ..Default::default()
            });
        }
        container.env = Some(env);
    }
}

fn image_of(job: &Job) -> String {
    job.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
        .and_then(|c| c.image.clone())
        .unwrap_or_default()
}

fn image_from_template(descriptor: &RemediationDescriptor) -> String {
    descriptor
        .spec
        .job_template
        .spec
        .template
        .spec
        .as_ref()
        .and_then(|p| p.containers.first())
        .and_then(|c| c.image.clone())
        .unwrap_or_default()
}

fn short_random() -> String {
    use rand::Rng;
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..6).map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char).collect()
}

/// Creates the job, retrying transient failures up to 3 times with
/// exponential backoff and jitter (§4.5.4); `AlreadyExists` is already
/// treated as success by `OrchestratorClient::create_job`.
async fn create_with_retry(
    client: &OrchestratorClient,
    namespace: &str,
    job: &Job,
) -> Result<JobRef, orchestrator_client::Error> {
    let mut backoff = backoff::ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_multiplier(2.0)
        .with_max_interval(Duration::from_secs(5))
        .build();

    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.create_job(namespace, job.clone()).await {
            Ok(job_ref) => return Ok(job_ref),
            Err(e) if attempt >= MAX_CREATE_ATTEMPTS => return Err(e),
            Err(e) => {
                warn!(error = %e, attempt, "job creation attempt failed, retrying");
                let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Patches the owning descriptor's status (execution count, last-execution
/// metadata, `Executing` condition), retrying on optimistic-concurrency
/// conflicts up to 3 times with a fresh read (§4.5.1 step 7, §4.5.4).
#[instrument(skip(client, descriptor))]
async fn update_descriptor_status(client: &OrchestratorClient, descriptor: &RemediationDescriptor, job_name: &str) {
    let name = descriptor.name_any();
    for attempt in 1..=3 {
        let current = match client.get_descriptor(&name).await {
            Ok(d) => d,
            Err(e) => {
                orchestrator_client::log_and_continue("descriptor status re-read", &e);
                return;
            }
        };
        let Some(resource_version) = current.resource_version() else {
            warn!(descriptor = %name, "descriptor has no resourceVersion, skipping status patch");
            return;
        };

        let mut status = current.status.clone().unwrap_or_default();
        status.execution_count += 1;
        status.last_execution_time = Some(Utc::now());
        status.last_executed_job_name = Some(job_name.to_string());
        status.set_condition(openfero_core::StatusCondition {
            type_: "Executing".to_string(),
            status: openfero_core::ConditionStatus::True,
            reason: Some("JobCreated".to_string()),
            message: Some(format!("remediation job {job_name} materialized")),
            last_transition_time: Utc::now(),
        });

        match client.patch_descriptor_status(&name, &resource_version, &status).await {
            Ok(()) => return,
            Err(e) => {
                warn!(error = %e, attempt, descriptor = %name, "descriptor status patch conflict, retrying");
            }
        }
    }
    metrics::DISPATCHER_ERRORS_TOTAL.inc();
    warn!(descriptor = %name, "descriptor status patch exhausted retries, continuing");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlertStoreType, Config};
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use openfero_core::{
        AlertSelector, AlertSelectorStatus, JobTemplate, RemediationDescriptorSpec,
    };

    fn alert(alertname: &str, labels: &[(&str, &str)]) -> Alert {
        let mut map: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        map.insert("alertname".to_string(), alertname.to_string());
        Alert {
            labels: map,
            annotations: BTreeMap::new(),
            starts_at: None,
            ends_at: None,
        }
    }

    fn descriptor_with_image(image: &str, preset_env: Option<&str>) -> RemediationDescriptor {
        let mut env = Vec::new();
        if let Some(name) = preset_env {
            env.push(EnvVar {
                name: name.to_string(),
                value: Some("from-template".to_string()),
                ..Default::default()
            });
        }
        let template = JobTemplate {
            labels: BTreeMap::new(),
            spec: k8s_openapi::api::batch::v1::JobSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "remediate".to_string(),
                            image: Some(image.to_string()),
                            env: Some(env),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
        };
        RemediationDescriptor::new(
            "disk-full-fixer",
            RemediationDescriptorSpec {
                alert_selector: AlertSelector {
                    alertname: "DiskFull".into(),
                    status: AlertSelectorStatus::Firing,
                    labels: BTreeMap::new(),
                },
                job_template: template,
                enabled: true,
                priority: 0,
                dedup: None,
            },
        )
    }

    fn config() -> Config {
        Config {
            descriptor_namespace: "openfero".into(),
            job_destination_namespace: "openfero".into(),
            label_selector: None,
            alert_store_type: AlertStoreType::Local,
            alert_store_size: 100,
            worker_pool_size: 8,
            read_timeout_seconds: 10,
            shutdown_grace_seconds: 10,
            job_ttl_seconds: 300,
            kubeconfig: None,
            log_level: "info".into(),
            http_port: 8080,
            metrics_port: 9090,
            gossip_node_id: None,
            gossip_cluster_id: "openfero".into(),
            gossip_listen_addr: None,
            gossip_advertise_addr: None,
            gossip_seeds: Vec::new(),
        }
    }

    #[test]
    fn materialize_job_names_namespaces_and_labels_the_job() {
        let descriptor = descriptor_with_image("registry/fix:latest", None);
        let alert = alert("DiskFull", &[("severity", "warn")]);
        let cfg = config();

        let job = materialize_job(&descriptor, &alert, AlertStatus::Firing, "dedupabc123", &cfg);

        let name = job.metadata.name.unwrap();
        assert!(name.starts_with("openfero-diskfull-firing-"));
        assert_eq!(job.metadata.namespace.as_deref(), Some("openfero"));

        let labels = job.metadata.labels.unwrap();
        assert_eq!(labels.get(GROUP_KEY_LABEL).map(String::as_str), Some("dedupabc123"));
        assert_eq!(
            labels.get(DESCRIPTOR_LABEL).map(String::as_str),
            Some("disk-full-fixer")
        );
        assert_eq!(
            labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGED_BY_VALUE)
        );

        assert_eq!(job.spec.unwrap().ttl_seconds_after_finished, Some(300));
    }

    #[test]
    fn materialize_job_injects_alert_labels_as_env_vars() {
        let descriptor = descriptor_with_image("registry/fix:latest", None);
        let alert = alert("DiskFull", &[("region", "eu-west-1")]);
        let cfg = config();

        let job = materialize_job(&descriptor, &alert, AlertStatus::Firing, "k", &cfg);
        let env = job.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();

        assert!(env
            .iter()
            .any(|e| e.name == "OPENFERO_REGION" && e.value.as_deref() == Some("eu-west-1")));
        assert!(env.iter().any(|e| e.name == "OPENFERO_ALERTNAME"));
    }

    #[test]
    fn template_env_var_wins_on_name_collision() {
        let descriptor = descriptor_with_image("registry/fix:latest", Some("OPENFERO_REGION"));
        let alert = alert("DiskFull", &[("region", "eu-west-1")]);
        let cfg = config();

        let job = materialize_job(&descriptor, &alert, AlertStatus::Firing, "k", &cfg);
        let env = job.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();

        let region_vars: Vec<_> = env.iter().filter(|e| e.name == "OPENFERO_REGION").collect();
        assert_eq!(region_vars.len(), 1);
        assert_eq!(region_vars[0].value.as_deref(), Some("from-template"));
    }

    #[test]
    fn explicit_template_ttl_is_not_overridden() {
        let mut descriptor = descriptor_with_image("registry/fix:latest", None);
        descriptor.spec.job_template.spec.ttl_seconds_after_finished = Some(60);
        let alert = alert("DiskFull", &[]);
        let cfg = config();

        let job = materialize_job(&descriptor, &alert, AlertStatus::Firing, "k", &cfg);
        assert_eq!(job.spec.unwrap().ttl_seconds_after_finished, Some(60));
    }

    #[test]
    fn short_random_produces_six_lowercase_alphanumeric_chars() {
        let s = short_random();
        assert_eq!(s.len(), 6);
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn image_of_reads_first_container_image() {
        let descriptor = descriptor_with_image("registry/fix:v2", None);
        let alert = alert("DiskFull", &[]);
        let cfg = config();
        let job = materialize_job(&descriptor, &alert, AlertStatus::Firing, "k", &cfg);
        assert_eq!(image_of(&job), "registry/fix:v2");
    }
}
