//! The `RemediationDescriptor` custom resource: a cluster-scoped binding of
//! `(alertname, status)` to an orchestrator job template.
//!
//! Grounded on `ph_operator::crds::phAutoHealRule` (same derive shape,
//! printcolumns, and status-subresource convention) generalized from a single
//! `triggerName` match key to the full `(alertname, status, labels)` selector
//! this spec requires.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::JobSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::alert::AlertStatus;

/// Selects which alerts a descriptor applies to.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlertSelector {
    pub alertname: String,
    pub status: AlertSelectorStatus,
    /// Additional label constraints. A descriptor matches only if every entry
    /// here is present with an equal value in the alert's labels (submap
    /// check, §4.2 step 2).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Duplicated from `AlertStatus` rather than reused directly so the CRD's
/// `JsonSchema` derive doesn't have to flow through the wire-facing alert
/// module; the two enums are kept in lockstep by `From`/`PartialEq` impls.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertSelectorStatus {
    #[default]
    Firing,
    Resolved,
}

impl PartialEq<AlertStatus> for AlertSelectorStatus {
    fn eq(&self, other: &AlertStatus) -> bool {
        matches!(
            (self, other),
            (AlertSelectorStatus::Firing, AlertStatus::Firing)
                | (AlertSelectorStatus::Resolved, AlertStatus::Resolved)
        )
    }
}

impl From<AlertStatus> for AlertSelectorStatus {
    fn from(s: AlertStatus) -> Self {
        match s {
            AlertStatus::Firing => AlertSelectorStatus::Firing,
            AlertStatus::Resolved => AlertSelectorStatus::Resolved,
        }
    }
}

/// Deduplication configuration for a descriptor.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DedupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dedup_ttl")]
    pub ttl_seconds: u32,
}

fn default_true() -> bool {
    true
}

fn default_dedup_ttl() -> u32 {
    3600
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            enabled: true,
            ttl_seconds: default_dedup_ttl(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// The full embedded orchestrator job template. The Dispatcher only ever
/// rewrites `metadata.name`, `metadata.labels`,
/// `spec.ttlSecondsAfterFinished`, and per-container `env` — everything else
/// in `spec` (image, command, resources, volumes, ...) passes through as
/// authored.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobTemplate {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub spec: JobSpec,
}

/// `k8s-openapi` types don't derive `JsonSchema` and the orphan rule blocks
/// implementing it for the foreign `JobSpec` directly, so `JobTemplate`
/// implements the trait by hand with a permissive `additionalProperties`
/// schema — the orchestrator API server is the real validator of the
/// embedded job spec, not the CRD's OpenAPI schema.
impl JsonSchema for JobTemplate {
    fn schema_name() -> String {
        "JobTemplate".to_string()
    }

    fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        use schemars::schema::{InstanceType, Schema, SchemaObject, SingleOrVec};
        Schema::Object(SchemaObject {
            instance_type: Some(SingleOrVec::Single(Box::new(InstanceType::Object))),
            ..Default::default()
        })
    }
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "openfero.io",
    version = "v1alpha1",
    kind = "RemediationDescriptor",
    status = "RemediationDescriptorStatus",
    printcolumn = r#"{"name":"Alert", "type":"string", "jsonPath":".spec.alertSelector.alertname"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".spec.alertSelector.status"}"#,
    printcolumn = r#"{"name":"Enabled", "type":"boolean", "jsonPath":".spec.enabled"}"#,
    printcolumn = r#"{"name":"Priority", "type":"integer", "jsonPath":".spec.priority"}"#,
    printcolumn = r#"{"name":"Executions", "type":"integer", "jsonPath":".status.executionCount"}"#,
    shortname = "remd"
)]
#[serde(rename_all = "camelCase")]
pub struct RemediationDescriptorSpec {
    pub alert_selector: AlertSelector,
    pub job_template: JobTemplate,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup: Option<DedupConfig>,
}

impl RemediationDescriptorSpec {
    pub fn dedup_enabled(&self) -> bool {
        self.dedup.as_ref().map(|d| d.enabled).unwrap_or(true)
    }
}

/// A single typed condition, the Kubernetes-idiomatic status-history shape.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemediationDescriptorStatus {
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_job_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,
}

impl RemediationDescriptorStatus {
    /// Appends a condition, keeping at most one entry per `type_` (the newest
    /// replaces any prior entry of the same type), the usual Kubernetes
    /// condition-list convention.
    pub fn set_condition(&mut self, condition: StatusCondition) {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_defaults_to_enabled_when_absent() {
        let spec = RemediationDescriptorSpec {
            alert_selector: AlertSelector {
                alertname: "DiskFull".into(),
                status: AlertSelectorStatus::Firing,
                labels: BTreeMap::new(),
            },
            job_template: JobTemplate::default(),
            enabled: true,
            priority: 0,
            dedup: None,
        };
        assert!(spec.dedup_enabled());
    }

    #[test]
    fn selector_status_compares_against_alert_status() {
        assert_eq!(AlertSelectorStatus::Firing, AlertStatus::Firing);
        assert_ne!(AlertSelectorStatus::Firing, AlertStatus::Resolved);
    }
}
