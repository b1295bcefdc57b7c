//! Wire types for alerts and the batch envelope a monitoring system posts to
//! `/api/alerts`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The status an alert (or a whole `HookMessage` batch) carries.
///
/// Serialized lower-case on the wire (`firing` / `resolved`) to match the
/// monitoring system's webhook contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firing" => Ok(AlertStatus::Firing),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(()),
        }
    }
}

/// A single alert as received from the monitoring system. Immutable after
/// receipt; the Dispatcher never mutates a stored `Alert`, only the sidecar
/// `JobInfo` attached to its store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Label map. The `alertname` key is required and validated at intake.
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(rename = "startsAt", skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(rename = "endsAt", skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// The raw (unsanitized) `alertname` label value, used for descriptor
    /// matching. Matching must use raw values — see §9 "Sanitization open
    /// question" — so that two distinct alertnames never collapse onto the
    /// same match key.
    pub fn alertname(&self) -> Option<&str> {
        self.labels.get("alertname").map(String::as_str)
    }
}

/// The batch envelope posted to `/api/alerts`. `status` applies uniformly to
/// every contained alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookMessage {
    pub version: String,
    #[serde(rename = "groupKey")]
    pub group_key: String,
    pub status: AlertStatus,
    pub receiver: String,
    #[serde(rename = "groupLabels", default)]
    pub group_labels: BTreeMap<String, String>,
    #[serde(rename = "commonLabels", default)]
    pub common_labels: BTreeMap<String, String>,
    #[serde(rename = "groupAnnotations", default)]
    pub group_annotations: BTreeMap<String, String>,
    #[serde(rename = "commonAnnotations", default)]
    pub common_annotations: BTreeMap<String, String>,
    pub alerts: Vec<Alert>,
}

/// Message schema versions this build understands. `HookMessage::version`
/// values outside this set are rejected at intake with a 400.
pub const SUPPORTED_VERSIONS: &[&str] = &["4"];

impl HookMessage {
    pub fn is_supported_version(&self) -> bool {
        SUPPORTED_VERSIONS.contains(&self.version.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_hook_message() {
        let raw = serde_json::json!({
            "version": "4",
            "groupKey": "g-1",
            "status": "firing",
            "receiver": "openfero",
            "alerts": [
                {"labels": {"alertname": "DiskFull", "severity": "warn"}}
            ]
        });
        let msg: HookMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.status, AlertStatus::Firing);
        assert_eq!(msg.alerts.len(), 1);
        assert_eq!(msg.alerts[0].alertname(), Some("DiskFull"));
        assert!(msg.is_supported_version());
    }

    #[test]
    fn rejects_unknown_version() {
        let raw = serde_json::json!({
            "version": "99",
            "groupKey": "g-1",
            "status": "firing",
            "receiver": "openfero",
            "alerts": []
        });
        let msg: HookMessage = serde_json::from_value(raw).unwrap();
        assert!(!msg.is_supported_version());
    }
}
