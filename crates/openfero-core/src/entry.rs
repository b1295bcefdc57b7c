//! `AlertStoreEntry`: the canonical unit of alert history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{Alert, AlertStatus};
use crate::job_info::JobInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStoreEntry {
    pub alert: Alert,
    pub status: AlertStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_info: Option<JobInfo>,
}

impl AlertStoreEntry {
    pub fn new(alert: Alert, status: AlertStatus, timestamp: DateTime<Utc>) -> Self {
        AlertStoreEntry {
            alert,
            status,
            timestamp,
            job_info: None,
        }
    }

    /// Builds the case-insensitive search haystack used by `GetAlerts`
    /// queries (§4.3): alertname, every `key:value` label pair, status, and
    /// (if present) the JobInfo's job name, descriptor name, and image.
    pub fn search_haystack(&self) -> String {
        let mut parts = Vec::new();
        if let Some(name) = self.alert.alertname() {
            parts.push(name.to_string());
        }
        for (k, v) in &self.alert.labels {
            parts.push(format!("{k}:{v}"));
        }
        parts.push(self.status.as_str().to_string());
        if let Some(job) = &self.job_info {
            parts.push(job.job_name.clone());
            parts.push(job.descriptor_name.clone());
            parts.push(job.image.clone());
        }
        parts.join(" ").to_lowercase()
    }

    pub fn matches_query(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        self.search_haystack().contains(&query.to_lowercase())
    }

    /// The stable identity an entry is addressed by once a job has been
    /// materialized: the dedup/group-key label value. Entries recorded with
    /// no matching descriptor have no such key and cannot be patched by the
    /// job observer (§4.5.2 "drop silently").
    pub fn group_key(&self) -> Option<&str> {
        self.job_info.as_ref().map(|j| j.job_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn alert(name: &str) -> Alert {
        let mut labels = BTreeMap::new();
        labels.insert("alertname".to_string(), name.to_string());
        labels.insert("severity".to_string(), "warn".to_string());
        Alert {
            labels,
            annotations: BTreeMap::new(),
            starts_at: None,
            ends_at: None,
        }
    }

    #[test]
    fn query_matches_alertname_case_insensitively() {
        let entry = AlertStoreEntry::new(alert("DiskFull"), AlertStatus::Firing, Utc::now());
        assert!(entry.matches_query("diskfull"));
        assert!(entry.matches_query("severity:warn"));
        assert!(!entry.matches_query("memoryleak"));
    }

    #[test]
    fn empty_query_matches_everything() {
        let entry = AlertStoreEntry::new(alert("DiskFull"), AlertStatus::Firing, Utc::now());
        assert!(entry.matches_query(""));
    }
}
