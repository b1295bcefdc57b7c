//! The Descriptor Registry (Component B, §4.2): `match(alertname, status,
//! labels) -> RemediationDescriptor?` over the cached descriptor set, with a
//! strongly-consistent API fallback on cache miss.

use kube::ResourceExt;
use openfero_core::{Alert, AlertStatus, RemediationDescriptor};
use orchestrator_client::{DescriptorCache, OrchestratorClient};
use tracing::instrument;

/// Runs the matching algorithm over an already-fetched descriptor slice:
/// filter by alertname/status/enabled, then by label submap, then sort by
/// priority descending and name ascending, returning the first survivor.
pub fn select<'a>(
    descriptors: &'a [RemediationDescriptor],
    alertname: &str,
    status: AlertStatus,
    labels: &std::collections::BTreeMap<String, String>,
) -> Option<&'a RemediationDescriptor> {
    let mut candidates: Vec<&RemediationDescriptor> = descriptors
        .iter()
        .filter(|d| d.spec.enabled)
        .filter(|d| d.spec.alert_selector.alertname == alertname)
        .filter(|d| d.spec.alert_selector.status == status)
        .filter(|d| {
            d.spec
                .alert_selector
                .labels
                .iter()
                .all(|(k, v)| labels.get(k) == Some(v))
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.spec
            .priority
            .cmp(&a.spec.priority)
            .then_with(|| a.name_any().cmp(&b.name_any()))
    });

    candidates.into_iter().next()
}

/// Matches an alert against the cache, falling back to a single strongly
/// consistent API list on a cache miss (§4.2 "Consistency") — covers the race
/// between a descriptor's creation and an alert's arrival, and the cache
/// trivially being unsynced yet (§4.5.4 "cache not yet synced").
#[instrument(skip(cache, client, alert), fields(alertname = alert.alertname()))]
pub async fn match_alert(
    cache: &DescriptorCache,
    client: &OrchestratorClient,
    alert: &Alert,
    status: AlertStatus,
) -> Option<RemediationDescriptor> {
    let alertname = alert.alertname()?;

    let cached = cache.list();
    if let Some(found) = select(&cached, alertname, status, &alert.labels) {
        return Some(found.clone());
    }

    match client.list_descriptors_from_api().await {
        Ok(fresh) => select(&fresh, alertname, status, &alert.labels).cloned(),
        Err(e) => {
            orchestrator_client::log_and_continue("descriptor api fallback", &e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openfero_core::{AlertSelector, AlertSelectorStatus, JobTemplate, RemediationDescriptorSpec};
    use std::collections::BTreeMap;

    fn descriptor(name: &str, priority: i32, enabled: bool) -> RemediationDescriptor {
        RemediationDescriptor::new(
            name,
            RemediationDescriptorSpec {
                alert_selector: AlertSelector {
                    alertname: "DiskFull".into(),
                    status: AlertSelectorStatus::Firing,
                    labels: BTreeMap::new(),
                },
                job_template: JobTemplate::default(),
                enabled,
                priority,
                dedup: None,
            },
        )
    }

    #[test]
    fn picks_highest_priority_match() {
        let descriptors = vec![descriptor("low", 5, true), descriptor("high", 10, true)];
        let labels = BTreeMap::new();
        let picked = select(&descriptors, "DiskFull", AlertStatus::Firing, &labels).unwrap();
        assert_eq!(picked.name_any(), "high");
    }

    #[test]
    fn ties_break_by_name_ascending() {
        let descriptors = vec![descriptor("zeta", 5, true), descriptor("alpha", 5, true)];
        let labels = BTreeMap::new();
        let picked = select(&descriptors, "DiskFull", AlertStatus::Firing, &labels).unwrap();
        assert_eq!(picked.name_any(), "alpha");
    }

    #[test]
    fn disabled_descriptor_is_treated_as_no_match() {
        let descriptors = vec![descriptor("only", 5, false)];
        let labels = BTreeMap::new();
        assert!(select(&descriptors, "DiskFull", AlertStatus::Firing, &labels).is_none());
    }

    #[test]
    fn label_submap_must_be_satisfied() {
        let mut d = descriptor("labeled", 5, true);
        d.spec.alert_selector.labels.insert("region".into(), "eu".into());
        let descriptors = vec![d];

        let mut labels = BTreeMap::new();
        labels.insert("region".to_string(), "us".to_string());
        assert!(select(&descriptors, "DiskFull", AlertStatus::Firing, &labels).is_none());

        labels.insert("region".to_string(), "eu".to_string());
        assert!(select(&descriptors, "DiskFull", AlertStatus::Firing, &labels).is_some());
    }
}
