//! In-process Alert Store backend: a fixed-capacity ring buffer guarded by a
//! single `RwLock`, for single-replica deployments (§4.3.1).

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use openfero_core::{Alert, AlertStatus, AlertStoreEntry, JobInfo};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{AlertStore, EntryId, Error, JobInfoPatch};

/// Default ring buffer capacity (§4.3.1).
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded, in-memory Alert Store. Once `capacity` is reached, inserting a
/// new entry evicts the oldest in O(1) (a `VecDeque::pop_front`).
pub struct LocalStore {
    capacity: usize,
    entries: RwLock<VecDeque<(EntryId, AlertStoreEntry)>>,
}

impl LocalStore {
    pub fn new(capacity: usize) -> Self {
        LocalStore {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    async fn insert(&self, id: EntryId, entry: AlertStoreEntry) {
        let mut guard = self.entries.write().await;
        if guard.len() >= self.capacity {
            let evicted = guard.pop_front();
            if let Some((evicted_id, _)) = evicted {
                debug!(entry_id = %evicted_id, "evicting oldest alert store entry at capacity");
            }
        }
        guard.push_back((id, entry));
    }

    /// Inserts an entry already addressed by an `EntryId` computed elsewhere
    /// (a replayed gossip op). Skips the insert if the id is already
    /// present, since replay is not guaranteed exactly-once.
    pub(crate) async fn insert_replicated(&self, id: EntryId, entry: AlertStoreEntry) {
        let mut guard = self.entries.write().await;
        if guard.iter().any(|(existing, _)| existing == &id) {
            return;
        }
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back((id, entry));
    }

    /// All entry ids whose `JobInfo.job_name` matches `job_name`.
    pub(crate) async fn entry_ids_for_job(&self, job_name: &str) -> Vec<EntryId> {
        let guard = self.entries.read().await;
        guard
            .iter()
            .filter(|(_, entry)| {
                entry
                    .job_info
                    .as_ref()
                    .is_some_and(|info| info.job_name == job_name)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        LocalStore::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl AlertStore for LocalStore {
    async fn initialize(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn save_alert(
        &self,
        group_key: &str,
        alert: Alert,
        status: AlertStatus,
    ) -> Result<EntryId, Error> {
        let id = EntryId::compute(group_key, &alert);
        let entry = AlertStoreEntry::new(alert, status, Utc::now());
        self.insert(id.clone(), entry).await;
        Ok(id)
    }

    async fn save_alert_with_job_info(
        &self,
        group_key: &str,
        alert: Alert,
        status: AlertStatus,
        job_info: JobInfo,
    ) -> Result<EntryId, Error> {
        let id = EntryId::compute(group_key, &alert);
        let mut entry = AlertStoreEntry::new(alert, status, Utc::now());
        entry.job_info = Some(job_info);
        self.insert(id.clone(), entry).await;
        Ok(id)
    }

    async fn attach_job_info(&self, id: &EntryId, job_info: JobInfo) -> Result<(), Error> {
        let mut guard = self.entries.write().await;
        let (_, entry) = guard
            .iter_mut()
            .find(|(entry_id, _)| entry_id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.job_info = Some(job_info);
        Ok(())
    }

    async fn patch_job_info(&self, id: &EntryId, patch: JobInfoPatch) -> Result<(), Error> {
        let mut guard = self.entries.write().await;
        let (_, entry) = guard
            .iter_mut()
            .find(|(entry_id, _)| entry_id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        match &mut entry.job_info {
            Some(info) => {
                patch.apply_to(info);
                Ok(())
            }
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    async fn patch_job_info_by_job_name(
        &self,
        job_name: &str,
        patch: JobInfoPatch,
    ) -> Result<usize, Error> {
        let mut guard = self.entries.write().await;
        let mut updated = 0;
        for (_, entry) in guard.iter_mut() {
            if let Some(info) = &mut entry.job_info {
                if info.job_name == job_name && patch.apply_to(info) {
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn get_alerts(&self, query: &str, limit: usize) -> Vec<AlertStoreEntry> {
        let guard = self.entries.read().await;
        let mut matches: Vec<AlertStoreEntry> = guard
            .iter()
            .rev()
            .filter(|(_, entry)| entry.matches_query(query))
            .map(|(_, entry)| entry.clone())
            .collect();
        if limit > 0 {
            matches.truncate(limit);
        }
        matches
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use openfero_core::JobPhase;

    fn alert(name: &str) -> Alert {
        let mut labels = BTreeMap::new();
        labels.insert("alertname".to_string(), name.to_string());
        Alert {
            labels,
            annotations: BTreeMap::new(),
            starts_at: None,
            ends_at: None,
        }
    }

    fn job_info(job_name: &str) -> JobInfo {
        JobInfo {
            descriptor_name: "heal-disk".into(),
            job_name: job_name.into(),
            namespace: "default".into(),
            image: "img".into(),
            execution_count: 1,
            last_execution_time: Utc::now(),
            last_executed_job_name: job_name.into(),
            status: JobPhase::Pending,
        }
    }

    #[tokio::test]
    async fn evicts_oldest_at_capacity() {
        let store = LocalStore::new(2);
        store
            .save_alert("g1", alert("A"), AlertStatus::Firing)
            .await
            .unwrap();
        store
            .save_alert("g2", alert("B"), AlertStatus::Firing)
            .await
            .unwrap();
        store
            .save_alert("g3", alert("C"), AlertStatus::Firing)
            .await
            .unwrap();

        let all = store.get_alerts("", 0).await;
        assert_eq!(all.len(), 2);
        assert!(!all.iter().any(|e| e.alert.alertname() == Some("A")));
    }

    #[tokio::test]
    async fn patch_by_job_name_updates_all_sharing_entries() {
        let store = LocalStore::new(10);
        let info = job_info("job-xyz");
        store
            .save_alert_with_job_info("g1", alert("DiskFull"), AlertStatus::Firing, info.clone())
            .await
            .unwrap();
        store
            .save_alert_with_job_info("g1", alert("DiskFull"), AlertStatus::Firing, info)
            .await
            .unwrap();

        let updated = store
            .patch_job_info_by_job_name("job-xyz", JobInfoPatch::phase(JobPhase::Running))
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let all = store.get_alerts("", 0).await;
        assert!(all
            .iter()
            .all(|e| e.job_info.as_ref().unwrap().status == JobPhase::Running));
    }

    #[tokio::test]
    async fn patch_unknown_entry_id_errors() {
        let store = LocalStore::new(10);
        let bogus = EntryId("does-not-exist".into());
        let result = store
            .patch_job_info(&bogus, JobInfoPatch::phase(JobPhase::Running))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
