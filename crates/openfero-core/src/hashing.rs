//! Deterministic hashing helpers shared by dedup-key computation (Dispatcher)
//! and entry-id computation (Alert Store), so both land on the same digest
//! algorithm — required for the replicated backend, where peers on different
//! processes must compute identical ids for the same logical entry.

use sha2::{Digest, Sha256};

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn sha256_base36(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    base_x::encode(BASE36_ALPHABET, &digest)
}

/// Dedup key: `hash(groupKey)` truncated to 63 base36 characters, the limit
/// for a Kubernetes label value (§4.5.1 step 3).
pub fn dedup_key(group_key: &str) -> String {
    let full = sha256_base36(group_key);
    full.chars().take(63).collect()
}

/// Entry-id: `hash(groupKey ∥ alertname ∥ startsAt)` (§4.3.2), used to
/// address a logical `AlertStoreEntry` across replicas. `starts_at` is
/// formatted RFC 3339, or the literal string `"none"` when absent, so two
/// alerts in the same group distinguished only by firing time never collide.
pub fn entry_id(group_key: &str, alertname: &str, starts_at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    let starts_at_str = starts_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "none".to_string());
    let input = format!("{group_key}\u{1f}{alertname}\u{1f}{starts_at_str}");
    sha256_base36(&input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_is_deterministic_and_bounded() {
        let a = dedup_key("g-1");
        let b = dedup_key("g-1");
        assert_eq!(a, b);
        assert!(a.len() <= 63);
        assert_ne!(a, dedup_key("g-2"));
    }

    #[test]
    fn entry_id_distinguishes_by_starts_at() {
        let t1 = chrono::Utc::now();
        let t2 = t1 + chrono::Duration::seconds(1);
        let id1 = entry_id("g-1", "DiskFull", Some(t1));
        let id2 = entry_id("g-1", "DiskFull", Some(t2));
        assert_ne!(id1, id2);
    }

    #[test]
    fn entry_id_is_stable_across_calls() {
        let id1 = entry_id("g-1", "DiskFull", None);
        let id2 = entry_id("g-1", "DiskFull", None);
        assert_eq!(id1, id2);
    }
}
