//! `JobInfo`: the sidecar view of a dispatched job attached to a stored
//! alert once a job has been materialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-known execution status of a dispatched job. `Unknown` is the
/// transient observability gap tolerated between watch events (§4.5.3); it is
/// never a permanent resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum JobPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl JobPhase {
    /// Terminal phases are absorbing: once reached, `JobInfo::status` must
    /// never revert (§3 invariants).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Succeeded | JobPhase::Failed)
    }

    /// Whether `self -> next` is a legal forward transition in
    /// `Pending -> Running -> {Succeeded, Failed}`, with `Unknown` allowed as
    /// a transient detour from any non-terminal state and terminal states
    /// never leaving themselves.
    pub fn can_transition_to(&self, next: JobPhase) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        match (*self, next) {
            (a, b) if a == b => true,
            (JobPhase::Pending, JobPhase::Running) => true,
            (JobPhase::Pending, JobPhase::Succeeded) => true,
            (JobPhase::Pending, JobPhase::Failed) => true,
            (JobPhase::Running, JobPhase::Succeeded) => true,
            (JobPhase::Running, JobPhase::Failed) => true,
            (_, JobPhase::Unknown) => true,
            (JobPhase::Unknown, _) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobPhase::Pending => "Pending",
            JobPhase::Running => "Running",
            JobPhase::Succeeded => "Succeeded",
            JobPhase::Failed => "Failed",
            JobPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub descriptor_name: String,
    pub job_name: String,
    pub namespace: String,
    pub image: String,
    pub execution_count: u64,
    pub last_execution_time: DateTime<Utc>,
    pub last_executed_job_name: String,
    pub status: JobPhase,
}

impl JobInfo {
    /// Applies a phase observation, enforcing the monotonicity invariant via
    /// `JobPhase::can_transition_to`: a `JobInfo` that already reached a
    /// terminal phase never reverts, and non-terminal states never jump
    /// backward (e.g. `Running -> Pending`). Returns `true` if the phase
    /// actually changed (the caller uses this to decide whether to publish a
    /// `job:<phase>` event).
    pub fn apply_phase(&mut self, observed: JobPhase) -> bool {
        if self.status == observed || !self.status.can_transition_to(observed) {
            return false;
        }
        self.status = observed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(status: JobPhase) -> JobInfo {
        JobInfo {
            descriptor_name: "d".into(),
            job_name: "j".into(),
            namespace: "ns".into(),
            image: "img".into(),
            execution_count: 1,
            last_execution_time: Utc::now(),
            last_executed_job_name: "j".into(),
            status,
        }
    }

    #[test]
    fn terminal_states_never_revert() {
        let mut i = info(JobPhase::Succeeded);
        assert!(!i.apply_phase(JobPhase::Running));
        assert_eq!(i.status, JobPhase::Succeeded);

        let mut f = info(JobPhase::Failed);
        assert!(!f.apply_phase(JobPhase::Pending));
        assert_eq!(f.status, JobPhase::Failed);
    }

    #[test]
    fn forward_transitions_apply() {
        let mut i = info(JobPhase::Pending);
        assert!(i.apply_phase(JobPhase::Running));
        assert_eq!(i.status, JobPhase::Running);
        assert!(i.apply_phase(JobPhase::Succeeded));
        assert_eq!(i.status, JobPhase::Succeeded);
    }

    #[test]
    fn no_back_edges_from_running_to_pending() {
        assert!(!JobPhase::Running.can_transition_to(JobPhase::Pending));
        assert!(JobPhase::Pending.can_transition_to(JobPhase::Running));
    }

    #[test]
    fn apply_phase_rejects_back_edge() {
        let mut r = info(JobPhase::Running);
        assert!(!r.apply_phase(JobPhase::Pending));
        assert_eq!(r.status, JobPhase::Running);
    }

    #[test]
    fn apply_phase_allows_unknown_as_transient_detour() {
        let mut p = info(JobPhase::Pending);
        assert!(p.apply_phase(JobPhase::Unknown));
        assert!(p.apply_phase(JobPhase::Running));
    }
}
