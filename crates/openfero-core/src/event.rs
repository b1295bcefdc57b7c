//! Event payloads fanned out by the Event Broker to push-stream subscribers.
//!
//! Grounded on `odgrim-abathur-swarm::services::event_bus::UnifiedEvent`'s
//! tagged-enum-payload shape, simplified to the fixed set of event types
//! named in spec §4.4 (this system doesn't need the swarm's severity/category
//!/correlation-id envelope, just a typed payload the SSE layer can frame as
//! `event: <type>\ndata: <json>`).

use serde::{Deserialize, Serialize};

use crate::entry::AlertStoreEntry;
use crate::job_info::JobInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    #[serde(rename = "alert:new")]
    AlertNew(AlertStoreEntry),
    #[serde(rename = "alert:updated")]
    AlertUpdated(AlertStoreEntry),
    #[serde(rename = "job:created")]
    JobCreated(JobInfo),
    #[serde(rename = "job:running")]
    JobRunning { descriptor: String, job_name: String },
    #[serde(rename = "job:succeeded")]
    JobSucceeded { descriptor: String, job_name: String },
    #[serde(rename = "job:failed")]
    JobFailed {
        descriptor: String,
        job_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "connected")]
    Connected { message: String },
}

impl Event {
    /// The SSE `event:` field name, matching the exact strings in spec §4.4's
    /// event-type table.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::AlertNew(_) => "alert:new",
            Event::AlertUpdated(_) => "alert:updated",
            Event::JobCreated(_) => "job:created",
            Event::JobRunning { .. } => "job:running",
            Event::JobSucceeded { .. } => "job:succeeded",
            Event::JobFailed { .. } => "job:failed",
            Event::Connected { .. } => "connected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_name_matches_event_table() {
        assert_eq!(Event::Connected { message: "hi".into() }.type_name(), "connected");
        assert_eq!(
            Event::JobFailed {
                descriptor: "d".into(),
                job_name: "j".into(),
                reason: None
            }
            .type_name(),
            "job:failed"
        );
    }
}
