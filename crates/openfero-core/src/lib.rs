//! Shared data model for OpenFero.
//!
//! This crate carries the types every other OpenFero crate depends on:
//! webhook wire types (`alert`), the `RemediationDescriptor` custom resource
//! (`descriptor`), the dispatched-job sidecar view (`job_info`), the alert
//! history unit (`entry`), broker event payloads (`event`), and name
//! sanitization helpers (`sanitize`) shared between the Dispatcher and the
//! Alert Store.

pub mod alert;
pub mod descriptor;
pub mod entry;
pub mod event;
pub mod hashing;
pub mod job_info;
pub mod sanitize;

pub use alert::{Alert, AlertStatus, HookMessage};
pub use descriptor::{
    AlertSelector, AlertSelectorStatus, ConditionStatus, DedupConfig, JobTemplate,
    RemediationDescriptor, RemediationDescriptorSpec, RemediationDescriptorStatus,
    StatusCondition,
};
pub use entry::AlertStoreEntry;
pub use event::Event;
pub use job_info::{JobInfo, JobPhase};
