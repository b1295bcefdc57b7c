use thiserror::Error;

/// Dispatcher-local error kinds, reserved for failures that stop processing
/// *this* alert outright. Most of §4.5.4's failure table is handled inline
/// (logged and continued) rather than surfaced as an `Error`, since a worker
/// task's failure must never propagate back to the webhook caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("alert is missing the required 'alertname' label")]
    MissingAlertname,

    #[error("orchestrator API error: {0}")]
    Orchestrator(#[from] orchestrator_client::Error),

    #[error("alert store error: {0}")]
    AlertStore(#[from] alert_store::Error),
}
