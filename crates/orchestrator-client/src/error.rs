use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("orchestrator API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("timed out waiting for cache sync after {0:?}")]
    CacheSyncTimeout(std::time::Duration),

    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(String),
}
