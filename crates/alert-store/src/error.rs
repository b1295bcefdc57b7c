use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("alert store entry '{0}' not found")]
    NotFound(String),

    #[error("alert store is not initialized")]
    NotInitialized,

    #[error("gossip membership error: {0}")]
    Gossip(String),
}
