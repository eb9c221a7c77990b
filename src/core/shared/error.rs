use crate::gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Invalid change payload: {0}")]
    Payload(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
