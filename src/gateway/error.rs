#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Query error: {0}")]
    Query(String),
    #[error("Write error: {0}")]
    Write(String),
    #[error("Subscription error: {0}")]
    Subscription(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
