use thiserror::Error;

/// Client-caused problems with a write or read request. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid session parameter")]
    SessionCode,
    #[error("Invalid key parameter")]
    Key,
    #[error("Invalid value")]
    Value,
    #[error("Invalid snapshot key {0:?}")]
    SnapshotKey(String),
    #[error("Unknown station {0:?}; expected 1, 2, 3, 4 or final")]
    Station(String),
}
