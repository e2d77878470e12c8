//! Error types and handling for the synchronization server.
//!
//! None of these errors is fatal to the process: a failing event is logged
//! and dropped, a failing connection only ends that connection, and a failing
//! persistence call never rolls back the in-memory game state.

/// Enumeration of possible server errors.
///
/// Categorizes start-up failures into network and configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid server configuration detected at start-up
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures reported by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or timed out
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the write
    #[error("store rejected write: {0}")]
    Rejected(String),
}

/// Reasons an inbound text frame could not be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("message of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },
}
