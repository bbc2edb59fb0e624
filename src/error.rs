use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A provider call failed in a way that is expected to clear on retry.
    TransientProvider(String),
    /// A cache or persistence backend could not be reached.
    BackendUnavailable(String),
    /// Cooperative cancellation was requested for the running execution.
    TaskCancelled(String),
    /// A persisted Running row went stale past the staleness threshold.
    ZombieTimeout(String),
    StorageError(String),
    ConfigurationError(String),
    ValidationError(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::TransientProvider(msg) => write!(f, "Transient provider error: {msg}"),
            CoreError::BackendUnavailable(msg) => write!(f, "Backend unavailable: {msg}"),
            CoreError::TaskCancelled(msg) => write!(f, "Task cancelled: {msg}"),
            CoreError::ZombieTimeout(msg) => write!(f, "Zombie timeout: {msg}"),
            CoreError::StorageError(msg) => write!(f, "Storage error: {msg}"),
            CoreError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            CoreError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl CoreError {
    /// True when the error is the cooperative cancellation signal raised by
    /// progress updates. Handlers use this to tell an abort apart from a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CoreError::TaskCancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
