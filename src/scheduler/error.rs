//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
///
/// Fetch failures are not errors at this level: they are recorded against
/// the source and reported as `Ok(false)`.
#[derive(Debug)]
pub enum SchedulerError {
    /// No source is registered under this id
    UnknownSource { id: String },

    /// An operation was called before `initialize()`
    NotInitialized,

    /// `initialize()` was called twice
    AlreadyInitialized,

    /// The source registry could not be loaded or is inconsistent
    RegistryLoad { reason: String },

    /// Invalid scheduler configuration
    Config { field: String, reason: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSource { id } => write!(f, "Unknown source: '{}'", id),
            Self::NotInitialized => write!(f, "Scheduler is not initialized"),
            Self::AlreadyInitialized => write!(f, "Scheduler is already initialized"),
            Self::RegistryLoad { reason } => {
                write!(f, "Failed to load source registry: {}", reason)
            }
            Self::Config { field, reason } => {
                write!(f, "Scheduler config error in '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an unknown source error
    pub fn unknown_source(id: impl Into<String>) -> Self {
        Self::UnknownSource { id: id.into() }
    }

    /// Create a registry load error
    pub fn registry(reason: impl Into<String>) -> Self {
        Self::RegistryLoad {
            reason: reason.into(),
        }
    }

    /// Create a config error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    ///
    /// Only a failed registry load can succeed on a later attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RegistryLoad { .. })
    }
}
