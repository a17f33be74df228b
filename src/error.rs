//! Crate-level error type
//!
//! Fetch failures never leave the scheduler as errors; they end up in a
//! source's `last_error`. What does surface to callers is collected here:
//! scheduler misuse, registry and config problems, and the I/O and
//! deserialization errors behind them. Every error can say whether trying
//! again may help and which part of the system it came from.
//!
//! ```rust,ignore
//! use newsloom::error::{Error, NewsloomErrorTrait};
//!
//! match scheduler.fetch_source("hn", true).await.map_err(Error::from) {
//!     Err(e) if e.is_recoverable() => tracing::warn!(category = %e.category(), "{e}"),
//!     Err(e) => return Err(e),
//!     Ok(_) => {}
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::FetchError;

/// Recoverability and origin of an error
pub trait NewsloomErrorTrait: std::error::Error {
    /// Whether repeating the operation may succeed
    fn is_recoverable(&self) -> bool;

    /// Part of the system the error belongs to
    fn category(&self) -> ErrorCategory;
}

/// Where an error originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Upstream connections, HTTP status, proxies, deadlines
    Network,
    /// Feed, JSON or HTML content that could not be turned into items
    Parsing,
    /// Local files
    Storage,
    /// Settings and source definitions
    Config,
    /// Source registry contents
    Registry,
    /// Scheduler lifecycle
    Scheduler,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Registry => "registry",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any error the public API can return
#[derive(Error, Debug)]
pub enum Error {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Missing or inconsistent settings
    #[error("Config error: {0}")]
    Config(String),

    /// Anything reported through `anyhow`, flattened with its context chain
    #[error("{0}")]
    Other(String),
}

impl NewsloomErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        FetchError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse(_) => ErrorCategory::Parsing,
            Self::UnsupportedAdapter(_) | Self::InvalidUrl(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
            Self::Http(_)
            | Self::Status(_)
            | Self::Timeout(_)
            | Self::ProxyUnavailable
            | Self::Proxy(_) => ErrorCategory::Network,
        }
    }
}

impl NewsloomErrorTrait for SchedulerError {
    fn is_recoverable(&self) -> bool {
        SchedulerError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::Config,
            Self::RegistryLoad { .. } | Self::UnknownSource { .. } => ErrorCategory::Registry,
            Self::NotInitialized | Self::AlreadyInitialized => ErrorCategory::Scheduler,
        }
    }
}

impl NewsloomErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => NewsloomErrorTrait::is_recoverable(e),
            Self::Scheduler(e) => NewsloomErrorTrait::is_recoverable(e),
            // A sources file being rewritten may be readable on the next try
            Self::Io(_) => true,
            Self::Json(_) | Self::Toml(_) | Self::Config(_) | Self::Other(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Scheduler(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Toml(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
