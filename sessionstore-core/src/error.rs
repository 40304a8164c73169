//! Unified error handling system
//!
//! Provider operations report a specific [`SessionError`]. The session manager
//! folds every load failure into a single [`LoadError`] type while keeping the
//! provider error reachable through [`std::error::Error::source`].

use thiserror::Error;
use tracing::{error, warn};

pub type SessionResult<T> = Result<T, SessionError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error surfaced by every storage provider, regardless of backend
#[derive(Error, Debug)]
pub enum SessionError {
    /// Lookup miss, or the record was already evicted or swept
    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    /// The session payload could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Backend-level failure: connection, query or I/O
    #[error("Storage error ({backend}): {message}")]
    Storage {
        backend: &'static str,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        field: Option<String>,
    },
}

impl SessionError {
    /// Create a not found error for the given session id
    pub fn not_found<S: Into<String>>(session_id: S) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }

    /// Create a serialization error with its underlying cause
    pub fn serialization<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a storage error with its underlying cause
    pub fn storage<S, E>(backend: &'static str, message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            backend,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a storage error that has no underlying cause
    pub fn storage_message<S: Into<String>>(backend: &'static str, message: S) -> Self {
        Self::Storage {
            backend,
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error for a specific field
    pub fn config<S: Into<String>>(message: S, field: Option<&str>) -> Self {
        Self::Config {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage { .. } => true,
            Self::NotFound { .. } => false,
            Self::Serialization { .. } => false,
            Self::Config { .. } => false,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            Self::NotFound { session_id } => {
                tracing::debug!(session_id = %session_id, "Session lookup missed");
            }
            Self::Storage { backend, .. } => {
                warn!(backend = backend, error = %self, "Storage backend error (may be recoverable)");
            }
            Self::Serialization { .. } | Self::Config { .. } => {
                error!(error = %self, "Session error occurred");
            }
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("failed to encode or decode session payload", err)
    }
}

/// Why a manager-level load did not produce a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorReason {
    /// No token was supplied, or it was empty once the prefix was stripped.
    /// The provider was never consulted.
    MissingToken,
    /// The provider failed the read; see [`LoadError::provider_error`].
    Provider,
}

/// Manager-level umbrella error for `load` and `load_from_token`
///
/// Every cause displays the same way, so callers can treat any `LoadError` as
/// "no session". The provider error is kept as the error source for callers
/// that need to tell a miss apart from a backend outage.
#[derive(Error, Debug)]
#[error("session load error")]
pub struct LoadError {
    reason: LoadErrorReason,
    #[source]
    source: Option<SessionError>,
}

impl LoadError {
    pub fn missing_token() -> Self {
        Self {
            reason: LoadErrorReason::MissingToken,
            source: None,
        }
    }

    pub fn reason(&self) -> LoadErrorReason {
        self.reason
    }

    /// The provider error behind this failure, if the provider was reached
    pub fn provider_error(&self) -> Option<&SessionError> {
        self.source.as_ref()
    }

    /// True when the provider reported the session as absent
    pub fn is_not_found(&self) -> bool {
        self.source.as_ref().is_some_and(SessionError::is_not_found)
    }
}

impl From<SessionError> for LoadError {
    fn from(err: SessionError) -> Self {
        Self {
            reason: LoadErrorReason::Provider,
            source: Some(err),
        }
    }
}
