//! Unified error handling
//!
//! Every fallible operation in keyward returns [`KeywardResult`]. The variants
//! follow the authentication taxonomy: token failures, authorization failures,
//! lookups that found nothing and startup configuration problems.

use thiserror::Error;
use tracing::{debug, error, warn};

pub type KeywardResult<T> = Result<T, KeywardError>;

/// Main error type for the keyward system
#[derive(Error, Debug)]
pub enum KeywardError {
    /// Malformed, unverifiable or expired credential
    #[error("Invalid token: {message}")]
    InvalidToken { message: String },

    /// No credential, or a valid credential without the required permission
    #[error("Unauthorized")]
    Unauthorized,

    /// Cache miss, or an absent user or role
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Missing keys, unsupported codec or algorithm
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Failure reported by an external collaborator (role store, user loader)
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KeywardError {
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn store<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KeywardError::NotFound { .. })
    }

    /// A `NotFound` is expected control flow (cache miss); nothing else is.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeywardError::NotFound { .. })
    }

    /// Whether the error must be hidden behind a plain 401 at the HTTP boundary
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            KeywardError::InvalidToken { .. }
                | KeywardError::Unauthorized
                | KeywardError::InvalidCredentials
        )
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            KeywardError::NotFound { .. } => {
                debug!(error = %self, "Lookup missed");
            }
            KeywardError::InvalidToken { .. }
            | KeywardError::Unauthorized
            | KeywardError::InvalidCredentials
            | KeywardError::Validation { .. } => {
                warn!(error = %self, "Request rejected");
            }
            KeywardError::InvalidConfiguration { .. } => {
                error!(error = %self, "Configuration error");
            }
            _ => {
                error!(error = %self, "Error occurred");
            }
        }
    }
}
