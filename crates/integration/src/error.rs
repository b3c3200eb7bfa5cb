//! Error types for calls to external systems.
//!
//! Every failure is classified as transient or permanent so the retry
//! policy never has to inspect error messages.

use std::fmt;
use thiserror::Error;

/// Systems an entitlement talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSystem {
    ModuleManager,
    Gateway,
    AuthResources,
    /// Token endpoints of the identity provider
    IdentityProvider,
    EventBus,
}

impl TargetSystem {
    /// Whether an HTTP status from this system is worth retrying
    ///
    /// The identity provider answers token races with 4xx, so every
    /// status >= 400 from it is transient; other systems only retry 5xx.
    pub fn is_transient_status(&self, status: u16) -> bool {
        match self {
            Self::IdentityProvider => status >= 400,
            _ => status >= 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModuleManager => "module manager",
            Self::Gateway => "gateway",
            Self::AuthResources => "auth resources",
            Self::IdentityProvider => "identity provider",
            Self::EventBus => "event bus",
        }
    }
}

impl fmt::Display for TargetSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of integration errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Retried per policy, surfaced after exhaustion
    Transient,
    /// Surfaced immediately
    Permanent,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Temporary failure of a remote system",
            Self::Permanent => "Request rejected by a remote system",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient => "Retry the request once the remote system is healthy",
            Self::Permanent => "Fix the request or the remote state and try again",
        }
    }
}

/// Errors returned by integration ports
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Remote system answered with an error status
    #[error("{system} returned HTTP {status}: {message}")]
    Http {
        system: TargetSystem,
        status: u16,
        message: String,
    },

    /// Remote system could not be reached
    #[error("{system} unreachable: {message}")]
    Connection { system: TargetSystem, message: String },

    /// Remote system refused the request for a non-HTTP reason
    #[error("{system} rejected request: {message}")]
    Rejected { system: TargetSystem, message: String },

    /// Requested entity does not exist
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Malformed payload
    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn http(system: TargetSystem, status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            system,
            status,
            message: message.into(),
        }
    }

    pub fn connection(system: TargetSystem, message: impl Into<String>) -> Self {
        Self::Connection {
            system,
            message: message.into(),
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http { system, status, .. } if system.is_transient_status(*status) => {
                ErrorCategory::Transient
            }
            Self::Connection { .. } => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }

    /// System the error came from, if any
    pub fn system(&self) -> Option<TargetSystem> {
        match self {
            Self::Http { system, .. }
            | Self::Connection { system, .. }
            | Self::Rejected { system, .. } => Some(*system),
            _ => None,
        }
    }
}

impl stageflow::Retryable for Error {
    fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Payload(e.to_string())
    }
}

impl From<descriptor::Error> for Error {
    fn from(e: descriptor::Error) -> Self {
        Self::Payload(e.to_string())
    }
}

/// Result type for integration operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use stageflow::Retryable;

    #[test]
    fn test_transient_status_per_system() {
        assert!(TargetSystem::Gateway.is_transient_status(503));
        assert!(!TargetSystem::Gateway.is_transient_status(409));
        assert!(TargetSystem::IdentityProvider.is_transient_status(401));
        assert!(!TargetSystem::IdentityProvider.is_transient_status(302));
    }

    #[test]
    fn test_category() {
        assert_eq!(
            Error::http(TargetSystem::ModuleManager, 502, "bad gateway").category(),
            ErrorCategory::Transient
        );
        assert_eq!(
            Error::http(TargetSystem::ModuleManager, 404, "missing").category(),
            ErrorCategory::Permanent
        );
        assert!(Error::connection(TargetSystem::EventBus, "refused").is_retryable());
        assert!(!Error::NotFound { what: "app".into() }.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = Error::http(TargetSystem::Gateway, 500, "boom");
        assert_eq!(err.to_string(), "gateway returned HTTP 500: boom");
        assert_eq!(err.system(), Some(TargetSystem::Gateway));
    }
}
