//! Error types for entitlement planning and execution.

use crate::interfaces::IntegrityViolation;
use thiserror::Error;

/// Where an error sits in the failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any side effect; the caller can fix the request
    Validation,
    /// Remote failure that outlived the retry policy
    TransientIntegration,
    /// Remote rejection that is never retried
    PermanentIntegration,
    /// Planning bug or broken setup
    InternalInvariant,
}

impl ErrorKind {
    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Request rejected",
            Self::TransientIntegration => "Remote system temporarily unavailable",
            Self::PermanentIntegration => "Remote system refused the change",
            Self::InternalInvariant => "Internal error",
        }
    }

    /// Get actionable advice for resolving this error kind.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Validation => "Correct the requested applications and try again",
            Self::TransientIntegration => "Wait for the remote system to recover and retry",
            Self::PermanentIntegration => "Inspect the failed stage and fix the remote state",
            Self::InternalInvariant => "Report this as a bug with the request details",
        }
    }
}

/// Errors raised by the orchestration core
#[derive(Debug, Error)]
pub enum Error {
    /// Applications depend on each other in a loop
    #[error("circular dependency: {chain}")]
    CircularDependency { chain: String },

    /// A declared dependency has no descriptor in scope
    #[error("descriptor not found for dependency {name} (required by {required_by})")]
    DependencyNotFound { name: String, required_by: String },

    #[error("descriptor not found: {id}")]
    DescriptorNotFound { id: String },

    /// Required interfaces without a compatible provider
    #[error("interface integrity violated: {}", format_violations(.0))]
    InterfaceIntegrity(Vec<IntegrityViolation>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// Inconsistent input handed to a planning step
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    /// Enabled integration without an implementation, or similar
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Integration(#[from] integration::Error),

    #[error(transparent)]
    Descriptor(#[from] descriptor::Error),

    /// The execution engine could not run the flow
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CircularDependency { .. }
            | Self::DependencyNotFound { .. }
            | Self::DescriptorNotFound { .. }
            | Self::InterfaceIntegrity(_)
            | Self::InvalidRequest(_)
            | Self::UnknownRequest(_)
            | Self::Descriptor(_) => ErrorKind::Validation,
            Self::Integration(e) if e.category().is_retryable() => ErrorKind::TransientIntegration,
            Self::Integration(integration::Error::NotFound { .. }) => ErrorKind::Validation,
            Self::Integration(_) => ErrorKind::PermanentIntegration,
            Self::Invariant(_) | Self::Configuration(_) | Self::Engine(_) => {
                ErrorKind::InternalInvariant
            }
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

fn format_violations(violations: &[IntegrityViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for entitlement operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use descriptor::InterfaceReference;
    use integration::TargetSystem;

    #[test]
    fn test_kind() {
        assert_eq!(
            Error::CircularDependency { chain: "a <- b <- a".into() }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::from(integration::Error::http(TargetSystem::Gateway, 503, "down")).kind(),
            ErrorKind::TransientIntegration
        );
        assert_eq!(
            Error::from(integration::Error::http(TargetSystem::Gateway, 409, "conflict")).kind(),
            ErrorKind::PermanentIntegration
        );
        assert_eq!(Error::Invariant("x".into()).kind(), ErrorKind::InternalInvariant);
    }

    #[test]
    fn test_integrity_message_lists_violations() {
        let err = Error::InterfaceIntegrity(vec![IntegrityViolation {
            application_id: "app-a-1.0.0".into(),
            interface: InterfaceReference::new("foo", "1.0"),
        }]);
        assert_eq!(
            err.to_string(),
            "interface integrity violated: app-a-1.0.0 requires foo 1.0"
        );
    }
}
