//! Error types for the descriptor crate

use thiserror::Error;

/// Errors raised while parsing descriptor identifiers and versions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Application or module id does not end with a version
    #[error("invalid id '{0}': expected <name>-<version>")]
    InvalidId(String),

    /// Version string is not `major.minor.patch[-pre]`
    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    /// Version range expression could not be parsed
    #[error("invalid version range '{range}': {reason}")]
    InvalidRange {
        /// The offending expression
        range: String,
        /// What was wrong with it
        reason: String,
    },
}

/// Result type for descriptor operations
pub type Result<T> = std::result::Result<T, Error>;
