//! Common error types for ASCR

use std::fmt;
use thiserror::Error;

/// Common result type for ASCR operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification
///
/// Upstream layers map these onto responses without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing to act on
    NotFound,
    /// Create collided with an existing record
    AlreadyExists,
    /// Destination occupied during a transfer
    Conflict,
    /// Document or name rejected before any write
    Validation,
    /// Underlying I/O, database or transport trouble
    Storage,
    /// First effect of a multi-step operation committed, a later one failed
    PartialCommit,
    /// Configuration loading or validation
    Config,
    /// Internal invariant broken
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
            ErrorKind::PartialCommit => "partial_commit",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Common error types across ASCR crates
#[derive(Error, Debug)]
pub enum Error {
    /// Target absent in the addressed location
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create collision
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Destination occupied during a transfer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Document missing its identifying field, or an unusable name
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error (curation pipeline, event relay)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A transfer committed `committed` and then failed
    #[error("Partial commit after {committed}: {source}")]
    PartialCommit {
        committed: String,
        #[source]
        source: Box<Error>,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Database(_) | Error::Io(_) | Error::Serialization(_) | Error::Http(_) => {
                ErrorKind::Storage
            }
            Error::PartialCommit { .. } => ErrorKind::PartialCommit,
            Error::Config(_) => ErrorKind::Config,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn partial_commit(committed: impl Into<String>, source: Error) -> Self {
        Error::PartialCommit {
            committed: committed.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::AlreadyExists("x".into()).kind(), ErrorKind::AlreadyExists);
        assert_eq!(Error::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(Error::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Config);

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(Error::from(io).kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_partial_commit_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::partial_commit("created TestCell001_v0 in ready", Error::Io(io));

        assert_eq!(err.kind(), ErrorKind::PartialCommit);
        let msg = err.to_string();
        assert!(msg.contains("TestCell001_v0"));
        assert!(msg.contains("disk gone"));

        let source = err.source().expect("source should be preserved");
        assert!(source.to_string().contains("disk gone"));
    }

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::PartialCommit.as_str(), "partial_commit");
        assert_eq!(format!("{}", ErrorKind::Storage), "storage");
    }
}
