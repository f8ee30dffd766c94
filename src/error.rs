// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for Quarry
///
/// Every fatal kind maps to a distinct process exit code (see
/// [`Error::exit_code`]) so scripted callers can tell failure classes apart.
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0} (run 'quarry init' first)")]
    DatabaseNotFound(String),

    /// Another invocation holds the database lock
    #[error("Database is locked by another process: {0}")]
    DatabaseLocked(String),

    /// Local package file does not exist
    #[error("Package file not found: {}", .0.display())]
    LocalNotFound(PathBuf),

    /// Local package file exists but cannot be read
    #[error("Permission denied reading package file: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Remote artifact answered 404-class
    #[error("Remote package not found: {0}")]
    RemoteNotFound(String),

    /// Remote fetch failed for a reason other than not-found
    #[error("Failed to download {url}: {reason}")]
    RemoteTransport { url: String, reason: String },

    /// Fetched bytes are not a parseable package
    #[error("Not a valid package ({origin}): {reason}")]
    ArtifactCorrupt { origin: String, reason: String },

    /// Package name not present in any enabled repository
    #[error("No package '{0}' available in the enabled repositories")]
    NoSuchPackage(String),

    /// Downloaded artifact does not match its published checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Repository metadata carries no checksum and gpgcheck is active
    #[error("No checksum published for '{0}' (pass --nogpgcheck to proceed)")]
    MissingChecksum(String),

    /// Applying a transaction entry failed
    #[error("Failed to apply {package}: {reason}")]
    ApplyFailed { package: String, reason: String },

    /// Repository metadata could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Named entity (repository, package) not found in the database
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Named entity already exists
    #[error("Conflict: {0}")]
    ConflictError(String),
}

impl Error {
    /// Map this error to the process exit code documented for its kind.
    ///
    /// The codes are stable interface: 1622 ("remote artifact not found")
    /// is relied on by callers distinguishing a missing remote package from
    /// transport trouble. Everything not listed falls back to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::LocalNotFound(_) => 1601,
            Error::PermissionDenied(_) => 1602,
            Error::RemoteNotFound(_) => 1622,
            Error::RemoteTransport { .. } => 1623,
            Error::ArtifactCorrupt { .. } => 1631,
            Error::NoSuchPackage(_) => 1641,
            Error::DatabaseLocked(_) => 1651,
            Error::ApplyFailed { .. } => 1652,
            Error::ChecksumMismatch { .. } => 1661,
            Error::MissingChecksum(_) => 1662,
            Error::Database(_)
            | Error::Io(_)
            | Error::InitError(_)
            | Error::DatabaseNotFound(_)
            | Error::ParseError(_)
            | Error::NotFoundError(_)
            | Error::ConflictError(_) => 1,
        }
    }
}

/// Result type alias using Quarry's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_not_found_exit_code() {
        let err = Error::RemoteNotFound("http://localhost:8080/doesnotexist.rpm".to_string());
        assert_eq!(err.exit_code(), 1622);
    }

    #[test]
    fn test_exit_codes_are_distinct_per_fatal_kind() {
        let errors = [
            Error::LocalNotFound(PathBuf::from("/a.rpm")),
            Error::PermissionDenied(PathBuf::from("/a.rpm")),
            Error::RemoteNotFound("u".to_string()),
            Error::RemoteTransport {
                url: "u".to_string(),
                reason: "r".to_string(),
            },
            Error::ArtifactCorrupt {
                origin: "o".to_string(),
                reason: "r".to_string(),
            },
            Error::NoSuchPackage("p".to_string()),
            Error::DatabaseLocked("l".to_string()),
            Error::ApplyFailed {
                package: "p".to_string(),
                reason: "r".to_string(),
            },
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len(), "exit codes must not collide");
        assert!(codes.iter().all(|c| *c != 0));
    }
}
