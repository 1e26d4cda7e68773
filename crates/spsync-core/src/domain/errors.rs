//! Domain error types
//!
//! Validation failures for the value types in [`crate::domain`], the
//! classified failures of local content fingerprinting, and the credential
//! failure that ends a run.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path (absolute, escapes the base, or empty)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid fingerprint format (expected 32 hex characters)
    #[error("Invalid fingerprint format: {0}")]
    InvalidFingerprint(String),

    /// A name that sanitizes to nothing
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Why a local file could not be fingerprinted.
///
/// Callers log the error and treat the file as must-upload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("Out of memory while hashing {0}")]
    OutOfMemory(String),
}

impl FingerprintError {
    /// Classify an I/O error raised while reading `path`.
    pub fn from_io(path: &std::path::Path, err: &std::io::Error) -> Self {
        let display = path.display().to_string();
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(display),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(display),
            std::io::ErrorKind::OutOfMemory => Self::OutOfMemory(display),
            _ => Self::Io {
                path: display,
                message: err.to_string(),
            },
        }
    }
}

/// The library refused the run's credentials.
///
/// Remote adapters raise this once a token can no longer be obtained or is
/// rejected outright. No later request can succeed, so the sync engine
/// stops scheduling work instead of retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Credentials rejected: {0}")]
pub struct AuthRejected(pub String);

impl AuthRejected {
    /// Whether `err` or anything it wraps is an [`AuthRejected`].
    pub fn is_cause_of(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| cause.is::<AuthRejected>())
    }
}
