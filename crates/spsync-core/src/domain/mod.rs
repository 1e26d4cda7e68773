//! Domain types
//!
//! - Content fingerprints and their streaming computation
//! - Relative path normalization and SharePoint name sanitization
//! - Local and remote file records, snapshots, and outcomes
//! - Shared run statistics
//! - Domain-specific error types

pub mod errors;
pub mod file_kind;
pub mod fingerprint;
pub mod paths;
pub mod records;
pub mod stats;

pub use errors::{AuthRejected, DomainError, FingerprintError};
pub use file_kind::FileKind;
pub use fingerprint::{chunk_size_for, fingerprint_file, Fingerprint};
pub use records::{
    LocalFile, PendingMetadataWrite, RemoteFileRecord, RemoteFolderRecord, RemoteSnapshot,
    SkipReason, UploadOutcome, UploadReason,
};
pub use stats::{format_bytes, Counter, StatsSnapshot, SyncStatistics};
