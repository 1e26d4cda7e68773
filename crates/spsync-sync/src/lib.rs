//! spsync Sync - Change detection and parallel upload engine
//!
//! Provides:
//! - Remote metadata snapshot of the upload root
//! - Hash/size change detection with point-query fallback
//! - Race-safe folder resolution
//! - Small and chunked uploads
//! - Batched `FileHash` writes with graduated retries
//! - Mirror-mode orphan deletion
//! - Markdown to HTML conversion with rendered Mermaid diagrams
//!
//! ## Modules
//!
//! - [`discovery`] - Glob matching, exclusions, base path
//! - [`cache`] - Remote snapshot builder
//! - [`decision`] - Upload/skip decision per file
//! - [`folders`] - Memoized folder creation
//! - [`executor`] - Upload strategy by size
//! - [`batcher`] - Deferred `FileHash` writes
//! - [`orchestrator`] - Worker pool over all discovered files
//! - [`reconcile`] - Orphan detection and deletion
//! - [`markdown`] - [`IMarkdownConverter`](spsync_core::ports::IMarkdownConverter) implementation

pub mod batcher;
pub mod cache;
pub mod decision;
pub mod discovery;
pub mod executor;
pub mod folders;
pub mod markdown;
pub mod orchestrator;
pub mod reconcile;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while preparing or running a sync
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file pattern is not a valid glob
    #[error("Invalid file pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    /// Nothing matched the file pattern
    #[error("No files or directories matched pattern: {0}")]
    NoMatches(String),

    /// Everything the pattern matched was excluded
    #[error("All {count} item(s) matched by '{pattern}' were excluded by filters")]
    AllExcluded { pattern: String, count: usize },

    /// A matched path could not be placed under the base path
    #[error("Path is outside the base path: {0}")]
    OutsideBase(PathBuf),

    /// A domain-level error propagated from spsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] spsync_core::domain::DomainError),
}
