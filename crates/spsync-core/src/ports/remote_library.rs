//! Remote document library port (driven/secondary port)
//!
//! This module defines the interface the sync engine uses to read and write a
//! SharePoint document library. The production implementation talks to
//! Microsoft Graph; tests use an in-memory library.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific.
//! - Retries for throttling and transient failures happen inside the adapter;
//!   an `Err` here means the adapter gave up.
//! - Items are addressed by opaque ids. Paths never cross this boundary
//!   except as single names under a parent id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Fingerprint, RemoteFileRecord};

// ============================================================================
// DTOs
// ============================================================================

/// One entry of a folder listing, with its list item fields expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChild {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub size: Option<u64>,
    pub list_item_id: Option<String>,
    /// Parsed `FileHash` field; `None` when absent, empty, or malformed.
    pub fingerprint: Option<Fingerprint>,
    pub parent_id: Option<String>,
}

impl RemoteChild {
    pub fn into_file_record(self) -> RemoteFileRecord {
        RemoteFileRecord {
            item_id: self.id,
            parent_id: self.parent_id,
            list_item_id: self.list_item_id,
            size: self.size,
            fingerprint: self.fingerprint,
            name: self.name,
        }
    }
}

/// The drive item returned when an upload completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedItem {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub list_item_id: Option<String>,
}

/// A resumable upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of sending one chunk of a resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// More bytes expected.
    Continue,
    /// The last chunk was accepted and the file exists.
    Completed(UploadedItem),
}

/// Result of a folder creation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderCreation {
    Created(RemoteChild),
    /// Someone else created a folder with that name first.
    AlreadyExists,
}

// ============================================================================
// IRemoteLibrary trait
// ============================================================================

/// Port trait for document library operations.
#[async_trait::async_trait]
pub trait IRemoteLibrary: Send + Sync {
    /// All children of a folder, following pagination.
    async fn list_children(&self, folder_id: &str) -> anyhow::Result<Vec<RemoteChild>>;

    /// Point query for a single child by name. `Ok(None)` when absent.
    async fn get_child(&self, parent_id: &str, name: &str) -> anyhow::Result<Option<RemoteChild>>;

    /// Create a folder; an existing name yields [`FolderCreation::AlreadyExists`].
    async fn create_folder(&self, parent_id: &str, name: &str) -> anyhow::Result<FolderCreation>;

    /// Upload a whole file in one request, replacing any existing file.
    async fn upload_small(
        &self,
        parent_id: &str,
        name: &str,
        data: Vec<u8>,
    ) -> anyhow::Result<UploadedItem>;

    /// Open a resumable upload session that replaces any existing file.
    async fn create_upload_session(
        &self,
        parent_id: &str,
        name: &str,
    ) -> anyhow::Result<UploadSession>;

    /// Send `data` at `offset` of a `total`-byte upload.
    async fn upload_chunk(
        &self,
        session: &UploadSession,
        data: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> anyhow::Result<ChunkOutcome>;

    async fn delete_item(&self, item_id: &str) -> anyhow::Result<()>;

    /// Write the `FileHash` field of one list item.
    async fn update_fingerprint(
        &self,
        list_item_id: &str,
        fingerprint: &Fingerprint,
    ) -> anyhow::Result<()>;

    /// Write several `FileHash` fields in batched requests.
    ///
    /// The result has one entry per input, in order.
    async fn batch_update_fingerprints(
        &self,
        updates: &[(String, Fingerprint)],
    ) -> anyhow::Result<Vec<bool>>;

    /// Whether the library has a usable `FileHash` column.
    fn hash_column_available(&self) -> bool;

    /// Whether callers should pause before issuing more requests.
    fn should_slow_down(&self) -> bool {
        false
    }
}
