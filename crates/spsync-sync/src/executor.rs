//! Upload strategy by size
//!
//! Files up to [`LARGE_FILE_THRESHOLD`] go up in one request. Larger files
//! use a resumable session and are streamed from disk in aligned chunks,
//! strictly in order; only one chunk is held in memory at a time.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use spsync_core::ports::{ChunkOutcome, IRemoteLibrary, UploadSession, UploadedItem};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

const MIB: u64 = 1024 * 1024;

/// Files larger than this use an upload session.
pub const LARGE_FILE_THRESHOLD: u64 = 250 * MIB;

pub const DEFAULT_CHUNK_SIZE: u64 = 10 * MIB;

/// Upload session chunks must be multiples of 320 KiB.
pub const CHUNK_ALIGNMENT: u64 = 320 * 1024;

/// Largest chunk the service accepts in one request.
pub const MAX_CHUNK_SIZE: u64 = 60 * MIB;

/// Round `requested` up to a multiple of [`CHUNK_ALIGNMENT`], capped at
/// [`MAX_CHUNK_SIZE`] rounded down to the alignment.
pub fn align_chunk_size(requested: u64) -> u64 {
    let max_aligned = MAX_CHUNK_SIZE / CHUNK_ALIGNMENT * CHUNK_ALIGNMENT;
    let aligned = requested.max(1).div_ceil(CHUNK_ALIGNMENT) * CHUNK_ALIGNMENT;
    aligned.min(max_aligned)
}

pub struct UploadExecutor {
    remote: Arc<dyn IRemoteLibrary>,
    threshold: u64,
    chunk_size: u64,
}

impl UploadExecutor {
    pub fn new(remote: Arc<dyn IRemoteLibrary>) -> Self {
        Self {
            remote,
            threshold: LARGE_FILE_THRESHOLD,
            chunk_size: align_chunk_size(DEFAULT_CHUNK_SIZE),
        }
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = align_chunk_size(chunk_size);
        self
    }

    /// Upload the file at `path` as `filename` under `parent_id`.
    pub async fn upload(
        &self,
        parent_id: &str,
        filename: &str,
        path: &Path,
        size: u64,
    ) -> Result<UploadedItem> {
        if size <= self.threshold {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return self.remote.upload_small(parent_id, filename, data).await;
        }

        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let session = self.remote.create_upload_session(parent_id, filename).await?;
        info!(
            name = filename,
            bytes = size,
            chunks = size.div_ceil(self.chunk_size),
            "Starting chunked upload"
        );

        let mut offset = 0u64;
        while offset < size {
            let len = self.chunk_size.min(size - offset);
            let mut buf = vec![0u8; len as usize];
            file.read_exact(&mut buf)
                .await
                .with_context(|| format!("Failed to read {} at offset {offset}", path.display()))?;
            if let Some(item) = self.send_chunk(&session, buf, offset, size).await? {
                return Ok(item);
            }
            offset += len;
        }

        bail!("Upload session for '{filename}' ended without a completed item")
    }

    /// Upload in-memory content, such as a generated HTML page.
    pub async fn upload_bytes(&self, parent_id: &str, filename: &str, data: Vec<u8>) -> Result<UploadedItem> {
        let size = data.len() as u64;
        if size <= self.threshold {
            return self.remote.upload_small(parent_id, filename, data).await;
        }

        let session = self.remote.create_upload_session(parent_id, filename).await?;
        for (index, chunk) in data.chunks(self.chunk_size as usize).enumerate() {
            let offset = index as u64 * self.chunk_size;
            if let Some(item) = self.send_chunk(&session, chunk.to_vec(), offset, size).await? {
                return Ok(item);
            }
        }

        bail!("Upload session for '{filename}' ended without a completed item")
    }

    async fn send_chunk(
        &self,
        session: &UploadSession,
        data: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> Result<Option<UploadedItem>> {
        let len = data.len() as u64;
        match self.remote.upload_chunk(session, data, offset, total).await? {
            ChunkOutcome::Continue => {
                debug!(sent = offset + len, total, "Chunk accepted");
                Ok(None)
            }
            ChunkOutcome::Completed(item) => {
                info!(id = %item.id, name = %item.name, "Chunked upload completed");
                Ok(Some(item))
            }
        }
    }
}
