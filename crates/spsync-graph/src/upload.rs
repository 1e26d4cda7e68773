//! Upload operations for Microsoft Graph API (SharePoint document libraries)
//!
//! Provides functions for uploading files into a library folder:
//! - [`upload_small`] - Single-request upload
//! - [`create_upload_session`] - Creates a resumable upload session
//! - [`upload_chunk`] - Uploads a single chunk within a session
//!
//! Every upload replaces an existing file of the same name. Chunking policy
//! (threshold, chunk size, alignment) lives with the caller.
//!
//! ## Microsoft Graph API References
//!
//! - [Upload small files](https://learn.microsoft.com/en-us/graph/api/driveitem-put-content)
//! - [Upload large files](https://learn.microsoft.com/en-us/graph/api/driveitem-createuploadsession)

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::client::{check_status, decode_json, GraphClient};
use crate::items::GraphDriveItem;
use crate::GraphError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    upload_url: String,
    expiration_date_time: Option<DateTime<Utc>>,
}

/// An open resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub upload_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of one chunk PUT.
#[derive(Debug, Clone)]
pub enum ChunkResponse {
    /// 202: more bytes expected
    Accepted,
    /// 200/201: the upload is complete
    Complete(GraphDriveItem),
}

fn item_path(site_id: &str, drive_id: &str, parent_id: &str, name: &str, action: &str) -> String {
    format!(
        "/sites/{site_id}/drives/{drive_id}/items/{parent_id}:/{}:/{action}",
        urlencoding::encode(name)
    )
}

/// Uploads a whole file in one `PUT .../content` request.
///
/// The body is rebuilt on every retry, so `data` is cloned per attempt.
pub async fn upload_small(
    client: &GraphClient,
    site_id: &str,
    drive_id: &str,
    parent_id: &str,
    name: &str,
    data: Vec<u8>,
) -> Result<GraphDriveItem, GraphError> {
    let path = item_path(site_id, drive_id, parent_id, name, "content");
    debug!(name, bytes = data.len(), "Uploading file in one request");

    let response = client
        .send(Method::PUT, &path, |rb| {
            rb.header("Content-Type", "application/octet-stream")
                .body(data.clone())
        })
        .await?;
    let item: GraphDriveItem = decode_json(check_status(response).await?).await?;

    debug!(id = %item.id, name = %item.name, "Small upload completed");
    Ok(item)
}

/// Creates a resumable upload session that replaces any existing file.
pub async fn create_upload_session(
    client: &GraphClient,
    site_id: &str,
    drive_id: &str,
    parent_id: &str,
    name: &str,
) -> Result<SessionInfo, GraphError> {
    let path = item_path(site_id, drive_id, parent_id, name, "createUploadSession");
    let body = json!({
        "item": { "@microsoft.graph.conflictBehavior": "replace" }
    });
    debug!(name, "Creating upload session");

    let response = client
        .send(Method::POST, &path, |rb| rb.json(&body))
        .await?;
    let session: UploadSessionResponse = decode_json(check_status(response).await?).await?;

    Ok(SessionInfo {
        upload_url: session.upload_url,
        expires_at: session.expiration_date_time,
    })
}

/// Sends `data` as bytes `offset..offset+len` of a `total`-byte upload.
///
/// Upload session URLs are pre-authenticated, so no bearer token is sent.
pub async fn upload_chunk(
    client: &GraphClient,
    upload_url: &str,
    data: Vec<u8>,
    offset: u64,
    total: u64,
) -> Result<ChunkResponse, GraphError> {
    let len = data.len() as u64;
    if len == 0 {
        return Err(GraphError::InvalidResponse(format!(
            "empty chunk at offset {offset} of {total}"
        )));
    }
    let content_range = format!("bytes {}-{}/{}", offset, offset + len - 1, total);
    debug!(range = %content_range, "Uploading chunk");

    let response = client
        .send_unauthenticated(Method::PUT, upload_url, |rb| {
            rb.header("Content-Length", len.to_string())
                .header("Content-Range", &content_range)
                .body(data.clone())
        })
        .await?;

    let response = check_status(response).await?;
    match response.status() {
        StatusCode::OK | StatusCode::CREATED => {
            let item: GraphDriveItem = decode_json(response).await?;
            debug!(id = %item.id, "Upload session completed");
            Ok(ChunkResponse::Complete(item))
        }
        _ => Ok(ChunkResponse::Accepted),
    }
}
