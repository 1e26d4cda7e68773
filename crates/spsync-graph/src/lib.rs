//! spsync Graph - Microsoft Graph adapter for SharePoint document libraries
//!
//! Provides an async client for:
//! - OAuth2 client-credentials authentication (app-only)
//! - Request execution with throttling and transient-failure retries
//! - Site, drive, and document library resolution
//! - Folder listing with expanded list item fields
//! - Small and resumable uploads
//! - `FileHash` list column management and batched field writes
//!
//! ## Modules
//!
//! - [`auth`] - Client-credentials token acquisition and caching
//! - [`client`] - Microsoft Graph HTTP client and retry policy
//! - [`rate_limit`] - Throttling header monitor
//! - [`site`] - Site/drive/list bootstrap and column management
//! - [`items`] - Drive item listing, lookup, folder creation, deletion
//! - [`upload`] - File upload operations (small and resumable)
//! - [`metadata`] - List item field writes (single and `$batch`)
//! - [`provider`] - [`IRemoteLibrary`](spsync_core::ports::IRemoteLibrary) adapter

pub mod auth;
pub mod client;
pub mod items;
pub mod metadata;
pub mod provider;
pub mod rate_limit;
pub mod site;
pub mod upload;

use thiserror::Error;

pub use auth::AuthFailure;

/// Longest response body excerpt carried in an error.
const MAX_ERROR_BODY: usize = 500;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Token acquisition failed
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthFailure),

    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict persisted through every retry (locked or still processing)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Still answered 429 after every retry
    #[error("Rate limited: gave up after {attempts} attempts for {url}")]
    Throttled { attempts: u32, url: String },

    /// 5xx persisted through every retry
    #[error("Server error {status} after {attempts} attempts for {url}")]
    ServerError {
        status: u16,
        attempts: u32,
        url: String,
    },

    /// Any other non-success status
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response
    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    /// Map a non-success response to an error, consuming its body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        match status.as_u16() {
            401 => Self::Unauthorized(body),
            403 => Self::Forbidden(body),
            404 => Self::NotFound(body),
            409 => Self::Conflict(body),
            code => Self::Status {
                status: code,
                message: body,
            },
        }
    }

    /// Whether the response body names the `nameAlreadyExists` conflict.
    pub fn is_name_conflict(&self) -> bool {
        matches!(self, Self::Conflict(body) if body.contains("nameAlreadyExists"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
