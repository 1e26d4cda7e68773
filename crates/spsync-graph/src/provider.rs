//! GraphLibrary - IRemoteLibrary implementation for Microsoft Graph API
//!
//! Wraps the [`GraphClient`] and a resolved [`LibraryContext`], delegating to
//! the items, upload, and metadata modules to fulfil the [`IRemoteLibrary`]
//! port contract.
//!
//! ## Design Notes
//!
//! - The client is shared through `Arc` and never locked: token refresh is
//!   internal to [`ClientCredentialsAuth`], so every method takes `&self`.
//! - `GraphError` is converted to `anyhow::Error` at this boundary with
//!   context naming the item. Rejected credentials surface as
//!   [`AuthRejected`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use spsync_core::config::Config;
use spsync_core::domain::{AuthRejected, Fingerprint};
use spsync_core::ports::{
    ChunkOutcome, FolderCreation, IRemoteLibrary, RemoteChild, UploadSession, UploadedItem,
};

use crate::auth::{AuthFailure, ClientCredentialsAuth, ClientCredentialsConfig};
use crate::client::{GraphClient, RetryPolicy, DEFAULT_TIMEOUT};
use crate::items::{self, GraphDriveItem};
use crate::metadata;
use crate::rate_limit::RateLimitMonitor;
use crate::site::{self, LibraryContext};
use crate::upload::{self, ChunkResponse};
use crate::GraphError;

/// Lift a Graph failure to the port. Credential failures become
/// [`AuthRejected`] so the engine can stop the run; a token endpoint that
/// could not be reached is left retryable.
fn port_error(err: GraphError) -> anyhow::Error {
    match err {
        GraphError::Auth(failure) if !failure.is_transient() => {
            anyhow::Error::new(rejected(&failure))
        }
        GraphError::Unauthorized(body) => anyhow::Error::new(AuthRejected(body)),
        other => anyhow::Error::new(other),
    }
}

fn rejected(failure: &AuthFailure) -> AuthRejected {
    AuthRejected(format!("{failure}. {}", failure.hint()))
}

fn to_uploaded(item: GraphDriveItem) -> UploadedItem {
    UploadedItem {
        list_item_id: item.list_item_id(),
        id: item.id,
        name: item.name,
        size: item.size,
    }
}

/// Document library adapter over Microsoft Graph.
pub struct GraphLibrary {
    client: Arc<GraphClient>,
    context: LibraryContext,
}

impl GraphLibrary {
    pub fn new(client: Arc<GraphClient>, context: LibraryContext) -> Self {
        Self { client, context }
    }

    /// Authenticate, resolve the site and library named by `config`, and
    /// ensure the `FileHash` column.
    pub async fn connect(config: &Config) -> Result<Self> {
        let auth = ClientCredentialsAuth::new(ClientCredentialsConfig::new(
            &config.auth.tenant_id,
            config.auth.client_id.clone(),
            config.auth.client_secret.clone(),
            &config.auth.login_endpoint,
            &config.auth.graph_endpoint,
        ))?;
        let auth = Arc::new(auth);

        // Fail early with a classified error instead of on the first request.
        auth.access_token().await?;

        let client = GraphClient::with_auth(auth, &config.auth.graph_endpoint, DEFAULT_TIMEOUT)?
            .with_retry_policy(RetryPolicy::default().with_max_retries(config.sync.max_retry));
        let client = Arc::new(client);

        let library_name = config.library_name();
        let context = site::resolve_library(
            &client,
            &config.site.host,
            &config.site.name,
            &config.sync.upload_path,
            &library_name,
        )
        .await
        .with_context(|| {
            format!(
                "Failed to resolve '{}' in {}",
                config.sync.upload_path,
                config.site_url()
            )
        })?;

        Ok(Self::new(client, context))
    }

    pub fn context(&self) -> &LibraryContext {
        &self.context
    }

    pub fn client(&self) -> &Arc<GraphClient> {
        &self.client
    }

    pub fn monitor(&self) -> &Arc<RateLimitMonitor> {
        self.client.monitor()
    }

    fn list_id(&self) -> Result<&str> {
        self.context
            .list_id
            .as_deref()
            .context("No document library list resolved; FileHash writes are unavailable")
    }
}

#[async_trait::async_trait]
impl IRemoteLibrary for GraphLibrary {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteChild>> {
        let items = items::list_children(&self.client, &self.context.drive_id, folder_id)
            .await
            .map_err(port_error)
            .with_context(|| format!("Failed to list children of {folder_id}"))?;
        Ok(items.into_iter().map(GraphDriveItem::into_child).collect())
    }

    async fn get_child(&self, parent_id: &str, name: &str) -> Result<Option<RemoteChild>> {
        let item = items::get_child(
            &self.client,
            &self.context.site_id,
            &self.context.drive_id,
            parent_id,
            name,
        )
        .await
        .map_err(port_error)
        .with_context(|| format!("Failed to look up '{name}' under {parent_id}"))?;
        Ok(item.map(GraphDriveItem::into_child))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<FolderCreation> {
        let created = items::create_folder(&self.client, &self.context.drive_id, parent_id, name)
            .await
            .map_err(port_error)
            .with_context(|| format!("Failed to create folder '{name}'"))?;
        Ok(match created {
            Some(item) => FolderCreation::Created(item.into_child()),
            None => FolderCreation::AlreadyExists,
        })
    }

    async fn upload_small(&self, parent_id: &str, name: &str, data: Vec<u8>) -> Result<UploadedItem> {
        let item = upload::upload_small(
            &self.client,
            &self.context.site_id,
            &self.context.drive_id,
            parent_id,
            name,
            data,
        )
        .await
        .map_err(port_error)
        .with_context(|| format!("Failed to upload '{name}'"))?;
        Ok(to_uploaded(item))
    }

    async fn create_upload_session(&self, parent_id: &str, name: &str) -> Result<UploadSession> {
        let session = upload::create_upload_session(
            &self.client,
            &self.context.site_id,
            &self.context.drive_id,
            parent_id,
            name,
        )
        .await
        .map_err(port_error)
        .with_context(|| format!("Failed to create upload session for '{name}'"))?;
        Ok(UploadSession {
            upload_url: session.upload_url,
            expires_at: session.expires_at,
        })
    }

    async fn upload_chunk(
        &self,
        session: &UploadSession,
        data: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> Result<ChunkOutcome> {
        let response = upload::upload_chunk(&self.client, &session.upload_url, data, offset, total)
            .await
            .map_err(port_error)
            .with_context(|| format!("Failed to upload chunk at offset {offset}/{total}"))?;
        Ok(match response {
            ChunkResponse::Accepted => ChunkOutcome::Continue,
            ChunkResponse::Complete(item) => ChunkOutcome::Completed(to_uploaded(item)),
        })
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        items::delete_item(&self.client, &self.context.drive_id, item_id)
            .await
            .map_err(port_error)
            .with_context(|| format!("Failed to delete item {item_id}"))
    }

    async fn update_fingerprint(&self, list_item_id: &str, fingerprint: &Fingerprint) -> Result<()> {
        let list_id = self.list_id()?;
        metadata::update_fingerprint(
            &self.client,
            &self.context.site_id,
            list_id,
            list_item_id,
            fingerprint,
        )
        .await
        .map_err(port_error)
        .with_context(|| format!("Failed to write FileHash on list item {list_item_id}"))
    }

    async fn batch_update_fingerprints(&self, updates: &[(String, Fingerprint)]) -> Result<Vec<bool>> {
        let list_id = self.list_id()?;
        debug!(count = updates.len(), "GraphLibrary::batch_update_fingerprints");
        Ok(metadata::batch_update_fingerprints(&self.client, &self.context.site_id, list_id, updates).await)
    }

    fn hash_column_available(&self) -> bool {
        self.context.hash_column_available
    }

    fn should_slow_down(&self) -> bool {
        self.client.monitor().should_slow_down()
    }
}
