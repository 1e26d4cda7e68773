//! Site, drive, and document library resolution
//!
//! Before any sync work the engine needs four ids: the SharePoint site, its
//! default document library drive, the drive item of the upload root, and
//! the list that backs the library. [`resolve_library`] resolves them in
//! order and makes sure the `FileHash` column exists.
//!
//! ## Microsoft Graph API References
//!
//! - [Get site by path](https://learn.microsoft.com/en-us/graph/api/site-getbypath)
//! - [Get drive](https://learn.microsoft.com/en-us/graph/api/drive-get)
//! - [Create columnDefinition](https://learn.microsoft.com/en-us/graph/api/list-post-columns)

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{check_status, decode_json, GraphClient};
use crate::GraphError;

/// Name of the list column holding content fingerprints.
pub const HASH_COLUMN_NAME: &str = "FileHash";

/// Library names tried when the configured name matches no list.
const FALLBACK_LIBRARY_NAMES: [&str; 2] = ["Shared Documents", "Documents"];

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry {
    id: String,
    name: Option<String>,
    display_name: Option<String>,
}

impl ListEntry {
    fn is_named(&self, wanted: &str) -> bool {
        self.display_name.as_deref() == Some(wanted) || self.name.as_deref() == Some(wanted)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnEntry {
    name: Option<String>,
    display_name: Option<String>,
}

// ============================================================================
// LibraryContext
// ============================================================================

/// Everything needed to address the upload root and its list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryContext {
    pub site_id: String,
    pub drive_id: String,
    /// Drive item of the upload root folder.
    pub root_item_id: String,
    /// `None` when no matching list was found; fingerprint writes are then
    /// disabled.
    pub list_id: Option<String>,
    pub library_name: String,
    pub hash_column_available: bool,
}

/// Resolve the site, drive, upload root, and list, then ensure the
/// `FileHash` column.
///
/// A missing upload root is an error. A missing list or column is not: the
/// run continues with size-only comparison.
pub async fn resolve_library(
    client: &GraphClient,
    host: &str,
    site_name: &str,
    upload_path: &str,
    library_name: &str,
) -> Result<LibraryContext, GraphError> {
    let site_id = get_site_id(client, host, site_name).await?;
    let drive_id = get_default_drive_id(client, &site_id).await?;

    let root_item_id = get_item_id_by_path(client, &site_id, &drive_id, upload_path)
        .await?
        .ok_or_else(|| {
            GraphError::NotFound(format!(
                "upload path '{upload_path}' does not exist in the site's document library"
            ))
        })?;

    let list_id = match find_list_id(client, &site_id, library_name).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Could not enumerate site lists");
            None
        }
    };

    let hash_column_available = match &list_id {
        Some(list_id) => ensure_hash_column(client, &site_id, list_id).await,
        None => {
            warn!(library = %library_name, "No list found for library, FileHash disabled");
            false
        }
    };

    info!(
        site_id = %site_id,
        drive_id = %drive_id,
        root_item_id = %root_item_id,
        hash_column_available,
        "Resolved document library"
    );

    Ok(LibraryContext {
        site_id,
        drive_id,
        root_item_id,
        list_id,
        library_name: library_name.to_string(),
        hash_column_available,
    })
}

/// `GET /sites/{host}:/sites/{name}`
pub async fn get_site_id(
    client: &GraphClient,
    host: &str,
    site_name: &str,
) -> Result<String, GraphError> {
    let path = format!(
        "/sites/{}:/sites/{}",
        host,
        urlencoding::encode(site_name)
    );
    let site: IdOnly = client.get_json(&path).await?;
    debug!(site_id = %site.id, "Resolved site");
    Ok(site.id)
}

/// `GET /sites/{site}/drive`
pub async fn get_default_drive_id(client: &GraphClient, site_id: &str) -> Result<String, GraphError> {
    let drive: IdOnly = client.get_json(&format!("/sites/{site_id}/drive")).await?;
    debug!(drive_id = %drive.id, "Resolved default drive");
    Ok(drive.id)
}

/// Id of the drive item at `path` below the drive root, `None` on 404.
///
/// An empty path resolves the drive root itself.
pub async fn get_item_id_by_path(
    client: &GraphClient,
    site_id: &str,
    drive_id: &str,
    path: &str,
) -> Result<Option<String>, GraphError> {
    let trimmed = path.trim_matches('/');
    let url = if trimmed.is_empty() {
        format!("/sites/{site_id}/drives/{drive_id}/root")
    } else {
        format!(
            "/sites/{site_id}/drives/{drive_id}/root:/{}",
            encode_path(trimmed)
        )
    };

    let response = client.send(Method::GET, &url, |rb| rb).await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let item: IdOnly = decode_json(check_status(response).await?).await?;
    Ok(Some(item.id))
}

/// Id of the list whose display name or name is `library_name`, falling
/// back to the default document library names.
pub async fn find_list_id(
    client: &GraphClient,
    site_id: &str,
    library_name: &str,
) -> Result<Option<String>, GraphError> {
    let mut lists: Vec<ListEntry> = Vec::new();
    let mut next = Some(format!("/sites/{site_id}/lists"));
    while let Some(url) = next {
        let page: Collection<ListEntry> = client.get_json(&url).await?;
        lists.extend(page.value);
        next = page.next_link;
    }

    let found = std::iter::once(library_name)
        .chain(FALLBACK_LIBRARY_NAMES)
        .find_map(|wanted| lists.iter().find(|l| l.is_named(wanted)));

    if let Some(list) = found {
        debug!(list_id = %list.id, name = ?list.display_name, "Resolved library list");
    }
    Ok(found.map(|l| l.id.clone()))
}

/// Make sure the list has a `FileHash` text column.
///
/// Returns whether the column is usable. Every failure is logged and
/// reported as `false`.
pub async fn ensure_hash_column(client: &GraphClient, site_id: &str, list_id: &str) -> bool {
    match hash_column_exists(client, site_id, list_id).await {
        Ok(true) => {
            debug!("FileHash column present");
            return true;
        }
        Ok(false) => {}
        Err(e) => {
            warn!(error = %e, "Could not read list columns, FileHash disabled");
            return false;
        }
    }

    info!("Creating FileHash column");
    match create_hash_column(client, site_id, list_id).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                error = %e,
                "Could not create FileHash column (requires Sites.Manage.All), comparing by size only"
            );
            false
        }
    }
}

async fn hash_column_exists(
    client: &GraphClient,
    site_id: &str,
    list_id: &str,
) -> Result<bool, GraphError> {
    let columns: Collection<ColumnEntry> = client
        .get_json(&format!("/sites/{site_id}/lists/{list_id}/columns"))
        .await?;
    Ok(columns.value.iter().any(|c| {
        c.name.as_deref() == Some(HASH_COLUMN_NAME)
            || c.display_name.as_deref() == Some(HASH_COLUMN_NAME)
    }))
}

async fn create_hash_column(
    client: &GraphClient,
    site_id: &str,
    list_id: &str,
) -> Result<(), GraphError> {
    let definition = hash_column_definition();
    let response = client
        .send(
            Method::POST,
            &format!("/sites/{site_id}/lists/{list_id}/columns"),
            |rb| rb.json(&definition),
        )
        .await?;

    if response.status() == StatusCode::CREATED {
        info!("FileHash column created");
        return Ok(());
    }
    Err(match check_status(response).await {
        Ok(other) => GraphError::InvalidResponse(format!(
            "column creation returned {} instead of 201",
            other.status()
        )),
        Err(e) => e,
    })
}

fn hash_column_definition() -> serde_json::Value {
    json!({
        "displayName": HASH_COLUMN_NAME,
        "name": HASH_COLUMN_NAME,
        "description": "xxHash128 checksum for file content verification",
        "enforceUniqueValues": false,
        "hidden": false,
        "indexed": false,
        "readOnly": false,
        "required": false,
        "text": {
            "allowMultipleLines": false,
            "appendChangesToExistingText": false,
            "linesForEditing": 0,
            "maxLength": 255
        }
    })
}

/// Percent-encode each segment of a `/`-separated path.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
