//! Drive item operations: listing, point lookup, folder creation, deletion
//!
//! Listings expand each child's backing list item so the `FileHash` field
//! arrives with the folder contents, without a request per file.

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use spsync_core::domain::Fingerprint;
use spsync_core::ports::RemoteChild;
use tracing::{debug, trace};

use crate::client::{check_status, decode_json, GraphClient};
use crate::site::HASH_COLUMN_NAME;
use crate::GraphError;

/// `$expand` clause selecting the list item fields the engine reads.
const LIST_ITEM_EXPAND: &str =
    "listItem($expand=fields($select=FileHash,FileSizeDisplay,FileLeafRef))";

// ============================================================================
// Graph API DriveItem response types
// ============================================================================

/// A DriveItem as returned by listing, lookup, and upload endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDriveItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub size: Option<u64>,
    pub parent_reference: Option<ParentReference>,
    /// Present if the item is a folder
    pub folder: Option<serde_json::Value>,
    pub list_item: Option<ListItemRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParentReference {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListItemRef {
    pub id: Option<String>,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl GraphDriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    pub fn list_item_id(&self) -> Option<String> {
        self.list_item.as_ref().and_then(|li| li.id.clone())
    }

    /// Parsed `FileHash` field. Empty or malformed values read as `None`.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        let raw = self
            .list_item
            .as_ref()?
            .fields
            .get(HASH_COLUMN_NAME)?
            .as_str()?;
        if raw.trim().is_empty() {
            return None;
        }
        match Fingerprint::parse(raw.trim()) {
            Ok(fp) => Some(fp),
            Err(e) => {
                debug!(item = %self.name, error = %e, "Ignoring malformed FileHash value");
                None
            }
        }
    }

    pub fn into_child(self) -> RemoteChild {
        let fingerprint = self.fingerprint();
        let list_item_id = self.list_item_id();
        RemoteChild {
            is_folder: self.is_folder(),
            size: self.size,
            list_item_id,
            fingerprint,
            parent_id: self.parent_reference.and_then(|p| p.id),
            name: self.name,
            id: self.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<GraphDriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

// ============================================================================
// Operations
// ============================================================================

/// Every child of `folder_id`, following `@odata.nextLink` until exhausted.
pub async fn list_children(
    client: &GraphClient,
    drive_id: &str,
    folder_id: &str,
) -> Result<Vec<GraphDriveItem>, GraphError> {
    let mut items = Vec::new();
    let mut next = Some(format!(
        "/drives/{drive_id}/items/{folder_id}/children?$expand={LIST_ITEM_EXPAND}"
    ));
    let mut pages = 0u32;

    while let Some(url) = next {
        let page: ChildrenPage = client.get_json(&url).await?;
        pages += 1;
        trace!(folder_id, page = pages, count = page.value.len(), "Listed children page");
        items.extend(page.value);
        next = page.next_link;
    }

    debug!(folder_id, pages, count = items.len(), "Listed folder");
    Ok(items)
}

/// Point query for `name` under `parent_id`; `None` when it does not exist.
pub async fn get_child(
    client: &GraphClient,
    site_id: &str,
    drive_id: &str,
    parent_id: &str,
    name: &str,
) -> Result<Option<GraphDriveItem>, GraphError> {
    let url = format!(
        "/sites/{site_id}/drives/{drive_id}/items/{parent_id}:/{}?$expand={LIST_ITEM_EXPAND}",
        urlencoding::encode(name)
    );
    let response = client.send(Method::GET, &url, |rb| rb).await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let item = decode_json(check_status(response).await?).await?;
    Ok(Some(item))
}

/// Create folder `name` under `parent_id`, failing on an existing name.
///
/// Returns `Ok(None)` when the name is already taken, so the caller can
/// re-list and adopt the existing folder.
pub async fn create_folder(
    client: &GraphClient,
    drive_id: &str,
    parent_id: &str,
    name: &str,
) -> Result<Option<GraphDriveItem>, GraphError> {
    let body = json!({
        "name": name,
        "folder": {},
        "@microsoft.graph.conflictBehavior": "fail"
    });
    let response = client
        .send_without_conflict_retry(
            Method::POST,
            &format!("/drives/{drive_id}/items/{parent_id}/children"),
            |rb| rb.json(&body),
        )
        .await?;

    match check_status(response).await {
        Ok(response) => {
            let item: GraphDriveItem = decode_json(response).await?;
            debug!(name, id = %item.id, "Created folder");
            Ok(Some(item))
        }
        Err(e) if e.is_name_conflict() => {
            debug!(name, "Folder already exists");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// `DELETE /drives/{drive}/items/{id}`
pub async fn delete_item(client: &GraphClient, drive_id: &str, item_id: &str) -> Result<(), GraphError> {
    let response = client
        .send(
            Method::DELETE,
            &format!("/drives/{drive_id}/items/{item_id}"),
            |rb| rb,
        )
        .await?;
    check_status(response).await?;
    debug!(item_id, "Deleted item");
    Ok(())
}
