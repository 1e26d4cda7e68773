//! Shared test helpers for Graph API integration tests
//!
//! Each helper mounts the endpoints a test needs and returns a client
//! pointing at the mock server. Retry backoff runs in milliseconds.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spsync_graph::client::{GraphClient, RetryPolicy};

pub const SITE_ID: &str = "contoso.sharepoint.com,site-guid,web-guid";
pub const DRIVE_ID: &str = "drive-001";
pub const LIST_ID: &str = "list-001";
pub const ROOT_ID: &str = "root-001";

/// Millisecond backoff with a 10 ms default `Retry-After`.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        backoff_unit: Duration::from_millis(1),
        default_retry_after: Duration::from_millis(10),
    }
}

/// Starts a mock server and returns a client with fast retries.
pub async fn setup_graph_mock() -> (MockServer, GraphClient) {
    let server = MockServer::start().await;
    let client =
        GraphClient::with_base_url("test-access-token", server.uri()).with_retry_policy(fast_retry());
    (server, client)
}

/// A DriveItem JSON body for a file.
pub fn file_item(id: &str, name: &str, size: u64, list_item_id: &str, hash: Option<&str>) -> Value {
    let mut fields = json!({ "FileLeafRef": name });
    if let Some(hash) = hash {
        fields["FileHash"] = json!(hash);
    }
    json!({
        "id": id,
        "name": name,
        "size": size,
        "file": { "mimeType": "application/octet-stream" },
        "parentReference": { "id": "parent" },
        "listItem": { "id": list_item_id, "fields": fields }
    })
}

/// A DriveItem JSON body for a folder.
pub fn folder_item(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "folder": { "childCount": 0 },
        "listItem": { "id": format!("li-{id}"), "fields": { "FileLeafRef": name } }
    })
}

/// Mounts site, drive, root folder, and lists endpoints.
///
/// `columns` is the column listing returned for the library list.
pub async fn mount_site_bootstrap(server: &MockServer, upload_path: &str, columns: Value) {
    Mock::given(method("GET"))
        .and(path("/sites/contoso.sharepoint.com:/sites/Team"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": SITE_ID })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/drive")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": DRIVE_ID })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/drives/{DRIVE_ID}/root:/{upload_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": ROOT_ID,
            "name": upload_path.rsplit('/').next().unwrap_or(upload_path),
            "folder": {}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/lists")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "list-other", "name": "Lists", "displayName": "Site Pages" },
                { "id": LIST_ID, "name": "Shared Documents", "displayName": "Documents" }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/columns")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": columns })))
        .mount(server)
        .await;
}
