//! Library resolution, folder listing, lookup, folder creation, deletion

use serde_json::json;
use spsync_graph::{items, site};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, DRIVE_ID, LIST_ID, ROOT_ID, SITE_ID};

// ============================================================================
// Site bootstrap
// ============================================================================

#[tokio::test]
async fn test_resolve_library_with_existing_column() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_site_bootstrap(
        &server,
        "Documents/Reports",
        json!([{ "name": "Title" }, { "name": "FileHash", "displayName": "FileHash" }]),
    )
    .await;

    let context = site::resolve_library(
        &client,
        "contoso.sharepoint.com",
        "Team",
        "Documents/Reports",
        "Documents",
    )
    .await
    .unwrap();

    assert_eq!(context.site_id, SITE_ID);
    assert_eq!(context.drive_id, DRIVE_ID);
    assert_eq!(context.root_item_id, ROOT_ID);
    assert_eq!(context.list_id.as_deref(), Some(LIST_ID));
    assert!(context.hash_column_available);
}

#[tokio::test]
async fn test_resolve_library_creates_missing_column() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_site_bootstrap(&server, "Reports", json!([{ "name": "Title" }])).await;

    Mock::given(method("POST"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/columns")))
        .and(body_partial_json(json!({
            "name": "FileHash",
            "text": { "maxLength": 255 }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "col-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let context = site::resolve_library(&client, "contoso.sharepoint.com", "Team", "Reports", "Documents")
        .await
        .unwrap();
    assert!(context.hash_column_available);
}

#[tokio::test]
async fn test_column_creation_denied_degrades() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_site_bootstrap(&server, "Reports", json!([])).await;

    Mock::given(method("POST"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/columns")))
        .respond_with(ResponseTemplate::new(403).set_body_string("accessDenied"))
        .mount(&server)
        .await;

    let context = site::resolve_library(&client, "contoso.sharepoint.com", "Team", "Reports", "Documents")
        .await
        .unwrap();
    assert!(!context.hash_column_available);
    assert_eq!(context.list_id.as_deref(), Some(LIST_ID));
}

#[tokio::test]
async fn test_unknown_library_falls_back_to_shared_documents() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_site_bootstrap(&server, "Reports", json!([{ "name": "FileHash" }])).await;

    let list_id = site::find_list_id(&client, SITE_ID, "Engineering").await.unwrap();
    assert_eq!(list_id.as_deref(), Some(LIST_ID));
}

#[tokio::test]
async fn test_missing_upload_path_is_an_error() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_site_bootstrap(&server, "Reports", json!([])).await;

    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/drives/{DRIVE_ID}/root:/Missing")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "itemNotFound" }
        })))
        .mount(&server)
        .await;

    let err = site::resolve_library(&client, "contoso.sharepoint.com", "Team", "Missing", "Documents")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("Missing"));
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_children_follows_next_link() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}/children")))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [common::folder_item("f-1", "docs")]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}/children")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                common::file_item("i-1", "a.txt", 10, "1", Some("0123456789abcdef0123456789abcdef")),
                common::file_item("i-2", "b.txt", 20, "2", None)
            ],
            "@odata.nextLink": format!(
                "{}/drives/{DRIVE_ID}/items/{ROOT_ID}/children?page=2",
                server.uri()
            )
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let children = items::list_children(&client, DRIVE_ID, ROOT_ID).await.unwrap();
    assert_eq!(children.len(), 3);
    assert!(children[0].fingerprint().is_some());
    assert!(children[1].fingerprint().is_none());
    assert!(children[2].is_folder());

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0]
        .url
        .query()
        .unwrap_or_default()
        .contains("listItem"));
}

#[tokio::test]
async fn test_get_child_not_found_is_none() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/sites/{SITE_ID}/drives/{DRIVE_ID}/items/{ROOT_ID}:/missing.txt"
        )))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/sites/{SITE_ID}/drives/{DRIVE_ID}/items/{ROOT_ID}:/present.txt"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::file_item(
            "i-9",
            "present.txt",
            5,
            "9",
            None,
        )))
        .mount(&server)
        .await;

    let missing = items::get_child(&client, SITE_ID, DRIVE_ID, ROOT_ID, "missing.txt")
        .await
        .unwrap();
    assert!(missing.is_none());

    let present = items::get_child(&client, SITE_ID, DRIVE_ID, ROOT_ID, "present.txt")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(present.list_item_id().as_deref(), Some("9"));
}

// ============================================================================
// Folder creation and deletion
// ============================================================================

#[tokio::test]
async fn test_create_folder_name_conflict_is_none() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("POST"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}/children")))
        .and(body_partial_json(json!({
            "name": "docs",
            "@microsoft.graph.conflictBehavior": "fail"
        })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": { "code": "nameAlreadyExists", "message": "Name already exists" }
        })))
        // A name collision is answered once, without lock-conflict backoff.
        .expect(1)
        .mount(&server)
        .await;

    let created = items::create_folder(&client, DRIVE_ID, ROOT_ID, "docs").await.unwrap();
    assert!(created.is_none());
}

#[tokio::test]
async fn test_create_folder_returns_item() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("POST"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}/children")))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::folder_item("f-7", "new")))
        .mount(&server)
        .await;

    let created = items::create_folder(&client, DRIVE_ID, ROOT_ID, "new")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.id, "f-7");
    assert!(created.is_folder());
}

#[tokio::test]
async fn test_delete_item() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("DELETE"))
        .and(path(format!("/drives/{DRIVE_ID}/items/i-1")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/drives/{DRIVE_ID}/items/gone")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    items::delete_item(&client, DRIVE_ID, "i-1").await.unwrap();
    let err = items::delete_item(&client, DRIVE_ID, "gone").await.unwrap_err();
    assert!(err.is_not_found());
}
