//! List item field writes
//!
//! The `FileHash` column lives on the list item behind each drive item, so
//! fingerprints are written with `PATCH /sites/{s}/lists/{l}/items/{id}/fields`.
//! Many writes at once go through JSON `$batch` requests of at most
//! [`MAX_BATCH_REQUESTS`] operations.

use std::collections::HashMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use spsync_core::domain::Fingerprint;
use tracing::{debug, warn};

use crate::client::{check_status, decode_json, GraphClient};
use crate::site::HASH_COLUMN_NAME;
use crate::GraphError;

/// Graph rejects `$batch` payloads with more than 20 requests.
pub const MAX_BATCH_REQUESTS: usize = 20;

#[derive(Debug, Serialize)]
struct BatchRequest {
    id: String,
    method: &'static str,
    url: String,
    body: serde_json::Value,
    headers: HashMap<&'static str, &'static str>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<BatchItemResponse>,
}

#[derive(Debug, Deserialize)]
struct BatchItemResponse {
    id: String,
    status: u16,
}

fn fields_path(site_id: &str, list_id: &str, list_item_id: &str) -> String {
    format!("/sites/{site_id}/lists/{list_id}/items/{list_item_id}/fields")
}

/// Writes `FileHash` on one list item.
pub async fn update_fingerprint(
    client: &GraphClient,
    site_id: &str,
    list_id: &str,
    list_item_id: &str,
    fingerprint: &Fingerprint,
) -> Result<(), GraphError> {
    let body = json!({ HASH_COLUMN_NAME: fingerprint.as_str() });
    let response = client
        .send(
            Method::PATCH,
            &fields_path(site_id, list_id, list_item_id),
            |rb| rb.json(&body),
        )
        .await?;
    check_status(response).await?;
    debug!(list_item_id, "FileHash written");
    Ok(())
}

/// Writes `FileHash` on many list items.
///
/// Returns one flag per input, in input order. A `$batch` request that
/// fails as a whole marks all of its entries as failed; the remaining
/// batches still run.
pub async fn batch_update_fingerprints(
    client: &GraphClient,
    site_id: &str,
    list_id: &str,
    updates: &[(String, Fingerprint)],
) -> Vec<bool> {
    let mut results = vec![false; updates.len()];

    for (batch_index, batch) in updates.chunks(MAX_BATCH_REQUESTS).enumerate() {
        let base = batch_index * MAX_BATCH_REQUESTS;
        let requests: Vec<BatchRequest> = batch
            .iter()
            .enumerate()
            .map(|(i, (list_item_id, fingerprint))| BatchRequest {
                id: (i + 1).to_string(),
                method: "PATCH",
                url: fields_path(site_id, list_id, list_item_id),
                body: json!({ HASH_COLUMN_NAME: fingerprint.as_str() }),
                headers: HashMap::from([("Content-Type", "application/json")]),
            })
            .collect();

        match send_batch(client, &requests).await {
            Ok(responses) => {
                for response in responses {
                    let Ok(position) = response.id.parse::<usize>() else {
                        continue;
                    };
                    if (1..=batch.len()).contains(&position) {
                        results[base + position - 1] = (200..300).contains(&response.status);
                    }
                }
            }
            Err(e) => {
                warn!(batch = batch_index + 1, size = batch.len(), error = %e, "Batch request failed");
            }
        }
    }

    let succeeded = results.iter().filter(|ok| **ok).count();
    debug!(total = updates.len(), succeeded, "Batch FileHash writes finished");
    results
}

async fn send_batch(
    client: &GraphClient,
    requests: &[BatchRequest],
) -> Result<Vec<BatchItemResponse>, GraphError> {
    let payload = json!({ "requests": requests });
    let response = client
        .send(Method::POST, "/$batch", |rb| rb.json(&payload))
        .await?;
    let body: BatchResponse = decode_json(check_status(response).await?).await?;
    Ok(body.responses)
}
