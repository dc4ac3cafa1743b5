use airweave_entities::Entity;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::error::DestinationError;

use super::ids::destination_id;
use super::{ProcessingRequirement, VectorDestination};

/// Talks to Qdrant's REST API directly rather than through its SDK,
/// mirroring the teacher's hand-rolled `reqwest` upstream client pattern
/// (`providers/upstream_retry.rs`) instead of adopting a second HTTP
/// abstraction just for this one destination.
pub struct QdrantDestination {
    base_url: String,
    client: reqwest::Client,
    api_key: Option<String>,
    retry_policy: ExponentialBuilder,
}

impl QdrantDestination {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            api_key,
            retry_policy: ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(200))
                .with_max_times(3)
                .with_jitter(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    async fn send_checked(&self, request: reqwest::RequestBuilder) -> Result<(), DestinationError> {
        (|| async {
            let response = request.try_clone().expect("no streaming body").send().await?;
            if response.status().is_success() {
                Ok(())
            } else {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(DestinationError::UpstreamStatus { status, body })
            }
        })
        .retry(self.retry_policy)
        .when(super::IsRetryable::is_retryable)
        .await
    }

    fn point_payload(&self, collection_id: &str, entity: &Entity) -> serde_json::Value {
        let metadata = entity.system_metadata();
        let dense = metadata.and_then(|m| m.dense_embedding.clone()).unwrap_or_default();
        json!({
            "id": destination_id(collection_id, entity),
            "vector": dense,
            "payload": entity,
        })
    }
}

#[async_trait]
impl VectorDestination for QdrantDestination {
    fn processing_requirement(&self) -> ProcessingRequirement {
        ProcessingRequirement::PreEmbedded
    }

    async fn setup_collection(&self, collection_id: &str, vector_size: usize) -> Result<(), DestinationError> {
        let body = json!({
            "vectors": { "size": vector_size, "distance": "Cosine" }
        });
        let request = self
            .request(reqwest::Method::PUT, &format!("/collections/{collection_id}"))
            .json(&body);
        self.send_checked(request).await
    }

    async fn bulk_insert(&self, collection_id: &str, entities: &[Entity]) -> Result<(), DestinationError> {
        let points: Vec<_> = entities.iter().map(|e| self.point_payload(collection_id, e)).collect();
        let body = json!({ "points": points });
        let request = self
            .request(reqwest::Method::PUT, &format!("/collections/{collection_id}/points"))
            .json(&body);
        self.send_checked(request).await
    }

    async fn bulk_insert_raw(&self, _collection_id: &str, _entities: &[Entity]) -> Result<(), DestinationError> {
        Err(DestinationError::Other(
            "Qdrant requires pre-embedded points; raw-chunking insert is not supported".into(),
        ))
    }

    async fn delete(&self, collection_id: &str, entity_id: &str) -> Result<(), DestinationError> {
        self.bulk_delete(collection_id, std::slice::from_ref(&entity_id.to_string())).await
    }

    async fn bulk_delete(&self, collection_id: &str, entity_ids: &[String]) -> Result<(), DestinationError> {
        let ids: Vec<String> = entity_ids
            .iter()
            .map(|id| super::ids::point_id(collection_id, id))
            .collect();
        let body = json!({ "points": ids });
        let request = self
            .request(reqwest::Method::POST, &format!("/collections/{collection_id}/points/delete"))
            .json(&body);
        self.send_checked(request).await
    }

    async fn bulk_delete_by_parent_id(&self, collection_id: &str, parent_entity_id: &str) -> Result<(), DestinationError> {
        let body = json!({
            "filter": {
                "must": [{ "key": "airweave_system_metadata.original_entity_id", "match": { "value": parent_entity_id } }]
            }
        });
        let request = self
            .request(reqwest::Method::POST, &format!("/collections/{collection_id}/points/delete"))
            .json(&body);
        self.send_checked(request).await
    }

    async fn delete_by_sync_id(&self, collection_id: &str, sync_id: Uuid) -> Result<(), DestinationError> {
        let body = json!({
            "filter": {
                "must": [{ "key": "airweave_system_metadata.sync_id", "match": { "value": sync_id.to_string() } }]
            }
        });
        let request = self
            .request(reqwest::Method::POST, &format!("/collections/{collection_id}/points/delete"))
            .json(&body);
        self.send_checked(request).await
    }
}
