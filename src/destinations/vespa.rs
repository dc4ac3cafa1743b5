use airweave_entities::Entity;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::error::DestinationError;

use super::ids::destination_id;
use super::{ProcessingRequirement, VectorDestination};

/// Vespa's document API does not support `delete_by_selection` reliably
/// across all deployment modes; `bulk_delete_by_parent_id`/`delete_by_sync_id`
/// try the selection-delete endpoint first and fall back to a visit-and-delete
/// scan if the cluster rejects it, per the tradeoff documented for this
/// destination.
pub struct VespaDestination {
    base_url: String,
    namespace: String,
    client: reqwest::Client,
    retry_policy: ExponentialBuilder,
}

impl VespaDestination {
    pub fn new(base_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            namespace: namespace.into(),
            client: reqwest::Client::new(),
            retry_policy: ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(200))
                .with_max_times(3)
                .with_jitter(),
        }
    }

    fn document_url(&self, collection_id: &str, doc_id: &str) -> String {
        format!(
            "{}/document/v1/{}/{}/docid/{}",
            self.base_url, self.namespace, collection_id, doc_id
        )
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

    /// Best-effort: Vespa's `selection` query parameter works for most
    /// single-node and small multi-node deployments but is not guaranteed
    /// by the document API contract, so a non-success response here falls
    /// through to [`Self::scan_and_delete`] instead of propagating.
    async fn delete_by_selection(&self, collection_id: &str, selection: &str) -> Result<(), DestinationError> {
        let url = format!(
            "{}/document/v1/{}/{}/docid?selection={}&cluster=default",
            self.base_url,
            self.namespace,
            collection_id,
            urlencoding_lite(selection)
        );
        let response = self.client.delete(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(DestinationError::UpstreamStatus {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    /// Walks the visit API page by page, deleting matching documents
    /// individually. Used only when [`Self::delete_by_selection`] fails.
    async fn scan_and_delete(&self, collection_id: &str, field: &str, value: &str) -> Result<(), DestinationError> {
        let mut continuation: Option<String> = None;
        loop {
            let mut url = format!(
                "{}/document/v1/{}/{}/docid?wantedDocumentCount=100",
                self.base_url, self.namespace, collection_id
            );
            if let Some(token) = &continuation {
                url.push_str(&format!("&continuation={token}"));
            }
            let response = self.client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(DestinationError::UpstreamStatus {
                    status: response.status().as_u16(),
                    body: response.text().await.unwrap_or_default(),
                });
            }
            let page: serde_json::Value = response.json().await?;
            let documents = page.get("documents").and_then(|d| d.as_array()).cloned().unwrap_or_default();
            for doc in &documents {
                let matches = doc
                    .pointer(&format!("/fields/{field}"))
                    .and_then(|v| v.as_str())
                    .is_some_and(|v| v == value);
                if matches {
                    if let Some(id) = doc.get("id").and_then(|v| v.as_str()) {
                        let delete_url = format!("{}/document/v1/{}/{}/docid/{}", self.base_url, self.namespace, collection_id, id);
                        self.client.delete(&delete_url).send().await?;
                    }
                }
            }
            continuation = page.get("continuation").and_then(|v| v.as_str()).map(str::to_string);
            if continuation.is_none() || documents.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

fn urlencoding_lite(value: &str) -> String {
    value.replace(' ', "%20").replace('\'', "%27")
}

#[async_trait]
impl VectorDestination for VespaDestination {
    fn processing_requirement(&self) -> ProcessingRequirement {
        ProcessingRequirement::RawChunking
    }

    async fn setup_collection(&self, _collection_id: &str, _vector_size: usize) -> Result<(), DestinationError> {
        // Vespa collections (document types) are provisioned via application
        // package deployment, not a runtime API call; nothing to do here.
        Ok(())
    }

    async fn bulk_insert(&self, _collection_id: &str, _entities: &[Entity]) -> Result<(), DestinationError> {
        Err(DestinationError::Other(
            "Vespa ingests raw chunk text and embeds on write; pre-embedded insert is not supported".into(),
        ))
    }

    async fn bulk_insert_raw(&self, collection_id: &str, entities: &[Entity]) -> Result<(), DestinationError> {
        for entity in entities {
            let id = destination_id(collection_id, entity);
            let body = json!({ "fields": entity });
            let request = self.client.post(self.document_url(collection_id, &id)).json(&body);
            self.send_checked(request).await?;
        }
        Ok(())
    }

    async fn delete(&self, collection_id: &str, entity_id: &str) -> Result<(), DestinationError> {
        let id = super::ids::point_id(collection_id, entity_id);
        let request = self.client.delete(self.document_url(collection_id, &id));
        self.send_checked(request).await
    }

    async fn bulk_delete(&self, collection_id: &str, entity_ids: &[String]) -> Result<(), DestinationError> {
        for entity_id in entity_ids {
            self.delete(collection_id, entity_id).await?;
        }
        Ok(())
    }

    async fn bulk_delete_by_parent_id(&self, collection_id: &str, parent_entity_id: &str) -> Result<(), DestinationError> {
        let selection = format!(
            "{collection_id}.airweave_system_metadata.original_entity_id=='{parent_entity_id}'"
        );
        if self.delete_by_selection(collection_id, &selection).await.is_ok() {
            return Ok(());
        }
        self.scan_and_delete(collection_id, "airweave_system_metadata.original_entity_id", parent_entity_id)
            .await
    }

    async fn delete_by_sync_id(&self, collection_id: &str, sync_id: Uuid) -> Result<(), DestinationError> {
        let sync_id = sync_id.to_string();
        let selection = format!("{collection_id}.airweave_system_metadata.sync_id=='{sync_id}'");
        if self.delete_by_selection(collection_id, &selection).await.is_ok() {
            return Ok(());
        }
        self.scan_and_delete(collection_id, "airweave_system_metadata.sync_id", &sync_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencoding_lite_escapes_spaces_and_quotes() {
        assert_eq!(urlencoding_lite("a b'c"), "a%20b%27c");
    }
}
