use std::sync::{Arc, OnceLock};

use airweave_entities::{Entity, PolymorphicEntity};
use async_trait::async_trait;
use futures::stream::BoxStream;
use neo4rs::Graph;
use serde::Deserialize;

use crate::error::SourceError;
use crate::file_service::FileService;
use crate::token_manager::TokenManager;

use super::{RunningSource, SourceConnector};

/// Polymorphic DB-table connector modeled on the source system's Neo4j
/// connector (`original_source/.../sources/neo4j.py`): every node label
/// becomes one `PolymorphicEntity` table, every node one row, since the
/// schema is only knowable at connect time.
#[derive(Debug, Deserialize, Clone)]
pub struct Neo4jTableConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub label: String,
}

pub struct Neo4jTableConnectorFactory;

impl SourceConnector for Neo4jTableConnectorFactory {
    fn create(&self, config: serde_json::Value) -> Result<Box<dyn RunningSource>, SourceError> {
        let config: Neo4jTableConfig = serde_json::from_value(config)
            .map_err(|e| SourceError::ValidationFailed(format!("invalid neo4j_table config: {e}")))?;
        Ok(Box::new(Neo4jTableConnector {
            config,
            graph: OnceLock::new(),
            token_manager: OnceLock::new(),
            file_service: OnceLock::new(),
        }))
    }
}

pub struct Neo4jTableConnector {
    config: Neo4jTableConfig,
    graph: OnceLock<Graph>,
    // Row sources have no bearer-token concept; kept for trait uniformity.
    token_manager: OnceLock<Arc<TokenManager>>,
    file_service: OnceLock<Arc<FileService>>,
}

#[async_trait]
impl RunningSource for Neo4jTableConnector {
    fn set_token_manager(&mut self, token_manager: Arc<TokenManager>) {
        let _ = self.token_manager.set(token_manager);
    }

    fn set_file_downloader(&mut self, file_service: Arc<FileService>) {
        let _ = self.file_service.set(file_service);
    }

    async fn validate(&self) -> bool {
        match Graph::new(&self.config.uri, &self.config.user, &self.config.password).await {
            Ok(graph) => {
                let ok = graph.run(neo4rs::query("RETURN 1")).await.is_ok();
                let _ = self.graph.set(graph);
                ok
            }
            Err(_) => false,
        }
    }

    fn generate_entities(&self) -> BoxStream<'_, Result<Entity, SourceError>> {
        Box::pin(async_stream::try_stream! {
            let graph = self.graph.get().ok_or_else(|| {
                SourceError::ValidationFailed("connector not validated before streaming".into())
            })?;
            let cypher = format!("MATCH (n:{}) RETURN n", self.config.label);
            let mut result = graph
                .execute(neo4rs::query(&cypher))
                .await
                .map_err(|e| SourceError::Malformed(e.to_string()))?;

            while let Ok(Some(row)) = result.next().await {
                let node: neo4rs::Node = row.get("n").map_err(|e| SourceError::Malformed(e.to_string()))?;
                let id = node.id().to_string();
                let mut entity = PolymorphicEntity::new(&id, &self.config.label, vec!["id".into()]);
                for key in node.keys() {
                    if let Ok(value) = node.get::<String>(key) {
                        entity.fields.insert(key.to_string(), serde_json::json!(value));
                    }
                }
                yield Entity::Polymorphic(entity);
            }
        })
    }
}
