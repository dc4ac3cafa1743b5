use airweave_entities::Entity;
use async_trait::async_trait;
use neo4rs::{query, Graph};

use crate::error::DestinationError;

use super::ids::destination_id;
use super::GraphDestination;

impl From<neo4rs::Error> for DestinationError {
    fn from(err: neo4rs::Error) -> Self {
        DestinationError::Transport(err.to_string())
    }
}

/// Bolt-protocol graph destination. Sourced from the broader example pack
/// rather than the teacher, which has no graph database client; `neo4rs`
/// is the ecosystem's standard async Bolt driver.
pub struct Neo4jDestination {
    graph: Graph,
}

impl Neo4jDestination {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, DestinationError> {
        let graph = Graph::new(uri, user, password).await?;
        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphDestination for Neo4jDestination {
    async fn setup_constraints(&self, collection_id: &str) -> Result<(), DestinationError> {
        let label = collection_label(collection_id);
        let cypher = format!(
            "CREATE CONSTRAINT {label}_entity_id IS UNIQUE FOR (n:{label}) REQUIRE n.entity_id IS UNIQUE"
        );
        self.graph.run(query(&cypher)).await?;
        Ok(())
    }

    async fn upsert_nodes(&self, collection_id: &str, entities: &[Entity]) -> Result<(), DestinationError> {
        let label = collection_label(collection_id);
        let rows: Vec<neo4rs::BoltType> = entities
            .iter()
            .map(|entity| {
                let id = destination_id(collection_id, entity);
                let payload = serde_json::to_string(entity).unwrap_or_default();
                neo4rs::BoltType::Map(neo4rs::BoltMap::from_iter([
                    (neo4rs::BoltString::from("entity_id".to_string()), neo4rs::BoltType::from(id)),
                    (neo4rs::BoltString::from("payload".to_string()), neo4rs::BoltType::from(payload)),
                ]))
            })
            .collect();

        let cypher = format!(
            "UNWIND $rows AS row MERGE (n:{label} {{entity_id: row.entity_id}}) SET n.payload = row.payload"
        );
        self.graph
            .run(query(&cypher).param("rows", rows))
            .await?;
        Ok(())
    }

    async fn upsert_parent_edges(&self, collection_id: &str, edges: &[(String, String)]) -> Result<(), DestinationError> {
        let label = collection_label(collection_id);
        let rows: Vec<neo4rs::BoltType> = edges
            .iter()
            .map(|(parent, child)| {
                neo4rs::BoltType::Map(neo4rs::BoltMap::from_iter([
                    (neo4rs::BoltString::from("parent".to_string()), neo4rs::BoltType::from(parent.clone())),
                    (neo4rs::BoltString::from("child".to_string()), neo4rs::BoltType::from(child.clone())),
                ]))
            })
            .collect();

        let cypher = format!(
            "UNWIND $rows AS row \
             MATCH (p:{label} {{entity_id: row.parent}}), (c:{label} {{entity_id: row.child}}) \
             MERGE (p)-[:IS_PARENT_OF]->(c)"
        );
        self.graph
            .run(query(&cypher).param("rows", rows))
            .await?;
        Ok(())
    }

    async fn bulk_delete_by_parent_id(&self, collection_id: &str, parent_entity_id: &str) -> Result<(), DestinationError> {
        let label = collection_label(collection_id);
        let cypher = format!(
            "MATCH (p:{label} {{entity_id: $parent}})-[:IS_PARENT_OF]->(c:{label}) DETACH DELETE c"
        );
        self.graph
            .run(query(&cypher).param("parent", parent_entity_id.to_string()))
            .await?;
        Ok(())
    }
}

/// Neo4j labels cannot contain `:` or start with a digit; collection IDs
/// are UUIDs, so prefix and strip hyphens to get a valid label.
fn collection_label(collection_id: &str) -> String {
    format!("Collection_{}", collection_id.replace('-', ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_label_strips_hyphens() {
        assert_eq!(collection_label("ab-cd-12"), "Collection_abcd12");
    }
}
