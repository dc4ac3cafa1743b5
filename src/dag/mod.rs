mod transformer;

pub use transformer::{Transformer, TransformerRegistry};

use std::collections::{HashMap, HashSet};

use airweave_entities::{Entity, EntityDefinitionId};

use crate::destinations::Destinations;
use crate::error::{SyncError, SyncFailureError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DagNodeId(pub String);

#[derive(Debug, Clone)]
pub enum DagNode {
    Source { id: DagNodeId },
    Transformer { id: DagNodeId, name: String },
    Destination { id: DagNodeId, name: String },
    Entity { id: DagNodeId, definition_id: EntityDefinitionId },
}

impl DagNode {
    pub fn id(&self) -> &DagNodeId {
        match self {
            DagNode::Source { id }
            | DagNode::Transformer { id, .. }
            | DagNode::Destination { id, .. }
            | DagNode::Entity { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DagEdge {
    pub from: DagNodeId,
    pub to: DagNodeId,
    pub entity_definition_filter: Option<EntityDefinitionId>,
}

/// Static routing graph for one sync: entities flow from the source node
/// through transformer nodes to destination nodes, optionally filtered by
/// entity definition per edge. Built once per run and reused for every
/// entity, never mutated mid-run.
#[derive(Debug, Clone)]
pub struct Dag {
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
}

impl Dag {
    /// Validates the graph has no cycle reachable from any node, via DFS
    /// with an explicit recursion-stack set (a cycle would otherwise make
    /// `DAGRouter::route`'s recursion non-terminating).
    pub fn validate_acyclic(&self) -> Result<(), SyncError> {
        let mut adjacency: HashMap<&DagNodeId, Vec<&DagNodeId>> = HashMap::new();
        for edge in &self.edges {
            adjacency.entry(&edge.from).or_default().push(&edge.to);
        }

        let mut visited: HashSet<&DagNodeId> = HashSet::new();
        let mut on_stack: HashSet<&DagNodeId> = HashSet::new();

        for node in &self.nodes {
            if !visited.contains(node.id()) {
                Self::dfs(node.id(), &adjacency, &mut visited, &mut on_stack)?;
            }
        }
        Ok(())
    }

    fn dfs<'a>(
        node: &'a DagNodeId,
        adjacency: &HashMap<&'a DagNodeId, Vec<&'a DagNodeId>>,
        visited: &mut HashSet<&'a DagNodeId>,
        on_stack: &mut HashSet<&'a DagNodeId>,
    ) -> Result<(), SyncError> {
        visited.insert(node);
        on_stack.insert(node);

        if let Some(neighbors) = adjacency.get(node) {
            for next in neighbors {
                if on_stack.contains(next) {
                    return Err(SyncError::CyclicDag(next.0.clone()));
                }
                if !visited.contains(next) {
                    Self::dfs(next, adjacency, visited, on_stack)?;
                }
            }
        }

        on_stack.remove(node);
        Ok(())
    }

    fn outgoing_edges(&self, from: &DagNodeId) -> impl Iterator<Item = &DagEdge> {
        self.edges.iter().filter(move |e| &e.from == from)
    }
}

pub enum RouteOutcome {
    /// The entity reached one or more destinations.
    Delivered(usize),
    /// The entity had no matching outgoing edge from this producer.
    Unrouted,
}

/// Walks a validated [`Dag`] for one entity, recursing through transformer
/// nodes and handing terminal entities off to [`Destinations`]. Transformer
/// callables are resolved once at construction from a closed
/// [`TransformerRegistry`] — no per-entity lookup happens during routing.
pub struct DagRouter {
    dag: Dag,
    transformers: TransformerRegistry,
}

impl DagRouter {
    pub fn new(dag: Dag, transformers: TransformerRegistry) -> Result<Self, SyncError> {
        dag.validate_acyclic()?;
        for node in &dag.nodes {
            if let DagNode::Transformer { name, .. } = node {
                if transformers.resolve(name).is_none() {
                    return Err(SyncError::UnknownTransformer(name.clone()));
                }
            }
        }
        Ok(Self { dag, transformers })
    }

    /// `skip_content_handlers` bypasses every [`DagNode::Transformer`] node
    /// reached while routing: the entity passes straight through to that
    /// transformer's own outgoing edges instead of being re-chunked/
    /// re-embedded. Set for cross-sync-deduped inserts whose content
    /// already exists elsewhere in the collection under the same hash.
    pub async fn route(
        &self,
        producer: &DagNodeId,
        entity: Entity,
        destinations: &Destinations,
        skip_content_handlers: bool,
    ) -> Result<RouteOutcome, SyncFailureError> {
        let mut delivered = 0;
        let mut stack = vec![(producer.clone(), entity)];

        while let Some((producer, entity)) = stack.pop() {
            let mut matched = false;
            for edge in self.dag.outgoing_edges(&producer) {
                if let Some(filter) = &edge.entity_definition_filter {
                    if entity.entity_definition_id() != Some(filter) {
                        continue;
                    }
                }
                matched = true;
                let Some(to_node) = self.dag.nodes.iter().find(|n| n.id() == &edge.to) else {
                    return Err(SyncError::DanglingEdge {
                        from: edge.from.0.clone(),
                        to: edge.to.0.clone(),
                    }
                    .into());
                };

                match to_node {
                    DagNode::Destination { name, .. } => {
                        destinations.persist(name, entity.clone()).await?;
                        delivered += 1;
                    }
                    DagNode::Transformer { id, name } => {
                        if skip_content_handlers {
                            stack.push((id.clone(), entity.clone()));
                            continue;
                        }
                        let transformer = self
                            .transformers
                            .resolve(name)
                            .ok_or_else(|| SyncError::UnknownTransformer(name.clone()))?;
                        let produced = transformer.transform(entity.clone())?;
                        for output in produced {
                            stack.push((id.clone(), output));
                        }
                    }
                    DagNode::Source { .. } | DagNode::Entity { .. } => {}
                }
            }
            if !matched {
                continue;
            }
        }

        Ok(if delivered > 0 {
            RouteOutcome::Delivered(delivered)
        } else {
            RouteOutcome::Unrouted
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> DagNodeId {
        DagNodeId(id.to_string())
    }

    #[test]
    fn acyclic_dag_validates() {
        let dag = Dag {
            nodes: vec![
                DagNode::Source { id: node("src") },
                DagNode::Destination { id: node("dst"), name: "qdrant".into() },
            ],
            edges: vec![DagEdge { from: node("src"), to: node("dst"), entity_definition_filter: None }],
        };
        assert!(dag.validate_acyclic().is_ok());
    }

    #[test]
    fn cyclic_dag_is_rejected() {
        let dag = Dag {
            nodes: vec![
                DagNode::Transformer { id: node("a"), name: "t1".into() },
                DagNode::Transformer { id: node("b"), name: "t2".into() },
            ],
            edges: vec![
                DagEdge { from: node("a"), to: node("b"), entity_definition_filter: None },
                DagEdge { from: node("b"), to: node("a"), entity_definition_filter: None },
            ],
        };
        assert!(matches!(dag.validate_acyclic(), Err(SyncError::CyclicDag(_))));
    }
}
