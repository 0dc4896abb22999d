//! Graph export
//!
//! JSON persistence of the [`KnowledgeGraph`] and conversion to a
//! `petgraph` directed graph for downstream graph algorithms.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use dkg_core::{DocumentId, Provenance};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::{Entity, EntityId, GraphError, KnowledgeGraph, RelationEdge, Result, TypeConflict};

/// Serialized relation, naming its endpoints by canonical name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub evidence_count: usize,
    #[serde(default)]
    pub evidence: Vec<Provenance>,
}

/// Serialized form of a knowledge graph
///
/// Nodes are ordered by canonical name, edges by `(subject, predicate,
/// object)` name, evidence by document and sentence, so equal graphs
/// serialize to equal bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<Entity>,
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub conflicts: Vec<TypeConflict>,
    #[serde(default)]
    pub documents: Vec<DocumentId>,
}

impl From<&KnowledgeGraph> for GraphDocument {
    fn from(graph: &KnowledgeGraph) -> Self {
        let mut nodes: Vec<Entity> = graph.entities().cloned().collect();
        nodes.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));

        let name = |id: &EntityId| {
            graph
                .entity(id)
                .map(|e| e.canonical_name.clone())
                .unwrap_or_default()
        };
        let mut edges: Vec<GraphEdge> = graph
            .edges()
            .map(|edge| {
                let mut evidence = edge.evidence.clone();
                evidence.sort();
                GraphEdge {
                    subject: name(&edge.subject),
                    predicate: edge.predicate.clone(),
                    object: name(&edge.object),
                    evidence_count: edge.evidence_count,
                    evidence,
                }
            })
            .collect();
        edges.sort_by(|a, b| {
            (&a.subject, &a.predicate, &a.object).cmp(&(&b.subject, &b.predicate, &b.object))
        });

        Self {
            nodes,
            edges,
            conflicts: graph.conflicts().to_vec(),
            documents: graph.documents().iter().cloned().collect(),
        }
    }
}

impl TryFrom<GraphDocument> for KnowledgeGraph {
    type Error = GraphError;

    fn try_from(document: GraphDocument) -> Result<Self> {
        let mut entities = BTreeMap::new();
        for node in document.nodes {
            let name = node.canonical_name.clone();
            if entities.insert(node.id, node).is_some() {
                return Err(GraphError::Invariant(format!("duplicate entity {name:?}")));
            }
        }

        let mut edges = BTreeMap::new();
        for edge in document.edges {
            let edge = RelationEdge {
                subject: EntityId::for_name(&edge.subject),
                predicate: edge.predicate,
                object: EntityId::for_name(&edge.object),
                evidence_count: edge.evidence_count,
                evidence: edge.evidence,
            };
            let predicate = edge.predicate.clone();
            if edges.insert(edge.key(), edge).is_some() {
                return Err(GraphError::Invariant(format!("duplicate edge {predicate:?}")));
            }
        }

        let documents: BTreeSet<DocumentId> = document.documents.into_iter().collect();
        let graph = KnowledgeGraph::from_parts(entities, edges, document.conflicts, documents);
        graph.validate()?;
        Ok(graph)
    }
}

impl KnowledgeGraph {
    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&GraphDocument::from(self))?)
    }

    /// Rebuild a graph from JSON, checking its invariants
    pub fn from_json(json: &str) -> Result<Self> {
        let document: GraphDocument = serde_json::from_str(json)?;
        Self::try_from(document)
    }

    /// Write the graph as JSON to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| GraphError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read a graph from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Directed `petgraph` view: one node per entity, one edge per relation
    pub fn to_petgraph(&self) -> DiGraph<Entity, RelationEdge> {
        let mut graph = DiGraph::with_capacity(self.entity_count(), self.edge_count());
        let mut index: HashMap<EntityId, NodeIndex> = HashMap::with_capacity(self.entity_count());

        for entity in self.entities() {
            index.insert(entity.id, graph.add_node(entity.clone()));
        }

        for edge in self.edges() {
            if let (Some(&from), Some(&to)) = (index.get(&edge.subject), index.get(&edge.object)) {
                graph.add_edge(from, to, edge.clone());
            }
        }

        graph
    }
}
