//! DKG Graph - Knowledge graph model and assembly
//!
//! Holds the corpus-wide graph of canonical entities and relation edges:
//! - [`KnowledgeGraph`]: entities keyed by a deterministic id, edges keyed by
//!   `(subject, predicate, object)`, an audit trail of type conflicts
//! - [`GraphAssembler`]: folds per-document triple batches into the graph
//! - [`postprocess`]: subject folding and frequency pruning
//! - [`export`]: JSON persistence and `petgraph` export
//!
//! Invariants held by every graph this crate produces: no two entities share
//! a canonical name, no two edges share a key, no edge is a self-loop.

pub mod assembler;
pub mod export;
pub mod postprocess;

pub use assembler::{GraphAssembler, MergeOutcome};
pub use export::{GraphDocument, GraphEdge};
pub use postprocess::{fold_subject_extensions, prune_infrequent};

use std::collections::{BTreeMap, BTreeSet};

use dkg_core::{DkgError, DocumentId, EntityType, Provenance};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised when loading or checking a graph
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph invariant violated: {0}")]
    Invariant(String),

    #[error("Graph serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl From<GraphError> for DkgError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Serialization(e) => DkgError::Serialization(e),
            GraphError::Io { source, .. } => DkgError::Io(source),
            other => DkgError::Other(anyhow::anyhow!(other)),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Namespace for name-derived entity ids
const ENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x8f2c_51d4_6a3e_4b7f_9d10_c2e8_a4b6_0e53);

/// Stable entity identifier derived from the canonical name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Id of the entity with this canonical name
    pub fn for_name(canonical_name: &str) -> Self {
        Self(Uuid::new_v5(&ENTITY_NAMESPACE, canonical_name.as_bytes()))
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A canonical entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    /// Canonical key all surface forms map to
    pub canonical_name: String,

    /// Resolved type
    pub entity_type: EntityType,

    /// Surface forms observed for this entity
    #[serde(default)]
    pub aliases: BTreeSet<String>,

    /// How often each specific type was suggested
    #[serde(default)]
    pub type_votes: BTreeMap<EntityType, usize>,

    /// Specific types suggested but not chosen
    #[serde(default)]
    pub type_conflicts: BTreeSet<EntityType>,
}

impl Entity {
    pub fn new(canonical_name: impl Into<String>) -> Self {
        let canonical_name = canonical_name.into();
        Self {
            id: EntityId::for_name(&canonical_name),
            canonical_name,
            entity_type: EntityType::Unknown,
            aliases: BTreeSet::new(),
            type_votes: BTreeMap::new(),
            type_conflicts: BTreeSet::new(),
        }
    }
}

// ============================================================================
// Edges
// ============================================================================

/// Identity of a relation edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub subject: EntityId,
    pub predicate: String,
    pub object: EntityId,
}

impl EdgeKey {
    pub fn new(subject: EntityId, predicate: impl Into<String>, object: EntityId) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }
}

/// A relation between two entities with its supporting evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub subject: EntityId,

    /// Canonical predicate
    pub predicate: String,

    pub object: EntityId,

    /// Number of sentences supporting the relation
    pub evidence_count: usize,

    /// Where the relation was observed
    #[serde(default)]
    pub evidence: Vec<Provenance>,
}

impl RelationEdge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.subject, self.predicate.clone(), self.object)
    }
}

/// A type disagreement noticed while merging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConflict {
    pub entity: EntityId,
    pub canonical_name: String,
    /// Type held before the conflicting suggestion
    pub existing: EntityType,
    /// Type suggested by the new evidence
    pub incoming: EntityType,
    /// Type held after applying the precedence rule
    pub resolved: EntityType,
    pub document_id: DocumentId,
}

// ============================================================================
// Knowledge Graph
// ============================================================================

/// Summary counts of a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub entities: usize,
    pub edges: usize,
    pub total_evidence: usize,
    pub conflicts: usize,
    pub documents: usize,
    pub components: usize,
    pub entities_by_type: BTreeMap<EntityType, usize>,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Entities:   {}", self.entities)?;
        writeln!(f, "Edges:      {}", self.edges)?;
        writeln!(f, "Evidence:   {}", self.total_evidence)?;
        writeln!(f, "Conflicts:  {}", self.conflicts)?;
        writeln!(f, "Documents:  {}", self.documents)?;
        writeln!(f, "Components: {}", self.components)?;
        for (entity_type, count) in &self.entities_by_type {
            writeln!(f, "  {:<12} {count}", entity_type.as_str())?;
        }
        Ok(())
    }
}

/// Corpus-wide knowledge graph
///
/// Mutated only through [`GraphAssembler`] and the post-processing passes,
/// which keep the uniqueness and no-self-loop invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeGraph {
    entities: BTreeMap<EntityId, Entity>,
    edges: BTreeMap<EdgeKey, RelationEdge>,
    conflicts: Vec<TypeConflict>,
    documents: BTreeSet<DocumentId>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in id order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Edges in key order
    pub fn edges(&self) -> impl Iterator<Item = &RelationEdge> {
        self.edges.values()
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Look up an entity by canonical name
    pub fn entity_by_name(&self, canonical_name: &str) -> Option<&Entity> {
        self.entities.get(&EntityId::for_name(canonical_name))
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&RelationEdge> {
        self.edges.get(key)
    }

    /// Edge between two named entities with a canonical predicate
    pub fn find_edge(&self, subject: &str, predicate: &str, object: &str) -> Option<&RelationEdge> {
        self.edges.get(&EdgeKey::new(
            EntityId::for_name(subject),
            predicate,
            EntityId::for_name(object),
        ))
    }

    pub fn conflicts(&self) -> &[TypeConflict] {
        &self.conflicts
    }

    /// Documents that contributed at least one edge
    pub fn documents(&self) -> &BTreeSet<DocumentId> {
        &self.documents
    }

    pub fn stats(&self) -> GraphStats {
        let mut entities_by_type = BTreeMap::new();
        for entity in self.entities.values() {
            *entities_by_type.entry(entity.entity_type).or_insert(0) += 1;
        }

        GraphStats {
            entities: self.entities.len(),
            edges: self.edges.len(),
            total_evidence: self.edges.values().map(|e| e.evidence_count).sum(),
            conflicts: self.conflicts.len(),
            documents: self.documents.len(),
            components: petgraph::algo::connected_components(&self.to_petgraph()),
            entities_by_type,
        }
    }

    /// Check the structural invariants
    pub fn validate(&self) -> Result<()> {
        for (id, entity) in &self.entities {
            if *id != entity.id || EntityId::for_name(&entity.canonical_name) != entity.id {
                return Err(GraphError::Invariant(format!(
                    "entity {:?} does not carry its name-derived id",
                    entity.canonical_name
                )));
            }
        }

        for (key, edge) in &self.edges {
            if *key != edge.key() {
                return Err(GraphError::Invariant(format!(
                    "edge {:?} stored under a different key",
                    edge.predicate
                )));
            }
            if edge.subject == edge.object {
                return Err(GraphError::Invariant(format!(
                    "self-loop on {} via {:?}",
                    edge.subject, edge.predicate
                )));
            }
            if !self.entities.contains_key(&edge.subject) || !self.entities.contains_key(&edge.object)
            {
                return Err(GraphError::Invariant(format!(
                    "edge {:?} references a missing entity",
                    edge.predicate
                )));
            }
            if edge.evidence_count == 0 {
                return Err(GraphError::Invariant(format!(
                    "edge {:?} has no evidence",
                    edge.predicate
                )));
            }
        }

        Ok(())
    }

    // Mutation is crate-private so the invariants stay in one place

    pub(crate) fn entity_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub(crate) fn get_or_create_entity(&mut self, canonical_name: &str) -> (&mut Entity, bool) {
        let id = EntityId::for_name(canonical_name);
        let created = !self.entities.contains_key(&id);
        let entity = self
            .entities
            .entry(id)
            .or_insert_with(|| Entity::new(canonical_name));
        (entity, created)
    }

    /// Add evidence to an edge, creating it if needed; self-loops are refused
    pub(crate) fn add_evidence(
        &mut self,
        key: EdgeKey,
        count: usize,
        evidence: impl IntoIterator<Item = Provenance>,
    ) -> Option<bool> {
        if key.subject == key.object || count == 0 {
            return None;
        }

        let created = !self.edges.contains_key(&key);
        let edge = self.edges.entry(key).or_insert_with_key(|key| RelationEdge {
            subject: key.subject,
            predicate: key.predicate.clone(),
            object: key.object,
            evidence_count: 0,
            evidence: Vec::new(),
        });
        edge.evidence_count += count;
        edge.evidence.extend(evidence);
        Some(created)
    }

    pub(crate) fn record_conflict(&mut self, conflict: TypeConflict) {
        self.conflicts.push(conflict);
    }

    pub(crate) fn record_document(&mut self, document_id: DocumentId) {
        self.documents.insert(document_id);
    }

    /// Drop entities no edge refers to
    pub(crate) fn remove_orphans(&mut self) {
        let referenced: BTreeSet<EntityId> = self
            .edges
            .values()
            .flat_map(|e| [e.subject, e.object])
            .collect();
        self.entities.retain(|id, _| referenced.contains(id));
        self.conflicts.retain(|c| referenced.contains(&c.entity));
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BTreeMap<EntityId, Entity>,
        BTreeMap<EdgeKey, RelationEdge>,
        Vec<TypeConflict>,
        BTreeSet<DocumentId>,
    ) {
        (self.entities, self.edges, self.conflicts, self.documents)
    }

    pub(crate) fn from_parts(
        entities: BTreeMap<EntityId, Entity>,
        edges: BTreeMap<EdgeKey, RelationEdge>,
        conflicts: Vec<TypeConflict>,
        documents: BTreeSet<DocumentId>,
    ) -> Self {
        Self {
            entities,
            edges,
            conflicts,
            documents,
        }
    }
}
