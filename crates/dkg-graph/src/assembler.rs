//! Graph assembly
//!
//! Folds a document's triples into the knowledge graph. A batch is resolved
//! completely (canonical keys, predicates, self-loop filtering) before the
//! graph is touched, and nothing after that point can fail, so a document is
//! applied whole or not at all.

use std::sync::Arc;

use dkg_core::{DocumentId, EntityType, GraphConfig, Provenance, Triple, TypePrecedence};
use dkg_extractor::{canonicalize_predicate, Canonicalizer};

use crate::{EdgeKey, Entity, EntityId, KnowledgeGraph, TypeConflict};

/// What one batch did to the graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Triples that became edge evidence
    pub merged: usize,
    /// Triples dropped (empty key, empty predicate, self-loop)
    pub skipped: usize,
    pub new_entities: usize,
    pub new_edges: usize,
    pub conflicts: usize,
}

impl std::ops::AddAssign for MergeOutcome {
    fn add_assign(&mut self, other: Self) {
        self.merged += other.merged;
        self.skipped += other.skipped;
        self.new_entities += other.new_entities;
        self.new_edges += other.new_edges;
        self.conflicts += other.conflicts;
    }
}

/// A triple with canonical identities, ready to apply
#[derive(Debug)]
struct ResolvedTriple {
    subject: String,
    subject_surface: String,
    subject_type: EntityType,
    predicate: String,
    object: String,
    object_surface: String,
    object_type: EntityType,
    provenance: Provenance,
}

/// Merges triple batches into a [`KnowledgeGraph`]
pub struct GraphAssembler {
    canonicalizer: Arc<Canonicalizer>,
    precedence: TypePrecedence,
    priority: Vec<EntityType>,
}

impl GraphAssembler {
    pub fn new(canonicalizer: Arc<Canonicalizer>, config: &GraphConfig) -> Self {
        Self {
            canonicalizer,
            precedence: config.type_precedence,
            priority: config.type_priority.clone(),
        }
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    /// Merge all triples of one document
    pub fn merge_batch(
        &self,
        graph: &mut KnowledgeGraph,
        document_id: &DocumentId,
        triples: &[Triple],
    ) -> MergeOutcome {
        let resolved: Vec<ResolvedTriple> = triples.iter().filter_map(|t| self.resolve(t)).collect();

        let mut outcome = MergeOutcome {
            skipped: triples.len() - resolved.len(),
            ..Default::default()
        };

        for triple in resolved {
            let subject = self.upsert_entity(
                graph,
                &triple.subject,
                &triple.subject_surface,
                triple.subject_type,
                document_id,
                &mut outcome,
            );
            let object = self.upsert_entity(
                graph,
                &triple.object,
                &triple.object_surface,
                triple.object_type,
                document_id,
                &mut outcome,
            );

            let key = EdgeKey::new(subject, triple.predicate, object);
            if let Some(created) = graph.add_evidence(key, 1, [triple.provenance]) {
                outcome.merged += 1;
                if created {
                    outcome.new_edges += 1;
                }
            }
        }

        if outcome.merged > 0 {
            graph.record_document(document_id.clone());
        }

        tracing::debug!(
            document = %document_id,
            merged = outcome.merged,
            skipped = outcome.skipped,
            new_entities = outcome.new_entities,
            new_edges = outcome.new_edges,
            "Merged batch"
        );
        outcome
    }

    fn resolve(&self, triple: &Triple) -> Option<ResolvedTriple> {
        let subject = self.canonicalizer.canonicalize(&triple.subject);
        let object = self.canonicalizer.canonicalize(&triple.object);
        if subject.is_empty() || object.is_empty() || subject == object {
            return None;
        }

        let mut predicate = canonicalize_predicate(&triple.predicate_lemma);
        if predicate.is_empty() {
            predicate = canonicalize_predicate(&triple.predicate);
        }
        if predicate.is_empty() {
            return None;
        }

        Some(ResolvedTriple {
            subject: subject.into_string(),
            subject_surface: triple.subject.trim().to_string(),
            subject_type: triple.subject_type,
            predicate,
            object: object.into_string(),
            object_surface: triple.object.trim().to_string(),
            object_type: triple.object_type,
            provenance: triple.provenance.clone(),
        })
    }

    fn upsert_entity(
        &self,
        graph: &mut KnowledgeGraph,
        canonical_name: &str,
        surface: &str,
        suggested: EntityType,
        document_id: &DocumentId,
        outcome: &mut MergeOutcome,
    ) -> EntityId {
        let (entity, created) = graph.get_or_create_entity(canonical_name);
        if created {
            outcome.new_entities += 1;
        }
        if !surface.is_empty() {
            entity.aliases.insert(surface.to_string());
        }

        let id = entity.id;
        let conflict = self.vote(entity, suggested).map(|(existing, resolved)| TypeConflict {
            entity: id,
            canonical_name: canonical_name.to_string(),
            existing,
            incoming: suggested,
            resolved,
            document_id: document_id.clone(),
        });

        if let Some(conflict) = conflict {
            tracing::info!(
                entity = %conflict.canonical_name,
                existing = %conflict.existing,
                incoming = %conflict.incoming,
                resolved = %conflict.resolved,
                document = %conflict.document_id,
                "Entity type conflict"
            );
            outcome.conflicts += 1;
            graph.record_conflict(conflict);
        }

        id
    }

    /// Count a type suggestion and re-resolve the entity type
    ///
    /// Returns `(existing, resolved)` when the suggestion disagrees with a
    /// specific type the entity already had.
    fn vote(&self, entity: &mut Entity, suggested: EntityType) -> Option<(EntityType, EntityType)> {
        if !suggested.is_specific() {
            return None;
        }

        *entity.type_votes.entry(suggested).or_insert(0) += 1;
        let existing = entity.entity_type;

        let resolved = match self.precedence {
            TypePrecedence::FirstSeen if existing.is_specific() => existing,
            TypePrecedence::FirstSeen => suggested,
            TypePrecedence::MostFrequent => entity
                .type_votes
                .iter()
                .min_by_key(|(t, votes)| (std::cmp::Reverse(**votes), **t))
                .map(|(t, _)| *t)
                .unwrap_or(suggested),
            TypePrecedence::Priority => entity
                .type_votes
                .iter()
                .min_by_key(|(t, votes)| (self.rank(**t), std::cmp::Reverse(**votes), **t))
                .map(|(t, _)| *t)
                .unwrap_or(suggested),
        };

        entity.entity_type = resolved;
        entity.type_conflicts = entity
            .type_votes
            .keys()
            .filter(|t| **t != resolved)
            .copied()
            .collect();

        (existing.is_specific() && existing != suggested).then_some((existing, resolved))
    }

    /// Position in the priority list; unlisted types rank last
    fn rank(&self, entity_type: EntityType) -> usize {
        self.priority
            .iter()
            .position(|t| *t == entity_type)
            .unwrap_or(self.priority.len())
    }
}
