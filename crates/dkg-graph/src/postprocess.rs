//! Graph post-processing
//!
//! Corpus-level clean-up passes run after all documents are merged. Each
//! pass returns a new graph that keeps the invariants of the input.

use std::collections::{BTreeMap, BTreeSet};

use dkg_core::GraphConfig;

use crate::{EdgeKey, EntityId, KnowledgeGraph};

/// Run the passes enabled in the configuration
pub fn apply(graph: KnowledgeGraph, config: &GraphConfig) -> KnowledgeGraph {
    let graph = if config.fold_subject_extensions {
        fold_subject_extensions(&graph)
    } else {
        graph
    };

    if config.min_subject_evidence > 1 || config.min_object_evidence > 1 {
        prune_infrequent(
            &graph,
            config.min_subject_evidence,
            config.min_object_evidence,
        )
    } else {
        graph
    }
}

// ============================================================================
// Subject folding
// ============================================================================

/// `name` continues `prefix` with at least one more word
fn extends_by_words(name: &str, prefix: &str) -> bool {
    name.len() > prefix.len() && name.starts_with(prefix) && name[prefix.len()..].starts_with(' ')
}

/// Fold subjects that extend a shorter subject by whole words
///
/// `bayer healthcare -produce-> aspirin` becomes
/// `bayer -healthcare produce-> aspirin`. Each subject folds into its
/// shortest extended subject; the folded name and its aliases become aliases
/// of that entity. Edges that collide after folding are merged, and edges
/// that would turn into self-loops are dropped.
pub fn fold_subject_extensions(graph: &KnowledgeGraph) -> KnowledgeGraph {
    let subjects: BTreeSet<&str> = graph
        .edges()
        .filter_map(|edge| graph.entity(&edge.subject))
        .map(|entity| entity.canonical_name.as_str())
        .collect();

    let mut targets: BTreeMap<EntityId, (EntityId, String)> = BTreeMap::new();
    for name in &subjects {
        let root = subjects
            .iter()
            .filter(|prefix| extends_by_words(name, prefix))
            .min_by_key(|prefix| prefix.len());

        if let Some(root) = root {
            let extension = name[root.len()..].trim().to_string();
            targets.insert(EntityId::for_name(name), (EntityId::for_name(root), extension));
        }
    }

    if targets.is_empty() {
        return graph.clone();
    }

    let (entities, edges, conflicts, documents) = graph.clone().into_parts();
    let mut folded = KnowledgeGraph::from_parts(entities, BTreeMap::new(), conflicts, documents);

    for (key, edge) in edges {
        let key = match targets.get(&key.subject) {
            Some((root, extension)) => {
                EdgeKey::new(*root, format!("{extension} {}", key.predicate), key.object)
            }
            None => key,
        };

        if folded
            .add_evidence(key, edge.evidence_count, edge.evidence)
            .is_none()
        {
            tracing::debug!(predicate = %edge.predicate, "Dropped self-loop after folding");
        }
    }

    for (source, (root, _)) in &targets {
        let aliases: Vec<String> = match folded.entity(source) {
            Some(entity) => std::iter::once(entity.canonical_name.clone())
                .chain(entity.aliases.iter().cloned())
                .collect(),
            None => continue,
        };
        if let Some(target) = folded.entity_mut(root) {
            target.aliases.extend(aliases);
        }
    }

    folded.remove_orphans();

    tracing::info!(
        folded_subjects = targets.len(),
        entities = folded.entity_count(),
        edges = folded.edge_count(),
        "Folded subject extensions"
    );
    folded
}

// ============================================================================
// Frequency pruning
// ============================================================================

/// Drop edges whose subject, then whose object, has too little evidence
///
/// Subject totals are computed on the input graph; object totals on the
/// edges that survived the subject pass. Entities left without edges are
/// removed.
pub fn prune_infrequent(
    graph: &KnowledgeGraph,
    min_subject_evidence: usize,
    min_object_evidence: usize,
) -> KnowledgeGraph {
    let (entities, edges, conflicts, documents) = graph.clone().into_parts();
    let before = edges.len();

    let subject_totals = totals(edges.values().map(|e| (e.subject, e.evidence_count)));
    let edges: BTreeMap<_, _> = edges
        .into_iter()
        .filter(|(key, _)| subject_totals.get(&key.subject).copied().unwrap_or(0) >= min_subject_evidence)
        .collect();

    let object_totals = totals(edges.values().map(|e| (e.object, e.evidence_count)));
    let edges: BTreeMap<_, _> = edges
        .into_iter()
        .filter(|(key, _)| object_totals.get(&key.object).copied().unwrap_or(0) >= min_object_evidence)
        .collect();

    let mut pruned = KnowledgeGraph::from_parts(entities, edges, conflicts, documents);
    pruned.remove_orphans();

    tracing::info!(
        min_subject_evidence,
        min_object_evidence,
        removed_edges = before - pruned.edge_count(),
        "Pruned infrequent entities"
    );
    pruned
}

fn totals(counts: impl Iterator<Item = (EntityId, usize)>) -> BTreeMap<EntityId, usize> {
    let mut totals = BTreeMap::new();
    for (id, count) in counts {
        *totals.entry(id).or_insert(0) += count;
    }
    totals
}
