//! Quality Metrics module
//!
//! Precision, recall and F1 of extracted triples and of the entity set they
//! mention, measured against a gold standard after canonicalization.

use std::collections::BTreeSet;

use dkg_core::Triple;
use serde::{Deserialize, Serialize};

use crate::canonical::{canonicalize_predicate, Canonicalizer};

// ============================================================================
// Counts
// ============================================================================

/// Confusion counts for one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounts {
    /// Predicted items found in the gold standard
    pub true_positives: usize,
    /// Predicted items not in the gold standard
    pub false_positives: usize,
    /// Gold items that were not predicted
    pub false_negatives: usize,
}

impl MatchCounts {
    /// Count matches between two sets
    pub fn compare<T: Ord>(predicted: &BTreeSet<T>, gold: &BTreeSet<T>) -> Self {
        let true_positives = predicted.intersection(gold).count();
        Self {
            true_positives,
            false_positives: predicted.len() - true_positives,
            false_negatives: gold.len() - true_positives,
        }
    }

    /// Calculate precision (TP / (TP + FP))
    pub fn precision(&self) -> f32 {
        if self.true_positives + self.false_positives == 0 {
            0.0
        } else {
            self.true_positives as f32 / (self.true_positives + self.false_positives) as f32
        }
    }

    /// Calculate recall (TP / (TP + FN))
    pub fn recall(&self) -> f32 {
        if self.true_positives + self.false_negatives == 0 {
            0.0
        } else {
            self.true_positives as f32 / (self.true_positives + self.false_negatives) as f32
        }
    }

    /// Calculate F1 score (2 * P * R / (P + R))
    pub fn f1_score(&self) -> f32 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    fn add(&mut self, other: &MatchCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }
}

// ============================================================================
// Gold Standard Types
// ============================================================================

/// A gold standard triple
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoldTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl GoldTriple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl From<&Triple> for GoldTriple {
    fn from(t: &Triple) -> Self {
        Self::new(&t.subject, &t.predicate_lemma, &t.object)
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Result of evaluating one document
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DocumentMetrics {
    pub entities: MatchCounts,
    pub triples: MatchCounts,
}

/// Evaluator for extraction quality
pub struct Evaluator<'a> {
    canonicalizer: &'a Canonicalizer,
    /// Whether the predicate must match as well as subject and object
    match_predicates: bool,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator comparing canonical keys
    pub fn new(canonicalizer: &'a Canonicalizer) -> Self {
        Self {
            canonicalizer,
            match_predicates: true,
        }
    }

    /// Enable/disable predicate matching
    pub fn with_predicate_matching(mut self, match_predicates: bool) -> Self {
        self.match_predicates = match_predicates;
        self
    }

    fn key(&self, triple: &GoldTriple) -> (String, String, String) {
        let predicate = if self.match_predicates {
            canonicalize_predicate(&triple.predicate)
        } else {
            String::new()
        };
        (
            self.canonicalizer.canonicalize(&triple.subject).into_string(),
            predicate,
            self.canonicalizer.canonicalize(&triple.object).into_string(),
        )
    }

    fn entities(&self, triples: &[GoldTriple]) -> BTreeSet<String> {
        triples
            .iter()
            .flat_map(|t| [&t.subject, &t.object])
            .map(|s| self.canonicalizer.canonicalize(s).into_string())
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// Evaluate predicted triples against gold triples
    pub fn evaluate(&self, predicted: &[Triple], gold: &[GoldTriple]) -> DocumentMetrics {
        let predicted: Vec<GoldTriple> = predicted.iter().map(GoldTriple::from).collect();

        let predicted_keys: BTreeSet<_> = predicted.iter().map(|t| self.key(t)).collect();
        let gold_keys: BTreeSet<_> = gold.iter().map(|t| self.key(t)).collect();

        DocumentMetrics {
            entities: MatchCounts::compare(&self.entities(&predicted), &self.entities(gold)),
            triples: MatchCounts::compare(&predicted_keys, &gold_keys),
        }
    }
}

// ============================================================================
// Aggregate Metrics
// ============================================================================

/// Aggregate metrics for a batch of evaluations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub entities: MatchCounts,
    pub triples: MatchCounts,
    pub num_documents: usize,
}

impl AggregateMetrics {
    /// Add one document's metrics
    pub fn add(&mut self, metrics: &DocumentMetrics) {
        self.entities.add(&metrics.entities);
        self.triples.add(&metrics.triples);
        self.num_documents += 1;
    }

    /// Print a summary report
    pub fn report(&self) -> String {
        format!(
            "=== Extraction Quality Report ===\n\n\
             Documents evaluated: {}\n\n\
             Entities:\n\
               Precision: {:.1}%\n\
               Recall:    {:.1}%\n\
               F1 Score:  {:.1}%\n\
               TP: {} | FP: {} | FN: {}\n\n\
             Triples:\n\
               Precision: {:.1}%\n\
               Recall:    {:.1}%\n\
               F1 Score:  {:.1}%\n\
               TP: {} | FP: {} | FN: {}\n",
            self.num_documents,
            self.entities.precision() * 100.0,
            self.entities.recall() * 100.0,
            self.entities.f1_score() * 100.0,
            self.entities.true_positives,
            self.entities.false_positives,
            self.entities.false_negatives,
            self.triples.precision() * 100.0,
            self.triples.recall() * 100.0,
            self.triples.f1_score() * 100.0,
            self.triples.true_positives,
            self.triples.false_positives,
            self.triples.false_negatives,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
