//! DKG Extractor - Text-to-triple extraction
//!
//! Implements the per-document stages of graph construction:
//! coreference rewrite, relation-triple extraction from dependency
//! parses, and entity canonicalization. Quality metrics against a gold
//! standard live in [`metrics`].

pub mod canonical;
pub mod coref;
pub mod metrics;
pub mod triple;

pub use canonical::{canonicalize_predicate, normalize, CanonicalKey, Canonicalizer};
pub use coref::{rewrite, CorefResolver};
pub use metrics::{AggregateMetrics, DocumentMetrics, Evaluator, GoldTriple, MatchCounts};
pub use triple::TripleExtractor;
