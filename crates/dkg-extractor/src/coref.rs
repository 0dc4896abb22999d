//! Coreference rewrite
//!
//! The coreference model only clusters mentions. Rewriting the text, so that
//! every anaphoric mention is replaced by its cluster's representative, is
//! done here.

use std::cmp::Reverse;
use std::sync::Arc;

use dkg_core::{is_pronoun, CorefModel, CoreferenceCluster, DkgError, Result};

use crate::canonical::LEADING_DETERMINERS;

/// Pronouns that carry possession; the replacement keeps the possessive
const POSSESSIVE_PRONOUNS: &[&str] = &["his", "its", "their", "theirs", "our", "my", "your", "whose"];

/// Resolves coreferences through a model and rewrites the text
pub struct CorefResolver {
    model: Arc<dyn CorefModel>,
}

impl CorefResolver {
    pub fn new(model: Arc<dyn CorefModel>) -> Self {
        Self { model }
    }

    /// Cluster mentions with the model and rewrite `text`
    pub async fn resolve(&self, text: &str) -> Result<String> {
        let clusters = self.model.clusters(text).await?;
        let resolved = rewrite(text, &clusters)?;
        tracing::debug!(
            clusters = clusters.len(),
            before = text.len(),
            after = resolved.len(),
            "Resolved coreferences"
        );
        Ok(resolved)
    }
}

/// A pending replacement of `text[start..end]`
#[derive(Debug)]
struct Replacement {
    start: usize,
    end: usize,
    with: String,
}

/// Replace each non-representative mention by its cluster representative
///
/// Clusters without a non-pronoun mention are left as they are. Mentions
/// overlapping an earlier replacement are skipped.
pub fn rewrite(text: &str, clusters: &[CoreferenceCluster]) -> Result<String> {
    let mut replacements = Vec::new();

    for cluster in clusters {
        for mention in &cluster.mentions {
            check_span(text, mention.start, mention.end)?;
        }

        let Some(chosen) = representative(text, cluster) else {
            tracing::debug!(cluster = cluster.id, "Cluster has only pronouns, left unresolved");
            continue;
        };
        let replacement_text = &text[chosen.0..chosen.1];

        for mention in &cluster.mentions {
            if (mention.start, mention.end) == chosen {
                continue;
            }
            let surface = &text[mention.start..mention.end];
            if surface == replacement_text {
                continue;
            }
            replacements.push(Replacement {
                start: mention.start,
                end: mention.end,
                with: replacement_for(surface, replacement_text),
            });
        }
    }

    replacements.sort_by_key(|r| (r.start, Reverse(r.end)));

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for replacement in replacements {
        if replacement.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..replacement.start]);
        out.push_str(&replacement.with);
        cursor = replacement.end;
    }
    out.push_str(&text[cursor..]);

    Ok(out)
}

fn check_span(text: &str, start: usize, end: usize) -> Result<()> {
    if start >= end || end > text.len() {
        return Err(DkgError::CorefError(format!(
            "mention span {start}..{end} outside text of length {}",
            text.len()
        )));
    }
    if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
        return Err(DkgError::CorefError(format!(
            "mention span {start}..{end} is not on character boundaries"
        )));
    }
    Ok(())
}

/// Span of the mention every other mention of the cluster is replaced by
///
/// The model's choice is kept unless it is a pronoun. Otherwise names win
/// over descriptions: a capitalized mention not led by a determiner ranks
/// first, then any mention not led by a determiner, then the rest. Within a
/// rank the longest mention wins, the earliest one on ties.
fn representative(text: &str, cluster: &CoreferenceCluster) -> Option<(usize, usize)> {
    let span_of = |index: usize| {
        cluster
            .mentions
            .get(index)
            .map(|m| (m.start, m.end))
            .filter(|&(start, end)| !is_pronoun(&text[start..end]))
    };

    if let Some(chosen) = cluster.representative.and_then(span_of) {
        return Some(chosen);
    }

    cluster
        .mentions
        .iter()
        .map(|m| (m.start, m.end))
        .filter(|&(start, end)| !is_pronoun(&text[start..end]))
        .min_by_key(|&(start, end)| {
            let surface = &text[start..end];
            (
                Reverse(name_rank(surface)),
                Reverse(surface.chars().count()),
                start,
            )
        })
}

/// `(not determiner-led, capitalized)`; names rank highest
fn name_rank(surface: &str) -> (bool, bool) {
    let Some(first) = surface.split_whitespace().next() else {
        return (false, false);
    };
    let undetermined = !LEADING_DETERMINERS.contains(&first.to_lowercase().as_str());
    let capitalized = first.chars().next().is_some_and(char::is_uppercase);
    (undetermined, undetermined && capitalized)
}

fn replacement_for(surface: &str, representative: &str) -> String {
    let lower = surface.trim().to_lowercase();
    let possessive = POSSESSIVE_PRONOUNS.contains(&lower.as_str())
        || (!is_pronoun(&lower) && (lower.ends_with("'s") || lower.ends_with("\u{2019}s")));

    if possessive && !representative.ends_with("'s") {
        format!("{representative}'s")
    } else {
        representative.to_string()
    }
}
