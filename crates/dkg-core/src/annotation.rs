//! Annotation types produced by the external NLP capabilities
//!
//! Tokens, dependency arcs, named-entity spans and coreference clusters.
//! Labels follow the Universal POS tag set and the ClearNLP dependency
//! scheme used by common English pipelines; unrecognized labels
//! deserialize to `Other` instead of failing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// English pronouns that never stand in for an entity on their own
const PRONOUNS: &[&str] = &[
    "i", "me", "my", "mine", "myself", "you", "your", "yours", "yourself", "he", "him", "his",
    "himself", "she", "her", "hers", "herself", "it", "its", "itself", "we", "us", "our", "ours",
    "ourselves", "they", "them", "their", "theirs", "themselves", "this", "that", "these",
    "those", "who", "whom", "whose", "which",
];

/// Whether `text` is a bare pronoun
pub fn is_pronoun(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    PRONOUNS.contains(&lower.as_str())
}

// ============================================================================
// Tokens
// ============================================================================

/// Universal part-of-speech tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartOfSpeech {
    Noun,
    Propn,
    Pron,
    Verb,
    Aux,
    Adj,
    Adv,
    Det,
    Adp,
    Num,
    Cconj,
    Part,
    Punct,
    #[serde(other)]
    Other,
}

/// Dependency relation of a token to its head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyRelation {
    #[serde(rename = "ROOT", alias = "root")]
    Root,
    Nsubj,
    Nsubjpass,
    Csubj,
    Dobj,
    Pobj,
    Prep,
    Agent,
    Attr,
    Acomp,
    Compound,
    Amod,
    Nummod,
    Poss,
    Det,
    Nmod,
    Flat,
    Case,
    Conj,
    Cc,
    Prt,
    Neg,
    Aux,
    Auxpass,
    Appos,
    Punct,
    #[serde(other)]
    Other,
}

fn default_whitespace() -> bool {
    true
}

/// A single token of a parsed sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Position within the sentence
    pub index: usize,

    /// Surface text
    pub text: String,

    /// Lemma
    pub lemma: String,

    /// Part-of-speech tag
    pub pos: PartOfSpeech,

    /// Dependency relation to `head`
    pub dep: DependencyRelation,

    /// Index of the head token; the root points at itself
    pub head: usize,

    /// Whether the token is followed by whitespace in the source text
    #[serde(default = "default_whitespace")]
    pub whitespace: bool,

    /// Stop-word flag from the model
    #[serde(default)]
    pub is_stop: bool,
}

impl Token {
    pub fn is_pronoun(&self) -> bool {
        self.pos == PartOfSpeech::Pron || is_pronoun(&self.text)
    }

    /// Nouns, proper nouns and numerals can head an entity span
    pub fn is_nominal(&self) -> bool {
        matches!(
            self.pos,
            PartOfSpeech::Noun | PartOfSpeech::Propn | PartOfSpeech::Num
        )
    }
}

/// A named-entity annotation over tokens `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

impl EntitySpan {
    pub fn contains(&self, token: usize) -> bool {
        self.start <= token && token < self.end
    }
}

// ============================================================================
// Sentences
// ============================================================================

/// Structural defects that make a sentence unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("sentence has no tokens")]
    Empty,

    #[error("token {token} has head {head} outside the sentence")]
    HeadOutOfRange { token: usize, head: usize },

    #[error("token at position {position} carries index {index}")]
    IndexMismatch { position: usize, index: usize },

    #[error("sentence has no root")]
    MissingRoot,

    #[error("sentence has {0} roots")]
    MultipleRoots(usize),

    #[error("dependency cycle through token {0}")]
    Cycle(usize),

    #[error("entity span {start}..{end} outside the sentence")]
    EntityOutOfRange { start: usize, end: usize },
}

/// One sentence with its dependency structure and entity spans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSentence {
    /// Sentence index within the document
    pub index: usize,

    /// Sentence text
    pub text: String,

    /// Tokens in order
    pub tokens: Vec<Token>,

    /// Named-entity spans
    #[serde(default)]
    pub entities: Vec<EntitySpan>,
}

impl ParsedSentence {
    /// Children of `head` in token order
    pub fn children(&self, head: usize) -> impl Iterator<Item = &Token> + '_ {
        self.tokens
            .iter()
            .filter(move |t| t.head == head && t.index != head)
    }

    /// Children of `head` carrying relation `dep`
    pub fn children_with(
        &self,
        head: usize,
        dep: DependencyRelation,
    ) -> impl Iterator<Item = &Token> + '_ {
        self.children(head).filter(move |t| t.dep == dep)
    }

    /// The named-entity span covering `token`, if any
    pub fn entity_at(&self, token: usize) -> Option<&EntitySpan> {
        self.entities.iter().find(|e| e.contains(token))
    }

    /// Check that heads are in range, there is exactly one root and the
    /// head chain of every token reaches it.
    pub fn validate(&self) -> Result<(), StructureError> {
        if self.tokens.is_empty() {
            return Err(StructureError::Empty);
        }

        let len = self.tokens.len();
        let mut roots = 0;
        for (position, token) in self.tokens.iter().enumerate() {
            if token.index != position {
                return Err(StructureError::IndexMismatch {
                    position,
                    index: token.index,
                });
            }
            if token.head >= len {
                return Err(StructureError::HeadOutOfRange {
                    token: position,
                    head: token.head,
                });
            }
            if token.head == position {
                roots += 1;
            }
        }

        match roots {
            0 => return Err(StructureError::MissingRoot),
            1 => {}
            n => return Err(StructureError::MultipleRoots(n)),
        }

        for start in 0..len {
            let mut current = start;
            let mut steps = 0;
            while self.tokens[current].head != current {
                current = self.tokens[current].head;
                steps += 1;
                if steps > len {
                    return Err(StructureError::Cycle(start));
                }
            }
        }

        if let Some(span) = self
            .entities
            .iter()
            .find(|e| e.start >= e.end || e.end > len)
        {
            return Err(StructureError::EntityOutOfRange {
                start: span.start,
                end: span.end,
            });
        }

        Ok(())
    }
}

// ============================================================================
// Coreference
// ============================================================================

/// A byte span of document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub start: usize,
    pub end: usize,
    pub text: String,
    #[serde(default)]
    pub cluster: Option<usize>,
}

impl Mention {
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            cluster: None,
        }
    }

    pub fn is_pronoun(&self) -> bool {
        is_pronoun(&self.text)
    }
}

/// Mentions judged to refer to the same entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreferenceCluster {
    pub id: usize,
    pub mentions: Vec<Mention>,
    /// Index into `mentions` of the model's representative, if it chose one
    #[serde(default)]
    pub representative: Option<usize>,
}

impl CoreferenceCluster {
    pub fn new(id: usize, mentions: Vec<Mention>) -> Self {
        let mentions = mentions
            .into_iter()
            .map(|m| Mention {
                cluster: Some(id),
                ..m
            })
            .collect();
        Self {
            id,
            mentions,
            representative: None,
        }
    }

    pub fn with_representative(mut self, index: usize) -> Self {
        self.representative = Some(index);
        self
    }
}
