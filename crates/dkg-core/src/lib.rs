//! DKG Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the DKG system:
//! - Documents, triples and provenance
//! - Entity type taxonomy
//! - Parser / coreference annotation types
//! - Capability traits for the external collaborators (document source,
//!   coreference model, sentence parser)
//! - Common error types
//! - Configuration management

pub mod annotation;
pub mod config;

pub use annotation::{
    is_pronoun, CoreferenceCluster, DependencyRelation, EntitySpan, Mention, ParsedSentence,
    PartOfSpeech, StructureError, Token,
};
pub use config::{
    AppConfig, CanonicalConfig, CleanupConfig, ConfigError, ExtractionConfig, GraphConfig,
    LoggingConfig, NlpBackend, NlpConfig, PipelineConfig, TypePrecedence,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for DKG operations
#[derive(Error, Debug)]
pub enum DkgError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Fetch failed for {id}: {reason}")]
    FetchFailed { id: String, reason: String },

    #[error("Coreference error: {0}")]
    CorefError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Model call timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed sentence structure: {0}")]
    MalformedSentence(#[from] StructureError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for DkgError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DkgError>;

// ============================================================================
// Documents
// ============================================================================

/// Opaque identifier of a source document (file stem, article title, ...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A raw document fetched from a source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier
    pub id: DocumentId,

    /// Human-readable title, used as fallback subject when enabled
    pub title: String,

    /// Raw text content
    pub text: String,
}

impl Document {
    /// Create a new document
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(id),
            title: title.into(),
            text: text.into(),
        }
    }
}

// ============================================================================
// Entity Types
// ============================================================================

/// Entity types recognized by the graph
///
/// Declaration order doubles as the tie-break order for
/// frequency-based type precedence.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Organization,
    Person,
    Location,
    Product,
    Drug,
    Disease,
    Event,
    Date,
    Quantity,
    /// Nationalities, religious and political groups
    Group,
    /// Titled works: books, songs, studies
    Work,
    Law,
    Language,
    #[default]
    Unknown,
}

impl EntityType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Person => "person",
            Self::Location => "location",
            Self::Product => "product",
            Self::Drug => "drug",
            Self::Disease => "disease",
            Self::Event => "event",
            Self::Date => "date",
            Self::Quantity => "quantity",
            Self::Group => "group",
            Self::Work => "work",
            Self::Law => "law",
            Self::Language => "language",
            Self::Unknown => "unknown",
        }
    }

    /// Map a named-entity label (OntoNotes / biomedical label sets) to a type
    pub fn from_ner_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "ORG" | "ORGANIZATION" => Self::Organization,
            "PERSON" | "PER" => Self::Person,
            "GPE" | "LOC" | "LOCATION" | "FAC" => Self::Location,
            "PRODUCT" => Self::Product,
            "CHEMICAL" | "DRUG" => Self::Drug,
            "DISEASE" => Self::Disease,
            "EVENT" => Self::Event,
            "DATE" | "TIME" => Self::Date,
            "MONEY" | "QUANTITY" => Self::Quantity,
            "NORP" => Self::Group,
            "WORK_OF_ART" => Self::Work,
            "LAW" => Self::Law,
            "LANGUAGE" => Self::Language,
            _ => Self::Unknown,
        }
    }

    /// Whether this is a concrete type rather than `Unknown`
    pub fn is_specific(&self) -> bool {
        *self != Self::Unknown
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = DkgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "organization" => Ok(Self::Organization),
            "person" => Ok(Self::Person),
            "location" => Ok(Self::Location),
            "product" => Ok(Self::Product),
            "drug" => Ok(Self::Drug),
            "disease" => Ok(Self::Disease),
            "event" => Ok(Self::Event),
            "date" => Ok(Self::Date),
            "quantity" => Ok(Self::Quantity),
            "group" => Ok(Self::Group),
            "work" => Ok(Self::Work),
            "law" => Ok(Self::Law),
            "language" => Ok(Self::Language),
            "unknown" => Ok(Self::Unknown),
            _ => Err(DkgError::ConfigError(format!("unknown entity type: {s}"))),
        }
    }
}

// ============================================================================
// Triples
// ============================================================================

/// Where a triple was observed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Source document
    pub document_id: DocumentId,

    /// Sentence index within the resolved document
    pub sentence_index: usize,

    /// Sentence text
    pub sentence: String,
}

impl Provenance {
    pub fn new(document_id: DocumentId, sentence_index: usize, sentence: impl Into<String>) -> Self {
        Self {
            document_id,
            sentence_index,
            sentence: sentence.into(),
        }
    }
}

/// A relation triple extracted from one sentence
///
/// Surface strings are kept as they appear in text; canonicalization happens
/// when the triple is folded into the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    /// Subject surface string
    pub subject: String,

    /// Predicate phrase as written
    pub predicate: String,

    /// Lemmatized predicate phrase
    pub predicate_lemma: String,

    /// Object surface string
    pub object: String,

    /// Type hint for the subject
    pub subject_type: EntityType,

    /// Type hint for the object
    pub object_type: EntityType,

    /// Source reference
    pub provenance: Provenance,
}

impl Triple {
    /// Create a triple with unknown type hints
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        let predicate = predicate.into();
        Self {
            subject: subject.into(),
            predicate_lemma: predicate.clone(),
            predicate,
            object: object.into(),
            subject_type: EntityType::Unknown,
            object_type: EntityType::Unknown,
            provenance,
        }
    }

    /// Set the lemmatized predicate
    pub fn with_lemma(mut self, lemma: impl Into<String>) -> Self {
        self.predicate_lemma = lemma.into();
        self
    }

    /// Set subject and object type hints
    pub fn with_types(mut self, subject_type: EntityType, object_type: EntityType) -> Self {
        self.subject_type = subject_type;
        self.object_type = object_type;
        self
    }
}

// ============================================================================
// Document failures
// ============================================================================

/// Pipeline stage at which a document failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Coreference,
    Parse,
    Extraction,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Coreference => write!(f, "coreference"),
            Self::Parse => write!(f, "parse"),
            Self::Extraction => write!(f, "extraction"),
        }
    }
}

/// A document that was skipped, with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: DocumentId,
    pub stage: FailureStage,
    pub reason: String,
}

impl DocumentFailure {
    pub fn new(document_id: DocumentId, stage: FailureStage, error: &DkgError) -> Self {
        Self {
            document_id,
            stage,
            reason: error.to_string(),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Source of document texts
#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    /// List the ids of all available documents
    async fn list_documents(&self) -> Result<Vec<DocumentId>>;

    /// Fetch one document
    async fn fetch(&self, id: &DocumentId) -> Result<Document>;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Coreference clustering capability
#[async_trait::async_trait]
pub trait CorefModel: Send + Sync {
    /// Cluster the mentions of `text` by referent
    async fn clusters(&self, text: &str) -> Result<Vec<CoreferenceCluster>>;
}

/// Sentence segmentation, dependency parsing and NER capability
#[async_trait::async_trait]
pub trait SentenceParser: Send + Sync {
    /// Split `text` into parsed sentences
    async fn parse(&self, text: &str) -> Result<Vec<ParsedSentence>>;
}

// ============================================================================
// Tests
// ============================================================================
