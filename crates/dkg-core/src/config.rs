//! DKG Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults, plus a validation pass that runs before
//! any document is processed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::EntityType;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Raw text cleanup
    pub cleanup: CleanupConfig,

    /// Entity canonicalization
    pub canonical: CanonicalConfig,

    /// Triple extraction
    pub extraction: ExtractionConfig,

    /// Graph assembly and post-processing
    pub graph: GraphConfig,

    /// Document processing
    pub pipeline: PipelineConfig,

    /// External NLP service
    pub nlp: NlpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|message| ConfigError::ParseError { path, message })
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(timeout) = std::env::var("DKG_DOCUMENT_TIMEOUT_SECS") {
            self.pipeline.document_timeout_secs = parse_env("DKG_DOCUMENT_TIMEOUT_SECS", timeout)?;
        }
        if let Ok(concurrency) = std::env::var("DKG_CONCURRENCY") {
            self.pipeline.concurrency = parse_env("DKG_CONCURRENCY", concurrency)?;
        }

        if let Ok(backend) = std::env::var("DKG_NLP_BACKEND") {
            self.nlp.backend = backend.parse()?;
        }
        if let Ok(url) = std::env::var("DKG_NLP_URL") {
            self.nlp.base_url = url;
        }

        if let Ok(level) = std::env::var("DKG_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("DKG_LOG_JSON") {
            self.logging.json_format = parse_env("DKG_LOG_JSON", json)?;
        }

        Ok(())
    }

    /// Reject configurations the run cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (alias, canonical) in &self.canonical.aliases {
            if alias.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "canonical.aliases".to_string(),
                    value: format!("{alias:?} -> {canonical:?}"),
                });
            }
            if canonical.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("canonical.aliases.{alias}"),
                    value: canonical.clone(),
                });
            }
        }

        if let Some(empty) = self
            .extraction
            .excluded_predicates
            .iter()
            .find(|p| p.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                key: "extraction.excluded_predicates".to_string(),
                value: format!("{empty:?}"),
            });
        }

        if self.graph.type_precedence == TypePrecedence::Priority
            && self.graph.type_priority.is_empty()
        {
            return Err(ConfigError::MissingRequired(
                "graph.type_priority (required by type_precedence = \"priority\")".to_string(),
            ));
        }

        if self.pipeline.document_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.document_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.pipeline.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        if self.pipeline.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.channel_capacity".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Raw text cleanup steps applied before coreference resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Turn runs of newlines into sentence breaks
    pub collapse_newlines: bool,

    /// Remove citation markers such as `[12]`
    pub strip_reference_markers: bool,

    /// Remove parenthetical asides
    pub strip_parentheticals: bool,

    /// Insert a space after `.`/`,` glued to the next word
    pub fix_punctuation_spacing: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            collapse_newlines: true,
            strip_reference_markers: true,
            strip_parentheticals: true,
            fix_punctuation_spacing: true,
        }
    }
}

/// Entity canonicalization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CanonicalConfig {
    /// Known alias -> canonical name
    pub aliases: BTreeMap<String, String>,
}

/// Triple extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Predicate lemmas that never form a relation on their own
    pub excluded_predicates: Vec<String>,

    /// Use the document title as subject for verbs without one
    pub fallback_to_title: bool,

    /// Domain vocabulary the NER model does not know (term -> type)
    pub domain_terms: BTreeMap<String, EntityType>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            excluded_predicates: vec!["be".to_string(), "have".to_string(), "do".to_string()],
            fallback_to_title: false,
            domain_terms: BTreeMap::new(),
        }
    }
}

/// How conflicting entity-type tags are reconciled on merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypePrecedence {
    /// First specific tag wins; later conflicting tags are recorded
    #[default]
    FirstSeen,
    /// Specific tag with the most votes wins
    MostFrequent,
    /// Highest-ranked tag in `type_priority` wins
    Priority,
}

impl std::str::FromStr for TypePrecedence {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "first_seen" => Ok(Self::FirstSeen),
            "most_frequent" => Ok(Self::MostFrequent),
            "priority" => Ok(Self::Priority),
            _ => Err(ConfigError::InvalidValue {
                key: "graph.type_precedence".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Graph assembly and post-processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Entity-type precedence rule
    pub type_precedence: TypePrecedence,

    /// Ranking used by `TypePrecedence::Priority`, highest first
    pub type_priority: Vec<EntityType>,

    /// Fold `bayer healthcare` into `bayer` after assembly
    pub fold_subject_extensions: bool,

    /// Minimum total evidence for a subject to keep its edges
    pub min_subject_evidence: usize,

    /// Minimum total evidence for an object to keep its edges
    pub min_object_evidence: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            type_precedence: TypePrecedence::FirstSeen,
            type_priority: Vec::new(),
            fold_subject_extensions: false,
            min_subject_evidence: 1,
            min_object_evidence: 1,
        }
    }
}

/// Document processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Timeout for each model call on one document
    pub document_timeout_secs: u64,

    /// Documents processed concurrently
    pub concurrency: usize,

    /// Per-document batches buffered ahead of the assembler
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            document_timeout_secs: 60,
            concurrency: 4,
            channel_capacity: 16,
        }
    }
}

/// Supported NLP backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NlpBackend {
    /// JSON-over-HTTP NLP service
    #[default]
    Http,
    /// Annotations recorded offline next to the corpus
    Annotated,
}

impl std::str::FromStr for NlpBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "annotated" => Ok(Self::Annotated),
            _ => Err(ConfigError::InvalidValue {
                key: "DKG_NLP_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// External NLP service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NlpConfig {
    /// Backend to use
    pub backend: NlpBackend,

    /// Service base URL
    pub base_url: String,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            backend: NlpBackend::Http,
            base_url: "http://localhost:8090".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Alias cycle through {0:?}")]
    AliasCycle(String),
}
