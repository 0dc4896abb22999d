//! DKG NLP - Text preparation and NLP capability adapters
//!
//! Provides:
//! - Raw text cleanup before coreference resolution
//! - Document sources (directory of files, in-memory)
//! - An HTTP client for an external NLP service implementing the
//!   coreference and parsing capabilities
//! - An annotated-corpus adapter that replays annotations recorded offline
//!
//! The statistical models themselves live outside this workspace; this
//! crate only speaks their interfaces.

pub mod annotated;
pub mod clean;
pub mod http;
pub mod source;

pub use annotated::{AnnotatedCorpus, AnnotatedDocument};
pub use clean::TextCleaner;
pub use http::HttpNlpClient;
pub use source::{DirectorySource, MemorySource};

use dkg_core::DkgError;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while setting up NLP adapters
#[derive(Error, Debug)]
pub enum NlpError {
    /// IO error while reading annotations
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Annotation record does not match the expected layout
    #[error("Invalid annotation file {path}: {message}")]
    InvalidAnnotation { path: String, message: String },

    /// Cleanup pattern failed to compile
    #[error("Invalid cleanup pattern: {0}")]
    Pattern(String),
}

pub type Result<T> = std::result::Result<T, NlpError>;

impl From<NlpError> for DkgError {
    fn from(err: NlpError) -> Self {
        match err {
            NlpError::Io { source, .. } => DkgError::Io(source),
            other => DkgError::ConfigError(other.to_string()),
        }
    }
}
