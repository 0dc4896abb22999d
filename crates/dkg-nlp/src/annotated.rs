//! Replay of annotations recorded offline
//!
//! Each record holds a document together with the coreference clusters of
//! its text and the parse of its coreference-resolved text, as produced by an
//! external NLP toolkit. Records are stored as JSON, either one object per
//! `*.json` file in a directory or an array in a single file.
//!
//! The capability calls look records up by exact text, so the pipeline must
//! hand the stored text to the coreference model unchanged.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use dkg_core::{
    CorefModel, CoreferenceCluster, DkgError, Document, DocumentId, DocumentSource,
    ParsedSentence, Result, SentenceParser,
};
use serde::{Deserialize, Serialize};

use crate::NlpError;

/// One annotated document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    pub id: DocumentId,

    #[serde(default)]
    pub title: String,

    /// Text the clusters refer to
    pub text: String,

    #[serde(default)]
    pub clusters: Vec<CoreferenceCluster>,

    /// Coreference-resolved text the sentences were parsed from; when
    /// absent the sentences are a parse of `text`
    #[serde(default)]
    pub resolved_text: Option<String>,

    #[serde(default)]
    pub sentences: Vec<ParsedSentence>,
}

impl AnnotatedDocument {
    fn parsed_text(&self) -> &str {
        self.resolved_text.as_deref().unwrap_or(&self.text)
    }
}

/// Annotated corpus acting as document source, coreference model and parser
#[derive(Debug, Clone, Default)]
pub struct AnnotatedCorpus {
    documents: BTreeMap<DocumentId, AnnotatedDocument>,
}

impl AnnotatedCorpus {
    pub fn new(documents: Vec<AnnotatedDocument>) -> Self {
        Self {
            documents: documents.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    /// Load from a `.json` file or a directory of them
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, NlpError> {
        let path = path.as_ref();
        let mut documents = Vec::new();

        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| NlpError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let mut files: Vec<_> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                .collect();
            files.sort();

            for file in files {
                documents.extend(read_records(&file)?);
            }
        } else {
            documents = read_records(path)?;
        }

        tracing::info!(
            path = %path.display(),
            documents = documents.len(),
            "Loaded annotated corpus"
        );
        Ok(Self::new(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: &DocumentId) -> Option<&AnnotatedDocument> {
        self.documents.get(id)
    }
}

fn read_records(path: &Path) -> std::result::Result<Vec<AnnotatedDocument>, NlpError> {
    let content = std::fs::read_to_string(path).map_err(|e| NlpError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let invalid = |e: serde_json::Error| NlpError::InvalidAnnotation {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if content.trim_start().starts_with('[') {
        serde_json::from_str(&content).map_err(invalid)
    } else {
        serde_json::from_str(&content).map(|d| vec![d]).map_err(invalid)
    }
}

#[async_trait]
impl DocumentSource for AnnotatedCorpus {
    async fn list_documents(&self) -> Result<Vec<DocumentId>> {
        Ok(self.documents.keys().cloned().collect())
    }

    async fn fetch(&self, id: &DocumentId) -> Result<Document> {
        let record = self
            .documents
            .get(id)
            .ok_or_else(|| DkgError::DocumentNotFound(id.to_string()))?;

        let title = if record.title.is_empty() {
            id.to_string()
        } else {
            record.title.clone()
        };

        Ok(Document {
            id: id.clone(),
            title,
            text: record.text.clone(),
        })
    }

    fn name(&self) -> &str {
        "annotated"
    }
}

#[async_trait]
impl CorefModel for AnnotatedCorpus {
    async fn clusters(&self, text: &str) -> Result<Vec<CoreferenceCluster>> {
        self.documents
            .values()
            .find(|d| d.text == text)
            .map(|d| d.clusters.clone())
            .ok_or_else(|| DkgError::CorefError("no recorded clusters for text".to_string()))
    }
}

#[async_trait]
impl SentenceParser for AnnotatedCorpus {
    async fn parse(&self, text: &str) -> Result<Vec<ParsedSentence>> {
        self.documents
            .values()
            .find(|d| d.parsed_text() == text)
            .map(|d| d.sentences.clone())
            .ok_or_else(|| DkgError::ParseError("no recorded parse for text".to_string()))
    }
}
