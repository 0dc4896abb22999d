//! DKG Pipeline - Extraction run orchestrator
//!
//! Drives a corpus through the per-document stages and into the graph:
//! - fetch from a [`DocumentSource`], clean, resolve coreferences, parse
//! - extract triples from the parsed sentences
//! - merge each document's triples into one shared [`KnowledgeGraph`]
//!
//! Documents run concurrently up to `pipeline.concurrency`. A single
//! assembler task owns the graph and receives one [`DocumentBatch`] per
//! document over a bounded channel, so the graph has exactly one writer.
//! A failing document is recorded and skipped; it never aborts the run.
//!
//! Author: hephaex@gmail.com

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dkg_core::{
    AppConfig, CorefModel, DkgError, DocumentFailure, DocumentId, DocumentSource, FailureStage,
    GraphConfig, Result, SentenceParser, Triple,
};
use dkg_extractor::{Canonicalizer, CorefResolver, TripleExtractor};
use dkg_graph::{postprocess, GraphAssembler, GraphStats, KnowledgeGraph, MergeOutcome};
use dkg_nlp::TextCleaner;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Run results
// ============================================================================

/// Triples extracted from one document, merged as a unit
#[derive(Debug, Clone)]
pub struct DocumentBatch {
    pub document_id: DocumentId,
    pub sentences: usize,
    pub triples: Vec<Triple>,
}

/// Outcome of a full extraction run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The assembled (and post-processed) graph
    pub graph: KnowledgeGraph,

    /// Documents whose batch reached the assembler
    pub processed: usize,

    /// Documents skipped because a stage failed
    pub failures: Vec<DocumentFailure>,

    /// Documents not started or abandoned after cancellation
    pub cancelled: usize,

    /// Merge totals across all batches
    pub merge: MergeOutcome,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            processed: self.processed,
            failed: self.failures.len(),
            cancelled: self.cancelled,
            triples_merged: self.merge.merged,
            triples_skipped: self.merge.skipped,
            elapsed_ms: self.elapsed().num_milliseconds(),
            graph: self.graph.stats(),
        }
    }
}

/// Serializable digest of a run for logs and the CLI
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub triples_merged: usize,
    pub triples_skipped: usize,
    pub elapsed_ms: i64,
    pub graph: GraphStats,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Corpus-to-graph extraction pipeline
pub struct Pipeline {
    source: Arc<dyn DocumentSource>,
    resolver: CorefResolver,
    parser: Arc<dyn SentenceParser>,
    cleaner: Option<TextCleaner>,
    extractor: TripleExtractor,
    assembler: Arc<GraphAssembler>,
    graph_config: GraphConfig,
    document_timeout: Duration,
    concurrency: usize,
    channel_capacity: usize,
}

impl Pipeline {
    /// Build a pipeline from validated configuration
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn DocumentSource>,
        coref: Arc<dyn CorefModel>,
        parser: Arc<dyn SentenceParser>,
    ) -> Result<Self> {
        config.validate()?;

        let canonicalizer = Arc::new(Canonicalizer::from_config(&config.canonical)?);
        let cleaner = TextCleaner::new(config.cleanup.clone())?;
        tracing::debug!(aliases = canonicalizer.alias_count(), "Canonicalizer ready");

        Ok(Self {
            source,
            resolver: CorefResolver::new(coref),
            parser,
            cleaner: Some(cleaner),
            extractor: TripleExtractor::new(&config.extraction, canonicalizer.clone()),
            assembler: Arc::new(GraphAssembler::new(canonicalizer, &config.graph)),
            graph_config: config.graph.clone(),
            document_timeout: Duration::from_secs(config.pipeline.document_timeout_secs),
            concurrency: config.pipeline.concurrency,
            channel_capacity: config.pipeline.channel_capacity,
        })
    }

    /// Skip text cleanup, for annotations recorded against the stored text
    pub fn without_cleanup(mut self) -> Self {
        self.cleaner = None;
        self
    }

    /// Run over every document the source lists
    ///
    /// Fails only if the source cannot list its documents or the assembled
    /// graph breaks an invariant; per-document failures end up in
    /// [`RunReport::failures`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();

        let ids = self.source.list_documents().await?;
        let total = ids.len();
        tracing::info!(
            source = self.source.name(),
            documents = total,
            concurrency = self.concurrency,
            "Extraction run started"
        );

        let (tx, rx) = mpsc::channel::<DocumentBatch>(self.channel_capacity);
        let assembler = tokio::spawn(assemble(self.assembler.clone(), rx));

        let outcomes = futures::stream::iter(ids)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|id| self.process_until_cancelled(id, &cancel))
            .buffer_unordered(self.concurrency);
        futures::pin_mut!(outcomes);

        let mut processed = 0;
        let mut failures = Vec::new();

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Some(Ok(batch)) => {
                    if tx.send(batch).await.is_err() {
                        return Err(DkgError::Other(anyhow::anyhow!(
                            "graph assembler stopped before the run finished"
                        )));
                    }
                    processed += 1;
                }
                Some(Err(failure)) => {
                    tracing::warn!(
                        document = %failure.document_id,
                        stage = %failure.stage,
                        reason = %failure.reason,
                        "Document skipped"
                    );
                    failures.push(failure);
                }
                None => {}
            }
        }
        drop(tx);

        let (graph, merge) = assembler
            .await
            .map_err(|e| DkgError::Other(anyhow::anyhow!("graph assembler failed: {e}")))?;

        let graph = postprocess::apply(graph, &self.graph_config);
        graph.validate()?;

        let cancelled = total - processed - failures.len();
        if cancel.is_cancelled() {
            tracing::warn!(cancelled, "Extraction run cancelled");
        }

        let report = RunReport {
            graph,
            processed,
            failures,
            cancelled,
            merge,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            processed = report.processed,
            failed = report.failures.len(),
            entities = report.graph.entity_count(),
            edges = report.graph.edge_count(),
            elapsed_ms = report.elapsed().num_milliseconds(),
            "Extraction run finished"
        );
        Ok(report)
    }

    /// Process one document unless the run is cancelled first
    async fn process_until_cancelled(
        &self,
        id: DocumentId,
        cancel: &CancellationToken,
    ) -> Option<std::result::Result<DocumentBatch, DocumentFailure>> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            outcome = self.process(id) => Some(outcome),
        }
    }

    /// Fetch, clean, resolve, parse and extract one document
    ///
    /// All stages share one `document_timeout` budget; a failure names the
    /// stage that was running when it ran out.
    pub async fn process(&self, id: DocumentId) -> std::result::Result<DocumentBatch, DocumentFailure> {
        let deadline = Instant::now() + self.document_timeout;

        let document = self
            .before_deadline(deadline, &id, FailureStage::Fetch, self.source.fetch(&id))
            .await?;

        let text = match &self.cleaner {
            Some(cleaner) => cleaner.clean(&document.text),
            None => document.text,
        };

        let resolved = self
            .before_deadline(deadline, &id, FailureStage::Coreference, self.resolver.resolve(&text))
            .await?;

        let sentences = self
            .before_deadline(deadline, &id, FailureStage::Parse, self.parser.parse(&resolved))
            .await?;

        let triples = self
            .extractor
            .extract_document(&document.id, &document.title, &sentences);

        Ok(DocumentBatch {
            document_id: document.id,
            sentences: sentences.len(),
            triples,
        })
    }

    /// Await a capability call, giving up at the document's deadline
    async fn before_deadline<T>(
        &self,
        deadline: Instant,
        id: &DocumentId,
        stage: FailureStage,
        call: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, DocumentFailure> {
        match tokio::time::timeout_at(deadline, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DocumentFailure::new(id.clone(), stage, &e)),
            Err(_) => Err(DocumentFailure::new(
                id.clone(),
                stage,
                &DkgError::Timeout(self.document_timeout.as_secs()),
            )),
        }
    }
}

/// Single writer: merge batches in arrival order until every sender is gone
async fn assemble(
    assembler: Arc<GraphAssembler>,
    mut rx: mpsc::Receiver<DocumentBatch>,
) -> (KnowledgeGraph, MergeOutcome) {
    let mut graph = KnowledgeGraph::new();
    let mut totals = MergeOutcome::default();

    while let Some(batch) = rx.recv().await {
        totals += assembler.merge_batch(&mut graph, &batch.document_id, &batch.triples);
    }

    (graph, totals)
}
