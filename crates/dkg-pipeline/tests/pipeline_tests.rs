//! End-to-end runs of the extraction pipeline against scripted NLP models

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dkg_core::{
    AppConfig, CorefModel, CoreferenceCluster, DependencyRelation as Dep, DkgError, Document,
    DocumentId, DocumentSource, EntitySpan, FailureStage, Mention, ParsedSentence, PartOfSpeech,
    Result, SentenceParser, Token,
};
use dkg_graph::KnowledgeGraph;
use dkg_nlp::{AnnotatedCorpus, AnnotatedDocument, MemorySource};
use dkg_pipeline::Pipeline;
use tokio_util::sync::CancellationToken;

use dkg_core::PartOfSpeech::{Adp, Aux, Noun, Propn, Punct, Verb};

// ============================================================================
// Sentence builders
// ============================================================================

fn tok(index: usize, text: &str, lemma: &str, pos: PartOfSpeech, dep: Dep, head: usize) -> Token {
    Token {
        index,
        text: text.to_string(),
        lemma: lemma.to_string(),
        pos,
        dep,
        head,
        whitespace: true,
        is_stop: false,
    }
}

fn sentence(index: usize, text: &str, mut tokens: Vec<Token>, entities: Vec<EntitySpan>) -> ParsedSentence {
    for i in 1..tokens.len() {
        if tokens[i].pos == Punct {
            tokens[i - 1].whitespace = false;
        }
    }
    ParsedSentence {
        index,
        text: text.to_string(),
        tokens,
        entities,
    }
}

fn span(start: usize, end: usize, label: &str) -> EntitySpan {
    EntitySpan {
        start,
        end,
        label: label.to_string(),
    }
}

/// "{subject} {verb} {object}." with both arguments single proper nouns
fn svo(index: usize, subject: &str, verb: &str, lemma: &str, object: &str) -> ParsedSentence {
    sentence(
        index,
        &format!("{subject} {verb} {object}."),
        vec![
            tok(0, subject, subject, Propn, Dep::Nsubj, 1),
            tok(1, verb, lemma, Verb, Dep::Root, 1),
            tok(2, object, object, Propn, Dep::Dobj, 1),
            tok(3, ".", ".", Punct, Dep::Punct, 1),
        ],
        vec![span(0, 1, "ORG")],
    )
}

fn bayer_produces_aspirin() -> ParsedSentence {
    sentence(
        0,
        "Bayer produces aspirin.",
        vec![
            tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 1),
            tok(1, "produces", "produce", Verb, Dep::Root, 1),
            tok(2, "aspirin", "aspirin", Noun, Dep::Dobj, 1),
            tok(3, ".", ".", Punct, Dep::Punct, 1),
        ],
        vec![span(0, 1, "ORG"), span(2, 3, "CHEMICAL")],
    )
}

fn monsanto_was_acquired_by_bayer(index: usize) -> ParsedSentence {
    sentence(
        index,
        "Monsanto was acquired by Bayer.",
        vec![
            tok(0, "Monsanto", "Monsanto", Propn, Dep::Nsubjpass, 2),
            tok(1, "was", "be", Aux, Dep::Auxpass, 2),
            tok(2, "acquired", "acquire", Verb, Dep::Root, 2),
            tok(3, "by", "by", Adp, Dep::Agent, 2),
            tok(4, "Bayer", "Bayer", Propn, Dep::Pobj, 3),
            tok(5, ".", ".", Punct, Dep::Punct, 2),
        ],
        vec![span(0, 1, "ORG"), span(4, 5, "ORG")],
    )
}

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Coreference and parsing replayed from fixed tables keyed by exact text
#[derive(Default)]
struct ScriptedNlp {
    clusters: HashMap<String, Vec<CoreferenceCluster>>,
    parses: HashMap<String, Vec<ParsedSentence>>,
}

impl ScriptedNlp {
    fn with_parse(mut self, text: &str, sentences: Vec<ParsedSentence>) -> Self {
        self.parses.insert(text.to_string(), sentences);
        self
    }

    fn with_clusters(mut self, text: &str, clusters: Vec<CoreferenceCluster>) -> Self {
        self.clusters.insert(text.to_string(), clusters);
        self
    }
}

#[async_trait]
impl CorefModel for ScriptedNlp {
    async fn clusters(&self, text: &str) -> Result<Vec<CoreferenceCluster>> {
        Ok(self.clusters.get(text).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SentenceParser for ScriptedNlp {
    async fn parse(&self, text: &str) -> Result<Vec<ParsedSentence>> {
        self.parses
            .get(text)
            .cloned()
            .ok_or_else(|| DkgError::ParseError(format!("unscripted text: {text:?}")))
    }
}

/// Source whose fetch fails for selected documents
struct FlakySource {
    inner: MemorySource,
    broken: Vec<DocumentId>,
}

#[async_trait]
impl DocumentSource for FlakySource {
    async fn list_documents(&self) -> Result<Vec<DocumentId>> {
        self.inner.list_documents().await
    }

    async fn fetch(&self, id: &DocumentId) -> Result<Document> {
        if self.broken.contains(id) {
            return Err(DkgError::FetchFailed {
                id: id.to_string(),
                reason: "connection reset".to_string(),
            });
        }
        self.inner.fetch(id).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Parser that cancels the run when it sees a given text, then stalls
struct CancellingParser {
    inner: Arc<ScriptedNlp>,
    trigger: String,
    token: CancellationToken,
}

#[async_trait]
impl SentenceParser for CancellingParser {
    async fn parse(&self, text: &str) -> Result<Vec<ParsedSentence>> {
        if text == self.trigger {
            self.token.cancel();
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.parse(text).await
    }
}

fn pipeline(config: &AppConfig, documents: Vec<Document>, nlp: ScriptedNlp) -> Pipeline {
    let nlp = Arc::new(nlp);
    Pipeline::new(config, Arc::new(MemorySource::new(documents)), nlp.clone(), nlp).unwrap()
}

fn assert_consistent(graph: &KnowledgeGraph) {
    tokio_test::assert_ok!(graph.validate());
    assert!(graph.edges().all(|e| e.subject != e.object));
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_active_and_passive_yield_one_edge() {
    let nlp = ScriptedNlp::default()
        .with_parse(
            "Bayer acquired Monsanto.",
            vec![svo(0, "Bayer", "acquired", "acquire", "Monsanto")],
        )
        .with_parse(
            "Monsanto was acquired by Bayer.",
            vec![monsanto_was_acquired_by_bayer(0)],
        );
    let documents = vec![
        Document::new("active", "Bayer", "Bayer acquired Monsanto."),
        Document::new("passive", "Monsanto", "Monsanto was acquired by Bayer."),
    ];

    let report = pipeline(&AppConfig::default(), documents, nlp)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert!(report.failures.is_empty());
    assert_eq!(report.graph.edge_count(), 1);

    let edge = report.graph.find_edge("bayer", "acquire", "monsanto").unwrap();
    assert_eq!(edge.evidence_count, 2);
    assert_consistent(&report.graph);
}

#[tokio::test]
async fn test_same_fact_in_two_documents() {
    let nlp = ScriptedNlp::default().with_parse("Bayer produces aspirin.", vec![bayer_produces_aspirin()]);
    let documents = vec![
        Document::new("a", "A", "Bayer produces aspirin."),
        Document::new("b", "B", "Bayer produces aspirin."),
    ];

    let report = pipeline(&AppConfig::default(), documents, nlp)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.graph.entity_count(), 2);
    let edge = report.graph.find_edge("bayer", "produce", "aspirin").unwrap();
    assert_eq!(edge.evidence_count, 2);

    let sources: Vec<&str> = edge.evidence.iter().map(|p| p.document_id.as_str()).collect();
    assert!(sources.contains(&"a") && sources.contains(&"b"));
    assert_eq!(
        report.graph.entity_by_name("aspirin").unwrap().entity_type,
        dkg_core::EntityType::Drug
    );
}

#[tokio::test]
async fn test_cleanup_and_coreference_before_parsing() {
    // "It" spans bytes 24..26 of the cleaned text
    let cleaned = "Monsanto makes Roundup. It was acquired by Bayer.";
    let resolved = "Monsanto makes Roundup. Monsanto was acquired by Bayer.";

    let nlp = ScriptedNlp::default()
        .with_clusters(
            cleaned,
            vec![CoreferenceCluster::new(
                0,
                vec![Mention::new(0, 8, "Monsanto"), Mention::new(24, 26, "It")],
            )],
        )
        .with_parse(
            resolved,
            vec![
                svo(0, "Monsanto", "makes", "make", "Roundup"),
                monsanto_was_acquired_by_bayer(1),
            ],
        );
    let documents = vec![Document::new(
        "monsanto",
        "Monsanto",
        "Monsanto makes Roundup\nIt was acquired by Bayer.",
    )];

    let report = pipeline(&AppConfig::default(), documents, nlp)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert!(report.graph.find_edge("monsanto", "make", "roundup").is_some());
    assert!(report.graph.find_edge("bayer", "acquire", "monsanto").is_some());
    assert_eq!(report.merge.merged, 2);
}

#[tokio::test]
async fn test_failed_fetch_is_skipped() {
    let nlp = Arc::new(ScriptedNlp::default().with_parse("Bayer produces aspirin.", vec![bayer_produces_aspirin()]));
    let source = FlakySource {
        inner: MemorySource::new(vec![
            Document::new("good", "Good", "Bayer produces aspirin."),
            Document::new("broken", "Broken", "Bayer produces aspirin."),
        ]),
        broken: vec![DocumentId::new("broken")],
    };

    let report = Pipeline::new(&AppConfig::default(), Arc::new(source), nlp.clone(), nlp)
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].document_id, DocumentId::new("broken"));
    assert_eq!(report.failures[0].stage, FailureStage::Fetch);

    let broken = DocumentId::new("broken");
    assert!(!report.graph.documents().contains(&broken));
    assert!(report
        .graph
        .edges()
        .flat_map(|e| &e.evidence)
        .all(|p| p.document_id != broken));
    assert_eq!(
        report.graph.find_edge("bayer", "produce", "aspirin").map(|e| e.evidence_count),
        Some(1)
    );
}

#[tokio::test]
async fn test_parse_failure_is_recorded_with_stage() {
    let documents = vec![Document::new("odd", "Odd", "Nothing scripted here.")];
    let report = pipeline(&AppConfig::default(), documents, ScriptedNlp::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(report.failures[0].stage, FailureStage::Parse);
    assert!(report.graph.is_empty());
}

#[tokio::test]
async fn test_aliases_never_produce_self_loops() {
    let mut config = AppConfig::default();
    config
        .canonical
        .aliases
        .insert("Bayer AG".to_string(), "Bayer".to_string());

    let nlp = ScriptedNlp::default().with_parse(
        "Bayer AG acquired Bayer.",
        vec![sentence(
            0,
            "Bayer AG acquired Bayer.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Compound, 1),
                tok(1, "AG", "AG", Propn, Dep::Nsubj, 2),
                tok(2, "acquired", "acquire", Verb, Dep::Root, 2),
                tok(3, "Bayer", "Bayer", Propn, Dep::Dobj, 2),
                tok(4, ".", ".", Punct, Dep::Punct, 2),
            ],
            vec![span(0, 2, "ORG"), span(3, 4, "ORG")],
        )],
    );
    let documents = vec![Document::new("loop", "Bayer", "Bayer AG acquired Bayer.")];

    let report = pipeline(&config, documents, nlp)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.graph.edge_count(), 0);
    assert_consistent(&report.graph);
}

#[tokio::test]
async fn test_cancellation_leaves_consistent_graph() {
    let token = CancellationToken::new();
    let nlp = Arc::new(
        ScriptedNlp::default()
            .with_parse("Bayer produces aspirin.", vec![bayer_produces_aspirin()])
            .with_parse(
                "Bayer acquired Monsanto.",
                vec![svo(0, "Bayer", "acquired", "acquire", "Monsanto")],
            ),
    );
    let parser = CancellingParser {
        inner: nlp.clone(),
        trigger: "Bayer acquired Monsanto.".to_string(),
        token: token.clone(),
    };
    let source = MemorySource::new(vec![
        Document::new("first", "First", "Bayer produces aspirin."),
        Document::new("second", "Second", "Bayer acquired Monsanto."),
        Document::new("third", "Third", "Bayer produces aspirin."),
    ]);

    let mut config = AppConfig::default();
    config.pipeline.concurrency = 1;

    let report = Pipeline::new(&config, Arc::new(source), nlp, Arc::new(parser))
        .unwrap()
        .run(token)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.cancelled, 2);
    assert!(report.failures.is_empty());
    assert_eq!(
        report.graph.documents().iter().map(|d| d.as_str()).collect::<Vec<_>>(),
        vec!["first"]
    );
    assert!(report.graph.find_edge("bayer", "acquire", "monsanto").is_none());
    assert_consistent(&report.graph);
}

#[tokio::test]
async fn test_subject_folding_and_pruning_run_after_merge() {
    let nlp = ScriptedNlp::default()
        .with_parse("Bayer produces aspirin.", vec![bayer_produces_aspirin()])
        .with_parse(
            "Bayer Healthcare sells Aleve.",
            vec![sentence(
                0,
                "Bayer Healthcare sells Aleve.",
                vec![
                    tok(0, "Bayer", "Bayer", Propn, Dep::Compound, 1),
                    tok(1, "Healthcare", "Healthcare", Propn, Dep::Nsubj, 2),
                    tok(2, "sells", "sell", Verb, Dep::Root, 2),
                    tok(3, "Aleve", "Aleve", Propn, Dep::Dobj, 2),
                    tok(4, ".", ".", Punct, Dep::Punct, 2),
                ],
                vec![span(0, 2, "ORG")],
            )],
        );
    let documents = vec![
        Document::new("a", "A", "Bayer produces aspirin."),
        Document::new("b", "B", "Bayer Healthcare sells Aleve."),
    ];

    let mut config = AppConfig::default();
    config.graph.fold_subject_extensions = true;
    config.graph.min_subject_evidence = 2;

    let report = pipeline(&config, documents, nlp)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(report.graph.find_edge("bayer", "healthcare sell", "aleve").is_some());
    assert!(report.graph.find_edge("bayer", "produce", "aspirin").is_some());
    assert!(report.graph.entity_by_name("bayer healthcare").is_none());
    assert_consistent(&report.graph);
}

#[tokio::test]
async fn test_annotated_corpus_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let record = AnnotatedDocument {
        id: DocumentId::new("bayer"),
        title: "Bayer".to_string(),
        text: "Bayer produces aspirin.".to_string(),
        clusters: Vec::new(),
        resolved_text: None,
        sentences: vec![bayer_produces_aspirin()],
    };
    std::fs::write(
        dir.path().join("bayer.json"),
        serde_json::to_string(&record).unwrap(),
    )
    .unwrap();

    let corpus = Arc::new(AnnotatedCorpus::load(dir.path()).unwrap());
    let report = Pipeline::new(&AppConfig::default(), corpus.clone(), corpus.clone(), corpus)
        .unwrap()
        .without_cleanup()
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.processed, 1);

    let json = report.graph.to_json().unwrap();
    let restored = KnowledgeGraph::from_json(&json).unwrap();
    assert_eq!(restored.edge_count(), 1);
    assert_eq!(restored.to_json().unwrap(), json);

    let summary = report.summary();
    assert_eq!(summary.graph.edges, 1);
    assert_eq!(summary.triples_merged, 1);
}
