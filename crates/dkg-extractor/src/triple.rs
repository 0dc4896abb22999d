//! Relation triple extraction from dependency parses
//!
//! Every verb (and a copular root) anchors a predicate. Its arguments are
//! read off the dependency arcs:
//!
//! - subjects: `nsubj` and its conjuncts, the `agent` object of a passive,
//!   or the subjects of the verb this one is coordinated with
//! - objects: `dobj` / `attr` / `acomp` and their conjuncts, otherwise the
//!   `pobj` of each attached preposition, which then joins the predicate
//!
//! Arguments are expanded to full noun phrases and to any named-entity span
//! covering their head.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use dkg_core::{
    DependencyRelation as Dep, DocumentId, EntityType, ExtractionConfig, ParsedSentence,
    PartOfSpeech, Provenance, Token, Triple,
};

use crate::canonical::{normalize, CanonicalKey, Canonicalizer};

/// Relations that stay inside a noun phrase
const NOUN_PHRASE_DEPS: &[Dep] = &[
    Dep::Compound,
    Dep::Amod,
    Dep::Nummod,
    Dep::Poss,
    Dep::Det,
    Dep::Nmod,
    Dep::Flat,
    Dep::Case,
];

/// A noun phrase argument
#[derive(Debug, Clone)]
struct Phrase {
    text: String,
    entity_type: EntityType,
}

/// A predicate phrase
#[derive(Debug, Clone)]
struct Predicate {
    surface: String,
    lemma: String,
}

/// A triple before provenance is attached
#[derive(Debug, Clone)]
struct Candidate {
    subject: Phrase,
    predicate: Predicate,
    object: Phrase,
}

/// Dependency-pattern triple extractor
pub struct TripleExtractor {
    excluded_predicates: HashSet<String>,
    fallback_to_title: bool,
    domain_terms: BTreeMap<String, EntityType>,
    canonicalizer: Arc<Canonicalizer>,
}

impl TripleExtractor {
    pub fn new(config: &ExtractionConfig, canonicalizer: Arc<Canonicalizer>) -> Self {
        Self {
            excluded_predicates: config
                .excluded_predicates
                .iter()
                .map(|p| p.trim().to_lowercase())
                .collect(),
            fallback_to_title: config.fallback_to_title,
            domain_terms: config
                .domain_terms
                .iter()
                .map(|(term, entity_type)| (normalize(term), *entity_type))
                .filter(|(term, _)| !term.is_empty())
                .collect(),
            canonicalizer,
        }
    }

    /// Extract triples from every sentence of a document
    pub fn extract_document(
        &self,
        document_id: &DocumentId,
        title: &str,
        sentences: &[ParsedSentence],
    ) -> Vec<Triple> {
        let triples: Vec<Triple> = sentences
            .iter()
            .flat_map(|sentence| self.extract(document_id, title, sentence))
            .collect();

        tracing::debug!(
            document = %document_id,
            sentences = sentences.len(),
            triples = triples.len(),
            "Extracted triples"
        );
        triples
    }

    /// Extract triples from one sentence
    ///
    /// A structurally invalid sentence yields no triples.
    pub fn extract(
        &self,
        document_id: &DocumentId,
        title: &str,
        sentence: &ParsedSentence,
    ) -> Vec<Triple> {
        if let Err(e) = sentence.validate() {
            tracing::debug!(
                document = %document_id,
                sentence = sentence.index,
                error = %e,
                "Skipping malformed sentence"
            );
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for anchor in sentence.tokens.iter().filter(|t| is_anchor(t)) {
            self.extract_anchor(sentence, anchor, title, &mut candidates);
        }

        self.deduplicate(candidates)
            .into_iter()
            .map(|c| {
                let provenance =
                    Provenance::new(document_id.clone(), sentence.index, sentence.text.clone());
                Triple::new(c.subject.text, c.predicate.surface, c.object.text, provenance)
                    .with_lemma(c.predicate.lemma)
                    .with_types(c.subject.entity_type, c.object.entity_type)
            })
            .collect()
    }

    fn extract_anchor(
        &self,
        sentence: &ParsedSentence,
        verb: &Token,
        title: &str,
        candidates: &mut Vec<Candidate>,
    ) {
        let mut subjects: Vec<Phrase> = subject_heads(sentence, verb)
            .into_iter()
            .filter_map(|i| self.phrase(sentence, i))
            .collect();

        if subjects.is_empty() && self.fallback_to_title && !title.trim().is_empty() {
            subjects.push(Phrase {
                text: title.trim().to_string(),
                entity_type: self.domain_type(title),
            });
        }
        if subjects.is_empty() {
            return;
        }

        let direct = direct_object_heads(sentence, verb);
        if !direct.is_empty() {
            let Some(predicate) = self.predicate(sentence, verb, None) else {
                return;
            };
            for object in direct.into_iter().filter_map(|i| self.phrase(sentence, i)) {
                for subject in &subjects {
                    candidates.push(Candidate {
                        subject: subject.clone(),
                        predicate: predicate.clone(),
                        object: object.clone(),
                    });
                }
            }
            return;
        }

        for prep in sentence.children_with(verb.index, Dep::Prep) {
            let Some(predicate) = self.predicate(sentence, verb, Some(prep)) else {
                continue;
            };
            let objects = sentence
                .children_with(prep.index, Dep::Pobj)
                .flat_map(|pobj| with_conjuncts(sentence, pobj.index))
                .filter_map(|i| self.phrase(sentence, i));

            for object in objects {
                for subject in &subjects {
                    candidates.push(Candidate {
                        subject: subject.clone(),
                        predicate: predicate.clone(),
                        object: object.clone(),
                    });
                }
            }
        }
    }

    /// Predicate phrase of `verb`, or `None` when it is only an excluded
    /// light verb
    fn predicate(
        &self,
        sentence: &ParsedSentence,
        verb: &Token,
        prep: Option<&Token>,
    ) -> Option<Predicate> {
        let mut parts: Vec<&Token> = sentence
            .children(verb.index)
            .filter(|t| matches!(t.dep, Dep::Neg | Dep::Prt))
            .collect();
        let extended = prep.is_some() || parts.iter().any(|t| t.dep == Dep::Prt);

        if !extended && self.excluded_predicates.contains(&verb.lemma.to_lowercase()) {
            return None;
        }

        parts.push(verb);
        parts.sort_by_key(|t| t.index);
        parts.extend(prep);

        let surface = parts.iter().map(|t| t.text.as_str()).collect::<Vec<_>>();
        let lemma = parts
            .iter()
            .map(|t| {
                if t.lemma.is_empty() {
                    t.text.to_lowercase()
                } else {
                    t.lemma.to_lowercase()
                }
            })
            .collect::<Vec<_>>();

        Some(Predicate {
            surface: surface.join(" "),
            lemma: lemma.join(" "),
        })
    }

    /// Expand `head` to its noun phrase; pronoun-only phrases are dropped
    fn phrase(&self, sentence: &ParsedSentence, head: usize) -> Option<Phrase> {
        let mut members = BTreeSet::from([head]);
        let mut stack = vec![head];
        while let Some(i) = stack.pop() {
            for child in sentence.children(i) {
                if NOUN_PHRASE_DEPS.contains(&child.dep) && members.insert(child.index) {
                    stack.push(child.index);
                }
            }
        }

        let mut start = *members.iter().next()?;
        let mut end = *members.iter().next_back()? + 1;
        let entity = sentence.entity_at(head);
        if let Some(span) = entity {
            start = start.min(span.start);
            end = end.max(span.end);
        }

        // Stop words at the edges go, unless they are the head or named
        let strippable = |i: usize| {
            i != head
                && sentence.tokens[i].is_stop
                && !entity.is_some_and(|span| (span.start..span.end).contains(&i))
        };
        while start + 1 < end && strippable(start) {
            start += 1;
        }
        while end > start + 1 && strippable(end - 1) {
            end -= 1;
        }

        let tokens = &sentence.tokens[start..end];
        let mut content = tokens
            .iter()
            .filter(|t| !matches!(t.dep, Dep::Det | Dep::Punct | Dep::Case))
            .peekable();
        if content.peek().is_none() || content.all(|t| t.is_pronoun()) {
            return None;
        }

        let text = span_text(tokens);
        if text.is_empty() {
            return None;
        }

        let entity_type = entity
            .map(|span| EntityType::from_ner_label(&span.label))
            .filter(EntityType::is_specific)
            .unwrap_or_else(|| {
                let by_phrase = self.domain_type(&text);
                if by_phrase.is_specific() {
                    by_phrase
                } else {
                    self.domain_type(&sentence.tokens[head].text)
                }
            });

        Some(Phrase { text, entity_type })
    }

    fn domain_type(&self, surface: &str) -> EntityType {
        self.domain_terms
            .get(&normalize(surface))
            .copied()
            .unwrap_or_default()
    }

    /// Drop self-loops and collapse the predicates of one subject/object
    /// pair where one extends the other (`give` and `give up`), keeping the
    /// longer. Unrelated predicates over the same pair are all kept.
    fn deduplicate(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut kept: Vec<Candidate> = Vec::new();
        let mut pairs: HashMap<(CanonicalKey, CanonicalKey), Vec<usize>> = HashMap::new();

        for candidate in candidates {
            let subject = self.canonicalizer.canonicalize(&candidate.subject.text);
            let object = self.canonicalizer.canonicalize(&candidate.object.text);
            if subject.is_empty() || object.is_empty() || subject == object {
                continue;
            }

            let slots = pairs.entry((subject, object)).or_default();
            let overlapping = slots.iter().copied().find(|&i| {
                let existing = &kept[i].predicate;
                extends(existing, &candidate.predicate) || extends(&candidate.predicate, existing)
            });

            match overlapping {
                Some(i) => {
                    if predicate_len(&candidate.predicate) > predicate_len(&kept[i].predicate) {
                        kept[i] = candidate;
                    }
                }
                None => {
                    slots.push(kept.len());
                    kept.push(candidate);
                }
            }
        }

        kept
    }
}

/// Whether the lemma words of `base` open the lemma of `predicate`
fn extends(predicate: &Predicate, base: &Predicate) -> bool {
    let mut words = predicate.lemma.split_whitespace();
    base.lemma.split_whitespace().all(|w| words.next() == Some(w))
}

fn predicate_len(predicate: &Predicate) -> (usize, usize) {
    (
        predicate.lemma.split_whitespace().count(),
        predicate.surface.chars().count(),
    )
}

/// Verbs, and an auxiliary that is the sentence root (copula)
fn is_anchor(token: &Token) -> bool {
    token.pos == PartOfSpeech::Verb || (token.pos == PartOfSpeech::Aux && token.head == token.index)
}

/// `index` followed by its coordinated siblings (`A, B and C`)
fn with_conjuncts(sentence: &ParsedSentence, index: usize) -> Vec<usize> {
    let mut out = vec![index];
    let mut i = 0;
    while i < out.len() {
        let conjuncts: Vec<usize> = sentence
            .children_with(out[i], Dep::Conj)
            .map(|t| t.index)
            .collect();
        out.extend(conjuncts);
        i += 1;
    }
    out
}

fn agent_objects(sentence: &ParsedSentence, verb: usize) -> Vec<usize> {
    sentence
        .children_with(verb, Dep::Agent)
        .flat_map(|agent| sentence.children_with(agent.index, Dep::Pobj))
        .flat_map(|pobj| with_conjuncts(sentence, pobj.index))
        .collect()
}

fn dependents(sentence: &ParsedSentence, verb: usize, deps: &[Dep]) -> Vec<usize> {
    sentence
        .children(verb)
        .filter(|t| deps.contains(&t.dep))
        .flat_map(|t| with_conjuncts(sentence, t.index))
        .collect()
}

fn is_passive_with_agent(sentence: &ParsedSentence, verb: usize) -> bool {
    !agent_objects(sentence, verb).is_empty()
        && !dependents(sentence, verb, &[Dep::Nsubjpass]).is_empty()
}

/// Subject heads of `verb`, inherited from the coordinating verb if it has
/// none of its own
fn subject_heads(sentence: &ParsedSentence, verb: &Token) -> Vec<usize> {
    let heads = if is_passive_with_agent(sentence, verb.index) {
        agent_objects(sentence, verb.index)
    } else {
        dependents(sentence, verb.index, &[Dep::Nsubj, Dep::Nsubjpass])
    };

    if heads.is_empty() && verb.dep == Dep::Conj && verb.head != verb.index {
        return subject_heads(sentence, &sentence.tokens[verb.head]);
    }
    heads
}

/// Object heads that attach without a preposition
fn direct_object_heads(sentence: &ParsedSentence, verb: &Token) -> Vec<usize> {
    if is_passive_with_agent(sentence, verb.index) {
        return dependents(sentence, verb.index, &[Dep::Nsubjpass]);
    }

    let objects = dependents(sentence, verb.index, &[Dep::Dobj]);
    if !objects.is_empty() {
        return objects;
    }
    dependents(sentence, verb.index, &[Dep::Attr, Dep::Acomp])
}

/// Surface text of a token run, honoring the recorded whitespace
fn span_text(tokens: &[Token]) -> String {
    let mut text = String::new();
    for (i, token) in tokens.iter().enumerate() {
        text.push_str(&token.text);
        if token.whitespace && i + 1 < tokens.len() {
            text.push(' ');
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dkg_core::EntitySpan;

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

    fn sentence(text: &str, mut tokens: Vec<Token>, entities: Vec<EntitySpan>) -> ParsedSentence {
        // Punctuation is glued to the previous token
        for i in 1..tokens.len() {
            if tokens[i].pos == PartOfSpeech::Punct {
                tokens[i - 1].whitespace = false;
            }
        }
        ParsedSentence {
            index: 0,
            text: text.to_string(),
            tokens,
            entities,
        }
    }

    fn org(start: usize, end: usize) -> EntitySpan {
        EntitySpan {
            start,
            end,
            label: "ORG".to_string(),
        }
    }

    fn extractor() -> TripleExtractor {
        TripleExtractor::new(&ExtractionConfig::default(), Arc::new(Canonicalizer::default()))
    }

    fn extract(extractor: &TripleExtractor, sentence: &ParsedSentence) -> Vec<(String, String, String)> {
        extractor
            .extract(&DocumentId::new("doc"), "Bayer", sentence)
            .into_iter()
            .map(|t| (t.subject, t.predicate, t.object))
            .collect()
    }

    fn triple(s: &str, p: &str, o: &str) -> (String, String, String) {
        (s.to_string(), p.to_string(), o.to_string())
    }

    use PartOfSpeech::{Adp, Aux, Cconj, Det, Noun, Part, Propn, Punct, Verb};

    fn bayer_acquired_monsanto() -> ParsedSentence {
        sentence(
            "Bayer acquired Monsanto.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 1),
                tok(1, "acquired", "acquire", Verb, Dep::Root, 1),
                tok(2, "Monsanto", "Monsanto", Propn, Dep::Dobj, 1),
                tok(3, ".", ".", Punct, Dep::Punct, 1),
            ],
            vec![org(0, 1), org(2, 3)],
        )
    }

    #[test]
    fn test_active_voice() {
        let triples = extractor().extract(&DocumentId::new("bayer"), "Bayer", &bayer_acquired_monsanto());
        assert_eq!(triples.len(), 1);

        let t = &triples[0];
        assert_eq!((t.subject.as_str(), t.predicate.as_str(), t.object.as_str()), ("Bayer", "acquired", "Monsanto"));
        assert_eq!(t.predicate_lemma, "acquire");
        assert_eq!(t.subject_type, EntityType::Organization);
        assert_eq!(t.object_type, EntityType::Organization);
        assert_eq!(t.provenance.document_id.as_str(), "bayer");
        assert_eq!(t.provenance.sentence, "Bayer acquired Monsanto.");
    }

    #[test]
    fn test_passive_voice_with_agent() {
        let s = sentence(
            "Monsanto was acquired by Bayer.",
            vec![
                tok(0, "Monsanto", "Monsanto", Propn, Dep::Nsubjpass, 2),
                tok(1, "was", "be", Aux, Dep::Auxpass, 2),
                tok(2, "acquired", "acquire", Verb, Dep::Root, 2),
                tok(3, "by", "by", Adp, Dep::Agent, 2),
                tok(4, "Bayer", "Bayer", Propn, Dep::Pobj, 3),
                tok(5, ".", ".", Punct, Dep::Punct, 2),
            ],
            vec![org(0, 1), org(4, 5)],
        );

        let triples = extractor().extract(&DocumentId::new("doc"), "", &s);
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].subject, "Bayer");
        assert_eq!(triples[0].object, "Monsanto");
        assert_eq!(triples[0].predicate_lemma, "acquire");
    }

    #[test]
    fn test_passive_without_agent_uses_preposition() {
        let s = sentence(
            "Bayer was founded in Barmen.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubjpass, 2),
                tok(1, "was", "be", Aux, Dep::Auxpass, 2),
                tok(2, "founded", "found", Verb, Dep::Root, 2),
                tok(3, "in", "in", Adp, Dep::Prep, 2),
                tok(4, "Barmen", "Barmen", Propn, Dep::Pobj, 3),
                tok(5, ".", ".", Punct, Dep::Punct, 2),
            ],
            vec![],
        );
        let extractor = extractor();
        assert_eq!(extract(&extractor, &s), vec![triple("Bayer", "founded in", "Barmen")]);
        let triples = extractor.extract(&DocumentId::new("doc"), "", &s);
        assert_eq!(triples[0].predicate_lemma, "found in");
    }

    #[test]
    fn test_pronoun_subject_discarded() {
        let mut s = bayer_acquired_monsanto();
        s.tokens[0] = tok(0, "It", "it", PartOfSpeech::Pron, Dep::Nsubj, 1);
        s.entities = vec![org(2, 3)];
        assert!(extract(&extractor(), &s).is_empty());
    }

    #[test]
    fn test_copula_alone_excluded() {
        let s = sentence(
            "Bayer is a company.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 1),
                tok(1, "is", "be", Aux, Dep::Root, 1),
                tok(2, "a", "a", Det, Dep::Det, 3),
                tok(3, "company", "company", Noun, Dep::Attr, 1),
                tok(4, ".", ".", Punct, Dep::Punct, 1),
            ],
            vec![],
        );
        assert!(extract(&extractor(), &s).is_empty());

        // With an empty exclusion list the copula relation is kept
        let config = ExtractionConfig {
            excluded_predicates: vec![],
            ..Default::default()
        };
        let permissive = TripleExtractor::new(&config, Arc::new(Canonicalizer::default()));
        assert_eq!(extract(&permissive, &s), vec![triple("Bayer", "is", "a company")]);
    }

    #[test]
    fn test_copula_with_preposition_kept() {
        let s = sentence(
            "Bayer is in Leverkusen.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 1),
                tok(1, "is", "be", Aux, Dep::Root, 1),
                tok(2, "in", "in", Adp, Dep::Prep, 1),
                tok(3, "Leverkusen", "Leverkusen", Propn, Dep::Pobj, 2),
                tok(4, ".", ".", Punct, Dep::Punct, 1),
            ],
            vec![],
        );
        assert_eq!(extract(&extractor(), &s), vec![triple("Bayer", "is in", "Leverkusen")]);
    }

    #[test]
    fn test_coordinated_subjects_and_objects() {
        let s = sentence(
            "Bayer and Merck produce aspirin and ibuprofen.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 3),
                tok(1, "and", "and", Cconj, Dep::Cc, 0),
                tok(2, "Merck", "Merck", Propn, Dep::Conj, 0),
                tok(3, "produce", "produce", Verb, Dep::Root, 3),
                tok(4, "aspirin", "aspirin", Noun, Dep::Dobj, 3),
                tok(5, "and", "and", Cconj, Dep::Cc, 4),
                tok(6, "ibuprofen", "ibuprofen", Noun, Dep::Conj, 4),
                tok(7, ".", ".", Punct, Dep::Punct, 3),
            ],
            vec![],
        );
        let triples = extract(&extractor(), &s);
        assert_eq!(triples.len(), 4);
        assert!(triples.contains(&triple("Merck", "produce", "ibuprofen")));
        assert!(triples.contains(&triple("Bayer", "produce", "aspirin")));
    }

    #[test]
    fn test_conjoined_verb_inherits_subject() {
        let s = sentence(
            "Bayer acquired Monsanto and sold Roundup.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 1),
                tok(1, "acquired", "acquire", Verb, Dep::Root, 1),
                tok(2, "Monsanto", "Monsanto", Propn, Dep::Dobj, 1),
                tok(3, "and", "and", Cconj, Dep::Cc, 1),
                tok(4, "sold", "sell", Verb, Dep::Conj, 1),
                tok(5, "Roundup", "Roundup", Propn, Dep::Dobj, 4),
                tok(6, ".", ".", Punct, Dep::Punct, 1),
            ],
            vec![],
        );
        assert_eq!(
            extract(&extractor(), &s),
            vec![
                triple("Bayer", "acquired", "Monsanto"),
                triple("Bayer", "sold", "Roundup")
            ]
        );
    }

    #[test]
    fn test_noun_phrase_expansion() {
        let s = sentence(
            "Bayer AG acquired the seed company Monsanto.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Compound, 1),
                tok(1, "AG", "AG", Propn, Dep::Nsubj, 2),
                tok(2, "acquired", "acquire", Verb, Dep::Root, 2),
                tok(3, "the", "the", Det, Dep::Det, 6),
                tok(4, "seed", "seed", Noun, Dep::Compound, 5),
                tok(5, "company", "company", Noun, Dep::Compound, 6),
                tok(6, "Monsanto", "Monsanto", Propn, Dep::Dobj, 2),
                tok(7, ".", ".", Punct, Dep::Punct, 2),
            ],
            vec![org(0, 2)],
        );
        let triples = extractor().extract(&DocumentId::new("doc"), "", &s);
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].subject, "Bayer AG");
        assert_eq!(triples[0].subject_type, EntityType::Organization);
        assert_eq!(triples[0].object, "the seed company Monsanto");
    }

    #[test]
    fn test_entity_span_extends_phrase() {
        // The parser attached "Bayer" outside the phrase; the NER span covers both
        let s = sentence(
            "Bayer Crop makes seeds.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Other, 2),
                tok(1, "Crop", "Crop", Propn, Dep::Nsubj, 2),
                tok(2, "makes", "make", Verb, Dep::Root, 2),
                tok(3, "seeds", "seed", Noun, Dep::Dobj, 2),
                tok(4, ".", ".", Punct, Dep::Punct, 2),
            ],
            vec![org(0, 2)],
        );
        assert_eq!(extract(&extractor(), &s), vec![triple("Bayer Crop", "makes", "seeds")]);
    }

    #[test]
    fn test_self_loop_discarded() {
        let aliases = [("Bayer AG".to_string(), "Bayer".to_string())].into_iter().collect();
        let canonicalizer = Arc::new(Canonicalizer::new(&aliases).unwrap());
        let extractor = TripleExtractor::new(&ExtractionConfig::default(), canonicalizer);

        let s = sentence(
            "Bayer AG renamed Bayer.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Compound, 1),
                tok(1, "AG", "AG", Propn, Dep::Nsubj, 2),
                tok(2, "renamed", "rename", Verb, Dep::Root, 2),
                tok(3, "Bayer", "Bayer", Propn, Dep::Dobj, 2),
                tok(4, ".", ".", Punct, Dep::Punct, 2),
            ],
            vec![],
        );
        assert!(extract(&extractor, &s).is_empty());
    }

    #[test]
    fn test_distinct_predicates_over_one_pair_kept() {
        let s = sentence(
            "Bayer acquired Monsanto and sued Monsanto.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 1),
                tok(1, "acquired", "acquire", Verb, Dep::Root, 1),
                tok(2, "Monsanto", "Monsanto", Propn, Dep::Dobj, 1),
                tok(3, "and", "and", Cconj, Dep::Cc, 1),
                tok(4, "sued", "sue", Verb, Dep::Conj, 1),
                tok(5, "Monsanto", "Monsanto", Propn, Dep::Dobj, 4),
                tok(6, ".", ".", Punct, Dep::Punct, 1),
            ],
            vec![],
        );
        assert_eq!(
            extract(&extractor(), &s),
            vec![
                triple("Bayer", "acquired", "Monsanto"),
                triple("Bayer", "sued", "Monsanto")
            ]
        );
    }

    #[test]
    fn test_extended_predicate_replaces_shorter() {
        let phrase = |text: &str| Phrase {
            text: text.to_string(),
            entity_type: EntityType::Unknown,
        };
        let candidate = |surface: &str, lemma: &str| Candidate {
            subject: phrase("Bayer"),
            predicate: Predicate {
                surface: surface.to_string(),
                lemma: lemma.to_string(),
            },
            object: phrase("aspirin"),
        };

        let kept = extractor().deduplicate(vec![
            candidate("gave", "give"),
            candidate("gave up", "give up"),
            candidate("sold", "sell"),
            candidate("gave", "give"),
        ]);
        let predicates: Vec<_> = kept.iter().map(|c| c.predicate.surface.as_str()).collect();
        assert_eq!(predicates, vec!["gave up", "sold"]);
    }

    #[test]
    fn test_edge_stop_words_stripped() {
        let mut s = sentence(
            "Bayer acquired all the shares.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 1),
                tok(1, "acquired", "acquire", Verb, Dep::Root, 1),
                tok(2, "all", "all", Det, Dep::Det, 4),
                tok(3, "the", "the", Det, Dep::Det, 4),
                tok(4, "shares", "share", Noun, Dep::Dobj, 1),
                tok(5, ".", ".", Punct, Dep::Punct, 1),
            ],
            vec![],
        );
        s.tokens[2].is_stop = true;
        s.tokens[3].is_stop = true;
        assert_eq!(extract(&extractor(), &s), vec![triple("Bayer", "acquired", "shares")]);

        // Stop words inside a named span are part of the name
        let mut s = sentence(
            "The Body Shop sold soap.",
            vec![
                tok(0, "The", "the", Det, Dep::Det, 2),
                tok(1, "Body", "Body", Propn, Dep::Compound, 2),
                tok(2, "Shop", "Shop", Propn, Dep::Nsubj, 3),
                tok(3, "sold", "sell", Verb, Dep::Root, 3),
                tok(4, "soap", "soap", Noun, Dep::Dobj, 3),
                tok(5, ".", ".", Punct, Dep::Punct, 3),
            ],
            vec![org(0, 3)],
        );
        s.tokens[0].is_stop = true;
        assert_eq!(extract(&extractor(), &s), vec![triple("The Body Shop", "sold", "soap")]);
    }

    #[test]
    fn test_negation_and_particle_join_predicate() {
        let s = sentence(
            "Bayer did not give up aspirin.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 3),
                tok(1, "did", "do", Aux, Dep::Aux, 3),
                tok(2, "not", "not", Part, Dep::Neg, 3),
                tok(3, "give", "give", Verb, Dep::Root, 3),
                tok(4, "up", "up", Adp, Dep::Prt, 3),
                tok(5, "aspirin", "aspirin", Noun, Dep::Dobj, 3),
                tok(6, ".", ".", Punct, Dep::Punct, 3),
            ],
            vec![],
        );
        assert_eq!(
            extract(&extractor(), &s),
            vec![triple("Bayer", "not give up", "aspirin")]
        );
    }

    #[test]
    fn test_title_fallback_subject() {
        let s = sentence(
            "Acquired Monsanto.",
            vec![
                tok(0, "Acquired", "acquire", Verb, Dep::Root, 0),
                tok(1, "Monsanto", "Monsanto", Propn, Dep::Dobj, 0),
                tok(2, ".", ".", Punct, Dep::Punct, 0),
            ],
            vec![],
        );
        assert!(extract(&extractor(), &s).is_empty());

        let config = ExtractionConfig {
            fallback_to_title: true,
            ..Default::default()
        };
        let extractor = TripleExtractor::new(&config, Arc::new(Canonicalizer::default()));
        assert_eq!(extract(&extractor, &s), vec![triple("Bayer", "Acquired", "Monsanto")]);
    }

    #[test]
    fn test_domain_terms_type_hint() {
        let mut config = ExtractionConfig::default();
        config.domain_terms.insert("Aspirin".to_string(), EntityType::Drug);
        let extractor = TripleExtractor::new(&config, Arc::new(Canonicalizer::default()));

        let s = sentence(
            "Bayer produces aspirin.",
            vec![
                tok(0, "Bayer", "Bayer", Propn, Dep::Nsubj, 1),
                tok(1, "produces", "produce", Verb, Dep::Root, 1),
                tok(2, "aspirin", "aspirin", Noun, Dep::Dobj, 1),
                tok(3, ".", ".", Punct, Dep::Punct, 1),
            ],
            vec![org(0, 1)],
        );
        let triples = extractor.extract(&DocumentId::new("doc"), "", &s);
        assert_eq!(triples[0].object_type, EntityType::Drug);
        assert_eq!(triples[0].subject_type, EntityType::Organization);
    }

    #[test]
    fn test_malformed_sentence_yields_nothing() {
        let mut s = bayer_acquired_monsanto();
        s.tokens[2].head = 3;
        s.tokens[3].head = 2;
        assert!(extract(&extractor(), &s).is_empty());
    }

    #[test]
    fn test_no_pattern_no_triples() {
        let s = sentence(
            "Leverkusen.",
            vec![
                tok(0, "Leverkusen", "Leverkusen", Propn, Dep::Root, 0),
                tok(1, ".", ".", Punct, Dep::Punct, 0),
            ],
            vec![],
        );
        assert!(extract(&extractor(), &s).is_empty());
    }

    #[test]
    fn test_extract_document_keeps_sentence_index() {
        let mut second = bayer_acquired_monsanto();
        second.index = 4;
        let triples = extractor().extract_document(
            &DocumentId::new("doc"),
            "Bayer",
            &[bayer_acquired_monsanto(), second],
        );
        assert_eq!(triples.len(), 2);
        assert_eq!(triples[1].provenance.sentence_index, 4);
    }
}
