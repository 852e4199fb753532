//! Lexical retrieval with Okapi BM25.
//!
//! [`Bm25Index`] is an immutable value: [`Bm25Index::build`] tokenizes and
//! indexes a corpus, and the only ways to change the document set
//! ([`with_document`](Bm25Index::with_document),
//! [`without_document`](Bm25Index::without_document)) return a new index with
//! document frequencies and average length recomputed from scratch, so the
//! statistics always match the exact set of indexed documents.
//!
//! # Scoring
//!
//! ```text
//! score(D, Q) = Σ_{t ∈ Q} IDF(t) · f(t,D)·(k1+1) / (f(t,D) + k1·(1 − b + b·|D|/avgdl))
//! IDF(t)      = ln((N − n(t) + 0.5) / (n(t) + 0.5) + 1)
//! ```
//!
//! with `k1 = 1.5` and `b = 0.75`. Query tokens are summed as given, so a
//! repeated query term counts once per occurrence. Results are ordered by
//! score descending, ties broken by ingestion order.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::CorpusDocument;

/// Term-frequency saturation.
pub const K1: f64 = 1.5;
/// Document-length normalization strength.
pub const B: f64 = 0.75;

/// Case-fold, split on non-alphanumeric characters, drop empty tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// An indexed document with its derived term statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalDocument {
    id: String,
    title: Option<String>,
    text: String,
    #[serde(skip)]
    term_frequencies: HashMap<String, u32>,
    length: usize,
}

impl RetrievalDocument {
    pub fn new(id: impl Into<String>, title: Option<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = tokenize(&text);
        let mut term_frequencies = HashMap::new();
        for token in &tokens {
            *term_frequencies.entry(token.clone()).or_insert(0) += 1;
        }
        Self {
            id: id.into(),
            title,
            text,
            term_frequencies,
            length: tokens.len(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of tokens in the document.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn term_frequency(&self, term: &str) -> u32 {
        self.term_frequencies.get(term).copied().unwrap_or(0)
    }

    pub fn term_frequencies(&self) -> &HashMap<String, u32> {
        &self.term_frequencies
    }
}

impl From<CorpusDocument> for RetrievalDocument {
    fn from(doc: CorpusDocument) -> Self {
        Self::new(doc.id, doc.title, doc.text)
    }
}

/// A ranked query hit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument<'a> {
    pub document: &'a RetrievalDocument,
    pub score: f64,
}

/// Inverted statistics over an immutable document set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bm25Index {
    documents: Vec<RetrievalDocument>,
    document_frequencies: HashMap<String, usize>,
    avg_doc_len: f64,
}

impl Bm25Index {
    /// Index a corpus. Building again from the same documents yields an
    /// identical index.
    pub fn build<I, D>(documents: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<RetrievalDocument>,
    {
        Self::from_documents(documents.into_iter().map(Into::into).collect())
    }

    fn from_documents(documents: Vec<RetrievalDocument>) -> Self {
        let mut document_frequencies: HashMap<String, usize> = HashMap::new();
        for doc in &documents {
            for term in doc.term_frequencies.keys() {
                *document_frequencies.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let total_len: usize = documents.iter().map(|d| d.length).sum();
        let avg_doc_len = if documents.is_empty() {
            0.0
        } else {
            total_len as f64 / documents.len() as f64
        };
        Self {
            documents,
            document_frequencies,
            avg_doc_len,
        }
    }

    /// A new index with `doc` appended, replacing any document with the same id.
    pub fn with_document(&self, doc: impl Into<RetrievalDocument>) -> Self {
        let doc = doc.into();
        let mut documents: Vec<RetrievalDocument> = self
            .documents
            .iter()
            .filter(|d| d.id != doc.id)
            .cloned()
            .collect();
        documents.push(doc);
        Self::from_documents(documents)
    }

    /// A new index without the document `id`.
    pub fn without_document(&self, id: &str) -> Self {
        Self::from_documents(
            self.documents
                .iter()
                .filter(|d| d.id != id)
                .cloned()
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents in ingestion order.
    pub fn documents(&self) -> &[RetrievalDocument] {
        &self.documents
    }

    pub fn avg_doc_len(&self) -> f64 {
        self.avg_doc_len
    }

    /// Number of documents containing `term`.
    pub fn document_frequency(&self, term: &str) -> usize {
        self.document_frequencies.get(term).copied().unwrap_or(0)
    }

    pub fn document_frequencies(&self) -> &HashMap<String, usize> {
        &self.document_frequencies
    }

    /// Smoothed inverse document frequency; never negative.
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.documents.len() as f64;
        let df = self.document_frequency(term) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_tokens(&self, doc: &RetrievalDocument, tokens: &[String]) -> f64 {
        tokens
            .iter()
            .map(|term| {
                let tf = doc.term_frequency(term) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let norm = 1.0 - B + B * doc.length as f64 / self.avg_doc_len;
                self.idf(term) * (tf * (K1 + 1.0)) / (tf + K1 * norm)
            })
            .sum()
    }

    /// BM25 score of the document at `position` for `query`.
    pub fn score(&self, position: usize, query: &str) -> Option<f64> {
        let doc = self.documents.get(position)?;
        Some(self.score_tokens(doc, &tokenize(query)))
    }

    /// Top `k` documents for `query`, score descending, ties in ingestion
    /// order. Every document is scored, so documents matching no query term
    /// are returned with score `0.0` when `k` reaches past the matches.
    pub fn query(&self, query: &str, k: usize) -> Vec<ScoredDocument<'_>> {
        if self.documents.is_empty() || k == 0 {
            return Vec::new();
        }
        let tokens = tokenize(query);
        let mut scored: Vec<ScoredDocument<'_>> = self
            .documents
            .iter()
            .map(|doc| ScoredDocument {
                document: doc,
                score: self.score_tokens(doc, &tokens),
            })
            .collect();
        // Stable sort keeps ingestion order among equal scores.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<CorpusDocument> {
        [
            ("d1", "Team retrospective notes: velocity dropped, retrospective actions agreed. Velocity trend down."),
            ("d2", "Deployment runbook for the payments service."),
            ("d3", "Sprint velocity chart and capacity planning."),
            ("d4", "Retrospective format guide for facilitators."),
            ("d5", "Onboarding checklist for new engineers."),
        ]
        .into_iter()
        .map(|(id, text)| CorpusDocument {
            id: id.to_string(),
            title: Some(id.to_uppercase()),
            text: text.to_string(),
        })
        .collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Sprint-42: Velocity, DROPPED!!  again"),
            vec!["sprint", "42", "velocity", "dropped", "again"]
        );
        assert!(tokenize("  --  ").is_empty());
        assert_eq!(tokenize("snake_case"), vec!["snake", "case"]);
    }

    #[test]
    fn test_empty_corpus_returns_nothing() {
        let index = Bm25Index::build(Vec::<CorpusDocument>::new());
        assert!(index.query("anything at all", 5).is_empty());
        assert!(index.query("", 0).is_empty());
        assert_eq!(index.avg_doc_len(), 0.0);
    }

    #[test]
    fn test_scenario_top_three() {
        let index = Bm25Index::build(corpus());
        let hits = index.query("retrospective velocity", 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document.id(), "d1");
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
        assert!(hits[2].score > 0.0);
    }

    #[test]
    fn test_k_beyond_corpus_returns_everything_ranked() {
        let index = Bm25Index::build(corpus());
        let hits = index.query("retrospective velocity", 50);
        assert_eq!(hits.len(), 5);
        let zero: Vec<&str> = hits
            .iter()
            .filter(|h| h.score == 0.0)
            .map(|h| h.document.id())
            .collect();
        assert_eq!(zero, vec!["d2", "d5"], "zero scores keep ingestion order");
    }

    #[test]
    fn test_unknown_terms_score_zero() {
        let index = Bm25Index::build(corpus());
        let hits = index.query("kubernetes", 5);
        assert!(hits.iter().all(|h| h.score == 0.0));
        let ids: Vec<&str> = hits.iter().map(|h| h.document.id()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3", "d4", "d5"]);
    }

    #[test]
    fn test_ties_broken_by_ingestion_order() {
        let docs = vec![
            CorpusDocument {
                id: "b".into(),
                title: None,
                text: "velocity".into(),
            },
            CorpusDocument {
                id: "a".into(),
                title: None,
                text: "velocity".into(),
            },
            CorpusDocument {
                id: "c".into(),
                title: None,
                text: "other".into(),
            },
        ];
        let index = Bm25Index::build(docs);
        let first: Vec<&str> = index
            .query("velocity", 3)
            .iter()
            .map(|h| h.document.id())
            .collect();
        assert_eq!(first, vec!["b", "a", "c"]);
        for _ in 0..10 {
            let again: Vec<&str> = index
                .query("velocity", 3)
                .iter()
                .map(|h| h.document.id())
                .collect();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_build_is_idempotent() {
        let a = Bm25Index::build(corpus());
        let b = Bm25Index::build(corpus());
        assert_eq!(a, b);
        assert_eq!(a.document_frequencies(), b.document_frequencies());
        for (da, db) in a.documents().iter().zip(b.documents()) {
            assert_eq!(da.term_frequencies(), db.term_frequencies());
        }
    }

    #[test]
    fn test_idf_never_negative() {
        let docs: Vec<CorpusDocument> = (0..10)
            .map(|i| CorpusDocument {
                id: i.to_string(),
                title: None,
                text: "common word everywhere".into(),
            })
            .collect();
        let index = Bm25Index::build(docs);
        assert!(index.idf("common") > 0.0);
        assert!(index.idf("absent") > index.idf("common"));
    }

    #[test]
    fn test_score_matches_formula() {
        let docs = vec![
            CorpusDocument {
                id: "1".into(),
                title: None,
                text: "alpha alpha beta".into(),
            },
            CorpusDocument {
                id: "2".into(),
                title: None,
                text: "beta".into(),
            },
        ];
        let index = Bm25Index::build(docs);
        // N=2, n(alpha)=1, |D|=3, avgdl=2
        let idf = ((2.0_f64 - 1.0 + 0.5) / (1.0 + 0.5) + 1.0).ln();
        let expected = idf * (2.0 * (K1 + 1.0)) / (2.0 + K1 * (1.0 - B + B * 3.0 / 2.0));
        let got = index.score(0, "alpha").unwrap();
        assert!((got - expected).abs() < 1e-12);
        assert!(index.score(5, "alpha").is_none());
    }

    #[test]
    fn test_mutation_recomputes_statistics() {
        let index = Bm25Index::build(corpus());
        let added = index.with_document(CorpusDocument {
            id: "d6".into(),
            title: None,
            text: "velocity velocity velocity".into(),
        });
        assert_eq!(added.len(), 6);
        assert_eq!(added.document_frequency("velocity"), index.document_frequency("velocity") + 1);

        let removed = added.without_document("d6");
        assert_eq!(removed, index);

        let replaced = index.with_document(CorpusDocument {
            id: "d2".into(),
            title: None,
            text: "velocity".into(),
        });
        assert_eq!(replaced.len(), 5);
        assert_eq!(replaced.documents().last().unwrap().id(), "d2");
        assert_eq!(replaced.document_frequency("deployment"), 0);
    }
}
