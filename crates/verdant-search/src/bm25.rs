use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use verdant_core::{sort_scored, RecordId};

use crate::tokenizer::tokenize;

/// Default BM25 term-frequency saturation.
pub const DEFAULT_K1: f32 = 1.2;
/// Default BM25 length normalization.
pub const DEFAULT_B: f32 = 0.75;

/// One entry of a term's posting list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    /// Document containing the term.
    pub record_id: RecordId,
    /// Occurrences of the term in that document.
    pub term_frequency: u32,
}

/// A BM25 inverted index for keyword-based record retrieval.
///
/// Maintains an inverted index mapping terms to postings, along with the
/// document length statistics the BM25 formula needs. `k1` and `b` are fixed
/// for the lifetime of the index.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    k1: f32,
    b: f32,
    /// term -> postings
    postings: HashMap<String, Vec<Posting>>,
    /// record id -> document length (term count)
    doc_lengths: HashMap<RecordId, u32>,
    /// Sum of all document lengths.
    total_length: u64,
}

/// Serializable form of a [`LexicalIndex`], written as `lexical.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalSnapshot {
    /// BM25 `k1` the index was built with.
    pub k1: f32,
    /// BM25 `b` the index was built with.
    pub b: f32,
    /// `(record id, document length)` pairs, sorted by id.
    pub documents: Vec<(RecordId, u32)>,
    /// `(term, postings)` pairs, sorted by term.
    pub postings: Vec<(String, Vec<Posting>)>,
}

impl LexicalIndex {
    /// Create an empty index with the default parameters.
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B)
    }

    /// Create an empty index with explicit `k1` and `b`.
    pub fn with_params(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            postings: HashMap::new(),
            doc_lengths: HashMap::new(),
            total_length: 0,
        }
    }

    /// Add a document to the index, replacing any previous version of it.
    pub fn add_document(&mut self, id: RecordId, text: &str) {
        self.remove_document(id);

        let tokens = tokenize(text);
        let mut term_freq: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.clone()).or_insert(0) += 1;
        }

        for (term, freq) in term_freq {
            self.postings.entry(term).or_default().push(Posting {
                record_id: id,
                term_frequency: freq,
            });
        }

        let len = tokens.len() as u32;
        self.doc_lengths.insert(id, len);
        self.total_length += u64::from(len);
    }

    /// Remove a document from every posting list. Returns whether it was
    /// indexed.
    pub fn remove_document(&mut self, id: RecordId) -> bool {
        let Some(len) = self.doc_lengths.remove(&id) else {
            return false;
        };
        self.total_length = self.total_length.saturating_sub(u64::from(len));

        self.postings.retain(|_, list| {
            list.retain(|p| p.record_id != id);
            !list.is_empty()
        });
        true
    }

    /// Score the documents matching `terms` and return up to `k` of them by
    /// descending BM25 score.
    pub fn search(&self, terms: &[String], k: usize) -> Vec<(RecordId, f32)> {
        self.search_filtered(terms, k, |_| true)
    }

    /// Like [`LexicalIndex::search`], restricted to documents accepted by
    /// `allow`.
    ///
    /// ```text
    /// score = Σ over query terms t:
    ///   IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
    /// IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1)
    /// ```
    ///
    /// Terms absent from the vocabulary contribute nothing. Repeated query
    /// terms are scored once. Ties are broken by ascending record id.
    pub fn search_filtered<F>(&self, terms: &[String], k: usize, allow: F) -> Vec<(RecordId, f32)>
    where
        F: Fn(RecordId) -> bool,
    {
        if self.doc_lengths.is_empty() || terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let n = self.doc_lengths.len() as f32;
        let avgdl = match self.average_doc_length() {
            avg if avg > 0.0 => avg,
            _ => 1.0,
        };

        let mut seen: Vec<&str> = Vec::with_capacity(terms.len());
        let mut scores: HashMap<RecordId, f32> = HashMap::new();

        for term in terms {
            if seen.contains(&term.as_str()) {
                continue;
            }
            seen.push(term);

            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for posting in postings.iter().filter(|p| allow(p.record_id)) {
                let tf = posting.term_frequency as f32;
                let dl = self
                    .doc_lengths
                    .get(&posting.record_id)
                    .copied()
                    .unwrap_or(0) as f32;

                let numerator = tf * (self.k1 + 1.0);
                let denominator = tf + self.k1 * (1.0 - self.b + self.b * dl / avgdl);
                *scores.entry(posting.record_id).or_insert(0.0) += idf * numerator / denominator;
            }
        }

        let mut results: Vec<(RecordId, f32)> = scores.into_iter().collect();
        sort_scored(&mut results);
        results.truncate(k);
        results
    }

    /// Number of indexed documents.
    pub fn document_count(&self) -> usize {
        self.doc_lengths.len()
    }

    /// Number of distinct terms.
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    /// Mean document length in terms; 0 for an empty index.
    pub fn average_doc_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.doc_lengths.len() as f32
        }
    }

    /// Whether `id` is indexed.
    pub fn contains(&self, id: RecordId) -> bool {
        self.doc_lengths.contains_key(&id)
    }

    /// `(k1, b)` in use.
    pub fn params(&self) -> (f32, f32) {
        (self.k1, self.b)
    }

    /// Deterministic serializable copy of the index.
    pub fn snapshot(&self) -> LexicalSnapshot {
        let mut documents: Vec<(RecordId, u32)> =
            self.doc_lengths.iter().map(|(id, len)| (*id, *len)).collect();
        documents.sort_by_key(|(id, _)| *id);

        let mut postings: Vec<(String, Vec<Posting>)> = self
            .postings
            .iter()
            .map(|(term, list)| {
                let mut list = list.clone();
                list.sort_by_key(|p| p.record_id);
                (term.clone(), list)
            })
            .collect();
        postings.sort_by(|a, b| a.0.cmp(&b.0));

        LexicalSnapshot {
            k1: self.k1,
            b: self.b,
            documents,
            postings,
        }
    }

    /// Rebuild an index from a snapshot.
    pub fn from_snapshot(snapshot: LexicalSnapshot) -> Self {
        let total_length = snapshot
            .documents
            .iter()
            .map(|(_, len)| u64::from(*len))
            .sum();
        Self {
            k1: snapshot.k1,
            b: snapshot.b,
            postings: snapshot.postings.into_iter().collect(),
            doc_lengths: snapshot.documents.into_iter().collect(),
            total_length,
        }
    }
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new()
    }
}
