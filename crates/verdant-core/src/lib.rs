//! Core types and error definitions for the Verdant search engine.
//!
//! This crate provides the foundational types shared across all Verdant crates,
//! including error handling, catalog records, ranked hits, search filters and
//! the search configuration table.
//!
//! # Main types
//!
//! - [`VerdantError`]: Unified error enum for all Verdant subsystems.
//! - [`VerdantResult`]: Convenience alias for `Result<T, VerdantError>`.
//! - [`Record`]: A catalog organization as indexed by one generation.
//! - [`Category`]: One of the twelve climate verticals (plus a fallback bucket).
//! - [`RankedHit`]: A single ranked search result.
//! - [`SearchFilters`]: Category/year/funding restrictions on the candidate set.
//! - [`SearchConfig`]: Tunables for retrieval, fusion and diversification.

/// Search configuration with serde defaults.
pub mod config;
/// Catalog records, categories and filters.
pub mod record;

pub use config::SearchConfig;
pub use record::{Category, Record, RecordId, SearchFilters};

use serde::{Deserialize, Serialize};
use std::fmt;

// --- Error types ---

/// Top-level error type for the Verdant engine.
///
/// The first five variants are the search-path error kinds; the rest cover
/// configuration, persistence and evaluation plumbing.
#[derive(Debug, thiserror::Error)]
pub enum VerdantError {
    /// The query was blank after normalization.
    #[error("Query is empty after normalization")]
    EmptyQuery,

    /// The embedder timed out or failed; semantic retrieval is unavailable.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// No index generation has been installed yet.
    #[error("No index generation is available")]
    IndexNotBuilt,

    /// A vector does not match the generation-wide dimension.
    #[error("Inconsistent vector dimension for {record}: expected {expected}, got {actual}")]
    InconsistentVectorDimension {
        /// Record (or `"query"`) that carried the bad vector.
        record: String,
        /// The generation-wide dimension.
        expected: usize,
        /// The dimension actually supplied.
        actual: usize,
    },

    /// A category label outside the fixed verticals.
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error reading or writing persisted generations or record snapshots.
    #[error("Store error: {0}")]
    Store(String),

    /// An error raised while running an evaluation.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`VerdantError`].
pub type VerdantResult<T> = Result<T, VerdantError>;

// --- Ranked hits ---

/// Which retrieval path produced a [`RankedHit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    /// Dense vector similarity.
    Semantic,
    /// BM25 keyword scoring.
    Lexical,
    /// Reciprocal Rank Fusion of both paths.
    Fused,
}

impl fmt::Display for HitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HitSource::Semantic => "semantic",
            HitSource::Lexical => "lexical",
            HitSource::Fused => "fused",
        };
        f.write_str(label)
    }
}

/// A single ranked result.
///
/// `rank` is 1-based. The meaning of `score` depends on `source`: cosine
/// similarity, BM25 score, or fused RRF score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    /// The record this hit refers to.
    pub record_id: RecordId,
    /// Source-specific relevance score; higher is better.
    pub score: f32,
    /// 1-based position within its list.
    pub rank: usize,
    /// The retrieval path that produced this hit.
    pub source: HitSource,
}

impl RankedHit {
    /// Creates a new hit.
    pub fn new(record_id: RecordId, score: f32, rank: usize, source: HitSource) -> Self {
        Self {
            record_id,
            score,
            rank,
            source,
        }
    }

    /// Turns `(id, score)` pairs that are already in ranked order into hits
    /// with consecutive 1-based ranks.
    pub fn from_scored(scored: Vec<(RecordId, f32)>, source: HitSource) -> Vec<Self> {
        scored
            .into_iter()
            .enumerate()
            .map(|(i, (id, score))| Self::new(id, score, i + 1, source))
            .collect()
    }
}

/// Sorts `(id, score)` pairs by descending score, ties broken by ascending id.
pub fn sort_scored(scored: &mut [(RecordId, f32)]) {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
}
