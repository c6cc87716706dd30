//! Hybrid semantic + lexical retrieval for the Verdant engine.
//!
//! Records are indexed twice from the same snapshot: as L2-normalized dense
//! vectors for cosine search and as BM25 postings for keyword search. Query
//! time expands the query with climate-domain synonyms, retrieves from both
//! indexes concurrently, fuses the two rankings with Reciprocal Rank Fusion
//! and caps results per category.
//!
//! # Main types
//!
//! - [`SearchEngine`]: The query pipeline and generation lifecycle.
//! - [`Generation`]: An immutable snapshot of records plus both indexes.
//! - [`GenerationStore`]: On-disk persistence of generations.
//! - [`VectorIndex`]: Exact cosine search over normalized vectors.
//! - [`LexicalIndex`]: BM25 inverted index.
//! - [`Embedder`]: Trait for text-to-vector models.
//! - [`QueryExpander`]: Trait for synonym-based query rewriting.
//! - [`RecordSource`]: Trait for catalog snapshots fed to index builds.

/// BM25 inverted index.
pub mod bm25;
/// Per-category result caps.
pub mod diversify;
/// Embedder trait and implementations.
pub mod embedding;
/// The search pipeline.
pub mod engine;
/// Filter extraction from query text.
pub mod filters;
/// Reciprocal Rank Fusion.
pub mod fusion;
/// Index generations and the atomic current-generation pointer.
pub mod generation;
/// On-disk generation store.
pub mod persistence;
/// Synonym-based query expansion.
pub mod query_expansion;
/// Catalog snapshot sources.
pub mod source;
/// Text normalization and tokenization.
pub mod tokenizer;
/// Dense vector index.
pub mod vector;

pub use bm25::{LexicalIndex, LexicalSnapshot, Posting};
pub use diversify::{category_distribution, Diversifier};
pub use embedding::{embed_with_timeout, Embedder, HashingEmbedder};
#[cfg(feature = "http-embeddings")]
pub use embedding::HttpEmbedder;
pub use engine::{SearchEngine, SearchRequest, SearchResponse};
pub use filters::extract_filters;
pub use fusion::{reciprocal_rank_fusion, DEFAULT_RRF_CONSTANT};
pub use generation::{Generation, GenerationBuilder, GenerationHandle, GenerationStats};
pub use persistence::{GenerationManifest, GenerationStore};
pub use query_expansion::{
    ExpandedQuery, ExpansionTable, PassthroughExpander, QueryExpander, RuleBasedExpander,
};
pub use source::{InMemoryRecordSource, JsonlRecordSource, RecordSource};
pub use tokenizer::{normalize, tokenize};
pub use vector::{VectorEntry, VectorIndex};
