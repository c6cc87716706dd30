use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;
use verdant_core::{
    HitSource, RankedHit, Record, RecordId, SearchConfig, SearchFilters, VerdantError,
    VerdantResult,
};

use crate::diversify::Diversifier;
use crate::embedding::{embed_with_timeout, Embedder};
use crate::filters::extract_filters;
use crate::fusion::reciprocal_rank_fusion;
use crate::generation::{Generation, GenerationBuilder, GenerationHandle};
use crate::query_expansion::{
    ExpansionTable, PassthroughExpander, QueryExpander, RuleBasedExpander,
};
use crate::source::RecordSource;

/// A search query with optional restrictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Explicit restrictions; these win over ones extracted from the text.
    #[serde(default)]
    pub filters: SearchFilters,
    /// Number of hits wanted; 0 means the configured default.
    #[serde(default)]
    pub top_k: usize,
}

impl SearchRequest {
    /// A request for `query` with default filters and size.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set the number of hits. Chainable builder method.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set explicit filters. Chainable builder method.
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Result of [`SearchEngine::search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The query as received.
    pub query: String,
    /// Expanded query text both retrieval paths searched with.
    pub expanded_query: String,
    /// Final ranked hits, ranks `1..=n`.
    pub hits: Vec<RankedHit>,
    /// True when semantic retrieval failed and hits are lexical only.
    pub degraded: bool,
    /// Restrictions actually applied (explicit merged with extracted).
    pub filters_applied: SearchFilters,
    /// Generation the query ran against.
    pub generation_id: Uuid,
    /// Wall-clock time spent in the pipeline.
    pub elapsed_ms: u64,
}

/// Hybrid search over the current index generation.
///
/// Each query snapshots the current [`Generation`] once, expands the query,
/// retrieves candidates from the vector and BM25 indexes concurrently,
/// fuses them with RRF and applies the category cap. When the embedder
/// fails or times out the query is answered from the lexical ranking alone
/// and flagged `degraded`.
pub struct SearchEngine {
    config: SearchConfig,
    embedder: Arc<dyn Embedder>,
    expander: Arc<dyn QueryExpander>,
    diversifier: Diversifier,
    generations: GenerationHandle,
    /// Serializes rebuilds so concurrent `add_records` calls do not lose
    /// each other's records.
    writer: tokio::sync::Mutex<()>,
}

impl SearchEngine {
    /// Create an engine with the expander `config` asks for (built-in table
    /// or passthrough). Use [`SearchEngine::from_config`] to honor
    /// `expansion_table_path`.
    pub fn new(config: SearchConfig, embedder: Arc<dyn Embedder>) -> VerdantResult<Self> {
        config.validate()?;
        let expander: Arc<dyn QueryExpander> = if config.query_expansion_enabled {
            let table = ExpansionTable::builtin();
            let table = if config.expansion_bidirectional {
                table.with_reverse_rules()
            } else {
                table
            };
            Arc::new(RuleBasedExpander::with_table(table))
        } else {
            Arc::new(PassthroughExpander)
        };
        let diversifier = Diversifier::new(config.diversify_cap).enabled(config.diversify_enabled);

        Ok(Self {
            config,
            embedder,
            expander,
            diversifier,
            generations: GenerationHandle::new(),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    /// Like [`SearchEngine::new`], loading the expansion table from
    /// `expansion_table_path` when one is configured.
    pub async fn from_config(
        config: SearchConfig,
        embedder: Arc<dyn Embedder>,
    ) -> VerdantResult<Self> {
        let table_path = config.expansion_table_path.clone();
        let mut engine = Self::new(config, embedder)?;
        if let (Some(path), true) = (table_path, engine.config.query_expansion_enabled) {
            let table = ExpansionTable::load(&path).await?;
            let table = if engine.config.expansion_bidirectional {
                table.with_reverse_rules()
            } else {
                table
            };
            engine.expander = Arc::new(RuleBasedExpander::with_table(table));
        }
        Ok(engine)
    }

    /// Replace the query expander. Chainable builder method.
    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = expander;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The embedder in use.
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// The current generation, or [`VerdantError::IndexNotBuilt`].
    pub fn current_generation(&self) -> VerdantResult<Arc<Generation>> {
        self.generations.current()
    }

    /// Make `generation` current (e.g. one loaded from a
    /// [`crate::GenerationStore`]).
    pub fn install(&self, generation: Generation) -> Arc<Generation> {
        let generation = Arc::new(generation);
        self.generations.install(generation.clone());
        generation
    }

    /// Build a new generation from a full `source` snapshot and swap it in.
    /// Queries keep being served from the previous generation meanwhile.
    pub async fn rebuild(&self, source: &dyn RecordSource) -> VerdantResult<Arc<Generation>> {
        let _writer = self.writer.lock().await;
        tracing::info!(source = %source.describe(), "Rebuilding index");
        let records = source.snapshot().await?;
        let generation = GenerationBuilder::new(self.embedder.as_ref(), &self.config)
            .build(records)
            .await?;
        Ok(self.install(generation))
    }

    /// Copy the current generation, add `records` (replacing same-id ones)
    /// and swap the result in. Builds from scratch when nothing is installed.
    pub async fn add_records(&self, records: Vec<Record>) -> VerdantResult<Arc<Generation>> {
        let _writer = self.writer.lock().await;
        let builder = GenerationBuilder::new(self.embedder.as_ref(), &self.config);
        let generation = match self.generations.current() {
            Ok(base) => builder.extend(&base, records).await?,
            Err(VerdantError::IndexNotBuilt) => builder.build(records).await?,
            Err(e) => return Err(e),
        };
        Ok(self.install(generation))
    }

    /// Run one query through the hybrid pipeline against the current
    /// generation.
    pub async fn search(&self, request: SearchRequest) -> VerdantResult<SearchResponse> {
        let generation = self.generations.current()?;
        self.search_in(&generation, request).await
    }

    /// Run one query against `generation`, which callers that also read
    /// record data for the hits should have snapshotted themselves.
    pub async fn search_in(
        &self,
        generation: &Generation,
        request: SearchRequest,
    ) -> VerdantResult<SearchResponse> {
        let started = Instant::now();
        let top_k = match request.top_k {
            0 => self.config.top_k_default,
            k => k,
        };

        let expanded = match self.expander.expand(&request.query) {
            Ok(expanded) => expanded,
            Err(VerdantError::EmptyQuery) => {
                tracing::debug!(query = %request.query, "Empty query");
                return Ok(SearchResponse {
                    query: request.query,
                    expanded_query: String::new(),
                    hits: Vec::new(),
                    degraded: false,
                    filters_applied: request.filters,
                    generation_id: generation.id(),
                    elapsed_ms: elapsed_ms(started),
                });
            }
            Err(e) => return Err(e),
        };

        let filters = if self.config.extract_query_filters {
            request.filters.clone().or(extract_filters(&request.query))
        } else {
            request.filters.clone()
        };

        let pool = self.config.candidate_pool(top_k);
        let allow = |id: RecordId| {
            filters.is_empty()
                || generation
                    .record(id)
                    .is_some_and(|record| filters.matches(record))
        };
        let timeout = Duration::from_millis(self.config.embed_timeout_ms);

        let semantic = async {
            let vector = embed_with_timeout(self.embedder.as_ref(), &expanded.text, timeout).await?;
            generation.vectors().search_filtered(&vector, pool, &allow)
        };
        let lexical = async {
            generation
                .lexical()
                .search_filtered(&expanded.terms, pool, &allow)
        };
        let (semantic, lexical) = tokio::join!(semantic, lexical);
        let lexical = RankedHit::from_scored(lexical, HitSource::Lexical);

        let (ranked, degraded) = match semantic {
            Ok(semantic) => {
                let semantic = RankedHit::from_scored(semantic, HitSource::Semantic);
                tracing::debug!(
                    semantic = semantic.len(),
                    lexical = lexical.len(),
                    "Retrieved candidates"
                );
                (
                    reciprocal_rank_fusion(&semantic, &lexical, self.config.rrf_constant),
                    false,
                )
            }
            Err(e) => {
                tracing::warn!(
                    query = %request.query,
                    error = %e,
                    "Semantic retrieval unavailable, serving lexical results"
                );
                (lexical, true)
            }
        };

        let hits = self
            .diversifier
            .apply(ranked, top_k, |id| generation.category_of(id));

        let elapsed_ms = elapsed_ms(started);
        tracing::info!(
            query = %request.query,
            generation = %generation.id(),
            hits = hits.len(),
            degraded,
            elapsed_ms,
            "Search completed"
        );

        Ok(SearchResponse {
            query: request.query,
            expanded_query: expanded.text,
            hits,
            degraded,
            filters_applied: filters,
            generation_id: generation.id(),
            elapsed_ms,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
