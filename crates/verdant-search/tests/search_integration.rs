#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the verdant-search crate.
//!
//! Covers the full build → search → persist → reload cycle, degraded
//! lexical-only serving, generation swaps under concurrent readers, JSONL
//! catalogs, custom expansion tables and category capping.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use verdant_core::{
    Category, HitSource, Record, RecordId, SearchConfig, VerdantError, VerdantResult,
};
use verdant_search::{
    Diversifier, Embedder, GenerationStore, HashingEmbedder, InMemoryRecordSource,
    JsonlRecordSource, QueryExpander, RuleBasedExpander, SearchEngine, SearchRequest,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const DIM: usize = 64;

fn config() -> SearchConfig {
    SearchConfig {
        vector_dimension: DIM,
        ..Default::default()
    }
}

fn catalog() -> Vec<Record> {
    vec![
        Record::new(1, "Climeworks", Category::CarbonManagement)
            .with_description("Direct air capture plants that remove CO2 from the atmosphere")
            .with_founded_year(2009)
            .with_funding(800_000_000.0),
        Record::new(2, "Heirloom", Category::CarbonManagement)
            .with_description("Limestone-based direct air capture")
            .with_founded_year(2020)
            .with_funding(53_000_000.0),
        Record::new(3, "CarbonCure", Category::CarbonManagement)
            .with_description("Carbon capture mineralized into concrete")
            .with_founded_year(2012),
        Record::new(4, "Running Tide", Category::CarbonManagement)
            .with_description("Ocean carbon removal with kelp")
            .with_founded_year(2017),
        Record::new(5, "Rivian", Category::GreenTransportation)
            .with_description("Electric vehicle trucks and SUVs")
            .with_founded_year(2009),
        Record::new(6, "ChargePoint", Category::GreenTransportation)
            .with_description("EV charging network")
            .with_founded_year(2007),
        Record::new(7, "Form Energy", Category::EnergyStorage)
            .with_description("Iron-air battery for multi-day grid storage")
            .with_founded_year(2017),
        Record::new(8, "Pachama", Category::ClimateFintech)
            .with_description("Verified carbon credits marketplace")
            .with_founded_year(2018),
    ]
}

async fn built_engine(embedder: Arc<dyn Embedder>, config: SearchConfig) -> SearchEngine {
    let engine = SearchEngine::new(config, embedder).unwrap();
    engine
        .rebuild(&InMemoryRecordSource::new(catalog()))
        .await
        .unwrap();
    engine
}

fn ids(hits: &[verdant_core::RankedHit]) -> Vec<u64> {
    hits.iter().map(|h| h.record_id.0).collect()
}

/// Indexes normally but never answers a query in time.
struct SlowQueryEmbedder {
    inner: HashingEmbedder,
}

#[async_trait]
impl Embedder for SlowQueryEmbedder {
    async fn embed(&self, _text: &str) -> VerdantResult<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(VerdantError::EmbeddingUnavailable("unreachable".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> VerdantResult<Vec<Vec<f32>>> {
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

// ---------------------------------------------------------------------------
// 1. End-to-end hybrid search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hybrid_search_ranks_relevant_records_first() {
    let engine = built_engine(Arc::new(HashingEmbedder::new(DIM)), config()).await;

    let response = engine
        .search(SearchRequest::new("direct air capture").with_top_k(5))
        .await
        .unwrap();

    assert!(!response.degraded);
    assert!(response.hits.len() <= 5);
    let top: Vec<u64> = ids(&response.hits[..2]);
    assert!(top.contains(&1) && top.contains(&2), "got {top:?}");
    assert!(response.hits.iter().all(|h| h.source == HitSource::Fused));

    // Scores are non-increasing along the list.
    for pair in response.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn search_is_deterministic() {
    let engine = built_engine(Arc::new(HashingEmbedder::new(DIM)), config()).await;
    let a = engine.search(SearchRequest::new("EV charging")).await.unwrap();
    let b = engine.search(SearchRequest::new("EV charging")).await.unwrap();
    assert_eq!(a.hits, b.hits);
    assert_eq!(a.expanded_query, b.expanded_query);
    assert!(a.expanded_query.contains("electric"));
}

// ---------------------------------------------------------------------------
// 2. Category cap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn category_cap_is_enforced_without_backfill() {
    let config = SearchConfig {
        diversify_cap: 1,
        ..config()
    };
    let engine = built_engine(Arc::new(HashingEmbedder::new(DIM)), config).await;
    let generation = engine.current_generation().unwrap();

    let response = engine
        .search(SearchRequest::new("carbon capture removal").with_top_k(8))
        .await
        .unwrap();

    let mut seen = std::collections::HashSet::new();
    for hit in &response.hits {
        let category = generation.category_of(hit.record_id).unwrap();
        assert!(seen.insert(category), "{category} appeared twice");
    }
    // Four categories exist in the catalog, so at most four hits come back.
    assert!(response.hits.len() <= 4);
}

// ---------------------------------------------------------------------------
// 3. Degraded mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn embed_timeout_serves_lexical_results() {
    let config = SearchConfig {
        embed_timeout_ms: 50,
        ..config()
    };
    let embedder = Arc::new(SlowQueryEmbedder {
        inner: HashingEmbedder::new(DIM),
    });
    let engine = built_engine(embedder, config).await;

    let response = engine
        .search(SearchRequest::new("kelp ocean"))
        .await
        .unwrap();
    assert!(response.degraded);
    assert_eq!(response.hits[0].record_id, RecordId(4));
    assert!(response.hits.iter().all(|h| h.source == HitSource::Lexical));
}

#[tokio::test]
async fn degraded_results_equal_the_diversified_lexical_ranking() {
    let config = SearchConfig {
        embed_timeout_ms: 50,
        ..config()
    };
    let embedder = Arc::new(SlowQueryEmbedder {
        inner: HashingEmbedder::new(DIM),
    });
    let engine = built_engine(embedder, config.clone()).await;
    let generation = engine.current_generation().unwrap();

    let query = "carbon capture battery storage";
    let top_k = 10;
    let response = engine
        .search(SearchRequest::new(query).with_top_k(top_k))
        .await
        .unwrap();
    assert!(response.degraded);
    assert!(response.filters_applied.is_empty());

    let expanded = RuleBasedExpander::new().expand(query).unwrap();
    assert_eq!(response.expanded_query, expanded.text);
    let lexical = generation
        .lexical()
        .search(&expanded.terms, config.candidate_pool(top_k));
    let expected = Diversifier::new(config.diversify_cap).apply(
        verdant_core::RankedHit::from_scored(lexical, HitSource::Lexical),
        top_k,
        |id| generation.category_of(id),
    );

    assert!(!expected.is_empty());
    assert_eq!(response.hits, expected);
}

// ---------------------------------------------------------------------------
// 4. Filters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn extracted_filters_restrict_both_paths() {
    let engine = built_engine(Arc::new(HashingEmbedder::new(DIM)), config()).await;
    let generation = engine.current_generation().unwrap();

    let response = engine
        .search(SearchRequest::new("carbon management startups raised $100M"))
        .await
        .unwrap();
    assert_eq!(
        response.filters_applied.category,
        Some(Category::CarbonManagement)
    );
    assert_eq!(response.filters_applied.min_funding_usd, Some(100_000_000.0));
    assert_eq!(ids(&response.hits), vec![1]);

    let response = engine
        .search(SearchRequest::new("carbon removal founded before 2015"))
        .await
        .unwrap();
    for hit in &response.hits {
        let record = generation.record(hit.record_id).unwrap();
        assert!(record.founded_year.unwrap() <= 2015);
    }
}

// ---------------------------------------------------------------------------
// 5. Generation lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn readers_keep_their_generation_across_swaps() {
    let engine = Arc::new(built_engine(Arc::new(HashingEmbedder::new(DIM)), config()).await);
    let old = engine.current_generation().unwrap();

    let mut readers = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        readers.push(tokio::spawn(async move {
            engine
                .search(SearchRequest::new("battery storage"))
                .await
                .unwrap()
        }));
    }

    engine
        .add_records(vec![Record::new(9, "Ambri", Category::EnergyStorage)
            .with_description("Liquid metal battery storage")])
        .await
        .unwrap();
    let new = engine.current_generation().unwrap();

    for reader in readers {
        let response = reader.await.unwrap();
        assert!(
            response.generation_id == old.id() || response.generation_id == new.id(),
            "response must come from exactly one generation"
        );
        if response.generation_id == old.id() {
            assert!(response.hits.iter().all(|h| h.record_id != RecordId(9)));
        }
    }
    assert_eq!(old.len(), 8);
    assert_eq!(new.len(), 9);
}

#[tokio::test]
async fn persisted_generation_reloads_to_identical_results() {
    let tmp = TempDir::new().unwrap();
    let store = GenerationStore::new(tmp.path());

    let engine = built_engine(Arc::new(HashingEmbedder::new(DIM)), config()).await;
    let generation = engine.current_generation().unwrap();
    store.save(&generation).await.unwrap();
    let before = engine
        .search(SearchRequest::new("carbon credits marketplace"))
        .await
        .unwrap();

    let restored = SearchEngine::new(config(), Arc::new(HashingEmbedder::new(DIM))).unwrap();
    let loaded = store.load_current().await.unwrap().unwrap();
    restored.install(loaded);
    let after = restored
        .search(SearchRequest::new("carbon credits marketplace"))
        .await
        .unwrap();

    assert_eq!(after.generation_id, before.generation_id);
    assert_eq!(ids(&after.hits), ids(&before.hits));
}

// ---------------------------------------------------------------------------
// 6. Sources and expansion tables
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rebuild_from_jsonl_catalog() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("catalog.jsonl");
    {
        let mut file = std::fs::File::create(&path).unwrap();
        for record in catalog() {
            writeln!(file, "{}", serde_json::to_string(&record).unwrap()).unwrap();
        }
    }

    let engine = SearchEngine::new(config(), Arc::new(HashingEmbedder::new(DIM))).unwrap();
    let generation = engine
        .rebuild(&JsonlRecordSource::new(&path).strict(true))
        .await
        .unwrap();
    assert_eq!(generation.len(), 8);

    let response = engine
        .search(SearchRequest::new("electric trucks"))
        .await
        .unwrap();
    assert_eq!(response.hits[0].record_id, RecordId(5));
}

#[tokio::test]
async fn custom_expansion_table_from_config() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("synonyms.json");
    std::fs::write(&path, r#"{"query_synonyms": {"cdr": ["carbon removal"]}}"#).unwrap();

    let config = SearchConfig {
        expansion_table_path: Some(path),
        ..config()
    };
    let engine = SearchEngine::from_config(config, Arc::new(HashingEmbedder::new(DIM)))
        .await
        .unwrap();
    engine
        .rebuild(&InMemoryRecordSource::new(catalog()))
        .await
        .unwrap();

    let response = engine.search(SearchRequest::new("CDR")).await.unwrap();
    assert_eq!(response.expanded_query, "cdr carbon removal");
    assert_eq!(response.hits[0].record_id, RecordId(4));
}

#[tokio::test]
async fn missing_expansion_table_is_config_error() {
    let config = SearchConfig {
        expansion_table_path: Some("/nonexistent/synonyms.json".into()),
        ..config()
    };
    let result = SearchEngine::from_config(config, Arc::new(HashingEmbedder::new(DIM))).await;
    assert!(matches!(result, Err(VerdantError::Config(_))));
}
