#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the verdant-eval crate.
//!
//! Runs labeled query sets against a real `SearchEngine` built over a small
//! climate catalog.

use std::sync::Arc;

use tempfile::TempDir;

use verdant_core::{Category, Record, SearchConfig};
use verdant_eval::{ensure_usable, EvaluationQuery, Evaluator, QuerySet};
use verdant_search::{HashingEmbedder, InMemoryRecordSource, SearchEngine};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn catalog() -> Vec<Record> {
    vec![
        Record::new(1, "Climeworks", Category::CarbonManagement)
            .with_description("Direct air capture of CO2"),
        Record::new(2, "Heirloom", Category::CarbonManagement)
            .with_description("Direct air capture with limestone"),
        Record::new(3, "Sunrun", Category::CleanEnergy).with_description("Residential solar"),
        Record::new(4, "Orsted", Category::CleanEnergy).with_description("Offshore wind farms"),
        Record::new(5, "Northvolt", Category::EnergyStorage)
            .with_description("Lithium-ion battery gigafactories"),
        Record::new(6, "Xylem", Category::WaterOcean)
            .with_description("Water treatment and desalination"),
    ]
}

async fn engine() -> SearchEngine {
    let config = SearchConfig {
        vector_dimension: 64,
        ..Default::default()
    };
    let engine = SearchEngine::new(config, Arc::new(HashingEmbedder::new(64))).unwrap();
    engine
        .rebuild(&InMemoryRecordSource::new(catalog()))
        .await
        .unwrap();
    engine
}

// ---------------------------------------------------------------------------
// 1. Evaluating a live engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn evaluates_engine_with_sensible_metrics() {
    let engine = engine().await;
    let queries = vec![
        EvaluationQuery::new("direct air capture")
            .with_judgment(1, 2)
            .with_judgment(2, 2)
            .with_expected_category(Category::CarbonManagement),
        EvaluationQuery::new("desalination")
            .with_judgment(6, 1)
            .with_expected_category(Category::WaterOcean),
    ];

    let report = Evaluator::new(&engine).with_depth(10).evaluate(&queries).await;
    ensure_usable(&report).unwrap();

    assert_eq!(report.total_queries, 2);
    assert_eq!(report.failed_queries, 0);
    assert_eq!(report.degraded_queries, 0);
    for row in &report.queries {
        assert_eq!(row.metrics.reciprocal_rank, 1.0, "query {}", row.query);
        assert!((row.metrics.ndcg_at_10 - 1.0).abs() < 1e-9);
    }
    assert_eq!(report.category_accuracy.unwrap().accuracy, 1.0);
    assert!((report.aggregate.recall_at_10.mean - 1.0).abs() < 1e-9);
    assert!((report.aggregate.precision_at_10.mean - 0.15).abs() < 1e-9);
}

#[tokio::test]
async fn unbuilt_engine_records_failures_without_aborting() {
    let engine = SearchEngine::new(
        SearchConfig {
            vector_dimension: 64,
            ..Default::default()
        },
        Arc::new(HashingEmbedder::new(64)),
    )
    .unwrap();
    let queries = vec![
        EvaluationQuery::new("solar").with_judgment(3, 1),
        EvaluationQuery::new("wind").with_judgment(4, 1),
    ];

    let report = Evaluator::new(&engine).evaluate(&queries).await;
    assert_eq!(report.total_queries, 2);
    assert_eq!(report.failed_queries, 2);
    assert_eq!(report.aggregate.ndcg_at_10.mean, 0.0);
    assert!(ensure_usable(&report).is_err());
}

#[tokio::test]
async fn blank_query_scores_zero() {
    let engine = engine().await;
    let report = Evaluator::new(&engine)
        .evaluate(&[EvaluationQuery::new("   ").with_judgment(1, 1)])
        .await;
    assert!(report.queries[0].error.is_none());
    assert_eq!(report.queries[0].metrics.reciprocal_rank, 0.0);
}

// ---------------------------------------------------------------------------
// 2. Query sets on disk
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loads_query_set_and_report_serializes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("queries.json");
    std::fs::write(
        &path,
        r#"{"queries": [
            {"query": "offshore wind", "relevance": {"4": 2}, "expected_category": "clean_energy"},
            {"query": "battery", "relevance": {"5": 1}}
        ]}"#,
    )
    .unwrap();

    let set = QuerySet::load(&path).await.unwrap();
    assert_eq!(set.len(), 2);

    let engine = engine().await;
    let report = Evaluator::new(&engine).evaluate(&set.queries).await;
    assert_eq!(report.queries[0].top_ids[0].0, 4);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total_queries"], 2);
    assert!(json["aggregate"]["ndcg_at_10"]["mean"].is_number());
    assert_eq!(json["queries"][0]["expected_category"], "clean_energy");
}
