#![allow(clippy::unwrap_used, clippy::expect_used)]

use verdant_core::*;

// ---------------------------------------------------------------------------
// 1. Catalog records from ingestion JSON
// ---------------------------------------------------------------------------

#[test]
fn record_parses_from_ingestion_json() {
    let record: Record = serde_json::from_str(
        r#"{
            "id": 42,
            "name": "Form Energy",
            "short_description": "Iron-air batteries for multi-day storage",
            "technologies": ["iron-air", "grid storage"],
            "primary_vertical": "Energy Storage",
            "founded_year": 2017,
            "total_funding_usd": 820000000.0
        }"#,
    )
    .unwrap();

    assert_eq!(record.id, RecordId(42));
    assert_eq!(record.category, Category::EnergyStorage);
    assert_eq!(record.founded_year, Some(2017));
    assert!(record.keywords.is_empty());
    assert!(record.lexical_text().contains("energy storage"));
    assert!(record.embedding_text().contains("iron-air"));
}

#[test]
fn unknown_vertical_is_bucketed_not_rejected() {
    let record: Record =
        serde_json::from_str(r#"{"id": 1, "name": "Mystery", "category": "space mining"}"#)
            .unwrap();
    assert_eq!(record.category, Category::Unrecognized);
    assert!(!record.category.is_recognized());

    assert!(matches!(
        Category::parse_strict("space mining"),
        Err(VerdantError::UnknownCategory(label)) if label == "space mining"
    ));
}

#[test]
fn record_serialization_roundtrip() {
    let record = Record::new(7, "Climeworks", Category::CarbonManagement)
        .with_description("Direct air capture")
        .with_founded_year(2009)
        .with_funding(1.2e9)
        .with_technologies(["DAC", "mineralization"]);

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["id"], 7);
    assert_eq!(json["category"], "carbon_management");

    let back: Record = serde_json::from_value(json).unwrap();
    assert_eq!(back, record);
}

// ---------------------------------------------------------------------------
// 2. Category labels
// ---------------------------------------------------------------------------

#[test]
fn every_vertical_parses_from_its_display_name_and_label() {
    assert_eq!(Category::ALL.len(), 12);
    for category in Category::ALL {
        assert_eq!(Category::parse_strict(category.as_str()).unwrap(), category);
        assert_eq!(
            Category::parse_strict(category.display_name()).unwrap(),
            category
        );
        assert_eq!(category.to_string(), category.as_str());
    }
}

// ---------------------------------------------------------------------------
// 3. Filters
// ---------------------------------------------------------------------------

#[test]
fn filters_combine_explicit_and_extracted() {
    let explicit = SearchFilters {
        category: Some(Category::CleanEnergy),
        ..Default::default()
    };
    let extracted = SearchFilters {
        category: Some(Category::EnergyStorage),
        founded_year_min: Some(2015),
        ..Default::default()
    };
    let merged = explicit.or(extracted);

    assert_eq!(merged.category, Some(Category::CleanEnergy));
    assert_eq!(merged.founded_year_min, Some(2015));
    assert!(!merged.is_empty());

    let young_solar = Record::new(1, "Sunbeam", Category::CleanEnergy).with_founded_year(2020);
    let old_solar = Record::new(2, "Oldsun", Category::CleanEnergy).with_founded_year(1998);
    let undated = Record::new(3, "Nodate", Category::CleanEnergy);
    assert!(merged.matches(&young_solar));
    assert!(!merged.matches(&old_solar));
    assert!(!merged.matches(&undated));
}

#[test]
fn empty_filters_match_everything() {
    let filters = SearchFilters::default();
    assert!(filters.is_empty());
    assert!(filters.matches(&Record::new(1, "Any", Category::Unrecognized)));
}

// ---------------------------------------------------------------------------
// 4. Ranked hits and errors
// ---------------------------------------------------------------------------

#[test]
fn ranked_hits_number_from_one_in_score_order() {
    let mut scored = vec![
        (RecordId(4), 0.2),
        (RecordId(9), 0.8),
        (RecordId(1), 0.2),
    ];
    sort_scored(&mut scored);
    let hits = RankedHit::from_scored(scored, HitSource::Lexical);

    let order: Vec<(u64, usize)> = hits.iter().map(|h| (h.record_id.0, h.rank)).collect();
    assert_eq!(order, vec![(9, 1), (1, 2), (4, 3)]);
    assert!(hits.iter().all(|h| h.source == HitSource::Lexical));
}

#[test]
fn error_messages_carry_context() {
    let err = VerdantError::InconsistentVectorDimension {
        record: "17".to_string(),
        expected: 384,
        actual: 128,
    };
    assert_eq!(
        err.to_string(),
        "Inconsistent vector dimension for 17: expected 384, got 128"
    );

    let err: VerdantError = serde_json::from_str::<Record>("{").unwrap_err().into();
    assert!(matches!(err, VerdantError::Json(_)));
}

// ---------------------------------------------------------------------------
// 5. Configuration
// ---------------------------------------------------------------------------

#[test]
fn partial_config_keeps_defaults() {
    let config: SearchConfig =
        serde_json::from_str(r#"{"diversify_cap": 5, "rrf_constant": 10.0}"#).unwrap();
    config.validate().unwrap();
    assert_eq!(config.diversify_cap, 5);
    assert_eq!(config.bm25_k1, 1.2);
    assert_eq!(config.candidate_pool(10), 50);
    assert_eq!(config.candidate_pool(100), 200);
}

#[test]
fn invalid_config_is_a_config_error() {
    let config = SearchConfig {
        bm25_b: 1.5,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(VerdantError::Config(_))));
}
