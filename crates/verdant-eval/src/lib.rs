//! Offline ranking-quality evaluation for the Verdant engine.
//!
//! Drives a [`RankingPipeline`] (normally a built
//! [`verdant_search::SearchEngine`]) with labeled queries and reports
//! NDCG@10, Precision@10, Recall@10 and MRR, with per-query rows and
//! min/max spreads.

/// The evaluation driver and its report.
pub mod evaluator;
/// IR metric functions.
pub mod metrics;
/// Labeled query sets.
pub mod queries;

pub use evaluator::{
    ensure_usable, evaluate, AggregateMetrics, CategoryAccuracy, EvaluationReport, Evaluator,
    MetricSummary, QueryResult, RankedList, RankedRecord, RankingPipeline,
};
pub use metrics::{QueryMetrics, CUTOFF};
pub use queries::{EvaluationQuery, QuerySet};
