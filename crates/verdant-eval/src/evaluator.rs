use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use verdant_core::{Category, RecordId, VerdantError, VerdantResult};
use verdant_search::{SearchEngine, SearchRequest};

use crate::metrics::QueryMetrics;
use crate::queries::EvaluationQuery;

/// Ids kept per query row of the report.
const TOP_IDS_IN_REPORT: usize = 5;

/// A ranked record as seen by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedRecord {
    /// Record id.
    pub id: RecordId,
    /// The record's category.
    pub category: Category,
}

/// Output of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedList {
    /// Final ranking, best first.
    pub records: Vec<RankedRecord>,
    /// Whether the pipeline served a degraded (lexical-only) ranking.
    pub degraded: bool,
}

/// The pipeline under evaluation, treated as a black box.
#[async_trait]
pub trait RankingPipeline: Send + Sync {
    /// Rank the catalog for `query`, returning up to `depth` records
    /// (`0` lets the pipeline pick its default).
    async fn rank(&self, query: &str, depth: usize) -> VerdantResult<RankedList>;
}

#[async_trait]
impl RankingPipeline for SearchEngine {
    async fn rank(&self, query: &str, depth: usize) -> VerdantResult<RankedList> {
        let generation = self.current_generation()?;
        let response = self
            .search_in(&generation, SearchRequest::new(query).with_top_k(depth))
            .await?;
        let records = response
            .hits
            .iter()
            .map(|hit| RankedRecord {
                id: hit.record_id,
                category: generation
                    .category_of(hit.record_id)
                    .unwrap_or(Category::Unrecognized),
            })
            .collect();
        Ok(RankedList {
            records,
            degraded: response.degraded,
        })
    }
}

/// Mean, minimum and maximum of one metric across queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Arithmetic mean.
    pub mean: f64,
    /// Smallest per-query value.
    pub min: f64,
    /// Largest per-query value.
    pub max: f64,
}

impl MetricSummary {
    fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let sum: f64 = values.iter().sum();
        Self {
            mean: sum / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Aggregates over every query of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// NDCG@10.
    pub ndcg_at_10: MetricSummary,
    /// Precision@10.
    pub precision_at_10: MetricSummary,
    /// Recall@10.
    pub recall_at_10: MetricSummary,
    /// Mean reciprocal rank (`mean`) and its spread.
    pub mrr: MetricSummary,
}

/// How often the top hit landed in the expected category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryAccuracy {
    /// Queries whose top hit matched.
    pub correct: usize,
    /// Queries that named an expected category.
    pub total: usize,
    /// `correct / total`.
    pub accuracy: f64,
}

/// Per-query row of an [`EvaluationReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Query text.
    pub query: String,
    /// Metrics; all zero when the query failed.
    pub metrics: QueryMetrics,
    /// Number of records judged relevant.
    pub relevant: usize,
    /// Leading ids of the returned ranking.
    pub top_ids: Vec<RecordId>,
    /// Category of the first hit.
    pub top_category: Option<Category>,
    /// Expected category, if labeled.
    pub expected_category: Option<Category>,
    /// Whether the pipeline degraded for this query.
    pub degraded: bool,
    /// Pipeline error, when the query failed.
    pub error: Option<String>,
    /// Time spent ranking this query.
    pub elapsed_ms: u64,
}

/// Result of [`Evaluator::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Queries evaluated, failures included.
    pub total_queries: usize,
    /// Queries whose pipeline run failed.
    pub failed_queries: usize,
    /// Queries answered in degraded mode.
    pub degraded_queries: usize,
    /// Metric aggregates over all queries.
    pub aggregate: AggregateMetrics,
    /// Top-1 category accuracy; `None` when no query names a category.
    pub category_accuracy: Option<CategoryAccuracy>,
    /// One row per query, in input order.
    pub queries: Vec<QueryResult>,
}

/// Runs labeled queries through a [`RankingPipeline`] and scores the
/// rankings.
///
/// A query whose pipeline run fails contributes zeros to every metric and
/// carries the error in its row; the run continues with the next query.
pub struct Evaluator<'a> {
    pipeline: &'a dyn RankingPipeline,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    /// Evaluate `pipeline` at its default result depth.
    pub fn new(pipeline: &'a dyn RankingPipeline) -> Self {
        Self { pipeline, depth: 0 }
    }

    /// Ask the pipeline for `depth` results per query. Chainable builder
    /// method.
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Evaluate every query in order.
    pub async fn evaluate(&self, queries: &[EvaluationQuery]) -> EvaluationReport {
        let mut rows = Vec::with_capacity(queries.len());
        for query in queries {
            rows.push(self.evaluate_query(query).await);
        }

        let collect = |f: fn(&QueryMetrics) -> f64| -> Vec<f64> {
            rows.iter().map(|r| f(&r.metrics)).collect()
        };
        let aggregate = AggregateMetrics {
            ndcg_at_10: MetricSummary::from_values(&collect(|m| m.ndcg_at_10)),
            precision_at_10: MetricSummary::from_values(&collect(|m| m.precision_at_10)),
            recall_at_10: MetricSummary::from_values(&collect(|m| m.recall_at_10)),
            mrr: MetricSummary::from_values(&collect(|m| m.reciprocal_rank)),
        };

        let labeled: Vec<&QueryResult> = rows
            .iter()
            .filter(|r| r.expected_category.is_some())
            .collect();
        let category_accuracy = if labeled.is_empty() {
            None
        } else {
            let correct = labeled
                .iter()
                .filter(|r| r.top_category.is_some() && r.top_category == r.expected_category)
                .count();
            Some(CategoryAccuracy {
                correct,
                total: labeled.len(),
                accuracy: correct as f64 / labeled.len() as f64,
            })
        };

        let report = EvaluationReport {
            total_queries: rows.len(),
            failed_queries: rows.iter().filter(|r| r.error.is_some()).count(),
            degraded_queries: rows.iter().filter(|r| r.degraded).count(),
            aggregate,
            category_accuracy,
            queries: rows,
        };
        tracing::info!(
            queries = report.total_queries,
            failed = report.failed_queries,
            ndcg_at_10 = report.aggregate.ndcg_at_10.mean,
            mrr = report.aggregate.mrr.mean,
            "Evaluation finished"
        );
        report
    }

    async fn evaluate_query(&self, query: &EvaluationQuery) -> QueryResult {
        let started = Instant::now();
        let outcome = self.pipeline.rank(&query.query, self.depth).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut row = QueryResult {
            query: query.query.clone(),
            metrics: QueryMetrics::default(),
            relevant: query.relevant_count(),
            top_ids: Vec::new(),
            top_category: None,
            expected_category: query.expected_category,
            degraded: false,
            error: None,
            elapsed_ms,
        };

        match outcome {
            Ok(list) => {
                let ranked: Vec<RecordId> = list.records.iter().map(|r| r.id).collect();
                if row.relevant == 0 {
                    tracing::debug!(query = %query.query, "Query has no relevant records");
                }
                row.metrics = QueryMetrics::compute(&ranked, &query.relevance);
                row.top_ids = ranked.into_iter().take(TOP_IDS_IN_REPORT).collect();
                row.top_category = list.records.first().map(|r| r.category);
                row.degraded = list.degraded;
            }
            Err(e) => {
                tracing::warn!(query = %query.query, error = %e, "Query failed during evaluation");
                row.error = Some(e.to_string());
            }
        }
        row
    }
}

/// Shorthand for `Evaluator::new(pipeline).evaluate(queries)`.
pub async fn evaluate(
    pipeline: &dyn RankingPipeline,
    queries: &[EvaluationQuery],
) -> EvaluationReport {
    Evaluator::new(pipeline).evaluate(queries).await
}

/// Fail with [`VerdantError::Evaluation`] when every query of `report`
/// failed, which usually means the pipeline was never built.
pub fn ensure_usable(report: &EvaluationReport) -> VerdantResult<()> {
    if report.total_queries > 0 && report.failed_queries == report.total_queries {
        let reason = report
            .queries
            .first()
            .and_then(|r| r.error.clone())
            .unwrap_or_default();
        return Err(VerdantError::Evaluation(format!(
            "all {} queries failed: {reason}",
            report.total_queries
        )));
    }
    Ok(())
}
