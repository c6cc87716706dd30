//! Standard Information Retrieval metrics over a ranked list of record ids
//! and graded relevance judgments.
//!
//! Judgments map a record id to a grade; grade 0 and unjudged records are
//! not relevant. Ranked lists are assumed free of duplicate ids.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use verdant_core::RecordId;

/// Rank cutoff for NDCG, precision and recall.
pub const CUTOFF: usize = 10;

/// Metrics of a single query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    /// NDCG@10.
    pub ndcg_at_10: f64,
    /// Precision@10.
    pub precision_at_10: f64,
    /// Recall@10.
    pub recall_at_10: f64,
    /// Reciprocal rank of the first relevant hit over the whole list.
    pub reciprocal_rank: f64,
}

impl QueryMetrics {
    /// Compute every metric for `ranked` against `judgments`.
    pub fn compute(ranked: &[RecordId], judgments: &BTreeMap<RecordId, u32>) -> Self {
        Self {
            ndcg_at_10: ndcg_at_k(ranked, judgments, CUTOFF),
            precision_at_10: precision_at_k(ranked, judgments, CUTOFF),
            recall_at_10: recall_at_k(ranked, judgments, CUTOFF),
            reciprocal_rank: reciprocal_rank(ranked, judgments),
        }
    }
}

fn grade(judgments: &BTreeMap<RecordId, u32>, id: &RecordId) -> u32 {
    judgments.get(id).copied().unwrap_or(0)
}

/// Discounted cumulative gain of the first `k` grades.
///
/// ```text
/// DCG@k = Σ rel_i / log₂(i + 1)   for i in 1..=k
/// ```
pub fn dcg_at_k(grades: &[u32], k: usize) -> f64 {
    grades
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, &rel)| f64::from(rel) / ((i + 2) as f64).log2())
        .sum()
}

/// NDCG@k: DCG of `ranked` divided by the DCG of the judged grades sorted
/// descending. 0 when nothing is judged relevant.
pub fn ndcg_at_k(ranked: &[RecordId], judgments: &BTreeMap<RecordId, u32>, k: usize) -> f64 {
    let mut ideal: Vec<u32> = judgments.values().copied().filter(|&g| g > 0).collect();
    ideal.sort_unstable_by(|a, b| b.cmp(a));
    let idcg = dcg_at_k(&ideal, k);
    if idcg == 0.0 {
        return 0.0;
    }

    let grades: Vec<u32> = ranked.iter().take(k).map(|id| grade(judgments, id)).collect();
    dcg_at_k(&grades, k) / idcg
}

fn relevant_in_top_k(ranked: &[RecordId], judgments: &BTreeMap<RecordId, u32>, k: usize) -> usize {
    ranked
        .iter()
        .take(k)
        .filter(|id| grade(judgments, id) > 0)
        .count()
}

/// Relevant records among the top `k`, divided by `k`. A list shorter than
/// `k` is not padded out of the denominator.
pub fn precision_at_k(ranked: &[RecordId], judgments: &BTreeMap<RecordId, u32>, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    relevant_in_top_k(ranked, judgments, k) as f64 / k as f64
}

/// Relevant records among the top `k`, divided by all relevant records.
/// 0 when nothing is judged relevant.
pub fn recall_at_k(ranked: &[RecordId], judgments: &BTreeMap<RecordId, u32>, k: usize) -> f64 {
    let total = judgments.values().filter(|&&g| g > 0).count();
    if total == 0 {
        return 0.0;
    }
    relevant_in_top_k(ranked, judgments, k) as f64 / total as f64
}

/// `1 / rank` of the first relevant record, 0 if none is returned.
pub fn reciprocal_rank(ranked: &[RecordId], judgments: &BTreeMap<RecordId, u32>) -> f64 {
    ranked
        .iter()
        .position(|id| grade(judgments, id) > 0)
        .map(|i| 1.0 / (i + 1) as f64)
        .unwrap_or(0.0)
}
