use crate::{VerdantError, VerdantResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tunables for the search pipeline, read from the `[search]` table of
/// `verdant.toml`. Every field has a default, so an empty table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// RRF smoothing constant `c` in `1 / (c + rank)`.
    #[serde(default = "default_rrf_constant")]
    pub rrf_constant: f32,
    /// Maximum hits per category after diversification.
    #[serde(default = "default_diversify_cap")]
    pub diversify_cap: usize,
    /// When false the fused order is only truncated to `top_k`.
    #[serde(default = "default_true")]
    pub diversify_enabled: bool,
    /// JSON synonym table; the built-in climate table is used when unset.
    #[serde(default)]
    pub expansion_table_path: Option<PathBuf>,
    /// Also register `synonym -> term` rules for single-term synonyms.
    #[serde(default)]
    pub expansion_bidirectional: bool,
    /// When false queries are only tokenized, never expanded.
    #[serde(default = "default_true")]
    pub query_expansion_enabled: bool,
    /// Pull year/funding/category filters out of the query text.
    #[serde(default = "default_true")]
    pub extract_query_filters: bool,
    /// Dimension every vector of a generation must share.
    #[serde(default = "default_vector_dimension")]
    pub vector_dimension: usize,
    /// BM25 term-frequency saturation.
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f32,
    /// BM25 length normalization.
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f32,
    /// Result count used when a request asks for zero hits.
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,
    /// Each retrieval path fetches `top_k * candidate_multiplier` candidates...
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// ...capped at this many.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Deadline for embedding a query before degrading to lexical-only.
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,
}

fn default_rrf_constant() -> f32 {
    60.0
}
fn default_diversify_cap() -> usize {
    3
}
fn default_true() -> bool {
    true
}
fn default_vector_dimension() -> usize {
    384
}
fn default_bm25_k1() -> f32 {
    1.2
}
fn default_bm25_b() -> f32 {
    0.75
}
fn default_top_k() -> usize {
    20
}
fn default_candidate_multiplier() -> usize {
    5
}
fn default_max_candidates() -> usize {
    200
}
fn default_embed_timeout_ms() -> u64 {
    2_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_constant: default_rrf_constant(),
            diversify_cap: default_diversify_cap(),
            diversify_enabled: true,
            expansion_table_path: None,
            expansion_bidirectional: false,
            query_expansion_enabled: true,
            extract_query_filters: true,
            vector_dimension: default_vector_dimension(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            top_k_default: default_top_k(),
            candidate_multiplier: default_candidate_multiplier(),
            max_candidates: default_max_candidates(),
            embed_timeout_ms: default_embed_timeout_ms(),
        }
    }
}

impl SearchConfig {
    /// Rejects values that would make the pipeline misbehave.
    pub fn validate(&self) -> VerdantResult<()> {
        if !(self.rrf_constant.is_finite() && self.rrf_constant > 0.0) {
            return Err(VerdantError::Config(format!(
                "rrf_constant must be positive, got {}",
                self.rrf_constant
            )));
        }
        if self.diversify_cap == 0 {
            return Err(VerdantError::Config(
                "diversify_cap must be at least 1".to_string(),
            ));
        }
        if self.vector_dimension == 0 {
            return Err(VerdantError::Config(
                "vector_dimension must be at least 1".to_string(),
            ));
        }
        if !(self.bm25_k1.is_finite() && self.bm25_k1 >= 0.0) {
            return Err(VerdantError::Config(format!(
                "bm25_k1 must be non-negative, got {}",
                self.bm25_k1
            )));
        }
        if !(0.0..=1.0).contains(&self.bm25_b) {
            return Err(VerdantError::Config(format!(
                "bm25_b must be within [0, 1], got {}",
                self.bm25_b
            )));
        }
        if self.top_k_default == 0 {
            return Err(VerdantError::Config(
                "top_k_default must be at least 1".to_string(),
            ));
        }
        if self.candidate_multiplier == 0 || self.max_candidates == 0 {
            return Err(VerdantError::Config(
                "candidate_multiplier and max_candidates must be at least 1".to_string(),
            ));
        }
        if self.embed_timeout_ms == 0 {
            return Err(VerdantError::Config(
                "embed_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of candidates each retrieval path should return for a request
    /// of `top_k` results. Never less than `top_k`.
    pub fn candidate_pool(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.candidate_multiplier)
            .min(self.max_candidates)
            .max(top_k)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SearchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rrf_constant, 60.0);
        assert_eq!(config.diversify_cap, 3);
        assert!(config.diversify_enabled);
        assert_eq!(config.top_k_default, 20);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: SearchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SearchConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_b() {
        let config = SearchConfig {
            bm25_b: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VerdantError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let config = SearchConfig {
            diversify_cap: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_candidate_pool() {
        let config = SearchConfig::default();
        assert_eq!(config.candidate_pool(10), 50);
        assert_eq!(config.candidate_pool(100), 200);
        assert_eq!(config.candidate_pool(300), 300);
    }
}
