use std::collections::{BTreeMap, HashMap};
use verdant_core::{Category, RankedHit, RecordId};

/// Per-category cap over a ranked list.
///
/// Walks the input once, admitting a hit while its category has fewer than
/// `cap` admitted hits, and stops after `k` admissions. Admitted hits keep
/// their relative order and scores; ranks are renumbered `1..=n`. Hits beyond
/// a full category are dropped, never re-inserted further down, so the
/// output may be shorter than `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diversifier {
    cap: usize,
    enabled: bool,
}

impl Diversifier {
    /// Create a diversifier allowing at most `cap` hits per category.
    pub fn new(cap: usize) -> Self {
        Self { cap, enabled: true }
    }

    /// A diversifier that only truncates.
    pub fn disabled() -> Self {
        Self {
            cap: usize::MAX,
            enabled: false,
        }
    }

    /// Switch the cap on or off. Chainable builder method.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Maximum hits per category.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Whether the cap is applied.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Select up to `k` hits from `hits`. `category_of` returns `None` for
    /// ids it does not know; those share the [`Category::Unrecognized`]
    /// bucket.
    pub fn apply<F>(&self, hits: Vec<RankedHit>, k: usize, category_of: F) -> Vec<RankedHit>
    where
        F: Fn(RecordId) -> Option<Category>,
    {
        let mut selected: Vec<RankedHit> = if self.enabled {
            let mut counts: HashMap<Category, usize> = HashMap::new();
            let mut out = Vec::with_capacity(k.min(hits.len()));
            for hit in hits {
                if out.len() >= k {
                    break;
                }
                let category = category_of(hit.record_id).unwrap_or(Category::Unrecognized);
                let count = counts.entry(category).or_insert(0);
                if *count < self.cap {
                    *count += 1;
                    out.push(hit);
                }
            }
            out
        } else {
            hits.into_iter().take(k).collect()
        };

        for (i, hit) in selected.iter_mut().enumerate() {
            hit.rank = i + 1;
        }
        selected
    }
}

/// Count hits per category, in canonical category order.
pub fn category_distribution<F>(hits: &[RankedHit], category_of: F) -> BTreeMap<Category, usize>
where
    F: Fn(RecordId) -> Option<Category>,
{
    let mut distribution = BTreeMap::new();
    for hit in hits {
        let category = category_of(hit.record_id).unwrap_or(Category::Unrecognized);
        *distribution.entry(category).or_insert(0) += 1;
    }
    distribution
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use verdant_core::HitSource;

    const A: Category = Category::CleanEnergy;
    const B: Category = Category::EnergyStorage;

    fn hits(ids: &[u64]) -> Vec<RankedHit> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                RankedHit::new(RecordId(*id), 1.0 / (i as f32 + 1.0), i + 1, HitSource::Fused)
            })
            .collect()
    }

    fn categories(map: &[(u64, Category)]) -> impl Fn(RecordId) -> Option<Category> + '_ {
        move |id| map.iter().find(|(i, _)| *i == id.0).map(|(_, c)| *c)
    }

    fn ids(hits: &[RankedHit]) -> Vec<u64> {
        hits.iter().map(|h| h.record_id.0).collect()
    }

    #[test]
    fn test_cap_one_skips_second_of_category() {
        // x, y in A; z in B
        let map = [(1, A), (2, A), (3, B)];
        let out = Diversifier::new(1).apply(hits(&[1, 2, 3]), 2, categories(&map));
        assert_eq!(ids(&out), vec![1, 3]);
        assert_eq!(out[1].rank, 2);
    }

    #[test]
    fn test_order_and_scores_preserved() {
        let map = [(1, A), (2, B), (3, A), (4, A), (5, B)];
        let input = hits(&[1, 2, 3, 4, 5]);
        let out = Diversifier::new(2).apply(input.clone(), 10, categories(&map));
        assert_eq!(ids(&out), vec![1, 2, 3, 5]);
        for hit in &out {
            let original = input.iter().find(|h| h.record_id == hit.record_id).unwrap();
            assert_eq!(hit.score, original.score);
        }
    }

    #[test]
    fn test_short_output_is_not_backfilled() {
        let map = [(1, A), (2, A), (3, A), (4, A)];
        let out = Diversifier::new(3).apply(hits(&[1, 2, 3, 4]), 4, categories(&map));
        assert_eq!(ids(&out), vec![1, 2, 3]);
    }

    #[test]
    fn test_disabled_only_truncates() {
        let map = [(1, A), (2, A), (3, A)];
        let out = Diversifier::new(1)
            .enabled(false)
            .apply(hits(&[1, 2, 3]), 2, categories(&map));
        assert_eq!(ids(&out), vec![1, 2]);
        assert_eq!(
            ids(&Diversifier::disabled().apply(hits(&[1, 2, 3]), 5, categories(&map))),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_unknown_ids_share_unrecognized_bucket() {
        let map = [(1, A)];
        let out = Diversifier::new(1).apply(hits(&[1, 8, 9]), 5, categories(&map));
        assert_eq!(ids(&out), vec![1, 8]);
    }

    #[test]
    fn test_zero_k_is_empty() {
        let map = [(1, A)];
        assert!(Diversifier::new(3).apply(hits(&[1]), 0, categories(&map)).is_empty());
    }

    #[test]
    fn test_category_distribution() {
        let map = [(1, A), (2, B), (3, A)];
        let dist = category_distribution(&hits(&[1, 2, 3, 4]), categories(&map));
        assert_eq!(dist[&A], 2);
        assert_eq!(dist[&B], 1);
        assert_eq!(dist[&Category::Unrecognized], 1);
    }
}
