use std::cmp::Ordering;
use std::collections::HashMap;
use verdant_core::{HitSource, RankedHit, RecordId};

/// Standard RRF smoothing constant.
pub const DEFAULT_RRF_CONSTANT: f32 = 60.0;

struct Fused {
    id: RecordId,
    /// Best rank in the semantic and lexical list respectively.
    ranks: [Option<usize>; 2],
}

impl Fused {
    fn lists(&self) -> usize {
        self.ranks.iter().flatten().count()
    }

    fn score(&self, c: f64) -> f64 {
        self.ranks
            .iter()
            .flatten()
            .map(|&rank| 1.0 / (c + rank as f64))
            .sum()
    }

    /// The score as `numerator / denominator`, for an integral `c`.
    fn exact_score(&self, c: u128) -> Option<(u128, u128)> {
        let mut num: u128 = 0;
        let mut den: u128 = 1;
        for &rank in self.ranks.iter().flatten() {
            let d = c.checked_add(rank as u128).filter(|&d| d > 0)?;
            num = num.checked_mul(d)?.checked_add(den)?;
            den = den.checked_mul(d)?;
        }
        Some((num, den))
    }
}

/// Compares fused scores without rounding error, so sums of different
/// reciprocals that are mathematically equal tie.
fn compare_scores(a: &Fused, b: &Fused, c: f32) -> Ordering {
    if c.is_finite() && c >= 0.0 && c.fract() == 0.0 {
        let c = c as u128;
        if let (Some((an, ad)), Some((bn, bd))) = (a.exact_score(c), b.exact_score(c)) {
            if let (Some(lhs), Some(rhs)) = (an.checked_mul(bd), bn.checked_mul(ad)) {
                return lhs.cmp(&rhs);
            }
        }
    }
    let (sa, sb) = (a.score(f64::from(c)), b.score(f64::from(c)));
    if (sa - sb).abs() <= 1e-12 * sa.abs().max(sb.abs()) {
        Ordering::Equal
    } else {
        sa.total_cmp(&sb)
    }
}

/// Merge two ranked lists with Reciprocal Rank Fusion.
///
/// ```text
/// score(d) = Σ over lists containing d: 1 / (c + rank(d))
/// ```
///
/// Only each hit's 1-based `rank` is used; source scores are ignored, since
/// cosine similarity and BM25 live on unrelated scales. Output is sorted by
/// descending fused score, then records present in both lists first, then
/// ascending id. Scores are compared exactly (as fractions when `c` is a
/// whole number). An id appearing twice in one list counts only at its best
/// rank. With one list empty the other list's order passes through.
pub fn reciprocal_rank_fusion(
    semantic: &[RankedHit],
    lexical: &[RankedHit],
    c: f32,
) -> Vec<RankedHit> {
    let mut fused: HashMap<RecordId, Fused> = HashMap::new();

    for (slot, list) in [semantic, lexical].into_iter().enumerate() {
        for hit in list {
            let entry = fused.entry(hit.record_id).or_insert(Fused {
                id: hit.record_id,
                ranks: [None, None],
            });
            let best = entry.ranks[slot].map_or(hit.rank, |rank| rank.min(hit.rank));
            entry.ranks[slot] = Some(best);
        }
    }

    let mut merged: Vec<Fused> = fused.into_values().collect();
    merged.sort_by(|a, b| {
        compare_scores(b, a, c)
            .then_with(|| b.lists().cmp(&a.lists()))
            .then_with(|| a.id.cmp(&b.id))
    });

    merged
        .into_iter()
        .enumerate()
        .map(|(i, f)| RankedHit::new(f.id, f.score(f64::from(c)) as f32, i + 1, HitSource::Fused))
        .collect()
}
