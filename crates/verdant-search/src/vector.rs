use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use verdant_core::{sort_scored, RecordId, VerdantError, VerdantResult};

/// A record's embedding as handed to [`VectorIndex::build`] and persisted in
/// `vectors.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// The record this vector belongs to.
    pub id: RecordId,
    /// The raw (not necessarily normalized) embedding.
    pub vector: Vec<f32>,
}

/// Exact inner-product index over L2-normalized vectors.
///
/// Vectors are normalized at build time, so the inner product equals cosine
/// similarity. Storage is one contiguous row-major matrix; search is a
/// brute-force scan, which is adequate for catalogs in the tens of
/// thousands.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    ids: Vec<RecordId>,
    rows: HashMap<RecordId, usize>,
    /// `ids.len() * dimension` floats, row `i` belongs to `ids[i]`.
    matrix: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` floats.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            rows: HashMap::new(),
            matrix: Vec::new(),
        }
    }

    /// Build an index from `entries`.
    ///
    /// Entries whose length differs from `dimension` are rejected with
    /// [`VerdantError::InconsistentVectorDimension`] and logged; the build
    /// continues with the rest. A later entry with an id already present
    /// replaces the earlier one.
    pub fn build<I>(dimension: usize, entries: I) -> (Self, Vec<VerdantError>)
    where
        I: IntoIterator<Item = VectorEntry>,
    {
        let mut index = Self::new(dimension);
        let mut rejected = Vec::new();
        for entry in entries {
            if let Err(e) = index.insert(entry) {
                tracing::warn!(error = %e, "Rejected vector from index build");
                rejected.push(e);
            }
        }
        (index, rejected)
    }

    /// Add (or replace) a single vector.
    pub fn insert(&mut self, entry: VectorEntry) -> VerdantResult<()> {
        if entry.vector.len() != self.dimension {
            return Err(VerdantError::InconsistentVectorDimension {
                record: format!("record {}", entry.id),
                expected: self.dimension,
                actual: entry.vector.len(),
            });
        }

        let normalized = normalize(entry.vector);
        match self.rows.get(&entry.id) {
            Some(&row) => {
                let start = row * self.dimension;
                self.matrix[start..start + self.dimension].copy_from_slice(&normalized);
            }
            None => {
                self.rows.insert(entry.id, self.ids.len());
                self.ids.push(entry.id);
                self.matrix.extend_from_slice(&normalized);
            }
        }
        Ok(())
    }

    /// Remove the vector of `id`. Returns whether it was present.
    pub fn remove(&mut self, id: RecordId) -> bool {
        let Some(row) = self.rows.remove(&id) else {
            return false;
        };
        self.ids.remove(row);
        let start = row * self.dimension;
        self.matrix.drain(start..start + self.dimension);
        for shifted in &self.ids[row..] {
            if let Some(r) = self.rows.get_mut(shifted) {
                *r -= 1;
            }
        }
        true
    }

    /// Top-`k` records by cosine similarity to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> VerdantResult<Vec<(RecordId, f32)>> {
        self.search_filtered(query, k, |_| true)
    }

    /// Top-`k` records by cosine similarity to `query` among those accepted
    /// by `allow`.
    ///
    /// Results are strictly descending by score, ties broken by ascending id.
    /// An empty index yields an empty list; a query of the wrong dimension is
    /// [`VerdantError::InconsistentVectorDimension`].
    pub fn search_filtered<F>(
        &self,
        query: &[f32],
        k: usize,
        allow: F,
    ) -> VerdantResult<Vec<(RecordId, f32)>>
    where
        F: Fn(RecordId) -> bool,
    {
        if self.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(VerdantError::InconsistentVectorDimension {
                record: "query".to_string(),
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query = normalize(query.to_vec());
        let mut scored: Vec<(RecordId, f32)> = self
            .ids
            .iter()
            .zip(self.matrix.chunks_exact(self.dimension))
            .filter(|(id, _)| allow(**id))
            .map(|(id, row)| (*id, dot(&query, row)))
            .collect();

        sort_scored(&mut scored);
        scored.truncate(k);
        Ok(scored)
    }

    /// Stored (normalized) vector of `id`.
    pub fn vector(&self, id: RecordId) -> Option<&[f32]> {
        let row = *self.rows.get(&id)?;
        let start = row * self.dimension;
        Some(&self.matrix[start..start + self.dimension])
    }

    /// Iterate over all stored vectors in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = VectorEntry> + '_ {
        self.ids
            .iter()
            .zip(self.matrix.chunks_exact(self.dimension.max(1)))
            .map(|(id, row)| VectorEntry {
                id: *id,
                vector: row.to_vec(),
            })
    }

    /// Dimension shared by every vector of this index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize; the zero vector stays zero.
fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn entry(id: u64, vector: Vec<f32>) -> VectorEntry {
        VectorEntry {
            id: RecordId(id),
            vector,
        }
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let (index, rejected) = VectorIndex::build(
            3,
            vec![
                entry(1, vec![1.0, 0.0, 0.0]),
                entry(2, vec![0.9, 0.1, 0.0]),
                entry(3, vec![0.0, 1.0, 0.0]),
            ],
        );
        assert!(rejected.is_empty());

        let results = index.search(&[1.0, 0.0, 0.0], 10).unwrap();
        let ids: Vec<u64> = results.iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert!(results[0].1 > results[1].1 && results[1].1 > results[2].1);
    }

    #[test]
    fn test_search_truncates_to_k() {
        let (index, _) = VectorIndex::build(
            2,
            (1..=10).map(|i| entry(i, vec![1.0, i as f32])),
        );
        assert_eq!(index.search(&[1.0, 1.0], 4).unwrap().len(), 4);
        assert!(index.search(&[1.0, 1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_broken_by_id() {
        let (index, _) = VectorIndex::build(
            2,
            vec![
                entry(9, vec![2.0, 0.0]),
                entry(4, vec![1.0, 0.0]),
                entry(6, vec![3.0, 0.0]),
            ],
        );
        let results = index.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<u64> = results.iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, vec![4, 6, 9]);
    }

    #[test]
    fn test_build_rejects_wrong_dimension() {
        let (index, rejected) = VectorIndex::build(
            3,
            vec![entry(1, vec![1.0, 0.0, 0.0]), entry(2, vec![1.0, 0.0])],
        );
        assert_eq!(index.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert!(matches!(
            &rejected[0],
            VerdantError::InconsistentVectorDimension { expected: 3, actual: 2, .. }
        ));
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let index = VectorIndex::new(4);
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
        // Dimension is not checked against an empty index.
        assert!(index.search(&[1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let (index, _) = VectorIndex::build(2, vec![entry(1, vec![1.0, 0.0])]);
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 5),
            Err(VerdantError::InconsistentVectorDimension { .. })
        ));
    }

    #[test]
    fn test_filtered_search_skips_disallowed() {
        let (index, _) = VectorIndex::build(
            2,
            vec![entry(1, vec![1.0, 0.0]), entry(2, vec![0.8, 0.2])],
        );
        let results = index
            .search_filtered(&[1.0, 0.0], 5, |id| id != RecordId(1))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, RecordId(2));
    }

    #[test]
    fn test_insert_replaces_and_remove() {
        let mut index = VectorIndex::new(2);
        index.insert(entry(1, vec![1.0, 0.0])).unwrap();
        index.insert(entry(1, vec![0.0, 2.0])).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.vector(RecordId(1)).unwrap(), &[0.0, 1.0]);

        assert!(index.remove(RecordId(1)));
        assert!(!index.remove(RecordId(1)));
        assert!(index.is_empty());
    }
}
