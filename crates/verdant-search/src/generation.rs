use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use verdant_core::{Category, Record, RecordId, SearchConfig, VerdantError, VerdantResult};

use crate::bm25::LexicalIndex;
use crate::embedding::{embed_with_timeout, Embedder};
use crate::vector::{VectorEntry, VectorIndex};

/// Records embedded per `embed_batch` call during a build.
const EMBED_BATCH_SIZE: usize = 32;

/// One immutable, self-consistent snapshot of the catalog and both indexes
/// built over it.
///
/// Readers hold an `Arc<Generation>` for the duration of a query; a newer
/// generation being installed meanwhile does not affect them.
#[derive(Debug, Clone)]
pub struct Generation {
    id: Uuid,
    built_at: DateTime<Utc>,
    records: BTreeMap<RecordId, Record>,
    vectors: VectorIndex,
    lexical: LexicalIndex,
}

/// Summary counters of a [`Generation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Generation id.
    pub id: Uuid,
    /// When the generation was built.
    pub built_at: DateTime<Utc>,
    /// Records in the snapshot.
    pub record_count: usize,
    /// Records that also have a vector.
    pub vector_count: usize,
    /// Vector dimension.
    pub dimension: usize,
    /// Distinct lexical terms.
    pub vocabulary_size: usize,
    /// Mean lexical document length.
    pub avg_doc_length: f32,
    /// Records per category.
    pub categories: BTreeMap<Category, usize>,
}

impl Generation {
    /// Assemble a generation from already-built parts.
    pub fn from_parts(
        id: Uuid,
        built_at: DateTime<Utc>,
        records: BTreeMap<RecordId, Record>,
        vectors: VectorIndex,
        lexical: LexicalIndex,
    ) -> Self {
        Self {
            id,
            built_at,
            records,
            vectors,
            lexical,
        }
    }

    /// Unique id of this generation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Build timestamp.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Look up a record of the snapshot.
    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id)
    }

    /// Category of a record of the snapshot.
    pub fn category_of(&self, id: RecordId) -> Option<Category> {
        self.records.get(&id).map(|r| r.category)
    }

    /// All records, by ascending id.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// The dense index.
    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// The BM25 index.
    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Summary counters.
    pub fn stats(&self) -> GenerationStats {
        let mut categories = BTreeMap::new();
        for record in self.records.values() {
            *categories.entry(record.category).or_insert(0) += 1;
        }
        GenerationStats {
            id: self.id,
            built_at: self.built_at,
            record_count: self.records.len(),
            vector_count: self.vectors.len(),
            dimension: self.vectors.dimension(),
            vocabulary_size: self.lexical.vocabulary_size(),
            avg_doc_length: self.lexical.average_doc_length(),
            categories,
        }
    }
}

/// Builds generations: embeds records and fills both indexes from the same
/// snapshot.
pub struct GenerationBuilder<'a> {
    embedder: &'a dyn Embedder,
    dimension: usize,
    k1: f32,
    b: f32,
    embed_timeout: Duration,
}

impl<'a> GenerationBuilder<'a> {
    /// Create a builder using the dimension, BM25 parameters and embedding
    /// deadline of `config`. A batch gets `embed_timeout_ms` per text.
    pub fn new(embedder: &'a dyn Embedder, config: &SearchConfig) -> Self {
        Self {
            embedder,
            dimension: config.vector_dimension,
            k1: config.bm25_k1,
            b: config.bm25_b,
            embed_timeout: Duration::from_millis(config.embed_timeout_ms),
        }
    }

    /// Build a fresh generation from `records`. A later record with an id
    /// already seen replaces the earlier one.
    pub async fn build(&self, records: Vec<Record>) -> VerdantResult<Generation> {
        let empty = Generation::from_parts(
            Uuid::nil(),
            Utc::now(),
            BTreeMap::new(),
            VectorIndex::new(self.dimension),
            LexicalIndex::with_params(self.k1, self.b),
        );
        self.extend(&empty, records).await
    }

    /// Build a new generation holding everything in `base` plus `records`.
    /// `base` itself is left untouched.
    pub async fn extend(&self, base: &Generation, records: Vec<Record>) -> VerdantResult<Generation> {
        if self.embedder.dimension() != self.dimension {
            return Err(VerdantError::Config(format!(
                "embedder produces {}-dimensional vectors but vector_dimension is {}",
                self.embedder.dimension(),
                self.dimension
            )));
        }
        if base.vectors.dimension() != self.dimension {
            return Err(VerdantError::Config(format!(
                "generation {} uses dimension {}, configured dimension is {}",
                base.id,
                base.vectors.dimension(),
                self.dimension
            )));
        }

        let mut incoming: HashMap<RecordId, usize> = HashMap::new();
        let mut deduped: Vec<Record> = Vec::with_capacity(records.len());
        for record in records {
            match incoming.get(&record.id) {
                Some(&slot) => deduped[slot] = record,
                None => {
                    incoming.insert(record.id, deduped.len());
                    deduped.push(record);
                }
            }
        }

        let embeddings = self.embed_records(&deduped).await;

        let mut all_records = base.records.clone();
        let mut vectors = base.vectors.clone();
        let mut lexical = base.lexical.clone();
        let mut rejected = 0usize;

        for (record, embedding) in deduped.into_iter().zip(embeddings) {
            let entry = match embedding {
                Some(vector) if vector.len() != self.dimension => {
                    let e = VerdantError::InconsistentVectorDimension {
                        record: format!("record {}", record.id),
                        expected: self.dimension,
                        actual: vector.len(),
                    };
                    tracing::warn!(record = %record.id, error = %e, "Rejected record from index build");
                    rejected += 1;
                    continue;
                }
                Some(vector) => Some(VectorEntry {
                    id: record.id,
                    vector,
                }),
                None => None,
            };

            vectors.remove(record.id);
            if let Some(entry) = entry {
                if let Err(e) = vectors.insert(entry) {
                    tracing::warn!(record = %record.id, error = %e, "Rejected record from index build");
                    rejected += 1;
                    lexical.remove_document(record.id);
                    all_records.remove(&record.id);
                    continue;
                }
            }
            lexical.add_document(record.id, &record.lexical_text());
            all_records.insert(record.id, record);
        }

        let generation = Generation::from_parts(
            Uuid::new_v4(),
            Utc::now(),
            all_records,
            vectors,
            lexical,
        );
        tracing::info!(
            generation = %generation.id,
            records = generation.len(),
            vectors = generation.vectors.len(),
            rejected,
            "Built index generation"
        );
        Ok(generation)
    }

    /// One entry per record; `None` where the embedder failed or missed its
    /// deadline.
    async fn embed_records(&self, records: &[Record]) -> Vec<Option<Vec<f32>>> {
        let mut out = Vec::with_capacity(records.len());
        for chunk in records.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(Record::embedding_text).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

            let deadline = self.embed_timeout.saturating_mul(chunk.len() as u32);
            match tokio::time::timeout(deadline, self.embedder.embed_batch(&refs)).await {
                Ok(Ok(vectors)) if vectors.len() == chunk.len() => {
                    out.extend(vectors.into_iter().map(Some));
                }
                outcome => {
                    if outcome.is_err() {
                        tracing::warn!(
                            records = chunk.len(),
                            timeout_ms = deadline.as_millis() as u64,
                            "Embedding batch timed out"
                        );
                    }
                    // Retry one by one so a single bad record does not cost
                    // the whole batch its vectors.
                    for (record, text) in chunk.iter().zip(&refs) {
                        match embed_with_timeout(self.embedder, text, self.embed_timeout).await {
                            Ok(vector) => out.push(Some(vector)),
                            Err(e) => {
                                tracing::warn!(
                                    record = %record.id,
                                    error = %e,
                                    "Record indexed without a vector"
                                );
                                out.push(None);
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

/// The engine's pointer to its current generation.
///
/// Swapping is a single pointer store under a write lock; readers take the
/// read lock only long enough to clone the `Arc`.
#[derive(Debug, Default)]
pub struct GenerationHandle {
    current: RwLock<Option<Arc<Generation>>>,
}

impl GenerationHandle {
    /// Create a handle with no generation installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current generation.
    pub fn current(&self) -> VerdantResult<Arc<Generation>> {
        self.current.read().clone().ok_or(VerdantError::IndexNotBuilt)
    }

    /// Make `generation` current. Returns the generation it replaced.
    pub fn install(&self, generation: Arc<Generation>) -> Option<Arc<Generation>> {
        let previous = self.current.write().replace(generation.clone());
        tracing::info!(
            generation = %generation.id(),
            previous = ?previous.as_ref().map(|g| g.id()),
            records = generation.len(),
            "Installed index generation"
        );
        previous
    }

    /// Whether a generation has been installed.
    pub fn is_built(&self) -> bool {
        self.current.read().is_some()
    }
}
