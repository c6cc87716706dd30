use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use verdant_core::{Record, VerdantError, VerdantResult};

use crate::bm25::{LexicalIndex, LexicalSnapshot};
use crate::generation::Generation;
use crate::vector::{VectorEntry, VectorIndex};

const FORMAT_VERSION: u32 = 1;
const CURRENT_FILE: &str = "CURRENT";
const GENERATIONS_DIR: &str = "generations";
const MANIFEST_FILE: &str = "manifest.json";
const RECORDS_FILE: &str = "records.jsonl";
const VECTORS_FILE: &str = "vectors.jsonl";
const LEXICAL_FILE: &str = "lexical.json";

/// Metadata written next to a persisted generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationManifest {
    /// On-disk layout version.
    pub format_version: u32,
    /// Generation id, also the directory name.
    pub id: Uuid,
    /// Build timestamp.
    pub built_at: DateTime<Utc>,
    /// Number of lines in `records.jsonl`.
    pub record_count: usize,
    /// Number of lines in `vectors.jsonl`.
    pub vector_count: usize,
    /// Vector dimension.
    pub dimension: usize,
}

/// Directory-backed store of index generations.
///
/// ```text
/// <root>/
///   CURRENT                      id of the generation to load on start
///   generations/<uuid>/
///     manifest.json
///     records.jsonl
///     vectors.jsonl
///     lexical.json
/// ```
///
/// A generation directory is complete once its manifest exists; `CURRENT`
/// is replaced through a temporary file and a rename, so a crash mid-save
/// leaves the previous generation current.
#[derive(Debug, Clone)]
pub struct GenerationStore {
    root: PathBuf,
}

impl GenerationStore {
    /// Open (without touching the filesystem) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(GENERATIONS_DIR).join(id.to_string())
    }

    /// Persist `generation` and point `CURRENT` at it.
    pub async fn save(&self, generation: &Generation) -> VerdantResult<PathBuf> {
        let dir = self.generation_dir(generation.id());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_error("create generation directory", &dir, e))?;

        let mut records = String::new();
        for record in generation.records() {
            records.push_str(&serde_json::to_string(record)?);
            records.push('\n');
        }
        write_file(&dir.join(RECORDS_FILE), records.as_bytes()).await?;

        let mut vectors = String::new();
        for entry in generation.vectors().entries() {
            vectors.push_str(&serde_json::to_string(&entry)?);
            vectors.push('\n');
        }
        write_file(&dir.join(VECTORS_FILE), vectors.as_bytes()).await?;

        let lexical = serde_json::to_vec(&generation.lexical().snapshot())?;
        write_file(&dir.join(LEXICAL_FILE), &lexical).await?;

        let manifest = GenerationManifest {
            format_version: FORMAT_VERSION,
            id: generation.id(),
            built_at: generation.built_at(),
            record_count: generation.len(),
            vector_count: generation.vectors().len(),
            dimension: generation.vectors().dimension(),
        };
        write_file(
            &dir.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;

        self.set_current(generation.id()).await?;
        tracing::info!(
            generation = %generation.id(),
            path = %dir.display(),
            records = manifest.record_count,
            "Saved index generation"
        );
        Ok(dir)
    }

    /// Atomically point `CURRENT` at `id`.
    pub async fn set_current(&self, id: Uuid) -> VerdantResult<()> {
        let target = self.root.join(CURRENT_FILE);
        let tmp = self.root.join(format!("{CURRENT_FILE}.{}.tmp", Uuid::new_v4()));
        write_file(&tmp, id.to_string().as_bytes()).await?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| store_error("replace", &target, e))
    }

    /// Id recorded in `CURRENT`, if any.
    pub async fn current_id(&self) -> VerdantResult<Option<Uuid>> {
        let path = self.root.join(CURRENT_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Uuid::parse_str(data.trim()).map(Some).map_err(|e| {
                VerdantError::Store(format!("Invalid id in '{}': {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_error("read", &path, e)),
        }
    }

    /// Load the generation `CURRENT` points to; `None` for a fresh store.
    pub async fn load_current(&self) -> VerdantResult<Option<Generation>> {
        match self.current_id().await? {
            Some(id) => self.load(id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Load a persisted generation by id.
    pub async fn load(&self, id: Uuid) -> VerdantResult<Generation> {
        let dir = self.generation_dir(id);

        let manifest: GenerationManifest =
            serde_json::from_str(&read_file(&dir.join(MANIFEST_FILE)).await?)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(VerdantError::Store(format!(
                "Generation {id} has format version {}, expected {FORMAT_VERSION}",
                manifest.format_version
            )));
        }

        let mut records = BTreeMap::new();
        for (n, line) in read_file(&dir.join(RECORDS_FILE)).await?.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(line).map_err(|e| {
                VerdantError::Store(format!("{RECORDS_FILE}:{}: {e}", n + 1))
            })?;
            records.insert(record.id, record);
        }

        let mut entries = Vec::with_capacity(manifest.vector_count);
        for (n, line) in read_file(&dir.join(VECTORS_FILE)).await?.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: VectorEntry = serde_json::from_str(line).map_err(|e| {
                VerdantError::Store(format!("{VECTORS_FILE}:{}: {e}", n + 1))
            })?;
            entries.push(entry);
        }
        let (vectors, rejected) = VectorIndex::build(manifest.dimension, entries);
        if let Some(first) = rejected.into_iter().next() {
            return Err(VerdantError::Store(format!(
                "Generation {id} holds inconsistent vectors: {first}"
            )));
        }

        let snapshot: LexicalSnapshot =
            serde_json::from_str(&read_file(&dir.join(LEXICAL_FILE)).await?)?;
        let lexical = LexicalIndex::from_snapshot(snapshot);

        if records.len() != manifest.record_count || vectors.len() != manifest.vector_count {
            return Err(VerdantError::Store(format!(
                "Generation {id} is incomplete: manifest lists {} records and {} vectors, found {} and {}",
                manifest.record_count,
                manifest.vector_count,
                records.len(),
                vectors.len()
            )));
        }

        tracing::info!(generation = %id, records = records.len(), "Loaded index generation");
        Ok(Generation::from_parts(
            manifest.id,
            manifest.built_at,
            records,
            vectors,
            lexical,
        ))
    }

    /// Manifests of every complete generation on disk, oldest first.
    pub async fn list(&self) -> VerdantResult<Vec<GenerationManifest>> {
        let dir = self.root.join(GENERATIONS_DIR);
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_error("list", &dir, e)),
        };

        let mut manifests = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| store_error("list", &dir, e))?
        {
            let path = entry.path().join(MANIFEST_FILE);
            match tokio::fs::read_to_string(&path).await {
                Ok(data) => match serde_json::from_str::<GenerationManifest>(&data) {
                    Ok(manifest) => manifests.push(manifest),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable manifest");
                    }
                },
                // No manifest: an interrupted save.
                Err(_) => continue,
            }
        }
        manifests.sort_by(|a, b| a.built_at.cmp(&b.built_at).then(a.id.cmp(&b.id)));
        Ok(manifests)
    }
}

fn store_error(action: &str, path: &Path, e: std::io::Error) -> VerdantError {
    VerdantError::Store(format!("Failed to {action} '{}': {e}", path.display()))
}

async fn write_file(path: &Path, data: &[u8]) -> VerdantResult<()> {
    tokio::fs::write(path, data)
        .await
        .map_err(|e| store_error("write", path, e))
}

async fn read_file(path: &Path) -> VerdantResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| store_error("read", path, e))
}
