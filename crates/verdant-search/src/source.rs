use async_trait::async_trait;
use std::path::PathBuf;
use verdant_core::{Category, Record, VerdantError, VerdantResult};

/// Where index builds read the catalog from.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Read a consistent snapshot of every record.
    async fn snapshot(&self) -> VerdantResult<Vec<Record>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// A JSON Lines catalog: one record object per line.
///
/// Blank lines are skipped; a malformed line fails the whole snapshot. In
/// strict mode a category outside the twelve verticals is
/// [`VerdantError::UnknownCategory`]; otherwise such records are kept under
/// [`Category::Unrecognized`].
#[derive(Debug, Clone)]
pub struct JsonlRecordSource {
    path: PathBuf,
    strict: bool,
}

impl JsonlRecordSource {
    /// Lenient source over `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strict: false,
        }
    }

    /// Toggle strict category checking. Chainable builder method.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn parse_line(&self, line_no: usize, line: &str) -> VerdantResult<Record> {
        let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
            VerdantError::Store(format!("{}:{line_no}: {e}", self.path.display()))
        })?;

        if self.strict {
            let label = value
                .get("category")
                .or_else(|| value.get("primary_vertical"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Category::parse_strict(label)?;
        }

        serde_json::from_value(value).map_err(|e| {
            VerdantError::Store(format!("{}:{line_no}: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl RecordSource for JsonlRecordSource {
    async fn snapshot(&self) -> VerdantResult<Vec<Record>> {
        let data = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            VerdantError::Store(format!(
                "Failed to read catalog '{}': {e}",
                self.path.display()
            ))
        })?;

        let mut records = Vec::new();
        for (i, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            records.push(self.parse_line(i + 1, line)?);
        }

        let unrecognized = records
            .iter()
            .filter(|r| !r.category.is_recognized())
            .count();
        if unrecognized > 0 {
            tracing::warn!(
                path = %self.path.display(),
                unrecognized,
                "Catalog contains records outside the known categories"
            );
        }
        tracing::info!(path = %self.path.display(), records = records.len(), "Read catalog snapshot");
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("jsonl:{}", self.path.display())
    }
}

/// A fixed, in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    records: Vec<Record>,
}

impl InMemoryRecordSource {
    /// Wrap `records`.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn snapshot(&self) -> VerdantResult<Vec<Record>> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("memory:{} records", self.records.len())
    }
}
