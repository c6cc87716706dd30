use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use verdant_core::{Category, RecordId, VerdantError, VerdantResult};

/// One labeled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationQuery {
    /// Query text as a user would type it.
    pub query: String,
    /// Graded relevance per record id; unlisted records count as 0.
    #[serde(default)]
    pub relevance: BTreeMap<RecordId, u32>,
    /// Category the top hit is expected to belong to.
    #[serde(default, alias = "expected_vertical")]
    pub expected_category: Option<Category>,
}

impl EvaluationQuery {
    /// A query with no judgments.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            relevance: BTreeMap::new(),
            expected_category: None,
        }
    }

    /// Add a judgment. Chainable builder method.
    pub fn with_judgment(mut self, id: u64, grade: u32) -> Self {
        self.relevance.insert(RecordId(id), grade);
        self
    }

    /// Set the expected category. Chainable builder method.
    pub fn with_expected_category(mut self, category: Category) -> Self {
        self.expected_category = Some(category);
        self
    }

    /// Number of records judged relevant (grade > 0).
    pub fn relevant_count(&self) -> usize {
        self.relevance.values().filter(|&&g| g > 0).count()
    }
}

/// A labeled query set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySet {
    /// The queries, in evaluation order.
    pub queries: Vec<EvaluationQuery>,
}

impl QuerySet {
    /// Parse `{"queries": [...]}` (or `"test_queries"`) or a bare JSON
    /// array of queries.
    pub fn from_json(json: &str) -> VerdantResult<Self> {
        // Through `Value` rather than an untagged enum: buffered content
        // cannot turn the string keys of `relevance` back into ids.
        let list = match serde_json::from_str::<serde_json::Value>(json)? {
            list @ serde_json::Value::Array(_) => list,
            serde_json::Value::Object(mut map) => map
                .remove("queries")
                .or_else(|| map.remove("test_queries"))
                .ok_or_else(|| {
                    VerdantError::Evaluation("query set has no \"queries\" array".to_string())
                })?,
            _ => {
                return Err(VerdantError::Evaluation(
                    "query set must be an object or an array".to_string(),
                ))
            }
        };
        Ok(Self {
            queries: serde_json::from_value(list)?,
        })
    }

    /// Read a query set from disk.
    pub async fn load(path: &Path) -> VerdantResult<Self> {
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            VerdantError::Evaluation(format!(
                "Failed to read query set '{}': {e}",
                path.display()
            ))
        })?;
        let set = Self::from_json(&data)?;
        tracing::info!(path = %path.display(), queries = set.len(), "Loaded query set");
        Ok(set)
    }

    /// Number of queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
