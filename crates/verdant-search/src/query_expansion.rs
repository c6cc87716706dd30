use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use verdant_core::{VerdantError, VerdantResult};

use crate::tokenizer::tokenize;

/// Synonyms shipped with the engine, used when no table path is configured.
const BUILTIN_SYNONYMS: &[(&str, &[&str])] = &[
    ("ev", &["electric vehicle", "e-mobility"]),
    ("solar", &["photovoltaic", "pv"]),
    ("dac", &["direct air capture", "carbon removal"]),
    ("carbon capture", &["ccus", "sequestration", "dac"]),
    ("battery", &["energy storage", "lithium-ion"]),
    ("hydrogen", &["electrolyzer", "fuel cell"]),
    ("wind", &["offshore wind", "turbine"]),
    ("agtech", &["precision agriculture", "vertical farming"]),
    ("protein", &["plant-based", "alternative protein"]),
    ("recycling", &["circular economy", "upcycling"]),
    ("esg", &["sustainable finance", "green bonds", "carbon credits"]),
    ("heat pump", &["hvac", "building electrification"]),
    ("vpp", &["virtual power plant", "demand response"]),
    ("desalination", &["water treatment"]),
    ("resilience", &["climate adaptation", "climate risk"]),
];

/// A query after expansion: the order-stable term bag and its text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedQuery {
    /// Terms in first-occurrence order, each at most once.
    pub terms: Vec<String>,
    /// `terms` joined by single spaces; fed to the embedder.
    pub text: String,
}

impl ExpandedQuery {
    /// Build from already-ordered terms, dropping repeats.
    pub fn from_terms<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let terms: Vec<String> = terms
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        let text = terms.join(" ");
        Self { terms, text }
    }
}

/// Read-only synonym rules, keyed by a normalized term or two-term phrase.
#[derive(Debug, Clone, Default)]
pub struct ExpansionTable {
    rules: HashMap<String, Vec<Vec<String>>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableFile {
    Wrapped {
        query_synonyms: HashMap<String, Vec<String>>,
    },
    Flat(HashMap<String, Vec<String>>),
}

impl ExpansionTable {
    /// Create an empty table; every term passes through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in climate-technology synonym table.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (term, synonyms) in BUILTIN_SYNONYMS {
            table.insert(term, synonyms.iter().copied());
        }
        table
    }

    /// Parse a JSON table: either `{"term": ["syn", ...]}` or the same map
    /// nested under `"query_synonyms"`.
    pub fn from_json(json: &str) -> VerdantResult<Self> {
        let map = match serde_json::from_str::<TableFile>(json)? {
            TableFile::Wrapped { query_synonyms } => query_synonyms,
            TableFile::Flat(map) => map,
        };
        // Sorted so that rule order does not depend on map iteration order.
        let mut entries: Vec<(String, Vec<String>)> = map.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut table = Self::new();
        for (term, synonyms) in entries {
            table.insert(&term, synonyms.iter().map(String::as_str));
        }
        Ok(table)
    }

    /// Load a JSON table from disk.
    pub async fn load(path: &Path) -> VerdantResult<Self> {
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            VerdantError::Config(format!(
                "Failed to read expansion table '{}': {e}",
                path.display()
            ))
        })?;
        let table = Self::from_json(&data)?;
        tracing::info!(path = %path.display(), rules = table.len(), "Loaded expansion table");
        Ok(table)
    }

    /// Register synonyms for `term`. Keys longer than two terms or made only
    /// of stopwords are ignored with a warning.
    pub fn insert<'a, I>(&mut self, term: &str, synonyms: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let key_terms = tokenize(term);
        if key_terms.is_empty() || key_terms.len() > 2 {
            tracing::warn!(term = %term, "Ignoring expansion rule with unusable key");
            return;
        }
        let key = key_terms.join(" ");
        let entry = self.rules.entry(key).or_default();
        for synonym in synonyms {
            let terms = tokenize(synonym);
            if !terms.is_empty() && !entry.contains(&terms) {
                entry.push(terms);
            }
        }
    }

    /// Add `synonym -> term` rules for every synonym of at most two terms.
    pub fn with_reverse_rules(mut self) -> Self {
        let mut keys: Vec<String> = self.rules.keys().cloned().collect();
        keys.sort();
        for key in keys {
            let synonyms = self.rules.get(&key).cloned().unwrap_or_default();
            for synonym in synonyms.iter().filter(|s| s.len() <= 2) {
                self.insert(&synonym.join(" "), std::iter::once(key.as_str()));
            }
        }
        self
    }

    /// Synonym phrases (as term lists) registered for `key`.
    pub fn lookup(&self, key: &str) -> Option<&[Vec<String>]> {
        self.rules.get(key).map(Vec::as_slice)
    }

    /// Number of rule keys.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Trait for rewriting a raw query into the term bag both retrieval paths
/// search with.
pub trait QueryExpander: Send + Sync {
    /// Expand `query`. Blank queries (after normalization) are
    /// [`VerdantError::EmptyQuery`].
    fn expand(&self, query: &str) -> VerdantResult<ExpandedQuery>;
}

/// Expander that only tokenizes; used when expansion is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExpander;

impl QueryExpander for PassthroughExpander {
    fn expand(&self, query: &str) -> VerdantResult<ExpandedQuery> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Err(VerdantError::EmptyQuery);
        }
        Ok(ExpandedQuery::from_terms(tokens))
    }
}

/// Table-driven expander.
///
/// Each query token is kept in place and followed by the terms of its
/// synonyms; a rule keyed by a two-term phrase fires after the phrase's
/// second term. Terms already emitted are skipped.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedExpander {
    table: ExpansionTable,
}

impl RuleBasedExpander {
    /// Create an expander over the built-in climate table.
    pub fn new() -> Self {
        Self::with_table(ExpansionTable::builtin())
    }

    /// Create an expander over a custom table.
    pub fn with_table(table: ExpansionTable) -> Self {
        Self { table }
    }

    /// The rules in use.
    pub fn table(&self) -> &ExpansionTable {
        &self.table
    }
}

impl QueryExpander for RuleBasedExpander {
    fn expand(&self, query: &str) -> VerdantResult<ExpandedQuery> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Err(VerdantError::EmptyQuery);
        }

        let mut out: Vec<String> = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            out.push(token.clone());

            let mut keys = vec![token.clone()];
            if i > 0 {
                keys.push(format!("{} {token}", tokens[i - 1]));
            }
            for key in &keys {
                if let Some(synonyms) = self.table.lookup(key) {
                    out.extend(synonyms.iter().flatten().cloned());
                }
            }
        }

        Ok(ExpandedQuery::from_terms(out))
    }
}
