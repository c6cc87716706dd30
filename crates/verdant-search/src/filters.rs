use regex::Regex;
use std::sync::LazyLock;
use verdant_core::{Category, SearchFilters};

use crate::tokenizer::normalize;

#[allow(clippy::expect_used)]
static YEAR_MIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:founded|started|since|after)\s+(?:in\s+)?((?:19|20)\d{2})\b")
        .expect("Invalid founded-year pattern")
});

#[allow(clippy::expect_used)]
static YEAR_MAX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:before|until)\s+((?:19|20)\d{2})\b").expect("Invalid founded-year pattern")
});

#[allow(clippy::expect_used)]
static FUNDING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:raised|funding|over)\s+(?:of\s+)?\$?\s*(\d+(?:\.\d+)?)\s*(million|billion|m|b)?\b",
    )
    .expect("Invalid funding pattern")
});

/// Pull structured restrictions out of free query text.
///
/// Recognized phrasings (case-insensitive):
///
/// - `founded in 2015`, `started 2018`, `since 2010`, `after 2020` set the
///   minimum founded year
/// - `before 2015`, `until 2019` set the maximum founded year
/// - `raised $50M`, `funding over $1.5 billion`, `over $200m` set the
///   minimum funding
/// - a category name such as `clean energy` or `water & ocean` sets the
///   category; the first one found in canonical order wins
///
/// Anything else yields an empty [`SearchFilters`]. The query text itself is
/// left untouched; extracted phrases still take part in retrieval.
pub fn extract_filters(query: &str) -> SearchFilters {
    let lowered = query.to_lowercase();
    let mut filters = SearchFilters::default();

    if let Some(year) = YEAR_MIN_RE
        .captures(&lowered)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
    {
        filters.founded_year_min = Some(year);
    }

    if let Some(year) = YEAR_MAX_RE
        .captures(&lowered)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
    {
        filters.founded_year_max = Some(year);
    }

    if let Some(caps) = FUNDING_RE.captures(&lowered) {
        let amount: Option<f64> = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let multiplier = match caps.get(2).map(|m| m.as_str()) {
            Some("m") | Some("million") => 1_000_000.0,
            Some("b") | Some("billion") => 1_000_000_000.0,
            _ => 1.0,
        };
        if let Some(amount) = amount {
            filters.min_funding_usd = Some(amount * multiplier);
        }
    }

    let normalized = format!(" {} ", normalize(query));
    filters.category = Category::ALL.iter().copied().find(|category| {
        let name = normalize(category.display_name());
        normalized.contains(&format!(" {name} "))
    });

    if !filters.is_empty() {
        tracing::debug!(?filters, "Extracted filters from query");
    }
    filters
}
