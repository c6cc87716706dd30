use crate::{VerdantError, VerdantResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, unique identifier of a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The climate vertical a record belongs to.
///
/// The set is closed. Labels outside it land in [`Category::Unrecognized`]
/// when parsed leniently, so downstream bucketing stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// Carbon capture, removal and utilization.
    CarbonManagement,
    /// Solar, wind and other renewable generation.
    CleanEnergy,
    /// Batteries and long-duration storage.
    EnergyStorage,
    /// Electric vehicles, charging and clean mobility.
    GreenTransportation,
    /// Agtech and alternative protein.
    SustainableAgriculture,
    /// Buildings, heat pumps and efficiency.
    BuiltEnvironment,
    /// Recycling and waste valorization.
    CircularEconomy,
    /// Climate finance, ESG and carbon markets.
    ClimateFintech,
    /// Water treatment and ocean solutions.
    WaterOcean,
    /// Green hydrogen and heavy-industry decarbonization.
    IndustrialDecarbonization,
    /// Resilience and climate-risk tooling.
    ClimateAdaptation,
    /// Smart grid, VPPs and demand response.
    GridEnergyManagement,
    /// Fallback bucket for labels outside the fixed verticals.
    Unrecognized,
}

impl Category {
    /// The twelve recognized verticals, in canonical order.
    pub const ALL: [Category; 12] = [
        Category::CarbonManagement,
        Category::CleanEnergy,
        Category::EnergyStorage,
        Category::GreenTransportation,
        Category::SustainableAgriculture,
        Category::BuiltEnvironment,
        Category::CircularEconomy,
        Category::ClimateFintech,
        Category::WaterOcean,
        Category::IndustrialDecarbonization,
        Category::ClimateAdaptation,
        Category::GridEnergyManagement,
    ];

    /// The snake_case identifier used in catalogs and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CarbonManagement => "carbon_management",
            Category::CleanEnergy => "clean_energy",
            Category::EnergyStorage => "energy_storage",
            Category::GreenTransportation => "green_transportation",
            Category::SustainableAgriculture => "sustainable_agriculture",
            Category::BuiltEnvironment => "built_environment",
            Category::CircularEconomy => "circular_economy",
            Category::ClimateFintech => "climate_fintech",
            Category::WaterOcean => "water_ocean",
            Category::IndustrialDecarbonization => "industrial_decarbonization",
            Category::ClimateAdaptation => "climate_adaptation",
            Category::GridEnergyManagement => "grid_energy_management",
            Category::Unrecognized => "unrecognized",
        }
    }

    /// Human-readable name, e.g. `"Clean Energy"`.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::CarbonManagement => "Carbon Management",
            Category::CleanEnergy => "Clean Energy",
            Category::EnergyStorage => "Energy Storage",
            Category::GreenTransportation => "Green Transportation",
            Category::SustainableAgriculture => "Sustainable Agriculture",
            Category::BuiltEnvironment => "Built Environment",
            Category::CircularEconomy => "Circular Economy",
            Category::ClimateFintech => "Climate Fintech",
            Category::WaterOcean => "Water & Ocean",
            Category::IndustrialDecarbonization => "Industrial Decarbonization",
            Category::ClimateAdaptation => "Climate Adaptation",
            Category::GridEnergyManagement => "Grid & Energy Management",
            Category::Unrecognized => "Unrecognized",
        }
    }

    /// Parses a label, rejecting anything outside the twelve verticals.
    ///
    /// Accepts `snake_case`, `kebab-case` and space-separated forms in any case.
    pub fn parse_strict(label: &str) -> VerdantResult<Self> {
        let canonical = canonical_label(label);
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == canonical)
            .ok_or_else(|| VerdantError::UnknownCategory(label.to_string()))
    }

    /// Parses a label, mapping unknown verticals to [`Category::Unrecognized`].
    pub fn parse(label: &str) -> Self {
        Self::parse_strict(label).unwrap_or(Category::Unrecognized)
    }

    /// Whether this is one of the twelve fixed verticals.
    pub fn is_recognized(&self) -> bool {
        *self != Category::Unrecognized
    }
}

fn canonical_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .replace(" & ", "_")
        .replace(['-', ' '], "_")
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(label: String) -> Self {
        Category::parse(&label)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

/// A catalog organization as seen by one index generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique, stable identifier.
    pub id: RecordId,
    /// Organization name.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub short_description: String,
    /// Longer free-text description, when available.
    #[serde(default)]
    pub long_description: Option<String>,
    /// Technologies the organization works with.
    #[serde(default)]
    pub technologies: Vec<String>,
    /// Free-form keywords attached at ingestion.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Headquarters location, e.g. `"Boston, USA"`.
    #[serde(default)]
    pub headquarters_location: Option<String>,
    /// The record's single primary vertical.
    #[serde(alias = "primary_vertical")]
    pub category: Category,
    /// Year the organization was founded.
    #[serde(default)]
    pub founded_year: Option<i32>,
    /// Total funding raised, in USD.
    #[serde(default)]
    pub total_funding_usd: Option<f64>,
}

impl Record {
    /// Creates a record with only the required fields set.
    pub fn new(id: u64, name: impl Into<String>, category: Category) -> Self {
        Self {
            id: RecordId(id),
            name: name.into(),
            short_description: String::new(),
            long_description: None,
            technologies: Vec::new(),
            keywords: Vec::new(),
            headquarters_location: None,
            category,
            founded_year: None,
            total_funding_usd: None,
        }
    }

    /// Sets the short description. Chainable builder method.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.short_description = description.into();
        self
    }

    /// Sets the founded year. Chainable builder method.
    pub fn with_founded_year(mut self, year: i32) -> Self {
        self.founded_year = Some(year);
        self
    }

    /// Sets the total funding. Chainable builder method.
    pub fn with_funding(mut self, usd: f64) -> Self {
        self.total_funding_usd = Some(usd);
        self
    }

    /// Sets the technologies list. Chainable builder method.
    pub fn with_technologies<I, S>(mut self, technologies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.technologies = technologies.into_iter().map(Into::into).collect();
        self
    }

    /// Text fed to the embedder: name, descriptions and technologies.
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<&str> = vec![self.name.as_str()];
        if !self.short_description.is_empty() {
            parts.push(&self.short_description);
        }
        if let Some(long) = &self.long_description {
            parts.push(long);
        }
        parts.extend(self.technologies.iter().map(String::as_str));
        parts.join(" ")
    }

    /// Text fed to the lexical index: everything in [`Record::embedding_text`]
    /// plus the category label, location and keywords.
    pub fn lexical_text(&self) -> String {
        let mut text = self.embedding_text();
        let category = self.category.as_str().replace('_', " ");
        for part in std::iter::once(category.as_str())
            .chain(self.headquarters_location.as_deref())
            .chain(self.keywords.iter().map(String::as_str))
        {
            text.push(' ');
            text.push_str(part);
        }
        text
    }
}

/// Restrictions on the candidate set, applied to both retrieval paths before
/// fusion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Only records in this vertical.
    #[serde(default)]
    pub category: Option<Category>,
    /// Only records founded in or after this year.
    #[serde(default)]
    pub founded_year_min: Option<i32>,
    /// Only records founded in or before this year.
    #[serde(default)]
    pub founded_year_max: Option<i32>,
    /// Only records with at least this much funding (USD).
    #[serde(default)]
    pub min_funding_usd: Option<f64>,
}

impl SearchFilters {
    /// Whether no restriction is set.
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.founded_year_min.is_none()
            && self.founded_year_max.is_none()
            && self.min_funding_usd.is_none()
    }

    /// Whether `record` passes every set restriction.
    ///
    /// Records with an unknown founded year or funding fail the
    /// corresponding minimum and pass the corresponding maximum.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(category) = self.category {
            if record.category != category {
                return false;
            }
        }
        if let Some(min) = self.founded_year_min {
            if record.founded_year.unwrap_or(0) < min {
                return false;
            }
        }
        if let Some(max) = self.founded_year_max {
            if record.founded_year.unwrap_or(i32::MAX) > max {
                return false;
            }
        }
        if let Some(min) = self.min_funding_usd {
            if record.total_funding_usd.unwrap_or(0.0) < min {
                return false;
            }
        }
        true
    }

    /// Field-wise merge: values set on `self` win, unset ones come from
    /// `fallback`.
    pub fn or(self, fallback: SearchFilters) -> SearchFilters {
        SearchFilters {
            category: self.category.or(fallback.category),
            founded_year_min: self.founded_year_min.or(fallback.founded_year_min),
            founded_year_max: self.founded_year_max.or(fallback.founded_year_max),
            min_funding_usd: self.min_funding_usd.or(fallback.min_funding_usd),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_accepts_variants() {
        assert_eq!(Category::parse("clean_energy"), Category::CleanEnergy);
        assert_eq!(Category::parse("Clean Energy"), Category::CleanEnergy);
        assert_eq!(Category::parse("energy-storage"), Category::EnergyStorage);
        assert_eq!(Category::parse("Water & Ocean"), Category::WaterOcean);
    }

    #[test]
    fn test_category_unknown_falls_back() {
        assert_eq!(Category::parse("space_mining"), Category::Unrecognized);
        assert!(matches!(
            Category::parse_strict("space_mining"),
            Err(VerdantError::UnknownCategory(label)) if label == "space_mining"
        ));
        assert!(Category::parse_strict("unrecognized").is_err());
    }

    #[test]
    fn test_category_serde_roundtrip_and_lenient() {
        let json = serde_json::to_string(&Category::GridEnergyManagement).unwrap();
        assert_eq!(json, "\"grid_energy_management\"");
        let back: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Category::GridEnergyManagement);
        let unknown: Category = serde_json::from_str("\"fusion\"").unwrap();
        assert_eq!(unknown, Category::Unrecognized);
    }

    #[test]
    fn test_record_deserializes_primary_vertical_alias() {
        let record: Record = serde_json::from_str(
            r#"{"id": 3, "name": "Climeworks", "primary_vertical": "carbon_management",
                "short_description": "Direct air capture", "founded_year": 2009}"#,
        )
        .unwrap();
        assert_eq!(record.id, RecordId(3));
        assert_eq!(record.category, Category::CarbonManagement);
        assert_eq!(record.founded_year, Some(2009));
        assert!(record.technologies.is_empty());
    }

    #[test]
    fn test_lexical_text_includes_category_and_keywords() {
        let mut record = Record::new(1, "Form Energy", Category::EnergyStorage)
            .with_description("Iron-air batteries")
            .with_technologies(["iron-air"]);
        record.keywords = vec!["long duration".into()];
        record.headquarters_location = Some("Boston, USA".into());

        let text = record.lexical_text();
        assert!(text.contains("energy storage"));
        assert!(text.contains("Boston, USA"));
        assert!(text.contains("long duration"));
        assert!(!record.embedding_text().contains("Boston"));
    }

    #[test]
    fn test_filters_match() {
        let record = Record::new(1, "Span", Category::BuiltEnvironment)
            .with_founded_year(2018)
            .with_funding(231_000_000.0);

        assert!(SearchFilters::default().matches(&record));
        let filters = SearchFilters {
            category: Some(Category::BuiltEnvironment),
            founded_year_min: Some(2015),
            founded_year_max: Some(2020),
            min_funding_usd: Some(100_000_000.0),
        };
        assert!(filters.matches(&record));

        let too_new = SearchFilters {
            founded_year_max: Some(2017),
            ..Default::default()
        };
        assert!(!too_new.matches(&record));

        let unknown_year = Record::new(2, "Anon", Category::BuiltEnvironment);
        let min_year = SearchFilters {
            founded_year_min: Some(2000),
            ..Default::default()
        };
        assert!(!min_year.matches(&unknown_year));
    }

    #[test]
    fn test_filters_or_prefers_self() {
        let explicit = SearchFilters {
            category: Some(Category::CleanEnergy),
            ..Default::default()
        };
        let extracted = SearchFilters {
            category: Some(Category::EnergyStorage),
            founded_year_min: Some(2020),
            ..Default::default()
        };
        let merged = explicit.or(extracted);
        assert_eq!(merged.category, Some(Category::CleanEnergy));
        assert_eq!(merged.founded_year_min, Some(2020));
    }
}
