// 🏷️ Provenance Describer - what every output column means and where it came from
//
// Columns are described independently of the tables that carry them. The
// registry is a static catalog; the panel's current column set decides
// which entries are emitted.

use crate::config::PipelineConfig;
use crate::pipeline::RunReport;
use crate::sources::SourceId;
use crate::table::{EntityYearPanel, Value, ENTITY_KEY, YEAR};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;

pub const UNKNOWN_SOURCE: &str = "Unknown";
pub const DERIVED_SOURCE: &str = "Derived";
pub const PLACEHOLDER: &str = "—";

// ============================================================================
// COLUMN TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    String,
    Int,
    Float,
    Category,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::String => "string",
            SemanticType::Int => "int",
            SemanticType::Float => "float",
            SemanticType::Category => "category",
        }
    }

    /// Type of the first stored value; an all-missing column reads as float
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        values
            .into_iter()
            .find_map(|v| match v {
                Value::Missing => None,
                Value::Int(_) => Some(SemanticType::Int),
                Value::Float(_) => Some(SemanticType::Float),
                Value::Text(_) => Some(SemanticType::String),
                Value::Category(_) => Some(SemanticType::Category),
            })
            .unwrap_or(SemanticType::Float)
    }
}

/// Where a column's values originate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnOrigin {
    Source(SourceId),
    Derived,
}

// ============================================================================
// COLUMN DEFINITION
// ============================================================================

/// Static metadata for one known column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub semantic_type: SemanticType,
    pub origin: ColumnOrigin,
    pub description: String,
    pub unit: String,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType, origin: ColumnOrigin) -> Self {
        ColumnDefinition {
            name: name.into(),
            semantic_type,
            origin,
            description: String::new(),
            unit: PLACEHOLDER.to_string(),
        }
    }

    /// Builder: add description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: add unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// One emitted row of the data dictionary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
    pub source_label: String,
    pub description: String,
    pub unit: String,
}

impl ColumnDescriptor {
    pub fn is_placeholder(&self) -> bool {
        self.source_label == UNKNOWN_SOURCE
    }
}

// ============================================================================
// COLUMN REGISTRY
// ============================================================================

/// Catalog of every column the pipeline knows how to document
pub struct ColumnRegistry {
    columns: HashMap<String, ColumnDefinition>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        let mut registry = ColumnRegistry {
            columns: HashMap::new(),
        };

        registry.register_panel_columns();
        registry
    }

    fn register_panel_columns(&mut self) {
        use ColumnOrigin::{Derived, Source};
        use SemanticType::{Category, Float, Int};

        let events = Source(SourceId::StormEvents);
        let shiller = Source(SourceId::Shiller);
        let fred = Source(SourceId::Fred);

        // ====================================================================
        // KEYS
        // ====================================================================

        self.register(
            ColumnDefinition::new(ENTITY_KEY, SemanticType::String, events)
                .with_description("5-digit county code: 2-digit state + 3-digit county, zero-padded"),
        );
        self.register(ColumnDefinition::new(YEAR, Int, events).with_description("Calendar year"));

        // ====================================================================
        // DISASTER EVENTS
        // ====================================================================

        self.register(
            ColumnDefinition::new("event_count", Int, events)
                .with_description("Number of natural disaster events in county-year")
                .with_unit("count"),
        );
        self.register(
            ColumnDefinition::new("total_damage", Float, events)
                .with_description("Total property + crop damage from all disaster events")
                .with_unit("USD"),
        );
        self.register(
            ColumnDefinition::new("property_damage", Float, events)
                .with_description("Property damage from all disaster events")
                .with_unit("USD"),
        );
        self.register(
            ColumnDefinition::new("crop_damage", Float, events)
                .with_description("Crop damage from all disaster events")
                .with_unit("USD"),
        );
        self.register(
            ColumnDefinition::new("total_injuries", Int, events)
                .with_description("Direct + indirect injuries from all disaster events")
                .with_unit("count"),
        );
        self.register(
            ColumnDefinition::new("total_fatalities", Int, events)
                .with_description("Direct + indirect fatalities from all disaster events")
                .with_unit("count"),
        );
        self.register(
            ColumnDefinition::new("log_total_damage", Float, Derived)
                .with_description("Natural log of (total_damage + 1); controls right-skew")
                .with_unit("log USD"),
        );
        self.register(
            ColumnDefinition::new("disaster_intensity", Category, Derived)
                .with_description("Binned event count: none/low/moderate/high/very_high"),
        );

        // ====================================================================
        // HISTORICAL HOME PRICES
        // ====================================================================

        self.register(
            ColumnDefinition::new("nominal_hpi", Float, shiller)
                .with_description("U.S. national nominal home price index (1890 base = 100)")
                .with_unit("index"),
        );
        self.register(
            ColumnDefinition::new("real_hpi", Float, shiller)
                .with_description("CPI-deflated real home price index")
                .with_unit("index"),
        );
        self.register(
            ColumnDefinition::new("cpi_shiller", Float, shiller)
                .with_description("CPI series used for deflation of the historical index")
                .with_unit("index"),
        );
        self.register(
            ColumnDefinition::new("yoy_nominal", Float, shiller)
                .with_description("Year-over-year % change in nominal HPI")
                .with_unit("%"),
        );
        self.register(
            ColumnDefinition::new("yoy_real", Float, shiller)
                .with_description("Year-over-year % change in real HPI")
                .with_unit("%"),
        );

        // ====================================================================
        // NATIONAL MACRO SERIES
        // ====================================================================

        self.register(
            ColumnDefinition::new("mortgage_rate_30yr", Float, fred)
                .with_description("30-year fixed mortgage rate (MORTGAGE30US)")
                .with_unit("% p.a."),
        );
        self.register(
            ColumnDefinition::new("unemployment_rate", Float, fred)
                .with_description("U.S. national unemployment rate (UNRATE)")
                .with_unit("%"),
        );
        self.register(
            ColumnDefinition::new("cpi_all_items", Float, fred)
                .with_description("CPI for all urban consumers (CPIAUCSL)")
                .with_unit("index"),
        );
        self.register(
            ColumnDefinition::new("cpi_all_items_yoy", Float, fred)
                .with_description("YoY % change in CPI for all urban consumers")
                .with_unit("%"),
        );
        self.register(
            ColumnDefinition::new("fed_funds_rate", Float, fred)
                .with_description("Federal Funds effective rate (FEDFUNDS)")
                .with_unit("% p.a."),
        );
        self.register(
            ColumnDefinition::new("treasury_10yr", Float, fred)
                .with_description("10-year Treasury yield (GS10)")
                .with_unit("% p.a."),
        );
        self.register(
            ColumnDefinition::new("case_shiller_national", Float, fred)
                .with_description("Case-Shiller U.S. national HPI, SA (CSUSHPISA)")
                .with_unit("index"),
        );
        self.register(
            ColumnDefinition::new("case_shiller_national_yoy", Float, fred)
                .with_description("YoY % change in Case-Shiller national HPI")
                .with_unit("%"),
        );
        self.register(
            ColumnDefinition::new("mortgage_rate_chg", Float, fred)
                .with_description("Annual change in 30yr mortgage rate")
                .with_unit("pp"),
        );
    }

    pub fn register(&mut self, column: ColumnDefinition) {
        self.columns.insert(column.name.clone(), column);
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.get(name)
    }

    pub fn count(&self) -> usize {
        self.columns.len()
    }

    /// One descriptor per column of `panel`, keys first, in column order.
    ///
    /// Never fails: unknown columns get placeholder metadata with the type
    /// inferred from stored values.
    pub fn describe(&self, panel: &EntityYearPanel, config: &PipelineConfig) -> Vec<ColumnDescriptor> {
        panel
            .header()
            .into_iter()
            .map(|name| match self.get(&name) {
                Some(def) => ColumnDescriptor {
                    semantic_type: def.semantic_type,
                    source_label: match def.origin {
                        ColumnOrigin::Source(source) => config.source_label(source.code()),
                        ColumnOrigin::Derived => DERIVED_SOURCE.to_string(),
                    },
                    description: def.description.clone(),
                    unit: def.unit.clone(),
                    name,
                },
                None => ColumnDescriptor {
                    semantic_type: SemanticType::infer(panel.column(&name)),
                    source_label: UNKNOWN_SOURCE.to_string(),
                    description: PLACEHOLDER.to_string(),
                    unit: PLACEHOLDER.to_string(),
                    name,
                },
            })
            .collect()
    }
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Describe with the built-in registry and default source labels
pub fn describe(panel: &EntityYearPanel) -> Vec<ColumnDescriptor> {
    ColumnRegistry::new().describe(panel, &PipelineConfig::default())
}

// ============================================================================
// DATA DICTIONARY DOCUMENT
// ============================================================================

pub const PANEL_FILE_NAME: &str = "housing_disasters_panel.csv";

const CLEANING_DECISIONS: [(&str, &str); 7] = [
    (
        "Aggregated event-level records to county-year",
        "Unit of analysis is county-year; event multiplicity captured in `event_count`",
    ),
    (
        "Filtered to the configured year window",
        "Event coverage improves post-1980; national series available throughout",
    ),
    (
        "Log-transformed `total_damage`",
        "Damage is heavily right-skewed; log(damage+1) reduces influence of extreme events",
    ),
    (
        "Left-joined historical index and national series on year",
        "National series apply uniformly to all counties in a given year",
    ),
    (
        "Dropped event rows with missing county code or year",
        "Cannot assign to panel without both keys",
    ),
    (
        "Padded county codes to 5 digits",
        "Ensures consistent join keys across datasets",
    ),
    (
        "Kept the first of duplicate county-year rows",
        "Deterministic output; every dropped row is counted in the manifest",
    ),
];

const SOURCE_CITATIONS: [(SourceId, &str); 3] = [
    (
        SourceId::StormEvents,
        "NOAA NCEI Storm Events Database. https://www.ncei.noaa.gov/stormevents/",
    ),
    (
        SourceId::Shiller,
        "Robert J. Shiller, Yale University. https://shillerdata.com/",
    ),
    (
        SourceId::Fred,
        "Federal Reserve Bank of St. Louis. https://fred.stlouisfed.org/",
    ),
];

/// Markdown data dictionary for a cleaned panel
pub fn render_dictionary(
    panel: &EntityYearPanel,
    descriptors: &[ColumnDescriptor],
    config: &PipelineConfig,
) -> String {
    let mut out = String::new();
    let years = match panel.year_range() {
        Some((min, max)) => format!("{} ({}–{})", panel.unique_years(), min, max),
        None => "0".to_string(),
    };

    // writeln! into a String cannot fail
    let _ = writeln!(out, "# Data Dictionary: Housing Disasters Panel\n");
    let _ = writeln!(out, "**Dataset:** `{}`  ", PANEL_FILE_NAME);
    let _ = writeln!(out, "**Entities (counties):** {}  ", panel.unique_entities());
    let _ = writeln!(out, "**Time periods (years):** {}  ", years);
    let _ = writeln!(out, "**Total observations:** {}  ", panel.len());
    let _ = writeln!(out, "**Unit of analysis:** County × Year (long format)\n");
    let _ = writeln!(out, "---\n");

    let _ = writeln!(out, "## Variable Definitions\n");
    let _ = writeln!(out, "| Variable | Type | Source | Description | Units |");
    let _ = writeln!(out, "|---|---|---|---|---|");
    for d in descriptors {
        let _ = writeln!(
            out,
            "| `{}` | {} | {} | {} | {} |",
            d.name,
            d.semantic_type.as_str(),
            d.source_label,
            d.description,
            d.unit
        );
    }

    let _ = writeln!(out, "\n---\n");
    let _ = writeln!(out, "## Cleaning Decisions\n");
    let _ = writeln!(out, "| Decision | Justification |");
    let _ = writeln!(out, "|---|---|");
    for (decision, justification) in CLEANING_DECISIONS {
        let _ = writeln!(out, "| {} | {} |", decision, justification);
    }

    let _ = writeln!(out, "\n---\n");
    let _ = writeln!(out, "## Sources\n");
    for (source, citation) in SOURCE_CITATIONS {
        let _ = writeln!(out, "- **{}**: {}", config.source_label(source.code()), citation);
    }

    out
}

// ============================================================================
// RUN MANIFEST
// ============================================================================

/// Machine-checkable record of one run. Two runs over identical inputs
/// produce identical manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub dataset: String,
    pub crate_version: String,
    pub rows: usize,
    pub entities: usize,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub columns: Vec<String>,
    pub sources_present: Vec<String>,
    pub sources_absent: Vec<String>,
    pub diagnostics: RunReport,
    /// Hex SHA-256 of the written panel file
    pub panel_sha256: String,
}

impl RunManifest {
    pub fn new(panel: &EntityYearPanel, report: &RunReport, panel_bytes: &[u8]) -> Self {
        let (year_min, year_max) = match panel.year_range() {
            Some((min, max)) => (Some(min), Some(max)),
            None => (None, None),
        };

        RunManifest {
            dataset: PANEL_FILE_NAME.to_string(),
            crate_version: crate::VERSION.to_string(),
            rows: panel.len(),
            entities: panel.unique_entities(),
            year_min,
            year_max,
            columns: panel.header(),
            sources_present: report.sources_present.clone(),
            sources_absent: report.missing_sources.clone(),
            diagnostics: report.clone(),
            panel_sha256: checksum(panel_bytes),
        }
    }

    /// `true` when `panel_bytes` is the file this manifest describes
    pub fn verify(&self, panel_bytes: &[u8]) -> bool {
        self.panel_sha256 == checksum(panel_bytes)
    }
}

pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================
