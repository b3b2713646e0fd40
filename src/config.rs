// ⚙️ Pipeline Configuration - the only parameters the core needs
// Loaded from JSON; every field has a default so partial files work

use crate::error::{PanelError, Result as PanelResult};
use crate::sources::{HistoricalLayout, SourceId};
use crate::temporal::Reduction;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A derived column computed from another column of the same table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedChange {
    pub source: String,
    pub target: String,
}

impl DerivedChange {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        DerivedChange {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Inclusive analysis window
    pub year_min: i32,
    pub year_max: i32,

    /// source_id → display name used in provenance output
    pub source_labels: BTreeMap<String, String>,

    /// Per-variable annualization operator for national series
    pub variable_reduction_map: BTreeMap<String, Reduction>,
    pub default_reduction: Reduction,

    /// Year-over-year percentage changes
    pub pct_change: Vec<DerivedChange>,

    /// Year-over-year differences (for variables that already are rates)
    pub first_difference: Vec<DerivedChange>,

    /// National series id → output column
    pub fred_series: BTreeMap<String, String>,

    /// Year whose CPI the real index is expressed in
    pub real_index_base_year: i32,

    pub historical_layout: HistoricalLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let source_labels = SourceId::ALL
            .iter()
            .map(|s| (s.code().to_string(), s.default_label().to_string()))
            .collect();

        let fred_series: BTreeMap<String, String> = [
            ("MORTGAGE30US", "mortgage_rate_30yr"),
            ("UNRATE", "unemployment_rate"),
            ("CPIAUCSL", "cpi_all_items"),
            ("FEDFUNDS", "fed_funds_rate"),
            ("GS10", "treasury_10yr"),
            ("CSUSHPISA", "case_shiller_national"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        // Rates and index levels are point-in-time: averaged, never summed
        let variable_reduction_map = fred_series
            .values()
            .map(String::as_str)
            .chain(["nominal_hpi", "cpi_shiller"])
            .map(|v| (v.to_string(), Reduction::Mean))
            .collect();

        PipelineConfig {
            year_min: 1980,
            year_max: 2022,
            source_labels,
            variable_reduction_map,
            default_reduction: Reduction::Mean,
            pct_change: vec![
                DerivedChange::new("case_shiller_national", "case_shiller_national_yoy"),
                DerivedChange::new("cpi_all_items", "cpi_all_items_yoy"),
                DerivedChange::new("nominal_hpi", "yoy_nominal"),
                DerivedChange::new("real_hpi", "yoy_real"),
            ],
            first_difference: vec![DerivedChange::new("mortgage_rate_30yr", "mortgage_rate_chg")],
            fred_series,
            real_index_base_year: 2000,
            historical_layout: HistoricalLayout::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: PipelineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PanelResult<()> {
        if self.year_min > self.year_max {
            return Err(PanelError::InvalidConfig(format!(
                "year_min ({}) is after year_max ({})",
                self.year_min, self.year_max
            )));
        }
        self.historical_layout.validate()
    }

    pub fn reduction_for(&self, variable: &str) -> Reduction {
        self.variable_reduction_map
            .get(variable)
            .copied()
            .unwrap_or(self.default_reduction)
    }

    /// Display label for a source; unknown ids fall back to the id itself
    pub fn source_label(&self, source_id: &str) -> String {
        self.source_labels
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| source_id.to_string())
    }

    /// Derived changes whose source column exists in `columns`
    pub fn pct_changes_for<'a>(&'a self, columns: &'a [String]) -> impl Iterator<Item = &'a DerivedChange> {
        self.pct_change
            .iter()
            .filter(move |c| columns.contains(&c.source))
    }

    pub fn first_differences_for<'a>(
        &'a self,
        columns: &'a [String],
    ) -> impl Iterator<Item = &'a DerivedChange> {
        self.first_difference
            .iter()
            .filter(move |c| columns.contains(&c.source))
    }
}

// ============================================================================
// TESTS
// ============================================================================
