// ✅ Panel Verification - shape, missingness and key statistics of a finished panel
// Read-only: nothing here changes the panel

use crate::table::EntityYearPanel;
use crate::temporal::{EVENT_COUNT, TOTAL_DAMAGE};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Columns whose distribution is always reported when present
pub const KEY_COLUMNS: [&str; 5] = [
    EVENT_COUNT,
    TOTAL_DAMAGE,
    "nominal_hpi",
    "mortgage_rate_30yr",
    "unemployment_rate",
];

// ============================================================================
// COLUMN STATISTICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMissingness {
    pub column: String,
    pub missing: usize,
    /// Share of rows missing, 0-100
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: String,
    /// Non-missing numeric values
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl ColumnStats {
    fn from_values(column: &str, values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let sum: f64 = sorted.iter().sum();

        Some(ColumnStats {
            column: column.to_string(),
            count: sorted.len(),
            mean: sum / sorted.len() as f64,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        })
    }
}

// ============================================================================
// PANEL SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSummary {
    pub rows: usize,
    pub entities: usize,
    pub year_range: Option<(i32, i32)>,
    pub columns: usize,
    /// Only columns with at least one missing cell, most missing first
    pub missingness: Vec<ColumnMissingness>,
    pub key_stats: Vec<ColumnStats>,
}

impl PanelSummary {
    pub fn from_panel(panel: &EntityYearPanel) -> Self {
        let rows = panel.len();

        let mut missingness: Vec<ColumnMissingness> = panel
            .columns()
            .iter()
            .filter_map(|name| {
                let missing = panel.column(name).iter().filter(|v| v.is_missing()).count();
                (missing > 0).then(|| ColumnMissingness {
                    column: name.clone(),
                    missing,
                    percent: missing as f64 / rows as f64 * 100.0,
                })
            })
            .collect();
        // stable sort keeps column order among ties
        missingness.sort_by(|a, b| b.missing.cmp(&a.missing));

        let key_stats = KEY_COLUMNS
            .iter()
            .filter(|c| panel.has_column(c))
            .filter_map(|c| {
                let values: Vec<f64> = panel.column(c).iter().filter_map(|v| v.as_f64()).collect();
                ColumnStats::from_values(c, &values)
            })
            .collect();

        PanelSummary {
            rows,
            entities: panel.unique_entities(),
            year_range: panel.year_range(),
            columns: panel.header().len(),
            missingness,
            key_stats,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missingness.is_empty()
    }

    pub fn summary(&self) -> String {
        let years = match self.year_range {
            Some((min, max)) => format!("{}-{}", min, max),
            None => "none".to_string(),
        };
        format!(
            "{} rows, {} entities, years {}, {} columns, {} with missing values",
            self.rows,
            self.entities,
            years,
            self.columns,
            self.missingness.len()
        )
    }

    /// One info line for the shape plus one per incomplete or key column
    pub fn log(&self) {
        info!("{}", self.summary());
        for m in &self.missingness {
            info!(column = %m.column, missing = m.missing, "{:.1}% missing", m.percent);
        }
        for s in &self.key_stats {
            info!(
                column = %s.column,
                count = s.count,
                mean = s.mean,
                min = s.min,
                max = s.max,
                "key column"
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
