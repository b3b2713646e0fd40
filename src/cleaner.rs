// 🧹 Panel Cleaner - window, derived columns, dedup, canonical order
//
// Four edits, always in this order:
//   1. drop rows outside [year_min, year_max]
//   2. log_total_damage and disaster_intensity
//   3. first-wins deduplication on (entity_key, year)
//   4. sort by (entity_key, year)
//
// Running the cleaner twice gives the same panel as running it once.

use crate::config::PipelineConfig;
use crate::deduplication::{DeduplicationEngine, DeduplicationReport};
use crate::table::{EntityYearPanel, PanelRow, Value};
use crate::temporal::{EVENT_COUNT, TOTAL_DAMAGE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const LOG_TOTAL_DAMAGE: &str = "log_total_damage";
pub const DISASTER_INTENSITY: &str = "disaster_intensity";

// ============================================================================
// DISASTER INTENSITY
// ============================================================================

/// Event-count bucket. Upper bounds are closed:
/// 0 → none, (0,2] → low, (2,5] → moderate, (5,10] → high, >10 → very_high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    None,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl Intensity {
    pub fn from_event_count(count: i64) -> Self {
        match count {
            i64::MIN..=0 => Intensity::None,
            1..=2 => Intensity::Low,
            3..=5 => Intensity::Moderate,
            6..=10 => Intensity::High,
            _ => Intensity::VeryHigh,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Intensity::None => "none",
            Intensity::Low => "low",
            Intensity::Moderate => "moderate",
            Intensity::High => "high",
            Intensity::VeryHigh => "very_high",
        }
    }
}

/// `ln(max(damage, 0) + 1)`, defined at zero
pub fn log_damage(total_damage: f64) -> f64 {
    (total_damage.max(0.0) + 1.0).ln()
}

// ============================================================================
// CLEAN REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanReport {
    pub rows_in: usize,
    pub rows_outside_window: usize,
    /// Duplicate (entity_key, year) rows, resolved first-wins
    pub duplicates: DeduplicationReport,
    pub rows_out: usize,
}

impl CleanReport {
    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates.rows_dropped
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows in, {} outside window, {} duplicates dropped, {} rows out",
            self.rows_in,
            self.rows_outside_window,
            self.duplicates_dropped(),
            self.rows_out
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanOutcome {
    pub panel: EntityYearPanel,
    pub report: CleanReport,
}

// ============================================================================
// PANEL CLEANER
// ============================================================================

pub struct PanelCleaner {
    year_min: i32,
    year_max: i32,
    dedup: DeduplicationEngine,
}

impl PanelCleaner {
    pub fn new(year_min: i32, year_max: i32) -> Self {
        PanelCleaner {
            year_min,
            year_max,
            dedup: DeduplicationEngine::new(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.year_min, config.year_max)
    }

    pub fn clean(&self, panel: &EntityYearPanel) -> CleanOutcome {
        let rows_in = panel.len();

        // 1. Window
        let windowed = self.filter_window(panel);
        let rows_outside_window = rows_in - windowed.len();
        info!(
            year_min = self.year_min,
            year_max = self.year_max,
            before = rows_in,
            after = windowed.len(),
            "year filter"
        );

        // 2. Derived columns
        let derived = self.add_derived_columns(windowed);

        // 3. Deduplication
        let (mut deduped, duplicates) = self.dedup.first_wins(&derived);
        if duplicates.has_duplicates() {
            warn!(
                dropped = duplicates.rows_dropped,
                keys = duplicates.groups.len(),
                "duplicate (entity_key, year) rows, keeping first occurrence"
            );
            for group in &duplicates.groups {
                debug!("{}", group.reason());
            }
        }

        // 4. Canonical sort
        deduped
            .rows_mut()
            .sort_by(|a, b| a.entity_key.cmp(&b.entity_key).then(a.year.cmp(&b.year)));

        let report = CleanReport {
            rows_in,
            rows_outside_window,
            rows_out: deduped.len(),
            duplicates,
        };

        CleanOutcome {
            panel: deduped,
            report,
        }
    }

    fn filter_window(&self, panel: &EntityYearPanel) -> EntityYearPanel {
        let rows: Vec<PanelRow> = panel
            .rows()
            .iter()
            .filter(|r| (self.year_min..=self.year_max).contains(&r.year))
            .cloned()
            .collect();
        panel.with_rows(rows)
    }

    /// Recomputes in place when the columns already exist
    fn add_derived_columns(&self, mut panel: EntityYearPanel) -> EntityYearPanel {
        if let Some(src) = panel.column_index(TOTAL_DAMAGE) {
            let dst = panel.ensure_column(LOG_TOTAL_DAMAGE);
            for row in panel.rows_mut() {
                row.values[dst] = match row.values[src].as_f64() {
                    Some(damage) => Value::Float(log_damage(damage)),
                    None => Value::Missing,
                };
            }
        } else {
            debug!("no {} column, {} not derived", TOTAL_DAMAGE, LOG_TOTAL_DAMAGE);
        }

        if let Some(src) = panel.column_index(EVENT_COUNT) {
            let dst = panel.ensure_column(DISASTER_INTENSITY);
            for row in panel.rows_mut() {
                row.values[dst] = match row.values[src].as_i64() {
                    Some(count) => {
                        Value::Category(Intensity::from_event_count(count).label().to_string())
                    }
                    None => Value::Missing,
                };
            }
        } else {
            debug!("no {} column, {} not derived", EVENT_COUNT, DISASTER_INTENSITY);
        }

        panel
    }
}

/// Clean with an explicit window
pub fn clean(panel: &EntityYearPanel, year_min: i32, year_max: i32) -> CleanOutcome {
    PanelCleaner::new(year_min, year_max).clean(panel)
}

// ============================================================================
// TESTS
// ============================================================================
