// 🏗️ Panel Pipeline - raw source rows in, cleaned and documented panel out
//
// events ─► StormEventAdapter ─► aggregate_entity ─────────────┐
// historical ─► HistoricalIndexAdapter ─► annualize ─► real ───┤ merge ─► clean
// national ─► NationalSeriesAdapter ─► annualize ─► changes ───┘
//
// Every stage builds a new table; the only fatal condition is an empty
// event source.

use crate::cleaner::{CleanReport, PanelCleaner};
use crate::config::{DerivedChange, PipelineConfig};
use crate::data_quality::PanelSummary;
use crate::error::{PanelError, Result};
use crate::merge::{MultiSourceMerger, ReferenceJoin};
use crate::parser::ParseStats;
use crate::provenance::{ColumnDescriptor, ColumnRegistry};
use crate::sources::{
    HistoricalIndexAdapter, NationalSeriesAdapter, RawEventRow, RawSeriesPoint, SourceId,
    StormEventAdapter, CPI_SHILLER, NOMINAL_HPI, REAL_HPI,
};
use crate::table::{AnnualSeriesTable, EntityYearPanel, Observation};
use crate::temporal::TemporalAggregator;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Raw rows of every source, as read by the io collaborators
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub events: Vec<RawEventRow>,
    /// Year for event rows that carry none (per-year files)
    pub event_year: Option<i32>,
    pub national: Vec<RawSeriesPoint>,
    /// Positional rows of the historical index sheet
    pub historical: Vec<Vec<String>>,
}

// ============================================================================
// RUN REPORT
// ============================================================================

/// Everything a run recovered from instead of failing on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub sources_present: Vec<String>,
    /// Reference sources that were empty and not joined
    pub missing_sources: Vec<String>,

    pub event_rows: usize,
    pub event_records: usize,
    pub missing_key: usize,
    pub non_county: usize,
    pub missing_year: usize,
    pub event_fields: ParseStats,

    pub national_values: ParseStats,
    pub unknown_series: Vec<String>,

    pub joins: Vec<ReferenceJoin>,
    pub clean: CleanReport,
}

impl RunReport {
    pub fn duplicates_dropped(&self) -> usize {
        self.clean.duplicates_dropped()
    }

    /// `true` when anything was dropped, defaulted or left unjoined
    pub fn has_warnings(&self) -> bool {
        !self.missing_sources.is_empty()
            || self.missing_key > 0
            || self.event_fields.defaulted > 0
            || self.national_values.defaulted > 0
            || self.duplicates_dropped() > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} event rows → {} records ({} without key) | sources absent: {} | {}",
            self.event_rows,
            self.event_records,
            self.missing_key,
            if self.missing_sources.is_empty() {
                "none".to_string()
            } else {
                self.missing_sources.join(", ")
            },
            self.clean.summary()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub panel: EntityYearPanel,
    pub descriptors: Vec<ColumnDescriptor>,
    pub summary: PanelSummary,
    pub report: RunReport,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct PanelPipeline {
    config: PipelineConfig,
    aggregator: TemporalAggregator,
    merger: MultiSourceMerger,
    registry: ColumnRegistry,
}

impl PanelPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        PanelPipeline {
            config,
            aggregator: TemporalAggregator::new(),
            merger: MultiSourceMerger::new(),
            registry: ColumnRegistry::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, inputs: &PipelineInputs) -> Result<PipelineOutput> {
        self.config.validate()?;
        let mut report = RunReport::default();

        // 1. Events → entity-year base panel
        let batch = StormEventAdapter::new().records(&inputs.events, inputs.event_year);
        report.event_rows = inputs.events.len();
        report.event_records = batch.records.len();
        report.missing_key = batch.missing_key;
        report.non_county = batch.non_county;
        report.missing_year = batch.missing_year;
        report.event_fields = batch.malformed;

        if batch.records.is_empty() {
            return Err(PanelError::source_unavailable(SourceId::StormEvents.code()));
        }
        let base = self.aggregator.aggregate_entity(&batch.records);
        report.sources_present.push(SourceId::StormEvents.code().to_string());
        info!(
            source = SourceId::StormEvents.code(),
            rows = inputs.events.len(),
            entity_years = base.len(),
            "loaded"
        );

        // 2. Historical index
        let layout = self.config.historical_layout.clone();
        let historical_obs = HistoricalIndexAdapter::new(layout).observations(&inputs.historical)?;
        let historical = self.historical_table(&historical_obs);

        // 3. National series
        let series = NationalSeriesAdapter::new(&self.config.fred_series).observations(&inputs.national);
        report.national_values = series.dropped;
        report.unknown_series = series.unknown_series;
        let national = self.national_table(&series.observations);

        for table in [&historical, &national] {
            if !table.is_empty() {
                report.sources_present.push(table.source_id.clone());
                info!(source = %table.source_id, years = table.len(), columns = table.columns().len(), "loaded");
            }
        }

        // 4. Merge, historical first
        let merged = self.merger.merge(&base, &[historical, national])?;
        report.missing_sources = merged.missing_sources;
        report.joins = merged.joins;

        // 5. Clean
        let cleaned = PanelCleaner::from_config(&self.config).clean(&merged.panel);
        report.clean = cleaned.report;

        if report.missing_key > 0 {
            warn!(rows = report.missing_key, "{}", report.summary());
        } else {
            info!("{}", report.summary());
        }

        let summary = PanelSummary::from_panel(&cleaned.panel);
        summary.log();

        Ok(PipelineOutput {
            descriptors: self.registry.describe(&cleaned.panel, &self.config),
            panel: cleaned.panel,
            summary,
            report,
        })
    }

    /// Annualize the historical index and add the real index and its changes
    pub fn historical_table(&self, observations: &[Observation]) -> AnnualSeriesTable {
        let mut table = self.aggregator.aggregate_with(SourceId::Shiller.code(), observations, |v| {
            self.config.reduction_for(v)
        });

        if table.column_index(NOMINAL_HPI).is_some() && table.column_index(CPI_SHILLER).is_some() {
            self.aggregator.rebase_real(
                &mut table,
                NOMINAL_HPI,
                CPI_SHILLER,
                REAL_HPI,
                self.config.real_index_base_year,
            );
        }

        self.add_changes(&mut table);
        self.aggregator.round_table(&mut table);
        table
    }

    /// Annualize the national series and add their configured changes
    pub fn national_table(&self, observations: &[Observation]) -> AnnualSeriesTable {
        let mut table = self.aggregator.aggregate_with(SourceId::Fred.code(), observations, |v| {
            self.config.reduction_for(v)
        });
        self.add_changes(&mut table);
        self.aggregator.round_table(&mut table);
        table
    }

    fn add_changes(&self, table: &mut AnnualSeriesTable) {
        let pct: Vec<DerivedChange> = self.config.pct_changes_for(table.columns()).cloned().collect();
        let diff: Vec<DerivedChange> = self
            .config
            .first_differences_for(table.columns())
            .cloned()
            .collect();

        for change in &pct {
            self.aggregator.pct_change(table, &change.source, &change.target);
        }
        for change in &diff {
            self.aggregator.first_difference(table, &change.source, &change.target);
        }
    }
}

impl Default for PanelPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
