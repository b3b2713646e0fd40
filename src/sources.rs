// 🛰️ Source Adapters - typed records out of the three upstream feeds
//
// Fetching and file formats belong to the collaborators in `io`; these
// adapters only turn already-parsed raw rows into Observations and
// EventRecords, counting what they had to drop or default.

use crate::error::{PanelError, Result};
use crate::parser::{FieldParser, ParseStats};
use crate::spatial::build_key_from_raw;
use crate::table::{EventRecord, Observation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ============================================================================
// SOURCE IDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Point-in-time national economic series
    Fred,
    /// County-level disaster event records
    StormEvents,
    /// Historical national home price index
    Shiller,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [SourceId::Fred, SourceId::StormEvents, SourceId::Shiller];

    /// Stable id used in configuration and reports
    pub fn code(&self) -> &'static str {
        match self {
            SourceId::Fred => "fred",
            SourceId::StormEvents => "storm_events",
            SourceId::Shiller => "shiller",
        }
    }

    pub fn default_label(&self) -> &'static str {
        match self {
            SourceId::Fred => "FRED",
            SourceId::StormEvents => "SHELDUS",
            SourceId::Shiller => "Shiller",
        }
    }

    pub fn from_code(code: &str) -> Option<SourceId> {
        SourceId::ALL.iter().copied().find(|s| s.code() == code)
    }
}

// ============================================================================
// NATIONAL SERIES
// ============================================================================

/// One raw national observation: series id, ISO date, value text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeriesPoint {
    pub series_id: String,
    pub date: String,
    pub value: String,
}

impl RawSeriesPoint {
    pub fn new(series_id: &str, date: &str, value: &str) -> Self {
        RawSeriesPoint {
            series_id: series_id.to_string(),
            date: date.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesBatch {
    pub observations: Vec<Observation>,
    /// Unparseable dates or values (e.g. the "." placeholder)
    pub dropped: ParseStats,
    /// Series ids with no configured column
    pub unknown_series: Vec<String>,
}

/// Maps raw national points to Observations named by column
pub struct NationalSeriesAdapter<'a> {
    series_columns: &'a BTreeMap<String, String>,
}

impl<'a> NationalSeriesAdapter<'a> {
    pub fn new(series_columns: &'a BTreeMap<String, String>) -> Self {
        NationalSeriesAdapter { series_columns }
    }

    pub fn observations(&self, points: &[RawSeriesPoint]) -> SeriesBatch {
        let mut batch = SeriesBatch::default();

        for point in points {
            let Some(column) = self.series_columns.get(&point.series_id) else {
                if !batch.unknown_series.contains(&point.series_id) {
                    batch.unknown_series.push(point.series_id.clone());
                }
                continue;
            };

            let date = NaiveDate::parse_from_str(point.date.trim(), "%Y-%m-%d");
            let value = point
                .value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite());

            match (date, value) {
                (Ok(date), Some(value)) => {
                    batch.dropped.record_ok();
                    batch
                        .observations
                        .push(Observation::national(date, column.clone(), value));
                }
                _ => batch
                    .dropped
                    .record_default(&format!("{}={}@{}", point.series_id, point.value, point.date)),
            }
        }

        if !batch.unknown_series.is_empty() {
            warn!(series = ?batch.unknown_series, "unmapped national series ignored");
        }
        debug!(
            observations = batch.observations.len(),
            dropped = batch.dropped.defaulted,
            "national series adapted"
        );
        batch
    }
}

// ============================================================================
// COUNTY EVENTS
// ============================================================================

/// One raw event detail row, columns named as in the NOAA Storm Events
/// "details" export. Every field is optional text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEventRow {
    #[serde(rename = "STATE_FIPS", default)]
    pub state_fips: Option<String>,

    #[serde(rename = "CZ_FIPS", default)]
    pub cz_fips: Option<String>,

    /// "C" = county, "Z" = forecast zone, "M" = marine
    #[serde(rename = "CZ_TYPE", default)]
    pub cz_type: Option<String>,

    #[serde(rename = "YEAR", default)]
    pub year: Option<String>,

    #[serde(rename = "EVENT_TYPE", default)]
    pub event_type: Option<String>,

    #[serde(rename = "DAMAGE_PROPERTY", default)]
    pub damage_property: Option<String>,

    #[serde(rename = "DAMAGE_CROPS", default)]
    pub damage_crops: Option<String>,

    #[serde(rename = "INJURIES_DIRECT", default)]
    pub injuries_direct: Option<String>,

    #[serde(rename = "INJURIES_INDIRECT", default)]
    pub injuries_indirect: Option<String>,

    #[serde(rename = "DEATHS_DIRECT", default)]
    pub deaths_direct: Option<String>,

    #[serde(rename = "DEATHS_INDIRECT", default)]
    pub deaths_indirect: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    pub records: Vec<EventRecord>,
    /// Rows dropped because a key component was absent
    pub missing_key: usize,
    /// Rows that were not county-level
    pub non_county: usize,
    /// Rows without a usable year
    pub missing_year: usize,
    /// Loss and casualty fields that fell back to zero
    pub malformed: ParseStats,
}

pub struct StormEventAdapter;

impl StormEventAdapter {
    pub fn new() -> Self {
        StormEventAdapter
    }

    /// Convert raw rows; `default_year` applies to rows without YEAR
    /// (per-year files carry the year in their name).
    pub fn records(&self, rows: &[RawEventRow], default_year: Option<i32>) -> EventBatch {
        let mut batch = EventBatch::default();
        let mut fields = FieldParser::new();

        for row in rows {
            if let Some(cz_type) = row.cz_type.as_deref() {
                if cz_type.trim() != "C" {
                    batch.non_county += 1;
                    continue;
                }
            }

            let entity_key = match build_key_from_raw(row.state_fips.as_deref(), row.cz_fips.as_deref()) {
                Ok(key) => key,
                Err(_) => {
                    batch.missing_key += 1;
                    continue;
                }
            };

            let year = row
                .year
                .as_deref()
                .and_then(|y| y.trim().parse::<i32>().ok())
                .or(default_year);
            let Some(year) = year else {
                batch.missing_year += 1;
                continue;
            };

            let injuries = fields
                .count(row.injuries_direct.as_deref())
                .saturating_add(fields.count(row.injuries_indirect.as_deref()));
            let fatalities = fields
                .count(row.deaths_direct.as_deref())
                .saturating_add(fields.count(row.deaths_indirect.as_deref()));

            batch.records.push(EventRecord {
                entity_key,
                year,
                category: row.event_type.clone().unwrap_or_default(),
                property_loss: fields.magnitude(row.damage_property.as_deref()),
                crop_loss: fields.magnitude(row.damage_crops.as_deref()),
                injuries,
                fatalities,
            });
        }

        batch.malformed = fields.into_stats();

        if batch.missing_key > 0 {
            warn!(rows = batch.missing_key, "event rows without a spatial key dropped");
        }
        if batch.malformed.defaulted > 0 {
            warn!(fields = batch.malformed.defaulted, "malformed event fields set to zero");
        }
        debug!(
            records = batch.records.len(),
            non_county = batch.non_county,
            "event rows adapted"
        );
        batch
    }
}

impl Default for StormEventAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// HISTORICAL INDEX (positional layout)
// ============================================================================

/// Fixed column offsets of the historical index workbook.
///
/// This is the only place that knows the layout; if the upstream sheet
/// shifts, change it here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalLayout {
    /// Decimal year (e.g. 1987.5)
    pub date_column: usize,
    /// Nominal home price index
    pub index_column: usize,
    /// CPI series used for deflation
    pub cpi_column: usize,
    /// Rows whose date falls outside [min_year, max_year] are not data
    pub min_year: i32,
    pub max_year: i32,
}

impl Default for HistoricalLayout {
    fn default() -> Self {
        HistoricalLayout {
            date_column: 0,
            index_column: 1,
            cpi_column: 14,
            min_year: 1880,
            max_year: 2030,
        }
    }
}

impl HistoricalLayout {
    pub fn validate(&self) -> Result<()> {
        if self.date_column == self.index_column
            || self.date_column == self.cpi_column
            || self.index_column == self.cpi_column
        {
            return Err(PanelError::InvalidConfig(
                "historical layout columns must be distinct".to_string(),
            ));
        }
        if self.min_year > self.max_year {
            return Err(PanelError::InvalidConfig(
                "historical layout min_year is after max_year".to_string(),
            ));
        }
        Ok(())
    }
}

pub const NOMINAL_HPI: &str = "nominal_hpi";
pub const CPI_SHILLER: &str = "cpi_shiller";
pub const REAL_HPI: &str = "real_hpi";

/// Reads Observations out of an untyped wide table by position
pub struct HistoricalIndexAdapter {
    layout: HistoricalLayout,
}

impl HistoricalIndexAdapter {
    pub fn new(layout: HistoricalLayout) -> Self {
        HistoricalIndexAdapter { layout }
    }

    /// Data rows are those whose date cell is a decimal year inside the
    /// layout's range; headers and notes fall through. A row needs a date
    /// and an index value; the CPI cell is optional.
    ///
    /// Fails with `MalformedLayout` when not a single data row is found.
    pub fn observations(&self, rows: &[Vec<String>]) -> Result<Vec<Observation>> {
        let mut observations = Vec::new();
        let mut data_rows = 0usize;

        for row in rows {
            let Some(date) = self.cell(row, self.layout.date_column).and_then(|d| self.decimal_date(d))
            else {
                continue;
            };
            data_rows += 1;

            let Some(index) = self.cell(row, self.layout.index_column) else {
                continue;
            };
            observations.push(Observation::national(date, NOMINAL_HPI, index));

            if let Some(cpi) = self.cell(row, self.layout.cpi_column) {
                observations.push(Observation::national(date, CPI_SHILLER, cpi));
            }
        }

        if data_rows == 0 && !rows.is_empty() {
            return Err(PanelError::MalformedLayout(format!(
                "no row has a decimal year in column {} within {}-{}",
                self.layout.date_column, self.layout.min_year, self.layout.max_year
            )));
        }

        debug!(rows = rows.len(), data_rows, observations = observations.len(), "historical index adapted");
        Ok(observations)
    }

    fn cell(&self, row: &[String], idx: usize) -> Option<f64> {
        row.get(idx)?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    /// 1987.0 → Jan 1987, 1987.5 → Jul 1987
    fn decimal_date(&self, value: f64) -> Option<NaiveDate> {
        let year = value.floor();
        if year < self.layout.min_year as f64 || year > self.layout.max_year as f64 {
            return None;
        }
        let month = ((value - year) * 12.0).floor().clamp(0.0, 11.0) as u32 + 1;
        NaiveDate::from_ymd_opt(year as i32, month, 1)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn raw_event(state: &str, county: &str, property: &str) -> RawEventRow {
        RawEventRow {
            state_fips: Some(state.to_string()),
            cz_fips: Some(county.to_string()),
            cz_type: Some("C".to_string()),
            year: Some("2020".to_string()),
            event_type: Some("Hail".to_string()),
            damage_property: Some(property.to_string()),
            damage_crops: None,
            injuries_direct: Some("1".to_string()),
            injuries_indirect: Some("2".to_string()),
            deaths_direct: Some("0".to_string()),
            deaths_indirect: None,
        }
    }

    #[test]
    fn test_source_codes_round_trip() {
        for source in SourceId::ALL {
            assert_eq!(SourceId::from_code(source.code()), Some(source));
        }
        assert_eq!(SourceId::from_code("nope"), None);
    }

    #[test]
    fn test_national_adapter_maps_and_drops() {
        let config = PipelineConfig::default();
        let adapter = NationalSeriesAdapter::new(&config.fred_series);
        let points = vec![
            RawSeriesPoint::new("UNRATE", "2020-01-01", "3.5"),
            RawSeriesPoint::new("UNRATE", "2020-02-01", "."),
            RawSeriesPoint::new("MORTGAGE30US", "2020-01-02", "3.72"),
            RawSeriesPoint::new("XYZ", "2020-01-01", "1"),
            RawSeriesPoint::new("GS10", "not a date", "1.8"),
        ];

        let batch = adapter.observations(&points);

        assert_eq!(batch.observations.len(), 2);
        assert_eq!(batch.observations[0].variable, "unemployment_rate");
        assert_eq!(batch.observations[1].variable, "mortgage_rate_30yr");
        assert_eq!(batch.dropped.defaulted, 2);
        assert_eq!(batch.unknown_series, vec!["XYZ".to_string()]);
    }

    #[test]
    fn test_event_adapter_builds_records() {
        let batch = StormEventAdapter::new().records(&[raw_event("6", "37", "10K")], None);

        assert_eq!(batch.records.len(), 1);
        let record = &batch.records[0];
        assert_eq!(record.entity_key, "06037");
        assert_eq!(record.year, 2020);
        assert_eq!(record.property_loss, 10_000.0);
        assert_eq!(record.crop_loss, 0.0);
        assert_eq!(record.injuries, 3);
        assert_eq!(record.fatalities, 0);
        assert_eq!(record.category, "Hail");
        assert_eq!(batch.malformed.defaulted, 0);
    }

    #[test]
    fn test_event_adapter_drops_rows_without_key() {
        let mut no_state = raw_event("", "37", "1K");
        no_state.state_fips = None;
        let garbage = raw_event("XX", "37", "1K");

        let batch = StormEventAdapter::new().records(&[no_state, garbage, raw_event("1", "1", "0")], None);

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.missing_key, 2);
    }

    #[test]
    fn test_event_adapter_keeps_only_county_rows() {
        let mut zone = raw_event("6", "37", "1K");
        zone.cz_type = Some("Z".to_string());
        let mut untyped = raw_event("6", "38", "1K");
        untyped.cz_type = None;

        let batch = StormEventAdapter::new().records(&[zone, untyped], None);

        assert_eq!(batch.non_county, 1);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].entity_key, "06038");
    }

    #[test]
    fn test_event_adapter_counts_malformed_fields() {
        let mut row = raw_event("6", "37", "lots");
        row.injuries_direct = Some("several".to_string());

        let batch = StormEventAdapter::new().records(&[row], None);

        assert_eq!(batch.records[0].property_loss, 0.0);
        assert_eq!(batch.records[0].injuries, 2);
        assert_eq!(batch.malformed.defaulted, 2);
    }

    #[test]
    fn test_event_adapter_default_year() {
        let mut row = raw_event("6", "37", "1K");
        row.year = None;

        assert_eq!(StormEventAdapter::new().records(&[row.clone()], Some(1999)).records[0].year, 1999);

        let batch = StormEventAdapter::new().records(&[row], None);
        assert_eq!(batch.missing_year, 1);
        assert!(batch.records.is_empty());
    }

    fn wide_row(cells: &[(usize, &str)]) -> Vec<String> {
        let mut row = vec![String::new(); 16];
        for (idx, text) in cells {
            row[*idx] = text.to_string();
        }
        row
    }

    #[test]
    fn test_historical_adapter_reads_positions() {
        let adapter = HistoricalIndexAdapter::new(HistoricalLayout::default());
        let rows = vec![
            wide_row(&[(0, "Date"), (1, "Home Price Index"), (14, "CPI")]),
            wide_row(&[(0, "1999.5"), (1, "101.5"), (14, "166.2")]),
            wide_row(&[(0, "2000"), (1, "110.0")]),
            wide_row(&[(0, "2000.25"), (14, "170.1")]),
        ];

        let observations = adapter.observations(&rows).unwrap();

        assert_eq!(observations.len(), 3);
        assert_eq!(observations[0].variable, NOMINAL_HPI);
        assert_eq!(observations[0].timestamp, NaiveDate::from_ymd_opt(1999, 7, 1).unwrap());
        assert_eq!(observations[1].variable, CPI_SHILLER);
        assert_eq!(observations[1].value, 166.2);
        assert_eq!(observations[2].year(), 2000);
    }

    #[test]
    fn test_historical_adapter_rejects_unrecognised_layout() {
        let adapter = HistoricalIndexAdapter::new(HistoricalLayout::default());
        let rows = vec![wide_row(&[(0, "Date")]), wide_row(&[(0, "notes"), (1, "5")])];

        assert!(matches!(
            adapter.observations(&rows),
            Err(PanelError::MalformedLayout(_))
        ));
        assert!(adapter.observations(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_layout_validation() {
        assert!(HistoricalLayout::default().validate().is_ok());
        let clash = HistoricalLayout {
            cpi_column: 1,
            ..HistoricalLayout::default()
        };
        assert!(clash.validate().is_err());
    }
}
