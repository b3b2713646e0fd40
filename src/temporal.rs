// ⏰ Temporal Aggregator - sub-annual and per-event data onto the year grain
//
// Rates and index levels are averaged (summing a rate means nothing).
// Flows (counts, losses, injuries, fatalities) are summed per entity-year.
// Values are summed in sorted order, so reruns are bit-identical whatever
// order the rows arrived in. Annual tables stay at full precision until
// `round_table`; entity-year sums are rounded to PRECISION on the way out.

use crate::table::{AnnualSeriesTable, EntityYearPanel, EventRecord, Observation, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Decimal places kept on every float written to the panel
pub const PRECISION: i32 = 4;

// Entity-year columns produced from event records
pub const EVENT_COUNT: &str = "event_count";
pub const TOTAL_DAMAGE: &str = "total_damage";
pub const PROPERTY_DAMAGE: &str = "property_damage";
pub const CROP_DAMAGE: &str = "crop_damage";
pub const TOTAL_INJURIES: &str = "total_injuries";
pub const TOTAL_FATALITIES: &str = "total_fatalities";

pub const EVENT_COLUMNS: [&str; 6] = [
    EVENT_COUNT,
    TOTAL_DAMAGE,
    PROPERTY_DAMAGE,
    CROP_DAMAGE,
    TOTAL_INJURIES,
    TOTAL_FATALITIES,
];

// ============================================================================
// REDUCTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Point-in-time quantities: rates, index levels
    Mean,
    /// Flows: counts and amounts
    Sum,
}

impl Reduction {
    /// Reduce a group of values; `None` for an empty group
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let total = ordered_sum(values);
        match self {
            Reduction::Sum => Some(total),
            Reduction::Mean => Some(total / values.len() as f64),
        }
    }
}

/// Sum independent of input order
fn ordered_sum(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.iter().sum()
}

/// Round to `places` decimals; negative zero is normalised to zero
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct TemporalAggregator {
    precision: i32,
}

impl TemporalAggregator {
    pub fn new() -> Self {
        TemporalAggregator {
            precision: PRECISION,
        }
    }

    /// Annualize a national series with one operator for every variable
    pub fn aggregate(
        &self,
        source_id: &str,
        observations: &[Observation],
        reduction: Reduction,
    ) -> AnnualSeriesTable {
        self.aggregate_with(source_id, observations, |_| reduction)
    }

    /// Annualize a national series choosing the operator per variable.
    ///
    /// Columns appear in order of first appearance of each variable.
    /// Non-finite values are skipped; a year with no usable value for a
    /// variable leaves that cell absent. Cells are unrounded until
    /// `round_table` runs.
    pub fn aggregate_with(
        &self,
        source_id: &str,
        observations: &[Observation],
        reduction_for: impl Fn(&str) -> Reduction,
    ) -> AnnualSeriesTable {
        let mut variables: Vec<&str> = Vec::new();
        let mut groups: BTreeMap<i32, BTreeMap<usize, Vec<f64>>> = BTreeMap::new();
        let mut keyed = 0usize;
        let mut skipped = 0usize;

        for obs in observations {
            if obs.entity_key.is_some() {
                keyed += 1;
            }
            let idx = match variables.iter().position(|v| *v == obs.variable) {
                Some(idx) => idx,
                None => {
                    variables.push(&obs.variable);
                    variables.len() - 1
                }
            };
            let group = groups.entry(obs.year()).or_default().entry(idx).or_default();
            if obs.value.is_finite() {
                group.push(obs.value);
            } else {
                skipped += 1;
            }
        }

        if keyed > 0 {
            warn!(source = source_id, keyed, "entity keys ignored on national series");
        }
        if skipped > 0 {
            debug!(source = source_id, skipped, "non-finite observations skipped");
        }

        let mut table = AnnualSeriesTable::new(source_id);
        for variable in &variables {
            table.ensure_column(variable);
        }
        for (year, by_variable) in groups {
            for (idx, values) in by_variable {
                let variable = variables[idx];
                table.set(year, variable, reduction_for(variable).reduce(&values));
            }
        }

        debug!(
            source = source_id,
            observations = observations.len(),
            years = table.len(),
            "annualized"
        );
        table
    }

    /// Sum event records per (entity, year) and count the rows behind each.
    ///
    /// Output is sorted by (entity_key, year) and carries EVENT_COLUMNS.
    pub fn aggregate_entity(&self, events: &[EventRecord]) -> EntityYearPanel {
        #[derive(Default)]
        struct Acc {
            count: i64,
            property: Vec<f64>,
            crop: Vec<f64>,
            total: Vec<f64>,
            injuries: i64,
            fatalities: i64,
        }

        let mut groups: BTreeMap<(&str, i32), Acc> = BTreeMap::new();
        for event in events {
            let acc = groups
                .entry((event.entity_key.as_str(), event.year))
                .or_default();
            acc.count += 1;
            acc.property.push(event.property_loss);
            acc.crop.push(event.crop_loss);
            acc.total.push(event.property_loss + event.crop_loss);
            acc.injuries += i64::from(event.injuries);
            acc.fatalities += i64::from(event.fatalities);
        }

        let mut panel = EntityYearPanel::with_columns(EVENT_COLUMNS);
        for ((entity_key, year), acc) in groups {
            let round = |values: &[f64]| Value::Float(round_to(ordered_sum(values), self.precision));
            panel.push_row(
                entity_key,
                year,
                vec![
                    Value::Int(acc.count),
                    round(&acc.total),
                    round(&acc.property),
                    round(&acc.crop),
                    Value::Int(acc.injuries),
                    Value::Int(acc.fatalities),
                ],
            );
        }

        debug!(events = events.len(), entity_years = panel.len(), "events aggregated");
        panel
    }

    /// Round every cell to PRECISION once the derived columns are in place
    pub fn round_table(&self, table: &mut AnnualSeriesTable) {
        let precision = self.precision;
        table.map_values(|v| round_to(v, precision));
    }

    /// Year-over-year percentage change: `(v[t] - v[t-1]) / v[t-1] * 100`.
    ///
    /// Absent when year t-1 has no row or value, or when v[t-1] is zero.
    pub fn pct_change(&self, table: &mut AnnualSeriesTable, source: &str, target: &str) {
        self.derive_from_previous(table, source, target, |current, previous| {
            if previous == 0.0 {
                None
            } else {
                Some((current - previous) / previous * 100.0)
            }
        });
    }

    /// Year-over-year difference, for variables that already are rates
    pub fn first_difference(&self, table: &mut AnnualSeriesTable, source: &str, target: &str) {
        self.derive_from_previous(table, source, target, |current, previous| {
            Some(current - previous)
        });
    }

    fn derive_from_previous(
        &self,
        table: &mut AnnualSeriesTable,
        source: &str,
        target: &str,
        f: impl Fn(f64, f64) -> Option<f64>,
    ) {
        let series: BTreeMap<i32, Option<f64>> = table.column_values(source).into_iter().collect();
        if series.is_empty() {
            warn!(source, target, "derived column skipped: source column absent");
            return;
        }

        table.ensure_column(target);
        for (&year, &current) in &series {
            let previous = series.get(&(year - 1)).copied().flatten();
            let derived = match (current, previous) {
                (Some(c), Some(p)) => f(c, p).filter(|v| v.is_finite()),
                _ => None,
            };
            table.set(year, target, derived);
        }
    }

    /// Deflate a nominal index: `nominal / cpi * cpi_base`.
    ///
    /// `cpi_base` is the CPI of `base_year`, or the mean CPI of the table
    /// when that year is absent.
    pub fn rebase_real(
        &self,
        table: &mut AnnualSeriesTable,
        nominal: &str,
        cpi: &str,
        target: &str,
        base_year: i32,
    ) {
        let cpi_values = table.column_values(cpi);
        let present: Vec<f64> = cpi_values.iter().filter_map(|(_, v)| *v).collect();

        let cpi_base = match table.get(base_year, cpi) {
            Some(base) => Some(base),
            None => {
                if !present.is_empty() {
                    warn!(base_year, "base-year CPI absent, using mean CPI");
                }
                Reduction::Mean.reduce(&present)
            }
        };

        let nominal_values: BTreeMap<i32, Option<f64>> =
            table.column_values(nominal).into_iter().collect();

        table.ensure_column(target);
        for (year, cpi_value) in cpi_values {
            let real = match (nominal_values.get(&year).copied().flatten(), cpi_value, cpi_base) {
                (Some(n), Some(c), Some(base)) if c != 0.0 => Some(n / c * base),
                _ => None,
            };
            table.set(year, target, real);
        }
    }
}

impl Default for TemporalAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(date: &str, variable: &str, value: f64) -> Observation {
        Observation::national(
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            variable,
            value,
        )
    }

    fn event(key: &str, year: i32, property: f64, crop: f64, injuries: u32, fatalities: u32) -> EventRecord {
        EventRecord {
            entity_key: key.to_string(),
            year,
            category: "Flood".to_string(),
            property_loss: property,
            crop_loss: crop,
            injuries,
            fatalities,
        }
    }

    #[test]
    fn test_mean_reduction_per_year() {
        let aggregator = TemporalAggregator::new();
        let observations = vec![
            obs("2020-01-01", "unemployment_rate", 3.5),
            obs("2020-02-01", "unemployment_rate", 4.5),
            obs("2020-03-01", "unemployment_rate", 4.4),
            obs("2021-01-01", "unemployment_rate", 6.0),
        ];

        let mut table = aggregator.aggregate("fred", &observations, Reduction::Mean);
        aggregator.round_table(&mut table);

        assert_eq!(table.years(), vec![2020, 2021]);
        assert_eq!(table.get(2020, "unemployment_rate"), Some(4.1333));
        assert_eq!(table.get(2021, "unemployment_rate"), Some(6.0));
    }

    #[test]
    fn test_per_variable_reduction() {
        let aggregator = TemporalAggregator::new();
        let observations = vec![
            obs("2020-01-01", "rate", 2.0),
            obs("2020-06-01", "rate", 4.0),
            obs("2020-01-01", "starts", 10.0),
            obs("2020-06-01", "starts", 15.0),
        ];

        let table = aggregator.aggregate_with("fred", &observations, |v| {
            if v == "starts" {
                Reduction::Sum
            } else {
                Reduction::Mean
            }
        });

        assert_eq!(table.columns(), &["rate", "starts"]);
        assert_eq!(table.get(2020, "rate"), Some(3.0));
        assert_eq!(table.get(2020, "starts"), Some(25.0));
    }

    #[test]
    fn test_aggregation_ignores_row_order() {
        let aggregator = TemporalAggregator::new();
        let values = [0.1, 0.7, 1e-3, 123.456789, 0.2, 3.3333, 9.87654321];
        let forward: Vec<Observation> = values
            .iter()
            .enumerate()
            .map(|(i, v)| obs(&format!("2019-{:02}-01", i + 1), "x", *v))
            .collect();
        let mut backward = forward.clone();
        backward.reverse();
        let mut rotated = forward.clone();
        rotated.rotate_left(3);

        for reduction in [Reduction::Mean, Reduction::Sum] {
            let a = aggregator.aggregate("s", &forward, reduction);
            let b = aggregator.aggregate("s", &backward, reduction);
            let c = aggregator.aggregate("s", &rotated, reduction);
            assert_eq!(a, b);
            assert_eq!(a, c);
        }
    }

    #[test]
    fn test_year_without_usable_value_is_absent() {
        let aggregator = TemporalAggregator::new();
        let observations = vec![
            obs("2020-01-01", "a", 1.0),
            obs("2021-01-01", "b", 2.0),
            obs("2021-02-01", "a", f64::NAN),
        ];

        let table = aggregator.aggregate("s", &observations, Reduction::Mean);

        assert_eq!(table.get(2020, "b"), None);
        assert_eq!(table.get(2021, "a"), None);
        assert_eq!(table.get(2021, "b"), Some(2.0));
    }

    #[test]
    fn test_pct_change_requires_preceding_year() {
        let aggregator = TemporalAggregator::new();
        let mut table = AnnualSeriesTable::new("fred");
        table.set(2000, "hpi", Some(100.0));
        table.set(2001, "hpi", Some(110.0));
        table.set(2003, "hpi", Some(121.0));

        aggregator.pct_change(&mut table, "hpi", "hpi_yoy");

        assert_eq!(table.get(2000, "hpi_yoy"), None);
        assert_eq!(table.get(2001, "hpi_yoy"), Some(10.0));
        // 2002 missing: 2003 has no preceding year
        assert_eq!(table.get(2003, "hpi_yoy"), None);
    }

    #[test]
    fn test_pct_change_from_zero_is_absent() {
        let aggregator = TemporalAggregator::new();
        let mut table = AnnualSeriesTable::new("fred");
        table.set(2000, "x", Some(0.0));
        table.set(2001, "x", Some(5.0));

        aggregator.pct_change(&mut table, "x", "x_yoy");

        assert_eq!(table.get(2001, "x_yoy"), None);
    }

    #[test]
    fn test_first_difference() {
        let aggregator = TemporalAggregator::new();
        let mut table = AnnualSeriesTable::new("fred");
        table.set(2019, "mortgage_rate_30yr", Some(3.94));
        table.set(2020, "mortgage_rate_30yr", Some(3.11));
        table.set(2021, "mortgage_rate_30yr", Some(2.96));

        aggregator.first_difference(&mut table, "mortgage_rate_30yr", "mortgage_rate_chg");
        aggregator.round_table(&mut table);

        assert_eq!(table.get(2019, "mortgage_rate_chg"), None);
        assert_eq!(table.get(2020, "mortgage_rate_chg"), Some(-0.83));
        assert_eq!(table.get(2021, "mortgage_rate_chg"), Some(-0.15));
    }

    #[test]
    fn test_derived_column_on_missing_source_is_noop() {
        let aggregator = TemporalAggregator::new();
        let mut table = AnnualSeriesTable::new("fred");
        table.set(2000, "x", Some(1.0));

        aggregator.pct_change(&mut table, "absent", "absent_yoy");

        assert_eq!(table.columns(), &["x"]);
    }

    #[test]
    fn test_rebase_real_uses_base_year_cpi() {
        let aggregator = TemporalAggregator::new();
        let mut table = AnnualSeriesTable::new("shiller");
        table.set(2000, "nominal_hpi", Some(120.0));
        table.set(2000, "cpi_shiller", Some(170.0));
        table.set(2010, "nominal_hpi", Some(180.0));
        table.set(2010, "cpi_shiller", Some(220.0));

        aggregator.rebase_real(&mut table, "nominal_hpi", "cpi_shiller", "real_hpi", 2000);
        aggregator.round_table(&mut table);

        assert_eq!(table.get(2000, "real_hpi"), Some(120.0));
        assert_eq!(table.get(2010, "real_hpi"), Some(139.0909));
    }

    #[test]
    fn test_rebase_real_falls_back_to_mean_cpi() {
        let aggregator = TemporalAggregator::new();
        let mut table = AnnualSeriesTable::new("shiller");
        table.set(1990, "nominal_hpi", Some(100.0));
        table.set(1990, "cpi_shiller", Some(100.0));
        table.set(1991, "nominal_hpi", Some(100.0));
        table.set(1991, "cpi_shiller", Some(300.0));

        aggregator.rebase_real(&mut table, "nominal_hpi", "cpi_shiller", "real_hpi", 2000);
        aggregator.round_table(&mut table);

        assert_eq!(table.get(1990, "real_hpi"), Some(200.0));
        assert_eq!(table.get(1991, "real_hpi"), Some(66.6667));
    }

    #[test]
    fn test_derived_columns_use_unrounded_values() {
        let aggregator = TemporalAggregator::new();
        let observations = vec![
            obs("2000-01-01", "nominal_hpi", 100.00004),
            obs("2000-01-01", "cpi_shiller", 1.0),
            obs("2000-01-01", "x", 0.00004),
            obs("2001-01-01", "nominal_hpi", 100.00004),
            obs("2001-01-01", "cpi_shiller", 0.5),
            obs("2001-01-01", "x", 0.00008),
        ];

        let mut table = aggregator.aggregate("shiller", &observations, Reduction::Mean);
        aggregator.rebase_real(&mut table, "nominal_hpi", "cpi_shiller", "real_hpi", 2000);
        aggregator.pct_change(&mut table, "x", "x_yoy");
        aggregator.round_table(&mut table);

        // rounding first would give 200.0 and an absent change from 0.0
        assert_eq!(table.get(2001, "real_hpi"), Some(200.0001));
        assert_eq!(table.get(2001, "x_yoy"), Some(100.0));
        assert_eq!(table.get(2001, "x"), Some(0.0001));
    }

    #[test]
    fn test_aggregate_entity_sums_and_counts() {
        let aggregator = TemporalAggregator::new();
        let events = vec![
            event("06037", 2020, 1000.0, 500.0, 1, 0),
            event("06037", 2020, 2500.0, 0.0, 0, 2),
            event("01001", 2020, 0.0, 0.0, 0, 0),
            event("06037", 2019, 10.0, 0.0, 3, 1),
        ];

        let panel = aggregator.aggregate_entity(&events);

        assert_eq!(panel.len(), 3);
        let keys: Vec<(&str, i32)> = panel
            .rows()
            .iter()
            .map(|r| (r.entity_key.as_str(), r.year))
            .collect();
        assert_eq!(keys, vec![("01001", 2020), ("06037", 2019), ("06037", 2020)]);

        assert_eq!(panel.value(2, EVENT_COUNT), &Value::Int(2));
        assert_eq!(panel.value(2, TOTAL_DAMAGE), &Value::Float(4000.0));
        assert_eq!(panel.value(2, PROPERTY_DAMAGE), &Value::Float(3500.0));
        assert_eq!(panel.value(2, CROP_DAMAGE), &Value::Float(500.0));
        assert_eq!(panel.value(2, TOTAL_INJURIES), &Value::Int(1));
        assert_eq!(panel.value(2, TOTAL_FATALITIES), &Value::Int(2));
        assert_eq!(panel.value(0, EVENT_COUNT), &Value::Int(1));
    }

    #[test]
    fn test_aggregate_entity_ignores_event_order() {
        let aggregator = TemporalAggregator::new();
        let forward = vec![
            event("06037", 2020, 0.1, 0.7, 1, 0),
            event("06037", 2020, 0.2, 1e-3, 0, 1),
            event("01001", 2020, 123.456789, 0.0, 2, 0),
            event("06037", 2020, 0.7, 3.3333, 0, 0),
            event("01001", 2020, 9.87654321, 0.2, 0, 3),
            event("06037", 2019, 0.30001, 0.1, 1, 1),
            event("06037", 2020, 1e-5, 0.4, 0, 0),
        ];
        let mut backward = forward.clone();
        backward.reverse();
        let mut rotated = forward.clone();
        rotated.rotate_left(3);

        let a = aggregator.aggregate_entity(&forward);
        assert_eq!(a, aggregator.aggregate_entity(&backward));
        assert_eq!(a, aggregator.aggregate_entity(&rotated));
        assert_eq!(a.value(2, EVENT_COUNT), &Value::Int(4));
        assert_eq!(a.value(2, PROPERTY_DAMAGE), &Value::Float(1.0));
    }

    #[test]
    fn test_aggregate_entity_empty_input() {
        let panel = TemporalAggregator::new().aggregate_entity(&[]);
        assert!(panel.is_empty());
        assert_eq!(panel.columns().len(), EVENT_COLUMNS.len());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(-0.00001, 4), 0.0);
        assert!(round_to(-0.00001, 4).is_sign_positive());
    }
}
