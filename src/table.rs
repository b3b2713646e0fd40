// 🧱 Data Model - observations, events and the two table shapes
// Tables are rebuilt from scratch on every run, nothing here is persisted

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Name of the entity key column in every flat output
pub const ENTITY_KEY: &str = "entity_key";

/// Name of the year column in every flat output
pub const YEAR: &str = "year";

// ============================================================================
// RAW INPUTS
// ============================================================================

/// One point-in-time measurement of a variable.
///
/// `entity_key` is `None` for national series (implicit single entity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub entity_key: Option<String>,
    pub timestamp: NaiveDate,
    pub variable: String,
    pub value: f64,
}

impl Observation {
    /// Observation of a national series
    pub fn national(timestamp: NaiveDate, variable: impl Into<String>, value: f64) -> Self {
        Observation {
            entity_key: None,
            timestamp,
            variable: variable.into(),
            value,
        }
    }

    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }
}

/// One raw disaster event, already keyed to a county.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// 5-character code: 2-digit region + 3-digit sub-region
    pub entity_key: String,
    pub year: i32,
    pub category: String,
    pub property_loss: f64,
    pub crop_loss: f64,
    pub injuries: u32,
    pub fatalities: u32,
}

// ============================================================================
// CELL VALUE
// ============================================================================

/// A cell of the entity-year panel.
///
/// `Missing` is the explicit absent marker: "no data for that year",
/// which is never the same thing as a legitimate zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
    Category(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the cell (ints widen to floats)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Category(s) => Some(s),
            _ => None,
        }
    }

    /// Text used in flat (CSV) output; missing renders as an empty field
    pub fn render(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(s) | Value::Category(s) => s.clone(),
        }
    }
}

impl From<Option<f64>> for Value {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Value::Float(v),
            _ => Value::Missing,
        }
    }
}

// ============================================================================
// ANNUAL SERIES TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualRow {
    pub year: i32,
    /// Aligned with the owning table's columns; `None` = absent
    pub values: Vec<Option<f64>>,
}

/// One row per year, years unique and ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualSeriesTable {
    pub source_id: String,
    columns: Vec<String>,
    rows: Vec<AnnualRow>,
}

impl AnnualSeriesTable {
    pub fn new(source_id: impl Into<String>) -> Self {
        AnnualSeriesTable {
            source_id: source_id.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[AnnualRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn years(&self) -> Vec<i32> {
        self.rows.iter().map(|r| r.year).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of `name`, appending an all-absent column when new
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.values.push(None);
        }
        self.columns.len() - 1
    }

    pub fn row(&self, year: i32) -> Option<&AnnualRow> {
        self.rows
            .binary_search_by_key(&year, |r| r.year)
            .ok()
            .map(|idx| &self.rows[idx])
    }

    pub fn get(&self, year: i32, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.row(year).and_then(|r| r.values[idx])
    }

    /// Set a cell, creating the year row and the column as needed
    pub fn set(&mut self, year: i32, column: &str, value: Option<f64>) {
        let col = self.ensure_column(column);
        let width = self.columns.len();
        let pos = match self.rows.binary_search_by_key(&year, |r| r.year) {
            Ok(pos) => pos,
            Err(pos) => {
                self.rows.insert(
                    pos,
                    AnnualRow {
                        year,
                        values: vec![None; width],
                    },
                );
                pos
            }
        };
        self.rows[pos].values[col] = value;
    }

    /// `(year, value)` pairs of one column in year order
    pub fn column_values(&self, column: &str) -> Vec<(i32, Option<f64>)> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().map(|r| (r.year, r.values[idx])).collect(),
            None => Vec::new(),
        }
    }

    /// Apply `f` to every present value
    pub fn map_values(&mut self, f: impl Fn(f64) -> f64) {
        for row in &mut self.rows {
            for v in row.values.iter_mut().flatten() {
                *v = f(*v);
            }
        }
    }
}

// ============================================================================
// ENTITY-YEAR PANEL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub entity_key: String,
    pub year: i32,
    /// Aligned with the owning panel's columns
    pub values: Vec<Value>,
}

/// `(entity_key, year)` rows plus an ordered set of value columns.
///
/// Key uniqueness only holds after cleaning; before that duplicates are
/// kept so the cleaner can count them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityYearPanel {
    columns: Vec<String>,
    rows: Vec<PanelRow>,
}

impl EntityYearPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        EntityYearPanel {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Value columns, without the two key columns
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Full flat header: key columns first, then value columns
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![ENTITY_KEY.to_string(), YEAR.to_string()];
        header.extend(self.columns.iter().cloned());
        header
    }

    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [PanelRow] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of `name`, appending an all-missing column when new
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.values.push(Value::Missing);
        }
        self.columns.len() - 1
    }

    /// Append a row; short value vectors are padded with `Missing`
    pub fn push_row(&mut self, entity_key: impl Into<String>, year: i32, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Missing);
        self.rows.push(PanelRow {
            entity_key: entity_key.into(),
            year,
            values,
        });
    }

    /// Append a row from named cells, adding unknown columns on the way
    pub fn insert_row<'a>(
        &mut self,
        entity_key: impl Into<String>,
        year: i32,
        cells: impl IntoIterator<Item = (&'a str, Value)>,
    ) {
        let cells: Vec<(usize, Value)> = cells
            .into_iter()
            .map(|(name, value)| (self.ensure_column(name), value))
            .collect();
        let mut values = vec![Value::Missing; self.columns.len()];
        for (idx, value) in cells {
            values[idx] = value;
        }
        self.push_row(entity_key, year, values);
    }

    /// Cell by row index and column name; unknown columns read as missing
    pub fn value(&self, row: usize, column: &str) -> &Value {
        static MISSING: Value = Value::Missing;
        match (self.rows.get(row), self.column_index(column)) {
            (Some(r), Some(idx)) => &r.values[idx],
            _ => &MISSING,
        }
    }

    /// All values of one column in row order
    pub fn column(&self, name: &str) -> Vec<&Value> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().map(|r| &r.values[idx]).collect(),
            None => Vec::new(),
        }
    }

    pub fn unique_entities(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.entity_key.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn unique_years(&self) -> usize {
        self.rows.iter().map(|r| r.year).collect::<BTreeSet<_>>().len()
    }

    pub fn year_range(&self) -> Option<(i32, i32)> {
        let min = self.rows.iter().map(|r| r.year).min()?;
        let max = self.rows.iter().map(|r| r.year).max()?;
        Some((min, max))
    }

    /// Same columns, new row set
    pub fn with_rows(&self, rows: Vec<PanelRow>) -> Self {
        EntityYearPanel {
            columns: self.columns.clone(),
            rows,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
