// 🔍 Deduplication Engine - one row per (entity_key, year)
//
// Policy: first row in current order wins. No attempt is made to
// reconcile the values of the dropped rows; every drop is counted.

use crate::table::{EntityYearPanel, PanelRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// DUPLICATE GROUP
// ============================================================================

/// All rows sharing one (entity_key, year) key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub entity_key: String,
    pub year: i32,

    /// Row index that was retained
    pub kept_index: usize,

    /// Row indices that were dropped, in input order
    pub dropped_indices: Vec<usize>,
}

impl DuplicateGroup {
    pub fn reason(&self) -> String {
        format!(
            "Duplicate key: {} | {} | kept row {}, dropped {:?}",
            self.entity_key, self.year, self.kept_index, self.dropped_indices
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationReport {
    pub groups: Vec<DuplicateGroup>,
    pub rows_dropped: usize,
}

impl DeduplicationReport {
    pub fn has_duplicates(&self) -> bool {
        self.rows_dropped > 0
    }
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

pub struct DeduplicationEngine;

impl DeduplicationEngine {
    pub fn new() -> Self {
        DeduplicationEngine
    }

    /// Find every key that occurs more than once, ordered by first occurrence
    pub fn find_duplicates(&self, rows: &[PanelRow]) -> Vec<DuplicateGroup> {
        let mut first_seen: HashMap<(&str, i32), usize> = HashMap::new();
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        // key → position in `groups`
        let mut group_of: HashMap<(&str, i32), usize> = HashMap::new();

        for (i, row) in rows.iter().enumerate() {
            let key = (row.entity_key.as_str(), row.year);
            let Some(kept) = first_seen.get(&key).copied() else {
                first_seen.insert(key, i);
                continue;
            };

            match group_of.get(&key) {
                Some(&g) => groups[g].dropped_indices.push(i),
                None => {
                    group_of.insert(key, groups.len());
                    groups.push(DuplicateGroup {
                        entity_key: row.entity_key.clone(),
                        year: row.year,
                        kept_index: kept,
                        dropped_indices: vec![i],
                    });
                }
            }
        }

        groups
    }

    /// Keep the first row of every key, preserving input order
    pub fn first_wins(&self, panel: &EntityYearPanel) -> (EntityYearPanel, DeduplicationReport) {
        let groups = self.find_duplicates(panel.rows());
        let mut dropped = vec![false; panel.len()];
        for group in &groups {
            for &i in &group.dropped_indices {
                dropped[i] = true;
            }
        }

        let rows: Vec<PanelRow> = panel
            .rows()
            .iter()
            .zip(&dropped)
            .filter(|(_, d)| !**d)
            .map(|(row, _)| row.clone())
            .collect();

        let report = DeduplicationReport {
            rows_dropped: dropped.iter().filter(|&&d| d).count(),
            groups,
        };

        (panel.with_rows(rows), report)
    }
}

impl Default for DeduplicationEngine {
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
    use crate::table::Value;

    fn panel_with(rows: &[(&str, i32, i64)]) -> EntityYearPanel {
        let mut panel = EntityYearPanel::with_columns(["event_count"]);
        for (key, year, count) in rows {
            panel.push_row(*key, *year, vec![Value::Int(*count)]);
        }
        panel
    }

    #[test]
    fn test_no_duplicates() {
        let engine = DeduplicationEngine::new();
        let panel = panel_with(&[("06037", 2020, 1), ("06037", 2021, 2), ("01001", 2020, 3)]);

        let (deduped, report) = engine.first_wins(&panel);

        assert_eq!(deduped, panel);
        assert!(!report.has_duplicates());
        assert!(report.groups.is_empty());
    }

    #[test]
    fn test_first_row_wins() {
        let engine = DeduplicationEngine::new();
        let panel = panel_with(&[("06037", 2020, 1), ("01001", 2020, 5), ("06037", 2020, 9)]);

        let (deduped, report) = engine.first_wins(&panel);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped.value(0, "event_count"), &Value::Int(1));
        assert_eq!(report.rows_dropped, 1);
        assert_eq!(report.groups[0].kept_index, 0);
        assert_eq!(report.groups[0].dropped_indices, vec![2]);
    }

    #[test]
    fn test_triplicate_counts_two_drops() {
        let engine = DeduplicationEngine::new();
        let panel = panel_with(&[
            ("48201", 2001, 7),
            ("48201", 2001, 8),
            ("06037", 2001, 1),
            ("48201", 2001, 9),
        ]);

        let groups = engine.find_duplicates(panel.rows());
        let (deduped, report) = engine.first_wins(&panel);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].dropped_indices, vec![1, 3]);
        assert_eq!(report.rows_dropped, 2);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped.value(0, "event_count"), &Value::Int(7));
        assert!(report.groups[0].reason().contains("48201"));
    }

    #[test]
    fn test_same_entity_different_year_is_not_duplicate() {
        let engine = DeduplicationEngine::new();
        let panel = panel_with(&[("06037", 2020, 1), ("06037", 2019, 1)]);

        assert!(engine.find_duplicates(panel.rows()).is_empty());
    }
}
