// 🔗 Multi-Source Merger - left joins of year-keyed national tables
//
// base (entity × year) ← reference₁ on year ← reference₂ on year ← ...
//
// Every base row survives. Years a reference does not cover get the
// explicit Missing marker, never a number.

use crate::error::{PanelError, Result};
use crate::table::{AnnualSeriesTable, EntityYearPanel, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// What one reference contributed to the join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceJoin {
    pub source_id: String,
    pub columns_added: Vec<String>,
    /// Columns already present in the running result; the earlier one wins
    pub columns_skipped: Vec<String>,
    pub matched_rows: usize,
    /// Base years this reference has no row for
    pub unmatched_years: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub panel: EntityYearPanel,
    pub joins: Vec<ReferenceJoin>,
    /// References that were empty and therefore not joined
    pub missing_sources: Vec<String>,
}

impl MergeOutcome {
    pub fn is_complete(&self) -> bool {
        self.missing_sources.is_empty()
    }
}

pub struct MultiSourceMerger;

impl MultiSourceMerger {
    pub fn new() -> Self {
        MultiSourceMerger
    }

    /// Left-join `base` against each reference in the given order.
    ///
    /// Each reference joins the running result. An empty reference is
    /// skipped and listed in `missing_sources`; an empty base fails with
    /// `SourceUnavailable` because there is nothing to join onto.
    pub fn merge(
        &self,
        base: &EntityYearPanel,
        references: &[AnnualSeriesTable],
    ) -> Result<MergeOutcome> {
        if base.is_empty() {
            return Err(PanelError::source_unavailable("base panel"));
        }

        let mut panel = base.clone();
        let mut joins = Vec::new();
        let mut missing_sources = Vec::new();

        for reference in references {
            if reference.is_empty() {
                warn!(source = %reference.source_id, "reference table empty, not joined");
                missing_sources.push(reference.source_id.clone());
                continue;
            }

            let join = self.join_one(&mut panel, reference);
            info!(
                source = %reference.source_id,
                rows = panel.len(),
                columns = panel.header().len(),
                matched = join.matched_rows,
                "after merge"
            );
            if !join.columns_skipped.is_empty() {
                warn!(
                    source = %reference.source_id,
                    columns = ?join.columns_skipped,
                    "column name collision, keeping earlier column"
                );
            }
            joins.push(join);
        }

        Ok(MergeOutcome {
            panel,
            joins,
            missing_sources,
        })
    }

    fn join_one(&self, panel: &mut EntityYearPanel, reference: &AnnualSeriesTable) -> ReferenceJoin {
        let mut columns_added = Vec::new();
        let mut columns_skipped = Vec::new();
        // (reference column index, panel column index)
        let mut mapping = Vec::new();

        for (ref_idx, name) in reference.columns().iter().enumerate() {
            if panel.has_column(name) {
                columns_skipped.push(name.clone());
                continue;
            }
            let panel_idx = panel.ensure_column(name);
            columns_added.push(name.clone());
            mapping.push((ref_idx, panel_idx));
        }

        let mut matched_rows = 0;
        let mut unmatched_years = BTreeSet::new();

        for row in panel.rows_mut() {
            match reference.row(row.year) {
                Some(ref_row) => {
                    matched_rows += 1;
                    for &(ref_idx, panel_idx) in &mapping {
                        row.values[panel_idx] = Value::from(ref_row.values[ref_idx]);
                    }
                }
                None => {
                    unmatched_years.insert(row.year);
                    for &(_, panel_idx) in &mapping {
                        row.values[panel_idx] = Value::Missing;
                    }
                }
            }
        }

        ReferenceJoin {
            source_id: reference.source_id.clone(),
            columns_added,
            columns_skipped,
            matched_rows,
            unmatched_years: unmatched_years.into_iter().collect(),
        }
    }
}

impl Default for MultiSourceMerger {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
