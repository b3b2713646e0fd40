// Housing Disasters Panel - Core Library
// Builds the county × year panel used by the CLI and the integration tests

pub mod table;
pub mod parser;         // Magnitude strings and numeric coercion
pub mod spatial;        // Canonical county keys
pub mod temporal;       // Annualization and year-over-year changes
pub mod merge;          // Left joins of national tables onto the panel
pub mod deduplication;  // First-wins duplicate resolution
pub mod cleaner;        // Window, derived columns, dedup, sort
pub mod provenance;     // Column registry, data dictionary, run manifest
pub mod data_quality;   // Verification summary
pub mod sources;        // Source adapters
pub mod config;
pub mod pipeline;
pub mod io;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use table::{
    AnnualSeriesTable, EntityYearPanel, EventRecord, Observation, PanelRow, Value,
    ENTITY_KEY, YEAR,
};
pub use parser::{parse_magnitude, try_parse_magnitude, FieldParser, ParseStats};
pub use spatial::{build_key, build_key_from_raw};
pub use temporal::{Reduction, TemporalAggregator};
pub use merge::{MergeOutcome, MultiSourceMerger, ReferenceJoin};
pub use deduplication::{DeduplicationEngine, DeduplicationReport, DuplicateGroup};
pub use cleaner::{clean, CleanOutcome, CleanReport, Intensity, PanelCleaner};
pub use provenance::{
    describe, ColumnDefinition, ColumnDescriptor, ColumnRegistry, RunManifest, SemanticType,
};
pub use data_quality::PanelSummary;
pub use sources::{
    HistoricalIndexAdapter, HistoricalLayout, NationalSeriesAdapter, RawEventRow,
    RawSeriesPoint, SourceId, StormEventAdapter,
};
pub use config::{DerivedChange, PipelineConfig};
pub use pipeline::{PanelPipeline, PipelineInputs, PipelineOutput, RunReport};
pub use error::{PanelError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
