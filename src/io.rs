// 📂 File Boundary - CSV readers and the three output writers
//
// Everything that touches the filesystem lives here. Errors carry the path
// through anyhow context; the pipeline itself never sees a file.

use crate::config::PipelineConfig;
use crate::pipeline::PipelineOutput;
use crate::provenance::{render_dictionary, RunManifest, PANEL_FILE_NAME};
use crate::sources::{RawEventRow, RawSeriesPoint};
use crate::table::EntityYearPanel;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DICTIONARY_FILE_NAME: &str = "data_dictionary.md";
pub const MANIFEST_FILE_NAME: &str = "panel_manifest.json";

// ============================================================================
// READERS
// ============================================================================

/// Storm event detail rows; extra columns are ignored.
///
/// Fields are decoded as UTF-8 when valid and as latin-1 otherwise, so an
/// accented narrative never costs the rest of the file.
pub fn load_events_csv(path: &Path) -> Result<Vec<RawEventRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open event CSV: {:?}", path))?;

    let headers = decode_record(
        rdr.byte_headers()
            .with_context(|| format!("Failed to read header of {:?}", path))?,
    );

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (line, result) in rdr.byte_records().enumerate() {
        let record =
            result.with_context(|| format!("Failed to read event row {} of {:?}", line + 1, path))?;
        match decode_record(&record).deserialize::<RawEventRow>(Some(&headers)) {
            Ok(row) => rows.push(row),
            Err(e) => {
                skipped += 1;
                debug!(line = line + 1, error = %e, "event row skipped");
            }
        }
    }

    if skipped > 0 {
        warn!(path = ?path, skipped, "unreadable event rows skipped");
    }
    info!(path = ?path, rows = rows.len(), "event rows read");
    Ok(rows)
}

/// UTF-8 where valid, latin-1 (one byte per char) otherwise
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

fn decode_record(record: &csv::ByteRecord) -> csv::StringRecord {
    record.iter().map(decode_field).collect()
}

/// Wide national series file: first column is the date, every other
/// header is a series id.
///
/// ```text
/// DATE,MORTGAGE30US,UNRATE
/// 2020-01-01,3.62,3.5
/// ```
pub fn load_national_csv(path: &Path) -> Result<Vec<RawSeriesPoint>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open national series CSV: {:?}", path))?;

    let series_ids: Vec<String> = rdr
        .headers()
        .with_context(|| format!("Failed to read header of {:?}", path))?
        .iter()
        .skip(1)
        .map(|h| h.trim().to_string())
        .collect();

    let mut points = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read record of {:?}", path))?;
        let Some(date) = record.get(0) else {
            continue;
        };
        for (idx, series_id) in series_ids.iter().enumerate() {
            // short rows leave later series empty
            let value = record.get(idx + 1).unwrap_or("");
            if value.trim().is_empty() {
                continue;
            }
            points.push(RawSeriesPoint::new(series_id, date, value));
        }
    }

    info!(path = ?path, series = series_ids.len(), points = points.len(), "national series read");
    Ok(points)
}

/// Untyped positional rows of the historical index sheet, header rows
/// and notes included
pub fn load_historical_csv(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open historical index CSV: {:?}", path))?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read record of {:?}", path))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    info!(path = ?path, rows = rows.len(), "historical rows read");
    Ok(rows)
}

// ============================================================================
// WRITERS
// ============================================================================

/// The panel as CSV: key columns first, missing cells empty
pub fn panel_to_csv(panel: &EntityYearPanel) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(panel.header())
        .context("Failed to write panel header")?;

    for row in panel.rows() {
        let mut record = Vec::with_capacity(row.values.len() + 2);
        record.push(row.entity_key.clone());
        record.push(row.year.to_string());
        record.extend(row.values.iter().map(|v| v.render()));
        wtr.write_record(&record)
            .with_context(|| format!("Failed to write panel row {} {}", row.entity_key, row.year))?;
    }

    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush panel CSV: {}", e.error()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFiles {
    pub panel: PathBuf,
    pub dictionary: PathBuf,
    pub manifest: PathBuf,
}

/// Write panel, data dictionary and manifest into `out_dir`
pub fn write_outputs(
    out_dir: &Path,
    output: &PipelineOutput,
    config: &PipelineConfig,
) -> Result<WrittenFiles> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    let files = WrittenFiles {
        panel: out_dir.join(PANEL_FILE_NAME),
        dictionary: out_dir.join(DICTIONARY_FILE_NAME),
        manifest: out_dir.join(MANIFEST_FILE_NAME),
    };

    let panel_bytes = panel_to_csv(&output.panel)?;
    fs::write(&files.panel, &panel_bytes)
        .with_context(|| format!("Failed to write panel: {:?}", files.panel))?;

    let dictionary = render_dictionary(&output.panel, &output.descriptors, config);
    fs::write(&files.dictionary, dictionary)
        .with_context(|| format!("Failed to write data dictionary: {:?}", files.dictionary))?;

    let manifest = RunManifest::new(&output.panel, &output.report, &panel_bytes);
    let manifest_json =
        serde_json::to_string_pretty(&manifest).context("Failed to serialize run manifest")?;
    fs::write(&files.manifest, manifest_json)
        .with_context(|| format!("Failed to write manifest: {:?}", files.manifest))?;

    info!(
        dir = ?out_dir,
        rows = output.panel.len(),
        sha256 = %manifest.panel_sha256,
        "outputs written"
    );
    Ok(files)
}

/// Read a manifest back, e.g. to compare two runs
pub fn load_manifest(path: &Path) -> Result<RunManifest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {:?}", path))?;
    serde_json::from_str(&content).context("Failed to parse manifest JSON")
}

// ============================================================================
// TESTS
// ============================================================================
