// End-to-end: public API from raw tables and from files on disk

use disaster_panel::cleaner::{DISASTER_INTENSITY, LOG_TOTAL_DAMAGE};
use disaster_panel::io;
use disaster_panel::{
    clean, logging, AnnualSeriesTable, EntityYearPanel, MultiSourceMerger, PanelPipeline,
    PipelineConfig, PipelineInputs, Value,
};
use std::fs;

fn base_panel(year: i32) -> EntityYearPanel {
    let mut panel = EntityYearPanel::new();
    panel.insert_row(
        "06037",
        year,
        [
            ("event_count", Value::Int(3)),
            ("total_damage", Value::Float(5000.0)),
        ],
    );
    panel
}

fn mortgage_reference() -> AnnualSeriesTable {
    let mut table = AnnualSeriesTable::new("fred");
    table.set(2020, "mortgage_rate", Some(3.1));
    table
}

#[test]
fn test_merge_then_clean_single_county_year() {
    let merged = MultiSourceMerger::new()
        .merge(&base_panel(2020), &[mortgage_reference()])
        .unwrap();
    let cleaned = clean(&merged.panel, 2020, 2020).panel;

    assert_eq!(cleaned.len(), 1);
    assert_eq!(cleaned.value(0, "mortgage_rate"), &Value::Float(3.1));
    assert_eq!(
        cleaned.value(0, DISASTER_INTENSITY),
        &Value::Category("moderate".to_string())
    );
    assert_eq!(cleaned.value(0, LOG_TOTAL_DAMAGE), &Value::Float(5001f64.ln()));
}

#[test]
fn test_missing_reference_year_is_absent() {
    let merged = MultiSourceMerger::new()
        .merge(&base_panel(1975), &[mortgage_reference()])
        .unwrap();

    assert_eq!(merged.panel.len(), 1);
    assert_eq!(merged.panel.value(0, "mortgage_rate"), &Value::Missing);
    assert!(merged.panel.value(0, "mortgage_rate").as_f64().is_none());
}

#[test]
fn test_build_from_files() {
    logging::init_test();
    let dir = tempfile::tempdir().unwrap();

    let events = dir.path().join("details.csv");
    fs::write(
        &events,
        "STATE_FIPS,CZ_FIPS,CZ_TYPE,YEAR,EVENT_TYPE,DAMAGE_PROPERTY,DAMAGE_CROPS,INJURIES_DIRECT,INJURIES_INDIRECT,DEATHS_DIRECT,DEATHS_INDIRECT\n\
         6,37,C,2020,Flood,2K,,0,0,0,0\n\
         6,37,C,2020,Hail,3K,,1,0,0,0\n\
         6,37,C,2020,Wind,0,,0,0,0,1\n\
         6,37,Z,2020,Heat,1M,,0,0,0,0\n\
         ,12,C,2020,Flood,5K,,0,0,0,0\n\
         12,86,C,1975,Hurricane,2.5B,10M,3,2,1,0\n",
    )
    .unwrap();

    let national = dir.path().join("fred.csv");
    fs::write(
        &national,
        "DATE,MORTGAGE30US,UNRATE\n2020-01-01,3.0,3.5\n2020-07-01,3.2,.\n",
    )
    .unwrap();

    let config = PipelineConfig::default();
    let inputs = PipelineInputs {
        events: io::load_events_csv(&events).unwrap(),
        event_year: None,
        national: io::load_national_csv(&national).unwrap(),
        historical: Vec::new(),
    };
    let pipeline = PanelPipeline::new(config.clone());
    let output = pipeline.run(&inputs).unwrap();

    // 1975 falls outside 1980-2022, the zone and keyless rows never count
    assert_eq!(output.panel.len(), 1);
    assert_eq!(output.panel.value(0, "event_count"), &Value::Int(3));
    assert_eq!(output.panel.value(0, "total_fatalities"), &Value::Int(1));
    assert_eq!(output.panel.value(0, "mortgage_rate_30yr"), &Value::Float(3.1));
    assert_eq!(output.panel.value(0, "unemployment_rate"), &Value::Float(3.5));
    assert_eq!(output.report.missing_sources, vec!["shiller".to_string()]);
    assert_eq!(output.report.missing_key, 1);
    assert_eq!(output.report.non_county, 1);

    let out_dir = dir.path().join("out");
    let files = io::write_outputs(&out_dir, &output, &config).unwrap();

    let csv = fs::read_to_string(&files.panel).unwrap();
    assert!(csv.starts_with("entity_key,year,event_count,total_damage"));
    assert!(csv.contains("06037,2020,3,5000"));

    let dictionary = fs::read_to_string(&files.dictionary).unwrap();
    assert!(dictionary.contains("| `disaster_intensity` | category | Derived |"));

    let manifest = io::load_manifest(&files.manifest).unwrap();
    assert_eq!(manifest.rows, 1);
    assert_eq!(manifest.sources_absent, vec!["shiller".to_string()]);
    assert!(manifest.verify(csv.as_bytes()));

    // A rerun over the same inputs writes the same bytes
    let rerun = pipeline.run(&inputs).unwrap();
    let rerun_files = io::write_outputs(&dir.path().join("rerun"), &rerun, &config).unwrap();
    assert_eq!(
        io::load_manifest(&rerun_files.manifest).unwrap().panel_sha256,
        manifest.panel_sha256
    );
}
