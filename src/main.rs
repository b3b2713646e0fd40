use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use disaster_panel::io::{self, MANIFEST_FILE_NAME};
use disaster_panel::provenance::PANEL_FILE_NAME;
use disaster_panel::{logging, PanelPipeline, PipelineConfig, PipelineInputs};

#[derive(Parser)]
#[command(name = "disaster-panel")]
#[command(about = "County × year panel of natural disasters and housing market series")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the panel, its data dictionary and run manifest
    Build {
        /// Storm event detail CSV (one row per event)
        #[arg(long)]
        events: PathBuf,
        /// Wide national series CSV (date column + one column per series id)
        #[arg(long)]
        national: Option<PathBuf>,
        /// Historical home price index sheet exported as CSV
        #[arg(long)]
        historical: Option<PathBuf>,
        /// Directory for the three output files
        #[arg(long)]
        out_dir: PathBuf,
        /// Pipeline configuration JSON; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Year for event rows without a YEAR column
        #[arg(long)]
        event_year: Option<i32>,
    },
    /// Check a written panel against its manifest checksum
    Verify {
        #[arg(long)]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            events,
            national,
            historical,
            out_dir,
            config,
            event_year,
        } => run_build(&events, national.as_deref(), historical.as_deref(), &out_dir, config.as_deref(), event_year),
        Commands::Verify { out_dir } => run_verify(&out_dir),
    }
}

fn run_build(
    events: &Path,
    national: Option<&Path>,
    historical: Option<&Path>,
    out_dir: &Path,
    config: Option<&Path>,
    event_year: Option<i32>,
) -> Result<()> {
    let config = match config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    info!(year_min = config.year_min, year_max = config.year_max, "configuration loaded");

    println!("📂 Loading sources...");
    let inputs = PipelineInputs {
        events: io::load_events_csv(events)?,
        event_year,
        national: match national {
            Some(path) => io::load_national_csv(path)?,
            None => Vec::new(),
        },
        historical: match historical {
            Some(path) => io::load_historical_csv(path)?,
            None => Vec::new(),
        },
    };

    println!("🔧 Building panel...");
    let pipeline = PanelPipeline::new(config);
    let output = pipeline.run(&inputs).context("Panel build failed")?;

    println!("💾 Writing outputs...");
    let files = io::write_outputs(out_dir, &output, pipeline.config())?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ {}", output.summary.summary());
    println!("✓ {}", output.report.summary());
    if !output.report.missing_sources.is_empty() {
        println!("⚠️  Absent sources: {}", output.report.missing_sources.join(", "));
    }
    println!("✓ Panel      → {}", files.panel.display());
    println!("✓ Dictionary → {}", files.dictionary.display());
    println!("✓ Manifest   → {}", files.manifest.display());

    Ok(())
}

fn run_verify(out_dir: &Path) -> Result<()> {
    let manifest = io::load_manifest(&out_dir.join(MANIFEST_FILE_NAME))?;
    let panel_path = out_dir.join(PANEL_FILE_NAME);
    let bytes =
        fs::read(&panel_path).with_context(|| format!("Failed to read panel: {:?}", panel_path))?;

    if !manifest.verify(&bytes) {
        bail!("{:?} does not match its manifest checksum", panel_path);
    }

    println!("✅ {} rows, sha256 {}", manifest.rows, manifest.panel_sha256);
    Ok(())
}
