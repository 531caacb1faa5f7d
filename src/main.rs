//! # Top-Pair Reconstruction Binary
//!
//! Reads events as JSON lines, reconstructs each one and writes one JSON
//! line per event with the top and anti-top four-momenta.
//!
//! ## Usage
//!
//! ```bash
//! # Zero-width (single-shot) reconstruction
//! cargo run --release -- --events events.jsonl --single-shot
//!
//! # Smearing ensemble with a calibration
//! RUST_LOG=info cargo run --release -- \
//!     --events events.jsonl \
//!     --calibration data/calibration.json \
//!     --trials 200 --seed 1234
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use topreco::{
    EventRecord, FourMomentum, HistogramResolutionModel, ReconstructionConfig, ReconstructedEvent,
    ResolutionSampler, TopReconstructor, ZeroWidthSampler,
};

/// Dileptonic top-pair reconstruction
#[derive(Parser, Debug)]
#[command(name = "topreco")]
#[command(about = "Reconstruct dileptonic ttbar events from JSON-lines input")]
#[command(version)]
struct Args {
    /// Input events, one JSON record per line
    #[arg(long, short = 'e')]
    events: String,

    /// Resolution calibration (JSON); zero-width smearing if omitted
    #[arg(long, short = 'c')]
    calibration: Option<String>,

    /// Reconstruction configuration (JSON)
    #[arg(long)]
    config: Option<String>,

    /// Seed of the resolution model
    #[arg(long, short = 's', default_value = "1234")]
    seed: u64,

    /// Number of smearing trials per event
    #[arg(long, short = 'n')]
    trials: Option<usize>,

    /// Stop after this many events
    #[arg(long)]
    limit: Option<usize>,

    /// One unsmeared trial per event
    #[arg(long, conflicts_with_all = ["calibration", "config", "trials"])]
    single_shot: bool,

    /// Weigh every solution equally (likelihood terms off)
    #[arg(long, conflicts_with = "config")]
    kinematic_only: bool,

    /// Output file (stdout if omitted)
    #[arg(long, short = 'o')]
    output: Option<String>,
}

#[derive(Serialize)]
struct EventLine {
    event: u64,
    reconstructed: bool,
    top: FourMomentum,
    anti_top: FourMomentum,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn load_config(args: &Args) -> Result<ReconstructionConfig> {
    let mut config = match &args.config {
        Some(path) => ReconstructionConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path))?,
        None if args.single_shot => ReconstructionConfig::single_shot(),
        None => ReconstructionConfig::default(),
    };
    if let Some(n) = args.trials {
        config = config.with_trials(n);
    }
    if args.kinematic_only {
        config = config.kinematic_only();
    }
    Ok(config)
}

fn read_events(path: &str, limit: Option<usize>) -> Result<Vec<EventRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path))?;
    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        if limit.is_some_and(|l| records.len() >= l) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EventRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event record", path, line_no + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = load_config(&args)?;
    let sampler: Box<dyn ResolutionSampler> = match &args.calibration {
        Some(path) => Box::new(
            HistogramResolutionModel::from_file(path, args.seed)
                .with_context(|| format!("loading calibration {}", path))?,
        ),
        None => Box::new(ZeroWidthSampler),
    };
    log::info!(
        "{} trials per event, {} smearing",
        config.n_trials,
        if args.calibration.is_some() { "histogram" } else { "zero-width" }
    );

    let records = read_events(&args.events, args.limit)?;
    log::info!("Read {} events from {}", records.len(), args.events);

    let reconstructor = TopReconstructor::new(config)?;
    let (results, summary) = reconstructor.reconstruct_batch(&records, sampler.as_ref());

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    for (record, result) in records.iter().zip(&results) {
        let line = match result {
            Ok(event) => {
                let [top, anti_top] = event.four_momenta();
                EventLine {
                    event: record.event_number,
                    reconstructed: event.is_reconstructed(),
                    top,
                    anti_top,
                    error: None,
                }
            }
            Err(e) => {
                let [top, anti_top] = ReconstructedEvent::NoSolution.four_momenta();
                EventLine {
                    event: record.event_number,
                    reconstructed: false,
                    top,
                    anti_top,
                    error: Some(e.to_string()),
                }
            }
        };
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
    }
    out.flush()?;

    eprintln!(
        "{} events: {} reconstructed, {} without solution, {} malformed (efficiency {:.1}%)",
        summary.events,
        summary.reconstructed,
        summary.failed,
        summary.malformed,
        100.0 * summary.efficiency()
    );
    Ok(())
}
