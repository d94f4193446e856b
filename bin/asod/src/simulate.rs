//! ---
//! aso_section: "05-daemon"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Offline, seeded telemetry runs exported as CSV or JSON."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use aso_telemetry::{Observatory, Sample, Status, TickOutcome};
use clap::{Args, ValueEnum};
use serde::Serialize;

pub const DEFAULT_SEED: u64 = 0x0A50_5EED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Number of generator ticks to run
    #[arg(long, default_value_t = 200)]
    pub ticks: u64,

    /// Random seed for transitions and sample fields
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output file path. Use '-' for stdout.
    #[arg(long, default_value = "-")]
    pub output: PathBuf,

    /// Explicit output format when the extension is ambiguous
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Issue an emergency stop before this tick
    #[arg(long, value_name = "TICK")]
    pub halt_at: Option<u64>,

    /// Issue a reset before this tick
    #[arg(long, value_name = "TICK")]
    pub resume_at: Option<u64>,
}

/// Flat record written per sample; CSV cannot hold nested arrays.
#[derive(Debug, Serialize)]
struct SampleRecord<'a> {
    tick: u64,
    id: String,
    timestamp: i64,
    status: &'static str,
    confidence: f64,
    entropy: f64,
    latent_x: f64,
    latent_y: f64,
    origin: &'static str,
    description: &'a str,
}

impl<'a> SampleRecord<'a> {
    fn new(tick: u64, sample: &'a Sample) -> Self {
        let [latent_x, latent_y] = sample.latent_coordinates();
        Self {
            tick,
            id: sample.id().to_string(),
            timestamp: sample.timestamp_millis(),
            status: sample.status().as_str(),
            confidence: sample.confidence(),
            entropy: sample.entropy(),
            latent_x,
            latent_y,
            origin: sample.origin().as_str(),
            description: sample.description(),
        }
    }
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    if args.ticks == 0 {
        return Err(anyhow!("ticks must be greater than zero"));
    }
    let format = determine_format(&args.output, args.format);
    let samples = simulate(args)?;
    match format {
        OutputFormat::Csv => write_csv(&args.output, &samples)?,
        OutputFormat::Json => write_json(&args.output, &samples)?,
    }
    if args.output.as_os_str() != "-" {
        eprintln!(
            "simulated {} ticks ({} samples) -> {}",
            args.ticks,
            samples.len(),
            args.output.display()
        );
    }
    Ok(())
}

/// Run the scenario and return every published sample with the tick it
/// was published at.
pub fn simulate(args: &SimulateArgs) -> Result<Vec<(u64, Arc<Sample>)>> {
    let observatory = Observatory::builder()
        .seed(args.seed.unwrap_or(DEFAULT_SEED))
        .history_capacity(usize::try_from(args.ticks).unwrap_or(usize::MAX).max(1))
        .build();
    let mut samples = Vec::new();
    for tick in 0..args.ticks {
        if args.halt_at == Some(tick) {
            samples.push((tick, observatory.set_status(Status::Halted)?));
        }
        if args.resume_at == Some(tick) {
            samples.push((tick, observatory.set_status(Status::Optimal)?));
        }
        match observatory.tick() {
            Ok(TickOutcome::Published(sample)) => samples.push((tick, sample)),
            Ok(TickOutcome::Frozen) => {}
            Err(err) => eprintln!("tick {} dropped: {}", tick, err),
        }
    }
    Ok(samples)
}

fn determine_format(path: &Path, explicit: Option<OutputFormat>) -> OutputFormat {
    if let Some(format) = explicit {
        return format;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => OutputFormat::Csv,
        _ => OutputFormat::Json,
    }
}

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdout()));
    }
    let file = File::create(path)
        .with_context(|| format!("failed to create output file {}", path.display()))?;
    Ok(Box::new(file))
}

fn write_csv(path: &Path, samples: &[(u64, Arc<Sample>)]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(open_output(path)?);
    for (tick, sample) in samples {
        writer.serialize(SampleRecord::new(*tick, sample))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(path: &Path, samples: &[(u64, Arc<Sample>)]) -> Result<()> {
    let records: Vec<&Sample> = samples.iter().map(|(_, sample)| sample.as_ref()).collect();
    let mut writer = open_output(path)?;
    serde_json::to_writer_pretty(&mut writer, &records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
