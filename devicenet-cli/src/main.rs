//! DeviceNet Decoder CLI Application
//!
//! This is the command-line host for the devicenet-decoder library.
//! It adds:
//! - Capture file loading and saving (JSON)
//! - Simulated traffic generation
//! - Parallel decoding of multiple captures
//! - Report generation (TXT/JSON)

use anyhow::{Context, Result};
use clap::Parser;
use devicenet_decoder::simulation::SimulationDataGenerator;
use devicenet_decoder::{Analyzer, BitRate, Capture, DecoderConfig, FrameCollector, StopSignal};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

mod config;
mod input;
mod report;

use config::{AppConfig, OutputFormat};
use report::CaptureReport;

/// DeviceNet Decoder - Decode DeviceNet frames from sampled bus captures
#[derive(Parser, Debug)]
#[command(name = "devicenet-cli")]
#[command(about = "Decode DeviceNet (CAN 2.0A) frames from sampled bus captures", long_about = None)]
#[command(version)]
struct Args {
    /// Capture file to decode (can be repeated)
    #[arg(long, value_name = "FILE")]
    capture: Vec<PathBuf>,

    /// Simulate this many frames and decode them
    #[arg(long, value_name = "COUNT")]
    simulate: Option<usize>,

    /// Sample rate of simulated captures in Hz
    #[arg(long, value_name = "HZ")]
    sample_rate: Option<u32>,

    /// Bus bit rate: 500000, 250000 or 125000
    #[arg(long, value_name = "BPS")]
    bit_rate: Option<u32>,

    /// Swap the dominant/recessive level mapping
    #[arg(long)]
    inverted: bool,

    /// Replace every Nth simulated frame with an error frame
    #[arg(long, value_name = "N")]
    error_every: Option<u64>,

    /// Write the simulated capture to this file
    #[arg(long, value_name = "FILE")]
    save_capture: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Output file for the report (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("DeviceNet Decoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", devicenet_decoder::VERSION);

    let mut app = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    apply_args(&mut app, &args)?;

    if app.simulation.frames == 0 && app.input.files.is_empty() {
        println!("DeviceNet Decoder - No input specified");
        println!("\nQuick Start:");
        println!("  devicenet-cli --simulate 10");
        println!("  devicenet-cli --capture bus.json --bit-rate 250000");
        println!("\nFor repeatable runs:");
        println!("  devicenet-cli --config config.toml");
        println!("\nUse --help for more options");
        return Ok(());
    }

    let reports = run(&app)?;

    match &app.output.path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create report file: {:?}", path))?;
            let mut writer = BufWriter::new(file);
            report::write_reports(&mut writer, app.output.format, &reports)?;
            writer.flush()?;
            log::info!("Report written to {:?}", path);
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            report::write_reports(&mut writer, app.output.format, &reports)?;
        }
    }

    Ok(())
}

/// Command line flags override the configuration file
fn apply_args(app: &mut AppConfig, args: &Args) -> Result<()> {
    if let Some(bps) = args.bit_rate {
        app.bus.bit_rate = BitRate::try_from(bps)
            .map_err(anyhow::Error::msg)
            .context("Invalid --bit-rate")?;
    }
    if args.inverted {
        app.bus.inverted = true;
    }
    app.input.files.extend(args.capture.iter().cloned());
    if let Some(frames) = args.simulate {
        app.simulation.frames = frames;
    }
    if let Some(rate) = args.sample_rate {
        app.simulation.sample_rate = rate;
    }
    if let Some(n) = args.error_every {
        app.simulation.error_every = n;
    }
    if let Some(path) = &args.save_capture {
        app.simulation.save_capture = Some(path.clone());
    }
    if let Some(format) = args.format {
        app.output.format = format;
    }
    if let Some(path) = &args.output {
        app.output.path = Some(path.clone());
    }
    Ok(())
}

/// Gather every capture and decode them in parallel
fn run(app: &AppConfig) -> Result<Vec<CaptureReport>> {
    let mut sources: Vec<(String, Capture)> = Vec::new();

    if app.simulation.frames > 0 {
        let capture = simulate(app)?;
        if let Some(path) = &app.simulation.save_capture {
            input::save_capture(path, &capture)?;
        }
        sources.push(("simulation".to_string(), capture));
    }

    let loaded = app
        .input
        .files
        .par_iter()
        .map(|path| -> Result<(String, Capture)> {
            Ok((path.display().to_string(), input::load_capture(path)?))
        })
        .collect::<Result<Vec<_>>>()?;
    sources.extend(loaded);

    let stop = StopSignal::new();
    sources
        .par_iter()
        .map(|(name, capture)| decode_capture(name, capture, &app.bus, &stop))
        .collect()
}

fn simulate(app: &AppConfig) -> Result<Capture> {
    let sim = &app.simulation;
    log::info!(
        "Simulating {} frames at {} Hz ({})",
        sim.frames,
        sim.sample_rate,
        app.bus.bit_rate
    );

    let mut generator = SimulationDataGenerator::new(app.bus.clone(), sim.sample_rate)
        .context("Cannot simulate with this configuration")?
        .with_identifier(sim.identifier()?)
        .with_error_every(sim.error_every);
    generator.generate_frames(sim.frames)?;

    Ok(generator.capture().with_start_time(chrono::Utc::now()))
}

fn decode_capture(
    name: &str,
    capture: &Capture,
    bus: &DecoderConfig,
    stop: &StopSignal,
) -> Result<CaptureReport> {
    let analyzer = Analyzer::new(bus.clone(), capture.sample_rate_hz)
        .with_context(|| format!("Cannot decode {}", name))?;

    let mut collector = FrameCollector::new();
    let stats = analyzer
        .run(&mut capture.cursor(), &mut collector, stop)
        .with_context(|| format!("Decoding {} failed", name))?;

    log::info!("{}: {} frames", name, stats.frames_committed);
    Ok(CaptureReport::new(
        name.to_string(),
        capture,
        stats,
        collector.into_frames(),
    ))
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
