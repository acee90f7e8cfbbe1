use clap::{Parser, Subcommand};
use respiro_core::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "respiro")]
#[command(about = "Breathing and sleep stage inference from motion sensors", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a CSV sensor recording through an engine session
    Replay {
        /// Recording with header timestamp_ms,sensor,x,y,z
        file: PathBuf,

        /// Print a snapshot every N ms of sample time
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,

        /// Emit one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Generate a synthetic night and run it through an engine session
    Simulate {
        /// Breathing rate in breaths per minute
        #[arg(long, default_value_t = 15.0)]
        rate: f32,

        /// Minutes of breathing before any apnea pause
        #[arg(long, default_value_t = 5)]
        minutes: u64,

        /// Per-breath timing variation (0.0 - 0.9)
        #[arg(long, default_value_t = 0.0)]
        jitter: f32,

        /// Insert a motionless breathing pause of this many seconds
        #[arg(long, default_value_t = 0)]
        apnea_secs: u64,

        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Also write the generated samples as a CSV recording
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print a snapshot every N ms of sample time
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,

        /// Emit one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write the default configuration file instead
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    respiro_core::logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            file,
            interval_ms,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_replay(&file, &config, interval_ms, json)
        }
        Commands::Simulate {
            rate,
            minutes,
            jitter,
            apnea_secs,
            seed,
            output,
            interval_ms,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let samples = synthesize(rate, minutes, jitter, apnea_secs, seed);
            if let Some(path) = output {
                write_recording(&path, &samples)?;
                if !json {
                    println!("Wrote {} samples to {}", samples.len(), path.display());
                }
            }
            run_samples(&samples, &config, interval_ms, json)
        }
        Commands::Config { init } => cmd_config(cli.config, init),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.validate()?;
    Ok(config)
}

fn cmd_replay(file: &Path, config: &Config, interval_ms: u64, json: bool) -> Result<()> {
    let samples = load_recording(file)?;
    if samples.is_empty() {
        println!("No samples in {} - nothing to replay.", file.display());
        return Ok(());
    }
    run_samples(&samples, config, interval_ms, json)
}

fn synthesize(rate: f32, minutes: u64, jitter: f32, apnea_secs: u64, seed: u64) -> Vec<ImuSample> {
    let mut builder = SignalBuilder::new(seed)
        .jitter(jitter)
        .breathing(minutes * 60_000, rate);
    if apnea_secs > 0 {
        builder = builder.still(apnea_secs * 1000).breathing(60_000, rate);
    }
    builder.build()
}

fn cmd_config(path: Option<PathBuf>, init: bool) -> Result<()> {
    if init {
        let path = path.unwrap_or_else(Config::default_config_path);
        if path.exists() {
            println!("Config already exists at {}", path.display());
            return Ok(());
        }
        Config::default().save_to(&path)?;
        println!("✓ Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = load_config(path.as_deref())?;
    print!("{}", config.to_toml()?);
    Ok(())
}

/// One periodic snapshot as printed with `--json`
#[derive(Serialize)]
struct Report<'a> {
    timestamp_ms: u64,
    elapsed_ms: u64,
    #[serde(flatten)]
    metrics: &'a MetricsSnapshot,
}

#[derive(Serialize)]
struct Summary<'a> {
    samples_accepted: u64,
    samples_dropped: u64,
    duration_ms: u64,
    metrics: &'a MetricsSnapshot,
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    summary: Summary<'a>,
}

fn run_samples(samples: &[ImuSample], config: &Config, interval_ms: u64, json: bool) -> Result<()> {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Ok(());
    };
    let origin = first.timestamp_ms;

    let mut session = EngineSession::new(config.clone())?;
    session.start_session(origin);
    tracing::info!(
        "Running {} samples spanning {}ms",
        samples.len(),
        last.timestamp_ms.saturating_sub(origin)
    );

    let mut next_report = Some(origin.saturating_add(interval_ms));
    for sample in samples {
        if let Some(due) = next_report.filter(|&due| sample.timestamp_ms >= due) {
            let metrics = session.get_metrics(due);
            print_report(due, origin, &metrics, json)?;
            let missed = (sample.timestamp_ms - due) / interval_ms;
            // No further reports once the clock would wrap.
            next_report = (missed + 1)
                .checked_mul(interval_ms)
                .and_then(|step| due.checked_add(step));
        }
        session.feed(*sample);
    }

    let end = last.timestamp_ms.max(origin);
    let metrics = session.get_metrics(end);
    let duration_ms = end - origin;
    if json {
        let line = SummaryLine {
            summary: Summary {
                samples_accepted: session.samples_accepted(),
                samples_dropped: session.samples_dropped(),
                duration_ms,
                metrics: &metrics,
            },
        };
        println!("{}", serde_json::to_string(&line)?);
    } else {
        display_summary(&session, &metrics, duration_ms);
    }
    Ok(())
}

fn print_report(timestamp_ms: u64, origin: u64, metrics: &MetricsSnapshot, json: bool) -> Result<()> {
    let elapsed_ms = timestamp_ms.saturating_sub(origin);
    if json {
        let report = Report {
            timestamp_ms,
            elapsed_ms,
            metrics,
        };
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(
            "{:>8.1}s  {:<11}  conf {:.2}  rate {:>5.1} bpm  reg {:.2}  move {:.2}  cycles {:>4}{}",
            elapsed_ms as f64 / 1000.0,
            metrics.current_stage.label(),
            metrics.confidence,
            metrics.breathing_rate_bpm,
            metrics.breathing_regularity,
            metrics.movement_intensity,
            metrics.breath_cycles_detected,
            if metrics.possible_apnea {
                "  ⚠ possible apnea"
            } else {
                ""
            }
        );
    }
    Ok(())
}

fn display_summary(session: &EngineSession, metrics: &MetricsSnapshot, duration_ms: u64) {
    println!();
    println!("─────────────────────────────────────────");
    println!(
        "Replayed {:.1}s: {} samples accepted, {} dropped",
        duration_ms as f64 / 1000.0,
        session.samples_accepted(),
        session.samples_dropped()
    );
    println!(
        "  Stage: {} (confidence {:.0}%)",
        metrics.current_stage,
        metrics.confidence * 100.0
    );
    println!("  Breathing rate: {:.1} bpm", metrics.breathing_rate_bpm);
    println!(
        "  Regularity: {:.0}%",
        metrics.breathing_regularity * 100.0
    );
    println!("  Movement: {:.0}%", metrics.movement_intensity * 100.0);
    println!("  Breath cycles: {}", metrics.breath_cycles_detected);
    if metrics.possible_apnea {
        println!("  ⚠ Possible apnea detected");
    }
}
