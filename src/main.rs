use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stemwalker_core::orchestrator::SongOutcome;
use stemwalker_core::{Orchestrator, RenderConfig, discover};

/// Render per-instrument MIDI stems into loudness-normalized song masters.
#[derive(Parser, Debug)]
#[command(name = "stemwalker", version, about, long_about = None)]
struct Args {
    /// Stem tree laid out as <input>/<artist>/<song>/<program>_<name>.mid
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory receiving <artist>/<song>.wav
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON render configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Songs rendered in parallel (0 = one per core)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Log state transitions and per-stem details
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<bool> {
    let mut config = match &args.config {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RenderConfig::default(),
    };
    if let Some(input) = args.input {
        config.input_root = input;
    }
    if let Some(output) = args.output {
        config.output_root = output;
    }
    if let Some(jobs) = args.jobs {
        config.workers = jobs;
    }

    let jobs = discover(&config.input_root, &config.output_root)
        .with_context(|| format!("scanning {}", config.input_root.display()))?;
    info!(
        songs = jobs.len(),
        input = %config.input_root.display(),
        output = %config.output_root.display(),
        "starting render"
    );

    let orchestrator = Orchestrator::from_config(&config);
    let report = orchestrator.run_parallel(&jobs, config.workers);

    for song in &report.songs {
        match &song.result {
            Ok(SongOutcome::Rendered { path, .. }) => println!("rendered {}", path.display()),
            Ok(SongOutcome::Skipped(_)) => {}
            Err(e) => println!("failed   {}: {e}", song.job.label()),
        }
    }
    println!(
        "{} rendered, {} skipped, {} failed",
        report.rendered(),
        report.skipped(),
        report.failed()
    );
    Ok(!report.has_systemic_failure())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("output could not be written, stopping with failure status");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
