//! Greyhound Tiler CLI
//!
//! Tile a Greyhound resource and run a PDAL pipeline per tile.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use greyhound_tiler::config::{parse_count_or, DEFAULT_CONCURRENCY, DEFAULT_STEPS};
use greyhound_tiler::{build_runtime, run_pipeline, Config};

#[derive(Parser, Debug)]
#[command(name = "greyhound-tiler")]
#[command(about = "Tile a Greyhound resource and run a PDAL pipeline on each tile", long_about = None)]
struct Cli {
    /// Optional YAML/JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Greyhound resource path, e.g. http://greyhound:8080/resource/autzen
    #[arg(short, long)]
    resource: Option<String>,

    /// Namespace for the dimension set being produced
    #[arg(short, long)]
    name: Option<String>,

    /// File path to a JSON array of PDAL pipeline filters; NAME is replaced by the namespace
    #[arg(short, long)]
    pipeline: Option<PathBuf>,

    /// Output location for pipelines (default: <pipeline dir>/pipelines)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of steps by which to tile the resource (default: 6, i.e. a 6x6 grid)
    #[arg(short, long)]
    steps: Option<String>,

    /// Fraction by which to buffer each tile to remove edge effects (default: 0)
    #[arg(short, long)]
    buffer: Option<f64>,

    /// Number of pipelines to run concurrently (default: 4)
    #[arg(short = 'j', long = "threads")]
    threads: Option<String>,

    /// Generate and write pipeline files, but don't execute them
    #[arg(short = 'x', long)]
    norun: bool,

    /// Log extra information, including PDAL debug output
    #[arg(short, long)]
    debug: bool,

    /// Save a JSON execution report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    /// Merge flags over the (optional) config file.
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(resource) = self.resource {
            config.resource.reference = Some(resource);
        }
        if let Some(name) = self.name {
            config.name = Some(name);
        }
        if let Some(pipeline) = self.pipeline {
            config.pipeline_path = Some(pipeline);
        }
        if let Some(output) = self.output {
            config.output.dir = Some(output);
        }
        if self.steps.is_some() {
            config.tiling.steps = parse_count_or(self.steps.as_deref(), DEFAULT_STEPS);
        }
        if let Some(buffer) = self.buffer {
            config.tiling.buffer = buffer;
        }
        if self.threads.is_some() {
            config.processing.concurrency =
                parse_count_or(self.threads.as_deref(), DEFAULT_CONCURRENCY);
        }
        if self.norun {
            config.processing.skip_execution = true;
        }
        if self.debug {
            config.processing.debug = true;
        }
        if let Some(report) = self.report {
            config.processing.report_path = Some(report);
        }

        Ok(config)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    tracing::debug!("Args: {:?}", cli);

    let config = cli.into_config()?;
    config.validate()?;

    let runtime = build_runtime(config.processing.worker_threads)?;
    let outcome = runtime.block_on(run_pipeline(config))?;

    if outcome.succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
