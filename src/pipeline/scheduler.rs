//! Bounded-concurrency execution of the written pipelines.
//!
//! At most `concurrency` pipelines run at once; each completion admits the
//! next queued document. A failing pipeline is recorded and the run carries on.

use crate::io::WrittenDocument;
use crate::pipeline::{MetricsSnapshot, RunMetrics};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum pipelines in flight
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// What a finished process reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Captured stdout followed by stderr
    pub output: String,
}

/// Runs a single pipeline document.
pub trait PipelineRunner: Send + Sync {
    /// Run the pipeline at `path`. `Err` means the process could not be run at all.
    fn run(&self, path: &Path) -> impl Future<Output = Result<ProcessOutput>> + Send;
}

/// Runs `<executable> pipeline [--debug] <file>`.
#[derive(Debug, Clone)]
pub struct PdalRunner {
    executable: String,
    debug: bool,
}

impl PdalRunner {
    pub fn new(executable: impl Into<String>, debug: bool) -> Self {
        Self {
            executable: executable.into(),
            debug,
        }
    }

    fn command(&self, path: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.executable);
        cmd.arg("pipeline");
        if self.debug {
            cmd.arg("--debug");
        }
        cmd.arg(path);
        cmd.stdin(std::process::Stdio::null());
        cmd
    }
}

impl PipelineRunner for PdalRunner {
    async fn run(&self, path: &Path) -> Result<ProcessOutput> {
        let output = self
            .command(path)
            .output()
            .await
            .with_context(|| format!("Failed to run '{} pipeline {}'", self.executable, path.display()))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ProcessOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: text,
        })
    }
}

/// Outcome of one tile's pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub tile_id: u32,
    pub path: PathBuf,
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Per-tile results, ordered by tile id
    pub results: Vec<ExecutionResult>,
    pub any_failure: bool,
    pub metrics: MetricsSnapshot,
}

impl ExecutionReport {
    pub fn failed_tiles(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Save the report as JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        tracing::info!("Report saved to {}", path.display());
        Ok(())
    }
}

impl std::fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.any_failure { "failed" } else { "succeeded" };
        write!(f, "Pipelines {} ({})", status, self.metrics)
    }
}

/// Scheduler for running pipelines with bounded concurrency.
pub struct Scheduler<R> {
    runner: R,
    config: SchedulerConfig,
}

impl<R: PipelineRunner> Scheduler<R> {
    pub fn new(runner: R, config: SchedulerConfig) -> Self {
        Self { runner, config }
    }

    /// Run every document. Never aborts early; failures are reported in the result.
    pub async fn run(&self, documents: Vec<WrittenDocument>) -> ExecutionReport {
        let total = documents.len();
        let concurrency = self.config.concurrency.max(1);
        let metrics = RunMetrics::new(total);

        tracing::info!("Executing {} pipelines ({} concurrent)", total, concurrency);

        let runner = &self.runner;
        let mut results: Vec<ExecutionResult> = stream::iter(documents)
            .map(|doc| {
                let metrics = Arc::clone(&metrics);
                async move { execute_one(runner, doc, &metrics).await }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results.sort_by_key(|r| r.tile_id);

        ExecutionReport {
            results,
            any_failure: metrics.any_failure(),
            metrics: metrics.snapshot(),
        }
    }
}

async fn execute_one<R: PipelineRunner>(
    runner: &R,
    doc: WrittenDocument,
    metrics: &RunMetrics,
) -> ExecutionResult {
    tracing::debug!("Running tile {} ({})", doc.tile_id, doc.path.display());

    let (success, output, error) = match runner.run(&doc.path).await {
        Ok(out) if out.success => (true, out.output, None),
        Ok(out) => {
            let code = out
                .exit_code
                .map_or_else(|| "a signal".to_string(), |c| format!("status {}", c));
            (false, out.output, Some(format!("Pipeline exited with {}", code)))
        }
        Err(e) => (false, String::new(), Some(format!("{:#}", e))),
    };

    let completed = if success {
        metrics.record_success()
    } else {
        metrics.record_failure()
    };

    if !output.trim().is_empty() {
        tracing::info!("Tile {} output:\n{}", doc.tile_id, output.trim_end());
    }
    match &error {
        None => tracing::info!("{}/{} tile {} done", completed, metrics.total(), doc.tile_id),
        Some(e) => tracing::error!(
            "{}/{} tile {} failed: {}",
            completed,
            metrics.total(),
            doc.tile_id,
            e
        ),
    }

    ExecutionResult {
        tile_id: doc.tile_id,
        path: doc.path,
        success,
        output,
        error,
    }
}
