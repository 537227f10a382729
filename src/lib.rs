//! Greyhound Tiler
//!
//! Splits a Greyhound point-cloud resource into an N×N grid of tiles, writes one
//! PDAL pipeline per tile and runs those pipelines with bounded concurrency.
//!
//! # Architecture
//!
//! - **Index**: the tile grid over the resource bounds
//! - **I/O**: resource info queries and pipeline document persistence
//! - **Pipeline**: per-tile document composition and the execution scheduler
//!
//! # Usage
//!
//! ```no_run
//! use greyhound_tiler::{run_pipeline, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("tiler.yaml".as_ref())?;
//!     let outcome = run_pipeline(config).await?;
//!     println!("success: {}", outcome.succeeded());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod index;
pub mod io;
pub mod pipeline;

pub use config::Config;
pub use index::{Bounds, GridSpec, Tile, TileGrid};
pub use io::{DocumentWriter, HttpResource, InfoSource, ResourceInfo, WrittenDocument};
pub use pipeline::{
    compose, CallerPipeline, ExecutionReport, PdalRunner, PipelineDocument, PipelineRunner,
    Scheduler, SchedulerConfig,
};

use anyhow::Result;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Documents were written and execution was skipped
    Written(Vec<WrittenDocument>),

    /// Documents were written and executed
    Executed(ExecutionReport),
}

impl RunOutcome {
    /// False only when at least one pipeline failed.
    pub fn succeeded(&self) -> bool {
        match self {
            RunOutcome::Written(_) => true,
            RunOutcome::Executed(report) => !report.any_failure,
        }
    }
}

/// Run with the HTTP info source and the configured pipeline executable.
pub async fn run_pipeline(config: Config) -> Result<RunOutcome> {
    let source = HttpResource::new()?;
    let runner = PdalRunner::new(config.processing.executable.clone(), config.processing.debug);
    run_with(&config, &source, runner).await
}

/// Run the full tiling flow against the given collaborators.
///
/// Configuration, fetch and write errors abort with `Err`. Pipeline failures
/// are reported in the returned outcome.
pub async fn run_with<S, R>(config: &Config, source: &S, runner: R) -> Result<RunOutcome>
where
    S: InfoSource,
    R: PipelineRunner,
{
    config.validate()?;

    let base_url = config.resource.base_url()?;
    let namespace = config.namespace()?;
    let output_dir = config.output_dir()?;
    let caller = CallerPipeline::from_file(config.pipeline_path()?, namespace)?;
    let steps = config.tiling.steps;

    tracing::info!("Resource: {}", base_url);
    tracing::info!("Output: {}", output_dir.display());
    tracing::info!("Tiles: {}x{}", steps, steps);
    tracing::info!("Threads: {}", config.processing.concurrency);
    tracing::info!(
        "Filters: {}",
        serde_json::to_string_pretty(caller.stages()).unwrap_or_default()
    );

    let info = source.fetch_info(&base_url).await?;
    tracing::info!(
        "Resource bounds: [{}, {}, {}, {}]{}",
        info.bounds.min_x,
        info.bounds.min_y,
        info.bounds.max_x,
        info.bounds.max_y,
        info.num_points
            .map(|n| format!(", {} points", n))
            .unwrap_or_default()
    );

    let spec = GridSpec {
        steps,
        buffer: config.tiling.buffer,
    };
    let grid = TileGrid::new(info.bounds, spec)?;
    let documents: Vec<(u32, PipelineDocument)> = grid
        .enumerate_tiles()
        .map(|tile| {
            let doc = compose(&tile, &base_url, namespace, grid.spec.buffer, &caller);
            (tile.id, doc)
        })
        .collect();

    let writer = DocumentWriter::create(&output_dir, namespace).await?;
    let written = writer.persist_all(&documents).await?;
    tracing::info!("Pipelines written: {} in {}", written.len(), writer.dir().display());

    if config.processing.skip_execution {
        tracing::info!("Skipping execution");
        return Ok(RunOutcome::Written(written));
    }

    let scheduler = Scheduler::new(
        runner,
        SchedulerConfig {
            concurrency: config.processing.concurrency,
        },
    );
    let report = scheduler.run(written).await;

    if let Some(path) = &config.processing.report_path {
        if let Err(e) = report.save_to_file(path) {
            tracing::warn!("Failed to save report: {:#}", e);
        }
    }

    if report.any_failure {
        tracing::error!("{}", report);
    } else {
        tracing::info!("{}", report);
    }

    Ok(RunOutcome::Executed(report))
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::pipeline::ProcessOutput;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeResource {
        body: &'static str,
        requested: Mutex<Vec<String>>,
    }

    impl FakeResource {
        fn new(body: &'static str) -> Self {
            Self {
                body,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    impl InfoSource for FakeResource {
        async fn fetch_info(&self, base_url: &str) -> Result<ResourceInfo> {
            self.requested.lock().unwrap().push(base_url.to_string());
            ResourceInfo::from_json(self.body.as_bytes())
        }
    }

    #[derive(Default)]
    struct CountingRunner {
        calls: AtomicUsize,
        fail_tile: Option<String>,
    }

    impl PipelineRunner for &CountingRunner {
        async fn run(&self, path: &Path) -> Result<ProcessOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failed = self.fail_tile.as_deref()
                == path.file_name().and_then(|n| n.to_str());
            Ok(ProcessOutput {
                success: !failed,
                exit_code: Some(if failed { 1 } else { 0 }),
                output: String::new(),
            })
        }
    }

    fn config(dir: &Path, skip: bool) -> Config {
        let pipeline = dir.join("filters.json");
        std::fs::write(&pipeline, r#"[{"type": "filters.range", "limits": "NAME/Tile![0:0]"}]"#)
            .unwrap();

        let mut config = Config {
            resource: ResourceConfig {
                reference: Some("autzen".to_string()),
                ..Default::default()
            },
            name: Some("ns".to_string()),
            pipeline_path: Some(pipeline),
            ..Default::default()
        };
        config.tiling.steps = 2;
        config.processing.skip_execution = skip;
        config
    }

    const INFO: &str = r#"{"bounds": [0, 0, -5, 10, 10, 5]}"#;

    #[tokio::test]
    async fn test_skip_execution_writes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeResource::new(INFO);
        let runner = CountingRunner::default();

        let outcome = run_with(&config(tmp.path(), true), &source, &runner).await.unwrap();

        assert!(outcome.succeeded());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        let RunOutcome::Written(written) = outcome else {
            panic!("expected documents only");
        };
        assert_eq!(written.len(), 4);

        let doc_dir = tmp.path().join("pipelines").join("ns");
        for id in 0..4 {
            assert!(doc_dir.join(format!("{}.json", id)).is_file());
        }
        let last: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(doc_dir.join("3.json")).unwrap()).unwrap();
        assert_eq!(
            last["pipeline"][0]["url"],
            "http://greyhound:8080/resource/autzen/read?bounds=[5,5,10,10]"
        );
        assert_eq!(last["pipeline"][3]["limits"], "ns/Tile![0:0]");
        assert_eq!(
            source.requested.lock().unwrap().as_slice(),
            &["http://greyhound:8080/resource/autzen/".to_string()]
        );
    }

    #[tokio::test]
    async fn test_buffer_reaches_every_reader() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path(), true);
        config.tiling.buffer = 0.2;

        let outcome = run_with(&config, &FakeResource::new(INFO), &CountingRunner::default())
            .await
            .unwrap();

        let RunOutcome::Written(written) = outcome else {
            panic!("expected documents only");
        };
        for doc in written {
            let value: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(&doc.path).unwrap()).unwrap();
            assert_eq!(value["pipeline"][0]["buffer"], serde_json::json!(0.2));
        }
    }

    #[tokio::test]
    async fn test_execution_runs_every_tile() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = CountingRunner::default();

        let outcome = run_with(&config(tmp.path(), false), &FakeResource::new(INFO), &runner)
            .await
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_partial_failure_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = CountingRunner {
            fail_tile: Some("2.json".to_string()),
            ..Default::default()
        };
        let mut config = config(tmp.path(), false);
        config.processing.report_path = Some(tmp.path().join("report.json"));

        let outcome = run_with(&config, &FakeResource::new(INFO), &runner).await.unwrap();

        assert!(!outcome.succeeded());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
        assert!(tmp.path().join("report.json").is_file());
    }

    #[tokio::test]
    async fn test_fetch_error_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = CountingRunner::default();
        let source = FakeResource::new(r#"{"bounds": [0, 0, 0, 0, 0, 0]}"#);

        let result = run_with(&config(tmp.path(), false), &source, &runner).await;

        assert!(result.is_err());
        assert!(!tmp.path().join("pipelines").exists());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_name_fails_before_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeResource::new(INFO);
        let mut config = config(tmp.path(), true);
        config.name = None;

        let err = run_with(&config, &source, &CountingRunner::default()).await.unwrap_err();

        assert!(err.to_string().contains("Name is required"));
        assert!(source.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_error_aborts_before_execution() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = CountingRunner::default();
        let mut config = config(tmp.path(), false);
        // A regular file where the output directory should be
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        config.output.dir = Some(PathBuf::from(&blocker));

        let result = run_with(&config, &FakeResource::new(INFO), &runner).await;

        assert!(result.is_err());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_build_runtime() {
        let runtime = build_runtime(Some(2)).unwrap();
        assert_eq!(runtime.block_on(async { 1 + 1 }), 2);
    }
}
