//! Configuration for the tiling run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Grid steps used when none (or an unusable value) is given.
pub const DEFAULT_STEPS: usize = 6;

/// Concurrent pipeline executions used when none (or an unusable value) is given.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Main configuration for a tiling run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote resource configuration
    #[serde(default)]
    pub resource: ResourceConfig,

    /// Namespace for the dimension set being produced
    #[serde(default)]
    pub name: Option<String>,

    /// Path to the JSON array of caller filter stages
    #[serde(default)]
    pub pipeline_path: Option<PathBuf>,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Tiling configuration
    #[serde(default)]
    pub tiling: TilingConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Remote resource configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource URL, or a bare resource name resolved against `default_root`
    #[serde(default)]
    pub reference: Option<String>,

    /// Root prepended to bare resource names
    #[serde(default = "default_resource_root")]
    pub default_root: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            reference: None,
            default_root: default_resource_root(),
        }
    }
}

impl ResourceConfig {
    /// Resolve the resource reference into a base URL ending in `/`.
    ///
    /// A reference without any `/` is a bare resource name and is appended to
    /// `default_root`.
    pub fn base_url(&self) -> anyhow::Result<String> {
        let reference = self
            .reference
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Resource is required (see --help)"))?;

        let mut base = if reference.contains('/') {
            reference.to_string()
        } else {
            let mut root = self.default_root.clone();
            if !root.ends_with('/') {
                root.push('/');
            }
            root + reference
        };

        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(base)
    }
}

/// Where pipeline documents are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory. Defaults to `pipelines/` next to the pipeline file.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Grid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilingConfig {
    /// Side length of the square tile grid
    #[serde(default = "default_steps")]
    pub steps: usize,

    /// Fraction by which the reader buffers each tile (0 = no overlap)
    #[serde(default)]
    pub buffer: f64,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
            buffer: 0.0,
        }
    }
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of pipelines executed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Write pipeline documents but never execute them
    #[serde(default)]
    pub skip_execution: bool,

    /// Verbose logging, also passed through to the pipeline executable
    #[serde(default)]
    pub debug: bool,

    /// Pipeline executable
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Number of Tokio worker threads
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Optional path to save the execution report as JSON
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            skip_execution: false,
            debug: false,
            executable: default_executable(),
            worker_threads: None,
            report_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The namespace, or a configuration error if it is missing.
    pub fn namespace(&self) -> anyhow::Result<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Name is required (see --help)"))
    }

    /// The caller pipeline path, or a configuration error if it is missing.
    pub fn pipeline_path(&self) -> anyhow::Result<&Path> {
        self.pipeline_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Pipeline is required (see --help)"))
    }

    /// Directory that receives the `<name>/<tile>.json` documents.
    pub fn output_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.output.dir {
            return Ok(dir.clone());
        }
        let pipeline = self.pipeline_path()?;
        let parent = pipeline.parent().unwrap_or_else(|| Path::new(""));
        Ok(parent.join("pipelines"))
    }

    /// Validate the configuration. Runs before any network or file activity.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.resource.base_url()?;
        self.pipeline_path()?;
        self.namespace()?;

        if self.tiling.steps == 0 {
            anyhow::bail!("Steps must be > 0");
        }
        if !self.tiling.buffer.is_finite() || self.tiling.buffer < 0.0 {
            anyhow::bail!("Buffer must be a finite fraction >= 0, got {}", self.tiling.buffer);
        }
        if self.processing.concurrency == 0 {
            anyhow::bail!("Concurrency must be > 0");
        }
        if self.processing.executable.is_empty() {
            anyhow::bail!("Pipeline executable must not be empty");
        }
        Ok(())
    }
}

/// Parse a positive count from the leading digits of `raw` (`"2.5"` → 2,
/// `"3x"` → 3), falling back to `default` when there are none or the count
/// is zero or negative.
pub fn parse_count_or(raw: Option<&str>, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };
    let trimmed = raw.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());

    match unsigned[..digits_end].parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
            tracing::warn!("Ignoring invalid count {:?}, using {}", raw, default);
            default
        }
    }
}

// Default value functions for serde
fn default_resource_root() -> String { "http://greyhound:8080/resource/".to_string() }
fn default_steps() -> usize { DEFAULT_STEPS }
fn default_concurrency() -> usize { DEFAULT_CONCURRENCY }
fn default_executable() -> String { "pdal".to_string() }
