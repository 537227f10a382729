//! Per-tile PDAL pipeline documents.
//!
//! Every document has the same shape:
//!
//! ```text
//! reader ──▶ ferry (OriginId → <name>/Tile) ──▶ assign (<name>/Tile = id) ──▶ caller stages ──▶ writer
//! ```
//!
//! Caller stages are opaque JSON and are spliced in unchanged.

use crate::index::Tile;
use crate::io::read_url;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Token in the caller pipeline replaced by the namespace.
pub const NAME_PLACEHOLDER: &str = "NAME";

/// A single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Stage {
    Builtin(BuiltinStage),
    /// Caller-supplied stage, never interpreted
    Caller(Value),
}

/// Stages the tiler inserts around the caller's filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum BuiltinStage {
    #[serde(rename = "readers.greyhound")]
    Reader {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        buffer: Option<f64>,
    },

    #[serde(rename = "filters.ferry")]
    Ferry { dimensions: String },

    #[serde(rename = "filters.assign")]
    Assign { assignment: String },

    #[serde(rename = "writers.greyhound")]
    Writer { name: String },
}

/// Complete pipeline for one tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDocument {
    pub pipeline: Vec<Stage>,
}

impl PipelineDocument {
    /// Serialize with 4-space indentation.
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Caller filter stages with the namespace already substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerPipeline {
    stages: Vec<Value>,
}

impl CallerPipeline {
    /// Build from a JSON value, which must be an array of stages.
    pub fn from_value(value: Value, namespace: &str) -> Result<Self> {
        let templated = substitute_placeholder(value, NAME_PLACEHOLDER, namespace);
        match templated {
            Value::Array(stages) => Ok(Self { stages }),
            other => anyhow::bail!(
                "Caller pipeline must be a JSON array of filter stages, got {}",
                json_kind(&other)
            ),
        }
    }

    /// Parse from JSON text.
    pub fn from_json(json: &str, namespace: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).context("Caller pipeline is not valid JSON")?;
        Self::from_value(value, namespace)
    }

    /// Load from a file.
    pub fn from_file(path: &Path, namespace: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline {}", path.display()))?;
        Self::from_json(&contents, namespace)
            .with_context(|| format!("Invalid pipeline {}", path.display()))
    }

    pub fn stages(&self) -> &[Value] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Replace `token` inside every string value and object key of `value`.
///
/// Object keys are templated too; numbers, booleans and nulls are left alone.
pub fn substitute_placeholder(value: Value, token: &str, replacement: &str) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace(token, replacement)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| substitute_placeholder(v, token, replacement))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    (
                        k.replace(token, replacement),
                        substitute_placeholder(v, token, replacement),
                    )
                })
                .collect(),
        ),
        other => other,
    }
}

/// Name of the per-point tile dimension.
pub fn tile_dimension(namespace: &str) -> String {
    format!("{}/Tile", namespace)
}

/// Assemble the pipeline for one tile.
///
/// A zero buffer is left out of the reader stage.
pub fn compose(
    tile: &Tile,
    base_url: &str,
    namespace: &str,
    buffer: f64,
    caller: &CallerPipeline,
) -> PipelineDocument {
    let dimension = tile_dimension(namespace);

    let mut pipeline = Vec::with_capacity(caller.len() + 4);
    pipeline.push(Stage::Builtin(BuiltinStage::Reader {
        url: read_url(base_url, &tile.bounds),
        buffer: (buffer > 0.0).then_some(buffer),
    }));
    pipeline.push(Stage::Builtin(BuiltinStage::Ferry {
        dimensions: format!("OriginId={}", dimension),
    }));
    pipeline.push(Stage::Builtin(BuiltinStage::Assign {
        assignment: format!("{}[:]={}", dimension, tile.id),
    }));
    pipeline.extend(caller.stages().iter().cloned().map(Stage::Caller));
    pipeline.push(Stage::Builtin(BuiltinStage::Writer {
        name: namespace.to_string(),
    }));

    PipelineDocument { pipeline }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
