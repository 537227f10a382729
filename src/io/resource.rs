//! Resource info queries against the Greyhound server.

use crate::index::Bounds;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Info returned by `<base>/info`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    /// Horizontal extent; the elevation axis is dropped
    pub bounds: Bounds,

    /// Point count, when the server reports one
    pub num_points: Option<u64>,

    /// Spatial reference, when the server reports one
    pub srs: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    bounds: Vec<f64>,
    #[serde(default, rename = "numPoints")]
    num_points: Option<u64>,
    #[serde(default)]
    srs: Option<String>,
}

impl ResourceInfo {
    /// Parse an info response body.
    ///
    /// Six-element bounds are `[minX, minY, minZ, maxX, maxY, maxZ]`; four-element
    /// bounds are taken as `[minX, minY, maxX, maxY]`.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: RawInfo = serde_json::from_slice(body).context("Malformed resource info")?;

        let b = &raw.bounds;
        let bounds = match b.len() {
            4 => Bounds::new(b[0], b[1], b[2], b[3]),
            n if n >= 6 => Bounds::new(b[0], b[1], b[3], b[4]),
            n => anyhow::bail!("Resource info bounds has {} elements, expected 4 or 6", n),
        }
        .context("Resource info reported unusable bounds")?;

        Ok(Self {
            bounds,
            num_points: raw.num_points,
            srs: raw.srs,
        })
    }
}

/// Source of resource info, abstracted for testing.
pub trait InfoSource: Send + Sync {
    /// Fetch the info document for the resource rooted at `base_url`.
    fn fetch_info(&self, base_url: &str) -> impl Future<Output = Result<ResourceInfo>> + Send;
}

/// Info source backed by reqwest.
pub struct HttpResource {
    client: reqwest::Client,
}

impl HttpResource {
    /// Create a client with the default 30s timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(30)
    }

    /// Create a client with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl InfoSource for HttpResource {
    async fn fetch_info(&self, base_url: &str) -> Result<ResourceInfo> {
        let url = format!("{}info", base_url);
        tracing::debug!("Fetching resource info from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} from {}", status, url);
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response from {}", url))?;

        ResourceInfo::from_json(&body).with_context(|| format!("Bad info response from {}", url))
    }
}

/// Build the read query URL for a tile.
///
/// Bounds are written as a compact JSON array; integral values carry no
/// fractional part (`[0,0,5,5]`).
pub fn read_url(base_url: &str, bounds: &Bounds) -> String {
    let parts: Vec<String> = bounds.to_array().iter().map(|v| format_number(*v)).collect();
    format!("{}read?bounds=[{}]", base_url, parts.join(","))
}

/// Shortest round-trip form of `v`, switching to exponent notation below
/// 1e-6 and at or above 1e21 (`5.551115123125783e-17`, `1e+21`).
fn format_number(v: f64) -> String {
    let magnitude = v.abs();
    if v != 0.0 && (magnitude < 1e-6 || magnitude >= 1e21) {
        let formatted = format!("{:e}", v);
        match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        }
    } else {
        format!("{}", v)
    }
}
