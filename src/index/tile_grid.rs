//! Partition the resource bounds into a square grid of tiles.

use anyhow::Result;

/// Axis-aligned 2-D bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Create bounds, rejecting empty or inverted boxes.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let bounds = Self {
            min_x,
            min_y,
            max_x,
            max_y,
        };
        if !bounds.is_valid() {
            anyhow::bail!(
                "Invalid bounds [{}, {}, {}, {}]: max must exceed min on both axes",
                min_x,
                min_y,
                max_x,
                max_y
            );
        }
        Ok(bounds)
    }

    /// True when both axes have positive, finite extent.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.max_x > self.min_x
            && self.max_y > self.min_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn depth(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// The bounds as `[min_x, min_y, max_x, max_y]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// Grid parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    /// Side length of the grid (steps² tiles)
    pub steps: usize,

    /// Buffer fraction forwarded to the reader; the grid itself never inflates tiles
    pub buffer: f64,
}

/// A single tile of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    /// Enumeration sequence number, also the output file stem and point tag
    pub id: u32,

    /// X-partition index
    pub col_idx: usize,

    /// Y-partition index
    pub row_idx: usize,

    pub bounds: Bounds,
}

/// Square tiling of a bounding box.
#[derive(Debug, Clone)]
pub struct TileGrid {
    pub bounds: Bounds,
    pub spec: GridSpec,
}

impl TileGrid {
    /// Create a grid over `bounds`.
    pub fn new(bounds: Bounds, spec: GridSpec) -> Result<Self> {
        if spec.steps == 0 {
            anyhow::bail!("Grid steps must be > 0");
        }
        let total = spec.steps.checked_mul(spec.steps);
        if total.map_or(true, |t| t > u32::MAX as usize) {
            anyhow::bail!("Grid of {}x{} tiles is too large", spec.steps, spec.steps);
        }

        tracing::debug!(
            "Tile grid: {}x{} over [{}, {}, {}, {}]",
            spec.steps,
            spec.steps,
            bounds.min_x,
            bounds.min_y,
            bounds.max_x,
            bounds.max_y
        );

        Ok(Self { bounds, spec })
    }

    /// Total number of tiles.
    pub fn num_tiles(&self) -> usize {
        self.spec.steps * self.spec.steps
    }

    /// Bounds of the tile at X-partition `i` and Y-partition `j`.
    ///
    /// The last row and column keep whatever floating-point remainder the
    /// arithmetic produces; nothing is snapped to the outer bounds.
    pub fn tile_bounds(&self, i: usize, j: usize) -> Bounds {
        let steps = self.spec.steps as f64;
        let tile_width = self.bounds.width() / steps;
        let tile_depth = self.bounds.depth() / steps;

        Bounds {
            min_x: self.bounds.min_x + tile_width * i as f64,
            min_y: self.bounds.min_y + tile_depth * j as f64,
            max_x: self.bounds.min_x + tile_width * (i + 1) as f64,
            max_y: self.bounds.min_y + tile_depth * (j + 1) as f64,
        }
    }

    /// Enumerate all tiles: X index outer, Y index inner, ids counting from 0.
    ///
    /// Ids name the output files and are written into every point, so this
    /// order must not change.
    pub fn enumerate_tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        let steps = self.spec.steps;
        (0..steps).flat_map(move |i| {
            (0..steps).map(move |j| Tile {
                id: (i * steps + j) as u32,
                col_idx: i,
                row_idx: j,
                bounds: self.tile_bounds(i, j),
            })
        })
    }
}
