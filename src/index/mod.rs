//! Tile grid planning over the resource bounds.

mod tile_grid;

pub use tile_grid::{Bounds, GridSpec, Tile, TileGrid};
