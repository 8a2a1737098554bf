//! # Overview
//!
//! Grid geometry and packed per-tile storage for the simulation world.
//!
//! The world is a rectangle of 16×16-pixel tiles whose side lengths are
//! powers of two. A [`TileIndex`] packs the `(x, y)` coordinate of a tile
//! into a single integer, and [`Grid`] owns one packed [`TileData`] record
//! per tile. Everything here is pure coordinate and bit arithmetic; the
//! meaning of the kind-specific payload bytes lives in higher layers.

pub mod coord;
pub mod grid;
pub mod slope;

pub use coord::{
    DiagDirection, Direction, TileDiff, TileIndex, TILE_HEIGHT_STEP,
    TILE_SIZE,
};

pub use grid::{Grid, Owner, TileData, TileKind};

pub use slope::{partial_z, Slope};
