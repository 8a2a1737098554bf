//! # Overview
//!
//! A crate for running a deterministic, tick-driven transport simulation:
//! a packed tile grid, self-routing trains, road vehicles and ships, a
//! path-reservation signalling engine, and a computer player that builds
//! routes with the same commands a human would issue.
//!
//! The heavy lifting lives in the workspace crates; this crate re-exports
//! the pieces through a [`prelude`] and ships the headless demo binary.

/// Exports commonly-used elements of the workspace crates.
pub mod prelude;

pub use tycio::{build_simulation, read_scenario, write_scenario, Scenario};
pub use tycsim::SimulationContext;
