//! # Overview
//!
//! The pathfinder family.
//!
//! [`AyStar`] is a reusable A* engine with a hashed node store and pluggable
//! cost, heuristic, neighbour and end-check callbacks, preemptible by a
//! loops-per-tick budget. [`npf`] builds the per-transport-mode route
//! planners on top of it, including the path-reservation commit. The
//! bounded depth-first [`follow`] walker is the older machinery that signal
//! propagation and the depot-search fallbacks still use.

pub mod aystar;
pub mod follow;
pub mod npf;

pub use aystar::{
    AyStar, AyStarNode, AyStarStatus, PathEntry, SearchDomain,
};
pub use follow::TrackFollower;
pub use npf::{Npf, NpfResult, NpfTarget, PbsMode};
