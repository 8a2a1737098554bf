//! # Overview
//!
//! The tick engine.
//!
//! A [`SimulationContext`] owns the world plus the scratch machinery the
//! tick needs (pathfinder buffers, the deterministic random stream, the
//! acting player). Once per tick it advances every vehicle in pool order
//! through its controller, which is the dispatch order everything
//! downstream relies on for determinism. All state mutation from outside
//! goes through [`command::do_command`].

pub mod ai;
pub mod command;
pub mod cmd_order;
pub mod cmd_player;
pub mod cmd_rail;
pub mod cmd_road;
pub mod cmd_station;
pub mod cmd_terrain;
pub mod cmd_vehicle;
pub mod context;
pub mod effects;
pub mod enter;
pub mod movement;
pub mod random;
pub mod roadveh;
pub mod ship;
pub mod signal;
pub mod train;

pub use command::{do_command, CommandFlags, CommandId};
pub use context::SimulationContext;
pub use random::SimRandom;
pub use signal::update_signals_on_segment;
