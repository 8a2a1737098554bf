//! # Overview
//!
//! The mutable simulation world.
//!
//! This crate owns everything the tick loop reads and writes: the typed
//! views over the packed tile grid (rail, road, tunnels, stations), the
//! per-tile path reservations, the vehicle pool with its spatial hash, the
//! order lists, and the id-indexed pools for stations, depots, waypoints,
//! towns and industries. It knows the meaning of every payload bit, but it
//! never decides anything: deciding is what the pathfinders and the
//! controllers built on top of it do.

pub mod calendar;
pub mod engine;
pub mod error;
pub mod order;
pub mod pbs;
pub mod player;
pub mod rail;
pub mod road;
pub mod settings;
pub mod station;
pub mod status;
pub mod town;
pub mod tunnel;
pub mod vehicle;
pub mod world;

pub use calendar::{Calendar, DAYS_PER_YEAR, TICKS_PER_DAY};
pub use engine::{CargoKind, EngineId, EngineInfo, EngineKind};
pub use error::{CommandError, Money};
pub use order::{Order, OrderFlags, OrderId, OrderKind, OrderPool};
pub use player::{Player, PlayerId, MAX_PLAYERS};
pub use rail::{RailTileKind, RailType, SignalState, SignalType};
pub use settings::Settings;
pub use station::{
    RoadStop, RoadStopKind, Station, StationId, StationPool,
};
pub use status::{track_status, TrackStatus, TransportType};
pub use town::{Industry, IndustryId, Town, TownId};
pub use vehicle::{
    EffectKind, Vehicle, VehicleFlags, VehicleId, VehicleKind,
    VehiclePool, VehicleSubtype,
};
pub use world::{Depot, DepotId, Waypoint, WaypointId, World};
