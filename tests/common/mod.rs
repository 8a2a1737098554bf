//! Shared helpers for the end-to-end scenarios.

use rusty_tycoon::prelude::*;

pub fn init() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .is_test(true)
    .try_init();
}

pub fn new_sim() -> SimulationContext {
    init();
    SimulationContext::new(7, 7, 1234)
}

/// Issues a command for player 0 and unwraps the cost.
pub fn cmd(
    sim: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    id: CommandId,
) -> Money {
    do_command(sim, tile, p1, p2, CommandFlags::EXEC, id)
        .unwrap_or_else(|e| panic!("{:?} failed: {}", id, e))
}

/// Lays a straight x-axis rail line on row `y` from `x0` to `x1`
/// inclusive.
pub fn rail_line(sim: &mut SimulationContext, y: u32, x0: u32, x1: u32) {
    let start = sim.world.grid.tile_xy(x0, y);
    let end = sim.world.grid.tile_xy(x1, y);
    cmd(sim, start, end.0, 0, CommandId::BuildRailroadTrack);
}

/// Builds a depot at `(x, y)` whose mouth faces +x, an engine inside it,
/// and returns the engine's id.
pub fn engine_in_depot(
    sim: &mut SimulationContext,
    x: u32,
    y: u32,
) -> VehicleId {
    let depot = sim.world.grid.tile_xy(x, y);
    cmd(sim, depot, 2, 0, CommandId::BuildTrainDepot);
    let before: Vec<VehicleId> =
        sim.world.vehicles.iter_ids().collect();
    cmd(sim, depot, 1, 0, CommandId::BuildRailVehicle);
    sim.world
        .vehicles
        .iter_ids()
        .find(|id| !before.contains(id))
        .expect("engine was built")
}

/// Couples `count` passenger cars behind `engine` inside its depot.
pub fn add_coaches(
    sim: &mut SimulationContext,
    engine: VehicleId,
    count: u32,
) {
    let depot = sim.world.vehicles.get(engine).tile;
    for _ in 0..count {
        let before: Vec<VehicleId> =
            sim.world.vehicles.iter_ids().collect();
        cmd(sim, depot, 4, 0, CommandId::BuildRailVehicle);
        let wagon = sim
            .world
            .vehicles
            .iter_ids()
            .find(|id| !before.contains(id))
            .expect("wagon was built");
        cmd(
            sim,
            depot,
            wagon.0 as u32 | ((engine.0 as u32) << 16),
            0,
            CommandId::MoveRailVehicle,
        );
    }
}

/// Starts a stopped vehicle.
pub fn start(sim: &mut SimulationContext, id: VehicleId) {
    cmd(sim, TileIndex(0), id.0 as u32, 0, CommandId::StartStopTrain);
}
