//! A train may only leave its depot when the exit block allows it.

use rusty_tycoon::prelude::*;
use tycworld::pbs;
use tycworld::vehicle::TrainVeh;

mod common;
use common::{cmd, engine_in_depot, rail_line, start};

#[test]
fn train_waits_out_the_dwell_timer_before_leaving() {
    let mut sim = common::new_sim();
    rail_line(&mut sim, 40, 20, 40);
    let head = engine_in_depot(&mut sim, 19, 40);
    start(&mut sim, head);

    // Well inside the dwell window nothing happens.
    sim.run_ticks(20);
    assert!(sim.world.vehicles.get(head).train().in_depot());

    // After the dwell plus some slack the shed doors open.
    sim.run_ticks(60);
    assert!(!sim.world.vehicles.get(head).train().in_depot());
}

#[test]
fn depot_search_falls_back_to_the_old_walker() {
    let mut sim = common::new_sim();
    sim.world.settings.new_pathfinding_all = false;
    rail_line(&mut sim, 40, 20, 40);
    let head = engine_in_depot(&mut sim, 19, 40);
    // A second shed further up the line, mouth facing the train.
    let target = sim.world.grid.tile_xy(41, 40);
    cmd(&mut sim, target, 0, 0, CommandId::BuildTrainDepot);

    start(&mut sim, head);
    sim.run_ticks(74 * 3);
    assert!(!sim.world.vehicles.get(head).train().in_depot());

    // With the new pathfinder off, the old bounded walker still finds
    // the depot ahead.
    cmd(
        &mut sim,
        TileIndex(0),
        head.0 as u32,
        0,
        CommandId::SendTrainToDepot,
    );
    let v = sim.world.vehicles.get(head);
    assert_eq!(v.current_order.kind, OrderKind::GotoDepot);
    assert_eq!(v.dest_tile, target);
}

#[test]
fn reserved_exit_track_keeps_the_train_inside() {
    let mut sim = common::new_sim();
    rail_line(&mut sim, 40, 20, 40);
    // A path signal right outside makes the depot exit a reservation
    // block.
    let sig = sim.world.grid.tile_xy(25, 40);
    cmd(&mut sim, sig, 0, 0, CommandId::BuildSignals);
    for _ in 0..4 {
        cmd(&mut sim, sig, 8, 0, CommandId::BuildSignals);
    }

    let head = engine_in_depot(&mut sim, 19, 40);

    // Another train holds the depot's own exit track.
    let depot = sim.world.grid.tile_xy(19, 40);
    pbs::reserve_track(&mut sim.world.grid, depot, Track::Diag1);

    start(&mut sim, head);
    sim.run_ticks(200);
    let v = sim.world.vehicles.get(head);
    assert_eq!(v.train().track, TrainVeh::TRACK_IN_DEPOT);
    assert!(v.flags.has(tycworld::VehicleFlags::HIDDEN));

    // Dropping the reservation frees the way out.
    pbs::clear_track(&mut sim.world.grid, depot, Track::Diag1);
    sim.run_ticks(200);
    assert!(!sim.world.vehicles.get(head).train().in_depot());
}
