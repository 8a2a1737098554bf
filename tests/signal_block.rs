//! A straight line, one signal, one train: the classic block scenario.

use rusty_tycoon::prelude::*;
use tycworld::rail;

mod common;
use common::{add_coaches, cmd, engine_in_depot, rail_line, start};

#[test]
fn train_passes_a_green_signal_and_it_stays_green() {
    let mut sim = common::new_sim();
    rail_line(&mut sim, 40, 20, 60);
    let sig = sim.world.grid.tile_xy(30, 40);
    cmd(&mut sim, sig, 0, 0, CommandId::BuildSignals);

    // A freshly built signal shows green both ways over an empty line.
    assert_eq!(
        rail::signal_state(&sim.world.grid, sig, Trackdir::Diag1Sw),
        SignalState::Green
    );

    let engine = engine_in_depot(&mut sim, 19, 40);
    add_coaches(&mut sim, engine, 1);
    let goal = sim.world.grid.tile_xy(55, 40);
    {
        let v = sim.world.vehicles.get_mut(engine);
        v.dest_tile = goal;
    }
    start(&mut sim, engine);

    let mut passed = false;
    for _ in 0..74 * 10 {
        sim.run_tick();
        let head = sim.world.vehicles.get(engine);
        let x = sim.world.grid.tile_x(head.tile);
        if x > 30 {
            passed = true;
        }
        // The signal ahead of (and then behind) the train keeps showing
        // green: the segment it admits into stays empty.
        assert_eq!(
            rail::signal_state(&sim.world.grid, sig, Trackdir::Diag1Sw),
            SignalState::Green
        );
        if x >= 50 {
            break;
        }
    }
    assert!(passed, "train never passed the signal");
}

#[test]
fn signal_guarding_an_occupied_segment_goes_red() {
    let mut sim = common::new_sim();
    rail_line(&mut sim, 40, 20, 60);
    let sig = sim.world.grid.tile_xy(30, 40);
    cmd(&mut sim, sig, 0, 0, CommandId::BuildSignals);

    // Park a second engine beyond the signal, then walk the guarded
    // segment: the admitting facing must drop to red.
    let parked = engine_in_depot(&mut sim, 62, 40);
    // Hoist it out of the depot onto the plain line at x = 45.
    {
        let tile = sim.world.grid.tile_xy(45, 40);
        let v = sim.world.vehicles.get_mut(parked);
        v.tile = tile;
        v.x_pos = 45 * 16 + 8;
        v.y_pos = 40 * 16 + 8;
        v.direction = Direction::SW;
        v.flags.clear(tycworld::VehicleFlags::HIDDEN);
        v.train_mut().track = Track::Diag1.bit().0;
    }
    sim.world.vehicles.position_changed(parked);

    update_signals_on_segment(
        &mut sim.world,
        &mut sim.follower,
        sig,
        Direction::SW,
    );
    assert_eq!(
        rail::signal_state(&sim.world.grid, sig, Trackdir::Diag1Sw),
        SignalState::Red
    );
    // The other facing is driven by the (empty) western segment.
    update_signals_on_segment(
        &mut sim.world,
        &mut sim.follower,
        sig,
        Direction::NE,
    );
    assert_eq!(
        rail::signal_state(&sim.world.grid, sig, Trackdir::Diag1Ne),
        SignalState::Green
    );
}
