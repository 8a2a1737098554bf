//! Tunnel traversal: dive in at one portal, surface at the other.

use rusty_tycoon::prelude::*;
use tycworld::tunnel;
use tycworld::vehicle::TrainVeh;

mod common;
use common::{cmd, engine_in_depot, rail_line, start};

/// Lays rail up to a hill, a 5-tile tunnel under it, and rail beyond.
fn build_tunnel_line(sim: &mut SimulationContext) -> (TileIndex, TileIndex) {
    rail_line(sim, 40, 20, 30);
    let near = sim.world.grid.tile_xy(30, 40);
    let far = sim.world.grid.tile_xy(35, 40);
    tunnel::make_tunnel(
        &mut sim.world.grid,
        near,
        Owner::Player(0),
        TransportType::Rail,
        DiagDirection::SW,
        RailType::Rail,
    );
    tunnel::make_tunnel(
        &mut sim.world.grid,
        far,
        Owner::Player(0),
        TransportType::Rail,
        DiagDirection::NE,
        RailType::Rail,
    );
    rail_line(sim, 40, 36, 50);
    (near, far)
}

#[test]
fn tunnel_length_is_measured_between_the_portals() {
    let mut sim = common::new_sim();
    let (near, far) = build_tunnel_line(&mut sim);
    let (found, len) =
        tunnel::find_length_of_tunnel(&sim.world.grid, near, DiagDirection::SW);
    assert_eq!(found, far);
    assert_eq!(len, 5);
}

#[test]
fn train_hides_through_the_tunnel_and_surfaces_beyond() {
    let mut sim = common::new_sim();
    let (_near, far) = build_tunnel_line(&mut sim);
    let head = engine_in_depot(&mut sim, 19, 40);
    start(&mut sim, head);

    let mut was_hidden = false;
    for _ in 0..74 * 12 {
        sim.run_tick();
        let v = sim.world.vehicles.get(head);
        if v.train().track == TrainVeh::TRACK_IN_TUNNEL {
            assert!(v.flags.has(tycworld::VehicleFlags::HIDDEN));
            was_hidden = true;
        }
        if was_hidden
            && v.train().track != TrainVeh::TRACK_IN_TUNNEL
            && !v.train().in_depot()
        {
            // Surfaced: the far portal is behind us, position visible.
            let x = sim.world.grid.tile_x(v.tile);
            assert!(x >= sim.world.grid.tile_x(far));
            assert!(!v.flags.has(tycworld::VehicleFlags::HIDDEN));
            return;
        }
    }
    panic!("train never made it through the tunnel");
}
