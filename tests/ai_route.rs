//! The computer player plans and builds a bus route between two towns.

use rusty_tycoon::prelude::*;
use tycworld::{station, Town, TownId};

mod common;

#[test]
fn computer_player_builds_a_bus_route() {
    common::init();
    let mut sim = SimulationContext::new(7, 7, 77);
    let grid = &sim.world.grid;
    let a = grid.tile_xy(30, 40);
    let b = grid.tile_xy(70, 40);
    sim.world.towns.push(Town {
        id: TownId(0),
        xy: a,
        name: "Northam".into(),
        population: 2400,
        max_pass: 300,
        max_mail: 40,
        pct_pass_transported: 0,
        road_build_months: 0,
    });
    sim.world.towns.push(Town {
        id: TownId(1),
        xy: b,
        name: "Southbridge".into(),
        population: 1600,
        max_pass: 200,
        max_mail: 30,
        pct_pass_transported: 0,
        road_build_months: 0,
    });
    sim.world.players[1].is_ai = true;

    // Give the planner a year of game time on flat, empty land, plus a
    // grace period for the fleet purchases once the stops appear.
    let mut grace = 90;
    for _ in 0..366 {
        sim.run_ticks(74);
        let stops = sim
            .world
            .stations
            .iter()
            .map(|st| st.bus_stops.len())
            .sum::<usize>();
        if stops >= 2 {
            grace -= 1;
            if grace == 0 {
                break;
            }
        }
    }

    let stops: usize = sim
        .world
        .stations
        .iter()
        .map(|st| st.bus_stops.len())
        .sum();
    assert!(stops >= 2, "no bus stops were built");

    // The stops really exist on the map and belong to the computer
    // player.
    let mut found = 0;
    for tile in sim.world.grid.iter() {
        if station::is_road_stop_tile(&sim.world.grid, tile) {
            assert!(sim
                .world
                .grid
                .is_owner(tile, Owner::Player(1)));
            found += 1;
        }
    }
    assert_eq!(found, stops);

    // And a fleet was ordered for the route.
    let buses = sim
        .world
        .vehicles
        .iter_ids()
        .filter(|&id| {
            let v = sim.world.vehicles.get(id);
            v.kind() == Some(VehicleKind::Road)
                && v.owner == PlayerId(1)
        })
        .count();
    assert!(buses >= 1, "no buses were bought");
}
