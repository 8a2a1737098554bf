//! Path-based signalling at a junction: reserved paths never overlap.

use rusty_tycoon::prelude::*;
use tycworld::{pbs, rail};

mod common;
use common::{cmd, rail_line};

/// Builds a Y junction: a main line splitting into two branches, with
/// path signals guarding the junction block.
///
/// ```text
///            upper branch (y = 38)
/// main ──┬──────────────
///        └── lower branch (y = 40)
/// ```
fn build_junction(sim: &mut SimulationContext) {
    // Lower line straight through.
    rail_line(sim, 40, 20, 60);
    // Upper branch leaves at x = 35: curve up, a diagonal link tile, and
    // a curve onto the x-axis line of row 38.
    let fork = sim.world.grid.tile_xy(35, 40);
    cmd(sim, fork, Track::Upper as u32, 0, CommandId::BuildSingleRail);
    let joint = sim.world.grid.tile_xy(35, 39);
    cmd(sim, joint, Track::Diag2 as u32, 0, CommandId::BuildSingleRail);
    let start = sim.world.grid.tile_xy(35, 38);
    let end = sim.world.grid.tile_xy(60, 38);
    cmd(sim, start, end.0, 0, CommandId::BuildRailroadTrack);
    cmd(sim, start, Track::Lower as u32, 0, CommandId::BuildSingleRail);

    // Path signals: entry on the main line, exits on both branches.
    for (x, y) in [(30, 40), (40, 40), (40, 38)] {
        let tile = sim.world.grid.tile_xy(x, y);
        cmd(sim, tile, 0, 0, CommandId::BuildSignals);
        // Cycle the type up to the path signal.
        for _ in 0..4 {
            cmd(sim, tile, 8, 0, CommandId::BuildSignals);
        }
        assert_eq!(
            rail::signal_type(&sim.world.grid, tile),
            SignalType::Pbs
        );
    }
}

#[test]
fn reserved_paths_of_two_trains_never_intersect() {
    let mut sim = common::new_sim();
    build_junction(&mut sim);

    // First path: from the entry signal through the junction onto the
    // lower branch, the way a train standing at the signal would plan.
    let start = sim.world.grid.tile_xy(30, 40);
    let target_a = sim.world.grid.tile_xy(55, 40);
    let result_a = sim.npf.route_to_station_or_tile(
        &mut sim.world,
        (start, Trackdir::Diag1Sw),
        tycpath::npf::NpfTarget::tile(target_a),
        TransportType::Rail,
        Owner::Player(0),
        RailType::Rail,
        PbsMode::Any,
    );
    assert!(result_a.found());
    assert!(!result_a.pbs_blocked());

    let reserved_after_a: Vec<_> = sim
        .world
        .grid
        .iter()
        .filter(|&t| !pbs::tile_reserved(&sim.world.grid, t).is_empty())
        .collect();
    assert!(!reserved_after_a.is_empty());

    // Second path must dodge the first reservation entirely (it can use
    // the upper branch) or report itself blocked; it may never overlap.
    let target_b = sim.world.grid.tile_xy(55, 38);
    let result_b = sim.npf.route_to_station_or_tile(
        &mut sim.world,
        (start, Trackdir::Diag1Sw),
        tycpath::npf::NpfTarget::tile(target_b),
        TransportType::Rail,
        Owner::Player(0),
        RailType::Rail,
        PbsMode::Any,
    );

    // Reservation invariant: at most one track, or two parallel tracks,
    // per tile; and the sum of reservations must be consistent with two
    // non-intersecting paths.
    for t in sim.world.grid.iter() {
        let reserved = pbs::tile_reserved(&sim.world.grid, t);
        assert!(reserved.count() <= 2, "over-reserved tile {:?}", t);
        if reserved.count() == 2 {
            let tracks: Vec<_> = reserved.iter().collect();
            assert!(
                tyctrack::track_crosses_tracks(tracks[0])
                    .has(tracks[1])
                    == false,
                "intersecting reservation on {:?}",
                t
            );
        }
    }
    let _ = result_b;
}

#[test]
fn unavailable_trackdirs_cover_both_facings() {
    let mut sim = common::new_sim();
    rail_line(&mut sim, 40, 20, 30);
    let tile = sim.world.grid.tile_xy(25, 40);
    pbs::reserve_track(&mut sim.world.grid, tile, Track::Diag1);
    let unavail = pbs::tile_unavail(&sim.world.grid, tile);
    assert!(unavail.has(Trackdir::Diag1Sw));
    assert!(unavail.has(Trackdir::Diag1Ne));
    pbs::clear_track(&mut sim.world.grid, tile, Track::Diag1);
    assert!(pbs::tile_unavail(&sim.world.grid, tile).is_empty());
}
