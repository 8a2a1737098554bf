//! Signal propagation over track segments.
//!
//! A segment is a maximal run of connected rail bounded by signals and
//! depots. One update walks the segment, decides whether it is occupied,
//! derives the target state of every signal pointing into it, and flips the
//! changed ones. Changing a presignal exit re-triggers the update on its
//! far side, through an explicit bounded stack.

use log::debug;

use tycmap::{DiagDirection, Direction, TileIndex};
use tyctrack::{
    signal_against_trackdir, signal_along_trackdir, Trackdir, TrackdirBits,
};
use tycworld::vehicle::TrainVeh;
use tycworld::{
    rail, tunnel, SignalType, TransportType, VehicleKind, World,
};
use tycpath::TrackFollower;

/// Most signals one segment update will track.
const NUM_SSD_ENTRY: usize = 256;
/// Most pending recursive segment updates.
const NUM_SSD_STACK: usize = 32;

#[derive(Default)]
struct SegmentSignals {
    /// Signals pointing into the segment: tile plus the walking trackdir
    /// they were seen against.
    signals: Vec<(TileIndex, Trackdir)>,
    /// All signal tiles in the segment, for path-signal promotion.
    pbs_tiles: Vec<TileIndex>,
    has_presignal: bool,
    /// Path signals seen, clamped at two.
    pbs_count: u8,
    pbs_entry_seen: bool,
    pbs_exit_seen: bool,
    presignal_exits: i32,
    presignal_exits_free: i32,
    /// A train occupies the segment.
    stop: bool,
}

fn collect_segment(
    world: &World,
    follower: &mut TrackFollower,
    tile: TileIndex,
    dir: DiagDirection,
) -> SegmentSignals {
    let mut ssd = SegmentSignals::default();

    // The walk starts just past `tile`; a signal on the start tile that
    // admits traffic into the walked segment belongs to it as well.
    let start_td = tyctrack::diagdir_to_diag_trackdir(dir);
    if rail::is_rail_tile(&world.grid, tile)
        && rail::has_signals(&world.grid, tile)
        && world.grid.m3(tile) & signal_along_trackdir(start_td) != 0
    {
        ssd.signals.push((tile, start_td.reverse()));
        ssd.has_presignal |= world.grid.m4(tile) & 1 != 0;
        if world.is_pbs_signal(tile, start_td) {
            ssd.pbs_entry_seen = true;
            ssd.pbs_count = (ssd.pbs_count + 1).min(2);
        }
        if ssd.pbs_tiles.len() < NUM_SSD_ENTRY {
            ssd.pbs_tiles.push(tile);
        }
    }

    follower.follow(
        world,
        tile,
        dir,
        TransportType::Rail,
        &mut |world, t, td, _len| {
            let grid = &world.grid;
            if !rail::is_rail_tile(grid, t) {
                return false;
            }
            if rail::is_rail_depot(grid, t) {
                // Depots bound the segment.
                return true;
            }
            if !rail::has_signal_on_track(grid, t, td.track()) {
                return false;
            }

            let m3 = grid.m3(t);
            let m4 = grid.m4(t);
            let is_pbs = world.settings.new_pathfinding_all
                && rail::signal_type(grid, t) == SignalType::Pbs;

            if m3 & signal_against_trackdir(td) != 0 {
                // A signal pointing into the segment; it will be driven.
                if ssd.signals.len() < NUM_SSD_ENTRY {
                    ssd.signals.push((t, td));
                }
                if is_pbs
                    && rail::has_signal_on_trackdir(grid, t, td.reverse())
                {
                    ssd.pbs_entry_seen = true;
                }
                ssd.has_presignal |= m4 & 1 != 0;
            }

            if is_pbs {
                ssd.pbs_count = (ssd.pbs_count + 1).min(2);
            }

            if ssd.pbs_tiles.len() < NUM_SSD_ENTRY {
                ssd.pbs_tiles.push(t);
            }

            if m3 & signal_along_trackdir(td) != 0 {
                if m4 & 2 != 0 {
                    // An exit signal pointing out of the segment.
                    ssd.presignal_exits += 1;
                    if grid.m2(t) as u8 & signal_along_trackdir(td) != 0 {
                        ssd.presignal_exits_free += 1;
                    }
                }
                if is_pbs
                    && rail::has_signal_on_trackdir(grid, t, td)
                {
                    ssd.pbs_exit_seen = true;
                }
            }

            true
        },
    );
    ssd
}

/// Is any train standing on this visited piece of the segment?
fn vehicle_on_tracks(
    world: &World,
    tile: TileIndex,
    trackdirs: TrackdirBits,
) -> bool {
    let grid = &world.grid;

    if tunnel::is_tunnel_entrance(grid, tile) {
        // Tunnels hide their occupants; check both portals for a train
        // still visible, and every body tile for a hidden one.
        let dir = tunnel::tunnel_dir(grid, tile);
        let (far, _) = tunnel::find_length_of_tunnel(grid, tile, dir);
        let portal_track =
            tyctrack::diagdir_to_diag_trackdir(dir).track().bit();
        for portal in [tile, far] {
            if world
                .vehicles
                .vehicle_from_pos(grid, portal, &mut |v| {
                    v.kind() == Some(VehicleKind::Train)
                        && v.tile == portal
                        && v.train().track & portal_track.0 != 0
                })
                .is_some()
            {
                return true;
            }
        }
        let mut t = tile;
        while t != far {
            if world
                .vehicles
                .vehicle_from_pos(grid, t, &mut |v| {
                    v.kind() == Some(VehicleKind::Train)
                        && v.train().track == TrainVeh::TRACK_IN_TUNNEL
                        && v.tile == t
                })
                .is_some()
            {
                return true;
            }
            t = match grid.neighbour(t, dir) {
                Some(next) => next,
                None => break,
            };
        }
        return false;
    }

    let tracks = trackdirs.track_bits();
    world
        .vehicles
        .vehicle_from_pos(grid, tile, &mut |v| {
            v.kind() == Some(VehicleKind::Train)
                && v.tile == tile
                && v.train().track & tracks.0 != 0
        })
        .is_some()
}

fn change_signal_states(
    world: &mut World,
    ssd: &SegmentSignals,
    stack: &mut Vec<(TileIndex, DiagDirection)>,
) {
    // A whole block of path signals with an entry and an exit, no
    // presignals in the way, and nobody inside: promote it outright.
    if world.settings.auto_pbs_placement
        && !ssd.stop
        && ssd.pbs_count >= 2
        && ssd.pbs_entry_seen
        && ssd.pbs_exit_seen
        && !ssd.has_presignal
        && ssd.presignal_exits == 0
    {
        for &tile in &ssd.pbs_tiles {
            if rail::has_signals(&world.grid, tile) {
                rail::set_signal_type(&mut world.grid, tile, SignalType::Pbs);
            }
        }
    }

    for &(tile, td) in &ssd.signals {
        let bit = signal_against_trackdir(td) as u16;
        let m2 = world.grid.m2(tile);
        let m3 = world.grid.m3(tile);
        let m4 = world.grid.m4(tile);

        let mut make_red = ssd.stop;

        // Presignals stay red while every exit of the block is occupied.
        if m4 & 1 != 0 {
            let mut ex = ssd.presignal_exits;
            let mut exfree = ssd.presignal_exits_free;

            // A dual combo signal must not count itself as its own exit.
            if m4 & 2 != 0 && m3 & signal_along_trackdir(td) != 0 {
                ex -= 1;
                if m2 as u8 & signal_along_trackdir(td) != 0 {
                    exfree -= 1;
                }
            }
            if ex > 0 && exfree == 0 {
                make_red = true;
            }
        }

        let currently_green = m2 & bit != 0;
        if make_red == !currently_green {
            // Unaffected.
            continue;
        }

        // A changed exit signal drives the segment on its far side.
        if m4 & 2 != 0 {
            if stack.len() < NUM_SSD_STACK {
                stack.push((tile, td.exitdir()));
            } else {
                debug!("signal update stack exhausted at {:?}", tile);
            }
        }

        world.grid.set_m2(tile, m2 ^ bit);
    }
}

/// Updates every signal bounding the segment entered from `tile` towards
/// `dir`. Returns whether the starting segment was occupied.
pub fn update_signals_on_segment(
    world: &mut World,
    follower: &mut TrackFollower,
    tile: TileIndex,
    dir: Direction,
) -> bool {
    let mut stack: Vec<(TileIndex, DiagDirection)> = Vec::new();
    let mut cur = (tile, dir.to_diagdir());
    let mut first_result: Option<bool> = None;

    loop {
        let mut ssd = collect_segment(world, follower, cur.0, cur.1);
        for (t, dirs) in follower.visited().to_vec() {
            if vehicle_on_tracks(world, t, dirs) {
                ssd.stop = true;
                break;
            }
        }
        change_signal_states(world, &ssd, &mut stack);
        if first_result.is_none() {
            first_result = Some(ssd.stop);
        }
        match stack.pop() {
            Some(next) => cur = next,
            None => break,
        }
    }

    first_result.unwrap_or(false)
}

/// One update in each direction a track can be left in.
pub fn set_signals_on_both_dir(
    world: &mut World,
    follower: &mut TrackFollower,
    tile: TileIndex,
    track: tyctrack::Track,
) {
    let td = track.to_trackdir();
    update_signals_on_segment(
        world,
        follower,
        tile,
        td.exitdir().to_direction(),
    );
    update_signals_on_segment(
        world,
        follower,
        tile,
        td.reverse().exitdir().to_direction(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tycmap::Owner;
    use tyctrack::Track;
    use tycworld::rail::{
        add_signals_on_track, make_plain_rail, make_signal_tile,
        signal_state, RailType, SignalState,
    };

    fn rail_line(world: &mut World, y: u32, x0: u32, x1: u32) {
        for x in x0..x1 {
            let tile = world.grid.tile_xy(x, y);
            make_plain_rail(
                &mut world.grid,
                tile,
                Owner::Player(0),
                RailType::Rail,
                Track::Diag1.bit(),
            );
        }
    }

    #[test]
    fn empty_segment_turns_its_signal_green() {
        let mut world = World::new(6, 6);
        rail_line(&mut world, 5, 5, 25);
        let sig = world.grid.tile_xy(15, 5);
        make_signal_tile(&mut world.grid, sig);
        add_signals_on_track(&mut world.grid, sig, Track::Diag1);
        assert_eq!(
            signal_state(&world.grid, sig, Trackdir::Diag1Sw),
            SignalState::Red
        );
        let mut follower = TrackFollower::new();
        // Walk the guarded segment from inside; the walk reaches the
        // bounding signal tile, sees nobody home, and flips it green.
        let start_tile = world.grid.tile_xy(20, 5);
        let occupied = update_signals_on_segment(
            &mut world,
            &mut follower,
            start_tile,
            Direction::NE,
        );
        assert!(!occupied);
        // The facing that admits trains into the walked segment changes.
        assert_eq!(
            signal_state(&world.grid, sig, Trackdir::Diag1Sw),
            SignalState::Green
        );
        // The other facing guards the segment behind us and stays put.
        assert_eq!(
            signal_state(&world.grid, sig, Trackdir::Diag1Ne),
            SignalState::Red
        );
    }
}
