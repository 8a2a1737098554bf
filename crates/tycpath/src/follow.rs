//! The bounded depth-first track follower.
//!
//! Older than the A* machinery and still load-bearing: signal-segment
//! updates and the path-signal segment scan always run on it, and the
//! train and road depot searches fall back to it when the new pathfinder
//! is switched off. It visits every trackdir reachable from a start,
//! deduplicated per tile, and hands each visit to a callback which may
//! stop the walk along that branch (at a signal, say). The visited set is
//! kept in insertion order so a later occupancy scan over it is
//! deterministic.

use tycmap::{DiagDirection, TileIndex};
use tyctrack::{exitdir_reaches_trackdirs, Trackdir, TrackdirBits};
use tycworld::{rail, track_status, tunnel, TransportType, World};

/// Entries the follower will remember before it stops extending.
const MAX_VISITED: usize = 0x400;

/// Hard ceiling on walk depth, in tiles.
const MAX_LENGTH: u32 = 0x400;

/// The walk callback: `(world, tile, trackdir, length)` → stop this branch.
pub type EnumProc<'a> =
    dyn FnMut(&World, TileIndex, Trackdir, u32) -> bool + 'a;

/// Reusable follower state; `follow` resets it.
#[derive(Default)]
pub struct TrackFollower {
    /// Visited trackdir bits per tile, in first-visit order.
    visited: Vec<(TileIndex, TrackdirBits)>,
    index: std::collections::HashMap<u32, usize>,
    overflowed: bool,
}

impl TrackFollower {
    pub fn new() -> TrackFollower {
        TrackFollower::default()
    }

    /// Every `(tile, trackdirs)` pair the last walk touched.
    pub fn visited(&self) -> &[(TileIndex, TrackdirBits)] {
        &self.visited
    }

    /// True when the last walk hit the bookkeeping cap and was truncated.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Walks every trackdir reachable from `tile` leaving in `dir`.
    ///
    /// The start tile itself is not enumerated; the first callback fires on
    /// the first tile stepped onto, mirroring how segment updates are run
    /// from a boundary.
    pub fn follow(
        &mut self,
        world: &World,
        tile: TileIndex,
        dir: DiagDirection,
        mode: TransportType,
        enum_proc: &mut EnumProc<'_>,
    ) {
        self.visited.clear();
        self.index.clear();
        self.overflowed = false;
        self.step(world, tile, dir, mode, 0, enum_proc);
    }

    fn mark(&mut self, tile: TileIndex, td: Trackdir) -> bool {
        if let Some(&slot) = self.index.get(&tile.0) {
            let bits = &mut self.visited[slot].1;
            if bits.has(td) {
                return false;
            }
            *bits = *bits | td.bit();
            return true;
        }
        if self.visited.len() >= MAX_VISITED {
            self.overflowed = true;
            return false;
        }
        self.index.insert(tile.0, self.visited.len());
        self.visited.push((tile, td.bit()));
        true
    }

    fn step(
        &mut self,
        world: &World,
        tile: TileIndex,
        dir: DiagDirection,
        mode: TransportType,
        length: u32,
        enum_proc: &mut EnumProc<'_>,
    ) {
        if length >= MAX_LENGTH {
            return;
        }

        // Tunnels are skipped through in one step.
        let (next, next_length) =
            if tunnel::is_tunnel_in_dir(&world.grid, tile, mode, dir) {
                let (far, len) =
                    tunnel::find_length_of_tunnel(&world.grid, tile, dir);
                (far, length + len)
            } else {
                match world.grid.neighbour(tile, dir) {
                    Some(next) => (next, length + 1),
                    None => return,
                }
            };

        let mut dirs = track_status(&world.grid, next, mode).trackdirs()
            & exitdir_reaches_trackdirs(dir);

        // Depots that report no tracks (road) are still enterable through
        // their mouth; hand the walk the inward trackdir.
        if dirs.is_empty() && world.is_depot_of(next, mode) {
            let inward = tyctrack::diagdir_to_diag_trackdir(
                world.depot_exitdir(next, mode).reverse(),
            );
            dirs = inward.bit() & exitdir_reaches_trackdirs(dir);
        }

        for td in dirs.iter() {
            if !self.mark(next, td) {
                continue;
            }
            let stop = enum_proc(world, next, td, next_length);
            if !stop {
                self.step(world, next, td.exitdir(), mode, next_length, enum_proc);
            }
        }
    }
}

/// Scans whether every signal in the segment ahead is a path signal.
///
/// True only when the segment contains at least one signal and each signal
/// in it (looked at from either side) is path-based. Depots bound the scan.
pub fn is_pbs_segment(
    world: &World,
    tile: TileIndex,
    trackdir: Trackdir,
) -> bool {
    if !world.settings.new_pathfinding_all {
        return false;
    }
    let mut total = 0u32;
    let mut pbs = 0u32;
    let mut follower = TrackFollower::new();
    follower.follow(
        world,
        tile,
        trackdir.exitdir(),
        TransportType::Rail,
        &mut |world, t, td, _len| {
            if !rail::is_rail_tile(&world.grid, t) {
                return false;
            }
            if rail::is_rail_depot(&world.grid, t) {
                return true;
            }
            if rail::has_signal_on_track(&world.grid, t, td.track()) {
                total += 1;
                if rail::has_signals(&world.grid, t)
                    && rail::signal_type(&world.grid, t)
                        == rail::SignalType::Pbs
                {
                    pbs += 1;
                }
                return true;
            }
            false
        },
    );
    total > 0 && total == pbs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tycmap::Owner;
    use tycworld::rail::{
        add_signals_on_track, make_plain_rail, make_signal_tile,
        set_signal_type, RailType, SignalType,
    };
    use tyctrack::Track;

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
    fn walks_every_tile_once() {
        let mut world = World::new(6, 6);
        rail_line(&mut world, 5, 5, 15);
        let mut follower = TrackFollower::new();
        let mut count = 0;
        follower.follow(
            &world,
            world.grid.tile_xy(5, 5),
            DiagDirection::SW,
            TransportType::Rail,
            &mut |_, _, _, _| {
                count += 1;
                false
            },
        );
        assert_eq!(count, 9);
        assert_eq!(follower.visited().len(), 9);
    }

    #[test]
    fn stop_halts_one_branch() {
        let mut world = World::new(6, 6);
        rail_line(&mut world, 5, 5, 15);
        let stop_at = world.grid.tile_xy(10, 5);
        let mut follower = TrackFollower::new();
        let mut seen = Vec::new();
        follower.follow(
            &world,
            world.grid.tile_xy(5, 5),
            DiagDirection::SW,
            TransportType::Rail,
            &mut |world, t, _, _| {
                seen.push(world.grid.tile_x(t));
                t == stop_at
            },
        );
        assert_eq!(seen, vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn pbs_segment_requires_all_path_signals() {
        let mut world = World::new(6, 6);
        rail_line(&mut world, 5, 5, 12);
        let sig = world.grid.tile_xy(8, 5);
        make_signal_tile(&mut world.grid, sig);
        add_signals_on_track(&mut world.grid, sig, Track::Diag1);
        set_signal_type(&mut world.grid, sig, SignalType::Pbs);
        assert!(is_pbs_segment(
            &world,
            world.grid.tile_xy(5, 5),
            Trackdir::Diag1Sw
        ));

        set_signal_type(&mut world.grid, sig, SignalType::Normal);
        assert!(!is_pbs_segment(
            &world,
            world.grid.tile_xy(5, 5),
            Trackdir::Diag1Sw
        ));
    }
}
