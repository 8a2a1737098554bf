//! Per-tile path reservations.
//!
//! Reserved track encoding:
//!
//! * plain railway tiles: `m4` bits 4..6 hold the track number of the
//!   reserved track plus one (zero means nothing reserved); bit 7 means the
//!   parallel partner track (`track ^ 1`) is reserved as well.
//! * waypoints and stations: `m3` bit 6 marks the through track reserved.
//! * tunnels and bridge ramps: `m4` bits 0..1 mark track 0/1 reserved.
//! * level crossings: `m5` bit 0 marks the rail track reserved.
//!
//! At most one track, or two parallel tracks, can ever be reserved on a
//! plain tile; the 4-bit code has exactly enough states for that.

use tycmap::{Grid, TileIndex, TileKind};
use tyctrack::{
    trackdir_reaches_trackdirs, Track, TrackBits, Trackdir, TrackdirBits,
};

use crate::rail;
use crate::road;
use crate::station;
use crate::tunnel;

/// Decodes the 4-bit reservation code into reserved tracks.
/// `None` entries cannot be produced by the mutators.
const ENCRT_TO_RESERVED: [Option<TrackBits>; 16] = [
    Some(TrackBits(0x00)),
    Some(TrackBits(0x01)),
    Some(TrackBits(0x02)),
    Some(TrackBits(0x04)),
    Some(TrackBits(0x08)),
    Some(TrackBits(0x10)),
    Some(TrackBits(0x20)),
    None,
    None,
    None,
    None,
    Some(TrackBits(0x0C)),
    Some(TrackBits(0x0C)),
    Some(TrackBits(0x30)),
    Some(TrackBits(0x30)),
    None,
];

/// Decodes the 4-bit reservation code into unavailable trackdirs.
const ENCRT_TO_UNAVAIL: [Option<TrackdirBits>; 16] = [
    Some(TrackdirBits(0x0000)),
    Some(TrackdirBits(0x3F3F)),
    Some(TrackdirBits(0x3F3F)),
    Some(TrackdirBits(0x3737)),
    Some(TrackdirBits(0x3B3B)),
    Some(TrackdirBits(0x1F1F)),
    Some(TrackdirBits(0x2F2F)),
    None,
    None,
    None,
    None,
    Some(TrackdirBits(0x3F3F)),
    Some(TrackdirBits(0x3F3F)),
    Some(TrackdirBits(0x3F3F)),
    Some(TrackdirBits(0x3F3F)),
    None,
];

fn plain_code(grid: &Grid, tile: TileIndex) -> u8 {
    (grid.m4(tile) >> 4) & 0x0F
}

fn set_plain_code(grid: &mut Grid, tile: TileIndex, code: u8) {
    let m4 = grid.m4(tile);
    grid.set_m4(tile, (m4 & 0x0F) | (code << 4));
}

/// Marks `track` as reserved on `tile`.
pub fn reserve_track(grid: &mut Grid, tile: TileIndex, track: Track) {
    match grid.kind(tile) {
        TileKind::Railway => {
            if rail::is_rail_waypoint(grid, tile) {
                let m3 = grid.m3(tile);
                grid.set_m3(tile, m3 | 0x40);
            } else {
                let code = plain_code(grid, tile);
                let new = if code == 0 {
                    track as u8 + 1
                } else if code == (track as u8 ^ 1) + 1 {
                    // The parallel partner was reserved before.
                    code | 8
                } else {
                    code
                };
                set_plain_code(grid, tile, new);
            }
        }
        TileKind::TunnelBridge => {
            let m4 = grid.m4(tile);
            grid.set_m4(tile, m4 | ((1 << track as u8) & 0x03));
        }
        TileKind::Station => {
            let m3 = grid.m3(tile);
            grid.set_m3(tile, m3 | 0x40);
        }
        TileKind::Street => {
            if road::is_level_crossing(grid, tile) {
                let m5 = grid.m5(tile);
                grid.set_m5(tile, m5 | 0x01);
            }
        }
        _ => {}
    }
}

/// Which tracks are currently reserved on `tile`.
pub fn tile_reserved(grid: &Grid, tile: TileIndex) -> TrackBits {
    match grid.kind(tile) {
        TileKind::Railway => {
            if rail::is_rail_waypoint(grid, tile) {
                if grid.m3(tile) & 0x40 == 0 {
                    TrackBits::NONE
                } else {
                    rail::waypoint_axis(grid, tile).bit()
                }
            } else {
                ENCRT_TO_RESERVED[plain_code(grid, tile) as usize]
                    .unwrap_or_else(|| {
                        panic!("invalid reservation code on {:?}", tile)
                    })
            }
        }
        TileKind::TunnelBridge => TrackBits(grid.m4(tile) & 0x03),
        TileKind::Station => {
            if grid.m3(tile) & 0x40 == 0
                || !station::is_rail_station_tile(grid, tile)
            {
                TrackBits::NONE
            } else {
                station::rail_station_track(grid, tile).bit()
            }
        }
        TileKind::Street => {
            if road::is_level_crossing(grid, tile)
                && grid.m5(tile) & 0x01 != 0
            {
                road::crossing_rail_track(grid, tile).bit()
            } else {
                TrackBits::NONE
            }
        }
        _ => TrackBits::NONE,
    }
}

/// Which trackdirs are unavailable because of reservations on `tile`.
pub fn tile_unavail(grid: &Grid, tile: TileIndex) -> TrackdirBits {
    match grid.kind(tile) {
        TileKind::Railway => {
            if rail::is_rail_waypoint(grid, tile) {
                if grid.m3(tile) & 0x40 == 0 {
                    TrackdirBits::NONE
                } else {
                    TrackdirBits::MASK
                }
            } else {
                ENCRT_TO_UNAVAIL[plain_code(grid, tile) as usize]
                    .unwrap_or_else(|| {
                        panic!("invalid reservation code on {:?}", tile)
                    })
            }
        }
        TileKind::TunnelBridge => {
            TrackBits(grid.m4(tile) & 0x03).trackdir_bits()
        }
        TileKind::Station => {
            if grid.m3(tile) & 0x40 == 0 {
                TrackdirBits::NONE
            } else {
                TrackdirBits::MASK
            }
        }
        TileKind::Street => {
            if road::is_level_crossing(grid, tile)
                && grid.m5(tile) & 0x01 != 0
            {
                TrackdirBits::MASK
            } else {
                TrackdirBits::NONE
            }
        }
        _ => TrackdirBits::NONE,
    }
}

/// Removes the reservation of `track` on `tile`.
pub fn clear_track(grid: &mut Grid, tile: TileIndex, track: Track) {
    match grid.kind(tile) {
        TileKind::Railway => {
            if rail::is_rail_waypoint(grid, tile) {
                let m3 = grid.m3(tile);
                grid.set_m3(tile, m3 & !0x40);
            } else {
                let code = plain_code(grid, tile);
                let t = track as u8;
                let new = if code == t + 1 {
                    0
                } else if code == t + 1 + 8 {
                    (t ^ 1) + 1
                } else if code == (t ^ 1) + 1 + 8 {
                    code & 7
                } else {
                    code
                };
                set_plain_code(grid, tile, new);
            }
        }
        TileKind::TunnelBridge => {
            let m4 = grid.m4(tile);
            grid.set_m4(tile, m4 & !((1 << track as u8) & 0x03));
        }
        TileKind::Station => {
            let m3 = grid.m3(tile);
            grid.set_m3(tile, m3 & !0x40);
        }
        TileKind::Street => {
            if road::is_level_crossing(grid, tile) {
                let m5 = grid.m5(tile);
                grid.set_m5(tile, m5 & !0x01);
            }
        }
        _ => {}
    }
}

/// Follows a reserved path from `(tile, trackdir)` and unreserves it
/// tile by tile, stopping at `(end_tile, end_trackdir)`.
///
/// Tunnels are skipped through in one step. The walk continues while the
/// next tile still holds a reservation reachable from the current trackdir.
pub fn clear_path(
    grid: &mut Grid,
    tile: TileIndex,
    trackdir: Trackdir,
    end_tile: TileIndex,
    end_trackdir: Trackdir,
) {
    let mut tile = tile;
    let mut trackdir = trackdir;
    loop {
        clear_track(grid, tile, trackdir.track());

        if tile == end_tile && trackdir.track() == end_trackdir.track() {
            return;
        }

        let exitdir = trackdir.exitdir();
        if tunnel::is_tunnel_in_dir(
            grid,
            tile,
            crate::status::TransportType::Rail,
            exitdir,
        ) {
            let (far, _) = tunnel::find_length_of_tunnel(grid, tile, exitdir);
            // Only straight tunnels exist: the exit trackdir matches.
            debug_assert_eq!(
                tunnel::tunnel_dir(grid, far),
                exitdir.reverse()
            );
            tile = far;
        } else {
            match grid.neighbour(tile, exitdir) {
                Some(next) => tile = next,
                None => return,
            }
        }

        let res = tile_reserved(grid, tile).trackdir_bits()
            & trackdir_reaches_trackdirs(trackdir);
        match res.first() {
            Some(next_td) => trackdir = next_td,
            None => return,
        }
    }
}

/// Is there a path signal facing `trackdir` on this tile?
pub fn is_pbs_signal_raw(
    grid: &Grid,
    tile: TileIndex,
    trackdir: Trackdir,
) -> bool {
    grid.is_kind(tile, TileKind::Railway)
        && rail::has_signals(grid, tile)
        && rail::has_signal_on_trackdir(grid, tile, trackdir)
        && rail::signal_type(grid, tile) == rail::SignalType::Pbs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tycmap::Owner;

    fn plain_tile(grid: &mut Grid, bits: TrackBits) -> TileIndex {
        let tile = grid.tile_xy(5, 5);
        rail::make_plain_rail(
            grid,
            tile,
            Owner::Player(0),
            rail::RailType::Rail,
            bits,
        );
        tile
    }

    #[test]
    fn reserve_and_clear_single_track() {
        let mut grid = Grid::new(6, 6);
        let tile = plain_tile(&mut grid, TrackBits::ALL);
        assert!(tile_reserved(&grid, tile).is_empty());

        reserve_track(&mut grid, tile, Track::Lower);
        assert_eq!(tile_reserved(&grid, tile), Track::Lower.bit());
        assert_eq!(tile_unavail(&grid, tile), TrackdirBits(0x3B3B));

        clear_track(&mut grid, tile, Track::Lower);
        assert!(tile_reserved(&grid, tile).is_empty());
        assert!(tile_unavail(&grid, tile).is_empty());
    }

    #[test]
    fn two_parallel_tracks_share_the_code() {
        let mut grid = Grid::new(6, 6);
        let tile = plain_tile(&mut grid, TrackBits::ALL);
        reserve_track(&mut grid, tile, Track::Upper);
        reserve_track(&mut grid, tile, Track::Lower);
        assert_eq!(
            tile_reserved(&grid, tile),
            Track::Upper.bit() | Track::Lower.bit()
        );
        assert_eq!(tile_unavail(&grid, tile), TrackdirBits::MASK);

        clear_track(&mut grid, tile, Track::Upper);
        assert_eq!(tile_reserved(&grid, tile), Track::Lower.bit());
        clear_track(&mut grid, tile, Track::Lower);
        assert!(tile_reserved(&grid, tile).is_empty());
    }

    #[test]
    fn unavail_covers_both_facings_of_reserved_tracks() {
        let mut grid = Grid::new(6, 6);
        let tile = plain_tile(&mut grid, TrackBits::ALL);
        for track in Track::ALL {
            reserve_track(&mut grid, tile, track);
            let unavail = tile_unavail(&grid, tile);
            let td = track.to_trackdir();
            assert!(unavail.has(td));
            assert!(unavail.has(td.reverse()));
            clear_track(&mut grid, tile, track);
        }
    }

    #[test]
    fn clear_path_walks_a_straight_line() {
        let mut grid = Grid::new(6, 6);
        let tiles: Vec<_> =
            (5..10).map(|x| grid.tile_xy(x, 5)).collect();
        for &t in &tiles {
            rail::make_plain_rail(
                &mut grid,
                t,
                Owner::Player(0),
                rail::RailType::Rail,
                Track::Diag1.bit(),
            );
            reserve_track(&mut grid, t, Track::Diag1);
        }
        clear_path(
            &mut grid,
            tiles[0],
            Trackdir::Diag1Sw,
            *tiles.last().unwrap(),
            Trackdir::Diag1Sw,
        );
        for &t in &tiles {
            assert!(tile_reserved(&grid, t).is_empty());
        }
    }
}
