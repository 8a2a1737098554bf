//! Pixel-level movement shared by the vehicle controllers.
//!
//! Vehicles advance one pixel per substep in one of eight directions. The
//! tables below are the contract between tracks and pixels: where a vehicle
//! enters a tile for a given track and entry edge, and which way it faces
//! while on it.

use tycmap::{DiagDirection, Direction, Grid, TileIndex, TILE_SIZE};
use tyctrack::{track_direction_to_trackdir, Track, TrackBits, Trackdir};
use tycworld::{TransportType, Vehicle, World};

/// Per-direction pixel steps `(dx, dy)`.
pub const DELTA_COORD: [(i32, i32); 8] = [
    (-1, -1), // N
    (-1, 0),  // NE
    (-1, 1),  // E
    (0, 1),   // SE
    (1, 1),   // S
    (1, 0),   // SW
    (1, -1),  // W
    (0, -1),  // NW
];

/// `[track][enterdir]` → (x frac, y frac, direction) on entering a tile.
/// Zeroed entries are unreachable combinations.
const INITIAL_SUBCOORD: [[Option<(u8, u8, Direction)>; 4]; 6] = [
    [
        Some((15, 8, Direction::NE)),
        None,
        Some((0, 8, Direction::SW)),
        None,
    ],
    [
        None,
        Some((8, 0, Direction::SE)),
        None,
        Some((8, 15, Direction::NW)),
    ],
    [
        None,
        Some((7, 0, Direction::E)),
        Some((0, 7, Direction::W)),
        None,
    ],
    [
        Some((15, 8, Direction::E)),
        None,
        None,
        Some((8, 15, Direction::W)),
    ],
    [
        Some((15, 7, Direction::N)),
        Some((8, 0, Direction::S)),
        None,
        None,
    ],
    [
        None,
        None,
        Some((0, 8, Direction::S)),
        Some((7, 15, Direction::N)),
    ],
];

/// The sub-tile position and facing for entering `track` across `enterdir`.
pub fn initial_subcoord(
    track: Track,
    enterdir: DiagDirection,
) -> Option<(u8, u8, Direction)> {
    INITIAL_SUBCOORD[track as usize][enterdir as usize]
}

/// The result of one pixel step.
pub struct NewPos {
    pub x: i32,
    pub y: i32,
    pub old_tile: TileIndex,
    pub new_tile: TileIndex,
    /// False while the step stays within the old tile.
    pub tile_changed: bool,
}

/// Advances one pixel in the vehicle's facing and reports the tile under
/// the new position.
pub fn new_vehicle_pos(grid: &Grid, v: &Vehicle) -> NewPos {
    let (dx, dy) = DELTA_COORD[v.direction as usize];
    let x = v.x_pos + dx;
    let y = v.y_pos + dy;
    let old_tile = v.tile;
    let new_tile = grid.tile_xy(
        (x as u32 / TILE_SIZE).min(grid.max_x()),
        (y as u32 / TILE_SIZE).min(grid.max_y()),
    );
    NewPos {
        x,
        y,
        old_tile,
        new_tile,
        tile_changed: new_tile != old_tile,
    }
}

/// The tile under a pixel position.
pub fn tile_at_pos(grid: &Grid, x: i32, y: i32) -> TileIndex {
    grid.tile_xy(
        (x.max(0) as u32 / TILE_SIZE).min(grid.max_x()),
        (y.max(0) as u32 / TILE_SIZE).min(grid.max_y()),
    )
}

/// The trackdir a train is currently travelling, if it is on plain track.
pub fn train_trackdir(world: &World, v: &Vehicle) -> Option<Trackdir> {
    let t = v.train();
    if t.in_depot() {
        let exit = world.depot_exitdir(v.tile, TransportType::Rail);
        return Some(tyctrack::diagdir_to_diag_trackdir(exit));
    }
    if t.in_tunnel() {
        return Some(tyctrack::diagdir_to_diag_trackdir(
            v.direction.to_diagdir(),
        ));
    }
    let track = TrackBits(t.track & 0x3F).first()?;
    track_direction_to_trackdir(track, v.direction)
}

/// The z of a vehicle standing at `(x, y)`.
pub fn z_at(grid: &Grid, x: i32, y: i32) -> i32 {
    let tile = tile_at_pos(grid, x, y);
    let (slope, base) = grid.slope_of(tile);
    let fx = (x as u32) & 0xF;
    let fy = (y as u32) & 0xF;
    base as i32 + tycmap::partial_z(fx, fy, slope) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_piece_spans_sixteen_steps() {
        // Entering a x-diagonal track travelling SW: from (0, 8) the
        // vehicle steps +1 in x per substep and leaves after 16 steps.
        let (x, y, dir) =
            initial_subcoord(Track::Diag1, DiagDirection::SW).unwrap();
        assert_eq!((x, y), (0, 8));
        assert_eq!(dir, Direction::SW);
        let (dx, dy) = DELTA_COORD[dir as usize];
        let (mut px, mut py) = (x as i32, y as i32);
        let mut steps = 0;
        while px < 16 && py < 16 && px >= 0 && py >= 0 {
            px += dx;
            py += dy;
            steps += 1;
        }
        assert_eq!(steps, 16);
    }

    #[test]
    fn short_piece_spans_eight_steps() {
        let (x, y, dir) =
            initial_subcoord(Track::Upper, DiagDirection::SE).unwrap();
        assert_eq!((x, y), (7, 0));
        assert_eq!(dir, Direction::E);
        let (dx, dy) = DELTA_COORD[dir as usize];
        let (mut px, mut py) = (x as i32, y as i32);
        let mut steps = 0;
        while (0..16).contains(&px) && (0..16).contains(&py) {
            px += dx;
            py += dy;
            steps += 1;
        }
        assert_eq!(steps, 8);
    }

    #[test]
    fn every_reachable_combination_has_a_subcoord() {
        for td in Trackdir::ALL {
            for next in tyctrack::trackdir_reaches_trackdirs(td).iter() {
                let enterdir = td.exitdir();
                assert!(
                    initial_subcoord(next.track(), enterdir).is_some(),
                    "missing subcoord for {:?} entered {:?}",
                    next.track(),
                    enterdir
                );
            }
        }
    }
}
