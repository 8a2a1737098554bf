//! Typed accessors for street tiles.
//!
//! Street tiles use `m5` bits 7..4 as the sub-kind: 0 = ordinary road,
//! 1 = level crossing, 2 = road depot. Ordinary road keeps its piece mask
//! in the low nibble; crossings keep the road axis in bit 3 and the warning
//! lights in bit 2; depots keep the exit direction in the low two bits.

use tycmap::{DiagDirection, Grid, Owner, TileIndex, TileKind};
use tyctrack::Track;

use crate::rail::RailType;

/// Road piece bits within a tile's low `m5` nibble.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RoadBits(pub u8);

impl RoadBits {
    pub const NW: RoadBits = RoadBits(1);
    pub const SW: RoadBits = RoadBits(2);
    pub const SE: RoadBits = RoadBits(4);
    pub const NE: RoadBits = RoadBits(8);
    pub const ALL: RoadBits = RoadBits(0x0F);
    pub const X: RoadBits = RoadBits(Self::SW.0 | Self::NE.0);
    pub const Y: RoadBits = RoadBits(Self::NW.0 | Self::SE.0);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The piece leading towards the given tile edge.
    pub fn from_diagdir(dir: DiagDirection) -> RoadBits {
        match dir {
            DiagDirection::NE => RoadBits::NE,
            DiagDirection::SE => RoadBits::SE,
            DiagDirection::SW => RoadBits::SW,
            DiagDirection::NW => RoadBits::NW,
        }
    }
}

impl std::ops::BitOr for RoadBits {
    type Output = RoadBits;
    fn bitor(self, rhs: RoadBits) -> RoadBits {
        RoadBits(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for RoadBits {
    type Output = RoadBits;
    fn bitand(self, rhs: RoadBits) -> RoadBits {
        RoadBits(self.0 & rhs.0)
    }
}

impl std::ops::Not for RoadBits {
    type Output = RoadBits;
    fn not(self) -> RoadBits {
        RoadBits(!self.0 & 0x0F)
    }
}

const ROAD_KIND_MASK: u8 = 0xF0;
const ROAD_KIND_ROAD: u8 = 0x00;
const ROAD_KIND_CROSSING: u8 = 0x10;
const ROAD_KIND_DEPOT: u8 = 0x20;

pub fn is_street_tile(grid: &Grid, tile: TileIndex) -> bool {
    grid.is_kind(tile, TileKind::Street)
}

pub fn is_ordinary_road(grid: &Grid, tile: TileIndex) -> bool {
    is_street_tile(grid, tile)
        && grid.m5(tile) & ROAD_KIND_MASK == ROAD_KIND_ROAD
}

pub fn is_level_crossing(grid: &Grid, tile: TileIndex) -> bool {
    is_street_tile(grid, tile)
        && grid.m5(tile) & ROAD_KIND_MASK == ROAD_KIND_CROSSING
}

pub fn is_road_depot(grid: &Grid, tile: TileIndex) -> bool {
    is_street_tile(grid, tile)
        && grid.m5(tile) & ROAD_KIND_MASK == ROAD_KIND_DEPOT
}

pub fn road_bits(grid: &Grid, tile: TileIndex) -> RoadBits {
    debug_assert!(is_ordinary_road(grid, tile));
    RoadBits(grid.m5(tile) & 0x0F)
}

pub fn set_road_bits(grid: &mut Grid, tile: TileIndex, bits: RoadBits) {
    debug_assert!(is_ordinary_road(grid, tile));
    grid.set_m5(tile, ROAD_KIND_ROAD | bits.0);
}

pub fn road_depot_exitdir(grid: &Grid, tile: TileIndex) -> DiagDirection {
    debug_assert!(is_road_depot(grid, tile));
    DiagDirection::from_u8(grid.m5(tile) & 0x03).unwrap()
}

/// True when the road across this crossing runs along the y axis.
pub fn crossing_road_axis_y(grid: &Grid, tile: TileIndex) -> bool {
    debug_assert!(is_level_crossing(grid, tile));
    grid.m5(tile) & 0x08 != 0
}

/// The rail track crossing this tile.
pub fn crossing_rail_track(grid: &Grid, tile: TileIndex) -> Track {
    if crossing_road_axis_y(grid, tile) {
        Track::Diag1
    } else {
        Track::Diag2
    }
}

pub fn crossing_lights_on(grid: &Grid, tile: TileIndex) -> bool {
    debug_assert!(is_level_crossing(grid, tile));
    grid.m5(tile) & 0x04 != 0
}

pub fn set_crossing_lights(grid: &mut Grid, tile: TileIndex, on: bool) {
    debug_assert!(is_level_crossing(grid, tile));
    let m5 = grid.m5(tile);
    grid.set_m5(tile, if on { m5 | 0x04 } else { m5 & !0x04 });
}

/// The rail type of the track crossing this street tile, kept in `m4`.
pub fn crossing_railtype(grid: &Grid, tile: TileIndex) -> RailType {
    debug_assert!(is_level_crossing(grid, tile));
    RailType::from_u8(grid.m4(tile) & 0x03).expect("corrupt rail type")
}

pub fn make_road(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    bits: RoadBits,
) {
    grid.set_kind(tile, TileKind::Street);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, 0);
    grid.set_m3(tile, 0);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, ROAD_KIND_ROAD | bits.0);
}

pub fn make_level_crossing(
    grid: &mut Grid,
    tile: TileIndex,
    road_owner: Owner,
    rail_owner: Owner,
    rt: RailType,
    road_axis_y: bool,
) {
    grid.set_kind(tile, TileKind::Street);
    // The rail side needs the owner check; the street is public.
    grid.set_owner(tile, rail_owner);
    grid.set_m2(tile, 0);
    grid.set_m3(tile, road_owner.encode());
    grid.set_m4(tile, rt as u8);
    grid.set_m5(
        tile,
        ROAD_KIND_CROSSING | if road_axis_y { 0x08 } else { 0 },
    );
}

pub fn make_road_depot(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    exitdir: DiagDirection,
) {
    grid.set_kind(tile, TileKind::Street);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, 0);
    grid.set_m3(tile, 0);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, ROAD_KIND_DEPOT | exitdir as u8);
}

/// Restores a crossing to plain rail after the road is removed.
pub fn crossing_to_rail(grid: &mut Grid, tile: TileIndex) {
    debug_assert!(is_level_crossing(grid, tile));
    let rt = crossing_railtype(grid, tile);
    let track = crossing_rail_track(grid, tile);
    let owner = grid.owner(tile);
    crate::rail::make_plain_rail(grid, tile, owner, rt, track.bit());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn road_bits_round_trip() {
        let mut grid = Grid::new(6, 6);
        let tile = grid.tile_xy(5, 5);
        make_road(&mut grid, tile, Owner::Town, RoadBits::X);
        assert!(is_ordinary_road(&grid, tile));
        assert_eq!(road_bits(&grid, tile), RoadBits::SW | RoadBits::NE);
    }

    #[test]
    fn crossing_axes_oppose_rail_and_road() {
        let mut grid = Grid::new(6, 6);
        let tile = grid.tile_xy(5, 5);
        make_level_crossing(
            &mut grid,
            tile,
            Owner::Town,
            Owner::Player(1),
            RailType::Rail,
            true,
        );
        assert!(is_level_crossing(&grid, tile));
        assert!(crossing_road_axis_y(&grid, tile));
        assert_eq!(crossing_rail_track(&grid, tile), Track::Diag1);
        assert!(!crossing_lights_on(&grid, tile));
        set_crossing_lights(&mut grid, tile, true);
        assert!(crossing_lights_on(&grid, tile));
    }
}
