//! Stations, road stops, and the station tile encodings.
//!
//! A station owns a rectangle of rail platform tiles plus optional road
//! stops and a dock. Station tiles store their owning station id in `m2`
//! and a kind-local layout id in `m5`: rail platforms use 0..8 (bit 0 is
//! the axis), truck stops 0x43 + exit direction, bus stops 0x47 + exit
//! direction, docks 0x4B + direction, buoys 0x52.

use tycmap::{DiagDirection, Grid, Owner, TileIndex, TileKind};
use tyctrack::Track;

use crate::engine::CargoKind;
use crate::vehicle::VehicleId;

pub const NUM_CARGO: usize = 8;

const RAIL_STATION_LIMIT: u8 = 0x08;
const TRUCK_STOP_BASE: u8 = 0x43;
const BUS_STOP_BASE: u8 = 0x47;
const DOCK_BASE: u8 = 0x4B;
const BUOY_TILE: u8 = 0x52;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StationId(pub u16);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoadStopKind {
    Bus,
    Truck,
}

/// A drive-in road stop with two vehicle slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoadStop {
    pub xy: TileIndex,
    pub kind: RoadStopKind,
    /// Which vehicle, if any, has claimed each bay.
    pub slots: [Option<VehicleId>; 2],
}

impl RoadStop {
    pub fn new(xy: TileIndex, kind: RoadStopKind) -> RoadStop {
        RoadStop {
            xy,
            kind,
            slots: [None, None],
        }
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Station {
    pub id: StationId,
    pub xy: TileIndex,
    pub name: String,
    pub owner: Owner,
    /// Top corner of the rail platform rectangle, if rail is present.
    pub train_tile: Option<TileIndex>,
    pub trainst_w: u8,
    pub trainst_h: u8,
    pub dock_tile: Option<TileIndex>,
    pub is_buoy: bool,
    pub bus_stops: Vec<RoadStop>,
    pub truck_stops: Vec<RoadStop>,
    /// Cargo sitting on the platform waiting to be picked up.
    pub waiting: [u32; NUM_CARGO],
    /// Service rating per cargo, 0..=255.
    pub ratings: [u8; NUM_CARGO],
    /// Date the first vehicle arrived, for the celebration advisory.
    pub first_arrival_seen: bool,
    /// Date this station was created; route planners avoid fresh ones.
    pub build_date: u32,
}

impl Station {
    pub fn new(id: StationId, xy: TileIndex, owner: Owner, date: u32) -> Station {
        Station {
            id,
            xy,
            name: format!("Station {}", id.0),
            owner,
            train_tile: None,
            trainst_w: 0,
            trainst_h: 0,
            dock_tile: None,
            is_buoy: false,
            bus_stops: Vec::new(),
            truck_stops: Vec::new(),
            waiting: [0; NUM_CARGO],
            ratings: [175; NUM_CARGO],
            first_arrival_seen: false,
            build_date: date,
        }
    }

    pub fn stops(&self, kind: RoadStopKind) -> &[RoadStop] {
        match kind {
            RoadStopKind::Bus => &self.bus_stops,
            RoadStopKind::Truck => &self.truck_stops,
        }
    }

    pub fn stops_mut(&mut self, kind: RoadStopKind) -> &mut Vec<RoadStop> {
        match kind {
            RoadStopKind::Bus => &mut self.bus_stops,
            RoadStopKind::Truck => &mut self.truck_stops,
        }
    }

    pub fn waiting_of(&self, cargo: CargoKind) -> u32 {
        self.waiting[cargo as usize]
    }

    /// The platform tile of the rail rectangle closest to `tile`.
    ///
    /// Used as the aiming point of train pathfinding: clamp the coordinate
    /// into the rectangle on both axes.
    pub fn closest_platform_tile(
        &self,
        grid: &Grid,
        tile: TileIndex,
    ) -> Option<TileIndex> {
        let top = self.train_tile?;
        let minx = grid.tile_x(top);
        let miny = grid.tile_y(top);
        let maxx = minx + self.trainst_w as u32 - 1;
        let maxy = miny + self.trainst_h as u32 - 1;
        let x = grid.tile_x(tile).clamp(minx, maxx);
        let y = grid.tile_y(tile).clamp(miny, maxy);
        Some(grid.tile_xy(x, y))
    }
}

/// Dense id-indexed station storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StationPool {
    slots: Vec<Option<Station>>,
}

impl StationPool {
    pub fn allocate(
        &mut self,
        xy: TileIndex,
        owner: Owner,
        date: u32,
    ) -> StationId {
        let id = match self.slots.iter().position(|s| s.is_none()) {
            Some(free) => StationId(free as u16),
            None => {
                self.slots.push(None);
                StationId((self.slots.len() - 1) as u16)
            }
        };
        self.slots[id.0 as usize] = Some(Station::new(id, xy, owner, date));
        id
    }

    pub fn free(&mut self, id: StationId) {
        self.slots[id.0 as usize] = None;
    }

    pub fn get(&self, id: StationId) -> &Station {
        self.slots[id.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("station {} is not allocated", id.0))
    }

    pub fn get_mut(&mut self, id: StationId) -> &mut Station {
        self.slots[id.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("station {} is not allocated", id.0))
    }

    pub fn try_get(&self, id: StationId) -> Option<&Station> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Station> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }
}

pub fn is_station_tile(grid: &Grid, tile: TileIndex) -> bool {
    grid.is_kind(tile, TileKind::Station)
}

pub fn station_id_at(grid: &Grid, tile: TileIndex) -> StationId {
    debug_assert!(is_station_tile(grid, tile));
    StationId(grid.m2(tile))
}

pub fn is_rail_station_tile(grid: &Grid, tile: TileIndex) -> bool {
    is_station_tile(grid, tile) && grid.m5(tile) < RAIL_STATION_LIMIT
}

/// The diagonal track a rail platform runs along.
pub fn rail_station_track(grid: &Grid, tile: TileIndex) -> Track {
    debug_assert!(is_rail_station_tile(grid, tile));
    if grid.m5(tile) & 1 == 0 {
        Track::Diag1
    } else {
        Track::Diag2
    }
}

pub fn is_road_stop_tile(grid: &Grid, tile: TileIndex) -> bool {
    is_station_tile(grid, tile)
        && (TRUCK_STOP_BASE..DOCK_BASE).contains(&grid.m5(tile))
}

pub fn road_stop_kind(grid: &Grid, tile: TileIndex) -> RoadStopKind {
    debug_assert!(is_road_stop_tile(grid, tile));
    if grid.m5(tile) < BUS_STOP_BASE {
        RoadStopKind::Truck
    } else {
        RoadStopKind::Bus
    }
}

/// The edge through which road vehicles enter and leave the stop.
pub fn road_stop_exitdir(grid: &Grid, tile: TileIndex) -> DiagDirection {
    debug_assert!(is_road_stop_tile(grid, tile));
    let base = if road_stop_kind(grid, tile) == RoadStopKind::Bus {
        BUS_STOP_BASE
    } else {
        TRUCK_STOP_BASE
    };
    DiagDirection::from_u8(grid.m5(tile) - base).unwrap()
}

pub fn is_dock_tile(grid: &Grid, tile: TileIndex) -> bool {
    is_station_tile(grid, tile)
        && (DOCK_BASE..DOCK_BASE + 4).contains(&grid.m5(tile))
}

/// The water tile ships aim for when calling at this dock.
pub fn dock_approach_tile(grid: &Grid, tile: TileIndex) -> Option<TileIndex> {
    debug_assert!(is_dock_tile(grid, tile));
    let dir = DiagDirection::from_u8(grid.m5(tile) - DOCK_BASE).unwrap();
    grid.neighbour(tile, dir)
}

pub fn is_buoy_tile(grid: &Grid, tile: TileIndex) -> bool {
    is_station_tile(grid, tile) && grid.m5(tile) == BUOY_TILE
}

pub fn make_rail_station_tile(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    station: StationId,
    axis_y: bool,
    layout: u8,
) {
    debug_assert!(layout < 4);
    grid.set_kind(tile, TileKind::Station);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, station.0);
    grid.set_m3(tile, 0);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, (layout << 1) | axis_y as u8);
}

pub fn make_road_stop_tile(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    station: StationId,
    kind: RoadStopKind,
    exitdir: DiagDirection,
) {
    let base = match kind {
        RoadStopKind::Bus => BUS_STOP_BASE,
        RoadStopKind::Truck => TRUCK_STOP_BASE,
    };
    grid.set_kind(tile, TileKind::Station);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, station.0);
    grid.set_m3(tile, 0);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, base + exitdir as u8);
}

pub fn make_dock_tile(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    station: StationId,
    dir: DiagDirection,
) {
    grid.set_kind(tile, TileKind::Station);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, station.0);
    grid.set_m3(tile, 0);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, DOCK_BASE + dir as u8);
}

pub fn make_buoy_tile(
    grid: &mut Grid,
    tile: TileIndex,
    station: StationId,
) {
    grid.set_kind(tile, TileKind::Station);
    grid.set_owner(tile, Owner::None);
    grid.set_m2(tile, station.0);
    grid.set_m3(tile, 0);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, BUOY_TILE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_encodings_round_trip() {
        let mut grid = Grid::new(6, 6);
        let mut pool = StationPool::default();
        let id = pool.allocate(grid.tile_xy(5, 5), Owner::Player(0), 0);

        let rail = grid.tile_xy(5, 5);
        make_rail_station_tile(&mut grid, rail, Owner::Player(0), id, true, 2);
        assert!(is_rail_station_tile(&grid, rail));
        assert_eq!(station_id_at(&grid, rail), id);
        assert_eq!(rail_station_track(&grid, rail), Track::Diag2);

        let stop = grid.tile_xy(6, 5);
        make_road_stop_tile(
            &mut grid,
            stop,
            Owner::Player(0),
            id,
            RoadStopKind::Bus,
            DiagDirection::NW,
        );
        assert!(is_road_stop_tile(&grid, stop));
        assert_eq!(road_stop_kind(&grid, stop), RoadStopKind::Bus);
        assert_eq!(road_stop_exitdir(&grid, stop), DiagDirection::NW);

        let buoy = grid.tile_xy(8, 8);
        make_buoy_tile(&mut grid, buoy, id);
        assert!(is_buoy_tile(&grid, buoy));
        assert!(!is_road_stop_tile(&grid, buoy));
    }

    #[test]
    fn closest_platform_clamps_into_the_rectangle() {
        let grid = Grid::new(6, 6);
        let mut st = Station::new(
            StationId(0),
            grid.tile_xy(10, 10),
            Owner::Player(0),
            0,
        );
        st.train_tile = Some(grid.tile_xy(10, 10));
        st.trainst_w = 1;
        st.trainst_h = 4;
        let from = grid.tile_xy(20, 12);
        assert_eq!(
            st.closest_platform_tile(&grid, from),
            Some(grid.tile_xy(10, 12))
        );
        let from = grid.tile_xy(5, 2);
        assert_eq!(
            st.closest_platform_tile(&grid, from),
            Some(grid.tile_xy(10, 10))
        );
    }
}
