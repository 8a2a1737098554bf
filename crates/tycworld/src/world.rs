//! The one struct that owns all shared simulation state.

use tycmap::{DiagDirection, Grid, TileIndex};
use tyctrack::Trackdir;

use crate::calendar::Calendar;
use crate::order::OrderPool;
use crate::pbs;
use crate::player::{Player, PlayerId, MAX_PLAYERS};
use crate::rail;
use crate::road;
use crate::settings::Settings;
use crate::station::StationPool;
use crate::status::TransportType;
use crate::town::{Industry, Town};
use crate::vehicle::VehiclePool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepotId(pub u16);

/// A depot record; the tile carries the kind-specific bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Depot {
    pub id: DepotId,
    pub xy: TileIndex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaypointId(pub u16);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Waypoint {
    pub id: WaypointId,
    pub xy: TileIndex,
}

/// Everything the tick loop reads and writes.
///
/// All state is shared mutable within a tick; mutation outside a tick only
/// happens through commands. There is exactly one of these per simulation.
#[derive(Clone, Debug)]
pub struct World {
    pub grid: Grid,
    pub vehicles: VehiclePool,
    pub orders: OrderPool,
    pub stations: StationPool,
    pub depots: Vec<Depot>,
    pub waypoints: Vec<Waypoint>,
    pub towns: Vec<Town>,
    pub industries: Vec<Industry>,
    pub players: Vec<Player>,
    pub settings: Settings,
    pub calendar: Calendar,
}

impl World {
    pub fn new(log_x: u32, log_y: u32) -> World {
        World {
            grid: Grid::new(log_x, log_y),
            vehicles: VehiclePool::default(),
            orders: OrderPool::default(),
            stations: StationPool::default(),
            depots: Vec::new(),
            waypoints: Vec::new(),
            towns: Vec::new(),
            industries: Vec::new(),
            players: (0..MAX_PLAYERS as u8)
                .map(|i| Player::new(PlayerId(i), false))
                .collect(),
            settings: Settings::default(),
            calendar: Calendar::default(),
        }
    }

    pub fn player(&self, id: PlayerId) -> &Player {
        &self.players[id.0 as usize]
    }

    pub fn player_mut(&mut self, id: PlayerId) -> &mut Player {
        &mut self.players[id.0 as usize]
    }

    pub fn add_depot(&mut self, xy: TileIndex) -> DepotId {
        let id = DepotId(self.depots.len() as u16);
        self.depots.push(Depot { id, xy });
        id
    }

    pub fn remove_depot_at(&mut self, xy: TileIndex) {
        self.depots.retain(|d| d.xy != xy);
    }

    pub fn depot_at(&self, xy: TileIndex) -> Option<&Depot> {
        self.depots.iter().find(|d| d.xy == xy)
    }

    pub fn depot(&self, id: DepotId) -> Option<&Depot> {
        self.depots.iter().find(|d| d.id == id)
    }

    pub fn add_waypoint(&mut self, xy: TileIndex) -> WaypointId {
        let id = WaypointId(self.waypoints.len() as u16);
        self.waypoints.push(Waypoint { id, xy });
        id
    }

    pub fn waypoint(&self, id: WaypointId) -> Option<&Waypoint> {
        self.waypoints.iter().find(|w| w.id == id)
    }

    /// Is `tile` a depot of the given transport mode?
    pub fn is_depot_of(&self, tile: TileIndex, mode: TransportType) -> bool {
        match mode {
            TransportType::Rail => rail::is_rail_depot(&self.grid, tile),
            TransportType::Road => road::is_road_depot(&self.grid, tile),
            TransportType::Water => {
                self.grid.is_kind(tile, tycmap::TileKind::Water)
                    && self.grid.m5(tile) & 0xF0 == 0x80
            }
        }
    }

    /// The single exit direction of a depot tile of the given mode.
    pub fn depot_exitdir(
        &self,
        tile: TileIndex,
        mode: TransportType,
    ) -> DiagDirection {
        debug_assert!(self.is_depot_of(tile, mode));
        match mode {
            TransportType::Rail => rail::rail_depot_exitdir(&self.grid, tile),
            TransportType::Road => road::road_depot_exitdir(&self.grid, tile),
            TransportType::Water => {
                DiagDirection::from_u8(self.grid.m5(tile) & 0x03).unwrap()
            }
        }
    }

    /// A path signal facing `trackdir`, honouring the pathfinder setting.
    pub fn is_pbs_signal(&self, tile: TileIndex, trackdir: Trackdir) -> bool {
        self.settings.new_pathfinding_all
            && pbs::is_pbs_signal_raw(&self.grid, tile, trackdir)
    }

    /// A combined digest of tiles and vehicles; two runs of the same
    /// scenario must agree on this after every tick.
    pub fn digest(&self) -> u64 {
        self.grid
            .digest()
            .rotate_left(17)
            .wrapping_add(self.vehicles.digest())
    }
}
