//! `track_status`: the contract between tiles and everything that moves.
//!
//! For any tile and transport mode, the status packs the enterable
//! trackdirs into the low 16 bits and a red-signal marker per trackdir into
//! the high 16 bits. Bits 6..7 and 14..15 of each half are always zero, and
//! a trackdir without a signal reads as green.

use tycmap::{Grid, Owner, TileIndex, TileKind};
use tyctrack::{
    signal_along_trackdir, Track, TrackdirBits, Trackdir,
};

use crate::rail::{self, RailTileKind, RailType};
use crate::road::{self, RoadBits};
use crate::station;
use crate::tunnel;

/// The three things that run on tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransportType {
    Rail = 0,
    Road = 1,
    Water = 2,
}

impl TransportType {
    pub fn from_u8(value: u8) -> Option<TransportType> {
        match value {
            0 => Some(TransportType::Rail),
            1 => Some(TransportType::Road),
            2 => Some(TransportType::Water),
            _ => None,
        }
    }
}

/// The packed result of [`track_status`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackStatus(pub u32);

impl TrackStatus {
    pub const NONE: TrackStatus = TrackStatus(0);

    pub fn from_parts(
        trackdirs: TrackdirBits,
        red: TrackdirBits,
    ) -> TrackStatus {
        TrackStatus(((red.0 as u32) << 16) | trackdirs.0 as u32)
    }

    /// Trackdirs that exist on the tile for this transport mode.
    pub fn trackdirs(self) -> TrackdirBits {
        TrackdirBits((self.0 & 0x3F3F) as u16)
    }

    /// Trackdirs whose facing signal shows red.
    pub fn red_signals(self) -> TrackdirBits {
        TrackdirBits(((self.0 >> 16) & 0x3F3F) as u16)
    }

    pub fn is_empty(self) -> bool {
        self.trackdirs().is_empty()
    }
}

/// Maps a road piece mask to the trackdirs it allows.
const ROAD_TRACKBITS: [u8; 16] = [
    0x00, 0x00, 0x00, 0x10, 0x00, 0x02, 0x08, 0x1A, 0x00, 0x04, 0x01, 0x15,
    0x20, 0x26, 0x29, 0x3F,
];

fn both_ways(tracks: u8) -> TrackdirBits {
    TrackdirBits(((tracks as u16) << 8) | tracks as u16)
}

/// THE pathfinder contract: which trackdirs a vehicle of the given mode may
/// use on this tile, and which of them face a red signal.
pub fn track_status(
    grid: &Grid,
    tile: TileIndex,
    mode: TransportType,
) -> TrackStatus {
    match grid.kind(tile) {
        TileKind::Railway => rail_status(grid, tile, mode),
        TileKind::Street => street_status(grid, tile, mode),
        TileKind::Station => station_status(grid, tile, mode),
        TileKind::Water => water_status(grid, tile, mode),
        TileKind::TunnelBridge => tunnel_bridge_status(grid, tile, mode),
        _ => TrackStatus::NONE,
    }
}

fn rail_status(
    grid: &Grid,
    tile: TileIndex,
    mode: TransportType,
) -> TrackStatus {
    if mode != TransportType::Rail {
        return TrackStatus::NONE;
    }
    match rail::rail_tile_kind(grid, tile) {
        RailTileKind::Plain => {
            TrackStatus::from_parts(
                both_ways(rail::track_bits(grid, tile).0),
                TrackdirBits::NONE,
            )
        }
        RailTileKind::WithSignals => {
            let dirs = both_ways(rail::track_bits(grid, tile).0);
            let presence = grid.m3(tile) & 0xF0;
            let mut green = (grid.m2(tile) as u8) & presence;
            // Absent signals read green, so one-way signals implicitly
            // show red from behind.
            if presence & 0xC0 == 0 {
                green |= 0xC0;
            }
            if presence & 0x30 == 0 {
                green |= 0x30;
            }
            let mut red = TrackdirBits::NONE;
            for td in Trackdir::ALL {
                if green & signal_along_trackdir(td) == 0 {
                    red = red | td.bit();
                }
            }
            TrackStatus::from_parts(dirs, red & dirs)
        }
        RailTileKind::DepotWaypoint => {
            let track = if rail::is_rail_waypoint(grid, tile) {
                rail::waypoint_axis(grid, tile)
            } else {
                Track::Diag1
            };
            let track = if rail::is_rail_depot(grid, tile) {
                // A depot sits on the diagonal matching its exit.
                match rail::rail_depot_exitdir(grid, tile) {
                    tycmap::DiagDirection::NE
                    | tycmap::DiagDirection::SW => Track::Diag1,
                    _ => Track::Diag2,
                }
            } else {
                track
            };
            TrackStatus::from_parts(
                both_ways(track.bit().0),
                TrackdirBits::NONE,
            )
        }
    }
}

fn street_status(
    grid: &Grid,
    tile: TileIndex,
    mode: TransportType,
) -> TrackStatus {
    match mode {
        TransportType::Rail => {
            if !road::is_level_crossing(grid, tile) {
                return TrackStatus::NONE;
            }
            TrackStatus::from_parts(
                both_ways(road::crossing_rail_track(grid, tile).bit().0),
                TrackdirBits::NONE,
            )
        }
        TransportType::Road => {
            if road::is_ordinary_road(grid, tile) {
                let bits = road::road_bits(grid, tile);
                TrackStatus::from_parts(
                    both_ways(ROAD_TRACKBITS[bits.0 as usize]),
                    TrackdirBits::NONE,
                )
            } else if road::is_level_crossing(grid, tile) {
                let track = if road::crossing_road_axis_y(grid, tile) {
                    Track::Diag2
                } else {
                    Track::Diag1
                };
                let dirs = both_ways(track.bit().0);
                // Lit warning lights stop road vehicles in both directions.
                let red = if road::crossing_lights_on(grid, tile) {
                    dirs
                } else {
                    TrackdirBits::NONE
                };
                TrackStatus::from_parts(dirs, red)
            } else {
                // Depots are entered through their one exit only; the
                // pathfinders special-case them.
                TrackStatus::NONE
            }
        }
        TransportType::Water => TrackStatus::NONE,
    }
}

fn station_status(
    grid: &Grid,
    tile: TileIndex,
    mode: TransportType,
) -> TrackStatus {
    match mode {
        TransportType::Rail if station::is_rail_station_tile(grid, tile) => {
            TrackStatus::from_parts(
                both_ways(station::rail_station_track(grid, tile).bit().0),
                TrackdirBits::NONE,
            )
        }
        TransportType::Water if station::is_buoy_tile(grid, tile) => {
            TrackStatus::from_parts(both_ways(0x3F), TrackdirBits::NONE)
        }
        _ => TrackStatus::NONE,
    }
}

fn water_status(
    grid: &Grid,
    tile: TileIndex,
    mode: TransportType,
) -> TrackStatus {
    if mode != TransportType::Water {
        return TrackStatus::NONE;
    }
    if grid.m5(tile) & 0xF0 == 0x80 {
        // Ship depot: only its diagonal track.
        let dir = tycmap::DiagDirection::from_u8(grid.m5(tile) & 0x03)
            .unwrap();
        let track = match dir {
            tycmap::DiagDirection::NE | tycmap::DiagDirection::SW => {
                Track::Diag1
            }
            _ => Track::Diag2,
        };
        return TrackStatus::from_parts(
            both_ways(track.bit().0),
            TrackdirBits::NONE,
        );
    }
    TrackStatus::from_parts(both_ways(0x3F), TrackdirBits::NONE)
}

fn tunnel_bridge_status(
    grid: &Grid,
    tile: TileIndex,
    mode: TransportType,
) -> TrackStatus {
    if tunnel::is_tunnel_entrance(grid, tile) {
        if tunnel::tunnel_transport(grid, tile) != mode {
            return TrackStatus::NONE;
        }
        let td = tyctrack::diagdir_to_diag_trackdir(
            tunnel::tunnel_dir(grid, tile),
        );
        return TrackStatus::from_parts(
            both_ways(td.track().bit().0),
            TrackdirBits::NONE,
        );
    }
    if tunnel::is_bridge_ramp(grid, tile) {
        if tunnel::bridge_transport(grid, tile) != mode {
            return TrackStatus::NONE;
        }
        let td = tyctrack::diagdir_to_diag_trackdir(
            tunnel::bridge_ramp_dir(grid, tile),
        );
        return TrackStatus::from_parts(
            both_ways(td.track().bit().0),
            TrackdirBits::NONE,
        );
    }
    if tunnel::is_bridge_middle(grid, tile) {
        if tunnel::bridge_transport(grid, tile) != mode {
            return TrackStatus::NONE;
        }
        let track = if tunnel::bridge_axis_y(grid, tile) {
            Track::Diag2
        } else {
            Track::Diag1
        };
        return TrackStatus::from_parts(
            both_ways(track.bit().0),
            TrackdirBits::NONE,
        );
    }
    TrackStatus::NONE
}

/// The rail type present for a train travelling over `tile`.
pub fn tile_rail_type(grid: &Grid, tile: TileIndex) -> Option<RailType> {
    match grid.kind(tile) {
        TileKind::Railway => Some(rail::railtype(grid, tile)),
        TileKind::Street if road::is_level_crossing(grid, tile) => {
            Some(road::crossing_railtype(grid, tile))
        }
        TileKind::Station if station::is_rail_station_tile(grid, tile) => {
            RailType::from_u8(grid.m3(tile) & 0x03)
        }
        TileKind::TunnelBridge => {
            RailType::from_u8(grid.m3(tile) & 0x03)
        }
        _ => None,
    }
}

/// Whether `owner`'s vehicles are allowed onto `tile` at all.
///
/// Rail infrastructure, depots and stations must be owned outright; the
/// public road network and open water are free for everyone. The rail part
/// of a level crossing needs the owner check while the street does not.
pub fn may_enter_tile(
    grid: &Grid,
    owner: Owner,
    tile: TileIndex,
    enterdir: tycmap::DiagDirection,
) -> bool {
    match grid.kind(tile) {
        TileKind::Railway => grid.is_owner(tile, owner),
        TileKind::Station => {
            if station::is_buoy_tile(grid, tile) {
                true
            } else {
                grid.is_owner(tile, owner)
            }
        }
        TileKind::Street => {
            if road::is_level_crossing(grid, tile) {
                let rail_track = road::crossing_rail_track(grid, tile);
                let entering_on_rail = tyctrack::diagdir_to_diag_trackdir(
                    enterdir,
                )
                .track()
                    == rail_track;
                if entering_on_rail {
                    return grid.is_owner(tile, owner);
                }
                true
            } else if road::is_road_depot(grid, tile) {
                grid.is_owner(tile, owner)
            } else {
                true
            }
        }
        TileKind::TunnelBridge => {
            if tunnel::is_bridge_middle(grid, tile) {
                true
            } else {
                grid.is_owner(tile, owner)
            }
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rail::{
        add_signals_on_track, make_plain_rail, make_signal_tile,
        set_signal_state, SignalState,
    };

    #[test]
    fn plain_rail_reports_both_directions() {
        let mut grid = Grid::new(6, 6);
        let tile = grid.tile_xy(5, 5);
        make_plain_rail(
            &mut grid,
            tile,
            Owner::Player(0),
            RailType::Rail,
            Track::Diag1.bit() | Track::Lower.bit(),
        );
        let ts = track_status(&grid, tile, TransportType::Rail);
        assert_eq!(ts.trackdirs().0, 0x0909);
        assert!(ts.red_signals().is_empty());
        assert!(track_status(&grid, tile, TransportType::Road).is_empty());
    }

    #[test]
    fn one_way_signal_reads_red_from_behind() {
        let mut grid = Grid::new(6, 6);
        let tile = grid.tile_xy(5, 5);
        make_plain_rail(
            &mut grid,
            tile,
            Owner::Player(0),
            RailType::Rail,
            Track::Diag1.bit(),
        );
        make_signal_tile(&mut grid, tile);
        add_signals_on_track(&mut grid, tile, Track::Diag1);
        // Strip the signal against Diag1Ne, making it one-way.
        let m3 = grid.m3(tile);
        grid.set_m3(
            tile,
            m3 & !tyctrack::signal_against_trackdir(Trackdir::Diag1Ne),
        );
        set_signal_state(
            &mut grid,
            tile,
            Trackdir::Diag1Ne,
            SignalState::Green,
        );
        let ts = track_status(&grid, tile, TransportType::Rail);
        assert!(!ts.red_signals().has(Trackdir::Diag1Ne));
        // No signal facing SW; the missing facing must read red.
        assert!(ts.red_signals().has(Trackdir::Diag1Sw));
    }

    #[test]
    fn road_pieces_translate_to_trackdirs() {
        let mut grid = Grid::new(6, 6);
        let tile = grid.tile_xy(5, 5);
        road::make_road(&mut grid, tile, Owner::Town, RoadBits::X);
        let ts = track_status(&grid, tile, TransportType::Road);
        assert_eq!(
            ts.trackdirs(),
            Track::Diag1.bit().trackdir_bits()
        );
    }
}
