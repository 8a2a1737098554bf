//! Typed accessors for railway tiles.
//!
//! Rail tiles keep their whole state in the packed payload bytes:
//!
//! * `m5` bits 7..6: sub-kind (0 = plain track, 1 = track with signals,
//!   3 = depot or waypoint). For plain/signal tiles the low six bits are
//!   the [`TrackBits`]; for depots the low two bits are the exit direction
//!   and bits 5..2 select depot (0) or waypoint (4).
//! * `m3` low two bits: rail type. High nibble: signal presence per
//!   trackdir. Bit 6 doubles as the reservation flag on waypoints.
//! * `m2` bits 7..4: signal state (green = 1) per trackdir.
//! * `m4` bits 2..0: signal type; bit 3: semaphore; bits 7..4: the
//!   reservation code of plain tiles.
//!
//! The bit positions are a contract shared with the pathfinders; they must
//! not change.

use tycmap::{DiagDirection, Grid, Owner, TileIndex, TileKind};
use tyctrack::{
    signal_along_trackdir, signal_on_track, Track, TrackBits, Trackdir,
};

/// Rail, monorail or maglev. An engine can only run on compatible track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RailType {
    Rail = 0,
    Mono = 1,
    Maglev = 2,
}

impl RailType {
    pub fn from_u8(value: u8) -> Option<RailType> {
        match value {
            0 => Some(RailType::Rail),
            1 => Some(RailType::Mono),
            2 => Some(RailType::Maglev),
            _ => None,
        }
    }

    /// Whether an engine of `self` may drive on `tile_type` track.
    pub fn is_compatible(self, tile_type: RailType) -> bool {
        self == tile_type
    }
}

/// The sub-kind stored in `m5` bits 7..6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RailTileKind {
    Plain,
    WithSignals,
    DepotWaypoint,
}

const RAIL_KIND_MASK: u8 = 0xC0;
const RAIL_KIND_PLAIN: u8 = 0x00;
const RAIL_KIND_SIGNALS: u8 = 0x40;
const RAIL_KIND_DEPOT_WAYPOINT: u8 = 0xC0;

const RAIL_SUBTYPE_MASK: u8 = 0x3C;
const RAIL_SUBTYPE_DEPOT: u8 = 0x00;
const RAIL_SUBTYPE_WAYPOINT: u8 = 0x04;

/// Signal kinds stored in `m4` bits 2..0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SignalType {
    Normal = 0,
    /// Presignal block entry.
    Entry = 1,
    /// Presignal block exit.
    Exit = 2,
    /// Presignal inter-block.
    Combo = 3,
    /// Path-based signal.
    Pbs = 4,
}

impl SignalType {
    pub fn from_u8(value: u8) -> Option<SignalType> {
        match value {
            0 => Some(SignalType::Normal),
            1 => Some(SignalType::Entry),
            2 => Some(SignalType::Exit),
            3 => Some(SignalType::Combo),
            4 => Some(SignalType::Pbs),
            _ => None,
        }
    }

    pub fn is_presignal(self) -> bool {
        matches!(
            self,
            SignalType::Entry | SignalType::Exit | SignalType::Combo
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalState {
    Red,
    Green,
}

pub fn is_rail_tile(grid: &Grid, tile: TileIndex) -> bool {
    grid.is_kind(tile, TileKind::Railway)
}

pub fn rail_tile_kind(grid: &Grid, tile: TileIndex) -> RailTileKind {
    debug_assert!(is_rail_tile(grid, tile));
    match grid.m5(tile) & RAIL_KIND_MASK {
        RAIL_KIND_PLAIN => RailTileKind::Plain,
        RAIL_KIND_SIGNALS => RailTileKind::WithSignals,
        RAIL_KIND_DEPOT_WAYPOINT => RailTileKind::DepotWaypoint,
        _ => panic!("unused rail tile kind at {:?}", tile),
    }
}

/// Plain rails, with or without signals.
pub fn is_plain_rail(grid: &Grid, tile: TileIndex) -> bool {
    is_rail_tile(grid, tile)
        && !matches!(
            rail_tile_kind(grid, tile),
            RailTileKind::DepotWaypoint
        )
}

pub fn has_signals(grid: &Grid, tile: TileIndex) -> bool {
    is_rail_tile(grid, tile)
        && rail_tile_kind(grid, tile) == RailTileKind::WithSignals
}

/// The tracks present on a plain rail tile.
pub fn track_bits(grid: &Grid, tile: TileIndex) -> TrackBits {
    debug_assert!(is_plain_rail(grid, tile));
    TrackBits(grid.m5(tile) & 0x3F)
}

pub fn has_track(grid: &Grid, tile: TileIndex, track: Track) -> bool {
    track_bits(grid, tile).has(track)
}

pub fn railtype(grid: &Grid, tile: TileIndex) -> RailType {
    debug_assert!(is_rail_tile(grid, tile));
    RailType::from_u8(grid.m3(tile) & 0x03).expect("corrupt rail type")
}

pub fn set_railtype(grid: &mut Grid, tile: TileIndex, rt: RailType) {
    let m3 = grid.m3(tile);
    grid.set_m3(tile, (m3 & !0x03) | rt as u8);
}

pub fn is_rail_depot(grid: &Grid, tile: TileIndex) -> bool {
    is_rail_tile(grid, tile)
        && rail_tile_kind(grid, tile) == RailTileKind::DepotWaypoint
        && grid.m5(tile) & RAIL_SUBTYPE_MASK == RAIL_SUBTYPE_DEPOT
}

pub fn is_rail_waypoint(grid: &Grid, tile: TileIndex) -> bool {
    is_rail_tile(grid, tile)
        && rail_tile_kind(grid, tile) == RailTileKind::DepotWaypoint
        && grid.m5(tile) & RAIL_SUBTYPE_MASK == RAIL_SUBTYPE_WAYPOINT
}

/// The one direction trains can leave a rail depot.
pub fn rail_depot_exitdir(grid: &Grid, tile: TileIndex) -> DiagDirection {
    debug_assert!(is_rail_depot(grid, tile));
    DiagDirection::from_u8(grid.m5(tile) & 0x03).unwrap()
}

/// The diagonal track a waypoint sits on (0 = x axis, 1 = y axis).
pub fn waypoint_axis(grid: &Grid, tile: TileIndex) -> Track {
    debug_assert!(is_rail_waypoint(grid, tile));
    if grid.m5(tile) & 1 == 0 {
        Track::Diag1
    } else {
        Track::Diag2
    }
}

pub fn make_plain_rail(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    rt: RailType,
    bits: TrackBits,
) {
    grid.set_kind(tile, TileKind::Railway);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, 0);
    grid.set_m3(tile, rt as u8);
    grid.set_m4(tile, 0);
    grid.set_m5(tile, RAIL_KIND_PLAIN | bits.0);
}

pub fn make_rail_depot(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    rt: RailType,
    exitdir: DiagDirection,
) {
    grid.set_kind(tile, TileKind::Railway);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, 0);
    grid.set_m3(tile, rt as u8);
    grid.set_m4(tile, 0);
    grid.set_m5(
        tile,
        RAIL_KIND_DEPOT_WAYPOINT | RAIL_SUBTYPE_DEPOT | exitdir as u8,
    );
}

pub fn make_rail_waypoint(
    grid: &mut Grid,
    tile: TileIndex,
    owner: Owner,
    rt: RailType,
    axis_y: bool,
) {
    grid.set_kind(tile, TileKind::Railway);
    grid.set_owner(tile, owner);
    grid.set_m2(tile, 0);
    grid.set_m3(tile, rt as u8);
    grid.set_m4(tile, 0);
    grid.set_m5(
        tile,
        RAIL_KIND_DEPOT_WAYPOINT | RAIL_SUBTYPE_WAYPOINT | axis_y as u8,
    );
}

/// Presence of a signal (either facing) on the given track.
pub fn has_signal_on_track(
    grid: &Grid,
    tile: TileIndex,
    track: Track,
) -> bool {
    has_signals(grid, tile) && grid.m3(tile) & signal_on_track(track) != 0
}

/// Presence of a signal facing a driver travelling along `trackdir`.
pub fn has_signal_on_trackdir(
    grid: &Grid,
    tile: TileIndex,
    trackdir: Trackdir,
) -> bool {
    has_signals(grid, tile)
        && grid.m3(tile) & signal_along_trackdir(trackdir) != 0
}

/// State of the signal facing a driver travelling along `trackdir`.
pub fn signal_state(
    grid: &Grid,
    tile: TileIndex,
    trackdir: Trackdir,
) -> SignalState {
    debug_assert!(has_signal_on_track(grid, tile, trackdir.track()));
    if grid.m2(tile) as u8 & signal_along_trackdir(trackdir) != 0 {
        SignalState::Green
    } else {
        SignalState::Red
    }
}

pub fn set_signal_state(
    grid: &mut Grid,
    tile: TileIndex,
    trackdir: Trackdir,
    state: SignalState,
) {
    let bit = signal_along_trackdir(trackdir) as u16;
    let m2 = grid.m2(tile);
    match state {
        SignalState::Green => grid.set_m2(tile, m2 | bit),
        SignalState::Red => grid.set_m2(tile, m2 & !bit),
    }
}

/// The signal type on this tile. Signal types cannot be mixed on one tile.
pub fn signal_type(grid: &Grid, tile: TileIndex) -> SignalType {
    debug_assert!(has_signals(grid, tile));
    SignalType::from_u8(grid.m4(tile) & 0x07).expect("corrupt signal type")
}

pub fn set_signal_type(grid: &mut Grid, tile: TileIndex, ty: SignalType) {
    let m4 = grid.m4(tile);
    grid.set_m4(tile, (m4 & !0x07) | ty as u8);
}

pub fn has_semaphores(grid: &Grid, tile: TileIndex) -> bool {
    grid.m4(tile) & 0x08 != 0
}

/// Converts a plain tile into a signal tile, presence bits cleared.
pub fn make_signal_tile(grid: &mut Grid, tile: TileIndex) {
    debug_assert!(is_plain_rail(grid, tile));
    let m5 = grid.m5(tile);
    grid.set_m5(tile, (m5 & !RAIL_KIND_MASK) | RAIL_KIND_SIGNALS);
}

/// Converts a signal tile back into plain track.
pub fn strip_signals(grid: &mut Grid, tile: TileIndex) {
    debug_assert!(has_signals(grid, tile));
    let m5 = grid.m5(tile);
    grid.set_m5(tile, (m5 & !RAIL_KIND_MASK) | RAIL_KIND_PLAIN);
    let m3 = grid.m3(tile);
    grid.set_m3(tile, m3 & 0x0F);
    grid.set_m2(tile, grid.m2(tile) & !0xF0);
    grid.set_m4(tile, grid.m4(tile) & 0xF0);
}

/// Adds the presence bits for both signals on `track`, initially red.
pub fn add_signals_on_track(grid: &mut Grid, tile: TileIndex, track: Track) {
    let m3 = grid.m3(tile);
    grid.set_m3(tile, m3 | signal_on_track(track));
}

/// Removes the presence bits for both signals on `track`.
pub fn remove_signals_on_track(
    grid: &mut Grid,
    tile: TileIndex,
    track: Track,
) {
    let m3 = grid.m3(tile);
    grid.set_m3(tile, m3 & !signal_on_track(track));
    grid.set_m2(tile, grid.m2(tile) & !(signal_on_track(track) as u16));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rail_round_trip() {
        let mut grid = Grid::new(6, 6);
        let tile = grid.tile_xy(5, 5);
        let bits = Track::Diag1.bit() | Track::Upper.bit();
        make_plain_rail(&mut grid, tile, Owner::Player(0), RailType::Rail, bits);
        assert!(is_plain_rail(&grid, tile));
        assert_eq!(track_bits(&grid, tile), bits);
        assert_eq!(railtype(&grid, tile), RailType::Rail);
        assert!(!has_signals(&grid, tile));
    }

    #[test]
    fn depot_and_waypoint_are_distinct() {
        let mut grid = Grid::new(6, 6);
        let depot = grid.tile_xy(4, 4);
        let wp = grid.tile_xy(5, 4);
        make_rail_depot(
            &mut grid,
            depot,
            Owner::Player(0),
            RailType::Rail,
            DiagDirection::SW,
        );
        make_rail_waypoint(
            &mut grid,
            wp,
            Owner::Player(0),
            RailType::Rail,
            true,
        );
        assert!(is_rail_depot(&grid, depot));
        assert!(!is_rail_waypoint(&grid, depot));
        assert!(is_rail_waypoint(&grid, wp));
        assert_eq!(rail_depot_exitdir(&grid, depot), DiagDirection::SW);
        assert_eq!(waypoint_axis(&grid, wp), Track::Diag2);
    }

    #[test]
    fn signal_state_bits_follow_the_trackdir_tables() {
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
        assert!(has_signal_on_trackdir(&grid, tile, Trackdir::Diag1Ne));
        assert!(has_signal_on_trackdir(&grid, tile, Trackdir::Diag1Sw));
        assert_eq!(
            signal_state(&grid, tile, Trackdir::Diag1Ne),
            SignalState::Red
        );
        set_signal_state(
            &mut grid,
            tile,
            Trackdir::Diag1Ne,
            SignalState::Green,
        );
        assert_eq!(
            signal_state(&grid, tile, Trackdir::Diag1Ne),
            SignalState::Green
        );
        // The opposite facing keeps its own state.
        assert_eq!(
            signal_state(&grid, tile, Trackdir::Diag1Sw),
            SignalState::Red
        );
    }
}
