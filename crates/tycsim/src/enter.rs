//! Tile enter and leave hooks.
//!
//! Called every substep a vehicle stands on (or steps onto) a tile. The
//! result is a small bitset: `8` forbids the move entirely, `4` means the
//! tile swallowed the vehicle (depot or tunnel wormhole), `2` reports
//! arrival at a station whose id sits in the upper bits.

use tycmap::{Grid, TileIndex, TileKind};
use tycworld::vehicle::TrainVeh;
use tycworld::{
    rail, road, station, tunnel, OrderKind, StationId, TransportType,
    VehicleFlags, VehicleId, VehicleKind,
};

use crate::context::SimulationContext;
use crate::train;

pub const ENTER_STATION: u32 = 2;
pub const ENTER_WORMHOLE: u32 = 4;
pub const ENTER_BLOCKED: u32 = 8;

pub fn station_id_of(result: u32) -> StationId {
    StationId((result >> 8) as u16)
}

/// Dispatches on the tile kind. `x`/`y` are the vehicle's pixel position.
pub fn vehicle_enter(
    ctx: &mut SimulationContext,
    vid: VehicleId,
    tile: TileIndex,
    x: i32,
    y: i32,
) -> u32 {
    match ctx.world.grid.kind(tile) {
        TileKind::Railway => enter_rail(ctx, vid, tile, x, y),
        TileKind::Station => enter_station(ctx, vid, tile, x, y),
        TileKind::TunnelBridge => enter_tunnel_bridge(ctx, vid, tile, x, y),
        _ => 0,
    }
}

/// Fires on the tile just left; crossings switch their lights off here.
pub fn vehicle_leave(
    ctx: &mut SimulationContext,
    _vid: VehicleId,
    tile: TileIndex,
) {
    if road::is_level_crossing(&ctx.world.grid, tile)
        && road::crossing_lights_on(&ctx.world.grid, tile)
        && !train_on_tile(ctx, tile)
    {
        road::set_crossing_lights(&mut ctx.world.grid, tile, false);
    }
}

fn train_on_tile(ctx: &SimulationContext, tile: TileIndex) -> bool {
    ctx.world
        .vehicles
        .vehicle_from_pos(&ctx.world.grid, tile, &mut |v| {
            v.kind() == Some(VehicleKind::Train) && v.tile == tile
        })
        .is_some()
}

/// Only rail depots react here: wagons dive in one by one at the tile
/// centre, flipping to face the mouth.
fn enter_rail(
    ctx: &mut SimulationContext,
    vid: VehicleId,
    tile: TileIndex,
    x: i32,
    y: i32,
) -> u32 {
    if !rail::is_rail_depot(&ctx.world.grid, tile) {
        return 0;
    }
    if ctx.world.vehicles.get(vid).kind() != Some(VehicleKind::Train) {
        return 0;
    }
    let exitdir = rail::rail_depot_exitdir(&ctx.world.grid, tile);
    let out_dir = exitdir.to_direction();
    let in_dir = out_dir.reverse();
    let (fx, fy) = ((x & 0xF) as u8, (y & 0xF) as u8);

    let v_dir = ctx.world.vehicles.get(vid).direction;
    if v_dir == out_dir {
        let through_back = match exitdir {
            tycmap::DiagDirection::NE => fx > 8,
            tycmap::DiagDirection::SW => fx < 8,
            tycmap::DiagDirection::SE => fy < 8,
            tycmap::DiagDirection::NW => fy > 8,
        };
        let in_depot = ctx.world.vehicles.get(vid).train().in_depot();
        if through_back && !in_depot {
            // Trains cannot slip in through the back wall.
            return ENTER_BLOCKED;
        }
        // Nearing the mouth: the next wagon gets pulled out of the shed.
        let at_mouth = match exitdir {
            tycmap::DiagDirection::NE => fx == 2,
            tycmap::DiagDirection::SW => fx == 13,
            tycmap::DiagDirection::SE => fy == 13,
            tycmap::DiagDirection::NW => fy == 2,
        };
        if at_mouth {
            release_next_wagon(ctx, vid, tile, out_dir);
        }
        return 0;
    }

    if v_dir == in_dir && (fx, fy) == (8, 8) {
        // This wagon reached the back of the shed.
        let is_last;
        {
            let v = ctx.world.vehicles.get_mut(vid);
            let t = v.train_mut();
            t.track = TrainVeh::TRACK_IN_DEPOT;
            v.flags.set(VehicleFlags::HIDDEN);
            v.direction = v.direction.reverse();
            v.tile = tile;
            is_last = v.next.is_none();
        }
        if is_last {
            train::train_entered_depot(ctx, vid, tile);
        }
        return ENTER_WORMHOLE;
    }
    0
}

/// Unhides the wagon behind `vid` and sets it rolling on the depot track.
fn release_next_wagon(
    ctx: &mut SimulationContext,
    vid: VehicleId,
    tile: TileIndex,
    out_dir: tycmap::Direction,
) {
    let Some(next) = ctx.world.vehicles.get(vid).next else {
        return;
    };
    if !ctx.world.vehicles.get(next).train().in_depot() {
        return;
    }
    let grid = &ctx.world.grid;
    let cx = (grid.tile_x(tile) * 16 + 8) as i32;
    let cy = (grid.tile_y(tile) * 16 + 8) as i32;
    let track =
        tyctrack::diagdir_to_diag_trackdir(out_dir.to_diagdir()).track();
    let v = ctx.world.vehicles.get_mut(next);
    v.train_mut().track = track.bit().0;
    v.flags.clear(VehicleFlags::HIDDEN);
    v.direction = out_dir;
    v.tile = tile;
    v.x_pos = cx;
    v.y_pos = cy;
    ctx.world.vehicles.position_changed(next);
}

fn enter_station(
    ctx: &mut SimulationContext,
    vid: VehicleId,
    tile: TileIndex,
    x: i32,
    y: i32,
) -> u32 {
    let grid = &ctx.world.grid;
    if !station::is_rail_station_tile(grid, tile) {
        return 0;
    }
    let v = ctx.world.vehicles.get(vid);
    if v.kind() != Some(VehicleKind::Train) || !v.is_front_engine() {
        return 0;
    }
    let id = station::station_id_at(grid, tile);
    if v.current_order.kind != OrderKind::GotoStation
        || v.current_order.target != id.0
        || v.last_station_visited == Some(id)
    {
        return 0;
    }
    // Stop at the centre of the last platform tile in travel direction.
    let axis_frac = match v.direction.to_diagdir() {
        tycmap::DiagDirection::NE | tycmap::DiagDirection::SW => x & 0xF,
        _ => y & 0xF,
    };
    if axis_frac != 8 {
        return 0;
    }
    if next_platform_tile(grid, tile, v.direction).is_some() {
        return 0;
    }
    ENTER_STATION | ((id.0 as u32) << 8)
}

/// The adjacent tile in travel direction if it belongs to the same
/// station's platform run.
fn next_platform_tile(
    grid: &Grid,
    tile: TileIndex,
    dir: tycmap::Direction,
) -> Option<TileIndex> {
    let next = grid.neighbour(tile, dir.to_diagdir())?;
    if station::is_rail_station_tile(grid, next)
        && station::station_id_at(grid, next)
            == station::station_id_at(grid, tile)
        && grid.m5(next) & 1 == grid.m5(tile) & 1
    {
        Some(next)
    } else {
        None
    }
}

/// Counts the platform tiles from `tile` onwards in `dir`, inclusive.
pub fn platform_length_ahead(
    grid: &Grid,
    tile: TileIndex,
    dir: tycmap::Direction,
) -> u32 {
    let mut len = 1;
    let mut cur = tile;
    while let Some(next) = next_platform_tile(grid, cur, dir) {
        len += 1;
        cur = next;
    }
    len
}

fn enter_tunnel_bridge(
    ctx: &mut SimulationContext,
    vid: VehicleId,
    tile: TileIndex,
    x: i32,
    y: i32,
) -> u32 {
    let grid = &ctx.world.grid;
    if !tunnel::is_tunnel_entrance(grid, tile) {
        return 0;
    }
    let transport = tunnel::tunnel_transport(grid, tile);
    let v = ctx.world.vehicles.get(vid);
    let matches_mode = match transport {
        TransportType::Rail => v.kind() == Some(VehicleKind::Train),
        TransportType::Road => v.kind() == Some(VehicleKind::Road),
        TransportType::Water => false,
    };
    if !matches_mode {
        return 0;
    }
    let dir = tunnel::tunnel_dir(grid, tile);
    let in_dir = dir.to_direction();
    let (fx, fy) = ((x & 0xF) as u8, (y & 0xF) as u8);

    if v.direction == in_dir && !v.flags.has(VehicleFlags::HIDDEN) {
        if (fx, fy) == (8, 8) {
            // Dive below ground at the portal centre.
            let v = ctx.world.vehicles.get_mut(vid);
            v.flags.set(VehicleFlags::HIDDEN);
            match v.kind() {
                Some(VehicleKind::Train) => {
                    v.train_mut().track = TrainVeh::TRACK_IN_TUNNEL;
                }
                Some(VehicleKind::Road) => {
                    v.road_mut().state = crate::roadveh::RV_STATE_IN_TUNNEL;
                }
                _ => {}
            }
            return ENTER_WORMHOLE;
        }
        return 0;
    }

    if v.direction == in_dir.reverse() && v.flags.has(VehicleFlags::HIDDEN) {
        // Surfacing at the far portal.
        let diag = v.direction.to_diagdir();
        let v = ctx.world.vehicles.get_mut(vid);
        v.flags.clear(VehicleFlags::HIDDEN);
        v.tile = tile;
        match v.kind() {
            Some(VehicleKind::Train) => {
                v.train_mut().track =
                    tyctrack::diagdir_to_diag_trackdir(diag)
                        .track()
                        .bit()
                        .0;
            }
            Some(VehicleKind::Road) => {
                v.road_mut().state =
                    tyctrack::diagdir_to_diag_trackdir(diag).track() as u8;
            }
            _ => {}
        }
        return ENTER_WORMHOLE;
    }
    0
}
