//! Station construction commands.

use tycmap::{DiagDirection, TileIndex, TileKind};
use tycworld::{station, CommandError, Money, RoadStopKind, StationId};

use crate::cmd_rail::ensure_no_vehicle;
use crate::command::{price, CommandFlags};
use crate::context::SimulationContext;

/// An existing station of this player adjacent to (or on) the area, to
/// extend instead of founding a new one.
fn find_joinable_station(
    ctx: &SimulationContext,
    tile: TileIndex,
) -> Option<StationId> {
    let grid = &ctx.world.grid;
    let owner = tycmap::Owner::Player(ctx.current_player.0);
    for dx in -2i32..=2 {
        for dy in -2i32..=2 {
            let Some(t) = grid.add_wrapped(tile, dx, dy) else {
                continue;
            };
            if grid.is_kind(t, TileKind::Station)
                && !station::is_buoy_tile(grid, t)
                && grid.is_owner(t, owner)
            {
                return Some(station::station_id_at(grid, t));
            }
        }
    }
    None
}

fn station_for(
    ctx: &mut SimulationContext,
    tile: TileIndex,
) -> StationId {
    match find_joinable_station(ctx, tile) {
        Some(id) => id,
        None => {
            let owner = tycmap::Owner::Player(ctx.current_player.0);
            let date = ctx.world.calendar.date;
            ctx.world.stations.allocate(tile, owner, date)
        }
    }
}

/// Builds a run of rail platform tiles.
///
/// `p1`: bit 0 is the axis (0 = x), bits 8.. the platform length.
pub fn build_rail_station(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let axis_y = p1 & 1 != 0;
    let length = ((p1 >> 8) & 0xFF).max(1);
    let railtype = p2 & 0x03;
    let (sx, sy) = if axis_y { (0, 1) } else { (1, 0) };

    // Validate the whole run first.
    let mut cur = tile;
    for i in 0..length {
        let grid = &ctx.world.grid;
        if !matches!(grid.kind(cur), TileKind::Clear | TileKind::Trees) {
            return Err(CommandError::MustDemolishFirst);
        }
        if !grid.slope_of(cur).0.is_flat() {
            return Err(CommandError::FlatLandRequired);
        }
        if i + 1 < length {
            cur = grid
                .add_wrapped(cur, sx, sy)
                .ok_or(CommandError::SiteUnsuitable)?;
        }
    }

    let cost = length as Money * price::BUILD_RAIL_STATION_TILE;
    if flags.is_exec() {
        let id = station_for(ctx, tile);
        let owner = tycmap::Owner::Player(ctx.current_player.0);
        let mut cur = tile;
        for i in 0..length {
            station::make_rail_station_tile(
                &mut ctx.world.grid,
                cur,
                owner,
                id,
                axis_y,
                0,
            );
            let m3 = ctx.world.grid.m3(cur);
            ctx.world.grid.set_m3(cur, (m3 & !0x03) | railtype as u8);
            if i + 1 < length {
                cur = ctx.world.grid.add_wrapped(cur, sx, sy).unwrap();
            }
        }
        let st = ctx.world.stations.get_mut(id);
        st.train_tile = Some(tile);
        if axis_y {
            st.trainst_w = 1;
            st.trainst_h = length as u8;
        } else {
            st.trainst_w = length as u8;
            st.trainst_h = 1;
        }
    }
    Ok(cost)
}

/// Builds a drive-in road stop.
/// `p1` is the entrance direction; `p2` 0 = bus, 1 = truck.
pub fn build_road_stop(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let exitdir = DiagDirection::from_u8(p1 as u8)
        .ok_or(CommandError::SiteUnsuitable)?;
    let kind = if p2 == 0 {
        RoadStopKind::Bus
    } else {
        RoadStopKind::Truck
    };
    let grid = &ctx.world.grid;
    if !matches!(grid.kind(tile), TileKind::Clear | TileKind::Trees) {
        return Err(CommandError::MustDemolishFirst);
    }
    if !grid.slope_of(tile).0.is_flat() {
        return Err(CommandError::FlatLandRequired);
    }
    if flags.is_exec() {
        let id = station_for(ctx, tile);
        let owner = tycmap::Owner::Player(ctx.current_player.0);
        station::make_road_stop_tile(
            &mut ctx.world.grid,
            tile,
            owner,
            id,
            kind,
            exitdir,
        );
        ctx.world
            .stations
            .get_mut(id)
            .stops_mut(kind)
            .push(station::RoadStop::new(tile, kind));
    }
    Ok(price::BUILD_ROAD_STOP + price::CLEAR_TILE)
}

/// Builds a dock on a coast-adjacent tile. `p1` is the direction the
/// approach water lies in.
pub fn build_dock(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let dir = DiagDirection::from_u8(p1 as u8)
        .ok_or(CommandError::SiteUnsuitable)?;
    let grid = &ctx.world.grid;
    let approach = grid
        .neighbour(tile, dir)
        .ok_or(CommandError::SiteUnsuitable)?;
    if !grid.is_kind(approach, TileKind::Water) {
        return Err(CommandError::SiteUnsuitable);
    }
    if !matches!(grid.kind(tile), TileKind::Clear | TileKind::Trees) {
        return Err(CommandError::MustDemolishFirst);
    }
    if flags.is_exec() {
        let id = station_for(ctx, tile);
        let owner = tycmap::Owner::Player(ctx.current_player.0);
        station::make_dock_tile(&mut ctx.world.grid, tile, owner, id, dir);
        ctx.world.stations.get_mut(id).dock_tile = Some(tile);
    }
    Ok(price::BUILD_DOCK)
}

/// Drops a buoy on open water; its station is shared by everyone.
pub fn build_buoy(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    _p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let grid = &ctx.world.grid;
    if !grid.is_kind(tile, TileKind::Water) || grid.m5(tile) != 0 {
        return Err(CommandError::SiteUnsuitable);
    }
    ensure_no_vehicle(ctx, tile)?;
    if flags.is_exec() {
        let date = ctx.world.calendar.date;
        let id = ctx
            .world
            .stations
            .allocate(tile, tycmap::Owner::None, date);
        station::make_buoy_tile(&mut ctx.world.grid, tile, id);
        ctx.world.stations.get_mut(id).is_buoy = true;
    }
    Ok(price::BUILD_BUOY)
}

/// Builds a ship depot on open water. `p1` is the exit direction.
pub fn build_ship_depot(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let exitdir = DiagDirection::from_u8(p1 as u8)
        .ok_or(CommandError::SiteUnsuitable)?;
    let grid = &ctx.world.grid;
    if !grid.is_kind(tile, TileKind::Water) || grid.m5(tile) != 0 {
        return Err(CommandError::SiteUnsuitable);
    }
    ensure_no_vehicle(ctx, tile)?;
    if flags.is_exec() {
        let owner = tycmap::Owner::Player(ctx.current_player.0);
        ctx.world.grid.set_owner(tile, owner);
        ctx.world.grid.set_m5(tile, 0x80 | exitdir as u8);
        ctx.world.add_depot(tile);
    }
    Ok(price::BUILD_SHIP_DEPOT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{do_command, CommandId};

    #[test]
    fn platform_run_registers_its_rectangle() {
        let mut ctx = SimulationContext::new(6, 6, 1);
        let tile = ctx.world.grid.tile_xy(10, 10);
        do_command(
            &mut ctx,
            tile,
            4 << 8,
            0,
            CommandFlags::EXEC,
            CommandId::BuildRailStation,
        )
        .unwrap();
        let id = station::station_id_at(&ctx.world.grid, tile);
        let st = ctx.world.stations.get(id);
        assert_eq!(st.train_tile, Some(tile));
        assert_eq!((st.trainst_w, st.trainst_h), (4, 1));
        for x in 10..14 {
            let t = ctx.world.grid.tile_xy(x, 10);
            assert!(station::is_rail_station_tile(&ctx.world.grid, t));
            assert_eq!(station::station_id_at(&ctx.world.grid, t), id);
        }
    }

    #[test]
    fn adjacent_stops_join_the_same_station() {
        let mut ctx = SimulationContext::new(6, 6, 1);
        let a = ctx.world.grid.tile_xy(10, 10);
        let b = ctx.world.grid.tile_xy(11, 10);
        do_command(
            &mut ctx,
            a,
            DiagDirection::NE as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildRoadStop,
        )
        .unwrap();
        do_command(
            &mut ctx,
            b,
            DiagDirection::NE as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildRoadStop,
        )
        .unwrap();
        let id_a = station::station_id_at(&ctx.world.grid, a);
        let id_b = station::station_id_at(&ctx.world.grid, b);
        assert_eq!(id_a, id_b);
        assert_eq!(ctx.world.stations.get(id_a).bus_stops.len(), 2);
    }
}
