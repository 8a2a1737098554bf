//! Road construction commands.

use tycmap::{DiagDirection, TileIndex, TileKind};
use tyctrack::Track;
use tycworld::{rail, road, CommandError, Money};

use crate::cmd_rail::{check_tile_ownership, ensure_no_vehicle};
use crate::command::{price, sub_command, CommandFlags, CommandId};
use crate::context::SimulationContext;

/// Builds road pieces on a tile. `p1` is the piece mask.
pub fn build_road(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let pieces = road::RoadBits((p1 & 0x0F) as u8);
    if pieces.is_empty() {
        return Err(CommandError::NoSuitableRoad);
    }
    let grid = &ctx.world.grid;
    if !grid.is_inner(tile) {
        return Err(CommandError::SiteUnsuitable);
    }
    if grid.slope_of(tile).0.is_steep() {
        return Err(CommandError::LandSlopedWrong);
    }

    match grid.kind(tile) {
        TileKind::Street => {
            if !road::is_ordinary_road(grid, tile) {
                return Err(CommandError::MustDemolishFirst);
            }
            let existing = road::road_bits(grid, tile);
            let new = pieces & !existing;
            if new.is_empty() {
                return Err(CommandError::AlreadyBuilt);
            }
            let count = new.0.count_ones() as Money;
            if flags.is_exec() {
                road::set_road_bits(
                    &mut ctx.world.grid,
                    tile,
                    existing | new,
                );
            }
            Ok(count * price::BUILD_ROAD)
        }
        TileKind::Railway => {
            // A crossing needs straight road over a single diagonal track.
            if !rail::is_plain_rail(grid, tile) {
                return Err(CommandError::MustDemolishFirst);
            }
            let bits = rail::track_bits(grid, tile);
            let axis_y = if bits == Track::Diag1.bit()
                && pieces == road::RoadBits::Y
            {
                true
            } else if bits == Track::Diag2.bit()
                && pieces == road::RoadBits::X
            {
                false
            } else {
                return Err(CommandError::MustRemoveRailFirst);
            };
            ensure_no_vehicle(ctx, tile)?;
            if flags.is_exec() {
                let rail_owner = ctx.world.grid.owner(tile);
                let railtype = rail::railtype(&ctx.world.grid, tile);
                let road_owner =
                    tycmap::Owner::Player(ctx.current_player.0);
                road::make_level_crossing(
                    &mut ctx.world.grid,
                    tile,
                    road_owner,
                    rail_owner,
                    railtype,
                    axis_y,
                );
            }
            Ok(2 * price::BUILD_ROAD)
        }
        TileKind::Clear | TileKind::Trees => {
            let count = pieces.0.count_ones() as Money;
            if flags.is_exec() {
                let owner = tycmap::Owner::Player(ctx.current_player.0);
                road::make_road(&mut ctx.world.grid, tile, owner, pieces);
            }
            Ok(count * price::BUILD_ROAD + price::CLEAR_TILE)
        }
        _ => Err(CommandError::MustDemolishFirst),
    }
}

/// Removes road pieces from a tile. `p1` is the piece mask.
pub fn remove_road(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let pieces = road::RoadBits((p1 & 0x0F) as u8);
    let grid = &ctx.world.grid;

    if road::is_level_crossing(grid, tile) {
        ensure_no_vehicle(ctx, tile)?;
        if flags.is_exec() {
            road::crossing_to_rail(&mut ctx.world.grid, tile);
        }
        return Ok(2 * price::REMOVE_ROAD);
    }

    if !road::is_ordinary_road(grid, tile) {
        return Err(CommandError::NoSuitableRoad);
    }
    let existing = road::road_bits(grid, tile);
    let removed = pieces & existing;
    if removed.is_empty() {
        return Err(CommandError::NoSuitableRoad);
    }
    ensure_no_vehicle(ctx, tile)?;
    let count = removed.0.count_ones() as Money;
    if flags.is_exec() {
        let left = existing & !removed;
        if left.is_empty() {
            ctx.world.grid.make_clear(tile);
        } else {
            road::set_road_bits(&mut ctx.world.grid, tile, left);
        }
    }
    Ok(count * price::REMOVE_ROAD)
}

fn long_road_line(
    ctx: &SimulationContext,
    from: TileIndex,
    to: TileIndex,
) -> Result<(i32, i32, u32, road::RoadBits), CommandError> {
    let grid = &ctx.world.grid;
    let dx = grid.tile_x(to) as i32 - grid.tile_x(from) as i32;
    let dy = grid.tile_y(to) as i32 - grid.tile_y(from) as i32;
    if dx != 0 && dy != 0 {
        return Err(CommandError::SiteUnsuitable);
    }
    let axis_bits = if dy == 0 {
        road::RoadBits::X
    } else {
        road::RoadBits::Y
    };
    let count = dx.unsigned_abs().max(dy.unsigned_abs()) + 1;
    Ok((dx.signum(), dy.signum(), count, axis_bits))
}

/// Builds a straight stretch of road from `tile` to the tile in `p1`.
pub fn build_long_road(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let end = TileIndex(p1);
    let (sx, sy, count, bits) = long_road_line(ctx, tile, end)?;
    let mut cost = 0;
    let mut cur = tile;
    for i in 0..count {
        match sub_command(
            ctx,
            cur,
            bits.0 as u32,
            0,
            flags,
            CommandId::BuildRoad,
        ) {
            Ok(c) => cost += c,
            Err(CommandError::AlreadyBuilt) => {}
            Err(e) => return Err(e),
        }
        if i + 1 < count {
            cur = ctx
                .world
                .grid
                .add_wrapped(cur, sx, sy)
                .ok_or(CommandError::SiteUnsuitable)?;
        }
    }
    Ok(cost)
}

pub fn remove_long_road(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let end = TileIndex(p1);
    let (sx, sy, count, bits) = long_road_line(ctx, tile, end)?;
    let mut cost = 0;
    let mut cur = tile;
    for i in 0..count {
        match sub_command(
            ctx,
            cur,
            bits.0 as u32,
            0,
            flags,
            CommandId::RemoveRoad,
        ) {
            Ok(c) => cost += c,
            Err(CommandError::NoSuitableRoad) => {}
            Err(e) => return Err(e),
        }
        if i + 1 < count {
            cur = ctx
                .world
                .grid
                .add_wrapped(cur, sx, sy)
                .ok_or(CommandError::SiteUnsuitable)?;
        }
    }
    Ok(cost)
}

/// Builds a road depot. `p1` is the exit direction.
pub fn build_road_depot(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let exitdir = DiagDirection::from_u8(p1 as u8)
        .ok_or(CommandError::SiteUnsuitable)?;
    let grid = &ctx.world.grid;
    if !grid.is_inner(tile) {
        return Err(CommandError::SiteUnsuitable);
    }
    if !matches!(grid.kind(tile), TileKind::Clear | TileKind::Trees) {
        return Err(CommandError::MustDemolishFirst);
    }
    if !grid.slope_of(tile).0.is_flat() {
        return Err(CommandError::FlatLandRequired);
    }
    if flags.is_exec() {
        let owner = tycmap::Owner::Player(ctx.current_player.0);
        road::make_road_depot(&mut ctx.world.grid, tile, owner, exitdir);
        ctx.world.add_depot(tile);
    }
    Ok(price::BUILD_ROAD_DEPOT + price::CLEAR_TILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::do_command;

    #[test]
    fn long_road_accumulates_only_new_pieces() {
        let mut ctx = SimulationContext::new(6, 6, 1);
        let mid = ctx.world.grid.tile_xy(7, 5);
        do_command(
            &mut ctx,
            mid,
            road::RoadBits::X.0 as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildRoad,
        )
        .unwrap();
        let start = ctx.world.grid.tile_xy(5, 5);
        let end = ctx.world.grid.tile_xy(9, 5);
        let cost = do_command(
            &mut ctx,
            start,
            end.0,
            0,
            CommandFlags::EXEC,
            CommandId::BuildLongRoad,
        )
        .unwrap();
        assert_eq!(
            cost,
            4 * (2 * price::BUILD_ROAD + price::CLEAR_TILE)
        );
        for x in 5..=9 {
            let t = ctx.world.grid.tile_xy(x, 5);
            assert!(road::is_ordinary_road(&ctx.world.grid, t));
        }
    }

    #[test]
    fn crossing_requires_matching_axes() {
        let mut ctx = SimulationContext::new(6, 6, 1);
        let tile = ctx.world.grid.tile_xy(5, 5);
        do_command(
            &mut ctx,
            tile,
            Track::Diag1 as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildSingleRail,
        )
        .unwrap();
        // Parallel road is refused; perpendicular makes a crossing.
        let wrong = do_command(
            &mut ctx,
            tile,
            road::RoadBits::X.0 as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildRoad,
        );
        assert_eq!(wrong, Err(CommandError::MustRemoveRailFirst));
        do_command(
            &mut ctx,
            tile,
            road::RoadBits::Y.0 as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildRoad,
        )
        .unwrap();
        assert!(road::is_level_crossing(&ctx.world.grid, tile));
        assert!(road::crossing_road_axis_y(&ctx.world.grid, tile));
    }
}
