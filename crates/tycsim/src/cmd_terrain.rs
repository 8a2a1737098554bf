//! Returning tiles to flat bare land.

use tycmap::{TileIndex, TileKind};
use tycworld::{rail, road, station, CommandError, Money};

use crate::cmd_rail::{check_tile_ownership, ensure_no_vehicle};
use crate::command::{price, CommandFlags};
use crate::context::SimulationContext;

/// Clears one tile back to bare land.
///
/// Infrastructure must be removed with its own command first; this only
/// sweeps up clears, trees, plain roads and the player's own leftovers.
pub fn landscape_clear(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    _p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let grid = &ctx.world.grid;
    if !grid.is_inner(tile) {
        return Err(CommandError::SiteUnsuitable);
    }
    if flags.has(CommandFlags::NO_WATER)
        && grid.is_kind(tile, TileKind::Water)
    {
        return Err(CommandError::SiteUnsuitable);
    }

    match grid.kind(tile) {
        TileKind::Clear => Ok(price::CLEAR_TILE),
        TileKind::Trees => {
            if flags.is_exec() {
                ctx.world.grid.make_clear(tile);
            }
            Ok(price::CLEAR_TILE)
        }
        TileKind::Railway => {
            if rail::is_plain_rail(grid, tile)
                || rail::is_rail_depot(grid, tile)
                || rail::is_rail_waypoint(grid, tile)
            {
                return Err(CommandError::MustRemoveRailFirst);
            }
            Err(CommandError::MustDemolishFirst)
        }
        TileKind::Street => {
            if road::is_ordinary_road(grid, tile) {
                check_tile_ownership(ctx, tile)
                    .or_else(|_| {
                        // Town roads may be cleared, at a price.
                        Ok::<(), CommandError>(())
                    })?;
                ensure_no_vehicle(ctx, tile)?;
                if flags.is_exec() {
                    ctx.world.grid.make_clear(tile);
                }
                Ok(price::CLEAR_TILE + 2 * price::REMOVE_ROAD)
            } else {
                Err(CommandError::MustRemoveRoadFirst)
            }
        }
        TileKind::Station => {
            let id = station::station_id_at(grid, tile);
            check_tile_ownership(ctx, tile)?;
            ensure_no_vehicle(ctx, tile)?;
            if flags.is_exec() {
                remove_station_tile(ctx, tile, id);
            }
            Ok(price::CLEAR_TILE + price::BUILD_RAIL_STATION_TILE / 2)
        }
        TileKind::Water => Err(CommandError::SiteUnsuitable),
        _ => Err(CommandError::MustDemolishFirst),
    }
}

fn remove_station_tile(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    id: tycworld::StationId,
) {
    let grid = &ctx.world.grid;
    let was_stop = station::is_road_stop_tile(grid, tile);
    ctx.world.grid.make_clear(tile);
    let st = ctx.world.stations.get_mut(id);
    if was_stop {
        st.bus_stops.retain(|s| s.xy != tile);
        st.truck_stops.retain(|s| s.xy != tile);
    }
    if st.train_tile == Some(tile) {
        st.train_tile = None;
        st.trainst_w = 0;
        st.trainst_h = 0;
    }
    if st.dock_tile == Some(tile) {
        st.dock_tile = None;
    }
}
