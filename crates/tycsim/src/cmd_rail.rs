//! Rail construction commands.

use tycmap::{DiagDirection, TileIndex, TileKind};
use tyctrack::{signal_on_track, Track, TrackBits};
use tycworld::{rail, road, CommandError, Money, RailType, SignalType,
    VehicleKind,
};

use crate::command::{price, sub_command, CommandFlags, CommandId};
use crate::context::SimulationContext;
use crate::signal::{set_signals_on_both_dir, update_signals_on_segment};

/// No vehicle may stand on a tile being rebuilt.
pub(crate) fn ensure_no_vehicle(
    ctx: &SimulationContext,
    tile: TileIndex,
) -> Result<(), CommandError> {
    let occupied = ctx
        .world
        .vehicles
        .vehicle_from_pos(&ctx.world.grid, tile, &mut |v| {
            v.tile == tile && v.kind() != Some(VehicleKind::Effect)
        })
        .is_some();
    if occupied {
        Err(CommandError::VehicleInTheWay)
    } else {
        Ok(())
    }
}

pub(crate) fn check_tile_ownership(
    ctx: &SimulationContext,
    tile: TileIndex,
) -> Result<(), CommandError> {
    let owner = tycmap::Owner::Player(ctx.current_player.0);
    if ctx.world.grid.owner(tile) == owner {
        Ok(())
    } else {
        Err(CommandError::AreaOwnedByAnother)
    }
}

fn check_buildable_ground(
    ctx: &SimulationContext,
    tile: TileIndex,
    flags: CommandFlags,
) -> Result<(), CommandError> {
    let grid = &ctx.world.grid;
    if !grid.is_inner(tile) {
        return Err(CommandError::SiteUnsuitable);
    }
    if flags.has(CommandFlags::NO_WATER)
        && grid.is_kind(tile, TileKind::Water)
    {
        return Err(CommandError::SiteUnsuitable);
    }
    let (slope, _) = grid.slope_of(tile);
    if slope.is_steep() {
        return Err(CommandError::LandSlopedWrong);
    }
    Ok(())
}

/// Builds one piece of track.
///
/// `p1` is the track, `p2` the rail type.
pub fn build_single_rail(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let track =
        Track::from_u8(p1 as u8).ok_or(CommandError::NoSuitableTrack)?;
    let railtype =
        RailType::from_u8(p2 as u8).ok_or(CommandError::IncompatibleRail)?;
    check_buildable_ground(ctx, tile, flags)?;

    let owner = tycmap::Owner::Player(ctx.current_player.0);
    let grid = &ctx.world.grid;

    match grid.kind(tile) {
        TileKind::Railway => {
            if !rail::is_plain_rail(grid, tile) {
                return Err(CommandError::MustDemolishFirst);
            }
            check_tile_ownership(ctx, tile)?;
            let grid = &ctx.world.grid;
            if rail::railtype(grid, tile) != railtype {
                return Err(CommandError::IncompatibleRail);
            }
            let bits = rail::track_bits(grid, tile);
            if bits.has(track) {
                return Err(CommandError::AlreadyBuilt);
            }
            if flags.has(CommandFlags::NO_RAIL_OVERLAP) && !bits.is_empty() {
                return Err(CommandError::NoSuitableTrack);
            }
            ensure_no_vehicle(ctx, tile)?;
            if flags.is_exec() {
                let m5 = ctx.world.grid.m5(tile);
                ctx.world.grid.set_m5(tile, m5 | track.bit().0);
                set_signals_on_both_dir(
                    &mut ctx.world,
                    &mut ctx.follower,
                    tile,
                    track,
                );
            }
            Ok(price::BUILD_RAIL)
        }
        TileKind::Street => {
            // Level crossing: straight road crossed by the matching
            // diagonal track.
            if !road::is_ordinary_road(grid, tile) {
                return Err(CommandError::MustDemolishFirst);
            }
            let bits = road::road_bits(grid, tile);
            let (axis_y, needed) = if bits == road::RoadBits::X {
                (false, Track::Diag2)
            } else if bits == road::RoadBits::Y {
                (true, Track::Diag1)
            } else {
                return Err(CommandError::MustRemoveRoadFirst);
            };
            if track != needed {
                return Err(CommandError::NoSuitableTrack);
            }
            ensure_no_vehicle(ctx, tile)?;
            if flags.is_exec() {
                let road_owner = ctx.world.grid.owner(tile);
                road::make_level_crossing(
                    &mut ctx.world.grid,
                    tile,
                    road_owner,
                    owner,
                    railtype,
                    axis_y,
                );
                set_signals_on_both_dir(
                    &mut ctx.world,
                    &mut ctx.follower,
                    tile,
                    track,
                );
            }
            Ok(price::BUILD_RAIL)
        }
        TileKind::Clear | TileKind::Trees => {
            if flags.is_exec() {
                rail::make_plain_rail(
                    &mut ctx.world.grid,
                    tile,
                    owner,
                    railtype,
                    track.bit(),
                );
                set_signals_on_both_dir(
                    &mut ctx.world,
                    &mut ctx.follower,
                    tile,
                    track,
                );
            }
            Ok(price::BUILD_RAIL + price::CLEAR_TILE)
        }
        _ => Err(CommandError::MustDemolishFirst),
    }
}

/// Removes one piece of track. `p1` is the track.
pub fn remove_single_rail(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let track =
        Track::from_u8(p1 as u8).ok_or(CommandError::NoSuitableTrack)?;
    let grid = &ctx.world.grid;

    if road::is_level_crossing(grid, tile) {
        if road::crossing_rail_track(grid, tile) != track {
            return Err(CommandError::NoSuitableTrack);
        }
        check_tile_ownership(ctx, tile)?;
        ensure_no_vehicle(ctx, tile)?;
        if flags.is_exec() {
            let road_owner =
                tycmap::Owner::decode(ctx.world.grid.m3(tile));
            let bits = if road::crossing_road_axis_y(&ctx.world.grid, tile) {
                road::RoadBits::Y
            } else {
                road::RoadBits::X
            };
            road::make_road(&mut ctx.world.grid, tile, road_owner, bits);
        }
        return Ok(price::REMOVE_RAIL);
    }

    if !rail::is_rail_tile(grid, tile) || !rail::is_plain_rail(grid, tile) {
        return Err(CommandError::NoSuitableTrack);
    }
    check_tile_ownership(ctx, tile)?;
    let grid = &ctx.world.grid;
    if !rail::track_bits(grid, tile).has(track) {
        return Err(CommandError::NoSuitableTrack);
    }
    ensure_no_vehicle(ctx, tile)?;

    let mut cost = price::REMOVE_RAIL;
    if rail::has_signal_on_track(grid, tile, track) {
        cost += price::REMOVE_SIGNALS;
    }

    if flags.is_exec() {
        if rail::has_signal_on_track(&ctx.world.grid, tile, track) {
            rail::remove_signals_on_track(&mut ctx.world.grid, tile, track);
            if ctx.world.grid.m3(tile) & 0xF0 == 0 {
                rail::strip_signals(&mut ctx.world.grid, tile);
            }
        }
        let m5 = ctx.world.grid.m5(tile);
        let remaining = TrackBits((m5 & 0x3F) & !track.bit().0);
        if remaining.is_empty() {
            ctx.world.grid.make_clear(tile);
        } else {
            ctx.world.grid.set_m5(tile, (m5 & 0xC0) | remaining.0);
        }
        set_signals_on_both_dir(
            &mut ctx.world,
            &mut ctx.follower,
            tile,
            track,
        );
    }
    Ok(cost)
}

fn line_step(
    ctx: &SimulationContext,
    from: TileIndex,
    to: TileIndex,
) -> Result<(i32, i32, u32), CommandError> {
    let grid = &ctx.world.grid;
    let dx = grid.tile_x(to) as i32 - grid.tile_x(from) as i32;
    let dy = grid.tile_y(to) as i32 - grid.tile_y(from) as i32;
    if dx != 0 && dy != 0 {
        return Err(CommandError::SiteUnsuitable);
    }
    let count = dx.unsigned_abs().max(dy.unsigned_abs()) + 1;
    Ok((dx.signum(), dy.signum(), count))
}

/// Builds a straight run of track from `tile` to the tile in `p1`.
/// `p2` carries the track in the low nibble and the rail type above it.
pub fn build_railroad_track(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    rail_track_line(ctx, tile, p1, p2, flags, CommandId::BuildSingleRail)
}

/// Removes a straight run of track, tolerant of gaps.
pub fn remove_railroad_track(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    rail_track_line(ctx, tile, p1, p2, flags, CommandId::RemoveSingleRail)
}

fn rail_track_line(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
    each: CommandId,
) -> Result<Money, CommandError> {
    let end = TileIndex(p1);
    let track = p2 & 0x0F;
    let railtype = p2 >> 4;
    let (sx, sy, count) = line_step(ctx, tile, end)?;

    let mut cost = 0;
    let mut cur = tile;
    for i in 0..count {
        match sub_command(ctx, cur, track, railtype, flags, each) {
            Ok(c) => cost += c,
            // A piece that is already there (or already gone) is skipped;
            // anything else aborts the run.
            Err(CommandError::AlreadyBuilt) => {}
            Err(CommandError::NoSuitableTrack)
                if each == CommandId::RemoveSingleRail => {}
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

/// Builds a train depot. `p1` is the exit direction, `p2` the rail type.
pub fn build_train_depot(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let exitdir = DiagDirection::from_u8(p1 as u8)
        .ok_or(CommandError::SiteUnsuitable)?;
    let railtype =
        RailType::from_u8(p2 as u8).ok_or(CommandError::IncompatibleRail)?;
    check_buildable_ground(ctx, tile, flags)?;
    let grid = &ctx.world.grid;
    if !matches!(grid.kind(tile), TileKind::Clear | TileKind::Trees) {
        return Err(CommandError::MustDemolishFirst);
    }
    if !grid.slope_of(tile).0.is_flat() {
        return Err(CommandError::FlatLandRequired);
    }
    if flags.is_exec() {
        let owner = tycmap::Owner::Player(ctx.current_player.0);
        rail::make_rail_depot(
            &mut ctx.world.grid,
            tile,
            owner,
            railtype,
            exitdir,
        );
        ctx.world.add_depot(tile);
        update_signals_on_segment(
            &mut ctx.world,
            &mut ctx.follower,
            tile,
            exitdir.to_direction(),
        );
    }
    Ok(price::BUILD_TRAIN_DEPOT + price::CLEAR_TILE)
}

/// Turns a single diagonal piece of plain track into a waypoint.
pub fn build_train_waypoint(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    _p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let grid = &ctx.world.grid;
    if !rail::is_rail_tile(grid, tile) || !rail::is_plain_rail(grid, tile) {
        return Err(CommandError::NoSuitableTrack);
    }
    check_tile_ownership(ctx, tile)?;
    let grid = &ctx.world.grid;
    let bits = rail::track_bits(grid, tile);
    let axis_y = if bits == Track::Diag1.bit() {
        false
    } else if bits == Track::Diag2.bit() {
        true
    } else {
        return Err(CommandError::NoSuitableTrack);
    };
    ensure_no_vehicle(ctx, tile)?;
    if flags.is_exec() {
        let owner = ctx.world.grid.owner(tile);
        let railtype = rail::railtype(&ctx.world.grid, tile);
        rail::make_rail_waypoint(
            &mut ctx.world.grid,
            tile,
            owner,
            railtype,
            axis_y,
        );
        ctx.world.add_waypoint(tile);
    }
    Ok(price::BUILD_WAYPOINT)
}

/// Builds or cycles signals on one track of a tile.
///
/// `p1` carries the track in the low three bits and, in bit 3, whether a
/// repeated build cycles the signal type (else it cycles the facing).
/// A non-zero `p2` copies the facing bits given in it.
pub fn build_signals(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let track =
        Track::from_u8((p1 & 7) as u8).ok_or(CommandError::NoSuitableTrack)?;
    let cycle_type = p1 & 8 != 0;
    let grid = &ctx.world.grid;

    if !rail::is_rail_tile(grid, tile) || !rail::is_plain_rail(grid, tile) {
        return Err(CommandError::NoSuitableTrack);
    }
    if !rail::track_bits(grid, tile).has(track) {
        return Err(CommandError::NoSuitableTrack);
    }
    check_tile_ownership(ctx, tile)?;
    let grid = &ctx.world.grid;

    // Signals fit on single tracks and on the two parallel pairs only.
    let bits = rail::track_bits(grid, tile);
    let parallel_ok = bits.count() == 1
        || bits == (Track::Upper.bit() | Track::Lower.bit())
        || bits == (Track::Left.bit() | Track::Right.bit());
    if !parallel_ok {
        return Err(CommandError::NoSuitableTrack);
    }
    ensure_no_vehicle(ctx, tile)?;

    let had_signal = rail::has_signal_on_track(grid, tile, track);
    let cost = if had_signal { 0 } else { price::BUILD_SIGNALS };

    if flags.is_exec() {
        let grid = &mut ctx.world.grid;
        if !rail::has_signals(grid, tile) {
            rail::make_signal_tile(grid, tile);
            // Fresh signals start green and present in no direction yet.
            grid.set_m2(tile, grid.m2(tile) | 0xF0);
            grid.set_m3(tile, grid.m3(tile) & !0xF0);
            grid.set_m4(tile, grid.m4(tile) & !0x0F);
        }
        if p2 != 0 {
            // Copy the facing given by the caller (signal dragging).
            let m3 = grid.m3(tile);
            grid.set_m3(
                tile,
                (m3 & !signal_on_track(track)) | (p2 as u8 & signal_on_track(track)),
            );
        } else if !had_signal {
            rail::add_signals_on_track(grid, tile, track);
        } else if cycle_type {
            let next = (rail::signal_type(grid, tile) as u8 + 1) % 5;
            rail::set_signal_type(
                grid,
                tile,
                SignalType::from_u8(next).unwrap(),
            );
        } else {
            // Cycle two-way -> along only -> against only -> two-way.
            let on = signal_on_track(track);
            let along = tyctrack::signal_along_trackdir(track.to_trackdir());
            let m3 = grid.m3(tile);
            let cur = m3 & on;
            let next = if cur == on {
                along
            } else if cur == along {
                on & !along
            } else {
                on
            };
            grid.set_m3(tile, (m3 & !on) | next);
        }
        set_signals_on_both_dir(
            &mut ctx.world,
            &mut ctx.follower,
            tile,
            track,
        );
    }
    Ok(cost)
}

/// Removes the signals from one track of a tile. `p1` is the track.
pub fn remove_signals(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let track =
        Track::from_u8((p1 & 7) as u8).ok_or(CommandError::NoSuitableTrack)?;
    let grid = &ctx.world.grid;
    if !rail::has_signal_on_track(grid, tile, track) {
        return Err(CommandError::NoSuitableTrack);
    }
    check_tile_ownership(ctx, tile)?;
    ensure_no_vehicle(ctx, tile)?;

    if flags.is_exec() {
        rail::remove_signals_on_track(&mut ctx.world.grid, tile, track);
        if ctx.world.grid.m3(tile) & 0xF0 == 0 {
            rail::strip_signals(&mut ctx.world.grid, tile);
        }
        set_signals_on_both_dir(
            &mut ctx.world,
            &mut ctx.follower,
            tile,
            track,
        );
    }
    Ok(price::REMOVE_SIGNALS)
}

/// Places signals every `n` tiles along a straight run of track.
/// `p1` is the end tile; `p2` has the track in the low nibble and the
/// signal spacing above it.
pub fn build_signal_track(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    signal_track_line(ctx, tile, p1, p2, flags, CommandId::BuildSignals)
}

pub fn remove_signal_track(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    signal_track_line(ctx, tile, p1, p2, flags, CommandId::RemoveSignals)
}

fn signal_track_line(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
    each: CommandId,
) -> Result<Money, CommandError> {
    let end = TileIndex(p1);
    let track = p2 & 0x0F;
    let spacing = ((p2 >> 8) & 0xFF).max(1);
    let (sx, sy, count) = line_step(ctx, tile, end)?;

    let mut cost = 0;
    let mut cur = tile;
    for i in 0..count {
        if i % spacing == 0 {
            match sub_command(ctx, cur, track, 0, flags, each) {
                Ok(c) => cost += c,
                Err(CommandError::AlreadyBuilt) => {}
                Err(CommandError::NoSuitableTrack)
                    if each == CommandId::RemoveSignals => {}
                Err(e) => return Err(e),
            }
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

/// Converts the rail type over the rectangle spanned by `tile` and `p1`.
pub fn convert_rail(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let railtype =
        RailType::from_u8(p2 as u8).ok_or(CommandError::IncompatibleRail)?;
    let end = TileIndex(p1);
    let grid = &ctx.world.grid;
    let (x0, x1) = {
        let a = grid.tile_x(tile);
        let b = grid.tile_x(end);
        (a.min(b), a.max(b))
    };
    let (y0, y1) = {
        let a = grid.tile_y(tile);
        let b = grid.tile_y(end);
        (a.min(b), a.max(b))
    };

    let mut cost = 0;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let t = ctx.world.grid.tile_xy(x, y);
            if !rail::is_rail_tile(&ctx.world.grid, t) {
                continue;
            }
            if check_tile_ownership(ctx, t).is_err() {
                continue;
            }
            if rail::railtype(&ctx.world.grid, t) == railtype {
                continue;
            }
            ensure_no_vehicle(ctx, t)?;
            cost += price::CONVERT_RAIL;
            if flags.is_exec() {
                rail::set_railtype(&mut ctx.world.grid, t, railtype);
            }
        }
    }
    if cost == 0 {
        return Err(CommandError::NoSuitableTrack);
    }
    Ok(cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{do_command, CommandFlags, CommandId};
    use tycworld::SignalState;

    fn ctx() -> SimulationContext {
        SimulationContext::new(6, 6, 1)
    }

    #[test]
    fn build_and_remove_round_trips_the_tile() {
        let mut ctx = ctx();
        let tile = ctx.world.grid.tile_xy(5, 5);
        let cost = do_command(
            &mut ctx,
            tile,
            Track::Diag1 as u32,
            RailType::Rail as u32,
            CommandFlags::EXEC,
            CommandId::BuildSingleRail,
        )
        .unwrap();
        assert!(cost > 0);
        assert!(rail::is_plain_rail(&ctx.world.grid, tile));

        // Building the same piece again reports already built.
        let again = do_command(
            &mut ctx,
            tile,
            Track::Diag1 as u32,
            RailType::Rail as u32,
            CommandFlags::EXEC,
            CommandId::BuildSingleRail,
        );
        assert_eq!(again, Err(CommandError::AlreadyBuilt));

        do_command(
            &mut ctx,
            tile,
            Track::Diag1 as u32,
            0,
            CommandFlags::EXEC,
            CommandId::RemoveSingleRail,
        )
        .unwrap();
        assert_eq!(ctx.world.grid.kind(tile), TileKind::Clear);
    }

    #[test]
    fn query_cost_mode_is_idempotent_and_pure() {
        let mut ctx = ctx();
        let tile = ctx.world.grid.tile_xy(5, 5);
        let before = ctx.world.digest();
        let a = do_command(
            &mut ctx,
            tile,
            Track::Diag1 as u32,
            0,
            CommandFlags::QUERY_COST,
            CommandId::BuildSingleRail,
        );
        let b = do_command(
            &mut ctx,
            tile,
            Track::Diag1 as u32,
            0,
            CommandFlags::QUERY_COST,
            CommandId::BuildSingleRail,
        );
        assert_eq!(a, b);
        assert_eq!(before, ctx.world.digest());
        let money = ctx.world.player(ctx.current_player).money;
        assert_eq!(money, 100_000);
    }

    #[test]
    fn rail_line_tolerates_existing_pieces() {
        let mut ctx = ctx();
        let start = ctx.world.grid.tile_xy(5, 5);
        let mid = ctx.world.grid.tile_xy(7, 5);
        let end = ctx.world.grid.tile_xy(9, 5);
        do_command(
            &mut ctx,
            mid,
            Track::Diag1 as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildSingleRail,
        )
        .unwrap();
        let cost = do_command(
            &mut ctx,
            start,
            end.0,
            Track::Diag1 as u32,
            CommandFlags::EXEC,
            CommandId::BuildRailroadTrack,
        )
        .unwrap();
        // Four new pieces paid for; the existing one is free.
        assert_eq!(cost, 4 * (price::BUILD_RAIL + price::CLEAR_TILE));
        for x in 5..=9 {
            let t = ctx.world.grid.tile_xy(x, 5);
            assert!(rail::is_plain_rail(&ctx.world.grid, t));
        }
    }

    #[test]
    fn new_signals_start_green_both_ways() {
        let mut ctx = ctx();
        let start = ctx.world.grid.tile_xy(5, 5);
        let end = ctx.world.grid.tile_xy(15, 5);
        do_command(
            &mut ctx,
            start,
            end.0,
            Track::Diag1 as u32,
            CommandFlags::EXEC,
            CommandId::BuildRailroadTrack,
        )
        .unwrap();
        let sig = ctx.world.grid.tile_xy(10, 5);
        do_command(
            &mut ctx,
            sig,
            Track::Diag1 as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildSignals,
        )
        .unwrap();
        assert!(rail::has_signals(&ctx.world.grid, sig));
        assert_eq!(
            rail::signal_state(&ctx.world.grid, sig, tyctrack::Trackdir::Diag1Sw),
            SignalState::Green
        );
        assert_eq!(
            rail::signal_state(&ctx.world.grid, sig, tyctrack::Trackdir::Diag1Ne),
            SignalState::Green
        );
    }
}
