//! The per-tick road vehicle state machine.
//!
//! Road vehicles drive the same pixel paths as trains but on their own
//! lane, claim bays at multi-stop stations, overtake dawdlers on straight
//! two-lane pieces, and drive through obstructions that refuse to clear
//! for too long.

use log::{debug, info};

use tycmap::{DiagDirection, TileIndex};
use tyctrack::{exitdir_reaches_trackdirs, Track, Trackdir};
use tycworld::engine::engine;
use tycworld::settings::NPF_TILE_LENGTH;
use tycworld::vehicle::{RV_STATE_AT_STATION, RV_STATE_IN_DEPOT};
use tycworld::{
    road, station, track_status, OrderFlags, OrderKind, RoadStopKind,
    StationId, TransportType, VehicleFlags, VehicleId, VehicleKind, World,
};
use tycpath::npf::{NpfTarget, PbsMode};

use crate::context::SimulationContext;
use crate::enter::{vehicle_enter, ENTER_WORMHOLE};
use crate::movement::{
    initial_subcoord, new_vehicle_pos, tile_at_pos, z_at, DELTA_COORD,
};

pub const RV_STATE_IN_TUNNEL: u8 = 0xFD;

/// Ticks an overtake lasts.
const OVERTAKE_TICKS: u8 = 35;

/// Ticks stuck behind the same obstacle before driving through.
const BLOCKED_LIMIT: u16 = 1480;

/// Days a claimed bay survives without the vehicle showing up.
const SLOT_MAX_AGE: u8 = 5;

fn rv_trackdir(world: &World, id: VehicleId) -> Option<Trackdir> {
    let v = world.vehicles.get(id);
    let state = v.road().state;
    if state >= RV_STATE_IN_TUNNEL {
        return None;
    }
    let track = Track::from_u8(state)?;
    tyctrack::track_direction_to_trackdir(track, v.direction)
}

/// The sideways displacement of the passing lane. Zero when driving
/// normally or on curve pieces, which stay on the centre line.
fn lane_offset(dir: tycmap::Direction, overtaking: bool) -> (i32, i32) {
    if !overtaking || dir as u8 & 1 == 0 {
        return (0, 0);
    }
    let side = (dir as u8 + 6) & 7;
    let (dx, dy) = DELTA_COORD[side as usize];
    (dx * 4, dy * 4)
}

pub fn roadveh_tick(ctx: &mut SimulationContext, id: VehicleId) {
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.tick_counter = v.tick_counter.wrapping_add(1);
    }

    let v = ctx.world.vehicles.get(id);
    if v.is_crashed() {
        let done = {
            let v = ctx.world.vehicles.get_mut(id);
            let r = v.road_mut();
            r.crashed_ctr += 1;
            r.crashed_ctr >= 2220
        };
        if done {
            release_slot(ctx, id);
            ctx.world.vehicles.free(id);
        }
        return;
    }

    let breakdown = ctx.world.vehicles.get(id).breakdown_ctr;
    if breakdown != 0 {
        if breakdown <= 2 {
            handle_broken(ctx, id);
            return;
        }
        ctx.world.vehicles.get_mut(id).breakdown_ctr -= 1;
    }

    let v = ctx.world.vehicles.get(id);
    if v.is_stopped() && v.cur_speed == 0 {
        return;
    }

    process_order(ctx, id);
    handle_loading(ctx, id);
    if ctx.world.vehicles.get(id).current_order.kind == OrderKind::Loading {
        return;
    }

    if ctx.world.vehicles.get(id).road().state == RV_STATE_IN_DEPOT
        && stay_in_depot(ctx, id)
    {
        return;
    }

    let mut steps = update_speed(ctx, id);
    while steps > 0 {
        if !controller_step(ctx, id) {
            break;
        }
        steps -= 1;
    }
}

fn handle_broken(ctx: &mut SimulationContext, id: VehicleId) {
    let (ctr, tick) = {
        let v = ctx.world.vehicles.get(id);
        (v.breakdown_ctr, v.tick_counter)
    };
    if ctr == 2 {
        let v = ctx.world.vehicles.get_mut(id);
        v.cur_speed = 0;
        v.breakdown_ctr = 1;
        let (tile, x, y, z) = (v.tile, v.x_pos, v.y_pos, v.z_pos);
        crate::effects::spawn_breakdown_smoke(ctx, tile, x, y, z);
        return;
    }
    if tick & 3 == 0 {
        let done = {
            let v = ctx.world.vehicles.get_mut(id);
            v.breakdown_delay = v.breakdown_delay.wrapping_sub(1);
            v.breakdown_delay == 0
        };
        if done {
            ctx.world.vehicles.get_mut(id).breakdown_ctr = 0;
        }
    }
}

pub fn roadveh_on_new_day(ctx: &mut SimulationContext, id: VehicleId) {
    crate::train::age_and_service(ctx, id, TransportType::Road);
    let daily =
        engine(ctx.world.vehicles.get(id).engine).running_cost
            / tycworld::DAYS_PER_YEAR as i64;
    ctx.world.vehicles.get_mut(id).profit_this_year -= daily;
    manage_slot(ctx, id);
}

/// The daily bay pick: the nearest stop of the right kind with a free
/// bay, or the first stop when everything is busy.
fn manage_slot(ctx: &mut SimulationContext, id: VehicleId) {
    let v = ctx.world.vehicles.get(id);
    if v.current_order.kind != OrderKind::GotoStation {
        release_slot(ctx, id);
        return;
    }
    let st_id = StationId(v.current_order.target);
    let at_stop = v.road().state == RV_STATE_AT_STATION;

    if let Some((slot_st, stop_idx, slot_idx)) = v.road().slot {
        if at_stop {
            ctx.world.vehicles.get_mut(id).road_mut().slot_age = 0;
            return;
        }
        let age = {
            let r = ctx.world.vehicles.get_mut(id).road_mut();
            r.slot_age += 1;
            r.slot_age
        };
        if age < SLOT_MAX_AGE && slot_st == st_id {
            return;
        }
        // Stale claim: give the bay back and pick again.
        let _ = (stop_idx, slot_idx);
        release_slot(ctx, id);
    }

    let kind = stop_kind_for(&ctx.world, id);
    let tile = ctx.world.vehicles.get(id).tile;
    let Some(st) = ctx.world.stations.try_get(st_id) else {
        return;
    };
    let mut best: Option<(u32, usize, usize, TileIndex)> = None;
    for (i, stop) in st.stops(kind).iter().enumerate() {
        if let Some(slot) = stop.free_slot() {
            let dist = ctx.world.grid.distance_manhattan(tile, stop.xy);
            if best.map_or(true, |(d, ..)| dist < d) {
                best = Some((dist, i, slot, stop.xy));
            }
        }
    }
    match best {
        Some((_, stop_idx, slot_idx, xy)) => {
            ctx.world.stations.get_mut(st_id).stops_mut(kind)[stop_idx]
                .slots[slot_idx] = Some(id);
            let v = ctx.world.vehicles.get_mut(id);
            v.road_mut().slot = Some((st_id, stop_idx as u8, slot_idx as u8));
            v.road_mut().slot_age = 0;
            v.dest_tile = xy;
            debug!("road vehicle {} claims a bay at {:?}", id.0, xy);
        }
        None => {
            // Everything busy: aim at the first stop and try again later.
            if let Some(stop) = ctx
                .world
                .stations
                .try_get(st_id)
                .and_then(|st| st.stops(kind).first())
            {
                let xy = stop.xy;
                ctx.world.vehicles.get_mut(id).dest_tile = xy;
            }
        }
    }
}

pub(crate) fn release_slot(ctx: &mut SimulationContext, id: VehicleId) {
    let Some((st_id, stop_idx, slot_idx)) =
        ctx.world.vehicles.get(id).road().slot
    else {
        return;
    };
    let kind = stop_kind_for(&ctx.world, id);
    if let Some(st) = ctx.world.stations.try_get(st_id) {
        let _ = st;
        let stops =
            ctx.world.stations.get_mut(st_id).stops_mut(kind);
        if let Some(stop) = stops.get_mut(stop_idx as usize) {
            if stop.slots[slot_idx as usize] == Some(id) {
                stop.slots[slot_idx as usize] = None;
            }
        }
    }
    let v = ctx.world.vehicles.get_mut(id);
    v.road_mut().slot = None;
    v.road_mut().slot_age = 0;
}

fn stop_kind_for(world: &World, id: VehicleId) -> RoadStopKind {
    let v = world.vehicles.get(id);
    if v.cargo_type == tycworld::CargoKind::Passengers {
        RoadStopKind::Bus
    } else {
        RoadStopKind::Truck
    }
}

fn process_order(ctx: &mut SimulationContext, id: VehicleId) {
    let v = ctx.world.vehicles.get(id);
    if matches!(
        v.current_order.kind,
        OrderKind::Loading | OrderKind::LeaveStation
    ) || !v.current_order.is_nothing()
        || v.num_orders == 0
    {
        return;
    }
    let (schedule, index, num) = (v.schedule, v.cur_order_index, v.num_orders);
    let Some(order) =
        ctx.world.orders.nth(schedule, index as usize % num as usize)
    else {
        return;
    };
    if order.kind == OrderKind::GotoDepot
        && order.flags.has(OrderFlags::SERVICE_IF_NEEDED)
        && !crate::train::needs_service(&ctx.world, id)
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.cur_order_index = (v.cur_order_index + 1) % v.num_orders;
        return;
    }
    let dest = match order.kind {
        OrderKind::GotoStation => {
            let st_id = StationId(order.target);
            let kind = stop_kind_for(&ctx.world, id);
            ctx.world
                .stations
                .try_get(st_id)
                .and_then(|st| st.stops(kind).first().map(|s| s.xy))
        }
        OrderKind::GotoDepot => ctx
            .world
            .depot(tycworld::DepotId(order.target))
            .map(|d| d.xy),
        _ => None,
    };
    let v = ctx.world.vehicles.get_mut(id);
    v.current_order = order;
    v.last_station_visited = None;
    if let Some(dest) = dest {
        v.dest_tile = dest;
    }
    // The bay pick runs daily; seed it now so a fresh order gets one.
    manage_slot(ctx, id);
}

fn handle_loading(ctx: &mut SimulationContext, id: VehicleId) {
    let v = ctx.world.vehicles.get(id);
    if v.current_order.kind != OrderKind::Loading {
        return;
    }
    {
        let v = ctx.world.vehicles.get_mut(id);
        if v.load_unload_time_rem > 0 {
            v.load_unload_time_rem -= 1;
            return;
        }
    }
    let st = ctx.world.vehicles.get(id).last_station_visited;
    if let Some(st_id) = st {
        let full_load = ctx
            .world
            .vehicles
            .get(id)
            .current_order
            .flags
            .has(OrderFlags::FULL_LOAD);
        let has_space = exchange_cargo(ctx, id, st_id);
        if full_load && has_space {
            ctx.world.vehicles.get_mut(id).load_unload_time_rem = 20;
            return;
        }
    }
    // Back out of the bay and carry on.
    leave_station_bay(ctx, id);
}

fn exchange_cargo(
    ctx: &mut SimulationContext,
    id: VehicleId,
    st_id: StationId,
) -> bool {
    let (cargo, count, cap, flags, source) = {
        let v = ctx.world.vehicles.get(id);
        (
            v.cargo_type,
            v.cargo_count,
            v.cargo_cap,
            v.current_order.flags,
            v.cargo_source,
        )
    };
    if count > 0 && flags.has(OrderFlags::UNLOAD) {
        let st = ctx.world.stations.get_mut(st_id);
        st.waiting[cargo as usize] += count as u32;
        ctx.world.vehicles.get_mut(id).cargo_count = 0;
    } else if count > 0 && source != Some(st_id) {
        let income = count as i64 * 8;
        let owner = ctx.world.vehicles.get(id).owner;
        ctx.world.player_mut(owner).money += income;
        let v = ctx.world.vehicles.get_mut(id);
        v.profit_this_year += income;
        v.cargo_count = 0;
    }
    let count = ctx.world.vehicles.get(id).cargo_count;
    let space = cap.saturating_sub(count);
    if space > 0 {
        let st = ctx.world.stations.get_mut(st_id);
        let avail = st.waiting[cargo as usize].min(space as u32);
        st.waiting[cargo as usize] -= avail;
        let v = ctx.world.vehicles.get_mut(id);
        v.cargo_count = count + avail as u16;
        v.cargo_source = Some(st_id);
        return v.cargo_count < cap;
    }
    false
}

fn leave_station_bay(ctx: &mut SimulationContext, id: VehicleId) {
    release_slot(ctx, id);
    let tile = ctx.world.vehicles.get(id).tile;
    let exitdir = station::road_stop_exitdir(&ctx.world.grid, tile);
    let track = tyctrack::diagdir_to_diag_trackdir(exitdir).track();
    let v = ctx.world.vehicles.get_mut(id);
    v.road_mut().state = track as u8;
    v.direction = exitdir.to_direction();
    if v.num_orders > 0 {
        v.cur_order_index = (v.cur_order_index + 1) % v.num_orders;
    }
    v.current_order = tycworld::Order::default();
    v.cur_speed = 0;
}

fn stay_in_depot(ctx: &mut SimulationContext, id: VehicleId) -> bool {
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.load_unload_time_rem += 1;
        if v.load_unload_time_rem < 20 {
            return true;
        }
        v.load_unload_time_rem = 0;
    }
    let depot_tile = ctx.world.vehicles.get(id).tile;
    let exitdir = road::road_depot_exitdir(&ctx.world.grid, depot_tile);
    if ctx.world.grid.neighbour(depot_tile, exitdir).is_none() {
        return true;
    }
    crate::train::service_in_depot(ctx, id);
    let track = tyctrack::diagdir_to_diag_trackdir(exitdir).track();
    let v = ctx.world.vehicles.get_mut(id);
    v.road_mut().state = track as u8;
    v.flags.clear(VehicleFlags::HIDDEN);
    v.direction = exitdir.to_direction();
    v.cur_speed = 0;
    ctx.world.vehicles.position_changed(id);
    false
}

fn update_speed(ctx: &mut SimulationContext, id: VehicleId) -> u32 {
    let v = ctx.world.vehicles.get_mut(id);
    let accel: i32 = if v.is_stopped() {
        -(v.acceleration as i32 * 2)
    } else {
        v.acceleration as i32
    };
    let delta = v.subspeed as i32 + accel * 2;
    v.subspeed = (delta & 0xFF) as u8;
    let new_speed = (v.cur_speed as i32 + (delta >> 8))
        .clamp(0, v.max_speed as i32);
    v.cur_speed = new_speed as u16;
    let mut spd = v.cur_speed as u32;
    if v.direction as u8 & 1 == 0 {
        spd = spd * 3 / 4;
    }
    spd += v.progress as u32;
    v.progress = (spd & 0xFF) as u8;
    spd >> 8
}

/// Is a slower (or opposing) road vehicle right in front of us?
fn blocked_by_vehicle_ahead(
    ctx: &SimulationContext,
    id: VehicleId,
) -> Option<VehicleId> {
    let v = ctx.world.vehicles.get(id);
    let (dx, dy) = DELTA_COORD[v.direction as usize];
    // While overtaking the probe sits on the passing lane, so the
    // dawdler on the driving lane no longer registers as an obstacle.
    let (ox, oy) = lane_offset(v.direction, v.road().overtaking);
    let (ax, ay) = (v.x_pos + dx * 4 + ox, v.y_pos + dy * 4 + oy);
    let (my_speed, my_dir, z) = (v.cur_speed, v.direction, v.z_pos);
    let probe = tile_at_pos(&ctx.world.grid, ax, ay);
    ctx.world
        .vehicles
        .vehicle_from_pos(&ctx.world.grid, probe, &mut |u| {
            u.index != id
                && u.kind() == Some(VehicleKind::Road)
                && !u.flags.has(VehicleFlags::HIDDEN)
                // Opposing traffic keeps to its own lane; only vehicles
                // heading our way can be in the way.
                && u.direction != my_dir.reverse()
                && (u.x_pos - ax).abs() < 4
                && (u.y_pos - ay).abs() < 4
                && (u.z_pos - z).abs() <= 6
                && (u.cur_speed <= my_speed || u.is_stopped())
        })
}

/// Whether the tile is a two-lane straight where overtaking works.
fn overtakable(world: &World, tile: TileIndex) -> bool {
    road::is_ordinary_road(&world.grid, tile)
        && {
            let bits = road::road_bits(&world.grid, tile);
            bits == road::RoadBits::X || bits == road::RoadBits::Y
        }
}

/// One pixel substep. Returns false when movement stopped for this tick.
fn controller_step(ctx: &mut SimulationContext, id: VehicleId) -> bool {
    let state = ctx.world.vehicles.get(id).road().state;
    if state == RV_STATE_IN_DEPOT || state == RV_STATE_AT_STATION {
        return false;
    }
    if state == RV_STATE_IN_TUNNEL {
        return step_in_tunnel(ctx, id);
    }

    // A dawdler ahead: wait, overtake, or eventually push through.
    if let Some(_other) = blocked_by_vehicle_ahead(ctx, id) {
        let (tile, overtaking) = {
            let v = ctx.world.vehicles.get(id);
            (v.tile, v.road().overtaking)
        };
        let blocked = {
            let r = ctx.world.vehicles.get_mut(id).road_mut();
            r.blocked_ctr = r.blocked_ctr.saturating_add(1);
            r.blocked_ctr
        };
        if !overtaking && overtakable(&ctx.world, tile) {
            let r = ctx.world.vehicles.get_mut(id).road_mut();
            r.overtaking = true;
            r.overtaking_ctr = OVERTAKE_TICKS;
        } else if blocked < BLOCKED_LIMIT {
            ctx.world.vehicles.get_mut(id).cur_speed = 0;
            return false;
        }
        // Past the limit: drive on regardless.
    } else {
        ctx.world.vehicles.get_mut(id).road_mut().blocked_ctr = 0;
    }

    {
        let v = ctx.world.vehicles.get_mut(id);
        let r = v.road_mut();
        if r.overtaking {
            if r.overtaking_ctr == 0 {
                r.overtaking = false;
            } else {
                r.overtaking_ctr -= 1;
            }
        }
    }
    let overtaking = ctx.world.vehicles.get(id).road().overtaking;
    if overtaking && !overtakable(&ctx.world, ctx.world.vehicles.get(id).tile)
    {
        ctx.world.vehicles.get_mut(id).road_mut().overtaking = false;
    }

    let gp = new_vehicle_pos(&ctx.world.grid, ctx.world.vehicles.get(id));

    if !gp.tile_changed {
        let r = vehicle_enter(ctx, id, gp.new_tile, gp.x, gp.y);
        if r & ENTER_WORMHOLE != 0 {
            return true;
        }
        apply_position(ctx, id, gp.x, gp.y);
        return true;
    }

    // Entering a new tile.
    let Some(cur_td) = rv_trackdir(&ctx.world, id) else {
        turn_around(ctx, id);
        return false;
    };
    let enterdir = cur_td.exitdir();

    // Arrived at the target bay?
    if station::is_road_stop_tile(&ctx.world.grid, gp.new_tile)
        && gp.new_tile == ctx.world.vehicles.get(id).dest_tile
        && station::road_stop_exitdir(&ctx.world.grid, gp.new_tile)
            == enterdir.reverse()
    {
        enter_station_bay(ctx, id, gp.new_tile);
        return false;
    }

    // Road depots are entered through their mouth only.
    if road::is_road_depot(&ctx.world.grid, gp.new_tile) {
        if gp.new_tile == ctx.world.vehicles.get(id).dest_tile
            && road::road_depot_exitdir(&ctx.world.grid, gp.new_tile)
                == enterdir.reverse()
        {
            enter_depot(ctx, id, gp.new_tile);
            return false;
        }
        turn_around(ctx, id);
        return false;
    }

    let ts = track_status(&ctx.world.grid, gp.new_tile, TransportType::Road);
    let bits = ts.trackdirs() & exitdir_reaches_trackdirs(enterdir);
    if bits.is_empty() {
        turn_around(ctx, id);
        return false;
    }

    let chosen_td = if bits.has_more_than_one() {
        choose_road_track(ctx, id, gp.new_tile, enterdir, bits)
    } else {
        bits.first().unwrap()
    };

    // Lit crossing lights stop road traffic dead.
    if ts.red_signals().has(chosen_td) {
        let blocked = {
            let v = ctx.world.vehicles.get_mut(id);
            v.cur_speed = 0;
            let r = v.road_mut();
            r.blocked_ctr = r.blocked_ctr.saturating_add(1);
            r.blocked_ctr
        };
        if blocked < BLOCKED_LIMIT {
            return false;
        }
    }

    let Some((sub_x, sub_y, dir)) =
        initial_subcoord(chosen_td.track(), enterdir)
    else {
        turn_around(ctx, id);
        return false;
    };
    let new_x = (gp.x & !0xF) | sub_x as i32;
    let new_y = (gp.y & !0xF) | sub_y as i32;

    let r = vehicle_enter(ctx, id, gp.new_tile, new_x, new_y);
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.direction = dir;
        if r & ENTER_WORMHOLE == 0 {
            v.tile = gp.new_tile;
            v.road_mut().state = chosen_td.track() as u8;
        }
    }
    apply_position(ctx, id, new_x, new_y);
    true
}

fn apply_position(ctx: &mut SimulationContext, id: VehicleId, x: i32, y: i32) {
    let z = z_at(&ctx.world.grid, x, y);
    let v = ctx.world.vehicles.get_mut(id);
    v.x_pos = x;
    v.y_pos = y;
    v.z_pos = z;
    ctx.world.vehicles.position_changed(id);
}

fn step_in_tunnel(ctx: &mut SimulationContext, id: VehicleId) -> bool {
    let gp = new_vehicle_pos(&ctx.world.grid, ctx.world.vehicles.get(id));
    let under = tile_at_pos(&ctx.world.grid, gp.x, gp.y);
    if tycworld::tunnel::is_tunnel_entrance(&ctx.world.grid, under) {
        let r = vehicle_enter(ctx, id, under, gp.x, gp.y);
        if r & ENTER_WORMHOLE != 0 {
            apply_position(ctx, id, gp.x, gp.y);
            return true;
        }
    }
    let v = ctx.world.vehicles.get_mut(id);
    v.x_pos = gp.x;
    v.y_pos = gp.y;
    ctx.world.vehicles.position_changed(id);
    true
}

fn turn_around(ctx: &mut SimulationContext, id: VehicleId) {
    let v = ctx.world.vehicles.get_mut(id);
    v.cur_speed = 0;
    v.direction = v.direction.reverse();
}

fn enter_station_bay(
    ctx: &mut SimulationContext,
    id: VehicleId,
    tile: TileIndex,
) {
    let st_id = station::station_id_at(&ctx.world.grid, tile);
    let grid = &ctx.world.grid;
    let cx = (grid.tile_x(tile) * 16 + 8) as i32;
    let cy = (grid.tile_y(tile) * 16 + 8) as i32;
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.tile = tile;
        v.x_pos = cx;
        v.y_pos = cy;
        v.cur_speed = 0;
        v.subspeed = 0;
        v.road_mut().state = RV_STATE_AT_STATION;
        v.last_station_visited = Some(st_id);
        v.current_order.kind = OrderKind::Loading;
        v.load_unload_time_rem = 20;
    }
    ctx.world.vehicles.position_changed(id);
    let first = {
        let st = ctx.world.stations.get_mut(st_id);
        let first = !st.first_arrival_seen;
        st.first_arrival_seen = true;
        first
    };
    if first {
        info!(
            "first road vehicle arrives at {}",
            ctx.world.stations.get(st_id).name
        );
    }
    exchange_cargo(ctx, id, st_id);
}

fn enter_depot(ctx: &mut SimulationContext, id: VehicleId, tile: TileIndex) {
    release_slot(ctx, id);
    let grid = &ctx.world.grid;
    let cx = (grid.tile_x(tile) * 16 + 8) as i32;
    let cy = (grid.tile_y(tile) * 16 + 8) as i32;
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.tile = tile;
        v.x_pos = cx;
        v.y_pos = cy;
        v.cur_speed = 0;
        v.road_mut().state = RV_STATE_IN_DEPOT;
        v.flags.set(VehicleFlags::HIDDEN);
    }
    ctx.world.vehicles.position_changed(id);
    crate::train::service_in_depot(ctx, id);
    let v = ctx.world.vehicles.get_mut(id);
    if v.current_order.kind == OrderKind::GotoDepot {
        let halt = v.current_order.flags.has(OrderFlags::HALT_IN_DEPOT);
        let part = v.current_order.flags.has(OrderFlags::PART_OF_ORDERS);
        v.current_order = tycworld::Order::default();
        if part && v.num_orders > 0 {
            v.cur_order_index = (v.cur_order_index + 1) % v.num_orders;
        }
        if halt {
            v.flags.set(VehicleFlags::STOPPED);
        }
    }
}

fn choose_road_track(
    ctx: &mut SimulationContext,
    id: VehicleId,
    tile: TileIndex,
    enterdir: DiagDirection,
    bits: tyctrack::TrackdirBits,
) -> Trackdir {
    let Some(trackdir) = rv_trackdir(&ctx.world, id) else {
        return bits.first().unwrap();
    };
    let origin = ctx
        .world
        .grid
        .neighbour(tile, enterdir.reverse())
        .unwrap_or(tile);
    let (dest, owner) = {
        let v = ctx.world.vehicles.get(id);
        (v.dest_tile, tycmap::Owner::Player(v.owner.0))
    };
    let result = ctx.npf.route_to_station_or_tile(
        &mut ctx.world,
        (origin, trackdir),
        NpfTarget::tile(dest),
        TransportType::Road,
        owner,
        tycworld::RailType::Rail,
        PbsMode::None,
    );
    match result.best_trackdir {
        Some(td) if bits.has(td) => td,
        _ => bits.first().unwrap(),
    }
}

/// Finds the closest road depot by even expansion, or by the old bounded
/// walker when the new pathfinder is switched off.
pub fn find_depot_for(
    ctx: &mut SimulationContext,
    id: VehicleId,
) -> Option<TileIndex> {
    let v = ctx.world.vehicles.get(id);
    if v.road().state == RV_STATE_IN_DEPOT {
        return Some(v.tile);
    }
    let trackdir = rv_trackdir(&ctx.world, id)?;
    let (tile, owner) = (v.tile, tycmap::Owner::Player(v.owner.0));
    if !ctx.world.settings.new_pathfinding_all {
        return crate::train::follow_track_to_depot(
            ctx,
            tile,
            trackdir,
            TransportType::Road,
            owner,
            None,
        );
    }
    let result = ctx.npf.route_to_depot_breadth_first(
        &mut ctx.world,
        (tile, trackdir),
        None,
        TransportType::Road,
        owner,
        tycworld::RailType::Rail,
        NPF_TILE_LENGTH,
    );
    if result.found() {
        Some(result.node.tile)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passing_lane_sits_beside_the_driving_line() {
        assert_eq!(lane_offset(tycmap::Direction::SW, false), (0, 0));
        let (ax, ay) = lane_offset(tycmap::Direction::SW, true);
        let (bx, by) = lane_offset(tycmap::Direction::NE, true);
        assert_ne!((ax, ay), (0, 0));
        // Opposing passers swing to mirrored sides.
        assert_eq!((ax + bx, ay + by), (0, 0));
    }
}
