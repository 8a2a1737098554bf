//! The per-tick ship state machine.
//!
//! Ships run the coarsest controller: open water offers every track, so
//! the chooser leans entirely on the pathfinder. Station calls aim at the
//! dock's approach tile, and buoys count as reached from three tiles out,
//! which lets routes thread archipelagos without pixel-perfect arrival.

use log::info;

use tycmap::TileIndex;
use tyctrack::{exitdir_reaches_trackdirs, Track, Trackdir};
use tycworld::engine::engine;
use tycworld::{
    station, track_status, OrderFlags, OrderKind, StationId,
    TransportType, VehicleFlags, VehicleId, World,
};
use tycpath::npf::{NpfTarget, PbsMode};

use crate::context::SimulationContext;
use crate::movement::{initial_subcoord, new_vehicle_pos, z_at};

/// Manhattan distance at which a buoy counts as visited.
const BUOY_REACH: u32 = 3;

const SHIP_STATE_IN_DEPOT: u8 = 0x80;

fn ship_trackdir(world: &World, id: VehicleId) -> Option<Trackdir> {
    let v = world.vehicles.get(id);
    let state = v.ship().state;
    if state == SHIP_STATE_IN_DEPOT {
        let exit = world.depot_exitdir(v.tile, TransportType::Water);
        return Some(tyctrack::diagdir_to_diag_trackdir(exit));
    }
    let track = Track::from_u8(state)?;
    tyctrack::track_direction_to_trackdir(track, v.direction)
}

pub fn ship_tick(ctx: &mut SimulationContext, id: VehicleId) {
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.tick_counter = v.tick_counter.wrapping_add(1);
    }
    let v = ctx.world.vehicles.get(id);
    if v.is_crashed() {
        return;
    }
    let breakdown = v.breakdown_ctr;
    if breakdown != 0 {
        if breakdown <= 2 {
            let v = ctx.world.vehicles.get_mut(id);
            v.cur_speed = 0;
            if v.tick_counter & 3 == 0 {
                v.breakdown_delay = v.breakdown_delay.wrapping_sub(1);
                if v.breakdown_delay == 0 {
                    v.breakdown_ctr = 0;
                }
            }
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

    if ctx.world.vehicles.get(id).ship().state == SHIP_STATE_IN_DEPOT
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

pub fn ship_on_new_day(ctx: &mut SimulationContext, id: VehicleId) {
    crate::train::age_and_service(ctx, id, TransportType::Water);
    let daily = engine(ctx.world.vehicles.get(id).engine).running_cost
        / tycworld::DAYS_PER_YEAR as i64;
    ctx.world.vehicles.get_mut(id).profit_this_year -= daily;
}

fn process_order(ctx: &mut SimulationContext, id: VehicleId) {
    // Fuzzy arrival: a buoy target is done from a few tiles away.
    let v = ctx.world.vehicles.get(id);
    if v.current_order.kind == OrderKind::GotoStation {
        let st_id = StationId(v.current_order.target);
        if let Some(st) = ctx.world.stations.try_get(st_id) {
            if st.is_buoy
                && ctx.world.grid.distance_manhattan(v.tile, st.xy)
                    <= BUOY_REACH
            {
                let v = ctx.world.vehicles.get_mut(id);
                if v.num_orders > 0 {
                    v.cur_order_index =
                        (v.cur_order_index + 1) % v.num_orders;
                }
                v.current_order = tycworld::Order::default();
            }
        }
    }

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
            ctx.world.stations.try_get(st_id).and_then(|st| {
                if st.is_buoy {
                    Some(st.xy)
                } else {
                    st.dock_tile.and_then(|dock| {
                        station::dock_approach_tile(&ctx.world.grid, dock)
                    })
                }
            })
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
            ctx.world.vehicles.get_mut(id).load_unload_time_rem = 30;
            return;
        }
    }
    let v = ctx.world.vehicles.get_mut(id);
    if v.num_orders > 0 {
        v.cur_order_index = (v.cur_order_index + 1) % v.num_orders;
    }
    v.current_order = tycworld::Order::default();
    v.cur_speed = 0;
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
    let exitdir = ctx.world.depot_exitdir(depot_tile, TransportType::Water);
    if ctx.world.grid.neighbour(depot_tile, exitdir).is_none() {
        return true;
    }
    crate::train::service_in_depot(ctx, id);
    let track = tyctrack::diagdir_to_diag_trackdir(exitdir).track();
    let v = ctx.world.vehicles.get_mut(id);
    v.ship_mut().state = track as u8;
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
    let delta = v.subspeed as i32 + accel;
    v.subspeed = (delta & 0xFF) as u8;
    let new_speed =
        (v.cur_speed as i32 + (delta >> 8)).clamp(0, v.max_speed as i32);
    v.cur_speed = new_speed as u16;
    let mut spd = v.cur_speed as u32;
    if v.direction as u8 & 1 == 0 {
        spd = spd * 3 / 4;
    }
    spd += v.progress as u32;
    v.progress = (spd & 0xFF) as u8;
    spd >> 8
}

fn controller_step(ctx: &mut SimulationContext, id: VehicleId) -> bool {
    if ctx.world.vehicles.get(id).ship().state == SHIP_STATE_IN_DEPOT {
        return false;
    }

    // Standing next to the target dock counts as calling at the station.
    let v = ctx.world.vehicles.get(id);
    if v.current_order.kind == OrderKind::GotoStation
        && v.tile == v.dest_tile
    {
        let st_id = StationId(v.current_order.target);
        let is_buoy = ctx
            .world
            .stations
            .try_get(st_id)
            .is_some_and(|st| st.is_buoy);
        if !is_buoy {
            arrive_at_dock(ctx, id, st_id);
            return false;
        }
    }

    // Standing on the target depot tile: dive in.
    let v = ctx.world.vehicles.get(id);
    if v.current_order.kind == OrderKind::GotoDepot
        && v.tile == v.dest_tile
        && ctx.world.is_depot_of(v.tile, TransportType::Water)
    {
        enter_depot(ctx, id);
        return false;
    }

    let gp = new_vehicle_pos(&ctx.world.grid, ctx.world.vehicles.get(id));

    if !gp.tile_changed {
        let z = z_at(&ctx.world.grid, gp.x, gp.y);
        let v = ctx.world.vehicles.get_mut(id);
        v.x_pos = gp.x;
        v.y_pos = gp.y;
        v.z_pos = z;
        ctx.world.vehicles.position_changed(id);
        return true;
    }

    let Some(cur_td) = ship_trackdir(&ctx.world, id) else {
        ctx.world.vehicles.get_mut(id).cur_speed = 0;
        return false;
    };
    let enterdir = cur_td.exitdir();
    let ts = track_status(&ctx.world.grid, gp.new_tile, TransportType::Water);
    let mut bits = ts.trackdirs() & exitdir_reaches_trackdirs(enterdir);
    if ctx.world.settings.forbid_90_deg {
        bits = bits & !tyctrack::trackdir_crosses_trackdirs(cur_td);
    }
    if bits.is_empty() {
        // Ran out of water: turn back.
        let v = ctx.world.vehicles.get_mut(id);
        v.cur_speed = 0;
        v.direction = v.direction.reverse();
        return false;
    }

    let chosen_td = if bits.has_more_than_one() {
        choose_ship_track(ctx, id, gp.new_tile, enterdir, bits)
    } else {
        bits.first().unwrap()
    };

    let Some((sub_x, sub_y, dir)) =
        initial_subcoord(chosen_td.track(), enterdir)
    else {
        ctx.world.vehicles.get_mut(id).cur_speed = 0;
        return false;
    };
    let new_x = (gp.x & !0xF) | sub_x as i32;
    let new_y = (gp.y & !0xF) | sub_y as i32;
    let z = z_at(&ctx.world.grid, new_x, new_y);
    let v = ctx.world.vehicles.get_mut(id);
    v.tile = gp.new_tile;
    v.ship_mut().state = chosen_td.track() as u8;
    v.direction = dir;
    v.x_pos = new_x;
    v.y_pos = new_y;
    v.z_pos = z;
    ctx.world.vehicles.position_changed(id);
    true
}

fn arrive_at_dock(
    ctx: &mut SimulationContext,
    id: VehicleId,
    st_id: StationId,
) {
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.cur_speed = 0;
        v.subspeed = 0;
        v.last_station_visited = Some(st_id);
        v.current_order.kind = OrderKind::Loading;
        v.load_unload_time_rem = 30;
    }
    let first = {
        let st = ctx.world.stations.get_mut(st_id);
        let first = !st.first_arrival_seen;
        st.first_arrival_seen = true;
        first
    };
    if first {
        info!(
            "first ship arrives at {}",
            ctx.world.stations.get(st_id).name
        );
    }
    exchange_cargo(ctx, id, st_id);
}

fn enter_depot(ctx: &mut SimulationContext, id: VehicleId) {
    let tile = ctx.world.vehicles.get(id).tile;
    let grid = &ctx.world.grid;
    let cx = (grid.tile_x(tile) * 16 + 8) as i32;
    let cy = (grid.tile_y(tile) * 16 + 8) as i32;
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.x_pos = cx;
        v.y_pos = cy;
        v.cur_speed = 0;
        v.ship_mut().state = SHIP_STATE_IN_DEPOT;
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

fn choose_ship_track(
    ctx: &mut SimulationContext,
    id: VehicleId,
    tile: TileIndex,
    enterdir: tycmap::DiagDirection,
    bits: tyctrack::TrackdirBits,
) -> Trackdir {
    let Some(trackdir) = ship_trackdir(&ctx.world, id) else {
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
        TransportType::Water,
        owner,
        tycworld::RailType::Rail,
        PbsMode::None,
    );
    match result.best_trackdir {
        Some(td) if bits.has(td) => td,
        _ => bits.first().unwrap(),
    }
}

/// Depot search by trial and error over the candidates in bird-distance
/// order; right for water where the heuristic is nearly exact.
pub fn find_depot_for(
    ctx: &mut SimulationContext,
    id: VehicleId,
) -> Option<TileIndex> {
    let v = ctx.world.vehicles.get(id);
    if v.ship().state == SHIP_STATE_IN_DEPOT {
        return Some(v.tile);
    }
    let trackdir = ship_trackdir(&ctx.world, id)?;
    let (tile, owner) = (v.tile, tycmap::Owner::Player(v.owner.0));
    let result = ctx.npf.route_to_depot_trial_error(
        &mut ctx.world,
        (tile, trackdir),
        TransportType::Water,
        owner,
        tycworld::RailType::Rail,
    );
    if result.found() {
        Some(result.node.tile)
    } else {
        None
    }
}
