//! The per-tick train state machine.
//!
//! A front engine drags its whole consist through the pipeline: crash
//! animation, breakdowns, deferred reversal, order processing, loading,
//! depot dwell, speed integration, and one pixel substep per accumulated
//! speed unit. Signal obedience, path reservation and collision checks all
//! happen inside the substep.

use log::{debug, info};

use tycmap::{Direction, TileIndex};
use tyctrack::{
    exitdir_reaches_trackdirs, trackdir_crosses_trackdirs, Track, TrackBits,
    Trackdir, TrackdirBits,
};
use tycworld::engine::engine;
use tycworld::settings::NPF_TILE_LENGTH;
use tycworld::vehicle::{PbsStatus, TrainVeh};
use tycworld::{
    pbs, rail, road, station, track_status, CargoKind, OrderFlags,
    OrderKind, StationId, TransportType, VehicleFlags, VehicleId,
    VehicleKind, VehicleSubtype, World,
};
use tycpath::npf::{target_from_order, PbsMode};

use crate::context::SimulationContext;
use crate::effects;
use crate::enter::{
    platform_length_ahead, station_id_of, vehicle_enter, vehicle_leave,
    ENTER_BLOCKED, ENTER_STATION, ENTER_WORMHOLE,
};
use crate::movement::{
    initial_subcoord, new_vehicle_pos, tile_at_pos, train_trackdir, z_at,
};
use crate::signal::update_signals_on_segment;

/// Ticks a train dwells in a depot before trying to leave.
const DEPOT_DWELL_TICKS: u16 = 37;

/// Speed clamp stages while a breakdown or obstacle slows a train.
const BREAKDOWN_SPEEDS: [u16; 16] = [
    225, 210, 195, 180, 165, 150, 135, 120, 105, 90, 75, 60, 45, 30, 15, 15,
];

pub fn first_in_chain(world: &World, id: VehicleId) -> VehicleId {
    let mut cur = id;
    loop {
        let mut found = None;
        for candidate in world.vehicles.iter_ids() {
            if world.vehicles.get(candidate).next == Some(cur) {
                found = Some(candidate);
                break;
            }
        }
        match found {
            Some(prev) => cur = prev,
            None => return cur,
        }
    }
}

pub fn last_in_chain(world: &World, id: VehicleId) -> VehicleId {
    let mut cur = id;
    while let Some(next) = world.vehicles.get(cur).next {
        cur = next;
    }
    cur
}

pub fn prev_in_chain(world: &World, id: VehicleId) -> Option<VehicleId> {
    world
        .vehicles
        .iter_ids()
        .find(|&c| world.vehicles.get(c).next == Some(id))
}

pub fn chain_of(world: &World, head: VehicleId) -> Vec<VehicleId> {
    let mut out = vec![head];
    let mut cur = head;
    while let Some(next) = world.vehicles.get(cur).next {
        out.push(next);
        cur = next;
    }
    out
}

/// Unlinks one vehicle from its chain, splicing its neighbours together.
pub fn detach_vehicle(ctx: &mut SimulationContext, id: VehicleId) {
    let next = ctx.world.vehicles.get(id).next;
    if let Some(prev) = prev_in_chain(&ctx.world, id) {
        ctx.world.vehicles.get_mut(prev).next = next;
    }
    ctx.world.vehicles.get_mut(id).next = None;
}

/// Unlinks a vehicle; with `keep_tail` its followers stay attached to it.
pub fn detach_vehicle_chain(
    ctx: &mut SimulationContext,
    id: VehicleId,
    keep_tail: bool,
) {
    if keep_tail {
        if let Some(prev) = prev_in_chain(&ctx.world, id) {
            ctx.world.vehicles.get_mut(prev).next = None;
        }
    } else {
        detach_vehicle(ctx, id);
    }
}

/// The weight of one car including what it carries, in tonnes.
fn car_weight(world: &World, id: VehicleId) -> u32 {
    let v = world.vehicles.get(id);
    let info = engine(v.engine);
    info.weight as u32 + (v.cargo_count as u32) / 4
}

/// Rebuilds the cached consist totals after any structural change.
///
/// Every car carries the same snapshot as the head, so following wagons
/// can read their own copy without chasing the chain.
pub fn consist_changed(ctx: &mut SimulationContext, head: VehicleId) {
    let chain = chain_of(&ctx.world, head);
    let head_engine = ctx.world.vehicles.get(head).engine;
    let is_front = ctx.world.vehicles.get(head).is_front_engine();
    let wagon_limits = ctx.world.settings.wagon_speed_limits;

    let mut total_weight: u32 = 0;
    let mut total_power: u32 = 0;
    let mut max_speed: u16 = u16::MAX;
    let mut total_length: u16 = 0;

    for (i, &id) in chain.iter().enumerate() {
        let info = engine(ctx.world.vehicles.get(id).engine);
        let mut length = info.length.clamp(1, 8);
        // Keep inner cars long enough for the follow-previous heuristic.
        if i + 1 < chain.len() {
            length = length.max(3);
        }
        total_weight += car_weight(&ctx.world, id);
        total_power += info.power as u32;
        if info.max_speed > 0 && (wagon_limits || info.power > 0) {
            max_speed = max_speed.min(info.max_speed);
        }
        total_length += length as u16;
        let v = ctx.world.vehicles.get_mut(id);
        v.train_mut().cached_veh_length = length;
    }
    if max_speed == u16::MAX {
        max_speed = 0;
    }

    for &id in &chain {
        let v = ctx.world.vehicles.get_mut(id);
        let t = v.train_mut();
        t.first_engine = if is_front { Some(head_engine) } else { None };
        t.cached_weight = total_weight;
        t.cached_power = total_power;
        t.cached_max_speed = max_speed;
        t.cached_total_length = total_length;
    }

    let v = ctx.world.vehicles.get_mut(head);
    v.max_speed = max_speed;
    let accel =
        (total_power * 4 / total_weight.max(1)).clamp(1, 255) as u8;
    v.acceleration = accel;
}

/// Entry point, once per tick per rail vehicle.
pub fn train_tick(ctx: &mut SimulationContext, id: VehicleId) {
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.tick_counter = v.tick_counter.wrapping_add(1);
        if v.cargo_days != 0xFF && v.tick_counter % 185 == 0 {
            v.cargo_days += 1;
        }
    }
    let v = ctx.world.vehicles.get(id);
    match v.train().subtype {
        VehicleSubtype::FrontEngine => {
            loco_handler(ctx, id, false);
            let v = ctx.world.vehicles.get(id);
            if !v.is_free() && v.is_front_engine() {
                loco_handler(ctx, id, true);
            }
        }
        VehicleSubtype::FreeWagon if v.is_crashed() => {
            let done = {
                let v = ctx.world.vehicles.get_mut(id);
                let t = v.train_mut();
                t.crash_anim_pos += 1;
                t.crash_anim_pos >= 4400
            };
            if done {
                ctx.world.vehicles.free(id);
            }
        }
        _ => {}
    }
}

fn loco_handler(ctx: &mut SimulationContext, id: VehicleId, mode: bool) {
    if ctx.world.vehicles.get(id).train().crash_anim_pos != 0 {
        if !mode {
            handle_crashed_train(ctx, id);
        }
        return;
    }

    {
        let v = ctx.world.vehicles.get_mut(id);
        let t = v.train_mut();
        if t.force_proceed != 0 {
            t.force_proceed -= 1;
        }
    }

    let breakdown = ctx.world.vehicles.get(id).breakdown_ctr;
    if breakdown != 0 {
        if breakdown <= 2 {
            handle_broken_train(ctx, id);
            return;
        }
        ctx.world.vehicles.get_mut(id).breakdown_ctr -= 1;
    }

    {
        let v = ctx.world.vehicles.get(id);
        if v.train().flags & TrainVeh::FLAG_REVERSING != 0
            && v.cur_speed == 0
        {
            reverse_train(ctx, id);
        }
    }

    let v = ctx.world.vehicles.get(id);
    if v.is_stopped() && v.cur_speed == 0 {
        return;
    }

    if process_order(ctx, id) {
        let v = ctx.world.vehicles.get_mut(id);
        v.load_unload_time_rem = 0;
        v.cur_speed = 0;
        v.subspeed = 0;
        reverse_train(ctx, id);
        return;
    }

    handle_loading(ctx, id, mode);
    if ctx.world.vehicles.get(id).current_order.kind == OrderKind::Loading {
        return;
    }

    if check_stay_in_depot(ctx, id) {
        return;
    }

    let mut steps = update_speed(ctx, id);
    if steps == 0 {
        return;
    }
    check_if_line_ends(ctx, id);
    loop {
        train_controller(ctx, id, None);
        let v = ctx.world.vehicles.get(id);
        if v.is_free() || !v.is_front_engine() {
            return;
        }
        check_collision(ctx, id);
        let v = ctx.world.vehicles.get(id);
        if v.is_free() || v.cur_speed <= 0x100 {
            break;
        }
        steps -= 1;
        if steps == 0 {
            break;
        }
    }
}

/// Daily bookkeeping for one rail vehicle.
pub fn train_on_new_day(ctx: &mut SimulationContext, id: VehicleId) {
    let v = ctx.world.vehicles.get(id);
    if v.train().subtype != VehicleSubtype::FrontEngine {
        return;
    }
    age_and_service(ctx, id, TransportType::Rail);
    let t = ctx.world.vehicles.get_mut(id).train_mut();
    t.days_since_order_progr = t.days_since_order_progr.saturating_add(1);

    // Running costs accrue daily over the whole consist.
    let chain = chain_of(&ctx.world, id);
    let daily: i64 = chain
        .iter()
        .map(|&c| engine(ctx.world.vehicles.get(c).engine).running_cost)
        .sum::<i64>()
        / tycworld::DAYS_PER_YEAR as i64;
    let v = ctx.world.vehicles.get_mut(id);
    v.profit_this_year -= daily;
}

/// Shared ageing, reliability and breakdown rolls, used by all modes.
pub(crate) fn age_and_service(
    ctx: &mut SimulationContext,
    id: VehicleId,
    _mode: TransportType,
) {
    let date = ctx.world.calendar.date;
    let breakdowns_setting = ctx.world.settings.vehicle_breakdowns;

    {
        let v = ctx.world.vehicles.get_mut(id);
        v.age_days += 1;
        v.day_counter = v.day_counter.wrapping_add(1);
        if v.day_counter % 8 == 0 {
            v.reliability = v.reliability.saturating_sub(v.reliability_spd_dec);
        }
    }

    let v = ctx.world.vehicles.get(id);
    if v.age_days == v.max_age_days.saturating_sub(tycworld::DAYS_PER_YEAR)
        || v.age_days == v.max_age_days
        || (v.age_days > v.max_age_days
            && (v.age_days - v.max_age_days) % tycworld::DAYS_PER_YEAR == 0)
    {
        info!(
            "vehicle {} is getting old ({} days)",
            v.index.0, v.age_days
        );
    }

    // Breakdown roll: the lower the reliability, the likelier.
    let v = ctx.world.vehicles.get(id);
    let rolling = !v.is_stopped() && !v.is_crashed() && v.cur_speed > 0;
    if breakdowns_setting > 0 && rolling && v.breakdown_ctr == 0 {
        let reliability = v.reliability;
        let chance = ((0xFFFFu32 - reliability as u32) >> 10) + 1;
        let factor = if breakdowns_setting == 1 { 2 } else { 1 };
        if ctx.rng.chance(chance, 4096 * factor) {
            let delay = 64 + ctx.rng.range(64) as u8;
            let v = ctx.world.vehicles.get_mut(id);
            v.breakdown_ctr = 64;
            v.breakdown_delay = delay;
            v.breakdowns_since_last_service =
                v.breakdowns_since_last_service.saturating_add(1);
        }
    }
    let _ = date;
}

pub(crate) fn needs_service(world: &World, id: VehicleId) -> bool {
    let v = world.vehicles.get(id);
    if world.settings.no_servicing_if_no_breakdowns
        && world.settings.vehicle_breakdowns == 0
    {
        return false;
    }
    if v.is_crashed() {
        return false;
    }
    if world.settings.servint_is_percent {
        let ceiling = engine(v.engine).reliability as u32;
        (v.reliability as u32)
            < ceiling * (100 - v.service_interval as u32).min(100) / 100
    } else {
        (v.date_of_last_service + v.service_interval as u32)
            < world.calendar.date
    }
}

fn handle_crashed_train(ctx: &mut SimulationContext, id: VehicleId) {
    let anim = {
        let t = ctx.world.vehicles.get_mut(id).train_mut();
        t.crash_anim_pos += 1;
        t.crash_anim_pos
    };
    if anim % 32 != 0 {
        return;
    }
    // Burn away from the tail until nothing is left.
    let last = last_in_chain(&ctx.world, id);
    if last == id {
        pbs_clear_own_reservation(ctx, id);
        ctx.world.vehicles.free(id);
    } else {
        detach_vehicle(ctx, last);
        ctx.world.vehicles.free(last);
    }
}

fn handle_broken_train(ctx: &mut SimulationContext, id: VehicleId) {
    let (ctr, tick) = {
        let v = ctx.world.vehicles.get(id);
        (v.breakdown_ctr, v.tick_counter)
    };
    if ctr == 2 {
        // The moment of failure: halt and start fuming.
        let v = ctx.world.vehicles.get_mut(id);
        v.cur_speed = 0;
        v.breakdown_ctr = 1;
        let (tile, x, y, z) = (v.tile, v.x_pos, v.y_pos, v.z_pos);
        effects::spawn_breakdown_smoke(ctx, tile, x, y, z);
        return;
    }
    // Waiting for the mechanic; smoke periodically.
    if tick & 3 == 0 {
        let done = {
            let v = ctx.world.vehicles.get_mut(id);
            v.breakdown_delay = v.breakdown_delay.wrapping_sub(1);
            v.breakdown_delay == 0
        };
        if done {
            ctx.world.vehicles.get_mut(id).breakdown_ctr = 0;
        } else if tick & 31 == 0 {
            let v = ctx.world.vehicles.get(id);
            let (tile, x, y, z) = (v.tile, v.x_pos, v.y_pos, v.z_pos);
            effects::spawn_breakdown_smoke(ctx, tile, x, y, z);
        }
    }
}

/// Advances stale orders and recomputes the destination. Returns whether
/// the train should reverse to chase its new target.
fn process_order(ctx: &mut SimulationContext, id: VehicleId) -> bool {
    let v = ctx.world.vehicles.get(id);
    if matches!(
        v.current_order.kind,
        OrderKind::Loading | OrderKind::LeaveStation
    ) {
        return false;
    }

    // Lost train advisory when no order progressed for too long.
    let lost_days = ctx.world.settings.lost_train_days as u16;
    if ctx.world.vehicles.get(id).train().days_since_order_progr
        >= lost_days
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.train_mut().days_since_order_progr = 0;
        info!("train {} is lost", v.unit_number);
    }

    let v = ctx.world.vehicles.get(id);
    if !v.current_order.is_nothing() || v.num_orders == 0 {
        return false;
    }

    // Fetch the order at the current index, skipping unneeded service
    // stops.
    let mut guard = 0;
    loop {
        let (schedule, index, num) = {
            let v = ctx.world.vehicles.get(id);
            (v.schedule, v.cur_order_index, v.num_orders)
        };
        let Some(order) =
            ctx.world.orders.nth(schedule, index as usize % num as usize)
        else {
            return false;
        };
        if order.kind == OrderKind::GotoDepot
            && order.flags.has(OrderFlags::SERVICE_IF_NEEDED)
            && !needs_service(&ctx.world, id)
        {
            let v = ctx.world.vehicles.get_mut(id);
            v.cur_order_index = (v.cur_order_index + 1) % v.num_orders;
            guard += 1;
            if guard >= num {
                return false;
            }
            continue;
        }

        let dest = destination_of(&ctx.world, id, &order);
        let v = ctx.world.vehicles.get_mut(id);
        v.current_order = order;
        // A fresh order may legitimately revisit the same station.
        v.last_station_visited = None;
        if let Some(dest) = dest {
            v.dest_tile = dest;
        }
        break;
    }
    check_reverse(ctx, id)
}

fn destination_of(
    world: &World,
    id: VehicleId,
    order: &tycworld::Order,
) -> Option<TileIndex> {
    let v = world.vehicles.get(id);
    match order.kind {
        OrderKind::GotoStation => {
            let st = world.stations.try_get(StationId(order.target))?;
            st.closest_platform_tile(&world.grid, v.tile)
                .or(Some(st.xy))
        }
        OrderKind::GotoDepot => {
            world.depot(tycworld::DepotId(order.target)).map(|d| d.xy)
        }
        OrderKind::GotoWaypoint => world
            .waypoint(tycworld::WaypointId(order.target))
            .map(|w| w.xy),
        _ => None,
    }
}

/// Whether starting backwards beats continuing forwards, judged by a
/// two-way pathfinder run from both ends of the consist.
fn check_reverse(ctx: &mut SimulationContext, id: VehicleId) -> bool {
    let v = ctx.world.vehicles.get(id);
    let t = v.train();
    if t.track & 0xC0 != 0 || v.direction as u8 & 1 == 0 {
        // In a depot, a tunnel, or on a curve piece: never turn here.
        return false;
    }
    let Some(trackdir) = train_trackdir(&ctx.world, v) else {
        return false;
    };
    let last = last_in_chain(&ctx.world, id);
    let last_v = ctx.world.vehicles.get(last);
    let Some(last_td) = train_trackdir(&ctx.world, last_v) else {
        return false;
    };
    let target = target_from_order(&ctx.world, ctx.world.vehicles.get(id));
    let (tile, owner, railtype, last_tile) = {
        let v = ctx.world.vehicles.get(id);
        (
            v.tile,
            tycmap::Owner::Player(v.owner.0),
            v.train().railtype,
            ctx.world.vehicles.get(last).tile,
        )
    };
    let result = ctx.npf.route_to_station_or_tile_two_way(
        &mut ctx.world,
        (tile, trackdir),
        Some((last_tile, last_td.reverse())),
        target,
        TransportType::Rail,
        owner,
        railtype,
        PbsMode::None,
    );
    result.found() && result.reversed()
}

fn handle_loading(ctx: &mut SimulationContext, id: VehicleId, mode: bool) {
    let v = ctx.world.vehicles.get(id);
    if v.current_order.kind != OrderKind::Loading || mode {
        return;
    }
    {
        let v = ctx.world.vehicles.get_mut(id);
        if v.load_unload_time_rem > 0 {
            v.load_unload_time_rem -= 1;
            return;
        }
    }

    let station = ctx.world.vehicles.get(id).last_station_visited;
    if let Some(st) = station {
        let full_load = ctx
            .world
            .vehicles
            .get(id)
            .current_order
            .flags
            .has(OrderFlags::FULL_LOAD);
        let loaded_more = load_unload_cars(ctx, id, st);
        if full_load && loaded_more {
            // Not full yet: keep standing, try again shortly.
            ctx.world.vehicles.get_mut(id).load_unload_time_rem = 20;
            return;
        }
    }

    // Done: pull out and advance the schedule.
    let v = ctx.world.vehicles.get_mut(id);
    v.train_mut().days_since_order_progr = 0;
    if v.num_orders > 0 {
        v.cur_order_index = (v.cur_order_index + 1) % v.num_orders;
    }
    v.current_order.kind = OrderKind::LeaveStation;
    v.current_order.flags = OrderFlags::default();
    debug!("train {} leaves its station", v.unit_number);
}

/// Exchanges cargo between the consist and the station. Returns whether a
/// full-load order still has space to fill.
fn load_unload_cars(
    ctx: &mut SimulationContext,
    head: VehicleId,
    st_id: StationId,
) -> bool {
    let chain = chain_of(&ctx.world, head);
    let mut any_space = false;
    for car in chain {
        let (cargo, count, cap, flags) = {
            let v = ctx.world.vehicles.get(car);
            (
                v.cargo_type,
                v.cargo_count,
                v.cargo_cap,
                ctx.world.vehicles.get(head).current_order.flags,
            )
        };
        if cap == 0 {
            continue;
        }
        if count > 0 && flags.has(OrderFlags::UNLOAD) {
            let st = ctx.world.stations.get_mut(st_id);
            st.waiting[cargo as usize] += count as u32;
            ctx.world.vehicles.get_mut(car).cargo_count = 0;
        } else if count > 0 && Some(st_id) != ctx.world.vehicles.get(car).cargo_source
        {
            // Delivery: realise profit proportional to the load.
            let income = count as i64 * 8;
            let v = ctx.world.vehicles.get_mut(head);
            v.profit_this_year += income;
            let owner = v.owner;
            ctx.world.player_mut(owner).money += income;
            ctx.world.vehicles.get_mut(car).cargo_count = 0;
        }
        let (count, space) = {
            let v = ctx.world.vehicles.get(car);
            (v.cargo_count, cap.saturating_sub(v.cargo_count))
        };
        if space > 0 {
            let st = ctx.world.stations.get_mut(st_id);
            let avail = st.waiting[cargo as usize].min(space as u32);
            st.waiting[cargo as usize] -= avail;
            let v = ctx.world.vehicles.get_mut(car);
            v.cargo_count = count + avail as u16;
            v.cargo_source = Some(st_id);
            if v.cargo_count < cap {
                any_space = true;
            }
        }
    }
    any_space
}

/// Depot dwell and departure. Returns true while the train stays put.
fn check_stay_in_depot(ctx: &mut SimulationContext, id: VehicleId) -> bool {
    // All wagons must be tucked into the same depot.
    let chain = chain_of(&ctx.world, id);
    let depot_tile = ctx.world.vehicles.get(id).tile;
    for &c in &chain {
        let v = ctx.world.vehicles.get(c);
        if !v.train().in_depot() || v.tile != depot_tile {
            return false;
        }
    }

    let force = ctx.world.vehicles.get(id).train().force_proceed;
    if force == 0 {
        {
            let v = ctx.world.vehicles.get_mut(id);
            v.load_unload_time_rem += 1;
            if v.load_unload_time_rem < DEPOT_DWELL_TICKS {
                return true;
            }
            v.load_unload_time_rem = 0;
        }

        let trackdir = {
            let v = ctx.world.vehicles.get(id);
            train_trackdir(&ctx.world, v).unwrap()
        };

        if tycpath::follow::is_pbs_segment(&ctx.world, depot_tile, trackdir)
        {
            // The exit leads into a path-signal block; a green path out
            // is required before the shed doors open.
            if pbs::tile_unavail(&ctx.world.grid, depot_tile).has(trackdir)
            {
                return true;
            }
            let target =
                target_from_order(&ctx.world, ctx.world.vehicles.get(id));
            let (owner, railtype) = {
                let v = ctx.world.vehicles.get(id);
                (tycmap::Owner::Player(v.owner.0), v.train().railtype)
            };
            let result = ctx.npf.route_to_station_or_tile(
                &mut ctx.world,
                (depot_tile, trackdir),
                target,
                TransportType::Rail,
                owner,
                railtype,
                PbsMode::Green,
            );
            if result.pbs_exit()
                && !result.pbs_blocked()
                && !result.pbs_red()
            {
                let v = ctx.world.vehicles.get_mut(id);
                let t = v.train_mut();
                t.pbs_end_tile = result.node.tile;
                t.pbs_end_trackdir = result.node.trackdir as u8;
            } else {
                return true;
            }
        } else {
            let dir = ctx.world.vehicles.get(id).direction;
            if update_signals_on_segment(
                &mut ctx.world,
                &mut ctx.follower,
                depot_tile,
                dir,
            ) {
                // The block outside is occupied.
                return true;
            }
        }
    }

    leave_depot(ctx, id, depot_tile);
    false
}

fn leave_depot(
    ctx: &mut SimulationContext,
    id: VehicleId,
    depot_tile: TileIndex,
) {
    service_in_depot(ctx, id);
    let exitdir =
        ctx.world.depot_exitdir(depot_tile, TransportType::Rail);
    let track = tyctrack::diagdir_to_diag_trackdir(exitdir).track();
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.train_mut().track = track.bit().0;
        v.flags.clear(VehicleFlags::HIDDEN);
        v.cur_speed = 0;
        v.direction = exitdir.to_direction();
        v.load_unload_time_rem = 0;
    }
    ctx.world.vehicles.position_changed(id);
    let dir = ctx.world.vehicles.get(id).direction;
    update_signals_on_segment(
        &mut ctx.world,
        &mut ctx.follower,
        depot_tile,
        dir,
    );
    debug!("train {} leaves the depot", ctx.world.vehicles.get(id).unit_number);
}

pub(crate) fn service_in_depot(ctx: &mut SimulationContext, id: VehicleId) {
    let date = ctx.world.calendar.date;
    let base = engine(ctx.world.vehicles.get(id).engine).reliability;
    let v = ctx.world.vehicles.get_mut(id);
    v.date_of_last_service = date;
    v.breakdowns_since_last_service = 0;
    v.reliability = base;
}

/// Called by the depot tile hook when the last wagon tucked itself in.
pub fn train_entered_depot(
    ctx: &mut SimulationContext,
    last: VehicleId,
    tile: TileIndex,
) {
    let head = first_in_chain(&ctx.world, last);
    pbs_clear_own_reservation(ctx, head);
    service_in_depot(ctx, head);

    let dir = ctx.world.vehicles.get(head).direction;
    update_signals_on_segment(&mut ctx.world, &mut ctx.follower, tile, dir);

    let v = ctx.world.vehicles.get_mut(head);
    v.cur_speed = 0;
    if v.current_order.kind == OrderKind::GotoDepot {
        let halt = v.current_order.flags.has(OrderFlags::HALT_IN_DEPOT);
        let part = v.current_order.flags.has(OrderFlags::PART_OF_ORDERS);
        v.train_mut().days_since_order_progr = 0;
        v.current_order = tycworld::Order::default();
        if part && v.num_orders > 0 {
            v.cur_order_index = (v.cur_order_index + 1) % v.num_orders;
        }
        if halt {
            v.flags.set(VehicleFlags::STOPPED);
        }
    }
}

/// Drops the reservation the train itself holds, if any.
fn pbs_clear_own_reservation(ctx: &mut SimulationContext, head: VehicleId) {
    let v = ctx.world.vehicles.get(head);
    let t = v.train();
    if t.pbs_status != PbsStatus::HasPath {
        return;
    }
    let Some(td) = train_trackdir(&ctx.world, v) else {
        return;
    };
    let (tile, end_tile, end_td) = (
        v.tile,
        t.pbs_end_tile,
        Trackdir::from_u8(t.pbs_end_trackdir),
    );
    if let Some(end_td) = end_td {
        pbs::clear_path(&mut ctx.world.grid, tile, td, end_tile, end_td);
    }
    ctx.world.vehicles.get_mut(head).train_mut().pbs_status =
        PbsStatus::None;
}

/// Integrates speed for this tick and returns the pixel steps to take.
fn update_speed(ctx: &mut SimulationContext, id: VehicleId) -> u32 {
    let realistic = ctx.world.settings.realistic_acceleration;
    let (stopped, reversing) = {
        let v = ctx.world.vehicles.get(id);
        (
            v.is_stopped(),
            v.train().flags & TrainVeh::FLAG_REVERSING != 0,
        )
    };

    let accel: i32 = if stopped || reversing {
        if realistic {
            realistic_acceleration(ctx, id, true) * 2
        } else {
            -(ctx.world.vehicles.get(id).acceleration as i32 * 2)
        }
    } else if realistic {
        realistic_acceleration(ctx, id, false)
    } else {
        ctx.world.vehicles.get(id).acceleration as i32
    };

    let v = ctx.world.vehicles.get_mut(id);
    let delta = v.subspeed as i32 + accel * 2;
    v.subspeed = (delta & 0xFF) as u8;
    let mut tempmax = v.max_speed as i32;
    if v.cur_speed as i32 > tempmax {
        tempmax = v.cur_speed as i32 - v.cur_speed as i32 / 10 - 1;
    }
    let new_speed =
        (v.cur_speed as i32 + (delta >> 8)).clamp(0, tempmax.max(0));
    v.cur_speed = new_speed as u16;

    let mut spd = v.cur_speed as u32;
    if v.direction as u8 & 1 == 0 {
        // Cardinal directions cover less ground per pixel step.
        spd = spd * 3 / 4;
    }
    spd += v.progress as u32;
    v.progress = (spd & 0xFF) as u8;
    spd >> 8
}

/// The physics model: tractive force against rolling resistance, curve
/// and station-approach speed limits folded into `max_speed`.
fn realistic_acceleration(
    ctx: &mut SimulationContext,
    id: VehicleId,
    braking: bool,
) -> i32 {
    let chain = chain_of(&ctx.world, id);
    let head = ctx.world.vehicles.get(id);
    let t = head.train();
    let railtype = t.railtype;
    let speed10 = head.cur_speed as i64 * 10 / 16;

    let mut max_speed: i64 = 2000;
    let mut curve_count = [0i32; 2];
    let mut last_pos = -1i32;
    let mut sum = 0i32;
    let mut numcurve = 0i32;

    // Curve-based limits from the bends currently under the consist.
    for (pos, pair) in chain.windows(2).enumerate() {
        let d0 = ctx.world.vehicles.get(pair[0]).direction as i32;
        let d1 = ctx.world.vehicles.get(pair[1]).direction as i32;
        let diff = (d1 - d0).rem_euclid(8);
        if diff == 1 || diff == 7 {
            let side = if diff == 1 { 0 } else { 1 };
            curve_count[side] += 1;
            if last_pos != -1 {
                numcurve += 1;
                sum += pos as i32 - last_pos;
                if pos as i32 - last_pos == 1 {
                    max_speed = 88;
                }
            }
            last_pos = pos as i32;
        }
        if diff == 2 || diff == 6 {
            max_speed = 61;
        }
    }
    if numcurve > 0 {
        sum /= numcurve;
    }
    if (curve_count[0] != 0 || curve_count[1] != 0) && max_speed > 88 {
        let total = curve_count[0] + curve_count[1];
        if curve_count[0] == 1 && curve_count[1] == 1 {
            max_speed = 0xFFFF;
        } else if total > 1 {
            let gap = sum.clamp(1, 12) as i64;
            max_speed = 232 - (13 - gap) * (13 - gap);
        }
    }
    max_speed += max_speed / 2 * railtype as i64;

    // Ramp the target down over the remaining platform so the train
    // halts at the centre of its last platform tile.
    let head = ctx.world.vehicles.get(id);
    if station::is_rail_station_tile(&ctx.world.grid, head.tile)
        && should_stop_at(&ctx.world, id, head.tile)
    {
        let len = platform_length_ahead(
            &ctx.world.grid,
            head.tile,
            head.direction,
        ) as i64;
        max_speed = 120;
        let cur = head.cur_speed as i64;
        let delta_v = cur / (len + 1);
        if head.max_speed as i64 > cur - delta_v {
            max_speed = cur - delta_v / 10;
        }
        max_speed = max_speed.max(25 * len);
    }

    let mut mass: i64 = 0;
    let mut incl: i64 = 0;
    let mut num: i64 = 0;
    let mut drag_coeff: i64 = 20;
    for &c in &chain {
        num += 1;
        drag_coeff += 3;
        let v = ctx.world.vehicles.get(c);
        let w = car_weight(&ctx.world, c) as i64;
        mass += w;
        if v.train().in_depot() {
            max_speed = max_speed.min(61);
        }
        if v.train().flags & TrainVeh::FLAG_GOING_UP != 0 {
            incl += w * 60;
        } else if v.train().flags & TrainVeh::FLAG_GOING_DOWN != 0 {
            incl -= w * 60;
        }
    }
    let power = ctx.world.vehicles.get(id).train().cached_power as i64 * 746;
    max_speed = max_speed
        .min(ctx.world.vehicles.get(id).train().cached_max_speed as i64);

    ctx.world.vehicles.get_mut(id).max_speed = max_speed.max(0) as u16;

    let area: i64 = 120;
    let friction: i64 = 35;
    let mut resistance: i64 = if railtype != tycworld::RailType::Maglev {
        let mut r = 13 * mass / 10;
        r += 60 * num;
        r += friction * mass * speed10 / 1000;
        r += area * drag_coeff * speed10 * speed10 / 10000;
        r
    } else {
        area * (drag_coeff / 2) * speed10 * speed10 / 10000
    };
    resistance += incl;
    resistance *= 4;

    let force: i64 = if speed10 > 0 {
        match railtype {
            tycworld::RailType::Rail | tycworld::RailType::Mono => {
                power / speed10 * 22 / 10
            }
            tycworld::RailType::Maglev => power / 25,
        }
    } else {
        // Kickoff from standstill.
        mass * 8 + resistance
    };

    let denom = (mass * 4).max(1);
    if braking {
        (((-force - resistance) / denom).min(-10000 / denom)) as i32
    } else {
        ((force - resistance) / denom) as i32
    }
}

fn should_stop_at(world: &World, id: VehicleId, tile: TileIndex) -> bool {
    let v = world.vehicles.get(id);
    let st = station::station_id_at(&world.grid, tile);
    v.current_order.kind == OrderKind::GotoStation
        && v.current_order.target == st.0
        && v.last_station_visited != Some(st)
}

/// Slows the train approaching blocked or red track and drives the
/// crossing lights ahead of it.
fn check_if_line_ends(ctx: &mut SimulationContext, id: VehicleId) {
    let ctr = ctx.world.vehicles.get(id).breakdown_ctr;
    if ctr > 1 {
        let v = ctx.world.vehicles.get_mut(id);
        v.flags.set(VehicleFlags::TRAIN_SLOWING);
        let break_speed =
            BREAKDOWN_SPEEDS[((!ctr as usize) >> 4) & 0x0F];
        if break_speed < v.cur_speed {
            v.cur_speed = break_speed;
        }
    } else {
        ctx.world
            .vehicles
            .get_mut(id)
            .flags
            .clear(VehicleFlags::TRAIN_SLOWING);
    }

    let v = ctx.world.vehicles.get(id);
    let t = v.train();
    if t.in_tunnel() || t.in_depot() {
        return;
    }
    let Some(trackdir) = train_trackdir(&ctx.world, v) else {
        return;
    };
    let Some(next) =
        ctx.world.grid.neighbour(v.tile, trackdir.exitdir())
    else {
        return;
    };

    // Approaching a crossing: drop the barriers early.
    if road::is_level_crossing(&ctx.world.grid, next)
        && !road::crossing_lights_on(&ctx.world.grid, next)
    {
        road::set_crossing_lights(&mut ctx.world.grid, next, true);
    }

    let ts = track_status(&ctx.world.grid, next, TransportType::Rail);
    let ahead = ts.trackdirs() & exitdir_reaches_trackdirs(trackdir.exitdir());
    let blocked = ahead.is_empty()
        || (ahead & !ts.red_signals()).is_empty()
            && ctx.world.vehicles.get(id).train().force_proceed == 0;
    if blocked {
        let v = ctx.world.vehicles.get_mut(id);
        if v.cur_speed > 60 {
            v.cur_speed = 60;
        }
    }
}

/// Finds a reachable depot tile for the send-to-depot command.
pub fn find_depot_for(
    ctx: &mut SimulationContext,
    id: VehicleId,
) -> Option<TileIndex> {
    let v = ctx.world.vehicles.get(id);
    if v.train().in_depot() {
        return Some(v.tile);
    }
    let trackdir = train_trackdir(&ctx.world, v)?;
    let (tile, owner, railtype) = (
        v.tile,
        tycmap::Owner::Player(v.owner.0),
        v.train().railtype,
    );
    if !ctx.world.settings.new_pathfinding_all {
        return follow_track_to_depot(
            ctx,
            tile,
            trackdir,
            TransportType::Rail,
            owner,
            Some(railtype),
        );
    }
    let result = ctx.npf.route_to_depot_breadth_first(
        &mut ctx.world,
        (tile, trackdir),
        None,
        TransportType::Rail,
        owner,
        railtype,
        NPF_TILE_LENGTH,
    );
    if result.found() {
        Some(result.node.tile)
    } else {
        None
    }
}

/// Depot hunt on the old bounded walker, for when the new pathfinder is
/// switched off: visit everything reachable ahead and keep the depot the
/// fewest tiles away.
pub(crate) fn follow_track_to_depot(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    trackdir: Trackdir,
    mode: TransportType,
    owner: tycmap::Owner,
    railtype: Option<tycworld::RailType>,
) -> Option<TileIndex> {
    let mut best: Option<(u32, TileIndex)> = None;
    ctx.follower.follow(
        &ctx.world,
        tile,
        trackdir.exitdir(),
        mode,
        &mut |world, t, td, length| {
            if !world.is_depot_of(t, mode)
                || !world.grid.is_owner(t, owner)
            {
                return false;
            }
            // Only counts when approached through the mouth.
            if world.depot_exitdir(t, mode) != td.exitdir().reverse() {
                return true;
            }
            if let Some(rt) = railtype {
                if !rt.is_compatible(rail::railtype(&world.grid, t)) {
                    return true;
                }
            }
            if best.map_or(true, |(l, _)| length < l) {
                best = Some((length, t));
            }
            true
        },
    );
    best.map(|(_, t)| t)
}

/// One pixel substep for every vehicle from `first` to `limit` (or the
/// chain's tail).
pub(crate) fn train_controller(
    ctx: &mut SimulationContext,
    first: VehicleId,
    limit: Option<VehicleId>,
) {
    let mut prev = prev_in_chain(&ctx.world, first);
    let mut cur = Some(first);

    while let Some(id) = cur {
        let next = ctx.world.vehicles.get(id).next;
        let outcome = step_one_vehicle(ctx, id, prev);
        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::StopAll => return,
        }
        if Some(id) == limit {
            return;
        }
        prev = Some(id);
        cur = next;
    }
}

enum StepOutcome {
    Continue,
    StopAll,
}

fn step_one_vehicle(
    ctx: &mut SimulationContext,
    id: VehicleId,
    prev: Option<VehicleId>,
) -> StepOutcome {
    let in_tunnel = ctx.world.vehicles.get(id).train().in_tunnel();
    if in_tunnel {
        return step_in_tunnel(ctx, id);
    }
    if ctx.world.vehicles.get(id).train().in_depot() {
        return StepOutcome::Continue;
    }

    let gp = new_vehicle_pos(&ctx.world.grid, ctx.world.vehicles.get(id));

    if !gp.tile_changed {
        let r = vehicle_enter(ctx, id, gp.new_tile, gp.x, gp.y);
        if r & ENTER_BLOCKED != 0 {
            return invalid_rail(ctx, id, prev);
        }
        if r & ENTER_STATION != 0 {
            enter_station_stop(ctx, id, station_id_of(r));
            return StepOutcome::StopAll;
        }
        if r & ENTER_WORMHOLE != 0 {
            // The tile swallowed the vehicle (depot back wall or tunnel
            // mouth); position is already settled.
            return StepOutcome::Continue;
        }
        {
            let v = ctx.world.vehicles.get_mut(id);
            if v.current_order.kind == OrderKind::LeaveStation {
                v.current_order = tycworld::Order::default();
            }
        }
        finish_step(ctx, id, prev, gp.x, gp.y, false);
        return StepOutcome::Continue;
    }

    // Crossing into a new tile.
    let Some(cur_td) =
        train_trackdir(&ctx.world, ctx.world.vehicles.get(id))
    else {
        return invalid_rail(ctx, id, prev);
    };
    let enterdir = cur_td.exitdir();
    let ts = track_status(&ctx.world.grid, gp.new_tile, TransportType::Rail);
    let mut bits = ts.trackdirs() & exitdir_reaches_trackdirs(enterdir);
    if ctx.world.settings.new_pathfinding_all
        && ctx.world.settings.forbid_90_deg
    {
        bits = bits & !trackdir_crosses_trackdirs(cur_td);
    }
    if bits.is_empty() {
        return invalid_rail(ctx, id, prev);
    }
    match tycworld::status::tile_rail_type(&ctx.world.grid, gp.new_tile) {
        Some(rt)
            if ctx
                .world
                .vehicles
                .get(id)
                .train()
                .railtype
                .is_compatible(rt) => {}
        _ => return invalid_rail(ctx, id, prev),
    }

    let chosen_td = if prev.is_none() {
        match choose_head_track(ctx, id, gp.new_tile, enterdir, bits, ts) {
            Ok(td) => td,
            Err(outcome) => return outcome,
        }
    } else {
        // Wagons just chase the vehicle in front of them.
        let p = prev.unwrap();
        let (px, py) = {
            let pv = ctx.world.vehicles.get(p);
            (pv.x_pos, pv.y_pos)
        };
        let dir_to_prev = direction_towards(gp.x, gp.y, px, py);
        const MATCHING_TRACKS: [u8; 8] =
            [0x30, 1, 0x0C, 2, 0x30, 1, 0x0C, 2];
        let wanted =
            TrackBits(MATCHING_TRACKS[dir_to_prev as usize]).trackdir_bits();
        match (bits & wanted).first().or_else(|| bits.first()) {
            Some(td) => td,
            None => return invalid_rail(ctx, id, prev),
        }
    };

    // The tail drops the reservation on the tile it is leaving.
    if ctx.world.vehicles.get(id).next.is_none() {
        let old_track =
            TrackBits(ctx.world.vehicles.get(id).train().track & 0x3F);
        if let Some(track) = old_track.first() {
            pbs::clear_track(&mut ctx.world.grid, gp.old_tile, track);
        }
    }

    let (sub_x, sub_y, chosen_dir) =
        match initial_subcoord(chosen_td.track(), enterdir) {
            Some(s) => s,
            None => return invalid_rail(ctx, id, prev),
        };
    let new_x = (gp.x & !0xF) | sub_x as i32;
    let new_y = (gp.y & !0xF) | sub_y as i32;

    let r = vehicle_enter(ctx, id, gp.new_tile, new_x, new_y);
    if r & ENTER_BLOCKED != 0 {
        return invalid_rail(ctx, id, prev);
    }
    if prev.is_none() {
        ctx.world.vehicles.get_mut(id).load_unload_time_rem = 0;
    }
    if r & ENTER_WORMHOLE == 0 {
        let v = ctx.world.vehicles.get_mut(id);
        v.tile = gp.new_tile;
        v.train_mut().track = chosen_td.track().bit().0;
    }

    let is_front = ctx.world.vehicles.get(id).is_front_engine();
    if is_front {
        train_moved_update_signals(ctx, gp.new_tile, enterdir);
    }
    if ctx.world.vehicles.get(id).next.is_none() {
        train_moved_update_signals(ctx, gp.old_tile, enterdir.reverse());
        vehicle_leave(ctx, id, gp.old_tile);
    }

    {
        let v = ctx.world.vehicles.get_mut(id);
        if prev.is_none()
            && v.direction != chosen_dir
            && !ctx.world.settings.realistic_acceleration
        {
            v.cur_speed -= v.cur_speed / 4;
        }
        let v = ctx.world.vehicles.get_mut(id);
        v.direction = chosen_dir;
    }
    finish_step(ctx, id, prev, new_x, new_y, true);
    StepOutcome::Continue
}

fn direction_towards(x: i32, y: i32, px: i32, py: i32) -> u8 {
    let dx = (px - x).signum();
    let dy = (py - y).signum();
    match (dx, dy) {
        (-1, -1) => 0,
        (-1, 0) => 1,
        (-1, 1) => 2,
        (0, 1) => 3,
        (1, 1) => 4,
        (1, 0) => 5,
        (1, -1) => 6,
        (0, -1) => 7,
        _ => 0,
    }
}

/// Applies the position update and the z / slope-flag housekeeping.
fn finish_step(
    ctx: &mut SimulationContext,
    id: VehicleId,
    prev: Option<VehicleId>,
    x: i32,
    y: i32,
    tile_changed: bool,
) {
    let new_z = z_at(&ctx.world.grid, x, y);
    let v = ctx.world.vehicles.get_mut(id);
    let old_z = v.z_pos;
    v.x_pos = x;
    v.y_pos = y;
    v.z_pos = new_z;
    let t = v.train_mut();
    if tile_changed {
        t.flags &=
            !(TrainVeh::FLAG_GOING_UP | TrainVeh::FLAG_GOING_DOWN);
    }
    if new_z > old_z {
        t.flags |= TrainVeh::FLAG_GOING_UP;
        t.flags &= !TrainVeh::FLAG_GOING_DOWN;
    } else if new_z < old_z {
        t.flags |= TrainVeh::FLAG_GOING_DOWN;
        t.flags &= !TrainVeh::FLAG_GOING_UP;
    }
    if prev.is_none()
        && new_z > old_z
        && !ctx.world.settings.realistic_acceleration
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.cur_speed -= v.cur_speed >> 4;
    }
    ctx.world.vehicles.position_changed(id);
}

fn step_in_tunnel(ctx: &mut SimulationContext, id: VehicleId) -> StepOutcome {
    let gp = new_vehicle_pos(&ctx.world.grid, ctx.world.vehicles.get(id));
    let under = tile_at_pos(&ctx.world.grid, gp.x, gp.y);
    let is_tunnel_tile =
        tycworld::tunnel::is_tunnel_entrance(&ctx.world.grid, under);
    if is_tunnel_tile {
        let r = vehicle_enter(ctx, id, under, gp.x, gp.y);
        if r & ENTER_WORMHOLE != 0 {
            // Surfaced at the far portal.
            finish_step(ctx, id, Some(id), gp.x, gp.y, true);
            return StepOutcome::Continue;
        }
    }
    let v = ctx.world.vehicles.get_mut(id);
    v.x_pos = gp.x;
    v.y_pos = gp.y;
    ctx.world.vehicles.position_changed(id);
    StepOutcome::Continue
}

fn invalid_rail(
    ctx: &mut SimulationContext,
    id: VehicleId,
    prev: Option<VehicleId>,
) -> StepOutcome {
    if prev.is_some() {
        let v = ctx.world.vehicles.get(id);
        panic!(
            "disconnecting train: wagon {} at {:?} has nowhere to go",
            v.index.0, v.tile
        );
    }
    let v = ctx.world.vehicles.get_mut(id);
    v.load_unload_time_rem = 0;
    v.cur_speed = 0;
    v.subspeed = 0;
    reverse_train(ctx, id);
    StepOutcome::StopAll
}

fn enter_station_stop(
    ctx: &mut SimulationContext,
    id: VehicleId,
    st: StationId,
) {
    {
        let v = ctx.world.vehicles.get_mut(id);
        v.last_station_visited = Some(st);
        v.cur_speed = 0;
        v.subspeed = 0;
        v.current_order.kind = OrderKind::Loading;
        v.current_order.flags.set(OrderFlags::NON_STOP);
        v.load_unload_time_rem = 20;
    }
    let first = {
        let st = ctx.world.stations.get_mut(st);
        let first = !st.first_arrival_seen;
        st.first_arrival_seen = true;
        first
    };
    if first {
        info!(
            "first train arrives at {}",
            ctx.world.stations.get(st).name
        );
    }
    // An immediate exchange before the dwell timer runs.
    load_unload_cars(ctx, id, st);
}

/// Chooses the trackdir for the head entering `tile`, consulting the
/// pathfinder and obeying signals and reservations.
fn choose_head_track(
    ctx: &mut SimulationContext,
    id: VehicleId,
    tile: TileIndex,
    enterdir: tycmap::DiagDirection,
    bits: TrackdirBits,
    ts: tycworld::TrackStatus,
) -> Result<Trackdir, StepOutcome> {
    let chosen_track = choose_train_track(ctx, id, tile, enterdir, bits);
    let chosen_td = (chosen_track.bit().trackdir_bits() & bits)
        .first()
        .unwrap_or_else(|| {
            panic!(
                "train {}: chosen track unreachable on {:?}",
                id.0, tile
            )
        });

    let is_pbs_here = ctx.world.is_pbs_signal(tile, chosen_td)
        && tycpath::follow::is_pbs_segment(&ctx.world, tile, chosen_td);
    if is_pbs_here {
        let status = ctx.world.vehicles.get(id).train().pbs_status;
        if status == PbsStatus::None {
            // No planned path yet; look for a green way through.
            let target =
                target_from_order(&ctx.world, ctx.world.vehicles.get(id));
            let (owner, railtype, force) = {
                let v = ctx.world.vehicles.get(id);
                (
                    tycmap::Owner::Player(v.owner.0),
                    v.train().railtype,
                    v.train().force_proceed,
                )
            };
            let result = ctx.npf.route_to_station_or_tile(
                &mut ctx.world,
                (tile, chosen_td),
                target,
                TransportType::Rail,
                owner,
                railtype,
                PbsMode::Green,
            );
            if force != 0 {
                return Ok(chosen_td);
            }
            if result.best_trackdir.is_none() {
                return Err(red_light(ctx, id, tile, enterdir, ts));
            }
            if result.pbs_exit()
                && !result.pbs_blocked()
                && !result.pbs_red()
            {
                let v = ctx.world.vehicles.get_mut(id);
                let t = v.train_mut();
                t.pbs_end_tile = result.node.tile;
                t.pbs_end_trackdir = result.node.trackdir as u8;
                t.pbs_status = PbsStatus::HasPath;
                return Ok(chosen_td);
            }
            return Err(red_light(ctx, id, tile, enterdir, ts));
        } else {
            // Entering the block the planned path runs through.
            ctx.world.vehicles.get_mut(id).train_mut().pbs_status =
                PbsStatus::None;
            return Ok(chosen_td);
        }
    }

    let force = ctx.world.vehicles.get(id).train().force_proceed;
    if ts.red_signals().has(chosen_td) && force == 0 {
        return Err(red_light(ctx, id, tile, enterdir, ts));
    }
    Ok(chosen_td)
}

/// Standing at a red signal: wait, and eventually reverse out of it.
fn red_light(
    ctx: &mut SimulationContext,
    id: VehicleId,
    tile: TileIndex,
    enterdir: tycmap::DiagDirection,
    ts: tycworld::TrackStatus,
) -> StepOutcome {
    let first_td = ts
        .trackdirs()
        .first()
        .unwrap_or(Trackdir::Diag1Ne);
    let grid = &ctx.world.grid;
    let m3 = grid.m3(tile);

    if m3 & tyctrack::signal_against_trackdir(first_td) == 0 {
        // One-way signal: wait, then give up and turn around.
        let waited = {
            let v = ctx.world.vehicles.get_mut(id);
            v.cur_speed = 0;
            v.subspeed = 0;
            v.progress = 255 - 100;
            v.load_unload_time_rem += 1;
            v.load_unload_time_rem
        };
        if waited
            < (ctx.world.settings.wait_oneway_signal * 20) as u16
        {
            return StepOutcome::StopAll;
        }
    } else if m3 & tyctrack::signal_along_trackdir(first_td) != 0 {
        // Two-way block signal against us: wait longer, unless a train
        // waits on the far side, then resolve the standoff by reversing.
        let waited = {
            let v = ctx.world.vehicles.get_mut(id);
            v.cur_speed = 0;
            v.subspeed = 0;
            v.progress = 255 - 10;
            v.load_unload_time_rem += 1;
            v.load_unload_time_rem
        };
        if waited < (ctx.world.settings.wait_twoway_signal * 73) as u16 {
            let o_tile = match ctx
                .world
                .grid
                .neighbour(tile, enterdir)
            {
                Some(t) => t,
                None => return StepOutcome::StopAll,
            };
            let my_dir = ctx.world.vehicles.get(id).direction;
            let opposing = ctx
                .world
                .vehicles
                .vehicle_from_pos(&ctx.world.grid, o_tile, &mut |v| {
                    v.kind() == Some(VehicleKind::Train)
                        && v.is_front_engine()
                        && v.tile == o_tile
                        && {
                            let diff = (v.direction as i32
                                - my_dir.reverse() as i32 + 2)
                                .rem_euclid(8);
                            diff == 2 || (v.cur_speed <= 5 && diff <= 4)
                        }
                });
            if opposing.is_none() {
                return StepOutcome::StopAll;
            }
        }
    }

    let v = ctx.world.vehicles.get_mut(id);
    v.load_unload_time_rem = 0;
    v.cur_speed = 0;
    v.subspeed = 0;
    reverse_train(ctx, id);
    StepOutcome::StopAll
}

/// Signal updates triggered by the head entering (or the tail leaving) a
/// signal tile: the segment on the far side changed occupancy.
fn train_moved_update_signals(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    dir: tycmap::DiagDirection,
) {
    if rail::is_rail_tile(&ctx.world.grid, tile)
        && rail::has_signals(&ctx.world.grid, tile)
    {
        let dirs = rail::track_bits(&ctx.world.grid, tile)
            .trackdir_bits()
            & exitdir_reaches_trackdirs(dir);
        if let Some(td) = dirs.first() {
            update_signals_on_segment(
                &mut ctx.world,
                &mut ctx.follower,
                tile,
                td.exitdir().to_direction(),
            );
        }
    }
}

/// Picks a track on junction entry, by pathfinder when there is a choice.
fn choose_train_track(
    ctx: &mut SimulationContext,
    id: VehicleId,
    tile: TileIndex,
    enterdir: tycmap::DiagDirection,
    bits: TrackdirBits,
) -> Track {
    if !bits.has_more_than_one() {
        return bits.first().map(|td| td.track()).unwrap_or(Track::Diag1);
    }

    let trackdir = {
        let v = ctx.world.vehicles.get(id);
        train_trackdir(&ctx.world, v)
    };
    let Some(trackdir) = trackdir else {
        return bits.first().unwrap().track();
    };

    let target = target_from_order(&ctx.world, ctx.world.vehicles.get(id));
    let (owner, railtype, pbs_status) = {
        let v = ctx.world.vehicles.get(id);
        (
            tycmap::Owner::Player(v.owner.0),
            v.train().railtype,
            v.train().pbs_status,
        )
    };
    let origin = ctx
        .world
        .grid
        .neighbour(tile, enterdir.reverse())
        .unwrap_or(tile);

    // Standing on (or needing) a reserved path: replan in any-exit mode
    // and thread a fresh reservation through the block.
    let pbs_tracks = pbs::tile_reserved(&ctx.world.grid, tile)
        .trackdir_bits()
        & tyctrack::trackdir_reaches_trackdirs(trackdir);
    let result = if !pbs_tracks.is_empty()
        || pbs_status == PbsStatus::NeedPath
    {
        if pbs_status != PbsStatus::NeedPath {
            let (end_tile, end_td) = {
                let t = ctx.world.vehicles.get(id).train();
                (t.pbs_end_tile, Trackdir::from_u8(t.pbs_end_trackdir))
            };
            if let (Some(first), Some(end_td)) =
                (pbs_tracks.first(), end_td)
            {
                pbs::clear_path(
                    &mut ctx.world.grid,
                    tile,
                    first,
                    end_tile,
                    end_td,
                );
            }
        }
        let result = ctx.npf.route_to_station_or_tile(
            &mut ctx.world,
            (origin, trackdir),
            target,
            TransportType::Rail,
            owner,
            railtype,
            PbsMode::Any,
        );
        {
            let v = ctx.world.vehicles.get_mut(id);
            let t = v.train_mut();
            t.pbs_end_tile = result.node.tile;
            t.pbs_end_trackdir = result.node.trackdir as u8;
            if result.found() && !result.pbs_blocked() {
                t.pbs_status = PbsStatus::HasPath;
            }
        }
        result
    } else {
        ctx.npf.route_to_station_or_tile(
            &mut ctx.world,
            (origin, trackdir),
            target,
            TransportType::Rail,
            owner,
            railtype,
            PbsMode::None,
        )
    };

    match result.best_trackdir {
        Some(td) => td.track(),
        // Already at the target; anything goes.
        None => bits.first().unwrap().track(),
    }
}

/// Collision scan around the head's position.
fn check_collision(ctx: &mut SimulationContext, id: VehicleId) {
    let (track, x, y, z, tile, skip) = {
        let v = ctx.world.vehicles.get(id);
        (
            v.train().track,
            v.x_pos,
            v.y_pos,
            v.z_pos,
            v.tile,
            v.next,
        )
    };
    if track == TrainVeh::TRACK_IN_DEPOT {
        return;
    }

    let pos_tile = tile_at_pos(&ctx.world.grid, x, y);
    let hit = ctx.world.vehicles.vehicle_from_pos(
        &ctx.world.grid,
        pos_tile,
        &mut |v| {
            v.index != id
                && Some(v.index) != skip
                && v.kind() == Some(VehicleKind::Train)
                && v.train().track != TrainVeh::TRACK_IN_DEPOT
                && (v.z_pos - z).abs() <= 6
                && (v.x_pos - x).abs() < 6
                && (v.y_pos - y).abs() < 6
        },
    );
    let Some(hit) = hit else { return };
    let coll_head = first_in_chain(&ctx.world, hit);
    if coll_head == first_in_chain(&ctx.world, id) {
        return;
    }
    if track == TrainVeh::TRACK_IN_TUNNEL {
        let other_dir = ctx.world.vehicles.get(hit).direction;
        let my_dir = ctx.world.vehicles.get(id).direction;
        if (other_dir as u8 & 2) != (my_dir as u8 & 2) {
            return;
        }
    }

    let mut victims = 2 + count_passengers(&ctx.world, id);
    if !ctx.world.vehicles.get(coll_head).is_crashed() {
        victims += 2 + count_passengers(&ctx.world, coll_head);
    }

    crash_train(ctx, id);
    if ctx.world.vehicles.get(coll_head).is_front_engine() {
        crash_train(ctx, coll_head);
    }

    info!("{} people die in a train collision", victims);
    modify_station_ratings_around(ctx, tile, 30, 160);
}

fn count_passengers(world: &World, head: VehicleId) -> u32 {
    chain_of(world, head)
        .iter()
        .map(|&c| {
            let v = world.vehicles.get(c);
            if v.cargo_type == CargoKind::Passengers {
                v.cargo_count as u32
            } else {
                0
            }
        })
        .sum()
}

fn crash_train(ctx: &mut SimulationContext, head: VehicleId) {
    if ctx.world.vehicles.get(head).train().crash_anim_pos != 0 {
        return;
    }
    pbs_clear_own_reservation(ctx, head);
    ctx.world.vehicles.get_mut(head).train_mut().crash_anim_pos = 1;
    for c in chain_of(&ctx.world, head) {
        ctx.world
            .vehicles
            .get_mut(c)
            .flags
            .set(VehicleFlags::CRASHED);
    }
    let v = ctx.world.vehicles.get(head);
    let (tile, x, y, z) = (v.tile, v.x_pos, v.y_pos, v.z_pos);
    let _ = tile;
    effects::spawn_explosion(ctx, x, y, z);
}

fn modify_station_ratings_around(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    radius: u32,
    amount: u8,
) {
    let grid_xy = (
        ctx.world.grid.tile_x(tile),
        ctx.world.grid.tile_y(tile),
    );
    for st in ctx.world.stations.iter_mut() {
        let dx = ctx.world.grid.tile_x(st.xy).abs_diff(grid_xy.0);
        let dy = ctx.world.grid.tile_y(st.xy).abs_diff(grid_xy.1);
        if dx + dy <= radius {
            for r in st.ratings.iter_mut() {
                *r = r.saturating_sub(amount);
            }
        }
    }
}

/// Turns the whole consist around in place.
///
/// Interior cars are advanced before and after the swap so that length
/// differences between the two halves do not open gaps.
pub fn reverse_train(ctx: &mut SimulationContext, id: VehicleId) {
    let (pbs_end_tile, pbs_end_td) = {
        let t = ctx.world.vehicles.get(id).train();
        (t.pbs_end_tile, Trackdir::from_u8(t.pbs_end_trackdir))
    };

    // If the track behind the tail is reserved, plan the post-reverse
    // path first; without one the reverse is abandoned.
    let last = last_in_chain(&ctx.world, id);
    let last_v = ctx.world.vehicles.get(last);
    if let Some(last_td) = train_trackdir(&ctx.world, last_v) {
        let back_td = last_td.reverse();
        let last_tile = last_v.tile;
        if pbs::tile_reserved(&ctx.world.grid, last_tile)
            .has(back_td.track())
        {
            let target =
                target_from_order(&ctx.world, ctx.world.vehicles.get(id));
            let (owner, railtype) = {
                let v = ctx.world.vehicles.get(id);
                (tycmap::Owner::Player(v.owner.0), v.train().railtype)
            };
            let result = ctx.npf.route_to_station_or_tile(
                &mut ctx.world,
                (last_tile, back_td),
                target,
                TransportType::Rail,
                owner,
                railtype,
                PbsMode::Any,
            );
            if result.best_trackdir.is_none() || result.pbs_blocked() {
                let t = ctx.world.vehicles.get_mut(id).train_mut();
                t.flags &= !TrainVeh::FLAG_REVERSING;
                return;
            }
            let t = ctx.world.vehicles.get_mut(id).train_mut();
            t.pbs_end_tile = result.node.tile;
            t.pbs_end_trackdir = result.node.trackdir as u8;
        }
    }

    // Clear the old forward reservation.
    let head_v = ctx.world.vehicles.get(id);
    if let Some(td) = train_trackdir(&ctx.world, head_v) {
        let head_tile = head_v.tile;
        let has_path =
            head_v.train().pbs_status == PbsStatus::HasPath;
        if has_path {
            if let Some(next) = ctx
                .world
                .grid
                .neighbour(head_tile, td.exitdir())
            {
                let ts = track_status(
                    &ctx.world.grid,
                    next,
                    TransportType::Rail,
                )
                .trackdirs()
                    & tyctrack::trackdir_reaches_trackdirs(td);
                if let (Some(first), Some(end_td), true) =
                    (ts.first(), pbs_end_td, pbs_end_tile.is_valid())
                {
                    pbs::clear_path(
                        &mut ctx.world.grid,
                        next,
                        first,
                        pbs_end_tile,
                        end_td,
                    );
                }
            }
            ctx.world.vehicles.get_mut(id).train_mut().pbs_status =
                PbsStatus::None;
        } else if pbs::tile_reserved(&ctx.world.grid, head_tile)
            .has(td.track())
        {
            if let (Some(end_td), true) = (pbs_end_td, pbs_end_tile.is_valid())
            {
                pbs::clear_path(
                    &mut ctx.world.grid,
                    head_tile,
                    td,
                    pbs_end_tile,
                    end_td,
                );
            }
            let in_tunnel =
                ctx.world.vehicles.get(id).train().in_tunnel();
            if !in_tunnel {
                pbs::reserve_track(
                    &mut ctx.world.grid,
                    head_tile,
                    td.track(),
                );
            }
        }
    }

    // Release the crossing the head was about to enter.
    let head_v = ctx.world.vehicles.get(id);
    if let Some(td) = train_trackdir(&ctx.world, head_v) {
        if let Some(ahead) =
            ctx.world.grid.neighbour(head_v.tile, td.exitdir())
        {
            vehicle_leave(ctx, id, ahead);
        }
    }

    let chain = chain_of(&ctx.world, id);
    advance_wagons(ctx, id, true);

    let (mut l, mut r) = (0usize, chain.len() - 1);
    loop {
        reverse_swap_pair(ctx, &chain, l, r);
        if l >= r {
            break;
        }
        l += 1;
        if r == 0 {
            break;
        }
        r -= 1;
        if l > r {
            break;
        }
    }

    advance_wagons(ctx, id, false);

    let t = ctx.world.vehicles.get_mut(id).train_mut();
    t.flags &= !TrainVeh::FLAG_REVERSING;
}

fn reverse_swap_pair(
    ctx: &mut SimulationContext,
    chain: &[VehicleId],
    l: usize,
    r: usize,
) {
    let a = chain[l];
    let b = chain[r];
    if a != b {
        let (ax, ay, az, adir, atrack, atile, ahidden, aflags) =
            snapshot(ctx, a);
        let (bx, by, bz, bdir, btrack, btile, bhidden, bflags) =
            snapshot(ctx, b);
        apply(ctx, a, bx, by, bz, bdir, btrack, btile, bhidden, bflags);
        apply(ctx, b, ax, ay, az, adir, atrack, atile, ahidden, aflags);
        for &v in &[a, b] {
            flip_direction(ctx, v);
            let (tile, x, y) = {
                let veh = ctx.world.vehicles.get(v);
                (veh.tile, veh.x_pos, veh.y_pos)
            };
            vehicle_enter(ctx, v, tile, x, y);
            ctx.world.vehicles.position_changed(v);
        }
    } else {
        flip_direction(ctx, a);
        let (tile, x, y) = {
            let veh = ctx.world.vehicles.get(a);
            (veh.tile, veh.x_pos, veh.y_pos)
        };
        vehicle_enter(ctx, a, tile, x, y);
        ctx.world.vehicles.position_changed(a);
    }
}

type Snapshot = (i32, i32, i32, Direction, u8, TileIndex, bool, u8);

fn snapshot(ctx: &SimulationContext, id: VehicleId) -> Snapshot {
    let v = ctx.world.vehicles.get(id);
    (
        v.x_pos,
        v.y_pos,
        v.z_pos,
        v.direction,
        v.train().track,
        v.tile,
        v.flags.has(VehicleFlags::HIDDEN),
        v.train().flags
            & (TrainVeh::FLAG_GOING_UP | TrainVeh::FLAG_GOING_DOWN),
    )
}

#[allow(clippy::too_many_arguments)]
fn apply(
    ctx: &mut SimulationContext,
    id: VehicleId,
    x: i32,
    y: i32,
    z: i32,
    dir: Direction,
    track: u8,
    tile: TileIndex,
    hidden: bool,
    slope_flags: u8,
) {
    let v = ctx.world.vehicles.get_mut(id);
    v.x_pos = x;
    v.y_pos = y;
    v.z_pos = z;
    v.direction = dir;
    v.tile = tile;
    if hidden {
        v.flags.set(VehicleFlags::HIDDEN);
    } else {
        v.flags.clear(VehicleFlags::HIDDEN);
    }
    let t = v.train_mut();
    t.track = track;
    // Swapping ends also swaps which way the slope runs underneath.
    t.flags &= !(TrainVeh::FLAG_GOING_UP | TrainVeh::FLAG_GOING_DOWN);
    if slope_flags & TrainVeh::FLAG_GOING_UP != 0 {
        t.flags |= TrainVeh::FLAG_GOING_DOWN;
    } else if slope_flags & TrainVeh::FLAG_GOING_DOWN != 0 {
        t.flags |= TrainVeh::FLAG_GOING_UP;
    }
}

fn flip_direction(ctx: &mut SimulationContext, id: VehicleId) {
    let v = ctx.world.vehicles.get_mut(id);
    let in_depot = v.train().in_depot();
    if !in_depot {
        v.direction = v.direction.reverse();
    }
}

/// Steps the interior pairs forward to absorb the length imbalance
/// between the two consist halves; run before and after the swap.
fn advance_wagons(ctx: &mut SimulationContext, head: VehicleId, before: bool) {
    let chain = chain_of(&ctx.world, head);
    let mut length = chain.len();
    let mut base_idx = 0usize;

    while length > 2 {
        let first_idx = base_idx + 1;
        let last_idx = base_idx + length - 2;
        let base_len = ctx
            .world
            .vehicles
            .get(chain[base_idx])
            .train()
            .cached_veh_length as i32;
        let last_len = ctx
            .world
            .vehicles
            .get(chain[last_idx])
            .train()
            .cached_veh_length as i32;
        let mut differential = last_len - base_len;
        if before {
            differential = -differential;
        }
        if differential > 0 {
            // Advance only the sub-chain [first..=last] by that many
            // pixel steps.
            for _ in 0..differential {
                train_controller(
                    ctx,
                    chain[first_idx],
                    Some(chain[last_idx]),
                );
            }
        }
        base_idx = first_idx;
        length -= 2;
    }
}
