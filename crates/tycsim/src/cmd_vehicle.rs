//! Vehicle purchase, sale and management commands.

use tycmap::TileIndex;
use tycworld::engine::{engine, is_valid_engine, EngineId, EngineKind};
use tycworld::vehicle::{
    init_slot, RoadVeh, ShipVeh, TrainVeh, VehiclePayload,
    RV_STATE_IN_DEPOT,
};
use tycworld::{
    CommandError, Money, OrderFlags, OrderKind, TransportType, Vehicle,
    VehicleFlags, VehicleId, VehicleKind, VehicleSubtype, DAYS_PER_YEAR,
};

use crate::command::CommandFlags;
use crate::context::SimulationContext;
use crate::train;

/// Standard economic life of a vehicle.
const VEHICLE_LIFE_YEARS: u32 = 30;

fn vehicle_of_player(
    ctx: &SimulationContext,
    id: VehicleId,
) -> Result<&Vehicle, CommandError> {
    let v = ctx.world.vehicles.get(id);
    if v.is_free() || v.owner != ctx.current_player {
        return Err(CommandError::VehicleUnavailable);
    }
    Ok(v)
}

fn init_common(ctx: &mut SimulationContext, id: VehicleId, eng: EngineId) {
    let info = engine(eng);
    let date = ctx.world.calendar.date;
    let interval = ctx.world.settings.servint_default;
    let v = ctx.world.vehicles.get_mut(id);
    v.engine = eng;
    v.max_speed = info.max_speed;
    v.cargo_type = info.cargo;
    v.cargo_cap = info.capacity;
    v.reliability = info.reliability;
    v.reliability_spd_dec = info.reliability_decay;
    v.max_age_days = VEHICLE_LIFE_YEARS * DAYS_PER_YEAR;
    v.build_date = date;
    v.date_of_last_service = date;
    v.service_interval = interval;
    v.flags.set(VehicleFlags::STOPPED);
    v.flags.set(VehicleFlags::HIDDEN);
}

fn place_in_depot(ctx: &mut SimulationContext, id: VehicleId, tile: TileIndex) {
    let grid = &ctx.world.grid;
    let x = (grid.tile_x(tile) * 16 + 8) as i32;
    let y = (grid.tile_y(tile) * 16 + 8) as i32;
    let z = grid.tile_z(tile) as i32;
    let mode = if ctx.world.is_depot_of(tile, TransportType::Rail) {
        TransportType::Rail
    } else if ctx.world.is_depot_of(tile, TransportType::Road) {
        TransportType::Road
    } else {
        TransportType::Water
    };
    let dir = ctx.world.depot_exitdir(tile, mode).to_direction();
    let v = ctx.world.vehicles.get_mut(id);
    v.tile = tile;
    v.dest_tile = tile;
    v.x_pos = x;
    v.y_pos = y;
    v.z_pos = z;
    v.direction = dir;
    ctx.world.vehicles.position_changed(id);
}

/// Builds a rail engine or wagon inside a depot. `p1` is the design.
pub fn build_rail_vehicle(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let eng = EngineId(p1 as u8);
    if !is_valid_engine(eng) {
        return Err(CommandError::VehicleUnavailable);
    }
    let EngineKind::Rail { railtype, is_wagon } = engine(eng).kind else {
        return Err(CommandError::VehicleUnavailable);
    };
    if !ctx.world.is_depot_of(tile, TransportType::Rail) {
        return Err(CommandError::MustBeStoppedInDepot);
    }
    if tycworld::rail::railtype(&ctx.world.grid, tile) != railtype {
        return Err(CommandError::IncompatibleRail);
    }
    if !ctx.world.vehicles.can_allocate(1) {
        return Err(CommandError::TooManyVehicles);
    }
    let cost = engine(eng).base_cost;
    if !flags.is_exec() {
        return Ok(cost);
    }

    let id = ctx
        .world
        .vehicles
        .allocate()
        .ok_or(CommandError::TooManyVehicles)?;
    let subtype = if is_wagon {
        VehicleSubtype::FreeWagon
    } else {
        VehicleSubtype::FrontEngine
    };
    let mut train = TrainVeh::new(subtype, railtype);
    train.track = TrainVeh::TRACK_IN_DEPOT;
    init_slot(
        &mut ctx.world.vehicles,
        id,
        ctx.current_player,
        eng,
        VehiclePayload::Train(train),
    );
    init_common(ctx, id, eng);
    place_in_depot(ctx, id, tile);

    if is_wagon {
        // Hook onto an existing loose wagon chain in this depot.
        if let Some(head) = find_free_wagon_chain(ctx, tile, id) {
            let tail = train::last_in_chain(&ctx.world, head);
            ctx.world.vehicles.get_mut(tail).next = Some(id);
            ctx.world.vehicles.get_mut(id).train_mut().subtype =
                VehicleSubtype::NotFirst;
            train::consist_changed(ctx, head);
        } else {
            train::consist_changed(ctx, id);
        }
    } else {
        let unit = ctx
            .world
            .vehicles
            .next_unit_number(VehicleKind::Train, ctx.current_player);
        ctx.world.vehicles.get_mut(id).unit_number = unit;
        train::consist_changed(ctx, id);
    }
    Ok(cost)
}

fn find_free_wagon_chain(
    ctx: &SimulationContext,
    tile: TileIndex,
    skip: VehicleId,
) -> Option<VehicleId> {
    ctx.world.vehicles.iter_ids().find(|&id| {
        id != skip && {
            let v = ctx.world.vehicles.get(id);
            v.tile == tile
                && v.kind() == Some(VehicleKind::Train)
                && v.train().subtype == VehicleSubtype::FreeWagon
        }
    })
}

/// Builds a road vehicle inside a road depot. `p1` is the design.
pub fn build_road_veh(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let eng = EngineId(p1 as u8);
    if !is_valid_engine(eng) || engine(eng).kind != EngineKind::Road {
        return Err(CommandError::VehicleUnavailable);
    }
    if !ctx.world.is_depot_of(tile, TransportType::Road) {
        return Err(CommandError::MustBeStoppedInDepot);
    }
    if !ctx.world.vehicles.can_allocate(1) {
        return Err(CommandError::TooManyVehicles);
    }
    let cost = engine(eng).base_cost;
    if !flags.is_exec() {
        return Ok(cost);
    }
    let id = ctx
        .world
        .vehicles
        .allocate()
        .ok_or(CommandError::TooManyVehicles)?;
    let mut rv = RoadVeh::default();
    rv.state = RV_STATE_IN_DEPOT;
    init_slot(
        &mut ctx.world.vehicles,
        id,
        ctx.current_player,
        eng,
        VehiclePayload::Road(rv),
    );
    init_common(ctx, id, eng);
    place_in_depot(ctx, id, tile);
    let info = engine(eng);
    let unit = ctx
        .world
        .vehicles
        .next_unit_number(VehicleKind::Road, ctx.current_player);
    let v = ctx.world.vehicles.get_mut(id);
    v.unit_number = unit;
    // The simple acceleration model uses a cached per-design constant.
    v.acceleration = (info.power / 10).clamp(1, 255) as u8;
    Ok(cost)
}

/// Builds a ship inside a ship depot. `p1` is the design.
pub fn build_ship(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let eng = EngineId(p1 as u8);
    if !is_valid_engine(eng) || engine(eng).kind != EngineKind::Ship {
        return Err(CommandError::VehicleUnavailable);
    }
    if !ctx.world.is_depot_of(tile, TransportType::Water) {
        return Err(CommandError::MustBeStoppedInDepot);
    }
    if !ctx.world.vehicles.can_allocate(1) {
        return Err(CommandError::TooManyVehicles);
    }
    let cost = engine(eng).base_cost;
    if !flags.is_exec() {
        return Ok(cost);
    }
    let id = ctx
        .world
        .vehicles
        .allocate()
        .ok_or(CommandError::TooManyVehicles)?;
    let mut ship = ShipVeh::default();
    ship.state = 0x80;
    init_slot(
        &mut ctx.world.vehicles,
        id,
        ctx.current_player,
        eng,
        VehiclePayload::Ship(ship),
    );
    init_common(ctx, id, eng);
    place_in_depot(ctx, id, tile);
    let unit = ctx
        .world
        .vehicles
        .next_unit_number(VehicleKind::Ship, ctx.current_player);
    let v = ctx.world.vehicles.get_mut(id);
    v.unit_number = unit;
    v.acceleration = 16;
    Ok(cost)
}

/// Sells a vehicle stopped in a depot. For trains `p2 = 1` sells the whole
/// consist, otherwise the one unit.
pub fn sell_vehicle(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    let v = vehicle_of_player(ctx, id)?;
    let in_depot = match &v.payload {
        VehiclePayload::Train(t) => t.in_depot(),
        VehiclePayload::Road(r) => r.state == RV_STATE_IN_DEPOT,
        VehiclePayload::Ship(s) => s.state == 0x80,
        _ => false,
    };
    if !in_depot || !v.is_stopped() {
        return Err(CommandError::MustBeStoppedInDepot);
    }

    let sell_chain = v.kind() != Some(VehicleKind::Train) || p2 == 1;
    let mut refund: Money = 0;
    let mut chain = vec![id];
    if sell_chain {
        let mut cur = v.next;
        while let Some(n) = cur {
            chain.push(n);
            cur = ctx.world.vehicles.get(n).next;
        }
    }
    for &u in &chain {
        refund += engine(ctx.world.vehicles.get(u).engine).base_cost / 2;
    }

    if flags.is_exec() {
        let remaining_head = if !sell_chain {
            let head = train::first_in_chain(&ctx.world, id);
            train::detach_vehicle(ctx, id);
            (head != id).then_some(head)
        } else {
            None
        };
        for &u in &chain {
            release_orders(ctx, u);
            ctx.world.vehicles.free(u);
        }
        if let Some(head) = remaining_head {
            train::consist_changed(ctx, head);
        }
    }
    Ok(-refund)
}

/// Unlinks a vehicle from its shared-order ring, freeing the chain with
/// the last member.
pub(crate) fn release_orders(ctx: &mut SimulationContext, id: VehicleId) {
    let (schedule, prev, next) = {
        let v = ctx.world.vehicles.get(id);
        (v.schedule, v.prev_shared, v.next_shared)
    };
    match (prev, next) {
        (None, None) => {
            ctx.world.orders.free_chain(schedule);
        }
        _ => {
            if let Some(p) = prev {
                ctx.world.vehicles.get_mut(p).next_shared = next;
            }
            if let Some(n) = next {
                ctx.world.vehicles.get_mut(n).prev_shared = prev;
            }
        }
    }
    let v = ctx.world.vehicles.get_mut(id);
    v.schedule = None;
    v.prev_shared = None;
    v.next_shared = None;
    v.num_orders = 0;
}

/// Changes the carried cargo; the vehicle must be stopped in a depot.
/// `p1` is the vehicle, `p2` the cargo kind.
pub fn refit_vehicle(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    let v = vehicle_of_player(ctx, id)?;
    let in_depot = match &v.payload {
        VehiclePayload::Train(t) => t.in_depot(),
        VehiclePayload::Road(r) => r.state == RV_STATE_IN_DEPOT,
        VehiclePayload::Ship(s) => s.state == 0x80,
        _ => false,
    };
    if !in_depot || !v.is_stopped() {
        return Err(CommandError::MustBeStoppedInDepot);
    }
    let cargo = match p2 {
        0 => tycworld::CargoKind::Passengers,
        1 => tycworld::CargoKind::Mail,
        2 => tycworld::CargoKind::Coal,
        3 => tycworld::CargoKind::Goods,
        4 => tycworld::CargoKind::Steel,
        5 => tycworld::CargoKind::Grain,
        6 => tycworld::CargoKind::Wood,
        7 => tycworld::CargoKind::Oil,
        _ => return Err(CommandError::VehicleUnavailable),
    };
    let cost = engine(v.engine).base_cost / 10;
    if flags.is_exec() {
        let v = ctx.world.vehicles.get_mut(id);
        v.cargo_type = cargo;
        v.cargo_count = 0;
        if v.kind() == Some(VehicleKind::Train) {
            let head = train::first_in_chain(&ctx.world, id);
            train::consist_changed(ctx, head);
        }
    }
    Ok(cost)
}

/// Orders a vehicle to the nearest depot, or cancels a pending order to
/// one. `p1` is the vehicle; `p2 = 1` services only instead of halting.
pub fn send_to_depot(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    let v = vehicle_of_player(ctx, id)?;
    let kind = v.kind().ok_or(CommandError::VehicleUnavailable)?;

    if v.current_order.kind == OrderKind::GotoDepot
        && !v.current_order.flags.has(OrderFlags::PART_OF_ORDERS)
    {
        // Toggle off: fall back to the schedule.
        if flags.is_exec() {
            let v = ctx.world.vehicles.get_mut(id);
            v.current_order = tycworld::Order::default();
        }
        return Ok(0);
    }

    let depot_tile = match kind {
        VehicleKind::Train => train::find_depot_for(ctx, id),
        VehicleKind::Road => crate::roadveh::find_depot_for(ctx, id),
        VehicleKind::Ship => crate::ship::find_depot_for(ctx, id),
        VehicleKind::Effect => None,
    }
    .ok_or(CommandError::DepotNotFound)?;

    if flags.is_exec() {
        let depot = ctx
            .world
            .depot_at(depot_tile)
            .map(|d| d.id.0)
            .unwrap_or(0);
        let mut order_flags = OrderFlags::NON_STOP;
        if p2 != 1 {
            order_flags.set(OrderFlags::HALT_IN_DEPOT);
        }
        let v = ctx.world.vehicles.get_mut(id);
        v.dest_tile = depot_tile;
        v.current_order = tycworld::Order::goto_depot(depot, order_flags);
    }
    Ok(0)
}

/// Re-hangs a rail vehicle behind another (or onto a fresh chain).
///
/// `p1` holds the moved vehicle in the low half and the new predecessor in
/// the high half (`0xFFFF` for none); `p2 = 1` drags the tail along.
pub fn move_rail_vehicle(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let src = VehicleId((p1 & 0xFFFF) as u16);
    let dest = match (p1 >> 16) as u16 {
        0xFFFF => None,
        raw => Some(VehicleId(raw)),
    };
    let move_chain = p2 == 1;

    let v = vehicle_of_player(ctx, src)?;
    if v.kind() != Some(VehicleKind::Train) || !v.train().in_depot() {
        return Err(CommandError::MustBeStoppedInDepot);
    }
    let src_tile = v.tile;
    if let Some(d) = dest {
        let dv = vehicle_of_player(ctx, d)?;
        if dv.kind() != Some(VehicleKind::Train)
            || !dv.train().in_depot()
            || dv.tile != src_tile
        {
            return Err(CommandError::MustBeStoppedInDepot);
        }
    }
    if !flags.is_exec() {
        return Ok(0);
    }

    let old_head = train::first_in_chain(&ctx.world, src);
    train::detach_vehicle_chain(ctx, src, move_chain);

    match dest {
        Some(d) => {
            let head = train::first_in_chain(&ctx.world, d);
            let tail = train::last_in_chain(&ctx.world, head);
            ctx.world.vehicles.get_mut(tail).next = Some(src);
            ctx.world.vehicles.get_mut(src).train_mut().subtype =
                VehicleSubtype::NotFirst;
            train::consist_changed(ctx, head);
        }
        None => {
            let info = engine(ctx.world.vehicles.get(src).engine);
            let subtype = match info.kind {
                EngineKind::Rail { is_wagon: true, .. } => {
                    VehicleSubtype::FreeWagon
                }
                _ => VehicleSubtype::FrontEngine,
            };
            if subtype == VehicleSubtype::FrontEngine {
                let unit = ctx
                    .world
                    .vehicles
                    .next_unit_number(VehicleKind::Train, ctx.current_player);
                ctx.world.vehicles.get_mut(src).unit_number = unit;
            }
            ctx.world.vehicles.get_mut(src).train_mut().subtype = subtype;
            train::consist_changed(ctx, src);
        }
    }
    if old_head != src
        && !ctx.world.vehicles.get(old_head).is_free()
    {
        train::consist_changed(ctx, old_head);
    }
    Ok(0)
}

/// Builds a copy of a vehicle (and its consist) in a depot.
/// `p1` is the source vehicle; `p2 = 1` shares orders instead of copying.
pub fn clone_vehicle(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let src = VehicleId(p1 as u16);
    let v = vehicle_of_player(ctx, src)?;
    let kind = v.kind().ok_or(CommandError::VehicleUnavailable)?;

    let mut engines = vec![v.engine];
    if kind == VehicleKind::Train {
        let mut cur = v.next;
        while let Some(n) = cur {
            let u = ctx.world.vehicles.get(n);
            engines.push(u.engine);
            cur = u.next;
        }
    }
    let total: Money =
        engines.iter().map(|&e| engine(e).base_cost).sum();
    if !flags.is_exec() {
        return Ok(total);
    }

    let build_cmd = match kind {
        VehicleKind::Train => crate::command::CommandId::BuildRailVehicle,
        VehicleKind::Road => crate::command::CommandId::BuildRoadVeh,
        VehicleKind::Ship => crate::command::CommandId::BuildShip,
        VehicleKind::Effect => {
            return Err(CommandError::VehicleUnavailable)
        }
    };
    let mut new_head: Option<VehicleId> = None;
    for (i, &eng) in engines.iter().enumerate() {
        let before = collect_ids(ctx);
        crate::command::sub_command(
            ctx,
            tile,
            eng.0 as u32,
            0,
            flags,
            build_cmd,
        )?;
        let created = newly_created(ctx, &before);
        if i == 0 {
            new_head = created;
        } else if let (Some(head), Some(wagon)) = (new_head, created) {
            // Wagons may have hooked onto a free chain; re-hang them
            // behind the clone's head.
            train::detach_vehicle_chain(ctx, wagon, false);
            let tail = train::last_in_chain(&ctx.world, head);
            if tail != wagon {
                ctx.world.vehicles.get_mut(tail).next = Some(wagon);
                ctx.world.vehicles.get_mut(wagon).train_mut().subtype =
                    VehicleSubtype::NotFirst;
            }
            train::consist_changed(ctx, head);
        }
    }
    if let Some(head) = new_head {
        crate::cmd_order::clone_order_between(ctx, head, src, p2 == 1)?;
        let interval = ctx.world.vehicles.get(src).service_interval;
        ctx.world.vehicles.get_mut(head).service_interval = interval;
    }
    Ok(total)
}

fn collect_ids(ctx: &SimulationContext) -> Vec<VehicleId> {
    ctx.world.vehicles.iter_ids().collect()
}

fn newly_created(
    ctx: &SimulationContext,
    before: &[VehicleId],
) -> Option<VehicleId> {
    ctx.world
        .vehicles
        .iter_ids()
        .find(|id| !before.contains(id))
}

/// Starts or stops a vehicle. `p1` is the vehicle.
pub fn start_stop_vehicle(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    vehicle_of_player(ctx, id)?;
    if flags.is_exec() {
        let v = ctx.world.vehicles.get_mut(id);
        if v.is_stopped() {
            v.flags.clear(VehicleFlags::STOPPED);
        } else {
            v.flags.set(VehicleFlags::STOPPED);
        }
    }
    Ok(0)
}

/// Asks a train to turn around. `p1` is the train.
pub fn reverse_train_direction(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    let v = vehicle_of_player(ctx, id)?;
    if !v.is_front_engine() {
        return Err(CommandError::VehicleUnavailable);
    }
    if flags.is_exec() {
        if ctx.world.vehicles.get(id).cur_speed == 0 {
            train::reverse_train(ctx, id);
        } else {
            // Accepted now, performed once the speed drains away.
            let t = ctx.world.vehicles.get_mut(id).train_mut();
            t.flags |= TrainVeh::FLAG_REVERSING;
        }
    }
    Ok(0)
}

/// Ticks a red-signal override stays valid.
const FORCE_PROCEED_TICKS: u8 = 80;

/// Lets a train pass the red signal in front of it. `p1` is the train.
pub fn force_train_proceed(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    let v = vehicle_of_player(ctx, id)?;
    if !v.is_front_engine() {
        return Err(CommandError::VehicleUnavailable);
    }
    if flags.is_exec() {
        ctx.world.vehicles.get_mut(id).train_mut().force_proceed =
            FORCE_PROCEED_TICKS;
    }
    Ok(0)
}

/// Renames a vehicle using the context's pending text.
pub fn name_vehicle(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    vehicle_of_player(ctx, id)?;
    if flags.is_exec() {
        let name = ctx.cmd_text.take();
        ctx.world.vehicles.get_mut(id).name = name;
    }
    Ok(0)
}

/// Changes the service interval. `p1` is the vehicle, `p2` the days (or
/// percent when the percent setting is on).
pub fn change_service_int(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    vehicle_of_player(ctx, id)?;
    if flags.is_exec() {
        ctx.world.vehicles.get_mut(id).service_interval =
            (p2 as u16).clamp(5, 800);
    }
    Ok(0)
}
