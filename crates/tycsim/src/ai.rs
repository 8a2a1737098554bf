//! The computer player: a per-player state machine that plans and builds
//! bus and truck routes with the same commands a human would use.
//!
//! Every decision goes through query-cost commands first; the executing
//! states re-run the identical commands with the execute flag, and any
//! failure tears the attempt down and returns the machine to idle.

use log::{debug, info};

use tycmap::{DiagDirection, TileIndex, TileKind};
use tycworld::{
    road, station, CargoKind, CommandError, Money, OrderFlags, PlayerId,
    RoadStopKind, TownId, VehicleId, VehicleKind,
};

use crate::command::{do_command, CommandFlags, CommandId};
use crate::context::SimulationContext;

/// Cash the computer player refuses to dip below.
const AI_MINIMUM_MONEY: Money = 15_000;
/// Bus routes may span `max_cargo * 2 / 5` tiles.
const BUS_CARGO_DISTANCE_NUM: u32 = 2;
const BUS_CARGO_DISTANCE_DEN: u32 = 5;
/// Trucks refuse very short hauls.
const TRUCK_MIN_DISTANCE: u32 = 15;
/// Ticks between two vehicle purchases for one route.
const AI_BUILD_VEHICLE_TIME_BETWEEN: u32 = 148;
/// Attempts at the same route before giving up on it.
const AI_MAX_TRIES_FOR_SAME_ROUTE: u8 = 8;
/// Pathfinder node budget per wake-up.
const PATH_NODES_PER_TICK: u32 = 200;
/// Months a fresh station blocks the same town from a new route.
const NEW_STATION_BLOCK_DAYS: u32 = 180;

/// How many ticks pass between state steps, per speed setting.
const SPEED_INTERVALS: [u8; 5] = [8, 6, 4, 2, 1];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AiState {
    Startup,
    FirstTime,
    Nothing,
    WakeUp,
    LocateRoute,
    FindStation,
    FindPath,
    FindDepot,
    VerifyRoute,
    BuildStation,
    BuildPath,
    BuildDepot,
    BuildVehicle,
    GiveOrders,
    StartVehicle,
    RepayMoney,
    CheckAllVehicles,
    ActionDone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RouteKind {
    Bus,
    Truck,
}

/// A* state for laying a road between two tiles, resumable across ticks.
#[derive(Default)]
struct RoadPlanner {
    open: std::collections::BinaryHeap<
        std::cmp::Reverse<(u32, u64, u32)>,
    >,
    best: std::collections::HashMap<u32, u32>,
    parent: std::collections::HashMap<u32, u32>,
    seq: u64,
    target: TileIndex,
    started: bool,
}

impl RoadPlanner {
    fn start(&mut self, from: TileIndex, to: TileIndex) {
        self.open.clear();
        self.best.clear();
        self.parent.clear();
        self.seq = 0;
        self.target = to;
        self.started = true;
        self.open.push(std::cmp::Reverse((0, 0, from.0)));
        self.best.insert(from.0, 0);
    }

    /// Runs up to `budget` expansions; `Some(path)` when finished, the
    /// path being empty when no route exists.
    fn step(
        &mut self,
        ctx: &SimulationContext,
        budget: u32,
    ) -> Option<Vec<TileIndex>> {
        let grid = &ctx.world.grid;
        for _ in 0..budget {
            let std::cmp::Reverse((_, _, cur)) = self.open.pop()?;
            let cur_tile = TileIndex(cur);
            let g = *self.best.get(&cur).unwrap_or(&u32::MAX);
            if cur_tile == self.target {
                let mut path = vec![cur_tile];
                let mut walk = cur;
                while let Some(&p) = self.parent.get(&walk) {
                    path.push(TileIndex(p));
                    walk = p;
                }
                path.reverse();
                return Some(path);
            }
            for dir in 0..4 {
                let d = DiagDirection::from_u8(dir).unwrap();
                let Some(next) = grid.neighbour(cur_tile, d) else {
                    continue;
                };
                if !road_buildable(ctx, next) {
                    continue;
                }
                let cost = g + road_step_cost(ctx, next);
                if self
                    .best
                    .get(&next.0)
                    .is_some_and(|&b| b <= cost)
                {
                    continue;
                }
                self.best.insert(next.0, cost);
                self.parent.insert(next.0, cur);
                let h = grid.distance_manhattan(next, self.target);
                self.seq += 1;
                self.open.push(std::cmp::Reverse((
                    cost + h,
                    self.seq,
                    next.0,
                )));
            }
        }
        None
    }
}

fn road_buildable(ctx: &SimulationContext, tile: TileIndex) -> bool {
    let grid = &ctx.world.grid;
    match grid.kind(tile) {
        TileKind::Clear | TileKind::Trees => {
            !grid.slope_of(tile).0.is_steep()
        }
        TileKind::Street => {
            road::is_ordinary_road(grid, tile)
                || road::is_level_crossing(grid, tile)
        }
        TileKind::Railway => {
            // A crossing can thread a single straight diagonal track.
            tycworld::rail::is_plain_rail(grid, tile)
                && tycworld::rail::track_bits(grid, tile).count() == 1
                && tycworld::rail::track_bits(grid, tile)
                    .first()
                    .is_some_and(|t| t.is_diagonal())
        }
        TileKind::Station => station::is_road_stop_tile(grid, tile),
        _ => false,
    }
}

fn road_step_cost(ctx: &SimulationContext, tile: TileIndex) -> u32 {
    let grid = &ctx.world.grid;
    match grid.kind(tile) {
        TileKind::Street => 1,
        TileKind::Railway => 8,
        _ => 2,
    }
}

/// Everything one computer player remembers between ticks.
pub struct AiPlayer {
    pub player: PlayerId,
    state: AiState,
    tick: u32,
    idle: u32,
    counter: u8,
    route_kind: RouteKind,
    cargo: CargoKind,
    from_xy: TileIndex,
    to_xy: TileIndex,
    from_stop: TileIndex,
    from_dir: DiagDirection,
    to_stop: TileIndex,
    to_dir: DiagDirection,
    path: Vec<TileIndex>,
    depot_tile: TileIndex,
    depot_dir: DiagDirection,
    planner: RoadPlanner,
    new_cost: Money,
    amount_veh: u8,
    cur_veh: u8,
    built_vehicles: Vec<VehicleId>,
    last_vehicle_tick: u32,
    blocked_towns: Vec<(TownId, u32)>,
}

impl AiPlayer {
    pub fn new(player: PlayerId) -> AiPlayer {
        AiPlayer {
            player,
            state: AiState::Startup,
            tick: 0,
            idle: 250,
            counter: 0,
            route_kind: RouteKind::Bus,
            cargo: CargoKind::Passengers,
            from_xy: TileIndex::INVALID,
            to_xy: TileIndex::INVALID,
            from_stop: TileIndex::INVALID,
            from_dir: DiagDirection::NE,
            to_stop: TileIndex::INVALID,
            to_dir: DiagDirection::NE,
            path: Vec::new(),
            depot_tile: TileIndex::INVALID,
            depot_dir: DiagDirection::NE,
            planner: RoadPlanner::default(),
            new_cost: 0,
            amount_veh: 0,
            cur_veh: 0,
            built_vehicles: Vec::new(),
            last_vehicle_tick: 0,
            blocked_towns: Vec::new(),
        }
    }
}

/// One tick of every active computer player, speed-gated.
pub fn ai_run_all(ctx: &mut SimulationContext) {
    let interval =
        SPEED_INTERVALS[ctx.world.settings.ai_speed.min(4) as usize] as u32;
    for i in 0..ctx.ai.len() {
        let player = ctx.ai[i].player;
        if !ctx.world.player(player).is_ai
            || !ctx.world.player(player).is_active
        {
            continue;
        }
        ctx.ai[i].tick += 1;
        if ctx.ai[i].tick % interval != 0 {
            continue;
        }
        ai_step(ctx, i);
    }
    ctx.current_player = PlayerId(0);
}

fn ai_step(ctx: &mut SimulationContext, i: usize) {
    ctx.current_player = ctx.ai[i].player;
    let state = ctx.ai[i].state;
    match state {
        AiState::Startup => {
            if ctx.ai[i].idle > 0 {
                ctx.ai[i].idle -= 1;
            } else {
                ctx.ai[i].state = AiState::FirstTime;
            }
        }
        AiState::FirstTime => {
            ctx.ai[i].state = AiState::WakeUp;
        }
        AiState::Nothing => {
            if ctx.ai[i].idle > 0 {
                ctx.ai[i].idle -= 1;
            } else {
                ctx.ai[i].state = AiState::WakeUp;
            }
        }
        AiState::WakeUp => wake_up(ctx, i),
        AiState::LocateRoute => locate_route(ctx, i),
        AiState::FindStation => find_station(ctx, i),
        AiState::FindPath => find_path(ctx, i),
        AiState::FindDepot => find_depot(ctx, i),
        AiState::VerifyRoute => verify_route(ctx, i),
        AiState::BuildStation => build_station(ctx, i),
        AiState::BuildPath => build_path(ctx, i),
        AiState::BuildDepot => build_depot(ctx, i),
        AiState::BuildVehicle => build_vehicle(ctx, i),
        AiState::GiveOrders => give_orders(ctx, i),
        AiState::StartVehicle => start_vehicle(ctx, i),
        AiState::RepayMoney => repay_money(ctx, i),
        AiState::CheckAllVehicles => check_all_vehicles(ctx, i),
        AiState::ActionDone => {
            ctx.ai[i].idle = 100 + ctx.rng.range(300);
            ctx.ai[i].state = AiState::Nothing;
        }
    }
}

fn back_to_nothing(ctx: &mut SimulationContext, i: usize) {
    let ai = &mut ctx.ai[i];
    ai.state = AiState::Nothing;
    ai.idle = 60 + (ai.counter as u32) * 40;
}

fn wake_up(ctx: &mut SimulationContext, i: usize) {
    let player = ctx.ai[i].player;
    let money = ctx.world.player(player).money;
    let loan = ctx.world.player(player).current_loan;

    if money > 50_000 && loan > 0 {
        ctx.ai[i].state = AiState::RepayMoney;
        return;
    }
    if ctx.rng.chance(1, 8) {
        ctx.ai[i].state = AiState::CheckAllVehicles;
        return;
    }

    // Pick a transport flavour; disabled flavours stay disabled.
    let roadveh_disabled = ctx.world.settings.ai_disable_veh_roadveh;
    if roadveh_disabled {
        back_to_nothing(ctx, i);
        return;
    }
    let truck = ctx.rng.chance(1, 3);
    ctx.ai[i].route_kind = if truck {
        RouteKind::Truck
    } else {
        RouteKind::Bus
    };
    ctx.ai[i].counter = 0;
    ctx.ai[i].state = AiState::LocateRoute;
}

fn town_recently_served(
    ctx: &SimulationContext,
    ai: &AiPlayer,
    town: TownId,
) -> bool {
    let date = ctx.world.calendar.date;
    ai.blocked_towns
        .iter()
        .any(|&(t, d)| t == town && date < d + NEW_STATION_BLOCK_DAYS)
}

fn locate_route(ctx: &mut SimulationContext, i: usize) {
    let tries = {
        let ai = &mut ctx.ai[i];
        ai.counter += 1;
        ai.counter
    };
    if tries > AI_MAX_TRIES_FOR_SAME_ROUTE {
        back_to_nothing(ctx, i);
        return;
    }

    match ctx.ai[i].route_kind {
        RouteKind::Bus => {
            if ctx.world.towns.len() < 2 {
                back_to_nothing(ctx, i);
                return;
            }
            let n = ctx.world.towns.len();
            let a = ctx.rng.range(n as u32) as usize;
            let b = ctx.rng.range(n as u32) as usize;
            if a == b {
                return;
            }
            let (from, to) = (&ctx.world.towns[a], &ctx.world.towns[b]);
            if from.road_build_months != 0 || to.road_build_months != 0 {
                return;
            }
            if from.pct_pass_transported >= 60
                || to.pct_pass_transported >= 60
            {
                // Somebody is already carrying these passengers.
                return;
            }
            if town_recently_served(ctx, &ctx.ai[i], from.id)
                || town_recently_served(ctx, &ctx.ai[i], to.id)
            {
                return;
            }
            let max_cargo = from.max_pass + to.max_pass;
            let dist =
                ctx.world.grid.distance_manhattan(from.xy, to.xy);
            if dist < 5
                || dist
                    > max_cargo * BUS_CARGO_DISTANCE_NUM
                        / BUS_CARGO_DISTANCE_DEN
            {
                return;
            }
            let ai = &mut ctx.ai[i];
            ai.cargo = CargoKind::Passengers;
            ai.from_xy = ctx.world.towns[a].xy;
            ai.to_xy = ctx.world.towns[b].xy;
            // Rough fleet size from the expected traffic.
            ai.amount_veh =
                ((max_cargo / 60).clamp(1, 5)) as u8;
            ai.state = AiState::FindStation;
            debug!(
                "computer player {} plans a bus route over {} tiles",
                ai.player.0, dist
            );
        }
        RouteKind::Truck => {
            if ctx.world.industries.len() < 2 {
                back_to_nothing(ctx, i);
                return;
            }
            let n = ctx.world.industries.len();
            let a = ctx.rng.range(n as u32) as usize;
            let b = ctx.rng.range(n as u32) as usize;
            if a == b {
                return;
            }
            let (from, to) =
                (&ctx.world.industries[a], &ctx.world.industries[b]);
            let Some(cargo) = from.produced_cargo[0] else {
                return;
            };
            if !to.accepts_cargo.iter().any(|&c| c == Some(cargo)) {
                return;
            }
            if from.pct_transported[0] >= 60 {
                return;
            }
            let max_cargo = from.production_rate[0] as u32 * 2;
            let dist =
                ctx.world.grid.distance_manhattan(from.xy, to.xy);
            if dist < TRUCK_MIN_DISTANCE
                || dist
                    > max_cargo * BUS_CARGO_DISTANCE_NUM
                        / BUS_CARGO_DISTANCE_DEN
            {
                return;
            }
            let ai = &mut ctx.ai[i];
            ai.cargo = cargo;
            ai.from_xy = ctx.world.industries[a].xy;
            ai.to_xy = ctx.world.industries[b].xy;
            ai.amount_veh = ((max_cargo / 50).clamp(1, 4)) as u8;
            ai.state = AiState::FindStation;
        }
    }
}

/// A stop needs a flat clear tile with a road-capable neighbour to open
/// onto; query-cost confirms the build before it is committed to.
fn find_stop_site(
    ctx: &mut SimulationContext,
    centre: TileIndex,
    kind: RoadStopKind,
) -> Option<(TileIndex, DiagDirection)> {
    let grid_size = 4i32;
    for dy in -grid_size..=grid_size {
        for dx in -grid_size..=grid_size {
            let Some(tile) =
                ctx.world.grid.add_wrapped(centre, dx, dy)
            else {
                continue;
            };
            for d in 0..4u8 {
                let dir = DiagDirection::from_u8(d).unwrap();
                let Some(mouth) = ctx.world.grid.neighbour(tile, dir)
                else {
                    continue;
                };
                if !road_buildable(ctx, mouth) {
                    continue;
                }
                let ok = do_command(
                    ctx,
                    tile,
                    dir as u32,
                    (kind == RoadStopKind::Truck) as u32,
                    CommandFlags::QUERY_COST,
                    CommandId::BuildRoadStop,
                )
                .is_ok();
                if ok {
                    return Some((tile, dir));
                }
            }
        }
    }
    None
}

fn find_station(ctx: &mut SimulationContext, i: usize) {
    let kind = match ctx.ai[i].route_kind {
        RouteKind::Bus => RoadStopKind::Bus,
        RouteKind::Truck => RoadStopKind::Truck,
    };
    let (from_xy, to_xy) = (ctx.ai[i].from_xy, ctx.ai[i].to_xy);
    let Some((from_stop, from_dir)) = find_stop_site(ctx, from_xy, kind)
    else {
        back_to_nothing(ctx, i);
        return;
    };
    let Some((to_stop, to_dir)) = find_stop_site(ctx, to_xy, kind) else {
        back_to_nothing(ctx, i);
        return;
    };
    let ai = &mut ctx.ai[i];
    ai.from_stop = from_stop;
    ai.from_dir = from_dir;
    ai.to_stop = to_stop;
    ai.to_dir = to_dir;
    ai.planner.started = false;
    ai.state = AiState::FindPath;
}

fn find_path(ctx: &mut SimulationContext, i: usize) {
    let (from, from_dir, to, to_dir) = {
        let ai = &ctx.ai[i];
        (ai.from_stop, ai.from_dir, ai.to_stop, ai.to_dir)
    };
    if !ctx.ai[i].planner.started {
        let start = ctx.world.grid.neighbour(from, from_dir);
        let goal = ctx.world.grid.neighbour(to, to_dir);
        let (Some(start), Some(goal)) = (start, goal) else {
            back_to_nothing(ctx, i);
            return;
        };
        let mut planner = std::mem::take(&mut ctx.ai[i].planner);
        planner.start(start, goal);
        ctx.ai[i].planner = planner;
        return;
    }
    let mut planner = std::mem::take(&mut ctx.ai[i].planner);
    let result = planner.step(ctx, PATH_NODES_PER_TICK);
    let exhausted = planner.open.is_empty();
    ctx.ai[i].planner = planner;
    match result {
        Some(path) => {
            ctx.ai[i].path = path;
            ctx.ai[i].state = AiState::FindDepot;
        }
        None if exhausted => {
            debug!("computer player {} found no road path", ctx.ai[i].player.0);
            back_to_nothing(ctx, i);
        }
        None => {
            // Still busy; resume next wake-up.
        }
    }
}

fn find_depot(ctx: &mut SimulationContext, i: usize) {
    let path = ctx.ai[i].path.clone();
    if path.is_empty() {
        back_to_nothing(ctx, i);
        return;
    }
    // Scan the laid path from its midpoint outward for a flat side tile.
    let mid = path.len() / 2;
    let order: Vec<usize> = (0..path.len())
        .map(|k| {
            if k % 2 == 0 {
                mid.saturating_sub(k / 2)
            } else {
                (mid + k / 2 + 1).min(path.len() - 1)
            }
        })
        .collect();
    for idx in order {
        let on_path = path[idx];
        for d in 0..4u8 {
            let dir = DiagDirection::from_u8(d).unwrap();
            let Some(side) = ctx.world.grid.neighbour(on_path, dir)
            else {
                continue;
            };
            if path.contains(&side) {
                continue;
            }
            let ok = do_command(
                ctx,
                side,
                dir.reverse() as u32,
                0,
                CommandFlags::QUERY_COST,
                CommandId::BuildRoadDepot,
            )
            .is_ok();
            if ok {
                let ai = &mut ctx.ai[i];
                ai.depot_tile = side;
                ai.depot_dir = dir.reverse();
                ai.state = AiState::VerifyRoute;
                return;
            }
        }
    }
    back_to_nothing(ctx, i);
}

fn route_costs(ctx: &mut SimulationContext, i: usize) -> Option<Money> {
    let ai_snapshot = {
        let ai = &ctx.ai[i];
        (
            ai.from_stop,
            ai.from_dir,
            ai.to_stop,
            ai.to_dir,
            ai.depot_tile,
            ai.depot_dir,
            ai.path.clone(),
            ai.route_kind,
            ai.amount_veh,
        )
    };
    let (from_stop, from_dir, to_stop, to_dir, depot, depot_dir, path, kind, amount) =
        ai_snapshot;
    let mut total: Money = 0;
    let truck = (kind == RouteKind::Truck) as u32;
    total += do_command(
        ctx,
        from_stop,
        from_dir as u32,
        truck,
        CommandFlags::QUERY_COST,
        CommandId::BuildRoadStop,
    )
    .ok()?;
    total += do_command(
        ctx,
        to_stop,
        to_dir as u32,
        truck,
        CommandFlags::QUERY_COST,
        CommandId::BuildRoadStop,
    )
    .ok()?;
    total += do_command(
        ctx,
        depot,
        depot_dir as u32,
        0,
        CommandFlags::QUERY_COST,
        CommandId::BuildRoadDepot,
    )
    .ok()?;
    // Per-tile road pieces along the path.
    for pair in path.windows(2) {
        for (tile, other) in [(pair[0], pair[1]), (pair[1], pair[0])] {
            let bits = piece_towards(ctx, tile, other);
            match do_command(
                ctx,
                tile,
                bits.0 as u32,
                0,
                CommandFlags::QUERY_COST,
                CommandId::BuildRoad,
            ) {
                Ok(c) => total += c,
                Err(CommandError::AlreadyBuilt) => {}
                Err(_) => return None,
            }
        }
    }
    let engine_id = engine_for(kind);
    let unit_cost =
        tycworld::engine::engine(engine_id).base_cost;
    total += unit_cost * amount as Money;
    Some(total)
}

fn piece_towards(
    ctx: &SimulationContext,
    tile: TileIndex,
    other: TileIndex,
) -> road::RoadBits {
    let grid = &ctx.world.grid;
    let dx = grid.tile_x(other) as i32 - grid.tile_x(tile) as i32;
    let dy = grid.tile_y(other) as i32 - grid.tile_y(tile) as i32;
    match (dx, dy) {
        (-1, 0) => road::RoadBits::NE,
        (1, 0) => road::RoadBits::SW,
        (0, 1) => road::RoadBits::SE,
        (0, -1) => road::RoadBits::NW,
        _ => road::RoadBits(0),
    }
}

fn engine_for(kind: RouteKind) -> tycworld::EngineId {
    match kind {
        RouteKind::Bus => tycworld::EngineId(8),
        RouteKind::Truck => tycworld::EngineId(9),
    }
}

fn verify_route(ctx: &mut SimulationContext, i: usize) {
    let Some(total) = route_costs(ctx, i) else {
        back_to_nothing(ctx, i);
        return;
    };
    ctx.ai[i].new_cost = total;
    let player = ctx.ai[i].player;
    let mut money = ctx.world.player(player).money;
    // Borrow up to the ceiling rather than abandon a viable route.
    while total > money - AI_MINIMUM_MONEY {
        if do_command(
            ctx,
            TileIndex(0),
            0,
            0,
            CommandFlags::EXEC,
            CommandId::IncreaseLoan,
        )
        .is_err()
        {
            break;
        }
        money = ctx.world.player(player).money;
    }
    if total > money - AI_MINIMUM_MONEY {
        debug!(
            "computer player {} cannot afford route ({} > {})",
            player.0, total, money
        );
        back_to_nothing(ctx, i);
        return;
    }
    ctx.ai[i].state = AiState::BuildStation;
}

fn teardown(ctx: &mut SimulationContext, i: usize) {
    // Remove whichever stops were already placed.
    for tile in [ctx.ai[i].from_stop, ctx.ai[i].to_stop] {
        if station::is_road_stop_tile(&ctx.world.grid, tile) {
            let _ = do_command(
                ctx,
                tile,
                0,
                0,
                CommandFlags::EXEC,
                CommandId::LandscapeClear,
            );
        }
    }
    back_to_nothing(ctx, i);
}

fn build_station(ctx: &mut SimulationContext, i: usize) {
    let truck = (ctx.ai[i].route_kind == RouteKind::Truck) as u32;
    let (from_stop, from_dir, to_stop, to_dir) = {
        let ai = &ctx.ai[i];
        (ai.from_stop, ai.from_dir, ai.to_stop, ai.to_dir)
    };
    for (tile, dir) in [(from_stop, from_dir), (to_stop, to_dir)] {
        if do_command(
            ctx,
            tile,
            dir as u32,
            truck,
            CommandFlags::EXEC | CommandFlags::AI_BUILDING,
            CommandId::BuildRoadStop,
        )
        .is_err()
        {
            teardown(ctx, i);
            return;
        }
    }
    // Towns around the new stops are off the menu for a while.
    let date = ctx.world.calendar.date;
    let towns: Vec<TownId> = ctx
        .world
        .towns
        .iter()
        .filter(|t| {
            ctx.world.grid.distance_manhattan(t.xy, from_stop) < 10
                || ctx.world.grid.distance_manhattan(t.xy, to_stop) < 10
        })
        .map(|t| t.id)
        .collect();
    for t in towns {
        ctx.ai[i].blocked_towns.push((t, date));
    }
    ctx.ai[i].state = AiState::BuildPath;
}

fn build_path(ctx: &mut SimulationContext, i: usize) {
    let path = ctx.ai[i].path.clone();
    for pair in path.windows(2) {
        for (tile, other) in [(pair[0], pair[1]), (pair[1], pair[0])] {
            let bits = piece_towards(ctx, tile, other);
            match do_command(
                ctx,
                tile,
                bits.0 as u32,
                0,
                CommandFlags::EXEC | CommandFlags::AI_BUILDING,
                CommandId::BuildRoad,
            ) {
                Ok(_) | Err(CommandError::AlreadyBuilt) => {}
                Err(e) => {
                    debug!("road build failed: {}", e);
                    teardown(ctx, i);
                    return;
                }
            }
        }
    }
    // Connect the stops themselves to the path.
    let (from_stop, from_dir, to_stop, to_dir) = {
        let ai = &ctx.ai[i];
        (ai.from_stop, ai.from_dir, ai.to_stop, ai.to_dir)
    };
    for (stop, dir) in [(from_stop, from_dir), (to_stop, to_dir)] {
        if let Some(mouth) = ctx.world.grid.neighbour(stop, dir) {
            let bits = piece_towards(ctx, mouth, stop);
            let _ = do_command(
                ctx,
                mouth,
                bits.0 as u32,
                0,
                CommandFlags::EXEC | CommandFlags::AI_BUILDING,
                CommandId::BuildRoad,
            );
        }
    }
    ctx.ai[i].state = AiState::BuildDepot;
}

fn build_depot(ctx: &mut SimulationContext, i: usize) {
    let (tile, dir) = (ctx.ai[i].depot_tile, ctx.ai[i].depot_dir);
    if do_command(
        ctx,
        tile,
        dir as u32,
        0,
        CommandFlags::EXEC | CommandFlags::AI_BUILDING,
        CommandId::BuildRoadDepot,
    )
    .is_err()
    {
        teardown(ctx, i);
        return;
    }
    // The depot mouth needs tarmac too.
    if let Some(mouth) = ctx.world.grid.neighbour(tile, dir) {
        let bits = piece_towards(ctx, mouth, tile);
        let _ = do_command(
            ctx,
            mouth,
            bits.0 as u32,
            0,
            CommandFlags::EXEC | CommandFlags::AI_BUILDING,
            CommandId::BuildRoad,
        );
    }
    ctx.ai[i].cur_veh = 0;
    ctx.ai[i].built_vehicles.clear();
    ctx.ai[i].last_vehicle_tick = 0;
    ctx.ai[i].state = AiState::BuildVehicle;
}

fn build_vehicle(ctx: &mut SimulationContext, i: usize) {
    // Purchases are rate limited so the fleet trickles onto the route.
    let tick = ctx.ai[i].tick;
    if tick < ctx.ai[i].last_vehicle_tick + AI_BUILD_VEHICLE_TIME_BETWEEN
        && ctx.ai[i].cur_veh > 0
    {
        return;
    }
    let engine_id = engine_for(ctx.ai[i].route_kind);
    let depot = ctx.ai[i].depot_tile;
    let before: Vec<VehicleId> = ctx.world.vehicles.iter_ids().collect();
    match do_command(
        ctx,
        depot,
        engine_id.0 as u32,
        0,
        CommandFlags::EXEC,
        CommandId::BuildRoadVeh,
    ) {
        Ok(_) => {
            let new = ctx
                .world
                .vehicles
                .iter_ids()
                .find(|id| !before.contains(id));
            if let Some(id) = new {
                ctx.ai[i].built_vehicles.push(id);
            }
            ctx.ai[i].cur_veh += 1;
            ctx.ai[i].last_vehicle_tick = tick;
            if ctx.ai[i].cur_veh >= ctx.ai[i].amount_veh {
                ctx.ai[i].state = AiState::GiveOrders;
            }
        }
        Err(e) => {
            debug!("vehicle purchase failed: {}", e);
            if ctx.ai[i].built_vehicles.is_empty() {
                teardown(ctx, i);
            } else {
                ctx.ai[i].state = AiState::GiveOrders;
            }
        }
    }
}

fn give_orders(ctx: &mut SimulationContext, i: usize) {
    let (from_stop, to_stop, kind) = {
        let ai = &ctx.ai[i];
        (ai.from_stop, ai.to_stop, ai.route_kind)
    };
    let from_station =
        station::station_id_at(&ctx.world.grid, from_stop);
    let to_station = station::station_id_at(&ctx.world.grid, to_stop);
    let full_load_flags = if kind == RouteKind::Truck {
        OrderFlags::FULL_LOAD.0
    } else {
        0
    };
    let vehicles = ctx.ai[i].built_vehicles.clone();
    for v in vehicles {
        let orders = [
            (from_station, full_load_flags),
            (to_station, 0u8),
        ];
        for (idx, (st, flags)) in orders.iter().enumerate() {
            let p2 = st.0 as u32 | (1 << 16) | ((*flags as u32) << 24);
            let _ = do_command(
                ctx,
                from_stop,
                v.0 as u32 | ((idx as u32) << 16),
                p2,
                CommandFlags::EXEC,
                CommandId::InsertOrder,
            );
        }
    }
    ctx.ai[i].state = AiState::StartVehicle;
}

fn start_vehicle(ctx: &mut SimulationContext, i: usize) {
    let vehicles = ctx.ai[i].built_vehicles.clone();
    for v in vehicles {
        let _ = do_command(
            ctx,
            TileIndex(0),
            v.0 as u32,
            0,
            CommandFlags::EXEC,
            CommandId::StartStopRoadVeh,
        );
    }
    let (from, to) = (ctx.ai[i].from_stop, ctx.ai[i].to_stop);
    info!(
        "computer player {} opened a route between {:?} and {:?}",
        ctx.ai[i].player.0, from, to
    );
    ctx.ai[i].state = AiState::ActionDone;
}

fn repay_money(ctx: &mut SimulationContext, i: usize) {
    let player = ctx.ai[i].player;
    loop {
        let p = ctx.world.player(player);
        if p.current_loan == 0
            || p.money
                < AI_MINIMUM_MONEY + tycworld::player::LOAN_INTERVAL
        {
            break;
        }
        if do_command(
            ctx,
            TileIndex(0),
            0,
            0,
            CommandFlags::EXEC,
            CommandId::DecreaseLoan,
        )
        .is_err()
        {
            break;
        }
    }
    ctx.ai[i].state = AiState::ActionDone;
}

/// The periodic fleet review: old unprofitable or unreliable vehicles are
/// sent home and sold when they arrive.
fn check_all_vehicles(ctx: &mut SimulationContext, i: usize) {
    let player = ctx.ai[i].player;
    let ids: Vec<VehicleId> = ctx
        .world
        .vehicles
        .iter_ids()
        .filter(|&id| {
            let v = ctx.world.vehicles.get(id);
            v.owner == player && v.kind() == Some(VehicleKind::Road)
        })
        .collect();
    for id in ids {
        let v = ctx.world.vehicles.get(id);
        let in_depot = v.road().state
            == tycworld::vehicle::RV_STATE_IN_DEPOT;
        let old_enough = v.age_days > 360;
        let unprofitable =
            v.profit_last_year + v.profit_this_year < 100;
        let unreliable = v.reliability < 0x6666; // below 40%
        if in_depot && v.is_stopped() && old_enough {
            let _ = do_command(
                ctx,
                TileIndex(0),
                id.0 as u32,
                0,
                CommandFlags::EXEC,
                CommandId::SellRoadVeh,
            );
        } else if old_enough && (unprofitable || unreliable) {
            let _ = do_command(
                ctx,
                TileIndex(0),
                id.0 as u32,
                0,
                CommandFlags::EXEC,
                CommandId::SendRoadVehToDepot,
            );
        }
    }
    ctx.ai[i].state = AiState::ActionDone;
}
