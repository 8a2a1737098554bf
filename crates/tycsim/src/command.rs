//! The command dispatcher.
//!
//! Every mutation of shared state is a command: a uniform signature, a cost
//! (or one error), and a flag deciding whether anything durable actually
//! changes. Querying the cost of a command and then executing it must
//! yield the identical cost or the identical error.

use tycmap::TileIndex;
use tycworld::{CommandError, Money};

use crate::context::SimulationContext;
use crate::{
    cmd_order, cmd_player, cmd_rail, cmd_road, cmd_station, cmd_terrain,
    cmd_vehicle,
};

/// Execution flags. Without [`CommandFlags::EXEC`] a command only prices
/// itself and must not write any durable state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandFlags(pub u8);

impl CommandFlags {
    /// Actually mutate.
    pub const EXEC: CommandFlags = CommandFlags(0x01);
    /// Relax town-rating checks for computer players.
    pub const AI_BUILDING: CommandFlags = CommandFlags(0x02);
    /// Refuse clears that would run in water.
    pub const NO_WATER: CommandFlags = CommandFlags(0x04);
    /// Refuse rail builds that overlap existing track.
    pub const NO_RAIL_OVERLAP: CommandFlags = CommandFlags(0x08);
    /// Pure cost query; the canonical spelling of "no flags".
    pub const QUERY_COST: CommandFlags = CommandFlags(0);

    pub fn has(self, flag: CommandFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn is_exec(self) -> bool {
        self.has(Self::EXEC)
    }

    pub fn without_exec(self) -> CommandFlags {
        CommandFlags(self.0 & !Self::EXEC.0)
    }
}

impl std::ops::BitOr for CommandFlags {
    type Output = CommandFlags;
    fn bitor(self, rhs: CommandFlags) -> CommandFlags {
        CommandFlags(self.0 | rhs.0)
    }
}

/// Every command the engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    BuildSingleRail,
    RemoveSingleRail,
    BuildRailroadTrack,
    RemoveRailroadTrack,
    BuildTrainDepot,
    BuildTrainWaypoint,
    BuildSignals,
    RemoveSignals,
    BuildSignalTrack,
    RemoveSignalTrack,
    ConvertRail,
    BuildRoad,
    RemoveRoad,
    BuildLongRoad,
    RemoveLongRoad,
    BuildRoadDepot,
    LandscapeClear,
    BuildRailStation,
    BuildRoadStop,
    BuildDock,
    BuildBuoy,
    BuildShipDepot,
    BuildRailVehicle,
    BuildRoadVeh,
    BuildShip,
    BuildAircraft,
    SellRailVehicle,
    SellRoadVeh,
    SellShip,
    RefitVehicle,
    SendTrainToDepot,
    SendRoadVehToDepot,
    SendShipToDepot,
    MoveRailVehicle,
    CloneVehicle,
    CloneOrder,
    InsertOrder,
    DeleteOrder,
    SkipOrder,
    StartStopTrain,
    StartStopRoadVeh,
    StartStopShip,
    ReverseTrainDirection,
    ForceTrainProceed,
    NameVehicle,
    ChangeServiceInt,
    IncreaseLoan,
    DecreaseLoan,
}

/// Shipped construction prices.
pub mod price {
    use tycworld::Money;

    pub const BUILD_RAIL: Money = 200;
    pub const REMOVE_RAIL: Money = 120;
    pub const BUILD_SIGNALS: Money = 500;
    pub const REMOVE_SIGNALS: Money = 300;
    pub const BUILD_TRAIN_DEPOT: Money = 1_500;
    pub const BUILD_WAYPOINT: Money = 500;
    pub const CONVERT_RAIL: Money = 100;
    pub const BUILD_ROAD: Money = 150;
    pub const REMOVE_ROAD: Money = 100;
    pub const BUILD_ROAD_DEPOT: Money = 1_000;
    pub const CLEAR_TILE: Money = 100;
    pub const BUILD_RAIL_STATION_TILE: Money = 600;
    pub const BUILD_ROAD_STOP: Money = 800;
    pub const BUILD_DOCK: Money = 1_200;
    pub const BUILD_BUOY: Money = 400;
    pub const BUILD_SHIP_DEPOT: Money = 1_600;
}

/// Runs a nested command without the money bookkeeping; compound commands
/// use this so only the outermost call touches the player's balance.
pub(crate) fn sub_command(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
    cmd: CommandId,
) -> Result<Money, CommandError> {
    dispatch(ctx, tile, p1, p2, flags, cmd)
}

fn dispatch(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
    cmd: CommandId,
) -> Result<Money, CommandError> {
    use CommandId::*;
    match cmd {
        BuildSingleRail => cmd_rail::build_single_rail(ctx, tile, p1, p2, flags),
        RemoveSingleRail => {
            cmd_rail::remove_single_rail(ctx, tile, p1, p2, flags)
        }
        BuildRailroadTrack => {
            cmd_rail::build_railroad_track(ctx, tile, p1, p2, flags)
        }
        RemoveRailroadTrack => {
            cmd_rail::remove_railroad_track(ctx, tile, p1, p2, flags)
        }
        BuildTrainDepot => {
            cmd_rail::build_train_depot(ctx, tile, p1, p2, flags)
        }
        BuildTrainWaypoint => {
            cmd_rail::build_train_waypoint(ctx, tile, p1, p2, flags)
        }
        BuildSignals => cmd_rail::build_signals(ctx, tile, p1, p2, flags),
        RemoveSignals => cmd_rail::remove_signals(ctx, tile, p1, p2, flags),
        BuildSignalTrack => {
            cmd_rail::build_signal_track(ctx, tile, p1, p2, flags)
        }
        RemoveSignalTrack => {
            cmd_rail::remove_signal_track(ctx, tile, p1, p2, flags)
        }
        ConvertRail => cmd_rail::convert_rail(ctx, tile, p1, p2, flags),
        BuildRoad => cmd_road::build_road(ctx, tile, p1, p2, flags),
        RemoveRoad => cmd_road::remove_road(ctx, tile, p1, p2, flags),
        BuildLongRoad => cmd_road::build_long_road(ctx, tile, p1, p2, flags),
        RemoveLongRoad => {
            cmd_road::remove_long_road(ctx, tile, p1, p2, flags)
        }
        BuildRoadDepot => cmd_road::build_road_depot(ctx, tile, p1, p2, flags),
        LandscapeClear => {
            cmd_terrain::landscape_clear(ctx, tile, p1, p2, flags)
        }
        BuildRailStation => {
            cmd_station::build_rail_station(ctx, tile, p1, p2, flags)
        }
        BuildRoadStop => cmd_station::build_road_stop(ctx, tile, p1, p2, flags),
        BuildDock => cmd_station::build_dock(ctx, tile, p1, p2, flags),
        BuildBuoy => cmd_station::build_buoy(ctx, tile, p1, p2, flags),
        BuildShipDepot => {
            cmd_station::build_ship_depot(ctx, tile, p1, p2, flags)
        }
        BuildRailVehicle => {
            cmd_vehicle::build_rail_vehicle(ctx, tile, p1, p2, flags)
        }
        BuildRoadVeh => cmd_vehicle::build_road_veh(ctx, tile, p1, p2, flags),
        BuildShip => cmd_vehicle::build_ship(ctx, tile, p1, p2, flags),
        BuildAircraft => Err(CommandError::VehicleUnavailable),
        SellRailVehicle | SellRoadVeh | SellShip => {
            cmd_vehicle::sell_vehicle(ctx, tile, p1, p2, flags)
        }
        RefitVehicle => cmd_vehicle::refit_vehicle(ctx, tile, p1, p2, flags),
        SendTrainToDepot | SendRoadVehToDepot | SendShipToDepot => {
            cmd_vehicle::send_to_depot(ctx, tile, p1, p2, flags)
        }
        MoveRailVehicle => {
            cmd_vehicle::move_rail_vehicle(ctx, tile, p1, p2, flags)
        }
        CloneVehicle => cmd_vehicle::clone_vehicle(ctx, tile, p1, p2, flags),
        CloneOrder => cmd_order::clone_order(ctx, tile, p1, p2, flags),
        InsertOrder => cmd_order::insert_order(ctx, tile, p1, p2, flags),
        DeleteOrder => cmd_order::delete_order(ctx, tile, p1, p2, flags),
        SkipOrder => cmd_order::skip_order(ctx, tile, p1, p2, flags),
        StartStopTrain | StartStopRoadVeh | StartStopShip => {
            cmd_vehicle::start_stop_vehicle(ctx, tile, p1, p2, flags)
        }
        ReverseTrainDirection => {
            cmd_vehicle::reverse_train_direction(ctx, tile, p1, p2, flags)
        }
        ForceTrainProceed => {
            cmd_vehicle::force_train_proceed(ctx, tile, p1, p2, flags)
        }
        NameVehicle => cmd_vehicle::name_vehicle(ctx, tile, p1, p2, flags),
        ChangeServiceInt => {
            cmd_vehicle::change_service_int(ctx, tile, p1, p2, flags)
        }
        IncreaseLoan => cmd_player::increase_loan(ctx, tile, p1, p2, flags),
        DecreaseLoan => cmd_player::decrease_loan(ctx, tile, p1, p2, flags),
    }
}

/// Runs a command for the context's current player.
///
/// With `EXEC`, the command is priced first, checked against the player's
/// money, and only then executed; the committed cost is identical to the
/// queried one by construction.
pub fn do_command(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
    cmd: CommandId,
) -> Result<Money, CommandError> {
    if !flags.is_exec() {
        return dispatch(ctx, tile, p1, p2, flags, cmd);
    }

    let cost = dispatch(ctx, tile, p1, p2, flags.without_exec(), cmd)?;
    let player = ctx.current_player;
    if cost > 0 && !ctx.world.player(player).can_afford(cost) {
        return Err(CommandError::CannotAfford);
    }
    let spent = dispatch(ctx, tile, p1, p2, flags, cmd)?;
    debug_assert_eq!(cost, spent);
    ctx.world.player_mut(player).money -= spent;
    Ok(spent)
}
