//! # Overview
//!
//! Scenario descriptions and their JSON form.
//!
//! A scenario names a map size, terrain touches, towns and industries,
//! a list of build directives replayed through the command dispatcher,
//! and the vehicles to seed. It is a construction recipe, not a savegame:
//! replaying it through commands is what guarantees the world is
//! reachable by ordinary play.

use serde::{Deserialize, Serialize};

use tycmap::TileIndex;
use tycsim::{do_command, CommandFlags, CommandId, SimulationContext};
use tycworld::{Industry, IndustryId, PlayerId, Town, TownId};

/// A whole scenario.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub log_x: u32,
    pub log_y: u32,
    pub seed: u32,
    #[serde(default)]
    pub heights: Vec<HeightPatch>,
    #[serde(default)]
    pub water: Vec<RectPatch>,
    #[serde(default)]
    pub towns: Vec<TownDescr>,
    #[serde(default)]
    pub industries: Vec<IndustryDescr>,
    #[serde(default)]
    pub ai_players: Vec<u8>,
    #[serde(default)]
    pub directives: Vec<Directive>,
}

/// Raises a rectangle of tiles to a height.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeightPatch {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub height: u8,
}

/// Floods a rectangle of tiles.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RectPatch {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TownDescr {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub population: u32,
    #[serde(default)]
    pub max_pass: u32,
    #[serde(default)]
    pub max_mail: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndustryDescr {
    pub x: u32,
    pub y: u32,
    pub produces: Option<u8>,
    pub production_rate: u16,
    #[serde(default)]
    pub accepts: Vec<u8>,
}

/// One command replayed at load: `(player, tile x/y, p1, p2, command)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Directive {
    pub player: u8,
    pub x: u32,
    pub y: u32,
    pub p1: u32,
    pub p2: u32,
    pub command: String,
}

fn command_by_name(name: &str) -> Option<CommandId> {
    use CommandId::*;
    Some(match name {
        "build_single_rail" => BuildSingleRail,
        "build_railroad_track" => BuildRailroadTrack,
        "build_train_depot" => BuildTrainDepot,
        "build_train_waypoint" => BuildTrainWaypoint,
        "build_signals" => BuildSignals,
        "build_signal_track" => BuildSignalTrack,
        "build_road" => BuildRoad,
        "build_long_road" => BuildLongRoad,
        "build_road_depot" => BuildRoadDepot,
        "build_rail_station" => BuildRailStation,
        "build_road_stop" => BuildRoadStop,
        "build_dock" => BuildDock,
        "build_buoy" => BuildBuoy,
        "build_ship_depot" => BuildShipDepot,
        "build_rail_vehicle" => BuildRailVehicle,
        "build_road_veh" => BuildRoadVeh,
        "build_ship" => BuildShip,
        "move_rail_vehicle" => MoveRailVehicle,
        "insert_order" => InsertOrder,
        "clone_order" => CloneOrder,
        "start_stop_train" => StartStopTrain,
        "start_stop_road_veh" => StartStopRoadVeh,
        "start_stop_ship" => StartStopShip,
        _ => return None,
    })
}

/// Errors a scenario load can hit.
#[derive(Debug)]
pub enum ScenarioError {
    Io(std::io::Error),
    Json(serde_json::Error),
    UnknownCommand(String),
    Command(tycworld::CommandError),
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::Io(e) => write!(f, "io error: {}", e),
            ScenarioError::Json(e) => write!(f, "bad scenario json: {}", e),
            ScenarioError::UnknownCommand(name) => {
                write!(f, "unknown command {:?}", name)
            }
            ScenarioError::Command(e) => {
                write!(f, "directive failed: {}", e)
            }
        }
    }
}

impl std::error::Error for ScenarioError {}

pub fn read_scenario(path: &str) -> Result<Scenario, ScenarioError> {
    let text = std::fs::read_to_string(path).map_err(ScenarioError::Io)?;
    serde_json::from_str(&text).map_err(ScenarioError::Json)
}

pub fn write_scenario(
    path: &str,
    scenario: &Scenario,
) -> Result<(), ScenarioError> {
    let text = serde_json::to_string_pretty(scenario)
        .map_err(ScenarioError::Json)?;
    std::fs::write(path, text).map_err(ScenarioError::Io)
}

/// Builds a fresh simulation from a scenario, replaying every directive.
pub fn build_simulation(
    scenario: &Scenario,
) -> Result<SimulationContext, ScenarioError> {
    let mut ctx =
        SimulationContext::new(scenario.log_x, scenario.log_y, scenario.seed);

    for patch in &scenario.heights {
        for y in patch.y..patch.y + patch.h {
            for x in patch.x..patch.x + patch.w {
                let tile = ctx.world.grid.tile_xy(x, y);
                if ctx.world.grid.is_inner(tile) {
                    ctx.world.grid.set_height(tile, patch.height);
                }
            }
        }
    }
    for patch in &scenario.water {
        for y in patch.y..patch.y + patch.h {
            for x in patch.x..patch.x + patch.w {
                let tile = ctx.world.grid.tile_xy(x, y);
                if ctx.world.grid.is_inner(tile) {
                    ctx.world.grid.set_kind(tile, tycmap::TileKind::Water);
                    ctx.world
                        .grid
                        .set_owner(tile, tycmap::Owner::Water);
                    ctx.world.grid.set_m5(tile, 0);
                }
            }
        }
    }
    for (i, descr) in scenario.towns.iter().enumerate() {
        let xy = ctx.world.grid.tile_xy(descr.x, descr.y);
        ctx.world.towns.push(Town {
            id: TownId(i as u16),
            xy,
            name: descr.name.clone(),
            population: descr.population,
            max_pass: if descr.max_pass != 0 {
                descr.max_pass
            } else {
                descr.population / 8
            },
            max_mail: descr.max_mail,
            pct_pass_transported: 0,
            road_build_months: 0,
        });
    }
    for (i, descr) in scenario.industries.iter().enumerate() {
        let xy = ctx.world.grid.tile_xy(descr.x, descr.y);
        let produces = descr.produces.and_then(cargo_by_index);
        let accepts: Vec<_> =
            descr.accepts.iter().filter_map(|&c| cargo_by_index(c)).collect();
        let mut accepts_arr = [None; 3];
        for (k, c) in accepts.into_iter().take(3).enumerate() {
            accepts_arr[k] = Some(c);
        }
        ctx.world.industries.push(Industry {
            id: IndustryId(i as u16),
            xy,
            produced_cargo: [produces, None],
            production_rate: [descr.production_rate, 0],
            pct_transported: [0, 0],
            accepts_cargo: accepts_arr,
        });
    }
    for &p in &scenario.ai_players {
        if (p as usize) < ctx.world.players.len() {
            ctx.world.players[p as usize].is_ai = true;
        }
    }

    for directive in &scenario.directives {
        let cmd = command_by_name(&directive.command).ok_or_else(|| {
            ScenarioError::UnknownCommand(directive.command.clone())
        })?;
        ctx.current_player = PlayerId(directive.player);
        let tile = if directive.x == u32::MAX {
            TileIndex(0)
        } else {
            ctx.world.grid.tile_xy(directive.x, directive.y)
        };
        do_command(
            &mut ctx,
            tile,
            directive.p1,
            directive.p2,
            CommandFlags::EXEC,
            cmd,
        )
        .map_err(ScenarioError::Command)?;
    }
    ctx.current_player = PlayerId(0);
    Ok(ctx)
}

fn cargo_by_index(index: u8) -> Option<tycworld::CargoKind> {
    use tycworld::CargoKind::*;
    Some(match index {
        0 => Passengers,
        1 => Mail,
        2 => Coal,
        3 => Goods,
        4 => Steel,
        5 => Grain,
        6 => Wood,
        7 => Oil,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Scenario {
        Scenario {
            name: "two towns".into(),
            log_x: 7,
            log_y: 7,
            seed: 42,
            towns: vec![
                TownDescr {
                    name: "Northam".into(),
                    x: 20,
                    y: 20,
                    population: 2400,
                    max_pass: 300,
                    max_mail: 40,
                },
                TownDescr {
                    name: "Southbridge".into(),
                    x: 90,
                    y: 30,
                    population: 1600,
                    max_pass: 200,
                    max_mail: 30,
                },
            ],
            directives: vec![Directive {
                player: 0,
                x: 40,
                y: 40,
                p1: 0,
                p2: 0,
                command: "build_single_rail".into(),
            }],
            ..Scenario::default()
        }
    }

    #[test]
    fn json_round_trip_preserves_the_scenario() {
        let scenario = sample();
        let text = serde_json::to_string(&scenario).unwrap();
        let back: Scenario = serde_json::from_str(&text).unwrap();
        assert_eq!(scenario, back);
    }

    #[test]
    fn build_replays_directives() {
        let ctx = build_simulation(&sample()).unwrap();
        let tile = ctx.world.grid.tile_xy(40, 40);
        assert!(tycworld::rail::is_plain_rail(&ctx.world.grid, tile));
        assert_eq!(ctx.world.towns.len(), 2);
    }
}
