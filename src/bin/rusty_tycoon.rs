use std::env::args;

use log::info;

use rusty_tycoon::prelude::*;

/// Builds a small two-town demo world with a rail shuttle and a computer
/// player, used when no scenario file is given.
fn demo_scenario() -> Scenario {
    use tycio::{Directive, TownDescr};

    let mut directives = Vec::new();
    let mut cmd = |player: u8, x: u32, y: u32, p1: u32, p2: u32, command: &str| {
        directives.push(Directive {
            player,
            x,
            y,
            p1,
            p2,
            command: command.into(),
        });
    };

    // A straight main line: depot, two platforms, track between them.
    let tile = |x: u32, y: u32| (y << 7) | x;
    cmd(0, 21, 40, 2 << 8, 0, "build_rail_station");
    cmd(0, 58, 40, 2 << 8, 0, "build_rail_station");
    cmd(0, 20, 40, tile(20, 40), 0, "build_railroad_track");
    cmd(0, 23, 40, tile(57, 40), 0, "build_railroad_track");
    cmd(0, 19, 40, 2, 0, "build_train_depot");
    cmd(0, 40, 40, 0, 0, "build_signals");
    // An engine with one coach, coupled in the depot.
    cmd(0, 19, 40, 1, 0, "build_rail_vehicle");
    cmd(0, 19, 40, 4, 0, "build_rail_vehicle");
    cmd(0, 19, 40, 1025 | (1024 << 16), 0, "move_rail_vehicle");
    // Shuttle orders between the two stations, then off it goes.
    cmd(0, 19, 40, 1024, 0 | (1 << 16), "insert_order");
    cmd(0, 19, 40, 1024 | (1 << 16), 1 | (1 << 16), "insert_order");
    cmd(0, 19, 40, 1024, 0, "start_stop_train");

    Scenario {
        name: "demo".into(),
        log_x: 7,
        log_y: 7,
        seed: 1979,
        towns: vec![
            TownDescr {
                name: "Northam".into(),
                x: 22,
                y: 36,
                population: 2400,
                max_pass: 300,
                max_mail: 40,
            },
            TownDescr {
                name: "Southbridge".into(),
                x: 60,
                y: 44,
                population: 1600,
                max_pass: 200,
                max_mail: 30,
            },
        ],
        ai_players: vec![1],
        ..Scenario::default()
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let mut args = args().skip(1);
    let scenario = match args.next() {
        Some(path) => match read_scenario(&path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("could not load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => demo_scenario(),
    };
    let ticks: u32 = args
        .next()
        .and_then(|t| t.parse().ok())
        .unwrap_or(74 * 30);

    let mut sim = match build_simulation(&scenario) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("could not build scenario: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "running {:?}: {}x{} tiles, {} ticks",
        scenario.name,
        sim.world.grid.size_x(),
        sim.world.grid.size_y(),
        ticks
    );

    for day in 0..ticks / 74 {
        sim.run_ticks(74);
        if day % 10 == 0 {
            info!("day {}: digest {:#018x}", day, sim.world.digest());
        }
    }
    sim.run_ticks(ticks % 74);

    info!("final digest {:#018x}", sim.world.digest());
    for player in &sim.world.players {
        if player.is_active {
            info!(
                "player {}: {} money, {} loan",
                player.id.0, player.money, player.current_loan
            );
        }
    }
}
