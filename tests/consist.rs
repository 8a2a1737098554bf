//! Consist cache and reversal invariants.

use rusty_tycoon::prelude::*;
use tycworld::engine::engine;

mod common;
use common::{add_coaches, cmd, engine_in_depot, rail_line};

fn chain_of(sim: &SimulationContext, head: VehicleId) -> Vec<VehicleId> {
    let mut out = vec![head];
    let mut cur = head;
    while let Some(next) = sim.world.vehicles.get(cur).next {
        out.push(next);
        cur = next;
    }
    out
}

#[test]
fn cached_totals_follow_attach_and_detach() {
    let mut sim = common::new_sim();
    rail_line(&mut sim, 40, 20, 30);
    let head = engine_in_depot(&mut sim, 19, 40);
    add_coaches(&mut sim, head, 3);

    let chain = chain_of(&sim, head);
    assert_eq!(chain.len(), 4);

    let total_len: u16 = chain
        .iter()
        .map(|&c| {
            sim.world.vehicles.get(c).train().cached_veh_length as u16
        })
        .sum();
    let head_v = sim.world.vehicles.get(head);
    assert_eq!(head_v.train().cached_total_length, total_len);

    // Every car carries the same snapshot as the head.
    for &c in &chain {
        let t = sim.world.vehicles.get(c).train();
        assert_eq!(t.cached_total_length, total_len);
        assert_eq!(
            t.cached_power,
            engine(head_v.engine).power as u32
        );
    }

    // The consist is capped by the slowest member with a limit.
    let engine_speed = engine(head_v.engine).max_speed;
    assert_eq!(head_v.train().cached_max_speed, engine_speed);

    // Selling one coach shrinks the totals again.
    let victim = chain[2];
    let depot = sim.world.vehicles.get(head).tile;
    cmd(
        &mut sim,
        depot,
        victim.0 as u32,
        0,
        CommandId::SellRailVehicle,
    );
    let chain = chain_of(&sim, head);
    assert_eq!(chain.len(), 3);
    let new_total: u16 = chain
        .iter()
        .map(|&c| {
            sim.world.vehicles.get(c).train().cached_veh_length as u16
        })
        .sum();
    assert_eq!(
        sim.world.vehicles.get(head).train().cached_total_length,
        new_total
    );
    assert!(new_total < total_len);
}

#[test]
fn double_reversal_restores_the_standing_train() {
    let mut sim = common::new_sim();
    rail_line(&mut sim, 40, 10, 60);
    let head = engine_in_depot(&mut sim, 9, 40);
    add_coaches(&mut sim, head, 3);
    common::start(&mut sim, head);

    // Drive out onto the open line.
    sim.run_ticks(74 * 4);
    let out = sim.world.vehicles.get(head);
    assert!(
        !out.train().in_depot(),
        "train should have left the depot"
    );

    // Halt it, then reverse twice: everything must line up again.
    {
        let v = sim.world.vehicles.get_mut(head);
        v.flags.set(tycworld::VehicleFlags::STOPPED);
        v.cur_speed = 0;
        v.subspeed = 0;
    }
    let chain = chain_of(&sim, head);
    let before: Vec<_> = chain
        .iter()
        .map(|&c| {
            let v = sim.world.vehicles.get(c);
            (v.tile, v.x_pos, v.y_pos, v.direction, v.train().track)
        })
        .collect();

    cmd(
        &mut sim,
        TileIndex(0),
        head.0 as u32,
        0,
        CommandId::ReverseTrainDirection,
    );
    cmd(
        &mut sim,
        TileIndex(0),
        head.0 as u32,
        0,
        CommandId::ReverseTrainDirection,
    );

    let after: Vec<_> = chain
        .iter()
        .map(|&c| {
            let v = sim.world.vehicles.get(c);
            (v.tile, v.x_pos, v.y_pos, v.direction, v.train().track)
        })
        .collect();
    assert_eq!(before, after);
}

#[test]
fn mixed_length_consist_keeps_its_total_through_reversal() {
    let mut sim = common::new_sim();
    rail_line(&mut sim, 40, 10, 60);
    let head = engine_in_depot(&mut sim, 9, 40);
    // Long coaches and short vans mixed, like a length-imbalanced set.
    add_coaches(&mut sim, head, 2);
    let depot = sim.world.vehicles.get(head).tile;
    for _ in 0..3 {
        let before: Vec<VehicleId> =
            sim.world.vehicles.iter_ids().collect();
        cmd(&mut sim, depot, 7, 0, CommandId::BuildRailVehicle);
        let van = sim
            .world
            .vehicles
            .iter_ids()
            .find(|id| !before.contains(id))
            .unwrap();
        cmd(
            &mut sim,
            depot,
            van.0 as u32 | ((head.0 as u32) << 16),
            0,
            CommandId::MoveRailVehicle,
        );
    }
    common::start(&mut sim, head);
    sim.run_ticks(74 * 6);

    let total_before =
        sim.world.vehicles.get(head).train().cached_total_length;
    {
        let v = sim.world.vehicles.get_mut(head);
        v.flags.set(tycworld::VehicleFlags::STOPPED);
        v.cur_speed = 0;
    }
    cmd(
        &mut sim,
        TileIndex(0),
        head.0 as u32,
        0,
        CommandId::ReverseTrainDirection,
    );
    assert_eq!(
        sim.world.vehicles.get(head).train().cached_total_length,
        total_before
    );
}
