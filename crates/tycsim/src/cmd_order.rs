//! Order management commands.

use tycmap::TileIndex;
use tycworld::{
    CommandError, Money, Order, OrderFlags, OrderKind, VehicleId,
};

use crate::command::CommandFlags;
use crate::context::SimulationContext;

fn unpack_order(p2: u32) -> Result<Order, CommandError> {
    let kind = match (p2 >> 16) & 0xFF {
        1 => OrderKind::GotoStation,
        2 => OrderKind::GotoDepot,
        3 => OrderKind::GotoWaypoint,
        _ => return Err(CommandError::VehicleUnavailable),
    };
    Ok(Order {
        kind,
        flags: OrderFlags(((p2 >> 24) & 0xFF) as u8),
        target: (p2 & 0xFFFF) as u16,
    })
}

fn own_vehicle(
    ctx: &SimulationContext,
    id: VehicleId,
) -> Result<(), CommandError> {
    let v = ctx.world.vehicles.get(id);
    if v.is_free() || v.owner != ctx.current_player {
        return Err(CommandError::VehicleUnavailable);
    }
    Ok(())
}

/// Inserts an order. `p1` holds the vehicle in the low half and the
/// insertion index in the high half; `p2` is the packed order.
pub fn insert_order(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId((p1 & 0xFFFF) as u16);
    let index = (p1 >> 16) as usize;
    own_vehicle(ctx, id)?;
    let order = unpack_order(p2)?;
    let head = ctx.world.vehicles.get(id).schedule;
    let len = ctx.world.orders.chain_len(head);
    if index > len {
        return Err(CommandError::TooManyOrders);
    }
    if len >= tycworld::order::MAX_ORDERS {
        return Err(CommandError::TooManyOrders);
    }
    if flags.is_exec() {
        let new_head = ctx.world.orders.insert(head, index, order)?;
        update_shared_heads(ctx, id, new_head, 1);
        let v = ctx.world.vehicles.get_mut(id);
        if index <= v.cur_order_index as usize && len > 0 {
            v.cur_order_index += 1;
        }
    }
    Ok(0)
}

/// Deletes an order. `p1` is the vehicle, `p2` the index.
pub fn delete_order(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    let index = p2 as usize;
    own_vehicle(ctx, id)?;
    let head = ctx.world.vehicles.get(id).schedule;
    let len = ctx.world.orders.chain_len(head);
    if index >= len {
        return Err(CommandError::VehicleUnavailable);
    }
    if flags.is_exec() {
        let new_head = ctx.world.orders.delete(head, index);
        update_shared_heads(ctx, id, new_head, -1);
        let v = ctx.world.vehicles.get_mut(id);
        if (index as u8) < v.cur_order_index {
            v.cur_order_index -= 1;
        }
        if v.cur_order_index as usize >= len.saturating_sub(1) {
            v.cur_order_index = 0;
        }
    }
    Ok(0)
}

/// Propagates a new chain head (and count change) around the shared ring.
fn update_shared_heads(
    ctx: &mut SimulationContext,
    id: VehicleId,
    head: Option<tycworld::OrderId>,
    delta: i32,
) {
    let mut members = vec![id];
    let mut cur = ctx.world.vehicles.get(id).next_shared;
    while let Some(n) = cur {
        if n == id {
            break;
        }
        members.push(n);
        cur = ctx.world.vehicles.get(n).next_shared;
    }
    let mut cur = ctx.world.vehicles.get(id).prev_shared;
    while let Some(n) = cur {
        if n == id || members.contains(&n) {
            break;
        }
        members.push(n);
        cur = ctx.world.vehicles.get(n).prev_shared;
    }
    for m in members {
        let v = ctx.world.vehicles.get_mut(m);
        v.schedule = head;
        v.num_orders = (v.num_orders as i32 + delta).max(0) as u8;
    }
}

/// Advances a vehicle to its next order. `p1` is the vehicle.
pub fn skip_order(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let id = VehicleId(p1 as u16);
    own_vehicle(ctx, id)?;
    if flags.is_exec() {
        let v = ctx.world.vehicles.get_mut(id);
        if v.num_orders > 0 {
            v.cur_order_index = (v.cur_order_index + 1) % v.num_orders;
        }
        v.current_order = Order::default();
    }
    Ok(0)
}

/// Copies (or shares) the schedule of one vehicle onto another.
/// `p1` holds destination low, source high; `p2 = 1` shares.
pub fn clone_order(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    p1: u32,
    p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let dst = VehicleId((p1 & 0xFFFF) as u16);
    let src = VehicleId((p1 >> 16) as u16);
    own_vehicle(ctx, dst)?;
    own_vehicle(ctx, src)?;
    if !flags.is_exec() {
        return Ok(0);
    }
    clone_order_between(ctx, dst, src, p2 == 1)?;
    Ok(0)
}

/// The worker behind order cloning; also used by vehicle cloning.
pub(crate) fn clone_order_between(
    ctx: &mut SimulationContext,
    dst: VehicleId,
    src: VehicleId,
    share: bool,
) -> Result<(), CommandError> {
    crate::cmd_vehicle::release_orders(ctx, dst);
    let (src_head, src_count) = {
        let v = ctx.world.vehicles.get(src);
        (v.schedule, v.num_orders)
    };
    if share {
        // Splice dst into the ring right after src.
        let src_next = ctx.world.vehicles.get(src).next_shared;
        {
            let v = ctx.world.vehicles.get_mut(dst);
            v.schedule = src_head;
            v.num_orders = src_count;
            v.prev_shared = Some(src);
            v.next_shared = src_next;
        }
        ctx.world.vehicles.get_mut(src).next_shared = Some(dst);
        if let Some(n) = src_next {
            ctx.world.vehicles.get_mut(n).prev_shared = Some(dst);
        }
    } else {
        let copy = ctx.world.orders.clone_chain(src_head)?;
        let v = ctx.world.vehicles.get_mut(dst);
        v.schedule = copy;
        v.num_orders = src_count;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{do_command, CommandId};

    fn pack(kind: u32, target: u32, flags: u8) -> u32 {
        target | (kind << 16) | ((flags as u32) << 24)
    }

    #[test]
    fn insert_skip_delete_cycle() {
        let mut ctx = SimulationContext::new(6, 6, 1);
        // A bare road vehicle to hang orders on.
        let depot = ctx.world.grid.tile_xy(5, 5);
        do_command(
            &mut ctx,
            depot,
            tycmap::DiagDirection::NE as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildRoadDepot,
        )
        .unwrap();
        do_command(
            &mut ctx,
            depot,
            8,
            0,
            CommandFlags::EXEC,
            CommandId::BuildRoadVeh,
        )
        .unwrap();
        let veh = ctx.world.vehicles.iter_ids().next().unwrap();

        for i in 0..3 {
            do_command(
                &mut ctx,
                depot,
                veh.0 as u32 | ((i as u32) << 16),
                pack(1, i, 0),
                CommandFlags::EXEC,
                CommandId::InsertOrder,
            )
            .unwrap();
        }
        assert_eq!(ctx.world.vehicles.get(veh).num_orders, 3);

        do_command(
            &mut ctx,
            depot,
            veh.0 as u32,
            0,
            CommandFlags::EXEC,
            CommandId::SkipOrder,
        )
        .unwrap();
        assert_eq!(ctx.world.vehicles.get(veh).cur_order_index, 1);

        do_command(
            &mut ctx,
            depot,
            veh.0 as u32,
            1,
            CommandFlags::EXEC,
            CommandId::DeleteOrder,
        )
        .unwrap();
        assert_eq!(ctx.world.vehicles.get(veh).num_orders, 2);
    }

    #[test]
    fn shared_orders_form_a_ring() {
        let mut ctx = SimulationContext::new(6, 6, 1);
        let depot = ctx.world.grid.tile_xy(5, 5);
        do_command(
            &mut ctx,
            depot,
            tycmap::DiagDirection::NE as u32,
            0,
            CommandFlags::EXEC,
            CommandId::BuildRoadDepot,
        )
        .unwrap();
        for _ in 0..2 {
            do_command(
                &mut ctx,
                depot,
                8,
                0,
                CommandFlags::EXEC,
                CommandId::BuildRoadVeh,
            )
            .unwrap();
        }
        let (a, b) = {
            let mut ids = ctx.world.vehicles.iter_ids();
            let a = ids.next().unwrap();
            let b = ids.next().unwrap();
            (a, b)
        };
        do_command(
            &mut ctx,
            depot,
            a.0 as u32,
            pack(1, 0, 0),
            CommandFlags::EXEC,
            CommandId::InsertOrder,
        )
        .unwrap();
        do_command(
            &mut ctx,
            depot,
            b.0 as u32 | ((a.0 as u32) << 16),
            1,
            CommandFlags::EXEC,
            CommandId::CloneOrder,
        )
        .unwrap();
        assert_eq!(
            ctx.world.vehicles.get(a).schedule,
            ctx.world.vehicles.get(b).schedule
        );
        assert_eq!(ctx.world.vehicles.get(a).next_shared, Some(b));
        assert_eq!(ctx.world.vehicles.get(b).prev_shared, Some(a));
        // Unlinking the last sharer frees the chain; unlinking one keeps it.
        crate::cmd_vehicle::release_orders(&mut ctx, b);
        assert!(ctx.world.vehicles.get(a).schedule.is_some());
        assert_eq!(ctx.world.vehicles.get(a).next_shared, None);
    }
}
