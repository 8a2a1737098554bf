//! Vehicle orders and the pool that owns them.
//!
//! A vehicle's schedule is a singly linked chain of order nodes in a shared
//! pool; the chain is traversed cyclically. Vehicles sharing one schedule
//! form a ring through `prev_shared`/`next_shared` on the vehicles
//! themselves.

use crate::error::CommandError;

/// Hard cap on the orders in one schedule.
pub const MAX_ORDERS: usize = 254;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(pub u16);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OrderKind {
    #[default]
    Nothing = 0,
    GotoStation = 1,
    GotoDepot = 2,
    GotoWaypoint = 3,
    /// Currently exchanging cargo at a station.
    Loading = 4,
    /// Finished loading, about to pull out.
    LeaveStation = 5,
    /// Placeholder for an unresolvable order.
    Dummy = 6,
}

/// Order modifier bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OrderFlags(pub u8);

impl OrderFlags {
    pub const NON_STOP: OrderFlags = OrderFlags(0x01);
    pub const FULL_LOAD: OrderFlags = OrderFlags(0x02);
    pub const UNLOAD: OrderFlags = OrderFlags(0x04);
    pub const TRANSFER: OrderFlags = OrderFlags(0x08);
    pub const SERVICE_IF_NEEDED: OrderFlags = OrderFlags(0x10);
    pub const HALT_IN_DEPOT: OrderFlags = OrderFlags(0x20);
    /// Set on depot orders that are part of the schedule rather than a
    /// one-off "send to depot".
    pub const PART_OF_ORDERS: OrderFlags = OrderFlags(0x40);

    pub fn has(self, flag: OrderFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn set(&mut self, flag: OrderFlags) {
        self.0 |= flag.0;
    }

    pub fn clear(&mut self, flag: OrderFlags) {
        self.0 &= !flag.0;
    }
}

impl std::ops::BitOr for OrderFlags {
    type Output = OrderFlags;
    fn bitor(self, rhs: OrderFlags) -> OrderFlags {
        OrderFlags(self.0 | rhs.0)
    }
}

/// One element of a schedule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Order {
    pub kind: OrderKind,
    pub flags: OrderFlags,
    /// Station, depot or waypoint id, depending on `kind`.
    pub target: u16,
}

impl Order {
    pub fn goto_station(station: u16, flags: OrderFlags) -> Order {
        Order {
            kind: OrderKind::GotoStation,
            flags,
            target: station,
        }
    }

    pub fn goto_depot(depot: u16, flags: OrderFlags) -> Order {
        Order {
            kind: OrderKind::GotoDepot,
            flags,
            target: depot,
        }
    }

    pub fn goto_waypoint(waypoint: u16) -> Order {
        Order {
            kind: OrderKind::GotoWaypoint,
            flags: OrderFlags::default(),
            target: waypoint,
        }
    }

    pub fn is_nothing(self) -> bool {
        self.kind == OrderKind::Nothing
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct OrderNode {
    order: Order,
    next: Option<OrderId>,
    in_use: bool,
}

/// The pool owning every order node of every schedule.
#[derive(Clone, Debug, Default)]
pub struct OrderPool {
    nodes: Vec<OrderNode>,
}

impl OrderPool {
    fn allocate(&mut self, order: Order) -> Result<OrderId, CommandError> {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if !node.in_use {
                *node = OrderNode {
                    order,
                    next: None,
                    in_use: true,
                };
                return Ok(OrderId(i as u16));
            }
        }
        if self.nodes.len() >= u16::MAX as usize {
            return Err(CommandError::TooManyOrders);
        }
        self.nodes.push(OrderNode {
            order,
            next: None,
            in_use: true,
        });
        Ok(OrderId((self.nodes.len() - 1) as u16))
    }

    pub fn get(&self, id: OrderId) -> Order {
        debug_assert!(self.nodes[id.0 as usize].in_use);
        self.nodes[id.0 as usize].order
    }

    pub fn set(&mut self, id: OrderId, order: Order) {
        debug_assert!(self.nodes[id.0 as usize].in_use);
        self.nodes[id.0 as usize].order = order;
    }

    pub fn next(&self, id: OrderId) -> Option<OrderId> {
        self.nodes[id.0 as usize].next
    }

    /// Number of orders in the chain starting at `head`.
    pub fn chain_len(&self, head: Option<OrderId>) -> usize {
        let mut count = 0;
        let mut cur = head;
        while let Some(id) = cur {
            count += 1;
            cur = self.next(id);
            debug_assert!(count <= MAX_ORDERS, "order chain cycle");
        }
        count
    }

    /// The order at `index` in the chain, if present.
    pub fn nth(&self, head: Option<OrderId>, index: usize) -> Option<Order> {
        let mut cur = head?;
        for _ in 0..index {
            cur = self.next(cur)?;
        }
        Some(self.get(cur))
    }

    /// Inserts `order` at `index` into the chain, returning the new head.
    pub fn insert(
        &mut self,
        head: Option<OrderId>,
        index: usize,
        order: Order,
    ) -> Result<Option<OrderId>, CommandError> {
        if self.chain_len(head) >= MAX_ORDERS {
            return Err(CommandError::TooManyOrders);
        }
        let new = self.allocate(order)?;
        if index == 0 {
            self.nodes[new.0 as usize].next = head;
            return Ok(Some(new));
        }
        let mut cur = head.expect("insert index beyond chain");
        for _ in 0..index - 1 {
            cur = self.next(cur).expect("insert index beyond chain");
        }
        self.nodes[new.0 as usize].next = self.next(cur);
        self.nodes[cur.0 as usize].next = Some(new);
        Ok(head)
    }

    /// Deletes the order at `index`, returning the new head.
    pub fn delete(
        &mut self,
        head: Option<OrderId>,
        index: usize,
    ) -> Option<OrderId> {
        let first = head?;
        if index == 0 {
            let next = self.next(first);
            self.nodes[first.0 as usize] = OrderNode::default();
            return next;
        }
        let mut cur = first;
        for _ in 0..index - 1 {
            cur = self.next(cur)?;
        }
        if let Some(victim) = self.next(cur) {
            self.nodes[cur.0 as usize].next = self.next(victim);
            self.nodes[victim.0 as usize] = OrderNode::default();
        }
        Some(first)
    }

    /// Frees a whole chain; used when the last sharing vehicle goes away.
    pub fn free_chain(&mut self, head: Option<OrderId>) {
        let mut cur = head;
        while let Some(id) = cur {
            cur = self.next(id);
            self.nodes[id.0 as usize] = OrderNode::default();
        }
    }

    /// Deep-copies a chain, returning the new head.
    pub fn clone_chain(
        &mut self,
        head: Option<OrderId>,
    ) -> Result<Option<OrderId>, CommandError> {
        let mut orders = Vec::new();
        let mut cur = head;
        while let Some(id) = cur {
            orders.push(self.get(id));
            cur = self.next(id);
        }
        let mut new_head = None;
        for order in orders.into_iter().rev() {
            let id = self.allocate(order)?;
            self.nodes[id.0 as usize].next = new_head;
            new_head = Some(id);
        }
        Ok(new_head)
    }

    pub fn iter_chain(
        &self,
        head: Option<OrderId>,
    ) -> impl Iterator<Item = Order> + '_ {
        let mut cur = head;
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.next(id);
            Some(self.get(id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_delete_keep_the_chain_consistent() {
        let mut pool = OrderPool::default();
        let mut head = None;
        for i in 0..4 {
            head = pool
                .insert(head, i, Order::goto_station(i as u16, OrderFlags::default()))
                .unwrap();
        }
        assert_eq!(pool.chain_len(head), 4);
        assert_eq!(pool.nth(head, 2).unwrap().target, 2);

        head = pool.delete(head, 1);
        assert_eq!(pool.chain_len(head), 3);
        let targets: Vec<_> =
            pool.iter_chain(head).map(|o| o.target).collect();
        assert_eq!(targets, vec![0, 2, 3]);

        head = pool.delete(head, 0);
        assert_eq!(pool.chain_len(head), 2);
    }

    #[test]
    fn clone_chain_is_a_deep_copy() {
        let mut pool = OrderPool::default();
        let mut head = None;
        for i in 0..3 {
            head = pool
                .insert(head, i, Order::goto_station(i as u16, OrderFlags::FULL_LOAD))
                .unwrap();
        }
        let copy = pool.clone_chain(head).unwrap();
        assert_ne!(head, copy);
        let a: Vec<_> = pool.iter_chain(head).collect();
        let b: Vec<_> = pool.iter_chain(copy).collect();
        assert_eq!(a, b);
        pool.free_chain(head);
        // The copy survives freeing the original.
        assert_eq!(pool.chain_len(copy), 3);
    }
}
