//! Player records: money, loan, and not much else.

use crate::error::Money;

pub const MAX_PLAYERS: usize = 8;

/// The loan step and ceiling for every player.
pub const LOAN_INTERVAL: Money = 10_000;
pub const MAX_LOAN: Money = 500_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub u8);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub is_active: bool,
    /// Driven by the computer rather than a human.
    pub is_ai: bool,
    pub money: Money,
    pub current_loan: Money,
}

impl Player {
    pub fn new(id: PlayerId, is_ai: bool) -> Player {
        Player {
            id,
            is_active: true,
            is_ai,
            money: 100_000,
            current_loan: 100_000,
        }
    }

    pub fn can_afford(&self, cost: Money) -> bool {
        cost <= self.money
    }
}
