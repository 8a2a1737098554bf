//! Loan commands.

use tycmap::TileIndex;
use tycworld::player::{LOAN_INTERVAL, MAX_LOAN};
use tycworld::{CommandError, Money};

use crate::command::CommandFlags;
use crate::context::SimulationContext;

/// Borrows one loan step. Returns the borrowed amount as income.
pub fn increase_loan(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    _p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let player = ctx.current_player;
    if ctx.world.player(player).current_loan + LOAN_INTERVAL > MAX_LOAN {
        return Err(CommandError::LoanLimitReached);
    }
    if flags.is_exec() {
        let p = ctx.world.player_mut(player);
        p.current_loan += LOAN_INTERVAL;
    }
    Ok(-LOAN_INTERVAL)
}

/// Repays one loan step.
pub fn decrease_loan(
    ctx: &mut SimulationContext,
    _tile: TileIndex,
    _p1: u32,
    _p2: u32,
    flags: CommandFlags,
) -> Result<Money, CommandError> {
    let player = ctx.current_player;
    if ctx.world.player(player).current_loan < LOAN_INTERVAL {
        return Err(CommandError::LoanRepayTooMuch);
    }
    if flags.is_exec() {
        let p = ctx.world.player_mut(player);
        p.current_loan -= LOAN_INTERVAL;
    }
    Ok(LOAN_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{do_command, CommandId};

    #[test]
    fn loans_move_money_both_ways() {
        let mut ctx = SimulationContext::new(6, 6, 1);
        let start = ctx.world.player(ctx.current_player).money;
        do_command(
            &mut ctx,
            TileIndex(0),
            0,
            0,
            CommandFlags::EXEC,
            CommandId::IncreaseLoan,
        )
        .unwrap();
        assert_eq!(
            ctx.world.player(ctx.current_player).money,
            start + LOAN_INTERVAL
        );
        do_command(
            &mut ctx,
            TileIndex(0),
            0,
            0,
            CommandFlags::EXEC,
            CommandId::DecreaseLoan,
        )
        .unwrap();
        assert_eq!(ctx.world.player(ctx.current_player).money, start);
    }
}
