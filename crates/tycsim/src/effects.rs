//! Effect vehicles: smoke, sparks, explosions.
//!
//! These come from the reserved leading pool blocks, so a world crowded
//! with trains can still fume and spark. Each has a tiny tick state
//! machine: rise a little, age, disappear.

use tycmap::TileIndex;
use tycworld::engine::EngineId;
use tycworld::vehicle::{init_slot, EffectVeh, VehiclePayload};
use tycworld::{EffectKind, PlayerId, VehicleId};

use crate::context::SimulationContext;

fn spawn(
    ctx: &mut SimulationContext,
    kind: EffectKind,
    tile: TileIndex,
    x: i32,
    y: i32,
    z: i32,
) -> Option<VehicleId> {
    let id = ctx.world.vehicles.force_allocate_special()?;
    init_slot(
        &mut ctx.world.vehicles,
        id,
        PlayerId(0),
        EngineId(0),
        VehiclePayload::Effect(EffectVeh {
            kind: Some(kind),
            animation_state: 0,
        }),
    );
    let v = ctx.world.vehicles.get_mut(id);
    v.tile = tile;
    v.x_pos = x;
    v.y_pos = y;
    v.z_pos = z;
    ctx.world.vehicles.position_changed(id);
    Some(id)
}

pub fn spawn_breakdown_smoke(
    ctx: &mut SimulationContext,
    tile: TileIndex,
    x: i32,
    y: i32,
    z: i32,
) {
    let _ = spawn(ctx, EffectKind::BreakdownSmoke, tile, x, y, z + 4);
}

pub fn spawn_explosion(ctx: &mut SimulationContext, x: i32, y: i32, z: i32) {
    let tile = crate::movement::tile_at_pos(&ctx.world.grid, x, y);
    let _ = spawn(ctx, EffectKind::Explosion, tile, x, y, z);
}

pub fn spawn_depart_puff(
    ctx: &mut SimulationContext,
    kind: EffectKind,
    tile: TileIndex,
    x: i32,
    y: i32,
    z: i32,
) {
    let _ = spawn(ctx, kind, tile, x, y, z + 2);
}

pub fn effect_tick(ctx: &mut SimulationContext, id: VehicleId) {
    let expired = {
        let v = ctx.world.vehicles.get_mut(id);
        let (state, kind) = match &mut v.payload {
            VehiclePayload::Effect(e) => {
                e.animation_state += 1;
                (e.animation_state, e.kind)
            }
            _ => return,
        };
        // Smoke drifts upward as it ages.
        if state % 4 == 0 {
            v.z_pos += 1;
        }
        let lifetime = match kind {
            Some(EffectKind::BreakdownSmoke) => 80,
            Some(EffectKind::Explosion) => 24,
            _ => 16,
        };
        state >= lifetime
    };
    if expired {
        ctx.world.vehicles.free(id);
    } else {
        ctx.world.vehicles.position_changed(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tycworld::vehicle::BLOCK_SIZE;

    #[test]
    fn effects_come_from_the_reserved_blocks_and_expire() {
        let mut ctx = SimulationContext::new(6, 6, 1);
        let tile = ctx.world.grid.tile_xy(5, 5);
        spawn_breakdown_smoke(&mut ctx, tile, 88, 88, 0);
        let id = ctx.world.vehicles.iter_ids().next().unwrap();
        assert!((id.0 as usize) < 2 * BLOCK_SIZE);
        for _ in 0..100 {
            ctx.run_tick();
        }
        assert!(ctx.world.vehicles.get(id).is_free());
    }
}
