//! The simulation context and the tick loop.

use log::info;

use tycpath::{Npf, TrackFollower};
use tycworld::{
    PlayerId, VehicleId, VehicleKind, World, DAYS_PER_YEAR,
};

use crate::ai::AiPlayer;
use crate::random::SimRandom;
use crate::{effects, roadveh, ship, train};

/// Everything one simulation run owns: the world, the scratch structures
/// the tick reuses rather than reallocates, and the acting player.
pub struct SimulationContext {
    pub world: World,
    pub npf: Npf,
    pub follower: TrackFollower,
    pub rng: SimRandom,
    /// The player on whose behalf the current command runs.
    pub current_player: PlayerId,
    /// Free text carried alongside the next naming command.
    pub cmd_text: Option<String>,
    pub ai: Vec<AiPlayer>,
}

impl SimulationContext {
    pub fn new(log_x: u32, log_y: u32, seed: u32) -> SimulationContext {
        SimulationContext {
            world: World::new(log_x, log_y),
            npf: Npf::default(),
            follower: TrackFollower::new(),
            rng: SimRandom::new(seed),
            current_player: PlayerId(0),
            cmd_text: None,
            ai: (0..tycworld::MAX_PLAYERS as u8)
                .map(|i| AiPlayer::new(PlayerId(i)))
                .collect(),
        }
    }

    /// Advances the world by one tick: calendar, then every vehicle in
    /// pool order, then the computer players.
    pub fn run_tick(&mut self) {
        let new_day = self.world.calendar.advance();

        // Vehicles allocated during the scan are ticked in the same pass
        // once their slot index is reached, like any other vehicle.
        let mut i = 0;
        while i < self.world.vehicles.len() {
            let id = VehicleId(i as u16);
            let kind = self.world.vehicles.get(id).kind();
            match kind {
                Some(VehicleKind::Train) => train::train_tick(self, id),
                Some(VehicleKind::Road) => roadveh::roadveh_tick(self, id),
                Some(VehicleKind::Ship) => ship::ship_tick(self, id),
                Some(VehicleKind::Effect) => effects::effect_tick(self, id),
                None => {}
            }
            i += 1;
        }

        if new_day {
            self.on_new_day();
        }

        crate::ai::ai_run_all(self);
    }

    fn on_new_day(&mut self) {
        let date = self.world.calendar.date;
        let year_start = self.world.calendar.is_year_start();

        let mut i = 0;
        while i < self.world.vehicles.len() {
            let id = VehicleId(i as u16);
            i += 1;
            let v = self.world.vehicles.get(id);
            if v.is_free() || v.kind() == Some(VehicleKind::Effect) {
                continue;
            }
            match v.kind() {
                Some(VehicleKind::Train) => train::train_on_new_day(self, id),
                Some(VehicleKind::Road) => {
                    roadveh::roadveh_on_new_day(self, id)
                }
                Some(VehicleKind::Ship) => ship::ship_on_new_day(self, id),
                _ => {}
            }
            if year_start && date != 0 {
                let v = self.world.vehicles.get_mut(id);
                v.profit_last_year = v.profit_this_year;
                v.profit_this_year = 0;
            }
        }

        if date % DAYS_PER_YEAR == 0 && date != 0 {
            info!("year {} begins", self.world.calendar.year());
        }
    }

    pub fn run_ticks(&mut self, count: u32) {
        for _ in 0..count {
            self.run_tick();
        }
    }
}
