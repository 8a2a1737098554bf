//! The buildable vehicle designs.
//!
//! A small fixed roster; the interesting data are the numbers the
//! controllers read (power, weight, speed, capacity, reliability decay).

use crate::error::Money;
use crate::rail::RailType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineId(pub u8);

/// What a vehicle can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CargoKind {
    Passengers = 0,
    Mail = 1,
    Coal = 2,
    Goods = 3,
    Steel = 4,
    Grain = 5,
    Wood = 6,
    Oil = 7,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineKind {
    Rail {
        railtype: RailType,
        /// Wagons have no power and are dragged by an engine.
        is_wagon: bool,
    },
    Road,
    Ship,
}

/// One buildable design.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineInfo {
    pub name: &'static str,
    pub kind: EngineKind,
    /// Top speed in internal speed units (2 units ≈ 1 km/h).
    pub max_speed: u16,
    /// Horsepower; zero for wagons.
    pub power: u16,
    /// Empty weight in tonnes.
    pub weight: u16,
    pub capacity: u16,
    pub cargo: CargoKind,
    /// Yearly running cost.
    pub running_cost: Money,
    pub base_cost: Money,
    /// Starting reliability, 16-bit fixed point.
    pub reliability: u16,
    /// Reliability lost per ageing step.
    pub reliability_decay: u16,
    /// Vehicle length in 1/8th of a tile (rail only; 8 elsewhere).
    pub length: u8,
}

const fn rail_engine(
    name: &'static str,
    railtype: RailType,
    max_speed: u16,
    power: u16,
    weight: u16,
    running_cost: Money,
    base_cost: Money,
) -> EngineInfo {
    EngineInfo {
        name,
        kind: EngineKind::Rail {
            railtype,
            is_wagon: false,
        },
        max_speed,
        power,
        weight,
        capacity: 0,
        cargo: CargoKind::Passengers,
        running_cost,
        base_cost,
        reliability: 0xB000,
        reliability_decay: 20,
        length: 8,
    }
}

const fn wagon(
    name: &'static str,
    cargo: CargoKind,
    capacity: u16,
    weight: u16,
    length: u8,
) -> EngineInfo {
    EngineInfo {
        name,
        kind: EngineKind::Rail {
            railtype: RailType::Rail,
            is_wagon: true,
        },
        max_speed: 0,
        power: 0,
        weight,
        capacity,
        cargo,
        running_cost: 0,
        base_cost: 200,
        reliability: 0xFFFF,
        reliability_decay: 0,
        length,
    }
}

const fn road_vehicle(
    name: &'static str,
    cargo: CargoKind,
    capacity: u16,
    max_speed: u16,
    running_cost: Money,
    base_cost: Money,
) -> EngineInfo {
    EngineInfo {
        name,
        kind: EngineKind::Road,
        max_speed,
        power: 120,
        weight: 12,
        capacity,
        cargo,
        running_cost,
        base_cost,
        reliability: 0xA000,
        reliability_decay: 24,
        length: 8,
    }
}

const fn ship(
    name: &'static str,
    cargo: CargoKind,
    capacity: u16,
    max_speed: u16,
    running_cost: Money,
    base_cost: Money,
) -> EngineInfo {
    EngineInfo {
        name,
        kind: EngineKind::Ship,
        max_speed,
        power: 500,
        weight: 200,
        capacity,
        cargo,
        running_cost,
        base_cost,
        reliability: 0xC000,
        reliability_decay: 12,
        length: 8,
    }
}

/// The fixed design roster, indexed by [`EngineId`].
pub const ENGINES: &[EngineInfo] = &[
    // 0..4: rail engines
    rail_engine("Brackley 2-6-0 (Steam)", RailType::Rail, 128, 500, 60, 800, 4000),
    rail_engine("Ashdown Type 4 (Diesel)", RailType::Rail, 224, 1600, 100, 1600, 12000),
    rail_engine("Calder Express (Electric)", RailType::Mono, 320, 3500, 85, 2400, 24000),
    rail_engine("Levitant X (Maglev)", RailType::Maglev, 560, 6000, 70, 3600, 48000),
    // 4..8: wagons
    wagon("Passenger Car", CargoKind::Passengers, 40, 22, 8),
    wagon("Mail Van", CargoKind::Mail, 25, 18, 8),
    wagon("Coal Hopper", CargoKind::Coal, 30, 20, 8),
    wagon("Goods Van", CargoKind::Goods, 25, 18, 4),
    // 8..11: road vehicles
    road_vehicle("Omnibus", CargoKind::Passengers, 31, 112, 500, 2200),
    road_vehicle("Coal Lorry", CargoKind::Coal, 20, 96, 550, 2400),
    road_vehicle("Goods Lorry", CargoKind::Goods, 20, 96, 550, 2400),
    // 11..13: ships
    ship("Harbour Ferry", CargoKind::Passengers, 100, 48, 900, 9000),
    ship("Bulk Freighter", CargoKind::Coal, 220, 40, 1200, 14000),
];

pub fn engine(id: EngineId) -> &'static EngineInfo {
    &ENGINES[id.0 as usize]
}

pub fn is_valid_engine(id: EngineId) -> bool {
    (id.0 as usize) < ENGINES.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wagons_have_no_power() {
        for info in ENGINES {
            if let EngineKind::Rail { is_wagon: true, .. } = info.kind {
                assert_eq!(info.power, 0);
                assert!(info.length >= 1 && info.length <= 8);
            }
        }
    }
}
