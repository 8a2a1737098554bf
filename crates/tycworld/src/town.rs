//! Towns and industries as plain data.
//!
//! Nothing here grows or produces; the records exist because the route
//! planner reads them when picking endpoints.

use crate::engine::CargoKind;
use tycmap::TileIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TownId(pub u16);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Town {
    pub id: TownId,
    pub xy: TileIndex,
    pub name: String,
    pub population: u32,
    /// Passengers generated last month.
    pub max_pass: u32,
    /// Mail generated last month.
    pub max_mail: u32,
    /// Percentage of passengers already being carried.
    pub pct_pass_transported: u8,
    /// Months left in which this town refuses new road works.
    pub road_build_months: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndustryId(pub u16);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Industry {
    pub id: IndustryId,
    pub xy: TileIndex,
    pub produced_cargo: [Option<CargoKind>; 2],
    /// Units produced per month for each produced cargo.
    pub production_rate: [u16; 2],
    /// Percentage of each produced cargo already being carried.
    pub pct_transported: [u8; 2],
    pub accepts_cargo: [Option<CargoKind>; 3],
}
