//! Command outcomes: a money cost on success, one error kind on failure.

use thiserror::Error;

/// Whole currency units; negative values are income.
pub type Money = i64;

/// Every way a command can refuse to run.
///
/// Commands never panic and never return more than one failure; a compound
/// command reports the first error of its sub-commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("already built")]
    AlreadyBuilt,
    #[error("land sloped in wrong direction")]
    LandSlopedWrong,
    #[error("flat land required")]
    FlatLandRequired,
    #[error("must remove railroad track first")]
    MustRemoveRailFirst,
    #[error("must remove road first")]
    MustRemoveRoadFirst,
    #[error("must demolish first")]
    MustDemolishFirst,
    #[error("area is owned by another company")]
    AreaOwnedByAnother,
    #[error("no suitable railroad track")]
    NoSuitableTrack,
    #[error("no suitable road")]
    NoSuitableRoad,
    #[error("vehicle must be stopped inside a depot")]
    MustBeStoppedInDepot,
    #[error("too many vehicles in game")]
    TooManyVehicles,
    #[error("too many orders")]
    TooManyOrders,
    #[error("can't afford that")]
    CannotAfford,
    #[error("no route found")]
    NoRouteFound,
    #[error("unable to find a suitable depot")]
    DepotNotFound,
    #[error("there is a vehicle in the way")]
    VehicleInTheWay,
    #[error("signals are required")]
    SignalsRequired,
    #[error("site is unsuitable")]
    SiteUnsuitable,
    #[error("incompatible rail types")]
    IncompatibleRail,
    #[error("vehicle is not available")]
    VehicleUnavailable,
    #[error("loan limit reached")]
    LoanLimitReached,
    #[error("can't repay more than the current loan")]
    LoanRepayTooMuch,
}
