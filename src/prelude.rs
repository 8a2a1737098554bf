#[doc(inline)]
pub use tycmap::{
    DiagDirection, Direction, Grid, Owner, Slope, TileIndex, TileKind,
};

#[doc(inline)]
pub use tyctrack::{Track, TrackBits, Trackdir, TrackdirBits};

#[doc(inline)]
pub use tycworld::{
    track_status, CommandError, Money, Order, OrderFlags, OrderKind,
    PlayerId, RailType, Settings, SignalState, SignalType, StationId,
    TransportType, Vehicle, VehicleId, VehicleKind, World,
};

#[doc(inline)]
pub use tycpath::{AyStar, Npf, NpfResult, PbsMode, TrackFollower};

#[doc(inline)]
pub use tycsim::{
    do_command, update_signals_on_segment, CommandFlags, CommandId,
    SimulationContext,
};

#[doc(inline)]
pub use tycio::{build_simulation, read_scenario, write_scenario, Scenario};
