//! The tunables the simulation reads, with the shipped defaults.

/// One full tile of pathfinding cost; penalties are multiples of this.
pub const NPF_TILE_LENGTH: u32 = 100;

/// Game-rule settings, one struct for the whole world.
///
/// These are the switches the engine consults mid-tick; changing one mid-run
/// is allowed and simply takes effect on the next decision.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Use the new pathfinder (and path-based signalling) for every mode.
    pub new_pathfinding_all: bool,
    /// Promote blocks of compatible signals to path-based signalling.
    pub auto_pbs_placement: bool,
    /// Disallow 90-degree turns for trains and ships.
    pub forbid_90_deg: bool,
    /// Use the physics-based acceleration model for trains.
    pub realistic_acceleration: bool,
    /// Wagon speed limits apply to the whole consist.
    pub wagon_speed_limits: bool,

    /// Upper bound on nodes a single pathfinder run may expand.
    pub npf_max_search_nodes: u32,
    pub npf_rail_firstred_penalty: u32,
    pub npf_rail_firstred_exit_penalty: u32,
    pub npf_rail_lastred_penalty: u32,
    pub npf_rail_station_penalty: u32,
    pub npf_rail_slope_penalty: u32,
    pub npf_rail_curve_penalty: u32,
    pub npf_rail_depot_reverse_penalty: u32,
    pub npf_rail_pbs_cross_penalty: u32,
    pub npf_buoy_penalty: u32,
    pub npf_water_curve_penalty: u32,
    pub npf_road_curve_penalty: u32,
    pub npf_crossing_penalty: u32,

    /// Ticks-per-20 a train waits at a red one-way signal before reversing.
    pub wait_oneway_signal: u32,
    /// Ticks-per-73 a train waits at a red two-way signal before reversing.
    pub wait_twoway_signal: u32,
    /// Days without order progress before a train is advised lost.
    pub lost_train_days: u32,

    /// Vehicle breakdowns enabled (0 off, 1 reduced, 2 normal).
    pub vehicle_breakdowns: u8,
    /// Service interval is a reliability percentage, not a day count.
    pub servint_is_percent: bool,
    /// Default service interval for new vehicles, in days.
    pub servint_default: u16,
    pub no_servicing_if_no_breakdowns: bool,

    /// AI toggles, one per transport mode.
    pub ai_disable_veh_train: bool,
    pub ai_disable_veh_roadveh: bool,
    pub ai_disable_veh_ship: bool,
    /// 0 (very slow) to 4 (very fast).
    pub ai_speed: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            new_pathfinding_all: true,
            auto_pbs_placement: true,
            forbid_90_deg: false,
            realistic_acceleration: true,
            wagon_speed_limits: true,

            npf_max_search_nodes: 10_000,
            npf_rail_firstred_penalty: 10 * NPF_TILE_LENGTH,
            npf_rail_firstred_exit_penalty: 100 * NPF_TILE_LENGTH,
            npf_rail_lastred_penalty: 10 * NPF_TILE_LENGTH,
            npf_rail_station_penalty: NPF_TILE_LENGTH,
            npf_rail_slope_penalty: NPF_TILE_LENGTH,
            npf_rail_curve_penalty: 1,
            npf_rail_depot_reverse_penalty: 50 * NPF_TILE_LENGTH,
            npf_rail_pbs_cross_penalty: 10 * NPF_TILE_LENGTH,
            npf_buoy_penalty: 2 * NPF_TILE_LENGTH,
            npf_water_curve_penalty: NPF_TILE_LENGTH / 4,
            npf_road_curve_penalty: 1,
            npf_crossing_penalty: 3 * NPF_TILE_LENGTH,

            wait_oneway_signal: 15,
            wait_twoway_signal: 41,
            lost_train_days: 180,

            vehicle_breakdowns: 1,
            servint_is_percent: false,
            servint_default: 180,
            no_servicing_if_no_breakdowns: true,

            ai_disable_veh_train: false,
            ai_disable_veh_roadveh: false,
            ai_disable_veh_ship: false,
            ai_speed: 2,
        }
    }
}
