//! The route planners: per-mode costs, heuristics, targets, and the
//! path-reservation commit.
//!
//! One [`NpfDomain`] instance parameterises the generic A* engine for a
//! single search: transport mode, owner, rail type, reservation mode and
//! target. The search tracks both the best full path and the node with the
//! best heuristic, so a failed search still reports how close it got.

use log::debug;

use tycmap::{Owner, TileIndex};
use tyctrack::{
    diagdir_to_diag_trackdir, trackdir_crosses_trackdirs,
    trackdir_reaches_trackdirs, Trackdir,
};
use tycworld::settings::NPF_TILE_LENGTH;
use tycworld::station::{
    is_road_stop_tile, road_stop_exitdir, StationId,
};
use tycworld::status::{may_enter_tile, tile_rail_type, track_status};
use tycworld::{pbs, rail, tunnel, RailType, SignalState, SignalType,
    TransportType, World};

use crate::aystar::{AyStar, AyStarNode, AyStarStatus, PathEntry, SearchDomain};
use crate::follow::is_pbs_segment;

/// Cost of one non-diagonal (half-length) track piece.
const NPF_STRAIGHT_LENGTH: u32 = NPF_TILE_LENGTH * 7071 / 10000;

/// Node flag bits, kept in `user_data[1]`.
const FLAG_SEEN_SIGNAL: u32 = 1 << 0;
const FLAG_REVERSE: u32 = 1 << 1;
const FLAG_LAST_SIGNAL_RED: u32 = 1 << 2;
const FLAG_PBS_EXIT: u32 = 1 << 3;
const FLAG_PBS_BLOCKED: u32 = 1 << 4;
const FLAG_PBS_CHOICE: u32 = 1 << 5;
const FLAG_PBS_RED: u32 = 1 << 6;
const FLAG_PBS_TARGET_SEEN: u32 = 1 << 7;

const CHOICE_INVALID: u32 = 0xFF;

fn get_flag(node: &AyStarNode, flag: u32) -> bool {
    node.user_data[1] & flag != 0
}

fn set_flag(node: &mut AyStarNode, flag: u32, value: bool) {
    if value {
        node.user_data[1] |= flag;
    } else {
        node.user_data[1] &= !flag;
    }
}

/// Reservation behaviour of a search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PbsMode {
    /// Reservations are ignored entirely.
    None,
    /// Only leave the block through a green exit signal.
    Green,
    /// Any exit will do; reserved tracks are filtered out of the
    /// neighbour set so the path is collision-free by construction.
    Any,
}

/// Where a search is headed.
#[derive(Clone, Copy, Debug)]
pub struct NpfTarget {
    /// The aiming tile for the heuristic, or the literal goal.
    pub dest: TileIndex,
    /// Accept any tile of this station instead of the literal tile.
    pub station: Option<StationId>,
}

impl NpfTarget {
    pub fn tile(dest: TileIndex) -> NpfTarget {
        NpfTarget {
            dest,
            station: None,
        }
    }

    pub fn station(id: StationId, dest: TileIndex) -> NpfTarget {
        NpfTarget {
            dest,
            station: Some(id),
        }
    }
}

/// What a search produced.
#[derive(Clone, Debug)]
pub struct NpfResult {
    /// Best heuristic seen; zero iff the target was reached.
    pub best_bird_dist: u32,
    /// Cost of the found path; `u32::MAX` when none was found.
    pub best_path_dist: u32,
    /// The first-order trackdir choice leading to the best node.
    pub best_trackdir: Option<Trackdir>,
    /// The node the search ended on (after a reservation commit, the spot
    /// where the path leaves the reserved block).
    pub node: AyStarNode,
    /// The node chain from `node` back to the start, end first.
    chain: Vec<AyStarNode>,
}

impl NpfResult {
    fn empty() -> NpfResult {
        NpfResult {
            best_bird_dist: u32::MAX,
            best_path_dist: u32::MAX,
            best_trackdir: None,
            node: AyStarNode::new(TileIndex::INVALID, Trackdir::Diag1Ne),
            chain: Vec::new(),
        }
    }

    pub fn found(&self) -> bool {
        self.best_bird_dist == 0
    }

    /// True when the winning start node was the reversed one.
    pub fn reversed(&self) -> bool {
        get_flag(&self.node, FLAG_REVERSE)
    }

    /// True when the reservation commit found the path blocked.
    pub fn pbs_blocked(&self) -> bool {
        get_flag(&self.node, FLAG_PBS_BLOCKED)
    }

    /// True when the path's last signal before the target was red.
    pub fn last_signal_red(&self) -> bool {
        get_flag(&self.node, FLAG_LAST_SIGNAL_RED)
    }

    /// True when the path found a way out of the reservation block.
    pub fn pbs_exit(&self) -> bool {
        get_flag(&self.node, FLAG_PBS_EXIT)
    }

    /// True when the block's exit signal was red.
    pub fn pbs_red(&self) -> bool {
        get_flag(&self.node, FLAG_PBS_RED)
    }
}

struct NpfDomain {
    mode: TransportType,
    owner: Owner,
    railtype: RailType,
    pbs_mode: PbsMode,
    target: Option<NpfTarget>,
    depot_search: bool,
    result: NpfResult,
}

impl NpfDomain {
    fn new(
        mode: TransportType,
        owner: Owner,
        railtype: RailType,
        pbs_mode: PbsMode,
        target: Option<NpfTarget>,
        depot_search: bool,
    ) -> NpfDomain {
        NpfDomain {
            mode,
            owner,
            railtype,
            pbs_mode,
            target,
            depot_search,
            result: NpfResult::empty(),
        }
    }

    fn trackdir_length(trackdir: Trackdir) -> u32 {
        if trackdir.is_diagonal() {
            NPF_TILE_LENGTH
        } else {
            NPF_STRAIGHT_LENGTH
        }
    }

    /// Minimum distance when only 45-degree turns are allowed, scaled by
    /// the tile length to keep the fractions exact.
    fn distance_track(world: &World, t0: TileIndex, t1: TileIndex) -> u32 {
        let grid = &world.grid;
        let dx = grid.tile_x(t0).abs_diff(grid.tile_x(t1));
        let dy = grid.tile_y(t0).abs_diff(grid.tile_y(t1));
        let straight = 2 * dx.min(dy);
        let diagonal = dx + dy - straight;
        diagonal * NPF_TILE_LENGTH + straight * NPF_STRAIGHT_LENGTH
    }

    /// A track that cannot be continued (or only past a one-way signal
    /// pointing at us) counts as end of line.
    fn is_end_of_line(
        &self,
        world: &World,
        tile: TileIndex,
        trackdir: Trackdir,
    ) -> bool {
        let grid = &world.grid;
        let exitdir = trackdir.exitdir();

        if tunnel::is_tunnel_in_dir(grid, tile, self.mode, exitdir) {
            return false;
        }
        if world.is_depot_of(tile, TransportType::Rail)
            && exitdir != world.depot_exitdir(tile, TransportType::Rail)
        {
            return true;
        }
        let Some(dst) = grid.neighbour(tile, exitdir) else {
            return true;
        };
        let ts = track_status(grid, dst, TransportType::Rail).trackdirs()
            & trackdir_reaches_trackdirs(trackdir);
        if ts.is_empty() {
            return true;
        }
        match tile_rail_type(grid, dst) {
            Some(rt) if self.railtype.is_compatible(rt) => {}
            _ => return true,
        }
        if grid.owner(tile) != grid.owner(dst) {
            return true;
        }
        if world.is_depot_of(dst, TransportType::Rail)
            && exitdir
                != world
                    .depot_exitdir(dst, TransportType::Rail)
                    .reverse()
        {
            return true;
        }
        if tunnel::is_tunnel_entrance(grid, dst)
            && tunnel::tunnel_dir(grid, dst) == exitdir.reverse()
        {
            return true;
        }
        if let Some(first) = ts.first() {
            if rail::has_signals(grid, dst)
                && rail::has_signal_on_trackdir(grid, dst, first.reverse())
                && !rail::has_signal_on_trackdir(grid, dst, first)
            {
                return true;
            }
        }
        false
    }

    fn tunnel_cost(&self, world: &World, node: &AyStarNode) -> u32 {
        let grid = &world.grid;
        let exitdir = node.trackdir.exitdir();
        if tunnel::tunnel_dir(grid, node.tile) == exitdir.reverse() {
            // We just popped out of this tunnel; charge its whole length.
            let (_, len) = tunnel::find_length_of_tunnel(
                grid,
                node.tile,
                exitdir.reverse(),
            );
            len * NPF_TILE_LENGTH
        } else {
            NPF_TILE_LENGTH
        }
    }

    fn slope_cost(&self, world: &World, node: &AyStarNode) -> u32 {
        let grid = &world.grid;
        let Some(next) =
            grid.neighbour(node.tile, node.trackdir.exitdir())
        else {
            return 0;
        };
        let z1 = grid.tile_z(node.tile) as i32;
        let z2 = grid.tile_z(next) as i32;
        if z2 - z1 > 1 {
            world.settings.npf_rail_slope_penalty
        } else {
            0
        }
    }

    /// The end condition, without side effects. Used from the cost hooks.
    fn is_end_node(&self, world: &World, node: &AyStarNode) -> bool {
        if self.depot_search {
            return world.is_depot_of(node.tile, self.mode);
        }
        let Some(target) = &self.target else {
            return false;
        };
        let at_target = match target.station {
            None => node.tile == target.dest,
            Some(station) => {
                tycworld::station::is_station_tile(&world.grid, node.tile)
                    && tycworld::station::station_id_at(
                        &world.grid,
                        node.tile,
                    ) == station
            }
        } || get_flag(node, FLAG_PBS_TARGET_SEEN);
        if !at_target {
            return false;
        }
        // In a reservation run the target only counts once a way out of
        // the block has been found as well.
        if self.pbs_mode != PbsMode::None
            && !get_flag(node, FLAG_SEEN_SIGNAL)
            && !self.is_end_of_line(world, node.tile, node.trackdir)
        {
            return false;
        }
        true
    }

    fn record_best(
        &mut self,
        arena: &[PathEntry],
        idx: usize,
        dist: u32,
    ) {
        let node = arena[idx].node;
        let better = dist < self.result.best_bird_dist
            || (self.pbs_mode != PbsMode::None
                && !get_flag(&node, FLAG_PBS_RED)
                && get_flag(&self.result.node, FLAG_PBS_RED));
        if better {
            self.result.best_bird_dist = dist;
            self.result.best_trackdir =
                Trackdir::from_u8(node.user_data[0] as u8);
            self.result.node = node;
            self.result.chain.clear();
            let mut cur = Some(idx as u32);
            while let Some(i) = cur {
                self.result.chain.push(arena[i as usize].node);
                cur = arena[i as usize].parent;
            }
        }
    }

    fn rail_cost(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
    ) -> u32 {
        let grid = &world.grid;
        let settings = &world.settings;
        let node = arena[idx].node;
        let tile = node.tile;
        let trackdir = node.trackdir;
        let mut node_mut = node;

        let mut cost = match grid.kind(tile) {
            tycmap::TileKind::TunnelBridge => {
                if tunnel::is_tunnel_entrance(grid, tile) {
                    self.tunnel_cost(world, &node)
                } else {
                    Self::trackdir_length(trackdir)
                }
            }
            tycmap::TileKind::Railway => Self::trackdir_length(trackdir),
            tycmap::TileKind::Street => NPF_TILE_LENGTH,
            tycmap::TileKind::Station => {
                // Every route pays the station penalty exactly once per
                // platform tile, so through-traffic is discouraged evenly.
                NPF_TILE_LENGTH + settings.npf_rail_station_penalty
            }
            _ => 0,
        };

        if self.pbs_mode != PbsMode::None
            && !get_flag(&node_mut, FLAG_PBS_EXIT)
            && !get_flag(&node_mut, FLAG_PBS_BLOCKED)
            && pbs::tile_unavail(grid, tile).has(trackdir)
        {
            set_flag(&mut node_mut, FLAG_PBS_BLOCKED, true);
        }

        if rail::is_rail_tile(grid, tile)
            && rail::has_signal_on_trackdir(grid, tile, trackdir)
        {
            if rail::signal_state(grid, tile, trackdir) == SignalState::Red {
                if !get_flag(&node_mut, FLAG_SEEN_SIGNAL) {
                    let sigtype = rail::signal_type(grid, tile);
                    cost += if matches!(
                        sigtype,
                        SignalType::Exit | SignalType::Combo
                    ) {
                        settings.npf_rail_firstred_exit_penalty
                    } else {
                        settings.npf_rail_firstred_penalty
                    };
                    if !get_flag(&node_mut, FLAG_PBS_EXIT)
                        && !get_flag(&node_mut, FLAG_PBS_RED)
                        && get_flag(&node_mut, FLAG_PBS_CHOICE)
                    {
                        set_flag(&mut node_mut, FLAG_PBS_RED, true);
                    }
                }
                set_flag(&mut node_mut, FLAG_LAST_SIGNAL_RED, true);
            } else {
                set_flag(&mut node_mut, FLAG_LAST_SIGNAL_RED, false);
            }

            if !get_flag(&node_mut, FLAG_SEEN_SIGNAL)
                && get_flag(&node_mut, FLAG_PBS_BLOCKED)
            {
                cost += settings.npf_rail_pbs_cross_penalty;
            }
            if world.is_pbs_signal(tile, trackdir)
                && !get_flag(&node_mut, FLAG_SEEN_SIGNAL)
            {
                set_flag(&mut node_mut, FLAG_PBS_EXIT, true);
            }
            set_flag(&mut node_mut, FLAG_SEEN_SIGNAL, true);
        }

        if self.is_end_node(world, &node_mut)
            && get_flag(&node_mut, FLAG_LAST_SIGNAL_RED)
        {
            cost += settings.npf_rail_lastred_penalty;
        }

        cost += self.slope_cost(world, &node_mut);

        if let Some(parent) = arena[idx].parent {
            let parent_td = arena[parent as usize].node.trackdir;
            if trackdir != parent_td.next() {
                cost += settings.npf_rail_curve_penalty;
            }
        }

        if world.is_depot_of(tile, TransportType::Rail) {
            // Any depot that is not the journey's end means reversing in it.
            if !self.is_end_node(world, &node_mut) {
                cost += settings.npf_rail_depot_reverse_penalty;
            }
            if !get_flag(&node_mut, FLAG_SEEN_SIGNAL) {
                if get_flag(&node_mut, FLAG_PBS_BLOCKED) {
                    cost += settings.npf_rail_pbs_cross_penalty;
                }
                if is_pbs_segment(world, tile, trackdir.reverse()) {
                    set_flag(&mut node_mut, FLAG_PBS_EXIT, true);
                    set_flag(&mut node_mut, FLAG_SEEN_SIGNAL, true);
                }
            }
            set_flag(&mut node_mut, FLAG_LAST_SIGNAL_RED, false);
        }

        arena[idx].node = node_mut;
        cost
    }

    fn road_cost(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
    ) -> u32 {
        let grid = &world.grid;
        let node = arena[idx].node;
        let mut cost = match grid.kind(node.tile) {
            tycmap::TileKind::TunnelBridge => {
                if tunnel::is_tunnel_entrance(grid, node.tile) {
                    self.tunnel_cost(world, &node)
                } else {
                    NPF_TILE_LENGTH
                }
            }
            tycmap::TileKind::Street => {
                let mut c = NPF_TILE_LENGTH;
                if tycworld::road::is_level_crossing(grid, node.tile) {
                    c += world.settings.npf_crossing_penalty;
                }
                c
            }
            _ => NPF_TILE_LENGTH,
        };
        cost += self.slope_cost(world, &node);
        // Road vehicles only really drive diagonally; turns show up as
        // the short inner pieces.
        if !node.trackdir.is_diagonal() {
            cost += world.settings.npf_road_curve_penalty;
        }
        cost
    }

    fn water_cost(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
    ) -> u32 {
        let node = arena[idx].node;
        let mut cost = Self::trackdir_length(node.trackdir);
        if tycworld::station::is_buoy_tile(&world.grid, node.tile)
            && node.trackdir.is_diagonal()
        {
            cost += world.settings.npf_buoy_penalty;
        }
        if let Some(parent) = arena[idx].parent {
            let parent_td = arena[parent as usize].node.trackdir;
            if node.trackdir != parent_td.next() {
                cost += world.settings.npf_water_curve_penalty;
            }
        }
        cost
    }
}

impl SearchDomain for NpfDomain {
    fn cost(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
    ) -> Option<u32> {
        Some(match self.mode {
            TransportType::Rail => self.rail_cost(world, arena, idx),
            TransportType::Road => self.road_cost(world, arena, idx),
            TransportType::Water => self.water_cost(world, arena, idx),
        })
    }

    fn heuristic(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
    ) -> u32 {
        if self.depot_search {
            // Breadth first: depots are "anywhere", so no estimate helps.
            return 0;
        }
        let Some(target) = self.target else {
            return 0;
        };
        let node = arena[idx].node;
        let mut to = target.dest;
        if self.mode == TransportType::Rail {
            if let Some(closest) = target
                .station
                .and_then(|id| world.stations.try_get(id))
                .and_then(|st| {
                    st.closest_platform_tile(&world.grid, node.tile)
                })
            {
                to = closest;
            }
        }
        let dist = if self.mode == TransportType::Road {
            world.grid.distance_manhattan(node.tile, to) * NPF_TILE_LENGTH
        } else {
            Self::distance_track(world, node.tile, to)
        };

        // Inside a reservation block, closeness is not progress: the block
        // has to be exited first.
        if self.pbs_mode != PbsMode::None
            && !get_flag(&node, FLAG_SEEN_SIGNAL)
            && !self.is_end_of_line(world, node.tile, node.trackdir)
        {
            return dist;
        }
        self.record_best(arena, idx, dist);
        dist
    }

    fn neighbours(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
        out: &mut Vec<AyStarNode>,
    ) {
        let grid = &world.grid;
        // The end check runs for its target-seen side effect.
        let _ = self.end_node_check(world, arena, idx);

        let current = arena[idx].node;
        let is_start = arena[idx].parent.is_none();
        let mut src_trackdir = current.trackdir;
        let src_tile = current.tile;
        let src_exitdir = src_trackdir.exitdir();

        let dst_tile = if tunnel::is_tunnel_in_dir(
            grid,
            src_tile,
            self.mode,
            src_exitdir,
        ) {
            let (far, _) =
                tunnel::find_length_of_tunnel(grid, src_tile, src_exitdir);
            far
        } else {
            if self.mode != TransportType::Water
                && (is_road_stop_tile(grid, src_tile)
                    || world.is_depot_of(src_tile, self.mode))
            {
                let exitdir = if is_road_stop_tile(grid, src_tile) {
                    road_stop_exitdir(grid, src_tile)
                } else {
                    world.depot_exitdir(src_tile, self.mode)
                };
                // Headed into the back wall: pretend we already reversed.
                if self.mode == TransportType::Rail
                    && src_trackdir
                        == diagdir_to_diag_trackdir(exitdir.reverse())
                {
                    src_trackdir = src_trackdir.reverse();
                }
            }
            match grid.neighbour(src_tile, src_trackdir.exitdir()) {
                Some(t) => t,
                None => return,
            }
        };

        // No hopping from a higher tile onto a tunnel mouth.
        if tunnel::is_tunnel_entrance(grid, dst_tile)
            && grid.tile_z(dst_tile) < grid.tile_z(src_tile)
        {
            return;
        }

        if self.mode == TransportType::Rail {
            match tile_rail_type(grid, dst_tile) {
                Some(rt) if self.railtype.is_compatible(rt) => {}
                _ => return,
            }
        }

        if !may_enter_tile(
            grid,
            self.owner,
            dst_tile,
            src_trackdir.exitdir(),
        ) {
            return;
        }

        let ts = if self.mode != TransportType::Water
            && (is_road_stop_tile(grid, dst_tile)
                || world.is_depot_of(dst_tile, self.mode))
        {
            // Stops and depots are enterable from their mouth only.
            let exitdir = if is_road_stop_tile(grid, dst_tile) {
                road_stop_exitdir(grid, dst_tile)
            } else {
                world.depot_exitdir(dst_tile, self.mode)
            };
            diagdir_to_diag_trackdir(exitdir.reverse()).bit()
        } else {
            track_status(grid, dst_tile, self.mode).trackdirs()
        };

        let mut trackdirs = ts & trackdir_reaches_trackdirs(src_trackdir);
        if world.settings.forbid_90_deg
            && matches!(
                self.mode,
                TransportType::Rail | TransportType::Water
            )
        {
            trackdirs = trackdirs & !trackdir_crosses_trackdirs(src_trackdir);
        }

        if trackdirs.has_more_than_one() {
            set_flag(&mut arena[idx].node, FLAG_PBS_CHOICE, true);
        }

        if self.pbs_mode == PbsMode::Any
            && !get_flag(&arena[idx].node, FLAG_PBS_EXIT)
        {
            trackdirs = trackdirs & !pbs::tile_unavail(grid, dst_tile);
        }

        let parent_flags = arena[idx].node.user_data[1];
        let parent_choice = arena[idx].node.user_data[0];
        for td in trackdirs.iter() {
            // A one-way signal pointing at us bars the whole tile.
            if rail::has_signals(grid, dst_tile)
                && rail::has_signal_on_trackdir(grid, dst_tile, td.reverse())
                && !rail::has_signal_on_trackdir(grid, dst_tile, td)
            {
                break;
            }
            let mut n = AyStarNode::new(dst_tile, td);
            n.user_data[1] = parent_flags;
            n.user_data[0] = if is_start {
                td as u8 as u32
            } else {
                parent_choice
            };
            out.push(n);
        }
    }

    fn end_node_check(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
    ) -> bool {
        if self.depot_search {
            return world.is_depot_of(arena[idx].node.tile, self.mode);
        }
        let found = self.is_end_node(world, &arena[idx].node);
        if found || self.target.is_some_and(|t| {
            match t.station {
                None => arena[idx].node.tile == t.dest,
                Some(st) => {
                    tycworld::station::is_station_tile(
                        &world.grid,
                        arena[idx].node.tile,
                    ) && tycworld::station::station_id_at(
                        &world.grid,
                        arena[idx].node.tile,
                    ) == st
                }
            }
        }) {
            set_flag(&mut arena[idx].node, FLAG_PBS_TARGET_SEEN, true);
        }
        found
    }

    fn found_end(
        &mut self,
        _world: &World,
        arena: &[PathEntry],
        idx: usize,
        g: u32,
    ) {
        self.result.best_trackdir =
            Trackdir::from_u8(arena[idx].node.user_data[0] as u8);
        self.result.best_path_dist = g;
        self.result.best_bird_dist = 0;
        self.result.node = arena[idx].node;
        self.result.chain.clear();
        let mut cur = Some(idx as u32);
        while let Some(i) = cur {
            self.result.chain.push(arena[i as usize].node);
            cur = arena[i as usize].parent;
        }
    }

    fn before_exit(&mut self, world: &mut World) {
        if self.pbs_mode == PbsMode::None {
            return;
        }
        self.reserve_pbs_path(world);
    }
}

impl NpfDomain {
    /// Walks the found path from its far end back towards the start,
    /// reserving every tile until the path leaves the signal block.
    fn reserve_pbs_path(&mut self, world: &mut World) {
        if self.result.best_trackdir.is_none() {
            return;
        }
        let node = &mut self.result.node;
        let mut eol_end = false;

        if !get_flag(node, FLAG_PBS_EXIT)
            && !get_flag(node, FLAG_SEEN_SIGNAL)
        {
            let end_of_line = {
                let n = *node;
                self.is_end_of_line(world, n.tile, n.trackdir)
            };
            let node = &mut self.result.node;
            if end_of_line {
                // The path ends in an end of line, which we treat as a red
                // exit signal.
                eol_end = true;
                set_flag(node, FLAG_PBS_EXIT, true);
                if !get_flag(node, FLAG_PBS_TARGET_SEEN) {
                    set_flag(node, FLAG_PBS_RED, true);
                }
            }
        }

        let node = &mut self.result.node;
        if !get_flag(node, FLAG_PBS_CHOICE) {
            // No choices on the path, so a red end signal costs nothing.
            set_flag(node, FLAG_PBS_RED, false);
        }

        let node = self.result.node;
        let permitted = self.pbs_mode != PbsMode::Green
            || !get_flag(&node, FLAG_PBS_RED);
        if !get_flag(&node, FLAG_PBS_EXIT)
            || get_flag(&node, FLAG_PBS_BLOCKED)
            || !permitted
        {
            return;
        }

        let mut start: Option<(TileIndex, Trackdir)> = None;
        let mut prev: Option<AyStarNode> = None;

        // The head node (with its just-updated flags) first, then the
        // recorded chain, which repeats it with the original flags.
        let chain: Vec<AyStarNode> = std::iter::once(node)
            .chain(self.result.chain.iter().copied())
            .collect();

        for cur in chain {
            if !get_flag(&cur, FLAG_PBS_EXIT) || eol_end {
                let unavail = pbs::tile_unavail(&world.grid, cur.tile);
                let reserved = pbs::tile_reserved(&world.grid, cur.tile);
                if unavail.has(cur.trackdir)
                    && !reserved.has(cur.trackdir.track())
                {
                    if let Some((stile, sdir)) = start {
                        // The path crosses its own fresh reservation; give
                        // it back and report the block as blocked.
                        pbs::clear_path(
                            &mut world.grid,
                            stile,
                            sdir,
                            cur.tile,
                            cur.trackdir,
                        );
                        set_flag(
                            &mut self.result.node,
                            FLAG_PBS_BLOCKED,
                            true,
                        );
                        debug!("reservation found a self-crossing path");
                        return;
                    }
                }

                pbs::reserve_track(
                    &mut world.grid,
                    cur.tile,
                    cur.trackdir.track(),
                );

                if start.is_none() {
                    start = Some(match prev {
                        Some(p) => {
                            // Reserve the exit-signal tile as well; the
                            // path leaves the block there.
                            pbs::reserve_track(
                                &mut world.grid,
                                p.tile,
                                p.trackdir.track(),
                            );
                            (p.tile, p.trackdir.reverse())
                        }
                        None => (cur.tile, cur.trackdir),
                    });
                }
            }
            prev = Some(cur);
        }

        if let Some((stile, sdir)) = start {
            self.result.node.tile = stile;
            self.result.node.trackdir = sdir;
        }
    }
}

/// The reusable pathfinder: one A* engine plus entry points per use case.
pub struct Npf {
    engine: AyStar,
}

impl Default for Npf {
    fn default() -> Self {
        Npf {
            engine: AyStar::default(),
        }
    }
}

/// One endpoint of a search: a tile plus the trackdir to start along.
pub type NpfStart = (TileIndex, Trackdir);

impl Npf {
    #[allow(clippy::too_many_arguments)]
    fn route_internal(
        &mut self,
        world: &mut World,
        start1: NpfStart,
        start2: Option<NpfStart>,
        target: Option<NpfTarget>,
        depot_search: bool,
        mode: TransportType,
        owner: Owner,
        railtype: RailType,
        reverse_penalty: u32,
        pbs_mode: PbsMode,
    ) -> NpfResult {
        let mut domain = NpfDomain::new(
            mode,
            owner,
            railtype,
            pbs_mode,
            target,
            depot_search,
        );
        self.engine.clear();
        self.engine.loops_per_tick = 0;
        self.engine.max_path_cost = 0;
        self.engine.max_search_nodes = world.settings.npf_max_search_nodes;

        let mut n1 = AyStarNode::new(start1.0, start1.1);
        n1.user_data[0] = CHOICE_INVALID;
        self.engine.add_start(n1, 0);
        if let Some((tile2, td2)) = start2 {
            let mut n2 = AyStarNode::new(tile2, td2);
            n2.user_data[0] = CHOICE_INVALID;
            set_flag(&mut n2, FLAG_REVERSE, true);
            self.engine.add_start(n2, reverse_penalty);
        }

        let status = self.engine.run(world, &mut domain);
        debug_assert!(status != AyStarStatus::StillBusy);
        if !domain.result.found() {
            debug!(
                "no route from {:?} towards {:?}",
                start1.0,
                target.map(|t| t.dest)
            );
        }
        domain.result
    }

    /// Routes to a station (any of its tiles) or a literal tile.
    #[allow(clippy::too_many_arguments)]
    pub fn route_to_station_or_tile(
        &mut self,
        world: &mut World,
        start: NpfStart,
        target: NpfTarget,
        mode: TransportType,
        owner: Owner,
        railtype: RailType,
        pbs_mode: PbsMode,
    ) -> NpfResult {
        self.route_internal(
            world,
            start,
            None,
            Some(target),
            false,
            mode,
            owner,
            railtype,
            0,
            pbs_mode,
        )
    }

    /// As above with a second (reversed) start node, so "reverse now"
    /// competes against "keep going" on cost.
    #[allow(clippy::too_many_arguments)]
    pub fn route_to_station_or_tile_two_way(
        &mut self,
        world: &mut World,
        start1: NpfStart,
        start2: Option<NpfStart>,
        target: NpfTarget,
        mode: TransportType,
        owner: Owner,
        railtype: RailType,
        pbs_mode: PbsMode,
    ) -> NpfResult {
        self.route_internal(
            world,
            start1,
            start2,
            Some(target),
            false,
            mode,
            owner,
            railtype,
            0,
            pbs_mode,
        )
    }

    /// Finds the closest depot by expanding evenly in all directions;
    /// right for rail and road, where the heuristic has nothing to aim at.
    pub fn route_to_depot_breadth_first(
        &mut self,
        world: &mut World,
        start1: NpfStart,
        start2: Option<NpfStart>,
        mode: TransportType,
        owner: Owner,
        railtype: RailType,
        reverse_penalty: u32,
    ) -> NpfResult {
        self.route_internal(
            world,
            start1,
            start2,
            None,
            true,
            mode,
            owner,
            railtype,
            reverse_penalty,
            PbsMode::None,
        )
    }

    /// Finds the closest depot by trying each in order of bird distance,
    /// stopping once the best found path beats the next candidate's bird
    /// distance. Right for water, where the heuristic is accurate.
    pub fn route_to_depot_trial_error(
        &mut self,
        world: &mut World,
        start: NpfStart,
        mode: TransportType,
        owner: Owner,
        railtype: RailType,
    ) -> NpfResult {
        let mut candidates: Vec<(u32, TileIndex)> = world
            .depots
            .iter()
            .filter(|d| {
                world.is_depot_of(d.xy, mode)
                    && world.grid.is_owner(d.xy, owner)
            })
            .map(|d| (world.grid.distance_manhattan(start.0, d.xy), d.xy))
            .collect();
        candidates.sort();

        let mut best = NpfResult::empty();
        for (bird, depot_tile) in candidates {
            if bird * NPF_TILE_LENGTH > best.best_path_dist {
                break;
            }
            let result = self.route_internal(
                world,
                start,
                None,
                Some(NpfTarget::tile(depot_tile)),
                false,
                mode,
                owner,
                railtype,
                0,
                PbsMode::None,
            );
            if result.best_path_dist < best.best_path_dist {
                best = result;
            }
        }
        best
    }
}

/// Builds the target of a vehicle's current order.
///
/// Only train orders to stations carry the station id: ships stop short of
/// the station and road vehicles must reach one exact bay tile, so both
/// aim at `dest_tile` instead.
pub fn target_from_order(
    world: &World,
    v: &tycworld::Vehicle,
) -> NpfTarget {
    use tycworld::{OrderKind, VehicleKind};
    if v.current_order.kind == OrderKind::GotoStation
        && v.kind() == Some(VehicleKind::Train)
    {
        let station = StationId(v.current_order.target);
        if let Some(st) = world.stations.try_get(station) {
            let dest = st
                .closest_platform_tile(&world.grid, v.tile)
                .unwrap_or(st.xy);
            return NpfTarget::station(station, dest);
        }
    }
    NpfTarget::tile(v.dest_tile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tycmap::{DiagDirection, Grid, Owner};
    use tyctrack::Track;
    use tycworld::rail::{
        add_signals_on_track, make_plain_rail, make_signal_tile,
        set_signal_type,
    };

    fn straight_rail(grid: &mut Grid, y: u32, x0: u32, x1: u32) {
        for x in x0..x1 {
            let tile = grid.tile_xy(x, y);
            make_plain_rail(
                grid,
                tile,
                Owner::Player(0),
                RailType::Rail,
                Track::Diag1.bit(),
            );
        }
    }

    #[test]
    fn routes_along_plain_track() {
        let mut world = World::new(6, 6);
        straight_rail(&mut world.grid, 5, 5, 20);
        let goal = world.grid.tile_xy(19, 5);
        let mut npf = Npf::default();
        let start = world.grid.tile_xy(5, 5);
        let result = npf.route_to_station_or_tile(
            &mut world,
            (start, Trackdir::Diag1Sw),
            NpfTarget::tile(goal),
            TransportType::Rail,
            Owner::Player(0),
            RailType::Rail,
            PbsMode::None,
        );
        assert!(result.found());
        assert_eq!(result.best_trackdir, Some(Trackdir::Diag1Sw));
        assert_eq!(result.best_path_dist, 14 * NPF_TILE_LENGTH);
    }

    #[test]
    fn heuristic_is_admissible_on_straight_track() {
        let mut world = World::new(6, 6);
        straight_rail(&mut world.grid, 5, 5, 20);
        // The track distance between two tiles on a row is exactly the
        // path cost, so the found path must equal the heuristic bound.
        let a = world.grid.tile_xy(5, 5);
        let b = world.grid.tile_xy(19, 5);
        assert_eq!(
            NpfDomain::distance_track(&world, a, b),
            14 * NPF_TILE_LENGTH
        );
    }

    #[test]
    fn no_route_over_a_gap() {
        let mut world = World::new(6, 6);
        straight_rail(&mut world.grid, 5, 5, 10);
        straight_rail(&mut world.grid, 5, 12, 20);
        let mut npf = Npf::default();
        let start = world.grid.tile_xy(5, 5);
        let goal = world.grid.tile_xy(19, 5);
        let result = npf.route_to_station_or_tile(
            &mut world,
            (start, Trackdir::Diag1Sw),
            NpfTarget::tile(goal),
            TransportType::Rail,
            Owner::Player(0),
            RailType::Rail,
            PbsMode::None,
        );
        assert!(!result.found());
        assert!(result.best_bird_dist > 0);
    }

    #[test]
    fn two_way_start_reports_the_winning_side() {
        let mut world = World::new(6, 6);
        straight_rail(&mut world.grid, 5, 5, 20);
        let goal = world.grid.tile_xy(6, 5);
        let mut npf = Npf::default();
        // Forward start points away from the goal; the reverse start wins.
        let start = world.grid.tile_xy(10, 5);
        let result = npf.route_to_station_or_tile_two_way(
            &mut world,
            (start, Trackdir::Diag1Sw),
            Some((start, Trackdir::Diag1Ne)),
            NpfTarget::tile(goal),
            TransportType::Rail,
            Owner::Player(0),
            RailType::Rail,
            PbsMode::None,
        );
        assert!(result.found());
        assert!(result.reversed());
    }

    #[test]
    fn pbs_any_mode_reserves_the_found_path() {
        let mut world = World::new(6, 6);
        straight_rail(&mut world.grid, 5, 5, 15);
        // Exit signal near the far end, so the block spans the middle.
        let sig = world.grid.tile_xy(13, 5);
        make_signal_tile(&mut world.grid, sig);
        add_signals_on_track(&mut world.grid, sig, Track::Diag1);
        set_signal_type(&mut world.grid, sig, tycworld::SignalType::Pbs);

        let mut npf = Npf::default();
        let start = world.grid.tile_xy(5, 5);
        let goal = world.grid.tile_xy(14, 5);
        let result = npf.route_to_station_or_tile(
            &mut world,
            (start, Trackdir::Diag1Sw),
            NpfTarget::tile(goal),
            TransportType::Rail,
            Owner::Player(0),
            RailType::Rail,
            PbsMode::Any,
        );
        assert!(result.found());
        assert!(!result.pbs_blocked());
        // Every tile from the start through the signal tile is reserved.
        for x in 5..=13 {
            let tile = world.grid.tile_xy(x, 5);
            assert!(
                pbs::tile_reserved(&world.grid, tile)
                    .has(Track::Diag1),
                "tile x={} not reserved",
                x
            );
        }
    }

    #[test]
    fn depot_breadth_first_finds_the_line_end_depot() {
        let mut world = World::new(6, 6);
        straight_rail(&mut world.grid, 5, 5, 10);
        // Depot at the end of the line, mouth facing back along it.
        let depot = world.grid.tile_xy(10, 5);
        tycworld::rail::make_rail_depot(
            &mut world.grid,
            depot,
            Owner::Player(0),
            RailType::Rail,
            DiagDirection::NE,
        );
        world.add_depot(depot);
        let mut npf = Npf::default();
        let start = world.grid.tile_xy(5, 5);
        let result = npf.route_to_depot_breadth_first(
            &mut world,
            (start, Trackdir::Diag1Sw),
            None,
            TransportType::Rail,
            Owner::Player(0),
            RailType::Rail,
            0,
        );
        assert!(result.found());
        assert_eq!(result.node.tile, depot);
        assert_eq!(result.best_trackdir, Some(Trackdir::Diag1Sw));
    }
}
