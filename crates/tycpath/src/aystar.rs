//! A reusable A* engine over `(tile, trackdir)` nodes.
//!
//! The engine owns three containers: an arena of path entries (so parent
//! chains are indices, never pointers), a best-cost map keyed on the node,
//! and a binary heap of open entries. A node reached again with a lower
//! cost is simply re-queued; stale heap entries are discarded when popped.
//!
//! Searches are resumable: `run` returns [`AyStarStatus::StillBusy`] when
//! the loops-per-tick budget runs out, and the next call picks up where it
//! left off.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tycmap::TileIndex;
use tyctrack::Trackdir;
use tycworld::World;

/// A search node: a tile, the trackdir on it, and two caller words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AyStarNode {
    pub tile: TileIndex,
    pub trackdir: Trackdir,
    pub user_data: [u32; 2],
}

impl AyStarNode {
    pub fn new(tile: TileIndex, trackdir: Trackdir) -> AyStarNode {
        AyStarNode {
            tile,
            trackdir,
            user_data: [0; 2],
        }
    }

    fn key(&self) -> (u32, u8) {
        (self.tile.0, self.trackdir as u8)
    }
}

/// One entry of the path arena. Parents are arena indices.
#[derive(Clone, Copy, Debug)]
pub struct PathEntry {
    pub node: AyStarNode,
    pub parent: Option<u32>,
    pub g: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AyStarStatus {
    StillBusy,
    FoundEnd,
    NoPath,
    LimitReached,
}

/// The callback quartet a search supplies, plus the post-run hook.
///
/// `cost` and `end_node_check` may write flags into the node they are given;
/// the engine keeps those mutations in the arena.
pub trait SearchDomain {
    /// Incremental g of stepping onto `arena[idx]`; `None` rejects the node.
    fn cost(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
    ) -> Option<u32>;

    /// Estimated remaining cost from `arena[idx]` to the target.
    fn heuristic(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
    ) -> u32;

    /// Writes the successors of `arena[idx]` into `out`.
    fn neighbours(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
        out: &mut Vec<AyStarNode>,
    );

    /// Whether `arena[idx]` satisfies the target.
    fn end_node_check(
        &mut self,
        world: &World,
        arena: &mut [PathEntry],
        idx: usize,
    ) -> bool;

    /// Called once with the winning entry.
    fn found_end(
        &mut self,
        world: &World,
        arena: &[PathEntry],
        idx: usize,
        g: u32,
    );

    /// Post-run hook with mutable world access; reservations commit here.
    fn before_exit(&mut self, _world: &mut World) {}
}

/// The engine. Configuration fields may be set between searches.
pub struct AyStar {
    arena: Vec<PathEntry>,
    /// `(f, sequence, arena index)`; the sequence keeps ties first-in
    /// first-out and the whole ordering deterministic.
    open: BinaryHeap<Reverse<(u32, u64, u32)>>,
    best_g: HashMap<(u32, u8), u32>,
    seq: u64,
    expanded: u32,
    neighbours_buf: Vec<AyStarNode>,
    /// Pops per `run` call; 0 means uncapped.
    pub loops_per_tick: u32,
    /// Paths costlier than this are abandoned; 0 means unbounded.
    pub max_path_cost: u32,
    /// Node expansion budget; 0 means unbounded.
    pub max_search_nodes: u32,
}

impl Default for AyStar {
    fn default() -> Self {
        AyStar {
            arena: Vec::new(),
            open: BinaryHeap::new(),
            best_g: HashMap::new(),
            seq: 0,
            expanded: 0,
            neighbours_buf: Vec::new(),
            loops_per_tick: 0,
            max_path_cost: 0,
            max_search_nodes: 10_000,
        }
    }
}

impl AyStar {
    /// Clears all search state; configuration is kept.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.open.clear();
        self.best_g.clear();
        self.seq = 0;
        self.expanded = 0;
    }

    /// Adds a start node with an initial cost (the two-way reverse penalty).
    pub fn add_start(&mut self, node: AyStarNode, g: u32) {
        let idx = self.arena.len() as u32;
        self.arena.push(PathEntry {
            node,
            parent: None,
            g,
        });
        self.push_open(g, idx);
        self.best_g.insert(node.key(), g);
    }

    fn push_open(&mut self, f: u32, idx: u32) {
        self.seq += 1;
        self.open.push(Reverse((f, self.seq, idx)));
    }

    pub fn arena(&self) -> &[PathEntry] {
        &self.arena
    }

    /// Walks an entry's parent chain, end node first.
    pub fn walk_path<'a>(
        &'a self,
        idx: u32,
    ) -> impl Iterator<Item = &'a PathEntry> {
        let mut cur = Some(idx);
        std::iter::from_fn(move || {
            let i = cur?;
            let entry = &self.arena[i as usize];
            cur = entry.parent;
            Some(entry)
        })
    }

    /// Runs the search until it finishes or the per-call budget is spent.
    pub fn run<D: SearchDomain>(
        &mut self,
        world: &mut World,
        domain: &mut D,
    ) -> AyStarStatus {
        let status = self.run_inner(world, domain);
        if status != AyStarStatus::StillBusy {
            domain.before_exit(world);
        }
        status
    }

    fn run_inner<D: SearchDomain>(
        &mut self,
        world: &World,
        domain: &mut D,
    ) -> AyStarStatus {
        let mut loops = 0;
        loop {
            if self.loops_per_tick != 0 && loops >= self.loops_per_tick {
                return AyStarStatus::StillBusy;
            }
            loops += 1;

            let Some(Reverse((_f, _seq, idx))) = self.open.pop() else {
                return AyStarStatus::NoPath;
            };
            let (node, g) = {
                let entry = &self.arena[idx as usize];
                (entry.node, entry.g)
            };
            // A cheaper copy of this node has been expanded already.
            if self
                .best_g
                .get(&node.key())
                .is_some_and(|&best| best < g)
            {
                continue;
            }

            if domain.end_node_check(world, &mut self.arena, idx as usize) {
                domain.found_end(world, &self.arena, idx as usize, g);
                return AyStarStatus::FoundEnd;
            }

            self.expanded += 1;
            if self.max_search_nodes != 0
                && self.expanded >= self.max_search_nodes
            {
                return AyStarStatus::LimitReached;
            }

            let mut neighbours = std::mem::take(&mut self.neighbours_buf);
            neighbours.clear();
            domain.neighbours(
                world,
                &mut self.arena,
                idx as usize,
                &mut neighbours,
            );

            for n in neighbours.drain(..) {
                let new_idx = self.arena.len() as u32;
                self.arena.push(PathEntry {
                    node: n,
                    parent: Some(idx),
                    g,
                });
                let Some(step) =
                    domain.cost(world, &mut self.arena, new_idx as usize)
                else {
                    self.arena.pop();
                    continue;
                };
                let new_g = g.saturating_add(step);
                self.arena[new_idx as usize].g = new_g;

                let h =
                    domain.heuristic(world, &mut self.arena, new_idx as usize);
                let f = new_g.saturating_add(h);
                if self.max_path_cost != 0 && f > self.max_path_cost {
                    self.arena.pop();
                    continue;
                }

                let key = self.arena[new_idx as usize].node.key();
                match self.best_g.get(&key) {
                    Some(&best) if best <= new_g => {
                        // An equal-or-better path is already known; the
                        // arena entry stays as a dead branch.
                        continue;
                    }
                    _ => {
                        self.best_g.insert(key, new_g);
                        self.push_open(f, new_idx);
                    }
                }
            }
            self.neighbours_buf = neighbours;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tycmap::Owner;
    use tycworld::rail::{make_plain_rail, RailType};
    use tyctrack::{trackdir_reaches_trackdirs, Track};
    use tycworld::{track_status, TransportType};

    /// A minimal domain: walk rail, unit cost per tile, no heuristic.
    struct Walker {
        goal: TileIndex,
        found: Option<(u32, u32)>,
    }

    impl SearchDomain for Walker {
        fn cost(
            &mut self,
            _world: &World,
            _arena: &mut [PathEntry],
            _idx: usize,
        ) -> Option<u32> {
            Some(1)
        }

        fn heuristic(
            &mut self,
            _world: &World,
            _arena: &mut [PathEntry],
            _idx: usize,
        ) -> u32 {
            0
        }

        fn neighbours(
            &mut self,
            world: &World,
            arena: &mut [PathEntry],
            idx: usize,
            out: &mut Vec<AyStarNode>,
        ) {
            let node = arena[idx].node;
            let exit = node.trackdir.exitdir();
            let Some(next) = world.grid.neighbour(node.tile, exit) else {
                return;
            };
            let dirs = track_status(&world.grid, next, TransportType::Rail)
                .trackdirs()
                & trackdir_reaches_trackdirs(node.trackdir);
            for td in dirs.iter() {
                out.push(AyStarNode::new(next, td));
            }
        }

        fn end_node_check(
            &mut self,
            _world: &World,
            arena: &mut [PathEntry],
            idx: usize,
        ) -> bool {
            arena[idx].node.tile == self.goal
        }

        fn found_end(
            &mut self,
            _world: &World,
            _arena: &[PathEntry],
            idx: usize,
            g: u32,
        ) {
            self.found = Some((idx as u32, g));
        }
    }

    #[test]
    fn finds_a_straight_rail_path() {
        let mut world = World::new(6, 6);
        for x in 5..15 {
            let tile = world.grid.tile_xy(x, 5);
            make_plain_rail(
                &mut world.grid,
                tile,
                Owner::Player(0),
                RailType::Rail,
                Track::Diag1.bit(),
            );
        }
        let goal = world.grid.tile_xy(14, 5);
        let mut walker = Walker { goal, found: None };
        let mut engine = AyStar::default();
        engine.add_start(
            AyStarNode::new(world.grid.tile_xy(5, 5), Trackdir::Diag1Sw),
            0,
        );
        let status = engine.run(&mut world, &mut walker);
        assert_eq!(status, AyStarStatus::FoundEnd);
        let (idx, g) = walker.found.unwrap();
        assert_eq!(g, 9);
        assert_eq!(engine.walk_path(idx).count(), 10);
    }

    #[test]
    fn reports_no_path_when_track_ends() {
        let mut world = World::new(6, 6);
        let tile = world.grid.tile_xy(5, 5);
        make_plain_rail(
            &mut world.grid,
            tile,
            Owner::Player(0),
            RailType::Rail,
            Track::Diag1.bit(),
        );
        let mut walker = Walker {
            goal: world.grid.tile_xy(20, 20),
            found: None,
        };
        let mut engine = AyStar::default();
        engine.add_start(AyStarNode::new(tile, Trackdir::Diag1Sw), 0);
        assert_eq!(
            engine.run(&mut world, &mut walker),
            AyStarStatus::NoPath
        );
    }

    #[test]
    fn loops_per_tick_preempts_and_resumes() {
        let mut world = World::new(6, 6);
        for x in 5..25 {
            let tile = world.grid.tile_xy(x, 5);
            make_plain_rail(
                &mut world.grid,
                tile,
                Owner::Player(0),
                RailType::Rail,
                Track::Diag1.bit(),
            );
        }
        let goal = world.grid.tile_xy(24, 5);
        let mut walker = Walker { goal, found: None };
        let mut engine = AyStar::default();
        engine.loops_per_tick = 3;
        engine.add_start(
            AyStarNode::new(world.grid.tile_xy(5, 5), Trackdir::Diag1Sw),
            0,
        );
        let mut calls = 0;
        loop {
            match engine.run(&mut world, &mut walker) {
                AyStarStatus::StillBusy => calls += 1,
                AyStarStatus::FoundEnd => break,
                other => panic!("unexpected status {:?}", other),
            }
            assert!(calls < 100);
        }
        assert!(calls > 1);
        assert!(walker.found.is_some());
    }
}
