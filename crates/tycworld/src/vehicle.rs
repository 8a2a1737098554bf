//! The vehicle pool, the shared vehicle record, and the spatial hash.
//!
//! Vehicles live in a block-allocated arena with stable ids. The first two
//! blocks are reserved for effect vehicles (smoke, sparks, explosions) so
//! economic vehicles can never starve them. A 64×64 bucket hash over the
//! pixel position answers "what stands near this tile" for collisions and
//! occupancy checks.

use tycmap::{Direction, TileIndex};

use crate::engine::{CargoKind, EngineId};
use crate::error::Money;
use crate::order::{Order, OrderId};
use crate::player::PlayerId;
use crate::rail::RailType;
use crate::station::StationId;

pub const BLOCK_SIZE: usize = 512;
pub const MAX_BLOCKS: usize = 125;
/// Leading blocks that only effect vehicles may occupy.
pub const BLOCKS_FOR_SPECIAL_VEHICLES: usize = 2;

const SPECIAL_LIMIT: usize = BLOCK_SIZE * BLOCKS_FOR_SPECIAL_VEHICLES;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VehicleId(pub u16);

impl VehicleId {
    pub const INVALID: VehicleId = VehicleId(u16::MAX);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VehicleKind {
    Train,
    Road,
    Ship,
    Effect,
}

/// Position of a rail vehicle within its consist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleSubtype {
    /// Head of a powered consist.
    FrontEngine,
    /// Anything behind the head.
    NotFirst,
    /// Head of an engine-less wagon chain in a depot.
    FreeWagon,
    /// Trailing part of an articulated unit; mirrors its parent.
    ArticPart,
}

/// The short-lived decorative vehicles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectKind {
    BreakdownSmoke,
    SteamPuff,
    DieselPuff,
    ElectricSpark,
    Explosion,
}

/// Shared status bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VehicleFlags(pub u8);

impl VehicleFlags {
    pub const HIDDEN: VehicleFlags = VehicleFlags(0x01);
    pub const STOPPED: VehicleFlags = VehicleFlags(0x02);
    pub const TRAIN_SLOWING: VehicleFlags = VehicleFlags(0x10);
    pub const CRASHED: VehicleFlags = VehicleFlags(0x80);

    pub fn has(self, flag: VehicleFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn set(&mut self, flag: VehicleFlags) {
        self.0 |= flag.0;
    }

    pub fn clear(&mut self, flag: VehicleFlags) {
        self.0 &= !flag.0;
    }
}

/// Path-reservation bookkeeping on a train.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PbsStatus {
    #[default]
    None,
    /// A reserved path is active; its far end is cached on the vehicle.
    HasPath,
    /// The train stands on reserved track and must find a path out.
    NeedPath,
}

/// Train-specific state. Flag bits live in `flags`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainVeh {
    pub subtype: VehicleSubtype,
    /// Track bits occupied on the tile; 0x40 means in-tunnel, 0x80
    /// in-depot.
    pub track: u8,
    pub railtype: RailType,
    pub first_engine: Option<EngineId>,
    pub flags: u8,
    /// Ticks of red-signal override remaining (0 = none).
    pub force_proceed: u8,
    pub crash_anim_pos: u16,
    pub days_since_order_progr: u16,
    pub pbs_status: PbsStatus,
    pub pbs_end_tile: TileIndex,
    pub pbs_end_trackdir: u8,
    /// Cached consist totals, valid on every car, rebuilt on any change.
    pub cached_max_speed: u16,
    pub cached_power: u32,
    pub cached_weight: u32,
    pub cached_veh_length: u8,
    pub cached_total_length: u16,
}

impl TrainVeh {
    pub const FLAG_REVERSING: u8 = 0x01;
    pub const FLAG_GOING_UP: u8 = 0x02;
    pub const FLAG_GOING_DOWN: u8 = 0x04;

    pub const TRACK_IN_TUNNEL: u8 = 0x40;
    pub const TRACK_IN_DEPOT: u8 = 0x80;

    pub fn new(subtype: VehicleSubtype, railtype: RailType) -> TrainVeh {
        TrainVeh {
            subtype,
            track: 0,
            railtype,
            first_engine: None,
            flags: 0,
            force_proceed: 0,
            crash_anim_pos: 0,
            days_since_order_progr: 0,
            pbs_status: PbsStatus::None,
            pbs_end_tile: TileIndex::INVALID,
            pbs_end_trackdir: 0xFF,
            cached_max_speed: 0,
            cached_power: 0,
            cached_weight: 0,
            cached_veh_length: 8,
            cached_total_length: 0,
        }
    }

    pub fn in_depot(&self) -> bool {
        self.track == Self::TRACK_IN_DEPOT
    }

    pub fn in_tunnel(&self) -> bool {
        self.track == Self::TRACK_IN_TUNNEL
    }
}

/// Road-vehicle drive state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoadVeh {
    /// Drive-table state; 0xFE = in depot, 0xFF = at a station bay.
    pub state: u8,
    pub frame: u8,
    pub overtaking: bool,
    pub overtaking_ctr: u8,
    /// Ticks spent stuck behind the same obstacle.
    pub blocked_ctr: u16,
    pub reverse_ctr: u8,
    /// The claimed bay: station, stop index, slot index.
    pub slot: Option<(StationId, u8, u8)>,
    pub slot_age: u8,
    pub crashed_ctr: u16,
}

pub const RV_STATE_IN_DEPOT: u8 = 0xFE;
pub const RV_STATE_AT_STATION: u8 = 0xFF;

/// Ship drive state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShipVeh {
    /// Track bits occupied; 0x80 = in depot.
    pub state: u8,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectVeh {
    pub kind: Option<EffectKind>,
    pub animation_state: u16,
}

/// Per-mode payload; `None` marks a free pool slot.
#[derive(Clone, Debug, PartialEq)]
pub enum VehiclePayload {
    Free,
    Train(TrainVeh),
    Road(RoadVeh),
    Ship(ShipVeh),
    Effect(EffectVeh),
}

/// One pool slot. The header fields are shared between all vehicle kinds.
#[derive(Clone, Debug, PartialEq)]
pub struct Vehicle {
    pub index: VehicleId,
    pub owner: PlayerId,
    pub unit_number: u16,
    /// A player-given name, if any.
    pub name: Option<String>,
    pub engine: EngineId,
    pub tile: TileIndex,
    pub x_pos: i32,
    pub y_pos: i32,
    pub z_pos: i32,
    pub direction: Direction,
    pub flags: VehicleFlags,
    /// Next vehicle in the consist chain.
    pub next: Option<VehicleId>,
    /// Next vehicle in the same spatial-hash bucket.
    pub next_hash: Option<VehicleId>,
    /// Pixel position the hash bucket was computed from.
    hash_pos: Option<(i32, i32)>,
    pub schedule: Option<OrderId>,
    pub num_orders: u8,
    pub cur_order_index: u8,
    pub current_order: Order,
    pub prev_shared: Option<VehicleId>,
    pub next_shared: Option<VehicleId>,
    pub dest_tile: TileIndex,
    pub last_station_visited: Option<StationId>,
    pub cur_speed: u16,
    pub subspeed: u8,
    pub progress: u8,
    pub max_speed: u16,
    pub acceleration: u8,
    pub age_days: u32,
    pub max_age_days: u32,
    pub date_of_last_service: u32,
    pub service_interval: u16,
    pub reliability: u16,
    pub reliability_spd_dec: u16,
    pub breakdown_ctr: u8,
    pub breakdown_delay: u8,
    pub breakdowns_since_last_service: u8,
    pub breakdown_chance: u8,
    pub cargo_type: CargoKind,
    pub cargo_cap: u16,
    pub cargo_count: u16,
    pub cargo_source: Option<StationId>,
    pub cargo_days: u8,
    pub load_unload_time_rem: u16,
    pub build_date: u32,
    pub profit_this_year: Money,
    pub profit_last_year: Money,
    pub random_bits: u8,
    pub day_counter: u8,
    pub tick_counter: u8,
    pub payload: VehiclePayload,
}

impl Vehicle {
    fn empty(index: VehicleId) -> Vehicle {
        Vehicle {
            index,
            owner: PlayerId(0),
            unit_number: 0,
            name: None,
            engine: EngineId(0),
            tile: TileIndex::INVALID,
            x_pos: 0,
            y_pos: 0,
            z_pos: 0,
            direction: Direction::N,
            flags: VehicleFlags::default(),
            next: None,
            next_hash: None,
            hash_pos: None,
            schedule: None,
            num_orders: 0,
            cur_order_index: 0,
            current_order: Order::default(),
            prev_shared: None,
            next_shared: None,
            dest_tile: TileIndex::INVALID,
            last_station_visited: None,
            cur_speed: 0,
            subspeed: 0,
            progress: 0,
            max_speed: 0,
            acceleration: 0,
            age_days: 0,
            max_age_days: 0,
            date_of_last_service: 0,
            service_interval: 0,
            reliability: 0,
            reliability_spd_dec: 0,
            breakdown_ctr: 0,
            breakdown_delay: 0,
            breakdowns_since_last_service: 0,
            breakdown_chance: 0,
            cargo_type: CargoKind::Passengers,
            cargo_cap: 0,
            cargo_count: 0,
            cargo_source: None,
            cargo_days: 0,
            load_unload_time_rem: 0,
            build_date: 0,
            profit_this_year: 0,
            profit_last_year: 0,
            random_bits: 0,
            day_counter: 0,
            tick_counter: 0,
            payload: VehiclePayload::Free,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self.payload, VehiclePayload::Free)
    }

    pub fn kind(&self) -> Option<VehicleKind> {
        match self.payload {
            VehiclePayload::Free => None,
            VehiclePayload::Train(_) => Some(VehicleKind::Train),
            VehiclePayload::Road(_) => Some(VehicleKind::Road),
            VehiclePayload::Ship(_) => Some(VehicleKind::Ship),
            VehiclePayload::Effect(_) => Some(VehicleKind::Effect),
        }
    }

    pub fn train(&self) -> &TrainVeh {
        match &self.payload {
            VehiclePayload::Train(t) => t,
            _ => panic!("vehicle {} is not a train", self.index.0),
        }
    }

    pub fn train_mut(&mut self) -> &mut TrainVeh {
        match &mut self.payload {
            VehiclePayload::Train(t) => t,
            _ => panic!("vehicle {} is not a train", self.index.0),
        }
    }

    pub fn road(&self) -> &RoadVeh {
        match &self.payload {
            VehiclePayload::Road(r) => r,
            _ => panic!("vehicle {} is not a road vehicle", self.index.0),
        }
    }

    pub fn road_mut(&mut self) -> &mut RoadVeh {
        match &mut self.payload {
            VehiclePayload::Road(r) => r,
            _ => panic!("vehicle {} is not a road vehicle", self.index.0),
        }
    }

    pub fn ship(&self) -> &ShipVeh {
        match &self.payload {
            VehiclePayload::Ship(s) => s,
            _ => panic!("vehicle {} is not a ship", self.index.0),
        }
    }

    pub fn ship_mut(&mut self) -> &mut ShipVeh {
        match &mut self.payload {
            VehiclePayload::Ship(s) => s,
            _ => panic!("vehicle {} is not a ship", self.index.0),
        }
    }

    pub fn is_front_engine(&self) -> bool {
        matches!(
            &self.payload,
            VehiclePayload::Train(t)
                if t.subtype == VehicleSubtype::FrontEngine
        )
    }

    pub fn is_stopped(&self) -> bool {
        self.flags.has(VehicleFlags::STOPPED)
    }

    pub fn is_crashed(&self) -> bool {
        self.flags.has(VehicleFlags::CRASHED)
    }
}

const HASH_BUCKETS: usize = 0x1000;

fn gen_hash(x: i32, y: i32) -> usize {
    ((((x & 0x1F80) >> 7) | (y & 0xFC0)) & 0xFFF) as usize
}

/// The vehicle arena plus the pixel-position bucket hash.
#[derive(Clone, Debug)]
pub struct VehiclePool {
    slots: Vec<Vehicle>,
    position_hash: Vec<Option<VehicleId>>,
}

impl Default for VehiclePool {
    fn default() -> Self {
        let mut pool = VehiclePool {
            slots: Vec::new(),
            position_hash: vec![None; HASH_BUCKETS],
        };
        // The special blocks plus one ordinary block exist from the start.
        for _ in 0..BLOCKS_FOR_SPECIAL_VEHICLES + 1 {
            pool.add_block();
        }
        pool
    }
}

impl VehiclePool {
    fn add_block(&mut self) -> bool {
        if self.slots.len() >= BLOCK_SIZE * MAX_BLOCKS {
            return false;
        }
        let start = self.slots.len();
        for i in 0..BLOCK_SIZE {
            self.slots
                .push(Vehicle::empty(VehicleId((start + i) as u16)));
        }
        true
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: VehicleId) -> &Vehicle {
        &self.slots[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: VehicleId) -> &mut Vehicle {
        &mut self.slots[id.0 as usize]
    }

    /// All allocated vehicles in id order — the tick dispatch order.
    pub fn iter_ids(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.slots
            .iter()
            .filter(|v| !v.is_free())
            .map(|v| v.index)
    }

    fn find_free(&mut self, from: usize, to: usize) -> Option<VehicleId> {
        self.slots[from..to.min(self.slots.len())]
            .iter()
            .find(|v| v.is_free())
            .map(|v| v.index)
    }

    /// Allocates a zeroed slot outside the reserved blocks.
    pub fn allocate(&mut self) -> Option<VehicleId> {
        if let Some(id) = self.find_free(SPECIAL_LIMIT, self.slots.len()) {
            return Some(id);
        }
        if self.add_block() {
            self.find_free(SPECIAL_LIMIT, self.slots.len())
        } else {
            None
        }
    }

    /// Checks that `count` ordinary slots could be allocated at once.
    pub fn can_allocate(&self, count: usize) -> bool {
        let free = self.slots[SPECIAL_LIMIT..]
            .iter()
            .filter(|v| v.is_free())
            .count();
        let headroom = (BLOCK_SIZE * MAX_BLOCKS).saturating_sub(self.slots.len());
        free + headroom >= count
    }

    /// Allocates from the reserved blocks; for effect vehicles only.
    pub fn force_allocate_special(&mut self) -> Option<VehicleId> {
        self.find_free(0, SPECIAL_LIMIT)
    }

    /// Returns a slot to the free state and unlinks it from the hash.
    pub fn free(&mut self, id: VehicleId) {
        self.unlink_from_hash(id);
        self.slots[id.0 as usize] = Vehicle::empty(id);
    }

    /// The lowest unused unit number for vehicles of one kind and owner.
    pub fn next_unit_number(
        &self,
        kind: VehicleKind,
        owner: PlayerId,
    ) -> u16 {
        let mut unit = 1;
        loop {
            let taken = self.slots.iter().any(|v| {
                v.kind() == Some(kind)
                    && v.owner == owner
                    && v.unit_number == unit
            });
            if !taken {
                return unit;
            }
            unit += 1;
        }
    }

    fn unlink_from_hash(&mut self, id: VehicleId) {
        let Some((hx, hy)) = self.slots[id.0 as usize].hash_pos else {
            return;
        };
        let bucket = gen_hash(hx, hy);
        let mut cur = self.position_hash[bucket];
        if cur == Some(id) {
            self.position_hash[bucket] = self.slots[id.0 as usize].next_hash;
        } else {
            while let Some(prev) = cur {
                let next = self.slots[prev.0 as usize].next_hash;
                if next == Some(id) {
                    self.slots[prev.0 as usize].next_hash =
                        self.slots[id.0 as usize].next_hash;
                    break;
                }
                cur = next;
                debug_assert!(
                    cur.is_some(),
                    "vehicle {} missing from its hash bucket",
                    id.0
                );
            }
        }
        self.slots[id.0 as usize].next_hash = None;
        self.slots[id.0 as usize].hash_pos = None;
    }

    /// Re-buckets a vehicle after its pixel position changed. Must be
    /// called before anything later in the same tick scans for it.
    pub fn position_changed(&mut self, id: VehicleId) {
        let (x, y) = {
            let v = &self.slots[id.0 as usize];
            (v.x_pos, v.y_pos)
        };
        let new_bucket = gen_hash(x, y);
        if let Some((hx, hy)) = self.slots[id.0 as usize].hash_pos {
            if gen_hash(hx, hy) == new_bucket {
                self.slots[id.0 as usize].hash_pos = Some((x, y));
                return;
            }
            self.unlink_from_hash(id);
        }
        self.slots[id.0 as usize].next_hash = self.position_hash[new_bucket];
        self.slots[id.0 as usize].hash_pos = Some((x, y));
        self.position_hash[new_bucket] = Some(id);
    }

    /// Scans the hash buckets that can overlap `tile` and returns the first
    /// vehicle accepted by `pred`, in deterministic bucket-then-list order.
    pub fn vehicle_from_pos(
        &self,
        grid: &tycmap::Grid,
        tile: TileIndex,
        pred: &mut dyn FnMut(&Vehicle) -> bool,
    ) -> Option<VehicleId> {
        let px = (grid.tile_x(tile) * tycmap::TILE_SIZE) as i32;
        let py = (grid.tile_y(tile) * tycmap::TILE_SIZE) as i32;

        let x0 = (px - 174) & 0x1F80;
        let x1 = (px + 104) & 0x1F80;
        let y0 = (py - 70) & 0xFC0;
        let y1 = (py + 56) & 0xFC0;

        let mut y = y0;
        loop {
            let mut x = x0;
            loop {
                let bucket = gen_hash(x, y);
                let mut cur = self.position_hash[bucket];
                while let Some(id) = cur {
                    let v = &self.slots[id.0 as usize];
                    if pred(v) {
                        return Some(id);
                    }
                    cur = v.next_hash;
                }
                if x == x1 {
                    break;
                }
                x = (x + 0x80) & 0x1F80;
            }
            if y == y1 {
                break;
            }
            y = (y + 0x40) & 0xFC0;
        }
        None
    }

    /// A stable digest over every allocated vehicle, for determinism tests.
    pub fn digest(&self) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        let mut mix = |value: u64| {
            hash ^= value;
            hash = hash.wrapping_mul(0x100000001b3);
        };
        for v in &self.slots {
            if v.is_free() {
                continue;
            }
            mix(v.index.0 as u64);
            mix(v.tile.0 as u64);
            mix(v.x_pos as u64);
            mix(v.y_pos as u64);
            mix(v.z_pos as u64);
            mix(v.direction as u64);
            mix(v.cur_speed as u64);
            mix(v.flags.0 as u64);
            mix(v.cargo_count as u64);
            if let VehiclePayload::Train(t) = &v.payload {
                mix(t.track as u64);
                mix(t.flags as u64);
            }
        }
        hash
    }
}

/// Initialise a freshly allocated slot with the shared defaults.
pub fn init_slot(
    pool: &mut VehiclePool,
    id: VehicleId,
    owner: PlayerId,
    engine: EngineId,
    payload: VehiclePayload,
) {
    let v = pool.get_mut(id);
    debug_assert!(v.is_free());
    *v = Vehicle::empty(id);
    v.owner = owner;
    v.engine = engine;
    v.payload = payload;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rail::RailType;

    fn make_train(pool: &mut VehiclePool) -> VehicleId {
        let id = pool.allocate().unwrap();
        init_slot(
            pool,
            id,
            PlayerId(0),
            EngineId(0),
            VehiclePayload::Train(TrainVeh::new(
                VehicleSubtype::FrontEngine,
                RailType::Rail,
            )),
        );
        id
    }

    #[test]
    fn ordinary_allocation_skips_the_special_blocks() {
        let mut pool = VehiclePool::default();
        let id = pool.allocate().unwrap();
        assert!(id.0 as usize >= SPECIAL_LIMIT);
        let special = pool.force_allocate_special().unwrap();
        assert!((special.0 as usize) < SPECIAL_LIMIT);
    }

    #[test]
    fn freed_slots_are_reused_lowest_first() {
        let mut pool = VehiclePool::default();
        let a = make_train(&mut pool);
        let b = make_train(&mut pool);
        assert!(a < b);
        pool.free(a);
        let c = pool.allocate().unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn hash_finds_vehicles_near_their_tile() {
        let grid = tycmap::Grid::new(8, 8);
        let mut pool = VehiclePool::default();
        let id = make_train(&mut pool);
        let tile = grid.tile_xy(10, 12);
        {
            let v = pool.get_mut(id);
            v.tile = tile;
            v.x_pos = (10 * 16 + 8) as i32;
            v.y_pos = (12 * 16 + 8) as i32;
        }
        pool.position_changed(id);
        let found = pool.vehicle_from_pos(&grid, tile, &mut |v| {
            v.kind() == Some(VehicleKind::Train)
        });
        assert_eq!(found, Some(id));

        // Far away tiles do not see it.
        let far = grid.tile_xy(100, 100);
        let found = pool.vehicle_from_pos(&grid, far, &mut |v| {
            v.kind() == Some(VehicleKind::Train)
        });
        assert_eq!(found, None);
    }

    #[test]
    fn moving_between_buckets_relinks_cleanly() {
        let grid = tycmap::Grid::new(8, 8);
        let mut pool = VehiclePool::default();
        let id = make_train(&mut pool);
        {
            let v = pool.get_mut(id);
            v.tile = grid.tile_xy(10, 12);
            v.x_pos = 168;
            v.y_pos = 200;
        }
        pool.position_changed(id);
        {
            let v = pool.get_mut(id);
            v.tile = grid.tile_xy(40, 40);
            v.x_pos = 40 * 16;
            v.y_pos = 40 * 16;
        }
        pool.position_changed(id);
        assert_eq!(
            pool.vehicle_from_pos(&grid, grid.tile_xy(10, 12), &mut |_| true),
            None
        );
        assert_eq!(
            pool.vehicle_from_pos(&grid, grid.tile_xy(40, 40), &mut |_| true),
            Some(id)
        );
    }
}
