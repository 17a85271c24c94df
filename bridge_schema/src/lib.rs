//! Data contracts shared by the bridge core and its wire protocol.
//!
//! Everything here is plain data: the live domain hands these values to the
//! intel bundler, and the runtime crate maps them onto protobuf messages.

use ahash::RandomState;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{BuildHasher, Hasher};

/// Engine-assigned identifier of a unit, structure or neutral entity.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UnitTag(pub u64);

impl fmt::Display for UnitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an application-level squad.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SquadId(pub u64);

impl fmt::Display for SquadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Alliance {
    #[default]
    Own = 1,
    Ally = 2,
    Neutral = 3,
    Enemy = 4,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    pub tag: UnitTag,
    pub unit_type: u32,
    pub alliance: Alliance,
    pub owner: u32,
    pub position: Point2D,
    pub z: f32,
    pub facing: f32,
    pub health: f32,
    pub health_max: f32,
    pub shield: f32,
    pub energy: f32,
    pub build_progress: f32,
    pub is_flying: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub score: i32,
    pub idle_production_time: f32,
    pub idle_worker_time: f32,
    pub collected_minerals: f32,
    pub collected_vespene: f32,
    pub killed_value_units: f32,
    pub killed_value_structures: f32,
}

/// Per-player economy counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCommon {
    pub player_id: u32,
    pub minerals: u32,
    pub vespene: u32,
    pub food_cap: u32,
    pub food_used: u32,
    pub food_army: u32,
    pub food_workers: u32,
    pub idle_worker_count: u32,
    pub army_count: u32,
    pub warp_gate_count: u32,
    pub larva_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMapState {
    pub width: u32,
    pub height: u32,
    pub playable_min: Point2D,
    pub playable_max: Point2D,
    pub start_locations: Vec<Point2D>,
}

/// A resource cluster that can host a base, with everything currently attached to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColonyState {
    pub id: u32,
    pub point: Point2D,
    pub is_starting_location: bool,
    pub minerals: Vec<UnitState>,
    pub vespene: Vec<UnitState>,
    pub structures: Vec<UnitState>,
    pub workers: Vec<UnitState>,
    pub desired_vespene_workers: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SquadState {
    pub id: SquadId,
    pub name: String,
    pub units: Vec<UnitState>,
}

/// Entry kinds accepted by the build order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuildItem {
    Unit {
        unit_type: u32,
        position: Option<Point2D>,
        spacing: u32,
    },
    Tech {
        upgrade_id: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedBuild {
    pub item: BuildItem,
    /// When set, scheduling steps over this entry while its prerequisites are unmet.
    pub skippable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntelEventKind {
    MineralDepleted = 1,
    UnitDestroyed = 2,
    AddedHiddenEnemy = 3,
    StructureAddedEnemy = 4,
    StructureAddedSelf = 5,
    StructureDestroyed = 6,
    UnitAddedEnemy = 7,
    UnitAddedSelf = 8,
    WorkerAddedEnemy = 9,
    WorkerAddedSelf = 10,
    WorkerDestroyed = 11,
}

impl IntelEventKind {
    pub const ALL: [IntelEventKind; 11] = [
        IntelEventKind::MineralDepleted,
        IntelEventKind::UnitDestroyed,
        IntelEventKind::AddedHiddenEnemy,
        IntelEventKind::StructureAddedEnemy,
        IntelEventKind::StructureAddedSelf,
        IntelEventKind::StructureDestroyed,
        IntelEventKind::UnitAddedEnemy,
        IntelEventKind::UnitAddedSelf,
        IntelEventKind::WorkerAddedEnemy,
        IntelEventKind::WorkerAddedSelf,
        IntelEventKind::WorkerDestroyed,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntelEvent {
    pub kind: IntelEventKind,
    pub unit: UnitTag,
}

impl IntelEvent {
    pub fn new(kind: IntelEventKind, unit: UnitTag) -> Self {
        Self { kind, unit }
    }
}

bitflags! {
    /// Categories of world state a driver asks to receive with each step.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct IntelMask: u32 {
        const MAP = 1 << 0;
        const SCORE = 1 << 1;
        const COMMON = 1 << 2;
        const UPGRADES_SELF = 1 << 3;
        const STRUCTURES_SELF = 1 << 4;
        const WORKERS_SELF = 1 << 5;
        const UNITS_SELF = 1 << 6;
        const STRUCTURES_ENEMY = 1 << 7;
        const UNITS_ENEMY = 1 << 8;
        const WORKERS_ENEMY = 1 << 9;
        const PRIMARY_COLONY = 1 << 10;
        const COLONIES = 1 << 11;
        const MINERAL_FIELDS = 1 << 12;
        const VESPENE_GEYSERS = 1 << 13;
        const DESTRUCTIBLES = 1 << 14;
        const PRODUCTION_QUEUE = 1 << 15;
        const SQUADS = 1 << 16;
        const GAME_LOOP = 1 << 17;
        const EVENTS = 1 << 18;
    }
}

impl Default for IntelMask {
    fn default() -> Self {
        IntelMask::all()
    }
}

impl IntelMask {
    /// Resolve a category by its snake_case name, e.g. `"mineral_fields"`.
    pub fn category(name: &str) -> Option<IntelMask> {
        IntelMask::from_name(&name.trim().to_ascii_uppercase())
    }
}

/// Filtered, point-in-time view of the domain sent with a step notification.
///
/// A category whose flag was not requested is `None` or empty, never partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntelSnapshot {
    pub map: Option<GameMapState>,
    pub score: Option<Score>,
    pub common: Option<PlayerCommon>,
    pub upgrades_self: Vec<u32>,
    pub structures_self: Vec<UnitState>,
    pub workers_self: Vec<UnitState>,
    pub units_self: Vec<UnitState>,
    pub structures_enemy: Vec<UnitState>,
    pub units_enemy: Vec<UnitState>,
    pub workers_enemy: Vec<UnitState>,
    pub primary_colony: Option<ColonyState>,
    pub colonies: Vec<ColonyState>,
    pub mineral_fields: Vec<UnitState>,
    pub vespene_geysers: Vec<UnitState>,
    pub destructibles: Vec<UnitState>,
    pub production_queue: Vec<QueuedBuild>,
    pub squads: Vec<SquadState>,
    pub game_loop: Option<u32>,
    pub events: Vec<IntelEvent>,
}

impl IntelSnapshot {
    /// Categories that carry data in this snapshot.
    pub fn populated(&self) -> IntelMask {
        let mut mask = IntelMask::empty();
        mask.set(IntelMask::MAP, self.map.is_some());
        mask.set(IntelMask::SCORE, self.score.is_some());
        mask.set(IntelMask::COMMON, self.common.is_some());
        mask.set(IntelMask::UPGRADES_SELF, !self.upgrades_self.is_empty());
        mask.set(IntelMask::STRUCTURES_SELF, !self.structures_self.is_empty());
        mask.set(IntelMask::WORKERS_SELF, !self.workers_self.is_empty());
        mask.set(IntelMask::UNITS_SELF, !self.units_self.is_empty());
        mask.set(IntelMask::STRUCTURES_ENEMY, !self.structures_enemy.is_empty());
        mask.set(IntelMask::UNITS_ENEMY, !self.units_enemy.is_empty());
        mask.set(IntelMask::WORKERS_ENEMY, !self.workers_enemy.is_empty());
        mask.set(IntelMask::PRIMARY_COLONY, self.primary_colony.is_some());
        mask.set(IntelMask::COLONIES, !self.colonies.is_empty());
        mask.set(IntelMask::MINERAL_FIELDS, !self.mineral_fields.is_empty());
        mask.set(IntelMask::VESPENE_GEYSERS, !self.vespene_geysers.is_empty());
        mask.set(IntelMask::DESTRUCTIBLES, !self.destructibles.is_empty());
        mask.set(IntelMask::PRODUCTION_QUEUE, !self.production_queue.is_empty());
        mask.set(IntelMask::SQUADS, !self.squads.is_empty());
        mask.set(IntelMask::GAME_LOOP, self.game_loop.is_some());
        mask.set(IntelMask::EVENTS, !self.events.is_empty());
        mask
    }

    /// Stable digest of the snapshot contents, used to correlate steps in logs.
    pub fn digest(&self) -> bincode::Result<u64> {
        let encoded = bincode::serialize(self)?;
        let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
        hasher.write(&encoded);
        Ok(hasher.finish())
    }
}
