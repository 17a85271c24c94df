//! Collaborator seams the bridge drives.
//!
//! The bridge never owns game logic. It reads world state through an
//! [`IntelManager`] and forwards decoded commands to the combat, production,
//! raw and squad managers grouped in a [`Domain`]. The host builds the
//! `Domain` explicitly and hands it to the bridge; from then on every access,
//! from the loop thread or the receive thread, goes through the session lock.

use std::time::Duration;

use bridge_runtime::{
    ColonyState, GameMapState, IntelEvent, PlayerCommon, Point2D, QueuedBuild, Score, SquadId,
    UnitState, UnitTag,
};

use crate::error::DomainError;
use crate::production::BuildQueue;
use crate::squads::SquadRoster;

/// Unit lists the intel manager exposes, one source per list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitGroup {
    StructuresSelf,
    WorkersSelf,
    UnitsSelf,
    StructuresEnemy,
    UnitsEnemy,
    WorkersEnemy,
    MineralFields,
    VespeneGeysers,
    Destructibles,
}

/// Read access to live world state.
pub trait IntelManager: Send {
    fn map(&self) -> Option<GameMapState>;
    fn score(&self) -> Score;
    fn common(&self) -> PlayerCommon;
    fn upgrades_self(&self) -> Vec<u32>;
    fn units(&self, group: UnitGroup) -> Vec<UnitState>;
    fn primary_colony(&self) -> Option<ColonyState>;
    fn colonies(&self) -> Vec<ColonyState>;
    fn game_loop(&self) -> u32;
    /// Resolve a tag against the live registry. `None` once the unit is gone.
    fn unit(&self, tag: UnitTag) -> Option<UnitState>;
}

/// Units a combat verb applies to, resolved at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub enum Actors {
    Unit(UnitState),
    Squad { id: SquadId, units: Vec<UnitState> },
}

impl Actors {
    pub fn units(&self) -> &[UnitState] {
        match self {
            Actors::Unit(unit) => std::slice::from_ref(unit),
            Actors::Squad { units, .. } => units,
        }
    }

    pub fn tags(&self) -> Vec<UnitTag> {
        self.units().iter().map(|unit| unit.tag).collect()
    }
}

/// Unit and squad actions. Smart variants leave the move-or-engage choice to the implementation.
pub trait CombatManager: Send {
    fn move_to(&mut self, actors: &Actors, point: Point2D, queue: bool)
        -> Result<(), DomainError>;
    fn attack_move(
        &mut self,
        actors: &Actors,
        point: Point2D,
        queue: bool,
    ) -> Result<(), DomainError>;
    fn attack(&mut self, actors: &Actors, target: &UnitState, queue: bool)
        -> Result<(), DomainError>;
    fn use_targeted_ability(
        &mut self,
        ability_id: u32,
        actors: &Actors,
        target: &UnitState,
        queue: bool,
    ) -> Result<(), DomainError>;
    fn use_point_centered_ability(
        &mut self,
        ability_id: u32,
        actors: &Actors,
        point: Point2D,
        queue: bool,
    ) -> Result<(), DomainError>;
    fn use_targetless_ability(
        &mut self,
        ability_id: u32,
        actors: &Actors,
        queue: bool,
    ) -> Result<(), DomainError>;
    fn smart_move(&mut self, actors: &Actors, point: Point2D, queue: bool)
        -> Result<(), DomainError>;
    fn smart_attack_move(
        &mut self,
        actors: &Actors,
        point: Point2D,
        queue: bool,
    ) -> Result<(), DomainError>;
    fn smart_attack(
        &mut self,
        actors: &Actors,
        target: &UnitState,
        queue: bool,
    ) -> Result<(), DomainError>;
}

/// Build order mutation and inspection.
pub trait ProductionManager: Send {
    fn clear_build_order(&mut self);
    fn queue_unit(
        &mut self,
        unit_type: u32,
        position: Option<Point2D>,
        spacing: u32,
        skippable: bool,
    );
    fn queue_tech(&mut self, upgrade_id: u32, skippable: bool);
    fn build_order(&self) -> Vec<QueuedBuild>;
}

/// Pass-through to the low-level game connection.
pub trait RawManager: Send {
    fn send(&mut self, payload: &[u8]) -> Result<(), DomainError>;
    /// Send and block for exactly one reply, giving up after `timeout`.
    fn request(&mut self, payload: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquadRecord {
    pub id: SquadId,
    pub name: String,
    pub units: Vec<UnitTag>,
}

/// Application-level squads, independent of any engine grouping.
pub trait SquadRepository: Send {
    fn get(&self, id: SquadId) -> Option<SquadRecord>;
    /// Create a squad, generating an id when none is given.
    fn create(&mut self, name: &str, id: Option<SquadId>) -> Result<SquadId, DomainError>;
    fn remove(&mut self, id: SquadId) -> bool;
    fn add_unit(&mut self, id: SquadId, tag: UnitTag) -> bool;
    fn remove_unit(&mut self, id: SquadId, tag: UnitTag) -> bool;
    fn all(&self) -> Vec<SquadRecord>;
}

/// Domain events awaiting the next intel bundle.
///
/// Recording is ignored until `subscribe`; `unsubscribe` discards anything pending.
#[derive(Debug, Default)]
pub struct EventQueue {
    subscribed: bool,
    pending: Vec<IntelEvent>,
}

impl EventQueue {
    pub fn subscribe(&mut self) {
        self.subscribed = true;
    }

    pub fn unsubscribe(&mut self) {
        self.subscribed = false;
        self.pending.clear();
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Returns whether the event was queued.
    pub fn record(&mut self, event: IntelEvent) -> bool {
        if self.subscribed {
            self.pending.push(event);
        }
        self.subscribed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drain(&mut self) -> Vec<IntelEvent> {
        std::mem::take(&mut self.pending)
    }
}

/// Every collaborator the bridge touches, built once by the host.
pub struct Domain {
    pub intel: Box<dyn IntelManager>,
    pub combat: Box<dyn CombatManager>,
    pub production: Box<dyn ProductionManager>,
    pub raw: Box<dyn RawManager>,
    pub squads: Box<dyn SquadRepository>,
    pub events: EventQueue,
}

impl Domain {
    /// Uses the in-memory [`BuildQueue`] and [`SquadRoster`] until replaced.
    pub fn new(
        intel: Box<dyn IntelManager>,
        combat: Box<dyn CombatManager>,
        raw: Box<dyn RawManager>,
    ) -> Self {
        Self {
            intel,
            combat,
            production: Box::new(BuildQueue::default()),
            raw,
            squads: Box::new(SquadRoster::default()),
            events: EventQueue::default(),
        }
    }

    pub fn with_production(mut self, production: Box<dyn ProductionManager>) -> Self {
        self.production = production;
        self
    }

    pub fn with_squads(mut self, squads: Box<dyn SquadRepository>) -> Self {
        self.squads = squads;
        self
    }
}
