//! Recording fakes shared by unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_runtime::{
    ColonyState, GameMapState, PlayerCommon, Point2D, Score, UnitState, UnitTag,
};
use parking_lot::Mutex;

use crate::domain::{Actors, CombatManager, Domain, IntelManager, RawManager, UnitGroup};
use crate::error::DomainError;

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

fn tags(actors: &Actors) -> String {
    actors
        .tags()
        .iter()
        .map(|tag| tag.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Default)]
pub struct LiveUnits {
    pub units: BTreeMap<UnitTag, UnitState>,
}

impl LiveUnits {
    pub fn with_tags(tags: &[u64]) -> Self {
        let units = tags
            .iter()
            .map(|tag| {
                (
                    UnitTag(*tag),
                    UnitState {
                        tag: UnitTag(*tag),
                        unit_type: 48,
                        ..Default::default()
                    },
                )
            })
            .collect();
        Self { units }
    }
}

impl IntelManager for LiveUnits {
    fn map(&self) -> Option<GameMapState> {
        None
    }
    fn score(&self) -> Score {
        Score::default()
    }
    fn common(&self) -> PlayerCommon {
        PlayerCommon::default()
    }
    fn upgrades_self(&self) -> Vec<u32> {
        Vec::new()
    }
    fn units(&self, group: UnitGroup) -> Vec<UnitState> {
        match group {
            UnitGroup::UnitsSelf => self.units.values().cloned().collect(),
            _ => Vec::new(),
        }
    }
    fn primary_colony(&self) -> Option<ColonyState> {
        None
    }
    fn colonies(&self) -> Vec<ColonyState> {
        Vec::new()
    }
    fn game_loop(&self) -> u32 {
        0
    }
    fn unit(&self, tag: UnitTag) -> Option<UnitState> {
        self.units.get(&tag).cloned()
    }
}

pub struct RecordingCombat {
    pub journal: Journal,
    /// Ability ids the manager refuses.
    pub refused_abilities: Vec<u32>,
}

impl RecordingCombat {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            refused_abilities: Vec::new(),
        }
    }

    fn point_verb(&self, verb: &str, actors: &Actors, point: Point2D, queue: bool) {
        self.journal.push(format!(
            "{verb} {} @{},{}{}",
            tags(actors),
            point.x,
            point.y,
            if queue { " queued" } else { "" }
        ));
    }

    fn target_verb(&self, verb: &str, actors: &Actors, target: &UnitState) {
        self.journal
            .push(format!("{verb} {} -> {}", tags(actors), target.tag));
    }

    fn check_ability(&self, ability_id: u32) -> Result<(), DomainError> {
        if self.refused_abilities.contains(&ability_id) {
            Err(DomainError::Rejected(format!("ability {ability_id}")))
        } else {
            Ok(())
        }
    }
}

impl CombatManager for RecordingCombat {
    fn move_to(&mut self, actors: &Actors, point: Point2D, queue: bool) -> Result<(), DomainError> {
        self.point_verb("move", actors, point, queue);
        Ok(())
    }
    fn attack_move(
        &mut self,
        actors: &Actors,
        point: Point2D,
        queue: bool,
    ) -> Result<(), DomainError> {
        self.point_verb("attack_move", actors, point, queue);
        Ok(())
    }
    fn attack(&mut self, actors: &Actors, target: &UnitState, _: bool) -> Result<(), DomainError> {
        self.target_verb("attack", actors, target);
        Ok(())
    }
    fn use_targeted_ability(
        &mut self,
        ability_id: u32,
        actors: &Actors,
        target: &UnitState,
        _: bool,
    ) -> Result<(), DomainError> {
        self.check_ability(ability_id)?;
        self.target_verb(&format!("ability{ability_id}"), actors, target);
        Ok(())
    }
    fn use_point_centered_ability(
        &mut self,
        ability_id: u32,
        actors: &Actors,
        point: Point2D,
        queue: bool,
    ) -> Result<(), DomainError> {
        self.check_ability(ability_id)?;
        self.point_verb(&format!("ability{ability_id}"), actors, point, queue);
        Ok(())
    }
    fn use_targetless_ability(
        &mut self,
        ability_id: u32,
        actors: &Actors,
        _: bool,
    ) -> Result<(), DomainError> {
        self.check_ability(ability_id)?;
        self.journal
            .push(format!("ability{ability_id} {}", tags(actors)));
        Ok(())
    }
    fn smart_move(&mut self, actors: &Actors, point: Point2D, queue: bool) -> Result<(), DomainError> {
        self.point_verb("smart_move", actors, point, queue);
        Ok(())
    }
    fn smart_attack_move(
        &mut self,
        actors: &Actors,
        point: Point2D,
        queue: bool,
    ) -> Result<(), DomainError> {
        self.point_verb("smart_attack_move", actors, point, queue);
        Ok(())
    }
    fn smart_attack(
        &mut self,
        actors: &Actors,
        target: &UnitState,
        _: bool,
    ) -> Result<(), DomainError> {
        self.target_verb("smart_attack", actors, target);
        Ok(())
    }
}

pub struct EchoRaw {
    pub journal: Journal,
    pub silent: bool,
}

impl RawManager for EchoRaw {
    fn send(&mut self, payload: &[u8]) -> Result<(), DomainError> {
        self.journal.push(format!("raw send {payload:?}"));
        Ok(())
    }

    fn request(&mut self, payload: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        self.journal.push(format!("raw request {payload:?}"));
        if self.silent {
            return Err(DomainError::RawReplyTimeout(timeout));
        }
        Ok(payload.iter().rev().copied().collect())
    }
}

pub fn recording_domain(live: &[u64], journal: &Journal) -> Domain {
    Domain::new(
        Box::new(LiveUnits::with_tags(live)),
        Box::new(RecordingCombat::new(journal.clone())),
        Box::new(EchoRaw {
            journal: journal.clone(),
            silent: false,
        }),
    )
}
