use std::collections::BTreeMap;

use bridge_runtime::{SquadId, UnitTag};

use crate::domain::{SquadRecord, SquadRepository};
use crate::error::DomainError;

/// In-memory squad repository with generated ids.
#[derive(Debug, Default)]
pub struct SquadRoster {
    squads: BTreeMap<SquadId, SquadRecord>,
    next_id: u64,
}

impl SquadRoster {
    pub fn len(&self) -> usize {
        self.squads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squads.is_empty()
    }

    fn generate_id(&mut self) -> SquadId {
        loop {
            self.next_id += 1;
            let id = SquadId(self.next_id);
            if !self.squads.contains_key(&id) {
                return id;
            }
        }
    }
}

impl SquadRepository for SquadRoster {
    fn get(&self, id: SquadId) -> Option<SquadRecord> {
        self.squads.get(&id).cloned()
    }

    fn create(&mut self, name: &str, id: Option<SquadId>) -> Result<SquadId, DomainError> {
        let id = match id {
            Some(id) if self.squads.contains_key(&id) => {
                return Err(DomainError::DuplicateSquad(id.0))
            }
            Some(id) => id,
            None => self.generate_id(),
        };
        self.squads.insert(
            id,
            SquadRecord {
                id,
                name: name.to_string(),
                units: Vec::new(),
            },
        );
        Ok(id)
    }

    fn remove(&mut self, id: SquadId) -> bool {
        self.squads.remove(&id).is_some()
    }

    fn add_unit(&mut self, id: SquadId, tag: UnitTag) -> bool {
        match self.squads.get_mut(&id) {
            Some(squad) if !squad.units.contains(&tag) => {
                squad.units.push(tag);
                true
            }
            _ => false,
        }
    }

    fn remove_unit(&mut self, id: SquadId, tag: UnitTag) -> bool {
        let Some(squad) = self.squads.get_mut(&id) else {
            return false;
        };
        let before = squad.units.len();
        squad.units.retain(|member| *member != tag);
        squad.units.len() != before
    }

    fn all(&self) -> Vec<SquadRecord> {
        self.squads.values().cloned().collect()
    }
}
