use bridge_runtime::{IntelMask, IntelSnapshot, SquadState};
use tracing::trace;

use crate::domain::{Domain, UnitGroup};

const UNIT_GROUPS: [(IntelMask, UnitGroup); 9] = [
    (IntelMask::STRUCTURES_SELF, UnitGroup::StructuresSelf),
    (IntelMask::WORKERS_SELF, UnitGroup::WorkersSelf),
    (IntelMask::UNITS_SELF, UnitGroup::UnitsSelf),
    (IntelMask::STRUCTURES_ENEMY, UnitGroup::StructuresEnemy),
    (IntelMask::UNITS_ENEMY, UnitGroup::UnitsEnemy),
    (IntelMask::WORKERS_ENEMY, UnitGroup::WorkersEnemy),
    (IntelMask::MINERAL_FIELDS, UnitGroup::MineralFields),
    (IntelMask::VESPENE_GEYSERS, UnitGroup::VespeneGeysers),
    (IntelMask::DESTRUCTIBLES, UnitGroup::Destructibles),
];

/// Build the snapshot selected by `mask`.
///
/// Unselected categories are never read. Pending events are drained on every
/// call and only included when `EVENTS` is selected.
pub fn bundle(domain: &mut Domain, mask: IntelMask) -> IntelSnapshot {
    let intel = domain.intel.as_ref();
    let mut snapshot = IntelSnapshot::default();

    if mask.contains(IntelMask::MAP) {
        snapshot.map = intel.map();
    }
    if mask.contains(IntelMask::SCORE) {
        snapshot.score = Some(intel.score());
    }
    if mask.contains(IntelMask::COMMON) {
        snapshot.common = Some(intel.common());
    }
    if mask.contains(IntelMask::UPGRADES_SELF) {
        snapshot.upgrades_self = intel.upgrades_self();
    }

    for (flag, group) in UNIT_GROUPS {
        if !mask.contains(flag) {
            continue;
        }
        let units = intel.units(group);
        match group {
            UnitGroup::StructuresSelf => snapshot.structures_self = units,
            UnitGroup::WorkersSelf => snapshot.workers_self = units,
            UnitGroup::UnitsSelf => snapshot.units_self = units,
            UnitGroup::StructuresEnemy => snapshot.structures_enemy = units,
            UnitGroup::UnitsEnemy => snapshot.units_enemy = units,
            UnitGroup::WorkersEnemy => snapshot.workers_enemy = units,
            UnitGroup::MineralFields => snapshot.mineral_fields = units,
            UnitGroup::VespeneGeysers => snapshot.vespene_geysers = units,
            UnitGroup::Destructibles => snapshot.destructibles = units,
        }
    }

    if mask.contains(IntelMask::PRIMARY_COLONY) {
        snapshot.primary_colony = intel.primary_colony();
    }
    if mask.contains(IntelMask::COLONIES) {
        snapshot.colonies = intel.colonies();
    }
    if mask.contains(IntelMask::PRODUCTION_QUEUE) {
        snapshot.production_queue = domain.production.build_order();
    }
    if mask.contains(IntelMask::SQUADS) {
        snapshot.squads = domain
            .squads
            .all()
            .into_iter()
            .map(|squad| SquadState {
                id: squad.id,
                units: squad
                    .units
                    .iter()
                    .filter_map(|tag| intel.unit(*tag))
                    .collect(),
                name: squad.name,
            })
            .collect();
    }
    if mask.contains(IntelMask::GAME_LOOP) {
        snapshot.game_loop = Some(intel.game_loop());
    }

    let events = domain.events.drain();
    if mask.contains(IntelMask::EVENTS) {
        snapshot.events = events;
    } else if !events.is_empty() {
        trace!(
            target: "bridge::intel",
            dropped = events.len(),
            "events.drained_unrequested"
        );
    }

    snapshot
}
