use crate::{
    pb, point_from_proto, point_to_proto, Alliance, BuildItem, ColonyState, GameMapState,
    IntelEvent, IntelEventKind, IntelMask, IntelSnapshot, PlayerCommon, ProtocolError,
    QueuedBuild, Score, SquadId, SquadState, UnitState, UnitTag,
};

pub(crate) fn mask_to_proto(mask: IntelMask) -> pb::IntelRequest {
    pb::IntelRequest {
        map: mask.contains(IntelMask::MAP),
        score: mask.contains(IntelMask::SCORE),
        common: mask.contains(IntelMask::COMMON),
        upgrades_self: mask.contains(IntelMask::UPGRADES_SELF),
        structures_self: mask.contains(IntelMask::STRUCTURES_SELF),
        workers_self: mask.contains(IntelMask::WORKERS_SELF),
        units_self: mask.contains(IntelMask::UNITS_SELF),
        structures_enemy: mask.contains(IntelMask::STRUCTURES_ENEMY),
        units_enemy: mask.contains(IntelMask::UNITS_ENEMY),
        workers_enemy: mask.contains(IntelMask::WORKERS_ENEMY),
        primary_colony: mask.contains(IntelMask::PRIMARY_COLONY),
        colonies: mask.contains(IntelMask::COLONIES),
        mineral_fields: mask.contains(IntelMask::MINERAL_FIELDS),
        vespene_geysers: mask.contains(IntelMask::VESPENE_GEYSERS),
        destructibles: mask.contains(IntelMask::DESTRUCTIBLES),
        production_queue: mask.contains(IntelMask::PRODUCTION_QUEUE),
        squads: mask.contains(IntelMask::SQUADS),
        game_loop: mask.contains(IntelMask::GAME_LOOP),
        events: mask.contains(IntelMask::EVENTS),
    }
}

pub(crate) fn mask_from_proto(request: pb::IntelRequest) -> IntelMask {
    let mut mask = IntelMask::empty();
    mask.set(IntelMask::MAP, request.map);
    mask.set(IntelMask::SCORE, request.score);
    mask.set(IntelMask::COMMON, request.common);
    mask.set(IntelMask::UPGRADES_SELF, request.upgrades_self);
    mask.set(IntelMask::STRUCTURES_SELF, request.structures_self);
    mask.set(IntelMask::WORKERS_SELF, request.workers_self);
    mask.set(IntelMask::UNITS_SELF, request.units_self);
    mask.set(IntelMask::STRUCTURES_ENEMY, request.structures_enemy);
    mask.set(IntelMask::UNITS_ENEMY, request.units_enemy);
    mask.set(IntelMask::WORKERS_ENEMY, request.workers_enemy);
    mask.set(IntelMask::PRIMARY_COLONY, request.primary_colony);
    mask.set(IntelMask::COLONIES, request.colonies);
    mask.set(IntelMask::MINERAL_FIELDS, request.mineral_fields);
    mask.set(IntelMask::VESPENE_GEYSERS, request.vespene_geysers);
    mask.set(IntelMask::DESTRUCTIBLES, request.destructibles);
    mask.set(IntelMask::PRODUCTION_QUEUE, request.production_queue);
    mask.set(IntelMask::SQUADS, request.squads);
    mask.set(IntelMask::GAME_LOOP, request.game_loop);
    mask.set(IntelMask::EVENTS, request.events);
    mask
}

pub(crate) fn snapshot_to_proto(snapshot: &IntelSnapshot) -> pb::IntelResponse {
    pb::IntelResponse {
        map: snapshot.map.as_ref().map(map_to_proto),
        score: snapshot.score.as_ref().map(score_to_proto),
        common: snapshot.common.as_ref().map(common_to_proto),
        upgrades_self: snapshot.upgrades_self.clone(),
        structures_self: units_to_proto(&snapshot.structures_self),
        workers_self: units_to_proto(&snapshot.workers_self),
        units_self: units_to_proto(&snapshot.units_self),
        structures_enemy: units_to_proto(&snapshot.structures_enemy),
        units_enemy: units_to_proto(&snapshot.units_enemy),
        workers_enemy: units_to_proto(&snapshot.workers_enemy),
        primary_colony: snapshot.primary_colony.as_ref().map(colony_to_proto),
        colonies: snapshot.colonies.iter().map(colony_to_proto).collect(),
        mineral_fields: units_to_proto(&snapshot.mineral_fields),
        vespene_geysers: units_to_proto(&snapshot.vespene_geysers),
        destructibles: units_to_proto(&snapshot.destructibles),
        production_queue: snapshot
            .production_queue
            .iter()
            .map(build_to_proto)
            .collect(),
        squads: snapshot
            .squads
            .iter()
            .map(|squad| pb::Squad {
                squad_id: squad.id.0,
                name: squad.name.clone(),
                units: units_to_proto(&squad.units),
            })
            .collect(),
        game_loop: snapshot.game_loop,
        events: snapshot
            .events
            .iter()
            .map(|event| pb::IntelEvent {
                kind: event_kind_to_proto(event.kind) as i32,
                unit_tag: event.unit.0,
            })
            .collect(),
    }
}

pub(crate) fn snapshot_from_proto(
    response: pb::IntelResponse,
) -> Result<IntelSnapshot, ProtocolError> {
    let mut events = Vec::with_capacity(response.events.len());
    for event in response.events {
        events.push(IntelEvent {
            kind: event_kind_from_proto(event.kind)?,
            unit: UnitTag(event.unit_tag),
        });
    }

    let mut production_queue = Vec::with_capacity(response.production_queue.len());
    for entry in response.production_queue {
        production_queue.push(build_from_proto(entry)?);
    }

    let mut squads = Vec::with_capacity(response.squads.len());
    for squad in response.squads {
        squads.push(SquadState {
            id: SquadId(squad.squad_id),
            name: squad.name,
            units: units_from_proto(squad.units)?,
        });
    }

    let mut colonies = Vec::with_capacity(response.colonies.len());
    for colony in response.colonies {
        colonies.push(colony_from_proto(colony)?);
    }

    Ok(IntelSnapshot {
        map: response.map.map(map_from_proto),
        score: response.score.map(score_from_proto),
        common: response.common.map(common_from_proto),
        upgrades_self: response.upgrades_self,
        structures_self: units_from_proto(response.structures_self)?,
        workers_self: units_from_proto(response.workers_self)?,
        units_self: units_from_proto(response.units_self)?,
        structures_enemy: units_from_proto(response.structures_enemy)?,
        units_enemy: units_from_proto(response.units_enemy)?,
        workers_enemy: units_from_proto(response.workers_enemy)?,
        primary_colony: response.primary_colony.map(colony_from_proto).transpose()?,
        colonies,
        mineral_fields: units_from_proto(response.mineral_fields)?,
        vespene_geysers: units_from_proto(response.vespene_geysers)?,
        destructibles: units_from_proto(response.destructibles)?,
        production_queue,
        squads,
        game_loop: response.game_loop,
        events,
    })
}

fn units_to_proto(units: &[UnitState]) -> Vec<pb::Unit> {
    units.iter().map(unit_to_proto).collect()
}

fn unit_to_proto(unit: &UnitState) -> pb::Unit {
    pb::Unit {
        tag: unit.tag.0,
        unit_type: unit.unit_type,
        alliance: alliance_to_proto(unit.alliance) as i32,
        owner: unit.owner,
        position: Some(point_to_proto(unit.position)),
        z: unit.z,
        facing: unit.facing,
        health: unit.health,
        health_max: unit.health_max,
        shield: unit.shield,
        energy: unit.energy,
        build_progress: unit.build_progress,
        is_flying: unit.is_flying,
    }
}

fn units_from_proto(units: Vec<pb::Unit>) -> Result<Vec<UnitState>, ProtocolError> {
    units.into_iter().map(unit_from_proto).collect()
}

fn unit_from_proto(unit: pb::Unit) -> Result<UnitState, ProtocolError> {
    Ok(UnitState {
        tag: UnitTag(unit.tag),
        unit_type: unit.unit_type,
        alliance: alliance_from_proto(unit.alliance)?,
        owner: unit.owner,
        position: unit.position.map(point_from_proto).unwrap_or_default(),
        z: unit.z,
        facing: unit.facing,
        health: unit.health,
        health_max: unit.health_max,
        shield: unit.shield,
        energy: unit.energy,
        build_progress: unit.build_progress,
        is_flying: unit.is_flying,
    })
}

fn alliance_to_proto(value: Alliance) -> pb::Alliance {
    match value {
        Alliance::Own => pb::Alliance::Own,
        Alliance::Ally => pb::Alliance::Ally,
        Alliance::Neutral => pb::Alliance::Neutral,
        Alliance::Enemy => pb::Alliance::Enemy,
    }
}

fn alliance_from_proto(value: i32) -> Result<Alliance, ProtocolError> {
    match pb::Alliance::try_from(value) {
        Ok(pb::Alliance::Own) => Ok(Alliance::Own),
        Ok(pb::Alliance::Ally) => Ok(Alliance::Ally),
        Ok(pb::Alliance::Neutral) => Ok(Alliance::Neutral),
        Ok(pb::Alliance::Enemy) => Ok(Alliance::Enemy),
        _ => Err(ProtocolError::InvalidEnum {
            field: "Alliance",
            value,
        }),
    }
}

fn event_kind_to_proto(value: IntelEventKind) -> pb::IntelEventKind {
    match value {
        IntelEventKind::MineralDepleted => pb::IntelEventKind::MineralDepleted,
        IntelEventKind::UnitDestroyed => pb::IntelEventKind::UnitDestroyed,
        IntelEventKind::AddedHiddenEnemy => pb::IntelEventKind::AddedHiddenEnemy,
        IntelEventKind::StructureAddedEnemy => pb::IntelEventKind::StructureAddedEnemy,
        IntelEventKind::StructureAddedSelf => pb::IntelEventKind::StructureAddedSelf,
        IntelEventKind::StructureDestroyed => pb::IntelEventKind::StructureDestroyed,
        IntelEventKind::UnitAddedEnemy => pb::IntelEventKind::UnitAddedEnemy,
        IntelEventKind::UnitAddedSelf => pb::IntelEventKind::UnitAddedSelf,
        IntelEventKind::WorkerAddedEnemy => pb::IntelEventKind::WorkerAddedEnemy,
        IntelEventKind::WorkerAddedSelf => pb::IntelEventKind::WorkerAddedSelf,
        IntelEventKind::WorkerDestroyed => pb::IntelEventKind::WorkerDestroyed,
    }
}

fn event_kind_from_proto(value: i32) -> Result<IntelEventKind, ProtocolError> {
    match pb::IntelEventKind::try_from(value) {
        Ok(pb::IntelEventKind::MineralDepleted) => Ok(IntelEventKind::MineralDepleted),
        Ok(pb::IntelEventKind::UnitDestroyed) => Ok(IntelEventKind::UnitDestroyed),
        Ok(pb::IntelEventKind::AddedHiddenEnemy) => Ok(IntelEventKind::AddedHiddenEnemy),
        Ok(pb::IntelEventKind::StructureAddedEnemy) => Ok(IntelEventKind::StructureAddedEnemy),
        Ok(pb::IntelEventKind::StructureAddedSelf) => Ok(IntelEventKind::StructureAddedSelf),
        Ok(pb::IntelEventKind::StructureDestroyed) => Ok(IntelEventKind::StructureDestroyed),
        Ok(pb::IntelEventKind::UnitAddedEnemy) => Ok(IntelEventKind::UnitAddedEnemy),
        Ok(pb::IntelEventKind::UnitAddedSelf) => Ok(IntelEventKind::UnitAddedSelf),
        Ok(pb::IntelEventKind::WorkerAddedEnemy) => Ok(IntelEventKind::WorkerAddedEnemy),
        Ok(pb::IntelEventKind::WorkerAddedSelf) => Ok(IntelEventKind::WorkerAddedSelf),
        Ok(pb::IntelEventKind::WorkerDestroyed) => Ok(IntelEventKind::WorkerDestroyed),
        _ => Err(ProtocolError::InvalidEnum {
            field: "IntelEventKind",
            value,
        }),
    }
}

fn map_to_proto(map: &GameMapState) -> pb::GameMap {
    pb::GameMap {
        width: map.width,
        height: map.height,
        playable_min: Some(point_to_proto(map.playable_min)),
        playable_max: Some(point_to_proto(map.playable_max)),
        start_locations: map
            .start_locations
            .iter()
            .copied()
            .map(point_to_proto)
            .collect(),
    }
}

fn map_from_proto(map: pb::GameMap) -> GameMapState {
    GameMapState {
        width: map.width,
        height: map.height,
        playable_min: map.playable_min.map(point_from_proto).unwrap_or_default(),
        playable_max: map.playable_max.map(point_from_proto).unwrap_or_default(),
        start_locations: map
            .start_locations
            .into_iter()
            .map(point_from_proto)
            .collect(),
    }
}

fn score_to_proto(score: &Score) -> pb::Score {
    pb::Score {
        score: score.score,
        idle_production_time: score.idle_production_time,
        idle_worker_time: score.idle_worker_time,
        collected_minerals: score.collected_minerals,
        collected_vespene: score.collected_vespene,
        killed_value_units: score.killed_value_units,
        killed_value_structures: score.killed_value_structures,
    }
}

fn score_from_proto(score: pb::Score) -> Score {
    Score {
        score: score.score,
        idle_production_time: score.idle_production_time,
        idle_worker_time: score.idle_worker_time,
        collected_minerals: score.collected_minerals,
        collected_vespene: score.collected_vespene,
        killed_value_units: score.killed_value_units,
        killed_value_structures: score.killed_value_structures,
    }
}

fn common_to_proto(common: &PlayerCommon) -> pb::PlayerCommon {
    pb::PlayerCommon {
        player_id: common.player_id,
        minerals: common.minerals,
        vespene: common.vespene,
        food_cap: common.food_cap,
        food_used: common.food_used,
        food_army: common.food_army,
        food_workers: common.food_workers,
        idle_worker_count: common.idle_worker_count,
        army_count: common.army_count,
        warp_gate_count: common.warp_gate_count,
        larva_count: common.larva_count,
    }
}

fn common_from_proto(common: pb::PlayerCommon) -> PlayerCommon {
    PlayerCommon {
        player_id: common.player_id,
        minerals: common.minerals,
        vespene: common.vespene,
        food_cap: common.food_cap,
        food_used: common.food_used,
        food_army: common.food_army,
        food_workers: common.food_workers,
        idle_worker_count: common.idle_worker_count,
        army_count: common.army_count,
        warp_gate_count: common.warp_gate_count,
        larva_count: common.larva_count,
    }
}

fn colony_to_proto(colony: &ColonyState) -> pb::Colony {
    pb::Colony {
        id: colony.id,
        point: Some(point_to_proto(colony.point)),
        is_starting_location: colony.is_starting_location,
        minerals: units_to_proto(&colony.minerals),
        vespene: units_to_proto(&colony.vespene),
        structures: units_to_proto(&colony.structures),
        workers: units_to_proto(&colony.workers),
        desired_vespene_workers: colony.desired_vespene_workers,
    }
}

fn colony_from_proto(colony: pb::Colony) -> Result<ColonyState, ProtocolError> {
    Ok(ColonyState {
        id: colony.id,
        point: colony.point.map(point_from_proto).unwrap_or_default(),
        is_starting_location: colony.is_starting_location,
        minerals: units_from_proto(colony.minerals)?,
        vespene: units_from_proto(colony.vespene)?,
        structures: units_from_proto(colony.structures)?,
        workers: units_from_proto(colony.workers)?,
        desired_vespene_workers: colony.desired_vespene_workers,
    })
}

fn build_to_proto(entry: &QueuedBuild) -> pb::BuildOrderEntry {
    let item = match &entry.item {
        BuildItem::Unit {
            unit_type,
            position,
            spacing,
        } => pb::build_order_entry::Item::Unit(pb::QueuedUnit {
            unit_type: *unit_type,
            position: position.map(point_to_proto),
            spacing: *spacing,
        }),
        BuildItem::Tech { upgrade_id } => pb::build_order_entry::Item::Tech(pb::QueuedTech {
            upgrade_id: *upgrade_id,
        }),
    };
    pb::BuildOrderEntry {
        item: Some(item),
        skippable: entry.skippable,
    }
}

fn build_from_proto(entry: pb::BuildOrderEntry) -> Result<QueuedBuild, ProtocolError> {
    let item = match entry.item {
        Some(pb::build_order_entry::Item::Unit(unit)) => BuildItem::Unit {
            unit_type: unit.unit_type,
            position: unit.position.map(point_from_proto),
            spacing: unit.spacing,
        },
        Some(pb::build_order_entry::Item::Tech(tech)) => BuildItem::Tech {
            upgrade_id: tech.upgrade_id,
        },
        None => return Err(ProtocolError::MissingField("BuildOrderEntry.item")),
    };
    Ok(QueuedBuild {
        item,
        skippable: entry.skippable,
    })
}
