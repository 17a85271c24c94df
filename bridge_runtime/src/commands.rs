use prost::Message;

use crate::intel::{mask_from_proto, mask_to_proto};
use crate::{
    pb, point_to_proto, required_point, EncodeError, IntelMask, Point2D, ProtocolError, SquadId,
    UnitTag,
};

/// Who a combat verb is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Unit(UnitTag),
    Squad(SquadId),
}

/// Unit and squad level actions issued by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum CombatCommand {
    Move {
        actor: Actor,
        point: Point2D,
        queue: bool,
    },
    AttackMove {
        actor: Actor,
        point: Point2D,
        queue: bool,
    },
    Attack {
        actor: Actor,
        target: UnitTag,
        queue: bool,
    },
    UseTargetedAbility {
        ability_id: u32,
        actor: Actor,
        target: UnitTag,
        queue: bool,
    },
    UsePointCenteredAbility {
        ability_id: u32,
        actor: Actor,
        point: Point2D,
        queue: bool,
    },
    UseTargetlessAbility {
        ability_id: u32,
        actor: Actor,
        queue: bool,
    },
    SmartMove {
        actor: Actor,
        point: Point2D,
        queue: bool,
    },
    SmartAttackMove {
        actor: Actor,
        point: Point2D,
        queue: bool,
    },
    SmartAttack {
        actor: Actor,
        target: UnitTag,
        queue: bool,
    },
    Squad(SquadCommand),
}

impl CombatCommand {
    pub fn name(&self) -> &'static str {
        match self {
            CombatCommand::Move { .. } => "move",
            CombatCommand::AttackMove { .. } => "attack_move",
            CombatCommand::Attack { .. } => "attack",
            CombatCommand::UseTargetedAbility { .. } => "use_targeted_ability",
            CombatCommand::UsePointCenteredAbility { .. } => "use_point_centered_ability",
            CombatCommand::UseTargetlessAbility { .. } => "use_targetless_ability",
            CombatCommand::SmartMove { .. } => "smart_move",
            CombatCommand::SmartAttackMove { .. } => "smart_attack_move",
            CombatCommand::SmartAttack { .. } => "smart_attack",
            CombatCommand::Squad(squad) => squad.name(),
        }
    }
}

/// Squad membership changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquadCommand {
    AddUnits {
        squad: SquadId,
        units: Vec<UnitTag>,
    },
    RemoveUnits {
        squad: SquadId,
        units: Vec<UnitTag>,
    },
    CreateSquad {
        name: String,
        id: Option<SquadId>,
    },
    RemoveSquad {
        squad: SquadId,
    },
}

impl SquadCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SquadCommand::AddUnits { .. } => "squad_add_units",
            SquadCommand::RemoveUnits { .. } => "squad_remove_units",
            SquadCommand::CreateSquad { .. } => "squad_create",
            SquadCommand::RemoveSquad { .. } => "squad_remove",
        }
    }
}

/// Build order mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductionCommand {
    ClearBuildOrder,
    QueueUnit {
        unit_type: u32,
        position: Option<Point2D>,
        spacing: u32,
        skippable: bool,
    },
    QueueTech {
        upgrade_id: u32,
        skippable: bool,
    },
}

impl ProductionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ProductionCommand::ClearBuildOrder => "clear_build_order",
            ProductionCommand::QueueUnit { .. } => "queue_unit",
            ProductionCommand::QueueTech { .. } => "queue_tech",
        }
    }
}

/// Opaque request forwarded to the low-level game connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCommand {
    pub payload: Vec<u8>,
    pub expect_response: bool,
}

/// Everything a driver sends back for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeRequest {
    pub combat: Vec<CombatCommand>,
    pub production: Vec<ProductionCommand>,
    pub raw: Option<RawCommand>,
    /// Replacement for the requested-fields mask, effective from the next snapshot.
    pub intel: Option<IntelMask>,
    pub restart: bool,
    /// Step generation this request answers. `None` answers whichever step is pending.
    pub ack_step: Option<u64>,
}

impl BridgeRequest {
    /// An empty acknowledgement for `step`.
    pub fn acknowledge(step: u64) -> Self {
        Self {
            ack_step: Some(step),
            ..Default::default()
        }
    }

    pub fn command_count(&self) -> usize {
        self.combat.len() + self.production.len() + usize::from(self.raw.is_some())
    }

    pub fn encode_to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let proto = self.to_proto();
        let mut buffer = Vec::with_capacity(proto.encoded_len());
        proto.encode(&mut buffer)?;
        Ok(buffer)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let proto = pb::BridgeRequest::decode(bytes)?;
        Self::try_from_proto(proto)
    }

    pub(crate) fn to_proto(&self) -> pb::BridgeRequest {
        pb::BridgeRequest {
            combat: self.combat.iter().map(combat_to_proto).collect(),
            production: self.production.iter().map(production_to_proto).collect(),
            raw: self.raw.as_ref().map(|raw| pb::RawRequest {
                payload: raw.payload.clone(),
                expect_response: raw.expect_response,
            }),
            intel: self.intel.map(mask_to_proto),
            restart: self.restart,
            ack_step: self.ack_step,
        }
    }

    pub(crate) fn try_from_proto(proto: pb::BridgeRequest) -> Result<Self, ProtocolError> {
        let combat = proto
            .combat
            .into_iter()
            .map(combat_from_proto)
            .collect::<Result<Vec<_>, _>>()?;
        let production = proto
            .production
            .into_iter()
            .map(production_from_proto)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BridgeRequest {
            combat,
            production,
            raw: proto.raw.map(|raw| RawCommand {
                payload: raw.payload,
                expect_response: raw.expect_response,
            }),
            intel: proto.intel.map(mask_from_proto),
            restart: proto.restart,
            ack_step: proto.ack_step,
        })
    }
}

fn actor_to_proto(actor: Actor) -> Option<pb::Actor> {
    let target = match actor {
        Actor::Unit(tag) => pb::actor::Target::UnitTag(tag.0),
        Actor::Squad(id) => pb::actor::Target::SquadId(id.0),
    };
    Some(pb::Actor {
        target: Some(target),
    })
}

fn actor_from_proto(actor: Option<pb::Actor>, field: &'static str) -> Result<Actor, ProtocolError> {
    let actor = actor.ok_or(ProtocolError::MissingField(field))?;
    match actor.target {
        Some(pb::actor::Target::UnitTag(tag)) => Ok(Actor::Unit(UnitTag(tag))),
        Some(pb::actor::Target::SquadId(id)) => Ok(Actor::Squad(SquadId(id))),
        None => Err(ProtocolError::UnsupportedCommand {
            field: "Actor.target",
        }),
    }
}

fn move_to_proto(actor: Actor, point: Point2D, queue: bool) -> pb::MoveCommand {
    pb::MoveCommand {
        actor: actor_to_proto(actor),
        point: Some(point_to_proto(point)),
        queue,
    }
}

fn attack_to_proto(actor: Actor, target: UnitTag, queue: bool) -> pb::AttackCommand {
    pb::AttackCommand {
        actor: actor_to_proto(actor),
        target_tag: target.0,
        queue,
    }
}

fn combat_to_proto(command: &CombatCommand) -> pb::CombatRequest {
    use pb::combat_request::Command as Pb;

    let command = match command {
        CombatCommand::Move {
            actor,
            point,
            queue,
        } => Pb::Move(move_to_proto(*actor, *point, *queue)),
        CombatCommand::AttackMove {
            actor,
            point,
            queue,
        } => Pb::AttackMove(move_to_proto(*actor, *point, *queue)),
        CombatCommand::Attack {
            actor,
            target,
            queue,
        } => Pb::Attack(attack_to_proto(*actor, *target, *queue)),
        CombatCommand::UseTargetedAbility {
            ability_id,
            actor,
            target,
            queue,
        } => Pb::UseTargetedAbility(pb::TargetedAbilityCommand {
            ability_id: *ability_id,
            actor: actor_to_proto(*actor),
            target_tag: target.0,
            queue: *queue,
        }),
        CombatCommand::UsePointCenteredAbility {
            ability_id,
            actor,
            point,
            queue,
        } => Pb::UsePointCenteredAbility(pb::PointAbilityCommand {
            ability_id: *ability_id,
            actor: actor_to_proto(*actor),
            point: Some(point_to_proto(*point)),
            queue: *queue,
        }),
        CombatCommand::UseTargetlessAbility {
            ability_id,
            actor,
            queue,
        } => Pb::UseTargetlessAbility(pb::TargetlessAbilityCommand {
            ability_id: *ability_id,
            actor: actor_to_proto(*actor),
            queue: *queue,
        }),
        CombatCommand::SmartMove {
            actor,
            point,
            queue,
        } => Pb::SmartMove(move_to_proto(*actor, *point, *queue)),
        CombatCommand::SmartAttackMove {
            actor,
            point,
            queue,
        } => Pb::SmartAttackMove(move_to_proto(*actor, *point, *queue)),
        CombatCommand::SmartAttack {
            actor,
            target,
            queue,
        } => Pb::SmartAttack(attack_to_proto(*actor, *target, *queue)),
        CombatCommand::Squad(squad) => Pb::Squad(squad_to_proto(squad)),
    };

    pb::CombatRequest {
        command: Some(command),
    }
}

fn squad_to_proto(command: &SquadCommand) -> pb::SquadRequest {
    use pb::squad_request::Change;

    let change = match command {
        SquadCommand::AddUnits { squad, units } => Change::AddUnits(pb::UnitMembership {
            squad_id: squad.0,
            tags: units.iter().map(|tag| tag.0).collect(),
        }),
        SquadCommand::RemoveUnits { squad, units } => Change::RemoveUnits(pb::UnitMembership {
            squad_id: squad.0,
            tags: units.iter().map(|tag| tag.0).collect(),
        }),
        SquadCommand::CreateSquad { name, id } => Change::CreateSquad(pb::CreateSquad {
            name: name.clone(),
            squad_id: id.map(|id| id.0),
        }),
        SquadCommand::RemoveSquad { squad } => {
            Change::RemoveSquad(pb::RemoveSquad { squad_id: squad.0 })
        }
    };

    pb::SquadRequest {
        change: Some(change),
    }
}

fn combat_from_proto(request: pb::CombatRequest) -> Result<CombatCommand, ProtocolError> {
    use pb::combat_request::Command as Pb;

    let command = request.command.ok_or(ProtocolError::UnsupportedCommand {
        field: "CombatRequest.command",
    })?;

    let combat = match command {
        Pb::Move(cmd) => CombatCommand::Move {
            actor: actor_from_proto(cmd.actor, "MoveCommand.actor")?,
            point: required_point(cmd.point, "MoveCommand.point")?,
            queue: cmd.queue,
        },
        Pb::AttackMove(cmd) => CombatCommand::AttackMove {
            actor: actor_from_proto(cmd.actor, "MoveCommand.actor")?,
            point: required_point(cmd.point, "MoveCommand.point")?,
            queue: cmd.queue,
        },
        Pb::Attack(cmd) => CombatCommand::Attack {
            actor: actor_from_proto(cmd.actor, "AttackCommand.actor")?,
            target: UnitTag(cmd.target_tag),
            queue: cmd.queue,
        },
        Pb::UseTargetedAbility(cmd) => CombatCommand::UseTargetedAbility {
            ability_id: cmd.ability_id,
            actor: actor_from_proto(cmd.actor, "TargetedAbilityCommand.actor")?,
            target: UnitTag(cmd.target_tag),
            queue: cmd.queue,
        },
        Pb::UsePointCenteredAbility(cmd) => CombatCommand::UsePointCenteredAbility {
            ability_id: cmd.ability_id,
            actor: actor_from_proto(cmd.actor, "PointAbilityCommand.actor")?,
            point: required_point(cmd.point, "PointAbilityCommand.point")?,
            queue: cmd.queue,
        },
        Pb::UseTargetlessAbility(cmd) => CombatCommand::UseTargetlessAbility {
            ability_id: cmd.ability_id,
            actor: actor_from_proto(cmd.actor, "TargetlessAbilityCommand.actor")?,
            queue: cmd.queue,
        },
        Pb::SmartMove(cmd) => CombatCommand::SmartMove {
            actor: actor_from_proto(cmd.actor, "MoveCommand.actor")?,
            point: required_point(cmd.point, "MoveCommand.point")?,
            queue: cmd.queue,
        },
        Pb::SmartAttackMove(cmd) => CombatCommand::SmartAttackMove {
            actor: actor_from_proto(cmd.actor, "MoveCommand.actor")?,
            point: required_point(cmd.point, "MoveCommand.point")?,
            queue: cmd.queue,
        },
        Pb::SmartAttack(cmd) => CombatCommand::SmartAttack {
            actor: actor_from_proto(cmd.actor, "AttackCommand.actor")?,
            target: UnitTag(cmd.target_tag),
            queue: cmd.queue,
        },
        Pb::Squad(cmd) => CombatCommand::Squad(squad_from_proto(cmd)?),
    };

    Ok(combat)
}

fn squad_from_proto(request: pb::SquadRequest) -> Result<SquadCommand, ProtocolError> {
    use pb::squad_request::Change;

    let change = request.change.ok_or(ProtocolError::UnsupportedCommand {
        field: "SquadRequest.change",
    })?;

    let command = match change {
        Change::AddUnits(membership) => SquadCommand::AddUnits {
            squad: SquadId(membership.squad_id),
            units: membership.tags.into_iter().map(UnitTag).collect(),
        },
        Change::RemoveUnits(membership) => SquadCommand::RemoveUnits {
            squad: SquadId(membership.squad_id),
            units: membership.tags.into_iter().map(UnitTag).collect(),
        },
        Change::CreateSquad(create) => SquadCommand::CreateSquad {
            name: create.name,
            id: create.squad_id.map(SquadId),
        },
        Change::RemoveSquad(remove) => SquadCommand::RemoveSquad {
            squad: SquadId(remove.squad_id),
        },
    };

    Ok(command)
}

fn production_to_proto(command: &ProductionCommand) -> pb::ProductionRequest {
    use pb::production_request::Call;

    let call = match command {
        ProductionCommand::ClearBuildOrder => Call::ClearBuildOrder(pb::ClearBuildOrder {}),
        ProductionCommand::QueueUnit {
            unit_type,
            position,
            spacing,
            skippable,
        } => Call::QueueUnit(pb::QueueUnit {
            unit_type: *unit_type,
            position: position.map(point_to_proto),
            spacing: *spacing,
            skippable: *skippable,
        }),
        ProductionCommand::QueueTech {
            upgrade_id,
            skippable,
        } => Call::QueueTech(pb::QueueTech {
            upgrade_id: *upgrade_id,
            skippable: *skippable,
        }),
    };

    pb::ProductionRequest { call: Some(call) }
}

fn production_from_proto(
    request: pb::ProductionRequest,
) -> Result<ProductionCommand, ProtocolError> {
    use pb::production_request::Call;

    let call = request.call.ok_or(ProtocolError::UnsupportedCommand {
        field: "ProductionRequest.call",
    })?;

    let command = match call {
        Call::ClearBuildOrder(_) => ProductionCommand::ClearBuildOrder,
        Call::QueueUnit(queue) => ProductionCommand::QueueUnit {
            unit_type: queue.unit_type,
            position: queue.position.map(crate::point_from_proto),
            spacing: queue.spacing,
            skippable: queue.skippable,
        },
        Call::QueueTech(queue) => ProductionCommand::QueueTech {
            upgrade_id: queue.upgrade_id,
            skippable: queue.skippable,
        },
    };

    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> BridgeRequest {
        BridgeRequest {
            combat: vec![
                CombatCommand::Move {
                    actor: Actor::Unit(UnitTag(4_294_967_297)),
                    point: Point2D::new(32.5, 40.0),
                    queue: false,
                },
                CombatCommand::UseTargetlessAbility {
                    ability_id: 2_328,
                    actor: Actor::Squad(SquadId(3)),
                    queue: true,
                },
                CombatCommand::Squad(SquadCommand::CreateSquad {
                    name: "harass".into(),
                    id: None,
                }),
            ],
            production: vec![
                ProductionCommand::ClearBuildOrder,
                ProductionCommand::QueueUnit {
                    unit_type: 48,
                    position: None,
                    spacing: 0,
                    skippable: true,
                },
            ],
            raw: Some(RawCommand {
                payload: vec![0x0a, 0x00],
                expect_response: true,
            }),
            intel: Some(IntelMask::UNITS_SELF | IntelMask::EVENTS),
            restart: false,
            ack_step: Some(12),
        }
    }

    #[test]
    fn request_survives_the_wire() {
        let request = sample_request();
        let bytes = request.encode_to_vec().expect("encode");
        let decoded = BridgeRequest::decode(&bytes).expect("decode");
        assert_eq!(decoded, request);
        assert_eq!(decoded.command_count(), 6);
    }

    #[test]
    fn unknown_combat_variant_is_rejected() {
        // combat[0] carries only field 99 (varint 1), a command this build does not know.
        let bytes = [0x0a, 0x03, 0x98, 0x06, 0x01];
        let err = BridgeRequest::decode(&bytes).expect_err("unknown variant must not decode");
        assert!(matches!(
            err,
            ProtocolError::UnsupportedCommand {
                field: "CombatRequest.command"
            }
        ));
    }

    #[test]
    fn empty_production_call_is_rejected() {
        let proto = pb::BridgeRequest {
            production: vec![pb::ProductionRequest { call: None }],
            ..Default::default()
        };
        let err = BridgeRequest::try_from_proto(proto).expect_err("call required");
        assert!(matches!(err, ProtocolError::UnsupportedCommand { .. }));
    }

    #[test]
    fn move_without_point_is_malformed() {
        let proto = pb::BridgeRequest {
            combat: vec![pb::CombatRequest {
                command: Some(pb::combat_request::Command::Move(pb::MoveCommand {
                    actor: actor_to_proto(Actor::Unit(UnitTag(1))),
                    point: None,
                    queue: false,
                })),
            }],
            ..Default::default()
        };
        let err = BridgeRequest::try_from_proto(proto).expect_err("point required");
        assert!(matches!(
            err,
            ProtocolError::MissingField("MoveCommand.point")
        ));
    }

    #[test]
    fn absent_mask_keeps_current_selection() {
        let bytes = BridgeRequest::acknowledge(3).encode_to_vec().expect("encode");
        let decoded = BridgeRequest::decode(&bytes).expect("decode");
        assert_eq!(decoded.intel, None);
        assert_eq!(decoded.ack_step, Some(3));
        assert_eq!(decoded.command_count(), 0);
    }
}
