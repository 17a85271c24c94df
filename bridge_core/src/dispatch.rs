use std::time::Duration;

use bridge_runtime::{
    Actor, BridgeRequest, CombatCommand, ProductionCommand, RawCommand, SquadCommand, UnitState,
    UnitTag,
};
use tracing::{debug, trace, warn};

use crate::domain::{Actors, CombatManager, Domain};
use crate::error::DomainError;

/// Tally of one dispatched request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub applied: u32,
    pub skipped: u32,
    /// Reply to a raw command that asked for one.
    pub raw_response: Option<Vec<u8>>,
}

#[derive(Debug)]
enum Outcome {
    Applied,
    Skipped(&'static str),
    Failed(DomainError),
}

impl From<Result<(), DomainError>> for Outcome {
    fn from(result: Result<(), DomainError>) -> Self {
        match result {
            Ok(()) => Outcome::Applied,
            Err(err) => Outcome::Failed(err),
        }
    }
}

impl DispatchReport {
    fn record(&mut self, command: &'static str, outcome: Outcome) {
        match outcome {
            Outcome::Applied => {
                self.applied += 1;
                trace!(target: "bridge::dispatch", command, "command.applied");
            }
            Outcome::Skipped(reason) => {
                self.skipped += 1;
                debug!(target: "bridge::dispatch", command, reason, "command.skipped");
            }
            Outcome::Failed(err) => {
                self.skipped += 1;
                warn!(target: "bridge::dispatch", command, error = %err, "command.failed");
            }
        }
    }
}

/// Apply every command in `request`: combat in order, then production, then raw.
///
/// Unresolvable references and domain failures skip the single command they
/// belong to; the rest of the batch still runs.
pub fn dispatch(
    domain: &mut Domain,
    request: &BridgeRequest,
    raw_reply_timeout: Duration,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for command in &request.combat {
        let outcome = apply_combat(domain, command);
        report.record(command.name(), outcome);
    }
    for command in &request.production {
        apply_production(domain, command);
        report.record(command.name(), Outcome::Applied);
    }
    if let Some(raw) = &request.raw {
        let (outcome, reply) = apply_raw(domain, raw, raw_reply_timeout);
        report.raw_response = reply;
        report.record("raw", outcome);
    }

    report
}

fn resolve_actors(domain: &Domain, actor: Actor) -> Result<Actors, &'static str> {
    match actor {
        Actor::Unit(tag) => domain
            .intel
            .unit(tag)
            .map(Actors::Unit)
            .ok_or("unknown_unit"),
        Actor::Squad(id) => {
            let squad = domain.squads.get(id).ok_or("unknown_squad")?;
            let units: Vec<UnitState> = squad
                .units
                .iter()
                .filter_map(|tag| domain.intel.unit(*tag))
                .collect();
            if units.is_empty() {
                return Err("empty_squad");
            }
            Ok(Actors::Squad { id, units })
        }
    }
}

fn with_actors<F>(domain: &mut Domain, actor: Actor, apply: F) -> Outcome
where
    F: FnOnce(&mut dyn CombatManager, &Actors) -> Result<(), DomainError>,
{
    match resolve_actors(domain, actor) {
        Ok(actors) => apply(domain.combat.as_mut(), &actors).into(),
        Err(reason) => Outcome::Skipped(reason),
    }
}

fn with_target<F>(domain: &mut Domain, actor: Actor, target: UnitTag, apply: F) -> Outcome
where
    F: FnOnce(&mut dyn CombatManager, &Actors, &UnitState) -> Result<(), DomainError>,
{
    let Some(target) = domain.intel.unit(target) else {
        return Outcome::Skipped("unknown_target");
    };
    with_actors(domain, actor, |combat, actors| apply(combat, actors, &target))
}

fn apply_combat(domain: &mut Domain, command: &CombatCommand) -> Outcome {
    match *command {
        CombatCommand::Move {
            actor,
            point,
            queue,
        } => with_actors(domain, actor, |combat, actors| {
            combat.move_to(actors, point, queue)
        }),
        CombatCommand::AttackMove {
            actor,
            point,
            queue,
        } => with_actors(domain, actor, |combat, actors| {
            combat.attack_move(actors, point, queue)
        }),
        CombatCommand::Attack {
            actor,
            target,
            queue,
        } => with_target(domain, actor, target, |combat, actors, target| {
            combat.attack(actors, target, queue)
        }),
        CombatCommand::UseTargetedAbility {
            ability_id,
            actor,
            target,
            queue,
        } => with_target(domain, actor, target, |combat, actors, target| {
            combat.use_targeted_ability(ability_id, actors, target, queue)
        }),
        CombatCommand::UsePointCenteredAbility {
            ability_id,
            actor,
            point,
            queue,
        } => with_actors(domain, actor, |combat, actors| {
            combat.use_point_centered_ability(ability_id, actors, point, queue)
        }),
        CombatCommand::UseTargetlessAbility {
            ability_id,
            actor,
            queue,
        } => with_actors(domain, actor, |combat, actors| {
            combat.use_targetless_ability(ability_id, actors, queue)
        }),
        CombatCommand::SmartMove {
            actor,
            point,
            queue,
        } => with_actors(domain, actor, |combat, actors| {
            combat.smart_move(actors, point, queue)
        }),
        CombatCommand::SmartAttackMove {
            actor,
            point,
            queue,
        } => with_actors(domain, actor, |combat, actors| {
            combat.smart_attack_move(actors, point, queue)
        }),
        CombatCommand::SmartAttack {
            actor,
            target,
            queue,
        } => with_target(domain, actor, target, |combat, actors, target| {
            combat.smart_attack(actors, target, queue)
        }),
        CombatCommand::Squad(ref squad) => apply_squad(domain, squad),
    }
}

fn apply_squad(domain: &mut Domain, command: &SquadCommand) -> Outcome {
    match command {
        SquadCommand::AddUnits { squad, units } | SquadCommand::RemoveUnits { squad, units } => {
            if domain.squads.get(*squad).is_none() {
                return Outcome::Skipped("unknown_squad");
            }
            let adding = matches!(command, SquadCommand::AddUnits { .. });
            for tag in units {
                if domain.intel.unit(*tag).is_none() {
                    debug!(
                        target: "bridge::dispatch",
                        %squad,
                        %tag,
                        "member.skipped=unknown_unit"
                    );
                    continue;
                }
                if adding {
                    domain.squads.add_unit(*squad, *tag);
                } else {
                    domain.squads.remove_unit(*squad, *tag);
                }
            }
            Outcome::Applied
        }
        SquadCommand::CreateSquad { name, id } => match domain.squads.create(name, *id) {
            Ok(id) => {
                debug!(target: "bridge::dispatch", %id, name = %name, "squad.created");
                Outcome::Applied
            }
            Err(err) => Outcome::Failed(err),
        },
        SquadCommand::RemoveSquad { squad } => {
            if domain.squads.remove(*squad) {
                Outcome::Applied
            } else {
                Outcome::Skipped("unknown_squad")
            }
        }
    }
}

fn apply_production(domain: &mut Domain, command: &ProductionCommand) {
    let production = domain.production.as_mut();
    match *command {
        ProductionCommand::ClearBuildOrder => production.clear_build_order(),
        ProductionCommand::QueueUnit {
            unit_type,
            position,
            spacing,
            skippable,
        } => production.queue_unit(unit_type, position, spacing, skippable),
        ProductionCommand::QueueTech {
            upgrade_id,
            skippable,
        } => production.queue_tech(upgrade_id, skippable),
    }
}

fn apply_raw(
    domain: &mut Domain,
    raw: &RawCommand,
    timeout: Duration,
) -> (Outcome, Option<Vec<u8>>) {
    if !raw.expect_response {
        return (domain.raw.send(&raw.payload).into(), None);
    }
    match domain.raw.request(&raw.payload, timeout) {
        Ok(reply) => (Outcome::Applied, Some(reply)),
        Err(err) => (Outcome::Failed(err), None),
    }
}
