use std::time::Duration;

use bridge_core::bridge_runtime::{
    Alliance, BridgeResponse, ColonyState, GameMapState, IntelEvent, IntelEventKind, IntelMask,
    Notification, NotificationKind, PlayerCommon, Point2D, Score, UnitState, UnitTag,
};
use bridge_core::{
    bundle, Actors, CombatManager, Domain, DomainError, IntelManager, RawManager, UnitGroup,
};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

/// Synthetic world with `per_group` units in every unit list.
struct Crowd {
    per_group: u64,
}

impl Crowd {
    fn group(&self, offset: u64, alliance: Alliance) -> Vec<UnitState> {
        (0..self.per_group)
            .map(|i| UnitState {
                tag: UnitTag(offset + i),
                unit_type: 48,
                alliance,
                position: Point2D::new(i as f32, offset as f32),
                health: 45.0,
                health_max: 45.0,
                ..Default::default()
            })
            .collect()
    }
}

impl IntelManager for Crowd {
    fn map(&self) -> Option<GameMapState> {
        Some(GameMapState {
            width: 200,
            height: 176,
            ..Default::default()
        })
    }
    fn score(&self) -> Score {
        Score::default()
    }
    fn common(&self) -> PlayerCommon {
        PlayerCommon::default()
    }
    fn upgrades_self(&self) -> Vec<u32> {
        vec![1, 2, 3]
    }
    fn units(&self, group: UnitGroup) -> Vec<UnitState> {
        let (offset, alliance) = match group {
            UnitGroup::StructuresSelf => (1_000_000, Alliance::Own),
            UnitGroup::WorkersSelf => (2_000_000, Alliance::Own),
            UnitGroup::UnitsSelf => (3_000_000, Alliance::Own),
            UnitGroup::StructuresEnemy => (4_000_000, Alliance::Enemy),
            UnitGroup::UnitsEnemy => (5_000_000, Alliance::Enemy),
            UnitGroup::WorkersEnemy => (6_000_000, Alliance::Enemy),
            UnitGroup::MineralFields => (7_000_000, Alliance::Neutral),
            UnitGroup::VespeneGeysers => (8_000_000, Alliance::Neutral),
            UnitGroup::Destructibles => (9_000_000, Alliance::Neutral),
        };
        self.group(offset, alliance)
    }
    fn primary_colony(&self) -> Option<ColonyState> {
        None
    }
    fn colonies(&self) -> Vec<ColonyState> {
        Vec::new()
    }
    fn game_loop(&self) -> u32 {
        10_000
    }
    fn unit(&self, tag: UnitTag) -> Option<UnitState> {
        Some(UnitState {
            tag,
            ..Default::default()
        })
    }
}

struct Idle;

impl CombatManager for Idle {
    fn move_to(&mut self, _: &Actors, _: Point2D, _: bool) -> Result<(), DomainError> {
        Ok(())
    }
    fn attack_move(&mut self, _: &Actors, _: Point2D, _: bool) -> Result<(), DomainError> {
        Ok(())
    }
    fn attack(&mut self, _: &Actors, _: &UnitState, _: bool) -> Result<(), DomainError> {
        Ok(())
    }
    fn use_targeted_ability(
        &mut self,
        _: u32,
        _: &Actors,
        _: &UnitState,
        _: bool,
    ) -> Result<(), DomainError> {
        Ok(())
    }
    fn use_point_centered_ability(
        &mut self,
        _: u32,
        _: &Actors,
        _: Point2D,
        _: bool,
    ) -> Result<(), DomainError> {
        Ok(())
    }
    fn use_targetless_ability(&mut self, _: u32, _: &Actors, _: bool) -> Result<(), DomainError> {
        Ok(())
    }
    fn smart_move(&mut self, _: &Actors, _: Point2D, _: bool) -> Result<(), DomainError> {
        Ok(())
    }
    fn smart_attack_move(&mut self, _: &Actors, _: Point2D, _: bool) -> Result<(), DomainError> {
        Ok(())
    }
    fn smart_attack(&mut self, _: &Actors, _: &UnitState, _: bool) -> Result<(), DomainError> {
        Ok(())
    }
}

impl RawManager for Idle {
    fn send(&mut self, _: &[u8]) -> Result<(), DomainError> {
        Ok(())
    }
    fn request(&mut self, _: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        Err(DomainError::RawReplyTimeout(timeout))
    }
}

fn domain(per_group: u64) -> Domain {
    let mut domain = Domain::new(
        Box::new(Crowd { per_group }),
        Box::new(Idle),
        Box::new(Idle),
    );
    domain.events.subscribe();
    for i in 0..per_group {
        domain
            .events
            .record(IntelEvent::new(IntelEventKind::UnitAddedEnemy, UnitTag(i)));
    }
    domain
}

fn bench_bundle(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle");

    for per_group in [16u64, 64, 256, 1024] {
        group.bench_with_input(
            BenchmarkId::new("all_categories", per_group),
            &per_group,
            |b, &per_group| {
                b.iter_batched(
                    || domain(per_group),
                    |mut domain| {
                        let intel = bundle(&mut domain, IntelMask::all());
                        BridgeResponse::notify(
                            Notification::new(NotificationKind::GameStep, 1),
                            Some(intel),
                        )
                        .encode_to_vec()
                    },
                    BatchSize::SmallInput,
                )
            },
        );
        group.bench_with_input(
            BenchmarkId::new("units_self_only", per_group),
            &per_group,
            |b, &per_group| {
                b.iter_batched(
                    || domain(per_group),
                    |mut domain| bundle(&mut domain, IntelMask::UNITS_SELF),
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(bundle_benches, bench_bundle);
criterion_main!(bundle_benches);
