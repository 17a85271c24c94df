#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use bridge_core::{
    load_bridge_config_from_env, Actors, Bridge, BridgeConfig, CombatManager, Domain, DomainError,
    DriverConnection, IntelManager, ProductionManager, RawManager, UnitGroup,
};
use bridge_runtime::{
    Alliance, BridgeRequest, BridgeResponse, BuildItem, ColonyState, GameMapState,
    NotificationKind, PlayerCommon, Point2D, QueuedBuild, Score, UnitState, UnitTag,
};
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;

static INIT: Once = Once::new();

pub const SCV: u32 = 45;
pub const MARINE: u32 = 48;
pub const COMMAND_CENTER: u32 = 18;

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_bridge_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test bridge config at {}",
            config_path.display()
        );

        std::env::set_var("BRIDGE_CONFIG_PATH", &config_path);
    });
}

pub fn test_config() -> BridgeConfig {
    ensure_test_config();
    load_bridge_config_from_env()
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

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

#[derive(Debug, Default)]
pub struct WorldState {
    pub units: BTreeMap<UnitTag, UnitState>,
    pub game_loop: u32,
    pub minerals: u32,
}

/// Shared world the test mutates between steps.
#[derive(Debug, Clone, Default)]
pub struct World(Arc<Mutex<WorldState>>);

impl World {
    pub fn spawn(&self, tag: u64, unit_type: u32, alliance: Alliance) {
        let unit = UnitState {
            tag: UnitTag(tag),
            unit_type,
            alliance,
            owner: if alliance == Alliance::Enemy { 2 } else { 1 },
            position: Point2D::new(tag as f32, 10.0),
            health: 45.0,
            health_max: 45.0,
            build_progress: 1.0,
            ..Default::default()
        };
        self.0.lock().units.insert(UnitTag(tag), unit);
    }

    pub fn kill(&self, tag: u64) {
        self.0.lock().units.remove(&UnitTag(tag));
    }

    pub fn advance(&self, loops: u32) {
        self.0.lock().game_loop += loops;
    }

    fn select(&self, alliance: Alliance, filter: impl Fn(u32) -> bool) -> Vec<UnitState> {
        self.0
            .lock()
            .units
            .values()
            .filter(|unit| unit.alliance == alliance && filter(unit.unit_type))
            .cloned()
            .collect()
    }
}

impl IntelManager for World {
    fn map(&self) -> Option<GameMapState> {
        Some(GameMapState {
            width: 176,
            height: 144,
            playable_min: Point2D::new(8.0, 8.0),
            playable_max: Point2D::new(168.0, 136.0),
            start_locations: vec![Point2D::new(30.0, 30.0), Point2D::new(146.0, 114.0)],
        })
    }

    fn score(&self) -> Score {
        Score {
            score: 1_000,
            ..Default::default()
        }
    }

    fn common(&self) -> PlayerCommon {
        PlayerCommon {
            player_id: 1,
            minerals: self.0.lock().minerals,
            ..Default::default()
        }
    }

    fn upgrades_self(&self) -> Vec<u32> {
        Vec::new()
    }

    fn units(&self, group: UnitGroup) -> Vec<UnitState> {
        let structure = |t: u32| t == COMMAND_CENTER;
        let worker = |t: u32| t == SCV;
        let army = |t: u32| t != COMMAND_CENTER && t != SCV;
        match group {
            UnitGroup::StructuresSelf => self.select(Alliance::Own, structure),
            UnitGroup::WorkersSelf => self.select(Alliance::Own, worker),
            UnitGroup::UnitsSelf => self.select(Alliance::Own, army),
            UnitGroup::StructuresEnemy => self.select(Alliance::Enemy, structure),
            UnitGroup::UnitsEnemy => self.select(Alliance::Enemy, army),
            UnitGroup::WorkersEnemy => self.select(Alliance::Enemy, worker),
            UnitGroup::MineralFields
            | UnitGroup::VespeneGeysers
            | UnitGroup::Destructibles => Vec::new(),
        }
    }

    fn primary_colony(&self) -> Option<ColonyState> {
        None
    }

    fn colonies(&self) -> Vec<ColonyState> {
        Vec::new()
    }

    fn game_loop(&self) -> u32 {
        self.0.lock().game_loop
    }

    fn unit(&self, tag: UnitTag) -> Option<UnitState> {
        self.0.lock().units.get(&tag).cloned()
    }
}

fn tags(actors: &Actors) -> String {
    actors
        .tags()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub struct RecordingCombat(pub Journal);

impl RecordingCombat {
    fn point(&self, verb: &str, actors: &Actors, point: Point2D) -> Result<(), DomainError> {
        self.0
            .push(format!("{verb} {} @{},{}", tags(actors), point.x, point.y));
        Ok(())
    }

    fn target(&self, verb: &str, actors: &Actors, target: &UnitState) -> Result<(), DomainError> {
        self.0.push(format!("{verb} {} -> {}", tags(actors), target.tag));
        Ok(())
    }
}

impl CombatManager for RecordingCombat {
    fn move_to(&mut self, actors: &Actors, point: Point2D, _: bool) -> Result<(), DomainError> {
        self.point("move", actors, point)
    }
    fn attack_move(&mut self, actors: &Actors, point: Point2D, _: bool) -> Result<(), DomainError> {
        self.point("attack_move", actors, point)
    }
    fn attack(&mut self, actors: &Actors, target: &UnitState, _: bool) -> Result<(), DomainError> {
        self.target("attack", actors, target)
    }
    fn use_targeted_ability(
        &mut self,
        ability_id: u32,
        actors: &Actors,
        target: &UnitState,
        _: bool,
    ) -> Result<(), DomainError> {
        self.target(&format!("ability{ability_id}"), actors, target)
    }
    fn use_point_centered_ability(
        &mut self,
        ability_id: u32,
        actors: &Actors,
        point: Point2D,
        _: bool,
    ) -> Result<(), DomainError> {
        self.point(&format!("ability{ability_id}"), actors, point)
    }
    fn use_targetless_ability(
        &mut self,
        ability_id: u32,
        actors: &Actors,
        _: bool,
    ) -> Result<(), DomainError> {
        self.0.push(format!("ability{ability_id} {}", tags(actors)));
        Ok(())
    }
    fn smart_move(&mut self, actors: &Actors, point: Point2D, _: bool) -> Result<(), DomainError> {
        self.point("smart_move", actors, point)
    }
    fn smart_attack_move(
        &mut self,
        actors: &Actors,
        point: Point2D,
        _: bool,
    ) -> Result<(), DomainError> {
        self.point("smart_attack_move", actors, point)
    }
    fn smart_attack(
        &mut self,
        actors: &Actors,
        target: &UnitState,
        _: bool,
    ) -> Result<(), DomainError> {
        self.target("smart_attack", actors, target)
    }
}

/// Build order that also journals each mutation, so ordering against combat is visible.
#[derive(Default)]
pub struct RecordingProduction {
    journal: Journal,
    queue: Vec<QueuedBuild>,
}

impl ProductionManager for RecordingProduction {
    fn clear_build_order(&mut self) {
        self.journal.push("clear_build_order".into());
        self.queue.clear();
    }
    fn queue_unit(&mut self, unit_type: u32, position: Option<Point2D>, spacing: u32, skippable: bool) {
        self.journal.push(format!("queue_unit {unit_type}"));
        self.queue.push(QueuedBuild {
            item: BuildItem::Unit {
                unit_type,
                position,
                spacing,
            },
            skippable,
        });
    }
    fn queue_tech(&mut self, upgrade_id: u32, skippable: bool) {
        self.journal.push(format!("queue_tech {upgrade_id}"));
        self.queue.push(QueuedBuild {
            item: BuildItem::Tech { upgrade_id },
            skippable,
        });
    }
    fn build_order(&self) -> Vec<QueuedBuild> {
        self.queue.clone()
    }
}

/// Raw channel that answers every request with the payload reversed.
pub struct EchoRaw(pub Journal);

impl RawManager for EchoRaw {
    fn send(&mut self, payload: &[u8]) -> Result<(), DomainError> {
        self.0.push(format!("raw send {payload:?}"));
        Ok(())
    }
    fn request(&mut self, payload: &[u8], _: Duration) -> Result<Vec<u8>, DomainError> {
        self.0.push(format!("raw request {payload:?}"));
        Ok(payload.iter().rev().copied().collect())
    }
}

pub struct Harness {
    pub world: World,
    pub journal: Journal,
}

impl Harness {
    /// A world with one own marine (tag 1), one own SCV (tag 2) and one enemy marine (tag 90).
    pub fn new() -> Self {
        let world = World::default();
        world.spawn(1, MARINE, Alliance::Own);
        world.spawn(2, SCV, Alliance::Own);
        world.spawn(90, MARINE, Alliance::Enemy);
        Self {
            world,
            journal: Journal::default(),
        }
    }

    pub fn domain(&self) -> Domain {
        Domain::new(
            Box::new(self.world.clone()),
            Box::new(RecordingCombat(self.journal.clone())),
            Box::new(EchoRaw(self.journal.clone())),
        )
        .with_production(Box::new(RecordingProduction {
            journal: self.journal.clone(),
            queue: Vec::new(),
        }))
    }

    pub fn bridge(&self, config: BridgeConfig) -> Bridge {
        Bridge::new(config, self.domain()).expect("bridge builds")
    }
}

/// What the scripted driver sends back for one notification.
pub enum Reply {
    Requests(Vec<BridgeRequest>),
    Bytes(Vec<u8>),
    After(Duration, BridgeRequest),
    Ignore,
    Hangup,
}

impl Reply {
    pub fn ack(response: &BridgeResponse) -> Self {
        Reply::Requests(vec![ack_for(response)])
    }
}

pub fn ack_for(response: &BridgeResponse) -> BridgeRequest {
    let step = response.notification.map(|n| n.step).unwrap_or_default();
    BridgeRequest::acknowledge(step)
}

pub fn is_kind(response: &BridgeResponse, kind: NotificationKind) -> bool {
    response.notification.map(|n| n.kind) == Some(kind)
}

/// In-process driver dialled into a bridge over loopback.
pub struct ScriptedDriver {
    handle: JoinHandle<anyhow::Result<()>>,
    received: Receiver<BridgeResponse>,
}

impl ScriptedDriver {
    /// Connect to `bridge` and answer each notification with `script`.
    pub fn attach<F>(bridge: &mut Bridge, mut script: F) -> Self
    where
        F: FnMut(&BridgeResponse) -> Reply + Send + 'static,
    {
        let listener = bridge.open_endpoint().expect("endpoint binds");
        let addr = listener.local_addr();
        let (tx, received) = unbounded();

        let handle = thread::spawn(move || -> anyhow::Result<()> {
            let mut conn = DriverConnection::connect(addr).context("dial bridge")?;
            while let Ok(Some(frame)) = conn.recv() {
                let response = BridgeResponse::decode(&frame).context("decode response")?;
                let _ = tx.send(response.clone());
                if response.notification.is_none() {
                    continue;
                }
                match script(&response) {
                    Reply::Requests(requests) => {
                        for request in requests {
                            conn.send(&request.encode_to_vec()?)?;
                        }
                    }
                    Reply::Bytes(bytes) => conn.send(&bytes)?,
                    Reply::After(delay, request) => {
                        thread::sleep(delay);
                        // The bridge may already have given up and closed.
                        let _ = conn.send(&request.encode_to_vec()?);
                    }
                    Reply::Ignore => {}
                    Reply::Hangup => break,
                }
            }
            Ok(())
        });

        bridge.accept(listener).expect("driver connects");
        Self { handle, received }
    }

    /// Everything received so far.
    pub fn received(&self) -> Vec<BridgeResponse> {
        self.received.try_iter().collect()
    }

    pub fn next_received(&self, timeout: Duration) -> Option<BridgeResponse> {
        self.received.recv_timeout(timeout).ok()
    }

    pub fn join(self) -> anyhow::Result<()> {
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("driver thread panicked"))?
    }
}
