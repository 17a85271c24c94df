//! External decision bridge.
//!
//! Lets a driver process steer a host control loop one step at a time. Each
//! step the loop sends the driver a filtered intel snapshot and blocks until
//! the driver's commands for that step have been applied (see [`Bridge`]).

pub mod barrier;
pub mod config;
pub mod dispatch;
pub mod domain;
mod error;
pub mod intel;
pub mod metrics;
pub mod network;
mod production;
mod session;
mod squads;

#[cfg(test)]
mod testing;

pub use barrier::{BarrierWait, StepBarrier, WaitOutcome};
pub use config::{
    load_bridge_config_from_env, BridgeConfig, ConfigError, DriverLaunch, EarlyReplyPolicy,
};
pub use dispatch::{dispatch, DispatchReport};
pub use domain::{
    Actors, CombatManager, Domain, EventQueue, IntelManager, ProductionManager, RawManager,
    SquadRecord, SquadRepository, UnitGroup,
};
pub use error::{BridgeError, DomainError, TransportError};
pub use intel::bundle;
pub use metrics::BridgeMetrics;
pub use network::{DriverConnection, DriverListener, Inbound};
pub use production::BuildQueue;
pub use session::{Bridge, SessionState, StepOutcome};
pub use squads::SquadRoster;

pub use bridge_runtime;
