use std::io;
use std::time::Duration;

use bridge_runtime::{EncodeError, ProtocolError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind driver endpoint on {host}: {source}")]
    Bind {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn driver {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("driver did not connect within {0:?}")]
    AcceptTimeout(Duration),
    #[error("failed to accept driver connection: {0}")]
    Accept(#[source] io::Error),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to send frame: {0}")]
    Send(#[source] io::Error),
    #[error("failed to receive frame: {0}")]
    Receive(#[source] io::Error),
    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    #[error("driver connection closed")]
    Closed,
    #[error("no driver connected")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("driver did not acknowledge step {step} within {waited:?}")]
    BarrierTimeout { step: u64, waited: Duration },
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("failed to encode response: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("`{operation}` is not valid while the session is {state}")]
    InvalidLifecycle {
        operation: &'static str,
        state: SessionState,
    },
    #[error("step {pending} is still awaiting acknowledgement")]
    BarrierAlreadyArmed { pending: u64 },
    #[error("session failed: {0}")]
    SessionFailed(String),
}

/// Failure reported by a domain manager for a single command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("command rejected: {0}")]
    Rejected(String),
    #[error("squad {0} already exists")]
    DuplicateSquad(u64),
    #[error("raw reply not received within {0:?}")]
    RawReplyTimeout(Duration),
    #[error("raw channel unavailable: {0}")]
    RawChannel(String),
}
