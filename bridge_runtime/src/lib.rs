//! Wire protocol for the external decision bridge.
//!
//! Re-exports the data contracts from `bridge_schema` and layers the protobuf
//! envelopes on top: [`BridgeRequest`] travels from the driver to the core,
//! [`BridgeResponse`] travels back. Both directions can be encoded and decoded
//! so driver implementations written in Rust share the same types.

pub use bridge_schema::*;

mod commands;
mod envelope;
mod intel;

use thiserror::Error;

mod proto {
    include!(concat!(env!("OUT_DIR"), "/bridge.protocol.rs"));
}

use proto as pb;

pub use commands::{
    Actor, BridgeRequest, CombatCommand, ProductionCommand, RawCommand, SquadCommand,
};
pub use envelope::{BridgeResponse, Notification, NotificationKind};

/// Error returned when encoding an envelope fails.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encode failed: {0}")]
    Encode(#[from] prost::EncodeError),
}

/// Error returned when an inbound frame cannot be turned into an envelope.
///
/// An absent `oneof` is what a driver speaking a newer protocol produces when
/// it sends a command variant this build does not know; it decodes to
/// [`ProtocolError::UnsupportedCommand`] rather than being skipped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("unsupported command variant in {field}")]
    UnsupportedCommand { field: &'static str },
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("invalid enum value {value} for {field}")]
    InvalidEnum { field: &'static str, value: i32 },
}

fn point_to_proto(point: Point2D) -> pb::Point {
    pb::Point {
        x: point.x,
        y: point.y,
    }
}

fn point_from_proto(point: pb::Point) -> Point2D {
    Point2D::new(point.x, point.y)
}

fn required_point(
    point: Option<pb::Point>,
    field: &'static str,
) -> Result<Point2D, ProtocolError> {
    point
        .map(point_from_proto)
        .ok_or(ProtocolError::MissingField(field))
}
