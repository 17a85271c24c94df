use prost::Message;

use crate::intel::{snapshot_from_proto, snapshot_to_proto};
use crate::{pb, EncodeError, IntelSnapshot, ProtocolError};

/// Lifecycle signal the core pushes to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Initialize,
    GameStart,
    GameStep,
    GameEnded,
    Restart,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Initialize => "initialize",
            NotificationKind::GameStart => "game_start",
            NotificationKind::GameStep => "game_step",
            NotificationKind::GameEnded => "game_ended",
            NotificationKind::Restart => "restart",
        }
    }

    /// Whether a notification of this kind carries an intel snapshot.
    pub fn carries_intel(self) -> bool {
        matches!(self, NotificationKind::GameStart | NotificationKind::GameStep)
    }

    fn to_proto(self) -> pb::NotificationType {
        match self {
            NotificationKind::Initialize => pb::NotificationType::Initialize,
            NotificationKind::GameStart => pb::NotificationType::GameStart,
            NotificationKind::GameStep => pb::NotificationType::GameStep,
            NotificationKind::GameEnded => pb::NotificationType::GameEnded,
            NotificationKind::Restart => pb::NotificationType::Restart,
        }
    }

    fn from_proto(value: i32) -> Result<Self, ProtocolError> {
        match pb::NotificationType::try_from(value) {
            Ok(pb::NotificationType::Initialize) => Ok(NotificationKind::Initialize),
            Ok(pb::NotificationType::GameStart) => Ok(NotificationKind::GameStart),
            Ok(pb::NotificationType::GameStep) => Ok(NotificationKind::GameStep),
            Ok(pb::NotificationType::GameEnded) => Ok(NotificationKind::GameEnded),
            Ok(pb::NotificationType::Restart) => Ok(NotificationKind::Restart),
            _ => Err(ProtocolError::InvalidEnum {
                field: "NotificationType",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Generation of the barrier armed for this notification.
    pub step: u64,
}

impl Notification {
    pub fn new(kind: NotificationKind, step: u64) -> Self {
        Self { kind, step }
    }
}

/// Everything the core sends to the driver in one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeResponse {
    pub notification: Option<Notification>,
    pub intel: Option<IntelSnapshot>,
    pub raw_response: Option<Vec<u8>>,
}

impl BridgeResponse {
    pub fn notify(notification: Notification, intel: Option<IntelSnapshot>) -> Self {
        Self {
            notification: Some(notification),
            intel,
            raw_response: None,
        }
    }

    pub fn raw(payload: Vec<u8>) -> Self {
        Self {
            raw_response: Some(payload),
            ..Default::default()
        }
    }

    pub fn encode_to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let proto = self.to_proto();
        let mut buffer = Vec::with_capacity(proto.encoded_len());
        proto.encode(&mut buffer)?;
        Ok(buffer)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let proto = pb::BridgeResponse::decode(bytes)?;
        Self::try_from_proto(proto)
    }

    fn to_proto(&self) -> pb::BridgeResponse {
        pb::BridgeResponse {
            notification: self.notification.map(|notification| pb::Notification {
                kind: notification.kind.to_proto() as i32,
                step: notification.step,
            }),
            intel: self.intel.as_ref().map(snapshot_to_proto),
            raw_response: self
                .raw_response
                .as_ref()
                .map(|payload| pb::RawResponse {
                    payload: payload.clone(),
                }),
        }
    }

    fn try_from_proto(proto: pb::BridgeResponse) -> Result<Self, ProtocolError> {
        let notification = match proto.notification {
            Some(notification) => Some(Notification {
                kind: NotificationKind::from_proto(notification.kind)?,
                step: notification.step,
            }),
            None => None,
        };
        let intel = proto.intel.map(snapshot_from_proto).transpose()?;

        Ok(BridgeResponse {
            notification,
            intel,
            raw_response: proto.raw_response.map(|raw| raw.payload),
        })
    }
}
