use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use super::reading::ChannelValue;

/// Classification of an inbound frame, as reported by the protocol codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    AssociationResponse,
    AssociationAbort,
    ReleaseRequest,
    ReleaseResponse,
    MdsCreateEvent,
    MdsCreateEventResult,
    MdsSetPriorityListResult,
    MdsExtendedPollActionResult,
    LinkedMdsExtendedPollActionResult,
    MdsSinglePollActionResult,
    RemoteOperationError,
    TimeoutError,
    Unknown,
}

impl MessageKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AssociationResponse => "AssociationResponse",
            Self::AssociationAbort => "AssociationAbort",
            Self::ReleaseRequest => "ReleaseRequest",
            Self::ReleaseResponse => "ReleaseResponse",
            Self::MdsCreateEvent => "MDSCreateEvent",
            Self::MdsCreateEventResult => "MDSCreateEventResult",
            Self::MdsSetPriorityListResult => "MDSSetPriorityListResult",
            Self::MdsExtendedPollActionResult => "MDSExtendedPollActionResult",
            Self::LinkedMdsExtendedPollActionResult => "LinkedMDSExtendedPollActionResult",
            Self::MdsSinglePollActionResult => "MDSSinglePollActionResult",
            Self::RemoteOperationError => "RemoteOperationError",
            Self::TimeoutError => "TimeoutError",
            Self::Unknown => "Unknown",
        }
    }

    /// Extended poll results, plain or linked
    pub fn is_poll_result(&self) -> bool {
        matches!(
            self,
            Self::MdsExtendedPollActionResult | Self::LinkedMdsExtendedPollActionResult
        )
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which MDIB object class an extended poll targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollObject {
    Numeric,
    Wave,
    Alarm,
}

/// Opaque parameters echoed back in the Create-Event-Result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEventParameters {
    pub invoke_id: u16,
    pub managed_object: u16,
    pub event_time: u32,
}

/// One labelled observation inside a poll reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub label: String,
    pub value: ChannelValue,
}

/// Decoded body of an extended poll result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollReply {
    pub object: PollObject,
    /// Monitor relative time of the reply, in 1/8000 s ticks
    pub relative_time: u32,
    pub sequence_no: u16,
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub alarms: Vec<String>,
}

/// Decoded inbound message. Each variant carries only the fields its kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Message {
    AssociationResponse {
        /// Minimum poll period in relative-time ticks
        min_poll_period: u32,
    },
    AssociationAbort,
    ReleaseRequest,
    ReleaseResponse,
    MdsCreateEvent {
        absolute_time: SystemTime,
        relative_time: u32,
        parameters: CreateEventParameters,
    },
    MdsCreateEventResult,
    MdsSetPriorityListResult {
        /// Present only when the wave priority list was accepted
        wave_labels: Option<Vec<String>>,
    },
    MdsExtendedPollActionResult(PollReply),
    LinkedMdsExtendedPollActionResult(PollReply),
    MdsSinglePollActionResult,
    RemoteOperationError {
        error_value: u16,
    },
    TimeoutError,
    Unknown,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::AssociationResponse { .. } => MessageKind::AssociationResponse,
            Self::AssociationAbort => MessageKind::AssociationAbort,
            Self::ReleaseRequest => MessageKind::ReleaseRequest,
            Self::ReleaseResponse => MessageKind::ReleaseResponse,
            Self::MdsCreateEvent { .. } => MessageKind::MdsCreateEvent,
            Self::MdsCreateEventResult => MessageKind::MdsCreateEventResult,
            Self::MdsSetPriorityListResult { .. } => MessageKind::MdsSetPriorityListResult,
            Self::MdsExtendedPollActionResult(_) => MessageKind::MdsExtendedPollActionResult,
            Self::LinkedMdsExtendedPollActionResult(_) => {
                MessageKind::LinkedMdsExtendedPollActionResult
            }
            Self::MdsSinglePollActionResult => MessageKind::MdsSinglePollActionResult,
            Self::RemoteOperationError { .. } => MessageKind::RemoteOperationError,
            Self::TimeoutError => MessageKind::TimeoutError,
            Self::Unknown => MessageKind::Unknown,
        }
    }
}

/// Outbound message to be encoded by the protocol codec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request")]
pub enum Request {
    AssociationRequest,
    AssociationAbort,
    ReleaseRequest,
    CreateEventResult { parameters: CreateEventParameters },
    SetPriorityListWave { labels: Vec<String> },
    ExtendedPoll { object: PollObject, duration_ticks: u32 },
    /// Single poll used as keep-alive
    SinglePoll,
}
