use crate::core::{Message, MessageKind, MonitorClock, PollReply, RawReading, Request};
use crate::hal::{CodecError, ProtocolCodec};

/// Codec that puts `Request`/`Message` values on the wire as JSON.
///
/// Stands in for the binary MDIB codec in tests and in the simulated monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encode an inbound message the way the peer would send it
    pub fn frame(message: &Message) -> Vec<u8> {
        serde_json::to_vec(message).unwrap_or_default()
    }

    /// Decode an outbound request the way the peer would read it
    pub fn parse_request(frame: &[u8]) -> Option<Request> {
        serde_json::from_slice(frame).ok()
    }
}

impl ProtocolCodec for JsonCodec {
    fn encode(&self, request: &Request) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(request).map_err(|e| CodecError::Encode {
            request: format!("{:?}", request),
            message: e.to_string(),
        })
    }

    fn classify(&self, frame: &[u8]) -> MessageKind {
        self.decode(frame)
            .map(|message| message.kind())
            .unwrap_or(MessageKind::Unknown)
    }

    fn decode(&self, frame: &[u8]) -> Result<Message, CodecError> {
        serde_json::from_slice(frame).map_err(|e| CodecError::Malformed {
            len: frame.len(),
            message: e.to_string(),
        })
    }

    fn distill(&self, reply: &PollReply, clock: &MonitorClock) -> Option<RawReading> {
        if reply.observations.is_empty() && reply.alarms.is_empty() {
            return None;
        }

        let mut raw = RawReading::new(clock.timestamp_for(reply.relative_time));
        for observation in &reply.observations {
            raw.values
                .insert(observation.label.clone(), observation.value.clone());
        }
        raw.alarms = reply.alarms.clone();
        Some(raw)
    }
}
