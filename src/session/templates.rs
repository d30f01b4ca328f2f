use std::time::Duration;

use crate::core::clock::duration_to_ticks;
use crate::core::{PollObject, Request};
use crate::hal::{CodecError, ProtocolCodec};

/// Outbound frames encoded once per session
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    pub association_request: Vec<u8>,
    pub association_abort: Vec<u8>,
    pub release_request: Vec<u8>,
    pub priority_list: Vec<u8>,
    pub poll_numeric: Vec<u8>,
    pub poll_wave: Vec<u8>,
    pub poll_alarm: Vec<u8>,
    pub keep_alive: Vec<u8>,
}

impl MessageTemplates {
    pub fn build(
        codec: &dyn ProtocolCodec,
        wave_labels: &[String],
        poll_duration: Duration,
    ) -> Result<Self, CodecError> {
        let duration_ticks = duration_to_ticks(poll_duration);
        let poll = |object| {
            codec.encode(&Request::ExtendedPoll {
                object,
                duration_ticks,
            })
        };

        Ok(Self {
            association_request: codec.encode(&Request::AssociationRequest)?,
            association_abort: codec.encode(&Request::AssociationAbort)?,
            release_request: codec.encode(&Request::ReleaseRequest)?,
            priority_list: codec.encode(&Request::SetPriorityListWave {
                labels: wave_labels.to_vec(),
            })?,
            poll_numeric: poll(PollObject::Numeric)?,
            poll_wave: poll(PollObject::Wave)?,
            poll_alarm: poll(PollObject::Alarm)?,
            keep_alive: codec.encode(&Request::SinglePoll)?,
        })
    }
}
