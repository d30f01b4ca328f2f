use std::collections::VecDeque;
use std::f64::consts::PI;
use std::io;
use std::time::{Duration, Instant, SystemTime};

use super::JsonCodec;
use crate::core::clock::duration_to_ticks;
use crate::core::{
    ChannelValue, CreateEventParameters, Message, Observation, PollObject, PollReply, Request,
};
use crate::hal::{Connector, Transport};

/// Behaviour of the simulated bedside monitor
#[derive(Debug, Clone)]
pub struct SimulatedMonitorConfig {
    pub heart_rate: f64,
    pub spo2: f64,
    /// Samples per wave reply: ECG 64 and Pleth 32 per quarter second
    pub ecg_samples: usize,
    pub pleth_samples: usize,
    pub reply_interval: Duration,
    /// Advertised minimum poll period (drives the keep-alive interval)
    pub min_poll_period: Duration,
    /// Send an AssociationAbort after this many data replies
    pub abort_after_replies: Option<u64>,
}

impl Default for SimulatedMonitorConfig {
    fn default() -> Self {
        Self {
            heart_rate: 72.0,
            spo2: 98.0,
            ecg_samples: 64,
            pleth_samples: 32,
            reply_interval: Duration::from_millis(250),
            min_poll_period: Duration::from_secs(10),
            abort_after_replies: None,
        }
    }
}

/// In-process peer that answers the association handshake and then streams
/// synthetic ECG, Pleth and numerics in real time.
pub struct SimulatedMonitor {
    config: SimulatedMonitorConfig,
    created: Instant,
    outbound: VecDeque<Message>,
    streaming_waves: bool,
    streaming_numerics: bool,
    next_reply: Instant,
    replies_sent: u64,
    ecg_phase: f64,
    pleth_phase: f64,
    closed: bool,
}

impl SimulatedMonitor {
    pub fn new(config: SimulatedMonitorConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            created: now,
            outbound: VecDeque::new(),
            streaming_waves: false,
            streaming_numerics: false,
            next_reply: now,
            replies_sent: 0,
            ecg_phase: 0.0,
            pleth_phase: 0.0,
            closed: false,
        }
    }

    fn relative_now(&self) -> u32 {
        duration_to_ticks(self.created.elapsed())
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::AssociationRequest => {
                self.outbound.push_back(Message::AssociationResponse {
                    min_poll_period: duration_to_ticks(self.config.min_poll_period),
                });
                self.outbound.push_back(Message::MdsCreateEvent {
                    absolute_time: SystemTime::now(),
                    relative_time: self.relative_now(),
                    parameters: CreateEventParameters {
                        invoke_id: 1,
                        managed_object: 33,
                        event_time: self.relative_now(),
                    },
                });
            }
            Request::CreateEventResult { .. } => {}
            Request::SetPriorityListWave { labels } => {
                self.outbound.push_back(Message::MdsSetPriorityListResult {
                    wave_labels: Some(labels),
                });
            }
            Request::ExtendedPoll { object, .. } => match object {
                PollObject::Wave => {
                    self.streaming_waves = true;
                    self.next_reply = Instant::now();
                }
                PollObject::Numeric => self.streaming_numerics = true,
                PollObject::Alarm => {}
            },
            Request::SinglePoll => self.outbound.push_back(Message::MdsSinglePollActionResult),
            Request::AssociationAbort => {
                self.streaming_waves = false;
                self.streaming_numerics = false;
            }
            Request::ReleaseRequest => {
                self.outbound.clear();
                self.outbound.push_back(Message::ReleaseResponse);
            }
        }
    }

    fn next_ecg(&mut self) -> Vec<f64> {
        let beat_hz = self.config.heart_rate / 60.0;
        let step = beat_hz / (self.config.ecg_samples as f64 * 4.0);
        (0..self.config.ecg_samples)
            .map(|_| {
                self.ecg_phase = (self.ecg_phase + step) % 1.0;
                // narrow R spike on a small baseline wobble
                let spike = (-((self.ecg_phase - 0.1) * 40.0).powi(2)).exp();
                0.05 * (2.0 * PI * self.ecg_phase).sin() + 1.2 * spike
            })
            .collect()
    }

    fn next_pleth(&mut self) -> Vec<f64> {
        let beat_hz = self.config.heart_rate / 60.0;
        let step = 2.0 * PI * beat_hz / (self.config.pleth_samples as f64 * 4.0);
        (0..self.config.pleth_samples)
            .map(|_| {
                self.pleth_phase = (self.pleth_phase + step) % (2.0 * PI);
                2000.0 + 800.0 * self.pleth_phase.sin() + 200.0 * (2.0 * self.pleth_phase).sin()
            })
            .collect()
    }

    fn emit_data(&mut self) {
        self.replies_sent += 1;
        if let Some(limit) = self.config.abort_after_replies {
            if self.replies_sent > limit {
                self.streaming_waves = false;
                self.streaming_numerics = false;
                self.outbound.push_back(Message::AssociationAbort);
                return;
            }
        }

        let relative_time = self.relative_now();
        let sequence_no = (self.replies_sent % u16::MAX as u64) as u16;
        let ecg = self.next_ecg();
        let pleth = self.next_pleth();
        self.outbound
            .push_back(Message::MdsExtendedPollActionResult(PollReply {
                object: PollObject::Wave,
                relative_time,
                sequence_no,
                observations: vec![
                    Observation {
                        label: "NOM_ECG_ELEC_POTL_II".to_string(),
                        value: ChannelValue::Wave(ecg),
                    },
                    Observation {
                        label: "PLETH wave label".to_string(),
                        value: ChannelValue::Wave(pleth),
                    },
                ],
                alarms: vec![],
            }));

        if self.streaming_numerics {
            self.outbound
                .push_back(Message::LinkedMdsExtendedPollActionResult(PollReply {
                    object: PollObject::Numeric,
                    relative_time,
                    sequence_no,
                    observations: vec![
                        Observation {
                            label: "Heart Rate".to_string(),
                            value: ChannelValue::Scalar(self.config.heart_rate),
                        },
                        Observation {
                            label: "Arterial Oxygen Saturation".to_string(),
                            value: ChannelValue::Scalar(self.config.spo2),
                        },
                    ],
                    alarms: vec![],
                }));
        }
    }
}

impl Transport for SimulatedMonitor {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        match JsonCodec::parse_request(frame) {
            Some(request) => self.handle_request(request),
            None => {
                self.outbound.push_back(Message::RemoteOperationError { error_value: 1 });
            }
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        if self.closed {
            return None;
        }
        if let Some(message) = self.outbound.pop_front() {
            return Some(JsonCodec::frame(&message));
        }
        if !self.streaming_waves {
            std::thread::sleep(timeout.min(Duration::from_millis(50)));
            return None;
        }

        let now = Instant::now();
        if now < self.next_reply {
            let wait = self.next_reply - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return None;
            }
            std::thread::sleep(wait);
        }
        self.next_reply += self.config.reply_interval;
        self.emit_data();
        self.outbound.pop_front().map(|message| JsonCodec::frame(&message))
    }

    fn close(&mut self) {
        self.closed = true;
        self.outbound.clear();
    }
}

/// Connector producing a fresh simulated monitor per connection
#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector {
    config: SimulatedMonitorConfig,
}

impl SimulatedConnector {
    pub fn new(config: SimulatedMonitorConfig) -> Self {
        Self { config }
    }
}

impl Connector for SimulatedConnector {
    fn connect(&mut self, _port: &str) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(SimulatedMonitor::new(self.config.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MessageKind;
    use crate::hal::ProtocolCodec;

    fn send(monitor: &mut SimulatedMonitor, request: Request) {
        let frame = JsonCodec.encode(&request).unwrap();
        monitor.send(&frame).unwrap();
    }

    fn next_kind(monitor: &mut SimulatedMonitor) -> Option<MessageKind> {
        monitor
            .receive(Duration::from_millis(500))
            .map(|frame| JsonCodec.classify(&frame))
    }

    #[test]
    fn test_handshake_then_stream() {
        let mut monitor = SimulatedMonitor::new(SimulatedMonitorConfig {
            reply_interval: Duration::from_millis(5),
            ..Default::default()
        });

        send(&mut monitor, Request::AssociationRequest);
        assert_eq!(next_kind(&mut monitor), Some(MessageKind::AssociationResponse));
        assert_eq!(next_kind(&mut monitor), Some(MessageKind::MdsCreateEvent));

        send(&mut monitor, Request::ExtendedPoll { object: PollObject::Numeric, duration_ticks: 1 });
        send(&mut monitor, Request::ExtendedPoll { object: PollObject::Wave, duration_ticks: 1 });
        assert_eq!(next_kind(&mut monitor), Some(MessageKind::MdsExtendedPollActionResult));
        assert_eq!(next_kind(&mut monitor), Some(MessageKind::LinkedMdsExtendedPollActionResult));
    }

    #[test]
    fn test_release_is_answered() {
        let mut monitor = SimulatedMonitor::new(SimulatedMonitorConfig::default());
        send(&mut monitor, Request::ReleaseRequest);
        assert_eq!(next_kind(&mut monitor), Some(MessageKind::ReleaseResponse));
    }
}
