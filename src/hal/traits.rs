use anyhow::Result;
use std::io;
use std::time::Duration;

use super::error::CodecError;
use crate::core::{Message, MessageKind, MonitorClock, PollReply, RawReading, Request};
use crate::engine::messages::DisplayFrame;

/// Byte-stream link to the monitor (serial port or equivalent)
///
/// Retry and backoff live in the session, never here.
pub trait Transport: Send {
    /// Write one encoded frame
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Wait up to `timeout` for one inbound frame
    fn receive(&mut self, timeout: Duration) -> Option<Vec<u8>>;

    /// Release the underlying port
    fn close(&mut self);
}

/// Acquires a fresh transport for a port identifier
pub trait Connector: Send {
    fn connect(&mut self, port: &str) -> io::Result<Box<dyn Transport>>;
}

/// Frame codec for the monitor protocol
pub trait ProtocolCodec: Send + Sync {
    /// Encode an outbound request into a wire frame
    fn encode(&self, request: &Request) -> Result<Vec<u8>, CodecError>;

    /// Cheap classification of an inbound frame
    fn classify(&self, frame: &[u8]) -> MessageKind;

    /// Full decode of an inbound frame
    fn decode(&self, frame: &[u8]) -> Result<Message, CodecError>;

    /// First-pass distillation of a poll reply into labelled values
    fn distill(&self, reply: &PollReply, clock: &MonitorClock) -> Option<RawReading>;
}

/// Blood-pressure inference model. Both calls are pure from the pipeline's view.
pub trait BloodPressureModel: Send {
    /// Arterial pressure waveform predicted from a normalized PPG window
    fn predict_waveform(&mut self, window: &[f32]) -> Result<Vec<f32>>;

    /// Normalized (diastolic, systolic, mean) predicted from a normalized PPG window
    fn predict_values(&mut self, normalized_window: &[f32]) -> Result<(f32, f32, f32)>;
}

/// Audible alarm tone generator. Calls are fire-and-forget.
pub trait AlarmActuator: Send {
    fn start_tone(&mut self);
    fn stop_tone(&mut self);
}

/// Display surface driven by the consumer stage
pub trait RenderSink: Send {
    fn render(&mut self, frame: &DisplayFrame);
}
