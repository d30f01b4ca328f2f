pub mod codec;
pub mod model;
pub mod monitor;
pub mod scripted;
pub mod sinks;

pub use codec::JsonCodec;
pub use model::{FaultyModel, StubModel};
pub use monitor::{SimulatedConnector, SimulatedMonitor, SimulatedMonitorConfig};
pub use scripted::{ScriptedConnector, ScriptedTransport};
pub use sinks::{LogActuator, LogRenderer, RecordingActuator, RecordingRenderer};
