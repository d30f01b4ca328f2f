pub mod postprocess;
pub mod telemetry;

pub use postprocess::{PlethQuality, PostProcessor};
pub use telemetry::{StreamError, TelemetryStream};
