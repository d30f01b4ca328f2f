pub mod blink;
pub mod edge;
pub mod engine;
pub mod thresholds;
pub mod vital;

pub use blink::BlinkTimer;
pub use edge::{AlarmController, AlarmEdge};
pub use engine::{AlarmEngine, AlarmStatus, VitalSigns};
pub use thresholds::{AlarmThresholds, Bounds, SharedThresholds};
pub use vital::{Vital, VitalMonitor, VitalState};
