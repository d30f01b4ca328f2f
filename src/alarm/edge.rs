use tracing::{info, warn};

use crate::hal::AlarmActuator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmEdge {
    Started,
    Stopped,
}

/// Turns the level "alarm required" signal into tone start/stop edges.
///
/// Repeated values are no-ops, so the actuator sees each edge exactly once.
pub struct AlarmController {
    actuator: Box<dyn AlarmActuator>,
    active: bool,
}

impl AlarmController {
    pub fn new(actuator: Box<dyn AlarmActuator>) -> Self {
        Self {
            actuator,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn apply(&mut self, required: bool) -> Option<AlarmEdge> {
        match (self.active, required) {
            (false, true) => {
                warn!("Alarm raised, starting tone");
                self.actuator.start_tone();
                self.active = true;
                Some(AlarmEdge::Started)
            }
            (true, false) => {
                info!("Alarm cleared, stopping tone");
                self.actuator.stop_tone();
                self.active = false;
                Some(AlarmEdge::Stopped)
            }
            _ => None,
        }
    }

    /// Stop a sounding tone on shutdown
    pub fn silence(&mut self) {
        self.apply(false);
    }
}
