pub mod clock;
pub mod message;
pub mod reading;

pub use clock::{MonitorClock, TICKS_PER_SECOND};
pub use message::{
    CreateEventParameters, Message, MessageKind, Observation, PollObject, PollReply, Request,
};
pub use reading::{channels, Airway, BloodPressure, ChannelValue, CondensedReading, RawReading};
