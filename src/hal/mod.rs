pub mod error;
pub mod mock;
pub mod traits;

pub use error::CodecError;
pub use traits::{
    AlarmActuator, BloodPressureModel, Connector, ProtocolCodec, RenderSink, Transport,
};
