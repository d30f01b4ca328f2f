pub mod sampled;
pub mod window;

pub use sampled::SampledDataBuffer;
pub use window::RollingWindow;
