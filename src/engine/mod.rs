pub mod consumer;
pub mod dsp;
pub mod estimator;
pub mod gate;
pub mod messages;
pub mod pipeline;
pub mod producer;
pub mod state;

pub use consumer::Consumer;
pub use estimator::{run_estimator, Estimator};
pub use gate::{BusyFlag, SubmissionGate};
pub use messages::{DisplayFrame, EstimationRequest, EstimationResult, WaveFrame};
pub use pipeline::{ModelFactory, PipelineParts, PipelineSummary, Stage, StreamingPipeline};
pub use producer::Producer;
pub use state::PipelineState;
