use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vitalstream::alarm::Bounds;
use vitalstream::config::{PipelineConfig, ReconnectConfig, SessionConfig, StreamConfig};
use vitalstream::engine::{ModelFactory, PipelineParts, PipelineState, StreamingPipeline};
use vitalstream::hal::mock::{
    FaultyModel, JsonCodec, RecordingActuator, RecordingRenderer, ScriptedConnector,
    ScriptedTransport, SimulatedConnector, SimulatedMonitorConfig, StubModel,
};
use vitalstream::hal::{BloodPressureModel, Connector};
use vitalstream::resilience::RestartPolicy;
use vitalstream::stream::TelemetryStream;

fn fast_config() -> StreamConfig {
    StreamConfig {
        port: "/dev/sim".to_string(),
        polling_interval_secs: 0.005,
        session: SessionConfig {
            retry_pause_secs: 0.0,
            receive_timeout_secs: 0.05,
            ..Default::default()
        },
        reconnect: ReconnectConfig {
            backoff_secs: 0.0,
            max_attempts: Some(1),
            blocking: true,
        },
        pipeline: PipelineConfig {
            estimation_window: 32,
            submit_interval_secs: 0.05,
            moving_average: 3,
            frame_rate: 50.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn simulated_stream(config: &StreamConfig, connector: impl Connector + 'static) -> TelemetryStream {
    TelemetryStream::new(config, Box::new(connector), Arc::new(JsonCodec::new()))
}

fn simulator() -> SimulatedConnector {
    SimulatedConnector::new(SimulatedMonitorConfig {
        reply_interval: Duration::from_millis(50),
        ..Default::default()
    })
}

fn stub_factory() -> ModelFactory {
    Box::new(|| Ok(Box::new(StubModel::new()) as Box<dyn BloodPressureModel>))
}

fn stop_after(pipeline: &StreamingPipeline, delay: Duration) {
    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        stop.store(true, Ordering::SeqCst);
    });
}

#[tokio::test]
async fn test_pipeline_streams_and_estimates() {
    let config = fast_config();
    let mut pipeline = StreamingPipeline::new(config.clone());
    let renderer = RecordingRenderer::new();
    let actuator = RecordingActuator::new();

    let parts = PipelineParts {
        stream: simulated_stream(&config, simulator()).with_stop_flag(pipeline.stop_handle()),
        model_factory: stub_factory(),
        render: Box::new(renderer.clone()),
        actuator: Box::new(actuator.clone()),
    };
    stop_after(&pipeline, Duration::from_millis(1500));

    let summary = pipeline.run(parts).await.unwrap();

    assert!(summary.frames_rendered > 0);
    assert_eq!(summary.estimator_restarts, 0);
    assert!(matches!(pipeline.state(), PipelineState::Completed { .. }));

    let frame = renderer.last_frame().unwrap();
    assert_eq!(frame.heart_rate, Some(72.0));
    assert_eq!(frame.spo2, Some(98.0));
    let systolic = frame.systolic.unwrap();
    assert!((systolic - 119.0).abs() < 0.01);
    assert!(!frame.ppg.is_empty());
    assert!(!frame.alarm_required);
    assert_eq!(actuator.starts(), 0);

    let snapshot = pipeline.metrics().snapshot();
    assert!(snapshot["producer"].items_processed > 0);
    assert!(snapshot["estimator"].items_processed > 0);
}

#[tokio::test]
async fn test_out_of_range_vital_sounds_alarm() {
    let config = fast_config();
    let mut pipeline = StreamingPipeline::new(config.clone());
    pipeline
        .thresholds()
        .update(|t| t.heart_rate = Bounds::new(90.0, 150.0));
    let actuator = RecordingActuator::new();

    let parts = PipelineParts {
        stream: simulated_stream(&config, simulator()).with_stop_flag(pipeline.stop_handle()),
        model_factory: stub_factory(),
        render: Box::new(RecordingRenderer::new()),
        actuator: Box::new(actuator.clone()),
    };
    stop_after(&pipeline, Duration::from_millis(1000));

    let summary = pipeline.run(parts).await.unwrap();

    assert_eq!(actuator.starts(), 1);
    // Silenced on shutdown
    assert_eq!(actuator.stops(), 1);
    assert!(summary.alarm_edges >= 1);
}

#[tokio::test]
async fn test_estimator_crash_is_restarted() {
    let config = fast_config();
    let mut pipeline = StreamingPipeline::new(config.clone());
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let factory: ModelFactory = Box::new(move || {
        let model: Box<dyn BloodPressureModel> = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Box::new(FaultyModel::panicking_on(1))
        } else {
            Box::new(StubModel::new())
        };
        Ok(model)
    });
    let renderer = RecordingRenderer::new();

    let parts = PipelineParts {
        stream: simulated_stream(&config, simulator()).with_stop_flag(pipeline.stop_handle()),
        model_factory: factory,
        render: Box::new(renderer.clone()),
        actuator: Box::new(RecordingActuator::new()),
    };
    stop_after(&pipeline, Duration::from_millis(1500));

    let summary = pipeline.run(parts).await.unwrap();

    assert_eq!(summary.estimator_restarts, 1);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert!(renderer.last_frame().unwrap().systolic.is_some());
}

#[tokio::test]
async fn test_estimator_crash_without_restarts_is_fatal() {
    let config = fast_config();
    let mut pipeline =
        StreamingPipeline::new(config.clone()).with_restart_policy(RestartPolicy::Never);
    let factory: ModelFactory =
        Box::new(|| Ok(Box::new(FaultyModel::panicking_on(1)) as Box<dyn BloodPressureModel>));

    let parts = PipelineParts {
        stream: simulated_stream(&config, simulator()).with_stop_flag(pipeline.stop_handle()),
        model_factory: factory,
        render: Box::new(RecordingRenderer::new()),
        actuator: Box::new(RecordingActuator::new()),
    };
    stop_after(&pipeline, Duration::from_secs(5));

    let err = pipeline.run(parts).await.unwrap_err();

    assert!(err.to_string().contains("estimator"));
    assert!(matches!(
        pipeline.state(),
        PipelineState::Error { recoverable: false, .. }
    ));
}

#[tokio::test]
async fn test_unreachable_monitor_fails_pipeline() {
    let config = fast_config();
    let mut pipeline = StreamingPipeline::new(config.clone());

    let parts = PipelineParts {
        stream: simulated_stream(&config, ScriptedConnector::new(Vec::<ScriptedTransport>::new()))
            .with_stop_flag(pipeline.stop_handle()),
        model_factory: stub_factory(),
        render: Box::new(RecordingRenderer::new()),
        actuator: Box::new(RecordingActuator::new()),
    };

    let err = pipeline.run(parts).await.unwrap_err();

    assert!(err.to_string().contains("producer"));
    assert!(matches!(pipeline.state(), PipelineState::Error { .. }));
}
