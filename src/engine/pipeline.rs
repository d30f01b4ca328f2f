use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use super::consumer::Consumer;
use super::dsp::LowPass;
use super::estimator::{run_estimator, Estimator};
use super::gate::{BusyFlag, SubmissionGate};
use super::messages::{EstimationRequest, EstimationResult, WaveFrame};
use super::producer::Producer;
use super::state::PipelineState;
use crate::alarm::{AlarmController, AlarmEngine, SharedThresholds};
use crate::config::StreamConfig;
use crate::hal::{AlarmActuator, BloodPressureModel, RenderSink};
use crate::observability::{MetricsCollector, StageMetrics};
use crate::resilience::RestartPolicy;
use crate::stream::TelemetryStream;

/// Builds a fresh model for the estimator, including after a crash
pub type ModelFactory = Box<dyn Fn() -> Result<Box<dyn BloodPressureModel>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Producer,
    Estimator,
    Consumer,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Estimator => "estimator",
            Self::Consumer => "consumer",
        }
    }
}

type StageExit = (Stage, Result<Result<()>, JoinError>);

/// How a completed run went
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub estimator_restarts: u32,
    pub frames_rendered: u64,
    pub alarm_edges: u32,
}

/// External collaborators the pipeline drives
pub struct PipelineParts {
    pub stream: TelemetryStream,
    pub model_factory: ModelFactory,
    pub render: Box<dyn RenderSink>,
    pub actuator: Box<dyn AlarmActuator>,
}

/// Producer, estimator and consumer stages, each on a blocking task.
///
/// Stages talk over bounded crossbeam queues plus the estimator-busy flag;
/// the consumer reports the alarm level back here over a tokio channel.
pub struct StreamingPipeline {
    config: StreamConfig,
    state: PipelineState,
    stop: Arc<AtomicBool>,
    thresholds: SharedThresholds,
    collector: MetricsCollector,
    restart_policy: RestartPolicy,
}

struct EstimatorWiring {
    requests: Receiver<EstimationRequest>,
    results: Sender<EstimationResult>,
    busy: BusyFlag,
    metrics: Arc<StageMetrics>,
    lowpass: Option<LowPass>,
}

impl StreamingPipeline {
    pub fn new(config: StreamConfig) -> Self {
        let thresholds = SharedThresholds::new(config.alarms.thresholds);
        let restart_policy = RestartPolicy::Limited {
            max_restarts: config.pipeline.estimator_restarts,
        };
        Self {
            config,
            state: PipelineState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
            thresholds,
            collector: MetricsCollector::new(),
            restart_policy,
        }
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Setting the flag stops every stage at the top of its loop
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Runtime-adjustable alarm limits
    pub fn thresholds(&self) -> SharedThresholds {
        self.thresholds.clone()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.collector
    }

    pub fn transition_to(&mut self, new_state: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(anyhow!(
                "Invalid state transition: {} -> {}",
                self.state.name(),
                new_state.name()
            ));
        }
        self.state = new_state;
        Ok(())
    }

    fn spawn_stage<F>(stage: Stage, exits: mpsc::Sender<StageExit>, work: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(work).await;
            let _ = exits.send((stage, outcome)).await;
        });
    }

    fn spawn_estimator(
        &self,
        wiring: &EstimatorWiring,
        factory: &ModelFactory,
        exits: &mpsc::Sender<StageExit>,
    ) -> Result<()> {
        let model = factory()?;
        let estimator = Estimator::new(
            model,
            self.config.pipeline.estimation_window,
            wiring.lowpass.clone(),
        );
        let requests = wiring.requests.clone();
        let results = wiring.results.clone();
        let busy = wiring.busy.clone();
        let stop = self.stop.clone();
        let metrics = wiring.metrics.clone();
        Self::spawn_stage(Stage::Estimator, exits.clone(), move || {
            run_estimator(estimator, requests, results, busy, stop, metrics)
        });
        Ok(())
    }

    /// Run until stopped or until a stage fails for good.
    ///
    /// A panicking estimator is rebuilt from the factory per the restart
    /// policy. Producer or consumer failure stops everything and is
    /// returned as an error.
    pub async fn run(&mut self, parts: PipelineParts) -> Result<PipelineSummary> {
        self.transition_to(PipelineState::Initializing)?;
        let started = Instant::now();
        let pipeline = &self.config.pipeline;
        let capacity = pipeline.queue_capacity;

        let (wave_tx, wave_rx) = bounded::<WaveFrame>(capacity);
        let (request_tx, request_rx) = bounded::<EstimationRequest>(capacity);
        let (result_tx, result_rx) = bounded::<EstimationResult>(capacity);
        let (alarm_tx, mut alarm_rx) = mpsc::channel::<bool>(capacity.max(8));
        let (exit_tx, mut exit_rx) = mpsc::channel::<StageExit>(8);

        let producer_metrics = self.collector.stage(Stage::Producer.name());
        let estimator_metrics = self.collector.stage(Stage::Estimator.name());
        let consumer_metrics = self.collector.stage(Stage::Consumer.name());

        let gate = SubmissionGate::new(pipeline.submit_interval());
        let lowpass = LowPass::new(pipeline.lowpass_cutoff_hz, pipeline.lowpass_sample_rate_hz);
        if lowpass.is_none() {
            warn!(
                "Low-pass cutoff {} Hz invalid at {} Hz, waveform left unfiltered",
                pipeline.lowpass_cutoff_hz, pipeline.lowpass_sample_rate_hz
            );
        }
        let wiring = EstimatorWiring {
            requests: request_rx,
            results: result_tx,
            busy: gate.busy_flag(),
            metrics: estimator_metrics,
            lowpass,
        };

        let producer = Producer::new(
            parts.stream,
            gate,
            pipeline,
            self.config.polling_interval(),
        );
        let alarm_engine = AlarmEngine::new(self.thresholds.clone(), self.config.alarms.grace());
        let consumer = Consumer::new(
            parts.render,
            alarm_engine,
            pipeline.moving_average,
            pipeline.frame_period(),
            pipeline.blink_interval(),
            pipeline.stale_after(),
        );

        if let Err(e) = self.spawn_estimator(&wiring, &parts.model_factory, &exit_tx) {
            self.transition_to(PipelineState::Error {
                error_msg: e.to_string(),
                recoverable: true,
            })?;
            return Err(e);
        }
        {
            let stop = self.stop.clone();
            Self::spawn_stage(Stage::Producer, exit_tx.clone(), move || {
                producer.run(wave_tx, request_tx, stop, producer_metrics)
            });
        }
        {
            let stop = self.stop.clone();
            Self::spawn_stage(Stage::Consumer, exit_tx.clone(), move || {
                consumer.run(wave_rx, result_rx, alarm_tx, stop, consumer_metrics)
            });
        }

        let mut estimator_restarts = 0;
        self.transition_to(PipelineState::Running {
            start_time: Some(started),
            estimator_restarts,
        })?;
        info!("Streaming pipeline running");

        let mut controller = AlarmController::new(parts.actuator);
        let mut alarm_edges = 0;
        let mut running = 3;
        let mut failure: Option<anyhow::Error> = None;

        while running > 0 {
            tokio::select! {
                Some(required) = alarm_rx.recv() => {
                    if controller.apply(required).is_some() {
                        alarm_edges += 1;
                    }
                }
                Some((stage, outcome)) = exit_rx.recv() => {
                    running -= 1;
                    let stopping = self.stop.load(Ordering::SeqCst);
                    match outcome {
                        Ok(Ok(())) if stopping || failure.is_some() => {
                            info!("{} stage stopped", stage.name());
                        }
                        Ok(Ok(())) => {
                            failure.get_or_insert_with(|| anyhow!("{} stage exited unexpectedly", stage.name()));
                            self.stop.store(true, Ordering::SeqCst);
                        }
                        Err(join) if join.is_panic()
                            && stage == Stage::Estimator
                            && !stopping
                            && self.restart_policy.allows(estimator_restarts) =>
                        {
                            estimator_restarts += 1;
                            error!("Estimator crashed, restarting ({} so far)", estimator_restarts);
                            wiring.busy.release();
                            wiring.metrics.record_error();
                            match self.spawn_estimator(&wiring, &parts.model_factory, &exit_tx) {
                                Ok(()) => {
                                    running += 1;
                                    self.transition_to(PipelineState::Running {
                                        start_time: Some(started),
                                        estimator_restarts,
                                    })?;
                                }
                                Err(e) => {
                                    error!("Unable to rebuild estimator model: {}", e);
                                    failure.get_or_insert(e);
                                    self.stop.store(true, Ordering::SeqCst);
                                }
                            }
                        }
                        Ok(Err(e)) => {
                            error!("{} stage failed: {}", stage.name(), e);
                            failure.get_or_insert(e.context(format!("{} stage failed", stage.name())));
                            self.stop.store(true, Ordering::SeqCst);
                        }
                        Err(join) => {
                            error!("{} stage crashed: {}", stage.name(), join);
                            failure.get_or_insert_with(|| anyhow!("{} stage crashed: {}", stage.name(), join));
                            self.stop.store(true, Ordering::SeqCst);
                        }
                    }
                }
                else => break,
            }
        }

        controller.silence();
        let frames_rendered = self
            .collector
            .get(Stage::Consumer.name())
            .map_or(0, |m| m.items_processed());
        info!("{}", self.collector.generate_report());

        match failure {
            Some(e) => {
                self.transition_to(PipelineState::Error {
                    error_msg: e.to_string(),
                    recoverable: false,
                })?;
                Err(e)
            }
            None => {
                self.transition_to(PipelineState::Stopping)?;
                self.transition_to(PipelineState::Completed {
                    duration: Some(started.elapsed()),
                    frames_rendered,
                })?;
                Ok(PipelineSummary {
                    estimator_restarts,
                    frames_rendered,
                    alarm_edges,
                })
            }
        }
    }
}
