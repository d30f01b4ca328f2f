use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::Result;
use crossbeam_channel::bounded;

use vitalstream::config::{PipelineConfig, StreamConfig};
use vitalstream::engine::{
    run_estimator, EstimationRequest, Estimator, Producer, SubmissionGate,
};
use vitalstream::hal::mock::{JsonCodec, ScriptedConnector, ScriptedTransport};
use vitalstream::hal::BloodPressureModel;
use vitalstream::observability::StageMetrics;
use vitalstream::stream::TelemetryStream;

/// Model that records how many predictions overlap
struct SlowModel {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl BloodPressureModel for SlowModel {
    fn predict_waveform(&mut self, window: &[f32]) -> Result<Vec<f32>> {
        Ok(window.to_vec())
    }

    fn predict_values(&mut self, _normalized_window: &[f32]) -> Result<(f32, f32, f32)> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(40));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok((0.3, 0.55, 0.4))
    }
}

fn ramp_request(len: usize) -> EstimationRequest {
    EstimationRequest {
        ecg_times: vec![],
        ecg: vec![],
        ppg_times: (0..len).map(|i| i as f64 / 128.0).collect(),
        ppg: (0..len).map(|i| Some((i % 16) as f64)).collect(),
        heart_rate: 72.0,
        spo2: 98.0,
        received_at: SystemTime::now(),
    }
}

#[test]
fn test_only_one_estimation_in_flight() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let model = SlowModel {
        in_flight: in_flight.clone(),
        peak: peak.clone(),
        calls: calls.clone(),
    };

    let (request_tx, request_rx) = bounded(4);
    let (result_tx, result_rx) = bounded(64);
    let mut gate = SubmissionGate::new(Duration::ZERO);
    let busy = gate.busy_flag();
    let stop = Arc::new(AtomicBool::new(false));

    let estimator = Estimator::new(Box::new(model), 32, None);
    let worker = {
        let stop = stop.clone();
        std::thread::spawn(move || {
            run_estimator(
                estimator,
                request_rx,
                result_tx,
                busy,
                stop,
                Arc::new(StageMetrics::new("estimator")),
            )
        })
    };

    let mut submitted = 0;
    for _ in 0..50 {
        if gate.try_acquire(Instant::now()) {
            request_tx.send(ramp_request(32)).unwrap();
            submitted += 1;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    // Let the last estimation finish
    std::thread::sleep(Duration::from_millis(100));
    stop.store(true, Ordering::SeqCst);
    worker.join().unwrap().unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(submitted > 1);
    assert!(gate.dropped() > 0);
    assert_eq!(calls.load(Ordering::SeqCst), submitted);
    assert_eq!(result_rx.try_iter().count(), submitted);
}

fn idle_producer(config: &PipelineConfig) -> (Producer, vitalstream::engine::BusyFlag) {
    let connector = ScriptedConnector::new(Vec::<ScriptedTransport>::new());
    let stream = TelemetryStream::new(
        &StreamConfig::default(),
        Box::new(connector),
        Arc::new(JsonCodec::new()),
    );
    let gate = SubmissionGate::new(config.submit_interval());
    let busy = gate.busy_flag();
    (
        Producer::new(stream, gate, config, Duration::ZERO),
        busy,
    )
}

#[test]
fn test_producer_drops_while_estimator_busy() {
    let config = PipelineConfig {
        estimation_window: 16,
        submit_interval_secs: 0.0,
        ..Default::default()
    };
    let (mut producer, busy) = idle_producer(&config);
    let (wave_tx, wave_rx) = bounded(8);
    let (request_tx, request_rx) = bounded(8);

    for _ in 0..5 {
        producer.publish(Instant::now(), &wave_tx, &request_tx).unwrap();
    }
    assert_eq!(request_rx.len(), 1);
    assert_eq!(producer.dropped_submissions(), 4);
    assert!(wave_rx.len() >= 1);

    busy.release();
    producer.publish(Instant::now(), &wave_tx, &request_tx).unwrap();
    assert_eq!(request_rx.len(), 2);
}

#[test]
fn test_submission_interval_respected() {
    let config = PipelineConfig {
        estimation_window: 16,
        submit_interval_secs: 0.8,
        ..Default::default()
    };
    let (mut producer, busy) = idle_producer(&config);
    let (wave_tx, _wave_rx) = bounded(8);
    let (request_tx, request_rx) = bounded(8);
    let t0 = Instant::now();

    producer.publish(t0, &wave_tx, &request_tx).unwrap();
    busy.release();
    producer
        .publish(t0 + Duration::from_millis(400), &wave_tx, &request_tx)
        .unwrap();
    assert_eq!(request_rx.len(), 1);

    producer
        .publish(t0 + Duration::from_millis(800), &wave_tx, &request_tx)
        .unwrap();
    assert_eq!(request_rx.len(), 2);
}

#[test]
fn test_full_request_queue_releases_claim() {
    let config = PipelineConfig {
        estimation_window: 16,
        submit_interval_secs: 0.0,
        ..Default::default()
    };
    let (mut producer, busy) = idle_producer(&config);
    let (wave_tx, _wave_rx) = bounded(8);
    let (request_tx, _request_rx) = bounded(1);

    producer.publish(Instant::now(), &wave_tx, &request_tx).unwrap();
    busy.release();
    producer.publish(Instant::now(), &wave_tx, &request_tx).unwrap();

    assert!(!busy.is_busy());
}

#[test]
fn test_closed_request_queue_is_fatal() {
    let config = PipelineConfig::default();
    let (mut producer, _busy) = idle_producer(&config);
    let (wave_tx, _wave_rx) = bounded(8);
    let (request_tx, request_rx) = bounded(1);
    drop(request_rx);

    assert!(producer
        .publish(Instant::now(), &wave_tx, &request_tx)
        .is_err());
}
