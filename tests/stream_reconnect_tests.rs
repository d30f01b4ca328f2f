use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use vitalstream::config::{ReconnectConfig, SessionConfig, StreamConfig};
use vitalstream::core::{
    channels, ChannelValue, CreateEventParameters, Message, Observation, PollObject, PollReply,
};
use vitalstream::hal::mock::{JsonCodec, ScriptedConnector, ScriptedTransport};
use vitalstream::stream::{PlethQuality, StreamError, TelemetryStream};

fn config(max_attempts: Option<u32>) -> StreamConfig {
    StreamConfig {
        port: "/dev/test".to_string(),
        polling_interval_secs: 0.0,
        session: SessionConfig {
            retry_pause_secs: 0.0,
            receive_timeout_secs: 0.01,
            ..Default::default()
        },
        reconnect: ReconnectConfig {
            backoff_secs: 0.0,
            max_attempts,
            blocking: true,
        },
        ..Default::default()
    }
}

fn handshake() -> ScriptedTransport {
    let transport = ScriptedTransport::new();
    transport
        .push(Message::AssociationResponse {
            min_poll_period: 80_000,
        })
        .push(Message::MdsCreateEvent {
            absolute_time: SystemTime::now(),
            relative_time: 0,
            parameters: CreateEventParameters::default(),
        })
        .push(Message::MdsSetPriorityListResult { wave_labels: None });
    transport
}

fn pleth_reply(sequence_no: u16, base: f64) -> Message {
    Message::LinkedMdsExtendedPollActionResult(PollReply {
        object: PollObject::Wave,
        relative_time: 2_000 * sequence_no as u32,
        sequence_no,
        observations: vec![Observation {
            label: "PLETH wave label".to_string(),
            value: ChannelValue::Wave((0..32).map(|i| base + (i % 8) as f64 * 100.0).collect()),
        }],
        alarms: vec![],
    })
}

fn build_stream(transports: Vec<ScriptedTransport>, config: &StreamConfig) -> (TelemetryStream, Arc<AtomicUsize>) {
    let connector = ScriptedConnector::new(transports);
    let connects = connector.connect_counter();
    let stream = TelemetryStream::new(config, Box::new(connector), Arc::new(JsonCodec::new()));
    (stream, connects)
}

#[test]
fn test_reading_updates_sampled_data() {
    let first = handshake();
    first.push(pleth_reply(1, 1000.0));
    let (mut stream, _) = build_stream(vec![first], &config(None));
    stream.add_post_processor(Box::new(PlethQuality::new()));

    stream.open().unwrap();
    let reading = stream.read_one().unwrap().unwrap();

    assert!(reading.pleth.is_some());
    assert!(reading.extras.contains_key("qos"));
    let pleth = stream.channel(channels::PLETH).unwrap();
    assert!(!pleth.is_empty());
    assert!(pleth.latest().is_some());
    assert!(stream.channel(channels::ECG).unwrap().is_empty());
}

#[test]
fn test_abort_triggers_reconnect() {
    let first = handshake();
    first.push(pleth_reply(1, 1000.0)).push(Message::AssociationAbort);
    let second = handshake();
    second.push(pleth_reply(2, 1200.0));

    let (mut stream, connects) = build_stream(vec![first.clone(), second], &config(None));

    stream.open().unwrap();
    assert!(stream.read_one().unwrap().is_some());

    // Abort on the first transport, data on the second
    let reading = stream.read_one().unwrap();
    assert!(reading.is_some());
    assert_eq!(stream.reconnect_count(), 1);
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    assert!(first.is_closed());
}

#[test]
fn test_reconnect_gives_up_at_limit() {
    let first = handshake();
    first.push(Message::AssociationAbort);

    let (mut stream, connects) = build_stream(vec![first], &config(Some(2)));

    stream.open().unwrap();
    let err = stream.read_one().unwrap_err();

    assert!(matches!(err, StreamError::ReconnectExhausted { attempts: 2 }));
    assert_eq!(connects.load(Ordering::SeqCst), 3);
}

#[test]
fn test_non_blocking_read_returns_nothing_after_failed_reconnect() {
    let first = handshake();
    first.push(Message::AssociationAbort);

    let (mut stream, connects) = build_stream(vec![first], &config(None));
    stream.open().unwrap();
    stream.set_blocking(false);

    assert!(stream.read_one().unwrap().is_none());
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    assert!(!stream.is_open());
}

#[test]
fn test_non_blocking_open_reports_failure() {
    let (mut stream, _) = build_stream(vec![], &config(None));
    stream.set_blocking(false);

    assert!(matches!(stream.open(), Err(StreamError::Session(_))));
}

#[test]
fn test_stop_flag_ends_open() {
    let stop = Arc::new(AtomicBool::new(true));
    let (stream, connects) = build_stream(vec![handshake()], &config(None));
    let mut stream = stream.with_stop_flag(stop);

    assert!(matches!(stream.open(), Err(StreamError::Stopped)));
    assert_eq!(connects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_read_collects_readings() {
    let first = handshake();
    first
        .push(pleth_reply(1, 1000.0))
        .push(Message::MdsSinglePollActionResult)
        .push(pleth_reply(2, 1100.0));
    let (mut stream, _) = build_stream(vec![first], &config(None));

    stream.open().unwrap();
    let readings = stream.read(3).unwrap();

    assert_eq!(readings.len(), 2);
    stream.close().unwrap();
    assert!(!stream.is_open());
}
