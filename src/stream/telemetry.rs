use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::postprocess::PostProcessor;
use crate::buffers::SampledDataBuffer;
use crate::config::{SessionConfig, StreamConfig};
use crate::core::CondensedReading;
use crate::hal::{Connector, ProtocolCodec};
use crate::resilience::{ReconnectPolicy, WatchdogHandle};
use crate::session::{Session, SessionError};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Telemetry stream stopped")]
    Stopped,

    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Poll/reconnect loop over a [`Session`], feeding per-channel ring buffers.
pub struct TelemetryStream {
    port: String,
    wave_labels: Vec<String>,
    session_config: SessionConfig,
    polling_interval: Duration,
    connector: Box<dyn Connector>,
    codec: Arc<dyn ProtocolCodec>,
    session: Option<Session>,
    sampled_data: BTreeMap<String, SampledDataBuffer>,
    post_processors: Vec<Box<dyn PostProcessor>>,
    reconnect: ReconnectPolicy,
    blocking: bool,
    stop: Option<Arc<AtomicBool>>,
    watchdog: Option<WatchdogHandle>,
    reconnects: u64,
}

impl TelemetryStream {
    pub fn new(
        config: &StreamConfig,
        connector: Box<dyn Connector>,
        codec: Arc<dyn ProtocolCodec>,
    ) -> Self {
        let sampled_data = config
            .channels
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    SampledDataBuffer::new(c.frequency, config.sampled_data_secs),
                )
            })
            .collect();

        Self {
            port: config.port.clone(),
            wave_labels: config.wave_labels(),
            session_config: config.session.clone(),
            polling_interval: config.polling_interval(),
            connector,
            codec,
            session: None,
            sampled_data,
            post_processors: Vec::new(),
            reconnect: ReconnectPolicy::from_config(&config.reconnect),
            blocking: config.reconnect.blocking,
            stop: None,
            watchdog: None,
            reconnects: 0,
        }
    }

    pub fn with_post_processor(mut self, processor: Box<dyn PostProcessor>) -> Self {
        self.add_post_processor(processor);
        self
    }

    /// Post-processors run in the order they were added
    pub fn add_post_processor(&mut self, processor: Box<dyn PostProcessor>) {
        self.post_processors.push(processor);
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Arm this watchdog around every single poll
    pub fn with_watchdog(mut self, watchdog: WatchdogHandle) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    pub fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    pub fn is_open(&self) -> bool {
        self.session.as_ref().map_or(false, Session::is_open)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Successful reconnections since construction
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects
    }

    pub fn sampled_data(&self) -> &BTreeMap<String, SampledDataBuffer> {
        &self.sampled_data
    }

    pub fn channel(&self, name: &str) -> Option<&SampledDataBuffer> {
        self.sampled_data.get(name)
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }

    fn check_stop(&self) -> Result<(), StreamError> {
        if self.stop_requested() {
            Err(StreamError::Stopped)
        } else {
            Ok(())
        }
    }

    fn open_session(&mut self) -> Result<(), StreamError> {
        let session = Session::open(
            self.connector.as_mut(),
            &self.port,
            &self.wave_labels,
            &self.session_config,
            self.codec.clone(),
            self.blocking,
            self.stop.as_deref(),
        )
        .map_err(|e| match e {
            SessionError::Stopped => StreamError::Stopped,
            e => e.into(),
        })?;
        self.session = Some(session);
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                error!("Ignoring error closing connection: {}", e);
            }
        }
    }

    /// Open the session, retrying with backoff while blocking
    pub fn open(&mut self) -> Result<(), StreamError> {
        let mut attempt = 0;
        loop {
            self.check_stop()?;
            attempt += 1;
            match self.open_session() {
                Ok(()) => {
                    info!("Connected to monitor on {}", self.port);
                    return Ok(());
                }
                Err(StreamError::Stopped) => return Err(StreamError::Stopped),
                Err(e) if !self.blocking => return Err(e),
                Err(e) => {
                    error!(
                        "Failed to open connection to {}, waiting to try again: {}",
                        self.port, e
                    );
                    self.teardown();
                    if !self.reconnect.allows(attempt + 1) {
                        return Err(StreamError::ReconnectExhausted { attempts: attempt });
                    }
                    std::thread::sleep(self.reconnect.backoff);
                }
            }
        }
    }

    pub fn close(&mut self) -> Result<(), StreamError> {
        if let Some(mut session) = self.session.take() {
            session.close()?;
        }
        Ok(())
    }

    /// One poll. Recoverable failures rebuild the session and retry; in
    /// non-blocking mode a single reconnect is attempted and nothing is
    /// returned.
    pub fn read_one(&mut self) -> Result<Option<CondensedReading>, StreamError> {
        let mut attempt: u32 = 0;
        loop {
            self.check_stop()?;

            let polled = match self.session.as_mut() {
                Some(session) => {
                    let _guard = self.watchdog.as_ref().map(WatchdogHandle::arm);
                    session.single_poll()
                }
                None => Err(SessionError::io("No open session")),
            };

            match polled {
                Ok(Some(mut reading)) => {
                    self.update_sampled_data(&reading);
                    self.run_post_processors(&mut reading);
                    match serde_json::to_string(&reading) {
                        Ok(json) => info!("{}", json),
                        Err(e) => warn!("Unable to serialize reading: {}", e),
                    }
                    return Ok(Some(reading));
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    error!("{}; resetting connection", e);
                    self.reconnect(&mut attempt)?;
                    if !self.blocking {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn reconnect(&mut self, attempt: &mut u32) -> Result<(), StreamError> {
        loop {
            self.teardown();
            self.check_stop()?;

            *attempt += 1;
            if !self.reconnect.allows(*attempt) {
                error!("Reconnect limit reached after {} attempts", *attempt - 1);
                return Err(StreamError::ReconnectExhausted {
                    attempts: *attempt - 1,
                });
            }

            match self.open_session() {
                Ok(()) => {
                    self.reconnects += 1;
                    info!("Connection reestablished (attempt {})", attempt);
                    return Ok(());
                }
                Err(StreamError::Stopped) => return Err(StreamError::Stopped),
                Err(e) => {
                    error!("Error reestablishing connection (attempt {}): {}", attempt, e);
                    if !self.blocking {
                        return Ok(());
                    }
                    std::thread::sleep(self.reconnect.backoff);
                }
            }
        }
    }

    /// Non-empty results of `count` single reads
    pub fn read(&mut self, count: usize) -> Result<Vec<CondensedReading>, StreamError> {
        let mut readings = Vec::new();
        for _ in 0..count {
            if let Some(reading) = self.read_one()? {
                readings.push(reading);
            }
        }
        Ok(readings)
    }

    /// Headless loop: open, then read every polling interval until stopped
    pub fn run(&mut self) -> Result<(), StreamError> {
        let result = self.run_inner();
        self.teardown();
        match result {
            Err(StreamError::Stopped) => Ok(()),
            other => other,
        }
    }

    fn run_inner(&mut self) -> Result<(), StreamError> {
        self.open()?;
        loop {
            self.read_one()?;
            std::thread::sleep(self.polling_interval);
        }
    }

    fn update_sampled_data(&mut self, reading: &CondensedReading) {
        for (name, buffer) in self.sampled_data.iter_mut() {
            if let Some(values) = reading.channel(name) {
                buffer.append(reading.timestamp, values);
            }
        }
    }

    fn run_post_processors(&mut self, reading: &mut CondensedReading) {
        for processor in self.post_processors.iter_mut() {
            let extras = processor.process(&self.sampled_data, reading);
            reading.merge_extras(extras);
        }
    }
}
