use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, warn};

use super::error::SessionError;
use super::state::SessionState;
use super::templates::MessageTemplates;
use crate::config::SessionConfig;
use crate::core::clock::ticks_to_duration;
use crate::core::{CondensedReading, Message, MessageKind, MonitorClock, Request};
use crate::hal::{Connector, ProtocolCodec, Transport};
use crate::resilience::RetryPolicy;

/// One association with the monitor over one transport.
///
/// Every reconnection builds a new `Session`; only the port, wave labels
/// and configuration carry over.
pub struct Session {
    transport: Option<Box<dyn Transport>>,
    codec: Arc<dyn ProtocolCodec>,
    templates: MessageTemplates,
    config: SessionConfig,
    state: SessionState,
    keep_alive_interval: Duration,
    clock: MonitorClock,
    last_read: Instant,
    last_keep_alive: Instant,
    priority_confirmed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("clock", &self.clock)
            .field("priority_confirmed", &self.priority_confirmed)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect, associate, negotiate the wave priority list and start polling.
    ///
    /// In blocking mode recoverable handshake errors are retried per the
    /// configured bound; otherwise a single attempt is made. A raised `stop`
    /// flag ends the retries with [`SessionError::Stopped`].
    pub fn open(
        connector: &mut dyn Connector,
        port: &str,
        wave_labels: &[String],
        config: &SessionConfig,
        codec: Arc<dyn ProtocolCodec>,
        blocking: bool,
        stop: Option<&AtomicBool>,
    ) -> Result<Self, SessionError> {
        let templates = MessageTemplates::build(codec.as_ref(), wave_labels, config.poll_duration())
            .map_err(|e| SessionError::critical(e.to_string()))?;

        let transport = connector
            .connect(port)
            .map_err(|e| SessionError::io(format!("Failed to open {}: {}", port, e)))?;

        let now = Instant::now();
        let mut session = Self {
            transport: Some(transport),
            codec,
            templates,
            config: config.clone(),
            state: SessionState::Closed,
            keep_alive_interval: Duration::ZERO,
            clock: MonitorClock::new(SystemTime::now(), 0),
            last_read: now,
            last_keep_alive: now,
            priority_confirmed: false,
        };

        let retry = if blocking {
            RetryPolicy::from_config(config)
        } else {
            RetryPolicy::once()
        };

        if let Err(e) = session.establish(&retry, stop) {
            if let Err(close_err) = session.close() {
                error!("Ignoring error closing failed session: {}", close_err);
            }
            return Err(e);
        }
        Ok(session)
    }

    fn establish(&mut self, retry: &RetryPolicy, stop: Option<&AtomicBool>) -> Result<(), SessionError> {
        self.transition_to(SessionState::Associating)?;
        self.associate(retry, stop)?;
        self.transition_to(SessionState::Negotiating)?;
        self.set_priority_list()?;
        self.start_polling()?;

        let now = Instant::now();
        self.last_read = now;
        self.last_keep_alive = now;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Keep-alive interval negotiated from the minimum poll period
    pub fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval
    }

    pub fn clock(&self) -> &MonitorClock {
        &self.clock
    }

    pub fn priority_confirmed(&self) -> bool {
        self.priority_confirmed
    }

    fn transition_to(&mut self, target: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(&target) {
            return Err(SessionError::critical(format!(
                "Invalid session transition: {} -> {}",
                self.state.name(),
                target.name()
            )));
        }
        debug!("Session {} -> {}", self.state.name(), target.name());
        self.state = target;
        Ok(())
    }

    fn send(
        transport: &mut Option<Box<dyn Transport>>,
        frame: &[u8],
        what: &str,
    ) -> Result<(), SessionError> {
        let transport = transport
            .as_mut()
            .ok_or_else(|| SessionError::critical(format!("Sending {} without a transport", what)))?;
        transport
            .send(frame)
            .map_err(|e| SessionError::io(format!("Unable to send {}: {}", what, e)))?;
        debug!("Sent {}", what);
        Ok(())
    }

    fn receive(&mut self) -> Option<Vec<u8>> {
        let timeout = self.config.receive_timeout();
        self.transport.as_mut().and_then(|t| t.receive(timeout))
    }

    fn associate(&mut self, retry: &RetryPolicy, stop: Option<&AtomicBool>) -> Result<(), SessionError> {
        let mut io_errors = 0;
        loop {
            match self.try_associate() {
                Ok(()) => return Ok(()),
                Err(e) if e.is_critical() => {
                    error!("{}, resetting transport", e);
                    return Err(e);
                }
                Err(e) => {
                    io_errors += 1;
                    if retry.escalates(io_errors) {
                        error!("Escalating after {} handshake errors: {}", io_errors, e);
                        return Err(e);
                    }
                    if stop.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                        debug!("Stop requested during handshake: {}", e);
                        return Err(SessionError::Stopped);
                    }
                    warn!("{}, waiting to try again ({})", e, io_errors);
                    std::thread::sleep(retry.pause);
                }
            }
        }
    }

    fn try_associate(&mut self) -> Result<(), SessionError> {
        Self::send(
            &mut self.transport,
            &self.templates.association_request,
            "Association Request",
        )?;

        let min_poll_period = self.receive_association_response()?;
        self.receive_create_event()?;

        self.keep_alive_interval = ticks_to_duration(min_poll_period);
        Ok(())
    }

    fn receive_association_response(&mut self) -> Result<u32, SessionError> {
        let frame = self
            .receive()
            .ok_or_else(|| SessionError::io("No association received"))?;

        let kind = self.codec.classify(&frame);
        debug!("Received {}", kind);

        match kind {
            MessageKind::AssociationResponse => match self.codec.decode(&frame) {
                Ok(Message::AssociationResponse { min_poll_period }) => Ok(min_poll_period),
                Ok(other) => Err(SessionError::io(format!(
                    "Association response decoded as {}",
                    other.kind()
                ))),
                Err(e) => Err(SessionError::io(e.to_string())),
            },
            MessageKind::TimeoutError => Err(SessionError::io("Monitor timed out during association")),
            MessageKind::AssociationAbort | MessageKind::ReleaseRequest | MessageKind::Unknown => {
                Err(SessionError::critical(format!("Association refused with {}", kind)))
            }
            // Data still flowing from a previous association
            MessageKind::MdsExtendedPollActionResult
            | MessageKind::LinkedMdsExtendedPollActionResult => Err(SessionError::critical(
                format!("Stale {} during association", kind),
            )),
            other => Err(SessionError::io(format!("Unexpected {} during association", other))),
        }
    }

    fn receive_create_event(&mut self) -> Result<(), SessionError> {
        let message = self
            .receive()
            .map(|frame| self.codec.decode(&frame).unwrap_or(Message::Unknown));

        match message {
            Some(Message::MdsCreateEvent {
                absolute_time,
                relative_time,
                parameters,
            }) => {
                debug!("Received {}", MessageKind::MdsCreateEvent);
                self.clock = MonitorClock::new(absolute_time, relative_time);

                let result = self
                    .codec
                    .encode(&Request::CreateEventResult { parameters })
                    .map_err(|e| SessionError::critical(e.to_string()))?;
                Self::send(&mut self.transport, &result, "MDS Create Event Result")
            }
            Some(other) => Err(SessionError::critical(format!(
                "Bad handshake: expected {}, got {}",
                MessageKind::MdsCreateEvent,
                other.kind()
            ))),
            None => Err(SessionError::critical("Bad handshake: no create event")),
        }
    }

    /// Send the wave priority list and wait (bounded) for confirmation.
    /// Failing to confirm is logged, never fatal.
    fn set_priority_list(&mut self) -> Result<(), SessionError> {
        Self::send(
            &mut self.transport,
            &self.templates.priority_list,
            "MDS Set Priority List Wave",
        )?;

        for _ in 0..self.config.priority_confirm_receives {
            let Some(frame) = self.receive() else {
                warn!("No priority list message received");
                return Ok(());
            };

            match self.codec.decode(&frame) {
                Ok(Message::MdsSetPriorityListResult { wave_labels }) => {
                    match wave_labels {
                        Some(labels) => debug!("Priority list confirmed: {:?}", labels),
                        None => debug!("Priority list result without wave labels"),
                    }
                    self.priority_confirmed = true;
                    return Ok(());
                }
                Ok(Message::MdsCreateEvent { .. }) => {
                    warn!("Failed to confirm priority list setting");
                    return Ok(());
                }
                Ok(other) => debug!("Ignoring {} while negotiating", other.kind()),
                Err(e) => debug!("Ignoring undecodable frame while negotiating: {}", e),
            }
        }

        warn!(
            "Priority list not confirmed after {} messages",
            self.config.priority_confirm_receives
        );
        Ok(())
    }

    /// Request numeric, wave and alarm feeds for the configured duration
    pub fn start_polling(&mut self) -> Result<(), SessionError> {
        Self::send(
            &mut self.transport,
            &self.templates.poll_numeric,
            "MDS Extended Poll Action for Numerics",
        )?;
        Self::send(
            &mut self.transport,
            &self.templates.poll_wave,
            "MDS Extended Poll Action for Waves",
        )?;
        Self::send(
            &mut self.transport,
            &self.templates.poll_alarm,
            "MDS Extended Poll Action for Alarms",
        )?;
        self.transition_to(SessionState::Polling)
    }

    fn submit_keep_alive(&mut self) -> Result<(), SessionError> {
        Self::send(&mut self.transport, &self.templates.keep_alive, "Keep Alive")?;
        self.last_keep_alive = Instant::now();
        Ok(())
    }

    /// Receive one message and turn it into a reading if it carries data.
    ///
    /// Returns `Ok(None)` for silence within the read timeout and for
    /// messages that carry nothing to report.
    pub fn single_poll(&mut self) -> Result<Option<CondensedReading>, SessionError> {
        let due = self
            .keep_alive_interval
            .saturating_sub(self.config.keep_alive_margin());
        if self.last_keep_alive.elapsed() > due {
            self.submit_keep_alive()?;
        }

        let Some(frame) = self.receive() else {
            warn!("No message received");
            if self.last_read.elapsed() > self.config.read_timeout() {
                error!("Data stream timed out");
                return Err(SessionError::io("Data stream timed out"));
            }
            return Ok(None);
        };

        let kind = self.codec.classify(&frame);
        debug!("Received {}", kind);

        match kind {
            MessageKind::AssociationAbort | MessageKind::ReleaseResponse => {
                error!("Received {}: data collection terminated", kind);
                Err(SessionError::io(format!("Data collection terminated by {}", kind)))
            }
            MessageKind::RemoteOperationError => {
                warn!("Received (unhandled) {}", kind);
                Ok(None)
            }
            MessageKind::MdsSinglePollActionResult => {
                debug!("Received (unhandled) {}", kind);
                Ok(None)
            }
            MessageKind::MdsExtendedPollActionResult
            | MessageKind::LinkedMdsExtendedPollActionResult => {
                let reply = match self.codec.decode(&frame) {
                    Ok(Message::MdsExtendedPollActionResult(reply))
                    | Ok(Message::LinkedMdsExtendedPollActionResult(reply)) => reply,
                    Ok(other) => {
                        warn!("{} decoded as {}", kind, other.kind());
                        return Ok(None);
                    }
                    Err(e) => {
                        warn!("Failed to decode {}: {}", kind, e);
                        return Ok(None);
                    }
                };

                match self.codec.distill(&reply, &self.clock) {
                    Some(raw) => {
                        self.last_read = Instant::now();
                        Ok(Some(CondensedReading::condense(&raw)))
                    }
                    None => {
                        warn!("Failed to distill {} (sequence {})", kind, reply.sequence_no);
                        Ok(None)
                    }
                }
            }
            other => {
                warn!("Received {}", other);
                Ok(None)
            }
        }
    }

    /// Abort and release the association, then close the transport.
    ///
    /// The transport is closed and dropped even when the release fails.
    pub fn close(&mut self) -> Result<(), SessionError> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        if self.state.can_transition_to(&SessionState::Closing) {
            self.state = SessionState::Closing;
        }

        let result = self.release(transport.as_mut());

        transport.close();
        self.state = SessionState::Closed;
        debug!("Transport closed");
        result
    }

    fn send_release_pair(&self, transport: &mut dyn Transport) -> Result<(), SessionError> {
        transport
            .send(&self.templates.association_abort)
            .map_err(|e| SessionError::io(format!("Unable to send Association Abort: {}", e)))?;
        transport
            .send(&self.templates.release_request)
            .map_err(|e| SessionError::io(format!("Unable to send Release Request: {}", e)))?;
        debug!("Sent Association Abort and Release Request");
        Ok(())
    }

    fn release(&self, transport: &mut dyn Transport) -> Result<(), SessionError> {
        self.send_release_pair(transport)?;

        let resend_every = self.config.close_resend_every.max(1);
        let max_attempts = resend_every * 4;
        let timeout = self.config.receive_timeout();

        for attempt in 1..=max_attempts {
            let Some(frame) = transport.receive(timeout) else {
                debug!("No release message received");
                return Ok(());
            };

            let kind = self.codec.classify(&frame);
            debug!("Received {} while releasing", kind);
            if matches!(
                kind,
                MessageKind::ReleaseResponse
                    | MessageKind::AssociationAbort
                    | MessageKind::TimeoutError
                    | MessageKind::Unknown
            ) {
                debug!("Connection with monitor released");
                return Ok(());
            }

            if attempt % resend_every == 0 {
                self.send_release_pair(transport)?;
                debug!("Re-sent release pair after {} messages", attempt);
            }
        }

        warn!("Monitor did not acknowledge release after {} messages", max_attempts);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}
