use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::JsonCodec;
use crate::core::{Message, Request};
use crate::hal::{Connector, Transport};

#[derive(Debug, Default)]
struct ScriptState {
    /// `None` entries are receive timeouts
    inbound: VecDeque<Option<Vec<u8>>>,
    sent: Vec<Vec<u8>>,
    receives: usize,
    closed: bool,
    fail_sends: bool,
}

/// Transport that replays a fixed inbound script and records what was sent.
///
/// Clones share state, so a test can keep a handle after the session takes
/// ownership of the transport.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an inbound message
    pub fn push(&self, message: Message) -> &Self {
        self.lock().inbound.push_back(Some(JsonCodec::frame(&message)));
        self
    }

    /// Queue `count` copies of an inbound message
    pub fn push_repeated(&self, message: Message, count: usize) -> &Self {
        for _ in 0..count {
            self.push(message.clone());
        }
        self
    }

    /// Queue a receive that times out with nothing
    pub fn push_silence(&self) -> &Self {
        self.lock().inbound.push_back(None);
        self
    }

    /// Queue undecodable bytes
    pub fn push_raw(&self, frame: Vec<u8>) -> &Self {
        self.lock().inbound.push_back(Some(frame));
        self
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Requests sent so far, decoded
    pub fn sent_requests(&self) -> Vec<Request> {
        self.lock()
            .sent
            .iter()
            .filter_map(|frame| JsonCodec::parse_request(frame))
            .collect()
    }

    pub fn receive_count(&self) -> usize {
        self.lock().receives
    }

    pub fn remaining(&self) -> usize {
        self.lock().inbound.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }
        if state.fail_sends {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted send failure"));
        }
        state.sent.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Option<Vec<u8>> {
        let mut state = self.lock();
        state.receives += 1;
        state.inbound.pop_front().flatten()
    }

    fn close(&mut self) {
        self.lock().closed = true;
    }
}

/// Connector handing out pre-built scripted transports in order
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    transports: VecDeque<ScriptedTransport>,
    connects: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(transports: impl IntoIterator<Item = ScriptedTransport>) -> Self {
        Self {
            transports: transports.into_iter().collect(),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of connect attempts, readable after the connector moves
    pub fn connect_counter(&self) -> Arc<AtomicUsize> {
        self.connects.clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&mut self, port: &str) -> io::Result<Box<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.transports.pop_front() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no device on {}", port),
            )),
        }
    }
}
