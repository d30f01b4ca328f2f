use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error};

enum Command {
    Arm,
    Disarm,
    Shutdown,
}

/// Deadline timer running on its own thread.
///
/// Work is wrapped with [`WatchdogHandle::arm`]; if the returned guard is
/// not dropped within the timeout, the expiry callback runs once for that
/// arming. The callback is expected to tear the process down.
pub struct Watchdog {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
    expirations: Arc<AtomicU64>,
    timeout: Duration,
}

/// Cloneable arming handle, usable from any thread
#[derive(Clone)]
pub struct WatchdogHandle {
    tx: Sender<Command>,
}

/// Disarms the watchdog when dropped
pub struct WatchdogGuard {
    tx: Sender<Command>,
}

impl Watchdog {
    pub fn spawn<F>(timeout: Duration, mut on_expire: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let expirations = Arc::new(AtomicU64::new(0));
        let fired = expirations.clone();

        let handle = std::thread::spawn(move || {
            let mut deadline: Option<Instant> = None;
            loop {
                let command = match deadline {
                    None => match rx.recv() {
                        Ok(command) => command,
                        Err(_) => break,
                    },
                    Some(at) => {
                        let wait = at.saturating_duration_since(Instant::now());
                        match rx.recv_timeout(wait) {
                            Ok(command) => command,
                            Err(RecvTimeoutError::Timeout) => {
                                error!("Watchdog expired after {:?}", timeout);
                                fired.fetch_add(1, Ordering::SeqCst);
                                deadline = None;
                                on_expire();
                                continue;
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                };

                match command {
                    Command::Arm => deadline = Some(Instant::now() + timeout),
                    Command::Disarm => deadline = None,
                    Command::Shutdown => break,
                }
            }
            debug!("Watchdog thread exiting");
        });

        Self {
            tx,
            handle: Some(handle),
            expirations,
            timeout,
        }
    }

    /// Like [`Watchdog::spawn`], but on expiry first raises `stop` and gives
    /// the stages `drain` to wind down before `on_expire` runs.
    pub fn spawn_with_stop<F>(
        timeout: Duration,
        stop: Arc<AtomicBool>,
        drain: Duration,
        mut on_expire: F,
    ) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::spawn(timeout, move || {
            stop.store(true, Ordering::SeqCst);
            std::thread::sleep(drain);
            on_expire();
        })
    }

    pub fn handle(&self) -> WatchdogHandle {
        WatchdogHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::SeqCst)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl WatchdogHandle {
    /// Start (or restart) the deadline
    pub fn arm(&self) -> WatchdogGuard {
        let _ = self.tx.send(Command::Arm);
        WatchdogGuard {
            tx: self.tx.clone(),
        }
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Disarm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_in_time_never_fires() {
        let watchdog = Watchdog::spawn(Duration::from_millis(200), || {});
        let handle = watchdog.handle();

        for _ in 0..3 {
            let _guard = handle.arm();
            std::thread::sleep(Duration::from_millis(20));
        }
        std::thread::sleep(Duration::from_millis(300));

        assert_eq!(watchdog.expirations(), 0);
    }

    #[test]
    fn test_overrun_fires_once() {
        let watchdog = Watchdog::spawn(Duration::from_millis(50), || {});
        let guard = watchdog.handle().arm();

        std::thread::sleep(Duration::from_millis(300));
        drop(guard);

        assert_eq!(watchdog.expirations(), 1);
    }
}
