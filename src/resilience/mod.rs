pub mod policy;
pub mod watchdog;

pub use policy::{ReconnectPolicy, RestartPolicy, RetryPolicy};
pub use watchdog::{Watchdog, WatchdogGuard, WatchdogHandle};
