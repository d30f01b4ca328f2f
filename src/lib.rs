pub mod alarm;
pub mod buffers;
pub mod config;
pub mod core;
pub mod engine;
pub mod hal;
pub mod observability;
pub mod resilience;
pub mod session;
pub mod stream;
