// OpsPulse - native telemetry runtime primitives
// Core library module
//
// A flat collection of independent primitives a host process composes:
// there is no central runtime. Each primitive owns its own state and
// synchronization; only the thread pool runs threads of its own.

pub mod clock;
pub mod concurrent;
pub mod error;
pub mod log;
pub mod memory;
pub mod metrics;

pub use concurrent::{TaskHandle, ThreadPool, ThreadPoolConfig};
pub use error::{Error, Result};
pub use log::{LogIndexer, LogParser};
pub use memory::BlockPool;
pub use metrics::MetricsCollector;
