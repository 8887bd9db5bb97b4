// Copyright (c) 2025 OpsPulse Contributors
//
// Concurrency primitives module
//
// Two primitives live here: the lock-free SPSC ring used to hand telemetry
// records from a producing thread to a draining worker, and the bounded
// thread pool that runs parallel collection tasks. The ring is the only
// lock-free structure in the crate and imposes a strict single-producer /
// single-consumer discipline, enforced at the type level by the endpoint
// pair returned from [`spsc::channel`].

pub mod spsc;
pub mod thread_pool;

pub use spsc::{channel, Consumer, Producer};
pub use thread_pool::{TaskHandle, ThreadPool, ThreadPoolConfig, ThreadPoolStats};

/// Cache line size used to pad producer and consumer indices apart.
pub const CACHE_LINE_SIZE: usize = 64;
