// # Memory Management Module
//
// Fixed-block pooling for per-message telemetry records.
//
// The block pool amortizes allocator traffic on the hot ingest path: a
// single slab is carved into uniform blocks threaded on an intrusive free
// list, and alloc/free become a pointer swap. Overflow past the slab falls
// back to single-block heap allocations until the configured ceiling.
//
// ## Example
//
// ```rust
// use opspulse::memory::{BlockPool, PoolConfig};
//
// let pool = BlockPool::new(PoolConfig {
//     block_size: 256,
//     initial_blocks: 128,
//     max_blocks: 0,
//     thread_safe: true,
// }).unwrap();
//
// if let Some(block) = pool.alloc() {
//     // ... fill the 256-byte record ...
//     unsafe { pool.free(block) };
// }
//
// let stats = pool.stats();
// assert_eq!(stats.used_blocks, 0);
// ```

pub mod block_pool;

pub use block_pool::{BlockPool, PoolConfig, PoolStats};
