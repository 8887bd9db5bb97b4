// Fixed-block memory pool
//
// A slab of `initial_blocks` uniform blocks is allocated up front and carved
// into an intrusive free list; alloc pops a block, free pushes it back. When
// the free list runs dry and the pool is allowed to grow, single-block
// overflow allocations are taken from the system allocator and tracked on a
// side list so they can be released when the pool is dropped. Reset rebuilds
// the free list from the original slab only.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Minimum alignment of every pointer handed out by the pool.
const BLOCK_ALIGN: usize = 8;

/// Intrusive free-list link stored at the start of each block.
struct FreeBlock {
    next: *mut FreeBlock,
}

const HEADER_SIZE: usize = std::mem::size_of::<FreeBlock>();

/// Block pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// User-visible payload size of each block in bytes.
    pub block_size: usize,
    /// Blocks carved from the initial slab (0 selects the default of 64).
    pub initial_blocks: usize,
    /// Ceiling on total blocks; 0 means unlimited growth.
    pub max_blocks: usize,
    /// Whether the pool is shared across threads.
    pub thread_safe: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            block_size: 256,
            initial_blocks: 64,
            max_blocks: 0,
            thread_safe: true,
        }
    }
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_blocks: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub alloc_count: u64,
    pub free_count: u64,
}

#[derive(Debug)]
struct PoolState {
    free_list: *mut FreeBlock,
    total_blocks: usize,
    used_blocks: usize,
    alloc_count: u64,
    free_count: u64,
    /// Overflow blocks allocated past the slab. Retired from circulation by
    /// `reset` but only released on drop.
    overflow: Vec<NonNull<u8>>,
}

/// Fixed-block memory pool with an intrusive free list.
///
/// Pointers returned by [`alloc`](BlockPool::alloc) are aligned to at least
/// 8 bytes and point at `block_size` bytes of payload. Every outstanding
/// pointer must be returned with [`free`](BlockPool::free) (or forgotten
/// entirely) before the pool is dropped; the payload memory is reclaimed
/// wholesale at drop regardless.
#[derive(Debug)]
pub struct BlockPool {
    block_size: usize,
    initial_blocks: usize,
    max_blocks: usize,
    thread_safe: bool,
    stride: usize,
    slab: NonNull<u8>,
    slab_layout: Layout,
    block_layout: Layout,
    state: Mutex<PoolState>,
}

// The raw pointers inside are only touched under the state mutex, and the
// slab itself is exclusively owned by the pool.
unsafe impl Send for BlockPool {}
unsafe impl Sync for BlockPool {}

fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

impl BlockPool {
    /// Create a pool carving `initial_blocks` blocks out of one slab.
    pub fn new(config: PoolConfig) -> Result<Self> {
        if config.block_size == 0 {
            return Err(Error::invalid("block_size must be non-zero"));
        }

        let initial_blocks = if config.initial_blocks == 0 {
            64
        } else {
            config.initial_blocks
        };
        let stride = align_up(config.block_size + HEADER_SIZE, BLOCK_ALIGN);

        let slab_bytes = stride
            .checked_mul(initial_blocks)
            .ok_or_else(|| Error::invalid("slab size overflows usize"))?;
        let slab_layout = Layout::from_size_align(slab_bytes, BLOCK_ALIGN)
            .map_err(|e| Error::invalid(format!("slab layout: {e}")))?;
        let block_layout = Layout::from_size_align(stride, BLOCK_ALIGN)
            .map_err(|e| Error::invalid(format!("block layout: {e}")))?;
        let slab = match NonNull::new(unsafe { alloc(slab_layout) }) {
            Some(ptr) => ptr,
            None => return Err(Error::OutOfMemory),
        };

        let mut state = PoolState {
            free_list: std::ptr::null_mut(),
            total_blocks: initial_blocks,
            used_blocks: 0,
            alloc_count: 0,
            free_count: 0,
            overflow: Vec::new(),
        };
        unsafe { thread_free_list(&mut state, slab, stride, initial_blocks) };

        debug!(
            block_size = config.block_size,
            initial_blocks,
            stride,
            "block pool created"
        );

        Ok(Self {
            block_size: config.block_size,
            initial_blocks,
            max_blocks: config.max_blocks,
            thread_safe: config.thread_safe,
            stride,
            slab,
            slab_layout,
            block_layout,
            state: Mutex::new(state),
        })
    }

    /// Pop a block from the free list, growing the pool by one overflow
    /// block if empty and the ceiling allows. Returns `None` when the pool
    /// is exhausted or the system allocator fails.
    pub fn alloc(&self) -> Option<NonNull<u8>> {
        let mut state = self.state.lock();

        if state.free_list.is_null() {
            if self.max_blocks > 0 && state.total_blocks >= self.max_blocks {
                return None;
            }

            let raw = NonNull::new(unsafe { alloc(self.block_layout) })?;
            state.overflow.push(raw);

            let header = raw.as_ptr() as *mut FreeBlock;
            unsafe { (*header).next = std::ptr::null_mut() };
            state.free_list = header;
            state.total_blocks += 1;
            trace!(total_blocks = state.total_blocks, "pool grew by overflow block");
        }

        let block = state.free_list;
        state.free_list = unsafe { (*block).next };
        state.used_blocks += 1;
        state.alloc_count += 1;

        // Payload starts after the free-list header.
        let payload = unsafe { (block as *mut u8).add(HEADER_SIZE) };
        Some(unsafe { NonNull::new_unchecked(payload) })
    }

    /// Return a block to the free list.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](BlockPool::alloc) on this
    /// pool and must not be freed more than once per outstanding allocation.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let header = ptr.as_ptr().sub(HEADER_SIZE) as *mut FreeBlock;

        let mut state = self.state.lock();
        (*header).next = state.free_list;
        state.free_list = header;
        state.used_blocks = state.used_blocks.saturating_sub(1);
        state.free_count += 1;
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            total_blocks: state.total_blocks,
            used_blocks: state.used_blocks,
            free_blocks: state.total_blocks - state.used_blocks,
            total_bytes: state.total_blocks * self.block_size,
            used_bytes: state.used_blocks * self.block_size,
            alloc_count: state.alloc_count,
            free_count: state.free_count,
        }
    }

    /// Rebuild the free list from the original slab, restoring
    /// `total_blocks = initial_blocks` and `used_blocks = 0`.
    ///
    /// Outstanding pointers become dead after a reset; callers should drain
    /// the pool first. Overflow blocks allocated since creation are retired
    /// from circulation and only released when the pool is dropped.
    pub fn reset(&self) {
        let mut state = self.state.lock();

        unsafe { thread_free_list(&mut state, self.slab, self.stride, self.initial_blocks) };
        state.total_blocks = self.initial_blocks;
        state.used_blocks = 0;

        debug!(
            retired_overflow = state.overflow.len(),
            "block pool reset to initial slab"
        );
    }

    /// Configured payload size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Whether the pool was configured for cross-thread sharing.
    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }
}

/// Thread the slab's blocks onto the state's free list, newest first.
unsafe fn thread_free_list(state: &mut PoolState, slab: NonNull<u8>, stride: usize, count: usize) {
    state.free_list = std::ptr::null_mut();
    let mut ptr = slab.as_ptr();
    for _ in 0..count {
        let block = ptr as *mut FreeBlock;
        (*block).next = state.free_list;
        state.free_list = block;
        ptr = ptr.add(stride);
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for block in state.overflow.drain(..) {
            unsafe { dealloc(block.as_ptr(), self.block_layout) };
        }
        unsafe { dealloc(self.slab.as_ptr(), self.slab_layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn small_pool(max_blocks: usize) -> BlockPool {
        BlockPool::new(PoolConfig {
            block_size: 64,
            initial_blocks: 4,
            max_blocks,
            thread_safe: false,
        })
        .unwrap()
    }

    #[test]
    fn test_alloc_free_roundtrip() {
        let pool = small_pool(0);
        let ptr = pool.alloc().unwrap();

        // The full payload is writable.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0xAB, 64) };
        assert_eq!(unsafe { *ptr.as_ptr().add(63) }, 0xAB);

        unsafe { pool.free(ptr) };
        let stats = pool.stats();
        assert_eq!(stats.used_blocks, 0);
        assert_eq!(stats.alloc_count, 1);
        assert_eq!(stats.free_count, 1);
    }

    #[test]
    fn test_alignment() {
        let pool = BlockPool::new(PoolConfig {
            block_size: 13,
            initial_blocks: 8,
            max_blocks: 0,
            thread_safe: false,
        })
        .unwrap();

        for _ in 0..8 {
            let ptr = pool.alloc().unwrap();
            assert_eq!(ptr.as_ptr() as usize % 8, 0);
        }
    }

    #[test]
    fn test_overflow_ceiling() {
        let pool = small_pool(4);

        let blocks: Vec<_> = (0..4).map(|_| pool.alloc().unwrap()).collect();
        assert!(pool.alloc().is_none());

        unsafe { pool.free(blocks[0]) };
        assert!(pool.alloc().is_some());
    }

    #[test]
    fn test_unbounded_growth() {
        let pool = small_pool(0);

        let blocks: Vec<_> = (0..10).map(|_| pool.alloc().unwrap()).collect();
        let stats = pool.stats();
        assert_eq!(stats.total_blocks, 10);
        assert_eq!(stats.used_blocks, 10);

        for b in blocks {
            unsafe { pool.free(b) };
        }
        assert_eq!(pool.stats().used_blocks, 0);
    }

    #[test]
    fn test_used_plus_free_is_total() {
        let pool = small_pool(0);
        let mut held = Vec::new();

        for i in 0..20 {
            held.push(pool.alloc().unwrap());
            if i % 3 == 0 {
                let ptr = held.remove(0);
                unsafe { pool.free(ptr) };
            }
            let stats = pool.stats();
            assert_eq!(stats.used_blocks + stats.free_blocks, stats.total_blocks);
        }

        for ptr in held {
            unsafe { pool.free(ptr) };
        }
    }

    #[test]
    fn test_reset_restores_initial() {
        let pool = small_pool(0);

        let _grown: Vec<_> = (0..8).map(|_| pool.alloc().unwrap()).collect();
        assert_eq!(pool.stats().total_blocks, 8);

        pool.reset();
        let stats = pool.stats();
        assert_eq!(stats.total_blocks, 4);
        assert_eq!(stats.used_blocks, 0);
        assert_eq!(stats.free_blocks, 4);

        // The slab is usable again after reset.
        let ptr = pool.alloc().unwrap();
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0x11, 64) };
        unsafe { pool.free(ptr) };
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let err = BlockPool::new(PoolConfig {
            block_size: 0,
            ..PoolConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn test_concurrent_alloc_free() {
        let pool = Arc::new(BlockPool::new(PoolConfig {
            block_size: 32,
            initial_blocks: 16,
            max_blocks: 0,
            thread_safe: true,
        })
        .unwrap());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let ptr = pool.alloc().unwrap();
                    unsafe { pool.free(ptr) };
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.used_blocks, 0);
        assert_eq!(stats.alloc_count, 4000);
        assert_eq!(stats.free_count, 4000);
        assert_eq!(stats.used_blocks + stats.free_blocks, stats.total_blocks);
    }
}
