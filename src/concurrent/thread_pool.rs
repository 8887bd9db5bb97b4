// Copyright (c) 2025 OpsPulse Contributors
//
// Bounded-queue thread pool
//
// A fixed set of OS worker threads drains a bounded FIFO task queue.
// Submitters block on `not_full` while the queue is at capacity; workers
// block on `not_empty` while it is drained. Each task may carry a
// completion handle shared between the worker (signals once) and the
// submitter (waits with an optional deadline). Dropping the pool signals
// shutdown, joins every worker, and discards tasks still queued.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock;
use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Thread pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPoolConfig {
    /// Worker threads; 0 selects the number of online processors.
    pub num_threads: usize,
    /// Task queue capacity (0 selects the default of 1024). Submitters
    /// block while the queue holds this many pending tasks.
    pub queue_size: usize,
    /// Advisory; the pool keeps `num_threads` fixed.
    pub allow_grow: bool,
    /// Advisory ceiling paired with `allow_grow`.
    pub max_threads: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            queue_size: 1024,
            allow_grow: false,
            max_threads: 0,
        }
    }
}

/// Point-in-time thread pool statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadPoolStats {
    pub active_threads: usize,
    pub idle_threads: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    /// Accumulated queue residency across dequeued tasks.
    pub total_wait_ns: u64,
    /// Accumulated task execution time.
    pub total_exec_ns: u64,
}

struct QueuedTask {
    job: Job,
    handle: Option<Arc<HandleInner>>,
    enqueued_at: u64,
}

struct HandleInner {
    completed: Mutex<bool>,
    cond: Condvar,
}

/// Completion handle for a task submitted with
/// [`submit_with_handle`](ThreadPool::submit_with_handle).
///
/// The handle is an independently owned object: the worker signals it once
/// when the task function returns, and it stays valid for the submitter no
/// matter how long after the task node itself is gone.
pub struct TaskHandle {
    inner: Arc<HandleInner>,
}

impl TaskHandle {
    /// Wait for the task to complete.
    ///
    /// `None` waits forever; `Some(Duration::ZERO)` polls once and returns
    /// [`Error::Timeout`] if the task has not finished; any other duration
    /// bounds the wait and yields [`Error::Timeout`] on expiry.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let mut completed = self.inner.completed.lock();
        match timeout {
            None => {
                while !*completed {
                    self.inner.cond.wait(&mut completed);
                }
                Ok(())
            }
            Some(d) if d.is_zero() => {
                if *completed {
                    Ok(())
                } else {
                    Err(Error::Timeout)
                }
            }
            Some(d) => {
                let deadline = Instant::now() + d;
                while !*completed {
                    if self.inner.cond.wait_until(&mut completed, deadline).timed_out() {
                        return if *completed { Ok(()) } else { Err(Error::Timeout) };
                    }
                }
                Ok(())
            }
        }
    }

    /// Non-blocking completion check.
    pub fn is_completed(&self) -> bool {
        *self.inner.completed.lock()
    }
}

struct PoolInner {
    queue: VecDeque<QueuedTask>,
    shutdown: bool,
    active_count: usize,
    completed_count: usize,
    total_wait_ns: u64,
    total_exec_ns: u64,
}

struct PoolShared {
    inner: Mutex<PoolInner>,
    not_empty: Condvar,
    not_full: Condvar,
    queue_size: usize,
}

/// Bounded-queue thread pool with per-task completion handles.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    num_threads: usize,
}

impl ThreadPool {
    /// Spawn the worker threads. Fails with [`Error::Internal`] if the OS
    /// refuses a thread, after joining any workers already started.
    pub fn new(config: ThreadPoolConfig) -> Result<Self> {
        let num_threads = if config.num_threads == 0 {
            num_cpus::get()
        } else {
            config.num_threads
        };
        let queue_size = if config.queue_size == 0 {
            1024
        } else {
            config.queue_size
        };

        let shared = Arc::new(PoolShared {
            inner: Mutex::new(PoolInner {
                queue: VecDeque::new(),
                shutdown: false,
                active_count: 0,
                completed_count: 0,
                total_wait_ns: 0,
                total_exec_ns: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            queue_size,
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("opspulse-worker-{i}"))
                .spawn(move || worker_loop(&worker_shared));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Roll back: stop the workers already running.
                    {
                        let mut inner = shared.inner.lock();
                        inner.shutdown = true;
                    }
                    shared.not_empty.notify_all();
                    for w in workers {
                        let _ = w.join();
                    }
                    return Err(Error::Internal(format!("worker spawn failed: {e}")));
                }
            }
        }

        debug!(num_threads, queue_size, "thread pool started");

        Ok(Self {
            shared,
            workers,
            num_threads,
        })
    }

    /// Submit a fire-and-forget task. Blocks while the queue is full;
    /// returns [`Error::Shutdown`] (discarding the task) if the pool shuts
    /// down while the submitter is blocked.
    pub fn submit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(f), None)?;
        Ok(())
    }

    /// Submit a task and receive a [`TaskHandle`] signalled when it
    /// completes.
    pub fn submit_with_handle<F>(&self, f: F) -> Result<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = Arc::new(HandleInner {
            completed: Mutex::new(false),
            cond: Condvar::new(),
        });
        self.enqueue(Box::new(f), Some(Arc::clone(&inner)))?;
        Ok(TaskHandle { inner })
    }

    fn enqueue(&self, job: Job, handle: Option<Arc<HandleInner>>) -> Result<()> {
        let mut inner = self.shared.inner.lock();

        while inner.queue.len() >= self.shared.queue_size && !inner.shutdown {
            self.shared.not_full.wait(&mut inner);
        }

        if inner.shutdown {
            return Err(Error::Shutdown);
        }

        inner.queue.push_back(QueuedTask {
            job,
            handle,
            enqueued_at: clock::now(),
        });
        drop(inner);

        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and no worker is running a task.
    pub fn wait_all(&self) {
        let mut inner = self.shared.inner.lock();
        while !inner.queue.is_empty() || inner.active_count > 0 {
            self.shared.not_full.wait(&mut inner);
        }
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> ThreadPoolStats {
        let inner = self.shared.inner.lock();
        ThreadPoolStats {
            active_threads: inner.active_count,
            idle_threads: self.num_threads - inner.active_count,
            pending_tasks: inner.queue.len(),
            completed_tasks: inner.completed_count,
            total_wait_ns: inner.total_wait_ns,
            total_exec_ns: inner.total_exec_ns,
        }
    }

    /// Configured worker count.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.shutdown = true;
        }
        // Wake idle workers and any submitter blocked on a full queue.
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }

        let mut inner = self.shared.inner.lock();
        let dropped = inner.queue.len();
        inner.queue.clear();
        if dropped > 0 {
            warn!(dropped, "thread pool dropped undelivered tasks at shutdown");
        }
        debug!(
            completed = inner.completed_count,
            "thread pool shut down"
        );
    }
}

fn worker_loop(shared: &PoolShared) {
    loop {
        let task = {
            let mut inner = shared.inner.lock();

            while inner.queue.is_empty() && !inner.shutdown {
                shared.not_empty.wait(&mut inner);
            }

            // A task not yet dequeued when shutdown begins never runs; the
            // queue is discarded wholesale after the workers are joined.
            if inner.shutdown {
                return;
            }

            let task = inner
                .queue
                .pop_front()
                .expect("queue non-empty after wakeup");
            inner.active_count += 1;
            inner.total_wait_ns += clock::now().saturating_sub(task.enqueued_at);
            shared.not_full.notify_one();
            task
        };

        let started = clock::now();
        if catch_unwind(AssertUnwindSafe(task.job)).is_err() {
            warn!("task panicked; worker continues");
        }
        let exec_ns = clock::now().saturating_sub(started);

        if let Some(handle) = task.handle {
            let mut completed = handle.completed.lock();
            *completed = true;
            handle.cond.notify_all();
        }

        let mut inner = shared.inner.lock();
        inner.active_count -= 1;
        inner.completed_count += 1;
        inner.total_exec_ns += exec_ns;
        drop(inner);

        // wait_all watches both counters through not_full; wake it for the
        // active-count drop as well as the earlier dequeue.
        shared.not_full.notify_all();
    }
}
