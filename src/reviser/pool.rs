//! Bounded worker pool.
//!
//! A thin layer over `rayon::ThreadPool` that bounds the number of queued
//! tasks: submitting to a full pool blocks the caller until a task finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{ReviserError, Result};

/// Queued plus running tasks allowed per worker thread.
const SLOTS_PER_THREAD: usize = 4;

struct Slots {
    in_use: Mutex<usize>,
    capacity: usize,
    changed: Condvar,
}

impl Slots {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.in_use.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(self: &Arc<Self>) -> Permit {
        let mut in_use = self.lock();
        while *in_use >= self.capacity {
            in_use = self
                .changed
                .wait(in_use)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *in_use += 1;
        Permit(Arc::clone(self))
    }

    fn wait_idle(&self) {
        let mut in_use = self.lock();
        while *in_use > 0 {
            in_use = self
                .changed
                .wait(in_use)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Returns its slot when dropped, including when the task panics.
struct Permit(Arc<Slots>);

impl Drop for Permit {
    fn drop(&mut self) {
        *self.0.lock() -= 1;
        self.0.changed.notify_all();
    }
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    slots: Arc<Slots>,
    threads: usize,
    stopped: AtomicBool,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("reviser-worker-{}", i))
            .build()
            .map_err(|e| ReviserError::Pool(e.to_string()))?;

        Ok(Self {
            pool,
            slots: Arc::new(Slots {
                in_use: Mutex::new(0),
                capacity: threads * SLOTS_PER_THREAD,
                changed: Condvar::new(),
            }),
            threads,
            stopped: AtomicBool::new(false),
        })
    }

    /// Twice the available parallelism.
    pub fn default_size() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            * 2
    }

    pub fn with_default_size() -> Result<Self> {
        Self::new(Self::default_size())
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queues a detached task, blocking while the pool is full.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ReviserError::Pool("pool is stopped".to_string()));
        }
        let permit = self.slots.acquire();
        self.pool.spawn(move || {
            let _permit = permit;
            task();
        });
        Ok(())
    }

    /// Runs `op` on the calling thread; tasks spawned through the scope may
    /// borrow from the caller and have all finished when this returns.
    pub fn scope<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&PoolScope<'_, 'scope>) -> R,
    {
        self.pool.in_place_scope(|scope| {
            op(&PoolScope {
                scope,
                slots: &self.slots,
            })
        })
    }

    /// Refuses new submissions and waits for everything queued to finish.
    pub fn stop_and_wait(&self) {
        self.stopped.store(true, Ordering::Release);
        self.slots.wait_idle();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Spawn handle inside [`WorkerPool::scope`].
pub struct PoolScope<'a, 'scope> {
    scope: &'a rayon::Scope<'scope>,
    slots: &'a Arc<Slots>,
}

impl<'scope> PoolScope<'_, 'scope> {
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        let permit = self.slots.acquire();
        self.scope.spawn(move |_| {
            let _permit = permit;
            task();
        });
    }
}
