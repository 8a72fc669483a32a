//! Bounded worker pool for fan-out/fan-in parallel maps.
//!
//! Wraps a dedicated rayon thread pool so a batch of independent tasks runs on
//! at most `workers` threads without touching the global pool.

use rayon::prelude::*;


/// Fixed-size pool of worker threads.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers())
            .finish()
    }
}

impl WorkerPool {
    /// Creates a pool with `workers` threads. Zero selects the number of available cores.
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let workers = if workers == 0 {
            available_workers()
        } else {
            workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("worker-{index}"))
            .build()?;
        Ok(Self { pool })
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Maps `f(index, item)` over `items` on the pool. Output order matches input order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Sync,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| f(index, item))
                .collect()
        })
    }

    /// Like [`WorkerPool::map`], but stops scheduling new items after the first error.
    ///
    /// Items already running on other workers finish; their results are discarded.
    pub fn try_map<T, R, E, F>(&self, items: &[T], f: F) -> Result<Vec<R>, E>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(usize, &T) -> Result<R, E> + Sync,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| f(index, item))
                .collect()
        })
    }
}

/// Number of hardware threads, at least one.
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
