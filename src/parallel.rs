//! Bounded task parallelism.
//!
//! Every parallel step of the pipeline goes through [`Executor`]: two independent
//! resampling jobs via [`Executor::join`], and one nearest-neighbour query per sampled
//! point via [`Executor::map`]. Both return only once every task has finished, which is
//! the barrier the next stage relies on.
//!
//! The default executor runs on rayon's global pool, which is created once per process
//! and sized to the available cores. [`Executor::with_threads`] builds a dedicated pool
//! instead. With the `parallel` feature disabled the same API runs sequentially.

#[cfg(feature = "parallel")]
use std::sync::Arc;

use log::debug;
#[cfg(feature = "parallel")]
use log::warn;

#[derive(Clone)]
enum Backend {
    Sequential,
    #[cfg(feature = "parallel")]
    Global,
    #[cfg(feature = "parallel")]
    Pool(Arc<rayon::ThreadPool>),
}

/// Runs independent CPU-bound tasks with concurrency bounded by a thread pool.
#[derive(Clone)]
pub struct Executor {
    backend: Backend,
    threads: usize,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("threads", &self.threads)
            .field("global", &self.uses_global_pool())
            .finish()
    }
}

impl Default for Executor {
    /// Shares rayon's global pool, so creating many executors spawns no threads.
    #[cfg(feature = "parallel")]
    fn default() -> Self {
        Self {
            backend: Backend::Global,
            threads: rayon::current_num_threads(),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn default() -> Self {
        Self::sequential()
    }
}

impl Executor {
    /// Executor with a dedicated pool of at most `threads` workers (minimum 1).
    ///
    /// If the pool cannot be created, work runs sequentially on the calling thread.
    pub fn with_threads(threads: usize) -> Self {
        let threads = threads.max(1);
        if threads == 1 {
            return Self::sequential();
        }
        Self::build_pool(threads)
    }

    #[cfg(feature = "parallel")]
    fn build_pool(threads: usize) -> Self {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("route-divergence-{}", i))
            .build()
        {
            Ok(pool) => {
                debug!("[Executor] Created pool with {} threads", threads);
                Self {
                    backend: Backend::Pool(Arc::new(pool)),
                    threads,
                }
            }
            Err(e) => {
                warn!("[Executor] Failed to create thread pool, running sequentially: {}", e);
                Self::sequential()
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn build_pool(threads: usize) -> Self {
        debug!("[Executor] Built without `parallel`, ignoring thread count {}", threads);
        Self::sequential()
    }

    /// Executor that runs everything on the calling thread.
    pub fn sequential() -> Self {
        Self {
            backend: Backend::Sequential,
            threads: 1,
        }
    }

    /// Upper bound on concurrently running tasks.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// True when work runs on rayon's process-wide pool.
    pub fn uses_global_pool(&self) -> bool {
        match self.backend {
            #[cfg(feature = "parallel")]
            Backend::Global => true,
            _ => false,
        }
    }

    /// Run two independent tasks and wait for both.
    pub fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        match &self.backend {
            Backend::Sequential => (a(), b()),
            #[cfg(feature = "parallel")]
            Backend::Global => rayon::join(a, b),
            #[cfg(feature = "parallel")]
            Backend::Pool(pool) => pool.join(a, b),
        }
    }

    /// Apply `f` to every item and collect the results in input order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match &self.backend {
            Backend::Sequential => items.iter().map(f).collect(),
            #[cfg(feature = "parallel")]
            Backend::Global => {
                use rayon::prelude::*;
                items.par_iter().map(f).collect()
            }
            #[cfg(feature = "parallel")]
            Backend::Pool(pool) => {
                use rayon::prelude::*;
                pool.install(|| items.par_iter().map(&f).collect())
            }
        }
    }
}
