//! Thread pools the execution engine can fan work out to.
//!
//! The engine only needs a parallel-for: [`ThreadPool::parallelize`] calls `f(index)` once for
//! every index in `0..range` and returns after all calls finish.

use std::num::NonZeroUsize;

pub trait ThreadPool: Sync {
    /// Number of workers that may run concurrently.
    fn threads(&self) -> usize;
    /// Calls `f` once for every index in `0..range`, in any order, and joins before returning.
    fn parallelize(&self, range: usize, f: &(dyn Fn(usize) + Sync));
}

/// A fixed number of scoped worker threads draining a shared index queue.
///
/// Workers are spawned per call and joined before `parallelize` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopedPool {
    threads: NonZeroUsize,
}

impl Default for ScopedPool {
    fn default() -> Self {
        let threads = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self { threads }
    }
}

impl ScopedPool {
    /// Creates a pool of `threads` workers. Zero is treated as one.
    pub fn new(threads: usize) -> Self {
        let threads = NonZeroUsize::new(threads).unwrap_or(NonZeroUsize::MIN);
        Self { threads }
    }
}

impl ThreadPool for ScopedPool {
    #[inline]
    fn threads(&self) -> usize {
        self.threads.get()
    }

    fn parallelize(&self, range: usize, f: &(dyn Fn(usize) + Sync)) {
        let threads = self.threads().min(range);
        if threads <= 1 {
            (0..range).for_each(f);
            return;
        }

        let (sender, receiver) = flume::bounded(range);
        for index in 0..range {
            // capacity equals range and the receiver is alive
            _ = sender.send(index);
        }
        drop(sender);

        std::thread::scope(|scope| {
            for _ in 0..threads {
                let receiver = receiver.clone();
                scope.spawn(move || {
                    while let Ok(index) = receiver.recv() {
                        f(index);
                    }
                });
            }
        });
    }
}

#[cfg(feature = "rayon")]
impl ThreadPool for rayon::ThreadPool {
    #[inline]
    fn threads(&self) -> usize {
        self.current_num_threads()
    }

    fn parallelize(&self, range: usize, f: &(dyn Fn(usize) + Sync)) {
        use rayon::prelude::*;
        self.install(|| (0..range).into_par_iter().for_each(f));
    }
}

/// Runs work on rayon's global thread pool.
#[cfg(feature = "rayon")]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GlobalPool;

#[cfg(feature = "rayon")]
impl ThreadPool for GlobalPool {
    #[inline]
    fn threads(&self) -> usize {
        rayon::current_num_threads()
    }

    fn parallelize(&self, range: usize, f: &(dyn Fn(usize) + Sync)) {
        use rayon::prelude::*;
        (0..range).into_par_iter().for_each(f);
    }
}
