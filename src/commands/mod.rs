pub mod orf_to_contig;
pub mod results_per_contig;

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::io;
use std::num::NonZeroUsize;

/// Number of workers to spawn: never more than there are items to process.
pub(crate) fn worker_count(requested: NonZeroUsize, work_items: usize) -> usize {
    requested.get().min(work_items).max(1)
}

pub(crate) fn build_thread_pool(num_threads: usize) -> io::Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| io::Error::other(format!("Failed to build thread pool: {e}")))
}

/// Writer shard owned by the calling pool worker.
pub(crate) fn current_shard() -> usize {
    rayon::current_thread_index().unwrap_or(0)
}
