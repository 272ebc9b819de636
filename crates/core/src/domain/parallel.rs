//! Ephemeral data-parallel fan-out
//!
//! Work is split over scoped threads and joined before returning, so no
//! thread outlives the call that spawned it. Small workloads run inline.

use std::panic;

/// Below this many samples a call runs on the calling thread
pub(crate) const PARALLEL_MIN_SAMPLES: usize = 1 << 14;

/// Run `job(i)` for every `i < count` and collect the results in order
///
/// `work` is the total number of samples touched; it decides whether the
/// jobs are worth spreading over threads. At most [`worker_count`] threads
/// are started, each running a contiguous range of indices.
pub(crate) fn fan_out<T, F>(count: usize, work: usize, job: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let workers = worker_count().min(count);
    if workers <= 1 || work < PARALLEL_MIN_SAMPLES {
        return (0..count).map(&job).collect();
    }

    let per_worker = count.div_ceil(workers);
    let job = &job;
    crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = (0..count)
            .step_by(per_worker)
            .map(|start| {
                let end = (start + per_worker).min(count);
                scope.spawn(move |_| (start..end).map(job).collect::<Vec<T>>())
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
            .collect()
    })
    .unwrap_or_else(|payload| panic::resume_unwind(payload))
}

/// Split `data` into chunks of `chunk_len` and run `job(chunk_index, chunk)` on each
///
/// Chunks are grouped so that no more than [`worker_count`] threads run.
pub(crate) fn for_each_chunk_mut<F>(data: &mut [u8], chunk_len: usize, job: F)
where
    F: Fn(usize, &mut [u8]) + Sync,
{
    if chunk_len == 0 || data.is_empty() {
        return;
    }
    if data.len() <= chunk_len {
        job(0, data);
        return;
    }

    let mut chunks: Vec<(usize, &mut [u8])> = data.chunks_mut(chunk_len).enumerate().collect();
    let per_worker = chunks.len().div_ceil(worker_count());
    let job = &job;
    crossbeam::thread::scope(|scope| {
        for group in chunks.chunks_mut(per_worker) {
            scope.spawn(move |_| {
                for (index, chunk) in group.iter_mut() {
                    job(*index, chunk);
                }
            });
        }
    })
    .unwrap_or_else(|payload| panic::resume_unwind(payload));
}

/// Worker count for chunked jobs
pub(crate) fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
