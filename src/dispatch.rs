//! Partitioning of scans across workers, progress reporting and
//! cancellation.
//!
//! Workers share the elevation grid by reference. Full scans give each row
//! partition its own chunk; radial scans fold ray partitions into one
//! buffer per worker lane. Buffers are combined with a max-wins merge,
//! which is commutative, so partition order never changes the result.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ndarray::{ArrayView2, ArrayViewMut2, Zip};
use rayon::prelude::*;

use crate::config::Dispatch;
use crate::error::{Result, VisibilityError};

/// Smallest row partition handed to one worker in a full scan.
pub const MIN_ROW_CHUNK: usize = 64;

// Partitions per worker, so slow partitions can be balanced.
const CHUNKS_PER_WORKER: usize = 4;

// Number of progress callbacks over a whole run.
const PROGRESS_NOTIFICATIONS: usize = 200;

type ProgressCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Shared progress counter and cancel flag for one running scan.
///
/// Wrap in an `Arc` to poll from another thread while the scan runs.
#[derive(Default)]
pub struct ScanProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
    cancelled: AtomicBool,
    callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ScanProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanProgress")
            .field("completed", &self.completed())
            .field("total", &self.total())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke `callback` with the completed fraction as work finishes.
    pub fn with_callback(callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            ..Self::default()
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Completed fraction in `[0, 1]`; zero before a scan starts.
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.completed() as f64 / total as f64).min(1.0)
    }

    /// Request that the running scan stop at the next row or ray.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Clear the counters and any pending cancellation before reuse.
    pub fn reset(&self) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
        self.cancelled.store(false, Ordering::Relaxed);
    }

    pub(crate) fn start(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub(crate) fn advance(&self, units: usize) {
        let before = self.completed.fetch_add(units, Ordering::Relaxed);
        let Some(callback) = &self.callback else {
            return;
        };
        let total = self.total();
        if total == 0 {
            return;
        }
        let every = total.div_ceil(PROGRESS_NOTIFICATIONS);
        let after = before + units;
        if after / every != before / every || after >= total {
            callback((after as f64 / total as f64).min(1.0));
        }
    }
}

/// Returns `Err(Cancelled)` when the caller asked to stop.
pub(crate) fn check_cancelled(progress: Option<&ScanProgress>) -> Result<()> {
    match progress {
        Some(p) if p.is_cancelled() => Err(VisibilityError::Cancelled),
        _ => Ok(()),
    }
}

fn worker_count(dispatch: &Dispatch) -> usize {
    dispatch
        .workers
        .unwrap_or_else(rayon::current_num_threads)
        .max(1)
}

/// Contiguous `[start, end)` ranges of `chunk` items covering `0..total`.
pub(crate) fn split_ranges(total: usize, chunk: usize) -> Vec<Range<usize>> {
    let chunk = chunk.max(1);
    (0..total)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(total))
        .collect()
}

/// Row partitions for a full scan.
pub(crate) fn row_partitions(rows: usize, dispatch: &Dispatch) -> Vec<Range<usize>> {
    let chunk = dispatch.chunk.unwrap_or_else(|| {
        (rows / (worker_count(dispatch) * CHUNKS_PER_WORKER)).max(MIN_ROW_CHUNK)
    });
    split_ranges(rows, chunk)
}

/// Ray partitions for a radial scan, one per worker unless overridden.
pub(crate) fn ray_partitions(rays: usize, dispatch: &Dispatch) -> Vec<Range<usize>> {
    let chunk = dispatch
        .chunk
        .unwrap_or_else(|| rays.div_ceil(worker_count(dispatch)));
    split_ranges(rays, chunk)
}

/// Run `job` on every partition according to `dispatch`, keeping results in
/// partition order.
pub(crate) fn run_partitions<T, F>(
    partitions: &[Range<usize>],
    dispatch: &Dispatch,
    job: F,
) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(Range<usize>) -> T + Sync + Send,
{
    match dispatch.workers {
        Some(1) => Ok(partitions.iter().cloned().map(&job).collect()),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            Ok(pool.install(|| partitions.par_iter().cloned().map(&job).collect()))
        }
        None => Ok(partitions.par_iter().cloned().map(&job).collect()),
    }
}

/// Fold every partition into an accumulator and combine the accumulators
/// with `reduce`.
///
/// Partitions are dealt round-robin to one lane per worker, and each lane
/// folds its share sequentially, so `identity` runs once per lane and no
/// more than `min(workers, partitions)` accumulators exist at a time.
pub(crate) fn fold_partitions<A, I, F, R>(
    partitions: &[Range<usize>],
    dispatch: &Dispatch,
    identity: I,
    fold: F,
    reduce: R,
) -> Result<A>
where
    A: Send,
    I: Fn() -> A + Sync + Send,
    F: Fn(A, Range<usize>) -> A + Sync + Send,
    R: Fn(A, A) -> A + Sync + Send,
{
    let lanes = worker_count(dispatch).min(partitions.len()).max(1);
    let lane = |first: usize| {
        partitions
            .iter()
            .skip(first)
            .step_by(lanes)
            .cloned()
            .fold(identity(), &fold)
    };
    let folded = match dispatch.workers {
        Some(1) => Some(lane(0)),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            pool.install(|| (0..lanes).into_par_iter().map(lane).reduce_with(&reduce))
        }
        None => (0..lanes).into_par_iter().map(lane).reduce_with(&reduce),
    };
    Ok(folded.unwrap_or_else(identity))
}

/// Max-wins merge: `dst` takes `src` wherever `src` is strictly greater.
pub(crate) fn merge_max(mut dst: ArrayViewMut2<f32>, src: ArrayView2<f32>) {
    Zip::from(&mut dst).and(&src).for_each(|d, &s| {
        if s > *d {
            *d = s;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn ranges_cover_everything_once() {
        let ranges = split_ranges(10, 4);
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        assert!(split_ranges(0, 4).is_empty());
    }

    #[test]
    fn row_partitions_respect_minimum_chunk() {
        let d = Dispatch::default().with_workers(8);
        assert_eq!(row_partitions(100, &d), vec![0..64, 64..100]);
        let d = Dispatch::default().with_workers(2);
        assert_eq!(row_partitions(1000, &d).len(), 8);
        let d = Dispatch::default().with_chunk(3);
        assert_eq!(row_partitions(7, &d), vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn ray_partitions_split_per_worker() {
        let d = Dispatch::default().with_workers(3);
        assert_eq!(ray_partitions(10, &d), vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn partitions_keep_order_in_every_mode() {
        let parts = split_ranges(20, 3);
        for dispatch in [
            Dispatch::sequential(),
            Dispatch::default().with_workers(3),
            Dispatch::default(),
        ] {
            let starts = run_partitions(&parts, &dispatch, |r| r.start).unwrap();
            assert_eq!(starts, parts.iter().map(|r| r.start).collect::<Vec<_>>());
        }
    }

    #[test]
    fn folding_allocates_one_accumulator_per_lane() {
        let parts = split_ranges(512, 1);
        for (dispatch, lanes) in [
            (Dispatch::sequential().with_chunk(1), 1),
            (Dispatch::default().with_workers(2).with_chunk(1), 2),
            (Dispatch::default().with_workers(4), 4),
        ] {
            let created = AtomicUsize::new(0);
            let total = fold_partitions(
                &parts,
                &dispatch,
                || {
                    created.fetch_add(1, Ordering::Relaxed);
                    0usize
                },
                |acc, r| acc + r.len(),
                |a, b| a + b,
            )
            .unwrap();
            assert_eq!(total, 512);
            assert_eq!(created.load(Ordering::Relaxed), lanes, "{dispatch:?}");
        }

        let created = AtomicUsize::new(0);
        let empty = fold_partitions(
            &[],
            &Dispatch::default().with_workers(3),
            || {
                created.fetch_add(1, Ordering::Relaxed);
                7usize
            },
            |acc, r| acc + r.len(),
            |a, b| a + b,
        )
        .unwrap();
        assert_eq!(empty, 7);
        assert_eq!(created.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn merge_keeps_strictly_greater_values() {
        let mut dst = array![[-9999.0f32, 5.0], [3.0, 0.0]];
        let src = array![[1.0f32, 4.0], [-9999.0, 0.0]];
        merge_max(dst.view_mut(), src.view());
        assert_eq!(dst, array![[1.0, 5.0], [3.0, 0.0]]);
    }

    #[test]
    fn progress_reports_fraction_and_cancel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let progress = ScanProgress::with_callback(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        progress.start(400);
        for _ in 0..400 {
            progress.advance(1);
        }
        assert_eq!(progress.fraction(), 1.0);
        assert_eq!(calls.load(Ordering::Relaxed), 200);
        assert!(check_cancelled(Some(&progress)).is_ok());
        progress.cancel();
        assert!(matches!(
            check_cancelled(Some(&progress)),
            Err(VisibilityError::Cancelled)
        ));
        progress.reset();
        assert!(!progress.is_cancelled());
        assert_eq!(progress.fraction(), 0.0);
    }

    #[test]
    fn progress_callbacks_stay_bounded_for_uneven_totals() {
        for total in [199, 201, 399, 401, 1001] {
            let calls = Arc::new(AtomicUsize::new(0));
            let seen = calls.clone();
            let progress = ScanProgress::with_callback(move |_| {
                seen.fetch_add(1, Ordering::Relaxed);
            });
            progress.start(total);
            for _ in 0..total {
                progress.advance(1);
            }
            let calls = calls.load(Ordering::Relaxed);
            assert!(calls <= PROGRESS_NOTIFICATIONS, "{total}: {calls} callbacks");
            assert!(calls > 0);
        }
    }
}
