//! Progress reporting and cancellation for folder decoding.
//!
//! The pipeline calls [`ProgressReporter::on_progress`] at most once per
//! configured interval of unpacked output (1 MiB by default) and once more
//! when a folder is complete. Returning `false` aborts the decode with
//! [`Error::Cancelled`](crate::Error::Cancelled); output already produced is
//! kept, coder state is discarded.
//!
//! # Example
//!
//! ```rust
//! use zesven_core::progress::{progress_fn, ProgressReporter};
//!
//! let mut seen = 0;
//! let mut reporter = progress_fn(|_packed, unpacked| {
//!     seen = unpacked;
//!     unpacked < 4 * 1024 * 1024
//! });
//! assert!(reporter.on_progress(100, 1024));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Default progress interval.
pub const BYTES_MIB: u64 = 1 << 20;

/// Receives progress updates from a decode call.
pub trait ProgressReporter: Send {
    /// Called once before work starts with the number of unpacked bytes expected.
    fn on_total(&mut self, total_bytes: u64) {
        let _ = total_bytes;
    }

    /// Called with the packed input and unpacked output of the current
    /// folder so far.
    ///
    /// Returns `true` to continue or `false` to request cancellation.
    fn on_progress(&mut self, packed_in: u64, unpacked_out: u64) -> bool {
        let _ = (packed_in, unpacked_out);
        true
    }

    /// Called when the decode of a folder begins.
    fn on_folder_start(&mut self, folder_index: usize, unpack_size: u64) {
        let _ = (folder_index, unpack_size);
    }
}

/// A reporter that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Progress state shared with another thread, which may also cancel.
///
/// Clones observe the same state; hand one clone to the decode call.
#[derive(Debug, Clone, Default)]
pub struct SharedProgress {
    state: Arc<SharedState>,
}

#[derive(Debug, Default)]
struct SharedState {
    total: AtomicU64,
    folder: AtomicUsize,
    folder_done: AtomicU64,
    finished_folders: AtomicU64,
    cancelled: AtomicBool,
}

impl SharedProgress {
    /// Creates a fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the announced total.
    pub fn total_bytes(&self) -> u64 {
        self.state.total.load(Ordering::Relaxed)
    }

    /// Returns the unpacked bytes of all folders started so far.
    pub fn unpacked_bytes(&self) -> u64 {
        self.state.finished_folders.load(Ordering::Relaxed)
            + self.state.folder_done.load(Ordering::Relaxed)
    }

    /// Returns the folder being decoded.
    pub fn current_folder(&self) -> usize {
        self.state.folder.load(Ordering::Relaxed)
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Relaxed)
    }

    /// Requests cancellation; the next progress call returns `false`.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Relaxed);
    }
}

impl ProgressReporter for SharedProgress {
    fn on_total(&mut self, total_bytes: u64) {
        self.state.total.store(total_bytes, Ordering::Relaxed);
    }

    fn on_progress(&mut self, _packed_in: u64, unpacked_out: u64) -> bool {
        self.state.folder_done.store(unpacked_out, Ordering::Relaxed);
        !self.is_cancelled()
    }

    fn on_folder_start(&mut self, folder_index: usize, _unpack_size: u64) {
        let done = self.state.folder_done.swap(0, Ordering::Relaxed);
        self.state.finished_folders.fetch_add(done, Ordering::Relaxed);
        self.state.folder.store(folder_index, Ordering::Relaxed);
    }
}

impl<P: ProgressReporter + ?Sized> ProgressReporter for &mut P {
    fn on_total(&mut self, total_bytes: u64) {
        (**self).on_total(total_bytes);
    }

    fn on_progress(&mut self, packed_in: u64, unpacked_out: u64) -> bool {
        (**self).on_progress(packed_in, unpacked_out)
    }

    fn on_folder_start(&mut self, folder_index: usize, unpack_size: u64) {
        (**self).on_folder_start(folder_index, unpack_size);
    }
}

/// A reporter backed by a closure.
pub struct ClosureProgress<F> {
    callback: F,
}

impl<F> ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    /// Creates a reporter from a closure.
    ///
    /// The closure receives `(packed_in, unpacked_out)` and returns `true` to
    /// continue or `false` to cancel.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> std::fmt::Debug for ClosureProgress<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureProgress").finish_non_exhaustive()
    }
}

impl<F> ProgressReporter for ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    fn on_progress(&mut self, packed_in: u64, unpacked_out: u64) -> bool {
        (self.callback)(packed_in, unpacked_out)
    }
}

/// Creates a closure-based progress reporter.
pub fn progress_fn<F>(f: F) -> ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    ClosureProgress::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_progress_never_cancels() {
        let mut progress = NoProgress;
        assert!(progress.on_progress(50, 100));
    }

    #[test]
    fn test_shared_progress_accumulates_folders() {
        let observer = SharedProgress::new();
        let mut reporter = observer.clone();

        reporter.on_total(1000);
        reporter.on_folder_start(0, 400);
        assert!(reporter.on_progress(10, 400));
        reporter.on_folder_start(1, 600);
        assert!(reporter.on_progress(12, 250));
        assert_eq!(observer.total_bytes(), 1000);
        assert_eq!(observer.current_folder(), 1);
        assert_eq!(observer.unpacked_bytes(), 650);

        observer.cancel();
        assert!(!reporter.on_progress(12, 300));
    }

    #[test]
    fn test_closure_progress() {
        let mut count = 0;
        let mut progress = progress_fn(|_, out| {
            count += 1;
            out < 100
        });

        assert!(progress.on_progress(0, 50));
        assert!(!progress.on_progress(0, 100));
        assert_eq!(count, 2);
    }

    #[test]
    fn test_mut_ref_forwards() {
        let observer = SharedProgress::new();
        let mut owned = observer.clone();
        let mut by_ref = &mut owned;
        ProgressReporter::on_folder_start(&mut by_ref, 3, 10);
        assert_eq!(observer.current_folder(), 3);
    }
}
