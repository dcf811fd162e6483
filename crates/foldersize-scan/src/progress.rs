//! Scan progress reporting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Directory being listed.
    pub root: PathBuf,
    /// Number of children in the listing.
    pub children_total: u64,
    /// Number of children whose record is finished.
    pub children_done: u64,
    /// Bytes accounted for by finished children.
    pub bytes_aggregated: u64,
    /// Child that just finished.
    pub current_path: PathBuf,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Fraction of children finished, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.children_total == 0 {
            1.0
        } else {
            self.children_done as f64 / self.children_total as f64
        }
    }

    /// Check if every child is finished.
    pub fn is_finished(&self) -> bool {
        self.children_done >= self.children_total
    }
}

/// Shared progress tracker, updated from the worker pool.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    root: PathBuf,
    children_total: u64,
    children_done: AtomicU64,
    bytes_aggregated: AtomicU64,
}

impl ProgressTracker {
    pub fn new(root: PathBuf, children_total: usize) -> Self {
        Self {
            start_time: Instant::now(),
            root,
            children_total: children_total as u64,
            children_done: AtomicU64::new(0),
            bytes_aggregated: AtomicU64::new(0),
        }
    }

    /// Record a finished child and return the snapshot after it.
    pub fn record_child(&self, path: PathBuf, size: u64) -> ScanProgress {
        let done = self.children_done.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes = match self
            .bytes_aggregated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bytes| {
                Some(bytes.saturating_add(size))
            }) {
            Ok(previous) | Err(previous) => previous.saturating_add(size),
        };

        ScanProgress {
            root: self.root.clone(),
            children_total: self.children_total,
            children_done: done,
            bytes_aggregated: bytes,
            current_path: path,
            elapsed: self.start_time.elapsed(),
        }
    }
}
