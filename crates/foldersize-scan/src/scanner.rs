//! Directory listing with per-child subtree aggregates.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use foldersize_core::{
    AggregateIssue, AggregateResult, ChildRecord, FolderAnalysis, ScanConfig, ScanError, classify,
};

use crate::cache::AggregationCache;
use crate::fs::{EntryMeta, FsEntry};
use crate::progress::{ProgressTracker, ScanProgress};
use crate::resolve::{ResolvedPath, resolve};

/// Lists a directory and attaches a recursive aggregate to every child.
///
/// Directory children are aggregated in parallel and answered from the shared
/// [`AggregationCache`] whenever their stamp is unchanged.
#[derive(Debug)]
pub struct DirectoryScanner {
    config: ScanConfig,
    cache: Arc<AggregationCache>,
    pool: Option<rayon::ThreadPool>,
    progress_tx: broadcast::Sender<ScanProgress>,
}

/// Records of one listing plus every issue met while building them.
struct Listing {
    root: PathBuf,
    records: Vec<ChildRecord>,
    issues: Vec<AggregateIssue>,
}

impl DirectoryScanner {
    /// Create a scanner with default configuration.
    pub fn new(cache: Arc<AggregationCache>) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config: ScanConfig::default(),
            cache,
            pool: None,
            progress_tx,
        }
    }

    /// Create a scanner with explicit configuration.
    ///
    /// A non-zero `threads` gets a dedicated pool; zero shares rayon's global
    /// pool.
    pub fn with_config(config: ScanConfig, cache: Arc<AggregationCache>) -> Result<Self, ScanError> {
        let pool = match config.threads {
            0 => None,
            n => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("foldersize-{i}"))
                    .build()
                    .map_err(|e| ScanError::InvalidConfig {
                        message: e.to_string(),
                    })?,
            ),
        };

        let (progress_tx, _) = broadcast::channel(100);
        Ok(Self {
            config,
            cache,
            pool,
            progress_tx,
        })
    }

    /// Cache shared by every scan.
    pub fn cache(&self) -> &Arc<AggregationCache> {
        &self.cache
    }

    /// Active configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// List `path`, one record per immediate child, in directory order.
    pub fn scan(&self, path: &Path) -> Result<Vec<ChildRecord>, ScanError> {
        self.scan_with_cancel(path, &CancellationToken::new())
    }

    /// Like [`scan`](Self::scan), stopping early once `cancel` fires.
    ///
    /// A cancelled scan discards its records and fails with
    /// [`ScanError::Cancelled`]. Aggregates finished so far stay cached.
    pub fn scan_with_cancel(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChildRecord>, ScanError> {
        self.list(path, cancel).map(|listing| listing.records)
    }

    /// Scan `path` and summarize the result.
    pub fn analyze(&self, path: &Path, cancel: &CancellationToken) -> Result<FolderAnalysis, ScanError> {
        let start = Instant::now();
        let listing = self.list(path, cancel)?;
        Ok(FolderAnalysis::new(
            listing.root,
            listing.records,
            listing.issues,
            start.elapsed(),
        ))
    }

    /// Run [`scan_with_cancel`](Self::scan_with_cancel) on the blocking pool.
    pub async fn scan_async(
        self: Arc<Self>,
        path: PathBuf,
        cancel: CancellationToken,
    ) -> Result<Vec<ChildRecord>, ScanError> {
        tokio::task::spawn_blocking(move || self.scan_with_cancel(&path, &cancel))
            .await
            .map_err(|e| ScanError::Other {
                message: e.to_string(),
            })?
    }

    /// Run [`analyze`](Self::analyze) on the blocking pool.
    pub async fn analyze_async(
        self: Arc<Self>,
        path: PathBuf,
        cancel: CancellationToken,
    ) -> Result<FolderAnalysis, ScanError> {
        tokio::task::spawn_blocking(move || self.analyze(&path, &cancel))
            .await
            .map_err(|e| ScanError::Other {
                message: e.to_string(),
            })?
    }

    fn list(&self, path: &Path, cancel: &CancellationToken) -> Result<Listing, ScanError> {
        let fs = self.cache.filesystem().clone();
        let (root, entries) = match resolve(fs.as_ref(), path)? {
            ResolvedPath::Directory { path, entries, .. } => (path, entries),
            ResolvedPath::File { path, .. } => return Err(ScanError::NotADirectory { path }),
        };
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        debug!(path = %root.display(), entries = entries.len(), "scanning directory");

        let mut issues = Vec::new();
        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            if self.config.should_skip_hidden(&entry.name.to_string_lossy()) {
                continue;
            }
            match fs.symlink_metadata(&entry.path) {
                Ok(meta) => children.push((entry, meta)),
                Err(err) => {
                    warn!(path = %entry.path.display(), error = %err, "skipping unreadable entry");
                    issues.push(AggregateIssue::metadata_error(&entry.path, &err));
                }
            }
        }

        let tracker = ProgressTracker::new(root.clone(), children.len());
        let build = || -> Vec<Option<(ChildRecord, Vec<AggregateIssue>)>> {
            children
                .into_par_iter()
                .map(|(entry, meta)| self.child_record(entry, meta, &tracker, cancel))
                .collect()
        };
        let built = match &self.pool {
            Some(pool) => pool.install(build),
            None => build(),
        };

        if cancel.is_cancelled() {
            debug!(path = %root.display(), "scan cancelled");
            return Err(ScanError::Cancelled);
        }

        let mut records = Vec::with_capacity(built.len());
        for (record, child_issues) in built.into_iter().flatten() {
            records.push(record);
            issues.extend(child_issues);
        }

        debug!(
            path = %root.display(),
            items = records.len(),
            issues = issues.len(),
            "directory scanned"
        );

        Ok(Listing {
            root,
            records,
            issues,
        })
    }

    /// Build one record. `None` only when the scan was cancelled first.
    fn child_record(
        &self,
        entry: FsEntry,
        meta: EntryMeta,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Option<(ChildRecord, Vec<AggregateIssue>)> {
        if cancel.is_cancelled() {
            return None;
        }

        let name = entry.name.to_string_lossy();
        let class = classify(&name, meta.is_dir());

        let (record, issues) = if meta.is_dir() {
            let (aggregate, issues) = match self.cache.get_or_compute(&entry.path, cancel) {
                Ok(aggregate) => {
                    let issues = aggregate.errors_encountered.clone();
                    (aggregate, issues)
                }
                Err(err) => {
                    warn!(path = %entry.path.display(), error = %err, "subtree size overflowed");
                    let mut saturated = AggregateResult::new();
                    saturated.size = u64::MAX;
                    saturated.complete = false;
                    (saturated, vec![AggregateIssue::from(err)])
                }
            };
            let record =
                ChildRecord::directory(&*name, &entry.path, meta.modified, class, &aggregate);
            (record, issues)
        } else {
            let record = ChildRecord::file(&*name, &entry.path, meta.len, meta.modified, class);
            (record, Vec::new())
        };

        let _ = self
            .progress_tx
            .send(tracker.record_child(entry.path, record.size));

        Some((record, issues))
    }
}
