//! Directory aggregation engine for foldersize.
//!
//! Turns a directory path into one record per immediate child, where every
//! directory child carries the size, file count and folder count of its whole
//! subtree.
//!
//! # Overview
//!
//! - **Iterative walks** with an explicit stack, so depth never exhausts the
//!   call stack
//! - **Cycle safety** through (device, inode) tracking of the ancestor chain
//! - **Partial results** when members are unreadable, instead of failing
//! - **Cached aggregates** validated by each directory's mtime and child count
//! - **Parallel children** on a rayon pool, with same-path walks coalesced
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use foldersize_scan::{AggregationCache, DirectoryScanner, OsFilesystem};
//!
//! let cache = Arc::new(AggregationCache::new(Arc::new(OsFilesystem)));
//! let scanner = DirectoryScanner::new(cache);
//!
//! for child in scanner.scan(Path::new("/path/to/scan")).unwrap() {
//!     println!("{}: {} bytes in {} files", child.name, child.size, child.file_count);
//! }
//! ```
//!
//! # Progress Monitoring
//!
//! Subscribe to per-child progress updates:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use foldersize_scan::{AggregationCache, DirectoryScanner, OsFilesystem};
//!
//! let scanner = DirectoryScanner::new(Arc::new(AggregationCache::new(Arc::new(OsFilesystem))));
//! let mut progress_rx = scanner.subscribe();
//!
//! // Handle progress in a separate task
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("{}/{} children", progress.children_done, progress.children_total);
//!     }
//! });
//! ```

mod aggregator;
mod cache;
mod fs;
mod identity;
mod progress;
mod resolve;
mod scanner;

#[cfg(test)]
mod testing;

pub use aggregator::{SubtreeAggregator, WalkHooks};
pub use cache::{AggregationCache, CacheStats};
pub use fs::{DirStamp, EntryKind, EntryMeta, Filesystem, FsEntry, OsFilesystem};
pub use identity::VisitedSet;
pub use progress::ScanProgress;
pub use resolve::{ResolvedPath, normalize, resolve};
pub use scanner::DirectoryScanner;

// Re-export core types for convenience
pub use foldersize_core::{
    AggregateError, AggregateIssue, AggregateResult, CacheConfig, ChildRecord, FileType,
    FolderAnalysis, IssueKind, ScanConfig, ScanError,
};
