//! Recursive subtree aggregation.
//!
//! The walk is iterative: an explicit stack of frames, one per directory on
//! the current path, each carrying its own partial [`AggregateResult`]. A
//! frame whose pending subdirectories are exhausted folds into its parent.
//! Deep trees therefore cost heap, not call stack, and the cancellation check
//! sits at the top of the loop.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use foldersize_core::{AggregateError, AggregateIssue, AggregateResult, InodeInfo};

use crate::fs::{DirStamp, EntryKind, Filesystem, FsEntry};
use crate::identity::VisitedSet;

/// Points where a walk consults or informs its caller about descendant
/// directories. The walk root itself is never passed to either method.
pub trait WalkHooks {
    /// Return a still-valid aggregate for `dir`, listed under `stamp`, to use
    /// instead of descending into it.
    fn reuse(&mut self, _dir: &Path, _stamp: DirStamp) -> Option<AggregateResult> {
        None
    }

    /// Receive a fully walked descendant directory. Never called for a
    /// cancelled walk.
    fn finished(&mut self, _dir: &Path, _stamp: DirStamp, _aggregate: &AggregateResult) {}
}

impl<F> WalkHooks for F
where
    F: FnMut(&Path, DirStamp, &AggregateResult),
{
    fn finished(&mut self, dir: &Path, stamp: DirStamp, aggregate: &AggregateResult) {
        self(dir, stamp, aggregate)
    }
}

struct NoHooks;

impl WalkHooks for NoHooks {}

/// Walks directory trees and sums their size and counts.
#[derive(Debug, Clone)]
pub struct SubtreeAggregator {
    fs: Arc<dyn Filesystem>,
}

/// A subdirectory found while listing, not yet descended.
struct PendingDir {
    path: PathBuf,
    identity: Option<InodeInfo>,
    modified: SystemTime,
}

/// One directory on the current walk path.
struct Frame {
    path: PathBuf,
    identity: Option<InodeInfo>,
    /// Whether this frame put `identity` on the visited chain.
    entered: bool,
    stamp: DirStamp,
    acc: AggregateResult,
    pending: VecDeque<PendingDir>,
}

impl SubtreeAggregator {
    /// Create an aggregator over a filesystem.
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self { fs }
    }

    /// Aggregate the subtree rooted at `dir`.
    ///
    /// Unreadable members, cycles and cancellation leave a partial result
    /// with `complete == false`. Only a 64-bit size overflow fails the call.
    pub fn aggregate(
        &self,
        dir: &Path,
        visited: &mut VisitedSet,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult, AggregateError> {
        self.aggregate_with_hooks(dir, visited, cancel, &mut NoHooks)
    }

    /// Like [`aggregate`](Self::aggregate), letting `hooks` supply known
    /// descendant aggregates and observe every descendant the walk finishes.
    pub fn aggregate_with_hooks(
        &self,
        dir: &Path,
        visited: &mut VisitedSet,
        cancel: &CancellationToken,
        hooks: &mut dyn WalkHooks,
    ) -> Result<AggregateResult, AggregateError> {
        trace!(path = %dir.display(), "aggregating subtree");

        let root_meta = match self.fs.metadata(dir) {
            Ok(meta) => meta,
            Err(err) => {
                let mut result = AggregateResult::new();
                result.record_issue(AggregateIssue::metadata_error(dir, &err));
                return Ok(result);
            }
        };

        let entries = match self.fs.read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                let mut result = AggregateResult::new();
                result.record_issue(AggregateIssue::read_error(dir, &err));
                return Ok(result);
            }
        };

        let root = PendingDir {
            path: dir.to_path_buf(),
            identity: root_meta.identity,
            modified: root_meta.modified,
        };
        let entered = visited.enter(root.identity);
        let mut stack = Vec::new();
        match self.open_frame(root, entries, entered, dir, visited, cancel) {
            Ok(frame) => stack.push(frame),
            Err(err) => {
                if entered {
                    visited.leave(root_meta.identity);
                }
                return Err(err);
            }
        }

        let result = self.walk(&mut stack, dir, visited, cancel, hooks);

        // Only reached with frames left on an error; unwind the chain.
        for frame in stack.drain(..) {
            if frame.entered {
                visited.leave(frame.identity);
            }
        }

        if let Ok(ref aggregate) = result {
            debug!(
                path = %dir.display(),
                size = aggregate.size,
                files = aggregate.file_count,
                folders = aggregate.folder_count,
                complete = aggregate.complete,
                "subtree aggregated"
            );
        }
        result
    }

    fn walk(
        &self,
        stack: &mut Vec<Frame>,
        root: &Path,
        visited: &mut VisitedSet,
        cancel: &CancellationToken,
        hooks: &mut dyn WalkHooks,
    ) -> Result<AggregateResult, AggregateError> {
        let mut cancelled = false;

        while let Some(top) = stack.last_mut() {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
                top.acc.record_issue(AggregateIssue::cancelled(&top.path));
            }

            if !cancelled {
                if let Some(next) = top.pending.pop_front() {
                    let entries = match self.fs.read_dir(&next.path) {
                        Ok(entries) => entries,
                        Err(err) => {
                            top.acc
                                .record_issue(AggregateIssue::read_error(&next.path, &err));
                            continue;
                        }
                    };

                    let stamp = DirStamp {
                        modified: next.modified,
                        child_count: entries.len(),
                    };
                    if let Some(known) = hooks.reuse(&next.path, stamp) {
                        trace!(path = %next.path.display(), "reusing known aggregate");
                        top.acc.merge(known, root)?;
                        continue;
                    }

                    let entered = visited.enter(next.identity);
                    let identity = next.identity;
                    match self.open_frame(next, entries, entered, root, visited, cancel) {
                        Ok(frame) => stack.push(frame),
                        Err(err) => {
                            if entered {
                                visited.leave(identity);
                            }
                            return Err(err);
                        }
                    }
                    continue;
                }
            }

            let Some(frame) = stack.pop() else { break };
            if frame.entered {
                visited.leave(frame.identity);
            }

            match stack.last_mut() {
                Some(parent) => {
                    if !cancelled {
                        hooks.finished(&frame.path, frame.stamp, &frame.acc);
                    }
                    parent.acc.merge(frame.acc, root)?;
                }
                None => return Ok(frame.acc),
            }
        }

        // The loop always returns once the root frame is popped.
        Ok(AggregateResult::new())
    }

    /// Count the files of one listed directory and queue its subdirectories.
    fn open_frame(
        &self,
        dir: PendingDir,
        entries: Vec<FsEntry>,
        entered: bool,
        root: &Path,
        visited: &VisitedSet,
        cancel: &CancellationToken,
    ) -> Result<Frame, AggregateError> {
        let stamp = DirStamp {
            modified: dir.modified,
            child_count: entries.len(),
        };

        let mut acc = AggregateResult::new();
        let mut pending = VecDeque::new();

        for entry in entries {
            // The walk loop records the cancellation issue.
            if cancel.is_cancelled() {
                break;
            }

            let meta = match self.fs.symlink_metadata(&entry.path) {
                Ok(meta) => meta,
                Err(err) => {
                    acc.record_issue(AggregateIssue::metadata_error(&entry.path, &err));
                    continue;
                }
            };

            match meta.kind {
                EntryKind::Directory => {
                    if visited.contains(meta.identity) {
                        acc.record_issue(AggregateIssue::cycle(&entry.path));
                        continue;
                    }
                    acc.add_folder();
                    pending.push_back(PendingDir {
                        path: entry.path,
                        identity: meta.identity,
                        modified: meta.modified,
                    });
                }
                EntryKind::Symlink if self.links_to_ancestor(&entry.path, visited) => {
                    acc.record_issue(AggregateIssue::cycle(&entry.path));
                }
                EntryKind::Symlink | EntryKind::File | EntryKind::Other => {
                    acc.add_file(meta.len, root)?;
                }
            }
        }

        Ok(Frame {
            path: dir.path,
            identity: dir.identity,
            entered,
            stamp,
            acc,
            pending,
        })
    }

    /// Symlinks are never followed; one that resolves to a directory on the
    /// current chain is a cycle.
    fn links_to_ancestor(&self, link: &Path, visited: &VisitedSet) -> bool {
        self.fs
            .metadata(link)
            .is_ok_and(|target| target.is_dir() && visited.contains(target.identity))
    }
}
