//! Recursive subtree aggregate.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AggregateError, AggregateIssue, IssueKind};

/// Size and counts of a whole directory subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// Sum of all file sizes in the subtree.
    pub size: u64,
    /// Number of files anywhere in the subtree.
    pub file_count: u64,
    /// Number of directories in the subtree, not counting the root.
    pub folder_count: u64,
    /// Issues in the order they were met.
    pub errors_encountered: Vec<AggregateIssue>,
    /// True only if every reachable entry was accounted for.
    pub complete: bool,
}

impl Default for AggregateResult {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateResult {
    /// Create an empty, complete aggregate.
    pub fn new() -> Self {
        Self {
            size: 0,
            file_count: 0,
            folder_count: 0,
            errors_encountered: Vec::new(),
            complete: true,
        }
    }

    /// Count one file of `size` bytes.
    pub fn add_file(&mut self, size: u64, root: &Path) -> Result<(), AggregateError> {
        self.size = checked_size(self.size, size, root)?;
        self.file_count += 1;
        Ok(())
    }

    /// Count one subdirectory.
    pub fn add_folder(&mut self) {
        self.folder_count += 1;
    }

    /// Record an issue; the aggregate is no longer complete.
    pub fn record_issue(&mut self, issue: AggregateIssue) {
        self.complete = false;
        self.errors_encountered.push(issue);
    }

    /// Fold a finished child subtree into this one.
    pub fn merge(&mut self, child: AggregateResult, root: &Path) -> Result<(), AggregateError> {
        self.size = checked_size(self.size, child.size, root)?;
        self.file_count += child.file_count;
        self.folder_count += child.folder_count;
        self.complete &= child.complete;
        self.errors_encountered.extend(child.errors_encountered);
        Ok(())
    }

    /// Check if the walk producing this aggregate was cancelled.
    pub fn was_cancelled(&self) -> bool {
        self.errors_encountered
            .iter()
            .any(|issue| issue.kind == IssueKind::Cancelled)
    }

    /// Check if any issue was recorded.
    pub fn has_issues(&self) -> bool {
        !self.errors_encountered.is_empty()
    }
}

fn checked_size(total: u64, add: u64, root: &Path) -> Result<u64, AggregateError> {
    total
        .checked_add(add)
        .ok_or_else(|| AggregateError::SizeOverflow {
            path: root.to_path_buf(),
        })
}
