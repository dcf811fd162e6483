//! Listing record types.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateResult;
use crate::classify::{Classification, FileType};

/// Filesystem identity used for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InodeInfo {
    /// Inode number.
    pub inode: u64,
    /// Device ID.
    pub device: u64,
}

impl InodeInfo {
    /// Create new inode info.
    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }
}

/// One immediate child of a scanned directory.
///
/// Serialized with the camelCase keys the browser consumes; `file_type` goes
/// out as `type` and `last_modified` as an RFC 3339 UTC timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecord {
    /// Base name of the entry.
    pub name: CompactString,

    /// Absolute, normalized path.
    pub path: PathBuf,

    /// Own size for files, whole-subtree size for directories.
    pub size: u64,

    /// Files anywhere below a directory; always 0 for files.
    pub file_count: u64,

    /// Directories anywhere below a directory, excluding itself; 0 for files.
    pub folder_count: u64,

    /// The entry's own modification time.
    pub last_modified: DateTime<Utc>,

    /// Whether the name marks the entry as hidden.
    pub is_hidden: bool,

    /// Lowercase extension without the dot.
    pub extension: CompactString,

    /// Coarse type tag.
    #[serde(rename = "type")]
    pub file_type: FileType,

    /// False when the numbers are a partial, best-effort aggregate.
    pub complete: bool,
}

impl ChildRecord {
    /// Create a record for a non-directory entry.
    pub fn file(
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        size: u64,
        modified: SystemTime,
        class: Classification,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            file_count: 0,
            folder_count: 0,
            last_modified: DateTime::<Utc>::from(modified),
            is_hidden: class.is_hidden,
            extension: class.extension,
            file_type: class.file_type,
            complete: true,
        }
    }

    /// Create a record for a directory, folding in its subtree aggregate.
    pub fn directory(
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        modified: SystemTime,
        class: Classification,
        aggregate: &AggregateResult,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size: aggregate.size,
            file_count: aggregate.file_count,
            folder_count: aggregate.folder_count,
            last_modified: DateTime::<Utc>::from(modified),
            is_hidden: class.is_hidden,
            extension: CompactString::default(),
            file_type: FileType::Folder,
            complete: aggregate.complete,
        }
    }

    /// Check if this record is a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type.is_folder()
    }
}
