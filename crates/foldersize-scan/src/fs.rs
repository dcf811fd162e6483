//! Filesystem access layer.
//!
//! Everything the scanner learns about the disk goes through the
//! [`Filesystem`] trait, so tests can run the same code against an in-memory
//! tree with injected failures.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use foldersize_core::InodeInfo;

/// Kind of a filesystem entry, as seen without following links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Sockets, devices, fifos.
    Other,
}

/// Metadata the scanner needs about one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub kind: EntryKind,
    /// Length in bytes.
    pub len: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Device and inode, when the platform has them.
    pub identity: Option<InodeInfo>,
}

impl EntryMeta {
    /// Convert standard library metadata.
    pub fn from_std(metadata: &std::fs::Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        Self {
            kind,
            len: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            identity: get_identity(metadata),
        }
    }

    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    /// Base name.
    pub name: OsString,
    /// Full path (listed directory joined with the name).
    pub path: PathBuf,
}

/// Read-only filesystem capability.
pub trait Filesystem: Send + Sync + fmt::Debug {
    /// List the immediate entries of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<FsEntry>>;

    /// Metadata of the entry itself, not following a final symlink.
    fn symlink_metadata(&self, path: &Path) -> io::Result<EntryMeta>;

    /// Metadata following symlinks.
    fn metadata(&self, path: &Path) -> io::Result<EntryMeta>;

    /// Target of a symlink, exactly as stored.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Directory relative paths are anchored at.
    fn current_dir(&self) -> io::Result<PathBuf>;
}

/// [`Filesystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<FsEntry>> {
        std::fs::read_dir(path)?
            .map(|entry| {
                entry.map(|e| FsEntry {
                    name: e.file_name(),
                    path: e.path(),
                })
            })
            .collect()
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<EntryMeta> {
        std::fs::symlink_metadata(path).map(|m| EntryMeta::from_std(&m))
    }

    fn metadata(&self, path: &Path) -> io::Result<EntryMeta> {
        std::fs::metadata(path).map(|m| EntryMeta::from_std(&m))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }
}

/// Cheap observation of a directory used to validate cached aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirStamp {
    /// The directory's own modification time.
    pub modified: SystemTime,
    /// Number of immediate children.
    pub child_count: usize,
}

impl DirStamp {
    /// Observe a directory's current stamp.
    pub fn observe(fs: &dyn Filesystem, path: &Path) -> io::Result<Self> {
        let meta = fs.metadata(path)?;
        let child_count = fs.read_dir(path)?.len();
        Ok(Self {
            modified: meta.modified,
            child_count,
        })
    }
}

// Cross-platform metadata helpers

/// Get the device and inode pair from metadata.
#[cfg(unix)]
fn get_identity(metadata: &std::fs::Metadata) -> Option<InodeInfo> {
    Some(InodeInfo::new(metadata.ino(), metadata.dev()))
}

#[cfg(not(unix))]
fn get_identity(_metadata: &std::fs::Metadata) -> Option<InodeInfo> {
    None // No stable inode through std on this platform
}
