//! Input path resolution.

use std::path::{Component, Path, PathBuf};

use foldersize_core::ScanError;
use tracing::trace;

use crate::fs::{EntryKind, EntryMeta, Filesystem, FsEntry};

/// A validated scan target.
#[derive(Debug, Clone)]
pub enum ResolvedPath {
    /// A listable directory, with its listing.
    Directory {
        path: PathBuf,
        meta: EntryMeta,
        entries: Vec<FsEntry>,
    },
    /// Anything that is not a directory.
    File { path: PathBuf, meta: EntryMeta },
}

impl ResolvedPath {
    /// Normalized absolute path of the target.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedPath::Directory { path, .. } | ResolvedPath::File { path, .. } => path,
        }
    }

    /// Check if the target is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, ResolvedPath::Directory { .. })
    }
}

/// Validate and classify a scan target.
///
/// Relative paths are anchored at the filesystem's current directory and
/// every path is normalized lexically. If the target itself is a symlink,
/// exactly one level is resolved: a link pointing at another link is treated
/// as a non-directory. Nothing below the target is ever followed.
pub fn resolve(fs: &dyn Filesystem, path: &Path) -> Result<ResolvedPath, ScanError> {
    if path.as_os_str().is_empty() {
        return Err(ScanError::InvalidPath {
            path: path.to_path_buf(),
        });
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = fs.current_dir().map_err(|e| ScanError::io(path, e))?;
        cwd.join(path)
    };
    let mut path = normalize(&absolute);

    let mut meta = fs.symlink_metadata(&path).map_err(|e| ScanError::io(&path, e))?;
    if meta.kind == EntryKind::Symlink {
        let target = fs.read_link(&path).map_err(|e| ScanError::io(&path, e))?;
        let target = match path.parent() {
            Some(parent) if target.is_relative() => parent.join(target),
            _ => target,
        };
        trace!(link = %path.display(), target = %target.display(), "resolved top-level symlink");
        path = normalize(&target);
        meta = fs
            .symlink_metadata(&path)
            .map_err(|e| ScanError::io(&path, e))?;
    }

    if !meta.is_dir() {
        return Ok(ResolvedPath::File { path, meta });
    }

    match fs.read_dir(&path) {
        Ok(entries) => Ok(ResolvedPath::Directory {
            path,
            meta,
            entries,
        }),
        Err(source) => Err(ScanError::io(path, source)),
    }
}

/// Lexically clean a path: drop `.`, apply `..`, unify separators.
///
/// `..` never climbs above the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(name) => out.push(name),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
