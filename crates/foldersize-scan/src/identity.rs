//! Directory identity tracking for cycle detection.

use std::collections::HashSet;
use std::path::Path;

use foldersize_core::InodeInfo;

use crate::fs::Filesystem;

/// Identities of the directories on the current walk path.
///
/// A walk enters a directory's (device, inode) pair before descending and
/// leaves it once the directory is finished, so the set always holds the
/// ancestor chain of whatever is being listed. Meeting one of those
/// identities again means the tree loops back on itself.
///
/// Entries without an identity cannot be tracked and are never reported as
/// cycles.
#[derive(Debug, Default)]
pub struct VisitedSet {
    chain: HashSet<InodeInfo>,
}

impl VisitedSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            chain: HashSet::new(),
        }
    }

    /// Seed a set with `root` and every ancestor of it.
    ///
    /// A symlink inside the walk pointing above the walk root is then still
    /// caught, and the result does not depend on where the walk was started
    /// from.
    pub fn for_walk_root(fs: &dyn Filesystem, root: &Path) -> Self {
        let mut set = Self::new();
        for dir in root.ancestors() {
            if let Ok(meta) = fs.metadata(dir) {
                set.enter(meta.identity);
            }
        }
        set
    }

    /// Enter a directory. Returns `true` if it was not on the chain yet.
    pub fn enter(&mut self, identity: Option<InodeInfo>) -> bool {
        match identity {
            Some(info) => self.chain.insert(info),
            None => true,
        }
    }

    /// Leave a directory previously entered.
    pub fn leave(&mut self, identity: Option<InodeInfo>) {
        if let Some(info) = identity {
            self.chain.remove(&info);
        }
    }

    /// Check if an identity is on the chain.
    pub fn contains(&self, identity: Option<InodeInfo>) -> bool {
        identity.is_some_and(|info| self.chain.contains(&info))
    }

    /// Get the number of identities on the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}
