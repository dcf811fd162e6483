//! In-memory [`Filesystem`] for unit tests.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use foldersize_core::InodeInfo;
use tokio_util::sync::CancellationToken;

use crate::fs::{EntryKind, EntryMeta, Filesystem, FsEntry};

const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
enum NodeData {
    File { len: u64 },
    Dir,
    Symlink { target: PathBuf },
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    modified: SystemTime,
    inode: u64,
    deny_list: bool,
    deny_stat: bool,
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    next_inode: u64,
    clock: u64,
    cwd: PathBuf,
    read_dir_delay: Duration,
    cancel_on_list: Option<(PathBuf, CancellationToken)>,
}

impl State {
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + self.clock)
    }

    fn insert(&mut self, path: &Path, data: NodeData) {
        if let Some(parent) = path.parent() {
            if !self.nodes.contains_key(parent) {
                self.insert(parent, NodeData::Dir);
            }
        }
        let modified = self.tick();
        self.next_inode += 1;
        let node = Node {
            data,
            modified,
            inode: self.next_inode,
            deny_list: false,
            deny_stat: false,
        };
        self.nodes.insert(path.to_path_buf(), node);
        self.bump_parent(path);
    }

    fn bump_parent(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            let modified = self.tick();
            if let Some(node) = self.nodes.get_mut(parent) {
                node.modified = modified;
            }
        }
    }

    fn lookup(&self, path: &Path) -> io::Result<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such entry"))
    }

    fn follow(&self, path: &Path) -> io::Result<(PathBuf, &Node)> {
        let mut current = path.to_path_buf();
        for _ in 0..MAX_LINK_HOPS {
            let node = self.lookup(&current)?;
            match &node.data {
                NodeData::Symlink { target } => {
                    current = match current.parent() {
                        Some(parent) if target.is_relative() => parent.join(target),
                        _ => target.clone(),
                    };
                }
                _ => return Ok((current, node)),
            }
        }
        Err(io::Error::other("too many levels of symbolic links"))
    }
}

fn to_meta(node: &Node) -> io::Result<EntryMeta> {
    if node.deny_stat {
        return Err(io::Error::new(io::ErrorKind::PermissionDenied, "stat denied"));
    }
    let (kind, len) = match &node.data {
        NodeData::File { len } => (EntryKind::File, *len),
        NodeData::Dir => (EntryKind::Directory, 4096),
        NodeData::Symlink { target } => (EntryKind::Symlink, target.as_os_str().len() as u64),
    };
    Ok(EntryMeta {
        kind,
        len,
        modified: node.modified,
        identity: Some(InodeInfo::new(node.inode, 1)),
    })
}

/// Mutable in-memory tree. Every mutation bumps the parent's mtime, the way
/// a real directory does.
#[derive(Debug)]
pub(crate) struct MemoryFilesystem {
    state: Mutex<State>,
    read_dir_calls: AtomicUsize,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        let fs = Self {
            state: Mutex::new(State {
                nodes: BTreeMap::new(),
                next_inode: 0,
                clock: 0,
                cwd: PathBuf::from("/"),
                read_dir_delay: Duration::ZERO,
                cancel_on_list: None,
            }),
            read_dir_calls: AtomicUsize::new(0),
        };
        fs.add_dir("/");
        fs
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.with_state(|s| s.insert(path.as_ref(), NodeData::Dir));
    }

    pub fn add_file(&self, path: impl AsRef<Path>, len: u64) {
        self.with_state(|s| s.insert(path.as_ref(), NodeData::File { len }));
    }

    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) {
        let target = target.into();
        self.with_state(|s| s.insert(path.as_ref(), NodeData::Symlink { target }));
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.with_state(|s| {
            s.nodes.retain(|p, _| !p.starts_with(path));
            s.bump_parent(path);
        });
    }

    /// Make listing `path` fail with permission denied.
    pub fn deny_list(&self, path: impl AsRef<Path>) {
        self.with_state(|s| {
            if let Some(node) = s.nodes.get_mut(path.as_ref()) {
                node.deny_list = true;
            }
        });
    }

    /// Make stat-ing `path` fail with permission denied.
    pub fn deny_stat(&self, path: impl AsRef<Path>) {
        self.with_state(|s| {
            if let Some(node) = s.nodes.get_mut(path.as_ref()) {
                node.deny_stat = true;
            }
        });
    }

    /// Bump the mtime of `path` without changing its contents.
    pub fn touch(&self, path: impl AsRef<Path>) {
        self.with_state(|s| {
            let modified = s.tick();
            if let Some(node) = s.nodes.get_mut(path.as_ref()) {
                node.modified = modified;
            }
        });
    }

    pub fn set_current_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.with_state(|s| s.cwd = path);
    }

    pub fn set_read_dir_delay(&self, delay: Duration) {
        self.with_state(|s| s.read_dir_delay = delay);
    }

    /// Cancel `token` whenever `path` is listed.
    pub fn cancel_on_list(&self, path: impl Into<PathBuf>, token: CancellationToken) {
        let path = path.into();
        self.with_state(|s| s.cancel_on_list = Some((path, token)));
    }

    pub fn read_dir_calls(&self) -> usize {
        self.read_dir_calls.load(Ordering::SeqCst)
    }
}

impl Filesystem for MemoryFilesystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<FsEntry>> {
        self.read_dir_calls.fetch_add(1, Ordering::SeqCst);
        let (entries, delay) = self.with_state(|s| {
            let (dir, node) = s.follow(path)?;
            if node.deny_list {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "list denied"));
            }
            if !matches!(node.data, NodeData::Dir) {
                return Err(io::Error::other("not a directory"));
            }
            let entries: Vec<FsEntry> = s
                .nodes
                .keys()
                .filter(|p| p.parent() == Some(dir.as_path()))
                .filter_map(|p| {
                    p.file_name().map(|name| FsEntry {
                        name: name.to_os_string(),
                        path: path.join(name),
                    })
                })
                .collect();
            if let Some((trigger, token)) = &s.cancel_on_list {
                if trigger == path {
                    token.cancel();
                }
            }
            Ok((entries, s.read_dir_delay))
        })?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(entries)
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<EntryMeta> {
        self.with_state(|s| s.lookup(path).and_then(to_meta))
    }

    fn metadata(&self, path: &Path) -> io::Result<EntryMeta> {
        self.with_state(|s| s.follow(path).and_then(|(_, node)| to_meta(node)))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.with_state(|s| match &s.lookup(path)?.data {
            NodeData::Symlink { target } => Ok(target.clone()),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a symlink")),
        })
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        Ok(self.with_state(|s| s.cwd.clone()))
    }
}
