//! Aggregation cache keyed by directory path.
//!
//! An entry stays valid while the directory's own modification time and
//! immediate child count match what was observed when it was computed.
//! Edits deep inside a subtree that do not touch any cached directory's own
//! metadata go unnoticed until the directory changes or is invalidated.
//!
//! Each path maps to a slot holding a once-initialised cell. The map shard is
//! locked only to look up or swap the slot; the walk runs inside the cell's
//! initializer, so concurrent callers for the same path wait for the one
//! walk in flight instead of starting their own.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use foldersize_core::{AggregateError, AggregateResult, CacheConfig};

use crate::aggregator::{SubtreeAggregator, WalkHooks};
use crate::fs::{DirStamp, Filesystem};
use crate::identity::VisitedSet;

type CachedAggregate = Result<AggregateResult, AggregateError>;

/// Counters describing cache behaviour since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered by a valid slot (finished or in flight).
    pub hits: u64,
    /// Lookups for paths with no slot at all.
    pub misses: u64,
    /// Slots replaced because the directory changed or the walk was cancelled.
    pub invalidations: u64,
    /// Subtree walks started by the cache.
    pub walks: u64,
    /// Descendant entries stored as a by-product of a walk.
    pub seeded: u64,
    /// Slots dropped by the capacity bound.
    pub evictions: u64,
    /// Slots currently held.
    pub entries: usize,
}

#[derive(Debug)]
struct Slot {
    stamp: Option<DirStamp>,
    cell: OnceLock<CachedAggregate>,
    last_used: AtomicU64,
}

impl Slot {
    fn pending(stamp: Option<DirStamp>, tick: u64) -> Self {
        Self {
            stamp,
            cell: OnceLock::new(),
            last_used: AtomicU64::new(tick),
        }
    }

    fn ready(stamp: DirStamp, value: CachedAggregate, tick: u64) -> Self {
        Self {
            stamp: Some(stamp),
            cell: OnceLock::from(value),
            last_used: AtomicU64::new(tick),
        }
    }

    /// A slot answers for `stamp` if it was observed under the same stamp and
    /// does not hold a cancelled walk.
    fn is_fresh(&self, stamp: Option<DirStamp>) -> bool {
        stamp.is_some() && self.stamp == stamp && !self.cell.get().is_some_and(is_cancelled)
    }
}

fn is_cancelled(value: &CachedAggregate) -> bool {
    value.as_ref().is_ok_and(AggregateResult::was_cancelled)
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    walks: AtomicU64,
    seeded: AtomicU64,
    evictions: AtomicU64,
}

/// Process-wide memo of subtree aggregates.
///
/// Create one per application and share it behind an [`Arc`]; tests create
/// their own to stay isolated.
#[derive(Debug)]
pub struct AggregationCache {
    fs: Arc<dyn Filesystem>,
    aggregator: SubtreeAggregator,
    config: CacheConfig,
    slots: DashMap<PathBuf, Arc<Slot>>,
    clock: AtomicU64,
    counters: Counters,
}

impl AggregationCache {
    /// Create an unbounded cache over a filesystem.
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self::with_config(fs, CacheConfig::default())
    }

    /// Create a cache with explicit configuration.
    pub fn with_config(fs: Arc<dyn Filesystem>, config: CacheConfig) -> Self {
        Self {
            aggregator: SubtreeAggregator::new(fs.clone()),
            fs,
            config,
            slots: DashMap::new(),
            clock: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Filesystem this cache observes.
    pub fn filesystem(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }

    /// Get the aggregate for `dir`, walking only if nothing valid is cached.
    ///
    /// If another caller's walk for the same path is in flight, this waits for
    /// it. A result cancelled by someone else's token is never returned to a
    /// caller whose own token is still live; the walk is redone instead.
    pub fn get_or_compute(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult, AggregateError> {
        loop {
            let stamp = DirStamp::observe(self.fs.as_ref(), dir).ok();
            let slot = self.slot_for(dir, stamp);

            let value = slot
                .cell
                .get_or_init(|| {
                    self.counters.walks.fetch_add(1, Ordering::Relaxed);
                    self.walk(dir, cancel)
                })
                .clone();

            if is_cancelled(&value) && !cancel.is_cancelled() {
                trace!(path = %dir.display(), "joined a cancelled walk, retrying");
                continue;
            }

            slot.last_used.store(self.tick(), Ordering::Relaxed);
            self.enforce_capacity();
            return value;
        }
    }

    /// Peek at a finished entry without validating it against the disk.
    pub fn peek(&self, dir: &Path) -> Option<CachedAggregate> {
        self.slots
            .get(dir)
            .and_then(|slot| slot.cell.get().cloned())
    }

    /// Drop the entry for `dir`. Returns `true` if there was one.
    pub fn invalidate(&self, dir: &Path) -> bool {
        self.slots.remove(dir).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Get the number of cached directories.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of subtree walks the cache has started.
    pub fn walk_count(&self) -> u64 {
        self.counters.walks.load(Ordering::Relaxed)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            walks: self.counters.walks.load(Ordering::Relaxed),
            seeded: self.counters.seeded.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.slots.len(),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up or replace the slot for `dir`. The shard lock is held only here.
    fn slot_for(&self, dir: &Path, stamp: Option<DirStamp>) -> Arc<Slot> {
        match self.slots.entry(dir.to_path_buf()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_fresh(stamp) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return occupied.get().clone();
                }
                debug!(path = %dir.display(), "cached aggregate is stale");
                self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
                let slot = Arc::new(Slot::pending(stamp, self.tick()));
                occupied.insert(slot.clone());
                slot
            }
            Entry::Vacant(vacant) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                let slot = Arc::new(Slot::pending(stamp, self.tick()));
                vacant.insert(slot.clone());
                slot
            }
        }
    }

    fn walk(&self, dir: &Path, cancel: &CancellationToken) -> CachedAggregate {
        let mut visited = VisitedSet::for_walk_root(self.fs.as_ref(), dir);
        self.aggregator
            .aggregate_with_hooks(dir, &mut visited, cancel, &mut CacheHooks { cache: self })
    }

    /// A finished, fresh aggregate for a descendant met during another walk.
    /// Never waits on a walk still in flight.
    fn reuse(&self, dir: &Path, stamp: DirStamp) -> Option<AggregateResult> {
        let slot = self.slots.get(dir).map(|entry| entry.value().clone())?;
        if !slot.is_fresh(Some(stamp)) {
            return None;
        }
        let aggregate = slot.cell.get()?.as_ref().ok()?.clone();
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        slot.last_used.store(self.tick(), Ordering::Relaxed);
        Some(aggregate)
    }

    /// Store a descendant aggregate unless an equally fresh slot exists.
    fn seed(&self, dir: &Path, stamp: DirStamp, aggregate: &AggregateResult) {
        let slot = || Arc::new(Slot::ready(stamp, Ok(aggregate.clone()), self.tick()));
        match self.slots.entry(dir.to_path_buf()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_fresh(Some(stamp)) {
                    return;
                }
                occupied.insert(slot());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot());
            }
        }
        self.counters.seeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Evict least recently used slots beyond the configured capacity.
    fn enforce_capacity(&self) {
        let Some(capacity) = self.config.capacity else {
            return;
        };
        let excess = self.slots.len().saturating_sub(capacity);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(u64, PathBuf)> = self
            .slots
            .iter()
            .map(|entry| (entry.value().last_used.load(Ordering::Relaxed), entry.key().clone()))
            .collect();
        by_age.sort_unstable_by_key(|(last_used, _)| *last_used);

        for (_, path) in by_age.into_iter().take(excess) {
            if self.slots.remove(&path).is_some() {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        debug!(excess, capacity, "evicted cached aggregates");
    }
}

/// Lets a walk reuse cached descendants and seed the ones it finishes.
struct CacheHooks<'a> {
    cache: &'a AggregationCache,
}

impl WalkHooks for CacheHooks<'_> {
    fn reuse(&mut self, dir: &Path, stamp: DirStamp) -> Option<AggregateResult> {
        self.cache.reuse(dir, stamp)
    }

    fn finished(&mut self, dir: &Path, stamp: DirStamp, aggregate: &AggregateResult) {
        if self.cache.config.seed_descendants {
            self.cache.seed(dir, stamp, aggregate);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::time::Duration;

    use super::*;
    use crate::testing::MemoryFilesystem;

    fn cache_over(fs: &Arc<MemoryFilesystem>) -> AggregationCache {
        AggregationCache::new(fs.clone())
    }

    #[test]
    fn test_hit_does_not_rewalk() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/a", 3);
        fs.add_file("/d/sub/b", 4);
        let cache = cache_over(&fs);
        let cancel = CancellationToken::new();

        let first = cache.get_or_compute(Path::new("/d"), &cancel).unwrap();
        let second = cache.get_or_compute(Path::new("/d"), &cancel).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.size, 7);
        assert_eq!(cache.walk_count(), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_new_child_invalidates() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/a", 3);
        let cache = cache_over(&fs);
        let cancel = CancellationToken::new();

        cache.get_or_compute(Path::new("/d"), &cancel).unwrap();
        fs.add_file("/d/b", 5);
        let fresh = cache.get_or_compute(Path::new("/d"), &cancel).unwrap();

        assert_eq!(fresh.size, 8);
        assert_eq!(cache.walk_count(), 2);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_mtime_change_invalidates() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/a", 3);
        let cache = cache_over(&fs);
        let cancel = CancellationToken::new();

        cache.get_or_compute(Path::new("/d"), &cancel).unwrap();
        fs.touch("/d");
        cache.get_or_compute(Path::new("/d"), &cancel).unwrap();

        assert_eq!(cache.walk_count(), 2);
    }

    #[test]
    fn test_deep_edit_is_not_detected() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/x/y/f", 3);
        let cache = AggregationCache::with_config(
            fs.clone(),
            CacheConfig {
                capacity: None,
                seed_descendants: false,
            },
        );
        let cancel = CancellationToken::new();

        cache.get_or_compute(Path::new("/d"), &cancel).unwrap();
        // Adds a file two levels down: only /d/x/y changes, /d does not.
        fs.add_file("/d/x/y/g", 100);
        let stale = cache.get_or_compute(Path::new("/d"), &cancel).unwrap();

        assert_eq!(stale.size, 3);
        assert_eq!(cache.walk_count(), 1);
    }

    #[test]
    fn test_descendants_are_seeded() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/x/y/f", 3);
        fs.add_file("/d/x/g", 4);
        let cache = cache_over(&fs);
        let cancel = CancellationToken::new();

        cache.get_or_compute(Path::new("/d"), &cancel).unwrap();
        assert_eq!(cache.stats().seeded, 2);

        let x = cache.get_or_compute(Path::new("/d/x"), &cancel).unwrap();
        let y = cache.get_or_compute(Path::new("/d/x/y"), &cancel).unwrap();
        assert_eq!(x.size, 7);
        assert_eq!(y.size, 3);
        assert_eq!(cache.walk_count(), 1);
    }

    #[test]
    fn test_cancelled_result_is_cached_then_refreshed() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/a", 3);
        let cache = cache_over(&fs);

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let partial = cache.get_or_compute(Path::new("/d"), &cancelled).unwrap();
        assert!(!partial.complete);
        assert!(cache.peek(Path::new("/d")).is_some());

        let full = cache
            .get_or_compute(Path::new("/d"), &CancellationToken::new())
            .unwrap();
        assert!(full.complete);
        assert_eq!(full.size, 3);
        assert_eq!(cache.walk_count(), 2);
    }

    #[test]
    fn test_overflow_is_returned() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/big/a", u64::MAX);
        fs.add_file("/big/b", 1);
        let cache = cache_over(&fs);

        let result = cache.get_or_compute(Path::new("/big"), &CancellationToken::new());
        assert!(matches!(result, Err(AggregateError::SizeOverflow { .. })));
    }

    #[test]
    fn test_concurrent_callers_share_one_walk() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/a", 1);
        fs.add_file("/d/sub/b", 2);
        fs.set_read_dir_delay(Duration::from_millis(20));
        let cache = cache_over(&fs);
        let barrier = Barrier::new(8);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache
                            .get_or_compute(Path::new("/d"), &CancellationToken::new())
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r.size == 3));
        assert_eq!(cache.walk_count(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/one/f", 1);
        fs.add_file("/two/f", 2);
        fs.add_file("/three/f", 3);
        let cache = AggregationCache::with_config(
            fs.clone(),
            CacheConfig {
                capacity: Some(2),
                seed_descendants: true,
            },
        );
        let cancel = CancellationToken::new();

        cache.get_or_compute(Path::new("/one"), &cancel).unwrap();
        cache.get_or_compute(Path::new("/two"), &cancel).unwrap();
        cache.get_or_compute(Path::new("/one"), &cancel).unwrap();
        cache.get_or_compute(Path::new("/three"), &cancel).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(Path::new("/two")).is_none());
        assert!(cache.peek(Path::new("/one")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_cached_child_is_reused_by_parent_walk() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/x/y/deep/f", 5);
        fs.add_file("/d/a", 1);
        let cache = cache_over(&fs);
        let cancel = CancellationToken::new();

        cache.get_or_compute(Path::new("/d/x"), &cancel).unwrap();
        let before = fs.read_dir_calls();
        let d = cache.get_or_compute(Path::new("/d"), &cancel).unwrap();

        assert_eq!(d.size, 6);
        assert_eq!(d.file_count, 2);
        assert_eq!(d.folder_count, 3);
        // /d is listed for its stamp and for the walk, /d/x once to check its
        // own stamp; nothing below /d/x is listed again.
        assert_eq!(fs.read_dir_calls() - before, 3);
        assert_eq!(cache.walk_count(), 2);
    }

    #[test]
    fn test_cancelled_midway_then_recomputed() {
        let fs = Arc::new(MemoryFilesystem::new());
        for dir in ["s1", "s2", "s3", "s4", "s5"] {
            fs.add_file(format!("/d/{dir}/f"), 10);
        }
        let cache = cache_over(&fs);
        let cancel = CancellationToken::new();
        fs.cancel_on_list("/d/s3", cancel.clone());

        let partial = cache.get_or_compute(Path::new("/d"), &cancel).unwrap();
        assert_eq!(partial.size, 20);
        assert!(partial.was_cancelled());
        assert!(!partial.complete);

        let full = cache
            .get_or_compute(Path::new("/d"), &CancellationToken::new())
            .unwrap();
        assert_eq!(full.size, 50);
        assert_eq!(full.file_count, 5);
        assert!(full.complete);
        assert_eq!(cache.walk_count(), 2);
        // s1 and s2 finished before the cancel and were seeded.
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_removed_child_invalidates() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/a", 3);
        fs.add_file("/d/gone/b", 4);
        let cache = cache_over(&fs);
        let cancel = CancellationToken::new();

        assert_eq!(cache.get_or_compute(Path::new("/d"), &cancel).unwrap().size, 7);
        fs.remove("/d/gone");
        let fresh = cache.get_or_compute(Path::new("/d"), &cancel).unwrap();

        assert_eq!(fresh.size, 3);
        assert_eq!(fresh.folder_count, 0);
        assert_eq!(cache.walk_count(), 2);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let fs = Arc::new(MemoryFilesystem::new());
        fs.add_file("/d/a", 1);
        let cache = cache_over(&fs);
        let cancel = CancellationToken::new();

        cache.get_or_compute(Path::new("/d"), &cancel).unwrap();
        assert!(cache.invalidate(Path::new("/d")));
        assert!(!cache.invalidate(Path::new("/d")));

        cache.get_or_compute(Path::new("/d"), &cancel).unwrap();
        assert_eq!(cache.walk_count(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
