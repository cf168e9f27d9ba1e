//! Read-through tile cache.
//!
//! ## Thread Safety
//!
//! The `TileCache` supports concurrent access from multiple threads:
//! - Different tiles can be fetched in parallel
//! - Multiple threads requesting the same missing tile coordinate, with only
//!   one performing the fetch while the others wait for its result
//! - Cached tiles are served immediately without touching the source
//!
//! By default the cache is unbounded: a run touches a small geographic extent
//! and tiles live until the cache is dropped. A capacity turns on
//! least-recently-used eviction.

use crate::coord::TileCoord;
use crate::source::TileSource;
use crate::tile::RasterTile;
use crate::{Result, TerrainError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::{debug, trace};

/// A failed fetch as seen by threads that waited on it.
///
/// Keeps the error variant so waiters report the same kind of failure as
/// the thread that fetched.
#[derive(Debug, Clone)]
enum FetchFailure {
    Fetch(String),
    Decode(String),
    Size { width: u32, height: u32, expected: u32 },
}

impl FetchFailure {
    fn from_error(error: &TerrainError) -> Self {
        match error {
            TerrainError::TileFetch { reason, .. } => FetchFailure::Fetch(reason.clone()),
            TerrainError::TileDecode { reason, .. } => FetchFailure::Decode(reason.clone()),
            TerrainError::TileSize {
                width,
                height,
                expected,
            } => FetchFailure::Size {
                width: *width,
                height: *height,
                expected: *expected,
            },
            other => FetchFailure::Fetch(other.to_string()),
        }
    }

    fn into_error(self, coord: &TileCoord) -> TerrainError {
        match self {
            FetchFailure::Fetch(reason) => TerrainError::TileFetch {
                zoom: coord.zoom,
                x: coord.x,
                y: coord.y,
                reason,
            },
            FetchFailure::Decode(reason) => TerrainError::TileDecode {
                zoom: coord.zoom,
                x: coord.x,
                y: coord.y,
                reason,
            },
            FetchFailure::Size {
                width,
                height,
                expected,
            } => TerrainError::TileSize {
                width,
                height,
                expected,
            },
        }
    }
}

/// Outcome of a fetch shared with every thread that waited on it.
type SharedOutcome = std::result::Result<Arc<RasterTile>, FetchFailure>;

/// A fetch in progress. Waiters block on `done` until `outcome` is set.
#[derive(Default)]
struct InFlight {
    outcome: Mutex<Option<SharedOutcome>>,
    done: Condvar,
}

impl InFlight {
    fn wait(&self) -> Result<SharedOutcome> {
        let mut outcome = self
            .outcome
            .lock()
            .map_err(|_| TerrainError::CacheLockPoisoned)?;
        loop {
            if let Some(result) = outcome.as_ref() {
                return Ok(result.clone());
            }
            outcome = self
                .done
                .wait(outcome)
                .map_err(|_| TerrainError::CacheLockPoisoned)?;
        }
    }

    fn complete(&self, result: SharedOutcome) {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        *outcome = Some(result);
        self.done.notify_all();
    }
}

/// Held by the fetching thread. Releases waiters and frees the key when
/// dropped, including on early return or panic.
struct FetchGuard<'a> {
    in_flight: &'a Mutex<HashMap<TileCoord, Arc<InFlight>>>,
    coord: TileCoord,
    slot: Arc<InFlight>,
    outcome: Option<SharedOutcome>,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Err(FetchFailure::Fetch("tile fetch was abandoned".to_string())));
        self.slot.complete(outcome);
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.coord);
    }
}

/// Stored tiles plus the access order used for eviction.
struct TileStore {
    tiles: HashMap<TileCoord, Arc<RasterTile>>,
    /// Access order, most recently used at the back. Only kept when bounded.
    access_order: VecDeque<TileCoord>,
    capacity: Option<usize>,
}

impl TileStore {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            tiles: HashMap::new(),
            access_order: VecDeque::new(),
            capacity,
        }
    }

    fn touch(&mut self, coord: &TileCoord) {
        if self.capacity.is_none() {
            return;
        }
        if let Some(pos) = self.access_order.iter().position(|k| k == coord) {
            self.access_order.remove(pos);
        }
        self.access_order.push_back(*coord);
    }

    fn get(&mut self, coord: &TileCoord) -> Option<Arc<RasterTile>> {
        let tile = self.tiles.get(coord).cloned()?;
        self.touch(coord);
        Some(tile)
    }

    fn insert(&mut self, coord: TileCoord, tile: Arc<RasterTile>) {
        if let Some(capacity) = self.capacity {
            while !self.tiles.contains_key(&coord) && self.tiles.len() >= capacity.max(1) {
                match self.access_order.pop_front() {
                    Some(oldest) => {
                        trace!(tile = %oldest, "evicting tile");
                        self.tiles.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        self.tiles.insert(coord, tile);
        self.touch(&coord);
    }
}

/// Cache statistics for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from memory, including waits on another thread's fetch.
    pub hits: u64,
    /// Requests that went to the tile source.
    pub misses: u64,
    /// Source fetches that failed.
    pub fetch_failures: u64,
    /// Tiles currently held.
    pub tiles_cached: usize,
}

/// Read-through cache in front of a [`TileSource`].
pub struct TileCache<S> {
    source: S,
    store: Mutex<TileStore>,
    in_flight: Mutex<HashMap<TileCoord, Arc<InFlight>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    fetch_failures: AtomicU64,
}

impl<S> std::fmt::Debug for TileCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<S: TileSource> TileCache<S> {
    /// Unbounded cache.
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, None)
    }

    /// Cache holding at most `capacity` tiles, or unbounded for `None`.
    pub fn with_capacity(source: S, capacity: Option<usize>) -> Self {
        Self {
            source,
            store: Mutex::new(TileStore::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        }
    }

    /// The underlying tile source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get a tile, fetching it from the source on a miss.
    ///
    /// If another thread is already fetching the same tile this call waits
    /// for that fetch and returns its tile (or its failure) instead of
    /// fetching again. Failures are not cached: a later call retries.
    pub fn get_tile(&self, coord: &TileCoord) -> Result<Arc<RasterTile>> {
        // Fast path: already stored
        if let Some(tile) = self.lookup(coord)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(tile = %coord, "tile cache hit");
            return Ok(tile);
        }

        let (slot, owner) = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| TerrainError::CacheLockPoisoned)?;
            match in_flight.get(coord) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    // Check again: the fetch may have finished while we were unlocked
                    if let Some(tile) = self.lookup(coord)? {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(tile);
                    }
                    let slot = Arc::new(InFlight::default());
                    in_flight.insert(*coord, Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !owner {
            trace!(tile = %coord, "waiting for in-flight tile fetch");
            self.hits.fetch_add(1, Ordering::Relaxed);
            return slot.wait()?.map_err(|failure| failure.into_error(coord));
        }

        // We are responsible for fetching this tile
        let mut guard = FetchGuard {
            in_flight: &self.in_flight,
            coord: *coord,
            slot,
            outcome: None,
        };
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(tile = %coord, "tile cache miss");
        let result = self.source.fetch(coord).map(Arc::new);

        guard.outcome = Some(match &result {
            Ok(tile) => Ok(Arc::clone(tile)),
            Err(e) => Err(FetchFailure::from_error(e)),
        });

        if let Ok(tile) = &result {
            self.store
                .lock()
                .map_err(|_| TerrainError::CacheLockPoisoned)?
                .insert(*coord, Arc::clone(tile));
        } else {
            self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        }

        result
    }

    /// Whether a tile is currently stored.
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.store
            .lock()
            .map(|store| store.tiles.contains_key(coord))
            .unwrap_or(false)
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            tiles_cached: self.store.lock().map(|s| s.tiles.len()).unwrap_or(0),
        }
    }

    fn lookup(&self, coord: &TileCoord) -> Result<Option<Arc<RasterTile>>> {
        Ok(self
            .store
            .lock()
            .map_err(|_| TerrainError::CacheLockPoisoned)?
            .get(coord))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticTileSource;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_second_request_is_a_hit() {
        let cache = TileCache::new(StaticTileSource::everywhere(RasterTile::uniform(10.0)));
        let coord = TileCoord::new(15, 100, 200);

        let first = cache.get_tile(&coord).unwrap();
        let second = cache.get_tile(&coord).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.source().fetch_count(), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                fetch_failures: 0,
                tiles_cached: 1
            }
        );
    }

    #[test]
    fn test_returns_tile_for_requested_key() {
        let a = TileCoord::new(4, 1, 1);
        let b = TileCoord::new(4, 2, 1);
        let source = StaticTileSource::new()
            .with_tile(a, RasterTile::uniform(1.0))
            .with_tile(b, RasterTile::uniform(2.0));
        let cache = TileCache::new(source);

        assert_eq!(cache.get_tile(&a).unwrap().elevation(0, 0), 1.0);
        assert_eq!(cache.get_tile(&b).unwrap().elevation(0, 0), 2.0);
        assert_eq!(cache.get_tile(&a).unwrap().elevation(0, 0), 1.0);
    }

    #[test]
    fn test_failures_propagate_and_are_not_cached() {
        let cache = TileCache::new(StaticTileSource::new());
        let coord = TileCoord::new(4, 3, 3);

        assert!(matches!(
            cache.get_tile(&coord),
            Err(TerrainError::TileFetch { .. })
        ));
        assert!(cache.get_tile(&coord).is_err());
        assert_eq!(cache.source().fetch_count(), 2);
        assert_eq!(cache.stats().fetch_failures, 2);
        assert!(!cache.contains(&coord));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = TileCache::with_capacity(
            StaticTileSource::everywhere(RasterTile::uniform(0.0)),
            Some(2),
        );
        let a = TileCoord::new(5, 0, 0);
        let b = TileCoord::new(5, 1, 0);
        let c = TileCoord::new(5, 2, 0);

        cache.get_tile(&a).unwrap();
        cache.get_tile(&b).unwrap();
        cache.get_tile(&a).unwrap(); // a is now most recent
        cache.get_tile(&c).unwrap(); // evicts b

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
        assert_eq!(cache.stats().tiles_cached, 2);
    }

    /// Source that sleeps so concurrent callers overlap.
    struct SlowSource {
        calls: AtomicUsize,
    }

    impl TileSource for SlowSource {
        fn fetch(&self, _coord: &TileCoord) -> Result<RasterTile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Ok(RasterTile::uniform(7.0))
        }
    }

    #[test]
    fn test_concurrent_requests_fetch_once() {
        let cache = Arc::new(TileCache::new(SlowSource {
            calls: AtomicUsize::new(0),
        }));
        let coord = TileCoord::new(15, 42, 42);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get_tile(&coord).map(|t| t.elevation(0, 0)))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 7.0);
        }
        assert_eq!(cache.source().calls.load(Ordering::SeqCst), 1);
    }

    /// Source that sleeps, then fails to decode its body.
    struct SlowFailingSource;

    impl TileSource for SlowFailingSource {
        fn fetch(&self, coord: &TileCoord) -> Result<RasterTile> {
            thread::sleep(Duration::from_millis(50));
            RasterTile::from_image_bytes(coord, b"<html>oops</html>")
        }
    }

    #[test]
    fn test_concurrent_waiters_see_decode_failure() {
        let cache = Arc::new(TileCache::new(SlowFailingSource));
        let coord = TileCoord::new(15, 1, 1);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get_tile(&coord).map(|_| ()))
            })
            .collect();

        for handle in handles {
            match handle.join().unwrap() {
                Err(TerrainError::TileDecode { zoom, x, y, reason }) => {
                    assert_eq!((zoom, x, y), (15, 1, 1));
                    assert!(!reason.contains("Failed to"), "reason nested: {}", reason);
                }
                other => panic!("expected TileDecode, got {:?}", other),
            }
        }
        assert!(cache.stats().fetch_failures >= 1);
    }

    /// Panics on the first fetch, then serves a flat tile.
    struct PanicOnceSource {
        calls: AtomicUsize,
    }

    impl TileSource for PanicOnceSource {
        fn fetch(&self, _coord: &TileCoord) -> Result<RasterTile> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("source blew up");
            }
            Ok(RasterTile::uniform(5.0))
        }
    }

    #[test]
    fn test_panicking_fetch_frees_the_key() {
        let cache = Arc::new(TileCache::new(PanicOnceSource {
            calls: AtomicUsize::new(0),
        }));
        let coord = TileCoord::new(9, 3, 4);

        let panicked = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get_tile(&coord).map(|_| ())).join()
        };
        assert!(panicked.is_err());
        assert!(cache.in_flight.lock().unwrap().is_empty());

        // The next request fetches again instead of waiting forever
        assert_eq!(cache.get_tile(&coord).unwrap().elevation(0, 0), 5.0);
    }
}
