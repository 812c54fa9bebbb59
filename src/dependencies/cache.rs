//! Single-flight cache of package tables.
//!
//! Every file in a directory needs the same table, and a directory's files are
//! fixed concurrently. Concurrent requests for one key share a single loader
//! call; successful tables are kept for the life of the cache, failures are
//! handed to the callers already waiting and then forgotten.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use super::loader::{GoListLoader, PackageLoader};
use super::PackageImports;
use crate::error::{ReviserError, Result};

type Key = (PathBuf, String);
type Shared = std::result::Result<Arc<PackageImports>, String>;

/// One in-progress load that followers block on.
struct Flight {
    outcome: Mutex<Option<Shared>>,
    done: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, outcome: Shared) {
        *lock(&self.outcome) = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Shared {
        let mut outcome = lock(&self.outcome);
        loop {
            if let Some(shared) = outcome.as_ref() {
                return shared.clone();
            }
            outcome = self
                .done
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DependencyCache {
    loader: Arc<dyn PackageLoader>,
    ready: RwLock<HashMap<Key, Arc<PackageImports>>>,
    inflight: Mutex<HashMap<Key, Arc<Flight>>>,
}

impl DependencyCache {
    pub fn new(loader: Arc<dyn PackageLoader>) -> Self {
        Self {
            loader,
            ready: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Cache backed by `go list`.
    pub fn with_go_list() -> Self {
        Self::new(Arc::new(GoListLoader::new()))
    }

    /// Returns the table for `(dir, build_tags)`, loading it at most once at a
    /// time. Every concurrent caller of one key receives the same `Arc`.
    pub fn load(&self, dir: &Path, build_tags: &str) -> Result<Arc<PackageImports>> {
        let key: Key = (dir.to_path_buf(), build_tags.to_string());
        if let Some(table) = self.cached(&key) {
            return Ok(table);
        }

        let flight = {
            let mut inflight = lock(&self.inflight);
            // The leader publishes to `ready` before retiring its flight.
            if let Some(table) = self.cached(&key) {
                return Ok(table);
            }
            match inflight.get(&key) {
                Some(flight) => Some(Arc::clone(flight)),
                None => {
                    inflight.insert(key.clone(), Arc::new(Flight::new()));
                    None
                }
            }
        };

        match flight {
            Some(flight) => flight.wait().map_err(|message| ReviserError::DependencyLoad {
                dir: dir.display().to_string(),
                message,
            }),
            None => self.lead(key, dir, build_tags),
        }
    }

    fn lead(&self, key: Key, dir: &Path, build_tags: &str) -> Result<Arc<PackageImports>> {
        let mut guard = FlightGuard {
            cache: self,
            key,
            finished: false,
        };

        debug!(dir = %dir.display(), tags = build_tags, "loading package names");
        let result = self.loader.load(dir, build_tags).map(Arc::new);

        let shared = match &result {
            Ok(table) => {
                self.ready
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(guard.key.clone(), Arc::clone(table));
                Ok(Arc::clone(table))
            }
            Err(ReviserError::DependencyLoad { message, .. }) => Err(message.clone()),
            Err(e) => Err(e.to_string()),
        };
        guard.finish(shared);

        result
    }

    fn cached(&self, key: &Key) -> Option<Arc<PackageImports>> {
        self.ready
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Forgets every cached table; flights in progress are unaffected.
    pub fn clear(&self) {
        self.ready
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.ready.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DependencyCache {
    fn default() -> Self {
        Self::with_go_list()
    }
}

/// Retires the leader's flight even if the loader panics, so followers never
/// wait forever.
struct FlightGuard<'a> {
    cache: &'a DependencyCache,
    key: Key,
    finished: bool,
}

impl FlightGuard<'_> {
    fn finish(&mut self, outcome: Shared) {
        self.finished = true;
        if let Some(flight) = lock(&self.cache.inflight).remove(&self.key) {
            flight.complete(outcome);
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Err("package loader panicked".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    struct CountingLoader {
        calls: AtomicUsize,
        fail_first: usize,
        delay: Duration,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: 0,
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PackageLoader for CountingLoader {
        fn load(&self, dir: &Path, build_tags: &str) -> Result<PackageImports> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if call < self.fail_first {
                return Err(ReviserError::DependencyLoad {
                    dir: dir.display().to_string(),
                    message: "package has errors".to_string(),
                });
            }
            Ok(PackageImports::from_iter([(
                format!("example.com/{}", build_tags),
                "pkg".to_string(),
            )]))
        }
    }

    #[test]
    fn test_concurrent_callers_share_one_load() {
        let loader = Arc::new(CountingLoader {
            delay: Duration::from_millis(50),
            ..CountingLoader::new()
        });
        let cache = DependencyCache::new(loader.clone());
        let barrier = Barrier::new(8);

        let tables: Vec<Arc<PackageImports>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.load(Path::new("/src/app"), "").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loader.calls(), 1);
        assert!(tables.iter().all(|t| Arc::ptr_eq(t, &tables[0])));
    }

    #[test]
    fn test_keys_differ_by_build_tags() {
        let loader = Arc::new(CountingLoader::new());
        let cache = DependencyCache::new(loader.clone());

        let plain = cache.load(Path::new("/src/app"), "").unwrap();
        let tagged = cache.load(Path::new("/src/app"), "integration").unwrap();
        assert!(!Arc::ptr_eq(&plain, &tagged));
        assert_eq!(loader.calls(), 2);

        cache.load(Path::new("/src/app"), "integration").unwrap();
        assert_eq!(loader.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let loader = Arc::new(CountingLoader {
            fail_first: 1,
            ..CountingLoader::new()
        });
        let cache = DependencyCache::new(loader.clone());

        let err = cache.load(Path::new("/src/app"), "").unwrap_err();
        assert!(matches!(err, ReviserError::DependencyLoad { .. }));
        assert!(cache.is_empty());

        assert!(cache.load(Path::new("/src/app"), "").is_ok());
        assert_eq!(loader.calls(), 2);
    }

    #[test]
    fn test_failure_is_shared_with_waiters() {
        let loader = Arc::new(CountingLoader {
            fail_first: 1,
            delay: Duration::from_millis(100),
            ..CountingLoader::new()
        });
        let cache = DependencyCache::new(loader.clone());

        let results: Vec<bool> = thread::scope(|s| {
            let leader = s.spawn(|| cache.load(Path::new("/src/app"), "").is_err());
            thread::sleep(Duration::from_millis(20));
            let follower = s.spawn(|| cache.load(Path::new("/src/app"), "").is_err());
            vec![leader.join().unwrap(), follower.join().unwrap()]
        });

        assert_eq!(results, vec![true, true]);
        assert_eq!(loader.calls(), 1);
    }

    #[test]
    fn test_clear_forces_reload() {
        let loader = Arc::new(CountingLoader::new());
        let cache = DependencyCache::new(loader.clone());

        let first = cache.load(Path::new("/src/app"), "").unwrap();
        cache.clear();
        let second = cache.load(Path::new("/src/app"), "").unwrap();

        assert_eq!(loader.calls(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }
}
