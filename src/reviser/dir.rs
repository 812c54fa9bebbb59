//! Directory processing.
//!
//! Walks a directory for `.go` files and fixes each one. Small jobs run
//! inline on the walking thread; once a job outgrows the sequential threshold
//! the remaining files go to a worker pool, created on demand unless one was
//! injected.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glob::{MatchOptions, Pattern};
use ignore::{DirEntry, WalkBuilder};
use tracing::{debug, warn};

use super::cache::FileCache;
use super::file::{FixOutcome, SourceFile};
use super::pool::WorkerPool;
use crate::config::FixOptions;
use crate::dependencies::DependencyCache;
use crate::error::{ReviserError, Result};

const GO_EXTENSION: &str = "go";
pub(crate) const RECURSIVE_SUFFIX: &str = "/...";
const CURRENT_PATHS: [&str; 2] = [".", "./"];

pub const DEFAULT_SEQUENTIAL_THRESHOLD: usize = 8;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Returns the directory `path` names, with a trailing `/...` removed and
/// `.`, `./` resolved to the working directory.
pub fn is_dir(path: &str) -> Option<PathBuf> {
    let base = match path.strip_suffix(RECURSIVE_SUFFIX) {
        Some("") => ".",
        Some(base) => base,
        None => path,
    };
    let dir = if CURRENT_PATHS.contains(&base) {
        std::env::current_dir().ok()?
    } else {
        PathBuf::from(base)
    };
    dir.is_dir().then_some(dir)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Files `find` reported as not in canonical form, sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnformattedCollection {
    list: Vec<PathBuf>,
}

impl UnformattedCollection {
    pub fn list(&self) -> &[PathBuf] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl fmt::Display for UnformattedCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, path) in self.list.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

pub struct SourceDir {
    project: String,
    dir: PathBuf,
    recursive: bool,
    excludes: Vec<Pattern>,
    worker_pool: Option<Arc<WorkerPool>>,
    sequential_threshold: usize,
    cache_dir: Option<PathBuf>,
    prefer_metadata: bool,
}

impl SourceDir {
    /// `path` may end in `/...` to request recursion; `excludes` is a comma
    /// separated list of globs, relative ones resolved against the directory.
    pub fn new(project: impl Into<String>, path: &str, recursive: bool, excludes: &str) -> Self {
        let (path, recursive) = match path.strip_suffix(RECURSIVE_SUFFIX) {
            Some(base) => (if base.is_empty() { "." } else { base }, true),
            None => (path, recursive),
        };
        let dir = std::path::absolute(path).unwrap_or_else(|_| PathBuf::from(path));

        let excludes = excludes
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .filter_map(|p| {
                let full = if Path::new(p).is_absolute() {
                    PathBuf::from(p)
                } else {
                    dir.join(p)
                };
                match Pattern::new(&full.to_string_lossy()) {
                    Ok(pattern) => Some(pattern),
                    Err(e) => {
                        warn!(pattern = p, error = %e, "ignoring malformed exclude pattern");
                        None
                    }
                }
            })
            .collect();

        Self {
            project: project.into(),
            dir,
            recursive,
            excludes,
            worker_pool: None,
            sequential_threshold: DEFAULT_SEQUENTIAL_THRESHOLD,
            cache_dir: None,
            prefer_metadata: true,
        }
    }

    /// Runs every file through `pool` instead of inline or on a private pool.
    pub fn with_worker_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.worker_pool = Some(pool);
        self
    }

    /// Number of files processed inline before a pool is created. Zero
    /// restores the default.
    pub fn with_sequential_threshold(mut self, threshold: usize) -> Self {
        self.sequential_threshold = if threshold == 0 {
            DEFAULT_SEQUENTIAL_THRESHOLD
        } else {
            threshold
        };
        self
    }

    pub fn with_cache(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    pub fn with_metadata_cache(mut self) -> Self {
        self.prefer_metadata = true;
        self
    }

    pub fn without_metadata_cache(mut self) -> Self {
        self.prefer_metadata = false;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        };
        matches_any(&self.excludes, &path)
    }

    /// Fixes every file in place. Returns whether any file changed.
    pub fn fix(&self, options: &FixOptions, deps: &DependencyCache) -> Result<bool> {
        let changed = AtomicBool::new(false);
        self.run(options, deps, |path, outcome| {
            if outcome.changed {
                std::fs::write(path, &outcome.content)?;
                changed.store(true, Ordering::Relaxed);
            }
            Ok(true)
        })?;
        Ok(changed.into_inner())
    }

    /// Lists the files `fix` would change, without touching them.
    pub fn find(
        &self,
        options: &FixOptions,
        deps: &DependencyCache,
    ) -> Result<Option<UnformattedCollection>> {
        let found = Mutex::new(Vec::new());
        self.run(options, deps, |path, outcome| {
            if outcome.changed {
                lock(&found).push(path.to_path_buf());
                return Ok(false);
            }
            Ok(true)
        })?;

        let mut list = found.into_inner().unwrap_or_else(PoisonError::into_inner);
        if list.is_empty() {
            return Ok(None);
        }
        list.sort();
        Ok(Some(UnformattedCollection { list }))
    }

    /// `settle` handles one outcome and reports whether the file on disk now
    /// holds `outcome.content`, which makes it safe to cache.
    fn run<F>(&self, options: &FixOptions, deps: &DependencyCache, settle: F) -> Result<()>
    where
        F: Fn(&Path, &FixOutcome) -> Result<bool> + Sync,
    {
        if !self.dir.is_dir() {
            return Err(ReviserError::NotADirectory(self.dir.display().to_string()));
        }

        let cache = self
            .cache_dir
            .as_ref()
            .map(|dir| FileCache::new(dir).with_metadata(self.prefer_metadata));
        let walk_error = Mutex::new(None);
        let first_error = Mutex::new(None);

        let task = |path: PathBuf| {
            if let Err(e) = self.process_file(&path, cache.as_ref(), options, deps, &settle) {
                let mut slot = lock(&first_error);
                if slot.is_none() {
                    *slot = Some(e.in_file(path.display().to_string()));
                }
            }
        };

        self.schedule(self.go_files(&walk_error), &task)?;

        let walk_error = walk_error.into_inner().unwrap_or_else(PoisonError::into_inner);
        let first_error = first_error.into_inner().unwrap_or_else(PoisonError::into_inner);
        match walk_error.or(first_error) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn schedule<I, T>(&self, files: I, task: &T) -> Result<()>
    where
        I: Iterator<Item = PathBuf>,
        T: Fn(PathBuf) + Sync,
    {
        if let Some(pool) = &self.worker_pool {
            pool.scope(|s| {
                for path in files {
                    s.spawn(move || task(path));
                }
            });
            return Ok(());
        }

        let mut files = files.peekable();
        for path in files.by_ref().take(self.sequential_threshold) {
            task(path);
        }
        if files.peek().is_none() {
            return Ok(());
        }

        let pool = WorkerPool::with_default_size()?;
        debug!(
            dir = %self.dir.display(),
            threads = pool.threads(),
            "switching to worker pool"
        );
        pool.scope(|s| {
            for path in files {
                s.spawn(move || task(path));
            }
        });
        pool.stop_and_wait();
        Ok(())
    }

    fn process_file<F>(
        &self,
        path: &Path,
        cache: Option<&FileCache>,
        options: &FixOptions,
        deps: &DependencyCache,
        settle: &F,
    ) -> Result<()>
    where
        F: Fn(&Path, &FixOutcome) -> Result<bool>,
    {
        if let Some(cache) = cache {
            if cache.should_skip(path)? {
                debug!(path = %path.display(), "unchanged since last run");
                return Ok(());
            }
        }

        let outcome = SourceFile::new(self.project.as_str(), path).fix(options, deps)?;
        let on_disk = settle(path, &outcome)?;
        if let (true, Some(cache)) = (on_disk, cache) {
            cache.record(path, &outcome.content)?;
        }
        debug!(path = %path.display(), changed = outcome.changed, "processed");
        Ok(())
    }

    /// `.go` files under the directory; a walk failure is stored in
    /// `walk_error` and ends the iteration.
    fn go_files<'a>(
        &self,
        walk_error: &'a Mutex<Option<ReviserError>>,
    ) -> impl Iterator<Item = PathBuf> + 'a {
        let mut builder = WalkBuilder::new(&self.dir);
        builder.standard_filters(false);
        if !self.recursive {
            builder.max_depth(Some(1));
        }
        let excludes = self.excludes.clone();
        builder.filter_entry(move |entry| entry.depth() == 0 || !matches_any(&excludes, entry.path()));

        builder
            .build()
            .map_while(move |entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    *lock(walk_error) = Some(ReviserError::Walk(e.to_string()));
                    None
                }
            })
            .filter(|entry| {
                entry.file_type().is_some_and(|t| t.is_file())
                    && entry.path().extension().is_some_and(|ext| ext == GO_EXTENSION)
            })
            .map(DirEntry::into_path)
    }
}

fn matches_any(patterns: &[Pattern], path: &Path) -> bool {
    patterns
        .iter()
        .any(|pattern| pattern.matches_path_with(path, MATCH_OPTIONS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const UNSORTED: &str = "package main\n\nimport (\n\t\"os\"\n\t\"fmt\"\n)\n\nvar _ = os.Args\nvar _ = fmt.Sprint\n";
    const SORTED: &str = "package main\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n\nvar _ = os.Args\nvar _ = fmt.Sprint\n";

    fn create_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn source_dir(root: &Path, recursive: bool, excludes: &str) -> SourceDir {
        SourceDir::new("example.com/app", &root.to_string_lossy(), recursive, excludes)
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_fix_rewrites_files() {
        let temp_dir = TempDir::new().unwrap();
        let main = create_file(temp_dir.path(), "main.go", UNSORTED);
        let other = create_file(temp_dir.path(), "other.go", SORTED);
        let deps = DependencyCache::default();

        let dir = source_dir(temp_dir.path(), false, "");
        assert!(dir.fix(&FixOptions::default(), &deps).unwrap());
        assert_eq!(read(&main), SORTED);
        assert_eq!(read(&other), SORTED);

        assert!(!dir.fix(&FixOptions::default(), &deps).unwrap());
    }

    #[test]
    fn test_recursion() {
        let temp_dir = TempDir::new().unwrap();
        let nested = create_file(temp_dir.path(), "pkg/inner/inner.go", UNSORTED);
        let deps = DependencyCache::default();

        source_dir(temp_dir.path(), false, "")
            .fix(&FixOptions::default(), &deps)
            .unwrap();
        assert_eq!(read(&nested), UNSORTED);

        source_dir(temp_dir.path(), true, "")
            .fix(&FixOptions::default(), &deps)
            .unwrap();
        assert_eq!(read(&nested), SORTED);
    }

    #[test]
    fn test_recursive_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let nested = create_file(temp_dir.path(), "a/b.go", UNSORTED);
        let path = format!("{}/...", temp_dir.path().display());

        SourceDir::new("", &path, false, "")
            .fix(&FixOptions::default(), &DependencyCache::default())
            .unwrap();
        assert_eq!(read(&nested), SORTED);
    }

    #[test]
    fn test_walk_visits_every_go_file() {
        let temp_dir = TempDir::new().unwrap();
        let files: Vec<PathBuf> = ["vendor/v.go", "testdata/t.go", "_old/o.go", "_gen.go", "pkg/k.go"]
            .iter()
            .map(|name| create_file(temp_dir.path(), name, UNSORTED))
            .collect();
        let readme = create_file(temp_dir.path(), "README.md", UNSORTED);

        source_dir(temp_dir.path(), true, "")
            .fix(&FixOptions::default(), &DependencyCache::default())
            .unwrap();

        for path in &files {
            assert_eq!(read(path), SORTED, "{} was not fixed", path.display());
        }
        assert_eq!(read(&readme), UNSORTED);
    }

    #[test]
    fn test_exclude_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let generated = create_file(temp_dir.path(), "gen/api.go", UNSORTED);
        let mock = create_file(temp_dir.path(), "store_mock.go", UNSORTED);
        let nested_mock = create_file(temp_dir.path(), "pkg/store_mock.go", UNSORTED);
        let main = create_file(temp_dir.path(), "main.go", UNSORTED);

        let dir = source_dir(temp_dir.path(), true, "gen, *_mock.go");
        assert!(dir.is_excluded(Path::new("gen")));
        assert!(dir.is_excluded(&mock));
        assert!(!dir.is_excluded(&nested_mock));

        dir.fix(&FixOptions::default(), &DependencyCache::default())
            .unwrap();
        assert_eq!(read(&generated), UNSORTED);
        assert_eq!(read(&mock), UNSORTED);
        assert_eq!(read(&nested_mock), SORTED);
        assert_eq!(read(&main), SORTED);
    }

    #[test]
    fn test_find_lists_without_writing() {
        let temp_dir = TempDir::new().unwrap();
        let b = create_file(temp_dir.path(), "b.go", UNSORTED);
        let a = create_file(temp_dir.path(), "a.go", UNSORTED);
        create_file(temp_dir.path(), "c.go", SORTED);

        let found = source_dir(temp_dir.path(), false, "")
            .find(&FixOptions::default(), &DependencyCache::default())
            .unwrap()
            .unwrap();
        assert_eq!(found.list(), &[a.clone(), b.clone()]);
        assert_eq!(found.to_string(), format!("{}\n{}", a.display(), b.display()));
        assert_eq!(read(&a), UNSORTED);
    }

    #[test]
    fn test_find_nothing_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "a.go", SORTED);
        let found = source_dir(temp_dir.path(), false, "")
            .find(&FixOptions::default(), &DependencyCache::default())
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_not_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = create_file(temp_dir.path(), "main.go", SORTED);
        let err = source_dir(&file, false, "")
            .fix(&FixOptions::default(), &DependencyCache::default())
            .unwrap_err();
        assert!(matches!(err, ReviserError::NotADirectory(_)));
    }

    #[test]
    fn test_many_files_beyond_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let files: Vec<PathBuf> = (0..25)
            .map(|i| create_file(temp_dir.path(), &format!("f{:02}.go", i), UNSORTED))
            .collect();

        let dir = source_dir(temp_dir.path(), false, "").with_sequential_threshold(2);
        assert!(dir.fix(&FixOptions::default(), &DependencyCache::default()).unwrap());
        assert!(files.iter().all(|f| read(f) == SORTED));
    }

    #[test]
    fn test_injected_pool() {
        let temp_dir = TempDir::new().unwrap();
        let files: Vec<PathBuf> = (0..10)
            .map(|i| create_file(temp_dir.path(), &format!("f{}.go", i), UNSORTED))
            .collect();
        let pool = Arc::new(WorkerPool::new(2).unwrap());

        source_dir(temp_dir.path(), false, "")
            .with_worker_pool(Arc::clone(&pool))
            .fix(&FixOptions::default(), &DependencyCache::default())
            .unwrap();
        assert!(files.iter().all(|f| read(f) == SORTED));
        assert!(!pool.is_stopped());
    }

    #[test]
    fn test_first_error_is_returned_after_all_files() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "broken.go", "package main\n\nimport (\n");
        let files: Vec<PathBuf> = (0..12)
            .map(|i| create_file(temp_dir.path(), &format!("ok{:02}.go", i), UNSORTED))
            .collect();

        let err = source_dir(temp_dir.path(), false, "")
            .with_sequential_threshold(3)
            .fix(&FixOptions::default(), &DependencyCache::default())
            .unwrap_err();
        assert!(matches!(err, ReviserError::File { .. }));
        assert!(err.to_string().contains("broken.go"));
        assert!(files.iter().all(|f| read(f) == SORTED));
    }

    #[test]
    fn test_cache_skips_unchanged_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path().join(".cache");
        fs::create_dir(&cache_dir).unwrap();
        let main = create_file(temp_dir.path(), "main.go", UNSORTED);

        let dir = source_dir(temp_dir.path(), false, "").with_cache(&cache_dir);
        dir.fix(&FixOptions::default(), &DependencyCache::default())
            .unwrap();
        assert_eq!(read(&main), SORTED);
        assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 1);

        // A broken file with a fresh record is skipped, not parsed.
        let broken = create_file(temp_dir.path(), "broken.go", "package main\n\nimport (\n");
        FileCache::new(&cache_dir)
            .record(&broken, b"package main\n\nimport (\n")
            .unwrap();
        assert!(dir.fix(&FixOptions::default(), &DependencyCache::default()).is_ok());
    }

    #[test]
    fn test_find_caches_only_canonical_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path().join(".cache");
        fs::create_dir(&cache_dir).unwrap();
        create_file(temp_dir.path(), "bad.go", UNSORTED);
        create_file(temp_dir.path(), "good.go", SORTED);

        let dir = source_dir(temp_dir.path(), false, "")
            .with_cache(&cache_dir)
            .without_metadata_cache();
        let first = dir
            .find(&FixOptions::default(), &DependencyCache::default())
            .unwrap()
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 1);

        let second = dir
            .find(&FixOptions::default(), &DependencyCache::default())
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_is_dir() {
        assert_eq!(is_dir("."), std::env::current_dir().ok());
        assert_eq!(is_dir("./..."), std::env::current_dir().ok());
        let temp_dir = TempDir::new().unwrap();
        let file = create_file(temp_dir.path(), "pkg/main.go", SORTED);
        assert!(is_dir(&file.to_string_lossy()).is_none());

        let pkg = temp_dir.path().join("pkg");
        assert_eq!(is_dir(&format!("{}/...", pkg.display())), Some(pkg.clone()));
        assert!(is_dir(&format!("{}/...", file.display())).is_none());
    }
}
