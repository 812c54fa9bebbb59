//! Processing of several input paths in one invocation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use once_cell::sync::OnceCell;
use tracing::info;

use super::cache::FileCache;
use super::dir::{is_dir, SourceDir, RECURSIVE_SUFFIX};
use super::file::{FixOutcome, SourceFile};
use super::pool::WorkerPool;
use crate::config::FixOptions;
use crate::dependencies::DependencyCache;
use crate::error::{ReviserError, Result};
use crate::workspace::ModuleResolver;

/// Where fixed content goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSink {
    /// Write changed files back.
    WriteFile,
    /// Write changed files back and print their paths.
    WriteAndList,
    /// Print the paths of files that would change; nothing is written.
    ListOnly,
    /// Print the fixed content of single files.
    Stdout,
}

/// Settings shared by every input path of a batch.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub project_name: Option<String>,
    pub recursive: bool,
    pub excludes: String,
    pub output: OutputSink,
    pub cache: Option<FileCache>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            project_name: None,
            recursive: false,
            excludes: String::new(),
            output: OutputSink::WriteFile,
            cache: None,
        }
    }
}

/// Shared state of one batch run.
pub struct Batch<'a, W> {
    config: &'a BatchConfig,
    options: &'a FixOptions,
    resolver: &'a ModuleResolver,
    deps: &'a DependencyCache,
    out: &'a Mutex<W>,
    pool: OnceCell<Arc<WorkerPool>>,
}

impl<'a, W: Write + Send> Batch<'a, W> {
    pub fn new(
        config: &'a BatchConfig,
        options: &'a FixOptions,
        resolver: &'a ModuleResolver,
        deps: &'a DependencyCache,
        out: &'a Mutex<W>,
    ) -> Self {
        Self {
            config,
            options,
            resolver,
            deps,
            out,
            pool: OnceCell::new(),
        }
    }

    /// Processes every path on its own thread and returns whether anything
    /// changed. All paths run to completion; the first error in input order
    /// is returned.
    pub fn run(&self, paths: &[String], cancel: &AtomicBool) -> Result<bool> {
        if cancel.load(Ordering::Acquire) {
            return Err(ReviserError::Cancelled);
        }

        let results: Vec<Result<bool>> = thread::scope(|s| {
            let handles: Vec<_> = paths
                .iter()
                .map(|path| s.spawn(move || self.process_path(path)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(ReviserError::Pool("input worker panicked".to_string())))
                })
                .collect()
        });

        if let Some(pool) = self.pool.get() {
            pool.stop_and_wait();
        }

        let mut changed = false;
        for result in results {
            changed |= result?;
        }
        Ok(changed)
    }

    fn shared_pool(&self) -> Result<Arc<WorkerPool>> {
        self.pool
            .get_or_try_init(|| WorkerPool::with_default_size().map(Arc::new))
            .cloned()
    }

    fn process_path(&self, path: &str) -> Result<bool> {
        info!(path, "processing");
        let project = self
            .resolver
            .determine_project_name(self.config.project_name.as_deref(), Path::new(path))?;

        match is_dir(path) {
            Some(dir) => self.process_dir(project, path, &dir),
            None => self.process_file(project, path),
        }
    }

    fn process_dir(&self, project: String, path: &str, resolved: &Path) -> Result<bool> {
        let recursive = self.config.recursive || path.ends_with(RECURSIVE_SUFFIX);
        let mut dir = SourceDir::new(project, &resolved.to_string_lossy(), recursive, &self.config.excludes)
            .with_worker_pool(self.shared_pool()?);
        if let Some(cache) = &self.config.cache {
            dir = dir.with_cache(cache.dir());
            dir = if cache.prefers_metadata() {
                dir.with_metadata_cache()
            } else {
                dir.without_metadata_cache()
            };
        }

        let mut changed = false;
        if matches!(self.config.output, OutputSink::ListOnly | OutputSink::WriteAndList) {
            if let Some(unformatted) = dir.find(self.options, self.deps)? {
                self.print(format!("{}\n", unformatted).as_bytes())?;
                changed = true;
            }
        }
        if self.config.output != OutputSink::ListOnly {
            changed |= dir.fix(self.options, self.deps)?;
        }
        Ok(changed)
    }

    fn process_file(&self, project: String, path: &str) -> Result<bool> {
        let abs_path: PathBuf = std::path::absolute(path)?;

        if let Some(cache) = &self.config.cache {
            if cache.should_skip(&abs_path)? {
                return Ok(false);
            }
        }

        let outcome = SourceFile::new(project, abs_path.clone())
            .fix(self.options, self.deps)
            .map_err(|e| e.in_file(abs_path.display().to_string()))?;

        let on_disk = self.emit(&abs_path, &outcome)?;
        if let (true, Some(cache)) = (on_disk, &self.config.cache) {
            cache.record(&abs_path, &outcome.content)?;
        }
        Ok(outcome.changed)
    }

    /// Delivers one outcome; returns whether the file now holds the fixed
    /// content.
    fn emit(&self, path: &Path, outcome: &FixOutcome) -> Result<bool> {
        match self.config.output {
            OutputSink::ListOnly => {
                if outcome.changed {
                    self.print(format!("{}\n", path.display()).as_bytes())?;
                }
                Ok(!outcome.changed)
            }
            OutputSink::Stdout => {
                self.print(&outcome.content)?;
                Ok(!outcome.changed)
            }
            OutputSink::WriteFile | OutputSink::WriteAndList => {
                if outcome.changed {
                    std::fs::write(path, &outcome.content)?;
                    if self.config.output == OutputSink::WriteAndList {
                        self.print(format!("{}\n", path.display()).as_bytes())?;
                    }
                }
                Ok(true)
            }
        }
    }

    fn print(&self, bytes: &[u8]) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(bytes)?;
        out.flush()?;
        Ok(())
    }
}

/// Runs a batch over `paths` with fresh shared state.
pub fn process_paths<W: Write + Send>(
    paths: &[String],
    config: &BatchConfig,
    options: &FixOptions,
    resolver: &ModuleResolver,
    deps: &DependencyCache,
    out: &Mutex<W>,
    cancel: &AtomicBool,
) -> Result<bool> {
    Batch::new(config, options, resolver, deps, out).run(paths, cancel)
}
