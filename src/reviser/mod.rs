//! Import rewriting for files, directories and batches of paths.

pub mod batch;
pub mod cache;
pub mod dir;
pub mod file;
pub mod order;
pub mod pool;
pub mod render;

pub use batch::{process_paths, Batch, BatchConfig, OutputSink};
pub use cache::{
    cache_file_path, compute_content_hash, read_entry, should_skip, write_entry, CacheEntry,
    FileCache,
};
pub use dir::{is_dir, SourceDir, UnformattedCollection, DEFAULT_SEQUENTIAL_THRESHOLD};
pub use file::{FixOutcome, SourceFile};
pub use order::{Classifier, Orderer};
pub use pool::WorkerPool;

/// Path argument that stands for standard input.
pub const STANDARD_INPUT: &str = "-";
