pub mod config;
pub mod dependencies;
pub mod error;
pub mod reviser;
pub mod syntax;
pub mod workspace;

pub use config::{FixOptions, GroupOrder, ImportGroup, DEFAULT_IMPORTS_ORDER};
pub use dependencies::{DependencyCache, GoListLoader, PackageImports, PackageLoader};
pub use error::{ReviserError, Result};
pub use reviser::{
    process_paths, BatchConfig, CacheEntry, FileCache, FixOutcome, OutputSink, SourceDir,
    SourceFile, UnformattedCollection, WorkerPool,
};
pub use syntax::{GoParser, ImportSection, ImportSpec};
pub use workspace::ModuleResolver;
