//! Go source analysis built on tree-sitter.
//!
//! - `parser`: parses a unit and reads its header (build tags, generated marker)
//! - `imports`: extracts import specs, comments and the region they occupy
//! - `usage`: decides which imports the file body references

pub mod imports;
pub mod parser;
pub mod usage;

pub use imports::{assumed_package_name, is_major_version, ImportName, ImportSection, ImportSpec};
pub use parser::{GoParser, ParsedUnit};
pub use usage::{used_imports, UsageMap};
