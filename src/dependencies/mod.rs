//! Package name resolution for import paths.
//!
//! An import path does not always end in the name of the package it provides
//! (`gopkg.in/yaml.v3` declares `yaml`, `github.com/go-pg/pg/v9` declares `pg`).
//! This module asks the Go toolchain for the declared names once per
//! (directory, build tags) key and shares the answer between all files of
//! that directory:
//! - `loader`: the `PackageLoader` seam and the `go list` implementation
//! - `cache`: single-flight cache in front of a loader

pub mod cache;
pub mod loader;

use std::collections::HashMap;

pub use cache::DependencyCache;
pub use loader::{GoListLoader, PackageLoader};

/// Import path to declared package name, immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageImports {
    names: HashMap<String, String>,
}

impl PackageImports {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    /// Declared package name of `path`, if the loader saw it.
    pub fn name_of(&self, path: &str) -> Option<&str> {
        self.names.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<P: Into<String>, N: Into<String>> FromIterator<(P, N)> for PackageImports {
    fn from_iter<I: IntoIterator<Item = (P, N)>>(iter: I) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(|(path, name)| (path.into(), name.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_of() {
        let imports = PackageImports::from_iter([
            ("gopkg.in/yaml.v3", "yaml"),
            ("github.com/go-pg/pg/v9", "pg"),
        ]);
        assert_eq!(imports.name_of("gopkg.in/yaml.v3"), Some("yaml"));
        assert_eq!(imports.name_of("fmt"), None);
        assert_eq!(imports.len(), 2);
    }

    #[test]
    fn test_default_is_empty() {
        assert!(PackageImports::default().is_empty());
    }
}
