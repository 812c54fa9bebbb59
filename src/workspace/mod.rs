//! Project identity from `go.mod`.
//!
//! The project bucket is keyed by the module path of the nearest enclosing
//! `go.mod`. Lookups are memoized per module root; only successful reads are
//! kept, so a `go.mod` created later is picked up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::error::{ReviserError, Result};

pub const GO_MOD_FILE: &str = "go.mod";

/// Walks up from `path` to the first directory containing a `go.mod` file.
pub fn go_mod_root(path: &Path) -> Option<PathBuf> {
    let start = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    start
        .ancestors()
        .find(|dir| dir.join(GO_MOD_FILE).is_file())
        .map(Path::to_path_buf)
}

/// Extracts the module path from `go.mod` content.
pub fn parse_module_path(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let line = match line.find("//") {
            Some(i) => &line[..i],
            None => line,
        };
        let rest = line.trim().strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let path = rest.trim().trim_matches(['"', '`']);
        (!path.is_empty()).then(|| path.to_string())
    })
}

#[derive(Debug, Default)]
pub struct ModuleResolver {
    names: RwLock<HashMap<PathBuf, String>>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module path declared in `<root>/go.mod`.
    pub fn module_name(&self, root: &Path) -> Result<String> {
        if let Some(name) = self
            .names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(root)
        {
            return Ok(name.clone());
        }

        let go_mod = root.join(GO_MOD_FILE);
        let content = std::fs::read_to_string(&go_mod)?;
        let name = parse_module_path(&content).ok_or_else(|| {
            ReviserError::Module(format!("{}: module directive not found", go_mod.display()))
        })?;

        debug!(root = %root.display(), module = %name, "resolved module");
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(root.to_path_buf(), name.clone());
        Ok(name)
    }

    /// An explicit, non-empty project name wins; otherwise the module path of
    /// the `go.mod` enclosing `path`.
    pub fn determine_project_name(&self, explicit: Option<&str>, path: &Path) -> Result<String> {
        if let Some(name) = explicit.filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }

        let root = go_mod_root(path).ok_or_else(|| {
            ReviserError::Module(format!("no {} found above {}", GO_MOD_FILE, path.display()))
        })?;
        self.module_name(&root)
    }

    pub fn clear(&self) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
