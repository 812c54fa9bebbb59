use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::order::Orderer;
use super::render::{render_block, splice};
use crate::config::FixOptions;
use crate::dependencies::{DependencyCache, PackageImports};
use crate::error::Result;
use crate::syntax::imports::ImportSection;
use crate::syntax::parser::GoParser;
use crate::syntax::usage::used_imports;

/// Result of fixing one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOutcome {
    pub content: Vec<u8>,
    pub original: Vec<u8>,
    pub changed: bool,
}

impl FixOutcome {
    fn unchanged(original: Vec<u8>) -> Self {
        Self {
            content: original.clone(),
            original,
            changed: false,
        }
    }
}

/// One Go source file of a project.
#[derive(Debug, Clone)]
pub struct SourceFile {
    project: String,
    path: PathBuf,
}

impl SourceFile {
    pub fn new(project: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory whose package table applies to this unit.
    fn package_dir(&self) -> &Path {
        if self.path.is_dir() {
            return &self.path;
        }
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Reads the file and fixes its imports; nothing is written.
    pub fn fix(&self, options: &FixOptions, deps: &DependencyCache) -> Result<FixOutcome> {
        let original = std::fs::read(&self.path)?;
        self.fix_source(original, options, deps)
    }

    /// Fixes `original` as if it were the content of this file.
    pub fn fix_source(
        &self,
        original: Vec<u8>,
        options: &FixOptions,
        deps: &DependencyCache,
    ) -> Result<FixOutcome> {
        let path_text = self.path.display().to_string();
        let unit = GoParser::new().parse_source(&path_text, &original)?;

        if unit.is_generated() && !options.apply_to_generated {
            debug!(path = %path_text, "skipping generated file");
            return Ok(FixOutcome::unchanged(original));
        }

        let Some(section) = ImportSection::extract(&unit) else {
            return Ok(FixOutcome::unchanged(original));
        };

        let (packages, usage) = if options.remove_unused {
            let packages = deps.load(self.package_dir(), &unit.build_tags())?;
            let usage = used_imports(&unit, &section.specs, &packages);
            (packages, Some(usage))
        } else {
            (Arc::new(PackageImports::default()), None)
        };

        let chunks = Orderer::new(&self.project, options, &packages)
            .order(section.specs, usage.as_ref());
        let block = render_block(&chunks, &section.dangling, section.parenthesized);
        let content = splice(
            unit.source_bytes(),
            section.region,
            &section.cgo,
            &block,
            options.format,
        );

        let changed = content != original;
        Ok(FixOutcome {
            content,
            original,
            changed,
        })
    }
}
