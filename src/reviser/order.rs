//! Import classification and ordering.
//!
//! Turns the raw import list of a file into the chunks of the final import
//! block: buckets in configured order, each sorted, optionally split into an
//! unaliased and an aliased subgroup. Chunks are rendered with one blank line
//! between them.

use std::collections::HashMap;

use crate::config::{FixOptions, ImportGroup};
use crate::dependencies::PackageImports;
use crate::syntax::imports::{is_major_version, ImportName, ImportSpec};
use crate::syntax::usage::UsageMap;

const GO_KEYWORDS: [&str; 25] = [
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

/// Decides the bucket of each import for one file.
pub struct Classifier<'a> {
    project: &'a str,
    options: &'a FixOptions,
}

impl<'a> Classifier<'a> {
    pub fn new(project: &'a str, options: &'a FixOptions) -> Self {
        Self { project, options }
    }

    /// First match wins: blanked, dotted, std, company, project, general.
    /// Blanked and dotted only apply when the order names them.
    pub fn classify(&self, spec: &ImportSpec) -> ImportGroup {
        let order = &self.options.group_order;
        if spec.is_blank() && order.contains(ImportGroup::Blanked) {
            return ImportGroup::Blanked;
        }
        if spec.is_dot() && order.contains(ImportGroup::Dotted) {
            return ImportGroup::Dotted;
        }

        let path = spec.path.as_str();
        let is_project = self.is_project(path);
        let is_company = self.is_company(path);

        if !is_project && !is_company && is_std_path(path) {
            ImportGroup::Std
        } else if is_company && order.contains(ImportGroup::Company) {
            ImportGroup::Company
        } else if is_project {
            ImportGroup::Project
        } else {
            ImportGroup::General
        }
    }

    fn is_project(&self, path: &str) -> bool {
        !self.project.is_empty()
            && path
                .strip_prefix(self.project)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    fn is_company(&self, path: &str) -> bool {
        self.options
            .company_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Standard library paths have no dot in their first element.
pub fn is_std_path(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or(path);
    !first.contains('.')
}

/// Alias a version-suffixed path gets under `set_alias`: the element before
/// the `vN` suffix, when that element is a usable Go identifier.
pub fn version_alias(path: &str) -> Option<&str> {
    let mut elements = path.rsplit('/');
    let last = elements.next()?;
    if !is_major_version(last) {
        return None;
    }
    let parent = elements.next()?;
    is_go_identifier(parent).then_some(parent)
}

fn is_go_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && s != "_"
        && !GO_KEYWORDS.contains(&s)
}

/// Produces the chunks of the rewritten import block.
pub struct Orderer<'a> {
    classifier: Classifier<'a>,
    options: &'a FixOptions,
    packages: &'a PackageImports,
}

impl<'a> Orderer<'a> {
    pub fn new(project: &'a str, options: &'a FixOptions, packages: &'a PackageImports) -> Self {
        Self {
            classifier: Classifier::new(project, options),
            options,
            packages,
        }
    }

    /// `usage` is given only when unused imports should be dropped.
    pub fn order(&self, specs: Vec<ImportSpec>, usage: Option<&UsageMap>) -> Vec<Vec<ImportSpec>> {
        let specs = specs
            .into_iter()
            .filter(|spec| Self::is_kept(spec, usage))
            .map(|spec| self.apply_alias(spec));
        let specs = dedup(specs);

        let mut buckets: HashMap<ImportGroup, Vec<ImportSpec>> = HashMap::new();
        for spec in specs {
            buckets
                .entry(self.classifier.classify(&spec))
                .or_default()
                .push(spec);
        }

        let mut chunks = Vec::new();
        for group in self.options.group_order.render_sequence() {
            let Some(mut bucket) = buckets.remove(&group) else {
                continue;
            };
            self.sort_bucket(group, &mut bucket);

            let separable = !matches!(group, ImportGroup::Blanked | ImportGroup::Dotted);
            if self.options.separate_named && separable {
                let (named, plain): (Vec<_>, Vec<_>) =
                    bucket.into_iter().partition(|spec| spec.alias().is_some());
                chunks.extend([plain, named].into_iter().filter(|c| !c.is_empty()));
            } else if !bucket.is_empty() {
                chunks.push(bucket);
            }
        }
        chunks
    }

    fn is_kept(spec: &ImportSpec, usage: Option<&UsageMap>) -> bool {
        match usage {
            Some(used) if !spec.is_blank() && !spec.is_dot() => {
                used.get(&spec.path).copied().unwrap_or(false)
            }
            _ => true,
        }
    }

    fn apply_alias(&self, mut spec: ImportSpec) -> ImportSpec {
        if self.options.set_alias && spec.name == ImportName::Default {
            if let Some(alias) = version_alias(&spec.path) {
                spec.name = ImportName::Alias(alias.to_string());
            }
        }
        spec
    }

    /// Alias, else declared package name, else Go's assumed name.
    fn identity(&self, spec: &ImportSpec) -> String {
        match spec.alias() {
            Some(alias) => alias.to_string(),
            None => self
                .packages
                .name_of(&spec.path)
                .map(String::from)
                .unwrap_or_else(|| spec.assumed_name()),
        }
    }

    fn sort_bucket(&self, group: ImportGroup, bucket: &mut [ImportSpec]) {
        match group {
            ImportGroup::Blanked | ImportGroup::Dotted => {
                bucket.sort_by(|a, b| a.path.cmp(&b.path));
            }
            _ => {
                bucket.sort_by_cached_key(|spec| (self.identity(spec), spec.path.clone()));
            }
        }
    }
}

/// Collapses specs with the same path and name, keeping the first and any
/// comments the duplicates carried.
fn dedup(specs: impl Iterator<Item = ImportSpec>) -> Vec<ImportSpec> {
    let mut kept: Vec<ImportSpec> = Vec::new();
    for spec in specs {
        match kept
            .iter_mut()
            .find(|k| k.path == spec.path && k.name == spec.name)
        {
            Some(existing) => {
                if existing.comment.is_none() {
                    existing.comment = spec.comment;
                }
                existing.doc.extend(spec.doc);
            }
            None => kept.push(spec),
        }
    }
    kept
}
