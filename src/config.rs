//! Fixer configuration: import buckets, their order and feature switches.

use std::fmt;
use std::str::FromStr;

use crate::error::{ReviserError, Result};

pub const DEFAULT_IMPORTS_ORDER: &str = "std,general,company,project";

/// Minimum number of buckets a user supplied order string must name.
pub const MIN_GROUP_COUNT: usize = 4;

/// Bucket an import is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImportGroup {
    Std,
    General,
    Company,
    Project,
    Blanked,
    Dotted,
}

impl ImportGroup {
    /// Canonical order used for buckets missing from a configured order.
    pub const ALL: [ImportGroup; 6] = [
        ImportGroup::Std,
        ImportGroup::General,
        ImportGroup::Company,
        ImportGroup::Project,
        ImportGroup::Blanked,
        ImportGroup::Dotted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportGroup::Std => "std",
            ImportGroup::General => "general",
            ImportGroup::Company => "company",
            ImportGroup::Project => "project",
            ImportGroup::Blanked => "blanked",
            ImportGroup::Dotted => "dotted",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "std" | "standard" => Some(ImportGroup::Std),
            "general" => Some(ImportGroup::General),
            "company" => Some(ImportGroup::Company),
            "project" => Some(ImportGroup::Project),
            "blanked" | "blank" => Some(ImportGroup::Blanked),
            "dotted" | "dot" => Some(ImportGroup::Dotted),
            _ => None,
        }
    }
}

impl fmt::Display for ImportGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, duplicate-free list of buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOrder {
    groups: Vec<ImportGroup>,
}

impl GroupOrder {
    /// Builds an order from already validated buckets, bypassing the minimum
    /// count. Duplicates are rejected.
    pub fn new(groups: Vec<ImportGroup>) -> Result<Self> {
        for (i, group) in groups.iter().enumerate() {
            if groups[..i].contains(group) {
                return Err(ReviserError::Config(format!(
                    "duplicate order group type: {:?}",
                    group.as_str()
                )));
            }
        }
        Ok(Self { groups })
    }

    /// Parses a comma separated order such as `std,general,company,project`.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_with_min(s, MIN_GROUP_COUNT)
    }

    pub fn parse_with_min(s: &str, min: usize) -> Result<Self> {
        let names: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();

        if names.len() < min {
            return Err(ReviserError::Config(format!(
                "use default at least {} parameters to sort groups of your imports: {:?}",
                min, DEFAULT_IMPORTS_ORDER
            )));
        }

        let groups = names
            .into_iter()
            .map(|name| {
                ImportGroup::from_name(name).ok_or_else(|| {
                    ReviserError::Config(format!("unknown order group type: {:?}", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(groups)
    }

    pub fn groups(&self) -> &[ImportGroup] {
        &self.groups
    }

    pub fn contains(&self, group: ImportGroup) -> bool {
        self.groups.contains(&group)
    }

    /// Configured buckets first, then any remaining bucket in canonical order.
    pub fn render_sequence(&self) -> Vec<ImportGroup> {
        let mut sequence = self.groups.clone();
        for group in ImportGroup::ALL {
            if !sequence.contains(&group) {
                sequence.push(group);
            }
        }
        sequence
    }
}

impl Default for GroupOrder {
    fn default() -> Self {
        Self {
            groups: vec![
                ImportGroup::Std,
                ImportGroup::General,
                ImportGroup::Company,
                ImportGroup::Project,
            ],
        }
    }
}

impl FromStr for GroupOrder {
    type Err = ReviserError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for GroupOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.groups.iter().map(|g| g.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// Options applied to every file of one invocation.
#[derive(Debug, Clone, Default)]
pub struct FixOptions {
    /// Drop imports nothing in the file references. Default: off.
    pub remove_unused: bool,
    /// Alias version-suffixed paths (`pg "github.com/go-pg/pg/v9"`). Default: off.
    pub set_alias: bool,
    /// Normalize blank lines around the import block. Default: off.
    pub format: bool,
    /// Move aliased imports into a trailing subgroup of their bucket. Default: off.
    pub separate_named: bool,
    /// Process files marked `// Code generated`. Default: off.
    pub apply_to_generated: bool,
    /// Path prefixes that make up the company bucket. Default: none.
    pub company_prefixes: Vec<String>,
    /// Bucket order. Default: `std,general,company,project`.
    pub group_order: GroupOrder,
}

impl FixOptions {
    pub fn with_company_prefixes(mut self, prefixes: &str) -> Self {
        self.company_prefixes = prefixes
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        self
    }

    pub fn with_group_order(mut self, order: GroupOrder) -> Self {
        self.group_order = order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_order() {
        let order = GroupOrder::parse(DEFAULT_IMPORTS_ORDER).unwrap();
        assert_eq!(order, GroupOrder::default());
        assert_eq!(order.to_string(), DEFAULT_IMPORTS_ORDER);
    }

    #[test]
    fn test_parse_rejects_short_order() {
        let err = GroupOrder::parse("std,general").unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Configuration error: use default at least 4 parameters to sort groups of your imports: "std,general,company,project""#
        );
    }

    #[test]
    fn test_parse_rejects_unknown_group() {
        let err = GroupOrder::parse("std,general,company,group").unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Configuration error: unknown order group type: "group""#
        );
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        assert!(GroupOrder::parse("std,general,std,project").is_err());
    }

    #[test]
    fn test_parse_with_min_override() {
        let order = GroupOrder::parse_with_min("std,general,project", 3).unwrap();
        assert_eq!(
            order.groups(),
            &[ImportGroup::Std, ImportGroup::General, ImportGroup::Project]
        );
    }

    #[test]
    fn test_parse_accepts_aliases_and_spaces() {
        let order = GroupOrder::parse(" standard , general,project, blank ,dot").unwrap();
        assert!(order.contains(ImportGroup::Blanked));
        assert!(order.contains(ImportGroup::Dotted));
    }

    #[test]
    fn test_render_sequence_appends_missing_groups() {
        let order = GroupOrder::parse("project,std,general,company").unwrap();
        assert_eq!(
            order.render_sequence(),
            vec![
                ImportGroup::Project,
                ImportGroup::Std,
                ImportGroup::General,
                ImportGroup::Company,
                ImportGroup::Blanked,
                ImportGroup::Dotted,
            ]
        );
    }

    #[test]
    fn test_company_prefixes() {
        let opts = FixOptions::default().with_company_prefixes("github.com/acme, gitlab.acme.io ,");
        assert_eq!(opts.company_prefixes, vec!["github.com/acme", "gitlab.acme.io"]);
    }
}
