//! Import declaration extraction.
//!
//! Collects every import spec of a Go file together with its comments and the
//! byte range the specs occupy, so the block can be rewritten in place while
//! the rest of the file stays untouched.

use std::ops::Range;

use tree_sitter::Node;

use super::parser::ParsedUnit;

/// Path of the pseudo package cgo hangs its preamble on.
pub const CGO_IMPORT_PATH: &str = "C";

/// How an import binds its package in the file scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportName {
    /// No name: the package's own name is used.
    Default,
    /// Explicit alias, `pg "github.com/go-pg/pg/v9"`.
    Alias(String),
    /// `_ "embed"`
    Blank,
    /// `. "testing"`
    Dot,
}

impl ImportName {
    fn from_source(text: &str) -> Self {
        match text {
            "_" => ImportName::Blank,
            "." => ImportName::Dot,
            alias => ImportName::Alias(alias.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub path: String,
    pub name: ImportName,
    /// Comment on the same line, after the path.
    pub comment: Option<String>,
    /// Comment lines directly above the spec.
    pub doc: Vec<String>,
}

impl ImportSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: ImportName::Default,
            comment: None,
            doc: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: ImportName) -> Self {
        self.name = name;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn alias(&self) -> Option<&str> {
        match &self.name {
            ImportName::Alias(alias) => Some(alias),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.name == ImportName::Blank
    }

    pub fn is_dot(&self) -> bool {
        self.name == ImportName::Dot
    }

    /// Package name Go assumes for this path when nothing better is known.
    pub fn assumed_name(&self) -> String {
        assumed_package_name(&self.path)
    }
}

/// Go's assumed-name rule: last path element, skipping a `vN` major version
/// element, without a `go-` prefix and cut at the first non-identifier char.
pub fn assumed_package_name(path: &str) -> String {
    let mut elements = path.rsplit('/');
    let mut base = elements.next().unwrap_or(path);
    if is_major_version(base) {
        if let Some(parent) = elements.next() {
            base = parent;
        }
    }
    let base = base.strip_prefix("go-").unwrap_or(base);
    let end = base
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(base.len());
    base[..end].to_string()
}

/// `v2`, `v10`; `v0` and `v1` never appear as suffixes but are accepted.
pub fn is_major_version(element: &str) -> bool {
    element
        .strip_prefix('v')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Imports of one file plus the byte range they occupy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSection {
    pub specs: Vec<ImportSpec>,
    /// Verbatim `import "C"` declarations found inside `region`, with their
    /// preamble comments.
    pub cgo: Vec<String>,
    /// Comments after the last spec that belong to no spec.
    pub dangling: Vec<String>,
    /// Whether any rewritten declaration used the `import ( ... )` form.
    pub parenthesized: bool,
    pub region: Range<usize>,
}

impl ImportSection {
    /// Returns `None` when the file has no import besides cgo's.
    pub fn extract(unit: &ParsedUnit) -> Option<Self> {
        let root = unit.root_node();
        let mut cursor = root.walk();
        let children: Vec<Node<'_>> = root.named_children(&mut cursor).collect();

        // Imports must directly follow the package clause; stop at the first
        // other top level declaration.
        let mut decls: Vec<usize> = Vec::new();
        for (i, child) in children.iter().enumerate() {
            match child.kind() {
                "import_declaration" => decls.push(i),
                "comment" | "package_clause" => {}
                _ if !decls.is_empty() => break,
                _ => {}
            }
        }

        let rewritable: Vec<usize> = decls
            .iter()
            .copied()
            .filter(|&i| !is_cgo_declaration(unit, children[i]))
            .collect();
        let (&first, &last) = (rewritable.first()?, rewritable.last()?);

        let mut collector = Collector::new(unit);
        let mut region = children[first].start_byte()..children[last].end_byte();

        for &node in &children[first..=last] {
            match node.kind() {
                "comment" => collector.comment(node),
                "import_declaration" if is_cgo_declaration(unit, node) => {
                    let start = collector.take_pending_as_preamble().unwrap_or(node.start_byte());
                    collector
                        .cgo
                        .push(source_text(unit, start..node.end_byte()));
                }
                "import_declaration" => collector.declaration(node),
                _ => {}
            }
        }

        // A trailing comment on the last declaration's line belongs to it.
        if let Some(next) = children.get(last + 1) {
            if next.kind() == "comment"
                && next.start_position().row == children[last].end_position().row
            {
                collector.comment(*next);
                region.end = next.end_byte();
            }
        }

        let Collector {
            specs,
            cgo,
            pending,
            parenthesized,
            ..
        } = collector;

        Some(Self {
            specs,
            cgo,
            dangling: pending.into_iter().map(|(text, _)| text).collect(),
            parenthesized,
            region,
        })
    }
}

fn is_cgo_declaration(unit: &ParsedUnit, decl: Node<'_>) -> bool {
    let mut cursor = decl.walk();
    let specs: Vec<Node<'_>> = decl
        .named_children(&mut cursor)
        .filter(|n| n.kind() == "import_spec")
        .collect();
    specs.len() == 1
        && specs[0]
            .child_by_field_name("path")
            .is_some_and(|p| unquote(unit.node_text(&p)) == CGO_IMPORT_PATH)
}

fn unquote(literal: &str) -> &str {
    literal
        .trim()
        .trim_start_matches(['"', '`'])
        .trim_end_matches(['"', '`'])
}

fn source_text(unit: &ParsedUnit, range: Range<usize>) -> String {
    String::from_utf8_lossy(&unit.source_bytes()[range]).into_owned()
}

/// Walks declarations in source order, attaching comments to specs.
struct Collector<'u> {
    unit: &'u ParsedUnit,
    specs: Vec<ImportSpec>,
    cgo: Vec<String>,
    /// Comments waiting for the next spec, with their start byte.
    pending: Vec<(String, usize)>,
    /// Row the most recent spec ended on, while a trailing comment may follow.
    last_spec_row: Option<usize>,
    parenthesized: bool,
}

impl<'u> Collector<'u> {
    fn new(unit: &'u ParsedUnit) -> Self {
        Self {
            unit,
            specs: Vec::new(),
            cgo: Vec::new(),
            pending: Vec::new(),
            last_spec_row: None,
            parenthesized: false,
        }
    }

    /// Pending comments directly above a cgo declaration are its preamble;
    /// returns where the preamble starts.
    fn take_pending_as_preamble(&mut self) -> Option<usize> {
        let start = self.pending.first().map(|(_, start)| *start);
        self.pending.clear();
        start
    }

    fn comment(&mut self, node: Node<'_>) {
        let text = self.unit.node_text(&node).trim_end().to_string();
        if self.last_spec_row == Some(node.start_position().row) {
            if let Some(spec) = self.specs.last_mut() {
                if spec.comment.is_none() {
                    spec.comment = Some(text);
                    return;
                }
            }
        }
        self.last_spec_row = None;
        self.pending.push((text, node.start_byte()));
    }

    fn declaration(&mut self, decl: Node<'_>) {
        self.last_spec_row = None;
        let mut cursor = decl.walk();
        let children: Vec<Node<'_>> = decl.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "import_spec" => self.spec(child),
                "import_spec_list" => {
                    self.parenthesized = true;
                    let mut list_cursor = child.walk();
                    let entries: Vec<Node<'_>> = child.named_children(&mut list_cursor).collect();
                    for entry in entries {
                        match entry.kind() {
                            "import_spec" => self.spec(entry),
                            "comment" => self.comment(entry),
                            _ => {}
                        }
                    }
                    // Only a spec line can carry a trailing comment.
                    self.last_spec_row = None;
                }
                "comment" => self.comment(child),
                _ => {}
            }
        }
    }

    fn spec(&mut self, node: Node<'_>) {
        let Some(path_node) = node.child_by_field_name("path") else {
            return;
        };
        let path = unquote(self.unit.node_text(&path_node)).to_string();
        if path.is_empty() {
            return;
        }
        let name = node
            .child_by_field_name("name")
            .map(|n| ImportName::from_source(self.unit.node_text(&n)))
            .unwrap_or(ImportName::Default);

        let mut spec = ImportSpec::new(path).with_name(name);
        spec.doc = self.pending.drain(..).map(|(text, _)| text).collect();
        self.specs.push(spec);
        self.last_spec_row = Some(node.end_position().row);
    }
}
