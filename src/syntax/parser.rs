use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::error::{ReviserError, Result};

const BUILD_TAG_PREFIX: &str = "//go:build";
const DEPRECATED_BUILD_TAG_PREFIXES: [&str; 2] = ["// +build", "//+build"];
const GENERATED_FILE_PREFIX: &str = "// Code generated";

/// A tag identifier, with the negation that may precede it.
static BUILD_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(!\s*)?([A-Za-z0-9_.]+)").expect("build tag pattern is valid"));

pub fn go_language() -> tree_sitter::Language {
    tree_sitter_go::LANGUAGE.into()
}

pub struct GoParser;

impl GoParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses one Go source unit. Any syntax error in the tree is reported as a
    /// parse failure; callers never see a partial tree.
    pub fn parse_source(&self, path: &str, source: &[u8]) -> Result<ParsedUnit> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&go_language())
            .map_err(|e| ReviserError::parse(path, e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ReviserError::parse(path, "Failed to parse source"))?;

        if tree.root_node().has_error() {
            let message = match first_error_node(tree.root_node()) {
                Some(node) => {
                    let pos = node.start_position();
                    format!("syntax error at {}:{}", pos.row + 1, pos.column + 1)
                }
                None => "syntax error".to_string(),
            };
            return Err(ReviserError::parse(path, message));
        }

        Ok(ParsedUnit {
            tree,
            source: source.to_vec(),
            path: path.to_string(),
        })
    }
}

impl Default for GoParser {
    fn default() -> Self {
        Self::new()
    }
}

fn first_error_node(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error_node)
}

pub struct ParsedUnit {
    pub tree: tree_sitter::Tree,
    pub source: Vec<u8>,
    pub path: String,
}

impl ParsedUnit {
    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    pub fn node_text(&self, node: &Node) -> &str {
        node.utf8_text(self.source_bytes()).unwrap_or("")
    }

    /// Comments that appear before the package clause.
    fn header_comments(&self) -> Vec<&str> {
        let root = self.root_node();
        let mut cursor = root.walk();
        let mut comments = Vec::new();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "comment" => comments.push(self.node_text(&child)),
                "package_clause" => break,
                _ => {}
            }
        }
        comments
    }

    /// `// Code generated ... DO NOT EDIT.` marker on the first comment.
    pub fn is_generated(&self) -> bool {
        self.header_comments()
            .first()
            .is_some_and(|c| c.starts_with(GENERATED_FILE_PREFIX))
    }

    /// Build constraint expression from the file header, if any.
    pub fn build_constraint(&self) -> Option<String> {
        self.header_comments().into_iter().find_map(|comment| {
            if let Some(rest) = comment.strip_prefix(BUILD_TAG_PREFIX) {
                return Some(rest.trim().to_string());
            }
            DEPRECATED_BUILD_TAG_PREFIXES
                .iter()
                .find_map(|prefix| comment.strip_prefix(prefix))
                .map(|rest| rest.trim().to_string())
        })
    }

    /// Positive tag identifiers of the build constraint, comma separated, in
    /// the form `go list -tags` expects. Negated tags are left out.
    pub fn build_tags(&self) -> String {
        let Some(expr) = self.build_constraint() else {
            return String::new();
        };

        let mut tags: Vec<&str> = Vec::new();
        for caps in BUILD_TAG.captures_iter(&expr) {
            if caps.get(1).is_some() {
                continue;
            }
            if let Some(tag) = caps.get(2).map(|m| m.as_str()) {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        tags.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParsedUnit {
        GoParser::new().parse_source("test.go", source.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_source_go() {
        let parsed = parse("package main\n\nfunc main() {}\n");
        assert_eq!(parsed.root_node().kind(), "source_file");
        assert!(parsed.root_node().child_count() > 0);
    }

    #[test]
    fn test_parse_source_preserves_bytes() {
        let source = "// Comment\npackage main\n";
        let parsed = parse(source);
        assert_eq!(parsed.source_bytes(), source.as_bytes());
        assert_eq!(parsed.node_text(&parsed.root_node()), source);
    }

    #[test]
    fn test_parse_source_rejects_syntax_errors() {
        let err = GoParser::new()
            .parse_source("broken.go", b"package main\n\nfunc main() {\n")
            .err()
            .unwrap();
        assert!(matches!(err, ReviserError::Parse { .. }));
        assert!(err.to_string().contains("broken.go"));
    }

    #[test]
    fn test_is_generated() {
        let parsed = parse("// Code generated by protoc-gen-go. DO NOT EDIT.\n\npackage pb\n");
        assert!(parsed.is_generated());

        let parsed = parse("// Package pb is hand written.\npackage pb\n");
        assert!(!parsed.is_generated());
    }

    #[test]
    fn test_build_constraint() {
        let parsed = parse("//go:build integration\n\npackage main\n");
        assert_eq!(parsed.build_constraint().as_deref(), Some("integration"));
        assert_eq!(parsed.build_tags(), "integration");
    }

    #[test]
    fn test_build_constraint_deprecated_form() {
        let parsed = parse("// +build linux\n\npackage main\n");
        assert_eq!(parsed.build_constraint().as_deref(), Some("linux"));
    }

    #[test]
    fn test_build_tags_skip_negations() {
        let parsed = parse("//go:build linux && !cgo || (darwin && e2e)\n\npackage main\n");
        assert_eq!(parsed.build_tags(), "linux,darwin,e2e");
    }

    #[test]
    fn test_build_tags_empty_without_constraint() {
        let parsed = parse("package main\n");
        assert_eq!(parsed.build_tags(), "");
    }
}
