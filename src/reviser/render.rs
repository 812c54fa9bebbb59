//! Import block rendering and splicing.

use std::ops::Range;

use crate::syntax::imports::{ImportName, ImportSpec};

fn spec_line(spec: &ImportSpec) -> String {
    let name = match &spec.name {
        ImportName::Default => String::new(),
        ImportName::Alias(alias) => format!("{} ", alias),
        ImportName::Blank => "_ ".to_string(),
        ImportName::Dot => ". ".to_string(),
    };
    match &spec.comment {
        Some(comment) => format!("{}\"{}\" {}", name, spec.path, comment),
        None => format!("{}\"{}\"", name, spec.path),
    }
}

/// Renders the import declaration for `chunks`, without a trailing newline.
///
/// A lone import without doc comments uses the single line form unless the
/// source already wrapped its imports in parentheses. No imports render as
/// the dangling comments alone, or nothing.
pub fn render_block(chunks: &[Vec<ImportSpec>], dangling: &[String], parenthesized: bool) -> String {
    let specs: Vec<&ImportSpec> = chunks.iter().flatten().collect();

    if specs.is_empty() {
        return dangling.join("\n");
    }
    if specs.len() == 1 && specs[0].doc.is_empty() && dangling.is_empty() && !parenthesized {
        return format!("import {}", spec_line(specs[0]));
    }

    let mut out = String::from("import (\n");
    for (i, chunk) in chunks.iter().filter(|c| !c.is_empty()).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for spec in chunk {
            for doc in &spec.doc {
                out.push('\t');
                out.push_str(doc);
                out.push('\n');
            }
            out.push('\t');
            out.push_str(&spec_line(spec));
            out.push('\n');
        }
    }
    if !dangling.is_empty() {
        out.push('\n');
        for comment in dangling {
            out.push('\t');
            out.push_str(comment);
            out.push('\n');
        }
    }
    out.push(')');
    out
}

/// Replaces `region` of `source` with the cgo declarations followed by `block`.
///
/// When nothing replaces the region, the whitespace after it goes too. With
/// `format`, the replacement is surrounded by exactly one blank line.
pub fn splice(source: &[u8], region: Range<usize>, cgo: &[String], block: &str, format: bool) -> Vec<u8> {
    let mut parts: Vec<&str> = cgo.iter().map(String::as_str).collect();
    if !block.is_empty() {
        parts.push(block);
    }
    let body = parts.join("\n\n");

    let before = &source[..region.start];
    let after = &source[region.end..];

    let mut out = Vec::with_capacity(source.len() + 16);

    if body.is_empty() {
        let after = after.trim_ascii_start();
        if after.is_empty() {
            out.extend_from_slice(before.trim_ascii_end());
            out.push(b'\n');
        } else {
            out.extend_from_slice(before);
            out.extend_from_slice(after);
        }
        return out;
    }

    if !format {
        out.extend_from_slice(before);
        out.extend_from_slice(body.as_bytes());
        out.extend_from_slice(after);
        return out;
    }

    let before = before.trim_ascii_end();
    out.extend_from_slice(before);
    if !before.is_empty() {
        out.extend_from_slice(if ends_with_comment(before) { b"\n" } else { b"\n\n" });
    }
    out.extend_from_slice(body.as_bytes());

    let after = after.trim_ascii_start();
    if after.is_empty() {
        out.push(b'\n');
    } else {
        out.extend_from_slice(b"\n\n");
        out.extend_from_slice(after);
    }
    out
}

/// Whether the last line is a comment, which then stays attached to the block.
fn ends_with_comment(text: &[u8]) -> bool {
    let last_line = match text.iter().rposition(|&b| b == b'\n') {
        Some(i) => &text[i + 1..],
        None => text,
    };
    let last_line = last_line.trim_ascii();
    last_line.starts_with(b"//") || last_line.ends_with(b"*/")
}
