//! Line-oriented markdown structural parser.
//!
//! A single top-to-bottom scan recognizes ATX headings, fenced code blocks,
//! blockquotes, list items and paragraphs, and builds a [`StructureNode`]
//! tree rooted at a synthetic root node. Headings nest by level: a heading
//! of level N owns all following content until a heading of level <= N.
//!
//! Nesting is done with an explicit stack (see [`TreeBuilder`]) so depth is
//! bounded by the six heading levels, not by document length.
//!
//! The parser never fails on malformed input. An unclosed code fence is
//! closed implicitly at end of input and recorded as a [`Malformation`].

use std::collections::BTreeSet;

use crate::config::ParserConfig;
use crate::models::{
    DocumentMeta, Malformation, NodeKind, OutlineEntry, ParseStatus, Span, StructureNode,
};

/// Everything the parser derives from one document's raw text.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub tree: StructureNode,
    pub meta: DocumentMeta,
    pub status: ParseStatus,
}

pub fn parse_document(text: &str, config: &ParserConfig) -> ParseOutput {
    if text.len() > config.max_document_bytes {
        let meta = DocumentMeta {
            title: fallback_title(text, config.title_max_chars),
            word_count: text.split_whitespace().count(),
            ..DocumentMeta::default()
        };
        return ParseOutput {
            tree: StructureNode::root(text.len()),
            meta,
            status: ParseStatus::Failed,
        };
    }

    let mut scanner = Scanner::new(text.len());
    let mut offset = 0;
    for raw_line in text.split_inclusive('\n') {
        let line = raw_line.trim_end_matches(['\n', '\r']);
        scanner.line(line, offset);
        offset += raw_line.len();
    }
    let (tree, malformations) = scanner.finish();

    let meta = build_meta(&tree, text, malformations, config.title_max_chars);
    ParseOutput {
        tree,
        meta,
        status: ParseStatus::Parsed,
    }
}

// ============ Tree building ============

/// Stack-based heading nester.
///
/// `stack[0]` is the root. Opening a heading pops (and attaches to their
/// parent) every open heading of equal or deeper level, then pushes the new
/// heading. Leaf content always attaches to the top of the stack.
struct TreeBuilder {
    stack: Vec<StructureNode>,
}

impl TreeBuilder {
    fn new(len: usize) -> Self {
        Self {
            stack: vec![StructureNode::root(len)],
        }
    }

    fn push_leaf(&mut self, node: StructureNode) {
        if let Some(top) = self.stack.last_mut() {
            top.children.push(node);
        }
    }

    fn open_heading(&mut self, node: StructureNode) {
        let level = node.kind.heading_level().unwrap_or(1);
        while self.stack.len() > 1 {
            let top_level = self
                .stack
                .last()
                .and_then(|n| n.kind.heading_level())
                .unwrap_or(0);
            if top_level < level {
                break;
            }
            self.close_top();
        }
        self.stack.push(node);
    }

    fn close_top(&mut self) {
        if let Some(done) = self.stack.pop() {
            self.push_leaf(done);
        }
    }

    fn finish(mut self) -> StructureNode {
        while self.stack.len() > 1 {
            self.close_top();
        }
        self.stack
            .pop()
            .unwrap_or_else(|| StructureNode::root(0))
    }
}

// ============ Line scanner ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Paragraph,
    Blockquote,
    ListItem,
}

/// A multi-line block still accepting lines.
struct OpenBlock {
    kind: BlockKind,
    lines: Vec<String>,
    start: usize,
    end: usize,
}

struct OpenFence {
    marker_len: usize,
    /// Indentation of the opening fence; content lines lose up to this much.
    indent: usize,
    language: String,
    start: usize,
    end: usize,
    content: Vec<String>,
}

struct Scanner {
    builder: TreeBuilder,
    block: Option<OpenBlock>,
    fence: Option<OpenFence>,
    /// Set by a list item, cleared by the next unindented non-list line.
    /// Blank lines keep it, so an item's indented fence survives a gap.
    in_list: bool,
    malformations: Vec<Malformation>,
}

impl Scanner {
    fn new(len: usize) -> Self {
        Self {
            builder: TreeBuilder::new(len),
            block: None,
            fence: None,
            in_list: false,
            malformations: Vec::new(),
        }
    }

    fn line(&mut self, line: &str, offset: usize) {
        let end = offset + line.len();

        if let Some(fence) = self.fence.as_mut() {
            if is_closing_fence(line, fence.marker_len, fence.indent) {
                fence.end = end;
                self.close_fence();
            } else {
                fence.content.push(strip_indent(line, fence.indent).to_string());
                fence.end = end;
            }
            return;
        }

        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if indent == 0 && !trimmed.is_empty() && list_item(trimmed).is_none() {
            self.in_list = false;
        }

        if indent <= 3 || self.in_list {
            if let Some((marker_len, language)) = opening_fence(trimmed) {
                self.flush_block();
                self.fence = Some(OpenFence {
                    marker_len,
                    indent,
                    language,
                    start: offset,
                    end,
                    content: Vec::new(),
                });
                return;
            }
        }

        if indent <= 3 {
            if let Some((level, heading)) = atx_heading(trimmed) {
                self.flush_block();
                self.builder.open_heading(StructureNode {
                    kind: NodeKind::Heading { level },
                    text: heading,
                    span: Span { start: offset, end },
                    children: Vec::new(),
                });
                return;
            }
        }

        if trimmed.is_empty() {
            self.flush_block();
            return;
        }

        if let Some(quoted) = trimmed.strip_prefix('>') {
            let quoted = quoted.strip_prefix(' ').unwrap_or(quoted);
            self.extend_or_open(BlockKind::Blockquote, quoted, offset, end);
            return;
        }

        if let Some(item) = list_item(trimmed) {
            self.in_list = true;
            self.flush_block();
            self.open(BlockKind::ListItem, item, offset, end);
            return;
        }

        // Indented text continues a list item; anything else is paragraph text.
        let continues_item = indent > 0
            && matches!(self.block.as_ref(), Some(b) if b.kind == BlockKind::ListItem);
        if continues_item {
            self.extend_or_open(BlockKind::ListItem, trimmed, offset, end);
        } else {
            self.extend_or_open(BlockKind::Paragraph, trimmed.trim_end(), offset, end);
        }
    }

    fn extend_or_open(&mut self, kind: BlockKind, text: &str, start: usize, end: usize) {
        if let Some(block) = self.block.as_mut() {
            if block.kind == kind {
                block.lines.push(text.to_string());
                block.end = end;
                return;
            }
        }
        self.flush_block();
        self.open(kind, text, start, end);
    }

    fn open(&mut self, kind: BlockKind, text: &str, start: usize, end: usize) {
        self.block = Some(OpenBlock {
            kind,
            lines: vec![text.to_string()],
            start,
            end,
        });
    }

    fn flush_block(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        let text = block.lines.join("\n");
        let kind = match block.kind {
            BlockKind::Paragraph => NodeKind::Paragraph,
            BlockKind::ListItem => NodeKind::ListItem,
            BlockKind::Blockquote => NodeKind::Blockquote {
                callout: block.lines.first().and_then(|l| callout_label(l)),
            },
        };
        self.builder.push_leaf(StructureNode {
            kind,
            text,
            span: Span {
                start: block.start,
                end: block.end,
            },
            children: Vec::new(),
        });
    }

    fn close_fence(&mut self) {
        if let Some(fence) = self.fence.take() {
            self.builder.push_leaf(StructureNode {
                kind: NodeKind::CodeBlock {
                    language: fence.language,
                },
                text: fence.content.join("\n"),
                span: Span {
                    start: fence.start,
                    end: fence.end,
                },
                children: Vec::new(),
            });
        }
    }

    fn finish(mut self) -> (StructureNode, Vec<Malformation>) {
        if let Some(fence) = self.fence.as_ref() {
            self.malformations.push(Malformation::UnclosedCodeFence {
                offset: fence.start,
                language: fence.language.clone(),
            });
            self.close_fence();
        }
        self.flush_block();
        (self.builder.finish(), self.malformations)
    }
}

// ============ Line classifiers ============

/// Returns `(backtick count, language)` for an opening fence line.
fn opening_fence(trimmed: &str) -> Option<(usize, String)> {
    let marker_len = trimmed.chars().take_while(|c| *c == '`').count();
    if marker_len < 3 {
        return None;
    }
    let info = &trimmed[marker_len..];
    // Backticks in the info string would make this inline code, not a fence.
    if info.contains('`') {
        return None;
    }
    let language = info
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c| c == '{' || c == '}' || c == '.')
        .to_lowercase();
    Some((marker_len, language))
}

/// A closing fence may sit up to three columns deeper than its opener.
fn is_closing_fence(line: &str, marker_len: usize, open_indent: usize) -> bool {
    let trimmed = line.trim();
    let run = trimmed.chars().take_while(|c| *c == '`').count();
    let indent = line.len() - line.trim_start().len();
    indent <= open_indent + 3 && run >= marker_len && run == trimmed.len()
}

/// Remove at most `max` leading spaces.
fn strip_indent(line: &str, max: usize) -> &str {
    let spaces = line.bytes().take(max).take_while(|b| *b == b' ').count();
    &line[spaces..]
}

/// Returns `(level, text)` for an ATX heading line.
fn atx_heading(trimmed: &str) -> Option<(u8, String)> {
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let mut text = rest.trim();
    // Optional closing sequence: `## Title ##`
    let without_closing = text.trim_end_matches('#');
    if without_closing.len() < text.len()
        && (without_closing.is_empty() || without_closing.ends_with([' ', '\t']))
    {
        text = without_closing.trim_end();
    }
    Some((hashes as u8, text.to_string()))
}

/// Returns the item text for `- x`, `* x` and `12. x` lines.
fn list_item(trimmed: &str) -> Option<&str> {
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
    {
        return Some(rest.trim());
    }
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && digits <= 9 {
        if let Some(rest) = trimmed[digits..].strip_prefix(". ") {
            return Some(rest.trim());
        }
    }
    None
}

/// Callout label from the first line of a blockquote: `[!NOTE]`,
/// `**Warning:**` or `**Tip**:`.
fn callout_label(first_line: &str) -> Option<String> {
    let line = first_line.trim();
    let raw = if let Some(rest) = line.strip_prefix("[!") {
        &rest[..rest.find(']')?]
    } else if let Some(rest) = line.strip_prefix("**") {
        rest[..rest.find("**")?].trim_end_matches(':')
    } else {
        return None;
    };
    let label = raw.trim();
    let valid = !label.is_empty()
        && label.len() <= 32
        && label.chars().all(|c| c.is_alphanumeric() || c == ' ');
    valid.then(|| label.to_lowercase())
}

// ============ Metadata ============

fn build_meta(
    tree: &StructureNode,
    text: &str,
    malformations: Vec<Malformation>,
    title_max_chars: usize,
) -> DocumentMeta {
    let mut outline = Vec::new();
    let mut code_languages = BTreeSet::new();
    let mut callouts = Vec::new();
    let mut word_count = 0;

    for node in tree.descendants() {
        match &node.kind {
            NodeKind::Heading { level } => {
                outline.push(OutlineEntry {
                    level: *level,
                    text: node.text.clone(),
                });
                word_count += node.text.split_whitespace().count();
            }
            NodeKind::CodeBlock { language } => {
                if !language.is_empty() {
                    code_languages.insert(language.clone());
                }
            }
            NodeKind::Blockquote { callout } => {
                if let Some(label) = callout {
                    callouts.push(label.clone());
                }
                word_count += node.text.split_whitespace().count();
            }
            _ => word_count += node.text.split_whitespace().count(),
        }
    }

    let title = outline
        .iter()
        .find(|h| h.level == 1 && !h.text.is_empty())
        .map(|h| h.text.clone())
        .unwrap_or_else(|| fallback_title(text, title_max_chars));

    DocumentMeta {
        title,
        word_count,
        code_languages,
        outline,
        callouts,
        malformed: !malformations.is_empty(),
        malformations,
    }
}

/// First non-empty line that is not a fence marker, with any heading marker
/// removed, truncated to `max_chars` characters.
fn fallback_title(text: &str, max_chars: usize) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && opening_fence(l).is_none())
        .unwrap_or("");
    let line = atx_heading(line).map(|(_, t)| t).unwrap_or_else(|| line.to_string());
    line.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParseOutput {
        parse_document(text, &ParserConfig::default())
    }

    fn kinds(node: &StructureNode) -> Vec<NodeKind> {
        node.descendants().iter().map(|n| n.kind.clone()).collect()
    }

    #[test]
    fn test_heading_nesting() {
        let out = parse("# A\n\nintro\n\n## B\n\nbody\n\n### C\n\ndeep\n\n## D\n\n# E\n");
        let root = &out.tree;
        assert_eq!(root.children.len(), 2);
        let a = &root.children[0];
        assert_eq!(a.text, "A");
        assert_eq!(a.children.len(), 3); // intro, B, D
        assert_eq!(a.children[1].text, "B");
        assert_eq!(a.children[1].children[1].text, "C");
        assert_eq!(a.children[1].children[1].children[0].text, "deep");
        assert_eq!(a.children[2].text, "D");
        assert_eq!(root.children[1].text, "E");
    }

    #[test]
    fn test_content_before_first_heading_attaches_to_root() {
        let out = parse("preamble\n\n## Section\ntext");
        assert_eq!(out.tree.children[0].kind, NodeKind::Paragraph);
        assert_eq!(out.tree.children[1].kind, NodeKind::Heading { level: 2 });
    }

    #[test]
    fn test_code_fence_with_language() {
        let out = parse("Intro\n\n```Rust\nfn main() {}\n# not a heading\n```\n\nAfter");
        let nodes = out.tree.descendants();
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            nodes[1].kind,
            NodeKind::CodeBlock {
                language: "rust".to_string()
            }
        );
        assert_eq!(nodes[1].text, "fn main() {}\n# not a heading");
        assert!(!out.meta.malformed);
        assert!(out.meta.code_languages.contains("rust"));
    }

    #[test]
    fn test_unclosed_fence_is_malformed_not_fatal() {
        let text = "```python\nprint(1)";
        let out = parse(text);
        assert_eq!(out.status, ParseStatus::Parsed);
        assert!(out.meta.malformed);
        assert_eq!(
            out.meta.malformations,
            vec![Malformation::UnclosedCodeFence {
                offset: 0,
                language: "python".to_string()
            }]
        );
        let code = &out.tree.children[0];
        assert_eq!(code.text, "print(1)");
        assert_eq!(code.span.end, text.len());
    }

    #[test]
    fn test_longer_fence_needs_matching_close() {
        let out = parse("````md\n```\ninner\n```\n````\ntail");
        let nodes = out.tree.descendants();
        assert_eq!(nodes[0].text, "```\ninner\n```");
        assert_eq!(nodes[1].text, "tail");
        assert!(!out.meta.malformed);
    }

    #[test]
    fn test_blockquote_and_callouts() {
        let out = parse("> **Note:** remember this\n> second line\n\n> [!WARNING]\n> careful\n\n> plain");
        let nodes = out.tree.descendants();
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            nodes[0].kind,
            NodeKind::Blockquote {
                callout: Some("note".to_string())
            }
        );
        assert_eq!(nodes[0].text, "**Note:** remember this\nsecond line");
        assert_eq!(
            nodes[1].kind,
            NodeKind::Blockquote {
                callout: Some("warning".to_string())
            }
        );
        assert_eq!(nodes[2].kind, NodeKind::Blockquote { callout: None });
        assert_eq!(out.meta.callouts, vec!["note", "warning"]);
    }

    #[test]
    fn test_list_items() {
        let out = parse("- one\n* two\n  continued\n3. three\n-not a list");
        assert_eq!(
            kinds(&out.tree),
            vec![
                NodeKind::ListItem,
                NodeKind::ListItem,
                NodeKind::ListItem,
                NodeKind::Paragraph
            ]
        );
        let nodes = out.tree.descendants();
        assert_eq!(nodes[1].text, "two\ncontinued");
        assert_eq!(nodes[2].text, "three");
    }

    #[test]
    fn test_heading_edge_cases() {
        assert_eq!(atx_heading("## Title ##"), Some((2, "Title".to_string())));
        assert_eq!(atx_heading("#hashtag"), None);
        assert_eq!(atx_heading("####### seven"), None);
        assert_eq!(atx_heading("#"), Some((1, String::new())));
        assert_eq!(atx_heading("# C#"), Some((1, "C#".to_string())));
    }

    #[test]
    fn test_title_prefers_first_h1() {
        let out = parse("## Intro\n\n# Real Title\n\n# Second");
        assert_eq!(out.meta.title, "Real Title");
    }

    #[test]
    fn test_title_fallback_truncated() {
        let long = "x".repeat(200);
        let out = parse(&format!("\n\n{}\nmore", long));
        assert_eq!(out.meta.title.chars().count(), 80);

        let out = parse("### Deep heading only\ntext");
        assert_eq!(out.meta.title, "Deep heading only");
    }

    #[test]
    fn test_title_fallback_skips_fence_lines() {
        let out = parse("```python\nprint(1)");
        assert_eq!(out.meta.title, "print(1)");

        let out = parse("```\n```\nafter the fence");
        assert_eq!(out.meta.title, "after the fence");
    }

    #[test]
    fn test_indented_fence_inside_list_item() {
        let out = parse("- install it\n\n    ```python\n    import docmesh\n    ```\n\n- next step");
        assert!(!out.meta.malformed);
        assert!(out.meta.code_languages.contains("python"));
        let nodes = out.tree.descendants();
        assert_eq!(
            nodes[1].kind,
            NodeKind::CodeBlock {
                language: "python".to_string()
            }
        );
        assert_eq!(nodes[1].text, "import docmesh");
        assert_eq!(nodes[2].kind, NodeKind::ListItem);
    }

    #[test]
    fn test_deep_indent_outside_list_is_not_a_fence() {
        let out = parse("intro\n\n    ```python\n    code");
        assert!(out.meta.code_languages.is_empty());
        assert!(!out.meta.malformed);
    }

    #[test]
    fn test_spans_monotonic_and_non_overlapping() {
        let text = "# T\r\npara one\npara two\n\n> q\n\n```\ncode\n```\n- item\n## H2\nend";
        let out = parse(text);
        let mut last_end = 0;
        for node in out.tree.descendants() {
            assert!(node.span.start >= last_end, "overlap at {:?}", node);
            assert!(node.span.end >= node.span.start);
            assert!(node.span.end <= text.len());
            last_end = node.span.end;
        }
        let first = &out.tree.children[0];
        assert_eq!(&text[first.span.start..first.span.end], "# T");
    }

    #[test]
    fn test_word_count_excludes_code() {
        let out = parse("# One two\n\nthree four five\n\n```\nnot counted here\n```");
        assert_eq!(out.meta.word_count, 5);
    }

    #[test]
    fn test_oversize_document_fails_softly() {
        let config = ParserConfig {
            title_max_chars: 80,
            max_document_bytes: 10,
        };
        let out = parse_document("# Big document body", &config);
        assert_eq!(out.status, ParseStatus::Failed);
        assert_eq!(out.meta.title, "Big document body");
        assert!(out.tree.children.is_empty());
    }

    #[test]
    fn test_deep_nesting_is_iterative() {
        let mut text = String::new();
        for i in 0..5000 {
            text.push_str(&format!("###### h{}\nbody\n", i));
        }
        let out = parse(&text);
        assert_eq!(out.tree.children.len(), 5000);
    }
}
