//! Diagram block location and normalisation.
//!
//! Two dialects are recognised, both case-insensitively:
//!
//! ```text
//! ```plantuml            @startuml
//! Alice -> Bob           Alice -> Bob
//! ```                    @enduml
//! ```
//!
//! The fenced form yields only the text between the fences; the bare form
//! yields the whole `@startuml … @enduml` span. Both scans run independently
//! and their matches are merged in document order. A bare block written
//! inside a plantuml fence therefore matches twice; [`resolve_overlaps`]
//! decides which match survives.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(```\s*plantuml[^\n]*\n)(.*?)(\n```)").unwrap());

static RE_STARTEND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(@startuml\b.*?@enduml)").unwrap());

const START_MARKER: &str = "@startuml";
const END_MARKER: &str = "@enduml";

/// Which syntax a block was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// ```` ```plantuml ```` fenced code block.
    Fenced,
    /// Bare `@startuml … @enduml` pair.
    StartEnd,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockKind::Fenced => f.pad("fenced"),
            BlockKind::StartEnd => f.pad("@startuml"),
        }
    }
}

/// One diagram found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// 1-indexed position in document order.
    pub ordinal: usize,
    /// Byte range of `original` in the scanned text.
    pub span: Range<usize>,
    /// Exact text that will be replaced.
    pub original: String,
    /// PlantUML source handed to the renderer (before [`ensure_wrapped`]).
    pub code: String,
    pub kind: BlockKind,
}

/// Find every diagram block in `markdown`, sorted by start offset.
///
/// Ordinals are assigned `1..=n` in that order. Overlapping matches from the
/// two dialects are all reported.
pub fn locate_blocks(markdown: &str) -> Vec<DiagramBlock> {
    let mut blocks = Vec::new();

    for caps in RE_FENCED.captures_iter(markdown) {
        let (Some(whole), Some(code)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        blocks.push(DiagramBlock {
            ordinal: 0,
            span: whole.range(),
            original: whole.as_str().to_string(),
            code: code.as_str().to_string(),
            kind: BlockKind::Fenced,
        });
    }

    for m in RE_STARTEND.find_iter(markdown) {
        blocks.push(DiagramBlock {
            ordinal: 0,
            span: m.range(),
            original: m.as_str().to_string(),
            code: m.as_str().to_string(),
            kind: BlockKind::StartEnd,
        });
    }

    // Stable: on equal starts the fenced match (pushed first) stays first.
    blocks.sort_by_key(|b| b.span.start);
    renumber(&mut blocks);
    blocks
}

/// Drop blocks that overlap an earlier one.
///
/// Blocks are visited by start offset (longer span first on ties); a block
/// is kept only if it starts at or after the end of the last kept block.
/// Survivors are renumbered `1..=n`. Returns `(kept, dropped)`.
pub fn resolve_overlaps(mut blocks: Vec<DiagramBlock>) -> (Vec<DiagramBlock>, Vec<DiagramBlock>) {
    blocks.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then_with(|| b.span.end.cmp(&a.span.end))
    });

    let mut kept: Vec<DiagramBlock> = Vec::with_capacity(blocks.len());
    let mut dropped = Vec::new();
    for block in blocks {
        match kept.last() {
            Some(last) if block.span.start < last.span.end => dropped.push(block),
            _ => kept.push(block),
        }
    }

    renumber(&mut kept);
    (kept, dropped)
}

fn renumber(blocks: &mut [DiagramBlock]) {
    for (i, b) in blocks.iter_mut().enumerate() {
        b.ordinal = i + 1;
    }
}

/// Make sure `code` carries its own `@startuml` / `@enduml` markers.
///
/// Code that already contains both (case-insensitive) is returned unchanged.
pub fn ensure_wrapped(code: &str) -> String {
    let low = code.to_lowercase();
    if low.contains(START_MARKER) && low.contains(END_MARKER) {
        return code.to_string();
    }
    format!("{START_MARKER}\n{code}\n{END_MARKER}")
}

/// 1-indexed line number containing byte `offset`.
pub fn line_of(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
