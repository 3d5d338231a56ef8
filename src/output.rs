//! Result types returned by the conversion entry points.

use crate::config::FontPair;
use crate::error::DiagramError;
use crate::pipeline::blocks::BlockKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of rendering one diagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResult {
    /// 1-indexed position of the diagram in the document.
    pub ordinal: usize,
    /// Rendered image, present on success.
    pub image: Option<PathBuf>,
    /// True when the image already existed and no renderer was launched.
    pub cached: bool,
    /// Failure details, present on failure.
    pub error: Option<DiagramError>,
    /// Wall-clock time spent on this diagram.
    pub duration_ms: u64,
}

impl RenderResult {
    pub fn success(ordinal: usize, image: PathBuf, cached: bool, duration_ms: u64) -> Self {
        Self {
            ordinal,
            image: Some(image),
            cached,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(error: DiagramError, duration_ms: u64) -> Self {
        Self {
            ordinal: error.ordinal(),
            image: None,
            cached: false,
            error: Some(error),
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.image.is_some()
    }
}

/// What happened in the PDF conversion stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PdfStatus {
    /// The converter succeeded and the PDF exists. `fonts` is None when the
    /// converter defaults were used.
    Generated {
        path: PathBuf,
        fonts: Option<FontPair>,
    },
    /// The final attempt exited unsuccessfully.
    ConverterFailed { exit_status: i32 },
    /// The converter reported success but no PDF was written.
    Missing { path: PathBuf },
    /// The converter executable could not be found.
    ToolNotFound { tool: String },
    /// The converter was not run (markdown-only preparation).
    NotRequested,
}

impl PdfStatus {
    pub fn is_generated(&self) -> bool {
        matches!(self, PdfStatus::Generated { .. })
    }
}

/// Aggregate numbers for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Diagrams located after overlap resolution.
    pub total_diagrams: usize,
    /// Diagrams rendered by launching the renderer.
    pub rendered_diagrams: usize,
    /// Diagrams served from an existing image.
    pub cached_diagrams: usize,
    pub failed_diagrams: usize,
    /// Matches dropped because they overlapped an earlier diagram.
    pub discarded_overlaps: usize,
    /// Bare `---` lines turned into page breaks.
    pub page_breaks: usize,
    /// Number of converter invocations.
    pub pdf_attempts: usize,
    pub render_duration_ms: u64,
    pub pdf_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything produced by a full conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Final Markdown as handed to the converter.
    pub markdown: String,
    /// Where that Markdown was written.
    pub intermediate: PathBuf,
    /// One entry per diagram, in document order.
    pub diagrams: Vec<RenderResult>,
    pub pdf: PdfStatus,
    pub stats: ConversionStats,
}

/// One located diagram, as reported by [`crate::convert::inspect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramSummary {
    pub ordinal: usize,
    pub kind: BlockKind,
    /// 1-indexed line where the block starts.
    pub line: usize,
    /// Byte range in the source document.
    pub start: usize,
    pub end: usize,
    /// Whether `diagramN.png` already exists (would be served from cache).
    pub image_exists: bool,
}

/// Static analysis of a document, no processes launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub input: PathBuf,
    pub has_front_matter: bool,
    pub diagrams: Vec<DiagramSummary>,
    /// Matches that overlap an earlier diagram and would be dropped.
    pub overlapping: usize,
    pub page_breaks: usize,
    /// Unescaped `$` characters that would be escaped.
    pub unescaped_dollars: usize,
}
