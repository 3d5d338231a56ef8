//! Error types for the md2pdf-uml library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2PdfError`] — **Fatal**: the conversion cannot proceed at all
//!   (missing input, converter not installed, bad configuration). Returned as
//!   `Err(Md2PdfError)` from the top-level `convert*` functions.
//!
//! * [`DiagramError`] — **Non-fatal**: a single diagram failed to render but
//!   every other diagram is fine. Stored inside
//!   [`crate::output::RenderResult`] and surfaced in the document as a bold
//!   failure notice instead of aborting the whole conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Exit status reported when the converter executable cannot be found,
/// matching the shell's "command not found" convention.
pub const TOOL_NOT_FOUND_STATUS: i32 = 127;

/// All fatal errors returned by the md2pdf-uml library.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but is not valid UTF-8 text.
    #[error("File is not valid UTF-8: '{path}' (invalid byte at offset {offset})")]
    NotUtf8 { path: PathBuf, offset: usize },

    // ── Tool errors ───────────────────────────────────────────────────────
    /// An external executable is not resolvable on `PATH`.
    #[error("'{tool}' not found in PATH.\n{hint}")]
    ToolNotFound { tool: String, hint: String },

    /// No renderer command is configured and plantuml.jar could not be
    /// located or downloaded.
    #[error(
        "PlantUML is not available: {0}\n\n\
Pass --plantuml-jar /path/to/plantuml.jar, set PLANTUML_JAR, or check your\n\
internet connection so the jar can be downloaded automatically.\n"
    )]
    RendererUnavailable(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artefact.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the conversion log.
    #[error("Failed to open log file '{path}': {source}")]
    LogOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Md2PdfError {
    /// Process exit status a CLI should use for this error.
    pub fn exit_status(&self) -> i32 {
        match self {
            Md2PdfError::ToolNotFound { .. } => TOOL_NOT_FOUND_STATUS,
            _ => 1,
        }
    }
}

/// A non-fatal error for a single diagram.
///
/// Stored alongside [`crate::output::RenderResult`] when a render fails.
/// The conversion always continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DiagramError {
    /// The renderer ran but exited unsuccessfully.
    #[error("Diagram {ordinal}: renderer exited with {status:?}: {stderr}")]
    RendererFailed {
        ordinal: usize,
        status: Option<i32>,
        stderr: String,
    },

    /// The renderer process could not be started.
    #[error("Diagram {ordinal}: could not launch renderer: {detail}")]
    SpawnFailed { ordinal: usize, detail: String },

    /// The diagram source file could not be written.
    #[error("Diagram {ordinal}: could not write source file: {detail}")]
    SourceWriteFailed { ordinal: usize, detail: String },

    /// The render task panicked or was cancelled.
    #[error("Diagram {ordinal}: render task aborted: {detail}")]
    TaskAborted { ordinal: usize, detail: String },
}

impl DiagramError {
    /// Ordinal of the diagram this error belongs to.
    pub fn ordinal(&self) -> usize {
        match self {
            DiagramError::RendererFailed { ordinal, .. }
            | DiagramError::SpawnFailed { ordinal, .. }
            | DiagramError::SourceWriteFailed { ordinal, .. }
            | DiagramError::TaskAborted { ordinal, .. } => *ordinal,
        }
    }

    /// The raw error text embedded in the document's failure notice: the
    /// renderer's stderr, or the underlying error message.
    pub fn detail(&self) -> &str {
        match self {
            DiagramError::RendererFailed { stderr, .. } => stderr,
            DiagramError::SpawnFailed { detail, .. }
            | DiagramError::SourceWriteFailed { detail, .. }
            | DiagramError::TaskAborted { detail, .. } => detail,
        }
    }
}
