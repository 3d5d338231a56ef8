//! # md2pdf-uml
//!
//! Convert Markdown documents with embedded PlantUML diagrams to PDF.
//!
//! Every ```` ```plantuml ```` fenced block and every bare
//! `@startuml … @enduml` pair is rendered to a PNG with PlantUML, replaced by
//! an image reference, and the resulting Markdown is handed to Pandoc
//! (XeLaTeX) with a list of font pairs to try.
//!
//! ## Pipeline Overview
//!
//! ```text
//! book.md
//!  │
//!  ├─ 1. Input     read UTF-8, strip BOM, normalise newlines
//!  ├─ 2. Locate    fenced + @startuml blocks, overlaps dropped
//!  ├─ 3. Render    java -jar plantuml.jar -tpng, bounded parallelism,
//!  │               existing diagramN.png reused
//!  ├─ 4. Rewrite   ![Diagram N](diagrams/diagramN.png){ width=100% }
//!  ├─ 5. Breaks    bare `---` lines → \newpage (YAML header untouched)
//!  ├─ 6. Escape    $ → \$
//!  └─ 7. Pandoc    font-pair fallback, then Pandoc defaults → book.pdf
//! ```
//!
//! A diagram that fails to render never stops the conversion: it becomes a
//! bold "Diagram N failed to generate" notice in the PDF.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use md2pdf_uml::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // plantuml.jar comes from PLANTUML_JAR or is downloaded on first use.
//!     let config = ConversionConfig::default();
//!     let output = convert("book.md", &config).await?;
//!     println!("{:?}", output.pdf);
//!     eprintln!("diagrams: {} ok / {} failed",
//!         output.stats.total_diagrams - output.stats.failed_diagrams,
//!         output.stats.failed_diagrams);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! md2pdf-uml = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, FontPair, RendererCommand};
pub use convert::{convert, convert_sync, inspect, prepare_markdown};
pub use error::{DiagramError, Md2PdfError};
pub use logging::{ConversionLog, LogLevel};
pub use output::{
    ConversionOutput, ConversionStats, DiagramSummary, DocumentSummary, PdfStatus, RenderResult,
};
pub use pipeline::blocks::{BlockKind, DiagramBlock};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{render_stream, RenderStream};
