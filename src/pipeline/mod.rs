//! Pipeline stages for Markdown + PlantUML to PDF conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ blocks ──▶ render ──▶ rewrite ──▶ pagebreak ──▶ escape ──▶ pandoc
//! (read)   (locate)   (PlantUML)  (images)    (\newpage)    (\$)      (PDF)
//! ```
//!
//! 1. [`input`]     — read the file as UTF-8, strip a BOM, normalise newlines
//! 2. [`blocks`]    — find fenced and `@startuml` diagrams, drop overlaps,
//!    wrap bare sources in start/end markers
//! 3. [`render`]    — one renderer process per diagram, bounded concurrency,
//!    skip diagrams whose image already exists
//! 4. [`rewrite`]   — replace each diagram span with an image reference or a
//!    failure notice
//! 5. [`pagebreak`] — bare `---` lines outside the YAML header become
//!    `\newpage`
//! 6. [`escape`]    — escape `$` so prose is not read as TeX math
//! 7. [`pandoc`]    — PDF conversion with font-pair fallback

pub mod blocks;
pub mod escape;
pub mod input;
pub mod pagebreak;
pub mod pandoc;
pub mod render;
pub mod rewrite;
