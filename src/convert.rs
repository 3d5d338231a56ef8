//! Eager (whole-document) conversion entry points.
//!
//! [`convert`] runs every stage and waits for the PDF. [`prepare_markdown`]
//! stops after writing the rewritten Markdown, and [`inspect`] only reads
//! the document. Use [`crate::stream::render_stream`] instead when you want
//! diagram results as they finish.

use crate::config::ConversionConfig;
use crate::error::Md2PdfError;
use crate::logging::ConversionLog;
use crate::output::{
    ConversionOutput, ConversionStats, DiagramSummary, DocumentSummary, PdfStatus,
};
use crate::pipeline::{blocks, escape, input, pagebreak, pandoc, render, rewrite};
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Convert a Markdown file with PlantUML diagrams to PDF.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ConversionOutput)` once the pipeline has run, even if some diagrams
/// failed or no PDF was produced: check `output.stats.failed_diagrams` and
/// `output.pdf`. A converter that is not installed is reported as
/// [`PdfStatus::ToolNotFound`].
///
/// # Errors
/// Returns `Err(Md2PdfError)` only for fatal errors:
/// - input missing, unreadable or not UTF-8
/// - PlantUML unavailable while the document has diagrams
/// - output directory or intermediate file cannot be written
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let total_start = Instant::now();
    let input = input.as_ref();
    let log = config.log_sink();

    let mut output = prepare(input, config, &log).await?;

    // ── Convert to PDF ───────────────────────────────────────────────────
    log.info("\n--- Starting Pandoc conversion ---");
    let pdf_path = config.pdf_path_for(input);
    let pdf_start = Instant::now();

    output.pdf = match pandoc::run_with_font_fallback(&output.intermediate, &pdf_path, config, &log)
        .await
    {
        Ok(outcome) => {
            output.stats.pdf_attempts = outcome.attempts;
            if !outcome.succeeded() {
                log.error("Pandoc failed to generate PDF");
                PdfStatus::ConverterFailed {
                    exit_status: outcome.exit_status,
                }
            } else if pdf_path.exists() {
                log.info(format!("PDF successfully generated: {}", pdf_path.display()));
                PdfStatus::Generated {
                    path: pdf_path,
                    fonts: outcome.fonts,
                }
            } else {
                log.error("PDF was not created. Check Pandoc/LaTeX setup.");
                PdfStatus::Missing { path: pdf_path }
            }
        }
        Err(Md2PdfError::ToolNotFound { tool, .. }) => {
            log.error("Pandoc failed to generate PDF");
            PdfStatus::ToolNotFound { tool }
        }
        Err(e) => return Err(e),
    };
    output.stats.pdf_duration_ms = pdf_start.elapsed().as_millis() as u64;

    finish(&mut output, config, &log, total_start);
    Ok(output)
}

/// Run every stage except the PDF converter.
///
/// The rewritten Markdown is still written to the intermediate path, so it
/// can be fed to Pandoc (or anything else) by hand. `output.pdf` is
/// [`PdfStatus::NotRequested`].
pub async fn prepare_markdown(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let total_start = Instant::now();
    let log = config.log_sink();
    let mut output = prepare(input.as_ref(), config, &log).await?;
    finish(&mut output, config, &log, total_start);
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// Describe what a conversion would do without launching any process.
pub async fn inspect(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<DocumentSummary, Md2PdfError> {
    let input = input.as_ref();
    let markdown = input::read_markdown(input).await?;
    let diagrams_dir = config.diagrams_dir_for(input);

    let located = blocks::locate_blocks(&markdown);
    let (kept, dropped) = blocks::resolve_overlaps(located);

    let diagrams = kept
        .iter()
        .map(|b| DiagramSummary {
            ordinal: b.ordinal,
            kind: b.kind,
            line: blocks::line_of(&markdown, b.span.start),
            start: b.span.start,
            end: b.span.end,
            image_exists: render::image_path(&diagrams_dir, b.ordinal).exists(),
        })
        .collect();

    let (header, _) = pagebreak::split_front_matter(&markdown);

    Ok(DocumentSummary {
        input: input.to_path_buf(),
        has_front_matter: !header.is_empty(),
        diagrams,
        overlapping: dropped.len(),
        page_breaks: pagebreak::count_page_breaks(&markdown),
        unescaped_dollars: escape::count_unescaped_dollars(&markdown),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Read, render, rewrite and write the intermediate Markdown.
async fn prepare(
    input: &Path,
    config: &ConversionConfig,
    log: &std::sync::Arc<ConversionLog>,
) -> Result<ConversionOutput, Md2PdfError> {
    log.info("Starting diagram extraction and conversion...");
    info!("Converting {}", input.display());

    // ── Step 1: Read input ───────────────────────────────────────────────
    let markdown = input::read_markdown(input).await?;

    // ── Step 2: Locate diagrams ──────────────────────────────────────────
    let located = blocks::locate_blocks(&markdown);
    let (diagrams, dropped) = blocks::resolve_overlaps(located);
    for d in &dropped {
        log.warn(format!(
            "Ignoring {} diagram at line {}: it overlaps another diagram",
            d.kind,
            blocks::line_of(&markdown, d.span.start)
        ));
    }

    let total = diagrams.len();
    log.info(format!("Found {total} UML diagrams."));
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total);
    }

    // ── Step 3: Render ───────────────────────────────────────────────────
    let render_start = Instant::now();
    let results = if total == 0 {
        log.warn("No diagrams found. Skipping PlantUML generation.");
        Vec::new()
    } else {
        let renderer = render::resolve_renderer(config).await?;
        let diagrams_dir = config.diagrams_dir_for(input);
        log.info(format!("Using {} parallel processes...", config.concurrency));
        render::render_blocks(
            &diagrams,
            renderer,
            &diagrams_dir,
            config,
            std::sync::Arc::clone(log),
        )
        .await?
    };
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    // ── Step 4: Rewrite ──────────────────────────────────────────────────
    let mut text = rewrite::rewrite_document(&markdown, &diagrams, &results, &config.image_width);

    let page_breaks = if config.page_breaks {
        let n = pagebreak::count_page_breaks(&text);
        text = pagebreak::apply_page_breaks(&text);
        n
    } else {
        0
    };

    if config.escape_math {
        text = escape::escape_unescaped_dollars(&text);
    }

    // ── Step 5: Write intermediate Markdown ──────────────────────────────
    let intermediate = config.intermediate_path_for(input);
    write_atomic(&intermediate, &text)?;
    debug!("Wrote intermediate Markdown to {}", intermediate.display());

    let cached = results.iter().filter(|r| r.is_success() && r.cached).count();
    let succeeded = results.iter().filter(|r| r.is_success()).count();

    let stats = ConversionStats {
        total_diagrams: total,
        rendered_diagrams: succeeded - cached,
        cached_diagrams: cached,
        failed_diagrams: total - succeeded,
        discarded_overlaps: dropped.len(),
        page_breaks,
        render_duration_ms,
        ..Default::default()
    };

    Ok(ConversionOutput {
        markdown: text,
        intermediate,
        diagrams: results,
        pdf: PdfStatus::NotRequested,
        stats,
    })
}

fn finish(
    output: &mut ConversionOutput,
    config: &ConversionConfig,
    log: &ConversionLog,
    total_start: Instant,
) {
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    log.info("Conversion process completed.");
    info!(
        "Conversion complete: {}/{} diagrams, {}ms total",
        output.stats.total_diagrams - output.stats.failed_diagrams,
        output.stats.total_diagrams,
        output.stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(
            output.stats.total_diagrams,
            output.stats.total_diagrams - output.stats.failed_diagrams,
        );
    }
}

/// Write `contents` to `path` via a temp file in the same directory, so a
/// reader never sees a half-written file.
fn write_atomic(path: &Path, contents: &str) -> Result<(), Md2PdfError> {
    let write_err = |e: std::io::Error| Md2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererCommand;

    fn offline_config(dir: &Path) -> ConversionConfig {
        ConversionConfig::builder()
            .renderer(RendererCommand::new(
                "/definitely/not/a/renderer",
                Vec::<String>::new(),
            ))
            .converter("/definitely/not/pandoc")
            .diagrams_dir(dir.join("diagrams"))
            .build()
            .unwrap()
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.md");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[tokio::test]
    async fn inspect_reports_diagrams_and_breaks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("book.md");
        std::fs::write(
            &input,
            "---\ntitle: T\n---\n# One\n\n```plantuml\nA -> B\n```\n\n---\n\nCosts $5\n\n@startuml\nC\n@enduml\n",
        )
        .unwrap();
        let config = offline_config(dir.path());
        std::fs::create_dir_all(dir.path().join("diagrams")).unwrap();
        std::fs::write(dir.path().join("diagrams/diagram2.png"), b"png").unwrap();

        let summary = inspect(&input, &config).await.unwrap();
        assert!(summary.has_front_matter);
        assert_eq!(summary.diagrams.len(), 2);
        assert_eq!(summary.diagrams[0].line, 6);
        assert!(!summary.diagrams[0].image_exists);
        assert!(summary.diagrams[1].image_exists);
        assert_eq!(summary.page_breaks, 1);
        assert_eq!(summary.unescaped_dollars, 1);
        assert_eq!(summary.overlapping, 0);
    }

    #[tokio::test]
    async fn inspect_counts_overlaps() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.md");
        std::fs::write(&input, "```plantuml\n@startuml\nA\n@enduml\n```\n").unwrap();
        let summary = inspect(&input, &offline_config(dir.path())).await.unwrap();
        assert_eq!(summary.diagrams.len(), 1);
        assert_eq!(summary.overlapping, 1);
    }

    #[tokio::test]
    async fn zero_diagrams_still_transforms_text() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.md");
        std::fs::write(&input, "Intro $5\n---\nNext\n").unwrap();
        let config = offline_config(dir.path());

        let out = convert(&input, &config).await.unwrap();
        assert_eq!(out.markdown, "Intro \\$5\n\n\\newpage\n\nNext\n");
        assert_eq!(out.stats.total_diagrams, 0);
        assert_eq!(out.stats.page_breaks, 1);
        assert!(!dir.path().join("diagrams").exists());
        assert_eq!(
            out.pdf,
            PdfStatus::ToolNotFound {
                tool: "/definitely/not/pandoc".into()
            }
        );
        assert_eq!(out.stats.pdf_attempts, 0);
        let written = std::fs::read_to_string(dir.path().join("doc_tmp.md")).unwrap();
        assert_eq!(written, out.markdown);
    }

    #[tokio::test]
    async fn prepare_markdown_skips_converter() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.md");
        std::fs::write(&input, "@startuml\nA\n@enduml\n").unwrap();
        let config = offline_config(dir.path());

        let out = prepare_markdown(&input, &config).await.unwrap();
        assert_eq!(out.pdf, PdfStatus::NotRequested);
        assert_eq!(out.stats.failed_diagrams, 1);
        assert!(out.markdown.starts_with("**Diagram 1 failed to generate: "));
    }

    #[tokio::test]
    async fn disabled_transforms_pass_text_through() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.md");
        std::fs::write(&input, "A $ sign\n---\n").unwrap();
        let config = ConversionConfig::builder()
            .page_breaks(false)
            .escape_math(false)
            .build()
            .unwrap();
        let out = prepare_markdown(&input, &config).await.unwrap();
        assert_eq!(out.markdown, "A $ sign\n---\n");
    }

    #[test]
    fn convert_sync_runs_outside_a_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.md");
        std::fs::write(&input, "Plain text\n").unwrap();
        let out = convert_sync(&input, &offline_config(dir.path())).unwrap();
        assert_eq!(out.markdown, "Plain text\n");
        assert!(matches!(out.pdf, PdfStatus::ToolNotFound { .. }));
    }

    #[test]
    fn inspect_from_blocking_code() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.md");
        std::fs::write(&input, "```plantuml\nA\n```\n").unwrap();
        let config = offline_config(dir.path());
        let summary = tokio_test::block_on(inspect(&input, &config)).unwrap();
        assert_eq!(summary.diagrams.len(), 1);
        tokio_test::assert_err!(tokio_test::block_on(inspect("/nonexistent/doc.md", &config)));
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let config = ConversionConfig::default();
        let err = convert("/nonexistent/book.md", &config).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::FileNotFound { .. }));
    }
}
