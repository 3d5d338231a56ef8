//! Diagram rendering: one external renderer process per block.
//!
//! Each render starts a JVM, so jobs run on tokio tasks with at most
//! `config.concurrency` in flight at once (`buffer_unordered`), each task
//! blocked on its own child process. Jobs share nothing but the
//! [`ConversionLog`]; every job writes `diagramN.puml` / `diagramN.png`
//! with its own ordinal, so there is no file contention.
//!
//! A failed or panicking job becomes a failed [`RenderResult`]; it never
//! takes down its siblings.

use crate::config::{ConversionConfig, RendererCommand};
use crate::error::{DiagramError, Md2PdfError};
use crate::logging::{ConversionLog, LogLevel};
use crate::output::RenderResult;
use crate::pipeline::blocks::{ensure_wrapped, DiagramBlock};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Image written by the renderer for diagram `ordinal`.
pub fn image_path(diagrams_dir: &Path, ordinal: usize) -> PathBuf {
    diagrams_dir.join(format!("diagram{ordinal}.png"))
}

/// Source file handed to the renderer for diagram `ordinal`.
pub fn source_path(diagrams_dir: &Path, ordinal: usize) -> PathBuf {
    diagrams_dir.join(format!("diagram{ordinal}.puml"))
}

/// Work out the renderer invocation, from most to least specific:
/// explicit command, configured jar, `PLANTUML_JAR`, plantuml-auto cache
/// (downloading the jar on first use).
pub async fn resolve_renderer(config: &ConversionConfig) -> Result<RendererCommand, Md2PdfError> {
    if let Some(ref cmd) = config.renderer {
        return Ok(cmd.clone());
    }

    let jar = match config.plantuml_jar {
        Some(ref jar) => jar.clone(),
        None => tokio::task::spawn_blocking(|| plantuml_auto::ensure_plantuml_jar(None))
            .await
            .map_err(|e| Md2PdfError::Internal(format!("Jar lookup task panicked: {e}")))?
            .map_err(|e| Md2PdfError::RendererUnavailable(e.to_string()))?,
    };

    let java = config
        .java
        .clone()
        .unwrap_or_else(plantuml_auto::java_command);

    Ok(RendererCommand::plantuml(java, &jar))
}

/// State shared by every render task.
struct RenderContext {
    renderer: RendererCommand,
    diagrams_dir: PathBuf,
    skip_existing: bool,
    total: usize,
    log: Arc<ConversionLog>,
    progress: Option<ProgressCallback>,
}

/// Render every block, returning one result per block sorted by ordinal.
///
/// # Errors
/// Only when `diagrams_dir` cannot be created; per-diagram failures are
/// reported inside the results.
pub async fn render_blocks(
    blocks: &[DiagramBlock],
    renderer: RendererCommand,
    diagrams_dir: &Path,
    config: &ConversionConfig,
    log: Arc<ConversionLog>,
) -> Result<Vec<RenderResult>, Md2PdfError> {
    let mut results: Vec<RenderResult> =
        render_unordered(blocks, renderer, diagrams_dir, config, log)
            .await?
            .collect()
            .await;
    results.sort_by_key(|r| r.ordinal);
    Ok(results)
}

/// Like [`render_blocks`] but yields results as jobs finish.
pub(crate) async fn render_unordered(
    blocks: &[DiagramBlock],
    renderer: RendererCommand,
    diagrams_dir: &Path,
    config: &ConversionConfig,
    log: Arc<ConversionLog>,
) -> Result<impl futures::Stream<Item = RenderResult> + Send + 'static, Md2PdfError> {
    tokio::fs::create_dir_all(diagrams_dir)
        .await
        .map_err(|e| Md2PdfError::OutputWriteFailed {
            path: diagrams_dir.to_path_buf(),
            source: e,
        })?;

    let ctx = Arc::new(RenderContext {
        renderer,
        diagrams_dir: diagrams_dir.to_path_buf(),
        skip_existing: config.skip_existing,
        total: blocks.len(),
        log,
        progress: config.progress_callback.clone(),
    });

    let jobs: Vec<(usize, String)> = blocks.iter().map(|b| (b.ordinal, b.code.clone())).collect();

    Ok(stream::iter(jobs)
        .map(move |(ordinal, code)| {
            let ctx = Arc::clone(&ctx);
            async move {
                let start = Instant::now();
                match tokio::spawn(render_one(Arc::clone(&ctx), ordinal, code)).await {
                    Ok(result) => result,
                    Err(join_err) => {
                        let detail = if join_err.is_panic() {
                            panic_message(join_err.into_panic())
                        } else {
                            join_err.to_string()
                        };
                        ctx.log
                            .error(format!("Exception generating diagram {ordinal}: {detail}"));
                        if let Some(ref cb) = ctx.progress {
                            cb.on_diagram_error(ordinal, ctx.total, &detail);
                        }
                        RenderResult::failure(
                            DiagramError::TaskAborted { ordinal, detail },
                            start.elapsed().as_millis() as u64,
                        )
                    }
                }
            }
        })
        .buffer_unordered(config.concurrency.max(1)))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "render task panicked".to_string()
    }
}

/// Render a single diagram.
async fn render_one(ctx: Arc<RenderContext>, ordinal: usize, code: String) -> RenderResult {
    let start = Instant::now();
    let elapsed = || start.elapsed().as_millis() as u64;
    let image = image_path(&ctx.diagrams_dir, ordinal);

    if let Some(ref cb) = ctx.progress {
        cb.on_diagram_start(ordinal, ctx.total);
    }

    if ctx.skip_existing && tokio::fs::try_exists(&image).await.unwrap_or(false) {
        ctx.log.info(format!(
            "Diagram {ordinal} already exists, skipping: {}",
            image.display()
        ));
        if let Some(ref cb) = ctx.progress {
            cb.on_diagram_complete(ordinal, ctx.total, &image, true);
        }
        return RenderResult::success(ordinal, image, true, elapsed());
    }

    let source = source_path(&ctx.diagrams_dir, ordinal);
    if let Err(e) = tokio::fs::write(&source, ensure_wrapped(&code)).await {
        let detail = format!("{}: {e}", source.display());
        return fail(&ctx, DiagramError::SourceWriteFailed { ordinal, detail }, elapsed());
    }

    debug!(
        "Diagram {}: {} {:?} {}",
        ordinal,
        ctx.renderer.program,
        ctx.renderer.args,
        source.display()
    );

    let output = Command::new(&ctx.renderer.program)
        .args(&ctx.renderer.args)
        .arg(&source)
        .stdin(Stdio::null())
        .output()
        .await;

    let output = match output {
        Ok(o) => o,
        Err(e) => {
            let detail = format!("{}: {e}", ctx.renderer.program);
            return fail(&ctx, DiagramError::SpawnFailed { ordinal, detail }, elapsed());
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    // One entry per diagram keeps a job's output contiguous in the log.
    let mut entry = format!("\n--- PlantUML Diagram {ordinal} ---");
    for stream in [stdout.trim_end(), stderr.trim_end()] {
        if !stream.trim().is_empty() {
            entry.push('\n');
            entry.push_str(stream);
        }
    }

    if output.status.success() {
        entry.push_str(&format!("\nDiagram {ordinal} generated: {}", image.display()));
        ctx.log.record(LogLevel::Info, entry);
        if let Some(ref cb) = ctx.progress {
            cb.on_diagram_complete(ordinal, ctx.total, &image, false);
        }
        RenderResult::success(ordinal, image, false, elapsed())
    } else {
        let status = output.status.code();
        entry.push_str(&format!(
            "\nError generating diagram {ordinal} (exit code {})",
            status.map_or_else(|| "none".to_string(), |c| c.to_string())
        ));
        ctx.log.record(LogLevel::Error, entry);
        let error = DiagramError::RendererFailed {
            ordinal,
            status,
            stderr: stderr.trim().to_string(),
        };
        if let Some(ref cb) = ctx.progress {
            cb.on_diagram_error(ordinal, ctx.total, &error.to_string());
        }
        RenderResult::failure(error, elapsed())
    }
}

fn fail(ctx: &RenderContext, error: DiagramError, duration_ms: u64) -> RenderResult {
    let ordinal = error.ordinal();
    ctx.log.error(format!(
        "Exception generating diagram {ordinal}: {}",
        error.detail()
    ));
    if let Some(ref cb) = ctx.progress {
        cb.on_diagram_error(ordinal, ctx.total, &error.to_string());
    }
    RenderResult::failure(error, duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::blocks::locate_blocks;

    fn config_with(renderer: RendererCommand) -> ConversionConfig {
        ConversionConfig::builder()
            .renderer(renderer)
            .concurrency(2)
            .build()
            .unwrap()
    }

    #[test]
    fn artefact_paths_use_ordinal() {
        let dir = Path::new("out");
        assert_eq!(image_path(dir, 3), PathBuf::from("out/diagram3.png"));
        assert_eq!(source_path(dir, 3), PathBuf::from("out/diagram3.puml"));
    }

    #[tokio::test]
    async fn explicit_renderer_wins() {
        let cmd = RendererCommand::new("my-renderer", ["--png"]);
        let config = config_with(cmd.clone());
        assert_eq!(resolve_renderer(&config).await.unwrap(), cmd);
    }

    #[tokio::test]
    async fn configured_jar_builds_java_command() {
        let config = ConversionConfig::builder()
            .plantuml_jar("/opt/plantuml.jar")
            .java("/usr/bin/java")
            .build()
            .unwrap();
        let cmd = resolve_renderer(&config).await.unwrap();
        assert_eq!(cmd.program, "/usr/bin/java");
        assert_eq!(cmd.args, vec!["-jar", "/opt/plantuml.jar", "-tpng"]);
    }

    #[tokio::test]
    async fn existing_images_skip_the_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let md = "@startuml\nA\n@enduml\n@startuml\nB\n@enduml";
        let blocks = locate_blocks(md);
        for b in &blocks {
            std::fs::write(image_path(dir.path(), b.ordinal), b"png").unwrap();
        }
        // A renderer that cannot exist: any launch would fail the block.
        let cmd = RendererCommand::new("/definitely/not/a/renderer", Vec::<String>::new());
        let config = config_with(cmd.clone());
        let results = render_blocks(
            &blocks,
            cmd,
            dir.path(),
            &config,
            Arc::new(ConversionLog::disabled()),
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_success() && r.cached));
        assert!(!source_path(dir.path(), 1).exists());
    }

    #[tokio::test]
    async fn missing_renderer_fails_each_block_independently() {
        let dir = tempfile::tempdir().unwrap();
        let md = "```plantuml\nA\n```\n@startuml\nB\n@enduml";
        let blocks = locate_blocks(md);
        let cmd = RendererCommand::new("/definitely/not/a/renderer", Vec::<String>::new());
        let config = config_with(cmd.clone());
        let results = render_blocks(
            &blocks,
            cmd,
            dir.path(),
            &config,
            Arc::new(ConversionLog::disabled()),
        )
        .await
        .unwrap();
        assert_eq!(results.iter().map(|r| r.ordinal).collect::<Vec<_>>(), vec![1, 2]);
        for r in &results {
            assert!(matches!(r.error, Some(DiagramError::SpawnFailed { .. })));
        }
        // The normalised source was still written before the launch attempt.
        let src = std::fs::read_to_string(source_path(dir.path(), 1)).unwrap();
        assert_eq!(src, "@startuml\nA\n@enduml");
    }

    struct PanicsOn(usize);

    impl crate::progress::ConversionProgressCallback for PanicsOn {
        fn on_diagram_start(&self, ordinal: usize, _total: usize) {
            if ordinal == self.0 {
                panic!("callback exploded on {ordinal}");
            }
        }
    }

    #[tokio::test]
    async fn panicking_task_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let md = "@startuml\nA\n@enduml\n@startuml\nB\n@enduml\n@startuml\nC\n@enduml";
        let blocks = locate_blocks(md);
        for ordinal in [1, 3] {
            std::fs::write(image_path(dir.path(), ordinal), b"png").unwrap();
        }
        let cmd = RendererCommand::new("/definitely/not/a/renderer", Vec::<String>::new());
        let config = ConversionConfig::builder()
            .renderer(cmd.clone())
            .concurrency(3)
            .progress_callback(Arc::new(PanicsOn(2)))
            .build()
            .unwrap();

        let results = render_blocks(
            &blocks,
            cmd,
            dir.path(),
            &config,
            Arc::new(ConversionLog::disabled()),
        )
        .await
        .unwrap();

        assert_eq!(results.iter().map(|r| r.ordinal).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(results[0].is_success() && results[0].cached);
        assert!(results[2].is_success() && results[2].cached);
        match &results[1].error {
            Some(DiagramError::TaskAborted { ordinal, detail }) => {
                assert_eq!(*ordinal, 2);
                assert_eq!(detail, "callback exploded on 2");
            }
            other => panic!("expected TaskAborted, got {other:?}"),
        }
    }

    #[test]
    fn panic_message_extracts_strings() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "render task panicked");
    }
}
