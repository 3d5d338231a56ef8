//! Streaming render API: emit diagram results as they complete.
//!
//! Unlike the eager [`crate::convert::convert`], which returns only after
//! every diagram is rendered and the PDF is built, [`render_stream`] yields
//! each [`RenderResult`] as soon as its renderer process exits. Results
//! arrive in completion order; sort by `ordinal` if order matters.
//!
//! The stream only renders. Rewriting the document and running Pandoc is
//! left to the caller (or to [`crate::convert`]).

use crate::config::ConversionConfig;
use crate::error::Md2PdfError;
use crate::output::RenderResult;
use crate::pipeline::{blocks, input, render};
use futures::stream;
use std::path::Path;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of render results.
pub type RenderStream = Pin<Box<dyn Stream<Item = RenderResult> + Send>>;

/// Render every diagram in `input`, streaming results as they are ready.
///
/// # Returns
/// - `Ok(RenderStream)`: one item per diagram, failures included
/// - `Err(Md2PdfError)`: fatal error (unreadable input, PlantUML missing)
pub async fn render_stream(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<RenderStream, Md2PdfError> {
    let input = input.as_ref();
    info!("Starting streaming render: {}", input.display());

    let markdown = input::read_markdown(input).await?;
    let (diagrams, _) = blocks::resolve_overlaps(blocks::locate_blocks(&markdown));

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(diagrams.len());
    }
    if diagrams.is_empty() {
        return Ok(Box::pin(stream::empty::<RenderResult>()));
    }

    let renderer = render::resolve_renderer(config).await?;
    let s = render::render_unordered(
        &diagrams,
        renderer,
        &config.diagrams_dir_for(input),
        config,
        config.log_sink(),
    )
    .await?;

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererCommand;
    use futures::StreamExt;

    #[tokio::test]
    async fn empty_document_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.md");
        std::fs::write(&input, "# No diagrams\n").unwrap();
        // No renderer configured: resolution must not be attempted.
        let config = ConversionConfig::builder()
            .plantuml_jar("/definitely/not/plantuml.jar")
            .build()
            .unwrap();
        let results: Vec<_> = render_stream(&input, &config).await.unwrap().collect().await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn yields_one_result_per_diagram() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.md");
        std::fs::write(&input, "@startuml\nA\n@enduml\n\n@startuml\nB\n@enduml\n").unwrap();
        let config = ConversionConfig::builder()
            .renderer(RendererCommand::new(
                "/definitely/not/a/renderer",
                Vec::<String>::new(),
            ))
            .diagrams_dir(dir.path().join("d"))
            .build()
            .unwrap();

        let mut ordinals: Vec<usize> = render_stream(&input, &config)
            .await
            .unwrap()
            .map(|r| r.ordinal)
            .collect()
            .await;
        ordinals.sort_unstable();
        assert_eq!(ordinals, vec![1, 2]);
    }
}
