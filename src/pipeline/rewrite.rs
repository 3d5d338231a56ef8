//! Substitute each diagram block with its image (or a failure notice).
//!
//! Replacement is by byte span, applied from the end of the document towards
//! the start, so earlier spans stay valid while later ones are rewritten and
//! a block whose text also appears verbatim elsewhere only replaces itself.

use crate::output::RenderResult;
use crate::pipeline::blocks::DiagramBlock;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// `![Diagram N](path){ width=W }` with a forward-slash path.
pub fn image_reference(ordinal: usize, image: &Path, width: &str) -> String {
    let url = image.to_string_lossy().replace('\\', "/");
    format!("![Diagram {ordinal}]({url}){{ width={width} }}")
}

/// Bold inline notice left where a diagram failed to render.
pub fn failure_notice(ordinal: usize, detail: &str) -> String {
    format!("**Diagram {ordinal} failed to generate: {detail}**")
}

fn replacement_for(block: &DiagramBlock, result: Option<&RenderResult>, width: &str) -> String {
    match result {
        Some(RenderResult {
            image: Some(image),
            error: None,
            ..
        }) => image_reference(block.ordinal, image, width),
        Some(RenderResult {
            error: Some(e), ..
        }) => failure_notice(block.ordinal, e.detail()),
        _ => failure_notice(block.ordinal, "no render result"),
    }
}

/// Replace every block's span in `markdown` with its rendered form.
///
/// `blocks` must have been located in this exact `markdown` and must not
/// overlap (see [`crate::pipeline::blocks::resolve_overlaps`]). Results are
/// matched to blocks by ordinal. A block whose span no longer holds its
/// original text, or that overlaps a block already rewritten, is left as is.
pub fn rewrite_document(
    markdown: &str,
    blocks: &[DiagramBlock],
    results: &[RenderResult],
    image_width: &str,
) -> String {
    let by_ordinal: HashMap<usize, &RenderResult> =
        results.iter().map(|r| (r.ordinal, r)).collect();

    let mut order: Vec<&DiagramBlock> = blocks.iter().collect();
    order.sort_by_key(|b| std::cmp::Reverse(b.span.start));

    let mut out = markdown.to_string();
    let mut limit = markdown.len();

    for block in order {
        let span = block.span.clone();
        if span.end > limit {
            warn!(
                "Diagram {} overlaps a later diagram; leaving it unchanged",
                block.ordinal
            );
            continue;
        }
        if markdown.get(span.clone()) != Some(block.original.as_str()) {
            warn!(
                "Diagram {} does not match its recorded span; leaving it unchanged",
                block.ordinal
            );
            continue;
        }

        let replacement = replacement_for(block, by_ordinal.get(&block.ordinal).copied(), image_width);
        out.replace_range(span.clone(), &replacement);
        limit = span.start;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagramError;
    use crate::pipeline::blocks::locate_blocks;
    use std::path::PathBuf;

    fn ok(ordinal: usize, path: &str) -> RenderResult {
        RenderResult::success(ordinal, PathBuf::from(path), false, 0)
    }

    fn failed(ordinal: usize, stderr: &str) -> RenderResult {
        RenderResult::failure(
            DiagramError::RendererFailed {
                ordinal,
                status: Some(1),
                stderr: stderr.to_string(),
            },
            0,
        )
    }

    #[test]
    fn image_reference_format() {
        assert_eq!(
            image_reference(1, Path::new("diagrams/diagram1.png"), "100%"),
            "![Diagram 1](diagrams/diagram1.png){ width=100% }"
        );
    }

    #[test]
    fn image_reference_uses_forward_slashes() {
        let r = image_reference(2, Path::new(r"F:\MD-Proj\diagrams\diagram2.png"), "80%");
        assert_eq!(r, "![Diagram 2](F:/MD-Proj/diagrams/diagram2.png){ width=80% }");
    }

    #[test]
    fn single_fenced_block_becomes_image() {
        let md = "Intro\n\n```plantuml\nA -> B\n```\n\nOutro";
        let blocks = locate_blocks(md);
        let out = rewrite_document(md, &blocks, &[ok(1, "d/diagram1.png")], "100%");
        assert_eq!(out, "Intro\n\n![Diagram 1](d/diagram1.png){ width=100% }\n\nOutro");
        assert_eq!(out.matches("![Diagram").count(), 1);
    }

    #[test]
    fn failure_becomes_bold_notice() {
        let md = "```plantuml\nA\n```\n\n@startuml\nbad\n@enduml";
        let blocks = locate_blocks(md);
        let results = [ok(1, "d/diagram1.png"), failed(2, "Syntax Error? (line 2)")];
        let out = rewrite_document(md, &blocks, &results, "100%");
        assert!(out.contains("![Diagram 1](d/diagram1.png)"));
        assert!(out.contains("**Diagram 2 failed to generate: Syntax Error? (line 2)**"));
        assert!(!out.contains("@startuml"));
    }

    #[test]
    fn results_matched_by_ordinal_not_position() {
        let md = "@startuml\nA\n@enduml\n@startuml\nB\n@enduml";
        let blocks = locate_blocks(md);
        let results = [ok(2, "two.png"), ok(1, "one.png")];
        let out = rewrite_document(md, &blocks, &results, "100%");
        let one = out.find("one.png").unwrap();
        let two = out.find("two.png").unwrap();
        assert!(one < two);
    }

    #[test]
    fn duplicate_text_only_replaces_own_span() {
        let md = "@startuml\nA\n@enduml\n\n@startuml\nA\n@enduml";
        let mut second = locate_blocks(md).remove(1);
        second.ordinal = 1;
        let out = rewrite_document(md, &[second], &[ok(1, "one.png")], "100%");
        assert_eq!(out, "@startuml\nA\n@enduml\n\n![Diagram 1](one.png){ width=100% }");
    }

    #[test]
    fn missing_result_leaves_visible_notice() {
        let md = "@startuml\nA\n@enduml";
        let blocks = locate_blocks(md);
        let out = rewrite_document(md, &blocks, &[], "100%");
        assert_eq!(out, "**Diagram 1 failed to generate: no render result**");
    }

    #[test]
    fn stale_span_is_left_alone() {
        let md = "@startuml\nA\n@enduml";
        let blocks = locate_blocks(md);
        let other = "something else entirely, much longer than before";
        let out = rewrite_document(other, &blocks, &[ok(1, "x.png")], "100%");
        assert_eq!(out, other);
    }

    #[test]
    fn no_blocks_is_identity() {
        let md = "# Nothing here\n";
        assert_eq!(rewrite_document(md, &[], &[], "100%"), md);
    }
}
