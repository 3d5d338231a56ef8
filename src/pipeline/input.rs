//! Input loading: read a Markdown file into a normalised `String`.
//!
//! The text is decoded as strict UTF-8. A leading byte-order mark is dropped
//! and CRLF / lone CR line endings become `\n`, so every later stage (block
//! location, page breaks, span rewriting) sees one line-ending convention.

use crate::error::Md2PdfError;
use std::path::Path;
use tracing::debug;

const UTF8_BOM: char = '\u{feff}';

/// Read `path` as UTF-8 Markdown with normalised line endings.
pub async fn read_markdown(path: &Path) -> Result<String, Md2PdfError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Md2PdfError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Md2PdfError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let text = String::from_utf8(bytes).map_err(|e| Md2PdfError::NotUtf8 {
        path: path.to_path_buf(),
        offset: e.utf8_error().valid_up_to(),
    })?;

    debug!("Read {} bytes from {}", text.len(), path.display());
    Ok(normalise(&text))
}

/// Strip a BOM and convert `\r\n` / `\r` line endings to `\n`.
pub fn normalise(text: &str) -> String {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}
