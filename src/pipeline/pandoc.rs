//! PDF conversion: drive Pandoc over a list of font pairs.
//!
//! XeLaTeX aborts when a requested font is not installed, and which fonts a
//! machine has varies wildly. Each configured `(mainfont, monofont)` pair is
//! tried in order; the first attempt that exits 0 *and* leaves a PDF behind
//! wins. If none does, one last attempt runs with Pandoc's own defaults and
//! its exit status is reported as-is.

use crate::config::{ConversionConfig, FontPair};
use crate::error::{Md2PdfError, TOOL_NOT_FOUND_STATUS};
use crate::logging::ConversionLog;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Shell convention for "found but could not be executed".
const CANNOT_EXECUTE_STATUS: i32 = 126;

/// Result of [`run_with_font_fallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PandocOutcome {
    /// Exit status of the attempt that decided the outcome. A process killed
    /// by a signal reports -1.
    pub exit_status: i32,
    /// Font pair of the successful attempt; `None` when the defaults were
    /// used or nothing succeeded.
    pub fonts: Option<FontPair>,
    /// Number of converter invocations.
    pub attempts: usize,
}

impl PandocOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }
}

/// Locate `name` on the process `PATH`.
pub fn resolve_executable(name: &str) -> Option<PathBuf> {
    resolve_executable_in(name, std::env::var_os("PATH").as_deref())
}

/// Locate `name` on an explicit `PATH`-style list.
///
/// A name containing a path separator is checked as-is instead of being
/// searched for.
pub fn resolve_executable_in(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let path = Path::new(name);
    if path.is_absolute() || path.components().count() > 1 {
        return is_executable(path).then(|| path.to_path_buf());
    }

    let path_var = path_var?;
    for dir in std::env::split_paths(path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if is_executable(&exe) {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Convert `markdown` to `pdf`, retrying with each configured font pair.
///
/// # Errors
/// [`Md2PdfError::ToolNotFound`] when the converter cannot be resolved; no
/// attempt is made in that case.
pub async fn run_with_font_fallback(
    markdown: &Path,
    pdf: &Path,
    config: &ConversionConfig,
    log: &ConversionLog,
) -> Result<PandocOutcome, Md2PdfError> {
    let Some(program) = resolve_executable(&config.converter) else {
        log.error(format!("'{}' not found in PATH.", config.converter));
        return Err(Md2PdfError::ToolNotFound {
            tool: config.converter.clone(),
            hint: "Install Pandoc (https://pandoc.org/installing.html) or pass --pandoc /path/to/pandoc."
                .to_string(),
        });
    };
    debug!("Using converter {}", program.display());

    let mut attempts = 0;
    for fonts in &config.font_pairs {
        attempts += 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_pdf_attempt(attempts, Some(fonts));
        }
        log.info(format!(
            "Trying fonts -> mainfont='{}', monofont='{}'",
            fonts.main, fonts.mono
        ));

        let status = invoke(&program, markdown, pdf, &config.pdf_engine, Some(fonts), log).await;
        if status == 0 && pdf.exists() {
            log.info(format!("PDF successfully generated with fonts: {fonts}"));
            return Ok(PandocOutcome {
                exit_status: 0,
                fonts: Some(fonts.clone()),
                attempts,
            });
        }
        log.warn(format!("Pandoc attempt failed with fonts: {fonts}"));
    }

    attempts += 1;
    if let Some(ref cb) = config.progress_callback {
        cb.on_pdf_attempt(attempts, None);
    }
    log.info("Falling back to Pandoc defaults (no explicit fonts).");
    let exit_status = invoke(&program, markdown, pdf, &config.pdf_engine, None, log).await;

    Ok(PandocOutcome {
        exit_status,
        fonts: None,
        attempts,
    })
}

/// One converter run. Returns its exit status.
async fn invoke(
    program: &Path,
    markdown: &Path,
    pdf: &Path,
    engine: &str,
    fonts: Option<&FontPair>,
    log: &ConversionLog,
) -> i32 {
    let mut cmd = Command::new(program);
    cmd.arg(markdown)
        .arg("-o")
        .arg(pdf)
        .arg(format!("--pdf-engine={engine}"))
        .stdin(Stdio::null());
    if let Some(f) = fonts {
        cmd.arg("-V")
            .arg(format!("mainfont={}", f.main))
            .arg("-V")
            .arg(format!("monofont={}", f.mono));
    }

    match cmd.output().await {
        Ok(output) => {
            log.record_output(
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
            );
            output.status.code().unwrap_or(-1)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log.error(format!("Failed to launch {}: {e}", program.display()));
            TOOL_NOT_FOUND_STATUS
        }
        Err(e) => {
            log.error(format!("Failed to launch {}: {e}", program.display()));
            CANNOT_EXECUTE_STATUS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn empty_name_never_resolves() {
        assert_eq!(resolve_executable_in("", Some(OsStr::new("/usr/bin"))), None);
    }

    #[test]
    fn no_path_variable_resolves_nothing() {
        assert_eq!(resolve_executable_in("pandoc", None), None);
    }

    #[test]
    fn missing_absolute_path_is_none() {
        assert_eq!(
            resolve_executable_in("/definitely/not/pandoc", Some(OsStr::new("/usr/bin"))),
            None
        );
    }

    #[cfg(unix)]
    #[test]
    fn searches_path_entries_in_order() {
        use std::os::unix::fs::PermissionsExt;

        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for dir in [first.path(), second.path()] {
            let exe = dir.join("fake-pandoc");
            std::fs::write(&exe, "#!/bin/sh\nexit 0\n").unwrap();
            std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let path_var: OsString =
            std::env::join_paths([first.path(), second.path()]).unwrap();

        let found = resolve_executable_in("fake-pandoc", Some(&path_var)).unwrap();
        assert_eq!(found, first.path().join("fake-pandoc"));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pandoc"), "not a program").unwrap();
        assert_eq!(
            resolve_executable_in("pandoc", Some(dir.path().as_os_str())),
            None
        );
    }

    #[tokio::test]
    async fn missing_converter_makes_no_attempt() {
        let config = ConversionConfig::builder()
            .converter("/definitely/not/pandoc")
            .build()
            .unwrap();
        let err = run_with_font_fallback(
            Path::new("in.md"),
            Path::new("out.pdf"),
            &config,
            &ConversionLog::disabled(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.exit_status(), TOOL_NOT_FOUND_STATUS);
    }
}
