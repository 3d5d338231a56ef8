//! Configuration types for Markdown-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every knob lives in one struct so it
//! can be cloned into render tasks and logged as a whole.
//!
//! Paths that are not set explicitly are derived from the input document's
//! location (see [`ConversionConfig::pdf_path_for`] and friends).

use crate::error::Md2PdfError;
use crate::logging::ConversionLog;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upper bound on parallel renderer processes. Each PlantUML render is a
/// full JVM start, so more than a handful just thrashes memory.
pub const MAX_DEFAULT_CONCURRENCY: usize = 6;

/// Configuration for a Markdown-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use md2pdf_uml::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .concurrency(4)
///     .plantuml_jar("/opt/plantuml/plantuml.jar")
///     .converter("pandoc")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Final PDF path. Default: the input path with a `.pdf` extension.
    pub output: Option<PathBuf>,

    /// Directory receiving `diagramN.puml` / `diagramN.png`.
    /// Default: `diagrams/` next to the input file.
    pub diagrams_dir: Option<PathBuf>,

    /// Rewritten Markdown handed to the converter.
    /// Default: `<stem>_tmp.md` next to the input file.
    pub intermediate: Option<PathBuf>,

    /// Fully custom renderer invocation. Takes precedence over
    /// `plantuml_jar` / `java`.
    pub renderer: Option<RendererCommand>,

    /// Path to `plantuml.jar`. If None, `PLANTUML_JAR` or the plantuml-auto
    /// cache is used.
    pub plantuml_jar: Option<PathBuf>,

    /// Java launcher. If None, `$JAVA_HOME/bin/java` or `java`.
    pub java: Option<String>,

    /// Maximum renderer processes running at once.
    /// Default: `min(available_parallelism, 6)`.
    pub concurrency: usize,

    /// Reuse `diagramN.png` when it already exists. Default: true.
    ///
    /// The cache is keyed by ordinal only: editing a diagram's source without
    /// deleting its image keeps serving the stale image.
    pub skip_existing: bool,

    /// Converter executable name or path. Default: `pandoc`.
    pub converter: String,

    /// Value passed as `--pdf-engine=`. Default: `xelatex`.
    pub pdf_engine: String,

    /// Font pairs tried in order before falling back to converter defaults.
    pub font_pairs: Vec<FontPair>,

    /// Display width attached to every diagram image. Default: `100%`.
    pub image_width: String,

    /// Turn bare `---` lines into `\newpage`. Default: true.
    pub page_breaks: bool,

    /// Escape unescaped `$` so LaTeX does not enter math mode. Default: true.
    pub escape_math: bool,

    /// Optional per-diagram progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Shared conversion log. If None, lines only go to `tracing`.
    pub log: Option<Arc<ConversionLog>>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output: None,
            diagrams_dir: None,
            intermediate: None,
            renderer: None,
            plantuml_jar: None,
            java: None,
            concurrency: default_concurrency(),
            skip_existing: true,
            converter: "pandoc".to_string(),
            pdf_engine: "xelatex".to_string(),
            font_pairs: FontPair::defaults(),
            image_width: "100%".to_string(),
            page_breaks: true,
            escape_math: true,
            progress_callback: None,
            log: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output", &self.output)
            .field("diagrams_dir", &self.diagrams_dir)
            .field("intermediate", &self.intermediate)
            .field("renderer", &self.renderer)
            .field("plantuml_jar", &self.plantuml_jar)
            .field("java", &self.java)
            .field("concurrency", &self.concurrency)
            .field("skip_existing", &self.skip_existing)
            .field("converter", &self.converter)
            .field("pdf_engine", &self.pdf_engine)
            .field("font_pairs", &self.font_pairs)
            .field("image_width", &self.image_width)
            .field("page_breaks", &self.page_breaks)
            .field("escape_math", &self.escape_math)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .field("log", &self.log)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured log, or one that only mirrors to `tracing`.
    pub fn log_sink(&self) -> Arc<ConversionLog> {
        self.log
            .clone()
            .unwrap_or_else(|| Arc::new(ConversionLog::disabled()))
    }

    /// Where the final PDF goes for `input`.
    pub fn pdf_path_for(&self, input: &Path) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| input.with_extension("pdf"))
    }

    /// Where rendered diagrams go for `input`.
    pub fn diagrams_dir_for(&self, input: &Path) -> PathBuf {
        self.diagrams_dir
            .clone()
            .unwrap_or_else(|| sibling(input, "diagrams"))
    }

    /// Where the rewritten Markdown goes for `input`.
    pub fn intermediate_path_for(&self, input: &Path) -> PathBuf {
        self.intermediate.clone().unwrap_or_else(|| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            sibling(input, &format!("{stem}_tmp.md"))
        })
    }
}

fn sibling(input: &Path, name: &str) -> PathBuf {
    match input.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => PathBuf::from(name),
    }
}

/// `min(available_parallelism, MAX_DEFAULT_CONCURRENCY)`.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_CONCURRENCY)
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = Some(path.into());
        self
    }

    pub fn diagrams_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.diagrams_dir = Some(path.into());
        self
    }

    pub fn intermediate(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.intermediate = Some(path.into());
        self
    }

    pub fn renderer(mut self, command: RendererCommand) -> Self {
        self.config.renderer = Some(command);
        self
    }

    pub fn plantuml_jar(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.plantuml_jar = Some(path.into());
        self
    }

    pub fn java(mut self, program: impl Into<String>) -> Self {
        self.config.java = Some(program.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn skip_existing(mut self, v: bool) -> Self {
        self.config.skip_existing = v;
        self
    }

    pub fn converter(mut self, program: impl Into<String>) -> Self {
        self.config.converter = program.into();
        self
    }

    pub fn pdf_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.pdf_engine = engine.into();
        self
    }

    pub fn font_pairs(mut self, pairs: Vec<FontPair>) -> Self {
        self.config.font_pairs = pairs;
        self
    }

    pub fn image_width(mut self, width: impl Into<String>) -> Self {
        self.config.image_width = width.into();
        self
    }

    pub fn page_breaks(mut self, v: bool) -> Self {
        self.config.page_breaks = v;
        self
    }

    pub fn escape_math(mut self, v: bool) -> Self {
        self.config.escape_math = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn log(mut self, log: Arc<ConversionLog>) -> Self {
        self.config.log = Some(log);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2PdfError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Md2PdfError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.converter.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "Converter executable must not be empty".into(),
            ));
        }
        if c.pdf_engine.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "PDF engine must not be empty".into(),
            ));
        }
        if let Some(ref r) = c.renderer {
            if r.program.trim().is_empty() {
                return Err(Md2PdfError::InvalidConfig(
                    "Renderer program must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Value types ──────────────────────────────────────────────────────────

/// A `(mainfont, monofont)` candidate for the converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontPair {
    pub main: String,
    pub mono: String,
}

impl FontPair {
    pub fn new(main: impl Into<String>, mono: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            mono: mono.into(),
        }
    }

    /// Pairs commonly installed on Windows, then Unicode-friendly monospace
    /// faces that render box-drawing characters properly.
    pub fn defaults() -> Vec<FontPair> {
        [
            ("Times New Roman", "Consolas"),
            ("Cambria", "Consolas"),
            ("Calibri", "Consolas"),
            ("Arial", "Consolas"),
            ("Times New Roman", "Lucida Console"),
            ("Times New Roman", "Courier New"),
            ("Times New Roman", "Noto Sans Mono"),
            ("Times New Roman", "DejaVu Sans Mono"),
        ]
        .into_iter()
        .map(|(main, mono)| FontPair::new(main, mono))
        .collect()
    }

    /// Parse `"Main Font:Mono Font"`.
    pub fn parse(s: &str) -> Result<FontPair, Md2PdfError> {
        let (main, mono) = s.split_once(':').ok_or_else(|| {
            Md2PdfError::InvalidConfig(format!(
                "Font pair '{s}' must look like 'Main Font:Mono Font'"
            ))
        })?;
        let (main, mono) = (main.trim(), mono.trim());
        if main.is_empty() || mono.is_empty() {
            return Err(Md2PdfError::InvalidConfig(format!(
                "Font pair '{s}' has an empty font name"
            )));
        }
        Ok(FontPair::new(main, mono))
    }
}

impl fmt::Display for FontPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.main, self.mono)
    }
}

/// External renderer invocation: `program args… <source file>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RendererCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `java -jar <jar> -tpng`.
    pub fn plantuml(java: impl Into<String>, jar: &Path) -> Self {
        Self::new(
            java,
            [
                "-jar".to_string(),
                jar.to_string_lossy().into_owned(),
                "-tpng".to_string(),
            ],
        )
    }
}
