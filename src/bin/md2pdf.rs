//! CLI binary for md2pdf-uml.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use md2pdf_uml::{
    convert, inspect, prepare_markdown, ConversionConfig, ConversionLog, ConversionOutput,
    ConversionProgressCallback, FontPair, Md2PdfError, PdfStatus, ProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one line per diagram.
/// Diagrams finish out of order, so start times are tracked per ordinal.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` tells us the diagram count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} diagrams  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
    }

    fn elapsed_secs(&self, ordinal: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ordinal)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_diagrams: usize) {
        self.activate_bar(total_diagrams);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_diagrams} UML diagrams"))
        ));
    }

    fn on_diagram_start(&self, ordinal: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ordinal, Instant::now());
        self.bar.set_message(format!("diagram {ordinal}"));
    }

    fn on_diagram_complete(&self, ordinal: usize, total: usize, image: &Path, cached: bool) {
        let secs = self.elapsed_secs(ordinal);
        self.bar.println(format!(
            "  {} Diagram {:>3}/{:<3}  {}  {}",
            green("✓"),
            ordinal,
            total,
            dim(&image.display().to_string()),
            if cached {
                dim("cached")
            } else {
                dim(&format!("{secs:.1}s"))
            },
        ));
        self.bar.inc(1);
    }

    fn on_diagram_error(&self, ordinal: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(ordinal);

        // Keep only the first line; renderer stderr can be long.
        let first = error.lines().next().unwrap_or_default();
        let msg = if first.chars().count() > 80 {
            format!("{}\u{2026}", first.chars().take(79).collect::<String>())
        } else {
            first.to_string()
        };

        self.bar.println(format!(
            "  {} Diagram {:>3}/{:<3}  {}  {}",
            red("✗"),
            ordinal,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_pdf_attempt(&self, attempt: usize, fonts: Option<&FontPair>) {
        if attempt == 1 {
            self.bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(TICKS),
            );
            self.bar.set_prefix("Pandoc");
        }
        self.bar.set_message(match fonts {
            Some(f) => format!("attempt {attempt}: {f}"),
            None => format!("attempt {attempt}: default fonts"),
        });
    }

    fn on_conversion_complete(&self, total_diagrams: usize, success_count: usize) {
        let failed = total_diagrams.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} diagrams rendered successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} diagrams rendered  ({} failed)",
                if failed == total_diagrams {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_diagrams,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion: book.md → book.pdf, diagrams in ./diagrams/
  md2pdf book.md

  # Explicit output and diagram directory
  md2pdf book.md -o out/book.pdf --diagrams-dir out/img

  # Re-render every diagram even if its PNG exists
  md2pdf --force book.md

  # Try only your own fonts before Pandoc defaults
  md2pdf --fonts "Liberation Serif:Liberation Mono,DejaVu Serif:DejaVu Sans Mono" book.md

  # Stop after writing the rewritten Markdown
  md2pdf --markdown-only book.md

  # List diagrams without running anything
  md2pdf --inspect-only --json book.md

DOCUMENT CONVENTIONS:
  ```plantuml … ```        fenced diagram (markers added if missing)
  @startuml … @enduml      bare diagram
  ---                      page break (outside the YAML header)
  $                        escaped to \$ (disable with --no-escape-math)

ENVIRONMENT VARIABLES:
  PLANTUML_JAR            Path to an existing plantuml.jar; skips download
  PLANTUML_AUTO_CACHE_DIR Override the default plantuml.jar cache directory
  JAVA_HOME               Java installation used to run PlantUML
  MD2PDF_PANDOC           Pandoc executable (default: pandoc)
  RUST_LOG                Tracing filter, overrides -v / -q

SETUP:
  Requires Java, Pandoc and a XeLaTeX distribution on PATH.

  plantuml.jar (~10 MB) is downloaded automatically on first run and cached
  in ~/.cache/md2pdf/plantuml-1.2024.7/. To use an existing copy:
  PLANTUML_JAR=/path/to/plantuml.jar md2pdf ...
"#;

/// Convert Markdown with PlantUML diagrams to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Convert Markdown with embedded PlantUML diagrams to PDF",
    long_about = "Render every PlantUML diagram in a Markdown document to PNG, substitute \
the images into the text, and build a PDF with Pandoc and XeLaTeX, trying a list of font \
pairs before falling back to Pandoc's defaults.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file to convert.
    input: PathBuf,

    /// PDF output path [default: input with .pdf extension].
    #[arg(short, long, env = "MD2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for diagramN.puml / diagramN.png [default: <input dir>/diagrams].
    #[arg(long, env = "MD2PDF_DIAGRAMS_DIR")]
    diagrams_dir: Option<PathBuf>,

    /// Rewritten Markdown handed to Pandoc [default: <input dir>/<stem>_tmp.md].
    #[arg(long, env = "MD2PDF_INTERMEDIATE")]
    intermediate: Option<PathBuf>,

    /// Conversion log, truncated on every run [default: <input dir>/conversion.log].
    #[arg(long, env = "MD2PDF_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Path to plantuml.jar [default: $PLANTUML_JAR, then the download cache].
    #[arg(long)]
    plantuml_jar: Option<PathBuf>,

    /// Java executable [default: $JAVA_HOME/bin/java or java].
    #[arg(long, env = "MD2PDF_JAVA")]
    java: Option<String>,

    /// Pandoc executable.
    #[arg(long, env = "MD2PDF_PANDOC", default_value = "pandoc")]
    pandoc: String,

    /// LaTeX engine passed to Pandoc.
    #[arg(long, env = "MD2PDF_PDF_ENGINE", default_value = "xelatex")]
    pdf_engine: String,

    /// Number of diagrams rendered in parallel [default: min(CPUs, 6)].
    #[arg(short, long, env = "MD2PDF_CONCURRENCY",
          value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: Option<u16>,

    /// Re-render diagrams even when their PNG already exists.
    #[arg(long, env = "MD2PDF_FORCE")]
    force: bool,

    /// Width attribute on every image reference.
    #[arg(long, env = "MD2PDF_IMAGE_WIDTH", default_value = "100%")]
    image_width: String,

    /// Leave bare `---` lines alone instead of turning them into page breaks.
    #[arg(long, env = "MD2PDF_NO_PAGE_BREAKS")]
    no_page_breaks: bool,

    /// Do not escape `$` characters.
    #[arg(long, env = "MD2PDF_NO_ESCAPE_MATH")]
    no_escape_math: bool,

    /// Font pairs to try, as "Main:Mono" separated by commas.
    #[arg(long, env = "MD2PDF_FONTS", value_delimiter = ',', value_parser = parse_font_pair)]
    fonts: Option<Vec<FontPair>>,

    /// Write the rewritten Markdown but do not run Pandoc.
    #[arg(long)]
    markdown_only: bool,

    /// List diagrams and page breaks only; launch nothing.
    #[arg(long)]
    inspect_only: bool,

    /// Print a JSON report on stdout.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,

    /// Exit non-zero when any diagram fails or no PDF is produced.
    #[arg(long, env = "MD2PDF_STRICT")]
    strict: bool,
}

fn parse_font_pair(s: &str) -> std::result::Result<FontPair, String> {
    FontPair::parse(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", red("error:"));
            let status = e
                .downcast_ref::<Md2PdfError>()
                .map(Md2PdfError::exit_status)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(status).unwrap_or(1))
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO lines are already in the conversion log and the bar covers the
    // terminal, so only errors reach stderr while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None, None, None)?;
        let summary = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        } else {
            println!("File:           {}", cli.input.display());
            println!("Front matter:   {}", if summary.has_front_matter { "yes" } else { "no" });
            println!("Diagrams:       {}", summary.diagrams.len());
            for d in &summary.diagrams {
                println!(
                    "  #{:<3} line {:<5} {:<10} {}",
                    d.ordinal,
                    d.line,
                    d.kind,
                    if d.image_exists { "cached" } else { "" }
                );
            }
            if summary.overlapping > 0 {
                println!("Overlapping:    {} (ignored)", summary.overlapping);
            }
            println!("Page breaks:    {}", summary.page_breaks);
            println!("Dollar signs:   {}", summary.unescaped_dollars);
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Conversion log ───────────────────────────────────────────────────
    let log_path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| default_log_path(&cli.input));
    let log = Arc::new(
        ConversionLog::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?,
    );

    // ── Ensure plantuml.jar is available ─────────────────────────────────
    // Only when the document actually has diagrams: the first run downloads
    // the jar from the PlantUML releases and caches it for later runs.
    let jar = match explicit_jar(cli.plantuml_jar.as_deref())? {
        Some(jar) => Some(jar),
        None => ensure_jar_for(&cli).await?,
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb, Some(Arc::clone(&log)), jar)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let result = if cli.markdown_only {
        prepare_markdown(&cli.input, &config).await
    } else {
        convert(&cli.input, &config).await
    };
    let _ = log.flush();
    let output = result.context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, &log_path, show_progress);
    }

    Ok(exit_code(&output, cli.strict))
}

/// Download plantuml.jar if the document has diagrams and no jar is cached.
async fn ensure_jar_for(cli: &Cli) -> Result<Option<PathBuf>> {
    if plantuml_auto::is_plantuml_cached() {
        return Ok(None);
    }
    let summary = inspect(&cli.input, &ConversionConfig::default())
        .await
        .context("Failed to read document")?;
    if summary.diagrams.is_empty() {
        return Ok(None);
    }

    let jar = if cli.quiet || cli.json {
        tokio::task::block_in_place(|| plantuml_auto::ensure_plantuml_jar(None))
            .context("Failed to download plantuml.jar")?
    } else {
        let dl_bar = ProgressBar::new(0);
        dl_bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        dl_bar.set_prefix("PlantUML");
        dl_bar.set_message("Connecting…");
        dl_bar.enable_steady_tick(Duration::from_millis(80));

        let bar = dl_bar.clone();
        let jar = tokio::task::block_in_place(|| {
            plantuml_auto::ensure_plantuml_jar(Some(&|downloaded, total| {
                if let Some(t) = total {
                    if bar.length().unwrap_or(0) != t {
                        bar.set_length(t);
                    }
                }
                bar.set_position(downloaded);
            }))
        })
        .context("Failed to download plantuml.jar")?;

        dl_bar.finish_with_message("ready ✓");
        jar
    };
    Ok(Some(jar))
}

/// `--plantuml-jar`, which must name an existing file.
///
/// `PLANTUML_JAR` is left to plantuml-auto, which falls back to the cache
/// when the variable points nowhere.
fn explicit_jar(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(p) if !p.is_file() => {
            anyhow::bail!("--plantuml-jar: {} is not a file", p.display())
        }
        other => Ok(other.map(Path::to_path_buf)),
    }
}

fn default_log_path(input: &Path) -> PathBuf {
    match input.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("conversion.log"),
        _ => PathBuf::from("conversion.log"),
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    log: Option<Arc<ConversionLog>>,
    jar: Option<PathBuf>,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .converter(cli.pandoc.clone())
        .pdf_engine(cli.pdf_engine.clone())
        .skip_existing(!cli.force)
        .image_width(cli.image_width.clone())
        .page_breaks(!cli.no_page_breaks)
        .escape_math(!cli.no_escape_math);

    if let Some(ref p) = cli.output {
        builder = builder.output(p);
    }
    if let Some(ref p) = cli.diagrams_dir {
        builder = builder.diagrams_dir(p);
    }
    if let Some(ref p) = cli.intermediate {
        builder = builder.intermediate(p);
    }
    if let Some(p) = jar {
        builder = builder.plantuml_jar(p);
    }
    if let Some(ref j) = cli.java {
        builder = builder.java(j);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(usize::from(n));
    }
    if let Some(ref fonts) = cli.fonts {
        builder = builder.font_pairs(fonts.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    if let Some(log) = log {
        builder = builder.log(log);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &ConversionOutput, log_path: &Path, show_progress: bool) {
    let stats = &output.stats;
    if !show_progress {
        eprintln!(
            "Rendered {}/{} diagrams ({} cached) in {}ms",
            stats.total_diagrams - stats.failed_diagrams,
            stats.total_diagrams,
            stats.cached_diagrams,
            stats.render_duration_ms
        );
    }

    match &output.pdf {
        PdfStatus::Generated { path, fonts } => eprintln!(
            "{}  {}  {}",
            green("✔"),
            bold(&path.display().to_string()),
            dim(&match fonts {
                Some(f) => format!("fonts: {f}"),
                None => "fonts: pandoc defaults".to_string(),
            }),
        ),
        PdfStatus::ConverterFailed { exit_status } => eprintln!(
            "{}  Pandoc failed (exit status {exit_status})",
            red("✘")
        ),
        PdfStatus::Missing { path } => eprintln!(
            "{}  Pandoc reported success but {} was not created",
            red("✘"),
            path.display()
        ),
        PdfStatus::ToolNotFound { tool } => eprintln!("{}  '{tool}' not found in PATH", red("✘")),
        PdfStatus::NotRequested => eprintln!(
            "{}  {}",
            green("✔"),
            bold(&output.intermediate.display().to_string())
        ),
    }
    eprintln!("   {} {}", dim("log:"), dim(&log_path.display().to_string()));
}

/// Exit 0 once the pipeline has run, unless `--strict` asks otherwise.
fn exit_code(output: &ConversionOutput, strict: bool) -> ExitCode {
    if !strict {
        return ExitCode::SUCCESS;
    }
    let status = match &output.pdf {
        PdfStatus::ToolNotFound { .. } => md2pdf_uml::error::TOOL_NOT_FOUND_STATUS,
        PdfStatus::ConverterFailed { exit_status } => *exit_status,
        PdfStatus::Missing { .. } => 1,
        PdfStatus::Generated { .. } | PdfStatus::NotRequested => {
            if output.stats.failed_diagrams > 0 {
                1
            } else {
                0
            }
        }
    };
    match u8::try_from(status) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn explicit_jar_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("plantuml.jar");
        assert!(explicit_jar(Some(&missing)).is_err());

        std::fs::write(&missing, b"PK\x03\x04").unwrap();
        assert_eq!(explicit_jar(Some(&missing)).unwrap(), Some(missing.clone()));
        assert_eq!(explicit_jar(None).unwrap(), None);
    }

    #[test]
    fn plantuml_jar_flag_is_not_read_from_env() {
        let arg = Cli::command()
            .get_arguments()
            .find(|a| a.get_id() == "plantuml_jar")
            .map(|a| a.get_env().is_none());
        assert_eq!(arg, Some(true));
    }

    #[test]
    fn default_log_path_sits_next_to_input() {
        assert_eq!(
            default_log_path(Path::new("docs/book.md")),
            PathBuf::from("docs/conversion.log")
        );
        assert_eq!(default_log_path(Path::new("book.md")), PathBuf::from("conversion.log"));
    }
}
