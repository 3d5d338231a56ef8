//! # plantuml-auto
//!
//! Locate, or auto-download and cache, the [PlantUML](https://plantuml.com/)
//! jar at runtime, so that users of `md2pdf` no longer need to fetch
//! `plantuml.jar` by hand and pass its path on every invocation.
//!
//! ## How it works
//!
//! On first call to [`ensure_plantuml_jar`]:
//!
//! 1. Uses `PLANTUML_JAR` when it points to an existing jar.
//! 2. Checks `~/.cache/md2pdf/plantuml-{VERSION}/` for the jar.
//! 3. If absent, downloads the jar from the
//!    [plantuml/plantuml releases](https://github.com/plantuml/plantuml/releases)
//!    into the cache directory (written to a `.part` file, then renamed).
//!
//! Subsequent calls skip the network entirely; the jar is already cached.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use plantuml_auto::{ensure_plantuml_jar, java_command};
//!
//! let jar = ensure_plantuml_jar(Some(&|downloaded, total| {
//!     if let Some(t) = total {
//!         eprint!("\rDownloading PlantUML: {}/{} bytes", downloaded, t);
//!     }
//! })).expect("download failed");
//! println!("{} -jar {} -tpng diagram.puml", java_command(), jar.display());
//! ```
//!
//! ## Environment variable overrides
//!
//! - `PLANTUML_JAR` — path to an existing plantuml.jar; skips download.
//! - `PLANTUML_AUTO_CACHE_DIR` — override the default cache directory.
//! - `JAVA_HOME` — [`java_command`] prefers `$JAVA_HOME/bin/java`.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// The PlantUML release used for downloads.
pub const PLANTUML_VERSION: &str = "1.2024.7";

/// File name of the cached jar.
pub const JAR_NAME: &str = "plantuml.jar";

/// GitHub release base URL.
const BASE_URL: &str = "https://github.com/plantuml/plantuml/releases/download";

/// Every jar is a zip archive.
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by plantuml-auto operations.
#[derive(Error, Debug)]
pub enum PlantUmlAutoError {
    /// Could not create or write the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// The downloaded or configured file is not a jar.
    #[error("'{path}' is not a jar archive (first bytes: {magic:?})")]
    NotAJar { path: PathBuf, magic: [u8; 4] },
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the per-version cache directory for the PlantUML jar.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/md2pdf/plantuml-{VERSION}/`
/// - **Linux**: `~/.cache/md2pdf/plantuml-{VERSION}/`
/// - **Windows**: `%LOCALAPPDATA%\md2pdf\plantuml-{VERSION}\`
///
/// Override by setting `PLANTUML_AUTO_CACHE_DIR`.
pub fn plantuml_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("PLANTUML_AUTO_CACHE_DIR") {
        return PathBuf::from(override_dir).join(format!("plantuml-{PLANTUML_VERSION}"));
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("md2pdf").join(format!("plantuml-{PLANTUML_VERSION}"))
}

/// Download URL of the pinned release jar.
pub fn download_url() -> String {
    format!("{BASE_URL}/v{PLANTUML_VERSION}/plantuml-{PLANTUML_VERSION}.jar")
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns the on-disk path to the PlantUML jar, or `None` if not available
/// without a download.
///
/// `PLANTUML_JAR` wins when it points to an existing jar. Files that do not
/// start with the zip signature are ignored.
pub fn cached_plantuml_jar() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("PLANTUML_JAR") {
        let pb = PathBuf::from(p);
        if usable_jar(&pb) {
            return Some(pb);
        }
    }
    let p = plantuml_cache_dir().join(JAR_NAME);
    usable_jar(&p).then_some(p)
}

/// Returns `true` if no network access is needed on the next call to
/// [`ensure_plantuml_jar`].
pub fn is_plantuml_cached() -> bool {
    cached_plantuml_jar().is_some()
}

/// Ensures the PlantUML jar is present locally and returns its path.
///
/// `on_progress` receives `(bytes_downloaded, total_size_option)` during
/// the download.  Pass `None` to suppress progress callbacks.
///
/// # Thread safety
///
/// Safe to call from multiple threads simultaneously; the resolved path is
/// memoised for the lifetime of the process.
pub fn ensure_plantuml_jar(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, PlantUmlAutoError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = resolve_or_download(on_progress)?;

    // Ignore the race: every contender resolved the same path.
    let _ = RESOLVED_PATH.set(path.clone());

    Ok(path)
}

/// Java launcher used to run the jar.
///
/// Prefers `$JAVA_HOME/bin/java` when that file exists, otherwise relies on
/// `java` being on `PATH`.
pub fn java_command() -> String {
    if let Ok(home) = std::env::var("JAVA_HOME") {
        let bin = if cfg!(windows) { "java.exe" } else { "java" };
        let candidate = PathBuf::from(home).join("bin").join(bin);
        if candidate.is_file() {
            return candidate.to_string_lossy().into_owned();
        }
    }
    "java".to_string()
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Checks that `path` starts with the zip signature every jar carries.
fn verify_jar(path: &Path) -> Result<(), PlantUmlAutoError> {
    let mut magic = [0u8; 4];
    let mut f = std::fs::File::open(path).map_err(PlantUmlAutoError::CacheDir)?;
    f.read_exact(&mut magic).map_err(PlantUmlAutoError::CacheDir)?;
    if magic != ZIP_MAGIC {
        return Err(PlantUmlAutoError::NotAJar {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn usable_jar(path: &Path) -> bool {
    path.is_file() && verify_jar(path).is_ok()
}

fn resolve_or_download(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, PlantUmlAutoError> {
    // 1. Environment variable override.
    if let Ok(env_path) = std::env::var("PLANTUML_JAR") {
        let p = PathBuf::from(env_path);
        if usable_jar(&p) {
            return Ok(p);
        }
        // Set but missing or not a jar: fall through to the cache / download.
        eprintln!(
            "plantuml-auto: PLANTUML_JAR '{}' is not a usable jar; downloading …",
            p.display()
        );
    }

    let cache_dir = plantuml_cache_dir();
    let jar_path = cache_dir.join(JAR_NAME);

    // 2. Already cached on disk.
    if usable_jar(&jar_path) {
        return Ok(jar_path);
    }
    if jar_path.exists() {
        std::fs::remove_file(&jar_path).map_err(PlantUmlAutoError::CacheDir)?;
    }

    // 3. Download.
    std::fs::create_dir_all(&cache_dir).map_err(PlantUmlAutoError::CacheDir)?;

    let url = download_url();
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("md2pdf/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlantUmlAutoError::Download(e.to_string()))?;
    let response = client
        .get(&url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| PlantUmlAutoError::Download(format!("{url}: {e}")))?;
    let total = response.content_length();

    install_jar(response, total, &jar_path, on_progress)?;
    Ok(jar_path)
}

/// Copies `src` into `<dest>.part`, checking the zip signature on the way,
/// and renames the part file over `dest` once the copy is complete.
///
/// The part file is removed on any failure.
fn install_jar(
    src: impl Read,
    total: Option<u64>,
    dest: &Path,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<(), PlantUmlAutoError> {
    let part = dest.with_extension("jar.part");
    let result = copy_checked(src, total, &part, on_progress)
        .and_then(|()| std::fs::rename(&part, dest).map_err(PlantUmlAutoError::CacheDir));
    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

fn copy_checked(
    mut src: impl Read,
    total: Option<u64>,
    part: &Path,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<(), PlantUmlAutoError> {
    let mut out = std::fs::File::create(part).map_err(PlantUmlAutoError::CacheDir)?;
    let mut chunk = vec![0u8; 64 * 1024];
    let mut head = Vec::with_capacity(ZIP_MAGIC.len());
    let mut written: u64 = 0;

    loop {
        let n = match src.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PlantUmlAutoError::Download(format!("read error: {e}"))),
        };

        if head.len() < ZIP_MAGIC.len() {
            let take = (ZIP_MAGIC.len() - head.len()).min(n);
            head.extend_from_slice(&chunk[..take]);
            if head[..] != ZIP_MAGIC[..head.len()] {
                return Err(not_a_jar(part, &head));
            }
        }

        out.write_all(&chunk[..n]).map_err(PlantUmlAutoError::CacheDir)?;
        written += n as u64;
        if let Some(cb) = on_progress {
            cb(written, total);
        }
    }

    if head.len() < ZIP_MAGIC.len() {
        return Err(not_a_jar(part, &head));
    }
    out.sync_all().map_err(PlantUmlAutoError::CacheDir)
}

fn not_a_jar(part: &Path, head: &[u8]) -> PlantUmlAutoError {
    let mut magic = [0u8; 4];
    magic[..head.len()].copy_from_slice(head);
    PlantUmlAutoError::NotAJar {
        path: part.with_extension(""),
        magic,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
