//! Progress-callback trait for per-diagram conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline renders each diagram and drives the converter.
//!
//! # Example
//!
//! ```rust
//! use md2pdf_uml::{ConversionProgressCallback, ConversionConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_diagram_complete(&self, ordinal: usize, total: usize, image: &Path, cached: bool) {
//!         self.rendered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Diagram {}/{} → {} (cached: {})", ordinal, total, image.display(), cached);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     rendered: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::config::FontPair;
use std::path::Path;
use std::sync::Arc;

/// Called by the conversion pipeline as it works through the document.
///
/// Implementations must be `Send + Sync`: diagram events arrive from
/// concurrently running render tasks, in completion order. All methods have
/// default no-op implementations so callers only override what they need.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after the document has been scanned.
    ///
    /// # Arguments
    /// * `total_diagrams` — number of diagrams that will be rendered
    fn on_conversion_start(&self, total_diagrams: usize) {
        let _ = total_diagrams;
    }

    /// Called just before a diagram's render job starts.
    fn on_diagram_start(&self, ordinal: usize, total: usize) {
        let _ = (ordinal, total);
    }

    /// Called when a diagram image is available.
    ///
    /// # Arguments
    /// * `image`  — path of the PNG
    /// * `cached` — true when the image already existed and no renderer ran
    fn on_diagram_complete(&self, ordinal: usize, total: usize, image: &Path, cached: bool) {
        let _ = (ordinal, total, image, cached);
    }

    /// Called when a diagram fails to render.
    fn on_diagram_error(&self, ordinal: usize, total: usize, error: &str) {
        let _ = (ordinal, total, error);
    }

    /// Called before each converter invocation.
    ///
    /// `fonts` is `None` for the final attempt with converter defaults.
    fn on_pdf_attempt(&self, attempt: usize, fonts: Option<&FontPair>) {
        let _ = (attempt, fonts);
    }

    /// Called once after every diagram has been attempted and the converter
    /// has finished.
    ///
    /// # Arguments
    /// * `total_diagrams` — diagrams located in the document
    /// * `success_count`  — diagrams that produced an image
    fn on_conversion_complete(&self, total_diagrams: usize, success_count: usize) {
        let _ = (total_diagrams, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
