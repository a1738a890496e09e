pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;

pub use engine::{OcrEngine, TextRecognizer};
pub use extract::{extract, Reading, NEEDS_REVIEW_SENTINEL};
pub use preprocess::{normalize, NormalizeError};
pub use setup::ensure_tessdata;

use anyhow::Result;
use image::DynamicImage;

use crate::config::PipelineConfig;

/// High-level pipeline: photograph -> best-guess meter reading.
///
/// Normalizes the raw image, runs the recognizer over it, and extracts a
/// reading from the fragments. One invocation per image, no shared mutable
/// state; callers may run invocations concurrently against the same
/// recognizer handle.
pub fn read_meter<R: TextRecognizer>(
    img: &DynamicImage,
    recognizer: &R,
    config: &PipelineConfig,
) -> Result<Reading> {
    let normalized = preprocess::normalize(img, &config.normalize)?;
    let fragments = recognizer.recognize(&normalized)?;
    Ok(extract::extract(&fragments, &config.extractor))
}
