//! Tesseract-backed text recognition.
//!
//! The recognizer is an external collaborator: the normalized image is
//! written to a temporary PNG and Tesseract is invoked as a subprocess.
//! Its output is treated as an unordered bag of plain-text fragments; no
//! assumption is made about ordering, language model, or confidence.

use anyhow::{anyhow, Result};
use image::GrayImage;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;
use tempfile::NamedTempFile;

use super::setup::{find_tessdata_dir, find_tesseract_executable};

/// Boundary to the external OCR collaborator. The pipeline and its tests
/// only depend on this trait, not on a Tesseract installation.
pub trait TextRecognizer {
    /// Recognizes text in a normalized image, returning zero or more
    /// fragments with no ordering guarantee.
    fn recognize(&self, image: &GrayImage) -> Result<Vec<String>>;
}

/// Handle to a resolved Tesseract installation.
///
/// Resolving the executable and tessdata paths is done once per process;
/// the handle is then shared across all pipeline invocations (subprocess
/// recognition is read-only, so concurrent calls are safe).
pub struct OcrEngine {
    executable: PathBuf,
    tessdata: PathBuf,
}

static ENGINE: OnceLock<OcrEngine> = OnceLock::new();

impl OcrEngine {
    /// Returns the process-wide shared engine, resolving it on first use.
    pub fn global() -> Result<&'static OcrEngine> {
        if let Some(engine) = ENGINE.get() {
            return Ok(engine);
        }
        let engine = OcrEngine {
            executable: find_tesseract_executable()?,
            tessdata: find_tessdata_dir()?,
        };
        Ok(ENGINE.get_or_init(|| engine))
    }
}

impl TextRecognizer for OcrEngine {
    fn recognize(&self, image: &GrayImage) -> Result<Vec<String>> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        image.save(temp_input.path())?;

        let output = Command::new(&self.executable)
            .arg(temp_input.path())
            .arg("stdout")
            .arg("--tessdata-dir")
            .arg(&self.tessdata)
            .arg("-l")
            .arg("eng")
            .arg("--psm")
            .arg("6") // Assume single uniform block of text
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        Ok(fragments_from_text(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Splits raw recognizer output into whitespace-delimited fragments.
fn fragments_from_text(text: &str) -> Vec<String> {
    text.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_split_on_any_whitespace() {
        let fragments = fragments_from_text("  004821 KWH\nPLN\t240V \n");
        assert_eq!(fragments, vec!["004821", "KWH", "PLN", "240V"]);
    }

    #[test]
    fn test_empty_output_yields_no_fragments() {
        assert!(fragments_from_text("").is_empty());
        assert!(fragments_from_text(" \n\t").is_empty());
    }
}
