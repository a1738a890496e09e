//! Locating and provisioning the Tesseract installation.
//!
//! The engine binary must already be installed (package manager or
//! installer); this module finds it on PATH or in common install locations.
//! The English trained data can be fetched automatically into a per-user
//! data directory when no system copy exists.

use anyhow::{anyhow, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Returns the per-user directory for downloaded trained data.
pub fn get_tessdata_download_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meterscan")
        .join("tessdata")
}

/// Finds the Tesseract executable: PATH first, then common install paths.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    let common_paths = [
        "/usr/bin/tesseract",
        "/usr/local/bin/tesseract",
        "/opt/homebrew/bin/tesseract",
        r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    ];

    for path in &common_paths {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory containing eng.traineddata.
///
/// Checks the per-user download dir, common system locations, then the
/// TESSDATA_PREFIX environment variable.
pub fn find_tessdata_dir() -> Result<PathBuf> {
    let local_tessdata = get_tessdata_download_dir();
    if local_tessdata.join("eng.traineddata").exists() {
        return Ok(local_tessdata);
    }

    let system_paths = [
        "/usr/share/tesseract-ocr/5/tessdata",
        "/usr/share/tesseract-ocr/4.00/tessdata",
        "/usr/share/tessdata",
        "/usr/local/share/tessdata",
        "/opt/homebrew/share/tessdata",
        r"C:\Program Files\Tesseract-OCR\tessdata",
    ];

    for path in &system_paths {
        let p = PathBuf::from(path);
        if p.join("eng.traineddata").exists() {
            return Ok(p);
        }
    }

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if p.join("eng.traineddata").exists() {
            return Ok(p);
        }
        let p = PathBuf::from(&prefix).join("tessdata");
        if p.join("eng.traineddata").exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "tessdata directory not found. Please ensure eng.traineddata is available."
    ))
}

/// Ensures eng.traineddata is available, downloading it if necessary.
/// Returns the tessdata directory to pass to the engine.
pub fn ensure_tessdata() -> Result<PathBuf> {
    if let Ok(dir) = find_tessdata_dir() {
        return Ok(dir);
    }

    let download_dir = get_tessdata_download_dir();
    fs::create_dir_all(&download_dir)?;
    download_tessdata(&download_dir)?;
    Ok(download_dir)
}

/// Downloads English trained data from the official tessdata repository.
fn download_tessdata(tessdata_dir: &PathBuf) -> Result<()> {
    let eng_url = format!("{}/eng.traineddata", TESSDATA_REPO);
    let eng_path = tessdata_dir.join("eng.traineddata");

    crate::log("Downloading eng.traineddata...");

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&eng_url)
        .header("User-Agent", "meterscan")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download eng.traineddata: HTTP {}",
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = fs::File::create(&eng_path)?;
    file.write_all(&bytes)?;

    crate::log(&format!("Downloaded eng.traineddata ({} bytes)", bytes.len()));

    Ok(())
}
