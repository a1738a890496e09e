//! Pipeline configuration.
//!
//! Loads settings from config.json at startup. Provides image normalization
//! parameters and reading-extraction rules. The original deployment had two
//! near-duplicate pipeline variants; their differences (blur step, unit list,
//! ranking tie-break) are exposed here as configuration instead.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<PipelineConfig> = OnceLock::new();

/// Tie-break rule when two surviving candidates have equal length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep the candidate that occurs first in the corrected text.
    #[default]
    FirstMatch,
    /// Keep the candidate that occurs last in the corrected text.
    LastMatch,
}

/// Parameters for turning a raw photograph into an OCR-friendly image.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Longest side of the normalized image; larger inputs are downscaled
    /// preserving aspect ratio.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// CLAHE clip limit. Higher values allow stronger local contrast boosts.
    #[serde(default = "default_clahe_clip_limit")]
    pub clahe_clip_limit: f32,
    /// CLAHE tile grid (columns, rows).
    #[serde(default = "default_clahe_grid")]
    pub clahe_grid: (u32, u32),
    /// Whether to apply a light Gaussian blur after contrast enhancement.
    /// Suppresses sensor noise at the cost of edge sharpness.
    #[serde(default)]
    pub blur_enabled: bool,
    /// Blur sigma, used only when blur_enabled is true.
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,
}

fn default_max_dimension() -> u32 {
    1600
}

fn default_clahe_clip_limit() -> f32 {
    3.0
}

fn default_clahe_grid() -> (u32, u32) {
    (8, 8)
}

fn default_blur_sigma() -> f32 {
    1.0
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            clahe_clip_limit: default_clahe_clip_limit(),
            clahe_grid: default_clahe_grid(),
            blur_enabled: false,
            blur_sigma: default_blur_sigma(),
        }
    }
}

/// Rules for extracting a reading from recognized text fragments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Unit tokens removed from the text before digit correction. OCR often
    /// glues unit text onto the reading, and unit letters would otherwise be
    /// miscorrected into digits. Stripped in order, so longer tokens must
    /// precede their prefixes (KVARH before KVAR, M3/H before M3).
    #[serde(default = "default_units")]
    pub units: Vec<String>,
    /// Single-character substitutions for digits commonly misread as letters.
    /// All substitutions target disjoint characters, so order is irrelevant.
    #[serde(default = "default_corrections")]
    pub corrections: Vec<(char, char)>,
    /// Tie-break for equal-length candidates.
    #[serde(default)]
    pub tie_break: TieBreak,
}

fn default_units() -> Vec<String> {
    ["KVARH", "KVAR", "M3/H", "KWH", "M3"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_corrections() -> Vec<(char, char)> {
    vec![
        ('O', '0'),
        ('D', '0'),
        ('Q', '0'),
        ('B', '8'),
        ('S', '5'),
        ('G', '6'),
        ('I', '1'),
        ('L', '1'),
        ('T', '7'),
        ('Z', '2'),
        ('A', '4'),
    ]
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            units: default_units(),
            corrections: default_corrections(),
            tie_break: TieBreak::FirstMatch,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    /// Placeholder meter name assigned to new records. A human reviewer is
    /// expected to correct it afterwards.
    #[serde(default = "default_meter_name")]
    pub default_meter_name: String,
}

fn default_meter_name() -> String {
    "Meteran".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            normalize: NormalizeConfig::default(),
            extractor: ExtractorConfig::default(),
            default_meter_name: default_meter_name(),
        }
    }
}

/// Loads configuration from config.json or returns defaults.
/// Looks for config.json in the same directory as the executable.
fn load_config() -> PipelineConfig {
    let config_path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("config.json")))
        .unwrap_or_else(|| Path::new("config.json").to_path_buf());

    if config_path.exists() {
        match fs::read_to_string(&config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    crate::log("Config loaded from config.json");
                    return config;
                }
                Err(e) => {
                    crate::log(&format!(
                        "Failed to parse config.json: {}. Using defaults.",
                        e
                    ));
                }
            },
            Err(e) => {
                crate::log(&format!(
                    "Failed to read config.json: {}. Using defaults.",
                    e
                ));
            }
        }
    }

    PipelineConfig::default()
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config());
}

/// Returns a reference to the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> &'static PipelineConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
}
