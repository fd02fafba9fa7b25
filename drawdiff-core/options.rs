use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors raised when validating or loading [`CompareOptions`].
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("dpi {0} outside supported range {min}-{max}", min = MIN_DPI, max = MAX_DPI)]
    InvalidDpi(u32),
    #[error("intensity threshold {0} outside supported range 1-100")]
    InvalidIntensityThreshold(u8),
    #[error("structural threshold {0} must lie strictly between 0 and 1")]
    InvalidStructuralThreshold(f64),
    #[error("tile size must be positive")]
    InvalidTileSize,
    #[error("keypoint cap {0} too small (need at least {min})", min = MIN_KEYPOINT_CAP)]
    InvalidKeypointCap(usize),
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON config error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("TOML config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub const MIN_DPI: u32 = 72;
pub const MAX_DPI: u32 = 600;
pub const MIN_KEYPOINT_CAP: usize = 10;

/// Feature detection method used for registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorMethod {
    /// Scale-invariant 128-d gradient-histogram descriptors (primary).
    Float,
    /// Single-scale oriented 256-bit binary descriptors (fast fallback).
    Binary,
}

impl DetectorMethod {
    /// Name recorded in alignment stats.
    pub fn name(self) -> &'static str {
        match self {
            DetectorMethod::Float => "sift",
            DetectorMethod::Binary => "orb",
        }
    }
}

/// Tunable parameters for one comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Render resolution for both documents.
    pub dpi: u32,
    /// Minimum signed intensity difference for the missing/added masks.
    pub intensity_threshold: u8,
    /// Structural-similarity cutoff for the modified mask, in (0, 1).
    pub structural_threshold: f64,
    pub detector: DetectorMethod,
    /// Strongest-response keypoints kept per image.
    pub max_keypoints: usize,
    /// FAST corner threshold on the 16-pixel ring.
    pub corner_threshold: u8,
    /// Seed for the robust estimator; None draws from OS entropy.
    pub ransac_seed: Option<u64>,
    pub tile_size: u32,
    pub tile_overlap: u32,
    pub n_threads: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            dpi: 200,
            intensity_threshold: 30,
            structural_threshold: 0.85,
            detector: DetectorMethod::Float,
            max_keypoints: 5000,
            corner_threshold: 25,
            ransac_seed: None,
            tile_size: 256,
            tile_overlap: 1,
            n_threads: num_cpus::get().max(1),
        }
    }
}

impl CompareOptions {
    /// Draft preset: lower resolution and binary descriptors for quick previews.
    pub fn draft_preset() -> Self {
        Self {
            dpi: 100,
            detector: DetectorMethod::Binary,
            max_keypoints: 2000,
            ..Self::default()
        }
    }

    /// Quality preset: high resolution with the scale-invariant detector.
    pub fn quality_preset() -> Self {
        Self {
            dpi: 300,
            detector: DetectorMethod::Float,
            ..Self::default()
        }
    }

    /// Check every tunable against its documented range.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.dpi < MIN_DPI || self.dpi > MAX_DPI {
            return Err(OptionsError::InvalidDpi(self.dpi));
        }
        if self.intensity_threshold == 0 || self.intensity_threshold > 100 {
            return Err(OptionsError::InvalidIntensityThreshold(
                self.intensity_threshold,
            ));
        }
        if !(self.structural_threshold > 0.0 && self.structural_threshold < 1.0) {
            return Err(OptionsError::InvalidStructuralThreshold(
                self.structural_threshold,
            ));
        }
        if self.tile_size == 0 {
            return Err(OptionsError::InvalidTileSize);
        }
        if self.max_keypoints < MIN_KEYPOINT_CAP {
            return Err(OptionsError::InvalidKeypointCap(self.max_keypoints));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), OptionsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&content)?;
        options.validate()?;
        Ok(options)
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), OptionsError> {
        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path)?;
        let options: Self = toml::from_str(&content)?;
        options.validate()?;
        Ok(options)
    }
}
