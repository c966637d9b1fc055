use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::location::FieldWeights;

pub const ENDPOINT_ENV: &str = "RECEIPTLY_DOCUMENT_ENDPOINT";
pub const API_KEY_ENV: &str = "RECEIPTLY_DOCUMENT_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Read-only configuration shared by every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub normalizer: NormalizerConfig,
    pub boundary: BoundaryConfig,
    pub location: LocationConfig,
    pub store_name: StoreNameConfig,
    pub reconcile: ReconcileConfig,
    pub validation: ValidationConfig,
    pub fetch: FetchConfig,
    pub document: DocumentServiceConfig,
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file, then apply credential overrides from the
    /// process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_toml(&content)?;
        settings.apply_env(&std::env::vars().collect());
        Ok(settings)
    }

    pub fn apply_env(&mut self, env: &HashMap<String, String>) {
        let non_empty = |key: &str| env.get(key).filter(|v| !v.trim().is_empty()).cloned();
        if let Some(endpoint) = non_empty(ENDPOINT_ENV) {
            self.document.endpoint = Some(endpoint);
        }
        if let Some(key) = non_empty(API_KEY_ENV) {
            self.document.api_key = Some(key);
        }
    }
}

// ── Normalizer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Images narrower than this are upscaled before enhancement.
    pub min_width: u32,
    pub contrast: f32,
    pub sharpness: f32,
    /// Median filter radius; 0 disables denoising.
    pub denoise_radius: u32,
    pub deskew: bool,
    /// Degrees; rotation is applied only above this magnitude.
    pub deskew_min_angle: f32,
    pub deskew_sample_lines: usize,
    pub binarize: bool,
    pub binarize_block_radius: u32,
    /// Output size ceiling in bytes.
    pub max_bytes: usize,
    /// Inputs above this fraction of `max_bytes` are passed through untouched.
    pub passthrough_ratio: f64,
    pub jpeg_quality_start: u8,
    pub jpeg_quality_step: u8,
    pub jpeg_quality_floor: u8,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_width: 800,
            contrast: 1.3,
            sharpness: 1.5,
            denoise_radius: 1,
            deskew: true,
            deskew_min_angle: 0.5,
            deskew_sample_lines: 20,
            binarize: false,
            binarize_block_radius: 5,
            max_bytes: 4 * 1024 * 1024,
            passthrough_ratio: 0.875,
            jpeg_quality_start: 95,
            jpeg_quality_step: 5,
            jpeg_quality_floor: 60,
        }
    }
}

// ── Boundary detection ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStrategy {
    Geometry,
    /// Layout service first, geometry when the service fails.
    CloudLayout,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub strategy: BoundaryStrategy,
    /// Longest side of the working copy used for contour analysis.
    pub analysis_max_side: u32,
    pub acceptance_threshold: f32,
    pub min_area_ratio: f64,
    pub max_area_ratio: f64,
    /// Area ratio from which a crop is treated as a tightly framed photo.
    pub tight_frame_ratio: f64,
    pub min_side: u32,
    pub max_aspect: f64,
    pub padding: u32,
    /// Padding around the union of text lines, as a fraction of the page.
    pub layout_line_padding: f64,
    pub jpeg_quality: u8,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            strategy: BoundaryStrategy::CloudLayout,
            analysis_max_side: 1024,
            acceptance_threshold: 0.5,
            min_area_ratio: 0.05,
            max_area_ratio: 0.98,
            tight_frame_ratio: 0.95,
            min_side: 100,
            max_aspect: 15.0,
            padding: 10,
            layout_line_padding: 0.02,
            jpeg_quality: 95,
        }
    }
}

// ── Location extraction ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Fraction of the image height treated as the store header.
    pub header_fraction: f32,
    pub weights: FieldWeights,
    pub store_name_bonus: f32,
    pub raw_text_limit: usize,
    pub enhanced_min_width: u32,
    pub simple_min_width: u32,
    pub clahe_clip_limit: f32,
    pub clahe_tiles: u32,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            header_fraction: 0.25,
            weights: FieldWeights::default(),
            store_name_bonus: 0.2,
            raw_text_limit: 500,
            enhanced_min_width: 1000,
            simple_min_width: 1500,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreNameConfig {
    pub known_chains: Vec<String>,
    pub known_chain_confidence: f32,
    pub position_confidence: f32,
    pub capitalization_confidence: f32,
    pub pattern_confidence: f32,
    pub max_len: usize,
    /// Whole-image OCR shorter than this is treated as unreadable.
    pub fallback_min_text: usize,
}

impl Default for StoreNameConfig {
    fn default() -> Self {
        let known_chains = [
            "walmart", "target", "costco", "safeway", "kroger", "whole foods", "trader joe",
            "aldi", "publix", "wegmans", "cvs", "walgreens", "rite aid", "shell", "chevron",
            "bp", "exxon", "mobil", "mcdonald", "burger king", "wendy", "subway", "starbucks",
            "dunkin", "chipotle", "taco bell", "kfc", "pizza hut", "home depot", "lowe",
            "best buy", "staples", "office depot",
        ];
        Self {
            known_chains: known_chains.iter().map(|s| s.to_string()).collect(),
            known_chain_confidence: 0.8,
            position_confidence: 0.6,
            capitalization_confidence: 0.5,
            pattern_confidence: 0.4,
            max_len: 100,
            fallback_min_text: 5,
        }
    }
}

// ── Reconciliation & validation ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub placeholder_name: String,
    pub min_name_len: usize,
    pub merchant_name_max_len: usize,
    pub address_max_len: usize,
    pub phone_max_len: usize,
    pub min_phone_digits: usize,
    pub min_letter_ratio: f32,
    pub max_special_ratio: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            placeholder_name: "Unknown Store".to_string(),
            min_name_len: 3,
            merchant_name_max_len: 100,
            address_max_len: 300,
            phone_max_len: 40,
            min_phone_digits: 7,
            min_letter_ratio: 0.3,
            max_special_ratio: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_confidence: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { min_confidence: 0.7 }
    }
}

// ── Remote services ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 120, max_attempts: 3, retry_delay_ms: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentServiceConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub receipt_model: String,
    pub layout_model: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_polls: usize,
}

impl Default for DocumentServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: "2023-07-31".to_string(),
            receipt_model: "prebuilt-receipt".to_string(),
            layout_model: "prebuilt-layout".to_string(),
            request_timeout_secs: 300,
            poll_interval_ms: 1000,
            max_polls: 120,
        }
    }
}
