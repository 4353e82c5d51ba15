// Configuration for the bank builder: TOML file plus environment overrides
use crate::types::{BankError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "bank_builder.toml";
pub const DB_PATH_ENV: &str = "BANK_BUILDER_DB";
pub const GITHUB_TOKEN_ENV: &str = "BANK_BUILDER_GITHUB_TOKEN";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BuilderConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub crop: CropConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Layout constants are tuned for single-column exam papers. Multi-column
/// layouts are best effort.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Leading pages ignored by positional extraction (cover/instructions).
    #[serde(default = "default_skip_pages")]
    pub skip_pages: usize,
    /// Scale used when rasterizing pages for cropping (1.0 = 72 dpi).
    #[serde(default = "default_render_scale")]
    pub render_scale: f32,
    /// Fragments at or below this y (PDF units from the page bottom) are footer.
    #[serde(default = "default_footer_cutoff")]
    pub footer_cutoff: f32,
    /// Width of the band right of the leftmost fragment where question numbers sit.
    #[serde(default = "default_left_band_width")]
    pub left_band_width: f32,
    /// Below this many extracted characters the router switches to OCR.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
    #[serde(default = "default_ocr_scale")]
    pub ocr_scale: f32,
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: String,
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
}

fn default_skip_pages() -> usize { 1 }
fn default_render_scale() -> f32 { 1.5 }
fn default_footer_cutoff() -> f32 { 60.0 }
fn default_left_band_width() -> f32 { 40.0 }
fn default_min_text_chars() -> usize { 50 }
fn default_ocr_scale() -> f32 { 2.0 }
fn default_ocr_language() -> String { "eng".to_string() }
fn default_pdftoppm() -> String { "pdftoppm".to_string() }
fn default_tesseract() -> String { "tesseract".to_string() }

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            skip_pages: default_skip_pages(),
            render_scale: default_render_scale(),
            footer_cutoff: default_footer_cutoff(),
            left_band_width: default_left_band_width(),
            min_text_chars: default_min_text_chars(),
            ocr_scale: default_ocr_scale(),
            ocr_language: default_ocr_language(),
            pdftoppm: default_pdftoppm(),
            tesseract: default_tesseract(),
        }
    }
}

/// Pixel constants for question crops, in rendered-canvas pixels.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CropConfig {
    #[serde(default = "default_vertical_margin")]
    pub vertical_margin: u32,
    #[serde(default = "default_horizontal_inset")]
    pub horizontal_inset: u32,
    #[serde(default = "default_min_height")]
    pub min_height: u32,
    #[serde(default = "default_blank_stride")]
    pub blank_stride: u32,
    #[serde(default = "default_blank_luminance")]
    pub blank_luminance: f32,
    #[serde(default = "default_blank_ratio")]
    pub blank_ratio: f32,
}

fn default_vertical_margin() -> u32 { 12 }
fn default_horizontal_inset() -> u32 { 24 }
fn default_min_height() -> u32 { 30 }
fn default_blank_stride() -> u32 { 8 }
fn default_blank_luminance() -> f32 { 245.0 }
fn default_blank_ratio() -> f32 { 0.02 }

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            vertical_margin: default_vertical_margin(),
            horizontal_inset: default_horizontal_inset(),
            min_height: default_min_height(),
            blank_stride: default_blank_stride(),
            blank_luminance: default_blank_luminance(),
            blank_ratio: default_blank_ratio(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        if let Ok(p) = env::var(DB_PATH_ENV) {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        if let Some(p) = &self.db_path {
            return p.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bank-builder")
            .join("bank.sqlite3")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_remote_path")]
    pub path: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_branch() -> String { "main".to_string() }
fn default_remote_path() -> String { "bank_template.json".to_string() }
fn default_api_base() -> String { "https://api.github.com".to_string() }
fn default_endpoint() -> String { "http://localhost:5173/save-bank".to_string() }

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            path: default_remote_path(),
            api_base: default_api_base(),
            endpoint: default_endpoint(),
        }
    }
}

impl BuilderConfig {
    /// Loads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BankError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| BankError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// The publish token only ever comes from the environment.
pub fn github_token() -> Option<String> {
    env::var(GITHUB_TOKEN_ENV).ok().filter(|t| !t.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let cfg = BuilderConfig::from_toml("").unwrap();
        assert_eq!(cfg.extraction.skip_pages, 1);
        assert_eq!(cfg.extraction.footer_cutoff, 60.0);
        assert_eq!(cfg.crop.vertical_margin, 12);
        assert_eq!(cfg.crop.horizontal_inset, 24);
        assert_eq!(cfg.publish.branch, "main");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let cfg = BuilderConfig::from_toml(
            "[extraction]\nleft_band_width = 55.0\nskip_pages = 0\n\n[crop]\nblank_ratio = 0.05\n",
        )
        .unwrap();
        assert_eq!(cfg.extraction.left_band_width, 55.0);
        assert_eq!(cfg.extraction.skip_pages, 0);
        assert_eq!(cfg.extraction.min_text_chars, 50);
        assert_eq!(cfg.crop.blank_ratio, 0.05);
        assert_eq!(cfg.crop.blank_stride, 8);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = BuilderConfig::from_toml("[extraction\n").unwrap_err();
        assert!(matches!(err, BankError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BuilderConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.extraction.ocr_language, "eng");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let mut cfg = BuilderConfig::default();
        cfg.publish.owner = "school".into();
        cfg.save(&path).unwrap();
        let loaded = BuilderConfig::load(&path).unwrap();
        assert_eq!(loaded.publish, cfg.publish);
    }
}
