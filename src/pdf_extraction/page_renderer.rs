// Page rasterization through pdftoppm
use super::lopdf_helper::{load_pdf, load_pdf_mem};
use crate::types::{BankError, Result};
use image::RgbaImage;
use lopdf::Document;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

/// A parsed document plus a file path that external tools can read.
pub struct PdfSource {
    pub path: PathBuf,
    pub document: Document,
    // Keeps the backing file alive for sources built from bytes.
    _spill: Option<NamedTempFile>,
}

impl PdfSource {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            document: load_pdf(path)?,
            _spill: None,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let document = load_pdf_mem(bytes)?;
        let mut spill = tempfile::Builder::new().suffix(".pdf").tempfile()?;
        spill.write_all(bytes)?;
        spill.flush()?;
        Ok(Self {
            path: spill.path().to_path_buf(),
            document,
            _spill: Some(spill),
        })
    }

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }
}

/// Renders one page (1-based) at `scale` times 72 dpi.
pub trait Rasterizer: Send + Sync {
    fn render_page(&self, source: &PdfSource, page: u32, scale: f32) -> Result<RgbaImage>;
}

pub struct PdftoppmRenderer {
    binary: String,
}

impl PdftoppmRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl Rasterizer for PdftoppmRenderer {
    fn render_page(&self, source: &PdfSource, page: u32, scale: f32) -> Result<RgbaImage> {
        let temp_dir = TempDir::new()?;
        let output_prefix = temp_dir.path().join("page");
        let dpi = (72.0 * scale).round().max(1.0) as u32;

        tracing::debug!(page, dpi, "rendering page with {}", self.binary);
        let output = Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg(&source.path)
            .arg(&output_prefix)
            .output()
            .map_err(|e| BankError::Extraction(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BankError::Extraction(format!(
                "{} failed on page {}: {}",
                self.binary,
                page,
                stderr.trim()
            )));
        }

        let png = output_prefix.with_extension("png");
        let image = image::open(&png)
            .map_err(|e| BankError::Extraction(format!("page {} render unreadable: {}", page, e)))?;
        Ok(image.to_rgba8())
    }
}
