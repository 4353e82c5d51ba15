// OCR fallback: rasterize every page and recognize it with tesseract
use super::normalize::normalize;
use super::page_renderer::{PdfSource, Rasterizer};
use super::progress::ProgressReporter;
use crate::config::ExtractionConfig;
use crate::types::{BankError, Result};
use image::{ImageFormat, RgbaImage};
use std::process::Command;
use tempfile::TempDir;

/// Text recognition for one rendered page. `on_progress` receives the
/// fraction of the page done, 0.0..=1.0.
pub trait Recognizer: Send + Sync {
    fn recognize(
        &self,
        image: &RgbaImage,
        language: &str,
        on_progress: &mut dyn FnMut(f32),
    ) -> std::result::Result<String, String>;
}

/// Runs the `tesseract` binary on a temporary PNG.
pub struct TesseractCli {
    binary: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl Recognizer for TesseractCli {
    fn recognize(
        &self,
        image: &RgbaImage,
        language: &str,
        on_progress: &mut dyn FnMut(f32),
    ) -> std::result::Result<String, String> {
        on_progress(0.0);
        let dir = TempDir::new().map_err(|e| e.to_string())?;
        let input = dir.path().join("page.png");
        image
            .save_with_format(&input, ImageFormat::Png)
            .map_err(|e| e.to_string())?;

        let output = Command::new(&self.binary)
            .arg(&input)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()
            .map_err(|e| format!("failed to run {}: {}", self.binary, e))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        on_progress(1.0);
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Recognizes every page at `ocr_scale` and returns the normalized text.
///
/// Progress for page `i` of `n` covers `(i-1)/n .. i/n`, with the
/// recognizer's own progress scaled into that slice and capped at 99 until
/// the run completes. Any failure aborts the run and discards earlier pages.
pub fn ocr_extract(
    source: &PdfSource,
    rasterizer: &dyn Rasterizer,
    recognizer: &dyn Recognizer,
    cfg: &ExtractionConfig,
    progress: &ProgressReporter,
) -> Result<String> {
    let total = source.page_count();
    let mut pages_text = Vec::with_capacity(total as usize);

    for page in 1..=total {
        let slice_start = (page - 1) as f32 / total as f32 * 100.0;
        let slice = 100.0 / total as f32;

        progress.report(slice_start, format!("Rendering page {}/{}…", page, total));
        let image = rasterizer
            .render_page(source, page, cfg.ocr_scale)
            .map_err(|e| BankError::Extraction(format!("OCR failed: {}", e)))?;

        let stage = format!("OCR page {}/{}…", page, total);
        progress.report(slice_start, stage.clone());
        let mut on_progress = |fraction: f32| {
            let percent = (slice_start + fraction.clamp(0.0, 1.0) * slice).min(99.0);
            progress.report(percent, stage.clone());
        };
        let text = recognizer
            .recognize(&image, &cfg.ocr_language, &mut on_progress)
            .map_err(|message| BankError::Recognition { page, message })?;
        tracing::debug!(page, chars = text.len(), "page recognized");
        pages_text.push(text);
    }

    progress.report(100.0, "OCR complete");
    Ok(normalize(&pages_text.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_extraction::fixtures::{build_pdf, WhitePages};
    use std::sync::Mutex;

    // Reports halfway progress and fails on the configured call.
    struct ScriptedRecognizer {
        fail_on_call: Option<usize>,
        calls: Mutex<usize>,
    }

    impl ScriptedRecognizer {
        fn new(fail_on_call: Option<usize>) -> Self {
            Self {
                fail_on_call,
                calls: Mutex::new(0),
            }
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn recognize(
            &self,
            _image: &RgbaImage,
            _language: &str,
            on_progress: &mut dyn FnMut(f32),
        ) -> std::result::Result<String, String> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            on_progress(0.5);
            if Some(*calls) == self.fail_on_call {
                return Err("engine crashed".into());
            }
            Ok(format!("page\u{00A0}{}  text.", calls))
        }
    }

    fn two_page_source() -> PdfSource {
        PdfSource::from_bytes(&build_pdf(&[vec![(40, 700, "cover")], vec![(40, 700, "1")]])).unwrap()
    }

    #[test]
    fn test_ocr_joins_pages_and_normalizes() {
        let source = two_page_source();
        let (progress, mut rx) = ProgressReporter::channel();
        let text = ocr_extract(
            &source,
            &WhitePages,
            &ScriptedRecognizer::new(None),
            &ExtractionConfig::default(),
            &progress,
        )
        .unwrap();
        assert_eq!(text, "page 1 text.\npage 2 text.");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events[0].stage, "Rendering page 1/2…");
        assert!(events.iter().any(|e| e.stage == "OCR page 2/2…" && e.percent == 75));
        assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(events.last().unwrap().percent, 100);
    }

    #[test]
    fn test_recognition_failure_names_page() {
        let source = two_page_source();
        let err = ocr_extract(
            &source,
            &WhitePages,
            &ScriptedRecognizer::new(Some(2)),
            &ExtractionConfig::default(),
            &ProgressReporter::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, BankError::Recognition { page: 2, .. }));
    }

    #[test]
    fn test_tesseract_missing_binary_is_error() {
        let engine = TesseractCli::new("definitely-not-a-tesseract-binary");
        let img = RgbaImage::new(2, 2);
        let err = engine.recognize(&img, "eng", &mut |_| {}).unwrap_err();
        assert!(err.contains("failed to run"));
    }
}
