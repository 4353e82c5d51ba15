// Extraction strategies and the router that picks between them
//
// Three strategies share one output contract (a list of candidate questions):
//   Positional - content-stream fragments, numbered blocks, page crops
//   Ocr        - rasterize + tesseract, then the plain-text parser
//   PlainText  - flattened page text through the plain-text parser
//
// The router runs OCR when asked to, or when the text layer is too thin to
// be worth segmenting, and falls back to PlainText when positional
// segmentation finds nothing.

use super::classify::guess_section;
use super::image_cropper::attach_images;
use super::ocr_engine::{ocr_extract, Recognizer, TesseractCli};
use super::page_renderer::{PdfSource, PdftoppmRenderer, Rasterizer};
use super::positional::{extract_positional, plain_text, PositionedPage};
use super::progress::ProgressReporter;
use super::segmenter::{parse_blocks, parse_questions_from_text, segment, ParsedQuestion, Provenance, SegmentReport};
use crate::config::BuilderConfig;
use crate::types::{BankError, Result, SectionId, CHOICE_COUNT, DEFAULT_TOPIC};
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Positional,
    Ocr,
    PlainText,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionMethod::Positional => "positional",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::PlainText => "plain-text",
        };
        f.write_str(name)
    }
}

/// A question as extracted, with guessed defaults for the fields a PDF does
/// not carry (section, topic, answer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub choices: [String; CHOICE_COUNT],
    pub answer: u8,
    pub section: SectionId,
    pub topic: String,
    pub image: Option<String>,
    pub provenance: Option<Provenance>,
}

impl From<ParsedQuestion> for Candidate {
    fn from(parsed: ParsedQuestion) -> Self {
        let section = guess_section(&format!("{} {}", parsed.stem, parsed.choices.join(" ")));
        Self {
            text: parsed.stem,
            choices: parsed.choices,
            answer: 0,
            section,
            topic: DEFAULT_TOPIC.to_string(),
            image: None,
            provenance: parsed.provenance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub method: ExtractionMethod,
    pub candidates: Vec<Candidate>,
    pub blocks_detected: usize,
    pub misses: usize,
}

impl ExtractionResult {
    fn from_report(method: ExtractionMethod, report: SegmentReport) -> Self {
        Self {
            method,
            blocks_detected: report.blocks_detected,
            misses: report.misses,
            candidates: report.questions.into_iter().map(Candidate::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportRequest {
    /// Skip the text layer entirely.
    pub force_ocr: bool,
    /// Switch to OCR when the text layer is below `min_text_chars`.
    pub auto_ocr: bool,
    /// Keep every numbered block with blank fields; only crops matter.
    pub image_only: bool,
}

impl Default for ImportRequest {
    fn default() -> Self {
        Self {
            force_ocr: false,
            auto_ocr: true,
            image_only: false,
        }
    }
}

pub struct StrategyContext<'a> {
    pub config: &'a BuilderConfig,
    pub progress: &'a ProgressReporter,
    pub image_only: bool,
    pages: OnceCell<Vec<PositionedPage>>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(config: &'a BuilderConfig, progress: &'a ProgressReporter, image_only: bool) -> Self {
        Self {
            config,
            progress,
            image_only,
            pages: OnceCell::new(),
        }
    }

    /// Positional pages of `source`, parsed on first use and shared by every
    /// strategy run under this context.
    pub fn pages(&self, source: &PdfSource) -> Result<&[PositionedPage]> {
        self.pages
            .get_or_try_init(|| extract_positional(&source.document, &self.config.extraction))
            .map(Vec::as_slice)
    }
}

pub trait ExtractionStrategy: Send + Sync {
    fn method(&self) -> ExtractionMethod;
    fn extract(&self, source: &PdfSource, ctx: &StrategyContext<'_>) -> Result<ExtractionResult>;
}

pub struct PositionalStrategy {
    rasterizer: Arc<dyn Rasterizer>,
}

impl PositionalStrategy {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self { rasterizer }
    }
}

impl ExtractionStrategy for PositionalStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Positional
    }

    fn extract(&self, source: &PdfSource, ctx: &StrategyContext<'_>) -> Result<ExtractionResult> {
        let cfg = &ctx.config.extraction;
        ctx.progress.report(5.0, "Extracting text positions…");
        let pages = ctx.pages(source)?;

        ctx.progress.report(60.0, "Grouping MCQs…");
        let report = parse_blocks(&segment(pages, cfg), ctx.image_only);
        let mut result = ExtractionResult::from_report(self.method(), report);

        let provenances: Vec<Option<Provenance>> =
            result.candidates.iter().map(|c| c.provenance).collect();
        let images = attach_images(
            source,
            self.rasterizer.as_ref(),
            &provenances,
            cfg.render_scale,
            &ctx.config.crop,
            &ctx.progress.scaled(60.0, 99.0),
        );
        for (candidate, image) in result.candidates.iter_mut().zip(images) {
            candidate.image = image;
        }
        Ok(result)
    }
}

pub struct OcrStrategy {
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
}

impl OcrStrategy {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            rasterizer,
            recognizer,
        }
    }
}

impl ExtractionStrategy for OcrStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn extract(&self, source: &PdfSource, ctx: &StrategyContext<'_>) -> Result<ExtractionResult> {
        let text = ocr_extract(
            source,
            self.rasterizer.as_ref(),
            self.recognizer.as_ref(),
            &ctx.config.extraction,
            ctx.progress,
        )?;
        Ok(ExtractionResult::from_report(
            self.method(),
            parse_questions_from_text(&text),
        ))
    }
}

pub struct PlainTextStrategy;

impl ExtractionStrategy for PlainTextStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::PlainText
    }

    fn extract(&self, source: &PdfSource, ctx: &StrategyContext<'_>) -> Result<ExtractionResult> {
        ctx.progress.report(5.0, "Extracting text…");
        let pages = ctx.pages(source)?;
        Ok(ExtractionResult::from_report(
            self.method(),
            parse_questions_from_text(&plain_text(pages)),
        ))
    }
}

/// Picks and runs strategies for one import. Cheap to clone; engines are
/// shared.
#[derive(Clone)]
pub struct ExtractionRouter {
    config: Arc<BuilderConfig>,
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
}

impl ExtractionRouter {
    /// Router backed by the pdftoppm and tesseract binaries named in config.
    pub fn new(config: BuilderConfig) -> Self {
        let rasterizer = Arc::new(PdftoppmRenderer::new(config.extraction.pdftoppm.clone()));
        let recognizer = Arc::new(TesseractCli::new(config.extraction.tesseract.clone()));
        Self::with_engines(config, rasterizer, recognizer)
    }

    pub fn with_engines(
        config: BuilderConfig,
        rasterizer: Arc<dyn Rasterizer>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            rasterizer,
            recognizer,
        }
    }

    /// Strategy for a document whose text layer holds `text_chars`
    /// non-whitespace characters.
    pub fn determine_strategy(&self, request: &ImportRequest, text_chars: usize) -> ExtractionMethod {
        if request.force_ocr
            || (request.auto_ocr && text_chars < self.config.extraction.min_text_chars)
        {
            ExtractionMethod::Ocr
        } else {
            ExtractionMethod::Positional
        }
    }

    /// Chain tried after `primary` yields no candidates.
    pub fn fallback_chain(primary: ExtractionMethod, request: &ImportRequest) -> Vec<ExtractionMethod> {
        match primary {
            ExtractionMethod::Positional if !request.image_only => vec![ExtractionMethod::PlainText],
            _ => vec![],
        }
    }

    fn strategy(&self, method: ExtractionMethod) -> Box<dyn ExtractionStrategy> {
        match method {
            ExtractionMethod::Positional => Box::new(PositionalStrategy::new(self.rasterizer.clone())),
            ExtractionMethod::Ocr => Box::new(OcrStrategy::new(
                self.rasterizer.clone(),
                self.recognizer.clone(),
            )),
            ExtractionMethod::PlainText => Box::new(PlainTextStrategy),
        }
    }

    pub fn extract(
        &self,
        source: &PdfSource,
        request: ImportRequest,
        progress: &ProgressReporter,
    ) -> Result<ExtractionResult> {
        let ctx = StrategyContext::new(&self.config, progress, request.image_only);

        let text_chars = if request.force_ocr {
            0
        } else {
            ctx.pages(source)?.iter().map(PositionedPage::text_chars).sum()
        };
        let primary = self.determine_strategy(&request, text_chars);
        tracing::info!(method = %primary, text_chars, "extracting");

        let mut result = self.strategy(primary).extract(source, &ctx)?;
        for fallback in Self::fallback_chain(primary, &request) {
            if !result.candidates.is_empty() {
                break;
            }
            tracing::info!(from = %result.method, to = %fallback, "no candidates, falling back");
            let blocks_detected = result.blocks_detected;
            let misses = result.misses;
            result = self.strategy(fallback).extract(source, &ctx)?;
            result.blocks_detected = result.blocks_detected.max(blocks_detected);
            result.misses = result.misses.max(misses);
        }

        progress.report(100.0, format!("Found {} questions", result.candidates.len()));
        Ok(result)
    }

    /// Opens and extracts `path` on the blocking pool so async callers stay
    /// responsive. Runs to completion; there is no cancellation.
    pub async fn extract_file(
        &self,
        path: PathBuf,
        request: ImportRequest,
        progress: ProgressReporter,
    ) -> Result<ExtractionResult> {
        let router = self.clone();
        tokio::task::spawn_blocking(move || {
            let source = PdfSource::open(&path)?;
            router.extract(&source, request, &progress)
        })
        .await
        .map_err(|e| BankError::Extraction(format!("extraction task failed: {}", e)))?
    }
}
