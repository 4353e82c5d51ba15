// PDF extraction module
pub mod classify;
pub mod extraction_router;
pub mod image_cropper;
pub mod lopdf_helper;
pub mod normalize;
pub mod ocr_engine;
pub mod page_renderer;
pub mod positional;
pub mod progress;
pub mod segmenter;

#[cfg(test)]
pub(crate) mod fixtures;

pub use classify::guess_section;
pub use extraction_router::{
    Candidate, ExtractionMethod, ExtractionResult, ExtractionRouter, ExtractionStrategy,
    ImportRequest,
};
pub use normalize::normalize;
pub use page_renderer::{PdfSource, PdftoppmRenderer, Rasterizer};
pub use ocr_engine::{Recognizer, TesseractCli};
pub use progress::{ProgressEvent, ProgressReporter};
pub use segmenter::Provenance;
