// Question image crops: page band between labels, rasterized and encoded as data URIs
use super::lopdf_helper::{page_ids, page_size};
use super::page_renderer::{PdfSource, Rasterizer};
use super::progress::ProgressReporter;
use super::segmenter::Provenance;
use crate::config::CropConfig;
use crate::types::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{imageops, ImageFormat, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;

/// PDF y (origin bottom-left) to canvas y (origin top-left) at `scale`.
pub fn pdf_to_canvas_y(page_height: f32, pdf_y: f32, scale: f32) -> f32 {
    (page_height - pdf_y) * scale
}

/// Cuts the band `[y_top, y_bottom]` of a rendered page, widened by the
/// vertical margin and narrowed by the horizontal inset. `None` when the band
/// is thinner than the minimum height.
pub fn crop_band(
    page: &RgbaImage,
    page_height: f32,
    provenance: &Provenance,
    scale: f32,
    cfg: &CropConfig,
) -> Option<RgbaImage> {
    let (width, height) = page.dimensions();
    let margin = cfg.vertical_margin as f32;
    let top = (pdf_to_canvas_y(page_height, provenance.y_top, scale) - margin).max(0.0);
    let bottom =
        (pdf_to_canvas_y(page_height, provenance.y_bottom, scale) + margin).min(height as f32);
    if bottom <= top {
        return None;
    }
    let crop_height = (bottom - top).floor() as u32;
    let crop_width = width.saturating_sub(cfg.horizontal_inset * 2);
    if crop_height < cfg.min_height || crop_width == 0 {
        return None;
    }
    let view = imageops::crop_imm(page, cfg.horizontal_inset, top.floor() as u32, crop_width, crop_height);
    Some(view.to_image())
}

/// Rec. 709 luma on a coarse grid. Blank when the share of sampled pixels
/// darker than the near-white threshold is under `blank_ratio`.
pub fn is_blank(image: &RgbaImage, cfg: &CropConfig) -> bool {
    let stride = cfg.blank_stride.max(1) as usize;
    let mut sampled = 0usize;
    let mut dark = 0usize;
    for y in (0..image.height()).step_by(stride) {
        for x in (0..image.width()).step_by(stride) {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            let luminance = 0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32;
            sampled += 1;
            if luminance < cfg.blank_luminance {
                dark += 1;
            }
        }
    }
    sampled == 0 || (dark as f32 / sampled as f32) < cfg.blank_ratio
}

pub fn to_data_uri(image: &RgbaImage) -> Result<String> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(&png)))
}

/// One data URI (or `None`) per provenance. Each source page is rendered once.
/// A page that fails to render leaves its questions without images.
pub fn attach_images(
    source: &PdfSource,
    rasterizer: &dyn Rasterizer,
    provenances: &[Option<Provenance>],
    scale: f32,
    cfg: &CropConfig,
    progress: &ProgressReporter,
) -> Vec<Option<String>> {
    let page_heights: HashMap<u32, f32> = page_ids(&source.document)
        .into_iter()
        .map(|(index, id)| (index, page_size(&source.document, id).1))
        .collect();
    let mut renders: HashMap<u32, Option<RgbaImage>> = HashMap::new();
    let total = provenances.len().max(1) as f32;

    provenances
        .iter()
        .enumerate()
        .map(|(i, provenance)| {
            let provenance = provenance.as_ref()?;
            progress.report(i as f32 / total * 100.0, format!("Cropping question {}/{}", i + 1, provenances.len()));
            let page = renders
                .entry(provenance.page)
                .or_insert_with(|| match rasterizer.render_page(source, provenance.page, scale) {
                    Ok(img) => Some(img),
                    Err(e) => {
                        tracing::warn!(page = provenance.page, error = %e, "page render failed, skipping crops");
                        None
                    }
                })
                .as_ref()?;
            let page_height = page_heights
                .get(&provenance.page)
                .copied()
                .unwrap_or(page.height() as f32 / scale);
            let crop = crop_band(page, page_height, provenance, scale, cfg)?;
            if is_blank(&crop, cfg) {
                tracing::debug!(page = provenance.page, y_top = provenance.y_top, "blank crop dropped");
                return None;
            }
            match to_data_uri(&crop) {
                Ok(uri) => Some(uri),
                Err(e) => {
                    tracing::warn!(error = %e, "crop encoding failed");
                    None
                }
            }
        })
        .collect()
}
