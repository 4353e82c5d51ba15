// Test fixtures: small PDFs built with lopdf and an in-process rasterizer
use super::lopdf_helper::{page_ids, page_size};
use super::page_renderer::{PdfSource, Rasterizer};
use crate::types::{BankError, Result};
use image::{Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// One inner vec per page; each entry is drawn with `Tm` at (x, y).
pub fn build_pdf(pages: &[Vec<(i64, i64, &str)>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for runs in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(11)]),
        ];
        for (x, y, text) in runs {
            operations.push(Operation::new(
                "Tm",
                vec![
                    Object::Integer(1),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(1),
                    Object::Integer(*x),
                    Object::Integer(*y),
                ],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        }
        operations.push(Operation::new("ET", vec![]));
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

/// Renders every page as plain white at the requested scale.
pub struct WhitePages;

impl Rasterizer for WhitePages {
    fn render_page(&self, source: &PdfSource, page: u32, scale: f32) -> Result<RgbaImage> {
        let (_, id) = page_ids(&source.document)
            .into_iter()
            .find(|(index, _)| *index == page)
            .ok_or_else(|| BankError::Extraction(format!("no page {}", page)))?;
        let (w, h) = page_size(&source.document, id);
        Ok(RgbaImage::from_pixel(
            (w * scale) as u32,
            (h * scale) as u32,
            Rgba([255, 255, 255, 255]),
        ))
    }
}

/// White pages with a dark column every 4 px, so any crop counts as content.
pub struct StripedPages;

impl Rasterizer for StripedPages {
    fn render_page(&self, source: &PdfSource, page: u32, scale: f32) -> Result<RgbaImage> {
        let mut img = WhitePages.render_page(source, page, scale)?;
        let height = img.height();
        for x in (0..img.width()).step_by(4) {
            for y in 0..height {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        Ok(img)
    }
}

/// Every render fails, as when pdftoppm is missing.
pub struct BrokenRenderer;

impl Rasterizer for BrokenRenderer {
    fn render_page(&self, _source: &PdfSource, page: u32, _scale: f32) -> Result<RgbaImage> {
        Err(BankError::Extraction(format!("cannot render page {}", page)))
    }
}
