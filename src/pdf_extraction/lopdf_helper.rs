// lopdf helper - document loading and page geometry
use crate::types::{BankError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::Path;

/// US Letter, used when a page carries no usable MediaBox.
pub const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Load a PDF document using lopdf
pub fn load_pdf(path: &Path) -> Result<Document> {
    let document = Document::load(path)
        .map_err(|e| BankError::Extraction(format!("{}: {}", path.display(), e)))?;
    ensure_readable(document)
}

pub fn load_pdf_mem(bytes: &[u8]) -> Result<Document> {
    let document = Document::load_mem(bytes)?;
    ensure_readable(document)
}

fn ensure_readable(document: Document) -> Result<Document> {
    if document.trailer.get(b"Encrypt").is_ok() {
        return Err(BankError::Extraction("document is encrypted".into()));
    }
    if document.get_pages().is_empty() {
        return Err(BankError::Extraction("document has no pages".into()));
    }
    Ok(document)
}

pub fn page_count(doc: &Document) -> u32 {
    doc.get_pages().len() as u32
}

/// Page object ids in page order, 1-based page numbers.
pub fn page_ids(doc: &Document) -> Vec<(u32, ObjectId)> {
    doc.get_pages().into_iter().collect()
}

/// Width and height in PDF points, following inherited MediaBox entries.
pub fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = doc.get_dictionary(page_id).ok();
    // Guard against Parent cycles in broken files.
    for _ in 0..32 {
        let Some(dict) = current else { break };
        if let Some(size) = media_box(doc, dict) {
            return size;
        }
        current = match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => doc.get_dictionary(*parent).ok(),
            _ => None,
        };
    }
    DEFAULT_PAGE_SIZE
}

fn media_box(doc: &Document, dict: &Dictionary) -> Option<(f32, f32)> {
    let obj = resolve(doc, dict.get(b"MediaBox").ok()?)?;
    let values: Vec<f32> = obj
        .as_array()
        .ok()?
        .iter()
        .filter_map(|o| resolve(doc, o).and_then(as_number))
        .collect();
    if values.len() != 4 {
        return None;
    }
    let width = (values[2] - values[0]).abs();
    let height = (values[3] - values[1]).abs();
    if width > 0.0 && height > 0.0 {
        Some((width, height))
    } else {
        None
    }
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Decodes a PDF string operand: UTF-16BE when it carries a BOM, otherwise
/// bytes map one-to-one onto Latin-1.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_latin1_and_utf16() {
        assert_eq!(decode_pdf_string(b"Price"), "Price");
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "A\u{e9}");
    }

    #[test]
    fn test_garbage_bytes_are_extraction_error() {
        let err = load_pdf_mem(b"not a pdf at all").unwrap_err();
        assert!(matches!(err, BankError::Extraction(_)));
    }
}
