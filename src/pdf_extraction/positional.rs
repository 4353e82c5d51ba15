// Positional text extraction: content-stream text runs with page coordinates
use super::lopdf_helper::{as_number, decode_pdf_string, page_ids, page_size};
use crate::config::ExtractionConfig;
use crate::types::{BankError, Result};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use std::cmp::Ordering;

/// A run of text as drawn by one show-text operator. Coordinates are PDF
/// user space: origin bottom-left, y grows upwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_height: f32,
}

#[derive(Debug, Clone)]
pub struct PositionedPage {
    /// 1-based page number within the document.
    pub index: u32,
    pub width: f32,
    pub height: f32,
    /// Reading order: descending y, then ascending x.
    pub fragments: Vec<TextFragment>,
}

impl PositionedPage {
    pub fn text_chars(&self) -> usize {
        self.fragments
            .iter()
            .map(|f| f.text.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }
}

/// Runs every page after the first `skip_pages` through the text interpreter
/// and drops fragments at or below the footer cutoff.
pub fn extract_positional(doc: &Document, cfg: &ExtractionConfig) -> Result<Vec<PositionedPage>> {
    let mut pages = Vec::new();
    for (index, page_id) in page_ids(doc) {
        if (index as usize) <= cfg.skip_pages {
            continue;
        }
        let (width, height) = page_size(doc, page_id);
        let mut fragments: Vec<TextFragment> = page_fragments(doc, page_id, index)?
            .into_iter()
            .filter(|f| f.y > cfg.footer_cutoff)
            .collect();
        sort_reading_order(&mut fragments);
        tracing::debug!(page = index, fragments = fragments.len(), "positional page");
        pages.push(PositionedPage {
            index,
            width,
            height,
            fragments,
        });
    }
    Ok(pages)
}

pub fn sort_reading_order(fragments: &mut [TextFragment]) {
    fragments.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
    });
}

/// Joins fragments into lines (same baseline within a small tolerance) and
/// pages into one text, for the plain-text parser.
pub fn plain_text(pages: &[PositionedPage]) -> String {
    const SAME_LINE: f32 = 2.0;
    let mut lines: Vec<String> = Vec::new();
    for page in pages {
        let mut current: Option<(f32, Vec<&str>)> = None;
        for fragment in &page.fragments {
            match &mut current {
                Some((y, parts)) if (*y - fragment.y).abs() < SAME_LINE => {
                    parts.push(fragment.text.trim());
                }
                _ => {
                    if let Some((_, parts)) = current.take() {
                        lines.push(parts.join(" "));
                    }
                    current = Some((fragment.y, vec![fragment.text.trim()]));
                }
            }
        }
        if let Some((_, parts)) = current {
            lines.push(parts.join(" "));
        }
    }
    lines.join("\n")
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translation(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

struct TextState {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f32,
    leading: f32,
    in_text: bool,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            in_text: false,
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translation(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = if self.leading > 0.0 {
            self.leading
        } else {
            self.font_size * 1.2
        };
        self.move_line(0.0, -leading);
    }

    fn fragment(&self, text: String) -> TextFragment {
        let m = multiply(&self.text_matrix, &self.ctm);
        TextFragment {
            text,
            x: m[4],
            y: m[5],
            font_height: self.font_size * m[2].hypot(m[3]),
        }
    }

    // Glyph widths are unknown without font metrics; half an em per char.
    fn advance(&mut self, chars: usize, adjustment: f32) {
        let tx = chars as f32 * self.font_size * 0.5 - adjustment / 1000.0 * self.font_size;
        self.text_matrix = multiply(&translation(tx, 0.0), &self.text_matrix);
    }
}

fn page_fragments(doc: &Document, page_id: ObjectId, index: u32) -> Result<Vec<TextFragment>> {
    let data = doc
        .get_page_content(page_id)
        .map_err(|e| BankError::Extraction(format!("page {}: {}", index, e)))?;
    let content = Content::decode(&data)
        .map_err(|e| BankError::Extraction(format!("page {}: {}", index, e)))?;

    let mut state = TextState::new();
    let mut fragments = Vec::new();

    for op in &content.operations {
        let num = |i: usize| op.operands.get(i).and_then(as_number);
        match op.operator.as_str() {
            "q" => state.ctm_stack.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.ctm_stack.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = six_numbers(&op.operands) {
                    state.ctm = multiply(&m, &state.ctm);
                }
            }
            "BT" => {
                state.in_text = true;
                state.text_matrix = IDENTITY;
                state.line_matrix = IDENTITY;
            }
            "ET" => state.in_text = false,
            "Tf" => {
                if let Some(size) = num(1) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = num(0) {
                    state.leading = leading;
                }
            }
            "Td" => state.move_line(num(0).unwrap_or(0.0), num(1).unwrap_or(0.0)),
            "TD" => {
                let ty = num(1).unwrap_or(0.0);
                state.leading = -ty;
                state.move_line(num(0).unwrap_or(0.0), ty);
            }
            "Tm" => {
                if let Some(m) = six_numbers(&op.operands) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
            }
            "T*" => state.next_line(),
            "Tj" | "'" | "\"" => {
                if !state.in_text {
                    continue;
                }
                if op.operator != "Tj" {
                    state.next_line();
                }
                let operand = if op.operator == "\"" { 2 } else { 0 };
                if let Some(Object::String(bytes, _)) = op.operands.get(operand) {
                    let text = decode_pdf_string(bytes);
                    let chars = text.chars().count();
                    if !text.trim().is_empty() {
                        fragments.push(state.fragment(text));
                    }
                    state.advance(chars, 0.0);
                }
            }
            "TJ" => {
                if !state.in_text {
                    continue;
                }
                let Some(Ok(items)) = op.operands.first().map(|o| o.as_array()) else {
                    continue;
                };
                let start = state.fragment(String::new());
                let mut combined = String::new();
                for item in items {
                    match item {
                        Object::String(bytes, _) => {
                            let text = decode_pdf_string(bytes);
                            let chars = text.chars().count();
                            combined.push_str(&text);
                            state.advance(chars, 0.0);
                        }
                        other => {
                            if let Some(adjust) = as_number(other) {
                                // Large negative kerning is a word gap.
                                if adjust < -200.0 && !combined.ends_with(' ') {
                                    combined.push(' ');
                                }
                                state.advance(0, adjust);
                            }
                        }
                    }
                }
                if !combined.trim().is_empty() {
                    fragments.push(TextFragment {
                        text: combined,
                        ..start
                    });
                }
            }
            _ => {}
        }
    }
    Ok(fragments)
}

fn six_numbers(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, operand) in m.iter_mut().zip(operands) {
        *slot = as_number(operand)?;
    }
    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, x: f32, y: f32) -> TextFragment {
        TextFragment {
            text: text.into(),
            x,
            y,
            font_height: 10.0,
        }
    }

    #[test]
    fn test_reading_order_is_top_down_left_right() {
        let mut frags = vec![frag("c", 50.0, 100.0), frag("b", 90.0, 700.0), frag("a", 40.0, 700.0)];
        sort_reading_order(&mut frags);
        let order: Vec<&str> = frags.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn test_plain_text_groups_baselines() {
        let page = PositionedPage {
            index: 2,
            width: 612.0,
            height: 792.0,
            fragments: vec![frag("1", 40.0, 700.0), frag("What?", 60.0, 700.5), frag("A) x", 60.0, 680.0)],
        };
        assert_eq!(plain_text(&[page]), "1 What?\nA) x");
    }

    #[test]
    fn test_matrix_translation_composes() {
        let m = multiply(&translation(10.0, 20.0), &[2.0, 0.0, 0.0, 2.0, 5.0, 5.0]);
        assert_eq!(m, [2.0, 0.0, 0.0, 2.0, 25.0, 45.0]);
    }
}
