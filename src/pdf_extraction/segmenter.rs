// MCQ segmentation: numbered blocks from positioned fragments, then stem/choice splitting
use super::normalize::clean_field;
use super::positional::PositionedPage;
use crate::config::ExtractionConfig;
use crate::types::CHOICE_COUNT;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}$").expect("valid regex"));

static GREEDY_CHOICES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^(.+?)\s+A[).\s]+(.+?)\s+B[).\s]+(.+?)\s+C[).\s]+(.+?)\s+D[).\s]+(.+)$",
    )
    .expect("valid regex")
});

static LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n|\s{2,}").expect("valid regex"));

static CHOICE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-D])[).\s]+(.+)$").expect("valid regex"));

static TEXT_BLOCK_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,3})[.)]?(?:\s+(.*))?$").expect("valid regex"));

// A fourth choice that swallowed the next question after line joining.
static TRAILING_QUESTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(.*?\S)\s+\d{1,3}[.)]?\s+(.+\s+A[).\s]+.+)$").expect("valid regex")
});

/// A numbered region of one page. `y_top`/`y_bottom` are PDF units.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionBlock {
    pub page: u32,
    pub label: u32,
    pub y_top: f32,
    pub y_bottom: f32,
    pub raw_text: String,
}

impl QuestionBlock {
    pub fn provenance(&self) -> Provenance {
        Provenance {
            page: self.page,
            y_top: self.y_top,
            y_bottom: self.y_bottom,
        }
    }
}

/// Where a candidate came from, kept so its page band can be re-cropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub page: u32,
    pub y_top: f32,
    pub y_bottom: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitQuestion {
    pub stem: String,
    pub choices: [String; CHOICE_COUNT],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuestion {
    pub stem: String,
    pub choices: [String; CHOICE_COUNT],
    pub provenance: Option<Provenance>,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentReport {
    pub questions: Vec<ParsedQuestion>,
    pub blocks_detected: usize,
    /// Blocks dropped because four choices could not be found.
    pub misses: usize,
}

/// Groups fragments into blocks opened by a bare 1-3 digit label inside the
/// left band of each page. A block runs until the next label, or down to the
/// footer cutoff when it is the last on its page. Text before the first label
/// is ignored.
pub fn segment(pages: &[PositionedPage], cfg: &ExtractionConfig) -> Vec<QuestionBlock> {
    let mut blocks = Vec::new();
    for page in pages {
        let left_band = page
            .fragments
            .iter()
            .map(|f| f.x)
            .fold(f32::INFINITY, f32::min);

        let mut current: Option<(u32, f32, Vec<String>)> = None;
        for fragment in &page.fragments {
            let text = clean_field(&fragment.text);
            if text.is_empty() {
                continue;
            }
            let is_label =
                fragment.x <= left_band + cfg.left_band_width && LABEL.is_match(&text);
            if is_label {
                if let Some(open) = current.take() {
                    blocks.push(close_block(page.index, open, fragment.y));
                }
                let label = text.parse().unwrap_or_default();
                current = Some((label, fragment.y, Vec::new()));
            } else if let Some((_, _, parts)) = current.as_mut() {
                parts.push(text);
            }
        }
        if let Some(open) = current.take() {
            blocks.push(close_block(page.index, open, cfg.footer_cutoff));
        }
    }
    blocks
}

fn close_block(page: u32, (label, y_top, parts): (u32, f32, Vec<String>), y_bottom: f32) -> QuestionBlock {
    QuestionBlock {
        page,
        label,
        y_top,
        y_bottom,
        raw_text: parts.join(" "),
    }
}

/// Splits a block into stem and A-D choices. The single-pattern match is
/// tried first, then line-by-line matching. `None` unless all four choices
/// are found and non-empty.
pub fn split_choices(raw: &str) -> Option<SplitQuestion> {
    greedy_split(raw).or_else(|| line_split(raw))
}

fn greedy_split(raw: &str) -> Option<SplitQuestion> {
    let caps = GREEDY_CHOICES.captures(raw.trim())?;
    let stem = clean_field(&caps[1]);
    let choices = [
        clean_field(&caps[2]),
        clean_field(&caps[3]),
        clean_field(&caps[4]),
        clean_field(&caps[5]),
    ];
    if stem.is_empty() || choices.iter().any(|c| c.is_empty()) {
        return None;
    }
    Some(SplitQuestion { stem, choices })
}

fn line_split(raw: &str) -> Option<SplitQuestion> {
    let mut stem_lines: Vec<&str> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    let mut choices: [Option<String>; CHOICE_COUNT] = Default::default();

    for line in LINE_BREAKS.split(raw).map(str::trim).filter(|l| !l.is_empty()) {
        match CHOICE_LINE.captures(line) {
            Some(caps) => {
                let slot = usize::from(caps[1].as_bytes()[0] - b'A');
                // A second "A" means the earlier lettered lines were stem
                // prose ("A firm ...").
                if slot == 0 && choices.iter().any(Option::is_some) {
                    stem_lines = seen.clone();
                    choices = Default::default();
                }
                choices[slot] = Some(clean_field(&caps[2]));
            }
            None => stem_lines.push(line),
        }
        seen.push(line);
    }

    let [Some(a), Some(b), Some(c), Some(d)] = choices else {
        return None;
    };
    let choices = [a, b, c, d];
    if choices.iter().any(|c| c.is_empty()) {
        return None;
    }
    Some(SplitQuestion {
        stem: clean_field(&stem_lines.join(" ")),
        choices,
    })
}

/// Turns blocks into parsed questions. Blocks without four choices or with an
/// empty stem count as misses. In image-only mode every block is kept with
/// blank text, since only its position matters.
pub fn parse_blocks(blocks: &[QuestionBlock], image_only: bool) -> SegmentReport {
    let mut report = SegmentReport {
        blocks_detected: blocks.len(),
        ..Default::default()
    };
    for block in blocks {
        if image_only {
            report.questions.push(ParsedQuestion {
                stem: String::new(),
                choices: Default::default(),
                provenance: Some(block.provenance()),
            });
            continue;
        }
        match split_choices(&block.raw_text) {
            Some(split) if !split.stem.is_empty() => report.questions.push(ParsedQuestion {
                stem: split.stem,
                choices: split.choices,
                provenance: Some(block.provenance()),
            }),
            _ => {
                tracing::debug!(page = block.page, label = block.label, "block without four choices");
                report.misses += 1;
            }
        }
    }
    report
}

/// Parser for plain text (OCR output or flattened page text): a line that
/// starts with a 1-3 digit number opens a new question.
pub fn parse_questions_from_text(text: &str) -> SegmentReport {
    let mut raw_blocks: Vec<Vec<&str>> = Vec::new();
    for line in text.lines() {
        match TEXT_BLOCK_START.captures(line) {
            Some(caps) => {
                let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                raw_blocks.push(vec![rest]);
            }
            None => {
                if let Some(block) = raw_blocks.last_mut() {
                    block.push(line);
                }
            }
        }
    }

    let mut report = SegmentReport::default();
    for lines in raw_blocks {
        let mut pending = Some(lines.join("\n"));
        while let Some(body) = pending.take() {
            report.blocks_detected += 1;
            let Some(mut split) = split_choices(&body).filter(|s| !s.stem.is_empty()) else {
                report.misses += 1;
                continue;
            };
            if let Some((own, next)) = detach_trailing_question(&split.choices[3]) {
                split.choices[3] = own;
                pending = Some(next);
            }
            report.questions.push(ParsedQuestion {
                stem: split.stem,
                choices: split.choices,
                provenance: None,
            });
        }
    }
    report
}

fn detach_trailing_question(choice: &str) -> Option<(String, String)> {
    let caps = TRAILING_QUESTION.captures(choice)?;
    let next = caps[2].to_string();
    split_choices(&next)?;
    Some((clean_field(&caps[1]), next))
}
