// Review table: extracted candidates awaiting per-row edits and an explicit commit
use crate::bank::BankRepository;
use crate::pdf_extraction::{Candidate, ExtractionMethod, ExtractionResult, Provenance};
use crate::types::{BankError, Question, Result, SectionId, CHOICE_COUNT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRow {
    /// Rows start unchecked; only checked rows are committed.
    #[serde(default)]
    pub include: bool,
    pub section: SectionId,
    pub topic: String,
    pub text: String,
    pub choices: [String; CHOICE_COUNT],
    #[serde(default)]
    pub answer: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl From<Candidate> for ReviewRow {
    fn from(c: Candidate) -> Self {
        Self {
            include: false,
            section: c.section,
            topic: c.topic,
            text: c.text,
            choices: c.choices,
            answer: c.answer,
            image: c.image,
            provenance: c.provenance,
        }
    }
}

impl ReviewRow {
    /// No text and no choices. Such rows only make sense with an image.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.choices.iter().all(|c| c.trim().is_empty())
    }

    pub fn to_question(&self) -> Question {
        Question {
            id: None,
            topic: self.topic.clone(),
            text: self.text.clone(),
            choices: self.choices.clone(),
            answer: self.answer,
            image: self.image.clone(),
        }
        .tidy()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewTable {
    /// File the rows were extracted from.
    pub source: String,
    pub method: ExtractionMethod,
    pub rows: Vec<ReviewRow>,
}

impl ReviewTable {
    pub fn from_extraction(source: impl Into<String>, result: ExtractionResult) -> Self {
        Self {
            source: source.into(),
            method: result.method,
            rows: result.candidates.into_iter().map(ReviewRow::from).collect(),
        }
    }

    pub fn select_all(&mut self, include: bool) {
        for row in &mut self.rows {
            row.include = include;
        }
    }

    pub fn row_mut(&mut self, index: usize) -> Result<&mut ReviewRow> {
        let len = self.rows.len();
        self.rows
            .get_mut(index)
            .ok_or_else(|| BankError::NotFound(format!("review row {} (table has {})", index + 1, len)))
    }

    pub fn set_include(&mut self, index: usize, include: bool) -> Result<()> {
        self.row_mut(index)?.include = include;
        Ok(())
    }

    pub fn selected_count(&self) -> usize {
        self.rows.iter().filter(|r| r.include).count()
    }

    /// Checked rows as questions, skipping blank rows that have no image.
    pub fn selected_questions(&self) -> Vec<(SectionId, Question)> {
        self.rows
            .iter()
            .filter(|r| r.include)
            .filter(|r| {
                let keep = !r.is_blank() || r.image.is_some();
                if !keep {
                    debug!("skipping blank review row without image");
                }
                keep
            })
            .map(|r| (r.section, r.to_question()))
            .collect()
    }

    /// Writes the checked rows into the custom bank in one store update.
    pub fn commit(&self, repo: &mut BankRepository) -> Result<usize> {
        let items = self.selected_questions();
        if items.is_empty() {
            return Ok(0);
        }
        let added = repo.add_questions(items)?;
        info!(source = %self.source, added, "committed review rows");
        Ok(added)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| BankError::Config(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| BankError::ImportValidation(format!("{}: {}", path.display(), e)))
    }
}
