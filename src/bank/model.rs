// Bank JSON model: sections of topics, questions and the custom-bank diff fields
use crate::types::{BankError, Question, QuestionHash, Result, SectionId, Topic};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Soft-deleted default questions, by identity. Custom bank only.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub removed: BTreeSet<QuestionHash>,
    /// Replacement records for default questions, by identity. Custom bank only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<QuestionHash, Question>,
}

impl Section {
    pub fn has_topic(&self, id: &str) -> bool {
        self.topics.iter().any(|t| t.id == id)
    }

    /// Adds `id` as a topic named after itself unless it already exists.
    pub fn ensure_topic(&mut self, id: &str) {
        if !self.has_topic(id) {
            self.topics.push(Topic::named_after(id));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty() && self.removed.is_empty() && self.overrides.is_empty()
    }
}

/// Section id to section. Serializes as the bare JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bank {
    pub sections: BTreeMap<SectionId, Section>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a bank in object form.
    pub fn from_json(json: &str) -> Result<Self> {
        let bank: Bank = serde_json::from_str(json)
            .map_err(|e| BankError::ImportValidation(e.to_string()))?;
        bank.validate()?;
        Ok(bank)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| BankError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        for (id, section) in &self.sections {
            for q in section.questions.iter().chain(section.overrides.values()) {
                q.validate()
                    .map_err(|e| BankError::ImportValidation(format!("{}: {}", id, e)))?;
            }
        }
        Ok(())
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(&id)
    }

    pub fn section_mut(&mut self, id: SectionId) -> &mut Section {
        self.sections.entry(id).or_default()
    }

    pub fn questions(&self, id: SectionId) -> &[Question] {
        self.sections
            .get(&id)
            .map(|s| s.questions.as_slice())
            .unwrap_or(&[])
    }

    pub fn question_count(&self) -> usize {
        self.sections.values().map(|s| s.questions.len()).sum()
    }

    /// True when no section holds questions, removals or overrides.
    pub fn is_empty(&self) -> bool {
        self.sections.values().all(Section::is_empty)
    }

    /// Gives every question without an `id` its current content hash, so
    /// later upstream text edits do not orphan overrides. Returns how many
    /// ids were written.
    pub fn stamp_ids(&mut self) -> usize {
        let mut stamped = 0;
        for section in self.sections.values_mut() {
            for q in section.questions.iter_mut().filter(|q| q.id.is_none()) {
                q.id = Some(q.content_hash());
                stamped += 1;
            }
        }
        stamped
    }

    /// Finds a question of `section` by identity.
    pub fn find(&self, section: SectionId, id: &QuestionHash) -> Option<&Question> {
        self.questions(section).iter().find(|q| &q.identity() == id)
    }
}
