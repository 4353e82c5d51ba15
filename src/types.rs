// Core types and errors for the bank builder
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Every question carries exactly this many choices, lettered A..D.
pub const CHOICE_COUNT: usize = 4;
pub const CHOICE_LETTERS: [char; CHOICE_COUNT] = ['A', 'B', 'C', 'D'];

/// Topic id used when an import or edit leaves the topic blank.
pub const DEFAULT_TOPIC: &str = "general";

// Curriculum sections. The ids are externally meaningful and appear as
// object keys in every bank JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SectionId {
    S1,
    #[default]
    S2,
    S3,
    S4,
    S5,
    S6,
}

impl SectionId {
    pub const ALL: [SectionId; 6] = [
        SectionId::S1,
        SectionId::S2,
        SectionId::S3,
        SectionId::S4,
        SectionId::S5,
        SectionId::S6,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionId::S1 => "s1",
            SectionId::S2 => "s2",
            SectionId::S3 => "s3",
            SectionId::S4 => "s4",
            SectionId::S5 => "s5",
            SectionId::S6 => "s6",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SectionId::S1 => "Section 1: The basic economic problem",
            SectionId::S2 => "Section 2: The allocation of resources",
            SectionId::S3 => "Section 3: Microeconomic decision makers",
            SectionId::S4 => "Section 4: The government and the macroeconomy",
            SectionId::S5 => "Section 5: Economic development",
            SectionId::S6 => "Section 6: International trade and globalisation",
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionId {
    type Err = BankError;

    fn from_str(s: &str) -> Result<Self> {
        SectionId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BankError::InvalidQuestion(format!("unknown section '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
}

impl Topic {
    /// Topics created on first reference use the id as display name.
    pub fn named_after(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
        }
    }
}

/// Identity of a question for overrides, removals and de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionHash(pub String);

impl QuestionHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionHash {
    fn from(s: &str) -> Self {
        QuestionHash(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier stamped at bundle time. When absent the content
    /// hash stands in for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QuestionHash>,
    #[serde(default = "default_topic")]
    pub topic: String,
    pub text: String,
    pub choices: [String; CHOICE_COUNT],
    #[serde(default)]
    pub answer: u8,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_string_as_none"
    )]
    pub image: Option<String>,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

// Older banks store `"image": ""` for "no image".
fn empty_string_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

impl Question {
    pub fn new(topic: &str, text: &str, choices: [&str; CHOICE_COUNT], answer: u8) -> Self {
        Self {
            id: None,
            topic: topic.to_string(),
            text: text.to_string(),
            choices: choices.map(str::to_string),
            answer,
            image: None,
        }
    }

    /// Fingerprint over trimmed, lowercased text and choices. Topic and
    /// answer never participate; the image does only for image-only
    /// questions, whose text and choices are all blank.
    pub fn content_hash(&self) -> QuestionHash {
        let mut hasher = Sha256::new();
        hasher.update(hash_field(&self.text).as_bytes());
        for choice in &self.choices {
            hasher.update([0x1f]);
            hasher.update(hash_field(choice).as_bytes());
        }
        if self.is_image_only() {
            if let Some(image) = &self.image {
                hasher.update([0x1e]);
                hasher.update(image.as_bytes());
            }
        }
        let digest = format!("{:x}", hasher.finalize());
        QuestionHash(format!("q{}", &digest[..16]))
    }

    /// Blank text and choices: the question lives in its image.
    pub fn is_image_only(&self) -> bool {
        self.text.trim().is_empty() && self.choices.iter().all(|c| c.trim().is_empty())
    }

    pub fn identity(&self) -> QuestionHash {
        self.id.clone().unwrap_or_else(|| self.content_hash())
    }

    pub fn validate(&self) -> Result<()> {
        if usize::from(self.answer) >= CHOICE_COUNT {
            return Err(BankError::InvalidQuestion(format!(
                "answer index {} is outside 0..{}",
                self.answer, CHOICE_COUNT
            )));
        }
        Ok(())
    }

    /// Stricter check used for manual entry and edits.
    pub fn validate_complete(&self) -> Result<()> {
        self.validate()?;
        if self.text.trim().is_empty() {
            return Err(BankError::InvalidQuestion("question text is empty".into()));
        }
        if let Some(pos) = self.choices.iter().position(|c| c.trim().is_empty()) {
            return Err(BankError::InvalidQuestion(format!(
                "choice {} is empty",
                CHOICE_LETTERS[pos]
            )));
        }
        Ok(())
    }

    pub fn answer_letter(&self) -> char {
        CHOICE_LETTERS
            .get(usize::from(self.answer))
            .copied()
            .unwrap_or('?')
    }

    /// Trims every text field and defaults a blank topic.
    pub fn tidy(mut self) -> Self {
        self.topic = tidy_topic(&self.topic);
        self.text = self.text.trim().to_string();
        for choice in self.choices.iter_mut() {
            *choice = choice.trim().to_string();
        }
        self
    }
}

fn hash_field(s: &str) -> String {
    s.trim().to_lowercase()
}

pub fn tidy_topic(topic: &str) -> String {
    let t = topic.trim();
    if t.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        t.to_string()
    }
}

/// Parses `A`..`D` (any case) or `0`..`3`.
pub fn parse_answer(s: &str) -> Result<u8> {
    let s = s.trim();
    if let Ok(n) = s.parse::<u8>() {
        if usize::from(n) < CHOICE_COUNT {
            return Ok(n);
        }
    }
    let mut chars = s.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(pos) = CHOICE_LETTERS.iter().position(|l| *l == c.to_ascii_uppercase()) {
            return Ok(pos as u8);
        }
    }
    Err(BankError::InvalidQuestion(format!("invalid answer '{}', expected A-D", s)))
}

/// Points at one question of the merged view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionRef {
    /// Index into the custom bank's question list for `section`.
    Custom { section: SectionId, index: usize },
    /// Default-bank question, addressed by identity.
    Default { section: SectionId, id: QuestionHash },
}

impl QuestionRef {
    pub fn section(&self) -> SectionId {
        match self {
            QuestionRef::Custom { section, .. } | QuestionRef::Default { section, .. } => *section,
        }
    }
}

impl fmt::Display for QuestionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionRef::Custom { section, index } => write!(f, "{}/custom:{}", section, index),
            QuestionRef::Default { section, id } => write!(f, "{}/default:{}", section, id),
        }
    }
}

impl FromStr for QuestionRef {
    type Err = BankError;

    /// Parses the `Display` form: `s2/custom:0` or `s2/default:<id>`.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || BankError::NotFound(format!("'{}' is not a question reference", s));
        let (section, rest) = s.trim().split_once('/').ok_or_else(bad)?;
        let section: SectionId = section.parse().map_err(|_| bad())?;
        match rest.split_once(':') {
            Some(("custom", index)) => Ok(QuestionRef::Custom {
                section,
                index: index.parse().map_err(|_| bad())?,
            }),
            Some(("default", id)) if !id.is_empty() => Ok(QuestionRef::Default {
                section,
                id: QuestionHash::from(id),
            }),
            _ => Err(bad()),
        }
    }
}

/// New field values for a question, including its (possibly new) section.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionEdit {
    pub section: SectionId,
    pub question: Question,
}

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Recognition failed on page {page}: {message}")]
    Recognition { page: u32, message: String },

    #[error("Import validation error: {0}")]
    ImportValidation(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Question not found: {0}")]
    NotFound(String),

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for BankError {
    fn from(e: lopdf::Error) -> Self {
        BankError::Extraction(e.to_string())
    }
}

impl From<image::ImageError> for BankError {
    fn from(e: image::ImageError) -> Self {
        BankError::Extraction(e.to_string())
    }
}

impl From<reqwest::Error> for BankError {
    fn from(e: reqwest::Error) -> Self {
        BankError::Publish(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ignores_padding_and_case() {
        let a = Question::new("t", "a ", ["b ", "c", "d", "e"], 0);
        let b = Question::new("t", "a", ["b", "c", "d", "e"], 0);
        let c = Question::new("other", "A", ["B", "c", "D", "e"], 3);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash(), c.content_hash());
        assert_eq!(a.content_hash(), a.content_hash());
    }

    #[test]
    fn test_hash_depends_on_choice_order() {
        let a = Question::new("t", "q", ["1", "2", "3", "4"], 0);
        let b = Question::new("t", "q", ["2", "1", "3", "4"], 0);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_identity_prefers_stamped_id() {
        let mut q = Question::new("t", "q", ["1", "2", "3", "4"], 0);
        let hash = q.content_hash();
        assert_eq!(q.identity(), hash);
        q.id = Some(QuestionHash::from("bundle-7"));
        assert_eq!(q.identity(), QuestionHash::from("bundle-7"));
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("b").unwrap(), 1);
        assert_eq!(parse_answer("D").unwrap(), 3);
        assert_eq!(parse_answer("2").unwrap(), 2);
        assert!(parse_answer("E").is_err());
        assert!(parse_answer("4").is_err());
    }

    #[test]
    fn test_section_round_trip_through_json_key() {
        let json = serde_json::to_string(&SectionId::S4).unwrap();
        assert_eq!(json, "\"s4\"");
        assert_eq!("S4".parse::<SectionId>().unwrap(), SectionId::S4);
        assert!("s9".parse::<SectionId>().is_err());
    }

    #[test]
    fn test_question_ref_parses_its_display_form() {
        let custom = QuestionRef::Custom {
            section: SectionId::S3,
            index: 2,
        };
        let default = QuestionRef::Default {
            section: SectionId::S6,
            id: QuestionHash::from("q0123abcd"),
        };
        for r in [custom, default] {
            assert_eq!(r.to_string().parse::<QuestionRef>().unwrap(), r);
        }
        assert!("s2/custom:x".parse::<QuestionRef>().is_err());
        assert!("s2/default:".parse::<QuestionRef>().is_err());
        assert!("q0123".parse::<QuestionRef>().is_err());
    }

    #[test]
    fn test_empty_image_reads_as_none() {
        let q: Question = serde_json::from_str(
            r#"{"topic":"x","text":"t","choices":["a","b","c","d"],"answer":1,"image":""}"#,
        )
        .unwrap();
        assert_eq!(q.image, None);
        assert_eq!(q.answer_letter(), 'B');
    }

    #[test]
    fn test_validate_complete_rejects_blank_choice() {
        let q = Question::new("t", "text", ["a", " ", "c", "d"], 0);
        assert!(q.validate().is_ok());
        assert!(q.validate_complete().is_err());
    }

    #[test]
    fn test_image_only_hash_depends_on_image() {
        let blank = ["", "", "", ""];
        let mut a = Question::new("t", "", blank, 0);
        let mut b = a.clone();
        a.image = Some("data:image/png;base64,AA".into());
        b.image = Some("data:image/png;base64,BB".into());
        assert!(a.is_image_only());
        assert_ne!(a.content_hash(), b.content_hash());

        // with text the image is ignored again
        let mut c = Question::new("t", "q", ["1", "2", "3", "4"], 0);
        let plain = c.content_hash();
        c.image = Some("data:image/png;base64,AA".into());
        assert_eq!(c.content_hash(), plain);
    }
}
