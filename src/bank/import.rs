// JSON import: normalizes both accepted bank schemas and merges into the custom bank
use super::model::{Bank, Section};
use crate::types::{
    tidy_topic, BankError, Question, Result, SectionId, Topic, CHOICE_COUNT, DEFAULT_TOPIC,
};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub duplicates: usize,
}

fn invalid(msg: impl Into<String>) -> BankError {
    BankError::ImportValidation(msg.into())
}

/// Parses imported JSON into a bank.
///
/// Accepts the object form keyed by section id, or a flat array of
/// `{section, topic, text, choices, answer}` records (section defaults to
/// `s2`). Only additions are imported: `removed` and `overrides` in an object
/// form are ignored. Any malformed record fails the whole import.
pub fn normalize_imported_bank(json: &str) -> Result<Bank> {
    let data: Value = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
    match data {
        Value::Array(records) => from_records(&records),
        Value::Object(sections) => from_sections(&sections),
        other => Err(invalid(format!(
            "expected an object keyed by section or an array of questions, got {}",
            kind(&other)
        ))),
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn from_records(records: &[Value]) -> Result<Bank> {
    let mut bank = Bank::new();
    for (i, record) in records.iter().enumerate() {
        let obj = record
            .as_object()
            .ok_or_else(|| invalid(format!("record {}: expected an object", i)))?;
        let section = match obj.get("section") {
            None | Some(Value::Null) => SectionId::default(),
            Some(Value::String(s)) if s.trim().is_empty() => SectionId::default(),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| invalid(format!("record {}: unknown section '{}'", i, s)))?,
            Some(other) => {
                return Err(invalid(format!("record {}: section must be a string, got {}", i, kind(other))))
            }
        };
        let question = parse_question(obj).map_err(|e| invalid(format!("record {}: {}", i, e)))?;
        let target = bank.section_mut(section);
        target.ensure_topic(&question.topic);
        target.questions.push(question);
    }
    Ok(bank)
}

fn from_sections(sections: &Map<String, Value>) -> Result<Bank> {
    let mut bank = Bank::new();
    for (key, value) in sections {
        let id: SectionId = key
            .parse()
            .map_err(|_| invalid(format!("unknown section '{}'", key)))?;
        let obj = value
            .as_object()
            .ok_or_else(|| invalid(format!("{}: expected an object", key)))?;

        let mut section = Section::default();
        if let Some(topics) = obj.get("topics").and_then(Value::as_array) {
            for t in topics {
                if let Some(topic) = parse_topic(t) {
                    if !section.has_topic(&topic.id) {
                        section.topics.push(topic);
                    }
                }
            }
        }
        if let Some(questions) = obj.get("questions").and_then(Value::as_array) {
            for (i, q) in questions.iter().enumerate() {
                let q = q
                    .as_object()
                    .ok_or_else(|| invalid(format!("{} question {}: expected an object", key, i)))?;
                let question =
                    parse_question(q).map_err(|e| invalid(format!("{} question {}: {}", key, i, e)))?;
                section.ensure_topic(&question.topic);
                section.questions.push(question);
            }
        }
        bank.sections.insert(id, section);
    }
    Ok(bank)
}

// Topics come as {id, name} objects or bare strings.
fn parse_topic(value: &Value) -> Option<Topic> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(Topic::named_after(s.trim())),
        Value::Object(obj) => {
            let id = obj.get("id").and_then(Value::as_str)?.trim();
            if id.is_empty() {
                return None;
            }
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(id);
            Some(Topic {
                id: id.to_string(),
                name: name.to_string(),
            })
        }
        _ => None,
    }
}

fn parse_question(obj: &Map<String, Value>) -> std::result::Result<Question, String> {
    let image = obj
        .get("image")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);
    // Image-only questions carry their text in the picture.
    let text = obj
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty() || image.is_some())
        .ok_or("missing question text")?;

    let raw_choices = obj
        .get("choices")
        .and_then(Value::as_array)
        .ok_or("missing choices array")?;
    if raw_choices.len() < CHOICE_COUNT {
        return Err(format!("expected {} choices, got {}", CHOICE_COUNT, raw_choices.len()));
    }
    let mut choices: [String; CHOICE_COUNT] = Default::default();
    for (slot, value) in choices.iter_mut().zip(raw_choices) {
        *slot = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            other => return Err(format!("choice must be a string, got {}", kind(other))),
        };
    }

    let answer = match obj.get("answer") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .filter(|n| *n < CHOICE_COUNT as u64)
            .ok_or_else(|| format!("answer must be an integer 0..{}, got {}", CHOICE_COUNT - 1, v))?
            as u8,
    };

    let topic = obj.get("topic").and_then(Value::as_str).unwrap_or(DEFAULT_TOPIC);

    Ok(Question {
        id: None,
        topic: tidy_topic(topic),
        text: text.to_string(),
        choices,
        answer,
        image,
    })
}

/// Merges `incoming` into `custom`: topic union by id, questions appended
/// unless their content hash is already in that section's custom list.
pub fn merge_into(custom: &mut Bank, incoming: &Bank) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for (&id, section) in &incoming.sections {
        let target = custom.section_mut(id);
        for topic in &section.topics {
            if !target.has_topic(&topic.id) {
                target.topics.push(topic.clone());
            }
        }
        let mut seen: HashSet<_> = target.questions.iter().map(Question::content_hash).collect();
        for q in &section.questions {
            if seen.insert(q.content_hash()) {
                target.ensure_topic(&q.topic);
                target.questions.push(q.clone());
                summary.added += 1;
            } else {
                summary.duplicates += 1;
            }
        }
    }
    debug!("import merged {} questions, {} duplicates", summary.added, summary.duplicates);
    summary
}
