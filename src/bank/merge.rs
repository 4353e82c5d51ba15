// Merge/override engine: the custom bank as a diff over the read-only default bank
//
// Per section the custom bank holds three things: `removed` (default
// identities hidden from the view), `overrides` (replacement records for
// default identities) and `questions` (custom-authored additions). Every
// operation here writes only to the custom bank.

use super::model::{Bank, Section};
use crate::types::{
    tidy_topic, BankError, Question, QuestionEdit, QuestionHash, QuestionRef, Result, SectionId,
    Topic,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Default question shown as bundled.
    Default { id: QuestionHash },
    /// Default question shown through its override.
    Override { id: QuestionHash },
    /// Custom question at `index` of its section's list. `displaced` is the
    /// default identity it replaced by sharing a content hash.
    Custom {
        index: usize,
        displaced: Option<QuestionHash>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedEntry {
    pub section: SectionId,
    pub origin: Origin,
    pub question: Question,
}

impl MergedEntry {
    /// Reference for edit/remove/move calls on this entry.
    pub fn reference(&self) -> QuestionRef {
        match &self.origin {
            Origin::Default { id } | Origin::Override { id } => QuestionRef::Default {
                section: self.section,
                id: id.clone(),
            },
            Origin::Custom { index, .. } => QuestionRef::Custom {
                section: self.section,
                index: *index,
            },
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.origin, Origin::Custom { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSection {
    pub topics: Vec<Topic>,
    pub entries: Vec<MergedEntry>,
}

/// Read view over default + custom, with the origin of every entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedView {
    pub sections: BTreeMap<SectionId, MergedSection>,
}

/// Builds the merged view.
///
/// For each section: default questions in order, minus removed identities,
/// with overrides substituted; then custom questions. Entries are de-duplicated
/// by content hash keeping the first position, and a custom entry sharing a
/// hash with a default entry takes that default's slot.
pub fn merge_view(default: &Bank, custom: &Bank) -> MergedView {
    let empty = Section::default();
    let mut view = MergedView::default();

    let ids = default.sections.keys().chain(custom.sections.keys());
    for &section_id in ids {
        if view.sections.contains_key(&section_id) {
            continue;
        }
        let base = default.section(section_id).unwrap_or(&empty);
        let diff = custom.section(section_id).unwrap_or(&empty);

        let mut topics = base.topics.clone();
        for topic in &diff.topics {
            if !topics.iter().any(|t| t.id == topic.id) {
                topics.push(topic.clone());
            }
        }

        let mut entries: Vec<MergedEntry> = Vec::new();
        let mut slot_by_hash: HashMap<QuestionHash, usize> = HashMap::new();

        for q in &base.questions {
            let id = q.identity();
            if diff.removed.contains(&id) {
                continue;
            }
            let (origin, question) = match diff.overrides.get(&id) {
                Some(over) => {
                    let mut shown = over.clone();
                    shown.id = Some(id.clone());
                    (Origin::Override { id }, shown)
                }
                None => (Origin::Default { id }, q.clone()),
            };
            let hash = question.content_hash();
            if slot_by_hash.contains_key(&hash) {
                continue;
            }
            slot_by_hash.insert(hash, entries.len());
            entries.push(MergedEntry {
                section: section_id,
                origin,
                question,
            });
        }

        for (index, q) in diff.questions.iter().enumerate() {
            let hash = q.content_hash();
            let entry = |displaced| MergedEntry {
                section: section_id,
                origin: Origin::Custom { index, displaced },
                question: q.clone(),
            };
            match slot_by_hash.get(&hash) {
                Some(&slot) => {
                    let displaced = match &entries[slot].origin {
                        Origin::Default { id } | Origin::Override { id } => Some(id.clone()),
                        // First custom occurrence wins.
                        Origin::Custom { .. } => continue,
                    };
                    entries[slot] = entry(displaced);
                }
                None => {
                    slot_by_hash.insert(hash, entries.len());
                    entries.push(entry(None));
                }
            }
        }

        view.sections
            .insert(section_id, MergedSection { topics, entries });
    }
    view
}

/// `merge_view` flattened to a plain bank.
pub fn merge(default: &Bank, custom: &Bank) -> Bank {
    merge_view(default, custom).to_bank()
}

impl MergedView {
    pub fn to_bank(&self) -> Bank {
        let sections = self
            .sections
            .iter()
            .map(|(id, merged)| {
                let section = Section {
                    topics: merged.topics.clone(),
                    questions: merged.entries.iter().map(|e| e.question.clone()).collect(),
                    ..Section::default()
                };
                (*id, section)
            })
            .collect();
        Bank { sections }
    }

    pub fn section(&self, id: SectionId) -> &[MergedEntry] {
        self.sections
            .get(&id)
            .map(|s| s.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(|s| s.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, reference: &QuestionRef) -> Option<&MergedEntry> {
        self.section(reference.section())
            .iter()
            .find(|e| &e.reference() == reference)
    }

    /// Rebuilds a custom bank that reproduces this view over `default`.
    pub fn rederive_custom(&self, default: &Bank) -> Bank {
        let mut custom = Bank::new();
        for (&section_id, merged) in &self.sections {
            let out = custom.section_mut(section_id);
            let base = default.section(section_id);

            for topic in &merged.topics {
                let in_default = base.map(|b| b.has_topic(&topic.id)).unwrap_or(false);
                if !in_default {
                    out.topics.push(topic.clone());
                }
            }

            let mut represented = Vec::new();
            for entry in &merged.entries {
                match &entry.origin {
                    Origin::Default { id } => represented.push(id.clone()),
                    Origin::Override { id } => {
                        let mut stored = entry.question.clone();
                        stored.id = None;
                        out.overrides.insert(id.clone(), stored);
                        represented.push(id.clone());
                    }
                    Origin::Custom { displaced, .. } => {
                        if let Some(id) = displaced {
                            // Keep the displaced default's slot matching this
                            // entry's hash so the custom entry lands there again.
                            let raw_hash = default.find(section_id, id).map(Question::content_hash);
                            if raw_hash.as_ref() != Some(&entry.question.content_hash()) {
                                let mut stored = entry.question.clone();
                                stored.id = None;
                                out.overrides.insert(id.clone(), stored);
                            }
                            represented.push(id.clone());
                        }
                        out.questions.push(entry.question.clone());
                    }
                }
            }

            if let Some(base) = base {
                for q in &base.questions {
                    let id = q.identity();
                    if !represented.contains(&id) {
                        out.removed.insert(id);
                    }
                }
            }
        }
        custom.sections.retain(|_, s| !s.is_empty() || !s.topics.is_empty());
        custom
    }
}

fn custom_question(custom: &Bank, section: SectionId, index: usize) -> Result<&Question> {
    custom
        .questions(section)
        .get(index)
        .ok_or_else(|| BankError::NotFound(format!("{}/custom:{}", section, index)))
}

fn live_default<'a>(
    custom: &Bank,
    default: &'a Bank,
    section: SectionId,
    id: &QuestionHash,
) -> Result<&'a Question> {
    let removed = custom
        .section(section)
        .map(|s| s.removed.contains(id))
        .unwrap_or(false);
    match default.find(section, id) {
        Some(q) if !removed => Ok(q),
        _ => Err(BankError::NotFound(format!("{}/default:{}", section, id))),
    }
}

/// The question `reference` currently shows in the merged view.
pub fn resolve(custom: &Bank, default: &Bank, reference: &QuestionRef) -> Result<Question> {
    match reference {
        QuestionRef::Custom { section, index } => custom_question(custom, *section, *index).cloned(),
        QuestionRef::Default { section, id } => {
            let base = live_default(custom, default, *section, id)?;
            let shown = custom
                .section(*section)
                .and_then(|s| s.overrides.get(id))
                .unwrap_or(base);
            Ok(shown.clone())
        }
    }
}

fn push_custom(custom: &mut Bank, section: SectionId, mut question: Question) -> QuestionRef {
    question.topic = tidy_topic(&question.topic);
    let target = custom.section_mut(section);
    target.ensure_topic(&question.topic);
    target.questions.push(question);
    QuestionRef::Custom {
        section,
        index: target.questions.len() - 1,
    }
}

/// Appends a custom question and registers its topic.
pub fn add_question(custom: &mut Bank, section: SectionId, question: Question) -> Result<QuestionRef> {
    question.validate()?;
    Ok(push_custom(custom, section, question))
}

/// Applies `edit` to the question behind `reference`.
///
/// Custom questions change in place, or move to the end of the target
/// section's list. A default question edited within its section gets an
/// override and stays un-removed; moved to another section it is removed from
/// the original section and re-added as a custom question in the target.
pub fn edit_question(
    custom: &mut Bank,
    default: &Bank,
    reference: &QuestionRef,
    edit: QuestionEdit,
) -> Result<QuestionRef> {
    edit.question.validate()?;
    let mut question = edit.question;
    question.topic = tidy_topic(&question.topic);

    match reference {
        QuestionRef::Custom { section, index } => {
            custom_question(custom, *section, *index)?;
            if edit.section == *section {
                let target = custom.section_mut(*section);
                target.ensure_topic(&question.topic);
                target.questions[*index] = question;
                Ok(reference.clone())
            } else {
                custom.section_mut(*section).questions.remove(*index);
                Ok(push_custom(custom, edit.section, question))
            }
        }
        QuestionRef::Default { section, id } => {
            live_default(custom, default, *section, id)?;
            question.id = None;
            if edit.section == *section {
                let target = custom.section_mut(*section);
                target.ensure_topic(&question.topic);
                target.removed.remove(id);
                target.overrides.insert(id.clone(), question);
                Ok(reference.clone())
            } else {
                let origin = custom.section_mut(*section);
                origin.removed.insert(id.clone());
                origin.overrides.remove(id);
                Ok(push_custom(custom, edit.section, question))
            }
        }
    }
}

/// Deletes a custom question, or soft-deletes a default one (dropping any
/// override it had). Returns the question as it was shown.
pub fn remove_question(custom: &mut Bank, default: &Bank, reference: &QuestionRef) -> Result<Question> {
    let shown = resolve(custom, default, reference)?;
    match reference {
        QuestionRef::Custom { section, index } => {
            custom.section_mut(*section).questions.remove(*index);
        }
        QuestionRef::Default { section, id } => {
            let target = custom.section_mut(*section);
            target.removed.insert(id.clone());
            target.overrides.remove(id);
        }
    }
    Ok(shown)
}

pub fn move_question_section(
    custom: &mut Bank,
    default: &Bank,
    reference: &QuestionRef,
    target: SectionId,
) -> Result<QuestionRef> {
    let question = resolve(custom, default, reference)?;
    edit_question(
        custom,
        default,
        reference,
        QuestionEdit {
            section: target,
            question,
        },
    )
}

/// Drops the image of the question behind `reference`, through an override
/// when it is a default question.
pub fn clear_image(custom: &mut Bank, default: &Bank, reference: &QuestionRef) -> Result<QuestionRef> {
    let mut question = resolve(custom, default, reference)?;
    question.image = None;
    edit_question(
        custom,
        default,
        reference,
        QuestionEdit {
            section: reference.section(),
            question,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(text: &str, answer: u8) -> Question {
        Question::new("demand", text, ["w", "x", "y", "z"], answer)
    }

    fn default_bank() -> Bank {
        let mut bank = Bank::new();
        let s2 = bank.section_mut(SectionId::S2);
        s2.ensure_topic("demand");
        s2.questions.push(q("Q1 what shifts demand?", 0));
        s2.questions.push(q("Q2 what is a substitute?", 1));
        let s4 = bank.section_mut(SectionId::S4);
        s4.ensure_topic("gdp");
        s4.questions.push(Question::new("gdp", "Q3 what is GDP?", ["a", "b", "c", "d"], 3));
        bank
    }

    fn default_ref(bank: &Bank, section: SectionId, i: usize) -> QuestionRef {
        QuestionRef::Default {
            section,
            id: bank.questions(section)[i].identity(),
        }
    }

    fn texts(view: &MergedView, section: SectionId) -> Vec<String> {
        view.section(section).iter().map(|e| e.question.text.clone()).collect()
    }

    #[test]
    fn test_untouched_default_passes_through() {
        let default = default_bank();
        let merged = merge(&default, &Bank::new());
        assert_eq!(merged.questions(SectionId::S2), default.questions(SectionId::S2));
    }

    #[test]
    fn test_edit_in_place_writes_override() {
        let default = default_bank();
        let mut custom = Bank::new();
        let r = default_ref(&default, SectionId::S2, 0);
        let h1 = default.questions(SectionId::S2)[0].identity();

        let edited = Question::new("demand", "new text", ["p", "q", "r", "s"], 2);
        let back = edit_question(
            &mut custom,
            &default,
            &r,
            QuestionEdit {
                section: SectionId::S2,
                question: edited,
            },
        )
        .unwrap();
        assert_eq!(back, r);

        let s2 = custom.section(SectionId::S2).unwrap();
        assert_eq!(s2.overrides[&h1].text, "new text");
        assert_eq!(s2.overrides[&h1].answer, 2);
        assert!(!s2.removed.contains(&h1));

        let view = merge_view(&default, &custom);
        assert_eq!(texts(&view, SectionId::S2), ["new text", "Q2 what is a substitute?"]);
        assert_eq!(view.section(SectionId::S2)[0].question.answer, 2);
        assert_eq!(default, default_bank());
    }

    #[test]
    fn test_edit_of_removed_default_is_not_found() {
        let default = default_bank();
        let mut custom = Bank::new();
        let r = default_ref(&default, SectionId::S2, 1);
        remove_question(&mut custom, &default, &r).unwrap();
        // the reference is gone from the view now
        let err = edit_question(
            &mut custom,
            &default,
            &r,
            QuestionEdit {
                section: SectionId::S2,
                question: q("again", 0),
            },
        );
        assert!(matches!(err, Err(BankError::NotFound(_))));
    }

    #[test]
    fn test_remove_beats_existing_override() {
        let default = default_bank();
        let mut custom = Bank::new();
        let r = default_ref(&default, SectionId::S2, 0);
        let h1 = default.questions(SectionId::S2)[0].identity();
        edit_question(
            &mut custom,
            &default,
            &r,
            QuestionEdit {
                section: SectionId::S2,
                question: q("overridden", 1),
            },
        )
        .unwrap();
        remove_question(&mut custom, &default, &r).unwrap();

        let s2 = custom.section(SectionId::S2).unwrap();
        assert!(s2.removed.contains(&h1));
        assert!(!s2.overrides.contains_key(&h1));
        let view = merge_view(&default, &custom);
        assert!(view
            .section(SectionId::S2)
            .iter()
            .all(|e| e.reference() != r && e.question.text != "overridden"));
    }

    #[test]
    fn test_move_default_across_sections() {
        let default = default_bank();
        let mut custom = Bank::new();
        let r = default_ref(&default, SectionId::S2, 0);
        let mut edited = default.questions(SectionId::S2)[0].clone();
        edited.text = "Q1 moved and reworded".into();
        edited.topic = "inflation".into();

        let new_ref = edit_question(
            &mut custom,
            &default,
            &r,
            QuestionEdit {
                section: SectionId::S4,
                question: edited,
            },
        )
        .unwrap();
        assert_eq!(
            new_ref,
            QuestionRef::Custom {
                section: SectionId::S4,
                index: 0
            }
        );

        let view = merge_view(&default, &custom);
        assert_eq!(texts(&view, SectionId::S2), ["Q2 what is a substitute?"]);
        assert_eq!(texts(&view, SectionId::S4), ["Q3 what is GDP?", "Q1 moved and reworded"]);
        assert!(custom.section(SectionId::S4).unwrap().has_topic("inflation"));
        assert_eq!(default, default_bank());
        assert_eq!(custom.section(SectionId::S4).unwrap().questions[0].id, None);
    }

    #[test]
    fn test_move_custom_question_keeps_fields() {
        let default = default_bank();
        let mut custom = Bank::new();
        let r = add_question(&mut custom, SectionId::S1, q("custom one", 3)).unwrap();
        let moved = move_question_section(&mut custom, &default, &r, SectionId::S6).unwrap();
        assert!(custom.questions(SectionId::S1).is_empty());
        let view = merge_view(&default, &custom);
        let entry = view.find(&moved).unwrap();
        assert_eq!(entry.question.answer, 3);
        assert!(entry.is_custom());
    }

    #[test]
    fn test_custom_duplicate_takes_default_slot() {
        let default = default_bank();
        let mut custom = Bank::new();
        let mut dup = q("  q1 WHAT shifts demand? ", 3);
        dup.topic = "shifts".into();
        add_question(&mut custom, SectionId::S2, dup).unwrap();

        let view = merge_view(&default, &custom);
        let entries = view.section(SectionId::S2);
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].origin, Origin::Custom { displaced: Some(_), .. }));
        assert_eq!(entries[0].question.answer, 3);
    }

    #[test]
    fn test_duplicate_customs_keep_first() {
        let mut custom = Bank::new();
        add_question(&mut custom, SectionId::S3, q("same", 0)).unwrap();
        add_question(&mut custom, SectionId::S3, q("SAME ", 1)).unwrap();
        let view = merge_view(&Bank::new(), &custom);
        assert_eq!(view.section(SectionId::S3).len(), 1);
        assert_eq!(view.section(SectionId::S3)[0].question.answer, 0);
    }

    #[test]
    fn test_clear_image_on_default_uses_override() {
        let mut default = default_bank();
        default.section_mut(SectionId::S4).questions[0].image = Some("data:image/png;base64,AA".into());
        let mut custom = Bank::new();
        let r = default_ref(&default, SectionId::S4, 0);
        clear_image(&mut custom, &default, &r).unwrap();
        let view = merge_view(&default, &custom);
        assert_eq!(view.section(SectionId::S4)[0].question.image, None);
        assert!(default.questions(SectionId::S4)[0].image.is_some());
    }

    #[test]
    fn test_rederived_custom_reproduces_view() {
        let default = default_bank();
        let mut custom = Bank::new();
        let r0 = default_ref(&default, SectionId::S2, 0);
        let r1 = default_ref(&default, SectionId::S2, 1);
        let r3 = default_ref(&default, SectionId::S4, 0);
        edit_question(
            &mut custom,
            &default,
            &r0,
            QuestionEdit {
                section: SectionId::S2,
                question: q("edited Q1", 1),
            },
        )
        .unwrap();
        remove_question(&mut custom, &default, &r1).unwrap();
        move_question_section(&mut custom, &default, &r3, SectionId::S6).unwrap();
        add_question(&mut custom, SectionId::S2, q("brand new", 2)).unwrap();
        // duplicates the override's content, so it takes that slot
        add_question(&mut custom, SectionId::S2, q("EDITED q1", 0)).unwrap();

        let first = merge(&default, &custom);
        let rederived = merge_view(&default, &custom).rederive_custom(&default);
        assert_eq!(merge(&default, &rederived), first);
    }

    #[test]
    fn test_missing_refs_are_not_found() {
        let default = default_bank();
        let mut custom = Bank::new();
        let bogus = QuestionRef::Default {
            section: SectionId::S2,
            id: QuestionHash::from("qnope"),
        };
        assert!(matches!(remove_question(&mut custom, &default, &bogus), Err(BankError::NotFound(_))));
        let out_of_range = QuestionRef::Custom {
            section: SectionId::S1,
            index: 4,
        };
        assert!(resolve(&custom, &default, &out_of_range).is_err());
    }
}
