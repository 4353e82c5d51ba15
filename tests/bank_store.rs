// Bank store behaviour over a real SQLite file
use bank_builder::bank::{default_bank, merge, merge_view, BankRepository, Origin};
use bank_builder::storage::{KvStore, SqliteKv};
use bank_builder::types::{BankError, Question, QuestionEdit, QuestionRef, SectionId};
use rstest::{fixture, rstest};
use std::path::PathBuf;
use tempfile::TempDir;

struct Store {
    _dir: TempDir,
    path: PathBuf,
}

impl Store {
    fn open(&self) -> BankRepository {
        BankRepository::open(Box::new(SqliteKv::open(&self.path).unwrap())).unwrap()
    }
}

#[fixture]
fn store() -> Store {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("bank.sqlite3");
    Store { _dir: dir, path }
}

fn first_default(repo: &BankRepository, section: SectionId) -> QuestionRef {
    repo.merged_view().section(section)[0].reference()
}

#[rstest]
fn test_fresh_store_shows_bundled_bank(store: Store) {
    let repo = store.open();
    assert!(repo.custom().is_empty());
    assert_eq!(repo.merged(), merge(default_bank::bundled(), repo.custom()));
    for id in SectionId::ALL {
        assert!(!repo.merged_view().section(id).is_empty());
    }
}

#[rstest]
fn test_edit_default_survives_reopen(store: Store) {
    let target = {
        let mut repo = store.open();
        let target = first_default(&repo, SectionId::S4);
        let mut question = repo.resolve(&target).unwrap();
        question.text = "Economic growth is measured by the change in...".into();
        question.answer = 2;
        repo.edit_question(
            &target,
            QuestionEdit {
                section: SectionId::S4,
                question,
            },
        )
        .unwrap();
        target
    };

    let repo = store.open();
    let entry = repo.merged_view().find(&target).cloned().unwrap();
    assert!(matches!(entry.origin, Origin::Override { .. }));
    assert_eq!(entry.question.text, "Economic growth is measured by the change in...");
    let QuestionRef::Default { id, .. } = &target else {
        panic!("expected a default reference");
    };
    let s4 = repo.custom().section(SectionId::S4).unwrap();
    assert!(s4.overrides.contains_key(id));
    assert!(!s4.removed.contains(id));
    // the bundled bank itself never changes
    assert_ne!(default_bank::bundled().questions(SectionId::S4)[0].text, entry.question.text);
}

#[rstest]
fn test_remove_then_move_default(store: Store) {
    let mut repo = store.open();
    let removed = first_default(&repo, SectionId::S1);
    repo.remove_question(&removed).unwrap();
    assert!(repo.merged_view().find(&removed).is_none());
    assert!(matches!(repo.remove_question(&removed), Err(BankError::NotFound(_))));

    let moving = first_default(&repo, SectionId::S2);
    let text = repo.resolve(&moving).unwrap().text;
    let landed = repo.move_question(&moving, SectionId::S6).unwrap();
    let view = repo.merged_view();
    assert!(view.section(SectionId::S2).iter().all(|e| e.question.text != text));
    assert_eq!(view.find(&landed).unwrap().question.text, text);
}

#[rstest]
fn test_corrupt_rows_read_as_empty(store: Store) {
    {
        let mut kv = SqliteKv::open(&store.path).unwrap();
        kv.set("custom_bank_v1", "[1, 2").unwrap();
        kv.set("published_bank_v1", "not json").unwrap();
    }
    let mut repo = store.open();
    assert!(repo.custom().is_empty());
    assert_eq!(repo.default_bank(), default_bank::bundled());
    repo.add_question(SectionId::S5, Question::new("aid", "What is aid?", ["a", "b", "c", "d"], 0))
        .unwrap();
    assert_eq!(store.open().custom().question_count(), 1);
}

#[rstest]
#[case::object_form(
    r#"{"s5": {"topics": [{"id": "aid", "name": "Foreign aid"}], "questions": [
        {"topic": "aid", "text": "Tied aid is...", "choices": ["a","b","c","d"], "answer": 3}
    ]}}"#,
    SectionId::S5,
    1
)]
#[case::flat_form(
    r#"[
        {"section": "s6", "topic": "trade", "text": "A quota limits...", "choices": ["a","b","c","d"], "answer": 1},
        {"section": "s6", "topic": "trade", "text": "A QUOTA limits... ", "choices": ["A","B","C","D"], "answer": 2}
    ]"#,
    SectionId::S6,
    1
)]
#[case::flat_form_default_section(
    r#"[{"text": "Equilibrium price is where...", "choices": ["a","b","c","d"]}]"#,
    SectionId::S2,
    1
)]
fn test_import_json(store: Store, #[case] json: &str, #[case] section: SectionId, #[case] added: usize) {
    let mut repo = store.open();
    let summary = repo.import_json(json).unwrap();
    assert_eq!(summary.added, added);
    assert_eq!(repo.custom().questions(section).len(), added);

    // importing the same file twice adds nothing
    let again = repo.import_json(json).unwrap();
    assert_eq!(again.added, 0);
}

#[rstest]
#[case("")]
#[case("{\"s1\": 5}")]
#[case("[{\"section\": \"s8\", \"text\": \"x\", \"choices\": [\"a\",\"b\",\"c\",\"d\"]}]")]
fn test_bad_import_writes_nothing(store: Store, #[case] json: &str) {
    let mut repo = store.open();
    repo.add_question(SectionId::S1, Question::new("t", "keep me", ["a", "b", "c", "d"], 0))
        .unwrap();
    let before = repo.export_json().unwrap();
    assert!(matches!(repo.import_json(json), Err(BankError::ImportValidation(_))));
    assert_eq!(store.open().export_json().unwrap(), before);
}

#[rstest]
fn test_rederived_diff_matches_view(store: Store) {
    let mut repo = store.open();
    let r = first_default(&repo, SectionId::S3);
    repo.clear_image(&r).unwrap();
    let r2 = first_default(&repo, SectionId::S5);
    repo.remove_question(&r2).unwrap();
    repo.add_question(SectionId::S3, Question::new("banks", "Banks lend to...", ["a", "b", "c", "d"], 1))
        .unwrap();

    let default = repo.default_bank().clone();
    let view = merge_view(&default, repo.custom());
    let rederived = view.rederive_custom(&default);
    assert_eq!(merge(&default, &rederived), view.to_bank());
}

#[rstest]
fn test_clear_drops_the_stored_row(store: Store) {
    {
        let mut repo = store.open();
        repo.add_question(SectionId::S2, Question::new("demand", "Demand curves slope...", ["a", "b", "c", "d"], 1))
            .unwrap();
        repo.set_published(default_bank::bundled().clone()).unwrap();
        repo.clear().unwrap();
        assert!(repo.custom().is_empty());
    }
    let kv = SqliteKv::open(&store.path).unwrap();
    assert_eq!(kv.get("custom_bank_v1").unwrap(), None);
    assert!(kv.get("published_bank_v1").unwrap().is_some());
    assert!(store.open().custom().is_empty());
}
