// Bank repository: custom-bank cache with explicit load/save over an injected KV store
use super::default_bank;
use super::import::{self, ImportSummary};
use super::merge::{self, MergedView};
use super::model::Bank;
use crate::config::PublishConfig;
use crate::storage::KvStore;
use crate::types::{BankError, Question, QuestionEdit, QuestionRef, Result, SectionId};
use tracing::{info, warn};

pub const CUSTOM_BANK_KEY: &str = "custom_bank_v1";
pub const PUBLISHED_BANK_KEY: &str = "published_bank_v1";
pub const PUBLISH_CONFIG_KEY: &str = "github_cfg_v1";

/// Owns the custom bank and the published-bank cache.
///
/// Every mutation re-reads the store, applies the change to a copy and writes
/// the whole custom bank back; the in-memory cache only changes once the
/// write succeeded.
pub struct BankRepository {
    store: Box<dyn KvStore>,
    custom: Bank,
    published: Option<Bank>,
}

impl BankRepository {
    /// Wraps `store` and loads its current contents.
    pub fn open(store: Box<dyn KvStore>) -> Result<Self> {
        let mut repo = Self {
            store,
            custom: Bank::new(),
            published: None,
        };
        repo.load()?;
        Ok(repo)
    }

    /// Refreshes the cache from the store. Corrupt stored JSON reads as empty.
    pub fn load(&mut self) -> Result<()> {
        self.custom = read_bank(self.store.as_ref(), CUSTOM_BANK_KEY)?.unwrap_or_default();
        self.published = read_bank(self.store.as_ref(), PUBLISHED_BANK_KEY)?;
        Ok(())
    }

    /// Writes the cached custom bank back.
    pub fn save(&mut self) -> Result<()> {
        let json = serde_json::to_string(&self.custom)
            .map_err(|e| BankError::Config(e.to_string()))?;
        self.store.set(CUSTOM_BANK_KEY, &json)
    }

    pub fn custom(&self) -> &Bank {
        &self.custom
    }

    /// Cached published bank when present and non-empty, else the bundled one.
    pub fn default_bank(&self) -> &Bank {
        effective_default(&self.published)
    }

    pub fn merged_view(&self) -> MergedView {
        merge::merge_view(self.default_bank(), &self.custom)
    }

    pub fn merged(&self) -> Bank {
        merge::merge(self.default_bank(), &self.custom)
    }

    /// The question `reference` currently shows.
    pub fn resolve(&self, reference: &QuestionRef) -> Result<Question> {
        merge::resolve(&self.custom, self.default_bank(), reference)
    }

    fn update<T>(&mut self, apply: impl FnOnce(&mut Bank, &Bank) -> Result<T>) -> Result<T> {
        self.load()?;
        let mut next = self.custom.clone();
        let out = apply(&mut next, effective_default(&self.published))?;
        let json = serde_json::to_string(&next)
            .map_err(|e| BankError::Config(e.to_string()))?;
        self.store.set(CUSTOM_BANK_KEY, &json)?;
        self.custom = next;
        Ok(out)
    }

    pub fn add_question(&mut self, section: SectionId, question: Question) -> Result<QuestionRef> {
        self.update(|custom, _| merge::add_question(custom, section, question))
    }

    /// Adds several questions in one write. Either all land or none do.
    pub fn add_questions(&mut self, items: Vec<(SectionId, Question)>) -> Result<usize> {
        self.update(|custom, _| {
            let count = items.len();
            for (section, question) in items {
                merge::add_question(custom, section, question)?;
            }
            Ok(count)
        })
    }

    pub fn edit_question(&mut self, reference: &QuestionRef, edit: QuestionEdit) -> Result<QuestionRef> {
        self.update(|custom, default| merge::edit_question(custom, default, reference, edit))
    }

    pub fn remove_question(&mut self, reference: &QuestionRef) -> Result<Question> {
        self.update(|custom, default| merge::remove_question(custom, default, reference))
    }

    pub fn move_question(&mut self, reference: &QuestionRef, target: SectionId) -> Result<QuestionRef> {
        self.update(|custom, default| merge::move_question_section(custom, default, reference, target))
    }

    pub fn clear_image(&mut self, reference: &QuestionRef) -> Result<QuestionRef> {
        self.update(|custom, default| merge::clear_image(custom, default, reference))
    }

    /// Validates `json` completely before touching the store.
    pub fn import_json(&mut self, json: &str) -> Result<ImportSummary> {
        let incoming = import::normalize_imported_bank(json)?;
        let summary = self.update(|custom, _| Ok(import::merge_into(custom, &incoming)))?;
        info!("imported {} questions ({} duplicates skipped)", summary.added, summary.duplicates);
        Ok(summary)
    }

    pub fn export_json(&self) -> Result<String> {
        self.custom.to_json_pretty()
    }

    /// Resets the custom bank to empty by dropping its stored row.
    pub fn clear(&mut self) -> Result<()> {
        self.store.remove(CUSTOM_BANK_KEY)?;
        self.custom = Bank::new();
        info!("custom bank cleared");
        Ok(())
    }

    pub fn published(&self) -> Option<&Bank> {
        self.published.as_ref()
    }

    /// Caches `bank` as the published bank that supersedes the bundled one.
    pub fn set_published(&mut self, bank: Bank) -> Result<()> {
        let json = serde_json::to_string(&bank)
            .map_err(|e| BankError::Config(e.to_string()))?;
        self.store.set(PUBLISHED_BANK_KEY, &json)?;
        info!("cached published bank with {} questions", bank.question_count());
        self.published = Some(bank);
        Ok(())
    }

    pub fn publish_config(&self) -> Result<Option<PublishConfig>> {
        let Some(raw) = self.store.get(PUBLISH_CONFIG_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(cfg) => Ok(Some(cfg)),
            Err(e) => {
                warn!("stored publish config is corrupt, ignoring it: {}", e);
                Ok(None)
            }
        }
    }

    pub fn set_publish_config(&mut self, cfg: &PublishConfig) -> Result<()> {
        let json = serde_json::to_string(cfg)
            .map_err(|e| BankError::Config(e.to_string()))?;
        self.store.set(PUBLISH_CONFIG_KEY, &json)
    }
}

fn effective_default(published: &Option<Bank>) -> &Bank {
    match published {
        Some(bank) if bank.question_count() > 0 => bank,
        _ => default_bank::bundled(),
    }
}

fn read_bank(store: &dyn KvStore, key: &str) -> Result<Option<Bank>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str::<Bank>(&raw) {
        Ok(bank) => Ok(Some(bank)),
        Err(e) => {
            warn!(key, "stored bank is corrupt, substituting an empty bank: {}", e);
            Ok(Some(Bank::new()))
        }
    }
}
