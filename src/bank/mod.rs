// Question bank: model, merge/override engine, import and repository
pub mod default_bank;
pub mod import;
pub mod merge;
pub mod model;
pub mod repository;

pub use import::{merge_into, normalize_imported_bank, ImportSummary};
pub use merge::{merge, merge_view, MergedEntry, MergedView, Origin};
pub use model::{Bank, Section};
pub use repository::BankRepository;
