// Bank Builder - exam PDF extraction and question bank management library
pub mod bank;
pub mod config;
pub mod pdf_extraction;
pub mod publish;
pub mod review;
pub mod storage;
pub mod types;

pub use bank::{Bank, BankRepository};
pub use config::BuilderConfig;
pub use review::{ReviewRow, ReviewTable};
pub use types::{BankError, Question, QuestionEdit, QuestionHash, QuestionRef, Result, SectionId, Topic};
