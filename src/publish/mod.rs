// Publish connector: pushes a bank to an external sink
pub mod github;
pub mod local_endpoint;

pub use github::GithubPublisher;
pub use local_endpoint::LocalEndpointPublisher;

use crate::bank::Bank;
use crate::types::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub sink: String,
    pub bytes: usize,
    /// Revision token reported by the sink, when it has one.
    pub revision: Option<String>,
}

/// An opaque destination for a bank. Failures come back as
/// `BankError::Publish` and never touch local state.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn sink_name(&self) -> &str;

    async fn publish(&self, bank: &Bank) -> Result<PublishReceipt>;
}

/// The document every sink receives.
pub(crate) fn render_bank(bank: &Bank) -> Result<String> {
    bank.to_json_pretty()
}
