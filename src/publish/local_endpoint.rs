// Local save endpoint sink: POSTs the bank to a dev server that overwrites its JSON file
use super::{render_bank, PublishReceipt, Publisher};
use crate::bank::Bank;
use crate::types::{BankError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SaveReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct LocalEndpointPublisher {
    client: Client,
    endpoint: String,
}

impl LocalEndpointPublisher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Publisher for LocalEndpointPublisher {
    fn sink_name(&self) -> &str {
        &self.endpoint
    }

    async fn publish(&self, bank: &Bank) -> Result<PublishReceipt> {
        let json = render_bank(bank)?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(json.clone())
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        // The endpoint answers {"ok": true} or {"ok": false, "error": "..."}.
        let reply: Option<SaveReply> = serde_json::from_str(&text).ok();
        match reply {
            Some(SaveReply { ok: true, .. }) if status.is_success() => {
                info!(endpoint = %self.endpoint, bytes = json.len(), "saved bank to local endpoint");
                Ok(PublishReceipt {
                    sink: self.endpoint.clone(),
                    bytes: json.len(),
                    revision: None,
                })
            }
            Some(SaveReply { error: Some(error), .. }) => {
                Err(BankError::Publish(format!("{} refused the bank ({}): {}", self.endpoint, status, error)))
            }
            _ => Err(BankError::Publish(format!(
                "{} answered {} without an ok flag: {}",
                self.endpoint,
                status,
                text.trim()
            ))),
        }
    }
}
