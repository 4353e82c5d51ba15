// GitHub contents API sink: read the file's sha, then PUT the new content against it
use super::{render_bank, PublishReceipt, Publisher};
use crate::bank::Bank;
use crate::config::PublishConfig;
use crate::types::{BankError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Deserialize)]
struct RemoteFile {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

pub struct GithubPublisher {
    client: Client,
    cfg: PublishConfig,
    token: String,
    sink: String,
}

impl GithubPublisher {
    pub fn new(cfg: PublishConfig, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let missing: Vec<&str> = [
            ("owner", cfg.owner.as_str()),
            ("repo", cfg.repo.as_str()),
            ("path", cfg.path.as_str()),
            ("token", token.as_str()),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
        if !missing.is_empty() {
            return Err(BankError::Publish(format!(
                "GitHub publishing needs {}",
                missing.join(", ")
            )));
        }
        let sink = format!("github:{}/{}@{}:{}", cfg.owner, cfg.repo, cfg.branch, cfg.path);
        Ok(Self {
            client: Client::new(),
            cfg,
            token,
            sink,
        })
    }

    pub fn settings(&self) -> &PublishConfig {
        &self.cfg
    }

    fn contents_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.cfg.api_base)
            .map_err(|e| BankError::Publish(format!("bad api_base '{}': {}", self.cfg.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| BankError::Publish(format!("api_base '{}' cannot take a path", self.cfg.api_base)))?
            .pop_if_empty()
            .extend(["repos", self.cfg.owner.as_str(), self.cfg.repo.as_str(), "contents"])
            .extend(self.cfg.path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, concat!("bank-builder/", env!("CARGO_PKG_VERSION")))
    }

    /// Current file on the branch, or `None` when it does not exist yet.
    async fn remote_file(&self) -> Result<Option<RemoteFile>> {
        let url = self.contents_url()?;
        let response = self
            .authorized(self.client.get(url))
            .query(&[("ref", self.cfg.branch.as_str())])
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(sink = %self.sink, "remote file does not exist yet");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BankError::Publish(format!(
                "reading {} failed with {}: {}",
                self.cfg.path,
                status,
                body.trim()
            )));
        }
        Ok(Some(response.json().await?))
    }

    /// Downloads the published bank, for refreshing the local cache.
    pub async fn fetch(&self) -> Result<Option<Bank>> {
        let Some(file) = self.remote_file().await? else {
            return Ok(None);
        };
        // GitHub wraps the base64 payload at 60 columns.
        let packed: String = file.content.split_whitespace().collect();
        let bytes = STANDARD
            .decode(packed)
            .map_err(|e| BankError::Publish(format!("remote content is not base64: {}", e)))?;
        let json = String::from_utf8(bytes)
            .map_err(|e| BankError::Publish(format!("remote content is not UTF-8: {}", e)))?;
        let bank = Bank::from_json(&json)
            .map_err(|e| BankError::Publish(format!("remote bank is invalid: {}", e)))?;
        Ok(Some(bank))
    }
}

#[async_trait]
impl Publisher for GithubPublisher {
    fn sink_name(&self) -> &str {
        &self.sink
    }

    async fn publish(&self, bank: &Bank) -> Result<PublishReceipt> {
        let json = render_bank(bank)?;
        let sha = self.remote_file().await?.map(|f| f.sha);
        let body = PutBody {
            message: format!(
                "Update {} via bank-builder ({})",
                self.cfg.path,
                chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
            ),
            content: STANDARD.encode(json.as_bytes()),
            branch: &self.cfg.branch,
            sha,
        };

        let response = self
            .authorized(self.client.put(self.contents_url()?))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(sink = %self.sink, %status, "publish rejected");
            let hint = match status {
                StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => " (remote changed; retry)",
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => " (check the token)",
                _ => "",
            };
            return Err(BankError::Publish(format!("{}{}: {}", status, hint, text.trim())));
        }

        let reply: serde_json::Value = response.json().await?;
        let revision = reply["commit"]["sha"].as_str().map(str::to_string);
        info!(sink = %self.sink, bytes = json.len(), "published bank");
        Ok(PublishReceipt {
            sink: self.sink.clone(),
            bytes: json.len(),
            revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(owner: &str) -> PublishConfig {
        PublishConfig {
            owner: owner.into(),
            repo: "econ site".into(),
            path: "data/bank template.json".into(),
            api_base: "https://api.example.test/".into(),
            ..PublishConfig::default()
        }
    }

    #[test]
    fn test_requires_owner_and_token() {
        let err = GithubPublisher::new(cfg(""), "").err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("owner") && msg.contains("token"), "{}", msg);
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let publisher = GithubPublisher::new(cfg("school"), "t0ken").unwrap();
        let url = publisher.contents_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.test/repos/school/econ%20site/contents/data/bank%20template.json"
        );
        assert_eq!(publisher.sink_name(), "github:school/econ site@main:data/bank template.json");
    }
}
