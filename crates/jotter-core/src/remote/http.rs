//! JSON-over-HTTP remote store client.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{RemoteAck, RemoteOutcome, RemoteStore, RemoteWrite};
use crate::error::{Error, Result};
use crate::models::{Entry, Operation};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Remote store reached over HTTP with optional bearer-token auth
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    /// Build a client for `base_url` (e.g. `https://api.example.com`)
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Remote(error.to_string()))?;

        Ok(Self {
            base_url,
            api_token: normalize_text_option(api_token),
            client,
        })
    }

    fn request_for(&self, write: &RemoteWrite) -> reqwest::RequestBuilder {
        let collection = format!("{}/v1/entries", self.base_url);
        let builder = match write.operation {
            Operation::Create => self.client.post(collection),
            Operation::Update => self.client.put(format!("{collection}/{}", write.entry.id)),
            Operation::Delete => self
                .client
                .delete(format!("{collection}/{}", write.entry.id)),
        };

        let builder = builder
            .header("Accept", "application/json")
            .json(&WriteBody {
                entry: &write.entry,
                base_version: write.base_version,
            });

        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn apply(&self, write: &RemoteWrite) -> RemoteOutcome {
        let response = match self.request_for(write).send().await {
            Ok(response) => response,
            Err(error) => {
                return RemoteOutcome::TransientError(format!("request failed: {error}"));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_response(status, &body)
    }
}

#[derive(Serialize)]
struct WriteBody<'a> {
    entry: &'a Entry,
    base_version: i64,
}

#[derive(Debug, Deserialize)]
struct ConflictBody {
    server_version: i64,
}

/// Map an HTTP response onto the remote outcome taxonomy
fn classify_response(status: StatusCode, body: &str) -> RemoteOutcome {
    if status.is_success() {
        return match serde_json::from_str::<RemoteAck>(body) {
            Ok(ack) => RemoteOutcome::Accepted(ack),
            Err(error) => RemoteOutcome::TransientError(format!(
                "invalid acknowledgement ({}): {error}",
                status.as_u16()
            )),
        };
    }

    if status == StatusCode::CONFLICT {
        return match serde_json::from_str::<ConflictBody>(body) {
            Ok(conflict) => RemoteOutcome::VersionConflict {
                server_version: conflict.server_version,
            },
            Err(error) => RemoteOutcome::TransientError(format!(
                "conflict response without server_version: {error}"
            )),
        };
    }

    let detail = compact_text(body);
    if detail.is_empty() {
        RemoteOutcome::TransientError(format!("HTTP {}", status.as_u16()))
    } else {
        RemoteOutcome::TransientError(format!("{detail} ({})", status.as_u16()))
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("remote URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "remote URL must include http:// or https://".to_string(),
        ))
    }
}
