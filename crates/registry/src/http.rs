//! Registry backend talking JSON over HTTP to a ledger gateway.
//!
//! - `GET    {base}/registry/{namespace}/{flavor}` → `{"entries": [..]}`
//! - `POST   {base}/registry/{namespace}/{flavor}` with `{"entries": [..]}`
//! - `DELETE {base}/registry/{namespace}/{flavor}/{index}`
//!
//! Writes carry `Authorization: Bearer <token>` and `X-Registry-Account`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::backend::{AuthContext, RegistryBackend, RegistryList};
use crate::errors::{RegistryError, Result};

pub const ACCOUNT_HEADER: &str = "X-Registry-Account";

#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistry {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| RegistryError::InvalidConfig(format!("http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn list_url(&self, list: &RegistryList) -> String {
        format!(
            "{}/registry/{}/{}",
            self.base_url, list.namespace, list.flavor
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EntriesBody {
    entries: Vec<String>,
}

async fn failure_reason(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.trim().is_empty() => format!("status {status}: {}", body.trim()),
        _ => format!("status {status}"),
    }
}

#[async_trait]
impl RegistryBackend for HttpRegistry {
    async fn read(&self, list: &RegistryList) -> Result<Vec<String>> {
        let read_err = |reason: String| RegistryError::Read {
            list: list.clone(),
            reason,
        };
        let response = self
            .client
            .get(self.list_url(list))
            .send()
            .await
            .map_err(|err| read_err(err.to_string()))?;
        if !response.status().is_success() {
            return Err(read_err(failure_reason(response).await));
        }
        let body: EntriesBody = response
            .json()
            .await
            .map_err(|err| read_err(format!("invalid response body: {err}")))?;
        debug!(%list, entries = body.entries.len(), "read registry list");
        Ok(body.entries)
    }

    async fn append(&self, list: &RegistryList, entries: &[String], auth: &AuthContext) -> Result<()> {
        let write_err = |reason: String| RegistryError::Write {
            list: list.clone(),
            reason,
        };
        let response = self
            .client
            .post(self.list_url(list))
            .bearer_auth(&auth.token)
            .header(ACCOUNT_HEADER, &auth.account)
            .json(&EntriesBody {
                entries: entries.to_vec(),
            })
            .send()
            .await
            .map_err(|err| write_err(err.to_string()))?;
        if !response.status().is_success() {
            return Err(write_err(failure_reason(response).await));
        }
        Ok(())
    }

    async fn delete_at(&self, list: &RegistryList, index: usize, auth: &AuthContext) -> Result<()> {
        let write_err = |reason: String| RegistryError::Write {
            list: list.clone(),
            reason,
        };
        let response = self
            .client
            .delete(format!("{}/{index}", self.list_url(list)))
            .bearer_auth(&auth.token)
            .header(ACCOUNT_HEADER, &auth.account)
            .send()
            .await
            .map_err(|err| write_err(err.to_string()))?;
        if !response.status().is_success() {
            return Err(write_err(failure_reason(response).await));
        }
        Ok(())
    }
}
