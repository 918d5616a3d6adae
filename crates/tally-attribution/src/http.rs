//! reqwest-backed transport for the bundle explorer REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use tally_core::traits::{AttributionTransport, HttpReply};

#[derive(Debug, thiserror::Error)]
#[error("failed to build HTTP client: {0}")]
pub struct BuildError(#[from] reqwest::Error);

/// `GET {base_url}/api/v1/bundles/transaction/{signature}`.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BuildError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn lookup_url(&self, signature: &str) -> String {
        format!("{}/api/v1/bundles/transaction/{}", self.base_url, signature)
    }
}

#[async_trait]
impl AttributionTransport for HttpTransport {
    async fn get_bundles(&self, signature: &str) -> Result<HttpReply, String> {
        let resp = self
            .client
            .get(self.lookup_url(signature))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| e.to_string())?;
        Ok(HttpReply { status, body })
    }
}
