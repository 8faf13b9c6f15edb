#![doc = "HTTP uploader: bridges the core `Uploader` trait to the archive's upload endpoint."]
//
//! # Uploader Integration (CLI <-> Core)
//!
//! [`ArchiveClient`] posts a serialized JSON document to the base URL configured for the
//! requested destination. Retries and timeouts belong to the core pipeline; this client
//! only classifies each failure as transient or rejected.
//!
//! - Bearer token from `ARCHIVE_API_TOKEN` when present.
//! - `overwrite` travels as a query flag.
//! - `x-content-sha256` carries the SHA-256 of the body, so identical re-uploads are recognisable.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use std::path::Path;

use archive_pipeline_core::contract::{Destination, UploadError, UploadReceipt, Uploader};

use crate::load_config::{CliConfig, DestinationUrls};

pub struct ArchiveClient {
    http: reqwest::Client,
    urls: DestinationUrls,
    api_token: Option<String>,
}

impl ArchiveClient {
    pub fn new(urls: DestinationUrls, api_token: Option<String>) -> Self {
        tracing::info!(
            staging = urls.staging.as_deref().unwrap_or("-"),
            production = urls.production.as_deref().unwrap_or("-"),
            api_token_set = api_token.is_some(),
            "Initialized ArchiveClient"
        );
        Self {
            http: reqwest::Client::new(),
            urls,
            api_token,
        }
    }

    pub fn from_config(config: &CliConfig) -> Self {
        Self::new(config.destinations.clone(), config.api_token.clone())
    }
}

/// Hex SHA-256 of an upload body.
pub fn content_hash(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

/// 429 and 5xx are worth retrying; every other non-success status is final.
pub fn classify_status(status: u16, body: String) -> UploadError {
    if status == 429 || status >= 500 {
        UploadError::Transient(format!("archive answered {status}: {body}"))
    } else {
        UploadError::Rejected {
            status,
            message: body,
        }
    }
}

/// A request that could not be built (bad URL, bad header) or that loops on
/// redirects will fail the same way every time; only network trouble is transient.
fn classify_send_error(url: &str, e: &reqwest::Error) -> UploadError {
    if e.is_builder() || e.is_redirect() {
        UploadError::Config(format!("cannot send request to {url}: {e}"))
    } else {
        UploadError::Transient(format!("request to {url} failed: {e}"))
    }
}

fn record_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let id = value.get("id").or_else(|| value.get("record_id"))?;
    match id {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Uploader for ArchiveClient {
    async fn upload(
        &self,
        json_path: &Path,
        destination: Destination,
        overwrite: bool,
    ) -> Result<UploadReceipt, UploadError> {
        let url = self.urls.url_for(destination).ok_or_else(|| {
            UploadError::Config(format!("no URL configured for destination {destination}"))
        })?;

        let body = std::fs::read(json_path).map_err(|e| {
            tracing::error!(error = ?e, json_path = %json_path.display(), "Failed to read JSON document");
            UploadError::Io(e)
        })?;
        let hash = content_hash(&body);
        tracing::info!(
            url,
            json_path = %json_path.display(),
            %destination,
            overwrite,
            size = body.len(),
            content_hash = %hash,
            "Uploading JSON document"
        );

        let mut request = self
            .http
            .post(url)
            .query(&[("overwrite", overwrite)])
            .header(CONTENT_TYPE, "application/json")
            .header("x-content-sha256", hash.as_str())
            .body(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = ?e, url, "Upload request failed");
            classify_send_error(url, &e)
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<failed to decode response body>"));
        if !status.is_success() {
            tracing::error!(status = %status, url, body = %text, "Archive returned error");
            return Err(classify_status(status.as_u16(), text));
        }

        Ok(UploadReceipt {
            destination,
            record_id: record_id(&text),
            content_hash: Some(hash),
        })
    }
}
