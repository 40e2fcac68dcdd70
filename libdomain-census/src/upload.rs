use crate::aggregate::{BlockAggregate, GlobalDelta, LengthStats, WordPosStats};
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const API_KEY_HEADER: &str = "x-admin-api-key";
pub const UPLOAD_PATH: &str = "/api/admin/upload-aggregate";
pub const RESET_PATH: &str = "/api/admin/reset";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Stats store rejected the API key (HTTP {0})")]
    Unauthorized(u16),
    #[error("Stats store answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Upload request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Upload timed out")]
    Timeout,
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl UploadError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, UploadError::Unauthorized(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadPayload<'a> {
    pub date: NaiveDate,
    pub global: &'a GlobalDelta,
    pub length_stats: &'a [LengthStats],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub word_pos_stats: &'a [WordPosStats],
}

impl<'a> UploadPayload<'a> {
    pub fn new(
        date: NaiveDate,
        global: &'a GlobalDelta,
        length_stats: &'a [LengthStats],
        word_pos_stats: &'a [WordPosStats],
    ) -> Self {
        Self {
            date,
            global,
            length_stats,
            word_pos_stats,
        }
    }
}

impl BlockAggregate {
    pub fn payload(&self) -> UploadPayload<'_> {
        UploadPayload::new(
            self.date,
            &self.global,
            &self.length_stats,
            &self.word_pos_stats,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Sent,
    /// Dry run: nothing was transmitted; carries what would have been sent.
    DryRun(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct UploadClient {
    client: Client,
    api_base: String,
    api_key: String,
    timeout: Duration,
    dry_run: bool,
}

impl UploadClient {
    pub fn new(client: Client, api_base: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// One authenticated POST; no retries.
    pub async fn send(&self, payload: &UploadPayload<'_>) -> Result<UploadOutcome, UploadError> {
        let body = serde_json::to_value(payload)?;
        if self.dry_run {
            info!(payload = %body, "Dry run, not uploading");
            return Ok(UploadOutcome::DryRun(body));
        }

        let request = self
            .client
            .post(self.url(UPLOAD_PATH))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body);
        self.execute(request).await?;
        debug!(date = %payload.date, "Aggregate uploaded");
        Ok(UploadOutcome::Sent)
    }

    /// Clears all remote aggregates.
    pub async fn reset(&self) -> Result<UploadOutcome, UploadError> {
        if self.dry_run {
            info!("Dry run, not resetting remote stats");
            return Ok(UploadOutcome::DryRun(serde_json::Value::Null));
        }

        let request = self
            .client
            .post(self.url(RESET_PATH))
            .header(API_KEY_HEADER, &self.api_key);
        self.execute(request).await?;
        info!("Remote stats reset");
        Ok(UploadOutcome::Sent)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<(), UploadError> {
        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(UploadError::Timeout),
            Ok(Err(e)) => return Err(UploadError::Transport(e)),
            Err(_) => return Err(UploadError::Timeout),
        };

        match response.status() {
            status if status.is_success() => Ok(()),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(UploadError::Unauthorized(status.as_u16()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(UploadError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
