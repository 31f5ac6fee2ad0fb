use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use drivewatch_core::{MetadataSource, Records, ResourceRecord};
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::auth::TokenManager;
use crate::batch::{self, BatchRequest, SubResponse};
use crate::error::{BatchError, PartError};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";
pub const DEFAULT_FIELDS: &[&str] = &["id", "name", "mimeType", "modifiedTime", "viewedByMeTime"];

const BATCH_PATH: &str = "/batch/drive/v3";
const FILES_PATH: &str = "/drive/v3/files";
const MAX_RETRIES: u32 = 3;
/// Upper bound on a server-requested backoff.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Fetches file metadata through the Drive batch endpoint.
#[derive(Clone)]
pub struct DriveClient {
    auth: TokenManager,
    http: reqwest::Client,
    api_base: String,
    fields: Vec<String>,
    max_retry_delay: Duration,
}

impl DriveClient {
    pub fn new(auth: TokenManager, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            auth,
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }

    /// Metadata for each id, restricted to `fields`, in one batch call.
    ///
    /// Sub-responses that fail on their own are logged and left out of the
    /// result. Transport errors, a non-success batch status or an
    /// unparseable envelope fail the whole call.
    pub async fn fetch_metadata(&self, ids: &[String], fields: &[String]) -> Result<Records> {
        if ids.is_empty() {
            return Ok(Records::new());
        }

        let fields = fields.join(",");
        let mut batch = BatchRequest::new();
        for id in ids {
            batch.get(file_path(id, &fields)?);
        }
        let url = format!("{}{BATCH_PATH}", self.api_base);
        let payload = batch.encode();

        let mut retries = 0;
        let resp = loop {
            let token = self.auth.get_valid_token().await?;
            let resp = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .header(CONTENT_TYPE, batch.content_type())
                .body(payload.clone())
                .send()
                .await
                .with_context(|| format!("POST {url} failed"))?;

            let status = resp.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
            {
                retries += 1;
                if retries > MAX_RETRIES {
                    return Err(BatchError::Status {
                        status: status.as_u16(),
                        body: "retries exhausted".to_string(),
                    }
                    .into());
                }
                let retry_after = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(2u64.pow(retries));
                let delay = Duration::from_secs(retry_after).min(self.max_retry_delay);
                warn!(
                    url = %url,
                    retry_after,
                    delay_ms = delay.as_millis() as u64,
                    retries,
                    "rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(BatchError::Status {
                    status: status.as_u16(),
                    body,
                }
                .into());
            }
            break resp;
        };

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let boundary = batch::boundary_from_content_type(&content_type)?;
        let body = resp
            .text()
            .await
            .context("failed to read batch response")?;

        let records = collect_records(ids, batch::decode(&body, &boundary)?);
        debug!(requested = ids.len(), received = records.len(), "batch fetch complete");
        Ok(records)
    }
}

#[async_trait]
impl MetadataSource for DriveClient {
    async fn fetch(&self, ids: &[String]) -> Result<Records> {
        self.fetch_metadata(ids, &self.fields).await
    }
}

/// Path and query of the metadata GET for one file.
fn file_path(id: &str, fields: &str) -> Result<String> {
    let url = Url::parse_with_params(
        &format!("{DEFAULT_API_BASE}{FILES_PATH}/{id}"),
        [("fields", fields)],
    )
    .with_context(|| format!("invalid file id: {id}"))?;
    Ok(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
}

/// Map sub-responses back to requested ids through their content ids.
fn collect_records(ids: &[String], parts: Vec<Result<SubResponse, PartError>>) -> Records {
    let mut records = Records::new();
    for part in parts {
        let part = match part {
            Ok(part) => part,
            Err(err) => {
                warn!(error = %err, "dropping malformed batch part");
                continue;
            }
        };
        let Some(id) = part.content_id.checked_sub(1).and_then(|i| ids.get(i)) else {
            warn!(error = %PartError::UnknownCorrelation(part.content_id), "dropping batch part");
            continue;
        };
        match part.json::<ResourceRecord>() {
            Ok(mut record) => {
                record.id = id.clone();
                records.insert(id.clone(), record);
            }
            Err(err) => warn!(id = %id, error = %err, "dropping batch entry"),
        }
    }
    records
}
