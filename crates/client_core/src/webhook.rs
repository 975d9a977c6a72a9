//! HTTP client for the external analysis webhooks (analyze, report, preview).

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use shared::protocol::{
    AnalyzeRequest, AnalyzeResponse, PreviewRequest, PreviewResponse, ReportRequest,
    ReportResponse,
};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::workbench::AnalysisBackend;

/// Maximum preview length shown to signed-out visitors, in characters.
pub const PREVIEW_CHAR_LIMIT: usize = 420;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("{endpoint} request failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} failed with status {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("{endpoint} returned a malformed body: {source}")]
    MalformedBody {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("no preview text returned")]
    EmptyPreview,
}

#[derive(Clone, Debug)]
pub struct WebhookClient {
    http: Client,
    analyze_url: Url,
    report_url: Url,
    preview_url: Url,
}

impl WebhookClient {
    pub fn new(analyze_url: Url, report_url: Url, preview_url: Url) -> Self {
        Self {
            http: Client::new(),
            analyze_url,
            report_url,
            preview_url,
        }
    }

    async fn post_json<Req, Resp>(
        &self,
        endpoint: &'static str,
        url: &Url,
        body: &Req,
    ) -> Result<Resp, WebhookError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        debug!(endpoint, %url, "webhook request");
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|source| WebhookError::Transport { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|source| WebhookError::MalformedBody { endpoint, source })
    }

    /// Unauthenticated landing-page teaser: returns a truncated summary for
    /// the given question. Empty or missing summary text is an error.
    pub async fn preview(&self, question: &str) -> Result<String, WebhookError> {
        let request = PreviewRequest {
            question: question.trim().to_string(),
        };
        let response: PreviewResponse =
            self.post_json("preview", &self.preview_url, &request).await?;

        let summary = response.summary.unwrap_or_default();
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(WebhookError::EmptyPreview);
        }
        Ok(truncate_preview(summary))
    }
}

/// Truncates a preview to [`PREVIEW_CHAR_LIMIT`] characters, always on a char
/// boundary, appending `...` when text was cut.
pub fn truncate_preview(summary: &str) -> String {
    match summary.char_indices().nth(PREVIEW_CHAR_LIMIT) {
        Some((idx, _)) => format!("{}...", &summary[..idx]),
        None => summary.to_string(),
    }
}

#[async_trait]
impl AnalysisBackend for WebhookClient {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse> {
        Ok(self
            .post_json("analyze", &self.analyze_url, &request)
            .await?)
    }

    async fn report(&self, request: ReportRequest) -> Result<ReportResponse> {
        Ok(self.post_json("report", &self.report_url, &request).await?)
    }
}

#[cfg(test)]
#[path = "tests/webhook_tests.rs"]
mod tests;
