use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    QueryId, ReportFormat, ReportId, ReportStatus, SessionId, SophisticationLabel, UserId,
};

/// Body posted to the analyze webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzeRequest {
    pub question: String,
    pub user_id: UserId,
}

/// Analyze webhook response. `session_id` and `summary` are required to be
/// non-empty by the workbench; they default to empty here so a missing field
/// surfaces as a protocol violation instead of a decode error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub session_id: SessionId,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sophistication_label: Option<SophisticationLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sophistication_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_count: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    MoveForward,
}

/// Body posted to the report webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportRequest {
    pub session_id: SessionId,
    pub action: ReportAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportResponse {
    #[serde(default)]
    pub report: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ReportFormat>,
}

/// Landing-page teaser request; unauthenticated, so no user id is attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviewRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviewResponse {
    #[serde(default)]
    pub summary: Option<String>,
}

/// Report row as returned by the record store. Ownership is not carried on
/// the row itself; it derives from the query the report references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportRow {
    pub id: ReportId,
    pub query_id: QueryId,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub report_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRow {
    pub id: QueryId,
    pub user_id: UserId,
    pub question: String,
}
