//! Read-only client for the record store holding queries and reports.
//!
//! The store itself enforces nothing about report ownership; ownership
//! derives from the query a report references, so listings are
//! cross-referenced against owner-scoped query lookups and reports without a
//! matching owned parent are silently dropped.

use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use shared::{
    domain::{QueryId, ReportId, UserId},
    error::ApiError,
    protocol::{QueryRow, ReportRow},
};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("record store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("record store rejected the request: {0}")]
    Store(String),
    #[error("record store returned a malformed body: {0}")]
    MalformedBody(#[source] reqwest::Error),
}

/// A completed report joined with the question of its owned parent query.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedReport {
    pub report: ReportRow,
    pub question: String,
}

/// Joins report rows against owner-scoped query rows, dropping reports whose
/// parent query is not among them. Input order is preserved.
pub fn owned_report_listing(reports: Vec<ReportRow>, queries: &[QueryRow]) -> Vec<OwnedReport> {
    let questions: HashMap<QueryId, &str> = queries
        .iter()
        .map(|query| (query.id, query.question.as_str()))
        .collect();

    reports
        .into_iter()
        .filter_map(|report| {
            questions.get(&report.query_id).map(|question| OwnedReport {
                question: (*question).to_string(),
                report,
            })
        })
        .collect()
}

pub struct RecordStoreClient {
    http: Client,
    reports_url: Url,
    queries_url: Url,
}

impl RecordStoreClient {
    pub fn new(base_url: &Url) -> Result<Self> {
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let join = |segment: &str| {
            base.join(segment)
                .with_context(|| format!("invalid record store endpoint '{segment}'"))
        };

        Ok(Self {
            http: Client::new(),
            reports_url: join("reports")?,
            queries_url: join("queries")?,
        })
    }

    /// Newest-first completed reports, unfiltered by owner; callers join the
    /// result against [`RecordStoreClient::list_owned_queries`].
    pub async fn list_completed_reports(
        &self,
        access_token: &str,
        limit: usize,
    ) -> Result<Vec<ReportRow>, RecordStoreError> {
        let mut url = self.reports_url.clone();
        url.query_pairs_mut()
            .append_pair("status", "completed")
            .append_pair("order", "created_at.desc")
            .append_pair("limit", &limit.to_string())
            .finish();
        debug!(%url, "record store: list reports");

        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        if !response.status().is_success() {
            return Err(store_error(response).await);
        }
        response.json().await.map_err(RecordStoreError::MalformedBody)
    }

    /// Queries owned by `user_id` among the given ids. Empty input short
    /// circuits to an empty result without a network round trip.
    pub async fn list_owned_queries(
        &self,
        access_token: &str,
        user_id: UserId,
        ids: &[QueryId],
    ) -> Result<Vec<QueryRow>, RecordStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let id_list = ids
            .iter()
            .map(|id| id.0.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut url = self.queries_url.clone();
        url.query_pairs_mut()
            .append_pair("user_id", &user_id.to_string())
            .append_pair("id_in", &id_list)
            .finish();
        debug!(%url, "record store: list owned queries");

        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        if !response.status().is_success() {
            return Err(store_error(response).await);
        }
        response.json().await.map_err(RecordStoreError::MalformedBody)
    }

    pub async fn fetch_report(
        &self,
        access_token: &str,
        id: ReportId,
    ) -> Result<Option<ReportRow>, RecordStoreError> {
        let url = match Url::parse(&format!("{}/{}", self.reports_url, id.0)) {
            Ok(url) => url,
            Err(_) => return Err(RecordStoreError::Store(format!("invalid report id {id}"))),
        };

        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(
                response.json().await.map_err(RecordStoreError::MalformedBody)?,
            )),
            _ => Err(store_error(response).await),
        }
    }

    /// The owned-parent gate for the report detail page: `None` when the
    /// query does not exist or belongs to someone else.
    pub async fn fetch_owned_query(
        &self,
        access_token: &str,
        user_id: UserId,
        id: QueryId,
    ) -> Result<Option<QueryRow>, RecordStoreError> {
        let mut url = match Url::parse(&format!("{}/{}", self.queries_url, id.0)) {
            Ok(url) => url,
            Err(_) => return Err(RecordStoreError::Store(format!("invalid query id {id}"))),
        };
        url.query_pairs_mut()
            .append_pair("user_id", &user_id.to_string())
            .finish();

        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(
                response.json().await.map_err(RecordStoreError::MalformedBody)?,
            )),
            _ => Err(store_error(response).await),
        }
    }
}

async fn store_error(response: reqwest::Response) -> RecordStoreError {
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(body) => RecordStoreError::Store(body.message),
        Err(_) => RecordStoreError::Store(format!("status {status}")),
    }
}

#[cfg(test)]
#[path = "tests/records_tests.rs"]
mod tests;
