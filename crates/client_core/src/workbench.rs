//! Query workbench controller: a five-state view machine driving the two
//! webhook calls (analyze, then report).
//!
//! Transitions are split into `begin_*`/`finish_*` pairs so the machine is
//! testable without a network and so a host UI can observe the loading states
//! while a request is in flight. The async `submit`/`generate_report`
//! wrappers compose both halves over the owned backend.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ReportFormat, SessionId, UserId},
    protocol::{AnalyzeRequest, AnalyzeResponse, ReportAction, ReportRequest, ReportResponse},
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    LoadingSummary,
    Review,
    LoadingReport,
    Final,
    Error,
}

impl ViewState {
    /// True while a webhook request is in flight; submit and report actions
    /// are rejected in these states.
    pub fn is_loading(self) -> bool {
        matches!(self, Self::LoadingSummary | Self::LoadingReport)
    }
}

/// Sophistication metadata from the analyze response. Neutral values stand in
/// for fields the backend omitted.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMeta {
    pub score: f64,
    pub label: String,
    pub market_count: u32,
}

impl Default for SessionMeta {
    fn default() -> Self {
        Self {
            score: 0.0,
            label: String::new(),
            market_count: 0,
        }
    }
}

impl SessionMeta {
    fn from_analyze(response: &AnalyzeResponse) -> Self {
        Self {
            score: response.sophistication_score.unwrap_or(0.0),
            label: response
                .sophistication_label
                .map(|label| label.as_str().to_string())
                .unwrap_or_else(|| "n/a".to_string()),
            market_count: response.market_count.unwrap_or(0),
        }
    }
}

/// Ephemeral per-run session. Owned exclusively by the controller, populated
/// incrementally by the two webhook responses, discarded on reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbenchSession {
    pub session_id: SessionId,
    pub question: String,
    pub summary: String,
    pub report: String,
    pub report_format: Option<ReportFormat>,
    pub meta: SessionMeta,
}

/// Read-only view of the controller handed to UI layers.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbenchSnapshot {
    pub state: ViewState,
    pub session: WorkbenchSession,
    pub error_message: String,
}

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse>;
    async fn report(&self, request: ReportRequest) -> Result<ReportResponse>;
}

pub struct MissingAnalysisBackend;

#[async_trait]
impl AnalysisBackend for MissingAnalysisBackend {
    async fn analyze(&self, _request: AnalyzeRequest) -> Result<AnalyzeResponse> {
        Err(anyhow!("analysis backend is not configured"))
    }

    async fn report(&self, _request: ReportRequest) -> Result<ReportResponse> {
        Err(anyhow!("analysis backend is not configured"))
    }
}

/// Token returned by `begin_submit`; carries the request to send and the
/// generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnalyze {
    pub request: AnalyzeRequest,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReport {
    pub request: ReportRequest,
    generation: u64,
}

pub struct WorkbenchController<B> {
    backend: B,
    user_id: UserId,
    state: ViewState,
    session: WorkbenchSession,
    error_message: String,
    // Bumped on reset so a completion from before the reset is discarded
    // instead of overwriting fresh state.
    generation: u64,
}

impl<B> WorkbenchController<B> {
    /// Identity is an explicit input; the controller never reads ambient
    /// auth state.
    pub fn new(backend: B, user_id: UserId) -> Self {
        Self {
            backend,
            user_id,
            state: ViewState::Idle,
            session: WorkbenchSession::default(),
            error_message: String::new(),
            generation: 0,
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn session(&self) -> &WorkbenchSession {
        &self.session
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn snapshot(&self) -> WorkbenchSnapshot {
        WorkbenchSnapshot {
            state: self.state,
            session: self.session.clone(),
            error_message: self.error_message.clone(),
        }
    }

    /// Starts an analyze run. No-op (returns `None`) when the question is
    /// blank after trimming or a request is already in flight. Any previous
    /// session is discarded before entering `LoadingSummary`.
    pub fn begin_submit(&mut self, question: &str) -> Option<PendingAnalyze> {
        let question = question.trim();
        if question.is_empty() || self.state.is_loading() {
            return None;
        }

        self.session = WorkbenchSession {
            question: question.to_string(),
            ..WorkbenchSession::default()
        };
        self.error_message.clear();
        self.state = ViewState::LoadingSummary;
        debug!(generation = self.generation, "workbench: analyze started");

        Some(PendingAnalyze {
            request: AnalyzeRequest {
                question: question.to_string(),
                user_id: self.user_id,
            },
            generation: self.generation,
        })
    }

    pub fn finish_submit(
        &mut self,
        pending: PendingAnalyze,
        outcome: Result<AnalyzeResponse>,
    ) -> ViewState {
        if pending.generation != self.generation {
            debug!(
                stale = pending.generation,
                current = self.generation,
                "workbench: discarding analyze completion from before reset"
            );
            return self.state;
        }

        match outcome {
            Ok(response) if response.session_id.is_empty() || response.summary.is_empty() => {
                self.fail("invalid analyze response: missing session or summary context");
            }
            Ok(response) => {
                self.session.meta = SessionMeta::from_analyze(&response);
                self.session.session_id = response.session_id;
                self.session.summary = response.summary;
                self.state = ViewState::Review;
            }
            Err(err) => self.fail(format!("{err:#}")),
        }
        self.state
    }

    /// Starts the full-report run. No-op unless the machine is in `Review`
    /// with a non-empty session id.
    pub fn begin_generate_report(&mut self) -> Option<PendingReport> {
        if self.state != ViewState::Review || self.session.session_id.is_empty() {
            return None;
        }

        self.error_message.clear();
        self.state = ViewState::LoadingReport;
        debug!(
            session_id = %self.session.session_id,
            "workbench: report generation started"
        );

        Some(PendingReport {
            request: ReportRequest {
                session_id: self.session.session_id.clone(),
                action: ReportAction::MoveForward,
            },
            generation: self.generation,
        })
    }

    pub fn finish_generate_report(
        &mut self,
        pending: PendingReport,
        outcome: Result<ReportResponse>,
    ) -> ViewState {
        if pending.generation != self.generation {
            debug!(
                stale = pending.generation,
                current = self.generation,
                "workbench: discarding report completion from before reset"
            );
            return self.state;
        }

        match outcome {
            Ok(response) if response.report.is_empty() => {
                self.fail("invalid report response: missing report content");
            }
            Ok(response) => {
                self.session.report = response.report;
                self.session.report_format = response.format;
                self.state = ViewState::Final;
            }
            Err(err) => self.fail(format!("{err:#}")),
        }
        self.state
    }

    /// Clears all session fields and returns to `Idle` from any state. May be
    /// invoked mid-error or mid-flight; an in-flight completion that lands
    /// afterwards is discarded via the generation counter.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.session = WorkbenchSession::default();
        self.error_message.clear();
        self.state = ViewState::Idle;
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.error_message = message.into();
        warn!(error = %self.error_message, "workbench: entering error state");
        self.state = ViewState::Error;
    }
}

impl<B: AnalysisBackend> WorkbenchController<B> {
    pub async fn submit(&mut self, question: &str) -> ViewState {
        let Some(pending) = self.begin_submit(question) else {
            return self.state;
        };
        let outcome = self.backend.analyze(pending.request.clone()).await;
        self.finish_submit(pending, outcome)
    }

    pub async fn generate_report(&mut self) -> ViewState {
        let Some(pending) = self.begin_generate_report() else {
            return self.state;
        };
        let outcome = self.backend.report(pending.request.clone()).await;
        self.finish_generate_report(pending, outcome)
    }
}

#[cfg(test)]
#[path = "tests/workbench_tests.rs"]
mod tests;
