//! Backend worker: a dedicated thread with its own tokio runtime that owns
//! the webhook, auth, and record-store clients plus the workbench controller,
//! and services UI commands sequentially.

use std::thread;

use client_core::{
    load_settings, owned_report_listing, AnalysisBackend, AuthClient, AuthSession,
    RecordStoreClient, WebhookClient, WorkbenchController,
};
use crossbeam_channel::{Receiver, Sender};
use shared::domain::{QueryId, ReportId};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

const DASHBOARD_REPORT_LIMIT: usize = 8;
const HISTORY_REPORT_LIMIT: usize = 50;

struct BackendState {
    webhook: WebhookClient,
    auth: AuthClient,
    records: RecordStoreClient,
    session: Option<AuthSession>,
    workbench: Option<WorkbenchController<WebhookClient>>,
}

impl BackendState {
    fn establish_session(&mut self, session: AuthSession) {
        self.workbench = Some(WorkbenchController::new(
            self.webhook.clone(),
            session.user.id,
        ));
        self.session = Some(session);
    }

    fn clear_session(&mut self) {
        self.session = None;
        self.workbench = None;
    }
}

pub fn spawn_backend_thread(cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let settings = load_settings();
            let clients = settings
                .webhook_client()
                .and_then(|webhook| Ok((webhook, settings.auth_client()?)))
                .and_then(|(webhook, auth)| Ok((webhook, auth, settings.record_store_client()?)));
            let (webhook, auth, records) = match clients {
                Ok(clients) => clients,
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        format!("backend worker startup failure: invalid endpoint configuration: {err:#}"),
                    )));
                    tracing::error!("invalid endpoint configuration: {err:#}");
                    return;
                }
            };

            let mut state = BackendState {
                webhook,
                auth,
                records,
                session: None,
                workbench: None,
            };

            while let Ok(cmd) = cmd_rx.recv() {
                handle_command(&mut state, cmd, &ui_tx).await;
            }
        });
    });
}

async fn handle_command(state: &mut BackendState, cmd: BackendCommand, ui_tx: &Sender<UiEvent>) {
    match cmd {
        BackendCommand::ExchangeSignInCode { code } => match state.auth.exchange_code(&code).await
        {
            Ok(session) => {
                tracing::info!(user_id = %session.user.id, "signed in");
                state.establish_session(session.clone());
                let _ = ui_tx.try_send(UiEvent::SignedIn { session });
            }
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::SignIn,
                    err.to_string(),
                )));
            }
        },
        BackendCommand::RestoreSession { access_token } => {
            match state.auth.current_user(&access_token).await {
                Ok(Some(user)) => {
                    let session = AuthSession {
                        access_token,
                        user,
                    };
                    state.establish_session(session.clone());
                    let _ = ui_tx.try_send(UiEvent::SignedIn { session });
                }
                Ok(None) => {
                    let _ = ui_tx.try_send(UiEvent::SessionRestoreFailed);
                }
                Err(err) => {
                    tracing::warn!("session restore failed: {err}");
                    let _ = ui_tx.try_send(UiEvent::SessionRestoreFailed);
                }
            }
        }
        BackendCommand::SignOut => {
            if let Some(session) = state.session.take() {
                if let Err(err) = state.auth.sign_out(&session.access_token).await {
                    // Local state is dropped either way.
                    tracing::warn!("sign-out request failed: {err}");
                }
            }
            state.clear_session();
            let _ = ui_tx.try_send(UiEvent::SignedOut);
        }
        BackendCommand::SubmitQuestion { question } => {
            let Some(workbench) = state.workbench.as_mut() else {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::Workbench,
                    "sign in before submitting a question",
                )));
                return;
            };
            if let Some(pending) = workbench.begin_submit(&question) {
                let _ = ui_tx.try_send(UiEvent::Workbench(workbench.snapshot()));
                let outcome = state.webhook.analyze(pending.request.clone()).await;
                workbench.finish_submit(pending, outcome);
            }
            let _ = ui_tx.try_send(UiEvent::Workbench(workbench.snapshot()));
        }
        BackendCommand::GenerateReport => {
            let Some(workbench) = state.workbench.as_mut() else {
                return;
            };
            if let Some(pending) = workbench.begin_generate_report() {
                let _ = ui_tx.try_send(UiEvent::Workbench(workbench.snapshot()));
                let outcome = state.webhook.report(pending.request.clone()).await;
                workbench.finish_generate_report(pending, outcome);
            }
            let _ = ui_tx.try_send(UiEvent::Workbench(workbench.snapshot()));
        }
        BackendCommand::ResetWorkbench => {
            if let Some(workbench) = state.workbench.as_mut() {
                workbench.reset();
                let _ = ui_tx.try_send(UiEvent::Workbench(workbench.snapshot()));
            }
        }
        BackendCommand::PreviewQuestion { question } => {
            match state.webhook.preview(&question).await {
                Ok(preview) => {
                    let _ = ui_tx.try_send(UiEvent::PreviewLoaded(preview));
                }
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::PreviewFailed(err.to_string()));
                }
            }
        }
        BackendCommand::LoadDashboard => {
            match load_owned_reports(state, DASHBOARD_REPORT_LIMIT).await {
                Ok(reports) => {
                    let _ = ui_tx.try_send(UiEvent::DashboardLoaded(reports));
                }
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(err));
                }
            }
        }
        BackendCommand::LoadHistory => match load_owned_reports(state, HISTORY_REPORT_LIMIT).await
        {
            Ok(reports) => {
                let _ = ui_tx.try_send(UiEvent::HistoryLoaded(reports));
            }
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(err));
            }
        },
        BackendCommand::LoadReportDetail { report_id } => {
            match load_report_detail(state, report_id).await {
                Ok(Some((report, question))) => {
                    let _ = ui_tx.try_send(UiEvent::ReportDetailLoaded { report, question });
                }
                Ok(None) => {
                    let _ = ui_tx.try_send(UiEvent::ReportDetailMissing);
                }
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(err));
                }
            }
        }
    }
}

/// Newest-first completed reports joined against the signed-in user's
/// queries; reports without an owned parent query are dropped.
async fn load_owned_reports(
    state: &BackendState,
    limit: usize,
) -> Result<Vec<client_core::OwnedReport>, UiError> {
    let session = state
        .session
        .as_ref()
        .ok_or_else(|| UiError::from_message(UiErrorContext::Records, "session expired"))?;

    let reports = state
        .records
        .list_completed_reports(&session.access_token, limit)
        .await
        .map_err(|err| UiError::from_message(UiErrorContext::Records, err.to_string()))?;

    let mut query_ids: Vec<QueryId> = reports.iter().map(|report| report.query_id).collect();
    query_ids.sort_by_key(|id| id.0);
    query_ids.dedup();

    let queries = state
        .records
        .list_owned_queries(&session.access_token, session.user.id, &query_ids)
        .await
        .map_err(|err| UiError::from_message(UiErrorContext::Records, err.to_string()))?;

    Ok(owned_report_listing(reports, &queries))
}

async fn load_report_detail(
    state: &BackendState,
    report_id: ReportId,
) -> Result<Option<(shared::protocol::ReportRow, String)>, UiError> {
    let session = state
        .session
        .as_ref()
        .ok_or_else(|| UiError::from_message(UiErrorContext::Records, "session expired"))?;

    let Some(report) = state
        .records
        .fetch_report(&session.access_token, report_id)
        .await
        .map_err(|err| UiError::from_message(UiErrorContext::Records, err.to_string()))?
    else {
        return Ok(None);
    };

    // Ownership gate: the detail page only shows reports whose parent query
    // belongs to the signed-in user.
    let Some(query) = state
        .records
        .fetch_owned_query(&session.access_token, session.user.id, report.query_id)
        .await
        .map_err(|err| UiError::from_message(UiErrorContext::Records, err.to_string()))?
    else {
        return Ok(None);
    };

    Ok(Some((report, query.question)))
}
