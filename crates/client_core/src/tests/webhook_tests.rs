use super::*;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use shared::{
    domain::{ReportFormat, SessionId, SophisticationLabel, UserId},
    protocol::{AnalyzeRequest, ReportAction, ReportRequest},
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};
use uuid::Uuid;

#[derive(Clone)]
struct WebhookServerState {
    tx: Arc<Mutex<Option<oneshot::Sender<Value>>>>,
    reply_status: StatusCode,
    reply_body: Value,
}

async fn handle_webhook(
    State(state): State<WebhookServerState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(payload);
    }
    (state.reply_status, Json(state.reply_body.clone()))
}

async fn spawn_webhook_server(
    reply_status: StatusCode,
    reply_body: Value,
) -> anyhow::Result<(Url, oneshot::Receiver<Value>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel();
    let state = WebhookServerState {
        tx: Arc::new(Mutex::new(Some(tx))),
        reply_status,
        reply_body,
    };
    let app = Router::new()
        .route("/hook", post(handle_webhook))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((Url::parse(&format!("http://{addr}/hook"))?, rx))
}

fn client_for(url: &Url) -> WebhookClient {
    WebhookClient::new(url.clone(), url.clone(), url.clone())
}

#[tokio::test]
async fn analyze_posts_question_and_user_id() {
    let (url, payload_rx) = spawn_webhook_server(
        StatusCode::OK,
        json!({
            "session_id": "sess-7",
            "summary": "Demand looks sticky.",
            "sophistication_label": "low",
            "market_count": 2
        }),
    )
    .await
    .expect("spawn server");

    let user_id = UserId(Uuid::new_v4());
    let response = client_for(&url)
        .analyze(AnalyzeRequest {
            question: "Will AI chip demand keep rising?".to_string(),
            user_id,
        })
        .await
        .expect("analyze");

    assert_eq!(response.session_id.0, "sess-7");
    assert_eq!(
        response.sophistication_label,
        Some(SophisticationLabel::Low)
    );
    assert_eq!(response.market_count, Some(2));

    let payload = payload_rx.await.expect("payload");
    assert_eq!(payload["question"], "Will AI chip demand keep rising?");
    assert_eq!(payload["user_id"], user_id.to_string());
}

#[tokio::test]
async fn analyze_maps_http_500_to_status_error() {
    let (url, _payload_rx) = spawn_webhook_server(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": "pipeline down"}),
    )
    .await
    .expect("spawn server");

    let err = client_for(&url)
        .analyze(AnalyzeRequest {
            question: "q".to_string(),
            user_id: UserId(Uuid::new_v4()),
        })
        .await
        .expect_err("must fail");

    assert!(err.to_string().contains("analyze failed with status 500"));
}

#[tokio::test]
async fn analyze_rejects_non_object_body_as_malformed() {
    let (url, _payload_rx) = spawn_webhook_server(StatusCode::OK, json!("not an object"))
        .await
        .expect("spawn server");

    let err = client_for(&url)
        .analyze(AnalyzeRequest {
            question: "q".to_string(),
            user_id: UserId(Uuid::new_v4()),
        })
        .await
        .expect_err("must fail");

    assert!(err.to_string().contains("malformed body"));
}

#[tokio::test]
async fn report_sends_session_and_move_forward_action() {
    let (url, payload_rx) = spawn_webhook_server(
        StatusCode::OK,
        json!({"report": "# Outlook\n\nFirm.", "format": "markdown"}),
    )
    .await
    .expect("spawn server");

    let response = client_for(&url)
        .report(ReportRequest {
            session_id: SessionId("sess-9".to_string()),
            action: ReportAction::MoveForward,
        })
        .await
        .expect("report");

    assert!(response.report.starts_with("# Outlook"));
    assert_eq!(response.format, Some(ReportFormat::Markdown));

    let payload = payload_rx.await.expect("payload");
    assert_eq!(payload["session_id"], "sess-9");
    assert_eq!(payload["action"], "move_forward");
}

#[tokio::test]
async fn report_maps_http_500_to_status_error() {
    let (url, _payload_rx) =
        spawn_webhook_server(StatusCode::INTERNAL_SERVER_ERROR, json!({}))
            .await
            .expect("spawn server");

    let err = client_for(&url)
        .report(ReportRequest {
            session_id: SessionId("sess-9".to_string()),
            action: ReportAction::MoveForward,
        })
        .await
        .expect_err("must fail");

    assert!(err.to_string().contains("report failed with status 500"));
}

#[tokio::test]
async fn preview_trims_question_and_truncates_long_summaries() {
    let long_summary = "m".repeat(PREVIEW_CHAR_LIMIT + 80);
    let (url, payload_rx) =
        spawn_webhook_server(StatusCode::OK, json!({ "summary": long_summary }))
            .await
            .expect("spawn server");

    let preview = client_for(&url)
        .preview("  Will shipping be impacted?  ")
        .await
        .expect("preview");

    assert_eq!(preview.chars().count(), PREVIEW_CHAR_LIMIT + 3);
    assert!(preview.ends_with("..."));

    let payload = payload_rx.await.expect("payload");
    assert_eq!(payload["question"], "Will shipping be impacted?");
}

#[tokio::test]
async fn preview_rejects_blank_summary() {
    let (url, _payload_rx) = spawn_webhook_server(StatusCode::OK, json!({ "summary": "   " }))
        .await
        .expect("spawn server");

    let err = client_for(&url)
        .preview("question")
        .await
        .expect_err("must fail");

    assert!(matches!(err, WebhookError::EmptyPreview));
}

#[test]
fn truncate_preview_is_char_boundary_safe() {
    let multibyte = "é".repeat(PREVIEW_CHAR_LIMIT + 1);
    let truncated = truncate_preview(&multibyte);
    assert_eq!(truncated.chars().count(), PREVIEW_CHAR_LIMIT + 3);
    assert!(truncated.ends_with("..."));
}

#[test]
fn truncate_preview_passes_short_text_through() {
    let exact = "x".repeat(PREVIEW_CHAR_LIMIT);
    assert_eq!(truncate_preview(&exact), exact);
    assert_eq!(truncate_preview("short"), "short");
}
