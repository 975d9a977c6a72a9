use super::*;

use axum::{
    extract::{Path, Query as AxumQuery},
    http::StatusCode as AxumStatus,
    routing::get,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde_json::json;
use shared::domain::ReportStatus;
use tokio::net::TcpListener;
use uuid::Uuid;

fn report_row(query_id: QueryId, day: u32) -> ReportRow {
    ReportRow {
        id: ReportId(Uuid::new_v4()),
        query_id,
        status: ReportStatus::Completed,
        created_at: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).single().expect("timestamp"),
        report_content: Some("# Outlook".to_string()),
    }
}

fn query_row(id: QueryId, user_id: UserId, question: &str) -> QueryRow {
    QueryRow {
        id,
        user_id,
        question: question.to_string(),
    }
}

#[test]
fn listing_drops_reports_without_an_owned_parent_query() {
    let owner = UserId(Uuid::new_v4());
    let owned_query = QueryId(Uuid::new_v4());
    let foreign_query = QueryId(Uuid::new_v4());

    let reports = vec![
        report_row(owned_query, 3),
        report_row(foreign_query, 2),
        report_row(owned_query, 1),
    ];
    let queries = vec![query_row(owned_query, owner, "Will tariffs hit shipping?")];

    let listing = owned_report_listing(reports.clone(), &queries);

    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].report.id, reports[0].id);
    assert_eq!(listing[1].report.id, reports[2].id);
    assert!(listing
        .iter()
        .all(|entry| entry.question == "Will tariffs hit shipping?"));
}

#[test]
fn listing_is_empty_when_no_queries_are_owned() {
    let reports = vec![report_row(QueryId(Uuid::new_v4()), 1)];
    assert!(owned_report_listing(reports, &[]).is_empty());
}

async fn spawn_store_server(app: Router) -> anyhow::Result<Url> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(Url::parse(&format!("http://{addr}/rest/v1"))?)
}

#[tokio::test]
async fn list_completed_reports_sends_status_order_and_limit() {
    let query_id = Uuid::new_v4();
    let report_id = Uuid::new_v4();
    let app = Router::new().route(
        "/rest/v1/reports",
        get(
            move |AxumQuery(params): AxumQuery<std::collections::HashMap<String, String>>| async move {
                assert_eq!(params.get("status").map(String::as_str), Some("completed"));
                assert_eq!(
                    params.get("order").map(String::as_str),
                    Some("created_at.desc")
                );
                assert_eq!(params.get("limit").map(String::as_str), Some("8"));
                Json(json!([{
                    "id": report_id,
                    "query_id": query_id,
                    "status": "completed",
                    "created_at": "2024-03-01T12:30:00Z"
                }]))
            },
        ),
    );
    let base = spawn_store_server(app).await.expect("spawn server");

    let client = RecordStoreClient::new(&base).expect("client");
    let reports = client
        .list_completed_reports("token-abc", 8)
        .await
        .expect("list");

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id, ReportId(report_id));
    assert_eq!(reports[0].status, ReportStatus::Completed);
}

#[tokio::test]
async fn list_owned_queries_short_circuits_on_empty_input() {
    // No server at this address; an accidental request would fail the test.
    let base = Url::parse("http://127.0.0.1:9/rest/v1").expect("url");
    let client = RecordStoreClient::new(&base).expect("client");

    let queries = client
        .list_owned_queries("token", UserId(Uuid::new_v4()), &[])
        .await
        .expect("empty listing");
    assert!(queries.is_empty());
}

#[tokio::test]
async fn fetch_report_maps_404_to_none() {
    let app = Router::new().route(
        "/rest/v1/reports/:id",
        get(|Path(_id): Path<String>| async { AxumStatus::NOT_FOUND }),
    );
    let base = spawn_store_server(app).await.expect("spawn server");

    let client = RecordStoreClient::new(&base).expect("client");
    let report = client
        .fetch_report("token", ReportId(Uuid::new_v4()))
        .await
        .expect("fetch");
    assert!(report.is_none());
}

#[tokio::test]
async fn fetch_owned_query_scopes_by_user_id() {
    let owner = UserId(Uuid::new_v4());
    let query_id = Uuid::new_v4();
    let expected_owner = owner.to_string();
    let app = Router::new().route(
        "/rest/v1/queries/:id",
        get(
            move |Path(id): Path<String>,
                  AxumQuery(params): AxumQuery<std::collections::HashMap<String, String>>| {
                let expected_owner = expected_owner.clone();
                async move {
                    assert_eq!(id, query_id.to_string());
                    assert_eq!(params.get("user_id"), Some(&expected_owner));
                    Json(json!({
                        "id": query_id,
                        "user_id": expected_owner,
                        "question": "Will tariffs hit shipping?"
                    }))
                }
            },
        ),
    );
    let base = spawn_store_server(app).await.expect("spawn server");

    let client = RecordStoreClient::new(&base).expect("client");
    let query = client
        .fetch_owned_query("token", owner, QueryId(query_id))
        .await
        .expect("fetch")
        .expect("owned");
    assert_eq!(query.question, "Will tariffs hit shipping?");
}

#[tokio::test]
async fn store_errors_carry_the_collaborator_message() {
    let app = Router::new().route(
        "/rest/v1/reports",
        get(|| async {
            (
                AxumStatus::FORBIDDEN,
                Json(shared::error::ApiError::new(
                    shared::error::ErrorCode::Forbidden,
                    "row level security rejected the request",
                )),
            )
        }),
    );
    let base = spawn_store_server(app).await.expect("spawn server");

    let client = RecordStoreClient::new(&base).expect("client");
    let err = client
        .list_completed_reports("token", 8)
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("row level security"));
}
