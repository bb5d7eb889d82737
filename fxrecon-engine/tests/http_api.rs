//! HTTP surface tests: upload validation, task callback origin
//! verification, stream auth and health.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use common::*;
use fxrecon_engine::config::EngineConfig;
use fxrecon_engine::tasks::{QueueName, TaskPayload, QUEUE_NAME_HEADER};
use fxrecon_engine::{build_router, AppState};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

async fn app(llm_response: &str, stream_token: Option<&str>) -> axum::Router {
    let h = harness(llm_response).await;
    let config = Arc::new(EngineConfig {
        stream_token: stream_token.map(|s| s.to_string()),
        ..Default::default()
    });
    let state = AppState::new(h.db, h.event_bus, config, h.pipeline, None);
    build_router(state)
}

fn multipart_body(filename: &str, content: &[u8]) -> (String, Vec<u8>) {
    let boundary = "fxrecon-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (
        format!("multipart/form-data; boundary={boundary}"),
        body,
    )
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_for_unknown_tenant_is_404() {
    let app = app("", None).await;
    let (content_type, body) = multipart_body("conf.pdf", b"%PDF-1.4");
    let response = app
        .oneshot(
            Request::post("/clients/nobody/emails/upload")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_with_unsupported_suffix_is_400() {
    let app = app("", None).await;
    let (content_type, body) = multipart_body("blotter.xlsx", b"PK");
    let response = app
        .oneshot(
            Request::post(format!("/clients/{TENANT_ID}/emails/upload"))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn corrupt_pdf_reports_failure_without_an_error_status() {
    let app = app("", None).await;
    let (content_type, body) = multipart_body("conf.pdf", b"not really a pdf");
    let response = app
        .oneshot(
            Request::post(format!("/clients/{TENANT_ID}/emails/upload"))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("conf.pdf"));
}

#[tokio::test]
async fn upload_missing_file_part_is_400() {
    let app = app("", None).await;
    let boundary = "fxrecon-test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--{boundary}--\r\n"
    );
    let response = app
        .oneshot(
            Request::post(format!("/clients/{TENANT_ID}/emails/upload"))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

fn task_request(queue_path: &str, header_value: Option<&str>, task_type: &str) -> Request<Body> {
    let payload = TaskPayload {
        task_type: task_type.to_string(),
        task_id: "t-1".to_string(),
        data: serde_json::json!({"to": "fx@bancoabc.cl", "subject": "s", "body": "b"}),
        created_at: Utc::now(),
        queue_used: QueueName::Email,
    };
    let mut builder = Request::post(format!("/internal/tasks/{queue_path}"))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = header_value {
        builder = builder.header(QUEUE_NAME_HEADER, value);
    }
    builder
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn task_callback_requires_matching_queue_header() {
    let app = app("", None).await;

    let forbidden = app
        .clone()
        .oneshot(task_request("email", Some("general"), "send_confirmation_email"))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let missing = app
        .clone()
        .oneshot(task_request("email", None, "send_confirmation_email"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);

    let accepted = app
        .oneshot(task_request("email", Some("email"), "send_confirmation_email"))
        .await
        .unwrap();
    // No mailer configured: the task is accepted and dropped.
    assert_eq!(accepted.status(), StatusCode::OK);
    let json = json_body(accepted).await;
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn unknown_queue_and_task_type_are_rejected() {
    let app = app("", None).await;

    let unknown_queue = app
        .clone()
        .oneshot(task_request("urgent", Some("urgent"), "send_confirmation_email"))
        .await
        .unwrap();
    assert_eq!(unknown_queue.status(), StatusCode::NOT_FOUND);

    let unknown_type = app
        .oneshot(task_request("general", Some("general"), "reindex_universe"))
        .await
        .unwrap();
    assert_eq!(unknown_type.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stream_token_is_enforced_when_configured() {
    let app = app("", Some("sekrit")).await;

    let denied = app
        .clone()
        .oneshot(
            Request::get("/events/stream?token=wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let allowed = app
        .oneshot(
            Request::get("/events/stream?token=sekrit&event_types=trade_matched")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(
        allowed
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn health_reports_module_identity() {
    let app = app("", None).await;
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "fxrecon-engine");
}
