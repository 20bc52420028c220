//! End-to-end tests of the REST surface against the in-memory backend.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cosign_daemon::{create_router, AppState, RouterOptions};
use cosign_engine::{
    EmailDelivery, FailingMailer, ManualClock, RecordingMailer, SigningConfig, SigningService,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(mailer: Arc<dyn EmailDelivery>) -> Router {
    let service = SigningService::in_memory(
        mailer,
        Arc::new(ManualClock::starting_now()),
        SigningConfig::default().with_origin("https://sign.example.com"),
    )
    .unwrap();
    create_router(AppState::new(service), RouterOptions::default())
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, number: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/api/v1/contracts",
        Some(json!({ "contract_number": number, "primary": "awaiting" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn add(app: &Router, contract_id: &str, body: Value) -> String {
    let (status, body) = call(
        app,
        "POST",
        &format!("/api/v1/contracts/{}/participants", contract_id),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

fn token_of(signing_url: &str) -> String {
    signing_url.rsplit('/').next().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = app_with(Arc::new(RecordingMailer::new()));
    let (status, body) = call(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_invite_open_sign_executes_contract() {
    let mailer = Arc::new(RecordingMailer::new());
    let app = app_with(mailer.clone());
    let contract_id = register(&app, "CTR-100").await;
    let participant_id = add(
        &app,
        &contract_id,
        json!({ "name": "Grace Hopper", "email": "grace@example.com", "role": "Witness" }),
    )
    .await;

    let (status, invite) = call(
        &app,
        "POST",
        &format!("/api/v1/participants/{}/invite", participant_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", invite);
    assert_eq!(invite["participant"]["status"], "sent");

    let sent = mailer.last_message().unwrap();
    assert_eq!(sent.signing_url, invite["signing_url"].as_str().unwrap());
    assert!(sent
        .signing_url
        .starts_with("https://sign.example.com/sign-contract/"));
    let token = token_of(&sent.signing_url);

    let (status, page) = call(&app, "GET", &format!("/sign-contract/{}", token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["status"], "sent");

    let (status, page) = call(
        &app,
        "POST",
        &format!("/sign-contract/{}/open", token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["status"], "viewed");
    assert_eq!(page["contract_number"], "CTR-100");
    assert_eq!(page["role"], "Witness");
    assert!(page.get("notes").is_none());

    let submission = json!({ "signed_by": "Grace Hopper", "signature_data": "data:image/png;base64,AAAA" });
    let (status, receipt) = call(
        &app,
        "POST",
        &format!("/sign-contract/{}/sign", token),
        Some(submission.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "signed");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/sign-contract/{}/sign", token),
        Some(submission),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TOKEN_ALREADY_CONSUMED");

    let (_, report) = call(
        &app,
        "GET",
        &format!("/api/v1/contracts/{}/report", contract_id),
        None,
    )
    .await;
    assert_eq!(report["status"], "awaiting_signatures");

    let (status, report) = call(
        &app,
        "POST",
        &format!("/api/v1/contracts/{}/primary/sign", contract_id),
        Some(json!({ "actor": "contracts-service" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "executed");

    let (status, events) = call(
        &app,
        "GET",
        &format!("/api/v1/contracts/{}/events?limit=100", contract_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(events
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["kind"] == "signed" && e["actor"] == "Grace Hopper"));
}

#[tokio::test]
async fn test_participant_views_never_expose_the_token() {
    let app = app_with(Arc::new(RecordingMailer::new()));
    let contract_id = register(&app, "CTR-101").await;
    let participant_id = add(
        &app,
        &contract_id,
        json!({ "name": "Ada", "email": "ada@example.com" }),
    )
    .await;
    call(
        &app,
        "POST",
        &format!("/api/v1/participants/{}/invite", participant_id),
        None,
    )
    .await;

    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/v1/participants/{}", participant_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("credential").is_none());
    assert!(body["token_expires_at"].is_string());
    assert_eq!(body["role"], "Additional Signer");

    let (status, link) = call(
        &app,
        "GET",
        &format!("/api/v1/participants/{}/link", participant_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(link["signing_url"]
        .as_str()
        .unwrap()
        .contains("/sign-contract/"));
}

#[tokio::test]
async fn test_error_mapping() {
    let app = app_with(Arc::new(RecordingMailer::new()));

    let (status, body) = call(&app, "GET", "/api/v1/contracts/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, body) = call(
        &app,
        "GET",
        "/api/v1/contracts/00000000-0000-4000-8000-000000000000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = call(&app, "GET", "/sign-contract/deadbeef", None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "TOKEN_EXPIRED");

    let contract_id = register(&app, "CTR-102").await;
    let participant_id = add(&app, &contract_id, json!({ "name": "No Email" })).await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/v1/participants/{}/invite", participant_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_CHANNEL");

    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/v1/participants/{}/link", participant_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NO_ACTIVE_TOKEN");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/v1/contracts/{}/participants", contract_id),
        Some(json!({ "name": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_delivery_failure_returns_bad_gateway() {
    let app = app_with(Arc::new(FailingMailer::default()));
    let contract_id = register(&app, "CTR-103").await;
    let participant_id = add(
        &app,
        &contract_id,
        json!({ "name": "Linus", "email": "linus@example.com" }),
    )
    .await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/v1/participants/{}/invite", participant_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "DELIVERY_FAILED");

    let (_, participant) = call(
        &app,
        "GET",
        &format!("/api/v1/participants/{}", participant_id),
        None,
    )
    .await;
    assert_eq!(participant["status"], "send_failed");

    // The admin can still share the link by hand.
    let (status, _) = call(
        &app,
        "GET",
        &format!("/api/v1/participants/{}/link", participant_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_decline_then_waive_unblocks_execution() {
    let mailer = Arc::new(RecordingMailer::new());
    let app = app_with(mailer.clone());
    let contract_id = register(&app, "CTR-104").await;
    let participant_id = add(
        &app,
        &contract_id,
        json!({ "name": "Barbara", "email": "barbara@example.com" }),
    )
    .await;
    call(
        &app,
        "POST",
        &format!("/api/v1/contracts/{}/primary/sign", contract_id),
        None,
    )
    .await;
    call(
        &app,
        "POST",
        &format!("/api/v1/participants/{}/invite", participant_id),
        None,
    )
    .await;
    let token = token_of(&mailer.last_message().unwrap().signing_url);

    call(&app, "POST", &format!("/sign-contract/{}/open", token), None).await;
    let (status, receipt) = call(
        &app,
        "POST",
        &format!("/sign-contract/{}/decline", token),
        Some(json!({ "reason": "Not my deal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "declined");

    let (_, report) = call(
        &app,
        "GET",
        &format!("/api/v1/contracts/{}/report", contract_id),
        None,
    )
    .await;
    assert_eq!(report["status"], "awaiting_signatures");

    let (status, participant) = call(
        &app,
        "POST",
        &format!("/api/v1/participants/{}/waive", participant_id),
        Some(json!({ "waived_by": "legal", "reason": "Replaced by notary" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(participant["blocks_execution"], false);

    let (_, contract) = call(
        &app,
        "GET",
        &format!("/api/v1/contracts/{}", contract_id),
        None,
    )
    .await;
    assert_eq!(contract["execution_status"], "executed");
}

#[tokio::test]
async fn test_signed_participant_cannot_be_removed() {
    let mailer = Arc::new(RecordingMailer::new());
    let app = app_with(mailer.clone());
    let contract_id = register(&app, "CTR-105").await;
    let signer = add(
        &app,
        &contract_id,
        json!({ "name": "Margaret", "email": "margaret@example.com" }),
    )
    .await;
    let other = add(&app, &contract_id, json!({ "name": "Pending Pat" })).await;

    call(
        &app,
        "POST",
        &format!("/api/v1/participants/{}/invite", signer),
        None,
    )
    .await;
    let token = token_of(&mailer.last_message().unwrap().signing_url);
    call(&app, "POST", &format!("/sign-contract/{}/open", token), None).await;
    call(
        &app,
        "POST",
        &format!("/sign-contract/{}/sign", token),
        Some(json!({ "signed_by": "Margaret", "signature_data": "sig" })),
    )
    .await;

    let (status, body) = call(
        &app,
        "DELETE",
        &format!("/api/v1/participants/{}", signer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/api/v1/participants/{}", other),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, participants) = call(
        &app,
        "GET",
        &format!("/api/v1/contracts/{}/participants", contract_id),
        None,
    )
    .await;
    assert_eq!(participants.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_fetching_signing_link_leaves_participant_unviewed() {
    let mailer = Arc::new(RecordingMailer::new());
    let app = app_with(mailer.clone());
    let contract_id = register(&app, "CTR-106").await;
    let participant_id = add(
        &app,
        &contract_id,
        json!({ "name": "Linus", "email": "linus@example.com" }),
    )
    .await;
    call(
        &app,
        "POST",
        &format!("/api/v1/participants/{}/invite", participant_id),
        None,
    )
    .await;
    let token = token_of(&mailer.last_message().unwrap().signing_url);

    for _ in 0..3 {
        let (status, page) = call(&app, "GET", &format!("/sign-contract/{}", token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["status"], "sent");
    }

    let (_, participant) = call(
        &app,
        "GET",
        &format!("/api/v1/participants/{}", participant_id),
        None,
    )
    .await;
    assert_eq!(participant["status"], "sent");
    assert!(participant["viewed_at"].is_null());

    let (status, receipt) = call(
        &app,
        "POST",
        &format!("/sign-contract/{}/sign", token),
        Some(json!({ "signed_by": "Linus", "signature_data": "sig" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", receipt);
    assert_eq!(receipt["code"], "INVALID_STATE");
}
