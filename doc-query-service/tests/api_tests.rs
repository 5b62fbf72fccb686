use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use doc_query_service::service::CORRELATION_HEADER;
use doc_query_service::{AppState, KeywordDecisionEngine, Orchestrator, PipelineTiming, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> (Router, Orchestrator) {
    let orchestrator = Orchestrator::new(
        Arc::new(KeywordDecisionEngine::new()),
        PipelineTiming::default(),
    );
    let router = build_router(AppState {
        orchestrator: orchestrator.clone(),
    });
    (router, orchestrator)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_health_carries_correlation_id() {
    let (router, _) = app();

    let response = send(&router, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(CORRELATION_HEADER));
    assert_eq!(body_json(response).await["status"], "healthy");

    let request = Request::builder()
        .uri("/health")
        .header(CORRELATION_HEADER, "req-42")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()[CORRELATION_HEADER], "req-42");
}

#[tokio::test]
async fn test_empty_workspace_has_nothing_to_show() {
    let (router, _) = app();

    let workspace = body_json(send(&router, "GET", "/workspace", None).await).await;
    assert_eq!(workspace["phase"], "idle");
    assert!(workspace["pipeline"].is_null());
    assert_eq!(workspace["files"], json!([]));

    let pipeline = send(&router, "GET", "/pipeline", None).await;
    assert_eq!(pipeline.status(), StatusCode::NO_CONTENT);

    let result = send(&router, "GET", "/result", None).await;
    assert_eq!(result.status(), StatusCode::NOT_FOUND);

    let retry = send(&router, "POST", "/query/retry", None).await;
    assert_eq!(retry.status(), StatusCode::CONFLICT);

    let samples = body_json(send(&router, "GET", "/query/samples", None).await).await;
    assert_eq!(samples["samples"].as_array().unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_upload_and_remove_files() {
    let (router, _) = app();

    let response = send(
        &router,
        "POST",
        "/files",
        Some(json!({
            "files": [
                { "name": "policy.pdf", "size": 2048, "mime_type": "application/pdf" },
                { "name": "notes.txt", "size": 12 },
                { "name": "scan.png", "size": 99, "mime_type": "image/png" }
            ]
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let acceptance = body_json(response).await;
    assert_eq!(acceptance["accepted"].as_array().unwrap().len(), 2);
    assert_eq!(acceptance["rejected"][0]["name"], "scan.png");

    let workspace = body_json(send(&router, "GET", "/workspace", None).await).await;
    assert_eq!(workspace["files"][0]["name"], "policy.pdf");
    assert_eq!(workspace["files"][0]["status"], "uploading");
    assert_eq!(workspace["files"][0]["size_label"], "2 KB");

    let id = acceptance["accepted"][0]["id"].as_str().unwrap().to_string();
    let removed = send(&router, "DELETE", &format!("/files/{id}"), None).await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);

    let missing = send(&router, "DELETE", &format!("/files/{id}"), None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let empty = send(&router, "POST", "/files", Some(json!({ "files": [] }))).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn test_query_lifecycle_over_http() {
    let (router, orchestrator) = app();

    let blank = send(&router, "POST", "/query", Some(json!({ "text": "  " }))).await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let query = "46-year-old male, knee surgery in Pune, 3-month-old insurance policy";
    let accepted = send(&router, "POST", "/query", Some(json!({ "text": query }))).await;
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(accepted).await["generation"], 1);

    let busy = send(&router, "POST", "/query", Some(json!({ "text": "dental" }))).await;
    assert_eq!(busy.status(), StatusCode::CONFLICT);

    let pipeline = body_json(send(&router, "GET", "/pipeline", None).await).await;
    assert_eq!(pipeline["stages"][0]["status"], "processing");
    assert_eq!(pipeline["progress_percent"], 25);

    orchestrator.settled().await;

    let result = body_json(send(&router, "GET", "/result", None).await).await;
    assert_eq!(result["decision"]["decision"], "approved");
    assert_eq!(result["view"]["decision"]["label"], "Approved");
    assert_eq!(result["view"]["amount"], "$15,000");
    let raw_response = result["decision"]["rawResponse"].clone();

    let raw = send(&router, "GET", "/result/raw", None).await;
    assert!(
        raw.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    let copied: Value = serde_json::from_slice(&body_bytes(raw).await).unwrap();
    assert_eq!(copied, raw_response);

    let export = send(&router, "GET", "/result/export", None).await;
    let disposition = export.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"llm-analysis-"));
    assert!(disposition.ends_with(".json\""));
    let artifact = body_json(export).await;
    assert_eq!(artifact["query"], query);
    assert_eq!(artifact["result"], raw_response);

    let pipeline = body_json(send(&router, "GET", "/pipeline", None).await).await;
    assert_eq!(pipeline["progress_percent"], 100);

    let reset = send(&router, "POST", "/reset", None).await;
    assert_eq!(reset.status(), StatusCode::NO_CONTENT);
    let workspace = body_json(send(&router, "GET", "/workspace", None).await).await;
    assert_eq!(workspace["phase"], "idle");
    assert!(workspace["decision"].is_null());
    assert_eq!(workspace["generation"], 2);
}
