use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use workflow_catalog::{populate_sample_data, router, AppState, Database};

fn seeded_app() -> Router {
    let db = Database::open_in_memory().unwrap();
    populate_sample_data(&db).unwrap();
    router(AppState::new(db))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_operation(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/operations")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(seeded_app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_filtered_model_listing() {
    let (status, body) = send(
        seeded_app(),
        get("/models?tag_key=modelType&tag_value=BAM&select=tags,workflow"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let models = body["data"].as_array().unwrap();
    assert_eq!(models.len(), 2);
    for model in models {
        assert_eq!(model["tags"][0]["key"], "modelType");
        assert_eq!(model["workflow"]["name"], "Boring WF");
    }
}

#[tokio::test]
async fn test_partial_filter_lists_everything() {
    let app = seeded_app();
    let (_, created) = send(
        app.clone(),
        post_operation(json!({"operation": {"op": "create_workflow", "input": {"name": "Plain"}}})),
    )
    .await;
    assert_eq!(created["data"]["name"], "Plain");

    let (status, body) = send(app, get("/workflows?tag_value=BAM")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_tags_for_target() {
    let app = seeded_app();

    let (status, body) = send(app.clone(), get("/targets/execution/1/tags")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["value"], "BAM");

    let (_, body) = send(app, get("/targets/dataset/1/tags")).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_missing_record_is_null() {
    let (status, body) = send(seeded_app(), get("/executions/999?select=tags")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_assign_unknown_tag_is_conflict() {
    let (status, body) = send(
        seeded_app(),
        post_operation(json!({"operation": {"op": "assign_tag",
            "input": {"tag_id": 500, "target_type": "workflow", "target_id": 1}}})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], "reference");
}

#[tokio::test]
async fn test_unknown_field_is_bad_request() {
    let (status, body) = send(seeded_app(), get("/workflows/1?select=owners")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid_request");
}

#[tokio::test]
async fn test_malformed_operation_is_bad_request() {
    let app = seeded_app();

    let (status, body) = send(
        app.clone(),
        post_operation(json!({"operation": {"op": "nope"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid_request");

    let (status, body) = send(
        app,
        post_operation(json!({"operation": {"op": "assign_tag", "input": {"tag_id": "x"}}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid_request");
}

#[tokio::test]
async fn test_non_numeric_id_is_bad_request() {
    let app = seeded_app();

    for uri in ["/workflows/abc", "/tags/x", "/targets/model/one/tags"] {
        let (status, body) = send(app.clone(), get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"]["kind"], "invalid_request", "{}", uri);
    }
}
