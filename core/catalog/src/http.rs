use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Json, Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use workflow_catalog_schemas::{
    ExecutionId, InsightId, ListArgs, ListModelsArgs, ModelId, Operation, OperationRequest,
    Selection, TagId, WorkflowId,
};

use crate::database::Database;
use crate::error::OperationError;
use crate::surface;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/operations", post(run_operation))

        // Read-only convenience routes
        .route("/workflows", get(list_workflows))
        .route("/workflows/:id", get(get_workflow))
        .route("/executions", get(list_executions))
        .route("/executions/:id", get(get_execution))
        .route("/models", get(list_models))
        .route("/models/:id", get(get_model))
        .route("/insights", get(list_insights))
        .route("/insights/:id", get(get_insight))
        .route("/tags", get(list_tags))
        .route("/tags/:id", get(get_tag))
        .route("/targets/:kind/:id/tags", get(tags_for))

        .with_state(state)
}

fn status_for(err: &OperationError) -> StatusCode {
    match err.kind() {
        "reference" => StatusCode::CONFLICT,
        "invalid_request" => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &OperationError) -> (StatusCode, Json<Value>) {
    (
        status_for(err),
        Json(json!({ "error": { "kind": err.kind(), "message": err.to_string() } })),
    )
}

/// Extractor failures (bad JSON body, non-numeric id) use the same error body
fn invalid_request(message: String) -> (StatusCode, Json<Value>) {
    error_response(&OperationError::InvalidRequest(message))
}

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, (StatusCode, Json<Value>)> {
    path.map(|Path(id)| id)
        .map_err(|rejection| invalid_request(rejection.body_text()))
}

async fn dispatch(state: &AppState, request: OperationRequest) -> ApiResult {
    let db = state.db.lock().await;

    let data = surface::execute(&db, &request).map_err(|e| error_response(&e))?;

    Ok(Json(json!({ "data": data })))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "service": "workflow-catalog",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn run_operation(
    State(state): State<AppState>,
    body: Result<Json<OperationRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body.map_err(|rejection| invalid_request(rejection.body_text()))?;
    info!("Operation request: {}", request.operation.name());
    dispatch(&state, request).await
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    tag_key: Option<String>,
    tag_value: Option<String>,
    model_version: Option<String>,
    /// Comma separated top-level fields, e.g. `executions,tags`
    select: Option<String>,
}

impl ListQuery {
    fn selection(&self) -> Selection {
        self.select
            .as_deref()
            .map(Selection::from_csv)
            .unwrap_or_default()
    }

    fn list_args(&self) -> ListArgs {
        ListArgs {
            tag_key: self.tag_key.clone(),
            tag_value: self.tag_value.clone(),
        }
    }
}

fn parse_query(query: Option<Query<ListQuery>>) -> ListQuery {
    query.map(|q| q.0).unwrap_or_default()
}

async fn get_by_id(state: &AppState, operation: Operation, params: ListQuery) -> ApiResult {
    let request = OperationRequest {
        operation,
        select: params.selection(),
    };
    dispatch(state, request).await
}

// ========== WORKFLOWS ==========

async fn list_workflows(
    State(state): State<AppState>,
    query: Option<Query<ListQuery>>,
) -> ApiResult {
    let params = parse_query(query);
    let request = OperationRequest {
        operation: Operation::ListWorkflows(params.list_args()),
        select: params.selection(),
    };
    dispatch(&state, request).await
}

async fn get_workflow(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Option<Query<ListQuery>>,
) -> ApiResult {
    let id = path_id(path)?;
    let operation = Operation::GetWorkflow { id: WorkflowId(id) };
    get_by_id(&state, operation, parse_query(query)).await
}

// ========== EXECUTIONS ==========

async fn list_executions(
    State(state): State<AppState>,
    query: Option<Query<ListQuery>>,
) -> ApiResult {
    let params = parse_query(query);
    let request = OperationRequest {
        operation: Operation::ListExecutions(params.list_args()),
        select: params.selection(),
    };
    dispatch(&state, request).await
}

async fn get_execution(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Option<Query<ListQuery>>,
) -> ApiResult {
    let id = path_id(path)?;
    let operation = Operation::GetExecution {
        id: ExecutionId(id),
    };
    get_by_id(&state, operation, parse_query(query)).await
}

// ========== MODELS ==========

async fn list_models(
    State(state): State<AppState>,
    query: Option<Query<ListQuery>>,
) -> ApiResult {
    let params = parse_query(query);
    let request = OperationRequest {
        operation: Operation::ListModels(ListModelsArgs {
            tag_key: params.tag_key.clone(),
            tag_value: params.tag_value.clone(),
            model_version: params.model_version.clone(),
        }),
        select: params.selection(),
    };
    dispatch(&state, request).await
}

async fn get_model(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Option<Query<ListQuery>>,
) -> ApiResult {
    let id = path_id(path)?;
    let operation = Operation::GetModel { id: ModelId(id) };
    get_by_id(&state, operation, parse_query(query)).await
}

// ========== INSIGHTS ==========

async fn list_insights(
    State(state): State<AppState>,
    query: Option<Query<ListQuery>>,
) -> ApiResult {
    let params = parse_query(query);
    let request = OperationRequest {
        operation: Operation::ListInsights(params.list_args()),
        select: params.selection(),
    };
    dispatch(&state, request).await
}

async fn get_insight(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Option<Query<ListQuery>>,
) -> ApiResult {
    let id = path_id(path)?;
    let operation = Operation::GetInsight { id: InsightId(id) };
    get_by_id(&state, operation, parse_query(query)).await
}

// ========== TAGS ==========

async fn list_tags(State(state): State<AppState>) -> ApiResult {
    let request = OperationRequest {
        operation: Operation::ListTags,
        select: Selection::new(),
    };
    dispatch(&state, request).await
}

async fn get_tag(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult {
    let id = path_id(path)?;
    let operation = Operation::GetTag { id: TagId(id) };
    get_by_id(&state, operation, ListQuery::default()).await
}

async fn tags_for(
    State(state): State<AppState>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> ApiResult {
    let Path((kind, id)) = path.map_err(|rejection| invalid_request(rejection.body_text()))?;
    let request = OperationRequest {
        operation: Operation::TagsFor {
            target_type: kind,
            target_id: id,
        },
        select: Selection::new(),
    };
    dispatch(&state, request).await
}
