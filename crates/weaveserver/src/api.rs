use crate::error::ApiError;
use actix_web::dev::Payload;
use actix_web::{delete, get, post, put, web, FromRequest, HttpRequest, HttpResponse};
use actix_ws::Message;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;
use weavecore::{
    Edge, EngineError, GraphNode, RunId, RunRecorder, Viewport, Workflow, WorkflowRun,
};
use weaveruntime::{
    validate_connection_names, ExecuteRequest, WeaveRuntime, WorkflowPatch,
};

/// Header carrying the authenticated user id, set by the auth proxy in front of us.
pub const OWNER_HEADER: &str = "x-user-id";

/// Application state shared across handlers
pub struct AppState {
    pub runtime: Arc<WeaveRuntime>,
}

/// Caller identity. Requests without one are rejected with 401.
pub struct Owner(pub String);

impl FromRequest for Owner {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let owner = req
            .headers()
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(v.to_string()))
            .ok_or(ApiError(EngineError::Unauthorized));
        ready(owner)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewWorkflow {
    name: String,
    #[serde(default)]
    nodes: Vec<GraphNode>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    viewport: Option<Viewport>,
}

/// A workflow with its most recent runs
#[derive(Debug, Serialize)]
struct WorkflowDetail {
    #[serde(flatten)]
    workflow: Workflow,
    runs: Vec<WorkflowRun>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    run_id: RunId,
    run: WorkflowRun,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionCheck {
    source_type: String,
    target_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsQuery {
    run_id: Option<RunId>,
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "weave"
    }))
}

#[get("/api/workflows")]
async fn list_workflows(data: web::Data<AppState>, owner: Owner) -> Result<HttpResponse, ApiError> {
    let workflows = data.runtime.store().list_workflows(&owner.0).await;
    Ok(HttpResponse::Ok().json(workflows))
}

#[post("/api/workflows")]
async fn create_workflow(
    data: web::Data<AppState>,
    owner: Owner,
    body: web::Json<NewWorkflow>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if body.name.trim().is_empty() {
        return Err(EngineError::Validation("name is required".to_string()).into());
    }

    let mut workflow = Workflow::new(body.name);
    workflow.nodes = body.nodes;
    workflow.edges = body.edges;
    workflow.viewport = body.viewport;

    let workflow = data.runtime.store().create_workflow(&owner.0, workflow).await;
    info!(workflow_id = %workflow.id, name = %workflow.name, "created workflow");
    Ok(HttpResponse::Created().json(workflow))
}

#[get("/api/workflows/{id}")]
async fn get_workflow(
    data: web::Data<AppState>,
    owner: Owner,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let (workflow, runs) = data
        .runtime
        .store()
        .get_workflow_with_runs(&owner.0, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(WorkflowDetail { workflow, runs }))
}

#[put("/api/workflows/{id}")]
async fn update_workflow(
    data: web::Data<AppState>,
    owner: Owner,
    path: web::Path<Uuid>,
    patch: web::Json<WorkflowPatch>,
) -> Result<HttpResponse, ApiError> {
    let workflow = data
        .runtime
        .store()
        .update_workflow(&owner.0, path.into_inner(), patch.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(workflow))
}

#[delete("/api/workflows/{id}")]
async fn delete_workflow(
    data: web::Data<AppState>,
    owner: Owner,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let workflow_id = path.into_inner();
    data.runtime.store().delete_workflow(&owner.0, workflow_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// Adds one edge to a stored workflow after the type and cycle checks.
#[post("/api/workflows/{id}/edges")]
async fn add_edge(
    data: web::Data<AppState>,
    owner: Owner,
    path: web::Path<Uuid>,
    edge: web::Json<Edge>,
) -> Result<HttpResponse, ApiError> {
    let workflow = data
        .runtime
        .store()
        .connect_edge(&owner.0, path.into_inner(), data.runtime.catalog(), edge.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(workflow))
}

#[get("/api/workflows/{id}/runs")]
async fn list_runs(
    data: web::Data<AppState>,
    owner: Owner,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let store = data.runtime.store();
    let workflow = store.get_workflow(&owner.0, path.into_inner()).await?;
    let runs = store.list_runs(workflow.id).await.map_err(EngineError::from)?;
    Ok(HttpResponse::Ok().json(runs))
}

#[get("/api/runs/{id}")]
async fn get_run(
    data: web::Data<AppState>,
    owner: Owner,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let run = data.runtime.store().get_owned_run(&owner.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(run))
}

/// Starts a run and answers as soon as it is recorded; progress arrives over
/// `/api/events` or by polling the run.
#[post("/api/execute")]
async fn execute(
    data: web::Data<AppState>,
    owner: Owner,
    request: web::Json<ExecuteRequest>,
) -> Result<HttpResponse, ApiError> {
    let handle = data.runtime.submit(&owner.0, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ExecuteResponse {
        run_id: handle.run_id,
        run: handle.run,
    }))
}

#[post("/api/connections/validate")]
async fn validate_connection(check: web::Json<ConnectionCheck>) -> HttpResponse {
    HttpResponse::Ok().json(validate_connection_names(&check.source_type, &check.target_type))
}

/// List available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.runtime.catalog().descriptors())
}

/// WebSocket endpoint for real-time events, optionally narrowed to one run
#[get("/api/events")]
async fn websocket_events(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<EventsQuery>,
    data: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;
    let run_filter = query.into_inner().run_id;
    let mut events = data.runtime.subscribe_events();
    info!(run_id = ?run_filter, "websocket client connected");

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if run_filter.is_some_and(|id| id != event.run_id()) {
                                continue;
                            }
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "websocket client lagging, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("websocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// Registers every route; malformed JSON bodies become 400s with the usual error shape.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError(EngineError::Validation(err.to_string())).into()
    }))
    .service(health_check)
    .service(list_workflows)
    .service(create_workflow)
    .service(get_workflow)
    .service(update_workflow)
    .service(delete_workflow)
    .service(add_edge)
    .service(list_runs)
    .service(get_run)
    .service(execute)
    .service(validate_connection)
    .service(list_node_types)
    .service(websocket_events);
}
