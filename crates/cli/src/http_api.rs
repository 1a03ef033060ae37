use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tagtidy_dataset::{
    BulkOp, BulkScope, DatasetError, DatasetManager, ErrorKind, FilterCriteria, ImageId, StageOp,
};
use tagtidy_protocol::{
    serialize_json, ErrorBody, ErrorEnvelope, HealthResponse, LoadDatasetRequest, OkResponse,
    ServerInfo, SetCompleteRequest,
};
use tokio::sync::Mutex;

pub(crate) struct AppState {
    pub manager: Mutex<DatasetManager>,
    pub info: ServerInfo,
}

pub(crate) type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub(crate) struct BulkRequest {
    pub scope: BulkScope,
    pub op: BulkOp,
}

#[derive(Debug, Serialize)]
struct DiscardResponse {
    #[serde(flatten)]
    status: OkResponse,
    reset_images: usize,
}

#[derive(Debug, Serialize)]
struct UndesiredResponse<'a> {
    tags: &'a [String],
}

pub(crate) fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/dataset/load", post(load_dataset))
        .route("/api/dataset/summary", get(dataset_summary))
        .route("/api/image/:id/tags", get(image_tags))
        .route("/api/image/:id/ops", post(image_ops))
        .route("/api/image/:id/complete", post(image_complete))
        .route("/api/image/:id/hints", get(image_hints))
        .route("/api/image/:id/neighbors", get(image_neighbors))
        .route("/api/ops/bulk", post(bulk_ops))
        .route("/api/changes", get(changes))
        .route("/api/changes/apply", post(apply_changes))
        .route("/api/changes/discard", post(discard_changes))
        .route("/api/hint-options/:category", get(hint_options))
        .route("/api/undesired", get(undesired))
        .with_state(state)
}

pub(crate) async fn health(State(state): State<SharedState>) -> Response {
    let dataset_loaded = state.manager.lock().await.is_loaded();
    json_response(
        StatusCode::OK,
        &HealthResponse {
            ok: true,
            dataset_loaded,
            server: state.info.clone(),
        },
    )
}

pub(crate) async fn load_dataset(State(state): State<SharedState>, body: Bytes) -> Response {
    let request: LoadDatasetRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut manager = state.manager.lock().await;
    respond(manager.load_dataset(&request.rel))
}

pub(crate) async fn dataset_summary(
    State(state): State<SharedState>,
    query: Result<Query<FilterCriteria>, QueryRejection>,
) -> Response {
    let Query(filter) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorEnvelope::new(
                    ErrorKind::ValidationError.as_str(),
                    format!("Invalid filter: {}", rejection.body_text()),
                ),
            )
        }
    };
    respond(state.manager.lock().await.dataset_summary(&filter))
}

pub(crate) async fn image_tags(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    respond(state.manager.lock().await.get_tags(&ImageId::from(id)))
}

pub(crate) async fn image_ops(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let op: StageOp = match parse_body(&body) {
        Ok(op) => op,
        Err(response) => return response,
    };
    let mut manager = state.manager.lock().await;
    respond(manager.stage_op(&ImageId::from(id), &op))
}

pub(crate) async fn image_complete(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let request: SetCompleteRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut manager = state.manager.lock().await;
    respond(manager.set_complete(&ImageId::from(id), request.complete))
}

pub(crate) async fn image_hints(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    respond(state.manager.lock().await.get_hints(&ImageId::from(id)))
}

pub(crate) async fn image_neighbors(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Response {
    respond(state.manager.lock().await.neighbors(&ImageId::from(id)))
}

pub(crate) async fn bulk_ops(State(state): State<SharedState>, body: Bytes) -> Response {
    let request: BulkRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let mut manager = state.manager.lock().await;
    respond(manager.bulk_op(&request.scope, &request.op))
}

pub(crate) async fn changes(State(state): State<SharedState>) -> Response {
    respond(state.manager.lock().await.get_changes())
}

pub(crate) async fn apply_changes(State(state): State<SharedState>) -> Response {
    respond(state.manager.lock().await.apply_changes())
}

pub(crate) async fn discard_changes(State(state): State<SharedState>) -> Response {
    let result = state.manager.lock().await.discard_changes();
    respond(result.map(|reset_images| DiscardResponse {
        status: OkResponse::ok(),
        reset_images,
    }))
}

pub(crate) async fn hint_options(
    State(state): State<SharedState>,
    Path(category): Path<String>,
) -> Response {
    let options = state.manager.lock().await.hint_options(&category);
    json_response(StatusCode::OK, &options)
}

pub(crate) async fn undesired(State(state): State<SharedState>) -> Response {
    let manager = state.manager.lock().await;
    json_response(
        StatusCode::OK,
        &UndesiredResponse {
            tags: manager.undesired().as_slice(),
        },
    )
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|err| {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorEnvelope::new(
                ErrorKind::ValidationError.as_str(),
                format!("Invalid JSON request: {err}"),
            ),
        )
    })
}

fn respond<T: Serialize>(result: tagtidy_dataset::Result<T>) -> Response {
    match result {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(err) => dataset_error_response(&err),
    }
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError | ErrorKind::EmptyDataset | ErrorKind::DatasetTooLarge => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound | ErrorKind::NoDataset => StatusCode::NOT_FOUND,
        ErrorKind::InvalidPath => StatusCode::BAD_REQUEST,
        ErrorKind::IoError | ErrorKind::TaxonomyError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn hint_for(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Conflict => Some("Fetch the image tags again and retry the edit."),
        ErrorKind::NoDataset => Some("Load a dataset first with POST /api/dataset/load."),
        ErrorKind::DatasetTooLarge => Some("Split the folder into subfolders and load one at a time."),
        ErrorKind::InvalidPath => Some("Paths are relative to the dataset root and may not leave it."),
        _ => None,
    }
}

pub(crate) fn dataset_error_response(err: &DatasetError) -> Response {
    let kind = err.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        log::error!("{err}");
    } else {
        log::debug!("Request failed ({}): {err}", kind.as_str());
    }
    let mut envelope = ErrorEnvelope::new(kind.as_str(), err.to_string());
    if let Some(hint) = hint_for(kind) {
        envelope = envelope.with_hint(hint);
    }
    error_response(status, envelope)
}

fn error_response(status: StatusCode, envelope: ErrorEnvelope) -> Response {
    json_response(status, &ErrorBody::from(envelope))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serialize_json(value) {
        Ok(body) => (status, [(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(err) => {
            log::error!("Failed to serialize response: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
