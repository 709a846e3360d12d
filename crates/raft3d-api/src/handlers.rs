//! REST API handlers.
//!
//! Each handler calls one `Store` or `ClusterMembership` operation and
//! wraps the outcome in the `{success, data, error}` envelope.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use raft3d_cluster::{JoinRequest, MembershipError};
use raft3d_state::{JobStatus, NewFilament, NewPrintJob, Printer};
use raft3d_store::StoreError;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn not_found(kind: &str) -> Response {
    error_response(&format!("{kind} not found"), StatusCode::NOT_FOUND)
}

/// Status code for a facade error.
pub fn store_error_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Validation(_)
        | StoreError::InsufficientFilament { .. }
        | StoreError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
        StoreError::NotLeader { .. } | StoreError::Unavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        StoreError::CommitTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        StoreError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Status code for a membership error.
pub fn membership_error_status(e: &MembershipError) -> StatusCode {
    match e {
        MembershipError::Validation(_) => StatusCode::BAD_REQUEST,
        MembershipError::NotLeader { .. } | MembershipError::Unavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        MembershipError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        MembershipError::NodeMap(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_error(e: StoreError) -> Response {
    let status = store_error_status(&e);
    if status.is_server_error() {
        warn!(error = %e, %status, "request failed");
    }
    error_response(&e.to_string(), status)
}

fn bad_body(rejection: JsonRejection) -> Response {
    error_response(&rejection.body_text(), StatusCode::BAD_REQUEST)
}

// ── Printers ───────────────────────────────────────────────────

/// POST /api/v1/printers
pub async fn create_printer(
    State(state): State<ApiState>,
    body: Result<Json<Printer>, JsonRejection>,
) -> Response {
    let Json(printer) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    match state.store.create_printer(printer).await {
        Ok(printer) => (StatusCode::CREATED, ApiResponse::ok(printer)).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/v1/printers
pub async fn list_printers(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.store.list_printers()).into_response()
}

/// GET /api/v1/printers/{id}
pub async fn get_printer(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_printer(&id) {
        Some(printer) => ApiResponse::ok(printer).into_response(),
        None => not_found("printer"),
    }
}

/// DELETE /api/v1/printers/{id}
pub async fn delete_printer(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.delete_printer(&id).await {
        Ok(()) => ApiResponse::ok("deleted").into_response(),
        Err(e) => store_error(e),
    }
}

// ── Filaments ──────────────────────────────────────────────────

/// POST /api/v1/filaments
pub async fn create_filament(
    State(state): State<ApiState>,
    body: Result<Json<NewFilament>, JsonRejection>,
) -> Response {
    let Json(new) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    match state.store.create_filament(new).await {
        Ok(filament) => (StatusCode::CREATED, ApiResponse::ok(filament)).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/v1/filaments
pub async fn list_filaments(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.store.list_filaments()).into_response()
}

/// GET /api/v1/filaments/{id}
pub async fn get_filament(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_filament(&id) {
        Some(filament) => ApiResponse::ok(filament).into_response(),
        None => not_found("filament"),
    }
}

// ── Print jobs ─────────────────────────────────────────────────

/// POST /api/v1/print_jobs
///
/// Any `status` in the body is ignored; new jobs start `Queued`.
pub async fn create_job(
    State(state): State<ApiState>,
    body: Result<Json<NewPrintJob>, JsonRejection>,
) -> Response {
    let Json(new) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    match state.store.create_job(new).await {
        Ok(job) => (StatusCode::CREATED, ApiResponse::ok(job)).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/v1/print_jobs
pub async fn list_jobs(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.store.list_jobs()).into_response()
}

/// GET /api/v1/print_jobs/{id}
pub async fn get_job(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_job(&id) {
        Some(job) => ApiResponse::ok(job).into_response(),
        None => not_found("print job"),
    }
}

/// Status change request body.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: JobStatus,
}

/// POST /api/v1/print_jobs/{id}/status
pub async fn update_job_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    match state.store.update_job_status(&id, req.status).await {
        Ok(job) => ApiResponse::ok(job).into_response(),
        Err(e) => store_error(e),
    }
}

// ── Cluster ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub leader: Option<String>,
    pub is_leader: bool,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        leader: state.log.current_leader_address(),
        is_leader: state.log.is_leader(),
    })
}

/// POST /join
pub async fn join(
    State(state): State<ApiState>,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    match state.membership.join(req).await {
        Ok(joined) => ApiResponse::ok(joined).into_response(),
        Err(e) => {
            let status = membership_error_status(&e);
            warn!(error = %e, %status, "join failed");
            error_response(&e.to_string(), status)
        }
    }
}
