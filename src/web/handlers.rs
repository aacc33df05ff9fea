// API handlers for the web server

use super::{SharedPipeline, error::ApiError, models::*};
use crate::capability::Capability;
use crate::error::EnhanceError;
use crate::models::{EnhancementRequest, EnhancementResult};
use crate::pipeline::Pipeline;
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use tracing::{debug, info, warn};
use uuid::Uuid;

type Operation = fn(&Pipeline, &EnhancementRequest) -> Result<EnhancementResult, EnhanceError>;

// --- GET / ---
// Reports which capabilities loaded at startup
pub async fn status(State(pipeline): State<SharedPipeline>) -> Json<StatusResponse> {
    let registry = pipeline.registry();
    Json(StatusResponse {
        status: "running".to_string(),
        super_resolution_available: registry.is_available(Capability::SuperResolution),
        face_restoration_available: registry.is_available(Capability::FaceRestoration),
    })
}

// --- GET /health ---
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

// --- POST /enhance ---
pub async fn enhance(
    State(pipeline): State<SharedPipeline>,
    payload: Result<Json<EnhanceRequestBody>, JsonRejection>,
) -> Result<Json<EnhanceResponse>, ApiError> {
    run_operation(pipeline, payload, "enhance", Pipeline::enhance).await
}

// --- POST /upscale ---
pub async fn upscale(
    State(pipeline): State<SharedPipeline>,
    payload: Result<Json<EnhanceRequestBody>, JsonRejection>,
) -> Result<Json<EnhanceResponse>, ApiError> {
    run_operation(pipeline, payload, "upscale", Pipeline::upscale).await
}

// --- POST /enhance-face ---
pub async fn enhance_face(
    State(pipeline): State<SharedPipeline>,
    payload: Result<Json<EnhanceRequestBody>, JsonRejection>,
) -> Result<Json<EnhanceResponse>, ApiError> {
    run_operation(pipeline, payload, "enhance-face", Pipeline::enhance_face).await
}

// --- POST /process ---
pub async fn process(
    State(pipeline): State<SharedPipeline>,
    payload: Result<Json<EnhanceRequestBody>, JsonRejection>,
) -> Result<Json<EnhanceResponse>, ApiError> {
    run_operation(pipeline, payload, "process", Pipeline::process).await
}

// Validates the body, then runs the pipeline operation on the blocking pool.
async fn run_operation(
    pipeline: SharedPipeline,
    payload: Result<Json<EnhanceRequestBody>, JsonRejection>,
    operation_name: &'static str,
    operation: Operation,
) -> Result<Json<EnhanceResponse>, ApiError> {
    let request_id = Uuid::new_v4();

    let Json(body) = payload.map_err(|rejection| {
        warn!("[{}] Rejected {} request: {}", request_id, operation_name, rejection);
        ApiError::BadRequest(rejection.body_text())
    })?;
    let request = EnhancementRequest::try_from(body)?;

    info!(
        "[{}] {} request: scale={}, enhance_face={}, payload={} bytes",
        request_id,
        operation_name,
        request.scale,
        request.enhance_face,
        request.image.len()
    );

    let result = tokio::task::spawn_blocking(move || operation(&pipeline, &request))
        .await
        .map_err(|e| ApiError::InternalServerError(format!("Processing task failed: {}", e)))?
        .map_err(|err| {
            warn!("[{}] {} failed: {}", request_id, operation_name, err);
            ApiError::from(err)
        })?;

    debug!(
        "[{}] {} done: {}x{}",
        request_id, operation_name, result.width, result.height
    );

    Ok(Json(result.into()))
}
