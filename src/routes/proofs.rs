use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::{
    self,
    models::{ProofType, Role},
};
use crate::error::ApiError;
use crate::AppState;

const PRESIGN_TTL: Duration = Duration::from_secs(300);

#[derive(Deserialize)]
pub struct UploadRequest {
    pub donation_id: String,
    pub file_type: String, // e.g., "image/jpeg"
}

pub async fn generate_upload_url(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<UploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::BatchStaff)?;

    let ext = match req.file_type.as_str() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "video/mp4" => "mp4",
        _ => return Err(ApiError::invalid_input("Unsupported file type")),
    };

    let donation = db::get_donation(&state.db, &req.donation_id).await?;
    let key = format!("proofs/{}/{}.{}", donation.id, Uuid::new_v4(), ext);

    match state.storage.presign_write(&key, PRESIGN_TTL).await {
        Ok(presigned) => Ok(AxumJson(json!({
            "upload_url": presigned.uri().to_string(),
            "key": key,
            "expires_in": PRESIGN_TTL.as_secs(),
        }))),
        Err(e) => {
            tracing::error!("Storage Presign Error: {}", e);
            Err(ApiError::unavailable("storage presign failed"))
        }
    }
}

#[derive(Deserialize)]
pub struct PresignReadRequest {
    pub key: String,
}

pub async fn generate_read_url(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(req): Json<PresignReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.key.starts_with("proofs/") {
        return Err(ApiError::invalid_input("key must reference a proof object"));
    }

    match state.storage.presign_read(&req.key, PRESIGN_TTL).await {
        Ok(presigned) => Ok(AxumJson(json!({
            "url": presigned.uri().to_string(),
            "expires_in": PRESIGN_TTL.as_secs(),
        }))),
        Err(e) => {
            tracing::error!("Storage Presign Error: {}", e);
            Err(ApiError::unavailable("storage presign failed"))
        }
    }
}

#[derive(Deserialize)]
pub struct ConfirmProofRequest {
    pub donation_id: String,
    pub key: String,
    pub proof_type: ProofType,
    pub quality_score: Option<f64>,
    pub upload_notes: Option<String>,
}

/// Records a proof after its object has been uploaded to storage.
pub async fn confirm_proof(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<ConfirmProofRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::BatchStaff)?;
    if !req.key.starts_with("proofs/") {
        return Err(ApiError::invalid_input("key must reference a proof object"));
    }
    let proof = db::add_proof(
        &state.db,
        &req.donation_id,
        req.proof_type,
        &req.key,
        req.quality_score,
        req.upload_notes,
    )
    .await?;
    Ok((StatusCode::CREATED, AxumJson(proof)))
}

pub async fn select_proof(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::BatchStaff)?;
    let proof = db::select_best_proof(&state.db, &id).await?;
    Ok(AxumJson(proof))
}

pub async fn list_for_donation(
    Path(donation_id): Path<String>,
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let proofs = db::list_proofs(&state.db, &donation_id).await?;
    Ok(AxumJson(json!({ "proofs": proofs })))
}
