use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json as AxumJson},
};
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::db::{
    self,
    models::{Role, VerificationStatus},
};
use crate::error::ApiError;
use crate::AppState;

pub async fn list_donations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Administrator)?;
    let donations = db::list_donations_with_donor(&state.db).await?;
    Ok(AxumJson(json!({ "donations": donations })))
}

pub async fn approve_donation(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Administrator)?;
    let donation = db::approve_donation(&state.db, &id).await?;
    Ok(AxumJson(donation))
}

pub async fn reject_donation(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Administrator)?;
    let donation = db::reject_donation(&state.db, &id).await?;
    Ok(AxumJson(donation))
}

pub async fn verify_receiver(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Administrator)?;
    let receiver =
        db::set_receiver_verification(&state.db, &id, VerificationStatus::Verified).await?;
    Ok(AxumJson(receiver))
}

pub async fn reject_receiver(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Administrator)?;
    let receiver =
        db::set_receiver_verification(&state.db, &id, VerificationStatus::Rejected).await?;
    Ok(AxumJson(receiver))
}
