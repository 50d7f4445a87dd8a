use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::db::{self, models::Role};
use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateReceiverRequest {
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
    pub address: String,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub family_size: Option<i64>,
    pub needs_description: Option<String>,
}

/// Registers a receiver in `pending` verification state. An administrator
/// decides verification before the receiver becomes selectable for donations.
pub async fn create_receiver(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateReceiverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::BatchStaff)?;

    for (field, value) in [
        ("full_name", &req.full_name),
        ("phone_number", &req.phone_number),
        ("email", &req.email),
        ("address", &req.address),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::invalid_input(format!("{field} is required")));
        }
    }

    let receiver = db::create_receiver(
        &state.db,
        &user.id,
        req.full_name.trim(),
        req.phone_number.trim(),
        req.email.trim(),
        req.address.trim(),
        req.location_lat,
        req.location_lng,
        req.family_size,
        req.needs_description,
    )
    .await?;
    Ok((StatusCode::CREATED, AxumJson(receiver)))
}

pub async fn list_verified(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let receivers = db::list_verified_receivers(&state.db).await?;
    Ok(AxumJson(json!({ "receivers": receivers })))
}
