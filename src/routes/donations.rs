use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::db::{
    self,
    models::{DonationItem, DonationStatus, DonationType, NewDonation, Role},
};
use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateDonationRequest {
    pub receiver_id: String,
    pub donation_type: DonationType,
    pub amount: Option<f64>,
    #[serde(default)]
    pub items: Vec<DonationItem>,
    pub scheduled_delivery: Option<NaiveDate>,
    pub delivery_notes: Option<String>,
}

/// Normalizes a submission: funds donations carry a positive amount and no
/// items; everything else carries a non-empty item list and no amount.
/// Entries with a blank name are dropped before the emptiness check.
fn validate_submission(req: CreateDonationRequest) -> Result<NewDonation, ApiError> {
    let receiver_id = req.receiver_id.trim().to_string();
    if receiver_id.is_empty() {
        return Err(ApiError::invalid_input("receiver_id is required"));
    }

    let (amount, items) = match req.donation_type {
        DonationType::Funds => {
            let amount = req.amount.ok_or_else(|| {
                ApiError::invalid_input("amount is required for funds donations")
            })?;
            if !amount.is_finite() || amount <= 0.0 {
                return Err(ApiError::invalid_input("amount must be a positive number"));
            }
            (Some(amount), Vec::new())
        }
        _ => {
            let items: Vec<DonationItem> = req
                .items
                .into_iter()
                .filter(|item| !item.name.trim().is_empty())
                .collect();
            if items.is_empty() {
                return Err(ApiError::invalid_input(
                    "at least one named item is required for this donation type",
                ));
            }
            if items.iter().any(|item| item.quantity < 1) {
                return Err(ApiError::invalid_input("item quantities must be at least 1"));
            }
            (None, items)
        }
    };

    Ok(NewDonation {
        receiver_id,
        donation_type: req.donation_type,
        amount,
        items,
        scheduled_delivery: req.scheduled_delivery,
        delivery_notes: req.delivery_notes,
    })
}

pub async fn create_donation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateDonationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Donor)?;
    let new = validate_submission(req)?;
    let donation = db::create_donation(&state.db, &user.id, new).await?;
    Ok((StatusCode::CREATED, AxumJson(donation)))
}

pub async fn list_donations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Donor)?;
    let donations = db::list_donations_for_donor(&state.db, &user.id).await?;
    Ok(AxumJson(json!({ "donations": donations })))
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub next_status: DonationStatus,
    pub notes: Option<String>,
}

pub async fn advance_delivery(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<AdvanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::BatchStaff)?;
    let donation =
        db::advance_delivery(&state.db, &user.id, &id, req.next_status, req.notes).await?;
    Ok(AxumJson(donation))
}

pub async fn send_proof(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::BatchStaff)?;
    let donation = db::mark_proof_sent(&state.db, &id).await?;
    Ok(AxumJson(donation))
}
