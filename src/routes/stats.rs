use axum::{
    extract::State,
    response::{IntoResponse, Json as AxumJson, Response},
};
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::db::{self, models::Role};
use crate::AppState;

/// Role-dispatched dashboard figures. Statistics reads are the one place
/// failures are swallowed: a broken read degrades to zero-valued figures
/// instead of failing the whole dashboard.
pub async fn dashboard(State(state): State<AppState>, user: AuthenticatedUser) -> Response {
    match user.role {
        Role::Donor => {
            let stats = db::donor_stats(&state.db, &user.id).await.unwrap_or_else(|e| {
                tracing::warn!("donor stats degraded to defaults: {}", e);
                Default::default()
            });
            let recent = db::recent_donations_for_donor(&state.db, &user.id, 5)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("recent donations degraded to empty: {}", e);
                    Vec::new()
                });
            AxumJson(json!({ "stats": stats, "recentDonations": recent })).into_response()
        }
        Role::Administrator => {
            let stats = db::admin_stats(&state.db).await.unwrap_or_else(|e| {
                tracing::warn!("admin stats degraded to defaults: {}", e);
                Default::default()
            });
            AxumJson(stats).into_response()
        }
        Role::BatchStaff => {
            let stats = db::batch_staff_stats(&state.db, &user.id)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("batch staff stats degraded to defaults: {}", e);
                    Default::default()
                });
            AxumJson(stats).into_response()
        }
    }
}
