use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use kurso_cancellation::{SeriesCancellation, SessionCancellation, TierCancellation};
use kurso_core::CancellationRecord;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CancelRegistrationRequest {
    pub session_id: Option<Uuid>,
    pub series_key: Option<i64>,
    pub user_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/registrations/cancel", post(cancel_registration))
        .route("/v1/sessions/{id}/cancel", post(cancel_session))
        .route("/v1/series/{key}/cancel", post(cancel_series))
        .route("/v1/tiers/{id}/cancel", post(cancel_tier))
        .route("/v1/cancellations/unresolved", get(list_unresolved))
        .route("/v1/cancellations/{id}/resolve", post(resolve))
}

/// POST /v1/registrations/cancel
/// User-initiated cancellation, single session or whole series.
async fn cancel_registration(
    State(state): State<AppState>,
    Json(req): Json<CancelRegistrationRequest>,
) -> Result<StatusCode, AppError> {
    match (req.session_id, req.series_key) {
        (Some(session_id), None) => {
            state
                .cancellation
                .cancel_registration(session_id, req.user_id)
                .await?;
        }
        (None, Some(series_key)) => {
            state
                .cancellation
                .cancel_series_registration(series_key, req.user_id)
                .await?;
        }
        _ => {
            return Err(AppError::ValidationError(
                "exactly one of session_id or series_key is required".to_string(),
            ))
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/sessions/{id}/cancel
async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionCancellation>, AppError> {
    let result = state.cancellation.cancel_session(session_id, true).await?;
    Ok(Json(result))
}

/// POST /v1/series/{key}/cancel
async fn cancel_series(
    State(state): State<AppState>,
    Path(series_key): Path<i64>,
) -> Result<Json<SeriesCancellation>, AppError> {
    let result = state.cancellation.cancel_series(series_key).await?;
    Ok(Json(result))
}

/// POST /v1/tiers/{id}/cancel
async fn cancel_tier(
    State(state): State<AppState>,
    Path(tier_id): Path<Uuid>,
) -> Result<Json<TierCancellation>, AppError> {
    let result = state.cancellation.cancel_price_tier(tier_id).await?;
    Ok(Json(result))
}

/// GET /v1/cancellations/unresolved
/// The refund worklist: audit records nobody has settled yet.
async fn list_unresolved(
    State(state): State<AppState>,
) -> Result<Json<Vec<CancellationRecord>>, AppError> {
    let records = state
        .cancellation_log
        .list_unresolved()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(Json(records))
}

/// POST /v1/cancellations/{id}/resolve
async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .cancellation_log
        .mark_resolved(id)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}
