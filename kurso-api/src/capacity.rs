use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use kurso_catalog::CapacityTarget;
use kurso_core::capacity::{CapacityDecision, TierPeak};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CapacityQuery {
    pub session_id: Option<Uuid>,
    pub series_key: Option<i64>,
    pub tier_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/capacity", get(get_capacity))
        .route("/v1/offerings/{id}/tier-peaks", get(tier_peaks))
}

/// GET /v1/capacity?session_id=…|series_key=…&tier_id=…
async fn get_capacity(
    State(state): State<AppState>,
    Query(query): Query<CapacityQuery>,
) -> Result<Json<CapacityDecision>, AppError> {
    let target = match (query.session_id, query.series_key) {
        (Some(session_id), None) => CapacityTarget::Session(session_id),
        (None, Some(series_key)) => CapacityTarget::Series(series_key),
        _ => {
            return Err(AppError::ValidationError(
                "exactly one of session_id or series_key is required".to_string(),
            ))
        }
    };

    let decision = state.capacity.evaluate(target, query.tier_id).await?;
    Ok(Json(decision))
}

/// GET /v1/offerings/{id}/tier-peaks
/// Per-tier maximum concurrent registrations across the offering's sessions.
async fn tier_peaks(
    State(state): State<AppState>,
    Path(offering_id): Path<Uuid>,
) -> Result<Json<Vec<TierPeak>>, AppError> {
    let peaks = state.capacity.tier_peaks(offering_id).await?;
    Ok(Json(peaks))
}
