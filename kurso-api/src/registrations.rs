use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kurso_registration::SessionOutcome;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub session_id: Option<Uuid>,
    pub series_key: Option<i64>,
    pub user_id: Uuid,
    pub tier_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: String,
    pub outcomes: Vec<SessionOutcome>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/registrations", post(register))
}

/// POST /v1/registrations
/// Registers a user for one session or, via a series key, for every session
/// of a multi-day series.
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let outcomes = match (req.session_id, req.series_key) {
        (Some(session_id), None) => {
            let outcome = state
                .registration
                .register_for_session(session_id, req.user_id, req.tier_id)
                .await?;
            vec![outcome]
        }
        (None, Some(series_key)) => {
            state
                .registration
                .register_for_series(series_key, req.user_id, req.tier_id)
                .await?
                .outcomes
        }
        _ => {
            return Err(AppError::ValidationError(
                "exactly one of session_id or series_key is required".to_string(),
            ))
        }
    };

    Ok(Json(RegisterResponse {
        status: "ok".to_string(),
        outcomes,
    }))
}
