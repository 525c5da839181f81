use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use kurso_catalog::{NewOffering, OfferingUpdate, TierUpdate};
use kurso_core::{Offering, PriceTier, Session, SessionWindow};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(flatten)]
    pub window: SessionWindow,
    pub timezone: String,
}

#[derive(Debug, Deserialize)]
pub struct OfferAgainRequest {
    pub windows: Vec<SessionWindow>,
    pub timezone: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTierRequest {
    pub name: String,
    pub price_cents: i64,
    pub capacity: i32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/offerings", post(create_offering).get(list_offerings))
        .route(
            "/v1/admin/offerings/{id}",
            get(get_offering).put(update_offering).delete(delete_offering),
        )
        .route("/v1/admin/offerings/{id}/duplicate", post(duplicate_offering))
        .route(
            "/v1/admin/offerings/{id}/sessions",
            post(create_session).get(list_sessions),
        )
        .route("/v1/admin/offerings/{id}/offer-again", post(offer_again))
        .route("/v1/admin/sessions/{id}/window", put(update_session_window))
        .route("/v1/admin/sessions/{id}", delete(delete_session))
        .route(
            "/v1/admin/offerings/{id}/tiers",
            post(create_tier).get(list_tiers),
        )
        .route("/v1/admin/tiers/{id}", put(update_tier).delete(delete_tier))
}

// ============================================================================
// Offering handlers
// ============================================================================

/// POST /v1/admin/offerings
async fn create_offering(
    State(state): State<AppState>,
    Json(req): Json<NewOffering>,
) -> Result<Json<Offering>, AppError> {
    let offering = state.offerings.create_offering(req).await?;
    Ok(Json(offering))
}

/// GET /v1/admin/offerings
async fn list_offerings(State(state): State<AppState>) -> Result<Json<Vec<Offering>>, AppError> {
    Ok(Json(state.offerings.list_offerings().await?))
}

/// GET /v1/admin/offerings/{id}
async fn get_offering(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Offering>, AppError> {
    Ok(Json(state.offerings.get_offering(id).await?))
}

/// PUT /v1/admin/offerings/{id}
async fn update_offering(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<OfferingUpdate>,
) -> Result<Json<Offering>, AppError> {
    Ok(Json(state.offerings.update_offering(id, req).await?))
}

/// DELETE /v1/admin/offerings/{id}
async fn delete_offering(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.offerings.delete_offering(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/admin/offerings/{id}/duplicate
async fn duplicate_offering(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Offering>, AppError> {
    Ok(Json(state.offerings.duplicate_offering(id).await?))
}

// ============================================================================
// Session handlers
// ============================================================================

/// POST /v1/admin/offerings/{id}/sessions
async fn create_session(
    State(state): State<AppState>,
    Path(offering_id): Path<Uuid>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state
        .offerings
        .add_session(offering_id, req.window, &req.timezone)
        .await?;
    Ok(Json(session))
}

/// GET /v1/admin/offerings/{id}/sessions
async fn list_sessions(
    State(state): State<AppState>,
    Path(offering_id): Path<Uuid>,
) -> Result<Json<Vec<Session>>, AppError> {
    Ok(Json(state.offerings.list_sessions(offering_id).await?))
}

/// POST /v1/admin/offerings/{id}/offer-again
async fn offer_again(
    State(state): State<AppState>,
    Path(offering_id): Path<Uuid>,
    Json(req): Json<OfferAgainRequest>,
) -> Result<Json<Vec<Session>>, AppError> {
    let sessions = state
        .offerings
        .offer_again(offering_id, req.windows, &req.timezone)
        .await?;
    Ok(Json(sessions))
}

/// PUT /v1/admin/sessions/{id}/window
async fn update_session_window(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(window): Json<SessionWindow>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(
        state
            .offerings
            .update_session_window(session_id, window)
            .await?,
    ))
}

/// DELETE /v1/admin/sessions/{id}
/// Only sessions nothing ever registered for; others go through the
/// cancellation endpoints.
async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.offerings.remove_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Tier handlers
// ============================================================================

/// POST /v1/admin/offerings/{id}/tiers
async fn create_tier(
    State(state): State<AppState>,
    Path(offering_id): Path<Uuid>,
    Json(req): Json<CreateTierRequest>,
) -> Result<Json<PriceTier>, AppError> {
    let tier = state
        .tiers
        .create_tier(offering_id, req.name, req.price_cents, req.capacity)
        .await?;
    Ok(Json(tier))
}

/// GET /v1/admin/offerings/{id}/tiers
async fn list_tiers(
    State(state): State<AppState>,
    Path(offering_id): Path<Uuid>,
) -> Result<Json<Vec<PriceTier>>, AppError> {
    Ok(Json(state.tiers.list_tiers(offering_id).await?))
}

/// PUT /v1/admin/tiers/{id}
async fn update_tier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TierUpdate>,
) -> Result<Json<PriceTier>, AppError> {
    Ok(Json(state.tiers.update_tier(id, req).await?))
}

/// DELETE /v1/admin/tiers/{id}
/// Draft tiers only; published tiers are retired via /v1/tiers/{id}/cancel.
async fn delete_tier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.tiers.remove_tier(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
