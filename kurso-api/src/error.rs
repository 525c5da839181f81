use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use kurso_cancellation::CancellationError;
use kurso_catalog::{CapacityError, CatalogError, TierError};
use kurso_core::capacity::{CapacityCounts, CapacityReason};
use kurso_registration::RegistrationError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    CapacityExhausted {
        reason: CapacityReason,
        counts: CapacityCounts,
    },
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::CapacityExhausted { reason, counts } => (
                StatusCode::CONFLICT,
                json!({ "error": reason.as_str(), "counts": counts }),
            ),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::OfferingNotFound(_)
            | RegistrationError::SessionNotFound(_)
            | RegistrationError::SeriesNotFound(_)
            | RegistrationError::TierNotFound(_) => AppError::NotFoundError(err.to_string()),
            RegistrationError::TierUnavailable(_) | RegistrationError::SessionUnavailable(_) => {
                AppError::ConflictError(err.to_string())
            }
            RegistrationError::CapacityExhausted { reason, counts } => {
                AppError::CapacityExhausted { reason, counts }
            }
            RegistrationError::Store(err) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<CancellationError> for AppError {
    fn from(err: CancellationError) -> Self {
        match err {
            CancellationError::OfferingNotFound(_)
            | CancellationError::SessionNotFound(_)
            | CancellationError::SeriesNotFound(_)
            | CancellationError::TierNotFound(_) => AppError::NotFoundError(err.to_string()),
            CancellationError::NothingToCancel => AppError::ConflictError(err.to_string()),
            CancellationError::Store(err) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::OfferingNotFound(_) | CatalogError::SessionNotFound(_) => {
                AppError::NotFoundError(err.to_string())
            }
            CatalogError::SessionHasRegistrations(_) => AppError::ConflictError(err.to_string()),
            CatalogError::Store(err) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<TierError> for AppError {
    fn from(err: TierError) -> Self {
        match err {
            TierError::OfferingNotFound(_) | TierError::TierNotFound(_) => {
                AppError::NotFoundError(err.to_string())
            }
            TierError::TierPublished(_) => AppError::ConflictError(err.to_string()),
            TierError::Store(err) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<CapacityError> for AppError {
    fn from(err: CapacityError) -> Self {
        match err {
            CapacityError::OfferingNotFound(_)
            | CapacityError::SessionNotFound(_)
            | CapacityError::SeriesNotFound(_)
            | CapacityError::TierNotFound(_) => AppError::NotFoundError(err.to_string()),
            CapacityError::Store(err) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Anyhow(err)
    }
}
