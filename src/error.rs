use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::shipping::ShipDateError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    MalformedPayload(&'static str),

    #[error("Product not found in catalog: {0}")]
    UnknownProduct(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Promo code not valid or expired")]
    PromoNotFound,

    #[error("No shipping week with free capacity")]
    CapacityExhausted,

    #[error("Shipping date resolution failed: {0}")]
    ShipDate(#[from] ShipDateError),

    #[error("Database error: {0}")]
    Database(#[from] redis::RedisError),

    #[error("Payment provider error: {0}")]
    Stripe(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload(_)
            | AppError::UnknownProduct(_)
            | AppError::InvalidSignature => StatusCode::BAD_REQUEST,
            AppError::PromoNotFound => StatusCode::NOT_FOUND,
            AppError::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ShipDate(_)
            | AppError::Database(_)
            | AppError::Stripe(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Upstream and database details stay in the server logs.
        if status.is_server_error() {
            error!("{self}");
            return (status, Json(json!({ "error": "Internal server error" }))).into_response();
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
