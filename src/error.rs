//! Error taxonomy shared across cart, shipping and checkout.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    /// The requested quantity would exceed available stock.
    #[error("insufficient stock, {remaining} left")]
    StockExceeded { remaining: i32 },

    /// Missing row, or a row the caller does not own. Ownership misses are
    /// reported identically so nothing about other users' carts leaks.
    #[error("not found")]
    NotFound,

    #[error("cart is empty")]
    EmptyCart,

    #[error("customer profile is incomplete")]
    ProfileIncomplete,

    /// Provider-reported error or transport failure from the rate API,
    /// already normalized; the message is the provider's description when
    /// one was available.
    #[error("shipping service unavailable: {0}")]
    ShippingUnavailable(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StockExceeded { .. } => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::EmptyCart | Self::ProfileIncomplete => StatusCode::CONFLICT,
            Self::ShippingUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Storage errors keep their detail in the logs only.
            Self::Database(e) => {
                tracing::error!(error = %e, "database failure");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = match &self {
            Self::StockExceeded { remaining } => serde_json::json!({
                "error": message,
                "remaining_stock": remaining,
            }),
            _ => serde_json::json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}
