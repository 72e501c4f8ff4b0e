//! Domain error taxonomy.
//!
//! Every operation surfaces one of these kinds to its caller; the HTTP layer
//! maps each kind to a status code. Infrastructure failures (`Database`,
//! `Gateway`) are kept distinct from the domain kinds and are never retried
//! here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("not allowed: {0}")]
    Authorization(&'static str),
    #[error("time slot conflicts with an existing booking")]
    Conflict,
    #[error("booking has already been reviewed")]
    Duplicate,
    #[error("action not valid while booking is {0}")]
    InvalidState(&'static str),
    #[error("event signature could not be verified")]
    Authenticity,
    #[error("checkout session could not be created: {0}")]
    PaymentSetup(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) | Error::Authenticity => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Authorization(_) => StatusCode::FORBIDDEN,
            Error::Conflict | Error::Duplicate | Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::PaymentSetup(_) => StatusCode::BAD_GATEWAY,
            Error::Database(_) | Error::Gateway(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
