//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure is rendered as `{"error": <code>, "reason": <message>}`.
//! An `already_marked` response also carries the existing record.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use rollcall_core::Error as DomainError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Engine(#[from] rollcall_engine::Error),

  #[error("bad request: {0}")]
  BadRequest(String),
}

impl From<DomainError> for ApiError {
  fn from(e: DomainError) -> Self { Self::Engine(e.into()) }
}

impl ApiError {
  pub fn code(&self) -> &'static str {
    match self {
      Self::Engine(e) => e.code(),
      Self::BadRequest(_) => "bad_request",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::Engine(rollcall_engine::Error::Domain(e)) => match e {
        DomainError::NotEligible(_) | DomainError::NoCurrentClass => {
          StatusCode::UNPROCESSABLE_ENTITY
        }
        DomainError::AlreadyMarked(_) | DomainError::SessionStateViolation { .. } => {
          StatusCode::CONFLICT
        }
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
      },
      Self::Engine(rollcall_engine::Error::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }

    let mut body = json!({ "error": self.code(), "reason": self.to_string() });
    if let Self::Engine(rollcall_engine::Error::Domain(DomainError::AlreadyMarked(record))) = &self {
      body["record"] = json!(record);
    }
    (status, Json(body)).into_response()
  }
}
