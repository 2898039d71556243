//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use drinkr_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("missing user identity")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Engine(#[from] drinkr_core::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      Self::Unauthorized => StatusCode::UNAUTHORIZED,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Engine(e) => match e.kind() {
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::LastAdmin => StatusCode::CONFLICT,
        // Only joining yields this, and the join handler answers 200 itself.
        ErrorKind::AlreadyMember => StatusCode::OK,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      Self::Unauthorized => "unauthorized",
      Self::BadRequest(_) => ErrorKind::Invalid.into(),
      Self::Engine(e) => e.kind().into(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string(), "kind": self.kind() }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  #[test]
  fn engine_errors_map_to_statuses() {
    let cases = [
      (drinkr_core::Error::Forbidden("x".into()), StatusCode::FORBIDDEN),
      (drinkr_core::Error::GroupNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
      (drinkr_core::Error::InviteCodeNotFound("x".into()), StatusCode::NOT_FOUND),
      (drinkr_core::Error::Conflict("x".into()), StatusCode::CONFLICT),
      (drinkr_core::Error::LastAdmin(Uuid::nil()), StatusCode::CONFLICT),
      (drinkr_core::Error::Invalid("x".into()), StatusCode::BAD_REQUEST),
      (drinkr_core::Error::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
      (drinkr_core::Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
      assert_eq!(ApiError::from(err).status(), status);
    }
    assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
  }
}
