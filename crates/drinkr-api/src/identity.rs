//! Caller identity.
//!
//! Authentication happens upstream. The proxy in front of this service puts
//! the authenticated user id in `x-user-id` and, when it knows one, a display
//! name in `x-user-name`.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use drinkr_core::user::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// The user making the request. Extracting it fails with 401 when the
/// identity header is missing or blank.
#[derive(Debug, Clone)]
pub struct CurrentUser {
  pub user_id:      UserId,
  pub display_name: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_owned)
}

impl<S> FromRequestParts<S> for CurrentUser
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let user_id = header(&parts.headers, USER_ID_HEADER).ok_or(ApiError::Unauthorized)?;
    Ok(Self {
      user_id:      UserId::new(user_id),
      display_name: header(&parts.headers, USER_NAME_HEADER),
    })
  }
}
