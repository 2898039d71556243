//! Handlers for group and membership endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/groups` | Groups the caller belongs to |
//! | `POST`   | `/groups` | Body: `{"name":"Friday crew"}`; caller becomes admin |
//! | `POST`   | `/join` | Body: `{"invite_code":"ABCD2345"}`; 200 also when already a member |
//! | `GET`    | `/groups/{id}` | Members only |
//! | `POST`   | `/groups/{id}/leave` | 409 if the caller is the last admin |
//! | `GET`    | `/groups/{id}/members` | Members only |
//! | `DELETE` | `/groups/{id}/members/{user_id}` | Admins only |
//! | `POST`   | `/groups/{id}/members/{user_id}/promote` | Admins only |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use drinkr_core::{
  Error,
  group::{Group, Membership},
  store::GroupStore,
  user::UserId,
};
use drinkr_engine::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, identity::CurrentUser};

// ─── Groups ──────────────────────────────────────────────────────────────────

/// `GET /groups`
pub async fn list<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
) -> Result<Json<Vec<Group>>, ApiError> {
  Ok(Json(engine.list_groups(&user.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name: String,
}

/// `POST /groups`
pub async fn create<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let group = engine
    .create_group(user.user_id, user.display_name, &body.name)
    .await?;
  Ok((StatusCode::CREATED, Json(group)))
}

/// `GET /groups/{id}`
pub async fn get_one<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path(group_id): Path<Uuid>,
) -> Result<Json<Group>, ApiError> {
  Ok(Json(engine.get_group(group_id, &user.user_id).await?))
}

// ─── Joining and leaving ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct JoinBody {
  pub invite_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinResponse {
  pub group_id:       Uuid,
  pub already_member: bool,
}

/// `POST /join`
pub async fn join<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Json(body): Json<JoinBody>,
) -> Result<Json<JoinResponse>, ApiError> {
  let joined = engine
    .join_group(user.user_id, user.display_name, &body.invite_code)
    .await;
  let response = match joined {
    Ok(group) => JoinResponse {
      group_id:       group.group_id,
      already_member: false,
    },
    Err(Error::AlreadyMember { group_id }) => JoinResponse {
      group_id,
      already_member: true,
    },
    Err(e) => return Err(e.into()),
  };
  Ok(Json(response))
}

/// `POST /groups/{id}/leave`
pub async fn leave<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path(group_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  engine.leave_group(group_id, user.user_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Members ─────────────────────────────────────────────────────────────────

/// `GET /groups/{id}/members`
pub async fn members<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<Membership>>, ApiError> {
  Ok(Json(engine.list_members(group_id, &user.user_id).await?))
}

/// `DELETE /groups/{id}/members/{user_id}`
pub async fn remove<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path((group_id, target)): Path<(Uuid, String)>,
) -> Result<Json<Membership>, ApiError> {
  let removed = engine
    .remove_member(group_id, &user.user_id, UserId::new(target))
    .await?;
  Ok(Json(removed))
}

/// `POST /groups/{id}/members/{user_id}/promote`
pub async fn promote<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path((group_id, target)): Path<(Uuid, String)>,
) -> Result<Json<Membership>, ApiError> {
  let promoted = engine
    .promote_member(group_id, &user.user_id, UserId::new(target))
    .await?;
  Ok(Json(promoted))
}
