//! Handlers for `/groups/{id}/events`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/groups/{id}/events` | Body: `{"kind":"beer","occurred_at":"…","idempotency_token":"…"}`; 201, or 200 for a retried token |
//! | `GET`  | `/groups/{id}/events` | `?since=<event_id>&limit=<n>`; oldest first |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use drinkr_core::{
  event::{AppendOutcome, DrinkEvent, DrinkKind, EventId, NewDrinkEvent},
  store::GroupStore,
};
use drinkr_engine::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, identity::CurrentUser};

pub const DEFAULT_PAGE: usize = 100;
pub const MAX_PAGE: usize = 1_000;
pub const MAX_TOKEN_LEN: usize = 128;

// ─── Append ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AppendBody {
  pub kind:              DrinkKind,
  /// Defaults to the time the request arrives.
  pub occurred_at:       Option<DateTime<Utc>>,
  pub idempotency_token: Option<String>,
}

/// `POST /groups/{id}/events`
pub async fn append<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path(group_id): Path<Uuid>,
  Json(body): Json<AppendBody>,
) -> Result<impl IntoResponse, ApiError> {
  let mut new = NewDrinkEvent::new(
    group_id,
    user.user_id,
    body.kind,
    body.occurred_at.unwrap_or_else(Utc::now),
  );
  if let Some(token) = body.idempotency_token {
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
      return Err(ApiError::BadRequest(format!(
        "idempotency_token must be 1 to {MAX_TOKEN_LEN} bytes"
      )));
    }
    new = new.with_token(token);
  }

  let response = match engine.append_event(new).await? {
    AppendOutcome::Appended(event) => (StatusCode::CREATED, Json(event)),
    AppendOutcome::Duplicate(event) => (StatusCode::OK, Json(event)),
  };
  Ok(response)
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub since: Option<i64>,
  pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventPage {
  pub events: Vec<DrinkEvent>,
  /// Pass as `since` to continue after this page.
  pub next:   Option<EventId>,
}

/// `GET /groups/{id}/events[?since=<event_id>&limit=<n>]`
pub async fn list<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path(group_id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<EventPage>, ApiError> {
  let limit = params.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
  let mut cursor = engine
    .list_events(group_id, &user.user_id, params.since.map(EventId))
    .await?;
  let events = cursor.take(limit).await?;
  Ok(Json(EventPage {
    events,
    next: cursor.position(),
  }))
}
