//! Handlers for score reads: single totals, the leaderboard, the home-screen
//! summary and the bucketed activity history.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{FixedOffset, NaiveDate, Utc};
use drinkr_core::{
  history::HistoryBucket,
  leaderboard::LeaderboardEntry,
  store::GroupStore,
  user::UserId,
};
use drinkr_engine::{Engine, HistoryQuery, Summary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, identity::CurrentUser};

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreResponse {
  pub user_id: UserId,
  pub total:   u64,
}

/// `GET /groups/{id}/scores/{user_id}`
pub async fn score<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path((group_id, target)): Path<(Uuid, String)>,
) -> Result<Json<ScoreResponse>, ApiError> {
  let target = UserId::new(target);
  let total = engine.get_score(group_id, &user.user_id, &target).await?;
  Ok(Json(ScoreResponse {
    user_id: target,
    total,
  }))
}

/// `GET /groups/{id}/leaderboard`
pub async fn leaderboard<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
  Ok(Json(engine.get_leaderboard(group_id, &user.user_id).await?))
}

/// `GET /groups/{id}/summary`
pub async fn summary<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path(group_id): Path<Uuid>,
) -> Result<Json<Summary>, ApiError> {
  Ok(Json(engine.get_summary(group_id, &user.user_id).await?))
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  /// The viewer's local date; defaults to today at `offset_minutes`.
  pub date:           Option<NaiveDate>,
  /// Minutes east of UTC, e.g. `120` for UTC+2.
  #[serde(default)]
  pub offset_minutes: i32,
  /// Restrict the feed to one member.
  pub user_id:        Option<String>,
}

/// `GET /groups/{id}/history[?date=YYYY-MM-DD&offset_minutes=<n>&user_id=<id>]`
pub async fn history<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path(group_id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryBucket>>, ApiError> {
  let offset = params
    .offset_minutes
    .checked_mul(60)
    .and_then(FixedOffset::east_opt)
    .ok_or_else(|| {
      ApiError::BadRequest(format!("offset_minutes out of range: {}", params.offset_minutes))
    })?;
  let today = params
    .date
    .unwrap_or_else(|| Utc::now().with_timezone(&offset).date_naive());

  let query = HistoryQuery {
    today,
    offset,
    user_id: params.user_id.map(UserId::new),
  };
  Ok(Json(engine.get_history(group_id, &user.user_id, query).await?))
}
