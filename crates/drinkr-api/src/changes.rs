//! `GET /groups/{id}/changes`: the group's change notifications as a
//! Server-Sent Events stream.
//!
//! Every message is a `change` event whose data is a JSON
//! [`drinkr_core::sync::ChangeNotification`]. A client that reads too slowly
//! gets a `lagged` event carrying the number of skipped notifications and
//! should re-fetch the leaderboard and history.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  response::{
    IntoResponse,
    sse::{Event, KeepAlive, Sse},
  },
};
use drinkr_core::store::GroupStore;
use drinkr_engine::Engine;
use futures::stream;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::{error::ApiError, identity::CurrentUser};

pub async fn handler<S: GroupStore>(
  State(engine): State<Arc<Engine<S>>>,
  user: CurrentUser,
  Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let rx = engine.subscribe(group_id, &user.user_id).await?;

  let events = stream::unfold(rx, |mut rx| async move {
    let event = match rx.recv().await {
      Ok(notification) => Event::default().event("change").json_data(&notification),
      Err(RecvError::Lagged(missed)) => Ok(Event::default().event("lagged").data(missed.to_string())),
      Err(RecvError::Closed) => return None,
    };
    Some((event, rx))
  });

  Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
