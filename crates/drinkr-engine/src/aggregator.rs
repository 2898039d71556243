//! The [`Aggregator`]: keeps each group's [`GroupScores`] in step with its
//! event log.
//!
//! A view is loaded lazily from the group's last durable checkpoint and
//! brought up to date by replaying the log from that checkpoint. After that
//! it is advanced by [`Aggregator::on_event_appended`]. Whenever the view is
//! found behind the store (a delivery was lost, a writer was cancelled between
//! commit and update, or the process restarted) it replays the missing tail.

use std::{collections::HashMap, sync::Arc};

use drinkr_core::{
  Error, Result,
  event::DrinkEvent,
  score::{Applied, GroupScores, MemberScore},
  store::GroupStore,
  user::UserId,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  config::EngineConfig,
  cursor::{EVENT_PAGE_SIZE, EventCursor},
  retry,
};

#[derive(Debug, Default)]
struct GroupView {
  scores:  GroupScores,
  loaded:  bool,
  /// Events applied since the last checkpoint was saved.
  unsaved: u32,
}

type Slot = Arc<RwLock<GroupView>>;

pub struct Aggregator<S> {
  store:  Arc<S>,
  config: EngineConfig,
  views:  RwLock<HashMap<Uuid, Slot>>,
}

impl<S: GroupStore> Aggregator<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
    Self {
      store,
      config,
      views: RwLock::default(),
    }
  }

  // ─── Write path ────────────────────────────────────────────────────────────

  /// Fold a committed event into its group's view.
  ///
  /// Safe to call more than once and out of order: an event the view already
  /// covers is ignored, and an event that would skip over unseen ones
  /// triggers a replay from the log instead. Returns the author's score as it
  /// stands afterwards.
  pub async fn on_event_appended(&self, event: &DrinkEvent) -> Result<Option<MemberScore>> {
    let group_id = event.group_id;
    let slot = self.slot(group_id).await;
    let mut view = slot.write().await;

    if !view.loaded {
      self.reload(group_id, &mut view).await?;
    }

    match view.scores.apply(event) {
      Applied::Counted { total } => {
        debug!(%group_id, user_id = %event.user_id, %total, event_id = %event.event_id, "score updated");
        view.unsaved += 1;
        self.maybe_checkpoint(group_id, &mut view).await;
      }
      Applied::Duplicate => {
        debug!(%group_id, event_id = %event.event_id, "event already applied");
      }
      Applied::Gap { expected, got } => {
        debug!(%group_id, expected, got, "gap in delivered events, replaying");
        self.replay(group_id, &mut view).await?;
      }
    }

    Ok(view.scores.get(&event.user_id).cloned())
  }

  // ─── Read path ─────────────────────────────────────────────────────────────

  /// Current total of `user_id` in `group_id`; zero if they have no events.
  pub async fn score(&self, group_id: Uuid, user_id: &UserId) -> Result<u64> {
    let slot = self.ensure_current(group_id).await?;
    let view = slot.read().await;
    Ok(view.scores.total(user_id))
  }

  /// A copy of the group's whole view, current as of the call.
  pub async fn snapshot(&self, group_id: Uuid) -> Result<GroupScores> {
    let slot = self.ensure_current(group_id).await?;
    let view = slot.read().await;
    Ok(view.scores.clone())
  }

  // ─── Recovery ──────────────────────────────────────────────────────────────

  /// Discard the in-memory view of `group_id`, reload its checkpoint and
  /// replay the log from there. Returns the view's `applied_seq`.
  pub async fn recover(&self, group_id: Uuid) -> Result<u64> {
    let slot = self.slot(group_id).await;
    let mut view = slot.write().await;
    self.reload(group_id, &mut view).await?;
    Ok(view.scores.applied_seq())
  }

  /// Make sure the view reflects at least every event the store had when the
  /// call started.
  async fn ensure_current(&self, group_id: Uuid) -> Result<Slot> {
    let store = &self.store;
    let head = retry::run(&self.config.retry, "head_seq", move || store.head_seq(group_id)).await?;
    let slot = self.slot(group_id).await;

    let current = {
      let view = slot.read().await;
      view.loaded && view.scores.applied_seq() >= head
    };
    if !current {
      let mut view = slot.write().await;
      if !view.loaded {
        self.reload(group_id, &mut view).await?;
      } else if view.scores.applied_seq() < head {
        debug!(%group_id, applied = view.scores.applied_seq(), head, "view behind store, replaying");
        self.replay(group_id, &mut view).await?;
      }
    }
    Ok(slot)
  }

  async fn slot(&self, group_id: Uuid) -> Slot {
    if let Some(slot) = self.views.read().await.get(&group_id) {
      return slot.clone();
    }
    self.views.write().await.entry(group_id).or_default().clone()
  }

  async fn reload(&self, group_id: Uuid, view: &mut GroupView) -> Result<()> {
    let store = &self.store;
    let checkpoint = retry::run(&self.config.retry, "load_checkpoint", move || {
      store.load_checkpoint(group_id)
    })
    .await?;
    debug!(%group_id, applied_seq = checkpoint.applied_seq, "loaded checkpoint");

    view.scores = GroupScores::from_checkpoint(checkpoint);
    view.unsaved = 0;
    view.loaded = true;
    self.replay(group_id, view).await
  }

  /// Apply every logged event after the view's position.
  async fn replay(&self, group_id: Uuid, view: &mut GroupView) -> Result<()> {
    let mut cursor = EventCursor::new(
      self.store.clone(),
      self.config.retry.clone(),
      group_id,
      view.scores.last_event_id(),
      EVENT_PAGE_SIZE,
    );

    let mut replayed = 0u32;
    while let Some(event) = cursor.next().await? {
      match view.scores.apply(&event) {
        Applied::Counted { .. } => replayed += 1,
        Applied::Duplicate => {}
        Applied::Gap { expected, got } => {
          return Err(Error::Internal(format!(
            "event log of group {group_id} skips from seq {expected} to {got}"
          )));
        }
      }
    }

    if replayed > 0 {
      debug!(%group_id, replayed, applied_seq = view.scores.applied_seq(), "replayed events");
      view.unsaved += replayed;
      self.checkpoint(group_id, view).await;
    }
    Ok(())
  }

  async fn maybe_checkpoint(&self, group_id: Uuid, view: &mut GroupView) {
    if view.unsaved >= self.config.checkpoint_interval.max(1) {
      self.checkpoint(group_id, view).await;
    }
  }

  /// Persist the view. A failure only costs a longer replay later, so it is
  /// logged rather than returned.
  async fn checkpoint(&self, group_id: Uuid, view: &mut GroupView) {
    let store = &self.store;
    let checkpoint = view.scores.to_checkpoint(group_id);
    let saved = retry::run(&self.config.retry, "save_checkpoint", move || {
      store.save_checkpoint(checkpoint.clone())
    })
    .await;
    match saved {
      Ok(()) => view.unsaved = 0,
      Err(e) => warn!(%group_id, error = %e, "failed to save score checkpoint"),
    }
  }
}
