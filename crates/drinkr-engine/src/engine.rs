//! [`Engine`]: the service facade.
//!
//! Every mutation of a group runs under that group's lock from
//! [`GroupLocks`], and every storage call goes through [`retry::run`]. Reads
//! of group data require the viewer to be a member.

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use drinkr_core::{
  Error, Result,
  event::{AppendOutcome, EventId, NewDrinkEvent},
  group::{Group, InviteCode, Membership, NewGroup, Role, validate_group_name},
  history::{HistoryBucket, bucket_events},
  leaderboard::{LeaderboardEntry, rank},
  membership,
  store::GroupStore,
  sync::{Change, ChangeNotification, MembershipChange, Notifier},
  user::UserId,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  aggregator::Aggregator,
  config::{EngineConfig, RetryPolicy},
  cursor::{EVENT_PAGE_SIZE, EventCursor},
  hub::SyncHub,
  locks::GroupLocks,
  retry,
};

/// Fresh invite codes tried before `create_group` gives up.
const CREATE_ATTEMPTS: usize = 5;

// ─── Request / response types ────────────────────────────────────────────────

/// How to bucket the activity feed for one viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
  /// The viewer's current local date.
  pub today:   NaiveDate,
  /// The viewer's UTC offset, used to turn `occurred_at` into a local date.
  pub offset:  FixedOffset,
  /// Only this user's events, if set.
  pub user_id: Option<UserId>,
}

/// What the home screen shows for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
  pub group:  Group,
  pub points: u64,
  /// The viewer's leaderboard rank.
  pub rank:   Option<u32>,
  /// Top of the leaderboard, once anyone has scored.
  pub leader: Option<LeaderboardEntry>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S> {
  store:      Arc<S>,
  config:     EngineConfig,
  locks:      GroupLocks,
  aggregator: Aggregator<S>,
  hub:        SyncHub,
}

impl<S: GroupStore> Engine<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
    Self {
      aggregator: Aggregator::new(store.clone(), config.clone()),
      hub: SyncHub::new(config.notification_buffer),
      locks: GroupLocks::new(),
      store,
      config,
    }
  }

  pub fn config(&self) -> &EngineConfig { &self.config }

  fn retry(&self) -> &RetryPolicy { &self.config.retry }

  fn publish(&self, group_id: Uuid, change: Change) {
    self.hub.notify(ChangeNotification { group_id, change });
  }

  /// Rebuild every group's score view from its checkpoint and the log.
  /// Returns the number of groups recovered.
  pub async fn recover_all(&self) -> Result<usize> {
    let store = &self.store;
    let ids = retry::run(self.retry(), "list_group_ids", move || store.list_group_ids()).await?;
    for &group_id in &ids {
      let applied_seq = self.aggregator.recover(group_id).await?;
      debug!(%group_id, applied_seq, "recovered score view");
    }
    info!(groups = ids.len(), "score views recovered");
    Ok(ids.len())
  }

  // ─── Membership registry ───────────────────────────────────────────────────

  /// Create a group with `creator` as its only admin.
  pub async fn create_group(
    &self,
    creator: UserId,
    creator_name: Option<String>,
    name: &str,
  ) -> Result<Group> {
    let name = validate_group_name(name)?;
    let store = &self.store;

    for attempt in 1..=CREATE_ATTEMPTS {
      let new = NewGroup {
        name:         name.clone(),
        invite_code:  InviteCode::generate(&mut OsRng),
        creator:      creator.clone(),
        creator_name: creator_name.clone(),
      };
      let created =
        retry::run(self.retry(), "create_group", move || store.create_group(new.clone())).await;
      match created {
        Ok((group, admin)) => {
          info!(group_id = %group.group_id, creator = %admin.user_id, "group created");
          self.publish(group.group_id, Change::MembershipChanged {
            user_id: admin.user_id,
            change:  MembershipChange::Created,
            role:    Some(admin.role),
          });
          return Ok(group);
        }
        Err(Error::Conflict(reason)) => debug!(attempt, %reason, "invite code collision"),
        Err(e) => return Err(e),
      }
    }
    Err(Error::Conflict(format!(
      "no unused invite code after {CREATE_ATTEMPTS} attempts"
    )))
  }

  /// Join the group behind `code`. Fails with [`Error::AlreadyMember`] if
  /// `user_id` already belongs to it.
  pub async fn join_group(
    &self,
    user_id: UserId,
    display_name: Option<String>,
    code: &str,
  ) -> Result<Group> {
    let invite = InviteCode::parse(code)
      .ok_or_else(|| Error::InviteCodeNotFound(code.trim().to_owned()))?;
    let store = &self.store;

    let lookup = invite.clone();
    let group = retry::run(self.retry(), "find_group_by_invite", move || {
      store.find_group_by_invite(lookup.clone())
    })
    .await?
    .ok_or_else(|| Error::InviteCodeNotFound(invite.to_string()))?;

    let group_id = group.group_id;
    let _guard = self.locks.lock(group_id).await;
    let user = user_id.clone();
    let member = retry::run(self.retry(), "add_member", move || {
      store.add_member(group_id, user.clone(), display_name.clone())
    })
    .await?;

    info!(%group_id, user_id = %member.user_id, "member joined");
    self.publish(group_id, Change::MembershipChanged {
      user_id,
      change: MembershipChange::Joined,
      role: Some(member.role),
    });
    Ok(group)
  }

  /// Leave a group. The user's events stay in the log.
  pub async fn leave_group(&self, group_id: Uuid, user_id: UserId) -> Result<()> {
    let store = &self.store;
    let _guard = self.locks.lock(group_id).await;
    let user = user_id.clone();
    retry::run(self.retry(), "remove_member", move || {
      store.remove_member(group_id, user.clone())
    })
    .await?;

    info!(%group_id, %user_id, "member left");
    self.publish(group_id, Change::MembershipChanged {
      user_id,
      change: MembershipChange::Left,
      role: None,
    });
    Ok(())
  }

  /// Remove `target` from the group on behalf of `actor`, who must be an
  /// admin.
  pub async fn remove_member(
    &self,
    group_id: Uuid,
    actor: &UserId,
    target: UserId,
  ) -> Result<Membership> {
    let store = &self.store;
    let _guard = self.locks.lock(group_id).await;
    self.require_group(group_id).await?;
    let members = self.members_of(group_id).await?;
    membership::require_admin(group_id, &members, actor)?;

    let user = target.clone();
    let removed = retry::run(self.retry(), "remove_member", move || {
      store.remove_member(group_id, user.clone())
    })
    .await?;

    info!(%group_id, %actor, %target, "member removed");
    self.publish(group_id, Change::MembershipChanged {
      user_id: target,
      change:  MembershipChange::Removed,
      role:    None,
    });
    Ok(removed)
  }

  /// Make `target` an admin. Already being one is not an error.
  pub async fn promote_member(
    &self,
    group_id: Uuid,
    actor: &UserId,
    target: UserId,
  ) -> Result<Membership> {
    let store = &self.store;
    let _guard = self.locks.lock(group_id).await;
    self.require_group(group_id).await?;
    let members = self.members_of(group_id).await?;
    membership::require_admin(group_id, &members, actor)?;

    let current = membership::find(&members, &target).ok_or_else(|| Error::MemberNotFound {
      group_id,
      user_id: target.clone(),
    })?;
    if current.is_admin() {
      return Ok(current.clone());
    }

    let user = target.clone();
    let promoted = retry::run(self.retry(), "set_role", move || {
      store.set_role(group_id, user.clone(), Role::Admin)
    })
    .await?;

    info!(%group_id, %actor, %target, "member promoted");
    self.publish(group_id, Change::MembershipChanged {
      user_id: target,
      change:  MembershipChange::Promoted,
      role:    Some(Role::Admin),
    });
    Ok(promoted)
  }

  pub async fn is_member(&self, group_id: Uuid, user_id: &UserId) -> Result<bool> {
    Ok(self.membership(group_id, user_id).await?.is_some())
  }

  /// Members of the group in join order.
  pub async fn list_members(&self, group_id: Uuid, viewer: &UserId) -> Result<Vec<Membership>> {
    self.require_member(group_id, viewer).await?;
    self.members_of(group_id).await
  }

  pub async fn get_group(&self, group_id: Uuid, viewer: &UserId) -> Result<Group> {
    self.require_member(group_id, viewer).await?;
    self.require_group(group_id).await
  }

  /// Groups `user_id` belongs to, oldest membership first.
  pub async fn list_groups(&self, user_id: &UserId) -> Result<Vec<Group>> {
    let store = &self.store;
    let user = user_id.clone();
    retry::run(self.retry(), "list_groups_for_user", move || {
      store.list_groups_for_user(user.clone())
    })
    .await
  }

  // ─── Event store ───────────────────────────────────────────────────────────

  /// Record a drink. A retried submission carrying an idempotency token that
  /// was already used returns the original event as
  /// [`AppendOutcome::Duplicate`].
  pub async fn append_event(&self, new: NewDrinkEvent) -> Result<AppendOutcome> {
    let store = &self.store;
    let group_id = new.group_id;
    let retention = self.config.idempotency_retention();

    let _guard = self.locks.lock(group_id).await;
    let outcome = retry::run(self.retry(), "append_event", move || {
      store.append_event(new.clone(), retention)
    })
    .await?;
    let event = outcome.event();

    // The event is durable at this point; a view that fails to update now
    // replays it on the next read.
    let score = match self.aggregator.on_event_appended(event).await {
      Ok(score) => score,
      Err(e) => {
        warn!(%group_id, event_id = %event.event_id, error = %e, "score view not updated");
        None
      }
    };

    if outcome.is_duplicate() {
      debug!(%group_id, event_id = %event.event_id, "duplicate submission");
      return Ok(outcome);
    }

    debug!(
      %group_id,
      event_id = %event.event_id,
      seq = event.seq,
      user_id = %event.user_id,
      kind = %event.kind,
      "event appended"
    );
    self.publish(group_id, Change::EventAppended(event.clone()));
    if let Some(score) = score
      && let Some(watermark) = score.watermark
    {
      self.publish(group_id, Change::ScoreUpdated {
        user_id: score.user_id,
        total: score.total,
        watermark,
      });
    }
    Ok(outcome)
  }

  /// A cursor over the group's events after `since`, in log order.
  ///
  /// The first page is fetched eagerly, so an unknown `since` fails here with
  /// [`Error::EventNotFound`].
  pub async fn list_events(
    &self,
    group_id: Uuid,
    viewer: &UserId,
    since: Option<EventId>,
  ) -> Result<EventCursor<S>> {
    self.require_member(group_id, viewer).await?;
    let mut cursor = self.cursor(group_id, since);
    cursor.fill().await?;
    Ok(cursor)
  }

  fn cursor(&self, group_id: Uuid, since: Option<EventId>) -> EventCursor<S> {
    EventCursor::new(
      self.store.clone(),
      self.config.retry.clone(),
      group_id,
      since,
      EVENT_PAGE_SIZE,
    )
  }

  // ─── Scores, leaderboard, history ──────────────────────────────────────────

  /// `user_id`'s total in the group; zero if they have not logged anything.
  pub async fn get_score(&self, group_id: Uuid, viewer: &UserId, user_id: &UserId) -> Result<u64> {
    self.require_member(group_id, viewer).await?;
    self.aggregator.score(group_id, user_id).await
  }

  pub async fn get_leaderboard(
    &self,
    group_id: Uuid,
    viewer: &UserId,
  ) -> Result<Vec<LeaderboardEntry>> {
    self.require_member(group_id, viewer).await?;
    let scores = self.aggregator.snapshot(group_id).await?;
    let members = self.members_of(group_id).await?;
    Ok(rank(&members, &scores))
  }

  pub async fn get_history(
    &self,
    group_id: Uuid,
    viewer: &UserId,
    query: HistoryQuery,
  ) -> Result<Vec<HistoryBucket>> {
    self.require_member(group_id, viewer).await?;
    let events = self.cursor(group_id, None).collect().await?;
    let events = events
      .into_iter()
      .filter(|e| query.user_id.as_ref().is_none_or(|u| &e.user_id == u));
    Ok(bucket_events(events, query.today, query.offset))
  }

  pub async fn get_summary(&self, group_id: Uuid, viewer: &UserId) -> Result<Summary> {
    let entries = self.get_leaderboard(group_id, viewer).await?;
    let group = self.require_group(group_id).await?;
    let me = entries.iter().find(|e| &e.user_id == viewer);
    Ok(Summary {
      points: me.map_or(0, |e| e.total),
      rank: me.map(|e| e.rank),
      leader: entries.first().filter(|e| e.total > 0).cloned(),
      group,
    })
  }

  // ─── Sync ──────────────────────────────────────────────────────────────────

  /// Change notifications for the group from now on.
  pub async fn subscribe(
    &self,
    group_id: Uuid,
    viewer: &UserId,
  ) -> Result<broadcast::Receiver<ChangeNotification>> {
    self.require_member(group_id, viewer).await?;
    Ok(self.hub.subscribe(group_id))
  }

  // ─── Helpers ───────────────────────────────────────────────────────────────

  async fn membership(&self, group_id: Uuid, user_id: &UserId) -> Result<Option<Membership>> {
    let store = &self.store;
    let user = user_id.clone();
    retry::run(self.retry(), "get_membership", move || {
      store.get_membership(group_id, user.clone())
    })
    .await
  }

  async fn members_of(&self, group_id: Uuid) -> Result<Vec<Membership>> {
    let store = &self.store;
    retry::run(self.retry(), "list_members", move || store.list_members(group_id)).await
  }

  async fn require_group(&self, group_id: Uuid) -> Result<Group> {
    let store = &self.store;
    retry::run(self.retry(), "get_group", move || store.get_group(group_id))
      .await?
      .ok_or(Error::GroupNotFound(group_id))
  }

  /// The viewer's membership; [`Error::Forbidden`] for outsiders and
  /// [`Error::GroupNotFound`] if there is no such group.
  async fn require_member(&self, group_id: Uuid, user_id: &UserId) -> Result<Membership> {
    match self.membership(group_id, user_id).await? {
      Some(m) => Ok(m),
      None => {
        self.require_group(group_id).await?;
        Err(Error::Forbidden(format!(
          "{user_id} is not a member of group {group_id}"
        )))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, time::Duration};

  use chrono::{Days, Utc};
  use drinkr_core::{event::DrinkKind, history::DateLabel};
  use drinkr_store_sqlite::SqliteStore;

  use super::*;

  async fn engine() -> Engine<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    Engine::new(Arc::new(store), EngineConfig::default())
  }

  fn user(id: &str) -> UserId { UserId::from(id) }

  async fn drink(e: &Engine<SqliteStore>, g: Uuid, who: &str, kind: DrinkKind) -> AppendOutcome {
    e.append_event(NewDrinkEvent::new(g, user(who), kind, Utc::now()))
      .await
      .unwrap()
  }

  /// Group with `a` as admin and `b` as member.
  async fn pair(e: &Engine<SqliteStore>) -> Group {
    let g = e.create_group(user("a"), Some("Ana".into()), "Friday").await.unwrap();
    e.join_group(user("b"), Some("Ben".into()), g.invite_code.as_str())
      .await
      .unwrap();
    g
  }

  fn standings(board: &[LeaderboardEntry]) -> Vec<(&str, u64, u32)> {
    board
      .iter()
      .map(|e| (e.user_id.as_str(), e.total, e.rank))
      .collect()
  }

  // ─── Scenarios ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn scoring_and_tie_break_by_recency() {
    let e = engine().await;
    let g = e.create_group(user("a"), None, "Friday").await.unwrap();
    let gid = g.group_id;
    assert_eq!(e.get_score(gid, &user("a"), &user("a")).await.unwrap(), 0);

    drink(&e, gid, "a", DrinkKind::Beer).await;
    assert_eq!(e.get_score(gid, &user("a"), &user("a")).await.unwrap(), 1);

    e.join_group(user("b"), None, g.invite_code.as_str()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    drink(&e, gid, "b", DrinkKind::Shot).await;
    let board = e.get_leaderboard(gid, &user("a")).await.unwrap();
    assert_eq!(standings(&board), vec![("b", 3, 1), ("a", 1, 2)]);

    tokio::time::sleep(Duration::from_millis(2)).await;
    drink(&e, gid, "a", DrinkKind::Wine).await;
    let board = e.get_leaderboard(gid, &user("b")).await.unwrap();
    assert_eq!(standings(&board), vec![("b", 3, 1), ("a", 3, 2)]);
  }

  #[tokio::test]
  async fn removed_member_keeps_events_but_leaves_board() {
    let e = engine().await;
    let g = pair(&e).await;
    let gid = g.group_id;
    drink(&e, gid, "b", DrinkKind::Beer).await;

    let err = e.remove_member(gid, &user("b"), user("a")).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    e.remove_member(gid, &user("a"), user("b")).await.unwrap();

    let events = e.list_events(gid, &user("a"), None).await.unwrap().collect().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, user("b"));

    let board = e.get_leaderboard(gid, &user("a")).await.unwrap();
    assert_eq!(standings(&board), vec![("a", 0, 1)]);
  }

  // ─── Membership ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_group_validates_name() {
    let e = engine().await;
    let err = e.create_group(user("a"), None, "   ").await.unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));

    let g = e.create_group(user("a"), None, "  Friday  ").await.unwrap();
    assert_eq!(g.name, "Friday");
    let members = e.list_members(g.group_id, &user("a")).await.unwrap();
    assert_eq!(members.len(), 1);
    assert!(members[0].is_admin());
  }

  #[tokio::test]
  async fn join_with_unknown_or_malformed_code() {
    let e = engine().await;
    for code in ["ZZZZ9999", "DRINK-92X", ""] {
      let err = e.join_group(user("b"), None, code).await.unwrap_err();
      assert!(matches!(err, Error::InviteCodeNotFound(_)), "{code}: {err}");
    }
  }

  #[tokio::test]
  async fn join_is_case_insensitive_and_reports_existing_membership() {
    let e = engine().await;
    let g = e.create_group(user("a"), None, "Friday").await.unwrap();
    let code = format!("  {}\n", g.invite_code.as_str().to_lowercase());

    let joined = e.join_group(user("b"), None, &code).await.unwrap();
    assert_eq!(joined.group_id, g.group_id);

    let err = e.join_group(user("b"), None, &code).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyMember { group_id } if group_id == g.group_id));
  }

  #[tokio::test]
  async fn last_admin_must_hand_over_before_leaving() {
    let e = engine().await;
    let g = pair(&e).await;
    let gid = g.group_id;

    let err = e.leave_group(gid, user("a")).await.unwrap_err();
    assert!(matches!(err, Error::LastAdmin(_)));

    let promoted = e.promote_member(gid, &user("a"), user("b")).await.unwrap();
    assert_eq!(promoted.role, Role::Admin);
    e.leave_group(gid, user("a")).await.unwrap();
    assert!(!e.is_member(gid, &user("a")).await.unwrap());

    // The sole remaining member may always leave.
    e.leave_group(gid, user("b")).await.unwrap();
    assert!(!e.is_member(gid, &user("b")).await.unwrap());
  }

  #[tokio::test]
  async fn promote_requires_admin_and_member_target() {
    let e = engine().await;
    let g = pair(&e).await;
    let gid = g.group_id;

    let err = e.promote_member(gid, &user("b"), user("b")).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let err = e.promote_member(gid, &user("a"), user("zed")).await.unwrap_err();
    assert!(matches!(err, Error::MemberNotFound { .. }));

    let same = e.promote_member(gid, &user("a"), user("a")).await.unwrap();
    assert!(same.is_admin());
  }

  #[tokio::test]
  async fn outsiders_cannot_read_group_data() {
    let e = engine().await;
    let g = pair(&e).await;
    let gid = g.group_id;
    let outsider = user("zed");

    assert!(matches!(
      e.get_leaderboard(gid, &outsider).await.unwrap_err(),
      Error::Forbidden(_)
    ));
    assert!(matches!(
      e.get_group(gid, &outsider).await.unwrap_err(),
      Error::Forbidden(_)
    ));
    assert!(matches!(
      e.subscribe(gid, &outsider).await.unwrap_err(),
      Error::Forbidden(_)
    ));
    assert!(matches!(
      e.get_group(Uuid::new_v4(), &outsider).await.unwrap_err(),
      Error::GroupNotFound(_)
    ));
  }

  #[tokio::test]
  async fn list_groups_for_user() {
    let e = engine().await;
    let g1 = pair(&e).await;
    let g2 = e.create_group(user("b"), None, "Saturday").await.unwrap();

    let ids: Vec<_> = e
      .list_groups(&user("b"))
      .await
      .unwrap()
      .into_iter()
      .map(|g| g.group_id)
      .collect();
    assert_eq!(ids, vec![g1.group_id, g2.group_id]);
    assert_eq!(e.list_groups(&user("a")).await.unwrap().len(), 1);
  }

  // ─── Events & scores ───────────────────────────────────────────────────────

  #[tokio::test]
  async fn non_member_cannot_append() {
    let e = engine().await;
    let g = pair(&e).await;
    let err = e
      .append_event(NewDrinkEvent::new(g.group_id, user("zed"), DrinkKind::Beer, Utc::now()))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
  }

  #[tokio::test]
  async fn writes_to_unknown_groups_leave_no_locks_behind() {
    let e = engine().await;
    for _ in 0..50 {
      let err = e
        .append_event(NewDrinkEvent::new(Uuid::new_v4(), user("a"), DrinkKind::Beer, Utc::now()))
        .await
        .unwrap_err();
      assert!(matches!(err, Error::GroupNotFound(_)), "{err}");

      let err = e.leave_group(Uuid::new_v4(), user("a")).await.unwrap_err();
      assert!(matches!(err, Error::GroupNotFound(_)), "{err}");
    }
    assert_eq!(e.locks.len(), 0);

    let g = pair(&e).await;
    drink(&e, g.group_id, "a", DrinkKind::Beer).await;
    assert_eq!(e.locks.len(), 0);
  }

  #[tokio::test]
  async fn retried_submission_counts_once() {
    let e = engine().await;
    let g = pair(&e).await;
    let gid = g.group_id;
    let submission =
      NewDrinkEvent::new(gid, user("b"), DrinkKind::Wine, Utc::now()).with_token("tap-1");

    let first = e.append_event(submission.clone()).await.unwrap();
    let second = e.append_event(submission).await.unwrap();

    assert!(second.is_duplicate());
    assert_eq!(first.event(), second.event());
    assert_eq!(e.get_score(gid, &user("a"), &user("b")).await.unwrap(), 2);
    let events = e.list_events(gid, &user("b"), None).await.unwrap().collect().await.unwrap();
    assert_eq!(events.len(), 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_appends_keep_scores_equal_to_the_log() {
    let e = Arc::new(engine().await);
    let g = pair(&e).await;
    let gid = g.group_id;
    let g2 = e.create_group(user("a"), None, "Other").await.unwrap();

    let kinds = [DrinkKind::Beer, DrinkKind::Wine, DrinkKind::Shot, DrinkKind::Other];
    let tasks: Vec<_> = (0..40)
      .map(|i| {
        let e = e.clone();
        let (group, who) = match i % 4 {
          0 => (g2.group_id, "a"),
          1 => (gid, "a"),
          _ => (gid, "b"),
        };
        let kind = kinds[i % kinds.len()];
        tokio::spawn(async move {
          e.append_event(NewDrinkEvent::new(group, user(who), kind, Utc::now()))
            .await
            .unwrap()
        })
      })
      .collect();
    for t in tasks {
      t.await.unwrap();
    }

    let events = e.list_events(gid, &user("a"), None).await.unwrap().collect().await.unwrap();
    let seqs: Vec<u64> = events.iter().map(|ev| ev.seq).collect();
    assert_eq!(seqs, (1..=30).collect::<Vec<u64>>());

    let mut sums: HashMap<UserId, u64> = HashMap::new();
    for ev in &events {
      *sums.entry(ev.user_id.clone()).or_default() += u64::from(ev.points);
    }
    for who in ["a", "b"] {
      let score = e.get_score(gid, &user("a"), &user(who)).await.unwrap();
      assert_eq!(score, sums[&user(who)], "{who}");
    }
  }

  #[tokio::test]
  async fn cursor_resumes_from_position() {
    let e = engine().await;
    let g = pair(&e).await;
    let gid = g.group_id;
    for _ in 0..5 {
      drink(&e, gid, "a", DrinkKind::Beer).await;
    }

    let mut cursor = e.list_events(gid, &user("a"), None).await.unwrap();
    let first = cursor.take(2).await.unwrap();
    assert_eq!(first.len(), 2);

    let rest = e
      .list_events(gid, &user("a"), cursor.position())
      .await
      .unwrap()
      .collect()
      .await
      .unwrap();
    assert_eq!(rest.iter().map(|ev| ev.seq).collect::<Vec<_>>(), vec![3, 4, 5]);

    let err = e
      .list_events(gid, &user("a"), Some(EventId(i64::MAX)))
      .await
      .err()
      .unwrap();
    assert!(matches!(err, Error::EventNotFound { .. }));
  }

  #[tokio::test]
  async fn restart_recovers_scores_from_store() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let first = Engine::new(store.clone(), EngineConfig::default());
    let g = pair(&first).await;
    let gid = g.group_id;
    for kind in [DrinkKind::Beer, DrinkKind::Shot, DrinkKind::Wine] {
      drink(&first, gid, "b", kind).await;
    }
    drop(first);

    let second = Engine::new(store, EngineConfig::default());
    assert_eq!(second.recover_all().await.unwrap(), 1);
    assert_eq!(second.get_score(gid, &user("a"), &user("b")).await.unwrap(), 6);
  }

  // ─── History & summary ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn history_buckets_and_filters() {
    let e = engine().await;
    let g = pair(&e).await;
    let gid = g.group_id;
    let now = Utc::now();
    let yesterday = now.checked_sub_days(Days::new(1)).unwrap();

    for (who, at) in [("a", now), ("b", now), ("b", yesterday)] {
      e.append_event(NewDrinkEvent::new(gid, user(who), DrinkKind::Beer, at))
        .await
        .unwrap();
    }

    let utc = FixedOffset::east_opt(0).unwrap();
    let query = HistoryQuery {
      today:   now.date_naive(),
      offset:  utc,
      user_id: None,
    };
    let buckets = e.get_history(gid, &user("a"), query.clone()).await.unwrap();
    let labels: Vec<_> = buckets.iter().map(|b| b.label).collect();
    assert_eq!(labels, vec![DateLabel::Today, DateLabel::Yesterday]);
    assert_eq!(buckets[0].events.len(), 2);
    assert!(buckets[0].events[0].recorded_at >= buckets[0].events[1].recorded_at);

    let mine = e
      .get_history(gid, &user("a"), HistoryQuery {
        user_id: Some(user("a")),
        ..query
      })
      .await
      .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].events.len(), 1);
    assert_eq!(mine[0].events[0].user_id, user("a"));
  }

  #[tokio::test]
  async fn summary_shows_points_and_leader() {
    let e = engine().await;
    let g = pair(&e).await;
    let gid = g.group_id;

    let empty = e.get_summary(gid, &user("a")).await.unwrap();
    assert_eq!(empty.points, 0);
    assert!(empty.leader.is_none());

    drink(&e, gid, "b", DrinkKind::Shot).await;
    drink(&e, gid, "a", DrinkKind::Beer).await;
    let summary = e.get_summary(gid, &user("a")).await.unwrap();
    assert_eq!(summary.group.group_id, gid);
    assert_eq!(summary.points, 1);
    assert_eq!(summary.rank, Some(2));
    let leader = summary.leader.unwrap();
    assert_eq!(leader.user_id, user("b"));
    assert_eq!(leader.display_name.as_deref(), Some("Ben"));
  }

  // ─── Sync ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn subscribers_see_appends_and_membership_changes() {
    let e = engine().await;
    let g = e.create_group(user("a"), None, "Friday").await.unwrap();
    let gid = g.group_id;
    let mut rx = e.subscribe(gid, &user("a")).await.unwrap();

    e.join_group(user("b"), None, g.invite_code.as_str()).await.unwrap();
    let appended = drink(&e, gid, "b", DrinkKind::Shot).await.into_event();

    let joined = rx.recv().await.unwrap();
    assert!(matches!(
      joined.change,
      Change::MembershipChanged { change: MembershipChange::Joined, .. }
    ));
    assert_eq!(rx.recv().await.unwrap().change, Change::EventAppended(appended.clone()));
    assert_eq!(rx.recv().await.unwrap().change, Change::ScoreUpdated {
      user_id:   user("b"),
      total:     3,
      watermark: appended.event_id,
    });
  }
}
