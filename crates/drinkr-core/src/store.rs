//! The `GroupStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `drinkr-store-sqlite`).
//! Higher layers (`drinkr-engine`, `drinkr-api`) depend on this abstraction,
//! not on any concrete backend.

use std::{future::Future, time::Duration};

use uuid::Uuid;

use crate::{
  event::{AppendOutcome, DrinkEvent, EventId, NewDrinkEvent},
  group::{Group, InviteCode, Membership, NewGroup, Role},
  score::GroupCheckpoint,
  user::UserId,
};

/// Abstraction over the durable state of the engine.
///
/// Every write runs as a single atomic unit: it either fully commits or has
/// no effect. Membership rules from [`crate::membership`] are evaluated
/// inside that same unit.
///
/// Events are append-only. There is no method to update or delete one.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait GroupStore: Send + Sync {
  /// Backend error. Must convert into the engine taxonomy so callers can tell
  /// transient failures from deterministic ones.
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  // ── Groups ────────────────────────────────────────────────────────────

  /// Create a group with `new.creator` as its sole admin.
  ///
  /// Fails with [`crate::Error::Conflict`] if the invite code is taken.
  fn create_group(
    &self,
    new: NewGroup,
  ) -> impl Future<Output = Result<(Group, Membership), Self::Error>> + Send + '_;

  /// Retrieve a group by id. Returns `None` if not found.
  fn get_group(
    &self,
    group_id: Uuid,
  ) -> impl Future<Output = Result<Option<Group>, Self::Error>> + Send + '_;

  fn find_group_by_invite(
    &self,
    code: InviteCode,
  ) -> impl Future<Output = Result<Option<Group>, Self::Error>> + Send + '_;

  /// Groups `user_id` currently belongs to, oldest first.
  fn list_groups_for_user(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Vec<Group>, Self::Error>> + Send + '_;

  // ── Memberships ───────────────────────────────────────────────────────

  /// Add `user_id` to the group as a plain member.
  ///
  /// Fails with [`crate::Error::AlreadyMember`] if they already belong.
  fn add_member(
    &self,
    group_id: Uuid,
    user_id: UserId,
    display_name: Option<String>,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  fn get_membership(
    &self,
    group_id: Uuid,
    user_id: UserId,
  ) -> impl Future<Output = Result<Option<Membership>, Self::Error>> + Send + '_;

  /// Current members, in join order.
  fn list_members(
    &self,
    group_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Membership>, Self::Error>> + Send + '_;

  /// Delete a membership, enforcing [`crate::membership::check_removal`].
  /// Returns the membership as it was.
  fn remove_member(
    &self,
    group_id: Uuid,
    user_id: UserId,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  /// Change a member's role.
  fn set_role(
    &self,
    group_id: Uuid,
    user_id: UserId,
    role: Role,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  // ── Events (append-only) ──────────────────────────────────────────────

  /// Append an event, assigning `event_id`, `seq`, `points` and
  /// `recorded_at`.
  ///
  /// Fails with [`crate::Error::Forbidden`] if the user is not a member. If
  /// the input carries an idempotency token already used by the same user in
  /// the same group within `retention`, the original event is returned as
  /// [`AppendOutcome::Duplicate`] and nothing is written.
  fn append_event(
    &self,
    new: NewDrinkEvent,
    retention: Duration,
  ) -> impl Future<Output = Result<AppendOutcome, Self::Error>> + Send + '_;

  /// Up to `limit` events of the group with `event_id > after`, in log
  /// order.
  ///
  /// Fails with [`crate::Error::EventNotFound`] if `after` is not an event of
  /// this group.
  fn list_events(
    &self,
    group_id: Uuid,
    after: Option<EventId>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<DrinkEvent>, Self::Error>> + Send + '_;

  /// `seq` of the group's latest event; 0 for an empty log.
  fn head_seq(
    &self,
    group_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Score checkpoints ─────────────────────────────────────────────────

  /// The last saved checkpoint, or an empty one at `applied_seq = 0`.
  fn load_checkpoint(
    &self,
    group_id: Uuid,
  ) -> impl Future<Output = Result<GroupCheckpoint, Self::Error>> + Send + '_;

  /// Replace the group's checkpoint. A checkpoint older than the stored one
  /// is ignored.
  fn save_checkpoint(
    &self,
    checkpoint: GroupCheckpoint,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Ids of every group with at least one event or member; used to warm the
  /// score view at start-up.
  fn list_group_ids(
    &self,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;
}
