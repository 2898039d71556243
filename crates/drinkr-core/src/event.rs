//! Drink events, the fundamental unit of the scoring log.
//!
//! A drink event is an immutable record of one scoring action by one member.
//! Events are never updated or deleted; every derived view (scores,
//! leaderboard, history) is computed from them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::user::UserId;

// ─── Drink kinds ─────────────────────────────────────────────────────────────

/// Version of the kind → points table below. Changing any point value
/// requires bumping this.
pub const POINTS_TABLE_VERSION: u32 = 1;

/// What was drunk. The point value is a fixed property of the kind and is
/// never accepted from clients.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DrinkKind {
  Beer,
  Wine,
  Shot,
  Other,
}

impl DrinkKind {
  pub const fn points(self) -> u32 {
    match self {
      Self::Beer => 1,
      Self::Wine => 2,
      Self::Shot => 3,
      Self::Other => 1,
    }
  }
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Store-assigned event identifier. Globally unique and strictly increasing
/// in append order, so it doubles as a replay cursor and a watermark.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ─── DrinkEvent ──────────────────────────────────────────────────────────────

/// An immutable, persisted scoring action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrinkEvent {
  pub event_id:    EventId,
  /// 1-based position in the group's log; dense, no gaps.
  pub seq:         u64,
  pub group_id:    Uuid,
  pub user_id:     UserId,
  pub kind:        DrinkKind,
  /// Always `kind.points()` at the table version in force when recorded.
  pub points:      u32,
  /// Client-reported time of the drink; may arrive out of order.
  pub occurred_at: DateTime<Utc>,
  /// Server-assigned; strictly increasing within a group.
  pub recorded_at: DateTime<Utc>,
}

// ─── NewDrinkEvent ───────────────────────────────────────────────────────────

/// Input to [`crate::store::GroupStore::append_event`].
/// `event_id`, `seq`, `points` and `recorded_at` are always set by the store.
#[derive(Debug, Clone)]
pub struct NewDrinkEvent {
  pub group_id:          Uuid,
  pub user_id:           UserId,
  pub kind:              DrinkKind,
  pub occurred_at:       DateTime<Utc>,
  /// Client-chosen token used to deduplicate retried submissions.
  pub idempotency_token: Option<String>,
}

impl NewDrinkEvent {
  pub fn new(
    group_id: Uuid,
    user_id: UserId,
    kind: DrinkKind,
    occurred_at: DateTime<Utc>,
  ) -> Self {
    Self {
      group_id,
      user_id,
      kind,
      occurred_at,
      idempotency_token: None,
    }
  }

  pub fn with_token(mut self, token: impl Into<String>) -> Self {
    self.idempotency_token = Some(token.into());
    self
  }
}

/// Result of an append: either a freshly committed event or the event a
/// previous submission with the same idempotency token produced.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
  Appended(DrinkEvent),
  Duplicate(DrinkEvent),
}

impl AppendOutcome {
  pub fn event(&self) -> &DrinkEvent {
    match self {
      Self::Appended(e) | Self::Duplicate(e) => e,
    }
  }

  pub fn into_event(self) -> DrinkEvent {
    match self {
      Self::Appended(e) | Self::Duplicate(e) => e,
    }
  }

  pub fn is_duplicate(&self) -> bool { matches!(self, Self::Duplicate(_)) }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn points_table() {
    assert_eq!(DrinkKind::Beer.points(), 1);
    assert_eq!(DrinkKind::Wine.points(), 2);
    assert_eq!(DrinkKind::Shot.points(), 3);
    assert_eq!(DrinkKind::Other.points(), 1);
    assert!(DrinkKind::iter().all(|k| k.points() > 0));
  }

  #[test]
  fn kind_string_forms_agree_with_serde() {
    for kind in DrinkKind::iter() {
      let json = serde_json::to_string(&kind).unwrap();
      assert_eq!(json, format!("\"{kind}\""));
      assert_eq!(DrinkKind::from_str(kind.as_ref()).unwrap(), kind);
    }
  }
}
