//! Change notifications emitted towards connected clients.
//!
//! The transport that fans these out is allowed to deliver them more than
//! once and out of order, so every payload carries enough to be applied
//! idempotently (event ids, watermarks, absolute totals).

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::{
  event::{DrinkEvent, EventId},
  group::Role,
  user::UserId,
};

/// What happened to a membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MembershipChange {
  Created,
  Joined,
  Left,
  Removed,
  Promoted,
}

/// The body of a notification. Serialises as `{"kind": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Change {
  ScoreUpdated {
    user_id:   UserId,
    /// Absolute total, not a delta.
    total:     u64,
    watermark: EventId,
  },
  EventAppended(DrinkEvent),
  MembershipChanged {
    user_id: UserId,
    change:  MembershipChange,
    role:    Option<Role>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
  pub group_id: Uuid,
  #[serde(flatten)]
  pub change:   Change,
}

/// Sink for change notifications. Implementations must not block: the engine
/// calls this on its write path.
pub trait Notifier: Send + Sync {
  fn notify(&self, notification: ChangeNotification);
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn wire_shape() {
    let n = ChangeNotification {
      group_id: Uuid::nil(),
      change:   Change::ScoreUpdated {
        user_id:   UserId::from("a"),
        total:     4,
        watermark: EventId(9),
      },
    };
    let value = serde_json::to_value(&n).unwrap();
    assert_eq!(
      value,
      json!({
        "group_id": Uuid::nil(),
        "kind": "score_updated",
        "payload": { "user_id": "a", "total": 4, "watermark": 9 },
      })
    );
  }
}
