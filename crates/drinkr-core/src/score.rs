//! Member scores: the materialised view over a group's event log.
//!
//! [`GroupScores`] is a pure state machine: feed it events and it keeps
//! running totals, refusing anything it has already seen and flagging any
//! event that would skip over one it has not. Persistence and replay live in
//! the engine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  event::{DrinkEvent, EventId},
  user::UserId,
};

// ─── Records ─────────────────────────────────────────────────────────────────

/// Running total for one member of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberScore {
  pub user_id:          UserId,
  pub total:            u64,
  /// Highest `event_id` folded into `total`.
  pub watermark:        Option<EventId>,
  /// `recorded_at` of the member's most recent event; the leaderboard's
  /// tie-breaker.
  pub last_recorded_at: Option<DateTime<Utc>>,
}

impl MemberScore {
  pub fn empty(user_id: UserId) -> Self {
    Self {
      user_id,
      total: 0,
      watermark: None,
      last_recorded_at: None,
    }
  }
}

/// A durable snapshot of a group's view, written by the aggregator and read
/// back on recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCheckpoint {
  pub group_id:    Uuid,
  /// Every event with `seq <= applied_seq` is reflected in `members`.
  pub applied_seq: u64,
  pub members:     Vec<MemberScore>,
}

// ─── View ────────────────────────────────────────────────────────────────────

/// What happened when an event was offered to [`GroupScores::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
  /// The event was folded in; `total` is the member's new total.
  Counted { total: u64 },
  /// The event was at or below a watermark and was ignored.
  Duplicate,
  /// The event is ahead of the view: `expected` is the next `seq` the view
  /// can accept. Nothing was changed.
  Gap { expected: u64, got: u64 },
}

/// In-memory scores for one group.
#[derive(Debug, Clone, Default)]
pub struct GroupScores {
  applied_seq: u64,
  members:     HashMap<UserId, MemberScore>,
}

impl GroupScores {
  pub fn from_checkpoint(checkpoint: GroupCheckpoint) -> Self {
    Self {
      applied_seq: checkpoint.applied_seq,
      members:     checkpoint
        .members
        .into_iter()
        .map(|m| (m.user_id.clone(), m))
        .collect(),
    }
  }

  pub fn to_checkpoint(&self, group_id: Uuid) -> GroupCheckpoint {
    let mut members: Vec<MemberScore> = self.members.values().cloned().collect();
    members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    GroupCheckpoint {
      group_id,
      applied_seq: self.applied_seq,
      members,
    }
  }

  pub fn applied_seq(&self) -> u64 { self.applied_seq }

  /// `event_id` of the event at `applied_seq`, i.e. where a replay of the log
  /// should resume. Within a group, `event_id` order is `seq` order, so this
  /// is the highest member watermark.
  pub fn last_event_id(&self) -> Option<EventId> {
    self.members.values().filter_map(|m| m.watermark).max()
  }

  pub fn get(&self, user_id: &UserId) -> Option<&MemberScore> {
    self.members.get(user_id)
  }

  /// Zero for members without events.
  pub fn total(&self, user_id: &UserId) -> u64 {
    self.get(user_id).map_or(0, |m| m.total)
  }

  pub fn apply(&mut self, event: &DrinkEvent) -> Applied {
    let member_watermark = self.get(&event.user_id).and_then(|m| m.watermark);
    if member_watermark.is_some_and(|w| event.event_id <= w)
      || event.seq <= self.applied_seq
    {
      return Applied::Duplicate;
    }

    let expected = self.applied_seq + 1;
    if event.seq != expected {
      return Applied::Gap {
        expected,
        got: event.seq,
      };
    }

    let entry = self
      .members
      .entry(event.user_id.clone())
      .or_insert_with(|| MemberScore::empty(event.user_id.clone()));
    entry.total += u64::from(event.points);
    entry.watermark = Some(event.event_id);
    entry.last_recorded_at = Some(event.recorded_at);
    self.applied_seq = event.seq;

    Applied::Counted { total: entry.total }
  }
}
