//! Leaderboard ranking.
//!
//! Entries are ordered by total descending. Equal totals go to the member
//! whose most recent event was recorded earlier, and after that to the lower
//! user id, so the order is total. Ranks are dense: two entries share a rank
//! only when both their total and their last-activity time are identical.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{group::Membership, score::GroupScores, user::UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
  pub user_id:          UserId,
  pub display_name:     Option<String>,
  pub total:            u64,
  /// 1-based.
  pub rank:             u32,
  pub last_recorded_at: Option<DateTime<Utc>>,
}

/// Rank the current `members` of a group using `scores`.
///
/// Scores belonging to users who are no longer members are ignored.
pub fn rank(members: &[Membership], scores: &GroupScores) -> Vec<LeaderboardEntry> {
  let mut entries: Vec<LeaderboardEntry> = members
    .iter()
    .map(|m| {
      let score = scores.get(&m.user_id);
      LeaderboardEntry {
        user_id:          m.user_id.clone(),
        display_name:     m.display_name.clone(),
        total:            score.map_or(0, |s| s.total),
        rank:             0,
        last_recorded_at: score.and_then(|s| s.last_recorded_at),
      }
    })
    .collect();

  entries.sort_by(compare);

  let mut rank = 0;
  let mut previous: Option<(u64, Option<DateTime<Utc>>)> = None;
  for entry in &mut entries {
    let key = (entry.total, entry.last_recorded_at);
    if previous != Some(key) {
      rank += 1;
      previous = Some(key);
    }
    entry.rank = rank;
  }
  entries
}

fn compare(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
  b.total
    .cmp(&a.total)
    .then_with(|| compare_recency(a.last_recorded_at, b.last_recorded_at))
    .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Earlier activity first; members with no activity last.
fn compare_recency(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
  match (a, b) {
    (Some(a), Some(b)) => a.cmp(&b),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use uuid::Uuid;

  use super::*;
  use crate::{
    event::{DrinkEvent, DrinkKind, EventId},
    group::Role,
  };

  fn member(user: &str) -> Membership {
    Membership {
      group_id:     Uuid::nil(),
      user_id:      UserId::from(user),
      role:         Role::Member,
      display_name: Some(user.to_uppercase()),
      joined_at:    Utc.timestamp_opt(0, 0).unwrap(),
    }
  }

  struct Log {
    scores: GroupScores,
    next:   i64,
  }

  impl Log {
    fn new() -> Self {
      Self {
        scores: GroupScores::default(),
        next:   1,
      }
    }

    fn push_at(&mut self, user: &str, kind: DrinkKind, secs: i64) {
      let at = Utc.timestamp_opt(secs, 0).unwrap();
      self.scores.apply(&DrinkEvent {
        event_id:    EventId(self.next),
        seq:         self.next as u64,
        group_id:    Uuid::nil(),
        user_id:     UserId::from(user),
        kind,
        points:      kind.points(),
        occurred_at: at,
        recorded_at: at,
      });
      self.next += 1;
    }

    fn push(&mut self, user: &str, kind: DrinkKind) {
      let secs = 1_000 + self.next;
      self.push_at(user, kind, secs);
    }
  }

  fn ids(entries: &[LeaderboardEntry]) -> Vec<(&str, u64, u32)> {
    entries
      .iter()
      .map(|e| (e.user_id.as_str(), e.total, e.rank))
      .collect()
  }

  #[test]
  fn sorted_by_total_descending() {
    let mut log = Log::new();
    log.push("a", DrinkKind::Beer);
    log.push("b", DrinkKind::Shot);
    let board = rank(&[member("a"), member("b")], &log.scores);
    assert_eq!(ids(&board), vec![("b", 3, 1), ("a", 1, 2)]);
    assert_eq!(board[0].display_name.as_deref(), Some("B"));
  }

  #[test]
  fn tie_goes_to_earlier_latest_activity() {
    let mut log = Log::new();
    log.push("a", DrinkKind::Beer);
    log.push("b", DrinkKind::Shot);
    log.push("a", DrinkKind::Wine);
    let board = rank(&[member("a"), member("b")], &log.scores);
    assert_eq!(ids(&board), vec![("b", 3, 1), ("a", 3, 2)]);
  }

  #[test]
  fn identical_keys_share_a_rank_and_fall_back_to_user_id() {
    let mut log = Log::new();
    log.push_at("b", DrinkKind::Beer, 500);
    log.push_at("a", DrinkKind::Beer, 500);
    log.push_at("c", DrinkKind::Wine, 600);
    let board = rank(&[member("c"), member("b"), member("a")], &log.scores);
    assert_eq!(ids(&board), vec![("c", 2, 1), ("a", 1, 2), ("b", 1, 2)]);
  }

  #[test]
  fn members_without_events_come_last_and_share_a_rank() {
    let mut log = Log::new();
    log.push("a", DrinkKind::Other);
    let board = rank(&[member("z"), member("y"), member("a")], &log.scores);
    assert_eq!(ids(&board), vec![("a", 1, 1), ("y", 0, 2), ("z", 0, 2)]);
  }

  #[test]
  fn former_members_are_not_listed() {
    let mut log = Log::new();
    log.push("gone", DrinkKind::Shot);
    log.push("a", DrinkKind::Beer);
    let board = rank(&[member("a")], &log.scores);
    assert_eq!(ids(&board), vec![("a", 1, 1)]);
  }

  #[test]
  fn ranks_never_skip() {
    let mut log = Log::new();
    for (user, kind) in [
      ("a", DrinkKind::Shot),
      ("b", DrinkKind::Wine),
      ("c", DrinkKind::Beer),
      ("d", DrinkKind::Beer),
    ] {
      log.push(user, kind);
    }
    let members: Vec<_> = ["a", "b", "c", "d"].into_iter().map(member).collect();
    let board = rank(&members, &log.scores);
    let ranks: Vec<u32> = board.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
  }
}
