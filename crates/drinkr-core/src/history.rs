//! Activity-feed bucketing.
//!
//! A pure projection of the event log: each event is placed in a bucket
//! according to the calendar date of its `occurred_at` in the viewer's time
//! zone, relative to the viewer's current date. Nothing here is stored.

use std::{cmp::Reverse, collections::BTreeMap, fmt};

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::event::DrinkEvent;

/// Events up to this many days old (and older than yesterday) share the
/// "This Week" bucket.
pub const THIS_WEEK_DAYS: i64 = 7;

/// Which bucket an event belongs to, relative to the viewer's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "date", rename_all = "snake_case")]
pub enum DateLabel {
  Today,
  Yesterday,
  ThisWeek,
  /// Older than a week; labelled with its own date.
  On(NaiveDate),
}

impl DateLabel {
  /// Classify a local calendar date against the viewer's local date.
  ///
  /// Dates after `today` (a fast client clock) count as today.
  pub fn classify(date: NaiveDate, today: NaiveDate) -> Self {
    match (today - date).num_days() {
      i64::MIN..=0 => Self::Today,
      1 => Self::Yesterday,
      2..=THIS_WEEK_DAYS => Self::ThisWeek,
      _ => Self::On(date),
    }
  }

  /// Most recent buckets sort first.
  fn sort_key(self) -> (u8, Reverse<Option<NaiveDate>>) {
    match self {
      Self::Today => (0, Reverse(None)),
      Self::Yesterday => (1, Reverse(None)),
      Self::ThisWeek => (2, Reverse(None)),
      Self::On(d) => (3, Reverse(Some(d))),
    }
  }
}

impl fmt::Display for DateLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Today => f.write_str("Today"),
      Self::Yesterday => f.write_str("Yesterday"),
      Self::ThisWeek => f.write_str("This Week"),
      Self::On(d) => write!(f, "{}", d.format("%-d %b %Y")),
    }
  }
}

/// One section of the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryBucket {
  pub label:  DateLabel,
  /// Display form of `label`, e.g. `"Yesterday"` or `"24 Oct 2025"`.
  pub title:  String,
  /// Newest first by `recorded_at`.
  pub events: Vec<DrinkEvent>,
}

/// Group `events` into buckets for a viewer whose local date is `today` at
/// UTC offset `offset`. Buckets come out most recent first.
pub fn bucket_events(
  events: impl IntoIterator<Item = DrinkEvent>,
  today: NaiveDate,
  offset: FixedOffset,
) -> Vec<HistoryBucket> {
  let mut buckets: BTreeMap<(u8, Reverse<Option<NaiveDate>>), (DateLabel, Vec<DrinkEvent>)> =
    BTreeMap::new();

  for event in events {
    let local_date = event.occurred_at.with_timezone(&offset).date_naive();
    let label = DateLabel::classify(local_date, today);
    buckets
      .entry(label.sort_key())
      .or_insert_with(|| (label, Vec::new()))
      .1
      .push(event);
  }

  buckets
    .into_values()
    .map(|(label, mut events)| {
      events.sort_by(|a, b| {
        b.recorded_at
          .cmp(&a.recorded_at)
          .then_with(|| b.event_id.cmp(&a.event_id))
      });
      HistoryBucket {
        label,
        title: label.to_string(),
        events,
      }
    })
    .collect()
}
