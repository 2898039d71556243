//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that lexical order is chronological order.
//! UUIDs are stored as hyphenated lowercase strings. Enums are stored as
//! their snake_case names.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use drinkr_core::{
  event::{DrinkEvent, DrinkKind, EventId},
  group::{Group, InviteCode, Membership, Role},
  score::MemberScore,
  user::UserId,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Drop precision the column cannot hold, so a value survives a round trip
/// unchanged.
pub fn truncate_dt(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_role(r: Role) -> &'static str {
  match r {
    Role::Admin => "admin",
    Role::Member => "member",
  }
}

pub fn decode_role(s: &str) -> Result<Role> {
  Role::from_str(s).map_err(|_| Error::Decode(format!("unknown role: {s:?}")))
}

pub fn encode_kind(k: DrinkKind) -> &'static str {
  match k {
    DrinkKind::Beer => "beer",
    DrinkKind::Wine => "wine",
    DrinkKind::Shot => "shot",
    DrinkKind::Other => "other",
  }
}

pub fn decode_kind(s: &str) -> Result<DrinkKind> {
  DrinkKind::from_str(s)
    .map_err(|_| Error::Decode(format!("unknown drink kind: {s:?}")))
}

pub fn decode_invite_code(s: &str) -> Result<InviteCode> {
  InviteCode::parse(s)
    .ok_or_else(|| Error::Decode(format!("malformed invite code: {s:?}")))
}

pub fn decode_count(n: i64, column: &str) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Decode(format!("negative {column}: {n}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const GROUP_COLUMNS: &str = "group_id, name, invite_code, created_at";

/// Raw strings read directly from a `groups` row.
pub struct RawGroup {
  pub group_id:    String,
  pub name:        String,
  pub invite_code: String,
  pub created_at:  String,
}

impl RawGroup {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:    row.get(0)?,
      name:        row.get(1)?,
      invite_code: row.get(2)?,
      created_at:  row.get(3)?,
    })
  }

  pub fn into_group(self) -> Result<Group> {
    Ok(Group {
      group_id:    decode_uuid(&self.group_id)?,
      name:        self.name,
      invite_code: decode_invite_code(&self.invite_code)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const MEMBERSHIP_COLUMNS: &str = "group_id, user_id, role, display_name, joined_at";

/// Raw strings read directly from a `memberships` row.
pub struct RawMembership {
  pub group_id:     String,
  pub user_id:      String,
  pub role:         String,
  pub display_name: Option<String>,
  pub joined_at:    String,
}

impl RawMembership {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:     row.get(0)?,
      user_id:      row.get(1)?,
      role:         row.get(2)?,
      display_name: row.get(3)?,
      joined_at:    row.get(4)?,
    })
  }

  pub fn into_membership(self) -> Result<Membership> {
    Ok(Membership {
      group_id:     decode_uuid(&self.group_id)?,
      user_id:      UserId::from(self.user_id),
      role:         decode_role(&self.role)?,
      display_name: self.display_name,
      joined_at:    decode_dt(&self.joined_at)?,
    })
  }
}

pub const EVENT_COLUMNS: &str =
  "event_id, seq, group_id, user_id, kind, points, occurred_at, recorded_at";

/// Raw values read directly from an `events` row.
pub struct RawEvent {
  pub event_id:    i64,
  pub seq:         i64,
  pub group_id:    String,
  pub user_id:     String,
  pub kind:        String,
  pub points:      i64,
  pub occurred_at: String,
  pub recorded_at: String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:    row.get(0)?,
      seq:         row.get(1)?,
      group_id:    row.get(2)?,
      user_id:     row.get(3)?,
      kind:        row.get(4)?,
      points:      row.get(5)?,
      occurred_at: row.get(6)?,
      recorded_at: row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<DrinkEvent> {
    let points = u32::try_from(self.points)
      .map_err(|_| Error::Decode(format!("bad points value: {}", self.points)))?;
    Ok(DrinkEvent {
      event_id: EventId(self.event_id),
      seq: decode_count(self.seq, "seq")?,
      group_id: decode_uuid(&self.group_id)?,
      user_id: UserId::from(self.user_id),
      kind: decode_kind(&self.kind)?,
      points,
      occurred_at: decode_dt(&self.occurred_at)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `score_checkpoints` row.
pub struct RawScore {
  pub user_id:          String,
  pub total:            i64,
  pub watermark:        Option<i64>,
  pub last_recorded_at: Option<String>,
}

impl RawScore {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:          row.get(0)?,
      total:            row.get(1)?,
      watermark:        row.get(2)?,
      last_recorded_at: row.get(3)?,
    })
  }

  pub fn into_score(self) -> Result<MemberScore> {
    Ok(MemberScore {
      user_id:          UserId::from(self.user_id),
      total:            decode_count(self.total, "total")?,
      watermark:        self.watermark.map(EventId),
      last_recorded_at: self.last_recorded_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
