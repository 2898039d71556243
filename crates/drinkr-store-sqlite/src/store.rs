//! [`SqliteStore`]: the SQLite implementation of [`GroupStore`].

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use drinkr_core::{
  event::{AppendOutcome, DrinkEvent, EventId, NewDrinkEvent},
  group::{Group, InviteCode, Membership, NewGroup, Role},
  membership,
  score::GroupCheckpoint,
  store::GroupStore,
  user::UserId,
};

use crate::{
  encode::{
    EVENT_COLUMNS, GROUP_COLUMNS, MEMBERSHIP_COLUMNS, RawEvent, RawGroup,
    RawMembership, RawScore, decode_count, decode_dt, decode_uuid, encode_dt,
    encode_kind, encode_role, encode_uuid, truncate_dt,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Drinkr store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` against the connection on the database thread.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` inside an immediate transaction. The transaction commits only if
  /// `f` returns `Ok`; any error rolls back everything `f` did.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match f(&*tx) {
          Ok(value) => {
            tx.commit()?;
            Ok(Ok(value))
          }
          Err(e) => Ok(Err(e)),
        }
      })
      .await?
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Run raw SQL in a write transaction, for fabricating states the
  /// `GroupStore` methods cannot produce.
  pub(crate) async fn execute_raw(&self, sql: String) -> Result<()> {
    self
      .write(move |tx| {
        tx.execute_batch(&sql)?;
        Ok(())
      })
      .await
  }
}

// ─── Queries shared by several operations ────────────────────────────────────

fn query_group_by(conn: &Connection, column: &str, value: &str) -> Result<Option<Group>> {
  let raw = conn
    .query_row(
      &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE {column} = ?1"),
      rusqlite::params![value],
      RawGroup::from_row,
    )
    .optional()?;
  raw.map(RawGroup::into_group).transpose()
}

fn require_group(conn: &Connection, group_id: Uuid) -> Result<()> {
  let exists = conn
    .query_row(
      "SELECT 1 FROM groups WHERE group_id = ?1",
      rusqlite::params![encode_uuid(group_id)],
      |_| Ok(()),
    )
    .optional()?
    .is_some();
  if exists {
    Ok(())
  } else {
    Err(drinkr_core::Error::GroupNotFound(group_id).into())
  }
}

fn query_members(conn: &Connection, group_id: Uuid) -> Result<Vec<Membership>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {MEMBERSHIP_COLUMNS} FROM memberships
     WHERE group_id = ?1
     ORDER BY joined_at, user_id"
  ))?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(group_id)], RawMembership::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawMembership::into_membership).collect()
}

fn query_membership(
  conn: &Connection,
  group_id: Uuid,
  user_id: &UserId,
) -> Result<Option<Membership>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM memberships
         WHERE group_id = ?1 AND user_id = ?2"
      ),
      rusqlite::params![encode_uuid(group_id), user_id.as_str()],
      RawMembership::from_row,
    )
    .optional()?;
  raw.map(RawMembership::into_membership).transpose()
}

fn insert_membership(conn: &Connection, m: &Membership) -> Result<()> {
  conn.execute(
    "INSERT INTO memberships (group_id, user_id, role, display_name, joined_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      encode_uuid(m.group_id),
      m.user_id.as_str(),
      encode_role(m.role),
      m.display_name,
      encode_dt(m.joined_at),
    ],
  )?;
  Ok(())
}

fn query_event(conn: &Connection, event_id: i64) -> Result<Option<DrinkEvent>> {
  let raw = conn
    .query_row(
      &format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?1"),
      rusqlite::params![event_id],
      RawEvent::from_row,
    )
    .optional()?;
  raw.map(RawEvent::into_event).transpose()
}

/// Oldest `created_at` an idempotency key may have and still be honoured.
fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
  chrono::Duration::from_std(retention)
    .ok()
    .and_then(|d| now.checked_sub_signed(d))
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ─── GroupStore impl ─────────────────────────────────────────────────────────

impl GroupStore for SqliteStore {
  type Error = Error;

  // ── Groups ────────────────────────────────────────────────────────────────

  async fn create_group(&self, new: NewGroup) -> Result<(Group, Membership)> {
    let group = Group {
      group_id:    Uuid::new_v4(),
      name:        new.name,
      invite_code: new.invite_code,
      created_at:  truncate_dt(Utc::now()),
    };
    let creator = Membership {
      group_id:     group.group_id,
      user_id:      new.creator,
      role:         Role::Admin,
      display_name: new.creator_name,
      joined_at:    group.created_at,
    };

    let (g, m) = (group.clone(), creator.clone());
    self
      .write(move |tx| {
        let taken = tx
          .query_row(
            "SELECT 1 FROM groups WHERE invite_code = ?1",
            rusqlite::params![g.invite_code.as_str()],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Err(
            drinkr_core::Error::Conflict(format!(
              "invite code {} is already in use",
              g.invite_code
            ))
            .into(),
          );
        }

        tx.execute(
          "INSERT INTO groups (group_id, name, invite_code, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![
            encode_uuid(g.group_id),
            g.name,
            g.invite_code.as_str(),
            encode_dt(g.created_at),
          ],
        )?;
        insert_membership(tx, &m)
      })
      .await?;

    Ok((group, creator))
  }

  async fn get_group(&self, group_id: Uuid) -> Result<Option<Group>> {
    self
      .read(move |conn| query_group_by(conn, "group_id", &encode_uuid(group_id)))
      .await
  }

  async fn find_group_by_invite(&self, code: InviteCode) -> Result<Option<Group>> {
    self
      .read(move |conn| query_group_by(conn, "invite_code", code.as_str()))
      .await
  }

  async fn list_groups_for_user(&self, user_id: UserId) -> Result<Vec<Group>> {
    self
      .read(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT g.group_id, g.name, g.invite_code, g.created_at
           FROM groups g
           JOIN memberships m ON m.group_id = g.group_id
           WHERE m.user_id = ?1
           ORDER BY m.joined_at, m.rowid",
        )?;
        let raws = stmt
          .query_map(rusqlite::params![user_id.as_str()], RawGroup::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawGroup::into_group).collect()
      })
      .await
  }

  // ── Memberships ───────────────────────────────────────────────────────────

  async fn add_member(
    &self,
    group_id:     Uuid,
    user_id:      UserId,
    display_name: Option<String>,
  ) -> Result<Membership> {
    self
      .write(move |tx| {
        require_group(tx, group_id)?;
        if query_membership(tx, group_id, &user_id)?.is_some() {
          return Err(drinkr_core::Error::AlreadyMember { group_id }.into());
        }
        let m = Membership {
          group_id,
          user_id,
          role: Role::Member,
          display_name,
          joined_at: truncate_dt(Utc::now()),
        };
        insert_membership(tx, &m)?;
        Ok(m)
      })
      .await
  }

  async fn get_membership(
    &self,
    group_id: Uuid,
    user_id:  UserId,
  ) -> Result<Option<Membership>> {
    self
      .read(move |conn| query_membership(conn, group_id, &user_id))
      .await
  }

  async fn list_members(&self, group_id: Uuid) -> Result<Vec<Membership>> {
    self.read(move |conn| query_members(conn, group_id)).await
  }

  async fn remove_member(&self, group_id: Uuid, user_id: UserId) -> Result<Membership> {
    self
      .write(move |tx| {
        require_group(tx, group_id)?;
        let members = query_members(tx, group_id)?;
        let target = membership::check_removal(group_id, &members, &user_id)?.clone();
        tx.execute(
          "DELETE FROM memberships WHERE group_id = ?1 AND user_id = ?2",
          rusqlite::params![encode_uuid(group_id), user_id.as_str()],
        )?;
        Ok(target)
      })
      .await
  }

  async fn set_role(&self, group_id: Uuid, user_id: UserId, role: Role) -> Result<Membership> {
    self
      .write(move |tx| {
        require_group(tx, group_id)?;
        let mut m = query_membership(tx, group_id, &user_id)?.ok_or_else(|| {
          drinkr_core::Error::MemberNotFound {
            group_id,
            user_id: user_id.clone(),
          }
        })?;

        // Demoting the only admin would leave the group without one.
        if m.is_admin() && role != Role::Admin {
          let members = query_members(tx, group_id)?;
          let admins = members.iter().filter(|other| other.is_admin()).count();
          if admins == 1 {
            return Err(drinkr_core::Error::LastAdmin(group_id).into());
          }
        }

        tx.execute(
          "UPDATE memberships SET role = ?3 WHERE group_id = ?1 AND user_id = ?2",
          rusqlite::params![encode_uuid(group_id), user_id.as_str(), encode_role(role)],
        )?;
        m.role = role;
        Ok(m)
      })
      .await
  }

  // ── Events (append-only) ──────────────────────────────────────────────────

  async fn append_event(&self, new: NewDrinkEvent, retention: Duration) -> Result<AppendOutcome> {
    self
      .write(move |tx| {
        let group_id = new.group_id;
        let group_str = encode_uuid(group_id);
        let now = truncate_dt(Utc::now());

        require_group(tx, group_id)?;
        if query_membership(tx, group_id, &new.user_id)?.is_none() {
          return Err(
            drinkr_core::Error::Forbidden(format!(
              "{} is not a member of group {group_id}",
              new.user_id
            ))
            .into(),
          );
        }

        if let Some(token) = &new.idempotency_token {
          tx.execute(
            "DELETE FROM idempotency_keys WHERE group_id = ?1 AND created_at < ?2",
            rusqlite::params![group_str, encode_dt(retention_cutoff(now, retention))],
          )?;
          let prior: Option<i64> = tx
            .query_row(
              "SELECT event_id FROM idempotency_keys
               WHERE group_id = ?1 AND user_id = ?2 AND token = ?3",
              rusqlite::params![group_str, new.user_id.as_str(), token],
              |row| row.get(0),
            )
            .optional()?;
          if let Some(event_id) = prior {
            let event = query_event(tx, event_id)?.ok_or_else(|| {
              Error::Decode(format!("idempotency key points at missing event {event_id}"))
            })?;
            return Ok(AppendOutcome::Duplicate(event));
          }
        }

        let last: Option<(i64, String)> = tx
          .query_row(
            "SELECT seq, recorded_at FROM events
             WHERE group_id = ?1
             ORDER BY seq DESC
             LIMIT 1",
            rusqlite::params![group_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;

        // recorded_at is strictly increasing within a group, even if the
        // wall clock steps backwards. One microsecond is the column's
        // precision.
        let (seq, recorded_at) = match last {
          Some((seq, at)) => (
            decode_count(seq, "seq")? + 1,
            now.max(decode_dt(&at)? + chrono::Duration::microseconds(1)),
          ),
          None => (1, now),
        };

        let mut event = DrinkEvent {
          event_id: EventId(0),
          seq,
          group_id,
          user_id: new.user_id,
          kind: new.kind,
          points: new.kind.points(),
          occurred_at: truncate_dt(new.occurred_at),
          recorded_at,
        };

        tx.execute(
          "INSERT INTO events (
             group_id, seq, user_id, kind, points, occurred_at, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            group_str,
            seq as i64,
            event.user_id.as_str(),
            encode_kind(event.kind),
            i64::from(event.points),
            encode_dt(event.occurred_at),
            encode_dt(event.recorded_at),
          ],
        )?;
        event.event_id = EventId(tx.last_insert_rowid());

        if let Some(token) = &new.idempotency_token {
          tx.execute(
            "INSERT INTO idempotency_keys (group_id, user_id, token, event_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
              group_str,
              event.user_id.as_str(),
              token,
              event.event_id.0,
              encode_dt(now),
            ],
          )?;
        }

        Ok(AppendOutcome::Appended(event))
      })
      .await
  }

  async fn list_events(
    &self,
    group_id: Uuid,
    after:    Option<EventId>,
    limit:    usize,
  ) -> Result<Vec<DrinkEvent>> {
    self
      .read(move |conn| {
        require_group(conn, group_id)?;
        let group_str = encode_uuid(group_id);

        if let Some(cursor) = after {
          let known = conn
            .query_row(
              "SELECT 1 FROM events WHERE event_id = ?1 AND group_id = ?2",
              rusqlite::params![cursor.0, group_str],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if !known {
            return Err(
              drinkr_core::Error::EventNotFound {
                group_id,
                event_id: cursor,
              }
              .into(),
            );
          }
        }

        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM events
           WHERE group_id = ?1 AND event_id > ?2
           ORDER BY event_id
           LIMIT ?3"
        ))?;
        let raws = stmt
          .query_map(
            rusqlite::params![
              group_str,
              after.map_or(0, |e| e.0),
              i64::try_from(limit).unwrap_or(i64::MAX),
            ],
            RawEvent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawEvent::into_event).collect()
      })
      .await
  }

  async fn head_seq(&self, group_id: Uuid) -> Result<u64> {
    self
      .read(move |conn| {
        let seq: i64 = conn.query_row(
          "SELECT COALESCE(MAX(seq), 0) FROM events WHERE group_id = ?1",
          rusqlite::params![encode_uuid(group_id)],
          |row| row.get(0),
        )?;
        decode_count(seq, "seq")
      })
      .await
  }

  // ── Score checkpoints ─────────────────────────────────────────────────────

  async fn load_checkpoint(&self, group_id: Uuid) -> Result<GroupCheckpoint> {
    self
      .read(move |conn| {
        let group_str = encode_uuid(group_id);
        let applied: Option<i64> = conn
          .query_row(
            "SELECT applied_seq FROM group_checkpoints WHERE group_id = ?1",
            rusqlite::params![group_str],
            |row| row.get(0),
          )
          .optional()?;
        let Some(applied) = applied else {
          return Ok(GroupCheckpoint {
            group_id,
            ..GroupCheckpoint::default()
          });
        };

        let mut stmt = conn.prepare(
          "SELECT user_id, total, watermark, last_recorded_at
           FROM score_checkpoints
           WHERE group_id = ?1
           ORDER BY user_id",
        )?;
        let raws = stmt
          .query_map(rusqlite::params![group_str], RawScore::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(GroupCheckpoint {
          group_id,
          applied_seq: decode_count(applied, "applied_seq")?,
          members: raws.into_iter().map(RawScore::into_score).collect::<Result<_>>()?,
        })
      })
      .await
  }

  async fn save_checkpoint(&self, checkpoint: GroupCheckpoint) -> Result<()> {
    self
      .write(move |tx| {
        let group_str = encode_uuid(checkpoint.group_id);
        let stored: Option<i64> = tx
          .query_row(
            "SELECT applied_seq FROM group_checkpoints WHERE group_id = ?1",
            rusqlite::params![group_str],
            |row| row.get(0),
          )
          .optional()?;
        if stored.is_some_and(|s| s > checkpoint.applied_seq as i64) {
          return Ok(());
        }

        tx.execute(
          "INSERT INTO group_checkpoints (group_id, applied_seq, saved_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (group_id) DO UPDATE
             SET applied_seq = excluded.applied_seq,
                 saved_at    = excluded.saved_at",
          rusqlite::params![
            group_str,
            checkpoint.applied_seq as i64,
            encode_dt(Utc::now()),
          ],
        )?;
        tx.execute(
          "DELETE FROM score_checkpoints WHERE group_id = ?1",
          rusqlite::params![group_str],
        )?;

        let mut insert = tx.prepare(
          "INSERT INTO score_checkpoints
             (group_id, user_id, total, watermark, last_recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for m in &checkpoint.members {
          insert.execute(rusqlite::params![
            group_str,
            m.user_id.as_str(),
            m.total as i64,
            m.watermark.map(|w| w.0),
            m.last_recorded_at.map(encode_dt),
          ])?;
        }
        Ok(())
      })
      .await
  }

  async fn list_group_ids(&self) -> Result<Vec<Uuid>> {
    self
      .read(|conn| {
        let mut stmt = conn.prepare("SELECT group_id FROM groups ORDER BY created_at, rowid")?;
        let ids = stmt
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        ids.iter().map(|s| decode_uuid(s)).collect()
      })
      .await
  }
}
