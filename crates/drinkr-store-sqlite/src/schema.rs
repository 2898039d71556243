//! SQL schema for the Drinkr SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS groups (
    group_id    TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    invite_code TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memberships (
    group_id     TEXT NOT NULL REFERENCES groups(group_id),
    user_id      TEXT NOT NULL,
    role         TEXT NOT NULL,    -- 'admin' | 'member'
    display_name TEXT,
    joined_at    TEXT NOT NULL,
    PRIMARY KEY (group_id, user_id)
);

-- Events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS events (
    event_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id    TEXT    NOT NULL REFERENCES groups(group_id),
    seq         INTEGER NOT NULL,   -- 1-based position within the group
    user_id     TEXT    NOT NULL,
    kind        TEXT    NOT NULL,   -- 'beer' | 'wine' | 'shot' | 'other'
    points      INTEGER NOT NULL,
    occurred_at TEXT    NOT NULL,   -- client-reported
    recorded_at TEXT    NOT NULL,   -- server-assigned, strictly increasing per group
    UNIQUE (group_id, seq)
);

-- Retried submissions carry the same token; rows expire after the
-- configured retention window and are pruned on append.
CREATE TABLE IF NOT EXISTS idempotency_keys (
    group_id   TEXT    NOT NULL,
    user_id    TEXT    NOT NULL,
    token      TEXT    NOT NULL,
    event_id   INTEGER NOT NULL REFERENCES events(event_id),
    created_at TEXT    NOT NULL,
    PRIMARY KEY (group_id, user_id, token)
);

-- Durable aggregator state: every event with seq <= applied_seq is folded
-- into the score_checkpoints rows of the same group.
CREATE TABLE IF NOT EXISTS group_checkpoints (
    group_id    TEXT    PRIMARY KEY REFERENCES groups(group_id),
    applied_seq INTEGER NOT NULL,
    saved_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS score_checkpoints (
    group_id         TEXT    NOT NULL REFERENCES groups(group_id),
    user_id          TEXT    NOT NULL,
    total            INTEGER NOT NULL,
    watermark        INTEGER,
    last_recorded_at TEXT,
    PRIMARY KEY (group_id, user_id)
);

CREATE INDEX IF NOT EXISTS memberships_user_idx     ON memberships(user_id);
CREATE INDEX IF NOT EXISTS events_group_idx         ON events(group_id, event_id);
CREATE INDEX IF NOT EXISTS idempotency_created_idx  ON idempotency_keys(group_id, created_at);

PRAGMA user_version = 1;
";
