//! Groups, memberships and invite codes.

use std::fmt;

use chrono::{DateTime, Utc};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, user::UserId};

/// Longest group name accepted, in characters, after trimming.
pub const MAX_GROUP_NAME_LEN: usize = 64;

// ─── Group ───────────────────────────────────────────────────────────────────

/// A set of users competing on a shared leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub group_id:    Uuid,
  pub name:        String,
  pub invite_code: InviteCode,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::GroupStore::create_group`].
#[derive(Debug, Clone)]
pub struct NewGroup {
  pub name:         String,
  pub invite_code:  InviteCode,
  pub creator:      UserId,
  pub creator_name: Option<String>,
}

/// Trim a proposed group name and check it is non-empty and not too long.
pub fn validate_group_name(name: &str) -> Result<String> {
  let name = name.trim();
  if name.is_empty() {
    return Err(Error::Invalid("group name must not be empty".into()));
  }
  if name.chars().count() > MAX_GROUP_NAME_LEN {
    return Err(Error::Invalid(format!(
      "group name must be at most {MAX_GROUP_NAME_LEN} characters"
    )));
  }
  Ok(name.to_owned())
}

// ─── Membership ──────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Admin,
  Member,
}

/// A user's place in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
  pub group_id:     Uuid,
  pub user_id:      UserId,
  pub role:         Role,
  /// Name shown on the leaderboard; captured from the identity provider at
  /// join time.
  pub display_name: Option<String>,
  pub joined_at:    DateTime<Utc>,
}

impl Membership {
  pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

// ─── Invite codes ────────────────────────────────────────────────────────────

/// Upper-case letters and digits without the easily confused `0 O 1 I`.
/// Exactly 32 symbols, so a random byte masked to five bits is unbiased.
const INVITE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const INVITE_CODE_LEN: usize = 8;

/// A human-shareable token that lets a user join a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteCode(String);

impl InviteCode {
  /// Draw a fresh code from `rng`.
  pub fn generate(rng: &mut impl RngCore) -> Self {
    let mut bytes = [0u8; INVITE_CODE_LEN];
    rng.fill_bytes(&mut bytes);
    let code = bytes
      .iter()
      .map(|b| INVITE_ALPHABET[(b & 0x1f) as usize] as char)
      .collect();
    Self(code)
  }

  /// Normalise user input (surrounding whitespace, lower case) into a code.
  ///
  /// Returns `None` if the input cannot be a code this engine issued.
  pub fn parse(input: &str) -> Option<Self> {
    let code = input.trim().to_ascii_uppercase();
    let well_formed = code.len() == INVITE_CODE_LEN
      && code.bytes().all(|b| INVITE_ALPHABET.contains(&b));
    well_formed.then_some(Self(code))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for InviteCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
