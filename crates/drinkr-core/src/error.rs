//! Error types for `drinkr-core`.
//!
//! [`Error`] is the engine-wide taxonomy. Storage backends convert their own
//! errors into it so the engine can decide what is retryable and the API can
//! decide which status code to send.

use strum::{AsRefStr, Display, IntoStaticStr};
use thiserror::Error;
use uuid::Uuid;

use crate::{event::EventId, user::UserId};

#[derive(Debug, Error)]
pub enum Error {
  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("group not found: {0}")]
  GroupNotFound(Uuid),

  #[error("invite code not found: {0:?}")]
  InviteCodeNotFound(String),

  #[error("user {user_id} is not a member of group {group_id}")]
  MemberNotFound { group_id: Uuid, user_id: UserId },

  #[error("event {event_id} not found in group {group_id}")]
  EventNotFound { group_id: Uuid, event_id: EventId },

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("group {0} must keep at least one admin")]
  LastAdmin(Uuid),

  #[error("already a member of group {group_id}")]
  AlreadyMember { group_id: Uuid },

  #[error("invalid input: {0}")]
  Invalid(String),

  #[error("storage unavailable: {0}")]
  Unavailable(String),

  #[error("internal error: {0}")]
  Internal(String),
}

/// Coarse classification of an [`Error`], used for retry decisions and for
/// the `kind` field of API error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  Forbidden,
  NotFound,
  Conflict,
  LastAdmin,
  AlreadyMember,
  Invalid,
  Unavailable,
  Internal,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Forbidden(_) => ErrorKind::Forbidden,
      Self::GroupNotFound(_)
      | Self::InviteCodeNotFound(_)
      | Self::MemberNotFound { .. }
      | Self::EventNotFound { .. } => ErrorKind::NotFound,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::LastAdmin(_) => ErrorKind::LastAdmin,
      Self::AlreadyMember { .. } => ErrorKind::AlreadyMember,
      Self::Invalid(_) => ErrorKind::Invalid,
      Self::Unavailable(_) => ErrorKind::Unavailable,
      Self::Internal(_) => ErrorKind::Internal,
    }
  }

  /// Only transient storage failures are worth retrying; everything else is
  /// deterministic and goes straight back to the caller.
  pub fn is_retryable(&self) -> bool { self.kind() == ErrorKind::Unavailable }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
