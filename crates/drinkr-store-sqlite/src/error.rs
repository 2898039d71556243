//! Error type for `drinkr-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain rule rejected the operation (not a member, last admin, ...).
  #[error(transparent)]
  Core(#[from] drinkr_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value the domain types cannot represent.
  #[error("decode error: {0}")]
  Decode(String),
}

impl Error {
  /// Busy/locked databases and a closed connection thread are worth
  /// retrying; anything else will fail the same way again.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Database(tokio_rusqlite::Error::ConnectionClosed) => true,
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
      ),
      _ => false,
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Self::Database(e.into()) }
}

impl From<Error> for drinkr_core::Error {
  fn from(e: Error) -> Self {
    if e.is_transient() {
      return Self::Unavailable(e.to_string());
    }
    match e {
      Error::Core(inner) => inner,
      other => Self::Internal(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use rusqlite::ffi;
  use uuid::Uuid;

  use super::*;

  fn sqlite_failure(code: i32) -> Error {
    rusqlite::Error::SqliteFailure(ffi::Error::new(code), None).into()
  }

  #[test]
  fn busy_and_locked_databases_are_unavailable() {
    for code in [ffi::SQLITE_BUSY, ffi::SQLITE_LOCKED] {
      let err = sqlite_failure(code);
      assert!(err.is_transient(), "{err}");
      assert!(matches!(drinkr_core::Error::from(err), drinkr_core::Error::Unavailable(_)));
    }
  }

  #[test]
  fn closed_connection_is_unavailable() {
    let err = Error::Database(tokio_rusqlite::Error::ConnectionClosed);
    assert!(matches!(drinkr_core::Error::from(err), drinkr_core::Error::Unavailable(_)));
  }

  #[test]
  fn constraint_violation_is_internal() {
    let err = sqlite_failure(ffi::SQLITE_CONSTRAINT);
    assert!(!err.is_transient());
    let core = drinkr_core::Error::from(err);
    assert!(matches!(core, drinkr_core::Error::Internal(_)), "{core}");
    assert!(!core.is_retryable());
  }

  #[test]
  fn domain_errors_pass_through() {
    let err = Error::Core(drinkr_core::Error::LastAdmin(Uuid::nil()));
    assert!(matches!(drinkr_core::Error::from(err), drinkr_core::Error::LastAdmin(_)));

    let err = Error::Decode("bad row".into());
    assert!(matches!(drinkr_core::Error::from(err), drinkr_core::Error::Internal(_)));
  }
}
