//! SQLite backend for the Drinkr scoring engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write is a single immediate
//! transaction, which is what makes membership checks, `seq` assignment and
//! idempotency lookups atomic with the rows they guard.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
