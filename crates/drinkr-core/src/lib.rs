//! Domain model of the Drinkr scoring engine.
//!
//! Events, groups, memberships and the pure rules over them (ranking, history
//! bucketing, the last-admin check), plus the [`store::GroupStore`] trait that
//! storage backends implement. No HTTP, no database.

pub mod error;
pub mod event;
pub mod group;
pub mod history;
pub mod leaderboard;
pub mod membership;
pub mod score;
pub mod store;
pub mod sync;
pub mod user;

pub use error::{Error, ErrorKind, Result};
