//! The Drinkr scoring engine.
//!
//! [`Engine`] ties a [`drinkr_core::store::GroupStore`] to the in-memory
//! pieces that sit in front of it: per-group write locks, the score
//! [`aggregator::Aggregator`], the [`hub::SyncHub`] that fans change
//! notifications out to connected clients, and retrying of transient storage
//! failures. Every public operation of the service is a method on [`Engine`].

pub mod aggregator;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod hub;
pub mod locks;
mod retry;

pub use config::{EngineConfig, RetryPolicy};
pub use cursor::EventCursor;
pub use engine::{Engine, HistoryQuery, Summary};
