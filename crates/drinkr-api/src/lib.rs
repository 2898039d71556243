//! JSON REST API for Drinkr.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`drinkr_core::store::GroupStore`]. Authentication, TLS and transport
//! concerns are the caller's responsibility; see [`identity`] for how the
//! caller's user id reaches the handlers.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", drinkr_api::api_router(engine.clone()))
//! ```

pub mod changes;
pub mod error;
pub mod events;
pub mod groups;
pub mod identity;
pub mod scores;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use drinkr_core::store::GroupStore;
use drinkr_engine::Engine;

pub use error::ApiError;
pub use identity::CurrentUser;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<Engine<S>>) -> Router<()>
where
  S: GroupStore + 'static,
{
  Router::new()
    // Groups and membership
    .route("/groups", get(groups::list::<S>).post(groups::create::<S>))
    .route("/join", post(groups::join::<S>))
    .route("/groups/{id}", get(groups::get_one::<S>))
    .route("/groups/{id}/leave", post(groups::leave::<S>))
    .route("/groups/{id}/members", get(groups::members::<S>))
    .route("/groups/{id}/members/{user_id}", delete(groups::remove::<S>))
    .route("/groups/{id}/members/{user_id}/promote", post(groups::promote::<S>))
    // Events
    .route("/groups/{id}/events", get(events::list::<S>).post(events::append::<S>))
    // Reads
    .route("/groups/{id}/scores/{user_id}", get(scores::score::<S>))
    .route("/groups/{id}/leaderboard", get(scores::leaderboard::<S>))
    .route("/groups/{id}/summary", get(scores::summary::<S>))
    .route("/groups/{id}/history", get(scores::history::<S>))
    // Sync
    .route("/groups/{id}/changes", get(changes::handler::<S>))
    .with_state(engine)
}

// ─── Integration tests ───────────────────────────────────────────────────────
