//! Route modules organized by bounded context.

use axum::Router;
use budget_core::repository::StoredEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::state::AppState;

pub mod budget_plans;
pub mod envelopes;
pub mod health;
pub mod users;

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The aggregate the command changed.
    pub aggregate_id: Uuid,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
    /// Stream version after the command.
    pub version: Option<i64>,
}

impl CommandResponse {
    /// Builds the response from the events a handler stored.
    #[must_use]
    pub fn new(aggregate_id: Uuid, stored_events: &[StoredEvent]) -> Self {
        Self {
            aggregate_id,
            event_ids: stored_events.iter().map(|e| e.event_id).collect(),
            version: stored_events.last().map(|e| e.stream_version),
        }
    }
}

/// Query string of point-in-time reads.
#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    /// RFC 3339 timestamp; the current state when omitted.
    pub as_of: Option<DateTime<Utc>>,
}

/// Builds the full application router.
pub fn app(state: AppState) -> Router {
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    Router::new()
        .merge(health::router())
        .nest("/api/v1/budget-plans", budget_plans::router())
        .nest("/api/v1/envelopes", envelopes::router())
        .nest("/api/v1/users", users::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
