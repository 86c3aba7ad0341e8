//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use budget_core::clock::Clock;
use budget_core::publisher::EventPublisher;
use budget_projection::bus::InlinePublisher;
use budget_projection::dispatcher::ProjectionDispatcher;
use budget_test_support::{FixedClock, TestStore};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use budget_api::auth::USER_ID_HEADER;
use budget_api::routes;
use budget_api::state::{AppState, ReadModels};

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// A router over in-memory stores, plus handles to inspect them.
pub struct TestApp {
    pub router: Router,
    pub store: TestStore,
    pub read_models: ReadModels,
    pub dispatcher: Arc<ProjectionDispatcher>,
}

/// Build the full app router over in-memory stores. Projections run inline,
/// so read models are up to date when a request returns.
pub async fn build_test_app() -> TestApp {
    build_test_app_with(|dispatcher| Arc::new(InlinePublisher::new(dispatcher))).await
}

/// Build the app with the publisher returned by `publisher`; projections
/// then only move when it or the test catches them up.
pub async fn build_test_app_with<F>(publisher: F) -> TestApp
where
    F: FnOnce(Arc<ProjectionDispatcher>) -> Arc<dyn EventPublisher>,
{
    let store = TestStore::new();
    let read_models = ReadModels::new();
    let dispatcher = Arc::new(
        read_models
            .dispatcher(store.log.clone(), store.context.codec.clone())
            .unwrap(),
    );
    dispatcher.initialize().await.unwrap();
    let context = store.context_with_publisher(publisher(dispatcher.clone()));
    let app_state = AppState::new(context, fixed_clock(), read_models.clone()).unwrap();

    TestApp {
        router: routes::app(app_state),
        store,
        read_models,
        dispatcher,
    }
}

/// Fresh, still empty, read models over `app`'s log, as a restarted server
/// has them before its boot catch-up.
pub async fn restart(app: &TestApp) -> TestApp {
    let read_models = ReadModels::new();
    let dispatcher = Arc::new(
        read_models
            .dispatcher(app.store.log.clone(), app.store.context.codec.clone())
            .unwrap(),
    );
    dispatcher.initialize().await.unwrap();
    let context = app
        .store
        .context_with_publisher(Arc::new(InlinePublisher::new(dispatcher.clone())));
    let app_state = AppState::new(context, fixed_clock(), read_models.clone()).unwrap();

    TestApp {
        router: routes::app(app_state),
        store: app.store.clone(),
        read_models,
        dispatcher,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, json)
}

/// Send a POST request with a JSON body as `user_id` and return the response.
pub async fn post_json(
    app: &Router,
    uri: &str,
    user_id: Option<Uuid>,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header(USER_ID_HEADER, user_id.to_string());
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request as `user_id` and return the response.
pub async fn get_json(
    app: &Router,
    uri: &str,
    user_id: Option<Uuid>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header(USER_ID_HEADER, user_id.to_string());
    }
    let request = builder.body(Body::empty()).unwrap();

    send(app, request).await
}
