//! Integration tests for the User bounded context.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use budget_core::projection::ReadModelRepository;
use budget_test_support::FailingPublisher;
use uuid::Uuid;

fn sign_up_body(user_id: Uuid, email: &str) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id,
        "email": email,
        "firstname": "Katherine",
        "lastname": "Johnson",
        "password_hash": "$argon2id$stub",
        "consent_accepted": true,
        "language_preference": "en"
    })
}

#[tokio::test]
async fn test_sign_up_then_get_own_profile() {
    // Arrange
    let app = common::build_test_app().await;
    let mut notifications = app.read_models.notifications.subscribe();
    let user_id = Uuid::new_v4();

    // Act
    let (status, json) = common::post_json(
        &app.router,
        "/api/v1/users/sign-up",
        None,
        &sign_up_body(user_id, "katherine@example.com"),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["aggregate_id"], user_id.to_string());

    let (status, json) =
        common::get_json(&app.router, &format!("/api/v1/users/{user_id}"), Some(user_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["email"], "katherine@example.com");
    assert_eq!(json["firstname"], "Katherine");
    assert!(json.get("password_hash").is_none());

    let notification = notifications.try_recv().unwrap();
    assert_eq!(notification.user_id, user_id);
    assert_eq!(notification.event_type, "user.signed_up");

    let raw = app.store.raw_stream(user_id);
    assert_ne!(raw[0].payload["email"], "katherine@example.com");
}

#[tokio::test]
async fn test_duplicate_email_is_409() {
    let app = common::build_test_app().await;
    common::post_json(
        &app.router,
        "/api/v1/users/sign-up",
        None,
        &sign_up_body(Uuid::new_v4(), "dup@example.com"),
    )
    .await;

    let (status, json) = common::post_json(
        &app.router,
        "/api/v1/users/sign-up",
        None,
        &sign_up_body(Uuid::new_v4(), "DUP@example.com"),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "already_exists");
}

#[tokio::test]
async fn test_sign_up_without_consent_is_400() {
    let app = common::build_test_app().await;
    let mut body = sign_up_body(Uuid::new_v4(), "nope@example.com");
    body["consent_accepted"] = serde_json::Value::Bool(false);

    let (status, json) = common::post_json(&app.router, "/api/v1/users/sign-up", None, &body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_reading_another_profile_is_403() {
    let app = common::build_test_app().await;
    let user_id = Uuid::new_v4();
    common::post_json(
        &app.router,
        "/api/v1/users/sign-up",
        None,
        &sign_up_body(user_id, "private@example.com"),
    )
    .await;

    let (status, json) = common::get_json(
        &app.router,
        &format!("/api/v1/users/{user_id}"),
        Some(Uuid::new_v4()),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "not_owner");
}

#[tokio::test]
async fn test_sign_up_with_lost_publish_is_recovered_by_catch_up() {
    // Arrange
    let app = common::build_test_app_with(|_| Arc::new(FailingPublisher)).await;
    let mut notifications = app.read_models.notifications.subscribe();
    let user_id = Uuid::new_v4();
    let (status, _) = common::post_json(
        &app.router,
        "/api/v1/users/sign-up",
        None,
        &sign_up_body(user_id, "mary@example.com"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.read_models.user_summaries.find_one(&user_id).await.unwrap().is_none());

    // Act
    let outcome = app.dispatcher.catch_up().await;

    // Assert
    assert!(outcome.is_clean());
    let summary = app.read_models.user_summaries.find_one(&user_id).await.unwrap().unwrap();
    assert_eq!(summary.email, "mary@example.com");
    assert_eq!(notifications.try_recv().unwrap().user_id, user_id);

    let (status, _) = common::post_json(
        &app.router,
        "/api/v1/users/sign-up",
        None,
        &sign_up_body(Uuid::new_v4(), "mary@example.com"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_restart_rebuilds_profiles_without_notifying_again() {
    // Arrange
    let app = common::build_test_app().await;
    let user_id = Uuid::new_v4();
    common::post_json(
        &app.router,
        "/api/v1/users/sign-up",
        None,
        &sign_up_body(user_id, "dorothy@example.com"),
    )
    .await;
    let restarted = common::restart(&app).await;
    let mut notifications = restarted.read_models.notifications.subscribe();

    // Act
    let outcome = restarted.dispatcher.catch_up().await;

    // Assert
    assert!(outcome.is_clean());
    let summary = restarted
        .read_models
        .user_summaries
        .find_one(&user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.email, "dorothy@example.com");
    assert!(notifications.try_recv().is_err());

    let (status, _) = common::post_json(
        &restarted.router,
        "/api/v1/users/sign-up",
        None,
        &sign_up_body(Uuid::new_v4(), "dorothy@example.com"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
