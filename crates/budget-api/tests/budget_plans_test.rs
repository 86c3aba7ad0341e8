//! Integration tests for the BudgetPlan bounded context.

mod common;

use axum::http::StatusCode;
use budget_core::projection::ReadModelRepository;
use uuid::Uuid;

fn generate_body(budget_plan_id: Uuid, date: &str) -> serde_json::Value {
    serde_json::json!({
        "budget_plan_id": budget_plan_id,
        "date": date,
        "currency": "EUR",
        "incomes": [{ "name": "Salary", "amount": "2000.00" }]
    })
}

#[tokio::test]
async fn test_generate_then_get_returns_split_plan() {
    // Arrange
    let app = common::build_test_app().await;
    let user_id = Uuid::new_v4();
    let plan_id = Uuid::new_v4();

    // Act
    let (status, json) = common::post_json(
        &app.router,
        "/api/v1/budget-plans/generate",
        Some(user_id),
        &generate_body(plan_id, "2026-01-20"),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["aggregate_id"], plan_id.to_string());
    assert_eq!(json["event_ids"].as_array().unwrap().len(), 1);
    assert_eq!(json["version"], 0);

    let (status, json) = common::get_json(
        &app.router,
        &format!("/api/v1/budget-plans/{plan_id}"),
        Some(user_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["date"], "2026-01-01");
    assert_eq!(json["total_incomes"], "2000.00");
    assert_eq!(json["total_allocated"], "2000.00");
    assert_eq!(json["needs"].as_array().unwrap().len(), 3);
    assert_eq!(json["version"], 0);

    let summary = app.read_models.plan_summaries.find_one(&plan_id).await.unwrap();
    assert!(summary.is_some());
}

#[tokio::test]
async fn test_second_plan_for_same_month_is_409() {
    let app = common::build_test_app().await;
    let user_id = Uuid::new_v4();
    common::post_json(
        &app.router,
        "/api/v1/budget-plans/generate",
        Some(user_id),
        &generate_body(Uuid::new_v4(), "2026-03-01"),
    )
    .await;

    let (status, json) = common::post_json(
        &app.router,
        "/api/v1/budget-plans/generate",
        Some(user_id),
        &generate_body(Uuid::new_v4(), "2026-03-31"),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "already_exists");
}

#[tokio::test]
async fn test_add_income_and_remove() {
    // Arrange
    let app = common::build_test_app().await;
    let user_id = Uuid::new_v4();
    let plan_id = Uuid::new_v4();
    common::post_json(
        &app.router,
        "/api/v1/budget-plans/generate",
        Some(user_id),
        &generate_body(plan_id, "2026-04-01"),
    )
    .await;

    // Act
    let (add_status, add_json) = common::post_json(
        &app.router,
        "/api/v1/budget-plans/add-income",
        Some(user_id),
        &serde_json::json!({
            "budget_plan_id": plan_id,
            "name": "Freelance",
            "amount": "150.25"
        }),
    )
    .await;
    let (remove_status, remove_json) = common::post_json(
        &app.router,
        "/api/v1/budget-plans/remove",
        Some(user_id),
        &serde_json::json!({ "budget_plan_id": plan_id }),
    )
    .await;

    // Assert
    assert_eq!(add_status, StatusCode::OK);
    assert_eq!(add_json["version"], 1);
    assert_eq!(remove_status, StatusCode::OK);
    assert_eq!(remove_json["version"], 2);
    let (status, json) = common::get_json(
        &app.router,
        &format!("/api/v1/budget-plans/{plan_id}"),
        Some(user_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], true);
    assert_eq!(json["incomes"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_get_as_of_before_generation_is_404() {
    let app = common::build_test_app().await;
    let user_id = Uuid::new_v4();
    let plan_id = Uuid::new_v4();
    common::post_json(
        &app.router,
        "/api/v1/budget-plans/generate",
        Some(user_id),
        &generate_body(plan_id, "2026-05-01"),
    )
    .await;

    let (status, json) = common::get_json(
        &app.router,
        &format!("/api/v1/budget-plans/{plan_id}?as_of=2026-01-15T09:00:00Z"),
        Some(user_id),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "aggregate_not_found");
}

#[tokio::test]
async fn test_foreign_plan_is_403_and_missing_user_is_401() {
    let app = common::build_test_app().await;
    let plan_id = Uuid::new_v4();
    common::post_json(
        &app.router,
        "/api/v1/budget-plans/generate",
        Some(Uuid::new_v4()),
        &generate_body(plan_id, "2026-06-01"),
    )
    .await;

    let (foreign, json) = common::get_json(
        &app.router,
        &format!("/api/v1/budget-plans/{plan_id}"),
        Some(Uuid::new_v4()),
    )
    .await;
    let (anonymous, _) =
        common::get_json(&app.router, &format!("/api/v1/budget-plans/{plan_id}"), None).await;

    assert_eq!(foreign, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "not_owner");
    assert_eq!(anonymous, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_generate_without_incomes_is_400() {
    let app = common::build_test_app().await;

    let (status, json) = common::post_json(
        &app.router,
        "/api/v1/budget-plans/generate",
        Some(Uuid::new_v4()),
        &serde_json::json!({
            "budget_plan_id": Uuid::new_v4(),
            "date": "2026-07-01",
            "currency": "EUR",
            "incomes": []
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_generate_with_missing_fields_is_422() {
    let app = common::build_test_app().await;

    let (status, _) = common::post_json(
        &app.router,
        "/api/v1/budget-plans/generate",
        Some(Uuid::new_v4()),
        &serde_json::json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
