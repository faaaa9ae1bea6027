//! Connection CRUD through the full router.

mod test_utils;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use rolodink::error::{ApiError, RepositoryError};
use rolodink::models::connection;
use rolodink::repositories::connection::NewConnection;
use rolodink::repositories::ConnectionRepository;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use test_utils::{FakeAuthProvider, TestApp};
use uuid::Uuid;

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

async fn app() -> TestApp {
    TestApp::new(
        FakeAuthProvider::default()
            .with_user(ALICE, Uuid::new_v4(), "alice@example.com")
            .with_user(BOB, Uuid::new_v4(), "bob@example.com"),
    )
    .await
    .unwrap()
}

async fn create(app: &TestApp, token: &str, name: &str, url: &str) -> serde_json::Value {
    let response = app
        .call(
            Method::POST,
            "/api/connections",
            Some(token),
            Some(json!({ "name": name, "url": url, "meetingPlace": "RustConf" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    response.body
}

#[tokio::test]
async fn requires_authentication() {
    let app = app().await;

    let response = app.call(Method::GET, "/api/connections", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "UNAUTHORIZED");

    let response = app
        .call(Method::GET, "/api/connections", Some("forged"), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_sanitizes_name_and_normalizes_url() {
    let app = app().await;

    let body = create(
        &app,
        ALICE,
        "(2) Jane\u{a0}Doe (1)",
        "https://www.linkedin.com/in/jane-doe/?miniProfileUrn=abc#experience",
    )
    .await;

    assert_eq!(body["name"], "Jane Doe");
    assert_eq!(body["linkedInUrl"], "https://www.linkedin.com/in/jane-doe");
    assert_eq!(body["meetingPlace"], "RustConf");
    assert!(body["notes"].is_null());

    let found = app
        .call(
            Method::GET,
            "/api/connections?url=https%3A%2F%2Fwww.linkedin.com%2Fin%2Fjane-doe%2F",
            Some(ALICE),
            None,
        )
        .await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body["id"], body["id"]);
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let app = app().await;
    let url = "https://www.linkedin.com/in/jane-doe";

    create(&app, ALICE, "Jane Doe", url).await;
    let response = app
        .call(
            Method::POST,
            "/api/connections",
            Some(ALICE),
            Some(json!({ "name": "Jane", "url": format!("{url}/") })),
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["message"], "Connection already exists");

    // A different user may save the same profile.
    create(&app, BOB, "Jane Doe", url).await;
}

#[tokio::test]
async fn create_validates_fields() {
    let app = app().await;

    let response = app
        .call(
            Method::POST,
            "/api/connections",
            Some(ALICE),
            Some(json!({ "name": "", "url": "https://example.com/jane" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "VALIDATION_FAILED");
    assert!(response.body["details"]["name"].is_string());
    assert!(response.body["details"]["url"].is_string());

    let response = app
        .call(Method::POST, "/api/connections", Some(ALICE), Some(json!("nope")))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lookup_and_list_are_scoped_to_the_caller() {
    let app = app().await;
    create(&app, ALICE, "Jane Doe", "https://www.linkedin.com/in/jane").await;
    create(&app, ALICE, "John Roe", "https://www.linkedin.com/in/john").await;
    create(&app, BOB, "Mary Major", "https://www.linkedin.com/in/mary").await;

    let response = app
        .call(Method::GET, "/api/connections", Some(ALICE), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let names: Vec<&str> = response
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(!names.contains(&"Mary Major"));

    let response = app
        .call(
            Method::GET,
            "/api/connections?url=https://www.linkedin.com/in/mary",
            Some(ALICE),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "Connection not found");
}

#[tokio::test]
async fn patch_updates_and_clears_fields() {
    let app = app().await;
    let created = create(&app, ALICE, "Jane Doe", "https://www.linkedin.com/in/jane").await;

    let response = app
        .call(
            Method::PATCH,
            "/api/connections",
            Some(ALICE),
            Some(json!({
                "id": created["id"],
                "name": "(5) Jane Q. Doe",
                "meetingPlace": "",
                "notes": "Talked about async traits"
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["name"], "Jane Q. Doe");
    assert!(response.body["meetingPlace"].is_null());
    assert_eq!(response.body["notes"], "Talked about async traits");
    assert_eq!(response.body["linkedInUrl"], created["linkedInUrl"]);
}

#[tokio::test]
async fn cross_user_patch_and_delete_are_not_found() {
    let app = app().await;
    let created = create(&app, ALICE, "Jane Doe", "https://www.linkedin.com/in/jane").await;
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .call(
            Method::PATCH,
            "/api/connections",
            Some(BOB),
            Some(json!({ "id": id, "notes": "mine now" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "Connection not found");

    let response = app
        .call(Method::DELETE, &format!("/api/connections/{id}"), Some(BOB), None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .call(Method::GET, "/api/connections", Some(ALICE), None)
        .await;
    assert_eq!(response.body.as_array().unwrap().len(), 1);
    assert!(response.body[0]["notes"].is_null());
}

#[tokio::test]
async fn malformed_ids_are_not_found_on_patch_and_delete() {
    let app = app().await;
    create(&app, ALICE, "Jane Doe", "https://www.linkedin.com/in/jane").await;

    let response = app
        .call(
            Method::PATCH,
            "/api/connections",
            Some(ALICE),
            Some(json!({ "id": "not-a-uuid", "notes": "hello" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "Connection not found");

    let response = app
        .call(Method::DELETE, "/api/connections/not-a-uuid", Some(ALICE), None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "Connection not found");
}

#[tokio::test]
async fn delete_removes_the_connection() {
    let app = app().await;
    let created = create(&app, ALICE, "Jane Doe", "https://www.linkedin.com/in/jane").await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .call(Method::DELETE, &format!("/api/connections/{id}"), Some(ALICE), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "success": true }));

    let response = app
        .call(Method::DELETE, &format!("/api/connections/{id}"), Some(ALICE), None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .call(Method::DELETE, "/api/connections/not-a-uuid", Some(ALICE), None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn clean_names_rewrites_legacy_rows() {
    let app = app().await;
    let created = create(&app, ALICE, "Jane Doe", "https://www.linkedin.com/in/jane").await;
    create(&app, ALICE, "John Roe", "https://www.linkedin.com/in/john").await;

    // Rows saved before the sanitizer existed.
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();
    connection::Entity::update_many()
        .col_expr(connection::Column::Name, Expr::value("(3) Jane Doe (1)"))
        .filter(connection::Column::Id.eq(id))
        .exec(&*app.db)
        .await
        .unwrap();

    let response = app
        .call(Method::POST, "/api/connections/clean-names", Some(ALICE), None)
        .await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["total"], 2);
    assert_eq!(response.body["updated"], 1);
    assert_eq!(response.body["unchanged"], 1);
    assert_eq!(response.body["changes"][0]["before"], "(3) Jane Doe (1)");
    assert_eq!(response.body["changes"][0]["after"], "Jane Doe");
}

#[tokio::test]
async fn unique_index_rejects_duplicates_past_the_existence_check() {
    let app = app().await;
    let url = "https://www.linkedin.com/in/jane-doe";
    create(&app, ALICE, "Jane Doe", url).await;

    let existing = connection::Entity::find()
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let now = Utc::now().fixed_offset();
    let duplicate = connection::ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_id: Set(existing.owner_id),
        name: Set("Jane again".to_string()),
        linkedin_url: Set(existing.linkedin_url.clone()),
        meeting_place: Set(None),
        user_company_at_the_time: Set(None),
        notes: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let err = RepositoryError::from(duplicate.insert(&*app.db).await.unwrap_err());
    assert!(matches!(err, RepositoryError::Conflict(_)), "{err:?}");
    assert_eq!(ApiError::from(err).status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_for_unknown_owner_is_a_missing_reference() {
    let app = app().await;
    let repo = ConnectionRepository::new(app.db.clone());

    let err = repo
        .create(NewConnection {
            owner_id: Uuid::new_v4(),
            name: "Jane Doe".to_string(),
            linkedin_url: "https://www.linkedin.com/in/jane-doe".to_string(),
            meeting_place: None,
            user_company_at_the_time: None,
            notes: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::MissingReference), "{err:?}");
    let api_error = ApiError::from(err);
    assert_eq!(api_error.status, StatusCode::BAD_REQUEST);
    assert_eq!(&*api_error.code, "VALIDATION_FAILED");
}
