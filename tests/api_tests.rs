use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

use watchlist_api::{create_router, middleware::USER_ID_HEADER, AppState};

struct TestApp {
    server: TestServer,
    media: TempDir,
}

fn create_test_app() -> TestApp {
    let media = tempfile::tempdir().unwrap();
    let state = AppState::in_memory(media.path(), 50);
    let app = create_router(state);
    TestApp {
        server: TestServer::new(app).unwrap(),
        media,
    }
}

fn as_user(request: TestRequest, user: Uuid) -> TestRequest {
    request.add_header(
        HeaderName::from_static(USER_ID_HEADER),
        HeaderValue::from_str(&user.to_string()).unwrap(),
    )
}

async fn add(server: &TestServer, user: Uuid, title: &str) -> Value {
    as_user(server.post("/api/v1/list"), user)
        .json(&json!({ "title": title }))
        .await
        .json()
}

fn titles_and_orders(list: &Value) -> Vec<(String, i64)> {
    list["films"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| {
            (
                f["title"].as_str().unwrap().to_string(),
                f["order"].as_i64().unwrap(),
            )
        })
        .collect()
}

fn entry_id(response: &Value) -> i64 {
    response["entry"]["entry_id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_requests_without_identity_are_unauthorized() {
    let app = create_test_app();
    let response = app.server.get("/api/v1/list").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_add_film_to_empty_list() {
    let app = create_test_app();
    let user = Uuid::new_v4();

    let response = as_user(app.server.post("/api/v1/list"), user)
        .json(&json!({ "title": "Alien" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["added"], true);
    assert_eq!(body["created"], true);
    assert_eq!(body["message"], "Added Alien to list");
    assert_eq!(body["entry"]["order"], 1);
    assert_eq!(titles_and_orders(&body), vec![("Alien".to_string(), 1)]);
}

#[tokio::test]
async fn test_add_same_film_twice_returns_existing_entry() {
    let app = create_test_app();
    let user = Uuid::new_v4();

    let first = add(&app.server, user, "Alien").await;
    let response = as_user(app.server.post("/api/v1/list"), user)
        .json(&json!({ "title": "Alien" }))
        .await;

    response.assert_status_ok();
    let second: Value = response.json();
    assert_eq!(second["added"], false);
    assert_eq!(entry_id(&first), entry_id(&second));
    assert_eq!(second["entry"]["order"], 1);
    assert_eq!(second["films"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_add_blank_title_is_bad_request() {
    let app = create_test_app();
    let response = as_user(app.server.post("/api/v1/list"), Uuid::new_v4())
        .json(&json!({ "title": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remove_closes_gap() {
    let app = create_test_app();
    let user = Uuid::new_v4();

    add(&app.server, user, "A").await;
    let b = add(&app.server, user, "B").await;
    add(&app.server, user, "C").await;

    let response = as_user(
        app.server
            .delete(&format!("/api/v1/list/entries/{}", entry_id(&b))),
        user,
    )
    .await;

    response.assert_status_ok();
    let list: Value = response.json();
    assert_eq!(
        titles_and_orders(&list),
        vec![("A".to_string(), 1), ("C".to_string(), 2)]
    );
}

#[tokio::test]
async fn test_remove_unknown_entry_is_not_found() {
    let app = create_test_app();
    let response = as_user(app.server.delete("/api/v1/list/entries/999"), Uuid::new_v4()).await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cross_user_access_is_forbidden() {
    let app = create_test_app();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let entry = add(&app.server, alice, "Heat").await;
    let path = format!("/api/v1/list/entries/{}", entry_id(&entry));

    as_user(app.server.delete(&path), bob)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    as_user(app.server.get(&path), bob)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let list: Value = as_user(app.server.get("/api/v1/list"), alice).await.json();
    assert_eq!(titles_and_orders(&list), vec![("Heat".to_string(), 1)]);
}

#[tokio::test]
async fn test_reorder_list() {
    let app = create_test_app();
    let user = Uuid::new_v4();

    let a = entry_id(&add(&app.server, user, "A").await);
    let b = entry_id(&add(&app.server, user, "B").await);
    let c = entry_id(&add(&app.server, user, "C").await);

    let response = as_user(app.server.post("/api/v1/list/order"), user)
        .json(&json!({ "entry_ids": [c, a, b] }))
        .await;

    response.assert_status_ok();
    let list: Value = response.json();
    assert_eq!(
        titles_and_orders(&list),
        vec![
            ("C".to_string(), 1),
            ("A".to_string(), 2),
            ("B".to_string(), 3)
        ]
    );

    let reread: Value = as_user(app.server.get("/api/v1/list"), user).await.json();
    assert_eq!(titles_and_orders(&reread), titles_and_orders(&list));
}

#[tokio::test]
async fn test_reorder_errors() {
    let app = create_test_app();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let a = entry_id(&add(&app.server, alice, "A").await);
    let foreign = entry_id(&add(&app.server, bob, "X").await);

    as_user(app.server.post("/api/v1/list/order"), alice)
        .json(&json!({ "entry_ids": [] }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    as_user(app.server.post("/api/v1/list/order"), alice)
        .json(&json!({ "entry_ids": [a, foreign] }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_search_excludes_listed_films() {
    let app = create_test_app();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    add(&app.server, bob, "Alien").await;
    add(&app.server, bob, "Aliens").await;
    add(&app.server, bob, "Heat").await;
    add(&app.server, alice, "Aliens").await;

    let response = as_user(app.server.get("/api/v1/films/search"), alice)
        .add_query_param("q", "ALI")
        .await;

    response.assert_status_ok();
    let films: Vec<Value> = response.json();
    let titles: Vec<&str> = films.iter().map(|f| f["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Alien"]);
}

#[tokio::test]
async fn test_clear_search_results() {
    let app = create_test_app();
    let response = as_user(app.server.delete("/api/v1/films/search"), Uuid::new_v4()).await;
    response.assert_status_ok();
    let films: Vec<Value> = response.json();
    assert!(films.is_empty());
}

#[tokio::test]
async fn test_upload_image_and_read_detail() {
    let app = create_test_app();
    let user = Uuid::new_v4();
    let id = entry_id(&add(&app.server, user, "Alien").await);

    let response = as_user(
        app.server
            .put(&format!("/api/v1/list/entries/{}/image", id)),
        user,
    )
    .add_query_param("filename", "poster.png")
    .bytes(b"fake-png".to_vec().into())
    .await;

    response.assert_status_ok();
    let listed: Value = response.json();
    let image = listed["image"].as_str().unwrap().to_string();
    assert!(image.starts_with("film_images/"));
    assert!(image.ends_with("_poster.png"));

    let stored = std::fs::read(app.media.path().join(&image)).unwrap();
    assert_eq!(stored, b"fake-png");

    let detail: Value = as_user(
        app.server.get(&format!("/api/v1/list/entries/{}", id)),
        user,
    )
    .await
    .json();
    assert_eq!(detail["title"], "Alien");
    assert_eq!(detail["image"], image.as_str());
}

#[tokio::test]
async fn test_upload_empty_image_is_bad_request() {
    let app = create_test_app();
    let user = Uuid::new_v4();
    let id = entry_id(&add(&app.server, user, "Alien").await);

    as_user(
        app.server
            .put(&format!("/api/v1/list/entries/{}/image", id)),
        user,
    )
    .add_query_param("filename", "poster.png")
    .await
    .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_response_carries_request_id() {
    let app = create_test_app();
    let response = app.server.get("/health").await;
    let header = response.header("x-request-id");
    assert!(Uuid::parse_str(header.to_str().unwrap()).is_ok());
}
