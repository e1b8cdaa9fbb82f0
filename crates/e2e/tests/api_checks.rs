//! User lookup, post creation and response-time checks against a local
//! stand-in for the placeholder API.

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use autosuite_e2e::api::{check_response_time, create_post, verify_username_exists};
use autosuite_e2e::{ApiClient, E2eError, FieldSet};

async fn list_users() -> Json<Value> {
    Json(json!([
        { "id": 1, "name": "Leanne Graham", "username": "Bret" },
        { "id": 3, "name": "Clementine Bauch", "username": "Samantha" }
    ]))
}

async fn list_posts() -> Json<Value> {
    Json(json!([{ "id": 1, "userId": 1, "title": "sunt aut facere", "body": "quia et suscipit" }]))
}

async fn slow_posts() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    list_posts().await
}

async fn echo_post(Json(mut post): Json<FieldSet>) -> (StatusCode, Json<FieldSet>) {
    post.insert("id".to_string(), json!(101));
    (StatusCode::CREATED, Json(post))
}

/// Echoes the post but drops the user id
async fn lossy_post(Json(mut post): Json<FieldSet>) -> (StatusCode, Json<FieldSet>) {
    post.remove("userId");
    post.insert("title".to_string(), json!("something else"));
    (StatusCode::CREATED, Json(post))
}

async fn serve(app: Router) -> ApiClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    ApiClient::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap()
}

fn placeholder() -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/posts", get(list_posts).post(echo_post))
}

#[tokio::test]
async fn known_username_is_found() {
    let client = serve(placeholder()).await;
    verify_username_exists(&client, "Samantha").await.unwrap();
}

#[tokio::test]
async fn unknown_username_fails_the_assertion() {
    let client = serve(placeholder()).await;
    let err = verify_username_exists(&client, "Nobody").await.unwrap_err();
    match err {
        E2eError::AssertionFailed(message) => assert!(message.contains("'Nobody'"), "{}", message),
        other => panic!("expected assertion failure, got {other}"),
    }
}

#[tokio::test]
async fn created_post_echoes_what_was_sent() {
    let client = serve(placeholder()).await;
    let created = create_post(&client).await.unwrap();
    assert_eq!(created["id"], 101);
    assert_eq!(created["title"], "My Test Post");
    assert_eq!(created["userId"], 3);
}

#[tokio::test]
async fn lossy_echo_lists_both_divergent_fields() {
    let client = serve(Router::new().route("/posts", axum::routing::post(lossy_post))).await;
    let err = create_post(&client).await.unwrap_err();
    match err {
        E2eError::VerificationMismatch { mismatches, .. } => {
            let fields: Vec<&str> = mismatches.iter().map(|m| m.field.as_str()).collect();
            assert_eq!(fields, vec!["title", "userId"]);
            assert_eq!(mismatches[1].actual, "missing");
        }
        other => panic!("expected verification mismatch, got {other}"),
    }
}

#[tokio::test]
async fn fast_listing_is_within_threshold() {
    let client = serve(placeholder()).await;
    let elapsed = check_response_time(&client, Duration::from_millis(2_000)).await.unwrap();
    assert!(elapsed < Duration::from_millis(2_000));
}

#[tokio::test]
async fn slow_listing_exceeds_threshold() {
    let client = serve(Router::new().route("/posts", get(slow_posts))).await;
    let err = check_response_time(&client, Duration::from_millis(100)).await.unwrap_err();
    match err {
        E2eError::AssertionFailed(message) => assert!(message.contains("exceeded threshold of 100ms"), "{}", message),
        other => panic!("expected assertion failure, got {other}"),
    }
}

#[tokio::test]
async fn missing_route_is_a_transport_failure() {
    let client = serve(Router::new()).await;
    let err = verify_username_exists(&client, "Samantha").await.unwrap_err();
    assert!(matches!(err, E2eError::TransportFailure { status: Some(404), .. }));
}
