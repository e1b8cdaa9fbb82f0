//! Single-request REST checks against the placeholder API

use std::time::Duration;

use serde_json::{json, Value};
use tracing::info;

use crate::error::{E2eError, E2eResult};
use crate::http::{ApiRequest, Transport};
use crate::snapshot::{FieldSet, Snapshot};

/// Post body sent by [`create_post`]
pub fn sample_post() -> FieldSet {
    match json!({
        "title": "My Test Post",
        "body": "This is a test post created via the API.",
        "userId": 3
    }) {
        Value::Object(map) => map,
        _ => FieldSet::new(),
    }
}

/// `GET /users` must list a user whose `username` is `username`
pub async fn verify_username_exists<T: Transport + ?Sized>(transport: &T, username: &str) -> E2eResult<()> {
    let request = ApiRequest::get("/users");
    let context = request.label();
    let response = transport.execute(request).await;
    response.require_success(&context)?;

    let users = response.json_array(&context)?;
    let found = users
        .iter()
        .any(|user| user.get("username").and_then(Value::as_str) == Some(username));

    if !found {
        return Err(E2eError::AssertionFailed(format!(
            "user with username '{}' was not found among {} users",
            username,
            users.len()
        )));
    }

    info!("A user with username '{}' was found", username);
    Ok(())
}

/// `POST /posts` must echo back the title, body and user id that were sent
pub async fn create_post<T: Transport + ?Sized>(transport: &T) -> E2eResult<FieldSet> {
    let post = sample_post();
    let request = ApiRequest::post("/posts", Value::Object(post.clone()));
    let context = request.label();
    let response = transport.execute(request).await;
    response.require_success(&context)?;

    let created = response.json_object(&context)?.clone();
    let mismatches = Snapshot::from_fields(&post).compare(&created);
    if !mismatches.is_empty() {
        return Err(E2eError::VerificationMismatch { context, mismatches });
    }

    info!(
        "Successfully created a new post: {}",
        created.get("title").and_then(serde_json::Value::as_str).unwrap_or_default()
    );
    Ok(created)
}

/// `GET /posts` must answer successfully within `threshold`
pub async fn check_response_time<T: Transport + ?Sized>(transport: &T, threshold: Duration) -> E2eResult<Duration> {
    let request = ApiRequest::get("/posts");
    let context = request.label();
    let response = transport.execute(request).await;
    let elapsed = response.elapsed;

    if elapsed > threshold {
        return Err(E2eError::AssertionFailed(format!(
            "{}: response time {}ms exceeded threshold of {}ms",
            context,
            elapsed.as_millis(),
            threshold.as_millis()
        )));
    }
    response.require_success(&context)?;

    info!(
        "Response time of {}ms did not exceed the threshold of {}ms",
        elapsed.as_millis(),
        threshold.as_millis()
    );
    Ok(elapsed)
}
