use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use connector::{
    app,
    config::{Config, LikeMode, StoreBackend},
    error::AppError,
    github::RepoLookup,
    memory::MemoryStore,
    middleware::AUTH_HEADER,
    state::AppState,
};
use serde_json::{Value, json};
use tower::ServiceExt;

struct StubRepos;

#[async_trait]
impl RepoLookup for StubRepos {
    async fn repos(&self, username: &str) -> Result<Value, AppError> {
        match username {
            "octocat" => Ok(json!([{ "name": "hello-world" }])),
            _ => Err(AppError::ExternalNotFound),
        }
    }
}

fn test_app() -> Router {
    let config = Config {
        port: 0,
        store_backend: StoreBackend::Memory,
        redis_url: String::new(),
        token_secret: "test-secret".into(),
        token_ttl_secs: 3600,
        hash_cost: 4,
        like_mode: LikeMode::FetchThenSave,
        github_api_url: String::new(),
        github_client_id: None,
        github_secret: None,
    };

    let state = AppState::with_parts(config, Arc::new(MemoryStore::new()), Arc::new(StubRepos)).unwrap();

    app(state)
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        request = request.header(AUTH_HEADER, token);
    }

    let request = match body {
        Some(body) => request
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, value)
}

async fn register(app: &Router, name: &str, email: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({ "name": name, "email": email, "password": "secret1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let app = test_app();

    let (status, body) = call(&app, Method::GET, "/api/auth", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "message": "Provide a token. Authorization Denied" }));
}

#[tokio::test]
async fn test_empty_token_counts_as_missing() {
    let app = test_app();

    let (status, body) = call(&app, Method::GET, "/api/auth", Some(""), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "message": "Provide a token. Authorization Denied" }));
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let app = test_app();

    let (status, body) = call(&app, Method::GET, "/api/posts", Some("not.a.token"), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "message": "Token is not valid" }));
}

#[tokio::test]
async fn test_register_login_and_current_user() {
    let app = test_app();
    register(&app, "Ada", "Ada@Example.com").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({ "name": "Other", "email": "ada@example.com", "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "errors": [{ "message": "User already exists" }] }));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "errors": [{ "message": "Invalid credentials" }] }));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth",
        None,
        Some(json!({ "email": "ada@example.com", "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::GET, "/api/auth", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ada");
    assert_eq!(body["email"], "ada@example.com");
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn test_invalid_registration_lists_fields() {
    let app = test_app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({ "name": "", "email": "nope", "password": "123" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let params: Vec<_> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|error| error["param"].as_str().unwrap())
        .collect();
    assert_eq!(params, vec!["email", "name", "password"]);
}

#[tokio::test]
async fn test_post_like_comment_and_delete() {
    let app = test_app();
    let alice = register(&app, "Alice", "alice@example.com").await;
    let bob = register(&app, "Bob", "bob@example.com").await;

    let (status, post) = call(&app, Method::POST, "/api/posts", Some(&alice), Some(json!({ "text": "hello" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["name"], "Alice");
    let post_id = post["_id"].as_str().unwrap().to_string();

    let like_uri = format!("/api/posts/like/{post_id}");
    let (status, likes) = call(&app, Method::PUT, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(likes.as_array().unwrap().len(), 1);

    let (status, body) = call(&app, Method::PUT, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "message": "Post already liked" }));

    let unlike_uri = format!("/api/posts/unlike/{post_id}");
    let (status, likes) = call(&app, Method::PUT, &unlike_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(likes, json!([]));

    let (status, body) = call(&app, Method::PUT, &unlike_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "message": "Post has not been liked" }));

    let comment_uri = format!("/api/posts/comment/{post_id}");
    let (status, comments) = call(&app, Method::POST, &comment_uri, Some(&bob), Some(json!({ "text": "nice" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comments[0]["name"], "Bob");
    let comment_id = comments[0]["_id"].as_str().unwrap().to_string();

    let remove_uri = format!("/api/posts/comment/{post_id}/{comment_id}");
    let (status, body) = call(&app, Method::DELETE, &remove_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "message": "User not authorized" }));

    let (status, comments) = call(&app, Method::DELETE, &remove_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comments, json!([]));

    let post_uri = format!("/api/posts/{post_id}");
    let (status, _) = call(&app, Method::DELETE, &post_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, Method::DELETE, &post_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Post removed" }));

    let (status, body) = call(&app, Method::GET, &post_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "message": "Post not found" }));
}

#[tokio::test]
async fn test_malformed_post_id_is_not_found() {
    let app = test_app();
    let token = register(&app, "Ada", "ada@example.com").await;

    let (status, body) = call(&app, Method::PUT, "/api/posts/like/not-an-id", Some(&token), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "message": "Post not found" }));
}

#[tokio::test]
async fn test_profile_experience_order_and_account_delete() {
    let app = test_app();
    let token = register(&app, "Ada", "ada@example.com").await;

    let (status, body) = call(&app, Method::GET, "/api/profile/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "message": "There is no profile for this user" }));

    let (status, profile) = call(
        &app,
        Method::POST,
        "/api/profile",
        Some(&token),
        Some(json!({ "status": "Developer", "skills": "rust, go" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["skills"], json!(["rust", "go"]));
    assert_eq!(profile["user"]["name"], "Ada");
    let user_id = profile["user"]["_id"].as_str().unwrap().to_string();

    for title in ["E1", "E2"] {
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/profile/experience",
            Some(&token),
            Some(json!({ "title": title, "company": "Acme", "from": "2020-01-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, profile) = call(&app, Method::GET, &format!("/api/profile/user/{user_id}"), None, None).await;
    let titles: Vec<_> = profile["experience"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["E2", "E1"]);

    let first_id = profile["experience"][0]["_id"].as_str().unwrap().to_string();
    let (status, profile) = call(
        &app,
        Method::DELETE,
        &format!("/api/profile/experience/{first_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["experience"].as_array().unwrap().len(), 1);
    assert_eq!(profile["experience"][0]["title"], "E1");

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/profile/education",
        Some(&token),
        Some(json!({ "school": "MIT", "degree": "BSc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].as_array().unwrap().len() >= 2);

    let (status, body) = call(&app, Method::DELETE, "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "User deleted" }));

    let (status, _) = call(&app, Method::GET, &format!("/api/profile/user/{user_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, profiles) = call(&app, Method::GET, "/api/profile", None, None).await;
    assert_eq!(profiles, json!([]));
}

#[tokio::test]
async fn test_github_repos() {
    let app = test_app();

    let (status, body) = call(&app, Method::GET, "/api/profile/github/octocat", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "hello-world");

    let (status, body) = call(&app, Method::GET, "/api/profile/github/nobody", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "message": "No Github profile found" }));
}
