use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use hire_api::{AppStateInner, router};
use hire_chat::ChatService;
use hire_db::Database;
use hire_types::api::Claims;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "route-test-secret";
const BUNDLE: &str = "com.example.jobs";

fn app() -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.create_app("app-1", "Jobs", BUNDLE).unwrap();
    router(Arc::new(AppStateInner {
        chat: ChatService::new(db),
        jwt_secret: SECRET.into(),
    }))
}

fn token(sub: &str) -> String {
    let claims = Claims {
        sub: sub.into(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn call(app: &Router, method: &str, uri: &str, user: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(user)))
        .header("x-bundle-id", BUNDLE);
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };

    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn requests_need_a_valid_token_and_tenant() {
    let app = app();

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/chats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/chats")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .header("x-bundle-id", BUNDLE)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/chats")
                .header(header::AUTHORIZATION, format!("Bearer {}", token("seeker")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_round_trip_over_http() {
    let app = app();

    let (status, opened) = call(&app, "POST", "/chats", "seeker", Some(json!({ "receiver_id": "recruiter" }))).await;
    assert_eq!(status, StatusCode::OK);
    let chat_id = opened["chat_id"].as_str().unwrap().to_string();

    let (status, sent) = call(
        &app,
        "POST",
        &format!("/chats/{}/messages", chat_id),
        "seeker",
        Some(json!({ "body": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["body"], "hi");
    assert_eq!(sent["status"], "NORMAL");
    assert_eq!(sent["type"], "text");
    let message_id = sent["message_id"].as_str().unwrap().to_string();

    let (status, page) = call(&app, "GET", &format!("/chats/{}/messages?count=10", chat_id), "recruiter", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["messages"][0]["message_id"], message_id.as_str());
    assert_eq!(page["messages"][0]["is_mine"], false);
    assert_eq!(page["next"], "");

    let (status, chats) = call(&app, "GET", "/chats", "recruiter", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chats["chats"][0]["unread_count"], 1);

    let (status, _) = call(&app, "POST", &format!("/messages/{}/unsend", message_id), "recruiter", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "POST", &format!("/messages/{}/unsend", message_id), "seeker", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, page) = call(&app, "GET", &format!("/chats/{}/messages", chat_id), "recruiter", None).await;
    assert_eq!(page["messages"][0]["status"], "UNSENT");
    assert_eq!(page["messages"][0]["type"], "empty");
    assert!(page["messages"][0].get("body").is_none());

    let (status, _) = call(&app, "POST", &format!("/chats/{}/read", chat_id), "recruiter", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, chat) = call(&app, "GET", &format!("/chats/{}", chat_id), "recruiter", None).await;
    assert_eq!(chat["unread_count"], 0);
}

#[tokio::test]
async fn bad_requests_map_to_client_errors() {
    let app = app();

    let (status, _) = call(
        &app,
        "POST",
        "/chats",
        "seeker",
        Some(json!({ "receiver_id": "recruiter", "resume": { "name": "A" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, opened) = call(&app, "POST", "/chats", "seeker", Some(json!({ "receiver_id": "recruiter" }))).await;
    let chat_id = opened["chat_id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        "POST",
        &format!("/chats/{}/messages", chat_id),
        "seeker",
        Some(json!({ "body": "hi", "file_ids": ["f-1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", &format!("/chats/{}/messages?count=0", chat_id), "seeker", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", &format!("/chats/{}", chat_id), "mallory", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
