mod common;

use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use futures_util::StreamExt;
use serde_json::{json, Value};

use chat_api::broker::Broker;
use chat_api::db::store::ConversationStore;

#[tokio::test]
async fn create_direct_conversation() {
    let ctx = common::test_context().await;
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    let resp = server
        .post("/api/conversations")
        .add_header(AUTHORIZATION, common::bearer("usr_a"))
        .json(&json!({ "participants": ["usr_b"] }))
        .await;

    resp.assert_status(StatusCode::CREATED);
    let conv: Value = resp.json();
    let id = conv["id"].as_str().unwrap();
    assert!(id.starts_with("conv_"));
    assert_eq!(conv["is_group"], false);
    assert_eq!(conv["created_by"], "usr_a");
    assert!(ctx.store.is_participant(id, "usr_a").await.unwrap());
    assert!(ctx.store.is_participant(id, "usr_b").await.unwrap());

    let resp = server
        .get("/api/conversations")
        .add_header(AUTHORIZATION, common::bearer("usr_b"))
        .await;
    resp.assert_status_ok();
    let listed: Vec<Value> = resp.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], id);
}

#[tokio::test]
async fn direct_conversation_rules() {
    let ctx = common::test_context().await;
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();
    let auth = common::bearer("usr_a");

    let resp = server
        .post("/api/conversations")
        .add_header(AUTHORIZATION, auth.clone())
        .json(&json!({ "participants": ["usr_b", "usr_c"] }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = server
        .post("/api/conversations")
        .add_header(AUTHORIZATION, auth.clone())
        .json(&json!({ "participants": [] }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    server
        .post("/api/conversations")
        .add_header(AUTHORIZATION, auth.clone())
        .json(&json!({ "participants": ["usr_b"] }))
        .await
        .assert_status(StatusCode::CREATED);

    let resp = server
        .post("/api/conversations")
        .add_header(AUTHORIZATION, common::bearer("usr_b"))
        .json(&json!({ "participants": ["usr_a"] }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);

    let resp = server
        .post("/api/conversations")
        .add_header(AUTHORIZATION, auth)
        .json(&json!({ "title": "crew", "is_group": true, "participants": ["usr_b", "usr_c"] }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let group: Value = resp.json();
    assert_eq!(group["is_group"], true);
    assert_eq!(group["title"], "crew");
}

#[tokio::test]
async fn creation_publishes_conversation_created() {
    let ctx = common::test_context().await;
    let mut sub = ctx
        .broker
        .clone()
        .unwrap()
        .psubscribe(&["events:conversation:*".to_string()])
        .await
        .unwrap();
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    let resp = server
        .post("/api/conversations")
        .add_header(AUTHORIZATION, common::bearer("usr_a"))
        .json(&json!({ "participants": ["usr_b"] }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let conv: Value = resp.json();
    let id = conv["id"].as_str().unwrap();

    let published = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published.channel, format!("events:conversation:{id}"));
    let event: Value = serde_json::from_slice(&published.payload).unwrap();
    assert_eq!(event["type"], "conversation_created");
    assert_eq!(event["conversation_id"], id);
    assert_eq!(event["user_id"], "usr_a");
    assert_eq!(event["conversation"]["id"], id);
}

#[tokio::test]
async fn conversations_require_auth() {
    let ctx = common::test_context().await;
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    server
        .get("/api/conversations")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .get("/api/conversations")
        .add_header(AUTHORIZATION, "Bearer forged")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
