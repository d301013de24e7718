mod common;

use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use futures_util::StreamExt;
use serde_json::{json, Value};

use chat_api::broker::Broker;
use chat_api::db::store::ConversationStore;

// ---------------------------------------------------------------------------
// POST /api/messages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_message_saves_and_returns_record() {
    let ctx = common::test_context().await;
    ctx.store.add_participant("conv_1", "usr_a");
    ctx.store.set_profile("usr_a", Some("Ada"), Some("https://cdn/a.png"));
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    let resp = server
        .post("/api/messages")
        .add_header(AUTHORIZATION, common::bearer("usr_a"))
        .json(&json!({ "conversation_id": "conv_1", "body": "  hello there  " }))
        .await;

    resp.assert_status(StatusCode::CREATED);
    let body: Value = resp.json();
    assert!(body["id"].as_str().unwrap().starts_with("msg_"));
    assert_eq!(body["conversation_id"], "conv_1");
    assert_eq!(body["author_id"], "usr_a");
    assert_eq!(body["body"], "hello there");
    assert_eq!(body["author_name"], "Ada");
    assert_eq!(body["author_avatar"], "https://cdn/a.png");
    assert!(body["created_at"].is_string());

    let stored = ctx.store.recent_messages("conv_1", 10).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn send_message_publishes_message_envelope() {
    let ctx = common::test_context().await;
    ctx.store.add_participant("conv_1", "usr_a");
    let broker = ctx.broker.clone().unwrap();
    let mut sub = broker
        .psubscribe(&["messages:conversation:*".to_string()])
        .await
        .unwrap();
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    let resp = server
        .post("/api/messages")
        .add_header(AUTHORIZATION, common::bearer("usr_a"))
        .json(&json!({ "conversation_id": "conv_1", "body": "hi" }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let saved: Value = resp.json();

    let published = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published.channel, "messages:conversation:conv_1");
    let envelope: Value = serde_json::from_slice(&published.payload).unwrap();
    assert_eq!(envelope["type"], "message");
    assert_eq!(envelope["id"], saved["id"]);
    assert_eq!(envelope["body"], "hi");
}

#[tokio::test]
async fn send_message_succeeds_when_broker_is_down() {
    let ctx = common::test_context().await;
    ctx.store.add_participant("conv_1", "usr_a");
    let broker = ctx.broker.clone().unwrap();
    broker.set_unavailable(true);
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    let resp = server
        .post("/api/messages")
        .add_header(AUTHORIZATION, common::bearer("usr_a"))
        .json(&json!({ "conversation_id": "conv_1", "body": "still saved" }))
        .await;

    resp.assert_status(StatusCode::CREATED);
    assert_eq!(broker.publish_attempts(), 5);
    assert_eq!(ctx.store.recent_messages("conv_1", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn send_message_validates_body() {
    let ctx = common::test_context().await;
    ctx.store.add_participant("conv_1", "usr_a");
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    for body in [json!("   "), Value::Null, json!("x".repeat(4001))] {
        let resp = server
            .post("/api/messages")
            .add_header(AUTHORIZATION, common::bearer("usr_a"))
            .json(&json!({ "conversation_id": "conv_1", "body": body }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let err: Value = resp.json();
        assert_eq!(err["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(err["error"]["details"][0]["field"], "body");
    }

    // The limit counts characters, not bytes.
    let resp = server
        .post("/api/messages")
        .add_header(AUTHORIZATION, common::bearer("usr_a"))
        .json(&json!({ "conversation_id": "conv_1", "body": "é".repeat(4000) }))
        .await;
    resp.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn send_message_requires_membership_and_auth() {
    let ctx = common::test_context().await;
    ctx.store.add_participant("conv_1", "usr_a");
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    let resp = server
        .post("/api/messages")
        .add_header(AUTHORIZATION, common::bearer("usr_b"))
        .json(&json!({ "conversation_id": "conv_1", "body": "hi" }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    let resp = server
        .post("/api/messages")
        .json(&json!({ "conversation_id": "conv_1", "body": "hi" }))
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);

    let resp = server
        .post("/api/messages")
        .add_header(AUTHORIZATION, common::bearer("usr_a"))
        .json(&json!({ "body": "hi" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    assert!(ctx.store.recent_messages("conv_1", 10).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// GET /api/messages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_messages_returns_oldest_first_with_limit() {
    let ctx = common::test_context().await;
    ctx.store.add_participant("conv_1", "usr_a");
    for n in 0..120 {
        ctx.store
            .save_message("conv_1", "usr_a", &format!("m{n}"))
            .await
            .unwrap();
    }
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    let resp = server
        .get("/api/messages")
        .add_header(AUTHORIZATION, common::bearer("usr_a"))
        .add_query_param("conversation_id", "conv_1")
        .await;
    resp.assert_status_ok();
    let page: Vec<Value> = resp.json();
    assert_eq!(page.len(), 50);
    assert_eq!(page[0]["body"], "m70");
    assert_eq!(page[49]["body"], "m119");

    let resp = server
        .get("/api/messages")
        .add_header(AUTHORIZATION, common::bearer("usr_a"))
        .add_query_param("conversation_id", "conv_1")
        .add_query_param("limit", 500)
        .await;
    let page: Vec<Value> = resp.json();
    assert_eq!(page.len(), 100);
}

#[tokio::test]
async fn list_messages_requires_membership() {
    let ctx = common::test_context().await;
    ctx.store.add_participant("conv_1", "usr_a");
    let server = TestServer::new(common::test_app(ctx.state.clone())).unwrap();

    let resp = server
        .get("/api/messages")
        .add_header(AUTHORIZATION, common::bearer("usr_b"))
        .add_query_param("conversation_id", "conv_1")
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);
}
