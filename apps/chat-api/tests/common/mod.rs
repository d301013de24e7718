#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use jsonwebtoken::{EncodingKey, Header};

use chat_api::auth::identity::Claims;
use chat_api::broker::{Broker, MemoryBroker};
use chat_api::config::Config;
use chat_api::db::store::MemoryStore;
use chat_api::hub::relay::RetryPolicy;
use chat_api::hub::Hub;
use chat_api::AppState;

pub const JWT_SECRET: &str = "integration-test-secret";

/// Everything a test needs to drive and inspect one server instance.
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub broker: Option<Arc<MemoryBroker>>,
}

pub fn test_config(jwt_secret: Option<&str>, ws_secret: Option<&str>) -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        redis_addr: "localhost:6379".to_string(),
        redis_password: None,
        ws_secret: ws_secret.map(str::to_string),
        jwt_secret: jwt_secret.map(str::to_string),
        port: 0,
    }
}

/// Retries without sleeping so broker-outage tests stay fast.
pub fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::ZERO,
        max_jitter: Duration::ZERO,
    }
}

pub fn context_with(
    config: Config,
    store: Arc<MemoryStore>,
    broker: Option<Arc<MemoryBroker>>,
) -> TestContext {
    let dyn_broker = broker.clone().map(|b| b as Arc<dyn Broker>);
    let hub = Arc::new(Hub::with_retry_policy(dyn_broker, fast_retries()));
    hub.spawn_subscriber();
    let state = AppState {
        store: store.clone(),
        hub,
        config: Arc::new(config),
    };
    TestContext {
        state,
        store,
        broker,
    }
}

/// JWT-authenticated context backed by an in-memory broker whose
/// subscription is already live.
pub async fn test_context() -> TestContext {
    let broker = Arc::new(MemoryBroker::new());
    let ctx = context_with(
        test_config(Some(JWT_SECRET), None),
        Arc::new(MemoryStore::new()),
        Some(broker.clone()),
    );
    wait_for_subscribers(&broker, 1).await;
    ctx
}

pub fn test_app(state: AppState) -> Router {
    chat_api::routes::router().with_state(state)
}

pub fn mint_token(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() as u64 + 3600,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("mint token")
}

pub fn bearer(user_id: &str) -> String {
    format!("Bearer {}", mint_token(user_id))
}

/// Start a real listener for WebSocket tests. The server runs in the background.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = test_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Wait until the broker has `count` live subscriptions.
pub async fn wait_for_subscribers(broker: &MemoryBroker, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscribers ready");
}
