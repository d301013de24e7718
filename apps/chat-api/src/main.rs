use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::broker::{Broker, RedisBroker};
use chat_api::config::Config;
use chat_api::db::store::{ConversationStore, PgStore};
use chat_api::hub::Hub;
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let db = chat_api::db::pool::connect(&config.database_url).expect("failed to build connection pool");
    let store: Arc<dyn ConversationStore> = Arc::new(PgStore::new(db));

    // A missing broker degrades to single-process fanout.
    let broker: Option<Arc<dyn Broker>> = match RedisBroker::connect(&config.redis_url()).await {
        Ok(broker) => {
            tracing::info!(addr = %config.redis_addr, "connected to broker");
            Some(Arc::new(broker))
        }
        Err(e) => {
            tracing::warn!(addr = %config.redis_addr, error = %e, "broker unavailable; running without cross-instance fanout");
            None
        }
    };

    let hub = Arc::new(Hub::new(broker));
    let subscriber = hub.spawn_subscriber();

    let state = AppState {
        store,
        hub: hub.clone(),
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    hub.shutdown();
    if let Some(task) = subscriber {
        let _ = task.await;
    }
    tracing::info!("chat-api stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
