pub mod auth;
pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod models;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::store::ConversationStore;
use hub::Hub;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub hub: Arc<Hub>,
    pub config: Arc<Config>,
}
