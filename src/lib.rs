pub mod auth;
pub mod clients;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod ws;

use sqlx::postgres::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::services::coordinator::Coordinator;

/// Shared state of every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub coordinator: Arc<Coordinator>,
    /// `None` when running on in-memory storage
    pub db: Option<PgPool>,
}

impl AppState {
    pub fn storage_name(&self) -> &'static str {
        if self.db.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}
