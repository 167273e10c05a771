//! Shared application state for all routes. Read-only after startup.

use crate::config::{SchemaCache, Settings};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Tables and procedures exposed over HTTP, loaded once at startup.
    pub schema: Arc<SchemaCache>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(pool: PgPool, schema: SchemaCache, settings: Settings) -> Self {
        AppState {
            pool,
            schema: Arc::new(schema),
            settings: Arc::new(settings),
        }
    }
}
