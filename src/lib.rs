//! Table-to-REST backend: CRUD, ad-hoc queries and stored-procedure calls over the
//! allow-listed tables of a PostgreSQL schema, plus user registration and login.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_schema_cache, DatabaseProvider, SchemaCache, Settings};
pub use error::{AppError, ConfigError};
pub use extractors::DbScope;
pub use routes::app_router;
pub use state::AppState;
pub use store::{ensure_database_exists, ensure_users_table};
