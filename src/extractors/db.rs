//! Per-request database scope: one pooled connection, acquired on first use.

use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};

/// Connection scope for one request. The connection goes back to the pool when the scope drops,
/// whichever way the handler returns. Handlers that reject input before calling [`DbScope::conn`]
/// never touch the pool.
pub struct DbScope {
    pool: PgPool,
    conn: Option<PoolConnection<Postgres>>,
}

impl DbScope {
    pub fn new(pool: PgPool) -> Self {
        DbScope { pool, conn: None }
    }

    pub async fn conn(&mut self) -> Result<&mut PgConnection, AppError> {
        if self.conn.is_none() {
            let conn = self.pool.acquire().await?;
            tracing::trace!("connection acquired");
            self.conn = Some(conn);
        }
        match self.conn.as_deref_mut() {
            Some(c) => Ok(c),
            None => Err(AppError::Internal("connection scope is empty".into())),
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.conn.is_some()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for DbScope {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(_parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(DbScope::new(state.pool.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn scope_starts_without_a_connection() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .expect("lazy pool");
        let scope = DbScope::new(pool.clone());
        assert!(!scope.is_acquired());
        drop(scope);
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn connection_is_reused_and_released() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = PgPoolOptions::new().max_connections(1).connect(&url).await.expect("connect");
        {
            let mut scope = DbScope::new(pool.clone());
            let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(scope.conn().await.unwrap()).await.unwrap();
            let two: i32 = sqlx::query_scalar("SELECT 2").fetch_one(scope.conn().await.unwrap()).await.unwrap();
            assert_eq!((one, two), (1, 2));
        }
        // The connection goes back to the pool on a background task after the drop.
        let reacquired = tokio::time::timeout(std::time::Duration::from_secs(2), pool.acquire()).await;
        assert!(matches!(reacquired, Ok(Ok(_))), "connection was not released");
    }
}
