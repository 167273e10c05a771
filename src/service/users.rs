//! Account registration and login against the users table.

use crate::config::Settings;
use crate::error::AppError;
use crate::service::password::{hash_password, verify_password};
use crate::store::users_table;
use sqlx::PgConnection;

/// Role of a user whose credentials checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedIn {
    pub rol: String,
}

pub struct UserService;

impl UserService {
    pub async fn register(
        conn: &mut PgConnection,
        settings: &Settings,
        username: &str,
        password: &str,
        rol: &str,
    ) -> Result<(), AppError> {
        let hash = hash_password(password)?;
        let sql = format!(
            "INSERT INTO {} (username, password_hash, rol) VALUES ($1, $2, $3)",
            users_table(settings)
        );
        tracing::debug!(sql = %sql, username, "execute");
        sqlx::query(&sql)
            .bind(username)
            .bind(&hash)
            .bind(rol)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// `Ok(None)` for an unknown user or a wrong password.
    pub async fn login(
        conn: &mut PgConnection,
        settings: &Settings,
        username: &str,
        password: &str,
    ) -> Result<Option<LoggedIn>, AppError> {
        let sql = format!(
            "SELECT password_hash, rol FROM {} WHERE username = $1",
            users_table(settings)
        );
        tracing::debug!(sql = %sql, username, "query");
        let row: Option<(String, String)> = sqlx::query_as(&sql)
            .bind(username)
            .fetch_optional(&mut *conn)
            .await?;
        let Some((hash, rol)) = row else {
            return Ok(None);
        };
        Ok(verify_password(password, &hash)?.then_some(LoggedIn { rol }))
    }
}
