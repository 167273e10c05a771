//! Account handlers: registration and login.

use crate::error::AppError;
use crate::extractors::{DbScope, JsonBody};
use crate::response;
use crate::service::{RequestValidator, UserService};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Default, Deserialize)]
pub struct UserRequest {
    #[serde(rename = "Username", alias = "username")]
    pub username: Option<String>,
    #[serde(rename = "Password", alias = "password")]
    pub password: Option<String>,
    #[serde(rename = "Rol", alias = "rol")]
    pub rol: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(rename = "Message")]
    pub message: &'static str,
    #[serde(rename = "Rol")]
    pub rol: String,
    #[serde(rename = "Token")]
    pub token: String,
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    mut db: DbScope,
    JsonBody(req): JsonBody<UserRequest>,
) -> Result<impl IntoResponse, AppError> {
    const REQUIRED: &str = "all fields are required";
    let username = RequestValidator::required(&req.username, REQUIRED)?;
    let password = RequestValidator::required(&req.password, REQUIRED)?;
    let rol = RequestValidator::required(&req.rol, REQUIRED)?;

    let conn = db.conn().await?;
    if let Err(e) = UserService::register(conn, &state.settings, username, password, rol).await {
        tracing::warn!(username, error = %e, "registration failed");
        return Err(AppError::BadRequest("error registering user".into()));
    }
    tracing::info!(username, rol, "user registered");
    Ok(response::message("Usuario registrado exitosamente."))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    mut db: DbScope,
    JsonBody(req): JsonBody<UserRequest>,
) -> Result<impl IntoResponse, AppError> {
    const REQUIRED: &str = "username and password are required";
    let username = RequestValidator::required(&req.username, REQUIRED)?;
    let password = RequestValidator::required(&req.password, REQUIRED)?;

    let conn = db.conn().await?;
    let user = UserService::login(conn, &state.settings, username, password)
        .await?
        .ok_or_else(|| AppError::Unauthorized("invalid username or password".into()))?;
    tracing::info!(username, "login succeeded");
    Ok(response::ok(LoginResponse {
        message: "Inicio de sesión exitoso",
        rol: user.rol,
        token: uuid::Uuid::new_v4().to_string(),
    }))
}
