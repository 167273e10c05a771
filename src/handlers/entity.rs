//! Table handlers: list, read by key, create, update, delete, table listing,
//! password verification and complex queries.

use crate::error::AppError;
use crate::extractors::{DbScope, JsonBody};
use crate::response;
use crate::service::password::{hash_password_fields, verify_password};
use crate::service::{RequestValidator, TableService};
use crate::sql::{ComplexQuery, Page};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[instrument(skip_all, fields(project = %project, table = %table))]
pub async fn list(
    State(state): State<AppState>,
    Path((project, table)): Path<(String, String)>,
    Query(page): Query<PageQuery>,
    mut db: DbScope,
) -> Result<impl IntoResponse, AppError> {
    let info = TableService::table(&state.schema, &table)?;
    let page = Page {
        limit: page.limit,
        offset: page.offset,
    };
    let rows = TableService::list(&mut db, info, &state.schema.schema, page).await?;
    Ok(response::rows(rows))
}

#[instrument(skip_all, fields(project = %project, table = %table, key = %key_name))]
pub async fn read_by_key(
    State(state): State<AppState>,
    Path((project, table, key_name, value)): Path<(String, String, String, String)>,
    mut db: DbScope,
) -> Result<impl IntoResponse, AppError> {
    let info = TableService::table(&state.schema, &table)?;
    let rows = TableService::find_by_key(&mut db, info, &state.schema.schema, &key_name, &value).await?;
    if rows.is_empty() {
        return Err(AppError::NotFound(format!("no row in '{}' with {} = {}", table, key_name, value)));
    }
    Ok(response::rows(rows))
}

#[instrument(skip_all, fields(project = %project, table = %table))]
pub async fn create(
    State(state): State<AppState>,
    Path((project, table)): Path<(String, String)>,
    mut db: DbScope,
    JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse, AppError> {
    let info = TableService::table(&state.schema, &table)?;
    let mut body = RequestValidator::entity_body(body)?;
    hash_password_fields(&mut body)?;
    TableService::create(&mut db, info, &state.schema.schema, &body).await?;
    tracing::info!(table = %table, "entity created");
    Ok(response::message("Entidad creada exitosamente."))
}

#[instrument(skip_all, fields(project = %project, table = %table, key = %key_name))]
pub async fn update(
    State(state): State<AppState>,
    Path((project, table, key_name, key_value)): Path<(String, String, String, String)>,
    mut db: DbScope,
    JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse, AppError> {
    let info = TableService::table(&state.schema, &table)?;
    let mut body = RequestValidator::entity_body(body)?;
    hash_password_fields(&mut body)?;
    let n = TableService::update(&mut db, info, &state.schema.schema, &body, &key_name, &key_value).await?;
    if n == 0 {
        return Err(AppError::NotFound(format!("no row in '{}' with {} = {}", table, key_name, key_value)));
    }
    tracing::info!(table = %table, rows = n, "entity updated");
    Ok(response::message("Entidad actualizada exitosamente."))
}

#[instrument(skip_all, fields(project = %project, table = %table, key = %key_name))]
pub async fn delete(
    State(state): State<AppState>,
    Path((project, table, key_name, key_value)): Path<(String, String, String, String)>,
    mut db: DbScope,
) -> Result<impl IntoResponse, AppError> {
    let info = TableService::table(&state.schema, &table)?;
    let n = TableService::delete(&mut db, info, &state.schema.schema, &key_name, &key_value).await?;
    if n == 0 {
        return Err(AppError::NotFound(format!("no row in '{}' with {} = {}", table, key_name, key_value)));
    }
    tracing::info!(table = %table, rows = n, "entity deleted");
    Ok(response::message("Entidad eliminada exitosamente."))
}

/// Names of the exposed tables, sorted.
#[instrument(skip_all, fields(project = %project))]
pub async fn list_tables(State(state): State<AppState>, Path(project): Path<String>) -> impl IntoResponse {
    response::ok(state.schema.table_names())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPasswordRequest {
    pub user_field: Option<String>,
    pub password_field: Option<String>,
    pub user_value: Option<String>,
    pub password_value: Option<String>,
}

#[instrument(skip_all, fields(project = %project, table = %table))]
pub async fn verify_password_handler(
    State(state): State<AppState>,
    Path((project, table)): Path<(String, String)>,
    mut db: DbScope,
    JsonBody(req): JsonBody<VerifyPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    const REQUIRED: &str = "userField, passwordField, userValue and passwordValue are required";
    let user_field = RequestValidator::required(&req.user_field, REQUIRED)?;
    let password_field = RequestValidator::required(&req.password_field, REQUIRED)?;
    let user_value = RequestValidator::required(&req.user_value, REQUIRED)?;
    let password_value = RequestValidator::required(&req.password_value, REQUIRED)?;

    let info = TableService::table(&state.schema, &table)?;
    let schema = state.schema.schema.as_str();
    let stored = TableService::stored_password(&mut db, info, schema, user_field, password_field, user_value)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?
        .ok_or_else(|| AppError::Internal("stored password is empty".into()))?;
    if !verify_password(password_value, &stored)? {
        return Err(AppError::Unauthorized("incorrect password".into()));
    }
    Ok(response::message("Contraseña verificada exitosamente."))
}

#[instrument(skip_all, fields(project = %project))]
pub async fn complex_query(
    State(state): State<AppState>,
    Path(project): Path<String>,
    mut db: DbScope,
    JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse, AppError> {
    let query: ComplexQuery =
        serde_json::from_value(body).map_err(|e| AppError::BadRequest(format!("invalid query criteria: {}", e)))?;
    let rows = TableService::complex_query(&mut db, &state.schema, &query).await?;
    if rows.is_empty() {
        return Err(AppError::NotFound("no results for the query".into()));
    }
    Ok(response::rows(rows))
}
