//! Stored-procedure invocation.

use crate::error::AppError;
use crate::extractors::{DbScope, JsonBody};
use crate::service::{RequestValidator, TableService};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

/// `FilasAfectadas` is the count from the server's command tag. PostgreSQL tags `CALL` without
/// one, so it is always 0.
#[derive(Debug, Serialize)]
pub struct ProcedureResult {
    #[serde(rename = "Mensaje")]
    pub mensaje: &'static str,
    #[serde(rename = "FilasAfectadas")]
    pub filas_afectadas: u64,
}

#[derive(Debug, Serialize)]
pub struct ProcedureDbError {
    #[serde(rename = "Mensaje")]
    pub mensaje: &'static str,
    #[serde(rename = "Detalle")]
    pub detalle: String,
}

#[instrument(skip_all, fields(procedure = %procedure_name))]
pub async fn execute(
    State(state): State<AppState>,
    Path(procedure_name): Path<String>,
    mut db: DbScope,
    JsonBody(body): JsonBody<Value>,
) -> Response {
    let result: Result<u64, AppError> = async {
        let args = RequestValidator::procedure_args(body)?;
        let procedure = TableService::procedure(&state.schema, &procedure_name)?;
        TableService::call_procedure(&mut db, procedure, &state.schema.schema, &args).await
    }
    .await;

    match result {
        Ok(n) => {
            tracing::info!(procedure = %procedure_name, rows = n, "procedure executed");
            (
                StatusCode::OK,
                Json(ProcedureResult {
                    mensaje: "Procedimiento almacenado ejecutado exitosamente.",
                    filas_afectadas: n,
                }),
            )
                .into_response()
        }
        Err(AppError::Db(e)) => {
            tracing::error!(procedure = %procedure_name, error = %e, "procedure failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ProcedureDbError {
                    mensaje: "Error en la base de datos.",
                    detalle: e.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}
