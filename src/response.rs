//! Response helpers. Bodies keep the shapes the existing front end consumes:
//! bare JSON arrays of rows and JSON string confirmations.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

/// 200 with a JSON array of rows.
pub fn rows(data: Vec<Value>) -> (StatusCode, Json<Vec<Value>>) {
    (StatusCode::OK, Json(data))
}

/// 200 with a JSON string confirmation, e.g. `"Entidad creada exitosamente."`.
pub fn message(text: &'static str) -> (StatusCode, Json<&'static str>) {
    (StatusCode::OK, Json(text))
}

pub fn ok<T: Serialize>(data: T) -> (StatusCode, Json<T>) {
    (StatusCode::OK, Json(data))
}
