//! Request body checks that run before any database work.

use crate::error::AppError;
use serde_json::{Map, Value};

pub struct RequestValidator;

impl RequestValidator {
    /// Entity bodies are non-empty objects whose values are scalars or null.
    pub fn entity_body(body: Value) -> Result<Map<String, Value>, AppError> {
        let Value::Object(map) = body else {
            return Err(AppError::BadRequest("entity data must be a JSON object".into()));
        };
        if map.is_empty() {
            return Err(AppError::BadRequest("entity data must not be empty".into()));
        }
        if let Some((k, _)) = map.iter().find(|(_, v)| v.is_array() || v.is_object()) {
            return Err(AppError::BadRequest(format!("field '{}' must be a scalar value", k)));
        }
        Ok(map)
    }

    /// Stored-procedure bodies are objects; values may be anything.
    pub fn procedure_args(body: Value) -> Result<Map<String, Value>, AppError> {
        match body {
            Value::Object(map) => Ok(map),
            _ => Err(AppError::BadRequest("procedure parameters must be a JSON object".into())),
        }
    }

    /// Value of a required text field; missing or whitespace-only is a 400.
    pub fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, AppError> {
        value
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest(message.to_string()))
    }
}
