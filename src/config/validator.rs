//! Settings validation: every configured identifier must be a plain SQL identifier.

use crate::config::Settings;
use crate::error::ConfigError;
use regex::Regex;
use std::sync::OnceLock;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"))
}

/// True when `s` is a bare identifier (letters, digits, underscore; not starting with a digit).
pub fn is_identifier(s: &str) -> bool {
    s.len() <= 63 && identifier_re().is_match(s)
}

pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.database_url.trim().is_empty() {
        return Err(ConfigError::Missing("connection string"));
    }
    let named = [("DB_SCHEMA", &settings.schema), ("USERS_TABLE", &settings.users_table)];
    for (setting, value) in named {
        if !is_identifier(value) {
            return Err(ConfigError::Validation(format!(
                "{} '{}' is not a valid identifier",
                setting, value
            )));
        }
    }
    for t in &settings.allowed_tables {
        if !is_identifier(t) {
            return Err(ConfigError::Validation(format!("allowed table '{}' is not a valid identifier", t)));
        }
    }
    for p in &settings.allowed_procedures {
        if !is_identifier(p) {
            return Err(ConfigError::Validation(format!("allowed procedure '{}' is not a valid identifier", p)));
        }
    }
    if settings.allowed_tables.iter().any(|t| *t == settings.users_table) {
        return Err(ConfigError::Validation(format!(
            "users table '{}' must not be exposed through the entity routes",
            settings.users_table
        )));
    }
    if settings.max_connections == 0 {
        return Err(ConfigError::Validation("MAX_CONNECTIONS must be at least 1".into()));
    }
    Ok(())
}
