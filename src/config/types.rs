//! Runtime settings read from the environment.

use crate::error::ConfigError;
use std::str::FromStr;

/// Tables exposed when `ALLOWED_TABLES` is not set.
pub const DEFAULT_ALLOWED_TABLES: &[&str] = &[
    "ac_proyecto",
    "tipo_producto",
    "termino_clave",
    "docente_producto",
    "producto",
    "desarrolla",
    "aliado_proyecto",
    "proyecto",
    "palabras_clave",
    "proyecto_linea",
    "ods_proyecto",
    "aa_proyecto",
    "area_conocimiento",
    "objetivo_desarrollo_sostenible",
    "area_aplicacion",
    "docente",
    "aliado",
    "linea_investigacion",
];

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_USERS_TABLE: &str = "usuarios";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5179";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Which database the connection string points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseProvider {
    /// A PostgreSQL server; the database must already exist.
    Postgres,
    /// A local development database, created on startup when missing.
    LocalDb,
}

impl DatabaseProvider {
    /// Suffix of the `CONNECTION_STRING_*` variable for this provider.
    pub fn env_suffix(&self) -> &'static str {
        match self {
            DatabaseProvider::Postgres => "POSTGRES",
            DatabaseProvider::LocalDb => "LOCALDB",
        }
    }
}

impl FromStr for DatabaseProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseProvider::Postgres),
            "localdb" => Ok(DatabaseProvider::LocalDb),
            _ => Err(ConfigError::UnsupportedProvider(s.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub provider: DatabaseProvider,
    pub database_url: String,
    /// Schema whose tables and procedures are exposed.
    pub schema: String,
    pub allowed_tables: Vec<String>,
    /// Empty means every procedure in `schema`.
    pub allowed_procedures: Vec<String>,
    pub users_table: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub max_body_bytes: usize,
}
