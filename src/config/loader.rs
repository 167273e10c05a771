//! Load settings from the environment and the schema cache from the catalog.

use crate::config::resolved::{quote_ident, ColumnInfo, ProcedureInfo, ProcedureParam, SchemaCache, TableInfo};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap, HashSet};

impl Settings {
    /// Read settings from the process environment (after loading `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, then validate them.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider: DatabaseProvider = match get("DATABASE_PROVIDER") {
            Some(p) => p.parse()?,
            None => DatabaseProvider::Postgres,
        };
        let database_url = get(&format!("CONNECTION_STRING_{}", provider.env_suffix()))
            .or_else(|| get("DATABASE_URL"))
            .ok_or(ConfigError::Missing("CONNECTION_STRING_<PROVIDER> or DATABASE_URL"))?;

        let allowed_tables = get("ALLOWED_TABLES")
            .map(|v| split_list(&v))
            .unwrap_or_else(|| DEFAULT_ALLOWED_TABLES.iter().map(|s| s.to_string()).collect());
        let allowed_procedures = get("ALLOWED_PROCEDURES").map(|v| split_list(&v)).unwrap_or_default();

        let max_connections = match get("MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Validation(format!("MAX_CONNECTIONS '{}' is not a number", v)))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let max_body_bytes = match get("MAX_BODY_BYTES") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Validation(format!("MAX_BODY_BYTES '{}' is not a number", v)))?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let settings = Settings {
            provider,
            database_url,
            schema: get("DB_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.into()),
            allowed_tables,
            allowed_procedures,
            users_table: get("USERS_TABLE").unwrap_or_else(|| DEFAULT_USERS_TABLE.into()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            max_connections,
            max_body_bytes,
        };
        validate(&settings)?;
        Ok(settings)
    }
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

type ColumnRow = (String, String, String, String, String);

/// One catalog pass: allow-listed base tables with their columns and primary keys, plus procedures.
pub async fn load_schema_cache(pool: &PgPool, settings: &Settings) -> Result<SchemaCache, ConfigError> {
    let schema = settings.schema.as_str();

    let sql = "SELECT table_name::text FROM information_schema.tables \
               WHERE table_schema = $1 AND table_type = 'BASE TABLE'";
    tracing::debug!(sql = %sql, schema, "query");
    let existing: HashSet<String> = sqlx::query_scalar::<_, String>(sql)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .into_iter()
        .collect();

    let mut exposed: Vec<&str> = Vec::new();
    for t in &settings.allowed_tables {
        if existing.contains(t) {
            exposed.push(t.as_str());
        } else {
            tracing::warn!(table = %t, schema, "allow-listed table not found, skipping");
        }
    }

    let sql = "SELECT table_name::text, column_name::text, data_type::text, udt_schema::text, udt_name::text \
               FROM information_schema.columns \
               WHERE table_schema = $1 AND table_name = ANY($2) \
               ORDER BY table_name, ordinal_position";
    tracing::debug!(sql = %sql, schema, "query");
    let column_rows: Vec<ColumnRow> = sqlx::query_as(sql)
        .bind(schema)
        .bind(&exposed)
        .fetch_all(pool)
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let mut columns_by_table: HashMap<String, Vec<ColumnInfo>> = HashMap::new();
    for (table, name, data_type, udt_schema, udt_name) in column_rows {
        columns_by_table
            .entry(table)
            .or_default()
            .push(ColumnInfo::new(&name, &data_type, &udt_schema, &udt_name));
    }

    let sql = "SELECT kcu.table_name::text, kcu.column_name::text \
               FROM information_schema.table_constraints tc \
               JOIN information_schema.key_column_usage kcu \
                 ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
               WHERE tc.table_schema = $1 AND tc.constraint_type = 'PRIMARY KEY' AND kcu.table_name = ANY($2) \
               ORDER BY kcu.table_name, kcu.ordinal_position";
    tracing::debug!(sql = %sql, schema, "query");
    let pk_rows: Vec<(String, String)> = sqlx::query_as(sql)
        .bind(schema)
        .bind(&exposed)
        .fetch_all(pool)
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    let mut pk_by_table: HashMap<String, Vec<String>> = HashMap::new();
    for (table, column) in pk_rows {
        pk_by_table.entry(table).or_default().push(column);
    }

    let tables: Vec<TableInfo> = exposed
        .iter()
        .map(|name| TableInfo {
            name: name.to_string(),
            columns: columns_by_table.remove(*name).unwrap_or_default(),
            primary_key: pk_by_table.remove(*name).unwrap_or_default(),
        })
        .collect();

    let procedures = load_procedures(pool, settings).await?;

    let cache = SchemaCache::new(schema, tables, procedures);
    tracing::info!(
        schema,
        tables = cache.table_names().len(),
        procedures = cache.procedure_count(),
        "schema cache loaded"
    );
    Ok(cache)
}

type ParamRow = (String, Option<String>, Option<String>, Option<String>);

async fn load_procedures(pool: &PgPool, settings: &Settings) -> Result<Vec<ProcedureInfo>, ConfigError> {
    let schema = settings.schema.as_str();
    let sql = "SELECT r.routine_name::text, p.parameter_name::text, \
               p.udt_schema::text, p.udt_name::text \
               FROM information_schema.routines r \
               LEFT JOIN information_schema.parameters p \
                 ON p.specific_schema = r.specific_schema AND p.specific_name = r.specific_name \
                 AND p.parameter_mode IN ('IN', 'INOUT') \
               WHERE r.routine_schema = $1 AND r.routine_type = 'PROCEDURE' \
               ORDER BY r.routine_name, p.ordinal_position";
    tracing::debug!(sql = %sql, schema, "query");
    let rows: Vec<ParamRow> = sqlx::query_as(sql)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let allowed: HashSet<&str> = settings.allowed_procedures.iter().map(String::as_str).collect();
    let mut by_name: BTreeMap<String, ProcedureInfo> = BTreeMap::new();
    for (routine, param_name, udt_schema, udt_name) in rows {
        if !allowed.is_empty() && !allowed.contains(routine.as_str()) {
            continue;
        }
        let entry = by_name.entry(routine.clone()).or_insert_with(|| ProcedureInfo {
            name: routine,
            params: Vec::new(),
        });
        // Unnamed parameters cannot be addressed from a JSON body.
        if let (Some(name), Some(udt_schema), Some(udt_name)) = (param_name, udt_schema, udt_name) {
            entry.params.push(ProcedureParam {
                name,
                cast_type: format!("{}.{}", quote_ident(&udt_schema), quote_ident(&udt_name)),
            });
        }
    }
    for p in &settings.allowed_procedures {
        if !by_name.contains_key(p) {
            tracing::warn!(procedure = %p, schema, "allow-listed procedure not found, skipping");
        }
    }
    Ok(by_name.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_with_database_url() {
        let s = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/app")])).unwrap();
        assert_eq!(s.provider, DatabaseProvider::Postgres);
        assert_eq!(s.schema, "public");
        assert_eq!(s.users_table, "usuarios");
        assert_eq!(s.allowed_tables.len(), DEFAULT_ALLOWED_TABLES.len());
        assert!(s.allowed_procedures.is_empty());
    }

    #[test]
    fn provider_selects_connection_string() {
        let s = Settings::from_lookup(lookup(&[
            ("DATABASE_PROVIDER", "LocalDb"),
            ("CONNECTION_STRING_LOCALDB", "postgres://localhost/dev"),
            ("DATABASE_URL", "postgres://elsewhere/app"),
        ]))
        .unwrap();
        assert_eq!(s.provider, DatabaseProvider::LocalDb);
        assert_eq!(s.database_url, "postgres://localhost/dev");
    }

    #[test]
    fn sql_server_provider_is_rejected() {
        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_PROVIDER", "SqlServer"),
            ("DATABASE_URL", "postgres://localhost/app"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedProvider(_)));
    }

    #[test]
    fn missing_connection_string() {
        let err = Settings::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn allow_lists_are_split_and_trimmed() {
        let s = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("ALLOWED_TABLES", " proyecto, docente ,,"),
            ("ALLOWED_PROCEDURES", "registrar_venta"),
        ]))
        .unwrap();
        assert_eq!(s.allowed_tables, vec!["proyecto", "docente"]);
        assert_eq!(s.allowed_procedures, vec!["registrar_venta"]);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn loads_cache_from_catalog() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let settings = Settings::from_lookup(lookup(&[("DATABASE_URL", url.as_str())])).unwrap();
        let pool = PgPool::connect(&url).await.expect("connect");
        let cache = load_schema_cache(&pool, &settings).await.expect("load");
        for name in cache.table_names() {
            assert!(settings.allowed_tables.contains(&name));
        }
    }
}
