//! Generic table operations against PostgreSQL, executed on the request's connection.
//! Each operation builds its SQL first, so malformed requests fail before a connection is taken.

use crate::config::{ProcedureInfo, SchemaCache, TableInfo};
use crate::error::AppError;
use crate::extractors::DbScope;
use crate::sql::{self, ComplexQuery, Page, PgBindValue, QueryBuf};
use serde_json::{Map, Value};
use sqlx::PgConnection;

pub struct TableService;

impl TableService {
    /// Resolve a table name from the path against the schema cache.
    pub fn table<'a>(cache: &'a SchemaCache, name: &str) -> Result<&'a TableInfo, AppError> {
        cache
            .table(name)
            .ok_or_else(|| AppError::NotFound(format!("table '{}' not found", name)))
    }

    pub fn procedure<'a>(cache: &'a SchemaCache, name: &str) -> Result<&'a ProcedureInfo, AppError> {
        cache
            .procedure(name)
            .ok_or_else(|| AppError::NotFound(format!("procedure '{}' not found", name)))
    }

    pub async fn list(db: &mut DbScope, table: &TableInfo, schema: &str, page: Page) -> Result<Vec<Value>, AppError> {
        let q = sql::select_all(table, schema, page);
        Self::query_many(db.conn().await?, &q).await
    }

    /// Rows whose `key_column` matches; empty when none do.
    pub async fn find_by_key(
        db: &mut DbScope,
        table: &TableInfo,
        schema: &str,
        key_column: &str,
        raw_value: &str,
    ) -> Result<Vec<Value>, AppError> {
        let q = sql::select_by_key(table, schema, key_column, raw_value)?;
        Self::query_many(db.conn().await?, &q).await
    }

    pub async fn create(
        db: &mut DbScope,
        table: &TableInfo,
        schema: &str,
        body: &Map<String, Value>,
    ) -> Result<u64, AppError> {
        let q = sql::insert(table, schema, body)?;
        Self::execute(db.conn().await?, &q).await
    }

    /// Returns the number of rows updated.
    pub async fn update(
        db: &mut DbScope,
        table: &TableInfo,
        schema: &str,
        body: &Map<String, Value>,
        key_column: &str,
        raw_key: &str,
    ) -> Result<u64, AppError> {
        let q = sql::update(table, schema, body, key_column, raw_key)?;
        Self::execute(db.conn().await?, &q).await
    }

    pub async fn delete(
        db: &mut DbScope,
        table: &TableInfo,
        schema: &str,
        key_column: &str,
        raw_key: &str,
    ) -> Result<u64, AppError> {
        let q = sql::delete(table, schema, key_column, raw_key)?;
        Self::execute(db.conn().await?, &q).await
    }

    /// Stored password for a user row. `Ok(None)` when the user does not exist.
    pub async fn stored_password(
        db: &mut DbScope,
        table: &TableInfo,
        schema: &str,
        user_column: &str,
        password_column: &str,
        user_value: &str,
    ) -> Result<Option<Option<String>>, AppError> {
        let q = sql::select_password(table, schema, user_column, password_column, user_value)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, Option<String>>(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        Ok(query.fetch_optional(db.conn().await?).await?)
    }

    pub async fn complex_query(db: &mut DbScope, cache: &SchemaCache, query: &ComplexQuery) -> Result<Vec<Value>, AppError> {
        let q = query.build(cache)?;
        Self::query_many(db.conn().await?, &q).await
    }

    /// CALL a stored procedure; returns the affected row count reported by the server.
    pub async fn call_procedure(
        db: &mut DbScope,
        procedure: &ProcedureInfo,
        schema: &str,
        args: &Map<String, Value>,
    ) -> Result<u64, AppError> {
        let q = sql::call_procedure(procedure, schema, args)?;
        Self::execute(db.conn().await?, &q).await
    }

    async fn query_many(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&mut *conn).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(conn: &mut PgConnection, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let done = query.execute(&mut *conn).await?;
        Ok(done.rows_affected())
    }
}

pub(crate) fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let v = cell_to_value(row, col.ordinal());
        map.insert(col.name().to_string(), v);
    }
    Value::Object(map)
}

// Decoded by position, not by name.
fn cell_to_value(row: &sqlx::postgres::PgRow, idx: usize) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(idx) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(idx) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return j;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_schema_cache, ColumnInfo, Settings};
    use crate::service::password::{hash_password, verify_password};
    use serde_json::json;
    use sqlx::{Connection, PgPool};

    fn cache() -> SchemaCache {
        let t = TableInfo {
            name: "docente".into(),
            columns: vec![ColumnInfo::new("cedula", "integer", "pg_catalog", "int4")],
            primary_key: vec!["cedula".into()],
        };
        SchemaCache::new("public", vec![t], vec![])
    }

    #[test]
    fn unknown_table_is_not_found() {
        let c = cache();
        assert!(TableService::table(&c, "docente").is_ok());
        assert!(matches!(TableService::table(&c, "pg_user"), Err(AppError::NotFound(_))));
        assert!(matches!(TableService::procedure(&c, "x"), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn row_mapping_decodes_common_types() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let mut conn = sqlx::PgConnection::connect(&url).await.expect("connect");
        let row = sqlx::query(
            "SELECT 1::int4 AS a, 2::int8 AS b, 1.5::float8 AS c, true AS d, 'x'::text AS e, \
             DATE '2024-01-02' AS f, NULL::text AS g, 10.25::numeric::text AS h",
        )
        .fetch_one(&mut conn)
        .await
        .expect("query");
        let v = row_to_json(&row);
        assert_eq!(v["a"], 1);
        assert_eq!(v["b"], 2);
        assert_eq!(v["c"], 1.5);
        assert_eq!(v["d"], true);
        assert_eq!(v["e"], "x");
        assert_eq!(v["f"], "2024-01-02");
        assert!(v["g"].is_null());
        assert_eq!(v["h"], "10.25");
    }

    /// A throwaway schema with two related tables and a procedure, loaded through the catalog.
    struct Fixture {
        pool: PgPool,
        cache: SchemaCache,
    }

    impl Fixture {
        async fn new() -> Self {
            let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
            let schema = format!("tabla_test_{}", uuid::Uuid::new_v4().simple());
            let settings = Settings::from_lookup(|k| match k {
                "DATABASE_URL" => Some(url.clone()),
                "DB_SCHEMA" => Some(schema.clone()),
                "ALLOWED_TABLES" => Some("docente,proyecto".into()),
                "ALLOWED_PROCEDURES" => Some("marcar_activo".into()),
                _ => None,
            })
            .expect("settings");
            let pool = PgPool::connect(&url).await.expect("connect");
            let ddl = format!(
                r#"CREATE SCHEMA "{s}";
                CREATE TABLE "{s}".docente (
                    id int4 PRIMARY KEY,
                    nombre text NOT NULL,
                    activo boolean NOT NULL DEFAULT false,
                    creado timestamp,
                    salario numeric(10, 2),
                    clave text
                );
                CREATE TABLE "{s}".proyecto (
                    id int4 PRIMARY KEY,
                    titulo text,
                    docente_id int4 REFERENCES "{s}".docente (id)
                );
                CREATE PROCEDURE "{s}".marcar_activo(p_id int4) LANGUAGE sql
                    AS $$ UPDATE "{s}".docente SET activo = true WHERE id = p_id $$;"#,
                s = schema
            );
            sqlx::raw_sql(&ddl).execute(&pool).await.expect("ddl");
            let cache = load_schema_cache(&pool, &settings).await.expect("schema cache");
            Fixture { pool, cache }
        }

        fn docente(&self) -> &TableInfo {
            self.cache.table("docente").expect("docente cached")
        }

        fn scope(&self) -> DbScope {
            DbScope::new(self.pool.clone())
        }

        async fn insert_docente(&self, body: Value) {
            let body = body.as_object().cloned().expect("object body");
            let n = TableService::create(&mut self.scope(), self.docente(), &self.cache.schema, &body)
                .await
                .expect("insert");
            assert_eq!(n, 1);
        }

        async fn drop_schema(self) {
            let sql = format!("DROP SCHEMA {} CASCADE", crate::config::quote_ident(&self.cache.schema));
            sqlx::query(&sql).execute(&self.pool).await.expect("drop schema");
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn entity_round_trip_by_timestamp_key() {
        let fx = Fixture::new().await;
        let schema = fx.cache.schema.clone();
        fx.insert_docente(json!({
            "id": 1, "nombre": "Ana", "activo": 1, "creado": "2024-01-15T08:00:00", "salario": "1500.50"
        }))
        .await;

        let rows = TableService::list(&mut fx.scope(), fx.docente(), &schema, Page::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        let keys: Vec<&str> = rows[0].as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["id", "nombre", "activo", "creado", "salario", "clave"]);
        assert_eq!(rows[0]["activo"], true);
        assert_eq!(rows[0]["salario"], "1500.50");

        let key = "2024-01-15T08:00:00";
        let found = TableService::find_by_key(&mut fx.scope(), fx.docente(), &schema, "creado", key).await.unwrap();
        assert_eq!(found.len(), 1);

        let patch = json!({"nombre": "Ana María"}).as_object().cloned().unwrap();
        let n = TableService::update(&mut fx.scope(), fx.docente(), &schema, &patch, "creado", key).await.unwrap();
        assert_eq!(n, 1);
        let found = TableService::find_by_key(&mut fx.scope(), fx.docente(), &schema, "id", "1").await.unwrap();
        assert_eq!(found[0]["nombre"], "Ana María");

        let n = TableService::delete(&mut fx.scope(), fx.docente(), &schema, "creado", key).await.unwrap();
        assert_eq!(n, 1);
        let rows = TableService::list(&mut fx.scope(), fx.docente(), &schema, Page::default()).await.unwrap();
        assert!(rows.is_empty());
        fx.drop_schema().await;
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn stored_password_by_integer_user_column() {
        let fx = Fixture::new().await;
        let schema = fx.cache.schema.clone();
        let hash = hash_password("clave-1").unwrap();
        fx.insert_docente(json!({"id": 7, "nombre": "Luis", "clave": hash})).await;

        let stored = TableService::stored_password(&mut fx.scope(), fx.docente(), &schema, "id", "clave", "7")
            .await
            .unwrap();
        let stored = stored.flatten().expect("stored hash");
        assert!(verify_password("clave-1", &stored).unwrap());
        assert!(!verify_password("otra", &stored).unwrap());

        let missing = TableService::stored_password(&mut fx.scope(), fx.docente(), &schema, "id", "clave", "8")
            .await
            .unwrap();
        assert_eq!(missing, None);
        fx.drop_schema().await;
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn complex_query_join_keeps_shared_column_names_apart() {
        let fx = Fixture::new().await;
        fx.insert_docente(json!({"id": 1, "nombre": "Ana"})).await;
        let proyecto = fx.cache.table("proyecto").unwrap();
        let body = json!({"id": 100, "titulo": "P1", "docente_id": 1}).as_object().cloned().unwrap();
        TableService::create(&mut fx.scope(), proyecto, &fx.cache.schema, &body).await.unwrap();

        let query: ComplexQuery = serde_json::from_value(json!({
            "TablaPrincipal": {"Nombre": "proyecto", "Alias": "p"},
            "CamposSeleccionados": ["*"],
            "Joins": [{"TablaSecundaria": "docente d", "CondicionJoin": "p.docente_id = d.id"}]
        }))
        .unwrap();
        let rows = TableService::complex_query(&mut fx.scope(), &fx.cache, &query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], 100);
        assert_eq!(rows[0]["id1"], 1);
        assert_eq!(rows[0]["titulo"], "P1");
        assert_eq!(rows[0]["nombre"], "Ana");

        let query: ComplexQuery = serde_json::from_value(json!({
            "TablaPrincipal": {"Nombre": "proyecto", "Alias": "p"},
            "CamposSeleccionados": ["p.id", "d.id", "COUNT(*)", "COUNT(d.nombre)"],
            "Joins": [{"TablaSecundaria": "docente d", "CondicionJoin": "p.docente_id = d.id"}],
            "CamposAgrupacion": ["p.id", "d.id"]
        }))
        .unwrap();
        let rows = TableService::complex_query(&mut fx.scope(), &fx.cache, &query).await.unwrap();
        assert_eq!(rows[0], json!({"id": 100, "id1": 1, "count": 1, "count1": 1}));
        fx.drop_schema().await;
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn procedure_call_runs_with_named_arguments() {
        let fx = Fixture::new().await;
        let schema = fx.cache.schema.clone();
        fx.insert_docente(json!({"id": 3, "nombre": "Eva"})).await;
        let procedure = TableService::procedure(&fx.cache, "marcar_activo").unwrap();
        let args = json!({"@p_id": 3}).as_object().cloned().unwrap();

        let n = TableService::call_procedure(&mut fx.scope(), procedure, &schema, &args).await.unwrap();
        // CALL carries no row count in its command tag.
        assert_eq!(n, 0);
        let rows = TableService::find_by_key(&mut fx.scope(), fx.docente(), &schema, "id", "3").await.unwrap();
        assert_eq!(rows[0]["activo"], true);
        fx.drop_schema().await;
    }
}
