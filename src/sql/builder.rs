//! Builds parameterized SELECT, INSERT, UPDATE, DELETE and CALL from cached table/procedure metadata.
//! Identifiers are checked against the cache and quoted; values are always `$n` parameters.

use crate::config::{quote_ident as quoted, ColumnInfo, ColumnKind, ProcedureInfo, TableInfo};
use crate::error::AppError;
use serde_json::{Map, Value};

/// Upper bound for `?limit=`.
pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub(crate) fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder cast to the column type, e.g. `$2::"pg_catalog"."int4"`.
    pub(crate) fn push_typed(&mut self, v: Value, cast_type: &str) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, cast_type)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Full qualified table name.
pub(crate) fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// Column as it appears in a SELECT list; types the row decoder cannot read come back as text.
pub(crate) fn select_expr(qualifier: Option<&str>, c: &ColumnInfo) -> String {
    let q = match qualifier {
        Some(alias) => format!("{}.{}", quoted(alias), quoted(&c.name)),
        None => quoted(&c.name),
    };
    if c.selects_as_text() {
        format!("{}::text", q)
    } else {
        q
    }
}

fn select_column_list(table: &TableInfo) -> String {
    if table.columns.is_empty() {
        return "*".into();
    }
    table
        .columns
        .iter()
        .map(|c| select_expr(None, c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column<'a>(table: &'a TableInfo, name: &str) -> Result<&'a ColumnInfo, AppError> {
    table
        .column(name)
        .ok_or_else(|| AppError::BadRequest(format!("unknown column '{}' in table '{}'", name, table.name)))
}

/// Body value for a column. Numeric 0/1 become booleans, since the server has no int8 to bool cast.
fn body_value(c: &ColumnInfo, v: &Value) -> Result<Value, AppError> {
    match (c.kind, v) {
        (ColumnKind::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(AppError::BadRequest(format!("'{}' is not a valid boolean for column '{}'", n, c.name))),
        },
        _ => Ok(v.clone()),
    }
}

/// SELECT every row, ordered by primary key when the table has one.
pub fn select_all(table: &TableInfo, schema: &str, page: Page) -> QueryBuf {
    let mut q = QueryBuf::new();
    let order_clause = if table.primary_key.is_empty() {
        String::new()
    } else {
        let pk: Vec<String> = table.primary_key.iter().map(|c| quoted(c)).collect();
        format!(" ORDER BY {}", pk.join(", "))
    };
    let limit_clause = page
        .limit
        .map(|n| format!(" LIMIT {}", n.min(MAX_LIMIT)))
        .unwrap_or_default();
    let offset_clause = page.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_column_list(table),
        qualified_table(schema, &table.name),
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// `col = $n::type` for a path key, pushing the coerced value. Date columns match on the date part,
/// so get, update and delete by the same URL address the same rows.
fn key_condition(q: &mut QueryBuf, table: &TableInfo, key_column: &str, raw_value: &str) -> Result<String, AppError> {
    let col = column(table, key_column)?;
    let value = col.kind.coerce(&col.data_type, raw_value)?;
    Ok(if col.kind == ColumnKind::Date {
        let n = q.push_param(value);
        format!("CAST({} AS DATE) = ${}::date", quoted(&col.name), n)
    } else {
        let ph = q.push_typed(value, &col.cast_type);
        format!("{} = {}", quoted(&col.name), ph)
    })
}

/// SELECT rows whose key column equals the coerced path value.
pub fn select_by_key(table: &TableInfo, schema: &str, key_column: &str, raw_value: &str) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let condition = key_condition(&mut q, table, key_column, raw_value)?;
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_column_list(table),
        qualified_table(schema, &table.name),
        condition
    );
    Ok(q)
}

/// INSERT one row from a flat body; every key must be a column of the table.
pub fn insert(table: &TableInfo, schema: &str, body: &Map<String, Value>) -> Result<QueryBuf, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("entity data must not be empty".into()));
    }
    let mut q = QueryBuf::new();
    let mut cols = Vec::with_capacity(body.len());
    let mut placeholders = Vec::with_capacity(body.len());
    for (k, v) in body {
        let c = column(table, k)?;
        placeholders.push(q.push_typed(body_value(c, v)?, &c.cast_type));
        cols.push(quoted(&c.name));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table(schema, &table.name),
        cols.join(", "),
        placeholders.join(", ")
    );
    Ok(q)
}

/// UPDATE rows matching the key; SET covers exactly the body keys. Key parameter is last.
pub fn update(
    table: &TableInfo,
    schema: &str,
    body: &Map<String, Value>,
    key_column: &str,
    raw_key: &str,
) -> Result<QueryBuf, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("entity data must not be empty".into()));
    }
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(body.len());
    for (k, v) in body {
        let c = column(table, k)?;
        let ph = q.push_typed(body_value(c, v)?, &c.cast_type);
        sets.push(format!("{} = {}", quoted(&c.name), ph));
    }
    let condition = key_condition(&mut q, table, key_column, raw_key)?;
    q.sql = format!(
        "UPDATE {} SET {} WHERE {}",
        qualified_table(schema, &table.name),
        sets.join(", "),
        condition
    );
    Ok(q)
}

/// DELETE rows matching the key.
pub fn delete(table: &TableInfo, schema: &str, key_column: &str, raw_key: &str) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let condition = key_condition(&mut q, table, key_column, raw_key)?;
    q.sql = format!("DELETE FROM {} WHERE {}", qualified_table(schema, &table.name), condition);
    Ok(q)
}

/// SELECT the stored password column for the row whose user column matches.
pub fn select_password(
    table: &TableInfo,
    schema: &str,
    user_column: &str,
    password_column: &str,
    user_value: &str,
) -> Result<QueryBuf, AppError> {
    let user = column(table, user_column)?;
    let password = column(table, password_column)?;
    let mut q = QueryBuf::new();
    let condition = key_condition(&mut q, table, &user.name, user_value)?;
    q.sql = format!(
        "SELECT {}::text FROM {} WHERE {} LIMIT 1",
        quoted(&password.name),
        qualified_table(schema, &table.name),
        condition
    );
    Ok(q)
}

/// CALL a procedure with named arguments (`"param" => $n::type`), so body order is irrelevant.
/// Arrays and objects travel as their JSON text; scalars as their text form; null as NULL.
pub fn call_procedure(proc_: &ProcedureInfo, schema: &str, body: &Map<String, Value>) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut args = Vec::with_capacity(body.len());
    for (k, v) in body {
        let p = proc_.param(k).ok_or_else(|| {
            AppError::BadRequest(format!("procedure '{}' has no parameter '{}'", proc_.name, k))
        })?;
        let value = match v {
            Value::Null => Value::Null,
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        };
        let ph = q.push_typed(value, &p.cast_type);
        args.push(format!("{} => {}", quoted(&p.name), ph));
    }
    q.sql = format!("CALL {}({})", qualified_table(schema, &proc_.name), args.join(", "));
    Ok(q)
}
