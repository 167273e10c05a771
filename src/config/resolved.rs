//! Schema cache: catalog metadata for the allow-listed tables and procedures, loaded once at startup.

use crate::error::AppError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// How path values are coerced for a column, derived from its catalog data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Decimal,
    Boolean,
    Float,
    Text,
    Uuid,
    Date,
    Other,
}

impl ColumnKind {
    /// Maps an `information_schema.columns.data_type` value. SQL Server spellings map too.
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.to_lowercase().as_str() {
            "integer" | "bigint" | "smallint" | "int" | "tinyint" => ColumnKind::Integer,
            "numeric" | "decimal" | "money" | "smallmoney" => ColumnKind::Decimal,
            "boolean" | "bit" => ColumnKind::Boolean,
            "real" | "double precision" | "float" => ColumnKind::Float,
            "character varying" | "character" | "text" | "varchar" | "nvarchar" | "nchar" | "char" | "citext" => {
                ColumnKind::Text
            }
            "uuid" | "uniqueidentifier" => ColumnKind::Uuid,
            "date"
            | "timestamp without time zone"
            | "timestamp with time zone"
            | "datetime"
            | "datetime2"
            | "smalldatetime" => ColumnKind::Date,
            _ => ColumnKind::Other,
        }
    }

    /// Parse a raw path value for this kind. Invalid literals are a 400.
    pub fn coerce(&self, data_type: &str, raw: &str) -> Result<Value, AppError> {
        let s = raw.trim();
        Ok(match self {
            ColumnKind::Integer => {
                let n: i64 = s
                    .parse()
                    .ok()
                    .filter(|n| integer_fits(data_type, *n))
                    .ok_or_else(|| AppError::BadRequest(format!("'{}' is not a valid integer", raw)))?;
                Value::Number(n.into())
            }
            ColumnKind::Decimal => {
                let ok = s.parse::<f64>().map(f64::is_finite).unwrap_or(false);
                if !ok {
                    return Err(AppError::BadRequest(format!("'{}' is not a valid decimal", raw)));
                }
                // Bound as text so the ::numeric cast keeps every digit.
                Value::String(s.to_string())
            }
            ColumnKind::Boolean => {
                if s.eq_ignore_ascii_case("true") {
                    Value::Bool(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Value::Bool(false)
                } else {
                    return Err(AppError::BadRequest(format!("'{}' is not a valid boolean", raw)));
                }
            }
            ColumnKind::Float => {
                let f: f64 = s
                    .parse()
                    .map_err(|_| AppError::BadRequest(format!("'{}' is not a valid float", raw)))?;
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| AppError::BadRequest(format!("'{}' is not a valid float", raw)))?
            }
            ColumnKind::Text => Value::String(raw.to_string()),
            ColumnKind::Uuid => {
                let u = uuid::Uuid::parse_str(s)
                    .map_err(|_| AppError::BadRequest(format!("'{}' is not a valid uuid", raw)))?;
                Value::String(u.to_string())
            }
            ColumnKind::Date => Value::String(
                parse_date(s).ok_or_else(|| AppError::BadRequest(format!("'{}' is not a valid date", raw)))?,
            ),
            ColumnKind::Other => {
                return Err(AppError::BadRequest(format!("unsupported data type: {}", data_type)));
            }
        })
    }
}

fn integer_fits(data_type: &str, n: i64) -> bool {
    match data_type.to_lowercase().as_str() {
        "tinyint" => u8::try_from(n).is_ok(),
        "smallint" => i16::try_from(n).is_ok(),
        "integer" | "int" => i32::try_from(n).is_ok(),
        _ => true,
    }
}

/// Date part (`YYYY-MM-DD`) of a date, naive datetime or RFC 3339 timestamp.
fn parse_date(s: &str) -> Option<String> {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|d| d.date()))
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok().map(|d| d.date()))
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Data types the row decoder reads natively; anything else is selected as text.
const NATIVE_TYPES: &[&str] = &[
    "smallint",
    "integer",
    "bigint",
    "real",
    "double precision",
    "boolean",
    "uuid",
    "timestamp with time zone",
    "timestamp without time zone",
    "date",
    "character varying",
    "character",
    "text",
    "name",
    "json",
    "jsonb",
];

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    /// `information_schema.columns.data_type`, e.g. "integer", "USER-DEFINED".
    pub data_type: String,
    pub kind: ColumnKind,
    /// Quoted `udt_schema.udt_name` used in `$n::type` casts.
    pub cast_type: String,
}

impl ColumnInfo {
    pub fn new(name: &str, data_type: &str, udt_schema: &str, udt_name: &str) -> Self {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            kind: ColumnKind::from_data_type(data_type),
            cast_type: format!("{}.{}", quote_ident(udt_schema), quote_ident(udt_name)),
        }
    }

    /// Whether SELECT must render this column as `::text` to decode it.
    pub fn selects_as_text(&self) -> bool {
        !NATIVE_TYPES.contains(&self.data_type.to_lowercase().as_str())
    }
}

#[derive(Clone, Debug)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct ProcedureParam {
    pub name: String,
    pub cast_type: String,
}

#[derive(Clone, Debug)]
pub struct ProcedureInfo {
    pub name: String,
    pub params: Vec<ProcedureParam>,
}

impl ProcedureInfo {
    /// Find a parameter by request key. A leading `@` is ignored and matching is case-insensitive.
    pub fn param(&self, key: &str) -> Option<&ProcedureParam> {
        let key = key.strip_prefix('@').unwrap_or(key);
        self.params.iter().find(|p| p.name.eq_ignore_ascii_case(key))
    }
}

#[derive(Clone, Debug, Default)]
pub struct SchemaCache {
    /// Schema the cached tables and procedures live in.
    pub schema: String,
    tables: BTreeMap<String, TableInfo>,
    procedures: HashMap<String, ProcedureInfo>,
}

impl SchemaCache {
    pub fn new(schema: &str, tables: Vec<TableInfo>, procedures: Vec<ProcedureInfo>) -> Self {
        SchemaCache {
            schema: schema.to_string(),
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
            procedures: procedures.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// Sorted names of exposed tables.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn procedure(&self, name: &str) -> Option<&ProcedureInfo> {
        self.procedures.get(name)
    }

    pub fn procedure_count(&self) -> usize {
        self.procedures.len()
    }
}

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
