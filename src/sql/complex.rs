//! Ad-hoc SELECT with joins, filters, grouping and aggregates, described as JSON.
//!
//! Nothing from the request reaches SQL text unchecked: tables come from the schema cache,
//! aliases are plain identifiers, field references are parsed into columns or aggregates over
//! columns, operators come from a fixed list, and every value is a bound parameter.

use crate::config::{is_identifier, quote_ident as quoted, ColumnInfo, SchemaCache, TableInfo};
use crate::error::AppError;
use crate::sql::builder::{qualified_table, select_expr, QueryBuf};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

#[derive(Debug, Default, Deserialize)]
pub struct ComplexQuery {
    #[serde(rename = "TablaPrincipal")]
    pub main_table: Option<MainTable>,
    #[serde(rename = "CamposSeleccionados", default)]
    pub fields: Vec<String>,
    #[serde(rename = "Joins", default)]
    pub joins: Vec<JoinSpec>,
    #[serde(rename = "CondicionesWhere", default)]
    pub where_conditions: Vec<Condition>,
    #[serde(rename = "CamposAgrupacion", default)]
    pub group_by: Vec<String>,
    #[serde(rename = "CondicionesHaving", default)]
    pub having_conditions: Vec<Condition>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MainTable {
    #[serde(rename = "Nombre")]
    pub name: Option<String>,
    #[serde(rename = "Alias")]
    pub alias: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinSpec {
    /// Table name, optionally followed by an inline alias (`docente d`, `docente AS d`).
    #[serde(rename = "TablaSecundaria")]
    pub table: Option<String>,
    #[serde(rename = "Alias")]
    pub alias: Option<String>,
    #[serde(rename = "TipoJoin")]
    pub kind: Option<String>,
    #[serde(rename = "CondicionJoin")]
    pub condition: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Condition {
    #[serde(rename = "Campo")]
    pub field: Option<String>,
    #[serde(rename = "Operador")]
    pub operator: Option<String>,
    #[serde(rename = "Valor", default)]
    pub value: Value,
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn bad(msg: impl Into<String>) -> AppError {
    AppError::BadRequest(msg.into())
}

const IDENT: &str = "[A-Za-z_][A-Za-z0-9_]*";

fn ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"^(?:({IDENT})\.)?({IDENT}|\*)$")).expect("field reference regex"))
}

fn aggregate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?i)(COUNT|SUM|AVG|MIN|MAX)\s*\(\s*(DISTINCT\s+)?(.+?)\s*\)$").expect("aggregate regex")
    })
}

fn output_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"^(.+?)\s+(?i:AS)\s+({IDENT})$")).expect("output name regex"))
}

fn table_alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+)(?:\s+(?i:AS))?\s+(\S+)$").expect("table alias regex"))
}

/// Tables visible to field references, by alias.
struct Scope<'a> {
    tables: Vec<(String, &'a TableInfo)>,
}

#[derive(Clone)]
struct ColumnRef<'a> {
    alias: String,
    column: &'a ColumnInfo,
}

impl ColumnRef<'_> {
    fn sql(&self) -> String {
        format!("{}.{}", quoted(&self.alias), quoted(&self.column.name))
    }
}

impl<'a> Scope<'a> {
    fn add(&mut self, alias: &str, table: &'a TableInfo) -> Result<(), AppError> {
        if !is_identifier(alias) {
            return Err(bad(format!("invalid alias '{}'", alias)));
        }
        if self.tables.iter().any(|(a, _)| a == alias) {
            return Err(bad(format!("duplicate alias '{}'", alias)));
        }
        self.tables.push((alias.to_string(), table));
        Ok(())
    }

    fn table(&self, alias: &str) -> Result<&'a TableInfo, AppError> {
        self.tables
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, t)| *t)
            .ok_or_else(|| bad(format!("unknown alias '{}'", alias)))
    }

    fn column(&self, qualifier: Option<&str>, name: &str) -> Result<ColumnRef<'a>, AppError> {
        if let Some(alias) = qualifier {
            let table = self.table(alias)?;
            let column = table
                .column(name)
                .ok_or_else(|| bad(format!("unknown column '{}.{}'", alias, name)))?;
            return Ok(ColumnRef { alias: alias.to_string(), column });
        }
        let mut found = self
            .tables
            .iter()
            .filter_map(|(a, t)| {
                let t: &'a TableInfo = *t;
                t.column(name).map(|c| ColumnRef { alias: a.clone(), column: c })
            });
        match (found.next(), found.next()) {
            (Some(c), None) => Ok(c),
            (Some(_), Some(_)) => Err(bad(format!("column '{}' is ambiguous", name))),
            (None, _) => Err(bad(format!("unknown column '{}'", name))),
        }
    }

    /// Every column of one table (`alias.*`) or of all tables (`*`), as (expression, name) pairs.
    fn star(&self, qualifier: Option<&str>) -> Result<Vec<(String, String)>, AppError> {
        let tables: Vec<(&str, &TableInfo)> = match qualifier {
            Some(alias) => vec![(alias, self.table(alias)?)],
            None => self.tables.iter().map(|(a, t)| (a.as_str(), *t)).collect(),
        };
        Ok(tables
            .into_iter()
            .flat_map(|(alias, t)| {
                t.columns
                    .iter()
                    .map(move |c| (select_expr(Some(alias), c), c.name.clone()))
            })
            .collect())
    }
}

/// Output names used so far in the select list. A repeated name gets a numeric suffix
/// (`id`, `id1`, `id2`) so no result column shadows another in the row object.
#[derive(Default)]
struct OutputNames(HashSet<String>);

impl OutputNames {
    fn claim(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n = 0;
        while !self.0.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{}{}", name, n);
        }
        candidate
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    fn parse(s: &str) -> Option<Self> {
        Some(match s.to_uppercase().as_str() {
            "COUNT" => Aggregate::Count,
            "SUM" => Aggregate::Sum,
            "AVG" => Aggregate::Avg,
            "MIN" => Aggregate::Min,
            "MAX" => Aggregate::Max,
            _ => return None,
        })
    }

    fn keyword(self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

enum Field<'a> {
    Column(ColumnRef<'a>),
    Star(Option<String>),
    Aggregate {
        func: Aggregate,
        distinct: bool,
        /// `None` is `COUNT(*)`.
        arg: Option<ColumnRef<'a>>,
    },
}

impl<'a> Field<'a> {
    fn parse(scope: &Scope<'a>, text: &str) -> Result<Self, AppError> {
        let text = text.trim();
        if let Some(caps) = aggregate_re().captures(text) {
            let func = Aggregate::parse(&caps[1]).ok_or_else(|| bad(format!("invalid aggregate '{}'", text)))?;
            let distinct = caps.get(2).is_some();
            let arg = match Field::parse_ref(scope, &caps[3])? {
                Field::Star(None) if func == Aggregate::Count && !distinct => None,
                Field::Column(c) => Some(c),
                _ => return Err(bad(format!("invalid aggregate argument in '{}'", text))),
            };
            return Ok(Field::Aggregate { func, distinct, arg });
        }
        Field::parse_ref(scope, text)
    }

    fn parse_ref(scope: &Scope<'a>, text: &str) -> Result<Self, AppError> {
        let caps = ref_re()
            .captures(text.trim())
            .ok_or_else(|| bad(format!("invalid field reference '{}'", text)))?;
        let qualifier = caps.get(1).map(|m| m.as_str());
        let name = &caps[2];
        if name == "*" {
            if let Some(alias) = qualifier {
                scope.table(alias)?;
            }
            return Ok(Field::Star(qualifier.map(String::from)));
        }
        scope.column(qualifier, name).map(Field::Column)
    }

    fn aggregate_sql(func: Aggregate, distinct: bool, arg: &Option<ColumnRef<'_>>) -> String {
        let inner = match arg {
            Some(c) if distinct => format!("DISTINCT {}", c.sql()),
            Some(c) => c.sql(),
            None => "*".into(),
        };
        format!("{}({})", func.keyword(), inner)
    }

    /// Select-list (expression, output name) pairs for this field; `name` is the requested output name.
    fn select_items(&self, scope: &Scope<'a>, name: Option<&str>) -> Result<Vec<(String, String)>, AppError> {
        match self {
            Field::Star(qualifier) => {
                if name.is_some() {
                    return Err(bad("'*' cannot be renamed"));
                }
                scope.star(qualifier.as_deref())
            }
            Field::Column(c) => {
                let expr = select_expr(Some(c.alias.as_str()), c.column);
                Ok(vec![(expr, name.unwrap_or(&c.column.name).to_string())])
            }
            Field::Aggregate { func, distinct, arg } => {
                let agg = Field::aggregate_sql(*func, *distinct, arg);
                let expr = match func {
                    Aggregate::Sum | Aggregate::Avg => format!("({})::float8", agg),
                    Aggregate::Min | Aggregate::Max if arg.as_ref().is_some_and(|c| c.column.selects_as_text()) => {
                        format!("({})::text", agg)
                    }
                    _ => agg,
                };
                let name = name.map_or_else(|| func.keyword().to_lowercase(), String::from);
                Ok(vec![(expr, name)])
            }
        }
    }

    /// Left-hand side of a condition and the type its parameters are cast to.
    fn comparable(&self) -> Result<(String, String), AppError> {
        match self {
            Field::Column(c) => Ok((c.sql(), c.column.cast_type.clone())),
            Field::Aggregate { func, distinct, arg } => {
                let cast = match func {
                    Aggregate::Count => "int8".to_string(),
                    Aggregate::Sum | Aggregate::Avg => "float8".to_string(),
                    Aggregate::Min | Aggregate::Max => arg
                        .as_ref()
                        .map(|c| c.column.cast_type.clone())
                        .unwrap_or_else(|| "text".into()),
                };
                Ok((Field::aggregate_sql(*func, *distinct, arg), cast))
            }
            Field::Star(_) => Err(bad("'*' cannot be compared")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operator {
    Compare(&'static str),
    Like(&'static str),
    In { negated: bool },
    Between,
    IsNull { negated: bool },
}

impl Operator {
    fn parse(raw: &str) -> Result<Self, AppError> {
        let norm = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        Ok(match norm.as_str() {
            "=" => Operator::Compare("="),
            "<>" | "!=" => Operator::Compare("<>"),
            "<" => Operator::Compare("<"),
            "<=" => Operator::Compare("<="),
            ">" => Operator::Compare(">"),
            ">=" => Operator::Compare(">="),
            "LIKE" => Operator::Like("LIKE"),
            "ILIKE" => Operator::Like("ILIKE"),
            "NOT LIKE" => Operator::Like("NOT LIKE"),
            "IN" => Operator::In { negated: false },
            "NOT IN" => Operator::In { negated: true },
            "BETWEEN" => Operator::Between,
            "IS NULL" => Operator::IsNull { negated: false },
            "IS NOT NULL" => Operator::IsNull { negated: true },
            _ => return Err(bad(format!("unsupported operator '{}'", raw.trim()))),
        })
    }
}

fn scalar(v: &Value, field: &str) -> Result<Value, AppError> {
    match v {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(v.clone()),
        _ => Err(bad(format!("condition on '{}' needs a scalar value", field))),
    }
}

fn condition_sql(q: &mut QueryBuf, field: &Field<'_>, op: Operator, value: &Value, text: &str) -> Result<String, AppError> {
    let (lhs, cast) = field.comparable()?;
    Ok(match op {
        Operator::Compare(sym) => {
            let ph = q.push_typed(scalar(value, text)?, &cast);
            format!("{} {} {}", lhs, sym, ph)
        }
        Operator::Like(sym) => {
            let ph = q.push_typed(scalar(value, text)?, "text");
            format!("{}::text {} {}", lhs, sym, ph)
        }
        Operator::In { negated } => {
            let items = value
                .as_array()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| bad(format!("IN on '{}' needs a non-empty array", text)))?;
            let mut phs = Vec::with_capacity(items.len());
            for v in items {
                phs.push(q.push_typed(scalar(v, text)?, &cast));
            }
            let kw = if negated { "NOT IN" } else { "IN" };
            format!("{} {} ({})", lhs, kw, phs.join(", "))
        }
        Operator::Between => {
            let bounds = value
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| bad(format!("BETWEEN on '{}' needs a two-element array", text)))?;
            let lo = q.push_typed(scalar(&bounds[0], text)?, &cast);
            let hi = q.push_typed(scalar(&bounds[1], text)?, &cast);
            format!("{} BETWEEN {} AND {}", lhs, lo, hi)
        }
        Operator::IsNull { negated } => {
            format!("{} IS {}NULL", lhs, if negated { "NOT " } else { "" })
        }
    })
}

fn join_keyword(kind: Option<&str>) -> Result<&'static str, AppError> {
    let Some(kind) = kind else {
        return Ok("INNER JOIN");
    };
    let words: Vec<String> = kind.split_whitespace().map(str::to_uppercase).collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    Ok(match words.as_slice() {
        ["INNER"] => "INNER JOIN",
        ["LEFT"] | ["LEFT", "OUTER"] => "LEFT JOIN",
        ["RIGHT"] | ["RIGHT", "OUTER"] => "RIGHT JOIN",
        ["FULL"] | ["FULL", "OUTER"] => "FULL JOIN",
        _ => return Err(bad(format!("unsupported join type '{}'", kind))),
    })
}

/// `a.x = b.y [AND c.z = d.w ...]`, each side a column in scope.
fn join_condition_sql(scope: &Scope<'_>, condition: &str) -> Result<String, AppError> {
    static AND_RE: OnceLock<Regex> = OnceLock::new();
    let and_re = AND_RE.get_or_init(|| Regex::new(r"(?i)\s+AND\s+").expect("join AND regex"));
    let mut parts = Vec::new();
    for part in and_re.split(condition.trim()) {
        let (l, r) = part
            .split_once('=')
            .ok_or_else(|| bad(format!("invalid join condition '{}'", condition)))?;
        let sides = [l, r]
            .iter()
            .map(|side| match Field::parse_ref(scope, side)? {
                Field::Column(c) => Ok(c.sql()),
                _ => Err(bad(format!("invalid join condition '{}'", condition))),
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        parts.push(format!("{} = {}", sides[0], sides[1]));
    }
    Ok(parts.join(" AND "))
}

impl ComplexQuery {
    /// Build the parameterized SELECT. Unknown tables are a 404, everything else malformed a 400.
    pub fn build(&self, cache: &SchemaCache) -> Result<QueryBuf, AppError> {
        let main = self
            .main_table
            .as_ref()
            .ok_or_else(|| bad("TablaPrincipal is required"))?;
        let main_name = non_blank(&main.name).ok_or_else(|| bad("TablaPrincipal.Nombre is required"))?;
        if !self.fields.iter().any(|f| !f.trim().is_empty()) {
            return Err(bad("at least one field must be selected"));
        }

        let lookup = |name: &str| {
            cache
                .table(name)
                .ok_or_else(|| AppError::NotFound(format!("table '{}' not found", name)))
        };

        let mut scope = Scope { tables: Vec::new() };
        let main_table = lookup(main_name)?;
        let main_alias = non_blank(&main.alias).unwrap_or(main_name);
        scope.add(main_alias, main_table)?;
        let mut from = format!(
            "FROM {} AS {}",
            qualified_table(&cache.schema, &main_table.name),
            quoted(main_alias)
        );

        for join in &self.joins {
            let (Some(target), Some(cond)) = (non_blank(&join.table), non_blank(&join.condition)) else {
                continue;
            };
            let (table_name, inline_alias) = match table_alias_re().captures(target) {
                Some(caps) => (caps.get(1).map_or(target, |m| m.as_str()), caps.get(2).map(|m| m.as_str())),
                None => (target, None),
            };
            let table = lookup(table_name)?;
            let alias = non_blank(&join.alias).or(inline_alias).unwrap_or(table_name);
            scope.add(alias, table)?;
            let keyword = join_keyword(non_blank(&join.kind))?;
            from.push_str(&format!(
                " {} {} AS {} ON {}",
                keyword,
                qualified_table(&cache.schema, &table.name),
                quoted(alias),
                join_condition_sql(&scope, cond)?
            ));
        }

        let mut select = Vec::new();
        let mut names = OutputNames::default();
        for text in self.fields.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
            let (expr, name) = match output_name_re().captures(text) {
                Some(caps) => (caps.get(1).map_or(text, |m| m.as_str()), caps.get(2).map(|m| m.as_str())),
                None => (text, None),
            };
            for (item, output) in Field::parse(&scope, expr)?.select_items(&scope, name)? {
                select.push(format!("{} AS {}", item, quoted(&names.claim(&output))));
            }
        }

        let mut q = QueryBuf::new();

        let mut wheres = Vec::new();
        for c in &self.where_conditions {
            let (Some(text), Some(op)) = (non_blank(&c.field), non_blank(&c.operator)) else {
                continue;
            };
            let field = Field::parse_ref(&scope, text)?;
            wheres.push(condition_sql(&mut q, &field, Operator::parse(op)?, &c.value, text)?);
        }

        let mut group = Vec::new();
        for text in self.group_by.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
            match Field::parse_ref(&scope, text)? {
                Field::Column(c) => group.push(c.sql()),
                _ => return Err(bad(format!("invalid grouping field '{}'", text))),
            }
        }

        let mut havings = Vec::new();
        for c in &self.having_conditions {
            let (Some(text), Some(op)) = (non_blank(&c.field), non_blank(&c.operator)) else {
                continue;
            };
            let op = Operator::parse(op)?;
            if !matches!(op, Operator::Compare(_)) {
                return Err(bad(format!("unsupported HAVING operator '{}'", c.operator.as_deref().unwrap_or(""))));
            }
            let field = Field::parse(&scope, text)?;
            havings.push(condition_sql(&mut q, &field, op, &c.value, text)?);
        }

        q.sql = format!("SELECT {} {}", select.join(", "), from);
        if !wheres.is_empty() {
            q.sql.push_str(&format!(" WHERE {}", wheres.join(" AND ")));
        }
        if !group.is_empty() {
            q.sql.push_str(&format!(" GROUP BY {}", group.join(", ")));
        }
        if !havings.is_empty() {
            q.sql.push_str(&format!(" HAVING {}", havings.join(" AND ")));
        }
        Ok(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> SchemaCache {
        let proyecto = TableInfo {
            name: "proyecto".into(),
            columns: vec![
                ColumnInfo::new("id", "integer", "pg_catalog", "int4"),
                ColumnInfo::new("titulo", "text", "pg_catalog", "text"),
                ColumnInfo::new("estado", "text", "pg_catalog", "text"),
                ColumnInfo::new("presupuesto", "numeric", "pg_catalog", "numeric"),
                ColumnInfo::new("docente_id", "integer", "pg_catalog", "int4"),
            ],
            primary_key: vec!["id".into()],
        };
        let docente = TableInfo {
            name: "docente".into(),
            columns: vec![
                ColumnInfo::new("id", "integer", "pg_catalog", "int4"),
                ColumnInfo::new("nombre", "text", "pg_catalog", "text"),
            ],
            primary_key: vec!["id".into()],
        };
        SchemaCache::new("public", vec![proyecto, docente], vec![])
    }

    fn parse(v: Value) -> ComplexQuery {
        serde_json::from_value(v).expect("valid complex query json")
    }

    #[test]
    fn full_query_has_fixed_clause_order() {
        let q = parse(json!({
            "TablaPrincipal": {"Nombre": "proyecto", "Alias": "p"},
            "CamposSeleccionados": ["d.nombre", "COUNT(*) AS total"],
            "Joins": [{"TablaSecundaria": "docente", "Alias": "d", "TipoJoin": "LEFT",
                       "CondicionJoin": "p.docente_id = d.id"}],
            "CondicionesWhere": [{"Campo": "p.estado", "Operador": "=", "Valor": "activo"}],
            "CamposAgrupacion": ["d.nombre"],
            "CondicionesHaving": [{"Campo": "COUNT(*)", "Operador": ">", "Valor": 1}]
        }))
        .build(&cache())
        .unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"d\".\"nombre\" AS \"nombre\", COUNT(*) AS \"total\" \
             FROM \"public\".\"proyecto\" AS \"p\" \
             LEFT JOIN \"public\".\"docente\" AS \"d\" ON \"p\".\"docente_id\" = \"d\".\"id\" \
             WHERE \"p\".\"estado\" = $1::\"pg_catalog\".\"text\" \
             GROUP BY \"d\".\"nombre\" \
             HAVING COUNT(*) > $2::int8"
        );
        assert_eq!(q.params, vec![json!("activo"), json!(1)]);
    }

    #[test]
    fn inline_join_alias_and_default_inner() {
        let q = parse(json!({
            "TablaPrincipal": {"Nombre": "proyecto", "Alias": "p"},
            "CamposSeleccionados": ["p.titulo", "d.nombre"],
            "Joins": [{"TablaSecundaria": "docente AS d", "CondicionJoin": "p.docente_id = d.id"}]
        }))
        .build(&cache())
        .unwrap();
        assert!(q.sql.contains("INNER JOIN \"public\".\"docente\" AS \"d\""));
    }

    #[test]
    fn aggregates_are_cast_for_decoding() {
        let q = parse(json!({
            "TablaPrincipal": {"Nombre": "proyecto"},
            "CamposSeleccionados": ["SUM(presupuesto)", "max(presupuesto) AS tope", "AVG(id)"]
        }))
        .build(&cache())
        .unwrap();
        assert_eq!(
            q.sql,
            "SELECT (SUM(\"proyecto\".\"presupuesto\"))::float8 AS \"sum\", \
             (MAX(\"proyecto\".\"presupuesto\"))::text AS \"tope\", \
             (AVG(\"proyecto\".\"id\"))::float8 AS \"avg\" \
             FROM \"public\".\"proyecto\" AS \"proyecto\""
        );
    }

    #[test]
    fn star_expands_to_columns() {
        let q = parse(json!({
            "TablaPrincipal": {"Nombre": "docente", "Alias": "d"},
            "CamposSeleccionados": ["d.*"]
        }))
        .build(&cache())
        .unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"d\".\"id\" AS \"id\", \"d\".\"nombre\" AS \"nombre\" FROM \"public\".\"docente\" AS \"d\""
        );
    }

    #[test]
    fn star_over_join_keeps_every_column() {
        let q = parse(json!({
            "TablaPrincipal": {"Nombre": "docente", "Alias": "d"},
            "CamposSeleccionados": ["*"],
            "Joins": [{"TablaSecundaria": "proyecto p", "CondicionJoin": "p.docente_id = d.id"}]
        }))
        .build(&cache())
        .unwrap();
        assert!(q.sql.starts_with(
            "SELECT \"d\".\"id\" AS \"id\", \"d\".\"nombre\" AS \"nombre\", \"p\".\"id\" AS \"id1\", \
             \"p\".\"titulo\" AS \"titulo\""
        ));
    }

    #[test]
    fn repeated_output_names_get_suffixes() {
        let q = parse(json!({
            "TablaPrincipal": {"Nombre": "proyecto", "Alias": "p"},
            "CamposSeleccionados": ["p.id", "d.id", "COUNT(*)", "COUNT(d.nombre)", "p.titulo AS id"],
            "Joins": [{"TablaSecundaria": "docente d", "CondicionJoin": "p.docente_id = d.id"}],
            "CamposAgrupacion": ["p.id", "d.id", "p.titulo"]
        }))
        .build(&cache())
        .unwrap();
        assert!(q.sql.starts_with(
            "SELECT \"p\".\"id\" AS \"id\", \"d\".\"id\" AS \"id1\", COUNT(*) AS \"count\", \
             COUNT(\"d\".\"nombre\") AS \"count1\", \"p\".\"titulo\" AS \"id2\" FROM"
        ));
    }

    #[test]
    fn in_between_and_null_forms() {
        let q = parse(json!({
            "TablaPrincipal": {"Nombre": "proyecto", "Alias": "p"},
            "CamposSeleccionados": ["p.id"],
            "CondicionesWhere": [
                {"Campo": "p.id", "Operador": "in", "Valor": [1, 2, 3]},
                {"Campo": "p.id", "Operador": "BETWEEN", "Valor": [1, 9]},
                {"Campo": "p.titulo", "Operador": "is not  null"},
                {"Campo": "p.titulo", "Operador": "ILIKE", "Valor": "%ia%"},
                {"Campo": "", "Operador": "=", "Valor": 1}
            ]
        }))
        .build(&cache())
        .unwrap();
        assert!(q.sql.ends_with(
            "WHERE \"p\".\"id\" IN ($1::\"pg_catalog\".\"int4\", $2::\"pg_catalog\".\"int4\", $3::\"pg_catalog\".\"int4\") \
             AND \"p\".\"id\" BETWEEN $4::\"pg_catalog\".\"int4\" AND $5::\"pg_catalog\".\"int4\" \
             AND \"p\".\"titulo\" IS NOT NULL \
             AND \"p\".\"titulo\"::text ILIKE $6::text"
        ));
        assert_eq!(q.params.len(), 6);
    }

    #[test]
    fn missing_main_table_or_fields() {
        let err = parse(json!({"CamposSeleccionados": ["id"]})).build(&cache()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = parse(json!({"TablaPrincipal": {"Nombre": "proyecto"}, "CamposSeleccionados": []}))
            .build(&cache())
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn unknown_table_is_not_found() {
        let err = parse(json!({"TablaPrincipal": {"Nombre": "pg_shadow"}, "CamposSeleccionados": ["*"]}))
            .build(&cache())
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn ambiguous_unqualified_column() {
        let err = parse(json!({
            "TablaPrincipal": {"Nombre": "proyecto", "Alias": "p"},
            "CamposSeleccionados": ["id"],
            "Joins": [{"TablaSecundaria": "docente d", "CondicionJoin": "p.docente_id = d.id"}]
        }))
        .build(&cache())
        .unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn rejects_injection_in_identifiers_conditions_and_operators() {
        let base = |extra: Value| {
            let mut v = json!({"TablaPrincipal": {"Nombre": "proyecto", "Alias": "p"}, "CamposSeleccionados": ["p.id"]});
            if let (Some(obj), Value::Object(extra)) = (v.as_object_mut(), extra) {
                obj.extend(extra);
            }
            parse(v).build(&cache())
        };
        assert!(base(json!({"CamposSeleccionados": ["p.id; DROP TABLE proyecto"]})).is_err());
        assert!(base(json!({"CamposSeleccionados": ["(SELECT 1)"]})).is_err());
        assert!(base(json!({"TablaPrincipal": {"Nombre": "proyecto", "Alias": "p; --"}})).is_err());
        assert!(base(json!({"Joins": [{"TablaSecundaria": "docente d",
            "CondicionJoin": "p.docente_id = d.id OR 1 = 1"}]}))
        .is_err());
        assert!(base(json!({"Joins": [{"TablaSecundaria": "docente d", "TipoJoin": "CROSS",
            "CondicionJoin": "p.docente_id = d.id"}]}))
        .is_err());
        assert!(base(json!({"CondicionesWhere": [{"Campo": "p.id", "Operador": "= 1 OR 1 =", "Valor": 1}]})).is_err());
        assert!(base(json!({"CondicionesWhere": [{"Campo": "p.id", "Operador": "BETWEEN", "Valor": [1]}]})).is_err());
        assert!(base(json!({"CondicionesHaving": [{"Campo": "COUNT(*)", "Operador": "IN", "Valor": [1]}]})).is_err());
    }

    #[test]
    fn blank_joins_are_skipped() {
        let q = parse(json!({
            "TablaPrincipal": {"Nombre": "proyecto"},
            "CamposSeleccionados": ["titulo"],
            "Joins": [{"TablaSecundaria": "", "CondicionJoin": ""}]
        }))
        .build(&cache())
        .unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"proyecto\".\"titulo\" AS \"titulo\" FROM \"public\".\"proyecto\" AS \"proyecto\""
        );
    }
}
