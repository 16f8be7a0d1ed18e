//! Fluent builder for parameterized relational statements.
//!
//! Every caller-supplied value is bound as a `$N` placeholder; identifiers are
//! stripped to `[A-Za-z0-9_]` per dotted segment and double-quoted. Field
//! strings that match the aggregate or arithmetic-expression whitelist are
//! emitted verbatim: that whitelist is the only place raw text reaches the
//! statement.
//!
//! The builder fails fast: the first rejected input is returned as
//! `QueryError::Build` and the chain stops.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use uqe_core::{Logic, Operator, QueryError, SortDirection, WhereCondition};

/// Hard ceiling on `LIMIT`, whatever the caller asks for.
pub const MAX_LIMIT: u64 = 10_000;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("identifier regex"));

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("table regex"));

static AGGREGATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(COUNT|SUM|AVG|MIN|MAX)\(\s*(DISTINCT\s+)?(\*|[A-Za-z_][A-Za-z0-9_.]*)\s*\)(\s+AS\s+[A-Za-z_][A-Za-z0-9_]*)?$",
    )
    .expect("aggregate regex")
});

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[A-Za-z0-9_.]+(\s*[-+*/]\s*[A-Za-z0-9_.]+)*(\s+AS\s+[A-Za-z_][A-Za-z0-9_]*)?$",
    )
    .expect("expression regex")
});

static JOIN_CONDITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[A-Za-z0-9_."'\s=<>!()]+$"#).expect("join regex"));

/// A finished statement and its positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltQuery {
    pub text: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    select: Vec<String>,
    from: Option<String>,
    joins: Vec<String>,
    wheres: Vec<(Logic, String)>,
    group_by: Vec<String>,
    havings: Vec<(Logic, String)>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: u64,
    params: Vec<Value>,
}

fn build_error(message: impl Into<String>) -> QueryError {
    QueryError::Build(message.into())
}

/// Quote an identifier, stripping unsafe characters from each dotted segment.
///
/// # Errors
///
/// Returns `QueryError::Build` if any segment is empty after stripping.
pub fn escape_identifier(name: &str) -> Result<String, QueryError> {
    let mut segments = Vec::new();
    for segment in name.split('.') {
        let cleaned: String = segment
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if cleaned.is_empty() {
            return Err(build_error(format!("invalid identifier '{name}'")));
        }
        segments.push(format!("\"{cleaned}\""));
    }
    Ok(segments.join("."))
}

fn is_whitelisted(field: &str) -> bool {
    AGGREGATE.is_match(field) || EXPRESSION.is_match(field)
}

/// Render a select-list or group-by entry.
fn render_field(field: &str) -> Result<String, QueryError> {
    let field = field.trim();
    if field == "*" {
        return Ok("*".to_string());
    }
    if IDENTIFIER.is_match(field) {
        return escape_identifier(field);
    }
    if is_whitelisted(field) {
        return Ok(field.to_string());
    }
    Err(build_error(format!("field '{field}' is not allowed")))
}

/// Render the left-hand side of a condition or an `ORDER BY` key.
fn render_operand(field: &str) -> Result<String, QueryError> {
    let field = field.trim();
    if AGGREGATE.is_match(field) {
        return Ok(field.to_string());
    }
    escape_identifier(field)
}

fn render_table(table: &str, alias: Option<&str>) -> Result<String, QueryError> {
    if !TABLE_NAME.is_match(table) {
        return Err(build_error(format!("invalid table name '{table}'")));
    }
    match alias {
        Some(alias) if !TABLE_NAME.is_match(alias) => {
            Err(build_error(format!("invalid table alias '{alias}'")))
        }
        Some(alias) => Ok(format!("\"{table}\" AS \"{alias}\"")),
        None => Ok(format!("\"{table}\"")),
    }
}

impl QueryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every clause and bound parameter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// # Errors
    ///
    /// Returns `QueryError::Build` for an empty list or a rejected field.
    pub fn select<S: AsRef<str>>(mut self, fields: &[S]) -> Result<Self, QueryError> {
        if fields.is_empty() {
            return Err(build_error("select requires at least one field"));
        }
        for field in fields {
            let rendered = render_field(field.as_ref())?;
            self.select.push(rendered);
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `QueryError::Build` for an invalid table name or alias.
    pub fn from(mut self, table: &str, alias: Option<&str>) -> Result<Self, QueryError> {
        self.from = Some(render_table(table, alias)?);
        Ok(self)
    }

    /// Add a `WHERE` condition joined with `AND`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Build` for a bad field or operand.
    pub fn where_(self, field: &str, operator: Operator, value: Value) -> Result<Self, QueryError> {
        self.where_condition(&WhereCondition::new(field, operator, value))
    }

    /// # Errors
    ///
    /// Returns `QueryError::Build` for a bad field or operand.
    pub fn where_condition(mut self, condition: &WhereCondition) -> Result<Self, QueryError> {
        let fragment = self.render_condition(condition)?;
        self.wheres
            .push((condition.logic.unwrap_or_default(), fragment));
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns the first `QueryError::Build` among the conditions.
    pub fn where_all(self, conditions: &[WhereCondition]) -> Result<Self, QueryError> {
        conditions
            .iter()
            .try_fold(self, |builder, condition| builder.where_condition(condition))
    }

    /// Add a join. `join_type` is one of INNER, LEFT, RIGHT, FULL.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Build` for an unknown join type, a bad table, or
    /// an ON condition outside the allowed character set.
    pub fn join(
        mut self,
        join_type: &str,
        table: &str,
        alias: Option<&str>,
        on: &str,
    ) -> Result<Self, QueryError> {
        let join_type = join_type.trim().to_ascii_uppercase();
        if !matches!(join_type.as_str(), "INNER" | "LEFT" | "RIGHT" | "FULL") {
            return Err(build_error(format!("unsupported join type '{join_type}'")));
        }
        let table = render_table(table, alias)?;
        let on = on.trim();
        if on.is_empty() || !JOIN_CONDITION.is_match(on) || on.contains(';') || on.contains("--") {
            return Err(build_error(format!("join condition '{on}' is not allowed")));
        }
        self.joins.push(format!("{join_type} JOIN {table} ON {on}"));
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `QueryError::Build` for a rejected field.
    pub fn group_by<S: AsRef<str>>(mut self, fields: &[S]) -> Result<Self, QueryError> {
        for field in fields {
            let rendered = render_field(field.as_ref())?;
            self.group_by.push(rendered);
        }
        Ok(self)
    }

    /// Add a `HAVING` condition. The field may be a whitelisted aggregate.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Build` for a bad field or operand.
    pub fn having(mut self, condition: &WhereCondition) -> Result<Self, QueryError> {
        let fragment = self.render_condition(condition)?;
        self.havings
            .push((condition.logic.unwrap_or_default(), fragment));
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `QueryError::Build` unless `direction` is `asc` or `desc`.
    pub fn order_by(mut self, field: &str, direction: &str) -> Result<Self, QueryError> {
        let direction = SortDirection::parse(direction)
            .ok_or_else(|| build_error(format!("invalid sort direction '{direction}'")))?;
        let field = render_operand(field)?;
        self.order_by.push(format!("{field} {}", direction.as_sql()));
        Ok(self)
    }

    /// Set `LIMIT`, clamped to [`MAX_LIMIT`]. Negative values are ignored.
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        if let Ok(limit) = u64::try_from(limit) {
            self.limit = Some(limit.min(MAX_LIMIT));
        }
        self
    }

    /// Set `OFFSET`. Negative values leave the previous offset in place.
    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        if let Ok(offset) = u64::try_from(offset) {
            self.offset = offset;
        }
        self
    }

    #[must_use]
    pub const fn current_limit(&self) -> Option<u64> {
        self.limit
    }

    #[must_use]
    pub const fn current_offset(&self) -> u64 {
        self.offset
    }

    /// Assemble the statement.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Build` if SELECT or FROM is missing, or HAVING
    /// was used without GROUP BY.
    pub fn build(&self) -> Result<BuiltQuery, QueryError> {
        if self.select.is_empty() {
            return Err(build_error("SELECT clause is required"));
        }
        let Some(from) = &self.from else {
            return Err(build_error("FROM clause is required"));
        };
        if !self.havings.is_empty() && self.group_by.is_empty() {
            return Err(build_error("HAVING requires GROUP BY"));
        }

        let mut text = format!("SELECT {} FROM {from}", self.select.join(", "));
        for join in &self.joins {
            let _ = write!(text, " {join}");
        }
        if !self.wheres.is_empty() {
            let _ = write!(text, " WHERE {}", join_conditions(&self.wheres));
        }
        if !self.group_by.is_empty() {
            let _ = write!(text, " GROUP BY {}", self.group_by.join(", "));
        }
        if !self.havings.is_empty() {
            let _ = write!(text, " HAVING {}", join_conditions(&self.havings));
        }
        if !self.order_by.is_empty() {
            let _ = write!(text, " ORDER BY {}", self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            let _ = write!(text, " LIMIT {limit}");
        }
        if self.offset > 0 {
            let _ = write!(text, " OFFSET {}", self.offset);
        }

        Ok(BuiltQuery {
            text,
            params: self.params.clone(),
        })
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn render_condition(&mut self, condition: &WhereCondition) -> Result<String, QueryError> {
        let field = render_operand(&condition.field)?;
        let op = condition.operator;

        if op.takes_array() {
            let Value::Array(items) = &condition.value else {
                return Err(build_error(format!(
                    "operator '{op}' on '{}' requires an array value",
                    condition.field
                )));
            };
            if items.is_empty() {
                return Err(build_error(format!(
                    "operator '{op}' on '{}' requires a non-empty array",
                    condition.field
                )));
            }
            let placeholders: Vec<String> = items.iter().map(|v| self.bind(v.clone())).collect();
            let keyword = if op == Operator::In { "IN" } else { "NOT IN" };
            return Ok(format!("{field} {keyword} ({})", placeholders.join(", ")));
        }

        let fragment = match op {
            Operator::IsNull => format!("{field} IS NULL"),
            Operator::IsNotNull => format!("{field} IS NOT NULL"),
            Operator::IsEmpty => format!("({field} IS NULL OR {field} = '')"),
            Operator::IsNotEmpty => format!("({field} IS NOT NULL AND {field} <> '')"),
            Operator::ILike => {
                let p = self.bind(condition.value.clone());
                format!("LOWER({field}) LIKE LOWER({p})")
            }
            Operator::Eq
            | Operator::Ne
            | Operator::Gt
            | Operator::Gte
            | Operator::Lt
            | Operator::Lte
            | Operator::Like
            | Operator::In
            | Operator::Nin => {
                let symbol = comparison_symbol(op);
                let p = self.bind(condition.value.clone());
                format!("{field} {symbol} {p}")
            }
        };
        Ok(fragment)
    }
}

const fn comparison_symbol(op: Operator) -> &'static str {
    match op {
        Operator::Ne => "<>",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Like => "LIKE",
        _ => "=",
    }
}

fn join_conditions(conditions: &[(Logic, String)]) -> String {
    let mut out = String::new();
    for (idx, (logic, fragment)) in conditions.iter().enumerate() {
        if idx > 0 {
            let _ = write!(out, " {} ", logic.as_sql());
        }
        out.push_str(fragment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn builds_full_statement_in_clause_order() {
        let built = QueryBuilder::new()
            .select(&["u.id", "COUNT(o.id) AS orders"])
            .unwrap()
            .from("users", Some("u"))
            .unwrap()
            .join("left", "orders", Some("o"), "u.id = o.user_id")
            .unwrap()
            .where_("u.active", Operator::Eq, json!(true))
            .unwrap()
            .group_by(&["u.id"])
            .unwrap()
            .having(&WhereCondition::new("COUNT(o.id)", Operator::Gt, json!(2)))
            .unwrap()
            .order_by("u.id", "DESC")
            .unwrap()
            .limit(50)
            .offset(10)
            .build()
            .unwrap();

        assert_eq!(
            built.text,
            "SELECT \"u\".\"id\", COUNT(o.id) AS orders FROM \"users\" AS \"u\" \
             LEFT JOIN \"orders\" AS \"o\" ON u.id = o.user_id \
             WHERE \"u\".\"active\" = $1 GROUP BY \"u\".\"id\" \
             HAVING COUNT(o.id) > $2 ORDER BY \"u\".\"id\" DESC LIMIT 50 OFFSET 10"
        );
        assert_eq!(built.params, vec![json!(true), json!(2)]);
    }

    #[test]
    fn in_binds_each_element_and_or_logic_joins() {
        let built = QueryBuilder::new()
            .select(&["*"])
            .unwrap()
            .from("users", None)
            .unwrap()
            .where_("dept", Operator::In, json!(["eng", "ops"]))
            .unwrap()
            .where_condition(&WhereCondition::new("name", Operator::ILike, json!("%ann%")).or())
            .unwrap()
            .where_("deleted_at", Operator::IsNull, Value::Null)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            built.text,
            "SELECT * FROM \"users\" WHERE \"dept\" IN ($1, $2) \
             OR LOWER(\"name\") LIKE LOWER($3) AND \"deleted_at\" IS NULL"
        );
        assert_eq!(built.params, vec![json!("eng"), json!("ops"), json!("%ann%")]);
    }

    #[test]
    fn limit_is_capped_and_negative_offset_ignored() {
        let builder = QueryBuilder::new().limit(15_000);
        assert_eq!(builder.current_limit(), Some(10_000));

        let builder = QueryBuilder::new().offset(-1);
        assert_eq!(builder.current_offset(), 0);

        let builder = QueryBuilder::new().offset(20).offset(-5);
        assert_eq!(builder.current_offset(), 20);
    }

    #[test]
    fn build_requires_select_and_from() {
        let err = QueryBuilder::new().from("users", None).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("SELECT"));

        let err = QueryBuilder::new().select(&["id"]).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("FROM"));
    }

    #[test]
    fn having_without_group_by_fails() {
        let err = QueryBuilder::new()
            .select(&["COUNT(*)"])
            .unwrap()
            .from("users", None)
            .unwrap()
            .having(&WhereCondition::new("COUNT(*)", Operator::Gt, json!(1)))
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("HAVING requires GROUP BY"));
    }

    #[rstest]
    #[case("id; DROP TABLE users")]
    #[case("name' OR '1'='1")]
    #[case("(SELECT password FROM admins)")]
    #[case("")]
    fn select_rejects_unsafe_fields(#[case] field: &str) {
        assert!(QueryBuilder::new().select(&[field]).is_err());
    }

    #[rstest]
    #[case("users; --")]
    #[case("users u")]
    #[case("1users")]
    fn from_rejects_bad_table_names(#[case] table: &str) {
        assert!(QueryBuilder::new().from(table, None).is_err());
    }

    #[rstest]
    #[case("a.id = b.id; DROP TABLE x")]
    #[case("a.id = b.id -- comment")]
    #[case("a.id = b.id OR 1=1 /* x */")]
    fn join_rejects_unsafe_conditions(#[case] on: &str) {
        assert!(QueryBuilder::new().join("inner", "orders", None, on).is_err());
    }

    #[test]
    fn join_rejects_unknown_type() {
        assert!(QueryBuilder::new().join("cross", "orders", None, "a.id = b.id").is_err());
    }

    #[test]
    fn order_by_rejects_other_directions() {
        assert!(QueryBuilder::new().order_by("id", "sideways").is_err());
    }

    #[test]
    fn in_requires_non_empty_array() {
        assert!(QueryBuilder::new().where_("id", Operator::In, json!(5)).is_err());
        assert!(QueryBuilder::new().where_("id", Operator::Nin, json!([])).is_err());
    }

    #[test]
    fn where_field_is_stripped_and_quoted() {
        let built = QueryBuilder::new()
            .select(&["id"])
            .unwrap()
            .from("users", None)
            .unwrap()
            .where_("na\"me;--", Operator::Eq, json!("x"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(built.text, "SELECT \"id\" FROM \"users\" WHERE \"name\" = $1");
    }

    #[rstest]
    #[case("users.email")]
    #[case("price * quantity AS total")]
    #[case("MAX(created_at) AS latest")]
    #[case("count(DISTINCT user_id)")]
    fn emitted_text_has_no_statement_breakers(#[case] field: &str) {
        let built = QueryBuilder::new()
            .select(&[field])
            .unwrap()
            .from("users", None)
            .unwrap()
            .where_("id", Operator::Ne, json!("'; DROP TABLE users; --"))
            .unwrap()
            .build()
            .unwrap();
        assert!(!built.text.contains(';'));
        assert!(!built.text.contains('\''));
        assert!(!built.text.contains("--"));
    }

    #[test]
    fn escape_identifier_rejects_empty_segments() {
        assert!(escape_identifier("users..id").is_err());
        assert!(escape_identifier("'';").is_err());
        assert_eq!(escape_identifier("public.users").unwrap(), "\"public\".\"users\"");
    }

    #[test]
    fn reset_clears_everything() {
        let mut builder = QueryBuilder::new()
            .select(&["id"])
            .unwrap()
            .from("users", None)
            .unwrap()
            .where_("id", Operator::Eq, json!(1))
            .unwrap();
        builder.reset();
        assert!(builder.build().is_err());
    }
}
