//! Static validation of a definition document and a parameter bag.
//!
//! Validation never executes anything and never mutates its inputs. All
//! problems are collected into one [`ValidationReport`]; errors make the
//! report invalid, warnings are advisory.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use uqe_core::definition::ParameterSchema;
use uqe_core::{DataSourceKind, QueryDefinition, QueryError, QuerySource};

use crate::coerce;

/// Tables that should never be scanned without a `WHERE` clause.
pub const LARGE_TABLES: &[&str] = &[
    "audit_logs",
    "query_executions",
    "events",
    "logs",
    "user_sessions",
];

const MAX_TTL_SECONDS: f64 = 86_400.0;
const MAX_RESULTS_WARNING: u64 = 50_000;
const MAX_TIMEOUT_MS: u64 = 300_000;
const MAX_UNCAPPED_JOINS: usize = 3;

static DEFINITION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("id regex"));

static MUTATING_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(DROP|DELETE|UPDATE|INSERT|ALTER|CREATE|TRUNCATE|GRANT|REVOKE|EXEC|EXECUTE)\b")
        .expect("keyword regex")
});

static STACKED_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r";\s*(DROP|DELETE|UPDATE|INSERT|ALTER|CREATE|TRUNCATE|GRANT|REVOKE|EXEC|EXECUTE)\b")
        .expect("stacked regex")
});

static UNION_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bUNION\s+(ALL\s+)?SELECT\b").expect("union regex"));

static TAUTOLOGY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'[^']*'\s*=\s*'[^']*'|\bOR\s+\d+\s*=\s*\d+\b").expect("tautology regex")
});

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("comment regex"));

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\d+|\?\d*").expect("placeholder regex"));

static SELECT_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bSELECT\s+\*").expect("select regex"));

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:FROM|JOIN)\s+"?([A-Z0-9_]+)"?"#).expect("table reference regex")
});

static WHERE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bWHERE\b").expect("where regex"));

static LIMIT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bLIMIT\b").expect("limit regex"));

static JOIN_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bJOIN\b").expect("join regex"));

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn finish(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }

    fn fault(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![format!("Validation error: {}", message.into())],
            warnings: Vec::new(),
        }
    }

    /// Convert an invalid report into the error raised before execution.
    #[must_use]
    pub fn into_error(self) -> Option<QueryError> {
        if self.valid {
            return None;
        }
        Some(QueryError::Validation {
            errors: self.errors,
            warnings: self.warnings,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryValidator;

impl QueryValidator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validate a typed definition.
    #[must_use]
    pub fn validate_definition(
        &self,
        definition: &QueryDefinition,
        parameters: &Map<String, Value>,
    ) -> ValidationReport {
        match serde_json::to_value(definition.to_document()) {
            Ok(document) => self.validate(&document, parameters),
            Err(e) => ValidationReport::fault(e.to_string()),
        }
    }

    /// Validate a raw definition document against a parameter bag.
    #[must_use]
    pub fn validate(&self, document: &Value, parameters: &Map<String, Value>) -> ValidationReport {
        Self::run(document, Some(parameters))
    }

    /// Validate a document on its own, as done before storing it. The
    /// parameter schema must parse but no parameter values are checked.
    #[must_use]
    pub fn validate_document(&self, document: &Value) -> ValidationReport {
        Self::run(document, None)
    }

    fn run(document: &Value, parameters: Option<&Map<String, Value>>) -> ValidationReport {
        let mut report = ValidationReport::default();
        let Some(doc) = document.as_object() else {
            report.error("Query definition must be a JSON object");
            return report.finish();
        };

        let kind = check_structure(doc, &mut report);
        check_policies(doc, &mut report);
        check_parameters(doc, parameters, &mut report);

        if let Some(kind) = kind {
            match QuerySource::from_payload(kind, doc.get("query").unwrap_or(&Value::Null)) {
                Ok(QuerySource::Relational(query)) => {
                    let max_results = doc
                        .get("constraints")
                        .and_then(|c| c.get("maxResults"))
                        .and_then(Value::as_u64);
                    check_statement(&query.statement, max_results, &mut report);
                }
                Ok(_) => {}
                Err(e) if doc.contains_key("query") => report.error(e.to_string()),
                Err(_) => {}
            }
        }

        report.finish()
    }
}

fn check_structure(doc: &Map<String, Value>, report: &mut ValidationReport) -> Option<DataSourceKind> {
    for field in ["id", "name", "dataSource", "query", "access"] {
        match doc.get(field) {
            None | Some(Value::Null) => report.error(format!("Missing required field: {field}")),
            Some(Value::String(s)) if s.trim().is_empty() => {
                report.error(format!("Missing required field: {field}"));
            }
            Some(_) => {}
        }
    }

    if let Some(id) = doc.get("id").and_then(Value::as_str) {
        if !id.is_empty() && !DEFINITION_ID.is_match(id) {
            report.error(format!(
                "Invalid query id '{id}': only letters, digits, and underscores are allowed"
            ));
        }
    }

    if let Some(access) = doc.get("access") {
        match access.get("requiresAuth") {
            Some(Value::Bool(_)) => {}
            _ => report.error("access.requiresAuth must be explicitly set to true or false"),
        }
    }

    match doc.get("version").and_then(Value::as_str) {
        Some(version) if semver::Version::parse(version).is_err() => {
            report.warn(format!("Version '{version}' is not a semantic version"));
        }
        _ => {}
    }

    match doc.get("dataSource") {
        Some(Value::String(name)) => {
            let kind = DataSourceKind::parse(name);
            if kind.is_none() && !name.trim().is_empty() {
                report.error(format!(
                    "Unknown dataSource '{name}'; expected one of {}",
                    DataSourceKind::ACCEPTED_NAMES.join(", ")
                ));
            }
            kind
        }
        Some(Value::Null) | None => None,
        Some(other) => {
            report.error(format!("dataSource must be a string, got {other}"));
            None
        }
    }
}

fn check_policies(doc: &Map<String, Value>, report: &mut ValidationReport) {
    if let Some(cache) = doc.get("cache").and_then(Value::as_object) {
        let enabled = cache.get("enabled").and_then(Value::as_bool).unwrap_or(false);
        let ttl = cache.get("ttlSeconds").or_else(|| cache.get("ttl"));
        if enabled {
            match ttl.and_then(Value::as_f64) {
                Some(ttl) if ttl > 0.0 => {
                    if ttl > MAX_TTL_SECONDS {
                        report.warn(format!(
                            "cache.ttlSeconds of {ttl} exceeds 24 hours; results may be stale"
                        ));
                    }
                }
                _ => report.error("cache.ttlSeconds must be a positive number when caching is enabled"),
            }
        }
    }

    if let Some(constraints) = doc.get("constraints").and_then(Value::as_object) {
        if let Some(max) = constraints.get("maxResults").and_then(Value::as_u64) {
            if max > MAX_RESULTS_WARNING {
                report.warn(format!(
                    "constraints.maxResults of {max} exceeds {MAX_RESULTS_WARNING}"
                ));
            }
        }
        if let Some(timeout) = constraints.get("timeoutMs").and_then(Value::as_u64) {
            if timeout > MAX_TIMEOUT_MS {
                report.warn(format!(
                    "constraints.timeoutMs of {timeout} exceeds 5 minutes"
                ));
            }
        }
    }
}

fn check_parameters(
    doc: &Map<String, Value>,
    parameters: Option<&Map<String, Value>>,
    report: &mut ValidationReport,
) {
    let schema = match doc.get("parameters") {
        None | Some(Value::Null) => ParameterSchema::default(),
        Some(raw) => match serde_json::from_value::<ParameterSchema>(raw.clone()) {
            Ok(schema) => schema,
            Err(e) => {
                report.error(format!("Invalid parameter schema: {e}"));
                return;
            }
        },
    };
    let definitions = match schema.resolve() {
        Ok(definitions) => definitions,
        Err(e) => {
            report.error(e.to_string());
            return;
        }
    };
    let Some(parameters) = parameters else {
        return;
    };

    for def in &definitions {
        let supplied = parameters.get(&def.name).filter(|v| !v.is_null());
        let Some(value) = supplied else {
            if def.required && def.default.is_none() {
                report.error(format!("Missing required parameter: {}", def.name));
            }
            continue;
        };

        let coerced = match coerce::coerce(value, def.param_type) {
            Ok(coerced) => coerced,
            Err(reason) => {
                report.error(format!("Parameter '{}': {reason}", def.name));
                continue;
            }
        };
        if let Some(rules) = &def.validation {
            if let Err(reason) = coerce::check_rules(&coerced, rules) {
                report.error(format!("Parameter '{}': {reason}", def.name));
            }
        }
    }

    for key in parameters.keys() {
        if !definitions.iter().any(|def| &def.name == key) {
            report.warn(format!("Unexpected parameter: {key}"));
        }
    }
}

fn check_statement(statement: &str, max_results: Option<u64>, report: &mut ValidationReport) {
    let upper = statement.to_uppercase();

    if let Some(found) = MUTATING_KEYWORD.find(&upper) {
        report.error(format!(
            "Query contains dangerous operation: {}",
            found.as_str()
        ));
    }
    if STACKED_STATEMENT.is_match(&upper) {
        report.error("Potential SQL injection: stacked statement");
    }
    if UNION_SELECT.is_match(&upper) {
        report.error("Potential SQL injection: UNION SELECT");
    }
    if TAUTOLOGY.is_match(&upper) {
        report.error("Potential SQL injection: tautology");
    }
    if upper.contains("--") {
        report.error("Potential SQL injection: line comment");
    }
    if BLOCK_COMMENT.is_match(&upper) {
        report.error("Potential SQL injection: block comment");
    }
    if !PLACEHOLDER.is_match(&upper) {
        report.warn("Query has no parameter placeholders; make sure values are not inlined");
    }

    if SELECT_STAR.is_match(&upper) {
        report.warn("SELECT * returns every column; list the fields you need");
    }

    let has_where = WHERE_CLAUSE.is_match(&upper);
    let has_limit = LIMIT_CLAUSE.is_match(&upper);
    if !has_where {
        for capture in TABLE_REFERENCE.captures_iter(&upper) {
            let table = capture[1].to_lowercase();
            if LARGE_TABLES.contains(&table.as_str()) {
                report.warn(format!(
                    "Query on large table '{table}' has no WHERE clause"
                ));
            }
        }
    }
    if !has_limit && max_results.is_none() {
        report.warn("Query has no LIMIT and no constraints.maxResults");
    }
    let joins = JOIN_KEYWORD.find_iter(&upper).count();
    if joins > MAX_UNCAPPED_JOINS && !has_limit && max_results.is_none() {
        report.warn(format!("Query has {joins} JOINs and no result cap"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uqe_core::{ParamType, ParameterDefinition};

    fn relational(statement: &str) -> Value {
        json!({
            "id": "users_query",
            "name": "Users",
            "version": "1.0.0",
            "dataSource": "relational",
            "query": statement,
            "parameters": [{"name": "id", "type": "number", "required": true}],
            "access": {"requiresAuth": true},
            "constraints": {"maxResults": 100}
        })
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn clean_definition_is_valid() {
        let report = QueryValidator::new().validate(
            &relational("SELECT id, name FROM users WHERE id = $1"),
            &params(json!({"id": 1})),
        );
        assert_eq!(report.errors, Vec::<String>::new());
        assert!(report.valid);
    }

    #[test]
    fn stacked_drop_is_a_dangerous_operation() {
        let report = QueryValidator::new().validate(
            &relational("SELECT * FROM users; DROP TABLE users;"),
            &params(json!({"id": 1})),
        );
        assert!(!report.valid);
        assert!(
            report.errors.iter().any(|e| e.contains("dangerous operation")),
            "{:?}",
            report.errors
        );
        assert!(report.errors.iter().any(|e| e.contains("stacked statement")));
    }

    #[test]
    fn errors_accumulate() {
        let doc = json!({
            "id": "bad id!",
            "dataSource": "mainframe",
            "query": "SELECT 1",
            "access": {},
            "cache": {"enabled": true, "ttlSeconds": 0}
        });
        let report = QueryValidator::new().validate(&doc, &Map::new());
        assert!(!report.valid);
        let joined = report.errors.join("\n");
        assert!(joined.contains("Missing required field: name"), "{joined}");
        assert!(joined.contains("Invalid query id"), "{joined}");
        assert!(joined.contains("Unknown dataSource 'mainframe'"), "{joined}");
        assert!(joined.contains("requiresAuth"), "{joined}");
        assert!(joined.contains("ttlSeconds"), "{joined}");
    }

    #[test]
    fn injection_shapes_are_errors() {
        let validator = QueryValidator::new();
        for statement in [
            "SELECT name FROM users WHERE id = $1 UNION SELECT password FROM admins",
            "SELECT name FROM users WHERE name = '' OR '1'='1' AND id = $1",
            "SELECT name FROM users WHERE id = $1 OR 1=1",
            "SELECT name FROM users WHERE id = $1 -- trailing",
            "SELECT name /* hidden */ FROM users WHERE id = $1",
        ] {
            let report = validator.validate(&relational(statement), &params(json!({"id": 1})));
            assert!(!report.valid, "expected rejection of {statement}");
            assert!(
                report.errors.iter().any(|e| e.contains("Potential SQL injection")),
                "{statement}: {:?}",
                report.errors
            );
        }
    }

    #[test]
    fn keyword_inside_identifier_is_not_flagged() {
        let report = QueryValidator::new().validate(
            &relational("SELECT created_at, updated_by FROM users WHERE id = $1"),
            &params(json!({"id": 1})),
        );
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn performance_warnings() {
        let mut doc = relational("SELECT * FROM audit_logs");
        doc["constraints"] = json!({});
        let report = QueryValidator::new().validate(&doc, &params(json!({"id": 1})));
        assert!(report.valid);
        let joined = report.warnings.join("\n");
        assert!(joined.contains("SELECT *"), "{joined}");
        assert!(joined.contains("large table 'audit_logs'"), "{joined}");
        assert!(joined.contains("no LIMIT"), "{joined}");
        assert!(joined.contains("no parameter placeholders"), "{joined}");
    }

    #[test]
    fn many_joins_without_cap_warn() {
        let mut doc = relational(
            "SELECT a.id FROM a JOIN b ON a.id = b.id JOIN c ON a.id = c.id \
             JOIN d ON a.id = d.id JOIN e ON a.id = e.id WHERE a.id = $1",
        );
        doc["constraints"] = json!({});
        let report = QueryValidator::new().validate(&doc, &params(json!({"id": 1})));
        assert!(report.warnings.iter().any(|w| w.contains("4 JOINs")));
    }

    #[test]
    fn parameter_problems_are_reported_without_mutation() {
        let doc = json!({
            "id": "q",
            "name": "q",
            "version": "one",
            "dataSource": "postgres",
            "query": "SELECT id FROM users WHERE dept = $1 AND age > $2 LIMIT 10",
            "parameters": {
                "dept": {"type": "string", "validation": {"enum": ["eng", "ops"]}},
                "age": {"type": "number", "required": true, "validation": {"min": 18}}
            },
            "access": {"requiresAuth": false}
        });
        let input = params(json!({"dept": "sales", "age": "12", "extra": true}));
        let before = input.clone();
        let report = QueryValidator::new().validate(&doc, &input);

        assert_eq!(input, before);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("'dept'") && e.contains("must be one of")));
        assert!(report.errors.iter().any(|e| e.contains("'age'") && e.contains("at least 18")));
        assert!(report.warnings.iter().any(|w| w.contains("Unexpected parameter: extra")));
        assert!(report.warnings.iter().any(|w| w.contains("not a semantic version")));
    }

    #[test]
    fn missing_required_parameter_is_an_error() {
        let report = QueryValidator::new().validate(
            &relational("SELECT id FROM users WHERE id = $1"),
            &Map::new(),
        );
        assert!(report.errors.contains(&"Missing required parameter: id".to_string()));
    }

    #[test]
    fn validation_is_pure() {
        let validator = QueryValidator::new();
        let doc = relational("SELECT * FROM users; DROP TABLE users;");
        let input = params(json!({"id": "x", "other": 1}));
        assert_eq!(validator.validate(&doc, &input), validator.validate(&doc, &input));
    }

    #[test]
    fn non_object_document_is_rejected() {
        let report = QueryValidator::new().validate(&json!("SELECT 1"), &Map::new());
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn directory_definition_skips_sql_scan() {
        let doc = json!({
            "id": "inactive",
            "name": "Inactive",
            "dataSource": "ldap",
            "query": "{\"filter\":\"(lastLogon<={{days}})\",\"attributes\":[\"cn\"]}",
            "access": {"requiresAuth": true}
        });
        let report = QueryValidator::new().validate(&doc, &Map::new());
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn typed_definition_validates() {
        let def = QueryDefinition::relational("by_id", "SELECT id FROM users WHERE id = $1 LIMIT 1")
            .with_parameters(vec![ParameterDefinition::new("id", ParamType::Number).required()]);
        let report = QueryValidator::new().validate_definition(&def, &params(json!({"id": "7"})));
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.into_error().is_none());
    }

    #[test]
    fn document_validation_ignores_parameter_values() {
        let validator = QueryValidator::new();
        let doc = relational("SELECT id FROM users WHERE id = $1");
        assert!(validator.validate_document(&doc).valid);
        assert!(!validator.validate(&doc, &Map::new()).valid);

        let mut broken = doc;
        broken["parameters"] = json!([{"name": "id", "type": "uuid"}]);
        let report = validator.validate_document(&broken);
        assert!(!report.valid);
        assert!(report.errors[0].starts_with("Invalid parameter schema"));
    }
}
