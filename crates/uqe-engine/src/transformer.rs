//! Reshapes fetched rows according to a definition's result mapping.
//!
//! Order is fixed: field mapping, then filters, then sort, then limit. A
//! failure converting one field keeps that field's original value; a mapping
//! or filter that cannot be interpreted at all fails the whole stage.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value, json};
use uqe_core::{
    FieldMapping, Logic, Operator, QueryError, ResultMapping, Row, SortDirection, SortSpec,
    WhereCondition,
};

use crate::coerce::{self, format_timestamp, number_value, stringify, values_equal};
use crate::params::from_file_time;

const TRUNCATE_AT: usize = 50;

const UAC_ACCOUNTDISABLE: i64 = 0x0002;
const UAC_LOCKOUT: i64 = 0x0010;
const UAC_PASSWD_NOTREQD: i64 = 0x0020;
const UAC_NORMAL_ACCOUNT: i64 = 0x0200;
const UAC_DONT_EXPIRE_PASSWORD: i64 = 0x1_0000;
const UAC_SMARTCARD_REQUIRED: i64 = 0x4_0000;
const UAC_PASSWORD_EXPIRED: i64 = 0x80_0000;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultTransformer;

struct CompiledFilter<'a> {
    condition: &'a WhereCondition,
    pattern: Option<Regex>,
}

impl ResultTransformer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Apply `mapping` to `rows`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Transform` if the mapping or a filter is malformed.
    pub fn transform(&self, rows: Vec<Row>, mapping: &ResultMapping) -> Result<Vec<Row>, QueryError> {
        let fields = mapping
            .field_mappings
            .resolve()
            .map_err(|e| QueryError::Transform(e.to_string()))?;
        let filters = compile_filters(&mapping.filters)?;

        let mut rows: Vec<Row> = if fields.is_empty() {
            rows
        } else {
            rows.into_iter().map(|row| map_row(row, &fields)).collect()
        };

        if !filters.is_empty() {
            rows.retain(|row| matches_all(row, &filters));
        }
        if !mapping.sort.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &mapping.sort));
        }
        if let Some(limit) = mapping.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

fn map_row(row: Row, fields: &[FieldMapping]) -> Row {
    let mut out = Map::with_capacity(row.len());
    for (key, value) in row {
        let mut mapped = false;
        for field in fields.iter().filter(|f| f.source == key) {
            mapped = true;
            out.insert(field.target.clone(), map_value(&value, field));
        }
        if !mapped {
            out.insert(key, value);
        }
    }
    out
}

fn map_value(value: &Value, field: &FieldMapping) -> Value {
    let coerced = match field.value_type {
        Some(ty) => match coerce::coerce(value, ty) {
            Ok(coerced) => coerced,
            Err(reason) => {
                tracing::debug!(field = %field.source, %reason, "field coercion failed; keeping original");
                return value.clone();
            }
        },
        None => value.clone(),
    };

    let Some(name) = &field.transform else {
        return coerced;
    };
    match apply_field_transform(name, &coerced) {
        Ok(transformed) => transformed,
        Err(reason) => {
            tracing::debug!(field = %field.source, transform = %name, %reason, "field transform failed; keeping original");
            value.clone()
        }
    }
}

/// Apply a named output transform to a single value.
///
/// # Errors
///
/// Returns a reason when the value does not fit the transform or the name is
/// unknown.
pub fn apply_field_transform(name: &str, value: &Value) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match name {
        "fileTimeToDate" => file_time_to_date(value),
        "dnToName" => Ok(Value::String(dn_to_name(&stringify(value)))),
        "userAccountControl" => user_account_control(as_i64(value)?),
        "bytesToMB" => Ok(round2(as_f64(value)? / 1_048_576.0)),
        "msToSeconds" => Ok(round2(as_f64(value)? / 1_000.0)),
        "capitalize" => Ok(Value::String(capitalize(&stringify(value)))),
        "truncate" => Ok(Value::String(truncate(&stringify(value)))),
        "anonymize" => Ok(Value::String(anonymize(&stringify(value)))),
        unknown => Err(format!("unknown transform '{unknown}'")),
    }
}

fn as_i64(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .ok_or_else(|| format!("{n} is not an integer")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{s}' is not an integer")),
        other => Err(format!("{other} is not an integer")),
    }
}

fn as_f64(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("{other} is not a number")),
    }
}

fn round2(n: f64) -> Value {
    number_value((n * 100.0).round() / 100.0)
}

fn file_time_to_date(value: &Value) -> Result<Value, String> {
    let ticks = as_i64(value)?;
    match ticks {
        0 => Ok(Value::Null),
        i64::MAX => Ok(Value::String("never".to_string())),
        ticks => from_file_time(ticks)
            .map(|dt| Value::String(format_timestamp(dt)))
            .ok_or_else(|| format!("{ticks} is outside the representable range")),
    }
}

/// Leaf common name of a distinguished name, or the input if it has none.
fn dn_to_name(dn: &str) -> String {
    let first = split_rdn(dn);
    match first.split_once('=') {
        Some((attr, name)) if attr.trim().eq_ignore_ascii_case("CN") => {
            name.trim().replace("\\,", ",")
        }
        _ => dn.to_string(),
    }
}

/// First relative name of a DN, honoring `\,` escapes.
fn split_rdn(dn: &str) -> &str {
    let bytes = dn.as_bytes();
    for (idx, byte) in bytes.iter().enumerate() {
        if *byte == b',' && (idx == 0 || bytes[idx - 1] != b'\\') {
            return &dn[..idx];
        }
    }
    dn
}

fn user_account_control(flags: i64) -> Result<Value, String> {
    let disabled = flags & UAC_ACCOUNTDISABLE != 0;
    let locked = flags & UAC_LOCKOUT != 0;
    let expired = flags & UAC_PASSWORD_EXPIRED != 0;
    let status = if disabled {
        "Disabled"
    } else if locked {
        "Locked"
    } else if expired {
        "PasswordExpired"
    } else {
        "Active"
    };
    Ok(json!({
        "value": flags,
        "disabled": disabled,
        "locked": locked,
        "passwordExpired": expired,
        "passwordNeverExpires": flags & UAC_DONT_EXPIRE_PASSWORD != 0,
        "passwordNotRequired": flags & UAC_PASSWD_NOTREQD != 0,
        "normalAccount": flags & UAC_NORMAL_ACCOUNT != 0,
        "smartcardRequired": flags & UAC_SMARTCARD_REQUIRED != 0,
        "status": status,
    }))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= TRUNCATE_AT {
        return s.to_string();
    }
    let head: String = s.chars().take(TRUNCATE_AT).collect();
    format!("{head}...")
}

fn anonymize(s: &str) -> String {
    if let Some((local, domain)) = s.split_once('@') {
        let first = local.chars().next().map(String::from).unwrap_or_default();
        return format!("{first}***@{domain}");
    }

    let digits = s.chars().filter(char::is_ascii_digit).count();
    let phone_like = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ' | '.'));
    if phone_like && digits >= 7 {
        let mut seen = 0;
        return s
            .chars()
            .map(|c| {
                if c.is_ascii_digit() {
                    seen += 1;
                    if seen > 3 {
                        return '*';
                    }
                }
                c
            })
            .collect();
    }

    let chars: Vec<char> = s.chars().collect();
    match chars.len() {
        0 => String::new(),
        1 | 2 => "*".repeat(chars.len()),
        len => {
            let mut out = String::with_capacity(len);
            out.push(chars[0]);
            out.push_str(&"*".repeat(len - 2));
            out.push(chars[len - 1]);
            out
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn compile_filters(conditions: &[WhereCondition]) -> Result<Vec<CompiledFilter<'_>>, QueryError> {
    conditions
        .iter()
        .map(|condition| {
            if condition.operator.takes_array() && !condition.value.is_array() {
                return Err(QueryError::Transform(format!(
                    "filter '{}' on '{}' requires an array value",
                    condition.operator, condition.field
                )));
            }
            let pattern = match condition.operator {
                Operator::Like => Some(like_regex(&stringify(&condition.value), false)?),
                Operator::ILike => Some(like_regex(&stringify(&condition.value), true)?),
                _ => None,
            };
            Ok(CompiledFilter { condition, pattern })
        })
        .collect()
}

fn like_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, QueryError> {
    let mut expr = String::from(if case_insensitive { "(?is)^" } else { "(?s)^" });
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| QueryError::Transform(format!("invalid LIKE pattern: {e}")))
}

/// Conditions combine left to right; each one's `logic` joins it to the
/// running result.
fn matches_all(row: &Row, filters: &[CompiledFilter<'_>]) -> bool {
    let mut result = true;
    for (idx, filter) in filters.iter().enumerate() {
        let matched = matches(row, filter);
        result = if idx == 0 {
            matched
        } else {
            match filter.condition.logic.unwrap_or_default() {
                Logic::And => result && matched,
                Logic::Or => result || matched,
            }
        };
    }
    result
}

fn matches(row: &Row, filter: &CompiledFilter<'_>) -> bool {
    let condition = filter.condition;
    let field = row.get(&condition.field).unwrap_or(&Value::Null);
    let expected = &condition.value;

    match condition.operator {
        Operator::Eq => loose_equal(field, expected),
        Operator::Ne => !loose_equal(field, expected),
        Operator::Gt => ordered(field, expected) == Some(Ordering::Greater),
        Operator::Gte => matches!(ordered(field, expected), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Lt => ordered(field, expected) == Some(Ordering::Less),
        Operator::Lte => matches!(ordered(field, expected), Some(Ordering::Less | Ordering::Equal)),
        Operator::In => in_list(field, expected),
        Operator::Nin => !in_list(field, expected),
        Operator::Like | Operator::ILike => {
            !field.is_null()
                && filter
                    .pattern
                    .as_ref()
                    .is_some_and(|re| re.is_match(&stringify(field)))
        }
        Operator::IsNull => field.is_null(),
        Operator::IsNotNull => !field.is_null(),
        Operator::IsEmpty => is_empty(field),
        Operator::IsNotEmpty => !is_empty(field),
    }
}

fn loose_equal(a: &Value, b: &Value) -> bool {
    if values_equal(a, b) {
        return true;
    }
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            as_f64(a).ok().zip(as_f64(b).ok()).is_some_and(|(x, y)| x == y)
        }
        _ => false,
    }
}

fn ordered(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => as_f64(a).ok()?.partial_cmp(&as_f64(b).ok()?),
    }
}

fn in_list(field: &Value, list: &Value) -> bool {
    list.as_array()
        .is_some_and(|items| items.iter().any(|item| loose_equal(field, item)))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

fn compare_rows(a: &Row, b: &Row, keys: &[SortSpec]) -> Ordering {
    for key in keys {
        let left = a.get(&key.field).unwrap_or(&Value::Null);
        let right = b.get(&key.field).unwrap_or(&Value::Null);
        let ordering = compare_values(left, right);
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Total order over JSON values: null sorts lowest, then booleans, numbers,
/// strings, and containers by their JSON text.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    const fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .total_cmp(&y.as_f64().unwrap_or(0.0)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if rank(a) == rank(b) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use uqe_core::{FieldMappings, ParamType};

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    fn mapping(value: Value) -> ResultMapping {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn row_already_in_shape_round_trips() {
        let rows = vec![row(json!({"id": 1, "name": "Ann", "tags": ["a"]}))];
        let out = ResultTransformer::new()
            .transform(
                rows.clone(),
                &mapping(json!({"fieldMappings": [
                    {"source": "id", "target": "id"},
                    {"source": "name", "target": "name"}
                ]})),
            )
            .unwrap();
        assert_eq!(out, rows);
    }

    #[test]
    fn maps_and_transforms_fields_keeping_unmapped() {
        let rows = vec![row(json!({
            "sAMAccountName": "jdoe",
            "manager": "CN=Jane Roe,OU=Staff,DC=corp,DC=example",
            "lastLogon": "0",
            "mail": "jdoe@example.com"
        }))];
        let out = ResultTransformer::new()
            .transform(
                rows,
                &mapping(json!({"fieldMappings": {
                    "sAMAccountName": "username",
                    "manager": {"target": "managerName", "transform": "dnToName"},
                    "lastLogon": {"target": "lastLogin", "transform": "fileTimeToDate"}
                }})),
            )
            .unwrap();
        assert_eq!(
            out[0],
            row(json!({
                "username": "jdoe",
                "managerName": "Jane Roe",
                "lastLogin": null,
                "mail": "jdoe@example.com"
            }))
        );
    }

    #[test]
    fn failed_field_transform_keeps_original_value() {
        let rows = vec![row(json!({"size": "huge", "other": 1}))];
        let out = ResultTransformer::new()
            .transform(
                rows,
                &mapping(json!({"fieldMappings": [
                    {"source": "size", "target": "sizeMb", "transform": "bytesToMB"}
                ]})),
            )
            .unwrap();
        assert_eq!(out[0], row(json!({"sizeMb": "huge", "other": 1})));
    }

    #[test]
    fn typed_mapping_coerces_first() {
        let field = FieldMapping {
            source: "count".into(),
            target: "count".into(),
            value_type: Some(ParamType::Number),
            transform: None,
        };
        let out = ResultTransformer::new()
            .transform(
                vec![row(json!({"count": "42"}))],
                &ResultMapping {
                    field_mappings: FieldMappings::List(vec![field]),
                    ..ResultMapping::default()
                },
            )
            .unwrap();
        assert_eq!(out[0]["count"], json!(42));
    }

    #[test]
    fn malformed_mapping_is_an_error() {
        let err = ResultTransformer::new()
            .transform(vec![], &mapping(json!({"fieldMappings": {"a": 3}})))
            .unwrap_err();
        assert!(matches!(err, QueryError::Transform(_)));

        let err = ResultTransformer::new()
            .transform(
                vec![],
                &mapping(json!({"filters": [{"field": "a", "operator": "in", "value": 1}]})),
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::Transform(_)));
    }

    #[test]
    fn filter_sort_limit_in_order() {
        let rows = vec![
            row(json!({"name": "carol", "dept": "eng", "age": 41})),
            row(json!({"name": "alice", "dept": "eng", "age": 30})),
            row(json!({"name": "bob", "dept": "ops", "age": null})),
            row(json!({"name": "dave", "dept": "eng", "age": 25})),
        ];
        let out = ResultTransformer::new()
            .transform(
                rows,
                &mapping(json!({
                    "filters": [{"field": "dept", "operator": "eq", "value": "eng"}],
                    "sort": [{"field": "age", "direction": "desc"}],
                    "limit": 2
                })),
            )
            .unwrap();
        let names: Vec<&str> = out.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["carol", "alice"]);
    }

    #[test]
    fn nulls_sort_lowest_ascending() {
        let rows = vec![
            row(json!({"n": 2})),
            row(json!({"n": null})),
            row(json!({"n": 1})),
        ];
        let out = ResultTransformer::new()
            .transform(rows, &mapping(json!({"sort": [{"field": "n"}]})))
            .unwrap();
        let values: Vec<Value> = out.iter().map(|r| r["n"].clone()).collect();
        assert_eq!(values, vec![Value::Null, json!(1), json!(2)]);
    }

    #[test]
    fn or_filters_and_like_patterns() {
        let rows = vec![
            row(json!({"mail": "ann@corp.com", "status": "x"})),
            row(json!({"mail": "bob@home.net", "status": "locked"})),
            row(json!({"mail": "cy@home.net", "status": ""})),
        ];
        let out = ResultTransformer::new()
            .transform(
                rows,
                &mapping(json!({"filters": [
                    {"field": "mail", "operator": "ilike", "value": "%@CORP.%"},
                    {"field": "status", "operator": "isEmpty", "logic": "OR"}
                ]})),
            )
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["mail"], "cy@home.net");
    }

    #[rstest]
    #[case("fileTimeToDate", json!(0), Value::Null)]
    #[case("fileTimeToDate", json!(i64::MAX), json!("never"))]
    #[case("fileTimeToDate", json!("116444736000000000"), json!("1970-01-01T00:00:00.000Z"))]
    #[case("dnToName", json!("CN=Doe\\, John,OU=Users,DC=corp"), json!("Doe, John"))]
    #[case("dnToName", json!("OU=Users,DC=corp"), json!("OU=Users,DC=corp"))]
    #[case("bytesToMB", json!(5_242_880), json!(5))]
    #[case("bytesToMB", json!(1_500_000), json!(1.43))]
    #[case("msToSeconds", json!(1234), json!(1.23))]
    #[case("capitalize", json!("alice"), json!("Alice"))]
    #[case("anonymize", json!("jdoe@example.com"), json!("j***@example.com"))]
    #[case("anonymize", json!("555-123-4567"), json!("555-***-****"))]
    #[case("anonymize", json!("secret"), json!("s****t"))]
    fn field_transforms(#[case] name: &str, #[case] input: Value, #[case] expected: Value) {
        assert_eq!(apply_field_transform(name, &input).unwrap(), expected);
    }

    #[test]
    fn truncate_appends_ellipsis_past_fifty_chars() {
        let long = "x".repeat(60);
        let out = apply_field_transform("truncate", &json!(long)).unwrap();
        assert_eq!(out.as_str().unwrap().len(), 53);
        assert!(out.as_str().unwrap().ends_with("..."));
        let short = apply_field_transform("truncate", &json!("short")).unwrap();
        assert_eq!(short, json!("short"));
    }

    #[test]
    fn user_account_control_status_labels() {
        let disabled = apply_field_transform("userAccountControl", &json!(514)).unwrap();
        assert_eq!(disabled["status"], "Disabled");
        assert_eq!(disabled["normalAccount"], true);

        let active = apply_field_transform("userAccountControl", &json!(66048)).unwrap();
        assert_eq!(active["status"], "Active");
        assert_eq!(active["passwordNeverExpires"], true);

        let locked = apply_field_transform("userAccountControl", &json!("528")).unwrap();
        assert_eq!(locked["status"], "Locked");
    }

    #[test]
    fn unknown_transform_is_an_error() {
        assert!(apply_field_transform("rot13", &json!("x")).is_err());
    }
}
