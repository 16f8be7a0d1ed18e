//! Value coercion and rule checks.
//!
//! Shared by the parameter processor (inbound), the validator (read-only
//! checks on a copy), and the result transformer (outbound field types).
//! Every function here is pure: inputs are borrowed and new values returned.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde_json::{Number, Value};
use uqe_core::{ParamType, ParameterValidation};

/// Coerce `value` to `ty`. `Null` passes through for every type.
///
/// # Errors
///
/// Returns a human-readable reason when the value cannot be represented.
pub fn coerce(value: &Value, ty: ParamType) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        ParamType::String => Ok(Value::String(stringify(value))),
        ParamType::Number => to_number(value),
        ParamType::Boolean => to_boolean(value),
        ParamType::Date => to_date(value),
        ParamType::Array => Ok(to_array(value)),
        ParamType::Object => to_object(value),
    }
}

/// Render a value as plain text (strings unquoted, containers as JSON).
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Build a JSON number, preferring an integer when the value is integral.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn to_number(value: &Value) -> Result<Value, String> {
    let parsed = match value {
        Value::Number(n) => return Ok(Value::Number(n.clone())),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a valid number"))?,
        _ => return Err("expected a number".to_string()),
    };
    if !parsed.is_finite() {
        return Err("expected a finite number".to_string());
    }
    Ok(number_value(parsed))
}

fn to_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("'{s}' is not a valid boolean")),
        },
        _ => Err("expected a boolean".to_string()),
    }
}

fn to_date(value: &Value) -> Result<Value, String> {
    let parsed = match value {
        Value::String(s) => parse_date(s).ok_or_else(|| format!("'{s}' is not a valid date"))?,
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| format!("{n} is not a valid epoch timestamp"))?,
        _ => return Err("expected a date".to_string()),
    };
    Ok(Value::String(format_timestamp(parsed)))
}

fn to_array(value: &Value) -> Value {
    match value {
        Value::Array(_) => value.clone(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(trimmed) {
                    return parsed;
                }
            }
            if trimmed.is_empty() {
                return Value::Array(Vec::new());
            }
            if trimmed.contains(',') {
                return Value::Array(
                    trimmed
                        .split(',')
                        .map(|part| Value::String(part.trim().to_string()))
                        .collect(),
                );
            }
            Value::Array(vec![value.clone()])
        }
        other => Value::Array(vec![other.clone()]),
    }
}

fn to_object(value: &Value) -> Result<Value, String> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => Ok(parsed),
            _ => Err("expected a JSON object".to_string()),
        },
        _ => Err("expected an object".to_string()),
    }
}

/// Parse RFC 3339, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS`, or `YYYY-MM-DD`.
#[must_use]
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical timestamp text: RFC 3339, UTC, millisecond precision.
#[must_use]
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Check a coerced value against its declared rules.
///
/// `min`/`max` bound numbers by value and strings by length; `minLength` and
/// `maxLength` bound strings. Enum membership is checked per element for
/// arrays.
///
/// # Errors
///
/// Returns a reason naming the violated bound.
pub fn check_rules(value: &Value, rules: &ParameterValidation) -> Result<(), String> {
    if value.is_null() {
        return Ok(());
    }

    match value {
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = rules.min {
                if n < min {
                    return Err(format!("must be at least {min}"));
                }
            }
            if let Some(max) = rules.max {
                if n > max {
                    return Err(format!("must be at most {max}"));
                }
            }
        }
        Value::String(s) => {
            let len = s.chars().count();
            #[allow(clippy::cast_precision_loss)]
            let len_f = len as f64;
            if let Some(min) = rules.min {
                if len_f < min {
                    return Err(format!("length must be at least {min}"));
                }
            }
            if let Some(max) = rules.max {
                if len_f > max {
                    return Err(format!("length must be at most {max}"));
                }
            }
            if let Some(min) = rules.min_length {
                if len < min {
                    return Err(format!("length must be at least {min}"));
                }
            }
            if let Some(max) = rules.max_length {
                if len > max {
                    return Err(format!("length must be at most {max}"));
                }
            }
            if let Some(pattern) = &rules.pattern {
                let re = Regex::new(pattern).map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
                if !re.is_match(s) {
                    return Err(format!("does not match pattern '{pattern}'"));
                }
            }
        }
        _ => {}
    }

    if let Some(allowed) = &rules.allowed {
        let members: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        for member in members {
            if !allowed.iter().any(|candidate| values_equal(candidate, member)) {
                let rendered: Vec<String> = allowed.iter().map(stringify).collect();
                return Err(format!(
                    "'{}' must be one of [{}]",
                    stringify(member),
                    rendered.join(", ")
                ));
            }
        }
    }
    Ok(())
}

/// JSON equality that treats `1` and `1.0` as the same number.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
