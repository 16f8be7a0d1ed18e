//! Parameter processing: defaults, coercion, rule checks, named transforms.
//!
//! Produces positional arguments in schema-declaration order for relational
//! binding, or a name-keyed bag for template substitution. Processing stops
//! at the first violation.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uqe_core::{ParameterDefinition, QueryError};

use crate::coerce::{self, format_timestamp};

/// Milliseconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_OFFSET_MS: i128 = 11_644_473_600_000;
/// 100-nanosecond ticks per millisecond.
const TICKS_PER_MS: i128 = 10_000;

/// Convert a UTC instant to directory tick time (100 ns units since 1601).
#[must_use]
pub fn to_file_time(dt: DateTime<Utc>) -> i128 {
    (i128::from(dt.timestamp_millis()) + FILETIME_EPOCH_OFFSET_MS) * TICKS_PER_MS
}

/// Convert directory tick time back to a UTC instant.
#[must_use]
pub fn from_file_time(ticks: i64) -> Option<DateTime<Utc>> {
    let ms = i128::from(ticks) / TICKS_PER_MS - FILETIME_EPOCH_OFFSET_MS;
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

#[derive(Debug, Clone)]
pub struct ParameterProcessor {
    max_password_age_days: i64,
    fixed_now: Option<DateTime<Utc>>,
}

impl Default for ParameterProcessor {
    fn default() -> Self {
        Self::new(90)
    }
}

impl ParameterProcessor {
    #[must_use]
    pub const fn new(max_password_age_days: i64) -> Self {
        Self {
            max_password_age_days,
            fixed_now: None,
        }
    }

    /// Pin "now" for relative-time transforms.
    #[must_use]
    pub const fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    /// Now moved by `amount` units. `None` when the result is unrepresentable.
    #[allow(clippy::cast_possible_truncation)]
    fn shift(&self, amount: f64, unit_ms: f64) -> Option<DateTime<Utc>> {
        let ms = (amount * unit_ms).round();
        if !ms.is_finite() || ms.abs() >= MAX_OFFSET_MS {
            return None;
        }
        let delta = TimeDelta::try_milliseconds(ms as i64)?;
        self.now().checked_add_signed(delta)
    }

    /// Process `input` into positional arguments, one per schema entry.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Parameter` naming the first offending parameter.
    pub fn process(
        &self,
        schema: &[ParameterDefinition],
        input: &Map<String, Value>,
    ) -> Result<Vec<Value>, QueryError> {
        schema
            .iter()
            .map(|def| self.process_one(def, input.get(&def.name)))
            .collect()
    }

    /// Process `input` into a bag keyed by parameter name, in schema order.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Parameter` naming the first offending parameter.
    pub fn process_named(
        &self,
        schema: &[ParameterDefinition],
        input: &Map<String, Value>,
    ) -> Result<Map<String, Value>, QueryError> {
        let mut named = Map::with_capacity(schema.len());
        for def in schema {
            let value = self.process_one(def, input.get(&def.name))?;
            named.insert(def.name.clone(), value);
        }
        Ok(named)
    }

    fn process_one(
        &self,
        def: &ParameterDefinition,
        raw: Option<&Value>,
    ) -> Result<Value, QueryError> {
        let raw = match raw {
            Some(value) if !value.is_null() => value.clone(),
            _ => match &def.default {
                Some(default) => default.clone(),
                None if def.required => {
                    return Err(QueryError::parameter(
                        &def.name,
                        "required parameter is missing",
                    ));
                }
                None => return Ok(Value::Null),
            },
        };

        let value = coerce::coerce(&raw, def.param_type)
            .map_err(|reason| QueryError::parameter(&def.name, reason))?;

        if let Some(rules) = &def.validation {
            coerce::check_rules(&value, rules)
                .map_err(|reason| QueryError::parameter(&def.name, reason))?;
        }

        match &def.transform {
            Some(name) => self.apply_transform(&def.name, name, value),
            None => Ok(value),
        }
    }

    fn apply_transform(&self, param: &str, name: &str, value: Value) -> Result<Value, QueryError> {
        if value.is_null() {
            return Ok(value);
        }

        let offset = || {
            value.as_f64().ok_or_else(|| {
                QueryError::parameter(param, format!("transform '{name}' requires a number"))
            })
        };

        let shifted = |amount: f64, unit_ms: f64| {
            self.shift(amount, unit_ms)
                .ok_or_else(|| QueryError::parameter(param, "offset out of range"))
        };

        let transformed = match name {
            "daysAgo" => timestamp(shifted(-offset()?, DAY_MS)?),
            "hoursAgo" => timestamp(shifted(-offset()?, HOUR_MS)?),
            "daysFromNow" => timestamp(shifted(offset()?, DAY_MS)?),
            "passwordExpiryDays" => {
                // Passwords last set before this instant expire within N days.
                #[allow(clippy::cast_precision_loss)]
                let remaining = self.max_password_age_days as f64 - offset()?;
                timestamp(shifted(-remaining, DAY_MS)?)
            }
            "daysToFileTime" => {
                let instant = shifted(-offset()?, DAY_MS)?;
                Value::String(to_file_time(instant).to_string())
            }
            "encrypt" => {
                // Pass-through: secrets are not encrypted by this engine.
                tracing::debug!(param, "encrypt transform is a pass-through");
                value
            }
            "hash" => {
                let digest = Sha256::digest(coerce::stringify(&value).as_bytes());
                Value::String(format!("{digest:x}"))
            }
            unknown => {
                tracing::warn!(param, transform = unknown, "unknown parameter transform; value left unchanged");
                value
            }
        };
        Ok(transformed)
    }
}

const DAY_MS: f64 = 86_400_000.0;
const HOUR_MS: f64 = 3_600_000.0;

/// Largest offset, in milliseconds, that survives the cast to `i64`.
#[allow(clippy::cast_precision_loss)]
const MAX_OFFSET_MS: f64 = i64::MAX as f64;

fn timestamp(dt: DateTime<Utc>) -> Value {
    Value::String(format_timestamp(dt))
}
