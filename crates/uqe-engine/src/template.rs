//! `{{token}}` substitution for non-relational source configs.
//!
//! Values come from the processed parameter bag. `{{baseDN}}` resolves to the
//! directory base DN. Tokens with no matching value are left as written.
//! Values are escaped for the place they land: directory filter values per
//! RFC 4515, graph filter literals by doubling single quotes.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use uqe_config::DirectoryConfig;
use uqe_core::{DirectoryQuery, GraphQuery, QueryError, ReportQuery};

use crate::backends::{DirectoryRequest, GraphRequest, ReportRequest};
use crate::coerce::stringify;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("token regex"));

const BASE_DN_TOKEN: &str = "baseDN";

/// Replace every known `{{name}}` in `template`, passing values through `escape`.
pub fn substitute(
    template: &str,
    values: &Map<String, Value>,
    escape: impl Fn(&str) -> String,
) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            values
                .get(&caps[1])
                .map_or_else(|| caps[0].to_string(), |value| escape(&stringify(value)))
        })
        .into_owned()
}

/// Escape a value for use inside a directory search filter.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            other => out.push(other),
        }
    }
    out
}

fn escape_odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn verbatim(value: &str) -> String {
    value.to_string()
}

/// Build the directory request for a processed parameter bag.
///
/// # Errors
///
/// Returns `QueryError::Configuration` when no base DN is known.
pub fn directory_request(
    query: &DirectoryQuery,
    parameters: &Map<String, Value>,
    config: &DirectoryConfig,
    cache_bypass: bool,
) -> Result<DirectoryRequest, QueryError> {
    let mut values = parameters.clone();
    if !config.base_dn.is_empty() {
        values
            .entry(BASE_DN_TOKEN)
            .or_insert_with(|| Value::String(config.base_dn.clone()));
    }

    let base_dn = match &query.base_dn {
        Some(base) => substitute(base, &values, verbatim),
        None => config.base_dn.clone(),
    };
    if base_dn.trim().is_empty() || TOKEN.is_match(&base_dn) {
        return Err(QueryError::Configuration(
            "directory base DN is not configured".to_string(),
        ));
    }

    Ok(DirectoryRequest {
        filter: substitute(&query.filter, &values, escape_filter_value),
        attributes: query.attributes.clone(),
        base_dn,
        scope: query.scope.unwrap_or_default(),
        size_limit: query.size_limit.unwrap_or(config.size_limit),
        time_limit: query.time_limit.unwrap_or(config.time_limit_secs),
        cache_bypass,
    })
}

#[must_use]
pub fn graph_request(
    query: &GraphQuery,
    parameters: &Map<String, Value>,
    cache_bypass: bool,
) -> GraphRequest {
    GraphRequest {
        endpoint: substitute(&query.endpoint, parameters, verbatim),
        select: query.select.clone(),
        filter: query
            .filter
            .as_deref()
            .map(|filter| substitute(filter, parameters, escape_odata_literal)),
        top: query.top,
        orderby: query.orderby.clone(),
        expand: query.expand.clone(),
        cache_bypass,
    }
}

#[must_use]
pub fn report_request(
    query: &ReportQuery,
    parameters: &Map<String, Value>,
    cache_bypass: bool,
) -> ReportRequest {
    ReportRequest {
        endpoint: substitute(&query.endpoint, parameters, verbatim),
        period: query
            .period
            .as_deref()
            .map(|period| substitute(period, parameters, verbatim)),
        format: query.format.clone(),
        limit: query.limit,
        cache_bypass,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uqe_core::SearchScope;

    fn bag(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn unknown_tokens_are_left_alone() {
        let out = substitute("{{a}}-{{ b }}-{{c}}", &bag(json!({"a": 1, "b": "x"})), verbatim);
        assert_eq!(out, "1-x-{{c}}");
    }

    #[test]
    fn filter_values_are_escaped() {
        assert_eq!(escape_filter_value("a*)(uid=*"), "a\\2a\\29\\28uid=\\2a");
        assert_eq!(escape_filter_value("back\\slash"), "back\\5cslash");
    }

    #[test]
    fn directory_request_fills_base_dn_and_defaults() {
        let query = DirectoryQuery {
            filter: "(&(objectClass=user)(sAMAccountName={{name}}))".into(),
            attributes: vec!["cn".into()],
            base_dn: Some("OU=Staff,{{baseDN}}".into()),
            ..DirectoryQuery::default()
        };
        let config = DirectoryConfig {
            base_dn: "DC=corp,DC=local".into(),
            ..DirectoryConfig::default()
        };
        let request =
            directory_request(&query, &bag(json!({"name": "j*"})), &config, true).unwrap();
        assert_eq!(request.filter, "(&(objectClass=user)(sAMAccountName=j\\2a))");
        assert_eq!(request.base_dn, "OU=Staff,DC=corp,DC=local");
        assert_eq!(request.scope, SearchScope::Sub);
        assert_eq!(request.size_limit, 1000);
        assert!(request.cache_bypass);
    }

    #[test]
    fn directory_request_needs_a_base_dn() {
        let query = DirectoryQuery {
            filter: "(cn=*)".into(),
            ..DirectoryQuery::default()
        };
        let err = directory_request(&query, &Map::new(), &DirectoryConfig::default(), false)
            .unwrap_err();
        assert!(matches!(err, QueryError::Configuration(_)));
    }

    #[test]
    fn graph_filter_literals_double_quotes() {
        let query = GraphQuery {
            endpoint: "/users/{{id}}/memberOf".into(),
            filter: Some("displayName eq '{{group}}'".into()),
            ..GraphQuery::default()
        };
        let request = graph_request(&query, &bag(json!({"id": "u1", "group": "O'Neil"})), false);
        assert_eq!(request.endpoint, "/users/u1/memberOf");
        assert_eq!(request.filter.as_deref(), Some("displayName eq 'O''Neil'"));
    }

    #[test]
    fn report_period_is_substituted() {
        let query = ReportQuery {
            endpoint: "/reports/mailboxUsage".into(),
            period: Some("D{{days}}".into()),
            ..ReportQuery::default()
        };
        let request = report_request(&query, &bag(json!({"days": 30})), false);
        assert_eq!(request.period.as_deref(), Some("D30"));
    }
}
