use anyhow::Context;
use serde::Deserialize;
use uqe_core::{SortSpec, WhereCondition};
use uqe_engine::{BuiltQuery, QueryBuilder};

use crate::cli::GlobalFlags;
use crate::cli::root_commands::BuildArgs;
use crate::input::read_json;
use crate::output::output;

/// JSON description of a SELECT, fed to the builder in a fixed order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BuildSpec {
    #[serde(default)]
    select: Vec<String>,
    from: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    joins: Vec<JoinSpec>,
    #[serde(default, rename = "where")]
    conditions: Vec<WhereCondition>,
    #[serde(default)]
    group_by: Vec<String>,
    #[serde(default)]
    having: Vec<WhereCondition>,
    #[serde(default)]
    order_by: Vec<SortSpec>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct JoinSpec {
    #[serde(rename = "type", default = "inner_join")]
    join_type: String,
    table: String,
    #[serde(default)]
    alias: Option<String>,
    on: String,
}

fn inner_join() -> String {
    "INNER".to_string()
}

/// Handle `uqe build`.
pub fn handle(args: &BuildArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let spec: BuildSpec = serde_json::from_value(read_json(&args.file)?)
        .with_context(|| format!("{} is not a builder spec", args.file.display()))?;
    output(&build(&spec)?, flags.format)
}

fn build(spec: &BuildSpec) -> anyhow::Result<BuiltQuery> {
    let mut builder = QueryBuilder::new().from(&spec.from, spec.alias.as_deref())?;
    builder = if spec.select.is_empty() {
        builder.select(&["*"])?
    } else {
        builder.select(&spec.select)?
    };
    for join in &spec.joins {
        builder = builder.join(&join.join_type, &join.table, join.alias.as_deref(), &join.on)?;
    }
    builder = builder.where_all(&spec.conditions)?;
    if !spec.group_by.is_empty() {
        builder = builder.group_by(&spec.group_by)?;
    }
    for condition in &spec.having {
        builder = builder.having(condition)?;
    }
    for sort in &spec.order_by {
        builder = builder.order_by(&sort.field, sort.direction.as_sql())?;
    }
    if let Some(limit) = spec.limit {
        builder = builder.limit(limit);
    }
    if let Some(offset) = spec.offset {
        builder = builder.offset(offset);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn spec(value: serde_json::Value) -> BuildSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn spec_drives_the_builder() {
        let built = build(&spec(json!({
            "select": ["u.id", "u.name"],
            "from": "users",
            "alias": "u",
            "joins": [{"type": "left", "table": "teams", "alias": "t", "on": "t.id = u.team_id"}],
            "where": [
                {"field": "u.active", "operator": "eq", "value": true},
                {"field": "u.name", "operator": "like", "value": "a%"}
            ],
            "orderBy": [{"field": "u.name", "direction": "desc"}],
            "limit": 20
        })))
        .unwrap();

        assert!(built.text.starts_with("SELECT"));
        assert!(built.text.contains("LEFT JOIN"));
        assert!(built.text.contains("DESC"));
        assert!(built.text.contains("LIMIT 20"));
        assert_eq!(built.params, vec![json!(true), json!("a%")]);
    }

    #[test]
    fn empty_select_means_every_column() {
        let built = build(&spec(json!({"from": "users"}))).unwrap();
        assert_eq!(built.text, r#"SELECT * FROM "users""#);
    }

    #[test]
    fn unknown_spec_keys_are_rejected() {
        let parsed = serde_json::from_value::<BuildSpec>(json!({"from": "users", "wher": []}));
        assert!(parsed.is_err());
    }

    #[test]
    fn unsafe_identifiers_fail_the_build() {
        let err = build(&spec(json!({"from": "users; DROP TABLE users"}))).unwrap_err();
        assert!(err.to_string().to_lowercase().contains("users"));
    }
}
