//! JsonSchema validation tests for definition documents and result envelopes.

use rstest::rstest;
use schemars::schema_for;
use serde_json::{Value, json};
use uqe_core::definition::DefinitionDocument;
use uqe_core::{DataSourceKind, QueryDefinition, QueryResult, Row};

/// Validate a JSON value against a schemars-generated schema.
fn validate_against_schema(schema: &Value, instance: &Value) -> Vec<String> {
    let validator = jsonschema::validator_for(schema).expect("schema should be valid");
    validator
        .iter_errors(instance)
        .map(|e| format!("{e}"))
        .collect()
}

fn document_schema() -> Value {
    serde_json::to_value(schema_for!(DefinitionDocument)).unwrap()
}

#[rstest]
#[case::relational(json!({
    "id": "users_by_department",
    "name": "Users by department",
    "version": "2.1.0",
    "dataSource": "relational",
    "query": "SELECT id, name FROM users WHERE department = $1 LIMIT 100",
    "parameters": [{"name": "department", "type": "string", "required": true}],
    "cache": {"enabled": true, "ttlSeconds": 600},
    "access": {"requiresAuth": true, "roles": ["auditor"]}
}))]
#[case::graph(json!({
    "id": "guest_accounts",
    "name": "Guest accounts",
    "dataSource": "graph",
    "query": {"endpoint": "/users", "select": ["displayName", "mail"], "filter": "userType eq 'Guest'", "top": 50},
    "access": {"requiresAuth": true}
}))]
#[case::report_with_mapping(json!({
    "id": "mailbox_usage",
    "name": "Mailbox usage",
    "dataSource": "report",
    "query": {"endpoint": "getMailboxUsageDetail", "period": "D30"},
    "resultMapping": {
        "fieldMappings": {"storageUsedInBytes": {"target": "storageMb", "transform": "bytesToMB"}},
        "sort": [{"field": "storageMb", "direction": "desc"}],
        "limit": 25
    },
    "access": {"requiresAuth": false}
}))]
fn documents_match_generated_schema(#[case] doc: Value) {
    let errors = validate_against_schema(&document_schema(), &doc);
    assert!(errors.is_empty(), "schema validation failed: {errors:?}");

    let def = QueryDefinition::from_value(doc.clone()).expect("document should parse");
    let rewritten = def.to_value();
    let errors = validate_against_schema(&document_schema(), &rewritten);
    assert!(errors.is_empty(), "rewritten document failed schema: {errors:?}");
    assert_eq!(rewritten["id"], doc["id"]);
}

#[test]
fn result_envelope_matches_generated_schema() {
    let mut row = Row::new();
    row.insert("id".into(), json!(7));
    row.insert("name".into(), json!("Ada"));
    let result = QueryResult::success(vec![row], DataSourceKind::Relational, 3).with_query_id("q1");

    let schema = serde_json::to_value(schema_for!(QueryResult)).unwrap();
    let instance = serde_json::to_value(&result).unwrap();
    let errors = validate_against_schema(&schema, &instance);
    assert!(errors.is_empty(), "schema validation failed: {errors:?}");

    let recovered: QueryResult = serde_json::from_value(instance).unwrap();
    assert_eq!(recovered, result);
}
