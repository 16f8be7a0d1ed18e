//! The `QueryResult` envelope returned by every execution.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::enums::DataSourceKind;

/// One result row: field name to dynamically typed value, in column order.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    /// Wall-clock execution time in milliseconds.
    pub execution_time: u64,
    pub row_count: usize,
    pub cached: bool,
    pub data_source: DataSourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    /// Set when rows were dropped to honor a result cap.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Outcome of one query execution.
///
/// A failed result never carries rows; a successful one always reports
/// `row_count == data.len()`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QueryResult {
    pub success: bool,
    pub data: Vec<Row>,
    pub metadata: ResultMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    #[must_use]
    pub fn success(data: Vec<Row>, data_source: DataSourceKind, execution_time: u64) -> Self {
        Self {
            success: true,
            metadata: ResultMetadata {
                execution_time,
                row_count: data.len(),
                cached: false,
                data_source,
                query_id: None,
                truncated: false,
            },
            data,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(
        data_source: DataSourceKind,
        error: impl Into<String>,
        execution_time: u64,
    ) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            metadata: ResultMetadata {
                execution_time,
                row_count: 0,
                cached: false,
                data_source,
                query_id: None,
                truncated: false,
            },
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.metadata.query_id = Some(query_id.into());
        self
    }
}
