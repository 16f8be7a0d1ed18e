//! Backend collaborators the service dispatches to.
//!
//! Only the relational backend ships with the engine ([`LibsqlExecutor`]).
//! Directory, graph, and report clients are supplied by the embedding
//! application through the traits below.

mod relational;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uqe_core::{DataSourceKind, QueryError, Row, SearchScope};

use crate::credentials::ExecutionIdentity;
pub use relational::{LibsqlExecutor, rewrite_placeholders};

/// A fully substituted directory search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRequest {
    pub filter: String,
    pub attributes: Vec<String>,
    pub base_dn: String,
    pub scope: SearchScope,
    pub size_limit: u32,
    pub time_limit: u32,
    pub cache_bypass: bool,
}

/// A fully substituted identity graph request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRequest {
    pub endpoint: String,
    pub select: Vec<String>,
    pub filter: Option<String>,
    pub top: Option<u32>,
    pub orderby: Option<String>,
    pub expand: Option<String>,
    pub cache_bypass: bool,
}

/// A fully substituted report request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub endpoint: String,
    pub period: Option<String>,
    pub format: Option<String>,
    pub limit: Option<u32>,
    pub cache_bypass: bool,
}

/// What a non-relational backend returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendReply {
    pub data: Vec<Row>,
    /// Total the backend reports, which may exceed `data.len()`.
    pub count: Option<usize>,
    /// Backend-side time in milliseconds, if reported.
    pub execution_time: Option<u64>,
    /// Whether the backend served the reply from its own cache.
    pub cached: bool,
}

impl BackendReply {
    #[must_use]
    pub fn from_rows(data: Vec<Row>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Accept either a bare array of objects or `{"data": [...], "count": n}`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Execution` when the payload has no rows in it.
    pub fn from_json(payload: Value) -> Result<Self, QueryError> {
        match payload {
            Value::Array(items) => Ok(Self::from_rows(rows_from_array(items))),
            Value::Object(mut map) => {
                let data = match map.remove("data").or_else(|| map.remove("value")) {
                    Some(Value::Array(items)) => rows_from_array(items),
                    _ => {
                        return Err(QueryError::Execution(
                            "backend reply has no data array".to_string(),
                        ));
                    }
                };
                let count = map
                    .get("count")
                    .and_then(Value::as_u64)
                    .and_then(|n| usize::try_from(n).ok());
                let execution_time = map.get("executionTime").and_then(Value::as_u64);
                let cached = map.get("cached").and_then(Value::as_bool).unwrap_or(false);
                Ok(Self {
                    data,
                    count,
                    execution_time,
                    cached,
                })
            }
            other => Err(QueryError::Execution(format!(
                "unexpected backend reply: {other}"
            ))),
        }
    }
}

/// Non-object entries are wrapped as `{"value": ..}`.
fn rows_from_array(items: Vec<Value>) -> Vec<Row> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => map,
            other => {
                let mut row = Row::new();
                row.insert("value".to_string(), other);
                row
            }
        })
        .collect()
}

#[async_trait]
pub trait RelationalExecutor: Send + Sync {
    /// Run a read statement with positional arguments bound to `$1..$N`.
    async fn query(
        &self,
        statement: &str,
        args: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Row>, QueryError>;
}

#[async_trait]
pub trait DirectoryExecutor: Send + Sync {
    async fn search(
        &self,
        request: &DirectoryRequest,
        identity: &ExecutionIdentity,
    ) -> Result<BackendReply, QueryError>;
}

#[async_trait]
pub trait GraphExecutor: Send + Sync {
    async fn fetch(
        &self,
        request: &GraphRequest,
        identity: &ExecutionIdentity,
    ) -> Result<BackendReply, QueryError>;
}

#[async_trait]
pub trait ReportExecutor: Send + Sync {
    async fn fetch(
        &self,
        request: &ReportRequest,
        identity: &ExecutionIdentity,
    ) -> Result<BackendReply, QueryError>;
}

/// The set of backends a service can reach. Missing ones fail at dispatch.
#[derive(Clone, Default)]
pub struct Backends {
    pub relational: Option<Arc<dyn RelationalExecutor>>,
    pub directory: Option<Arc<dyn DirectoryExecutor>>,
    pub graph: Option<Arc<dyn GraphExecutor>>,
    pub report: Option<Arc<dyn ReportExecutor>>,
}

impl Backends {
    #[must_use]
    pub fn with_relational(mut self, executor: Arc<dyn RelationalExecutor>) -> Self {
        self.relational = Some(executor);
        self
    }

    #[must_use]
    pub fn with_directory(mut self, executor: Arc<dyn DirectoryExecutor>) -> Self {
        self.directory = Some(executor);
        self
    }

    #[must_use]
    pub fn with_graph(mut self, executor: Arc<dyn GraphExecutor>) -> Self {
        self.graph = Some(executor);
        self
    }

    #[must_use]
    pub fn with_report(mut self, executor: Arc<dyn ReportExecutor>) -> Self {
        self.report = Some(executor);
        self
    }

    /// Backends with a handler attached.
    #[must_use]
    pub fn available(&self) -> Vec<DataSourceKind> {
        let mut kinds = Vec::new();
        if self.relational.is_some() {
            kinds.push(DataSourceKind::Relational);
        }
        if self.directory.is_some() {
            kinds.push(DataSourceKind::Directory);
        }
        if self.graph.is_some() {
            kinds.push(DataSourceKind::Graph);
        }
        if self.report.is_some() {
            kinds.push(DataSourceKind::Report);
        }
        kinds
    }
}

/// Error for a dispatch to a backend nobody attached.
pub(crate) fn missing_backend(kind: DataSourceKind) -> QueryError {
    QueryError::Configuration(format!("no {kind} backend is configured"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn reply_accepts_bare_arrays() {
        let reply = BackendReply::from_json(json!([{"cn": "alice"}, "loose"])).unwrap();
        assert_eq!(reply.data.len(), 2);
        assert_eq!(reply.data[1]["value"], json!("loose"));
        assert_eq!(reply.count, None);
    }

    #[test]
    fn reply_reads_envelope_fields() {
        let reply = BackendReply::from_json(json!({
            "data": [{"id": 1}],
            "count": 40,
            "executionTime": 12,
            "cached": true
        }))
        .unwrap();
        assert_eq!(reply.count, Some(40));
        assert_eq!(reply.execution_time, Some(12));
        assert!(reply.cached);
    }

    #[test]
    fn reply_without_rows_is_an_error() {
        assert!(BackendReply::from_json(json!({"count": 3})).is_err());
        assert!(BackendReply::from_json(json!("nope")).is_err());
    }

    #[test]
    fn empty_bundle_has_no_backends() {
        assert!(Backends::default().available().is_empty());
        assert_eq!(
            missing_backend(DataSourceKind::Graph).to_string(),
            "Configuration error: no graph backend is configured"
        );
    }
}
