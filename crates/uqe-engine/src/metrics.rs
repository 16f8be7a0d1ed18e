//! Per-execution metrics and the sinks that record them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uqe_core::DataSourceKind;

use crate::db::EngineDb;
use crate::error::StoreError;

/// One `execute_query` call, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetric {
    pub query_id: String,
    pub data_source: DataSourceKind,
    pub user_id: Option<String>,
    pub success: bool,
    pub cached: bool,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub parameters: Map<String, Value>,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, metric: &ExecutionMetric) -> Result<(), StoreError>;
}

/// Emits each metric as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

#[async_trait]
impl MetricsSink for TracingMetrics {
    async fn record(&self, metric: &ExecutionMetric) -> Result<(), StoreError> {
        if metric.success {
            tracing::info!(
                query_id = %metric.query_id,
                data_source = %metric.data_source,
                cached = metric.cached,
                row_count = metric.row_count,
                execution_time_ms = metric.execution_time_ms,
                "query executed"
            );
        } else {
            tracing::warn!(
                query_id = %metric.query_id,
                data_source = %metric.data_source,
                execution_time_ms = metric.execution_time_ms,
                error = metric.error.as_deref().unwrap_or_default(),
                "query failed"
            );
        }
        Ok(())
    }
}

/// Persists metrics to the `query_executions` table.
pub struct LibsqlMetrics {
    db: Arc<EngineDb>,
}

impl LibsqlMetrics {
    #[must_use]
    pub const fn new(db: Arc<EngineDb>) -> Self {
        Self { db }
    }
}

fn opt_text(value: Option<&str>) -> libsql::Value {
    value.map_or(libsql::Value::Null, |s| libsql::Value::Text(s.to_string()))
}

#[async_trait]
impl MetricsSink for LibsqlMetrics {
    async fn record(&self, metric: &ExecutionMetric) -> Result<(), StoreError> {
        let parameters = serde_json::to_string(&metric.parameters)?;
        let values = vec![
            libsql::Value::Text(metric.query_id.clone()),
            libsql::Value::Text(metric.data_source.as_str().to_string()),
            opt_text(metric.user_id.as_deref()),
            libsql::Value::Integer(i64::from(metric.success)),
            libsql::Value::Integer(i64::from(metric.cached)),
            libsql::Value::Integer(i64::try_from(metric.row_count).unwrap_or(i64::MAX)),
            libsql::Value::Integer(i64::try_from(metric.execution_time_ms).unwrap_or(i64::MAX)),
            libsql::Value::Text(parameters),
            opt_text(metric.error.as_deref()),
            libsql::Value::Text(metric.executed_at.to_rfc3339()),
        ];
        self.db
            .conn()
            .execute(
                "INSERT INTO query_executions
                    (query_id, data_source, user_id, success, cached, row_count,
                     execution_time_ms, parameters, error, executed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                libsql::params_from_iter(values),
            )
            .await?;
        Ok(())
    }
}

/// Sends every metric to each inner sink, stopping at the first failure.
pub struct FanoutMetrics {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutMetrics {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl MetricsSink for FanoutMetrics {
    async fn record(&self, metric: &ExecutionMetric) -> Result<(), StoreError> {
        for sink in &self.sinks {
            sink.record(metric).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metric(success: bool) -> ExecutionMetric {
        ExecutionMetric {
            query_id: "users_by_id".into(),
            data_source: DataSourceKind::Relational,
            user_id: Some("u-1".into()),
            success,
            cached: false,
            row_count: if success { 2 } else { 0 },
            execution_time_ms: 14,
            parameters: json!({"id": 7}).as_object().cloned().unwrap(),
            error: (!success).then(|| "Query timed out after 10 ms".to_string()),
            executed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn tracing_sink_never_fails() {
        TracingMetrics.record(&metric(true)).await.unwrap();
        TracingMetrics.record(&metric(false)).await.unwrap();
    }

    #[tokio::test]
    async fn libsql_sink_persists_rows() {
        let db = Arc::new(EngineDb::open_local(":memory:").await.unwrap());
        let sink = FanoutMetrics::new(vec![
            Arc::new(TracingMetrics),
            Arc::new(LibsqlMetrics::new(Arc::clone(&db))),
        ]);
        sink.record(&metric(true)).await.unwrap();
        sink.record(&metric(false)).await.unwrap();

        let mut rows = db
            .conn()
            .query(
                "SELECT success, row_count, parameters, error FROM query_executions ORDER BY id",
                (),
            )
            .await
            .unwrap();
        let first = rows.next().await.unwrap().unwrap();
        assert_eq!(first.get::<i64>(0).unwrap(), 1);
        assert_eq!(first.get::<i64>(1).unwrap(), 2);
        assert_eq!(first.get::<String>(2).unwrap(), r#"{"id":7}"#);
        let second = rows.next().await.unwrap().unwrap();
        assert_eq!(second.get::<i64>(0).unwrap(), 0);
        assert!(second.get::<String>(3).unwrap().contains("timed out"));
    }
}
