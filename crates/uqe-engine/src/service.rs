//! The query service: validates, checks access, consults the cache,
//! processes parameters, dispatches to a backend, reshapes rows, writes the
//! cache, and records a metric.
//!
//! Only validation failures surface as `Err`. Everything that goes wrong
//! after validation comes back as a `success = false` envelope.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uqe_config::{CacheBackend, DatabaseConfig, DirectoryConfig, EngineConfig, LimitsConfig};
use uqe_core::{QueryContext, QueryDefinition, QueryError, QueryResult, QuerySource, Row};

use crate::backends::{Backends, LibsqlExecutor, missing_backend};
use crate::cache::{LibsqlStore, MemoryStore, QueryCache};
use crate::credentials::{CredentialResolver, DefaultCredentialResolver};
use crate::db::EngineDb;
use crate::effects::NonCritical;
use crate::error::StoreError;
use crate::metrics::{ExecutionMetric, FanoutMetrics, LibsqlMetrics, MetricsSink, TracingMetrics};
use crate::params::ParameterProcessor;
use crate::template;
use crate::transformer::ResultTransformer;
use crate::validator::{QueryValidator, ValidationReport};

/// Rows from a backend plus whether the result cap cut any off.
struct Fetched {
    rows: Vec<Row>,
    truncated: bool,
}

pub struct QueryService {
    validator: QueryValidator,
    processor: ParameterProcessor,
    transformer: ResultTransformer,
    cache: QueryCache,
    backends: Backends,
    credentials: Arc<dyn CredentialResolver>,
    metrics: Arc<dyn MetricsSink>,
    effects: NonCritical,
    limits: LimitsConfig,
    directory: DirectoryConfig,
}

impl QueryService {
    /// A service over `backends` with no cache and log-only metrics.
    #[must_use]
    pub fn new(backends: Backends) -> Self {
        Self {
            validator: QueryValidator::new(),
            processor: ParameterProcessor::default(),
            transformer: ResultTransformer::new(),
            cache: QueryCache::unavailable(),
            backends,
            credentials: Arc::new(DefaultCredentialResolver::default()),
            metrics: Arc::new(TracingMetrics),
            effects: NonCritical::default(),
            limits: LimitsConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }

    /// Wire a service from configuration. The relational backend and the
    /// metrics table use `db`; the cache store follows `config.cache`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a separate cache database cannot be opened.
    pub async fn from_config(config: &EngineConfig, db: Arc<EngineDb>) -> Result<Self, StoreError> {
        let cache = if config.cache.is_active() {
            let store: Arc<dyn crate::cache::CacheStore> = match config.cache.backend {
                CacheBackend::Libsql if shares_database(config) => {
                    Arc::new(LibsqlStore::new(Arc::clone(&db)))
                }
                CacheBackend::Libsql => {
                    let cache_db = EngineDb::open(&DatabaseConfig {
                        path: config.cache.path.clone(),
                        ..DatabaseConfig::default()
                    })
                    .await?;
                    Arc::new(LibsqlStore::new(Arc::new(cache_db)))
                }
                CacheBackend::Memory | CacheBackend::None => Arc::new(MemoryStore::new()),
            };
            QueryCache::new(store)
                .with_op_timeout(Duration::from_millis(config.cache.op_timeout_ms))
                .with_default_ttl(Duration::from_secs(config.cache.default_ttl_secs))
        } else {
            QueryCache::unavailable()
        };

        let metrics = FanoutMetrics::new(vec![
            Arc::new(TracingMetrics),
            Arc::new(LibsqlMetrics::new(Arc::clone(&db))),
        ]);
        let backends = Backends::default().with_relational(Arc::new(LibsqlExecutor::new(db)));

        tracing::debug!(
            backends = ?backends.available(),
            cache = config.cache.is_active(),
            max_results_cap = config.limits.max_results_cap,
            "query service configured"
        );

        Ok(Self::new(backends)
            .with_cache(cache)
            .with_metrics(Arc::new(metrics))
            .with_processor(ParameterProcessor::new(
                config.transforms.max_password_age_days,
            ))
            .with_limits(config.limits.clone())
            .with_directory(config.directory.clone()))
    }

    #[must_use]
    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_processor(mut self, processor: ParameterProcessor) -> Self {
        self.processor = processor;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_directory(mut self, directory: DirectoryConfig) -> Self {
        self.directory = directory;
        self
    }

    #[must_use]
    pub const fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Validate without executing.
    #[must_use]
    pub fn validate(&self, definition: &QueryDefinition, context: &QueryContext) -> ValidationReport {
        self.validator
            .validate_definition(definition, &context.parameters)
    }

    /// Run `definition` for `context`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Validation` when the definition or parameters
    /// fail validation. Every later failure is reported in the envelope.
    pub async fn execute_query(
        &self,
        definition: &QueryDefinition,
        context: &QueryContext,
    ) -> Result<QueryResult, QueryError> {
        let started = Instant::now();

        let report = self.validate(definition, context);
        for warning in &report.warnings {
            tracing::debug!(query_id = %definition.id, %warning, "validation warning");
        }
        if let Some(error) = report.into_error() {
            tracing::warn!(query_id = %definition.id, %error, "query rejected");
            return Err(error);
        }

        let outcome = match check_access(definition, context) {
            Ok(()) => self.run(definition, context, started).await,
            Err(error) => Err(error),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(
                    query_id = %definition.id,
                    kind = error.kind(),
                    %error,
                    "query execution failed"
                );
                QueryResult::failure(definition.data_source(), error.to_string(), elapsed_ms(started))
                    .with_query_id(&definition.id)
            }
        };

        self.record(definition, context, &result).await;
        Ok(result)
    }

    async fn run(
        &self,
        definition: &QueryDefinition,
        context: &QueryContext,
        started: Instant,
    ) -> Result<QueryResult, QueryError> {
        let caching = definition.cache_enabled();
        if caching && !context.bypass_cache {
            if let Some(hit) = self.cache.get(definition, &context.parameters).await {
                return Ok(hit);
            }
        }

        let fetched = self.dispatch(definition, context).await?;
        let rows = match &definition.result_mapping {
            Some(mapping) => self.transformer.transform(fetched.rows, mapping)?,
            None => fetched.rows,
        };

        let mut result = QueryResult::success(rows, definition.data_source(), elapsed_ms(started))
            .with_query_id(&definition.id);
        result.metadata.truncated = fetched.truncated;

        if caching {
            self.cache
                .set(definition, &context.parameters, &result)
                .await;
        }
        Ok(result)
    }

    async fn dispatch(
        &self,
        definition: &QueryDefinition,
        context: &QueryContext,
    ) -> Result<Fetched, QueryError> {
        let kind = definition.data_source();
        let rows = match &definition.source {
            QuerySource::Relational(query) => {
                let executor = self
                    .backends
                    .relational
                    .as_ref()
                    .ok_or_else(|| missing_backend(kind))?;
                let args = self
                    .processor
                    .process(&definition.parameters, &context.parameters)?;
                let timeout = context
                    .timeout_ms
                    .or_else(|| definition.timeout_ms())
                    .or(Some(self.limits.default_timeout_ms))
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis);
                executor.query(&query.statement, &args, timeout).await?
            }
            QuerySource::Directory(query) => {
                let executor = self
                    .backends
                    .directory
                    .as_ref()
                    .ok_or_else(|| missing_backend(kind))?;
                let named = self
                    .processor
                    .process_named(&definition.parameters, &context.parameters)?;
                let request =
                    template::directory_request(query, &named, &self.directory, context.bypass_cache)?;
                let identity = self.credentials.resolve(kind, context).await?;
                executor.search(&request, &identity).await?.data
            }
            QuerySource::Graph(query) => {
                let executor = self
                    .backends
                    .graph
                    .as_ref()
                    .ok_or_else(|| missing_backend(kind))?;
                let named = self
                    .processor
                    .process_named(&definition.parameters, &context.parameters)?;
                let request = template::graph_request(query, &named, context.bypass_cache);
                let identity = self.credentials.resolve(kind, context).await?;
                executor.fetch(&request, &identity).await?.data
            }
            QuerySource::Report(query) => {
                let executor = self
                    .backends
                    .report
                    .as_ref()
                    .ok_or_else(|| missing_backend(kind))?;
                let named = self
                    .processor
                    .process_named(&definition.parameters, &context.parameters)?;
                let request = template::report_request(query, &named, context.bypass_cache);
                let identity = self.credentials.resolve(kind, context).await?;
                executor.fetch(&request, &identity).await?.data
            }
        };

        let cap = self.result_cap(definition, context);
        let truncated = rows.len() > cap;
        let mut rows = rows;
        rows.truncate(cap);
        Ok(Fetched { rows, truncated })
    }

    /// Caller override, then the definition's cap, never above the global cap.
    fn result_cap(&self, definition: &QueryDefinition, context: &QueryContext) -> usize {
        context
            .max_results
            .or_else(|| definition.max_results())
            .unwrap_or(self.limits.max_results_cap)
            .min(self.limits.max_results_cap)
    }

    async fn record(&self, definition: &QueryDefinition, context: &QueryContext, result: &QueryResult) {
        let metric = ExecutionMetric {
            query_id: definition.id.clone(),
            data_source: definition.data_source(),
            user_id: context.user_id.clone(),
            success: result.success,
            cached: result.metadata.cached,
            row_count: result.metadata.row_count,
            execution_time_ms: result.metadata.execution_time,
            parameters: context.parameters.clone(),
            error: result.error.clone(),
            executed_at: Utc::now(),
        };
        self.effects
            .run("record_metric", self.metrics.record(&metric))
            .await;
    }
}

fn shares_database(config: &EngineConfig) -> bool {
    !config.database.is_remote() && config.database.path == config.cache.path
}

fn check_access(definition: &QueryDefinition, context: &QueryContext) -> Result<(), QueryError> {
    let access = &definition.access;
    if access.requires_auth && context.user_id.as_deref().is_none_or(str::is_empty) {
        return Err(QueryError::Authentication(format!(
            "query '{}' requires an authenticated user",
            definition.id
        )));
    }
    if !access.roles.is_empty() && !access.roles.iter().any(|role| context.roles.contains(role)) {
        return Err(QueryError::Authentication(format!(
            "query '{}' requires one of the roles: {}",
            definition.id,
            access.roles.join(", ")
        )));
    }
    if let Some(missing) = access
        .permissions
        .iter()
        .find(|permission| !context.permissions.contains(permission))
    {
        return Err(QueryError::Authentication(format!(
            "query '{}' requires the permission '{missing}'",
            definition.id
        )));
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
