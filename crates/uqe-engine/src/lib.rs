//! # uqe-engine
//!
//! Execution engine for declarative query definitions:
//! - [`QueryBuilder`] assembles parameterized SELECT statements
//! - [`QueryValidator`] statically checks definitions and parameter bags
//! - [`ParameterProcessor`] coerces, validates, and transforms parameters
//! - [`ResultTransformer`] reshapes, filters, sorts, and limits rows
//! - [`QueryCache`] caches result envelopes behind a [`CacheStore`]
//! - [`QueryService`] orchestrates one execution end to end
//! - [`DefinitionRegistry`] stores definitions in libSQL
//!
//! Backends other than the bundled libSQL executor are injected through the
//! traits in [`backends`].

pub mod backends;
pub mod builder;
pub mod cache;
pub mod coerce;
pub mod credentials;
pub mod db;
pub mod effects;
pub mod error;
pub mod helpers;
pub mod metrics;
pub mod params;
pub mod registry;
pub mod service;
pub mod template;
pub mod transformer;
pub mod validator;

pub use backends::{
    BackendReply, Backends, DirectoryExecutor, DirectoryRequest, GraphExecutor, GraphRequest,
    LibsqlExecutor, RelationalExecutor, ReportExecutor, ReportRequest,
};
pub use builder::{BuiltQuery, QueryBuilder};
pub use cache::{CacheStore, LibsqlStore, MemoryStore, QueryCache};
pub use credentials::{
    CredentialResolver, DefaultCredentialResolver, ExecutionIdentity, PassthroughCipher,
    SecretCipher,
};
pub use db::EngineDb;
pub use effects::{NonCritical, best_effort};
pub use error::{RegistryError, StoreError};
pub use metrics::{ExecutionMetric, FanoutMetrics, LibsqlMetrics, MetricsSink, TracingMetrics};
pub use params::ParameterProcessor;
pub use registry::DefinitionRegistry;
pub use service::QueryService;
pub use transformer::ResultTransformer;
pub use validator::{QueryValidator, ValidationReport};
