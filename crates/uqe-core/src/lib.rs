//! # uqe-core
//!
//! Core types shared by every crate of the unified query engine:
//! - Query definitions and their per-backend source payloads
//! - Parameter schemas, result mappings, and filter conditions
//! - The `QueryResult` envelope and dynamically typed rows
//! - Per-call execution context
//! - Cross-cutting error types

pub mod context;
pub mod definition;
pub mod enums;
pub mod errors;
pub mod result;

pub use context::{CredentialSource, QueryContext};
pub use definition::{
    AccessPolicy, CachePolicy, Constraints, DefinitionDocument, DirectoryQuery, FieldMapping,
    FieldMappings, GraphQuery, ParameterDefinition, ParameterValidation, QueryDefinition,
    QuerySource, RelationalQuery, ReportQuery, ResultMapping, SortSpec, WhereCondition,
};
pub use enums::{DataSourceKind, Logic, Operator, ParamType, SearchScope, SortDirection};
pub use errors::{CoreError, QueryError};
pub use result::{QueryResult, ResultMetadata, Row};
