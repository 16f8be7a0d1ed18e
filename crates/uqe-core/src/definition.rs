//! Query definitions and their building blocks.
//!
//! A definition travels as a JSON [`DefinitionDocument`] (the stored and
//! wire shape) and is used as a typed [`QueryDefinition`] whose source payload
//! is an exhaustively matched [`QuerySource`]. Conversion between the two
//! handles the legacy layout in which directory/graph/report configs were
//! embedded as JSON text inside the `query` string; documents are always
//! written back with an object payload.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::enums::{DataSourceKind, Logic, Operator, ParamType, SearchScope, SortDirection};
use crate::errors::CoreError;

fn default_version() -> String {
    "1.0.0".to_string()
}

// ---------------------------------------------------------------------------
// Source payloads
// ---------------------------------------------------------------------------

/// A parameterized SQL statement using `$N` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RelationalQuery {
    #[serde(alias = "sql")]
    pub statement: String,
}

/// Directory search configuration. String fields may carry `{{param}}` and
/// `{{baseDN}}` tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryQuery {
    pub filter: String,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default, rename = "baseDN", alias = "baseDn", alias = "base")]
    pub base_dn: Option<String>,
    #[serde(default)]
    pub scope: Option<SearchScope>,
    #[serde(default)]
    pub size_limit: Option<u32>,
    #[serde(default)]
    pub time_limit: Option<u32>,
}

/// Identity graph API request configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GraphQuery {
    pub endpoint: String,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub top: Option<u32>,
    #[serde(default, alias = "orderBy")]
    pub orderby: Option<String>,
    #[serde(default)]
    pub expand: Option<String>,
}

/// Usage-report API request configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ReportQuery {
    pub endpoint: String,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Backend-specific payload of a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    Relational(RelationalQuery),
    Directory(DirectoryQuery),
    Graph(GraphQuery),
    Report(ReportQuery),
}

impl QuerySource {
    #[must_use]
    pub const fn kind(&self) -> DataSourceKind {
        match self {
            Self::Relational(_) => DataSourceKind::Relational,
            Self::Directory(_) => DataSourceKind::Directory,
            Self::Graph(_) => DataSourceKind::Graph,
            Self::Report(_) => DataSourceKind::Report,
        }
    }

    /// Parse the `query` slot of a document for the given backend.
    ///
    /// Relational sources take a statement string (or `{"statement": ..}`).
    /// The others take an object, or a string holding that object as JSON.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the payload does not fit the backend.
    pub fn from_payload(kind: DataSourceKind, payload: &Value) -> Result<Self, CoreError> {
        match kind {
            DataSourceKind::Relational => match payload {
                Value::String(statement) => Ok(Self::Relational(RelationalQuery {
                    statement: statement.clone(),
                })),
                Value::Object(_) => Ok(Self::Relational(parse_payload(kind, payload)?)),
                _ => Err(CoreError::Validation(
                    "relational query must be a statement string".to_string(),
                )),
            },
            DataSourceKind::Directory => Ok(Self::Directory(parse_payload(kind, payload)?)),
            DataSourceKind::Graph => Ok(Self::Graph(parse_payload(kind, payload)?)),
            DataSourceKind::Report => Ok(Self::Report(parse_payload(kind, payload)?)),
        }
    }

    /// Render the payload into the `query` slot of a document.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let rendered = match self {
            Self::Relational(query) => return Value::String(query.statement.clone()),
            Self::Directory(query) => serde_json::to_value(query),
            Self::Graph(query) => serde_json::to_value(query),
            Self::Report(query) => serde_json::to_value(query),
        };
        rendered.unwrap_or(Value::Null)
    }
}

fn parse_payload<T: DeserializeOwned>(
    kind: DataSourceKind,
    payload: &Value,
) -> Result<T, CoreError> {
    let parsed = match payload {
        // Legacy layout: the structured config is stored as JSON text.
        Value::String(text) => serde_json::from_str(text),
        Value::Object(_) => serde_json::from_value(payload.clone()),
        _ => {
            return Err(CoreError::Validation(format!(
                "{kind} query must be an object or a JSON object string"
            )));
        }
    };
    parsed.map_err(|e| CoreError::Validation(format!("invalid {kind} query config: {e}")))
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Post-coercion rules for a parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

/// One entry of a definition's parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ParameterValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: None,
            validation: None,
            transform: None,
            display_name: None,
            description: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: ParameterValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }
}

/// A parameter schema as written in a document: an ordered list, or the
/// legacy object keyed by parameter name.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum ParameterSchema {
    List(Vec<ParameterDefinition>),
    Keyed(Map<String, Value>),
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl ParameterSchema {
    /// Flatten into declaration order, rejecting duplicate names.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for malformed keyed entries or duplicates.
    pub fn resolve(&self) -> Result<Vec<ParameterDefinition>, CoreError> {
        let params = match self {
            Self::List(list) => list.clone(),
            Self::Keyed(map) => {
                let mut params = Vec::with_capacity(map.len());
                for (name, spec) in map {
                    let mut spec = spec.as_object().cloned().ok_or_else(|| {
                        CoreError::Validation(format!("parameter '{name}' must be an object"))
                    })?;
                    spec.insert("name".to_string(), Value::String(name.clone()));
                    let param = serde_json::from_value(Value::Object(spec)).map_err(|e| {
                        CoreError::Validation(format!("parameter '{name}' is malformed: {e}"))
                    })?;
                    params.push(param);
                }
                params
            }
        };

        for (idx, param) in params.iter().enumerate() {
            if params[..idx].iter().any(|p| p.name == param.name) {
                return Err(CoreError::Validation(format!(
                    "duplicate parameter name '{}'",
                    param.name
                )));
            }
        }
        Ok(params)
    }
}

// ---------------------------------------------------------------------------
// Conditions, sorting, result mapping
// ---------------------------------------------------------------------------

/// A single filter condition, used by the SQL builder and result filters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct WhereCondition {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    /// Joins this condition to the previous one; ignored on the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Logic>,
}

impl WhereCondition {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            logic: None,
        }
    }

    #[must_use]
    pub fn or(mut self) -> Self {
        self.logic = Some(Logic::Or);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// How one source field is exposed in results.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: String,
    #[serde(default, alias = "targetField")]
    pub target: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ParamType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

/// Field mappings as written: a list, or an object keyed by source field
/// whose values are a target name or a mapping object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum FieldMappings {
    List(Vec<FieldMapping>),
    Keyed(Map<String, Value>),
}

impl Default for FieldMappings {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl FieldMappings {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(list) => list.is_empty(),
            Self::Keyed(map) => map.is_empty(),
        }
    }

    /// Flatten into a list, filling an empty target with the source name.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if an entry is malformed.
    pub fn resolve(&self) -> Result<Vec<FieldMapping>, CoreError> {
        let mut mappings = match self {
            Self::List(list) => list.clone(),
            Self::Keyed(map) => {
                let mut mappings = Vec::with_capacity(map.len());
                for (source, spec) in map {
                    let mapping = match spec {
                        Value::String(target) => FieldMapping {
                            source: source.clone(),
                            target: target.clone(),
                            value_type: None,
                            transform: None,
                        },
                        Value::Object(obj) => {
                            let mut obj = obj.clone();
                            obj.entry("source")
                                .or_insert_with(|| Value::String(source.clone()));
                            serde_json::from_value(Value::Object(obj)).map_err(|e| {
                                CoreError::Validation(format!(
                                    "mapping for '{source}' is malformed: {e}"
                                ))
                            })?
                        }
                        _ => {
                            return Err(CoreError::Validation(format!(
                                "mapping for '{source}' must be a string or object"
                            )));
                        }
                    };
                    mappings.push(mapping);
                }
                mappings
            }
        };

        for mapping in &mut mappings {
            if mapping.source.trim().is_empty() {
                return Err(CoreError::Validation(
                    "field mapping has an empty source".to_string(),
                ));
            }
            if mapping.target.trim().is_empty() {
                mapping.target.clone_from(&mapping.source);
            }
        }
        Ok(mappings)
    }
}

/// Declarative reshaping applied to raw rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultMapping {
    #[serde(default, alias = "fields")]
    pub field_mappings: FieldMappings,
    #[serde(default, alias = "filter", skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<WhereCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, alias = "ttl")]
    pub ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_template: Option<String>,
}

/// Who may run a definition. `requires_auth` has no default on purpose:
/// documents must state it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    pub requires_auth: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

impl AccessPolicy {
    #[must_use]
    pub const fn public() -> Self {
        Self {
            requires_auth: false,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_minute: Option<u32>,
}

// ---------------------------------------------------------------------------
// Documents and definitions
// ---------------------------------------------------------------------------

/// The JSON shape of a query definition, as stored and exchanged.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub data_source: DataSourceKind,
    pub query: Value,
    #[serde(default)]
    pub parameters: ParameterSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_mapping: Option<ResultMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,
    pub access: AccessPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

/// A typed, immutable query definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DefinitionDocument", into = "DefinitionDocument")]
pub struct QueryDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub source: QuerySource,
    pub parameters: Vec<ParameterDefinition>,
    pub result_mapping: Option<ResultMapping>,
    pub cache: Option<CachePolicy>,
    pub access: AccessPolicy,
    pub constraints: Option<Constraints>,
}

impl QueryDefinition {
    /// A minimal public relational definition, mostly useful in tests.
    #[must_use]
    pub fn relational(id: impl Into<String>, statement: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            version: default_version(),
            source: QuerySource::Relational(RelationalQuery {
                statement: statement.into(),
            }),
            parameters: Vec::new(),
            result_mapping: None,
            cache: None,
            access: AccessPolicy::public(),
            constraints: None,
        }
    }

    /// Parse a definition from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the text is not a valid definition.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("invalid query definition: {e}")))
    }

    /// Parse a definition from an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the value is not a valid definition.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        serde_json::from_value(value)
            .map_err(|e| CoreError::Validation(format!("invalid query definition: {e}")))
    }

    /// Render back into the document shape (object payloads, list parameters).
    #[must_use]
    pub fn to_document(&self) -> DefinitionDocument {
        DefinitionDocument::from(self.clone())
    }

    /// Render as a JSON value in the document shape.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self.to_document()).unwrap_or(Value::Null)
    }

    #[must_use]
    pub const fn data_source(&self) -> DataSourceKind {
        self.source.kind()
    }

    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.cache.as_ref().is_some_and(|c| c.enabled)
    }

    #[must_use]
    pub fn max_results(&self) -> Option<usize> {
        self.constraints.as_ref().and_then(|c| c.max_results)
    }

    #[must_use]
    pub fn timeout_ms(&self) -> Option<u64> {
        self.constraints.as_ref().and_then(|c| c.timeout_ms)
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<ParameterDefinition>) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, ttl_seconds: u64) -> Self {
        self.cache = Some(CachePolicy {
            enabled: true,
            ttl_seconds,
            key_template: None,
        });
        self
    }

    #[must_use]
    pub fn with_result_mapping(mut self, mapping: ResultMapping) -> Self {
        self.result_mapping = Some(mapping);
        self
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

impl TryFrom<DefinitionDocument> for QueryDefinition {
    type Error = CoreError;

    fn try_from(doc: DefinitionDocument) -> Result<Self, Self::Error> {
        let source = QuerySource::from_payload(doc.data_source, &doc.query)?;
        let parameters = doc.parameters.resolve()?;

        if let Some(cache) = &doc.cache {
            if cache.enabled && cache.ttl_seconds == 0 {
                return Err(CoreError::Validation(
                    "cache.ttlSeconds must be positive when caching is enabled".to_string(),
                ));
            }
        }

        Ok(Self {
            id: doc.id,
            name: doc.name,
            description: doc.description,
            version: doc.version,
            source,
            parameters,
            result_mapping: doc.result_mapping,
            cache: doc.cache,
            access: doc.access,
            constraints: doc.constraints,
        })
    }
}

impl From<QueryDefinition> for DefinitionDocument {
    fn from(def: QueryDefinition) -> Self {
        Self {
            data_source: def.source.kind(),
            query: def.source.to_payload(),
            id: def.id,
            name: def.name,
            description: def.description,
            version: def.version,
            parameters: ParameterSchema::List(def.parameters),
            result_mapping: def.result_mapping,
            cache: def.cache,
            access: def.access,
            constraints: def.constraints,
        }
    }
}
