//! Backend kinds, parameter types, and filter vocabulary.
//!
//! Serialized names match the JSON query-definition documents. Backend kinds
//! also accept the legacy vendor names (`postgres`, `ldap`, `azure`, `o365`)
//! on input but always serialize to the neutral name.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// DataSourceKind
// ---------------------------------------------------------------------------

/// Which backend a query definition targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    #[serde(alias = "postgres", alias = "postgresql", alias = "sql")]
    Relational,
    #[serde(alias = "ldap")]
    Directory,
    #[serde(alias = "azure", alias = "msgraph")]
    Graph,
    #[serde(alias = "o365")]
    Report,
}

impl DataSourceKind {
    /// Every accepted spelling of a data source, including legacy aliases.
    pub const ACCEPTED_NAMES: &'static [&'static str] = &[
        "relational",
        "postgres",
        "postgresql",
        "sql",
        "directory",
        "ldap",
        "graph",
        "azure",
        "msgraph",
        "report",
        "o365",
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Directory => "directory",
            Self::Graph => "graph",
            Self::Report => "report",
        }
    }

    /// Parse a data source name, accepting legacy aliases.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "relational" | "postgres" | "postgresql" | "sql" => Some(Self::Relational),
            "directory" | "ldap" => Some(Self::Directory),
            "graph" | "azure" | "msgraph" => Some(Self::Graph),
            "report" | "o365" => Some(Self::Report),
            _ => None,
        }
    }
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ParamType
// ---------------------------------------------------------------------------

/// Declared type of a query parameter or mapped result field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    #[serde(alias = "integer", alias = "float")]
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl ParamType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" | "integer" | "float" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Comparison operator shared by the SQL builder and in-memory result filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Operator {
    #[serde(rename = "eq")]
    Eq,
    #[serde(rename = "ne")]
    Ne,
    #[serde(rename = "gt")]
    Gt,
    #[serde(rename = "gte")]
    Gte,
    #[serde(rename = "lt")]
    Lt,
    #[serde(rename = "lte")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "nin")]
    Nin,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "ilike")]
    ILike,
    #[serde(rename = "is_null")]
    IsNull,
    #[serde(rename = "is_not_null")]
    IsNotNull,
    #[serde(rename = "isEmpty")]
    IsEmpty,
    #[serde(rename = "isNotEmpty")]
    IsNotEmpty,
}

impl Operator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Like => "like",
            Self::ILike => "ilike",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
        }
    }

    /// Whether the operator compares against a value at all.
    #[must_use]
    pub const fn takes_value(self) -> bool {
        !matches!(
            self,
            Self::IsNull | Self::IsNotNull | Self::IsEmpty | Self::IsNotEmpty
        )
    }

    /// Whether the operator requires an array operand.
    #[must_use]
    pub const fn takes_array(self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Logic / SortDirection / SearchScope
// ---------------------------------------------------------------------------

/// How a condition joins the condition before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

impl Logic {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Parse a direction case-insensitively; only `asc` and `desc` are accepted.
    #[must_use]
    pub fn parse(direction: &str) -> Option<Self> {
        match direction.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Directory search scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    Base,
    #[serde(alias = "onelevel")]
    One,
    #[default]
    Sub,
}

impl SearchScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::One => "one",
            Self::Sub => "sub",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_source_accepts_legacy_aliases() {
        let kind: DataSourceKind = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(kind, DataSourceKind::Relational);
        let kind: DataSourceKind = serde_json::from_str("\"ldap\"").unwrap();
        assert_eq!(kind, DataSourceKind::Directory);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"directory\"");
    }

    #[test]
    fn data_source_parse_matches_accepted_names() {
        for name in DataSourceKind::ACCEPTED_NAMES {
            assert!(DataSourceKind::parse(name).is_some(), "{name} should parse");
        }
        assert_eq!(DataSourceKind::parse("mongo"), None);
    }

    #[test]
    fn operator_serializes_mixed_case_names() {
        assert_eq!(serde_json::to_string(&Operator::IsEmpty).unwrap(), "\"isEmpty\"");
        assert_eq!(serde_json::to_string(&Operator::IsNull).unwrap(), "\"is_null\"");
        let op: Operator = serde_json::from_str("\"nin\"").unwrap();
        assert!(op.takes_array());
        assert!(!Operator::IsNotEmpty.takes_value());
    }

    #[test]
    fn sort_direction_parse_rejects_other_words() {
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("sideways"), None);
    }

    #[test]
    fn logic_accepts_lowercase() {
        let logic: Logic = serde_json::from_str("\"or\"").unwrap();
        assert_eq!(logic, Logic::Or);
    }
}
