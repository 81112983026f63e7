//! Field type descriptors.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The declared type of an entity field.
///
/// Primitive tags coerce directly; [`FieldType::Custom`] names a value-object
/// type registered in a [`TypeRegistry`](crate::TypeRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    /// JSON array (or associative map) stored as JSON text.
    Array,
    /// JSON object stored as JSON text.
    Object,
    /// A registered value-object type, looked up by name.
    Custom(String),
}

impl FieldType {
    /// Parse a declared type tag. Anything that is not a primitive tag is a
    /// custom type name.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => FieldType::String,
            "int" | "integer" => FieldType::Int,
            "float" | "double" => FieldType::Float,
            "bool" | "boolean" => FieldType::Bool,
            "array" | "json" => FieldType::Array,
            "object" => FieldType::Object,
            _ => FieldType::Custom(tag.trim().to_string()),
        }
    }

    /// Normalize a storage column type (as reported by introspection) into a
    /// field type. Unknown column types are treated as text.
    pub fn from_column_type(column_type: &str) -> Self {
        let ty = column_type.trim().to_ascii_lowercase();
        match FieldType::parse(&ty) {
            FieldType::Custom(_) => {}
            primitive => return primitive,
        }

        let Some(patterns) = column_patterns() else {
            return FieldType::String;
        };
        if patterns.boolean.is_match(&ty) {
            FieldType::Bool
        } else if patterns.integer.is_match(&ty) {
            FieldType::Int
        } else if patterns.float.is_match(&ty) {
            FieldType::Float
        } else if patterns.json.is_match(&ty) {
            FieldType::Array
        } else {
            FieldType::String
        }
    }

    /// The tag this type is declared with.
    pub fn name(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Custom(name) => name,
        }
    }

    pub const fn is_primitive(&self) -> bool {
        !matches!(self, FieldType::Custom(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for FieldType {
    fn from(tag: &str) -> Self {
        FieldType::parse(tag)
    }
}

impl From<String> for FieldType {
    fn from(tag: String) -> Self {
        FieldType::parse(&tag)
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.name().to_string()
    }
}

struct ColumnPatterns {
    boolean: Regex,
    integer: Regex,
    float: Regex,
    json: Regex,
}

impl ColumnPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            boolean: Regex::new(r"^(bit|bool|boolean)\b|^tinyint\s*\(\s*1\s*\)")?,
            integer: Regex::new(r"^((tiny|small|medium|big)?int(eger)?|(big|small)?serial|year)\b")?,
            float: Regex::new(r"^(float|double( precision)?|real|decimal|numeric|money)\b")?,
            json: Regex::new(r"^jsonb?\b")?,
        })
    }
}

/// Column type patterns, compiled once.
fn column_patterns() -> Option<&'static ColumnPatterns> {
    static PATTERNS: OnceLock<Option<ColumnPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match ColumnPatterns::compile() {
            Ok(patterns) => Some(patterns),
            Err(e) => {
                tracing::warn!(error = %e, "Column type patterns failed to compile");
                None
            }
        })
        .as_ref()
}

/// A named, typed field of an entity schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field (column) name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitive_tags() {
        assert_eq!(FieldType::parse("int"), FieldType::Int);
        assert_eq!(FieldType::parse("Integer"), FieldType::Int);
        assert_eq!(FieldType::parse("bool"), FieldType::Bool);
        assert_eq!(FieldType::parse("json"), FieldType::Array);
        assert_eq!(FieldType::parse("object"), FieldType::Object);
        assert_eq!(
            FieldType::parse("datetime"),
            FieldType::Custom("datetime".to_string())
        );
    }

    #[test]
    fn test_from_column_type() {
        assert_eq!(FieldType::from_column_type("int(11) unsigned"), FieldType::Int);
        assert_eq!(FieldType::from_column_type("BIGINT"), FieldType::Int);
        assert_eq!(FieldType::from_column_type("tinyint(1)"), FieldType::Bool);
        assert_eq!(FieldType::from_column_type("tinyint(4)"), FieldType::Int);
        assert_eq!(FieldType::from_column_type("decimal(10,2)"), FieldType::Float);
        assert_eq!(FieldType::from_column_type("double precision"), FieldType::Float);
        assert_eq!(FieldType::from_column_type("jsonb"), FieldType::Array);
        assert_eq!(FieldType::from_column_type("varchar(255)"), FieldType::String);
        assert_eq!(FieldType::from_column_type("datetime"), FieldType::String);
    }

    #[test]
    fn test_serde_uses_tags() {
        let def = FieldDef::new("created_at", "datetime");
        let json = serde_json::to_string(&def).unwrap();
        assert_eq!(json, r#"{"name":"created_at","type":"datetime"}"#);

        let back: FieldDef = serde_json::from_str(r#"{"name":"age","type":"int"}"#).unwrap();
        assert_eq!(back.ty, FieldType::Int);
    }
}
