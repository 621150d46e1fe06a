//! Capability interface implemented once per backend kind.
//!
//! The dispatcher and classifier only ever talk to a backend through
//! [`Backend`], so adding a document store or key-value backend means adding
//! another implementation of this trait.
use crate::classify::SelectStatement;
use crate::errors::Result;
use crate::schema::Table;
use crate::types::ValueType;
use async_trait::async_trait;
use std::fmt::Debug;

/// Native structural description of one backend field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeField {
    pub name: String,
    /// Native type tag, e.g. `long` or `date`. Containers often have none.
    pub native_type: Option<String>,
    /// Nested sub-fields for object-like fields.
    pub properties: Vec<NativeField>,
    /// Raw definition text as returned by the backend.
    pub raw: String,
}

impl NativeField {
    pub fn scalar(name: impl Into<String>, native_type: impl Into<String>) -> Self {
        let native_type = native_type.into();
        NativeField {
            name: name.into(),
            raw: format!(r#"{{"type":"{native_type}"}}"#),
            native_type: Some(native_type),
            properties: Vec::new(),
        }
    }

    pub fn object(name: impl Into<String>, properties: Vec<NativeField>) -> Self {
        NativeField {
            name: name.into(),
            native_type: None,
            properties,
            raw: String::new(),
        }
    }
}

/// How a native type tag maps onto a normalized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarMapping {
    pub value_type: ValueType,
    /// Display width for the column.
    pub length: u32,
}

impl ScalarMapping {
    const fn new(value_type: ValueType, length: u32) -> Self {
        ScalarMapping { value_type, length }
    }
}

/// Type mapping for document search engine field kinds.
pub fn search_engine_type_mapping(native_type: &str) -> Option<ScalarMapping> {
    let mapping = match native_type {
        "boolean" => ScalarMapping::new(ValueType::Bool, 1),
        "string" | "text" | "keyword" => ScalarMapping::new(ValueType::String, 512),
        "date" => ScalarMapping::new(ValueType::Time, 4),
        "int" | "integer" | "long" | "short" | "byte" => ScalarMapping::new(ValueType::Int, 8),
        "float" | "double" | "half_float" | "scaled_float" => {
            ScalarMapping::new(ValueType::Number, 8)
        }
        // Nested documents are kept whole as a single JSON column.
        "nested" => ScalarMapping::new(ValueType::Unknown, 2000),
        _ => return None,
    };
    Some(mapping)
}

/// A backend-native query built from a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    /// Collection the request targets.
    pub table: String,
    /// Backend-native request body.
    pub body: serde_json::Value,
}

/// One record returned from a backend query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Document keyed by field name, possibly nested.
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Backend identifier of the document.
    pub id: Option<String>,
    /// Structural kind of the document, e.g. a mapping type or index name.
    pub kind: Option<String>,
    /// Relevance score computed by the backend, if any.
    pub score: Option<f64>,
}

/// Records returned from a backend query, in backend order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendResponse {
    pub records: Vec<Record>,
    /// Total matches reported by the backend, may exceed the records returned.
    pub total: Option<u64>,
}

#[async_trait]
pub trait Backend: Debug + Sync + Send {
    /// Backend-type tag matched against schema configuration.
    fn backend_type(&self) -> &str;

    /// Map a native type tag to a normalized column type.
    fn map_native_type(&self, native_type: &str) -> Option<ScalarMapping> {
        search_engine_type_mapping(native_type)
    }

    /// List the collections available at an address.
    async fn list_tables(&self, address: &str) -> Result<Vec<String>>;

    /// Fetch the native structural description for a collection.
    async fn table_metadata(&self, address: &str, table: &str) -> Result<Vec<NativeField>>;

    /// Translate a classified SELECT into a native request.
    ///
    /// Must either translate the whole statement or fail, never drop part of
    /// a predicate.
    fn translate(&self, table: &Table, select: &SelectStatement) -> Result<BackendRequest>;

    /// Execute a native request.
    async fn execute(&self, address: &str, request: &BackendRequest) -> Result<BackendResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_synonyms() {
        for tag in ["int", "integer", "long", "short", "byte"] {
            assert_eq!(
                ValueType::Int,
                search_engine_type_mapping(tag).unwrap().value_type,
                "tag: {tag}"
            );
        }
    }

    #[test]
    fn object_has_no_mapping() {
        assert_eq!(None, search_engine_type_mapping("object"));
        assert_eq!(None, search_engine_type_mapping("geo_point"));
    }

    #[test]
    fn scalar_raw_descriptor() {
        let field = NativeField::scalar("id", "long");
        assert_eq!(r#"{"type":"long"}"#, field.raw);
    }
}
