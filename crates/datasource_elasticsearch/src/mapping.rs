//! Parsing of index mapping and alias listing responses.
use crate::errors::{ElasticsearchError, Result};
use gateway_core::backend::NativeField;
use serde_json::{Map, Value};
use tracing::debug;

/// Placeholder mapping type present in older clusters.
const DEFAULT_MAPPING_TYPE: &str = "_default_";

/// Parse the response of `GET /{index}/_mapping`.
///
/// Accepts both the legacy layout keyed by mapping type
/// (`mappings.{type}.properties`) and the typeless layout
/// (`mappings.properties`). An index without properties yields no fields.
pub fn parse_mapping(index: &str, body: &Value) -> Result<Vec<NativeField>> {
    let indices = body
        .as_object()
        .ok_or_else(|| {
            ElasticsearchError::InvalidResponse("mapping is not an object".to_string())
        })?;

    // Requesting an alias returns the mapping keyed by the concrete index.
    let entry = match indices.get(index) {
        Some(entry) => entry,
        None if indices.len() == 1 => indices.values().next().unwrap_or(&Value::Null),
        None => {
            return Err(ElasticsearchError::InvalidResponse(format!(
                "mapping response missing index '{index}'"
            )));
        }
    };

    let mappings = match entry.get("mappings").and_then(Value::as_object) {
        Some(mappings) => mappings,
        None => return Ok(Vec::new()),
    };

    if let Some(props) = mappings.get("properties").and_then(Value::as_object) {
        return Ok(native_fields(props));
    }

    let typed = mappings
        .iter()
        .filter(|(name, _)| name.as_str() != DEFAULT_MAPPING_TYPE)
        .find_map(|(name, mapping)| {
            mapping
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| (name, props))
        });

    match typed {
        Some((mapping_type, props)) => {
            debug!(%index, %mapping_type, "using legacy mapping type");
            Ok(native_fields(props))
        }
        None => Ok(Vec::new()),
    }
}

/// Convert a `properties` object into native fields, recursing into
/// sub-properties.
pub fn native_fields(props: &Map<String, Value>) -> Vec<NativeField> {
    props
        .iter()
        .filter_map(|(name, def)| {
            let def = def.as_object().filter(|d| !d.is_empty())?;
            let properties = def
                .get("properties")
                .and_then(Value::as_object)
                .map(native_fields)
                .unwrap_or_default();
            Some(NativeField {
                name: name.clone(),
                native_type: def.get("type").and_then(Value::as_str).map(String::from),
                properties,
                raw: Value::Object(def.clone()).to_string(),
            })
        })
        .collect()
}

/// Parse the response of `GET /_aliases` into index names.
///
/// Hidden indices (leading `.`) are skipped. Aliases are listed alongside the
/// indices they point to.
pub fn parse_aliases(body: &Value) -> Result<Vec<String>> {
    let indices = body
        .as_object()
        .ok_or_else(|| {
            ElasticsearchError::InvalidResponse("aliases is not an object".to_string())
        })?;

    let mut names: Vec<String> = Vec::new();
    for (index, entry) in indices {
        if index.starts_with('.') {
            continue;
        }
        names.push(index.clone());
        if let Some(aliases) = entry.get("aliases").and_then(Value::as_object) {
            names.extend(aliases.keys().filter(|a| !a.starts_with('.')).cloned());
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(fields: &[NativeField]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn typeless_mapping() {
        let body = json!({
            "orders": {
                "mappings": {
                    "properties": {
                        "id": {"type": "long"},
                        "customer": {
                            "properties": {
                                "name": {"type": "text"}
                            }
                        }
                    }
                }
            }
        });

        let fields = parse_mapping("orders", &body).unwrap();
        assert_eq!(vec!["customer", "id"], names(&fields));

        let customer = &fields[0];
        assert_eq!(None, customer.native_type);
        assert_eq!(vec!["name"], names(&customer.properties));
        assert_eq!(r#"{"type":"text"}"#, customer.properties[0].raw);

        let id = &fields[1];
        assert_eq!(Some("long".to_string()), id.native_type);
        assert_eq!(r#"{"type":"long"}"#, id.raw);
    }

    #[test]
    fn legacy_mapping_skips_default() {
        let body = json!({
            "github": {
                "mappings": {
                    "_default_": {"properties": {"ignored": {"type": "long"}}},
                    "event": {
                        "properties": {
                            "actor": {"type": "string"},
                            "created_at": {"type": "date", "format": "dateOptionalTime"}
                        }
                    }
                }
            }
        });

        let fields = parse_mapping("github", &body).unwrap();
        assert_eq!(vec!["actor", "created_at"], names(&fields));
        assert_eq!(Some("date".to_string()), fields[1].native_type);
    }

    #[test]
    fn alias_resolves_to_index() {
        let body = json!({"orders-v2": {"mappings": {"properties": {"id": {"type": "long"}}}}});
        let fields = parse_mapping("orders", &body).unwrap();
        assert_eq!(vec!["id"], names(&fields));
    }

    #[test]
    fn empty_mapping() {
        let body = json!({"orders": {"mappings": {}}});
        assert!(parse_mapping("orders", &body).unwrap().is_empty());

        let body = json!({"a": {}, "b": {}});
        assert!(parse_mapping("orders", &body).is_err());
    }

    #[test]
    fn aliases() {
        let body = json!({
            "orders": {"aliases": {}},
            ".kibana": {"aliases": {".kibana_current": {}}},
            "events-2015": {"aliases": {"events": {}}},
            "accounts": {"aliases": {}}
        });
        assert_eq!(
            vec!["accounts", "events", "events-2015", "orders"],
            parse_aliases(&body).unwrap()
        );
    }
}
