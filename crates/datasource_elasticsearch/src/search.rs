//! Parsing of `_search` responses.
use crate::errors::{ElasticsearchError, Result};
use gateway_core::backend::{BackendResponse, Record};
use serde_json::Value;

/// Parse a search response into records in hit order.
///
/// Each record holds the hit's `_source` as is. The `_id` and `type` pseudo
/// columns are kept apart from it, `type` being the legacy mapping type, or
/// the index name on clusters without mapping types.
pub fn parse_search_response(index: &str, body: &Value) -> Result<BackendResponse> {
    let hits = body.get("hits").ok_or_else(|| {
        ElasticsearchError::InvalidResponse("search response missing hits".to_string())
    })?;

    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::Object(obj)) => obj.get("value").and_then(Value::as_u64),
        _ => None,
    };

    let records = match hits.get("hits") {
        Some(Value::Array(hits)) => hits.iter().map(|hit| record(index, hit)).collect(),
        Some(_) => {
            return Err(ElasticsearchError::InvalidResponse(
                "hits.hits is not an array".to_string(),
            ));
        }
        None => Vec::new(),
    };

    Ok(BackendResponse { records, total })
}

fn record(index: &str, hit: &Value) -> Record {
    let fields = match hit.get("_source") {
        Some(Value::Object(source)) => source.clone(),
        _ => serde_json::Map::new(),
    };

    let kind = hit
        .get("_type")
        .or_else(|| hit.get("_index"))
        .and_then(text)
        .unwrap_or_else(|| index.to_string());

    Record {
        fields,
        id: hit.get("_id").and_then(text),
        kind: Some(kind),
        score: hit.get("_score").and_then(Value::as_f64),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
