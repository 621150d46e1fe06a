//! Turn backend records into relational rows.
use crate::backend::{BackendResponse, Record};
use crate::classify::Projection;
use crate::discovery::{ID_COLUMN, KIND_COLUMN, SCORE_COLUMN};
use crate::errors::{GatewayError, Result};
use crate::result::{ColumnHeader, ResultSet, Row, RowIter};
use crate::schema::Table;
use crate::types::{ScalarValue, ValueType};
use serde_json::Value;

/// Where a column's values come from.
#[derive(Debug, Clone)]
struct ColumnSource {
    path: String,
    value_type: ValueType,
}

/// Maps a backend response onto the columns of a table projection.
#[derive(Debug)]
pub struct Materializer {
    headers: Vec<ColumnHeader>,
    sources: Vec<ColumnSource>,
    records: Vec<Record>,
}

impl Materializer {
    /// Create a materializer for a projection over `table`.
    ///
    /// Errors if the projection names a column the table doesn't have.
    pub fn new(table: &Table, projection: &Projection, response: BackendResponse) -> Result<Self> {
        let mut headers = Vec::new();
        let mut sources = Vec::new();

        match projection {
            Projection::All => {
                for field in table.fields() {
                    headers.push(table.column_header(field, &field.name));
                    sources.push(ColumnSource {
                        path: field.name.clone(),
                        value_type: field.value_type,
                    });
                }
            }
            Projection::Columns(columns) => {
                for column in columns {
                    let field = table.field_by_name(&column.name).ok_or_else(|| {
                        GatewayError::Translation(format!(
                            "Unknown column '{}' in table '{}'",
                            column.name, table.name
                        ))
                    })?;
                    headers.push(table.column_header(field, column.label()));
                    sources.push(ColumnSource {
                        path: field.name.clone(),
                        value_type: field.value_type,
                    });
                }
            }
        }

        Ok(Materializer {
            headers,
            sources,
            records: response.records,
        })
    }

    pub fn headers(&self) -> &[ColumnHeader] {
        &self.headers
    }

    /// Rows in backend order, produced on demand.
    pub fn into_rows(self) -> RowIter {
        let sources = self.sources;
        Box::new(
            self.records
                .into_iter()
                .map(move |record| materialize_row(&sources, &record)),
        )
    }

    pub fn into_result_set(self) -> ResultSet {
        let headers = self.headers.clone();
        ResultSet::new(headers, self.into_rows())
    }
}

fn materialize_row(sources: &[ColumnSource], record: &Record) -> Row {
    sources
        .iter()
        .map(|source| match source.path.as_str() {
            ID_COLUMN => text_or_null(record.id.as_deref()),
            KIND_COLUMN => text_or_null(record.kind.as_deref()),
            SCORE_COLUMN => match record.score {
                Some(score) => ScalarValue::Number(score),
                None => ScalarValue::Null,
            },
            path => match lookup_path(&record.fields, path) {
                Some(value) => convert(&value, source.value_type),
                None => ScalarValue::Null,
            },
        })
        .collect()
}

fn text_or_null(value: Option<&str>) -> ScalarValue {
    value.map(ScalarValue::from).unwrap_or(ScalarValue::Null)
}

fn convert(value: &Value, value_type: ValueType) -> ScalarValue {
    match value {
        // Single element arrays are common for scalar fields.
        Value::Array(items) if items.len() == 1 && value_type != ValueType::Unknown => {
            ScalarValue::from_json(&items[0], value_type)
        }
        Value::Array(_) => ScalarValue::String(value.to_string()),
        _ => ScalarValue::from_json(value, value_type),
    }
}

/// Resolve a dot separated path through a document.
///
/// A literal key containing dots takes precedence. Arrays met on the way fan
/// out, collecting the value from every element.
pub fn lookup_path(doc: &serde_json::Map<String, Value>, path: &str) -> Option<Value> {
    if let Some(v) = doc.get(path) {
        return Some(v.clone());
    }

    let (head, rest) = path.split_once('.')?;
    let next = doc.get(head)?;
    lookup_value(next, rest)
}

fn lookup_value(value: &Value, path: &str) -> Option<Value> {
    match value {
        Value::Object(map) => lookup_path(map, path),
        Value::Array(items) => {
            let found: Vec<Value> = items
                .iter()
                .filter_map(|item| lookup_value(item, path))
                .flat_map(|v| match v {
                    Value::Array(inner) => inner,
                    other => vec![other],
                })
                .collect();
            if found.is_empty() {
                None
            } else {
                Some(Value::Array(found))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::search_engine_type_mapping;
    use crate::classify::SelectColumn;
    use crate::discovery::build_table;
    use crate::testutil::{orders_metadata, record};
    use serde_json::json;

    fn orders() -> Table {
        build_table(
            "s",
            "orders",
            &orders_metadata(),
            &search_engine_type_mapping,
        )
    }

    #[test]
    fn star_headers_with_no_hits() {
        let table = orders();
        let m = Materializer::new(&table, &Projection::All, BackendResponse::default()).unwrap();

        let names: Vec<_> = m.headers().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(6, names.len());
        assert_eq!(&["_id", "type", "_score"], &names[..3]);
        for header in m.headers() {
            assert_eq!("orders", header.table);
            assert_eq!("s", header.schema);
        }
        assert_eq!(0, m.into_rows().count());
    }

    #[test]
    fn projected_rows() {
        let table = orders();
        let projection = Projection::Columns(vec![
            SelectColumn {
                name: "customer.name".to_string(),
                alias: Some("cname".to_string()),
            },
            SelectColumn {
                name: "id".to_string(),
                alias: None,
            },
            SelectColumn {
                name: "_score".to_string(),
                alias: None,
            },
        ]);
        let response = BackendResponse {
            records: vec![
                record(json!({"id": 1, "customer": {"name": "ann"}}), Some(1.5)),
                record(json!({"id": "2"}), None),
            ],
            total: Some(2),
        };

        let m = Materializer::new(&table, &projection, response).unwrap();
        let names: Vec<_> = m.headers().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(vec!["cname", "id", "_score"], names);

        let rows: Vec<Row> = m.into_rows().collect();
        assert_eq!(
            vec![
                vec![
                    ScalarValue::from("ann"),
                    ScalarValue::Int(1),
                    ScalarValue::Number(1.5),
                ],
                vec![ScalarValue::Null, ScalarValue::Int(2), ScalarValue::Null],
            ],
            rows
        );
    }

    #[test]
    fn pseudo_columns_come_from_record() {
        let table = orders();
        let doc = json!({"id": 7, "_id": "from-source", "type": "click"});
        let mut hit = record(doc, None);
        hit.id = Some("doc-7".to_string());
        hit.kind = Some("orders".to_string());
        let response = BackendResponse {
            records: vec![hit, record(json!({"id": 8}), None)],
            total: None,
        };

        let rows: Vec<Row> = Materializer::new(&table, &Projection::All, response)
            .unwrap()
            .into_rows()
            .collect();
        assert_eq!(
            &[
                ScalarValue::from("doc-7"),
                ScalarValue::from("orders"),
                ScalarValue::Null,
            ],
            &rows[0][..3]
        );
        assert_eq!(
            &[ScalarValue::Null, ScalarValue::Null, ScalarValue::Null],
            &rows[1][..3]
        );
    }

    #[test]
    fn unknown_projected_column() {
        let table = orders();
        let projection = Projection::Columns(vec![SelectColumn {
            name: "nope".to_string(),
            alias: None,
        }]);
        let err = Materializer::new(&table, &projection, BackendResponse::default()).unwrap_err();
        assert!(matches!(err, GatewayError::Translation(_)));
    }

    #[test]
    fn object_column_is_json_text() {
        let table = orders();
        let projection = Projection::Columns(vec![SelectColumn {
            name: "customer".to_string(),
            alias: None,
        }]);
        let response = BackendResponse {
            records: vec![record(json!({"customer": {"name": "bob"}}), None)],
            total: None,
        };
        let rows: Vec<Row> = Materializer::new(&table, &projection, response)
            .unwrap()
            .into_rows()
            .collect();
        assert_eq!(ScalarValue::from(r#"{"name":"bob"}"#), rows[0][0]);
    }

    #[test]
    fn path_fans_out_over_arrays() {
        let doc = json!({"lines": [{"sku": "a"}, {"sku": "b"}, {"qty": 1}]});
        let Value::Object(map) = doc else {
            unreachable!()
        };
        assert_eq!(Some(json!(["a", "b"])), lookup_path(&map, "lines.sku"));
        assert_eq!(None, lookup_path(&map, "lines.missing"));

        let doc = json!({"a.b": 1, "a": {"b": 2}});
        let Value::Object(map) = doc else {
            unreachable!()
        };
        assert_eq!(Some(json!(1)), lookup_path(&map, "a.b"));
    }
}
