//! Lazy table discovery from backend metadata.
use crate::backend::{Backend, NativeField, ScalarMapping};
use crate::errors::{GatewayError, Result};
use crate::schema::{DescribeRow, Field, Schema, Table};
use crate::types::ValueType;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Identifier column present on every table.
pub const ID_COLUMN: &str = "_id";
/// Structural kind column present on every table.
pub const KIND_COLUMN: &str = "type";
/// Relevance score column present on every table.
pub const SCORE_COLUMN: &str = "_score";

/// Descriptor used for fields without a scalar mapping.
pub const OBJECT_DESCRIPTOR: &str = r#"{"type":"object"}"#;

/// Width used for object columns.
const OBJECT_LENGTH: u32 = 2000;

pub fn is_pseudo_column(name: &str) -> bool {
    matches!(name, ID_COLUMN | KIND_COLUMN | SCORE_COLUMN)
}

/// Resolve a table, building it from backend metadata on first access.
///
/// Concurrent first lookups for the same name share one metadata fetch. A
/// failed fetch isn't cached.
pub async fn resolve_table(
    schema: &Schema,
    backend: &dyn Backend,
    name: &str,
) -> Result<Arc<Table>> {
    if let Some(table) = schema.tables().get(name) {
        trace!(schema = %schema.name, table = %name, "table cache hit");
        return Ok(table);
    }

    let slot = schema.tables().slot(name);
    let result = slot
        .get_or_try_init(|| async move {
            debug!(schema = %schema.name, table = %name, "discovering table");
            let table = discover_table(schema, backend, name).await?;
            Ok::<_, GatewayError>(Arc::new(table))
        })
        .await
        .map(Arc::clone);

    if result.is_err() {
        schema.tables().remove_empty(name, &slot);
    }
    result
}

async fn discover_table(schema: &Schema, backend: &dyn Backend, name: &str) -> Result<Table> {
    let address = schema.choose_backend().ok_or_else(|| {
        GatewayError::schema_resolution(
            name,
            format!("schema '{}' has no backend nodes configured", schema.name),
        )
    })?;

    let native = backend
        .table_metadata(address, name)
        .await
        .map_err(|e| match e {
            e @ GatewayError::SchemaResolution { .. } => e,
            other => GatewayError::schema_resolution(name, other),
        })?;

    if native.is_empty() {
        warn!(%address, table = %name, "backend returned no usable field metadata");
        return Err(GatewayError::schema_resolution(name, "backend returned no usable keys"));
    }

    let mapping = |t: &str| backend.map_native_type(t);
    Ok(build_table(&schema.name, name, &native, &mapping))
}

/// Build a table from a native description.
///
/// The pseudo-columns come first, followed by the flattened native fields.
pub fn build_table(
    schema: &str,
    name: &str,
    native: &[NativeField],
    mapping: &dyn Fn(&str) -> Option<ScalarMapping>,
) -> Table {
    let mut table = Table::new(name, schema);
    add_pseudo_columns(&mut table);
    flatten_fields(&mut table, native, "", mapping);
    table
}

fn add_pseudo_columns(table: &mut Table) {
    table.add_field(Field::new(ID_COLUMN, ValueType::String, 24, "AUTOGEN"));
    table.add_field(Field::new(KIND_COLUMN, ValueType::String, 24, "tbd"));
    table.add_field(Field::new(SCORE_COLUMN, ValueType::Number, 24, "Created per search"));

    table.add_describe_row(DescribeRow {
        field: ID_COLUMN.to_string(),
        native_type: "string".to_string(),
        nullable: false,
        key: "PRI".to_string(),
        default: Some("AUTOGEN".to_string()),
        extra: String::new(),
    });
    table.add_describe_row(DescribeRow {
        field: KIND_COLUMN.to_string(),
        native_type: "string".to_string(),
        nullable: false,
        key: String::new(),
        default: None,
        extra: "tbd".to_string(),
    });
    table.add_describe_row(DescribeRow {
        field: SCORE_COLUMN.to_string(),
        native_type: "float".to_string(),
        nullable: false,
        key: String::new(),
        default: None,
        extra: "Created per search".to_string(),
    });
}

/// Recursively flatten native fields into dot-path columns.
///
/// Every leaf and every container becomes exactly one field. Containers are
/// typed [`ValueType::Unknown`]. A field whose name is already taken, e.g. a
/// native `type` field shadowed by the pseudo-column, is dropped along with
/// its children.
pub fn flatten_fields(
    table: &mut Table,
    native: &[NativeField],
    prefix: &str,
    mapping: &dyn Fn(&str) -> Option<ScalarMapping>,
) {
    for field in native {
        let name = format!("{prefix}{}", field.name);
        if table.field_by_name(&name).is_some() {
            warn!(table = %table.name, field = %name, "skipping field with duplicate column name");
            continue;
        }

        let scalar = field
            .native_type
            .as_deref()
            .and_then(|t| mapping(t).map(|m| (t, m)));

        match scalar {
            Some((native_type, m)) => {
                table.add_describe_row(DescribeRow::nullable(&name, native_type, &field.raw));
                table.add_field(Field::new(name, m.value_type, m.length, &field.raw));
            }
            None => {
                table.add_describe_row(DescribeRow::nullable(&name, "object", OBJECT_DESCRIPTOR));
                table.add_field(Field::new(
                    &name,
                    ValueType::Unknown,
                    OBJECT_LENGTH,
                    OBJECT_DESCRIPTOR,
                ));

                if field.properties.is_empty() {
                    debug!(field = %name, raw = %field.raw, "unknown field type");
                } else {
                    flatten_fields(table, &field.properties, &format!("{name}."), mapping);
                }
            }
        }
    }
}
