//! Translate single table SELECTs into search request bodies.
//!
//! A statement is translated entirely or not at all. Predicates we can't
//! express return an error instead of being dropped.
use crate::errors::{ElasticsearchError, Result};
use gateway_core::classify::{Projection, SelectStatement};
use gateway_core::discovery::{ID_COLUMN, KIND_COLUMN, SCORE_COLUMN, is_pseudo_column};
use gateway_core::schema::{Field, Table};
use serde_json::{Value, json};
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator};

/// Build the `_search` body for a SELECT.
pub fn translate_select(table: &Table, select: &SelectStatement, max_rows: u64) -> Result<Value> {
    let translator = Translator { table, select };
    let mut body = serde_json::Map::new();

    let query = match &select.predicate {
        Some(expr) => translator.predicate(expr)?,
        None => json!({"match_all": {}}),
    };
    body.insert("query".to_string(), query);

    if let Projection::Columns(columns) = &select.projection {
        let mut includes = Vec::with_capacity(columns.len());
        for column in columns {
            let field = translator.field(&column.name)?;
            if !is_pseudo_column(&field.name) && !includes.contains(&field.name) {
                includes.push(field.name.clone());
            }
        }
        let source = if includes.is_empty() {
            Value::Bool(false)
        } else {
            json!(includes)
        };
        body.insert("_source".to_string(), source);
    }

    if !select.order_by.is_empty() {
        let mut sort = Vec::with_capacity(select.order_by.len());
        for key in &select.order_by {
            let field = translator.field(&key.column)?;
            if field.name == KIND_COLUMN {
                return Err(unsupported(format!("can't sort on '{KIND_COLUMN}'")));
            }
            let order = if key.ascending { "asc" } else { "desc" };
            sort.push(json!({ field.name.clone(): {"order": order} }));
        }
        body.insert("sort".to_string(), Value::Array(sort));
    }

    body.insert("size".to_string(), json!(select.limit.unwrap_or(max_rows)));
    if let Some(offset) = select.offset {
        body.insert("from".to_string(), json!(offset));
    }

    Ok(Value::Object(body))
}

fn unsupported(msg: impl Into<String>) -> ElasticsearchError {
    ElasticsearchError::Translation(msg.into())
}

struct Translator<'a> {
    table: &'a Table,
    select: &'a SelectStatement,
}

impl Translator<'_> {
    fn field(&self, name: &str) -> Result<&Field> {
        self.table.field_by_name(name).ok_or_else(|| {
            unsupported(format!("Unknown column '{name}' in table '{}'", self.table.name))
        })
    }

    /// Resolve an expression to a filterable field.
    fn filter_field(&self, expr: &Expr) -> Result<&Field> {
        let name = self
            .select
            .column_name(expr)
            .ok_or_else(|| unsupported(format!("expected a column, got: {expr}")))?;
        let field = self.field(&name)?;
        if field.name == KIND_COLUMN || field.name == SCORE_COLUMN {
            return Err(unsupported(format!("can't filter on '{}'", field.name)));
        }
        Ok(field)
    }

    fn predicate(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Nested(inner) => self.predicate(inner),
            Expr::BinaryOp { left, op, right } => self.binary(left, op, right),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(must_not(self.predicate(expr)?)),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let field = self.filter_field(expr)?;
                let values = list.iter().map(literal).collect::<Result<Vec<_>>>()?;
                let query = json!({"terms": { field.name.clone(): values }});
                Ok(negate_if(query, *negated))
            }
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let field = self.filter_field(expr)?;
                let query = json!({"range": { field.name.clone(): {
                    "gte": literal(low)?,
                    "lte": literal(high)?,
                }}});
                Ok(negate_if(query, *negated))
            }
            Expr::Like {
                negated,
                expr,
                pattern,
                ..
            } => self.like(expr, pattern, *negated, false),
            Expr::ILike {
                negated,
                expr,
                pattern,
                ..
            } => self.like(expr, pattern, *negated, true),
            Expr::IsNull(expr) => {
                let field = self.filter_field(expr)?;
                Ok(must_not(exists(field)))
            }
            Expr::IsNotNull(expr) => {
                let field = self.filter_field(expr)?;
                Ok(exists(field))
            }
            other => Err(unsupported(format!("unsupported expression in WHERE: {other}"))),
        }
    }

    fn binary(&self, left: &Expr, op: &BinaryOperator, right: &Expr) -> Result<Value> {
        match op {
            BinaryOperator::And => Ok(json!({"bool": {"must": [
                self.predicate(left)?,
                self.predicate(right)?,
            ]}})),
            BinaryOperator::Or => Ok(json!({"bool": {
                "should": [self.predicate(left)?, self.predicate(right)?],
                "minimum_should_match": 1,
            }})),
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq => {
                // Allow `3 < col` by flipping the comparison.
                let (column, value, op) = if self.select.column_name(left).is_some() {
                    (left, right, op.clone())
                } else {
                    (right, left, flip(op))
                };
                let field = self.filter_field(column)?;
                let value = literal(value)?;
                if value.is_null() {
                    return Err(unsupported("use IS [NOT] NULL to compare with NULL"));
                }

                match op {
                    BinaryOperator::Eq => Ok(equals(field, value)),
                    BinaryOperator::NotEq => Ok(must_not(equals(field, value))),
                    other => {
                        let bound = match other {
                            BinaryOperator::Lt => "lt",
                            BinaryOperator::LtEq => "lte",
                            BinaryOperator::Gt => "gt",
                            _ => "gte",
                        };
                        Ok(json!({"range": { field.name.clone(): { bound: value }}}))
                    }
                }
            }
            other => Err(unsupported(format!("unsupported operator in WHERE: {other}"))),
        }
    }

    fn like(
        &self,
        expr: &Expr,
        pattern: &Expr,
        negated: bool,
        case_insensitive: bool,
    ) -> Result<Value> {
        let field = self.filter_field(expr)?;
        let pattern = match literal(pattern)? {
            Value::String(s) => s,
            other => return Err(unsupported(format!("LIKE pattern must be a string, got {other}"))),
        };
        let mut wildcard = json!({"value": like_to_wildcard(&pattern)});
        if case_insensitive {
            wildcard["case_insensitive"] = Value::Bool(true);
        }
        let query = json!({"wildcard": { field.name.clone(): wildcard }});
        Ok(negate_if(query, negated))
    }
}

fn flip(op: &BinaryOperator) -> BinaryOperator {
    match op {
        BinaryOperator::Lt => BinaryOperator::Gt,
        BinaryOperator::LtEq => BinaryOperator::GtEq,
        BinaryOperator::Gt => BinaryOperator::Lt,
        BinaryOperator::GtEq => BinaryOperator::LtEq,
        other => other.clone(),
    }
}

fn equals(field: &Field, value: Value) -> Value {
    if field.name == ID_COLUMN {
        return json!({"ids": {"values": [value]}});
    }
    // Analyzed text doesn't match exact terms.
    if native_type(field).as_deref() == Some("text") {
        return json!({"match_phrase": { field.name.clone(): value }});
    }
    json!({"term": { field.name.clone(): value }})
}

fn exists(field: &Field) -> Value {
    json!({"exists": {"field": field.name}})
}

fn must_not(query: Value) -> Value {
    json!({"bool": {"must_not": [query]}})
}

fn negate_if(query: Value, negated: bool) -> Value {
    if negated { must_not(query) } else { query }
}

/// Native type recorded in the field's raw descriptor.
fn native_type(field: &Field) -> Option<String> {
    let desc: Value = serde_json::from_str(&field.description).ok()?;
    desc.get("type").and_then(Value::as_str).map(String::from)
}

/// Convert a literal expression into a JSON value.
fn literal(expr: &Expr) -> Result<Value> {
    use sqlparser::ast::Value as SqlValue;

    match expr {
        Expr::Value(v) => match &v.value {
            SqlValue::Number(n, _) => number(n),
            SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
                Ok(Value::String(s.clone()))
            }
            SqlValue::Boolean(b) => Ok(Value::Bool(*b)),
            SqlValue::Null => Ok(Value::Null),
            other => Err(unsupported(format!("unsupported literal: {other}"))),
        },
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal(expr)? {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(json!(-i))
                } else {
                    Ok(json!(-n.as_f64().unwrap_or_default()))
                }
            }
            other => Err(unsupported(format!("can't negate {other}"))),
        },
        Expr::Nested(inner) => literal(inner),
        other => Err(unsupported(format!("expected a literal, got: {other}"))),
    }
}

fn number(n: &str) -> Result<Value> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(json!(i));
    }
    n.parse::<f64>()
        .map(|f| json!(f))
        .map_err(|_| unsupported(format!("invalid number: {n}")))
}

/// Convert a SQL LIKE pattern to a wildcard pattern.
fn like_to_wildcard(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push('*'),
            '_' => out.push('?'),
            '*' | '?' => {
                out.push('\\');
                out.push(c);
            }
            '\\' => match chars.next() {
                Some(escaped @ ('*' | '?' | '\\')) => {
                    out.push('\\');
                    out.push(escaped);
                }
                Some(escaped) => out.push(escaped),
                None => out.push_str("\\\\"),
            },
            other => out.push(other),
        }
    }
    out
}
