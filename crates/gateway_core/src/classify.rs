//! Classify parsed statements into the handling path they take.
use sqlparser::ast::{
    self, Expr, ObjectName, ObjectNamePart, SelectItem, SetExpr, Statement, TableFactor,
};
use std::fmt;

/// A statement interpreted as one of the supported query intents.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedStatement {
    /// Single table SELECT.
    Select(SelectStatement),
    /// `DESCRIBE <table>`.
    Describe {
        schema: Option<String>,
        table: String,
    },
    Show(ShowStatement),
    /// SELECT of session/system variables without a table.
    SysVarSelect { variables: Vec<SysVar> },
    /// `USE <schema>`.
    Use { schema: String },
    /// Parsed, but not something we handle. Carries the reason.
    Unsupported(String),
}

/// Which columns a SELECT returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Columns(Vec<SelectColumn>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    /// Field name, dot separated for nested fields.
    pub name: String,
    pub alias: Option<String>,
}

impl SelectColumn {
    /// Label to use in the result header.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub ascending: bool,
}

/// A SELECT against exactly one table.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// Explicit schema qualifier, if any.
    pub schema: Option<String>,
    pub table: String,
    /// Alias given to the table in the FROM clause.
    pub table_alias: Option<String>,
    pub projection: Projection,
    /// WHERE clause, left for the backend translator.
    pub predicate: Option<Expr>,
    pub order_by: Vec<SortKey>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectStatement {
    /// Resolve a column reference against this statement's table.
    ///
    /// A leading table name or alias qualifier is stripped, everything else is
    /// treated as a nested field path.
    pub fn column_name(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Identifier(ident) => Some(ident.value.clone()),
            Expr::CompoundIdentifier(idents) => {
                let parts: Vec<&str> = idents.iter().map(|i| i.value.as_str()).collect();
                let qualified = parts.len() > 1
                    && (parts[0].eq_ignore_ascii_case(&self.table)
                        || self
                            .table_alias
                            .as_deref()
                            .is_some_and(|a| parts[0].eq_ignore_ascii_case(a)));
                let parts = if qualified { &parts[1..] } else { &parts[..] };
                Some(parts.join("."))
            }
            Expr::Nested(inner) => self.column_name(inner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowKind {
    Databases,
    Tables,
    /// Any other SHOW, carrying its text.
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowStatement {
    pub kind: ShowKind,
    /// Schema from `SHOW TABLES FROM <schema>`.
    pub from: Option<String>,
}

/// A system or session variable reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysVar {
    /// Column label, the expression text or its alias.
    pub label: String,
    /// Lowercased variable name without `@@` or scope.
    pub name: String,
}

impl fmt::Display for SysVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@@{}", self.name)
    }
}

/// Classify a parsed statement.
///
/// Total over parser output, anything without a handler becomes
/// [`ClassifiedStatement::Unsupported`].
pub fn classify(stmt: &Statement) -> ClassifiedStatement {
    match stmt {
        Statement::Query(query) => classify_query(query),
        Statement::ExplainTable { table_name, .. } => match split_object_name(table_name) {
            Some((schema, table)) => ClassifiedStatement::Describe { schema, table },
            None => unsupported(format!("unrecognized describe/explain: {stmt}")),
        },
        Statement::Explain { statement, .. } => match statement.as_ref() {
            Statement::Query(_) => {
                unsupported(format!("describe/explain not yet supported: {stmt}"))
            }
            _ => unsupported(format!("unrecognized describe/explain: {stmt}")),
        },
        Statement::ShowDatabases { .. } | Statement::ShowSchemas { .. } => {
            ClassifiedStatement::Show(ShowStatement {
                kind: ShowKind::Databases,
                from: None,
            })
        }
        Statement::ShowTables { show_options, .. } => {
            let from = show_options
                .show_in
                .as_ref()
                .and_then(|show_in| show_in.parent_name.as_ref())
                .and_then(object_name_last)
                .map(|name| name.to_lowercase());
            ClassifiedStatement::Show(ShowStatement {
                kind: ShowKind::Tables,
                from,
            })
        }
        Statement::ShowColumns { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowCollation { .. }
        | Statement::ShowFunctions { .. } => ClassifiedStatement::Show(ShowStatement {
            kind: ShowKind::Unsupported(stmt.to_string()),
            from: None,
        }),
        Statement::Use(use_stmt) => match use_stmt {
            ast::Use::Object(name) | ast::Use::Database(name) | ast::Use::Schema(name) => {
                match object_name_last(name) {
                    Some(schema) => ClassifiedStatement::Use { schema },
                    None => unsupported(format!("statement not supported now: {stmt}")),
                }
            }
            _ => unsupported(format!("statement not supported now: {stmt}")),
        },
        other => unsupported(format!("statement not supported now: {other}")),
    }
}

fn unsupported(reason: impl Into<String>) -> ClassifiedStatement {
    ClassifiedStatement::Unsupported(reason.into())
}

fn classify_query(query: &ast::Query) -> ClassifiedStatement {
    if query.with.is_some() {
        return unsupported(format!("common table expressions not supported: {query}"));
    }

    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        _ => return unsupported(format!("only simple SELECT is supported: {query}")),
    };

    if select.from.is_empty() {
        return classify_tableless(select, query);
    }

    if select.from.len() > 1 || select.from.iter().any(|t| !t.joins.is_empty()) {
        return unsupported("join not implemented");
    }

    let (name, alias) = match &select.from[0].relation {
        TableFactor::Table {
            name, alias, args, ..
        } if args.is_none() => (name, alias),
        other => return unsupported(format!("unsupported table source: {other}")),
    };
    let Some((schema, table)) = split_object_name(name) else {
        return unsupported(format!("unsupported table name: {name}"));
    };

    if select.distinct.is_some() {
        return unsupported("DISTINCT not supported");
    }
    match &select.group_by {
        ast::GroupByExpr::Expressions(exprs, _) if exprs.is_empty() => (),
        _ => return unsupported("GROUP BY not supported"),
    }
    if select.having.is_some() {
        return unsupported("HAVING not supported");
    }

    let mut stmt = SelectStatement {
        schema,
        table,
        table_alias: alias.as_ref().map(|a| a.name.value.clone()),
        projection: Projection::All,
        predicate: select.selection.clone(),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };

    stmt.projection = match projection(&stmt, &select.projection) {
        Ok(p) => p,
        Err(reason) => return unsupported(reason),
    };

    if let Some(order_by) = &query.order_by {
        match sort_keys(&stmt, order_by) {
            Ok(keys) => stmt.order_by = keys,
            Err(reason) => return unsupported(reason),
        }
    }

    if let Some(limit_clause) = &query.limit_clause {
        match limit_offset(limit_clause) {
            Ok((limit, offset)) => {
                stmt.limit = limit;
                stmt.offset = offset;
            }
            Err(reason) => return unsupported(reason),
        }
    }

    ClassifiedStatement::Select(stmt)
}

/// SELECT without FROM. Only system variable lookups are handled.
fn classify_tableless(select: &ast::Select, query: &ast::Query) -> ClassifiedStatement {
    let mut variables = Vec::with_capacity(select.projection.len());
    for item in &select.projection {
        let (expr, alias) = match item {
            SelectItem::UnnamedExpr(expr) => (expr, None),
            SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias.value.clone())),
            _ => return unsupported(format!("select without table not supported: {query}")),
        };
        match sys_var_name(expr) {
            Some(name) => variables.push(SysVar {
                label: alias.unwrap_or_else(|| expr.to_string()),
                name,
            }),
            None => return unsupported(format!("select without table not supported: {query}")),
        }
    }

    if variables.is_empty() {
        return unsupported(format!("select without table not supported: {query}"));
    }
    ClassifiedStatement::SysVarSelect { variables }
}

/// Extract a variable name from `@@name`, `@@session.name` or `@@global.name`.
fn sys_var_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => {
            let rest = ident.value.strip_prefix("@@")?;
            let name = match rest.split_once('.') {
                Some((scope, name)) if is_var_scope(scope) => name,
                _ => rest,
            };
            Some(name.to_lowercase())
        }
        Expr::CompoundIdentifier(idents) if idents.len() == 2 => {
            let scope = idents[0].value.strip_prefix("@@")?;
            if is_var_scope(scope) {
                Some(idents[1].value.to_lowercase())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn is_var_scope(scope: &str) -> bool {
    scope.eq_ignore_ascii_case("session")
        || scope.eq_ignore_ascii_case("global")
        || scope.eq_ignore_ascii_case("local")
}

fn projection(stmt: &SelectStatement, items: &[SelectItem]) -> Result<Projection, String> {
    let mut columns = Vec::with_capacity(items.len());
    for item in items {
        match item {
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                if items.len() != 1 {
                    return Err("mixing * with other columns not supported".to_string());
                }
                return Ok(Projection::All);
            }
            SelectItem::UnnamedExpr(expr) => {
                let name = stmt
                    .column_name(expr)
                    .ok_or_else(|| format!("unsupported projection: {expr}"))?;
                columns.push(SelectColumn { name, alias: None });
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                let name = stmt
                    .column_name(expr)
                    .ok_or_else(|| format!("unsupported projection: {expr}"))?;
                columns.push(SelectColumn {
                    name,
                    alias: Some(alias.value.clone()),
                });
            }
        }
    }
    Ok(Projection::Columns(columns))
}

fn sort_keys(stmt: &SelectStatement, order_by: &ast::OrderBy) -> Result<Vec<SortKey>, String> {
    let exprs = match &order_by.kind {
        ast::OrderByKind::Expressions(exprs) => exprs,
        _ => return Err("ORDER BY ALL not supported".to_string()),
    };
    exprs
        .iter()
        .map(|e| {
            let column = stmt
                .column_name(&e.expr)
                .ok_or_else(|| format!("unsupported ORDER BY expression: {}", e.expr))?;
            Ok(SortKey {
                column,
                ascending: e.options.asc.unwrap_or(true),
            })
        })
        .collect()
}

fn limit_offset(clause: &ast::LimitClause) -> Result<(Option<u64>, Option<u64>), String> {
    match clause {
        ast::LimitClause::LimitOffset {
            limit,
            offset,
            limit_by,
        } => {
            if !limit_by.is_empty() {
                return Err("LIMIT BY not supported".to_string());
            }
            let limit = limit.as_ref().map(literal_u64).transpose()?;
            let offset = offset.as_ref().map(|o| literal_u64(&o.value)).transpose()?;
            Ok((limit, offset))
        }
        ast::LimitClause::OffsetCommaLimit { offset, limit } => {
            Ok((Some(literal_u64(limit)?), Some(literal_u64(offset)?)))
        }
    }
}

fn literal_u64(expr: &Expr) -> Result<u64, String> {
    match expr {
        Expr::Value(v) => match &v.value {
            ast::Value::Number(n, _) => n
                .parse::<u64>()
                .map_err(|_| format!("invalid LIMIT/OFFSET value: {n}")),
            other => Err(format!("invalid LIMIT/OFFSET value: {other}")),
        },
        other => Err(format!("invalid LIMIT/OFFSET value: {other}")),
    }
}

fn object_name_last(name: &ObjectName) -> Option<String> {
    name.0.last().and_then(ident_part)
}

fn ident_part(part: &ObjectNamePart) -> Option<String> {
    #[allow(unreachable_patterns)]
    match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.clone()),
        _ => None,
    }
}

/// Split `[schema.]table`, lowercasing both.
fn split_object_name(name: &ObjectName) -> Option<(Option<String>, String)> {
    let parts: Option<Vec<String>> = name.0.iter().map(ident_part).collect();
    let parts = parts?;
    match parts.as_slice() {
        [table] => Some((None, table.to_lowercase())),
        [schema, table] => Some((Some(schema.to_lowercase()), table.to_lowercase())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql;

    fn classify_sql(sql: &str) -> ClassifiedStatement {
        classify(&parse_sql(sql).unwrap())
    }

    fn select(sql: &str) -> SelectStatement {
        match classify_sql(sql) {
            ClassifiedStatement::Select(s) => s,
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn select_star() {
        let s = select("SELECT * FROM Orders");
        assert_eq!("orders", s.table);
        assert_eq!(None, s.schema);
        assert_eq!(Projection::All, s.projection);
        assert!(s.predicate.is_none());
    }

    #[test]
    fn select_columns() {
        let s = select("SELECT o.id, customer.name AS cname FROM orders o WHERE id > 3");
        assert_eq!(Some("o".to_string()), s.table_alias);
        assert_eq!(
            Projection::Columns(vec![
                SelectColumn {
                    name: "id".to_string(),
                    alias: None,
                },
                SelectColumn {
                    name: "customer.name".to_string(),
                    alias: Some("cname".to_string()),
                },
            ]),
            s.projection
        );
        assert!(s.predicate.is_some());
    }

    #[test]
    fn select_order_limit() {
        let s = select("select id from orders order by id desc, _score limit 10 offset 5");
        assert_eq!(
            vec![
                SortKey {
                    column: "id".to_string(),
                    ascending: false,
                },
                SortKey {
                    column: "_score".to_string(),
                    ascending: true,
                },
            ],
            s.order_by
        );
        assert_eq!(Some(10), s.limit);
        assert_eq!(Some(5), s.offset);

        let s = select("select id from orders limit 5, 10");
        assert_eq!(Some(10), s.limit);
        assert_eq!(Some(5), s.offset);
    }

    #[test]
    fn schema_qualified() {
        let s = select("select * from Alpha.orders");
        assert_eq!(Some("alpha".to_string()), s.schema);
        assert_eq!("orders", s.table);
    }

    #[test]
    fn two_tables_never_select() {
        for sql in [
            "select * from a, b",
            "select * from a join b on a.id = b.id",
            "select * from a left join b on a.id = b.id",
        ] {
            assert_eq!(
                ClassifiedStatement::Unsupported("join not implemented".to_string()),
                classify_sql(sql),
                "sql: {sql}"
            );
        }
    }

    #[test]
    fn sys_vars() {
        assert_eq!(
            ClassifiedStatement::SysVarSelect {
                variables: vec![SysVar {
                    label: "@@max_allowed_packet".to_string(),
                    name: "max_allowed_packet".to_string(),
                }],
            },
            classify_sql("select @@max_allowed_packet")
        );

        match classify_sql("SELECT @@session.tx_isolation, @@version_comment AS v limit 1") {
            ClassifiedStatement::SysVarSelect { variables } => {
                assert_eq!("tx_isolation", variables[0].name);
                assert_eq!("version_comment", variables[1].name);
                assert_eq!("v", variables[1].label);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tableless_non_var_unsupported() {
        assert!(matches!(
            classify_sql("select 1"),
            ClassifiedStatement::Unsupported(_)
        ));
    }

    #[test]
    fn describe() {
        assert_eq!(
            ClassifiedStatement::Describe {
                schema: None,
                table: "orders".to_string(),
            },
            classify_sql("DESCRIBE orders")
        );
        assert_eq!(
            ClassifiedStatement::Describe {
                schema: None,
                table: "orders".to_string(),
            },
            classify_sql("desc Orders")
        );
    }

    #[test]
    fn describe_select_unsupported() {
        match classify_sql("describe select * from orders") {
            ClassifiedStatement::Unsupported(reason) => {
                assert!(
                    reason.starts_with("describe/explain not yet supported"),
                    "{reason}"
                )
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn show() {
        assert_eq!(
            ClassifiedStatement::Show(ShowStatement {
                kind: ShowKind::Databases,
                from: None,
            }),
            classify_sql("SHOW DATABASES")
        );
        assert_eq!(
            ClassifiedStatement::Show(ShowStatement {
                kind: ShowKind::Tables,
                from: None,
            }),
            classify_sql("show tables")
        );
        assert_eq!(
            ClassifiedStatement::Show(ShowStatement {
                kind: ShowKind::Tables,
                from: Some("beta".to_string()),
            }),
            classify_sql("show tables from Beta")
        );
        assert!(matches!(
            classify_sql("show variables"),
            ClassifiedStatement::Show(ShowStatement {
                kind: ShowKind::Unsupported(_),
                ..
            })
        ));
    }

    #[test]
    fn use_schema() {
        assert_eq!(
            ClassifiedStatement::Use {
                schema: "alpha".to_string(),
            },
            classify_sql("use alpha")
        );
    }

    #[test]
    fn dml_unsupported() {
        for sql in [
            "insert into orders (id) values (1)",
            "update orders set id = 2",
            "delete from orders",
            "begin",
            "select id from orders union select id from other",
            "select count(*) from orders",
            "select id from orders group by id",
        ] {
            assert!(
                matches!(classify_sql(sql), ClassifiedStatement::Unsupported(_)),
                "sql: {sql}"
            );
        }
    }
}
