//! Deterministic value synthesis for INSERT probes.

use uuid::Uuid;

/// A column of the probe target, as seen by the impersonated session.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// `information_schema` data type (e.g. `character varying`).
    pub data_type: String,
    /// Underlying type name (e.g. `varchar`, `int4`).
    pub udt_name: String,
    /// Whether the column has a default (including identity columns).
    pub has_default: bool,
}

/// The SQL value an INSERT probe supplies for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// An expression spliced into the VALUES list verbatim. Only
    /// engine-generated text ever takes this form.
    Expression(String),
    /// A string bound as a query parameter.
    Bound(String),
    /// Let the server fill the column.
    Default,
}

/// Synthesize a value for one column.
///
/// The rules are fixed so probe behavior is reproducible across runs:
/// uuid `id`/`user_id` columns get `auth.uid()` (matching the usual RLS
/// pattern that ties ownership columns to the caller), other uuids get a
/// fresh literal, text gets `'test'`, numbers get `1`, booleans `true`,
/// and anything unrecognized falls back to `DEFAULT`.
pub fn synthesize(column: &ColumnInfo) -> ColumnValue {
    if is_uuid(column) {
        if column.name == "id" || column.name == "user_id" {
            return ColumnValue::Expression("auth.uid()".to_string());
        }
        return ColumnValue::Bound(Uuid::new_v4().to_string());
    }

    if is_text(column) {
        return ColumnValue::Bound("test".to_string());
    }

    if is_numeric(column) {
        return ColumnValue::Expression("1".to_string());
    }

    if is_boolean(column) {
        return ColumnValue::Expression("true".to_string());
    }

    ColumnValue::Default
}

fn is_uuid(column: &ColumnInfo) -> bool {
    column.udt_name == "uuid" || column.data_type == "uuid"
}

fn is_text(column: &ColumnInfo) -> bool {
    matches!(column.udt_name.as_str(), "text" | "varchar" | "bpchar")
        || matches!(
            column.data_type.as_str(),
            "text" | "character varying" | "character"
        )
}

fn is_numeric(column: &ColumnInfo) -> bool {
    matches!(
        column.udt_name.as_str(),
        "int2" | "int4" | "int8" | "numeric" | "float4" | "float8"
    ) || matches!(
        column.data_type.as_str(),
        "smallint" | "integer" | "bigint" | "numeric" | "real" | "double precision"
    )
}

fn is_boolean(column: &ColumnInfo) -> bool {
    column.udt_name == "bool" || column.data_type == "boolean"
}

/// A fully-built INSERT statement: SQL text plus the bound string values,
/// in placeholder order.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    /// The statement text.
    pub sql: String,
    /// Values for `$1..$n`.
    pub params: Vec<String>,
}

/// Build the minimal INSERT for a probe.
///
/// Columns with a server default are left out. `overrides` pins specific
/// columns to bound values (the storage variant pins `bucket_id`); an
/// overridden column is always included even when it has a default. When
/// nothing remains to supply, the statement degenerates to
/// `DEFAULT VALUES`.
pub fn build_insert(
    qualified_table: &str,
    columns: &[ColumnInfo],
    overrides: &[(&str, String)],
) -> InsertStatement {
    let mut names = Vec::new();
    let mut exprs = Vec::new();
    let mut params = Vec::new();

    for column in columns {
        let override_value = overrides
            .iter()
            .find(|(name, _)| *name == column.name)
            .map(|(_, value)| value.clone());

        let value = match override_value {
            Some(value) => ColumnValue::Bound(value),
            None if column.has_default => continue,
            None => synthesize(column),
        };

        match value {
            ColumnValue::Expression(expr) => {
                names.push(quote_ident(&column.name));
                exprs.push(expr);
            }
            ColumnValue::Bound(value) => {
                params.push(value);
                names.push(quote_ident(&column.name));
                exprs.push(format!("${}", params.len()));
            }
            ColumnValue::Default => {
                names.push(quote_ident(&column.name));
                exprs.push("DEFAULT".to_string());
            }
        }
    }

    let sql = if names.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", qualified_table)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified_table,
            names.join(", "),
            exprs.join(", ")
        )
    };

    InsertStatement { sql, params }
}

/// Double-quote an identifier. Identifiers are the only caller-controlled
/// text that ever reaches SQL; values travel as parameters.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident)
}
