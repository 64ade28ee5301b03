//! PostgreSQL dialect.

use crate::connection::Driver;
use crate::schema::{ColumnChange, ColumnDifference, DiffKind, ModelColumn, SqlType};

use super::{is_numeric_literal, quote_literal, AlterRendering, Capabilities, Dialect};

/// PostgreSQL dialect for migration SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn unique_constraint_name(table: &str, column: &str) -> String {
        format!("{table}_{column}_key")
    }

    fn modify_clauses(&self, table: &str, diff: &ColumnDifference, col: &ModelColumn) -> Vec<String> {
        let column = self.quote_identifier(&col.name);
        let mut clauses = Vec::new();

        if diff.has_change(ColumnChange::Type)
            || diff.has_change(ColumnChange::Length)
            || diff.has_change(ColumnChange::Precision)
        {
            let ty = self.render_type(&col.sql_type);
            clauses.push(format!("ALTER COLUMN {column} TYPE {ty} USING {column}::{ty}"));
        }

        if diff.has_change(ColumnChange::NotNull) {
            if col.not_null {
                clauses.push(format!("ALTER COLUMN {column} SET NOT NULL"));
            } else {
                clauses.push(format!("ALTER COLUMN {column} DROP NOT NULL"));
            }
        }

        if diff.has_change(ColumnChange::Default) {
            match col.default.as_deref() {
                Some(default) if !default.eq_ignore_ascii_case("NULL") => clauses.push(format!(
                    "ALTER COLUMN {column} SET DEFAULT {}",
                    self.render_default(&col.sql_type, default)
                )),
                _ => clauses.push(format!("ALTER COLUMN {column} DROP DEFAULT")),
            }
        }

        if diff.has_change(ColumnChange::Unique) {
            let constraint =
                self.quote_identifier(&Self::unique_constraint_name(table, &col.name));
            if col.unique {
                clauses.push(format!("ADD CONSTRAINT {constraint} UNIQUE ({column})"));
            } else {
                clauses.push(format!("DROP CONSTRAINT IF EXISTS {constraint}"));
            }
        }

        clauses
    }
}

/// Strips a trailing `::type` cast that sits outside quotes and parentheses.
fn strip_cast(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    let mut depth = 0_u32;
    let mut quoted = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => quoted = !quoted,
            b'(' if !quoted => depth += 1,
            b')' if !quoted => depth = depth.saturating_sub(1),
            b':' if !quoted && depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                return raw[..i].trim_end();
            }
            _ => {}
        }
        i += 1;
    }
    raw
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn driver(&self) -> Driver {
        Driver::Postgres
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reports_length: true,
            reports_precision: true,
            reports_defaults: true,
            reports_comments: true,
            combines_alter_clauses: true,
        }
    }

    fn render_type(&self, ty: &SqlType) -> String {
        match ty {
            SqlType::Int => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::SmallInt | SqlType::TinyInt => "SMALLINT".to_string(),
            SqlType::Float => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
            SqlType::Varchar(len) => format!("VARCHAR({len})"),
            SqlType::Char(len) => format!("CHAR({len})"),
            SqlType::Text | SqlType::LongText => "TEXT".to_string(),
            SqlType::DateTime | SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Blob => "BYTEA".to_string(),
            SqlType::Json => "JSONB".to_string(),
        }
    }

    fn render_alter(&self, table: &str, diff: &ColumnDifference) -> AlterRendering {
        match diff.kind {
            DiffKind::Add => {
                let Some(col) = &diff.new else {
                    return AlterRendering::unsupported("add without a model column");
                };
                let mut statements: Vec<String> =
                    self.comment_statement(table, col).into_iter().collect();
                statements.extend(self.index_statements(table, col));
                AlterRendering::supported(
                    vec![format!("ADD COLUMN {}", self.column_definition(col))],
                    statements,
                )
            }
            DiffKind::Modify => {
                let Some(col) = &diff.new else {
                    return AlterRendering::unsupported("modify without a model column");
                };
                let statements = if diff.has_change(ColumnChange::Comment) {
                    self.comment_statement(table, col).into_iter().collect()
                } else {
                    Vec::new()
                };
                AlterRendering::supported(self.modify_clauses(table, diff, col), statements)
            }
            DiffKind::Drop => {
                if diff.old.as_ref().is_some_and(|c| c.primary_key) {
                    return AlterRendering::unsupported("cannot drop a primary key column");
                }
                AlterRendering::supported(
                    vec![format!("DROP COLUMN {}", self.quote_identifier(&diff.column))],
                    Vec::new(),
                )
            }
        }
    }

    fn autoincrement_keyword(&self) -> &'static str {
        // SERIAL types carry the sequence.
        ""
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }

    fn column_type(&self, col: &ModelColumn) -> String {
        if col.auto_increment && col.primary_key {
            match col.sql_type {
                SqlType::Int | SqlType::SmallInt | SqlType::TinyInt => {
                    return "SERIAL".to_string()
                }
                SqlType::BigInt => return "BIGSERIAL".to_string(),
                _ => {}
            }
        }
        self.render_type(&col.sql_type)
    }

    fn render_default(&self, ty: &SqlType, literal: &str) -> String {
        match (ty, literal) {
            (SqlType::Boolean, "1") => "TRUE".to_string(),
            (SqlType::Boolean, "0") => "FALSE".to_string(),
            _ => literal.to_string(),
        }
    }

    fn comment_statement(&self, table: &str, col: &ModelColumn) -> Option<String> {
        let comment = col.comment.as_deref()?;
        Some(format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            self.quote_identifier(table),
            self.quote_identifier(&col.name),
            if comment.is_empty() {
                "NULL".to_string()
            } else {
                quote_literal(comment)
            }
        ))
    }

    fn normalize_type_name(&self, base: &str) -> String {
        match base {
            "CHARACTER VARYING" | "VARCHAR" => "VARCHAR",
            "CHARACTER" | "CHAR" | "BPCHAR" => "CHAR",
            "INTEGER" | "INT" | "INT4" | "SERIAL" => "INTEGER",
            "BIGINT" | "INT8" | "BIGSERIAL" => "BIGINT",
            "SMALLINT" | "INT2" | "SMALLSERIAL" => "SMALLINT",
            "REAL" | "FLOAT4" => "REAL",
            "DOUBLE PRECISION" | "FLOAT8" => "DOUBLE PRECISION",
            "NUMERIC" | "DECIMAL" => "NUMERIC",
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => "TIMESTAMP",
            "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => "TIMESTAMPTZ",
            "TIME" | "TIME WITHOUT TIME ZONE" => "TIME",
            "BOOL" | "BOOLEAN" => "BOOLEAN",
            other => other,
        }
        .to_string()
    }

    fn normalize_db_default(&self, raw: &str) -> String {
        let mut value = strip_cast(raw.trim());
        while value.len() >= 2 && value.starts_with('(') && value.ends_with(')') {
            value = value[1..value.len() - 1].trim();
        }
        // Negative numbers come back quoted: '-1'::integer.
        if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            if is_numeric_literal(inner) {
                value = inner;
            }
        }
        match value.to_ascii_lowercase().as_str() {
            "now()" | "current_timestamp" | "current_timestamp()" => {
                "CURRENT_TIMESTAMP".to_string()
            }
            "true" => "TRUE".to_string(),
            "false" => "FALSE".to_string(),
            "null" => "NULL".to_string(),
            _ => value.to_string(),
        }
    }
}
