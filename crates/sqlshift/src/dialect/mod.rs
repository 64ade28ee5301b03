//! Database dialect implementations.
//!
//! Each dialect knows how to render column types and DDL for one database
//! system, and declares what its introspection can and cannot report. The
//! comparator and the generators branch on those capabilities instead of on
//! driver names.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::connection::Driver;
use crate::schema::{ColumnDifference, DatabaseColumn, ModelColumn, SqlType};

/// How well a dialect can apply a column difference in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    /// Plain ALTER TABLE statements do the job.
    Supported,
    /// The table has to be rebuilt (create, copy, drop, rename).
    RequiresRecreate,
    /// The change cannot be expressed at all.
    Unsupported,
}

/// What introspection reports and how ALTER TABLE may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// Character lengths survive a create/introspect round trip.
    pub reports_length: bool,
    /// Decimal precision and scale survive a round trip.
    pub reports_precision: bool,
    /// Column defaults are reported.
    pub reports_defaults: bool,
    /// Column comments are stored and reported.
    pub reports_comments: bool,
    /// Several clauses can share one ALTER TABLE statement.
    pub combines_alter_clauses: bool,
}

/// The rendering of one column difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterRendering {
    /// Clauses that follow `ALTER TABLE <t> `.
    pub clauses: Vec<String>,
    /// Standalone statements to run after the ALTER TABLE (indexes, comments).
    pub statements: Vec<String>,
    /// Whether the difference can be applied at all.
    pub support: SupportLevel,
    /// Why the difference is not supported, if it is not.
    pub note: Option<String>,
}

impl AlterRendering {
    /// A supported rendering.
    #[must_use]
    pub const fn supported(clauses: Vec<String>, statements: Vec<String>) -> Self {
        Self {
            clauses,
            statements,
            support: SupportLevel::Supported,
            note: None,
        }
    }

    /// The table must be rebuilt to apply the difference.
    #[must_use]
    pub fn requires_recreate(note: impl Into<String>) -> Self {
        Self {
            clauses: Vec::new(),
            statements: Vec::new(),
            support: SupportLevel::RequiresRecreate,
            note: Some(note.into()),
        }
    }

    /// The difference cannot be applied.
    #[must_use]
    pub fn unsupported(note: impl Into<String>) -> Self {
        Self {
            clauses: Vec::new(),
            statements: Vec::new(),
            support: SupportLevel::Unsupported,
            note: Some(note.into()),
        }
    }
}

/// Dialect-specific SQL rendering and introspection semantics.
pub trait Dialect: Debug + Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the driver this dialect targets.
    fn driver(&self) -> Driver;

    /// Returns the dialect's capabilities.
    fn capabilities(&self) -> Capabilities;

    /// Renders a canonical type.
    fn render_type(&self, ty: &SqlType) -> String;

    /// Renders a difference as ALTER TABLE clauses.
    fn render_alter(&self, table: &str, diff: &ColumnDifference) -> AlterRendering;

    /// Returns the AUTOINCREMENT keyword for this dialect.
    fn autoincrement_keyword(&self) -> &'static str;

    /// Returns the identifier quote character.
    fn quote_char(&self) -> char {
        '"'
    }

    /// Quotes an identifier, doubling embedded quote characters.
    fn quote_identifier(&self, name: &str) -> String {
        let q = self.quote_char();
        let escaped = name.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Returns the bind placeholder for the 1-based argument `n`.
    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    /// Type used in a column definition. Defaults to [`Self::render_type`].
    fn column_type(&self, col: &ModelColumn) -> String {
        self.render_type(&col.sql_type)
    }

    /// Renders a normalized default literal for a column of the given type.
    fn render_default(&self, _ty: &SqlType, literal: &str) -> String {
        literal.to_string()
    }

    /// Generates SQL for a column definition, shared by CREATE TABLE and
    /// ADD COLUMN.
    fn column_definition(&self, col: &ModelColumn) -> String {
        let mut sql = format!("{} {}", self.quote_identifier(&col.name), self.column_type(col));

        if col.primary_key {
            sql.push_str(" PRIMARY KEY");
            if col.auto_increment {
                sql.push_str(self.autoincrement_keyword());
            }
        } else {
            if col.not_null {
                sql.push_str(" NOT NULL");
            }
            if col.unique {
                sql.push_str(" UNIQUE");
            }
        }

        if let Some(ref default) = col.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.render_default(&col.sql_type, default));
        }

        sql
    }

    /// Standalone statement attaching a column comment, for dialects that
    /// cannot write comments inline.
    fn comment_statement(&self, _table: &str, _col: &ModelColumn) -> Option<String> {
        None
    }

    /// Generates SQL for CREATE INDEX.
    fn create_index_sql(&self, name: &str, table: &str, columns: &[String], unique: bool) -> String {
        let cols: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote_identifier(name),
            self.quote_identifier(table),
            cols.join(", ")
        )
    }

    /// CREATE INDEX statements requested by a column's index tag.
    fn index_statements(&self, table: &str, col: &ModelColumn) -> Vec<String> {
        col.index
            .as_ref()
            .map(|index| {
                self.create_index_sql(
                    &index.resolve(table, &col.name),
                    table,
                    std::slice::from_ref(&col.name),
                    false,
                )
            })
            .into_iter()
            .collect()
    }

    /// Generates SQL for DROP INDEX.
    fn drop_index_sql(&self, name: &str, _table: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }

    /// Generates SQL renaming a table.
    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        )
    }

    /// Generates SQL copying a table's rows into a new backup table.
    fn create_backup_sql(&self, table: &str, backup: &str) -> String {
        format!(
            "CREATE TABLE {} AS SELECT * FROM {}",
            self.quote_identifier(backup),
            self.quote_identifier(table)
        )
    }

    /// Normalizes a base type name (no parameters, upper case) so that the
    /// model side and the introspected side compare equal.
    fn normalize_type_name(&self, base: &str) -> String {
        base.to_string()
    }

    /// Returns true if the introspected column has the model's base type.
    /// Parameters (length, precision) are compared separately.
    fn types_equivalent(&self, model: &SqlType, db: &DatabaseColumn) -> bool {
        let want = self.normalize_type_name(&base_type_name(&self.render_type(model)));
        let have = self.normalize_type_name(&base_type_name(&db.raw_type));
        want == have
    }

    /// Normalizes an introspected default expression into the literal form
    /// produced by [`Self::render_default`].
    fn normalize_db_default(&self, raw: &str) -> String {
        raw.trim().to_string()
    }
}

/// Returns the dialect for a driver.
#[must_use]
pub fn dialect_for(driver: Driver) -> Box<dyn Dialect> {
    match driver {
        Driver::Sqlite => Box::new(SqliteDialect::new()),
        Driver::Postgres => Box::new(PostgresDialect::new()),
        Driver::MySql => Box::new(MySqlDialect::new()),
    }
}

/// Upper-cased type name without parameters: `varchar(50)` -> `VARCHAR`,
/// `timestamp(6) without time zone` -> `TIMESTAMP WITHOUT TIME ZONE`.
#[must_use]
pub fn base_type_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0_u32;
    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c.to_ascii_uppercase()),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses the parameters of a declared type: `VARCHAR(50)` -> `[50]`,
/// `DECIMAL(10, 2)` -> `[10, 2]`.
#[must_use]
pub fn type_params(raw: &str) -> Vec<u32> {
    let (Some(open), Some(close)) = (raw.find('('), raw.find(')')) else {
        return Vec::new();
    };
    if close < open {
        return Vec::new();
    }
    raw[open + 1..close]
        .split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect()
}

/// Renders a string as a single-quoted SQL literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Returns true if the text is a plain numeric literal.
pub(crate) fn is_numeric_literal(value: &str) -> bool {
    !value.is_empty()
        && value.parse::<f64>().is_ok()
        && value.chars().all(|c| "+-.0123456789eE".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_type_name() {
        assert_eq!(base_type_name("varchar(50)"), "VARCHAR");
        assert_eq!(base_type_name("DECIMAL(10, 2)"), "DECIMAL");
        assert_eq!(base_type_name("character  varying"), "CHARACTER VARYING");
        assert_eq!(base_type_name("int(11) unsigned"), "INT UNSIGNED");
    }

    #[test]
    fn test_type_params() {
        assert_eq!(type_params("VARCHAR(50)"), vec![50]);
        assert_eq!(type_params("decimal(10, 2)"), vec![10, 2]);
        assert!(type_params("TEXT").is_empty());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("don't"), "'don''t'");
    }

    #[test]
    fn test_dialect_for_driver() {
        assert_eq!(dialect_for(Driver::Sqlite).name(), "sqlite");
        assert_eq!(dialect_for(Driver::Postgres).name(), "postgresql");
        assert_eq!(dialect_for(Driver::MySql).name(), "mysql");
    }

    #[test]
    fn test_quote_identifier_escapes() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.quote_identifier("a\"b"), "\"a\"\"b\"");
        let dialect = MySqlDialect::new();
        assert_eq!(dialect.quote_identifier("users"), "`users`");
    }
}
