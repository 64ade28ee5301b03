//! DDL builders used by versioned migrations and by automatic table
//! creation.
//!
//! A [`Schema`] collects statements for one dialect. Migrations receive a
//! `&mut Schema` and describe what they want; the migrator executes the
//! collected statements afterwards.
//!
//! ```
//! use sqlshift::builder::Schema;
//! use sqlshift::connection::Driver;
//! use sqlshift::schema::{ModelColumn, SqlType};
//!
//! let mut schema = Schema::new(Driver::Sqlite);
//! schema.create_table("users", |t| {
//!     t.column(ModelColumn::new("id", SqlType::BigInt).primary_key().auto_increment());
//!     t.column(ModelColumn::new("email", SqlType::Varchar(255)).not_null().unique());
//! });
//! assert_eq!(schema.statements().len(), 1);
//! ```

use crate::connection::Driver;
use crate::dialect::{dialect_for, Dialect};
use crate::error::{MigrateError, Result};
use crate::schema::ModelColumn;

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    /// No action.
    NoAction,
    /// Restrict deletion/update.
    Restrict,
    /// Cascade deletion/update.
    Cascade,
    /// Set to NULL.
    SetNull,
    /// Set to default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of the action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// A table-level foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub references_table: String,
    /// Referenced column.
    pub references_column: String,
    /// Action on delete.
    pub on_delete: Option<ForeignKeyAction>,
    /// Action on update.
    pub on_update: Option<ForeignKeyAction>,
}

impl ForeignKey {
    /// `column` references `table(references)`.
    #[must_use]
    pub fn new(
        column: impl Into<String>,
        table: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            references_table: table.into(),
            references_column: references.into(),
            on_delete: None,
            on_update: None,
        }
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub const fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub const fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }

    fn to_sql(&self, dialect: &dyn Dialect) -> String {
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            dialect.quote_identifier(&self.column),
            dialect.quote_identifier(&self.references_table),
            dialect.quote_identifier(&self.references_column)
        );
        if let Some(action) = self.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        if let Some(action) = self.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.as_sql());
        }
        sql
    }
}

/// An index on one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
}

impl IndexDef {
    /// A plain index.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|&c| c.to_string()).collect(),
            unique: false,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Describes one CREATE TABLE.
#[derive(Debug, Clone, Default)]
pub struct TableBuilder {
    name: String,
    columns: Vec<ModelColumn>,
    primary_key: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
    indexes: Vec<IndexDef>,
    if_not_exists: bool,
}

impl TableBuilder {
    /// Starts a table description.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a column.
    pub fn column(&mut self, column: ModelColumn) -> &mut Self {
        self.columns.push(column);
        self
    }

    /// Adds several columns.
    pub fn columns(&mut self, columns: impl IntoIterator<Item = ModelColumn>) -> &mut Self {
        self.columns.extend(columns);
        self
    }

    /// Declares a (composite) primary key.
    pub fn primary_key(&mut self, columns: &[&str]) -> &mut Self {
        self.primary_key = columns.iter().map(|&c| c.to_string()).collect();
        self
    }

    /// Adds a foreign key.
    pub fn foreign_key(&mut self, fk: ForeignKey) -> &mut Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Adds an index.
    pub fn index(&mut self, index: IndexDef) -> &mut Self {
        self.indexes.push(index);
        self
    }

    /// Uses IF NOT EXISTS.
    pub fn if_not_exists(&mut self) -> &mut Self {
        self.if_not_exists = true;
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary key columns rendered as a table constraint. Empty when the
    /// key is a single column declared inline.
    fn table_primary_key(&self) -> Vec<String> {
        if !self.primary_key.is_empty() {
            return self.primary_key.clone();
        }
        let flagged: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        if flagged.len() > 1 {
            flagged
        } else {
            Vec::new()
        }
    }

    /// Renders CREATE TABLE followed by its CREATE INDEX statements.
    #[must_use]
    pub fn to_sql(&self, dialect: &dyn Dialect) -> Vec<String> {
        let composite = self.table_primary_key();

        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                if composite.is_empty() {
                    dialect.column_definition(col)
                } else {
                    let mut col = col.clone();
                    if composite.contains(&col.name) {
                        col.not_null = true;
                    }
                    col.primary_key = false;
                    col.auto_increment = false;
                    dialect.column_definition(&col)
                }
            })
            .map(|def| format!("    {def}"))
            .collect();

        if !composite.is_empty() {
            let cols: Vec<String> = composite.iter().map(|c| dialect.quote_identifier(c)).collect();
            defs.push(format!("    PRIMARY KEY ({})", cols.join(", ")));
        }
        defs.extend(
            self.foreign_keys
                .iter()
                .map(|fk| format!("    {}", fk.to_sql(dialect))),
        );

        let mut sql = String::from("CREATE TABLE ");
        if self.if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&dialect.quote_identifier(&self.name));
        sql.push_str(" (\n");
        sql.push_str(&defs.join(",\n"));
        sql.push_str("\n)");

        let mut statements = vec![sql];
        for col in &self.columns {
            statements.extend(dialect.comment_statement(&self.name, col));
            statements.extend(dialect.index_statements(&self.name, col));
        }
        statements.extend(self.indexes.iter().map(|index| {
            dialect.create_index_sql(&index.name, &self.name, &index.columns, index.unique)
        }));
        statements
    }
}

/// Collects DDL statements for one dialect.
#[derive(Debug)]
pub struct Schema {
    dialect: Box<dyn Dialect>,
    statements: Vec<String>,
}

impl Schema {
    /// Creates an empty schema for a driver.
    #[must_use]
    pub fn new(driver: Driver) -> Self {
        Self::with_dialect(dialect_for(driver))
    }

    /// Creates an empty schema for a dialect.
    #[must_use]
    pub fn with_dialect(dialect: Box<dyn Dialect>) -> Self {
        Self {
            dialect,
            statements: Vec::new(),
        }
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Returns the collected statements.
    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Consumes the schema and returns its statements.
    #[must_use]
    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// CREATE TABLE described by the closure.
    pub fn create_table<F>(&mut self, name: &str, define: F) -> &mut Self
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut table = TableBuilder::new(name);
        define(&mut table);
        self.statements.extend(table.to_sql(self.dialect.as_ref()));
        self
    }

    /// CREATE TABLE IF NOT EXISTS described by the closure.
    pub fn create_table_if_not_exists<F>(&mut self, name: &str, define: F) -> &mut Self
    where
        F: FnOnce(&mut TableBuilder),
    {
        self.create_table(name, |t| {
            t.if_not_exists();
            define(t);
        })
    }

    /// DROP TABLE.
    pub fn drop_table(&mut self, name: &str) -> &mut Self {
        let sql = format!("DROP TABLE {}", self.dialect.quote_identifier(name));
        self.raw(sql)
    }

    /// DROP TABLE IF EXISTS.
    pub fn drop_table_if_exists(&mut self, name: &str) -> &mut Self {
        let sql = format!("DROP TABLE IF EXISTS {}", self.dialect.quote_identifier(name));
        self.raw(sql)
    }

    /// Renames a table.
    pub fn rename_table(&mut self, from: &str, to: &str) -> &mut Self {
        let sql = self.dialect.rename_table_sql(from, to);
        self.raw(sql)
    }

    /// CREATE INDEX on an existing table.
    pub fn create_index(&mut self, table: &str, index: &IndexDef) -> &mut Self {
        let sql = self
            .dialect
            .create_index_sql(&index.name, table, &index.columns, index.unique);
        self.raw(sql)
    }

    /// DROP INDEX.
    pub fn drop_index(&mut self, table: &str, name: &str) -> &mut Self {
        let sql = self.dialect.drop_index_sql(name, table);
        self.raw(sql)
    }

    /// ALTER TABLE ADD COLUMN, plus the index the column asks for.
    pub fn add_column(&mut self, table: &str, column: &ModelColumn) -> &mut Self {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.dialect.quote_identifier(table),
            self.dialect.column_definition(column)
        );
        self.raw(sql);
        let extra: Vec<String> = self
            .dialect
            .comment_statement(table, column)
            .into_iter()
            .chain(self.dialect.index_statements(table, column))
            .collect();
        self.statements.extend(extra);
        self
    }

    /// ALTER TABLE DROP COLUMN. SQLite needs a table rebuild instead.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::RequiresRecreate`] on SQLite.
    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<&mut Self> {
        if self.dialect.driver() == Driver::Sqlite {
            return Err(MigrateError::RequiresRecreate {
                table: table.to_string(),
                column: column.to_string(),
                operation: "drop".to_string(),
            });
        }
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.dialect.quote_identifier(table),
            self.dialect.quote_identifier(column)
        );
        Ok(self.raw(sql))
    }

    /// Adds a statement verbatim.
    pub fn raw(&mut self, sql: impl Into<String>) -> &mut Self {
        self.statements.push(sql.into());
        self
    }
}

/// CREATE TABLE plus index statements for a table made of `columns`.
#[must_use]
pub fn create_table_from_columns(
    dialect: &dyn Dialect,
    table: &str,
    columns: &[ModelColumn],
) -> Vec<String> {
    let mut builder = TableBuilder::new(table);
    builder.columns(columns.iter().cloned());
    builder.to_sql(dialect)
}
