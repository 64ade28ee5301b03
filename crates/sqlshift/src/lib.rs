//! Schema auto-diff and safe migrations for Rust.
//!
//! `sqlshift` keeps database tables in line with model structs:
//!
//! - **Model analysis** turns field tags (`size:100,not_null,unique`) into
//!   canonical column descriptions
//! - **Introspection** reads the live columns of a table
//! - **Comparison** diffs the two, aware of what each dialect can report
//! - **ALTER generation** renders dialect-correct DDL (SQLite, PostgreSQL,
//!   MySQL)
//! - **Safe migration** runs the DDL with dry-run, backup and recovery
//!   instructions
//!
//! Next to the automatic path sits a versioned [`migrator::Migrator`] with
//! up/down migrations recorded by batch in a ledger table.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlshift::prelude::*;
//!
//! #[derive(Model)]
//! #[model(table = "users")]
//! struct User {
//!     #[migrate(tag = "pk,auto_increment")]
//!     id: i64,
//!     #[migrate(tag = "size:100,not_null")]
//!     name: String,
//!     #[migrate(tag = "unique,index")]
//!     email: Option<String>,
//! }
//!
//! let conn = SqliteConnection::connect("sqlite:app.db?mode=rwc").await?;
//! let result = auto_migrate::<User, _>(&conn, &SafeMigratorConfig::default()).await?;
//! assert!(result.success);
//! ```

// Lets the derive macro's `::sqlshift` paths resolve inside this crate.
extern crate self as sqlshift;

pub mod alter;
pub mod auto;
pub mod builder;
pub mod compare;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod history;
pub mod introspect;
pub mod migrator;
pub mod model;
pub mod safe;
pub mod schema;

#[cfg(feature = "derive")]
pub use sqlshift_derive::Model;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::alter::{generate_alter_sql, plan_alter};
    pub use crate::auto::{auto_migrate, migrate_columns, AutoMigrator};
    pub use crate::builder::{
        create_table_from_columns, ForeignKey, ForeignKeyAction, IndexDef, Schema, TableBuilder,
    };
    pub use crate::compare::compare_columns;
    pub use crate::connection::{Connection, Driver, Row, SqliteConnection, Value};
    pub use crate::dialect::{
        dialect_for, AlterRendering, Dialect, MySqlDialect, PostgresDialect, SqliteDialect,
        SupportLevel,
    };
    pub use crate::error::{MigrateError, Result};
    pub use crate::history::{MigrationHistory, MigrationRecord};
    pub use crate::introspect::{get_database_columns, table_exists};
    pub use crate::migrator::{Migration, MigrationStatus, Migrator, MigratorConfig, SqlMigration};
    pub use crate::model::{analyze_fields, analyze_model, FieldDescriptor, Model};
    pub use crate::safe::{MigrationResult, SafeMigrator, SafeMigratorConfig};
    pub use crate::schema::{
        ColumnChange, ColumnDifference, DatabaseColumn, DiffKind, IndexName, ModelColumn, SqlType,
    };
    #[cfg(feature = "derive")]
    pub use sqlshift_derive::Model;
}
