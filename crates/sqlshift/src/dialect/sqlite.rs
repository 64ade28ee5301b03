//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support: columns can be added, but
//! changing or dropping one requires the table recreation strategy (create
//! a new table, copy data, drop the old table, rename the new one). Those
//! differences are reported as [`SupportLevel::RequiresRecreate`].
//!
//! Types are rendered as storage-class names (`INTEGER`, `TEXT`, ...), so
//! lengths and precisions do not survive introspection.

use crate::connection::Driver;
use crate::schema::{ColumnDifference, DatabaseColumn, DiffKind, SqlType};

use super::{base_type_name, AlterRendering, Capabilities, Dialect};

/// SQLite migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Column affinity per the SQLite type-name rules.
fn affinity(type_name: &str) -> &'static str {
    let upper = type_name.to_ascii_uppercase();
    if upper.contains("INT") {
        "INTEGER"
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        "TEXT"
    } else if upper.is_empty() || upper.contains("BLOB") {
        "BLOB"
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        "REAL"
    } else {
        "NUMERIC"
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn driver(&self) -> Driver {
        Driver::Sqlite
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reports_length: false,
            reports_precision: false,
            reports_defaults: true,
            reports_comments: false,
            combines_alter_clauses: false,
        }
    }

    fn render_type(&self, ty: &SqlType) -> String {
        match ty {
            SqlType::Int
            | SqlType::BigInt
            | SqlType::SmallInt
            | SqlType::TinyInt
            | SqlType::Boolean => "INTEGER",
            SqlType::Float | SqlType::Double => "REAL",
            SqlType::Decimal(_, _) => "NUMERIC",
            SqlType::Varchar(_)
            | SqlType::Char(_)
            | SqlType::Text
            | SqlType::LongText
            | SqlType::DateTime
            | SqlType::Timestamp
            | SqlType::Date
            | SqlType::Time
            | SqlType::Json => "TEXT",
            SqlType::Blob => "BLOB",
        }
        .to_string()
    }

    fn render_alter(&self, table: &str, diff: &ColumnDifference) -> AlterRendering {
        match diff.kind {
            DiffKind::Add => {
                let Some(col) = &diff.new else {
                    return AlterRendering::unsupported("add without a model column");
                };
                AlterRendering::supported(
                    vec![format!("ADD COLUMN {}", self.column_definition(col))],
                    self.index_statements(table, col),
                )
            }
            DiffKind::Modify => {
                AlterRendering::requires_recreate("SQLite cannot modify a column in place")
            }
            DiffKind::Drop => {
                if diff.old.as_ref().is_some_and(|c| c.primary_key) {
                    AlterRendering::unsupported("cannot drop a primary key column")
                } else {
                    AlterRendering::requires_recreate("SQLite cannot drop a column in place")
                }
            }
        }
    }

    fn autoincrement_keyword(&self) -> &'static str {
        " AUTOINCREMENT"
    }

    fn types_equivalent(&self, model: &SqlType, db: &DatabaseColumn) -> bool {
        let have = base_type_name(&db.raw_type);
        // A declared name matching the canonical one (`DATETIME`, `BOOLEAN`)
        // counts as well as a matching storage class.
        affinity(&have) == affinity(&self.render_type(model))
            || have == base_type_name(&model.to_string())
    }
}
