//! MySQL dialect.
//!
//! MySQL rewrites a column with `MODIFY COLUMN` and the full definition, so
//! type, nullability, default and comment changes collapse into one clause.
//! Unique constraints live in indexes named after the column and are handled
//! separately.

use crate::connection::Driver;
use crate::schema::{ColumnChange, ColumnDifference, DiffKind, ModelColumn, SqlType};

use super::{is_numeric_literal, quote_literal, AlterRendering, Capabilities, Dialect};

/// MySQL dialect for migration SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn definition(&self, col: &ModelColumn, with_keys: bool) -> String {
        let mut sql = format!("{} {}", self.quote_identifier(&col.name), self.column_type(col));

        if col.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(ref default) = col.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.render_default(&col.sql_type, default));
        }
        if col.auto_increment {
            sql.push_str(self.autoincrement_keyword());
        }
        if with_keys {
            if col.unique && !col.primary_key {
                sql.push_str(" UNIQUE");
            }
            if col.primary_key {
                sql.push_str(" PRIMARY KEY");
            }
        }
        if let Some(ref comment) = col.comment {
            sql.push_str(" COMMENT ");
            sql.push_str(&quote_literal(comment));
        }

        sql
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn driver(&self) -> Driver {
        Driver::MySql
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
            SqlType::Int => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::TinyInt => "TINYINT".to_string(),
            SqlType::Float => "FLOAT".to_string(),
            SqlType::Double => "DOUBLE".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({p},{s})"),
            SqlType::Varchar(len) => format!("VARCHAR({len})"),
            SqlType::Char(len) => format!("CHAR({len})"),
            SqlType::Text => "TEXT".to_string(),
            SqlType::LongText => "LONGTEXT".to_string(),
            SqlType::DateTime => "DATETIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Boolean => "TINYINT(1)".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Json => "JSON".to_string(),
        }
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
                let Some(col) = &diff.new else {
                    return AlterRendering::unsupported("modify without a model column");
                };
                let column = self.quote_identifier(&col.name);
                let mut clauses = Vec::new();
                if diff.changes.iter().any(|c| *c != ColumnChange::Unique) {
                    clauses.push(format!("MODIFY COLUMN {}", self.definition(col, false)));
                }
                if diff.has_change(ColumnChange::Unique) {
                    if col.unique {
                        clauses.push(format!("ADD UNIQUE INDEX {column} ({column})"));
                    } else {
                        clauses.push(format!("DROP INDEX {column}"));
                    }
                }
                AlterRendering::supported(clauses, Vec::new())
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
        " AUTO_INCREMENT"
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn column_definition(&self, col: &ModelColumn) -> String {
        self.definition(col, true)
    }

    fn drop_index_sql(&self, name: &str, table: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(name),
            self.quote_identifier(table)
        )
    }

    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        )
    }

    fn normalize_type_name(&self, base: &str) -> String {
        let base = base
            .split_whitespace()
            .filter(|w| *w != "UNSIGNED" && *w != "ZEROFILL")
            .collect::<Vec<_>>()
            .join(" ");
        match base.as_str() {
            "INTEGER" => "INT".to_string(),
            "BOOL" | "BOOLEAN" => "TINYINT".to_string(),
            "NUMERIC" => "DECIMAL".to_string(),
            _ => base,
        }
    }

    fn normalize_db_default(&self, raw: &str) -> String {
        let value = raw.trim();
        match value.to_ascii_lowercase().as_str() {
            "current_timestamp" | "current_timestamp()" | "now()" => {
                return "CURRENT_TIMESTAMP".to_string();
            }
            "null" => return "NULL".to_string(),
            _ => {}
        }
        if is_numeric_literal(value)
            || (value.len() >= 2 && value.starts_with('\'') && value.ends_with('\''))
        {
            value.to_string()
        } else {
            // MySQL 8 reports string defaults without quotes.
            quote_literal(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DatabaseColumn;

    #[test]
    fn test_mysql_type_names() {
        let d = MySqlDialect::new();
        assert_eq!(d.render_type(&SqlType::Boolean), "TINYINT(1)");
        assert_eq!(d.render_type(&SqlType::Decimal(10, 2)), "DECIMAL(10,2)");
        assert_eq!(d.render_type(&SqlType::LongText), "LONGTEXT");
    }

    #[test]
    fn test_column_definition_order() {
        let d = MySqlDialect::new();
        let id = ModelColumn::new("id", SqlType::BigInt)
            .primary_key()
            .auto_increment();
        assert_eq!(
            d.column_definition(&id),
            "`id` BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY"
        );

        let email = ModelColumn::new("email", SqlType::Varchar(100))
            .not_null()
            .unique()
            .default_literal("''")
            .comment("login");
        assert_eq!(
            d.column_definition(&email),
            "`email` VARCHAR(100) NOT NULL DEFAULT '' UNIQUE COMMENT 'login'"
        );
    }

    #[test]
    fn test_modify_column() {
        let d = MySqlDialect::new();
        let mut old = DatabaseColumn::new("name", "varchar(50)");
        old.length = Some(50);
        let diff = ColumnDifference::modify(
            old,
            ModelColumn::new("name", SqlType::Varchar(100)).unique(),
            vec![ColumnChange::Length, ColumnChange::Unique],
            &[],
        );
        let rendering = d.render_alter("users", &diff);
        assert_eq!(
            rendering.clauses,
            vec![
                "MODIFY COLUMN `name` VARCHAR(100)",
                "ADD UNIQUE INDEX `name` (`name`)",
            ]
        );
    }

    #[test]
    fn test_unique_only_change_skips_modify() {
        let d = MySqlDialect::new();
        let diff = ColumnDifference::modify(
            DatabaseColumn::new("code", "varchar(10)"),
            ModelColumn::new("code", SqlType::Varchar(10)),
            vec![ColumnChange::Unique],
            &[],
        );
        assert_eq!(d.render_alter("t", &diff).clauses, vec!["DROP INDEX `code`"]);
    }

    #[test]
    fn test_type_equivalence() {
        let d = MySqlDialect::new();
        assert!(d.types_equivalent(&SqlType::Boolean, &DatabaseColumn::new("a", "tinyint(1)")));
        assert!(d.types_equivalent(&SqlType::Int, &DatabaseColumn::new("a", "int(11) unsigned")));
        assert!(d.types_equivalent(&SqlType::Varchar(10), &DatabaseColumn::new("a", "varchar(20)")));
        assert!(!d.types_equivalent(&SqlType::Text, &DatabaseColumn::new("a", "longtext")));
    }

    #[test]
    fn test_normalize_db_default() {
        let d = MySqlDialect::new();
        assert_eq!(d.normalize_db_default("abc"), "'abc'");
        assert_eq!(d.normalize_db_default("'abc'"), "'abc'");
        assert_eq!(d.normalize_db_default("0"), "0");
        assert_eq!(d.normalize_db_default("current_timestamp()"), "CURRENT_TIMESTAMP");
    }

    #[test]
    fn test_drop_index_names_table() {
        let d = MySqlDialect::new();
        assert_eq!(d.drop_index_sql("idx_a", "t"), "DROP INDEX `idx_a` ON `t`");
        assert_eq!(d.rename_table_sql("a", "b"), "RENAME TABLE `a` TO `b`");
    }
}
