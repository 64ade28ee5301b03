//! Turning column differences into ALTER TABLE statements.

use tracing::debug;

use crate::dialect::{AlterRendering, Dialect, SupportLevel};
use crate::error::{MigrateError, Result};
use crate::schema::ColumnDifference;

/// Renders every difference without checking support levels.
#[must_use]
pub fn plan_alter(
    dialect: &dyn Dialect,
    table: &str,
    diffs: &[ColumnDifference],
) -> Vec<(ColumnDifference, AlterRendering)> {
    diffs
        .iter()
        .map(|diff| (diff.clone(), dialect.render_alter(table, diff)))
        .collect()
}

/// Generates the statements that bring `table` in line with the model.
///
/// Dialects that can combine clauses get a single ALTER TABLE followed by
/// any standalone statements (indexes, comments). SQLite gets one ALTER
/// TABLE per column. If any difference cannot be applied in place nothing
/// is returned and the error names the offending column.
///
/// # Errors
///
/// Returns [`MigrateError::RequiresRecreate`] or
/// [`MigrateError::Unsupported`] for a difference the dialect cannot apply.
pub fn generate_alter_sql(
    dialect: &dyn Dialect,
    table: &str,
    diffs: &[ColumnDifference],
) -> Result<Vec<String>> {
    if diffs.is_empty() {
        return Ok(Vec::new());
    }

    let mut renderings = Vec::with_capacity(diffs.len());
    for diff in diffs {
        let rendering = dialect.render_alter(table, diff);
        match rendering.support {
            SupportLevel::Supported => renderings.push(rendering),
            SupportLevel::RequiresRecreate => {
                return Err(MigrateError::RequiresRecreate {
                    table: table.to_string(),
                    column: diff.column.clone(),
                    operation: diff.kind.to_string(),
                });
            }
            SupportLevel::Unsupported => {
                return Err(MigrateError::Unsupported {
                    table: table.to_string(),
                    column: diff.column.clone(),
                    message: rendering
                        .note
                        .unwrap_or_else(|| format!("cannot {} column", diff.kind)),
                });
            }
        }
    }

    let quoted = dialect.quote_identifier(table);
    let mut statements = Vec::new();

    if dialect.capabilities().combines_alter_clauses {
        let clauses: Vec<&str> = renderings
            .iter()
            .flat_map(|r| r.clauses.iter().map(String::as_str))
            .collect();
        if !clauses.is_empty() {
            statements.push(format!("ALTER TABLE {quoted} {}", clauses.join(", ")));
        }
        statements.extend(renderings.into_iter().flat_map(|r| r.statements));
    } else {
        for rendering in renderings {
            for clause in &rendering.clauses {
                statements.push(format!("ALTER TABLE {quoted} {clause}"));
            }
            statements.extend(rendering.statements);
        }
    }

    debug!(table, dialect = dialect.name(), count = statements.len(), "Generated ALTER statements");
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect, SqliteDialect};
    use crate::schema::{ColumnChange, DatabaseColumn, ModelColumn, SqlType};

    fn add(name: &str) -> ColumnDifference {
        ColumnDifference::add(ModelColumn::new(name, SqlType::Varchar(100)))
    }

    #[test]
    fn test_empty_diff_list() {
        let sql = generate_alter_sql(&SqliteDialect::new(), "users", &[]).unwrap();
        assert!(sql.is_empty());
    }

    #[test]
    fn test_sqlite_one_statement_per_column() {
        let diffs = vec![add("a"), ColumnDifference::add(ModelColumn::new("b", SqlType::Int).indexed())];
        let sql = generate_alter_sql(&SqliteDialect::new(), "users", &diffs).unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" ADD COLUMN \"a\" TEXT",
                "ALTER TABLE \"users\" ADD COLUMN \"b\" INTEGER",
                "CREATE INDEX \"idx_users_b\" ON \"users\" (\"b\")",
            ]
        );
    }

    #[test]
    fn test_mysql_combines_clauses() {
        let diffs = vec![
            add("a"),
            ColumnDifference::drop(DatabaseColumn::new("old", "text")),
        ];
        let sql = generate_alter_sql(&MySqlDialect::new(), "users", &diffs).unwrap();
        assert_eq!(
            sql,
            vec!["ALTER TABLE `users` ADD COLUMN `a` VARCHAR(100), DROP COLUMN `old`"]
        );
    }

    #[test]
    fn test_postgres_comment_follows_alter() {
        let diffs = vec![ColumnDifference::add(
            ModelColumn::new("bio", SqlType::Text).comment("about me"),
        )];
        let sql = generate_alter_sql(&PostgresDialect::new(), "users", &diffs).unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" ADD COLUMN \"bio\" TEXT",
                "COMMENT ON COLUMN \"users\".\"bio\" IS 'about me'",
            ]
        );
    }

    #[test]
    fn test_sqlite_modify_fails_whole_generation() {
        let modify = ColumnDifference::modify(
            DatabaseColumn::new("name", "TEXT"),
            ModelColumn::new("name", SqlType::Text).not_null(),
            vec![ColumnChange::NotNull],
            &["column became NOT NULL".to_string()],
        );
        let err = generate_alter_sql(&SqliteDialect::new(), "users", &[add("a"), modify])
            .unwrap_err();
        match err {
            MigrateError::RequiresRecreate {
                table,
                column,
                operation,
            } => {
                assert_eq!(table, "users");
                assert_eq!(column, "name");
                assert_eq!(operation, "modify");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_drop_primary_key_unsupported() {
        let mut pk = DatabaseColumn::new("id", "integer");
        pk.primary_key = true;
        let err = generate_alter_sql(
            &PostgresDialect::new(),
            "users",
            &[ColumnDifference::drop(pk)],
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::Unsupported { ref column, .. } if column == "id"));
    }

    #[test]
    fn test_plan_reports_support_levels() {
        let plan = plan_alter(
            &SqliteDialect::new(),
            "users",
            &[add("a"), ColumnDifference::drop(DatabaseColumn::new("b", "TEXT"))],
        );
        let levels: Vec<SupportLevel> = plan.iter().map(|(_, r)| r.support).collect();
        assert_eq!(
            levels,
            vec![SupportLevel::Supported, SupportLevel::RequiresRecreate]
        );
    }
}
