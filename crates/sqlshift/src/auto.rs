//! Keeping tables in line with their models.
//!
//! [`auto_migrate`] creates the table of a model when it is missing and
//! otherwise diffs the live table against the model and applies the
//! differences through [`SafeMigrator`].

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::builder::create_table_from_columns;
use crate::compare::compare_columns;
use crate::connection::Connection;
use crate::dialect::dialect_for;
use crate::error::{MigrateError, Result};
use crate::introspect::{get_database_columns, table_exists};
use crate::model::{analyze_model, Model};
use crate::safe::{MigrationResult, SafeMigrator, SafeMigratorConfig};
use crate::schema::{ColumnDifference, ModelColumn};

/// Creates or alters the table of `M`.
///
/// # Errors
///
/// Returns an error if introspection fails, if the differences cannot be
/// applied in place, or if the backup cannot be taken.
pub async fn auto_migrate<M: Model, C: Connection>(
    conn: &C,
    config: &SafeMigratorConfig,
) -> Result<MigrationResult> {
    migrate_columns(conn, &M::table_name(), &analyze_model::<M>(), config).await
}

/// Creates or alters `table` so that it has `columns`.
///
/// # Errors
///
/// Same as [`auto_migrate`]. A failing statement is reported through the
/// result, not as an error.
pub async fn migrate_columns<C: Connection>(
    conn: &C,
    table: &str,
    columns: &[ModelColumn],
    config: &SafeMigratorConfig,
) -> Result<MigrationResult> {
    if columns.is_empty() {
        return Err(MigrateError::Unsupported {
            table: table.to_string(),
            column: String::new(),
            message: "model has no tagged fields".to_string(),
        });
    }

    if !table_exists(conn, table).await? {
        return create_table(conn, table, columns, config).await;
    }

    let existing = get_database_columns(conn, table).await?;
    let migrator = SafeMigrator::new(conn, config.clone());
    let diffs = compare_columns(migrator.dialect(), &existing, columns);
    debug!(table, differences = diffs.len(), "Compared model with table");
    migrator.safe_alter_table(table, &diffs).await
}

async fn create_table<C: Connection>(
    conn: &C,
    table: &str,
    columns: &[ModelColumn],
    config: &SafeMigratorConfig,
) -> Result<MigrationResult> {
    let dialect = dialect_for(conn.driver());
    let statements = create_table_from_columns(dialect.as_ref(), table, columns);
    let changes = columns.iter().cloned().map(ColumnDifference::add).collect();
    let mut result = MigrationResult::new(table, changes, statements);

    if config.dry_run {
        warn!(table, "Dry run, table not created");
        result.dry_run = true;
        result.finished_at = Utc::now();
        return Ok(result);
    }

    for sql in &result.statements {
        debug!(sql = %sql, "Executing SQL");
        if let Err(err) = conn.exec(sql, &[]).await {
            warn!(table, error = %err, "Table creation failed");
            result.success = false;
            result.error = Some(err.to_string());
            result.failed_statement = Some(sql.clone());
            result.recovery_instructions = Some(format!(
                "Creating '{table}' failed. If the table was created but an index was not, drop it with DROP TABLE {} and run the migration again.",
                dialect.quote_identifier(table)
            ));
            result.finished_at = Utc::now();
            return Ok(result);
        }
    }

    result.finished_at = Utc::now();
    info!(table, columns = columns.len(), "Table created");
    Ok(result)
}

/// Migrates several tables in registration order.
pub struct AutoMigrator<'a, C: Connection> {
    conn: &'a C,
    config: SafeMigratorConfig,
    tables: Vec<(String, Vec<ModelColumn>)>,
}

impl<'a, C: Connection> AutoMigrator<'a, C> {
    /// Creates an empty migrator.
    pub fn new(conn: &'a C, config: SafeMigratorConfig) -> Self {
        Self {
            conn,
            config,
            tables: Vec::new(),
        }
    }

    /// Registers a model.
    pub fn model<M: Model>(&mut self) -> &mut Self {
        self.tables.push((M::table_name(), analyze_model::<M>()));
        self
    }

    /// Registers a table by its columns.
    pub fn table(&mut self, name: impl Into<String>, columns: Vec<ModelColumn>) -> &mut Self {
        self.tables.push((name.into(), columns));
        self
    }

    /// Migrates every registered table. Stops after the first result that
    /// did not succeed; that result is the last one returned.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`migrate_columns`].
    pub async fn run(&self) -> Result<Vec<MigrationResult>> {
        let mut results = Vec::with_capacity(self.tables.len());
        for (table, columns) in &self.tables {
            let result = migrate_columns(self.conn, table, columns, &self.config).await?;
            let failed = !result.success;
            results.push(result);
            if failed {
                warn!(table = %table, "Stopping after failed table migration");
                break;
            }
        }
        Ok(results)
    }
}
