//! Applying ALTER statements with a safety net.
//!
//! [`SafeMigrator::safe_alter_table`] generates the statements for a set of
//! column differences and then, unless running dry, copies the table's rows
//! into a timestamped backup table before executing anything. Statements run
//! one by one; the first failure stops the run and the returned
//! [`MigrationResult`] explains how to get the data back.
//!
//! DDL is not transactional on every database, so statements that ran
//! before a failure stay applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alter::generate_alter_sql;
use crate::connection::Connection;
use crate::dialect::{dialect_for, Dialect};
use crate::error::{MigrateError, Result};
use crate::introspect::{get_database_columns, table_exists};
use crate::schema::{ColumnDifference, DiffKind};

/// Options for [`SafeMigrator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeMigratorConfig {
    /// Only generate statements; touch nothing.
    pub dry_run: bool,
    /// Copy the table's rows before altering it.
    pub backup_tables: bool,
}

impl Default for SafeMigratorConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup_tables: true,
        }
    }
}

impl SafeMigratorConfig {
    /// Creates the default configuration: backups on, dry run off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Enables or disables backups.
    #[must_use]
    pub const fn backup_tables(mut self, enabled: bool) -> Self {
        self.backup_tables = enabled;
        self
    }
}

/// Outcome of one table migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Table that was migrated.
    pub table: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Differences the statements were generated from.
    pub changes: Vec<ColumnDifference>,
    /// Generated statements, in execution order.
    pub statements: Vec<String>,
    /// Whether every statement ran (always true for dry runs).
    pub success: bool,
    /// Error text of the failing statement.
    pub error: Option<String>,
    /// The statement that failed.
    pub failed_statement: Option<String>,
    /// How to recover after a failure.
    pub recovery_instructions: Option<String>,
    /// Name of the backup table, if one was taken.
    pub backup_table: Option<String>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl MigrationResult {
    pub(crate) fn new(table: &str, changes: Vec<ColumnDifference>, statements: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            table: table.to_string(),
            started_at: now,
            finished_at: now,
            changes,
            statements,
            success: true,
            error: None,
            failed_statement: None,
            recovery_instructions: None,
            backup_table: None,
            dry_run: false,
        }
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Short summary such as `2 add, 1 modify, 0 drop`.
    #[must_use]
    pub fn change_summary(&self) -> String {
        let count = |kind: DiffKind| self.changes.iter().filter(|c| c.kind == kind).count();
        format!(
            "{} add, {} modify, {} drop",
            count(DiffKind::Add),
            count(DiffKind::Modify),
            count(DiffKind::Drop)
        )
    }

    /// Renders the result as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs ALTER statements for one table at a time with backup and
/// recovery reporting.
pub struct SafeMigrator<'a, C: Connection> {
    conn: &'a C,
    dialect: Box<dyn Dialect>,
    config: SafeMigratorConfig,
}

impl<'a, C: Connection> SafeMigrator<'a, C> {
    /// Creates a migrator using the dialect of the connection's driver.
    pub fn new(conn: &'a C, config: SafeMigratorConfig) -> Self {
        Self {
            conn,
            dialect: dialect_for(conn.driver()),
            config,
        }
    }

    /// Returns the dialect in use.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SafeMigratorConfig {
        &self.config
    }

    /// Applies the differences to `table`.
    ///
    /// Generation and backup problems are returned as `Err` before any DDL
    /// runs. A failing statement is reported through the result instead.
    ///
    /// # Errors
    ///
    /// Returns a generation error, or [`MigrateError::BackupFailed`] if the
    /// backup cannot be taken.
    pub async fn safe_alter_table(
        &self,
        table: &str,
        diffs: &[ColumnDifference],
    ) -> Result<MigrationResult> {
        let statements = generate_alter_sql(self.dialect.as_ref(), table, diffs)?;
        let mut result = MigrationResult::new(table, diffs.to_vec(), statements);

        if self.config.dry_run {
            warn!(table, statements = result.statements.len(), "Dry run, nothing executed");
            for sql in &result.statements {
                debug!(sql = %sql, "Would execute");
            }
            result.dry_run = true;
            result.finished_at = Utc::now();
            return Ok(result);
        }

        if result.statements.is_empty() {
            debug!(table, "No changes to apply");
            result.finished_at = Utc::now();
            return Ok(result);
        }

        if self.config.backup_tables {
            result.backup_table = Some(self.backup_table(table).await?);
        }

        let total = result.statements.len();
        for (i, sql) in result.statements.iter().enumerate() {
            debug!(sql = %sql, "Executing SQL");
            if let Err(err) = self.conn.exec(sql, &[]).await {
                warn!(
                    table,
                    statement = i + 1,
                    total,
                    error = %err,
                    "Migration failed, stopping"
                );
                let shared = match result.backup_table.as_deref() {
                    Some(backup) => self.shared_columns(table, backup).await.ok(),
                    None => None,
                };
                result.success = false;
                result.error = Some(err.to_string());
                result.failed_statement = Some(sql.clone());
                result.recovery_instructions = Some(recovery_instructions(
                    self.dialect.as_ref(),
                    table,
                    result.backup_table.as_deref(),
                    shared.as_deref(),
                    i,
                    total,
                ));
                result.finished_at = Utc::now();
                return Ok(result);
            }
        }

        result.finished_at = Utc::now();
        info!(
            table,
            changes = %result.change_summary(),
            statements = total,
            elapsed_ms = result.duration().num_milliseconds(),
            "Table migrated"
        );
        Ok(result)
    }

    /// Copies every row of `table` into a new `<table>_backup_<timestamp>`
    /// table and returns its name.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::BackupFailed`] if the copy fails.
    pub async fn backup_table(&self, table: &str) -> Result<String> {
        let backup = format!("{table}_backup_{}", Utc::now().format("%Y%m%d%H%M%S%3f"));
        let sql = self.dialect.create_backup_sql(table, &backup);
        debug!(sql = %sql, "Creating backup");
        self.conn
            .exec(&sql, &[])
            .await
            .map_err(|e| MigrateError::BackupFailed {
                table: table.to_string(),
                message: e.to_string(),
            })?;
        info!(table, backup = %backup, "Backup created");
        Ok(backup)
    }

    /// Replaces the rows of `table` with the rows of `backup`.
    ///
    /// Only the columns both tables share are copied back. The live table's
    /// definition is left as it is. The delete and the copy run in one
    /// transaction. Returns the number of restored rows.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::BackupFailed`] if the backup is missing, shares
    /// no columns with `table`, or the copy fails. The live rows are kept in
    /// that case.
    pub async fn restore_from_backup(&self, table: &str, backup: &str) -> Result<u64> {
        let backup_failed = |message: String| MigrateError::BackupFailed {
            table: table.to_string(),
            message,
        };

        if !table_exists(self.conn, backup).await? {
            return Err(backup_failed(format!("backup table '{backup}' does not exist")));
        }

        let shared = self.shared_columns(table, backup).await?;
        if shared.is_empty() {
            return Err(backup_failed(format!(
                "backup table '{backup}' shares no columns with '{table}'"
            )));
        }

        let statements = restore_statements(self.dialect.as_ref(), table, backup, &shared);
        for sql in &statements {
            debug!(sql = %sql, "Executing SQL");
        }
        let restored = self
            .conn
            .exec_in_transaction(&statements)
            .await
            .map_err(|e| backup_failed(e.to_string()))?;

        info!(table, backup, rows = restored, "Restored from backup");
        Ok(restored)
    }

    /// Quoted names of the live columns that also exist in `backup`, in the
    /// live table's order.
    async fn shared_columns(&self, table: &str, backup: &str) -> Result<Vec<String>> {
        let live = get_database_columns(self.conn, table).await?;
        let saved = get_database_columns(self.conn, backup).await?;
        Ok(live
            .iter()
            .filter(|c| saved.iter().any(|s| s.name == c.name))
            .map(|c| self.dialect.quote_identifier(&c.name))
            .collect())
    }

    /// Drops a backup table if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the drop fails.
    pub async fn drop_backup(&self, backup: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.dialect.quote_identifier(backup));
        debug!(sql = %sql, "Executing SQL");
        self.conn.exec(&sql, &[]).await?;
        info!(backup, "Backup dropped");
        Ok(())
    }
}

fn restore_statements(
    dialect: &dyn Dialect,
    table: &str,
    backup: &str,
    columns: &[String],
) -> Vec<String> {
    let t = dialect.quote_identifier(table);
    let columns = columns.join(", ");
    vec![
        format!("DELETE FROM {t}"),
        format!(
            "INSERT INTO {t} ({columns}) SELECT {columns} FROM {}",
            dialect.quote_identifier(backup)
        ),
    ]
}

fn recovery_instructions(
    dialect: &dyn Dialect,
    table: &str,
    backup: Option<&str>,
    shared: Option<&[String]>,
    failed_index: usize,
    total: usize,
) -> String {
    let mut text = format!(
        "Statement {} of {total} failed; the {failed_index} statement(s) before it were applied and are not rolled back.",
        failed_index + 1
    );
    let Some(backup) = backup else {
        text.push_str(&format!(
            "\nNo backup was taken; inspect '{table}' by hand before retrying."
        ));
        return text;
    };

    text.push_str(&format!(
        "\nThe rows of '{table}' were saved to '{backup}'. Call SafeMigrator::restore_from_backup(\"{table}\", \"{backup}\")"
    ));
    match shared.filter(|columns| !columns.is_empty()) {
        Some(columns) => {
            text.push_str(" or run in one transaction:");
            for sql in restore_statements(dialect, table, backup, columns) {
                text.push_str(&format!("\n  {sql};"));
            }
        }
        None => text.push('.'),
    }
    text.push_str(&format!("\nDrop '{backup}' once the data is verified."));
    text
}
