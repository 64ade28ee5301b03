//! Versioned migrations.
//!
//! Migrations are registered with a [`Migrator`], which runs the pending
//! ones in version order and records them in the ledger under a new batch
//! number. Rolling back undoes whole migrations in reverse (batch, id)
//! order.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::builder::Schema;
use crate::connection::Connection;
use crate::error::{MigrateError, Result};
use crate::history::MigrationHistory;

/// A versioned, reversible schema change.
pub trait Migration: Send + Sync {
    /// Version string. Versions are applied in lexicographic order, so
    /// timestamps (`20240101120000`) or zero-padded numbers work well.
    fn version(&self) -> &str;

    /// Human-readable description stored in the ledger.
    fn description(&self) -> &str {
        ""
    }

    /// Describes the forward change.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be expressed for the schema's
    /// dialect.
    fn up(&self, schema: &mut Schema) -> Result<()>;

    /// Describes how to undo [`Self::up`].
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be undone for the schema's
    /// dialect.
    fn down(&self, schema: &mut Schema) -> Result<()>;
}

type SchemaFn = Box<dyn Fn(&mut Schema) -> Result<()> + Send + Sync>;

/// A [`Migration`] built from closures.
pub struct SqlMigration {
    version: String,
    description: String,
    up: SchemaFn,
    down: SchemaFn,
}

impl SqlMigration {
    /// Creates a migration whose up and down do nothing until set.
    #[must_use]
    pub fn new(version: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            description: description.into(),
            up: Box::new(|_| Ok(())),
            down: Box::new(|_| Ok(())),
        }
    }

    /// Sets the forward change.
    #[must_use]
    pub fn up<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Schema) -> Result<()> + Send + Sync + 'static,
    {
        self.up = Box::new(f);
        self
    }

    /// Sets the rollback.
    #[must_use]
    pub fn down<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Schema) -> Result<()> + Send + Sync + 'static,
    {
        self.down = Box::new(f);
        self
    }
}

impl fmt::Debug for SqlMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlMigration")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Migration for SqlMigration {
    fn version(&self) -> &str {
        &self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn up(&self, schema: &mut Schema) -> Result<()> {
        (self.up)(schema)
    }

    fn down(&self, schema: &mut Schema) -> Result<()> {
        (self.down)(schema)
    }
}

/// Options for [`Migrator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Ledger table name.
    pub table_name: String,
    /// Create the ledger table when it is missing.
    pub auto_create: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            table_name: "migrations".to_string(),
            auto_create: true,
        }
    }
}

impl MigratorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ledger table name.
    #[must_use]
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Enables or disables automatic ledger creation.
    #[must_use]
    pub const fn auto_create(mut self, enabled: bool) -> Self {
        self.auto_create = enabled;
        self
    }
}

/// State of one registered migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// Migration version.
    pub version: String,
    /// Migration description.
    pub description: String,
    /// Whether the ledger lists it as applied.
    pub applied: bool,
    /// Batch it was applied in.
    pub batch: Option<i64>,
    /// When it was applied.
    pub applied_at: Option<DateTime<Utc>>,
}

/// Runs versioned migrations against one connection.
pub struct Migrator<'a, C: Connection> {
    conn: &'a C,
    history: MigrationHistory<'a, C>,
    config: MigratorConfig,
    migrations: Vec<Box<dyn Migration>>,
}

impl<'a, C: Connection> Migrator<'a, C> {
    /// Creates a migrator with no registered migrations.
    pub fn new(conn: &'a C, config: MigratorConfig) -> Self {
        Self {
            conn,
            history: MigrationHistory::new(conn, config.table_name.clone()),
            config,
            migrations: Vec::new(),
        }
    }

    /// Registers a migration. Versions must be unique.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::DuplicateVersion`] if the version is already
    /// registered.
    pub fn register(&mut self, migration: impl Migration + 'static) -> Result<&mut Self> {
        if self
            .migrations
            .iter()
            .any(|m| m.version() == migration.version())
        {
            return Err(MigrateError::DuplicateVersion(migration.version().to_string()));
        }
        self.migrations.push(Box::new(migration));
        Ok(self)
    }

    /// Returns the ledger accessor.
    #[must_use]
    pub const fn history(&self) -> &MigrationHistory<'a, C> {
        &self.history
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MigratorConfig {
        &self.config
    }

    async fn ensure_ledger(&self) -> Result<()> {
        if self.history.exists().await? {
            return Ok(());
        }
        if !self.config.auto_create {
            return Err(MigrateError::LedgerMissing(self.config.table_name.clone()));
        }
        info!(table = %self.config.table_name, "Creating migration ledger");
        self.history.ensure_table().await
    }

    fn sorted(&self) -> Vec<&dyn Migration> {
        let mut migrations: Vec<&dyn Migration> =
            self.migrations.iter().map(|m| &**m).collect();
        migrations.sort_by(|a, b| a.version().cmp(b.version()));
        migrations
    }

    fn find(&self, version: &str) -> Option<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.version() == version)
            .map(|m| &**m)
    }

    async fn run(&self, migration: &dyn Migration, forward: bool) -> Result<()> {
        let version = migration.version();
        let failed = |message: String| MigrateError::MigrationFailed {
            version: version.to_string(),
            message,
        };

        let mut schema = Schema::new(self.conn.driver());
        let described = if forward {
            migration.up(&mut schema)
        } else {
            migration.down(&mut schema)
        };
        described.map_err(|e| failed(e.to_string()))?;

        for sql in schema.statements() {
            debug!(sql = %sql, "Executing SQL");
            self.conn
                .exec(sql, &[])
                .await
                .map_err(|e| failed(e.to_string()))?;
        }
        Ok(())
    }

    /// Applies every pending migration in version order as one new batch.
    ///
    /// Stops at the first failure; migrations applied before it stay
    /// recorded. Returns the applied versions.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationFailed`] for the first migration that
    /// fails, or a ledger error.
    pub async fn up(&self) -> Result<Vec<String>> {
        self.ensure_ledger().await?;
        let applied = self.history.get_applied_set().await?;
        let pending: Vec<&dyn Migration> = self
            .sorted()
            .into_iter()
            .filter(|m| !applied.contains(m.version()))
            .collect();

        if pending.is_empty() {
            debug!("No pending migrations");
            return Ok(Vec::new());
        }

        let batch = self.history.last_batch().await? + 1;
        let mut done = Vec::with_capacity(pending.len());
        for migration in pending {
            info!(version = migration.version(), batch, "Applying migration");
            if let Err(err) = self.run(migration, true).await {
                warn!(version = migration.version(), error = %err, applied = done.len(), "Migration failed, stopping");
                return Err(err);
            }
            self.history
                .record_applied(migration.version(), migration.description(), batch)
                .await?;
            done.push(migration.version().to_string());
        }

        info!(count = done.len(), batch, "Migrations applied");
        Ok(done)
    }

    /// Rolls back the `steps` most recently applied migrations.
    ///
    /// Stops at the first failure. Returns the rolled back versions.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationFailed`] for the first rollback that
    /// fails, or a ledger error.
    pub async fn down(&self, steps: usize) -> Result<Vec<String>> {
        if steps == 0 {
            return Ok(Vec::new());
        }
        self.ensure_ledger().await?;

        let mut done = Vec::new();
        for record in self.history.get_latest(steps).await? {
            let migration = self
                .find(&record.version)
                .ok_or_else(|| MigrateError::MigrationNotFound(record.version.clone()))?;
            info!(version = %record.version, batch = record.batch, "Rolling back migration");
            if let Err(err) = self.run(migration, false).await {
                warn!(version = %record.version, error = %err, "Rollback failed, stopping");
                return Err(err);
            }
            self.history.record_unapplied(&record.version).await?;
            done.push(record.version);
        }

        info!(count = done.len(), "Migrations rolled back");
        Ok(done)
    }

    /// Rolls back every applied migration.
    ///
    /// # Errors
    ///
    /// Same as [`Self::down`].
    pub async fn reset(&self) -> Result<Vec<String>> {
        self.ensure_ledger().await?;
        let total = self.history.count().await?;
        self.down(total).await
    }

    /// Rolls back everything, then applies everything.
    ///
    /// # Errors
    ///
    /// Same as [`Self::down`] and [`Self::up`].
    pub async fn fresh(&self) -> Result<Vec<String>> {
        self.reset().await?;
        self.up().await
    }

    /// Lists every registered migration with its ledger state, by version.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let records = if self.history.exists().await? {
            self.history.get_applied().await?
        } else {
            Vec::new()
        };
        let by_version: HashMap<&str, _> =
            records.iter().map(|r| (r.version.as_str(), r)).collect();

        Ok(self
            .sorted()
            .into_iter()
            .map(|m| {
                let record = by_version.get(m.version());
                MigrationStatus {
                    version: m.version().to_string(),
                    description: m.description().to_string(),
                    applied: record.is_some(),
                    batch: record.map(|r| r.batch),
                    applied_at: record.map(|r| r.applied_at),
                }
            })
            .collect())
    }

    /// Versions that `up` would apply, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub async fn pending(&self) -> Result<Vec<String>> {
        Ok(self
            .status()
            .await?
            .into_iter()
            .filter(|s| !s.applied)
            .map(|s| s.version)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteConnection;
    use crate::introspect::table_exists;
    use crate::schema::{ModelColumn, SqlType};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_conn() -> SqliteConnection {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        SqliteConnection::new(pool)
    }

    fn create_table(version: &str, table: &'static str) -> SqlMigration {
        SqlMigration::new(version, format!("create {table}"))
            .up(move |s| {
                s.create_table(table, |t| {
                    t.column(
                        ModelColumn::new("id", SqlType::BigInt)
                            .primary_key()
                            .auto_increment(),
                    );
                });
                Ok(())
            })
            .down(move |s| {
                s.drop_table(table);
                Ok(())
            })
    }

    #[tokio::test]
    async fn test_up_is_idempotent() {
        let conn = create_test_conn().await;
        let mut migrator = Migrator::new(&conn, MigratorConfig::default());
        migrator.register(create_table("002", "posts")).unwrap();
        migrator.register(create_table("001", "users")).unwrap();

        assert_eq!(migrator.up().await.unwrap(), vec!["001", "002"]);
        assert!(migrator.up().await.unwrap().is_empty());
        assert!(table_exists(&conn, "users").await.unwrap());
        assert!(table_exists(&conn, "posts").await.unwrap());
        assert_eq!(migrator.history().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batches_and_down() {
        let conn = create_test_conn().await;
        let mut migrator = Migrator::new(&conn, MigratorConfig::default());
        migrator.register(create_table("001", "users")).unwrap();
        migrator.up().await.unwrap();

        migrator.register(create_table("002", "posts")).unwrap();
        migrator.register(create_table("003", "tags")).unwrap();
        migrator.up().await.unwrap();

        let status = migrator.status().await.unwrap();
        let batches: Vec<Option<i64>> = status.iter().map(|s| s.batch).collect();
        assert_eq!(batches, vec![Some(1), Some(2), Some(2)]);

        assert_eq!(migrator.down(1).await.unwrap(), vec!["003"]);
        assert!(!table_exists(&conn, "tags").await.unwrap());
        assert!(table_exists(&conn, "posts").await.unwrap());
        assert_eq!(migrator.pending().await.unwrap(), vec!["003"]);
    }

    #[tokio::test]
    async fn test_reset_and_fresh() {
        let conn = create_test_conn().await;
        let mut migrator = Migrator::new(&conn, MigratorConfig::default());
        migrator.register(create_table("001", "users")).unwrap();
        migrator.register(create_table("002", "posts")).unwrap();
        migrator.up().await.unwrap();

        assert_eq!(migrator.reset().await.unwrap(), vec!["002", "001"]);
        assert!(!table_exists(&conn, "users").await.unwrap());

        assert_eq!(migrator.fresh().await.unwrap(), vec!["001", "002"]);
        assert_eq!(migrator.history().last_batch().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_records() {
        let conn = create_test_conn().await;
        let mut migrator = Migrator::new(&conn, MigratorConfig::default());
        migrator.register(create_table("001", "users")).unwrap();
        migrator
            .register(SqlMigration::new("002", "broken").up(|s| {
                s.raw("CREATE TABLE");
                Ok(())
            }))
            .unwrap();
        migrator.register(create_table("003", "tags")).unwrap();

        let err = migrator.up().await.unwrap_err();
        assert!(matches!(err, MigrateError::MigrationFailed { ref version, .. } if version == "002"));
        assert_eq!(migrator.pending().await.unwrap(), vec!["002", "003"]);
        assert!(!table_exists(&conn, "tags").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_version() {
        let conn = create_test_conn().await;
        let mut migrator = Migrator::new(&conn, MigratorConfig::default());
        migrator.register(create_table("001", "users")).unwrap();
        let err = migrator.register(create_table("001", "posts")).err().unwrap();
        assert!(matches!(err, MigrateError::DuplicateVersion(ref v) if v == "001"));
    }

    #[tokio::test]
    async fn test_ledger_missing_without_auto_create() {
        let conn = create_test_conn().await;
        let mut migrator = Migrator::new(
            &conn,
            MigratorConfig::new().table_name("schema_log").auto_create(false),
        );
        migrator.register(create_table("001", "users")).unwrap();

        let err = migrator.up().await.unwrap_err();
        assert!(matches!(err, MigrateError::LedgerMissing(ref t) if t == "schema_log"));
        assert_eq!(migrator.pending().await.unwrap(), vec!["001"]);
    }

    #[test]
    fn test_config_from_json() {
        let config: MigratorConfig =
            serde_json::from_str(r#"{"table_name": "schema_versions"}"#).unwrap();
        assert_eq!(config.table_name, "schema_versions");
        assert!(config.auto_create);
    }
}
