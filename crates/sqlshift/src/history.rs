//! Migration ledger.
//!
//! This module manages the table (default `migrations`) that records which
//! versioned migrations have been applied and in which batch.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::builder::TableBuilder;
use crate::connection::{Connection, Row, Value};
use crate::dialect::{dialect_for, Dialect};
use crate::error::{MigrateError, Result};
use crate::introspect::table_exists;
use crate::schema::{ModelColumn, SqlType};

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Unique ID in the ledger table.
    pub id: i64,
    /// Migration version.
    pub version: String,
    /// Migration description.
    pub description: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
    /// Batch the migration was applied in.
    pub batch: i64,
}

/// Reads and writes the ledger table.
pub struct MigrationHistory<'a, C: Connection> {
    conn: &'a C,
    dialect: Box<dyn Dialect>,
    table: String,
}

impl<'a, C: Connection> MigrationHistory<'a, C> {
    /// Creates a ledger accessor for `table`.
    pub fn new(conn: &'a C, table: impl Into<String>) -> Self {
        Self {
            conn,
            dialect: dialect_for(conn.driver()),
            table: table.into(),
        }
    }

    /// Returns the ledger table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn ledger_error(&self, err: &MigrateError) -> MigrateError {
        MigrateError::Ledger {
            table: self.table.clone(),
            message: err.to_string(),
        }
    }

    fn quoted(&self) -> String {
        self.dialect.quote_identifier(&self.table)
    }

    /// Returns true if the ledger table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails.
    pub async fn exists(&self) -> Result<bool> {
        table_exists(self.conn, &self.table).await
    }

    /// Creates the ledger table if it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Ledger`] if the table cannot be created.
    pub async fn ensure_table(&self) -> Result<()> {
        let mut table = TableBuilder::new(&self.table);
        table
            .if_not_exists()
            .column(
                ModelColumn::new("id", SqlType::BigInt)
                    .primary_key()
                    .auto_increment(),
            )
            .column(ModelColumn::new("version", SqlType::Varchar(255)).not_null().unique())
            .column(ModelColumn::new("description", SqlType::Varchar(255)).not_null())
            .column(ModelColumn::new("applied_at", SqlType::Varchar(64)).not_null())
            .column(ModelColumn::new("batch", SqlType::Int).not_null());

        for sql in table.to_sql(self.dialect.as_ref()) {
            self.conn
                .exec(&sql, &[])
                .await
                .map_err(|e| self.ledger_error(&e))?;
        }
        Ok(())
    }

    /// Records a migration as applied.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Ledger`] if the insert fails.
    pub async fn record_applied(&self, version: &str, description: &str, batch: i64) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (version, description, applied_at, batch) VALUES ({}, {}, {}, {})",
            self.quoted(),
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
            self.dialect.placeholder(4),
        );
        self.conn
            .exec(
                &sql,
                &[
                    Value::from(version),
                    Value::from(description),
                    Value::from(Utc::now().to_rfc3339()),
                    Value::from(batch),
                ],
            )
            .await
            .map_err(|e| self.ledger_error(&e))?;
        Ok(())
    }

    /// Removes a migration record (for rollback).
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationNotFound`] if no record matches.
    pub async fn record_unapplied(&self, version: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE version = {}",
            self.quoted(),
            self.dialect.placeholder(1)
        );
        let affected = self
            .conn
            .exec(&sql, &[Value::from(version)])
            .await
            .map_err(|e| self.ledger_error(&e))?;

        if affected == 0 {
            return Err(MigrateError::MigrationNotFound(version.to_string()));
        }
        Ok(())
    }

    /// Gets all applied migrations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Ledger`] if the ledger cannot be read.
    pub async fn get_applied(&self) -> Result<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT id, version, description, applied_at, batch FROM {} ORDER BY batch, id",
            self.quoted()
        );
        self.fetch(&sql, &[]).await
    }

    /// Gets the set of applied versions.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Ledger`] if the ledger cannot be read.
    pub async fn get_applied_set(&self) -> Result<HashSet<String>> {
        Ok(self
            .get_applied()
            .await?
            .into_iter()
            .map(|r| r.version)
            .collect())
    }

    /// Gets the `steps` most recently applied migrations, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Ledger`] if the ledger cannot be read.
    pub async fn get_latest(&self, steps: usize) -> Result<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT id, version, description, applied_at, batch FROM {} ORDER BY batch DESC, id DESC LIMIT {}",
            self.quoted(),
            self.dialect.placeholder(1)
        );
        let limit = i64::try_from(steps).unwrap_or(i64::MAX);
        self.fetch(&sql, &[Value::from(limit)]).await
    }

    /// Returns the highest batch number, 0 for an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Ledger`] if the ledger cannot be read.
    pub async fn last_batch(&self) -> Result<i64> {
        let sql = format!("SELECT MAX(batch) AS batch FROM {}", self.quoted());
        let row = self
            .conn
            .query_row(&sql, &[])
            .await
            .map_err(|e| self.ledger_error(&e))?;
        Ok(row.and_then(|r| r.get_i64("batch")).unwrap_or(0))
    }

    /// Returns the number of applied migrations.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Ledger`] if the ledger cannot be read.
    pub async fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) AS total FROM {}", self.quoted());
        let row = self
            .conn
            .query_row(&sql, &[])
            .await
            .map_err(|e| self.ledger_error(&e))?;
        let total = row.and_then(|r| r.get_i64("total")).unwrap_or(0);
        Ok(usize::try_from(total).unwrap_or(0))
    }

    async fn fetch(&self, sql: &str, args: &[Value]) -> Result<Vec<MigrationRecord>> {
        let rows = self
            .conn
            .query(sql, args)
            .await
            .map_err(|e| self.ledger_error(&e))?;
        rows.iter().map(|row| self.parse_record(row)).collect()
    }

    fn parse_record(&self, row: &Row) -> Result<MigrationRecord> {
        let missing = |column: &str| MigrateError::Ledger {
            table: self.table.clone(),
            message: format!("row without '{column}'"),
        };
        let applied_at_str = row.get_str("applied_at").ok_or_else(|| missing("applied_at"))?;
        let applied_at = DateTime::parse_from_rfc3339(&applied_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                // Rows written by hand with SQL datetime literals.
                chrono::NaiveDateTime::parse_from_str(&applied_at_str, "%Y-%m-%d %H:%M:%S")
                    .map(|dt| dt.and_utc())
            })
            .map_err(|e| MigrateError::Ledger {
                table: self.table.clone(),
                message: format!("invalid applied_at '{applied_at_str}': {e}"),
            })?;

        Ok(MigrationRecord {
            id: row.get_i64("id").ok_or_else(|| missing("id"))?,
            version: row.get_str("version").ok_or_else(|| missing("version"))?,
            description: row.get_str("description").unwrap_or_default(),
            applied_at,
            batch: row.get_i64("batch").ok_or_else(|| missing("batch"))?,
        })
    }
}
