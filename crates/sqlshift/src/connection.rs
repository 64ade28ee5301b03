//! The database capability consumed by the engine.
//!
//! The engine never talks to a driver directly. Everything goes through
//! [`Connection`], which exposes what the migration code needs: the driver
//! name, statement execution, row queries and all-or-nothing batches. A
//! [`SqliteConnection`] backed by `sqlx` ships with the crate; other drivers
//! implement the trait in their own crates.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::warn;

use crate::error::Result;

/// Database drivers the engine knows how to generate SQL for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// SQLite 3.
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// MySQL / MariaDB.
    MySql,
}

impl Driver {
    /// Returns the driver name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// Parses a driver name, accepting the common aliases.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "postgres" | "postgresql" | "pg" | "pgx" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            _ => None,
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed SQL value, used for bind arguments and row cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Binary value.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as an integer, parsing text if needed.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            Self::Real(f) => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null | Self::Blob(_) => None,
        }
    }

    /// Returns the value as text. Numbers are formatted.
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(f) => Some(f.to_string()),
            Self::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Self::Null => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One result row: column names with their values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Appends a column in place.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the value at the given position.
    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value of a column. Column names match case-insensitively
    /// because `information_schema` spells them in upper case on some
    /// servers.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// Returns a column as text, `None` for NULL or missing columns.
    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<String> {
        self.get(column).and_then(Value::as_string)
    }

    /// Returns a column as an integer.
    #[must_use]
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// Returns a column as a flag: non-zero integers and `YES`/`TRUE` text.
    #[must_use]
    pub fn get_bool(&self, column: &str) -> bool {
        match self.get(column) {
            Some(Value::Integer(i)) => *i != 0,
            Some(Value::Text(s)) => matches!(
                s.trim().to_ascii_uppercase().as_str(),
                "YES" | "TRUE" | "T" | "1" | "Y"
            ),
            _ => false,
        }
    }
}

/// The database capability the engine runs against.
///
/// All calls are awaited one after the other; implementations do not need
/// to support concurrent use.
pub trait Connection: Send + Sync {
    /// Returns the driver behind this connection.
    fn driver(&self) -> Driver;

    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the statement fails.
    fn exec(&self, sql: &str, args: &[Value]) -> impl Future<Output = Result<u64>> + Send;

    /// Runs a query and returns every row.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the query fails.
    fn query(&self, sql: &str, args: &[Value]) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Runs a query and returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the query fails.
    fn query_row(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = Result<Option<Row>>> + Send {
        async move { Ok(self.query(sql, args).await?.into_iter().next()) }
    }

    /// Executes statements as one unit: either all of them take effect or
    /// none do. Returns the affected row count of the last statement.
    ///
    /// The default runs `BEGIN`, the statements and `COMMIT` through
    /// [`Connection::exec`], and `ROLLBACK` on the first error. That only
    /// holds together if `exec` always uses the same session, so pooled
    /// implementations should override it.
    ///
    /// # Errors
    ///
    /// Returns the first failing statement's error after rolling back.
    fn exec_in_transaction(
        &self,
        statements: &[String],
    ) -> impl Future<Output = Result<u64>> + Send {
        async move {
            self.exec("BEGIN", &[]).await?;
            let mut affected = 0;
            for sql in statements {
                match self.exec(sql, &[]).await {
                    Ok(n) => affected = n,
                    Err(err) => {
                        if let Err(rollback) = self.exec("ROLLBACK", &[]).await {
                            warn!(error = %rollback, "Rollback failed");
                        }
                        return Err(err);
                    }
                }
            }
            self.exec("COMMIT", &[]).await?;
            Ok(affected)
        }
    }
}

/// [`Connection`] over a `sqlx` SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    pool: SqlitePool,
}

impl SqliteConnection {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to a database URL such as `sqlite::memory:` or
    /// `sqlite:app.db?mode=rwc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await?;
        Ok(Self { pool })
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_args<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    args: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(Option::<i64>::None),
            Value::Integer(i) => query.bind(*i),
            Value::Real(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Blob(b) => query.bind(b.as_slice()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            // The storage class of the value, not the declared column type.
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Value::Real(row.try_get_unchecked::<f64, _>(i)?),
                "BLOB" => Value::Blob(row.try_get_unchecked::<Vec<u8>, _>(i)?),
                _ => Value::Text(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        out.push(column.name(), value);
    }
    Ok(out)
}

impl Connection for SqliteConnection {
    fn driver(&self) -> Driver {
        Driver::Sqlite
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> Result<u64> {
        let result = bind_args(sqlx::query(sql), args)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let rows = bind_args(sqlx::query(sql), args)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn exec_in_transaction(&self, statements: &[String]) -> Result<u64> {
        // Dropping `tx` without commit rolls back.
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for sql in statements {
            affected = sqlx::query(sql).execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }
}
