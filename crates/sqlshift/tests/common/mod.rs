#![allow(dead_code)]

use std::sync::Mutex;

use sqlshift::connection::{Connection, Driver, Row, SqliteConnection, Value};
use sqlshift::error::{MigrateError, Result};
use sqlx::sqlite::SqlitePoolOptions;

pub async fn sqlite() -> SqliteConnection {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    SqliteConnection::new(pool)
}

pub async fn exec_all(conn: &SqliteConnection, statements: &[&str]) {
    for sql in statements {
        conn.exec(sql, &[])
            .await
            .unwrap_or_else(|e| panic!("Failed to execute: {sql}\nError: {e}"));
    }
}

pub async fn row_count(conn: &SqliteConnection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) AS n FROM \"{table}\""), &[])
        .await
        .unwrap()
        .and_then(|r| r.get_i64("n"))
        .unwrap()
}

/// A connection that answers queries from canned rows and records every
/// executed statement. Queries are matched by substring, first match wins.
pub struct MockConnection {
    driver: Driver,
    responses: Vec<(String, Vec<Row>)>,
    failing: Vec<String>,
    executed: Mutex<Vec<String>>,
}

impl MockConnection {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            responses: Vec::new(),
            failing: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, fragment: &str, rows: Vec<Row>) -> Self {
        self.responses.push((fragment.to_string(), rows));
        self
    }

    /// Makes `exec` fail for statements containing `fragment`. The
    /// statement is still recorded.
    pub fn fail_on(mut self, fragment: &str) -> Self {
        self.failing.push(fragment.to_string());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl Connection for MockConnection {
    fn driver(&self) -> Driver {
        self.driver
    }

    async fn exec(&self, sql: &str, _args: &[Value]) -> Result<u64> {
        self.executed.lock().unwrap().push(sql.to_string());
        if self.failing.iter().any(|f| sql.contains(f.as_str())) {
            return Err(MigrateError::Execution {
                statement: sql.to_string(),
                message: "rejected by test connection".to_string(),
            });
        }
        Ok(0)
    }

    async fn query(&self, sql: &str, _args: &[Value]) -> Result<Vec<Row>> {
        Ok(self
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

/// A PostgreSQL connection that reports a `users` table with
/// `id BIGINT PRIMARY KEY` and `name VARCHAR(50) NOT NULL`.
pub fn postgres_users() -> MockConnection {
    MockConnection::new(Driver::Postgres)
        .respond(
            "information_schema.tables",
            vec![Row::new().with("present", 1_i64)],
        )
        .respond(
            "information_schema.columns",
            vec![
                Row::new()
                    .with("column_name", "id")
                    .with("data_type", "bigint")
                    .with("character_maximum_length", Value::Null)
                    .with("is_nullable", "NO")
                    .with("column_default", Value::Null)
                    .with("is_identity", "NO"),
                Row::new()
                    .with("column_name", "name")
                    .with("data_type", "character varying")
                    .with("character_maximum_length", 50_i64)
                    .with("is_nullable", "NO")
                    .with("column_default", Value::Null)
                    .with("is_identity", "NO"),
            ],
        )
        .respond(
            "table_constraints",
            vec![Row::new()
                .with("constraint_name", "users_pkey")
                .with("constraint_type", "PRIMARY KEY")
                .with("column_name", "id")],
        )
}

/// The MySQL counterpart of [`postgres_users`].
pub fn mysql_users() -> MockConnection {
    MockConnection::new(Driver::MySql)
        .respond(
            "information_schema.TABLES",
            vec![Row::new().with("present", 1_i64)],
        )
        .respond(
            "information_schema.COLUMNS",
            vec![
                Row::new()
                    .with("COLUMN_NAME", "id")
                    .with("COLUMN_TYPE", "bigint")
                    .with("IS_NULLABLE", "NO")
                    .with("COLUMN_KEY", "PRI")
                    .with("EXTRA", ""),
                Row::new()
                    .with("COLUMN_NAME", "name")
                    .with("COLUMN_TYPE", "varchar(50)")
                    .with("CHARACTER_MAXIMUM_LENGTH", 50_i64)
                    .with("IS_NULLABLE", "NO")
                    .with("COLUMN_KEY", "")
                    .with("EXTRA", ""),
            ],
        )
}
