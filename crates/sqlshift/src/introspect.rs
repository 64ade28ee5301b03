//! Reading the live shape of a table.
//!
//! Each driver has its own catalog: SQLite exposes pragma table-valued
//! functions, PostgreSQL and MySQL expose `information_schema`. The result
//! is the same list of [`DatabaseColumn`]s in physical column order.

use std::collections::HashMap;

use tracing::debug;

use crate::connection::{Connection, Driver, Row, Value};
use crate::dialect::{base_type_name, type_params};
use crate::error::{MigrateError, Result};
use crate::schema::DatabaseColumn;

const SQLITE_COLUMNS_SQL: &str = "SELECT * FROM pragma_table_info(?)";
const SQLITE_INDEX_LIST_SQL: &str = "SELECT * FROM pragma_index_list(?)";
const SQLITE_INDEX_INFO_SQL: &str = "SELECT * FROM pragma_index_info(?)";
const SQLITE_TABLE_EXISTS_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?";

const POSTGRES_COLUMNS_SQL: &str = r"
SELECT column_name, data_type, character_maximum_length, numeric_precision,
       numeric_scale, is_nullable, column_default, is_identity,
       col_description(
           (quote_ident(table_schema) || '.' || quote_ident(table_name))::regclass,
           ordinal_position
       ) AS column_comment
FROM information_schema.columns
WHERE table_schema = current_schema() AND table_name = $1
ORDER BY ordinal_position
";

const POSTGRES_CONSTRAINTS_SQL: &str = r"
SELECT tc.constraint_name, tc.constraint_type, kcu.column_name
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name
 AND tc.table_schema = kcu.table_schema
 AND tc.table_name = kcu.table_name
WHERE tc.table_schema = current_schema()
  AND tc.table_name = $1
  AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
";

const POSTGRES_TABLE_EXISTS_SQL: &str = r"
SELECT 1 AS present FROM information_schema.tables
WHERE table_schema = current_schema() AND table_name = $1
";

const MYSQL_COLUMNS_SQL: &str = r"
SELECT COLUMN_NAME, COLUMN_TYPE, CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION,
       NUMERIC_SCALE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_KEY, EXTRA, COLUMN_COMMENT
FROM information_schema.COLUMNS
WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
ORDER BY ORDINAL_POSITION
";

const MYSQL_TABLE_EXISTS_SQL: &str = r"
SELECT 1 AS present FROM information_schema.TABLES
WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
";

/// Returns the columns of `table` in physical order.
///
/// # Errors
///
/// Returns [`MigrateError::TableNotFound`] for an empty name or a table the
/// catalog does not know.
pub async fn get_database_columns<C: Connection>(
    conn: &C,
    table: &str,
) -> Result<Vec<DatabaseColumn>> {
    if table.trim().is_empty() {
        return Err(MigrateError::TableNotFound(table.to_string()));
    }

    let columns = match conn.driver() {
        Driver::Sqlite => sqlite_columns(conn, table).await?,
        Driver::Postgres => postgres_columns(conn, table).await?,
        Driver::MySql => mysql_columns(conn, table).await?,
    };

    if columns.is_empty() {
        return Err(MigrateError::TableNotFound(table.to_string()));
    }

    debug!(table, driver = %conn.driver(), columns = columns.len(), "Introspected table");
    Ok(columns)
}

/// Returns true if `table` exists.
///
/// # Errors
///
/// Returns an error if the catalog query fails.
pub async fn table_exists<C: Connection>(conn: &C, table: &str) -> Result<bool> {
    if table.trim().is_empty() {
        return Ok(false);
    }
    let sql = match conn.driver() {
        Driver::Sqlite => SQLITE_TABLE_EXISTS_SQL,
        Driver::Postgres => POSTGRES_TABLE_EXISTS_SQL,
        Driver::MySql => MYSQL_TABLE_EXISTS_SQL,
    };
    Ok(conn.query_row(sql, &[Value::from(table)]).await?.is_some())
}

fn column_name(table: &str, row: &Row, key: &str) -> Result<String> {
    row.get_str(key).ok_or_else(|| MigrateError::Introspection {
        table: table.to_string(),
        message: format!("catalog row without '{key}'"),
    })
}

fn to_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn is_decimal(base: &str) -> bool {
    matches!(base, "DECIMAL" | "NUMERIC")
}

/// Fills length or precision/scale from the parameters of a declared type.
fn apply_declared_params(col: &mut DatabaseColumn) {
    let base = base_type_name(&col.raw_type);
    let params = type_params(&col.raw_type);
    if is_decimal(&base) {
        col.precision = params.first().copied();
        col.scale = params.get(1).copied().or(col.precision.map(|_| 0));
    } else if base.contains("CHAR") {
        col.length = params.first().copied();
    }
}

async fn sqlite_columns<C: Connection>(conn: &C, table: &str) -> Result<Vec<DatabaseColumn>> {
    let rows = conn.query(SQLITE_COLUMNS_SQL, &[Value::from(table)]).await?;
    let pk_count = rows.iter().filter(|r| r.get_i64("pk").unwrap_or(0) > 0).count();

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut col = DatabaseColumn::new(
            column_name(table, row, "name")?,
            row.get_str("type").unwrap_or_default(),
        );
        apply_declared_params(&mut col);
        col.not_null = row.get_bool("notnull");
        col.primary_key = row.get_i64("pk").unwrap_or(0) > 0;
        // A lone INTEGER primary key is the rowid alias.
        col.auto_increment =
            col.primary_key && pk_count == 1 && base_type_name(&col.raw_type) == "INTEGER";
        col.default = row.get_str("dflt_value");
        columns.push(col);
    }

    if columns.is_empty() {
        return Ok(columns);
    }

    for index in conn.query(SQLITE_INDEX_LIST_SQL, &[Value::from(table)]).await? {
        let origin = index.get_str("origin").unwrap_or_default();
        if !index.get_bool("unique") || origin == "pk" {
            continue;
        }
        let name = column_name(table, &index, "name")?;
        let members = conn.query(SQLITE_INDEX_INFO_SQL, &[Value::from(name)]).await?;
        if let [member] = members.as_slice() {
            if let Some(member) = member.get_str("name") {
                if let Some(col) = columns.iter_mut().find(|c| c.name == member) {
                    col.unique = true;
                }
            }
        }
    }

    Ok(columns)
}

async fn postgres_columns<C: Connection>(conn: &C, table: &str) -> Result<Vec<DatabaseColumn>> {
    let rows = conn.query(POSTGRES_COLUMNS_SQL, &[Value::from(table)]).await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut col = DatabaseColumn::new(
            column_name(table, row, "column_name")?,
            row.get_str("data_type").unwrap_or_default(),
        );
        col.length = to_u32(row.get_i64("character_maximum_length"));
        if is_decimal(&base_type_name(&col.raw_type)) {
            col.precision = to_u32(row.get_i64("numeric_precision"));
            col.scale = to_u32(row.get_i64("numeric_scale"));
        }
        col.not_null = !row.get_bool("is_nullable");
        col.default = row.get_str("column_default");
        col.auto_increment = row.get_bool("is_identity")
            || col.default.as_deref().is_some_and(|d| d.starts_with("nextval("));
        col.comment = row.get_str("column_comment").filter(|c| !c.is_empty());
        columns.push(col);
    }

    if columns.is_empty() {
        return Ok(columns);
    }

    let mut constraints: HashMap<String, (String, Vec<String>)> = HashMap::new();
    for row in conn.query(POSTGRES_CONSTRAINTS_SQL, &[Value::from(table)]).await? {
        let name = column_name(table, &row, "constraint_name")?;
        let kind = row.get_str("constraint_type").unwrap_or_default();
        let column = column_name(table, &row, "column_name")?;
        constraints
            .entry(name)
            .or_insert_with(|| (kind, Vec::new()))
            .1
            .push(column);
    }

    for (kind, members) in constraints.values() {
        for member in members {
            let Some(col) = columns.iter_mut().find(|c| &c.name == member) else {
                continue;
            };
            match kind.as_str() {
                "PRIMARY KEY" => col.primary_key = true,
                "UNIQUE" if members.len() == 1 => col.unique = true,
                _ => {}
            }
        }
    }

    Ok(columns)
}

async fn mysql_columns<C: Connection>(conn: &C, table: &str) -> Result<Vec<DatabaseColumn>> {
    let rows = conn.query(MYSQL_COLUMNS_SQL, &[Value::from(table)]).await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut col = DatabaseColumn::new(
            column_name(table, row, "COLUMN_NAME")?,
            row.get_str("COLUMN_TYPE").unwrap_or_default(),
        );
        col.length = to_u32(row.get_i64("CHARACTER_MAXIMUM_LENGTH"));
        if is_decimal(&base_type_name(&col.raw_type)) {
            col.precision = to_u32(row.get_i64("NUMERIC_PRECISION"));
            col.scale = to_u32(row.get_i64("NUMERIC_SCALE"));
        }
        col.not_null = !row.get_bool("IS_NULLABLE");
        col.default = row.get_str("COLUMN_DEFAULT");
        let key = row.get_str("COLUMN_KEY").unwrap_or_default();
        col.primary_key = key == "PRI";
        col.unique = key == "UNI";
        col.auto_increment = row
            .get_str("EXTRA")
            .is_some_and(|e| e.to_ascii_lowercase().contains("auto_increment"));
        col.comment = row.get_str("COLUMN_COMMENT").filter(|c| !c.is_empty());
        columns.push(col);
    }

    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteConnection;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_conn() -> SqliteConnection {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        SqliteConnection::new(pool)
    }

    #[tokio::test]
    async fn test_sqlite_columns() {
        let conn = create_test_conn().await;
        conn.exec(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL,
                email TEXT UNIQUE,
                price DECIMAL(10, 2) DEFAULT 0
            )",
            &[],
        )
        .await
        .unwrap();

        let columns = get_database_columns(&conn, "users").await.unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "email", "price"]);

        assert!(columns[0].primary_key);
        assert!(columns[0].auto_increment);
        assert!(columns[1].not_null);
        assert_eq!(columns[1].length, Some(50));
        assert!(columns[2].unique);
        assert!(!columns[1].unique);
        assert_eq!(columns[3].precision, Some(10));
        assert_eq!(columns[3].scale, Some(2));
        assert_eq!(columns[3].default.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_composite_unique_is_not_column_unique() {
        let conn = create_test_conn().await;
        conn.exec("CREATE TABLE t (a TEXT, b TEXT, UNIQUE (a, b))", &[])
            .await
            .unwrap();
        let columns = get_database_columns(&conn, "t").await.unwrap();
        assert!(columns.iter().all(|c| !c.unique));
    }

    #[tokio::test]
    async fn test_missing_table() {
        let conn = create_test_conn().await;
        let err = get_database_columns(&conn, "nope").await.unwrap_err();
        assert!(matches!(err, MigrateError::TableNotFound(ref t) if t == "nope"));

        let err = get_database_columns(&conn, "").await.unwrap_err();
        assert!(matches!(err, MigrateError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn test_table_exists() {
        let conn = create_test_conn().await;
        assert!(!table_exists(&conn, "users").await.unwrap());
        conn.exec("CREATE TABLE users (id INTEGER)", &[]).await.unwrap();
        assert!(table_exists(&conn, "users").await.unwrap());
        assert!(!table_exists(&conn, "").await.unwrap());
    }
}
