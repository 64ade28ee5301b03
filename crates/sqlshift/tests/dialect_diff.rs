//! Diff and ALTER generation across dialects.
//!
//! PostgreSQL and MySQL are exercised through a recording connection that
//! answers catalog queries with canned rows.

mod common;

use common::{exec_all, mysql_users, postgres_users, sqlite};
use sqlshift::prelude::*;

fn users_model(name_length: u32) -> Vec<ModelColumn> {
    vec![
        ModelColumn::new("id", SqlType::BigInt).primary_key(),
        ModelColumn::new("name", SqlType::Varchar(name_length)).not_null(),
    ]
}

#[tokio::test]
async fn postgres_length_change_is_altered() {
    let conn = postgres_users();
    let config = SafeMigratorConfig::new().backup_tables(false);

    let result = migrate_columns(&conn, "users", &users_model(100), &config)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.change_summary(), "0 add, 1 modify, 0 drop");
    assert!(result.changes[0].has_change(ColumnChange::Length));
    assert_eq!(result.changes[0].reason, "length changed from 50 to 100");

    let executed = conn.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].starts_with("ALTER TABLE \"users\" ALTER COLUMN \"name\" TYPE VARCHAR(100)"));
}

#[tokio::test]
async fn postgres_backup_runs_before_the_alter() {
    let conn = postgres_users();
    let result = migrate_columns(&conn, "users", &users_model(100), &SafeMigratorConfig::default())
        .await
        .unwrap();
    let backup = result.backup_table.unwrap();

    let executed = conn.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed[0].contains(&format!("\"{backup}\"")));
    assert!(executed[1].starts_with("ALTER TABLE"));
}

#[tokio::test]
async fn postgres_unchanged_model_executes_nothing() {
    let conn = postgres_users();
    let result = migrate_columns(&conn, "users", &users_model(50), &SafeMigratorConfig::default())
        .await
        .unwrap();
    assert!(result.changes.is_empty());
    assert!(conn.executed().is_empty());
}

#[tokio::test]
async fn postgres_introspection_reads_catalog_rows() {
    let conn = postgres_users();
    let columns = get_database_columns(&conn, "users").await.unwrap();
    assert_eq!(columns.len(), 2);
    assert!(columns[0].primary_key);
    assert!(columns[0].not_null);
    assert_eq!(columns[1].raw_type, "character varying");
    assert_eq!(columns[1].length, Some(50));
}

#[tokio::test]
async fn postgres_restore_runs_in_one_transaction() {
    let conn = postgres_users();
    let migrator = SafeMigrator::new(&conn, SafeMigratorConfig::default());
    migrator.restore_from_backup("users", "users_backup_1").await.unwrap();

    assert_eq!(
        conn.executed(),
        vec![
            "BEGIN".to_string(),
            "DELETE FROM \"users\"".to_string(),
            "INSERT INTO \"users\" (\"id\", \"name\") SELECT \"id\", \"name\" FROM \"users_backup_1\"".to_string(),
            "COMMIT".to_string(),
        ]
    );
}

#[tokio::test]
async fn postgres_failed_restore_rolls_back() {
    let conn = postgres_users().fail_on("INSERT INTO");
    let migrator = SafeMigrator::new(&conn, SafeMigratorConfig::default());
    let err = migrator
        .restore_from_backup("users", "users_backup_1")
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::BackupFailed { .. }));

    let executed = conn.executed();
    assert_eq!(executed.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(executed.last().map(String::as_str), Some("ROLLBACK"));
    assert!(!executed.iter().any(|s| s == "COMMIT"));
}

#[tokio::test]
async fn mysql_length_change_is_a_modify_column() {
    let conn = mysql_users();
    let config = SafeMigratorConfig::new().backup_tables(false);

    let result = migrate_columns(&conn, "users", &users_model(100), &config)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.change_summary(), "0 add, 1 modify, 0 drop");

    let executed = conn.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].starts_with("ALTER TABLE `users` MODIFY COLUMN `name` VARCHAR(100) NOT NULL"));
}

#[tokio::test]
async fn mysql_combines_clauses_in_one_statement() {
    let conn = mysql_users();
    let mut model = users_model(50);
    model.push(ModelColumn::new("email", SqlType::Varchar(255)));
    model.push(ModelColumn::new("age", SqlType::Int));

    let result = migrate_columns(
        &conn,
        "users",
        &model,
        &SafeMigratorConfig::new().backup_tables(false),
    )
    .await
    .unwrap();
    assert_eq!(result.change_summary(), "2 add, 0 modify, 0 drop");

    let executed = conn.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].contains("ADD COLUMN `email`"));
    assert!(executed[0].contains(", ADD COLUMN `age`"));
}

#[tokio::test]
async fn sqlite_ignores_length_but_not_nullability() {
    let conn = sqlite().await;
    exec_all(
        &conn,
        &["CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(50) NOT NULL)"],
    )
    .await;
    let existing = get_database_columns(&conn, "users").await.unwrap();
    let dialect = SqliteDialect::new();

    assert!(compare_columns(&dialect, &existing, &users_model(100)).is_empty());

    let mut relaxed = users_model(100);
    relaxed[1].not_null = false;
    let diffs = compare_columns(&dialect, &existing, &relaxed);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].reason, "column became nullable");

    let err = generate_alter_sql(&dialect, "users", &diffs).unwrap_err();
    assert!(matches!(err, MigrateError::RequiresRecreate { ref operation, .. } if operation == "modify"));
}

#[test]
fn same_differences_render_per_dialect() {
    let old = DatabaseColumn {
        not_null: true,
        length: Some(50),
        ..DatabaseColumn::new("name", "varchar(50)")
    };
    let new = ModelColumn::new("name", SqlType::Varchar(100)).not_null();
    let diffs = vec![
        ColumnDifference::modify(
            old,
            new,
            vec![ColumnChange::Length],
            &["length changed from 50 to 100".to_string()],
        ),
        ColumnDifference::add(ModelColumn::new("bio", SqlType::Text)),
    ];

    let pg = generate_alter_sql(&PostgresDialect::new(), "users", &diffs).unwrap();
    assert_eq!(pg.len(), 1);
    assert!(pg[0].contains("ALTER COLUMN \"name\" TYPE VARCHAR(100)"));
    assert!(pg[0].contains("ADD COLUMN \"bio\" TEXT"));

    let my = generate_alter_sql(&MySqlDialect::new(), "users", &diffs).unwrap();
    assert_eq!(my.len(), 1);
    assert!(my[0].contains("MODIFY COLUMN `name` VARCHAR(100) NOT NULL"));

    let sqlite_adds = generate_alter_sql(&SqliteDialect::new(), "users", &diffs[1..]).unwrap();
    assert_eq!(sqlite_adds, vec!["ALTER TABLE \"users\" ADD COLUMN \"bio\" TEXT".to_string()]);
}

#[test]
fn tag_defaults_are_normalized() {
    use sqlshift::model::normalize_default;

    assert_eq!(normalize_default("null"), "NULL");
    assert_eq!(normalize_default("TRUE"), "1");
    assert_eq!(normalize_default("false"), "0");
    assert_eq!(normalize_default("42"), "42");
    assert_eq!(normalize_default("-1.5"), "-1.5");
    assert_eq!(normalize_default("now()"), "CURRENT_TIMESTAMP");
    assert_eq!(normalize_default("'draft'"), "'draft'");
    assert_eq!(normalize_default("it's"), "'it''s'");
}
