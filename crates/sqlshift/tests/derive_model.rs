//! `#[derive(Model)]` feeds the analyzer.

use sqlshift::prelude::*;

#[allow(dead_code)]
#[derive(Debug, Default)]
struct Timestamps {
    created_at: i64,
}

#[allow(dead_code)]
#[derive(Debug, Model)]
struct UserAccount {
    #[migrate(embed)]
    base: Timestamps,
    #[migrate(tag = "pk,auto_increment")]
    id: u64,
    #[migrate(tag = "size:100,not_null,comment:'display name'")]
    display_name: String,
    #[migrate(tag = "unique,index:idx_account_email")]
    email: Option<String>,
    #[migrate(primaryKey = "false", size = "64")]
    api_key: String,
    #[migrate(tag = "type:decimal(12,4),default:0")]
    balance: f64,
    scratch: Vec<String>,
    #[migrate(tag = "column:is_active,default:true")]
    r#active: bool,
}

#[allow(dead_code)]
#[derive(Model)]
#[model(table = "audit_entries")]
struct Audit {
    #[migrate(tag = "pk")]
    id: i64,
    #[migrate(nullable)]
    payload: serde_json::Value,
}

#[allow(dead_code)]
#[derive(Model)]
struct HTTPRequestLog {
    #[migrate(tag = "pk")]
    id: i64,
}

#[allow(dead_code, non_camel_case_types)]
#[derive(Model)]
struct Api_Token {
    #[migrate(tag = "pk")]
    id: i64,
}

#[test]
fn table_names() {
    assert_eq!(UserAccount::table_name(), "user_account");
    assert_eq!(Audit::table_name(), "audit_entries");
}

#[test]
fn table_names_follow_the_column_naming_rule() {
    assert_eq!(HTTPRequestLog::table_name(), "http_request_log");
    assert_eq!(
        HTTPRequestLog::table_name(),
        sqlshift::model::to_snake_case("HTTPRequestLog")
    );
    assert_eq!(Api_Token::table_name(), "api_token");
}

#[test]
fn fields_keep_declaration_order_and_types() {
    let fields = UserAccount::fields();
    assert_eq!(fields.len(), 8);
    assert!(fields[0].embedded);
    assert_eq!(fields[3].name, "email");
    assert_eq!(fields[3].rust_type, "Option<String>");
    assert_eq!(fields[6].tag, None);
    assert_eq!(fields[7].name, "active");
}

#[test]
fn analyzed_columns() {
    let columns = analyze_model::<UserAccount>();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["id", "display_name", "email", "api_key", "balance", "is_active"]
    );

    let id = &columns[0];
    assert!(id.primary_key && id.auto_increment && id.not_null);
    assert_eq!(id.sql_type, SqlType::BigInt);

    let display_name = &columns[1];
    assert_eq!(display_name.sql_type, SqlType::Varchar(100));
    assert!(display_name.not_null);
    assert_eq!(display_name.comment.as_deref(), Some("display name"));

    let email = &columns[2];
    assert!(email.unique);
    assert!(!email.not_null);
    assert_eq!(email.index, Some(IndexName::Named("idx_account_email".to_string())));

    assert_eq!(columns[3].sql_type, SqlType::Varchar(64));
    assert!(!columns[3].primary_key);
    assert_eq!(columns[4].sql_type, SqlType::Decimal(12, 4));
    assert_eq!(columns[4].default.as_deref(), Some("0"));
    assert_eq!(columns[5].default.as_deref(), Some("1"));
}

#[test]
fn legacy_flag_attributes() {
    let fields = Audit::fields();
    assert_eq!(fields[1].attrs, vec![("nullable".to_string(), "true".to_string())]);

    let columns = analyze_model::<Audit>();
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[1].sql_type, SqlType::Json);
    assert!(!columns[1].not_null);
}

#[test]
fn derived_model_renders_create_table() {
    let statements = create_table_from_columns(
        &SqliteDialect::new(),
        &UserAccount::table_name(),
        &analyze_model::<UserAccount>(),
    );
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("CREATE TABLE \"user_account\""));
    assert!(statements[0].contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
    assert_eq!(
        statements[1],
        "CREATE INDEX \"idx_account_email\" ON \"user_account\" (\"email\")"
    );
}
