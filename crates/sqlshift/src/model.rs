//! Model analysis: field tags to [`ModelColumn`]s.
//!
//! A model exposes its fields as [`FieldDescriptor`]s, either written by hand
//! or generated by `#[derive(Model)]`. Each descriptor carries the Rust field
//! name, the Rust type as written, and the field's tags:
//!
//! - a structured tag, `"type:varchar(100),not_null,unique,default:'n/a'"`
//!   (keys and flags are case-insensitive);
//! - legacy single attributes such as `primaryKey = "true"` or `size = "100"`.
//!
//! Both forms are accepted together. Parsing is permissive: a malformed token
//! is logged and skipped, the rest of the field is still analyzed.

use std::collections::HashSet;

use tracing::warn;

use crate::dialect::is_numeric_literal;
use crate::schema::{IndexName, ModelColumn, SqlType};

/// A type whose fields map to table columns.
pub trait Model {
    /// Table name.
    fn table_name() -> String;

    /// Field descriptors in declaration order.
    fn fields() -> Vec<FieldDescriptor>;
}

/// Static description of one struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name as declared.
    pub name: String,
    /// Field type as written in the source (`Option<String>`, `i64`, ...).
    pub rust_type: String,
    /// Structured `key:value,flag` tag.
    pub tag: Option<String>,
    /// Legacy single-attribute tags.
    pub attrs: Vec<(String, String)>,
    /// Embedded ORM base; never mapped to a column.
    pub embedded: bool,
}

impl FieldDescriptor {
    /// Creates a descriptor with no tags.
    #[must_use]
    pub fn new(name: impl Into<String>, rust_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rust_type: rust_type.into(),
            tag: None,
            attrs: Vec::new(),
            embedded: false,
        }
    }

    /// Sets the structured tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Adds a legacy attribute.
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    /// Marks the field as the embedded ORM base.
    #[must_use]
    pub const fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }
}

/// Analyzes a [`Model`] into its columns.
#[must_use]
pub fn analyze_model<M: Model>() -> Vec<ModelColumn> {
    analyze_fields(&M::fields())
}

/// Analyzes field descriptors into columns, in declaration order.
///
/// Fields without a recognized tag and embedded fields are skipped. When two
/// fields resolve to the same column name, the first one wins.
#[must_use]
pub fn analyze_fields(fields: &[FieldDescriptor]) -> Vec<ModelColumn> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for field in fields.iter().filter(|f| !f.embedded) {
        let Some(column) = analyze_field(field) else {
            continue;
        };
        if !seen.insert(column.name.clone()) {
            warn!(
                field = %field.name,
                column = %column.name,
                "Duplicate column name, keeping the first field"
            );
            continue;
        }
        columns.push(column);
    }

    columns
}

/// Tag settings collected from both tag forms before the column is built.
#[derive(Debug, Default)]
struct TagSettings {
    recognized: bool,
    sql_type: Option<SqlType>,
    size: Option<u32>,
    precision: Option<u32>,
    scale: Option<u32>,
    column: Option<String>,
    comment: Option<String>,
    default: Option<String>,
    primary_key: bool,
    auto_increment: bool,
    unique: bool,
    not_null: bool,
    nullable: bool,
    auto_time: bool,
    index: Option<IndexName>,
}

impl TagSettings {
    /// Applies a `key:value` pair. Returns false if the key is unknown.
    fn apply_value(&mut self, field: &str, key: &str, value: &str) -> bool {
        match key {
            "type" => match SqlType::parse(value) {
                Some(ty) => self.sql_type = Some(ty),
                None => warn!(field, value, "Unknown column type in tag, skipping"),
            },
            "size" | "length" => self.size = parse_number(field, key, value).or(self.size),
            "precision" => self.precision = parse_number(field, key, value).or(self.precision),
            "scale" => self.scale = parse_number(field, key, value).or(self.scale),
            "comment" => self.comment = Some(unquote(value)),
            "default" => self.default = Some(normalize_default(value)),
            "column" | "db" => {
                let name = value.trim();
                if name.is_empty() {
                    warn!(field, "Empty column name in tag, skipping");
                } else {
                    self.column = Some(name.to_string());
                }
            }
            "index" => {
                let name = value.trim();
                self.index = Some(if name.is_empty() || name.eq_ignore_ascii_case("true") {
                    IndexName::Auto
                } else {
                    IndexName::Named(name.to_string())
                });
            }
            _ => return self.apply_legacy_flag(field, key, value),
        }
        true
    }

    /// Applies a bare flag. Returns false if the flag is unknown.
    fn apply_flag(&mut self, flag: &str) -> bool {
        match flag {
            "primary_key" | "primarykey" | "pk" => self.primary_key = true,
            "auto_increment" | "autoincrement" => self.auto_increment = true,
            "unique" => self.unique = true,
            "not_null" | "notnull" | "not_nil" | "notnil" => self.not_null = true,
            "nullable" => self.nullable = true,
            "auto_create_time" | "autocreatetime" | "auto_update_time" | "autoupdatetime" => {
                self.auto_time = true;
            }
            "index" => self.index = Some(IndexName::Auto),
            _ => return false,
        }
        true
    }

    /// Legacy attributes spell flags as `primaryKey = "true"`.
    fn apply_legacy_flag(&mut self, field: &str, key: &str, value: &str) -> bool {
        let mut probe = Self::default();
        if !probe.apply_flag(key) {
            return false;
        }
        match parse_bool(value) {
            Some(true) => {
                self.apply_flag(key);
            }
            Some(false) => {}
            None => warn!(field, key, value, "Invalid flag value in tag, skipping"),
        }
        true
    }
}

/// Splits a structured tag on commas that are not inside parentheses or a
/// quoted value.
///
/// A quote only opens a value when it follows `key:`, so `default:don't`
/// keeps its apostrophe. Inside a quoted value `''` is an escaped quote.
fn split_tag(tag: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_u32;
    let mut in_quote = false;
    let mut prev = None;
    let mut start = 0;
    let mut chars = tag.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if in_quote {
            if c == '\'' {
                if chars.peek().is_some_and(|&(_, next)| next == '\'') {
                    chars.next();
                } else {
                    in_quote = false;
                    prev = Some(c);
                }
            }
            continue;
        }
        match c {
            '\'' if prev == Some(':') => in_quote = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' | ';' if depth == 0 => {
                parts.push(&tag[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        if !c.is_whitespace() {
            prev = Some(c);
        }
    }
    parts.push(&tag[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_number(field: &str, key: &str, value: &str) -> Option<u32> {
    match value.trim().parse::<u32>() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(field, key, value, "Invalid number in tag, skipping");
            None
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Strips one pair of surrounding single quotes and unescapes `''`.
fn unquote(value: &str) -> String {
    let v = value.trim();
    match quoted_inner(v) {
        Some(inner) => inner.replace("''", "'"),
        None => v.to_string(),
    }
}

fn quoted_inner(value: &str) -> Option<&str> {
    value.strip_prefix('\'')?.strip_suffix('\'')
}

fn collect_settings(field: &FieldDescriptor) -> TagSettings {
    let mut settings = TagSettings::default();

    if let Some(tag) = &field.tag {
        for token in split_tag(tag) {
            let known = match token.split_once(':') {
                Some((key, value)) => {
                    settings.apply_value(&field.name, &key.trim().to_ascii_lowercase(), value)
                }
                None => settings.apply_flag(&token.to_ascii_lowercase()),
            };
            if known {
                settings.recognized = true;
            } else {
                warn!(field = %field.name, token, "Unrecognized tag token, skipping");
            }
        }
    }

    for (key, value) in &field.attrs {
        let key = legacy_key(key);
        if settings.apply_value(&field.name, &key, value) {
            settings.recognized = true;
        }
    }

    settings
}

/// Legacy attribute names are camelCase (`primaryKey`, `autoIncrement`,
/// `notNull`); the structured keys are their snake_case spelling.
fn legacy_key(key: &str) -> String {
    to_snake_case(key.trim())
}

fn analyze_field(field: &FieldDescriptor) -> Option<ModelColumn> {
    let settings = collect_settings(field);
    if !settings.recognized {
        return None;
    }

    let inferred = infer_type(&field.rust_type);
    let mut sql_type = settings.sql_type.unwrap_or(inferred);
    if let Some(size) = settings.size {
        sql_type = sql_type.with_length(size);
    }
    if let SqlType::Decimal(p, s) = sql_type {
        sql_type = SqlType::Decimal(settings.precision.unwrap_or(p), settings.scale.unwrap_or(s));
    }

    let name = settings
        .column
        .clone()
        .unwrap_or_else(|| to_snake_case(&field.name));

    let mut column = ModelColumn::new(name, sql_type);
    column.primary_key = settings.primary_key;
    column.auto_increment = settings.auto_increment;
    column.unique = settings.unique;
    column.not_null = settings.not_null || settings.primary_key;
    column.default = settings.default;
    column.comment = settings.comment;
    column.index = settings.index;

    if settings.auto_time {
        column.not_null = true;
        column.default = Some("CURRENT_TIMESTAMP".to_string());
    }
    if settings.nullable {
        column.not_null = false;
    }

    Some(column)
}

/// Infers the canonical type of a Rust type written as source text.
///
/// `Option<T>` and smart pointers resolve to `T`; collections and unknown
/// types fall back to JSON.
#[must_use]
pub fn infer_type(rust_type: &str) -> SqlType {
    let ty: String = rust_type.chars().filter(|c| !c.is_whitespace()).collect();
    let ty = ty.trim_start_matches('&').trim_start_matches("'static");

    if let Some(inner) = generic_arg(ty, &["Option", "Box", "Arc", "Rc"]) {
        return infer_type(inner);
    }
    if let Some(inner) = generic_arg(ty, &["Vec"]) {
        return if last_segment(inner) == "u8" {
            SqlType::Blob
        } else {
            SqlType::Json
        };
    }
    if ty.starts_with("[u8;") || ty == "[u8]" {
        return SqlType::Blob;
    }

    match last_segment(ty) {
        "String" | "str" | "Cow<str>" => SqlType::Varchar(255),
        "char" => SqlType::Char(1),
        "i8" | "u8" => SqlType::TinyInt,
        "i16" | "u16" => SqlType::SmallInt,
        "i32" | "u32" => SqlType::Int,
        "i64" | "u64" | "isize" | "usize" | "i128" | "u128" => SqlType::BigInt,
        "f32" => SqlType::Float,
        "f64" => SqlType::Double,
        "bool" => SqlType::Boolean,
        "NaiveDateTime" | "SystemTime" | "OffsetDateTime" | "PrimitiveDateTime" => {
            SqlType::DateTime
        }
        s if s.starts_with("DateTime") => SqlType::DateTime,
        "NaiveDate" | "Date" => SqlType::Date,
        "NaiveTime" | "Time" => SqlType::Time,
        "Bytes" | "ByteBuf" => SqlType::Blob,
        "Decimal" | "BigDecimal" => SqlType::Decimal(10, 2),
        _ => SqlType::Json,
    }
}

/// Returns `T` if `ty` is `Wrapper<T>` for one of the given wrappers.
fn generic_arg<'a>(ty: &'a str, wrappers: &[&str]) -> Option<&'a str> {
    let open = ty.find('<')?;
    if !ty.ends_with('>') {
        return None;
    }
    let head = last_segment(&ty[..open]);
    if wrappers.contains(&head) {
        Some(&ty[open + 1..ty.len() - 1])
    } else {
        None
    }
}

/// Strips a path prefix: `chrono::NaiveDateTime` -> `NaiveDateTime`.
fn last_segment(ty: &str) -> &str {
    let head_end = ty.find('<').unwrap_or(ty.len());
    match ty[..head_end].rfind("::") {
        Some(pos) => &ty[pos + 2..],
        None => ty,
    }
}

/// Converts a field name to snake_case, keeping acronyms together:
/// `ID` -> `id`, `APIKey` -> `api_key`, `UserURL` -> `user_url`.
#[must_use]
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// Normalizes a default value from a tag into a SQL literal.
///
/// `null` -> `NULL`, `true`/`false` -> `1`/`0`, numbers pass through,
/// `current_timestamp`/`now()` -> `CURRENT_TIMESTAMP`. A quoted literal is
/// kept when its inner quotes are already doubled; otherwise its content,
/// like any other value, is single-quoted with embedded quotes doubled.
#[must_use]
pub fn normalize_default(value: &str) -> String {
    let v = value.trim();
    match v.to_ascii_lowercase().as_str() {
        "null" => return "NULL".to_string(),
        "true" => return "1".to_string(),
        "false" => return "0".to_string(),
        "current_timestamp" | "current_timestamp()" | "now()" => {
            return "CURRENT_TIMESTAMP".to_string();
        }
        _ => {}
    }

    if is_numeric_literal(v) {
        return v.to_string();
    }
    let content = match quoted_inner(v) {
        Some(inner) if !inner.replace("''", "").contains('\'') => return v.to_string(),
        Some(inner) => inner,
        None => v,
    };

    format!("'{}'", content.replace('\'', "''"))
}
