//! Column model types.
//!
//! [`ModelColumn`] describes what the code expects, [`DatabaseColumn`] what
//! introspection found, and [`ColumnDifference`] one change between the two.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical, dialect-agnostic column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    BigInt,
    /// 16-bit integer.
    SmallInt,
    /// 8-bit integer.
    TinyInt,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Fixed point with precision and scale.
    Decimal(u32, u32),
    /// Variable-length string with a maximum length.
    Varchar(u32),
    /// Fixed-length string.
    Char(u32),
    /// Unbounded text.
    Text,
    /// Large text (`LONGTEXT` where the dialect distinguishes it).
    LongText,
    /// Date and time.
    DateTime,
    /// Timestamp.
    Timestamp,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Boolean.
    Boolean,
    /// Binary large object.
    Blob,
    /// JSON document.
    Json,
}

impl SqlType {
    /// Declared length for character types.
    #[must_use]
    pub const fn length(&self) -> Option<u32> {
        match self {
            Self::Varchar(len) | Self::Char(len) => Some(*len),
            _ => None,
        }
    }

    /// Declared precision for decimal types.
    #[must_use]
    pub const fn precision(&self) -> Option<u32> {
        match self {
            Self::Decimal(p, _) => Some(*p),
            _ => None,
        }
    }

    /// Declared scale for decimal types.
    #[must_use]
    pub const fn scale(&self) -> Option<u32> {
        match self {
            Self::Decimal(_, s) => Some(*s),
            _ => None,
        }
    }

    /// Returns true for the integer family.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int | Self::BigInt | Self::SmallInt | Self::TinyInt
        )
    }

    /// Returns a copy with the character length replaced. Other types are
    /// returned unchanged.
    #[must_use]
    pub const fn with_length(self, length: u32) -> Self {
        match self {
            Self::Varchar(_) => Self::Varchar(length),
            Self::Char(_) => Self::Char(length),
            other => other,
        }
    }

    /// Parses a type name as written in a tag (`varchar(100)`,
    /// `decimal(10,2)`, `bigint`, ...). Unknown names return `None`.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim().to_ascii_lowercase();
        let (base, params) = match spec.find('(') {
            Some(open) => {
                let close = spec.rfind(')')?;
                if close < open {
                    return None;
                }
                (spec[..open].trim(), Some(&spec[open + 1..close]))
            }
            None => (spec.as_str(), None),
        };
        let nums: Vec<u32> = match params {
            Some(p) => p
                .split(',')
                .map(|n| n.trim().parse::<u32>())
                .collect::<Result<_, _>>()
                .ok()?,
            None => Vec::new(),
        };
        let first = nums.first().copied();

        let ty = match base {
            "int" | "integer" | "int4" | "mediumint" => Self::Int,
            "bigint" | "int8" | "long" => Self::BigInt,
            "smallint" | "int2" => Self::SmallInt,
            "tinyint" => Self::TinyInt,
            "float" | "real" | "float4" => Self::Float,
            "double" | "double precision" | "float8" => Self::Double,
            "decimal" | "numeric" => Self::Decimal(
                first.unwrap_or(10),
                nums.get(1).copied().unwrap_or(if first.is_some() { 0 } else { 2 }),
            ),
            "varchar" | "string" | "character varying" => Self::Varchar(first.unwrap_or(255)),
            "char" | "character" => Self::Char(first.unwrap_or(1)),
            "text" | "mediumtext" | "clob" => Self::Text,
            "longtext" => Self::LongText,
            "datetime" => Self::DateTime,
            "timestamp" | "timestamptz" => Self::Timestamp,
            "date" => Self::Date,
            "time" => Self::Time,
            "bool" | "boolean" => Self::Boolean,
            "blob" | "bytes" | "binary" | "bytea" | "varbinary" | "longblob" => Self::Blob,
            "json" | "jsonb" => Self::Json,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("INT"),
            Self::BigInt => f.write_str("BIGINT"),
            Self::SmallInt => f.write_str("SMALLINT"),
            Self::TinyInt => f.write_str("TINYINT"),
            Self::Float => f.write_str("FLOAT"),
            Self::Double => f.write_str("DOUBLE"),
            Self::Decimal(p, s) => write!(f, "DECIMAL({p},{s})"),
            Self::Varchar(len) => write!(f, "VARCHAR({len})"),
            Self::Char(len) => write!(f, "CHAR({len})"),
            Self::Text => f.write_str("TEXT"),
            Self::LongText => f.write_str("LONGTEXT"),
            Self::DateTime => f.write_str("DATETIME"),
            Self::Timestamp => f.write_str("TIMESTAMP"),
            Self::Date => f.write_str("DATE"),
            Self::Time => f.write_str("TIME"),
            Self::Boolean => f.write_str("BOOLEAN"),
            Self::Blob => f.write_str("BLOB"),
            Self::Json => f.write_str("JSON"),
        }
    }
}

/// Index requested by a column tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexName {
    /// Plain `index` flag; the name is derived from table and column.
    Auto,
    /// `index:name`.
    Named(String),
}

impl IndexName {
    /// Resolves the index name for a column of a table.
    #[must_use]
    pub fn resolve(&self, table: &str, column: &str) -> String {
        match self {
            Self::Auto => format!("idx_{table}_{column}"),
            Self::Named(name) => name.clone(),
        }
    }
}

/// Canonical description of one model field as a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelColumn {
    /// Column name.
    pub name: String,
    /// Canonical type.
    pub sql_type: SqlType,
    /// Whether the column rejects NULL.
    pub not_null: bool,
    /// Whether the column is (part of) the primary key.
    pub primary_key: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Whether the column has a UNIQUE constraint.
    pub unique: bool,
    /// Normalized default literal (`NULL`, `1`, `'text'`, `CURRENT_TIMESTAMP`).
    pub default: Option<String>,
    /// Column comment.
    pub comment: Option<String>,
    /// Index to create on this column.
    pub index: Option<IndexName>,
}

impl ModelColumn {
    /// Creates a nullable column with no constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            not_null: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default: None,
            comment: None,
            index: None,
        }
    }

    /// Declared length, if the type has one.
    #[must_use]
    pub const fn length(&self) -> Option<u32> {
        self.sql_type.length()
    }

    /// Declared precision, if the type has one.
    #[must_use]
    pub const fn precision(&self) -> Option<u32> {
        self.sql_type.precision()
    }

    /// Declared scale, if the type has one.
    #[must_use]
    pub const fn scale(&self) -> Option<u32> {
        self.sql_type.scale()
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the column as nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.not_null = false;
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default literal. The value is used verbatim, so it must
    /// already be valid SQL (see [`crate::model::normalize_default`]).
    #[must_use]
    pub fn default_literal(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Requests an index named after the table and column.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.index = Some(IndexName::Auto);
        self
    }

    /// Requests a named index.
    #[must_use]
    pub fn index_named(mut self, name: impl Into<String>) -> Self {
        self.index = Some(IndexName::Named(name.into()));
        self
    }
}

/// A column as reported by introspecting a live table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseColumn {
    /// Column name.
    pub name: String,
    /// Type as reported by the database (`VARCHAR(50)`, `character varying`, ...).
    pub raw_type: String,
    /// Character length, if reported.
    pub length: Option<u32>,
    /// Numeric precision, if reported.
    pub precision: Option<u32>,
    /// Numeric scale, if reported.
    pub scale: Option<u32>,
    /// Whether the column rejects NULL.
    pub not_null: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Whether a single-column unique constraint covers the column.
    pub unique: bool,
    /// Default expression as reported (dialect syntax, not normalized).
    pub default: Option<String>,
    /// Column comment.
    pub comment: Option<String>,
}

impl DatabaseColumn {
    /// Creates a column with only a name and a raw type.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
            ..Self::default()
        }
    }
}

/// Kind of a detected difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    /// Column exists in the model only.
    Add,
    /// Column exists in both but differs.
    Modify,
    /// Column exists in the database only.
    Drop,
}

impl DiffKind {
    /// Lower-case name used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Drop => "drop",
        }
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aspect of a column that differs between model and database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnChange {
    /// Base type changed.
    Type,
    /// Character length changed.
    Length,
    /// Decimal precision or scale changed.
    Precision,
    /// NULL / NOT NULL changed.
    NotNull,
    /// UNIQUE constraint added or removed.
    Unique,
    /// Default changed.
    Default,
    /// Comment changed.
    Comment,
}

/// One detected add, modify or drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDifference {
    /// Column name.
    pub column: String,
    /// Kind of difference.
    pub kind: DiffKind,
    /// Database side; `None` for additions.
    pub old: Option<DatabaseColumn>,
    /// Model side; `None` for drops.
    pub new: Option<ModelColumn>,
    /// Human-readable explanation.
    pub reason: String,
    /// Aspects that changed (modify only).
    pub changes: Vec<ColumnChange>,
}

impl ColumnDifference {
    /// A column present in the model but missing in the database.
    #[must_use]
    pub fn add(column: ModelColumn) -> Self {
        Self {
            column: column.name.clone(),
            kind: DiffKind::Add,
            old: None,
            new: Some(column),
            reason: "column missing from database".to_string(),
            changes: Vec::new(),
        }
    }

    /// A column present in the database but not in the model.
    #[must_use]
    pub fn drop(column: DatabaseColumn) -> Self {
        Self {
            column: column.name.clone(),
            kind: DiffKind::Drop,
            old: Some(column),
            new: None,
            reason: "column not present in model".to_string(),
            changes: Vec::new(),
        }
    }

    /// A column that differs; `reasons` are joined with `"; "`.
    #[must_use]
    pub fn modify(
        old: DatabaseColumn,
        new: ModelColumn,
        changes: Vec<ColumnChange>,
        reasons: &[String],
    ) -> Self {
        Self {
            column: new.name.clone(),
            kind: DiffKind::Modify,
            old: Some(old),
            new: Some(new),
            reason: reasons.join("; "),
            changes,
        }
    }

    /// Returns true if the given aspect changed.
    #[must_use]
    pub fn has_change(&self, change: ColumnChange) -> bool {
        self.changes.contains(&change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_column_builder() {
        let col = ModelColumn::new("id", SqlType::BigInt)
            .primary_key()
            .auto_increment();

        assert_eq!(col.name, "id");
        assert!(col.primary_key);
        assert!(col.auto_increment);
        assert!(col.not_null);
    }

    #[test]
    fn test_type_parameters() {
        assert_eq!(SqlType::Varchar(50).length(), Some(50));
        assert_eq!(SqlType::Decimal(12, 4).precision(), Some(12));
        assert_eq!(SqlType::Decimal(12, 4).scale(), Some(4));
        assert_eq!(SqlType::Text.length(), None);
        assert_eq!(SqlType::Varchar(50).with_length(100), SqlType::Varchar(100));
        assert_eq!(SqlType::Text.with_length(100), SqlType::Text);
    }

    #[test]
    fn test_parse_type_names() {
        assert_eq!(SqlType::parse("varchar(100)"), Some(SqlType::Varchar(100)));
        assert_eq!(SqlType::parse("VARCHAR"), Some(SqlType::Varchar(255)));
        assert_eq!(SqlType::parse("decimal(10,2)"), Some(SqlType::Decimal(10, 2)));
        assert_eq!(SqlType::parse("decimal"), Some(SqlType::Decimal(10, 2)));
        assert_eq!(SqlType::parse("numeric(8)"), Some(SqlType::Decimal(8, 0)));
        assert_eq!(SqlType::parse("longtext"), Some(SqlType::LongText));
        assert_eq!(SqlType::parse("jsonb"), Some(SqlType::Json));
        assert_eq!(SqlType::parse("varchar(abc)"), None);
        assert_eq!(SqlType::parse("geometry"), None);
    }

    #[test]
    fn test_index_name_resolution() {
        assert_eq!(IndexName::Auto.resolve("users", "email"), "idx_users_email");
        assert_eq!(
            IndexName::Named("by_email".to_string()).resolve("users", "email"),
            "by_email"
        );
    }
}
