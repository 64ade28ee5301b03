//! Error types for the migration engine.

/// Errors that can occur while analysing, diffing or migrating a schema.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The table does not exist (or the name was empty).
    #[error("Table not found: '{0}'")]
    TableNotFound(String),

    /// Introspection returned something the engine cannot interpret.
    #[error("Failed to introspect table '{table}': {message}")]
    Introspection {
        /// Table being introspected.
        table: String,
        /// What went wrong.
        message: String,
    },

    /// The dialect cannot apply the change in place; the table has to be
    /// rebuilt by hand.
    #[error("Cannot {operation} column '{column}' of '{table}' in place: table recreation required")]
    RequiresRecreate {
        /// Table being altered.
        table: String,
        /// Column that cannot be changed.
        column: String,
        /// The refused operation ("modify", "drop", ...).
        operation: String,
    },

    /// The dialect has no way to express the operation at all.
    #[error("Unsupported operation on '{table}.{column}': {message}")]
    Unsupported {
        /// Table being altered.
        table: String,
        /// Column involved.
        column: String,
        /// Explanation.
        message: String,
    },

    /// A statement failed outside of a safe migration.
    #[error("Statement failed: {message}\n  SQL: {statement}")]
    Execution {
        /// The failing statement.
        statement: String,
        /// Driver error text.
        message: String,
    },

    /// The backup table could not be created or restored.
    #[error("Backup of '{table}' failed: {message}")]
    BackupFailed {
        /// Table being backed up or restored.
        table: String,
        /// Driver error text.
        message: String,
    },

    /// The ledger table is absent and automatic creation is disabled.
    #[error("Migration ledger table '{0}' does not exist and auto-create is disabled")]
    LedgerMissing(String),

    /// The ledger table could not be read or written.
    #[error("Migration ledger '{table}' error: {message}")]
    Ledger {
        /// Ledger table name.
        table: String,
        /// Driver error text.
        message: String,
    },

    /// A versioned migration failed while running.
    #[error("Migration '{version}' failed: {message}")]
    MigrationFailed {
        /// Version of the failing migration.
        version: String,
        /// Error text.
        message: String,
    },

    /// A ledger row refers to a migration that is not registered.
    #[error("Migration not registered: {0}")]
    MigrationNotFound(String),

    /// Two registered migrations share a version.
    #[error("Duplicate migration version: {0}")]
    DuplicateVersion(String),

    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
