//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection errors.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for schema introspection errors.
pub const EXIT_SCHEMA_ERROR: u8 = 3;
/// Exit code for target DDL errors.
pub const EXIT_DDL_ERROR: u8 = 4;
/// Exit code for transfer errors.
pub const EXIT_TRANSFER_ERROR: u8 = 5;
/// Exit code for a cancelled run.
pub const EXIT_CANCELLED: u8 = 6;
/// Exit code for IO errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code for anything else.
pub const EXIT_OTHER: u8 = 8;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection could not be established or was lost.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Source table metadata could not be read.
    #[error("Schema error for table {table}: {message}")]
    Schema { table: String, message: String },

    /// Target DROP/CREATE failed.
    #[error("DDL failed for table {table}: {message}")]
    Ddl { table: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database statement or insert error
    #[error("Target database error: {0}")]
    Target(String),

    /// Task ledger error
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Notification delivery error
    #[error("Notification error: {0}")]
    Notify(String),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Schema error
    pub fn schema(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Schema {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a DDL error
    pub fn ddl(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Ddl {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error ends the whole run regardless of `continue_on_error`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::Connection { .. } | MigrateError::Config(_) | MigrateError::Cancelled
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Schema { .. } => EXIT_SCHEMA_ERROR,
            MigrateError::Ddl { .. } => EXIT_DDL_ERROR,
            MigrateError::Transfer { .. } | MigrateError::Source(_) | MigrateError::Target(_) => {
                EXIT_TRANSFER_ERROR
            }
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Ledger(_) | MigrateError::Notify(_) | MigrateError::Json(_) => EXIT_OTHER,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_table_errors_are_not_fatal() {
        assert!(!MigrateError::schema("t", "missing").is_fatal());
        assert!(!MigrateError::ddl("t", "bad").is_fatal());
        assert!(!MigrateError::transfer("t", "broken pipe").is_fatal());
    }

    #[test]
    fn test_connection_and_cancel_are_fatal() {
        assert!(MigrateError::connection("refused", "connecting").is_fatal());
        assert!(MigrateError::Cancelled.is_fatal());
        assert!(MigrateError::Config("x".into()).is_fatal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::connection("x", "y").exit_code(),
            EXIT_CONNECTION_ERROR
        );
        assert_eq!(MigrateError::transfer("t", "x").exit_code(), EXIT_TRANSFER_ERROR);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::schema("orders", "table does not exist");
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Schema error for table orders"));
    }
}
