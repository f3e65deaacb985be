//! Error types for pgcrud

use crate::statement::StatementKind;
use thiserror::Error;

/// Result type alias for compiling a request into SQL.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result type alias for pgcrud operations that touch the database.
pub type CrudResult<T> = Result<T, CrudError>;

/// A malformed request, detected before any SQL executes.
///
/// Every variant names the field or clause that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Schema, table or column name outside the identifier allow-list.
    #[error("Invalid identifier in '{field}': {value:?}")]
    InvalidIdentifier { field: String, value: String },

    /// Unknown key inside a filter operator object.
    #[error("Invalid operator '{operator}' on filter column '{column}'")]
    InvalidOperator { column: String, operator: String },

    /// Filter value that is neither a scalar, a list nor an operator object.
    #[error("Invalid filter value for column '{column}': {message}")]
    InvalidFilterValue { column: String, message: String },

    /// Both `include_fields` and `exclude_fields` were given.
    #[error("include_fields and exclude_fields are mutually exclusive")]
    AmbiguousFieldSelection,

    /// `exclude_fields` needs the table's column list, which was not supplied.
    #[error("Column list for '{table}' is required to apply exclude_fields")]
    ColumnsUnresolved { table: String },

    /// Field selection left nothing to select.
    #[error("Field selection for '{table}' leaves no columns")]
    EmptySelection { table: String },

    /// Create/update without any column.
    #[error("Empty mutation payload in '{field}'")]
    EmptyMutationPayload { field: String },

    /// Join type other than INNER/LEFT/RIGHT/FULL.
    #[error("Unsupported join type '{join_type}' for table '{table}'")]
    UnsupportedJoinType { table: String, join_type: String },

    /// Join condition containing characters outside the relaxed allow-list.
    #[error("Invalid join condition for table '{table}': {on:?}")]
    InvalidJoinCondition { table: String, on: String },

    /// LIMIT above the allowed maximum.
    #[error("Invalid pagination '{field}': {message}")]
    InvalidPagination { field: String, message: String },

    /// Password hashing requested without a usable salt.
    #[error("Salt field '{salt_field}' is required for password hashing")]
    MissingSalt { salt_field: String },

    /// Data-modifying statement sent with `read_only = true`.
    #[error("Statement starting with '{keyword}' is not allowed with read_only")]
    ReadOnlyViolation { keyword: String },

    /// Placeholder count and bound parameter count differ.
    #[error("Query has {placeholders} placeholder(s) but {params} parameter(s)")]
    ParameterCountMismatch { placeholders: usize, params: usize },

    /// A bulk record without the expected shape.
    #[error("Invalid bulk record #{index}: {message}")]
    InvalidBulkRecord { index: usize, message: String },
}

impl CompileError {
    pub(crate) fn invalid_identifier(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Name of the request field this error refers to.
    pub fn field(&self) -> &str {
        match self {
            Self::InvalidIdentifier { field, .. } => field,
            Self::InvalidOperator { column, .. } | Self::InvalidFilterValue { column, .. } => {
                column
            }
            Self::AmbiguousFieldSelection => "include_fields",
            Self::ColumnsUnresolved { .. } | Self::EmptySelection { .. } => "exclude_fields",
            Self::EmptyMutationPayload { field } => field,
            Self::UnsupportedJoinType { .. } => "joins.type",
            Self::InvalidJoinCondition { .. } => "joins.on",
            Self::InvalidPagination { field, .. } => field,
            Self::MissingSalt { salt_field } => salt_field,
            Self::ReadOnlyViolation { .. } => "query",
            Self::ParameterCountMismatch { .. } => "params",
            Self::InvalidBulkRecord { .. } => "records",
        }
    }
}

/// Coarse error classes for mapping onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request was malformed (400-class).
    Validation,
    /// The database rejected the statement (500-class).
    Execution,
    /// The database could not be reached (503-class).
    Unavailable,
}

/// Error types for database operations
#[derive(Debug, Error)]
pub enum CrudError {
    /// Request failed to compile
    #[error(transparent)]
    Validation(#[from] CompileError),

    /// Statement compiled but the configured safety policy rejected it
    #[error("Policy violation: {kind} without filters affects every row")]
    PolicyViolation { kind: StatementKind },

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// NOT NULL constraint violation
    #[error("Not null violation: {0}")]
    NotNullViolation(String),

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Query timeout error
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CrudError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if the request itself was malformed
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::PolicyViolation { .. })
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Classify the error for the transport layer.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) | Self::PolicyViolation { .. } => ErrorClass::Validation,
            Self::Connection(_) | Self::Timeout(_) => ErrorClass::Unavailable,
            #[cfg(feature = "pool")]
            Self::Pool(_) => ErrorClass::Unavailable,
            Self::Query(err) if err.is_closed() => ErrorClass::Unavailable,
            _ => ErrorClass::Execution,
        }
    }

    /// Message safe to hand back to a client.
    ///
    /// Driver text carries SQL and schema details, so it is only exposed when
    /// `expose_driver_text` is set (the raw-query surface).
    pub fn client_message(&self, expose_driver_text: bool) -> String {
        match self {
            Self::Validation(_) | Self::PolicyViolation { .. } => self.to_string(),
            _ if expose_driver_text => self.to_string(),
            Self::UniqueViolation(_) => "unique constraint violation".to_string(),
            Self::ForeignKeyViolation(_) => "foreign key violation".to_string(),
            Self::CheckViolation(_) => "check constraint violation".to_string(),
            Self::NotNullViolation(_) => "not null violation".to_string(),
            Self::Timeout(d) => format!("query timed out after {d:?}"),
            _ => match self.class() {
                ErrorClass::Unavailable => "database unavailable".to_string(),
                _ => "database error".to_string(),
            },
        }
    }

    /// Parse a tokio_postgres error into a more specific CrudError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                "23502" => {
                    let column = db_err.column().unwrap_or("unknown");
                    return Self::NotNullViolation(format!("{}: {}", column, message));
                }
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for CrudError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
