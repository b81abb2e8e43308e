//! Error types for pg-extras.

use thiserror::Error;

/// Result type for pg-extras operations.
pub type Result<T> = core::result::Result<T, Error>;

/// SQLSTATE for `undefined_object` (e.g. opening a nonexistent large object).
pub const SQLSTATE_UNDEFINED_OBJECT: &str = "42704";
/// SQLSTATE for `insufficient_privilege`.
pub const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";
/// SQLSTATE for `object_in_use` (e.g. unlinking a large object that is open).
pub const SQLSTATE_OBJECT_IN_USE: &str = "55006";

/// PostgreSQL error/notice field types.
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Position in internal query
    pub internal_position: Option<u32>,
    /// Failed internal command text
    pub internal_query: Option<String>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file name
    pub file: Option<String>,
    /// Source line number
    pub line: Option<u32>,
    /// Source routine name
    pub routine: Option<String>,
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{severity}: ")?;
        }
        if let Some(message) = &self.message {
            write!(f, "{message}")?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {code})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

/// Error type for pg-extras.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response
    #[error("PostgreSQL error: {0}")]
    Server(ErrorFields),

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection is broken and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,

    /// Invalid usage (e.g., large-object call outside a transaction)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Large-object handle whose owning transaction has ended
    #[error("Invalid large-object handle: {0}")]
    InvalidHandle(String),

    /// A value cannot be represented in the COPY text format
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Unsupported feature (e.g., binary COPY format)
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionBroken => true,
            Error::Server(fields) => {
                // FATAL and PANIC errors indicate connection is broken
                matches!(fields.severity.as_deref(), Some("FATAL") | Some("PANIC"))
            }
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code.as_deref(),
            _ => None,
        }
    }

    /// Returns true if the server rejected a reference to a nonexistent object
    /// (SQLSTATE 42704), e.g. opening or unlinking a missing large object.
    pub fn is_undefined_object(&self) -> bool {
        self.sqlstate() == Some(SQLSTATE_UNDEFINED_OBJECT)
    }

    /// Returns true if the server rejected the operation due to insufficient
    /// privileges (SQLSTATE 42501).
    pub fn is_insufficient_privilege(&self) -> bool {
        self.sqlstate() == Some(SQLSTATE_INSUFFICIENT_PRIVILEGE)
    }

    /// Returns true if the server reported an in-use conflict (SQLSTATE 55006),
    /// e.g. unlinking a large object while a descriptor to it is open.
    pub fn is_object_in_use(&self) -> bool {
        self.sqlstate() == Some(SQLSTATE_OBJECT_IN_USE)
    }
}
