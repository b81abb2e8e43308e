//! PostgreSQL backend (server → client) messages.

pub mod copy;
pub mod error;
pub mod function;
pub mod query;
pub mod status;

pub use copy::{CopyInResponse, CopyOutResponse};
pub use error::{ErrorResponse, NoticeResponse};
pub use function::FunctionCallResponse;
pub use query::CommandComplete;
pub use status::{NotificationResponse, ParameterStatus, ReadyForQuery};

/// Backend message type bytes.
pub mod msg_type {
    /// ParameterStatus
    pub const PARAMETER_STATUS: u8 = b'S';
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// NotificationResponse
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    /// CopyInResponse
    pub const COPY_IN_RESPONSE: u8 = b'G';
    /// CopyOutResponse
    pub const COPY_OUT_RESPONSE: u8 = b'H';
    /// CopyData
    pub const COPY_DATA: u8 = b'd';
    /// CopyDone
    pub const COPY_DONE: u8 = b'c';
    /// FunctionCallResponse
    pub const FUNCTION_CALL_RESPONSE: u8 = b'V';
    /// RowDescription (seen when the issued statement was not a COPY)
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// DataRow (seen when the issued statement was not a COPY)
    pub const DATA_ROW: u8 = b'D';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
}

/// Check if a type byte represents an asynchronous message, one the server
/// may inject between any two messages of a response stream.
pub fn is_async_type(type_byte: u8) -> bool {
    matches!(
        type_byte,
        msg_type::NOTICE_RESPONSE | msg_type::NOTIFICATION_RESPONSE | msg_type::PARAMETER_STATUS
    )
}
