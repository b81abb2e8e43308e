//! Sans-I/O state machines for the COPY and fast-path protocols.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! They produce `Action` values that tell the caller what to do next.

pub mod action;
pub mod copy_in;
pub mod copy_out;
pub mod function;

pub use action::{Action, AsyncMessage};
pub use copy_in::CopyInStateMachine;
pub use copy_out::CopyOutStateMachine;
pub use function::FunctionCallStateMachine;

use crate::error::{Error, Result};
use crate::protocol::backend::{
    NoticeResponse, NotificationResponse, ParameterStatus, is_async_type, msg_type,
};

/// Parse an asynchronous message, or return `None` if `type_byte` is not an
/// async type. Shared by every state machine: the server may inject these
/// between any two messages of a response stream.
pub(crate) fn parse_async_message(type_byte: u8, payload: &[u8]) -> Result<Option<AsyncMessage>> {
    if !is_async_type(type_byte) {
        return Ok(None);
    }
    match type_byte {
        msg_type::NOTIFICATION_RESPONSE => {
            let notification = NotificationResponse::parse(payload)?;
            Ok(Some(AsyncMessage::Notification {
                pid: notification.pid,
                channel: notification.channel.to_string(),
                payload: notification.payload.to_string(),
            }))
        }
        msg_type::NOTICE_RESPONSE => {
            let notice = NoticeResponse::parse(payload)?;
            Ok(Some(AsyncMessage::Notice(notice.fields)))
        }
        msg_type::PARAMETER_STATUS => {
            let param = ParameterStatus::parse(payload)?;
            Ok(Some(AsyncMessage::ParameterChanged {
                name: param.name.to_string(),
                value: param.value.to_string(),
            }))
        }
        _ => Err(Error::Protocol(format!(
            "Unknown async message type: '{}'",
            type_byte as char
        ))),
    }
}
