//! Fast-path function-call state machine.
//!
//! One large-object operation maps to one exchange:
//! FunctionCall → FunctionCallResponse → ReadyForQuery.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::backend::{ErrorResponse, FunctionCallResponse, ReadyForQuery, msg_type};
use crate::protocol::frontend::write_function_call;
use crate::protocol::types::{Oid, TransactionStatus};

use super::action::Action;
use super::parse_async_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingResponse,
    WaitingReady,
    Finished,
}

/// Fast-path function-call state machine.
pub struct FunctionCallStateMachine {
    state: State,
    write_buffer: Vec<u8>,
    result: Option<Vec<u8>>,
    pending_error: Option<Error>,
    transaction_status: TransactionStatus,
}

impl FunctionCallStateMachine {
    /// Create a new function-call state machine.
    pub fn new() -> Self {
        Self {
            state: State::Initial,
            write_buffer: Vec::new(),
            result: None,
            pending_error: None,
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// Get the transaction status from the final ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Take the call result after `step` returned [`Action::Finished`]:
    /// the binary result bytes (`None` for a SQL NULL result) on success,
    /// the recorded server error otherwise.
    pub fn take_result(&mut self) -> Result<Option<Vec<u8>>> {
        match self.pending_error.take() {
            Some(e) => Err(e),
            None => Ok(self.result.take()),
        }
    }

    /// Start the call. All arguments are binary; `None` is NULL.
    pub fn start(&mut self, fn_oid: Oid, args: &[Option<&[u8]>]) -> Action<'_> {
        self.write_buffer.clear();
        write_function_call(&mut self.write_buffer, fn_oid, args);
        self.state = State::WaitingResponse;
        Action::WritePacket(&self.write_buffer)
    }

    /// Process a message from the server.
    pub fn step<'buf>(&'buf mut self, buffer_set: &'buf mut BufferSet) -> Result<Action<'buf>> {
        let type_byte = buffer_set.type_byte;

        if let Some(msg) = parse_async_message(type_byte, &buffer_set.read_buffer)? {
            return Ok(Action::AsyncMessage(msg));
        }

        if type_byte == msg_type::ERROR_RESPONSE {
            let error = ErrorResponse::parse(&buffer_set.read_buffer)?;
            if self.pending_error.is_none() {
                self.pending_error = Some(error.into_error());
            }
            self.state = State::WaitingReady;
            return Ok(Action::NeedPacket);
        }

        match (self.state, type_byte) {
            (State::WaitingResponse, msg_type::FUNCTION_CALL_RESPONSE) => {
                let response = FunctionCallResponse::parse(&buffer_set.read_buffer)?;
                self.result = response.value.map(<[u8]>::to_vec);
                self.state = State::WaitingReady;
                Ok(Action::NeedPacket)
            }
            (State::WaitingResponse | State::WaitingReady, msg_type::READY_FOR_QUERY) => {
                let ready = ReadyForQuery::parse(&buffer_set.read_buffer)?;
                self.transaction_status = ready.transaction_status().unwrap_or_default();
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            (state, other) => Err(Error::Protocol(format!(
                "Unexpected message '{}' in function-call state {:?}",
                other as char, state
            ))),
        }
    }
}

impl Default for FunctionCallStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
