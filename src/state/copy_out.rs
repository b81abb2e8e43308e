//! COPY TO STDOUT state machine.
//!
//! Drives one copy-out exchange: Query → CopyOutResponse → CopyData frames →
//! CopyDone → CommandComplete → ReadyForQuery. Each CopyData payload is
//! handed to the caller as [`Action::CopyChunk`].
//!
//! As with copy-in, server errors are recorded and the stream is drained to
//! ReadyForQuery before the error is surfaced from `take_result`.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::backend::{CommandComplete, CopyOutResponse, ErrorResponse, ReadyForQuery, msg_type};
use crate::protocol::frontend::write_query;
use crate::protocol::types::TransactionStatus;

use super::action::Action;
use super::parse_async_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingCopyOutResponse,
    Receiving,
    WaitingCompletion,
    Finished,
}

/// COPY TO STDOUT state machine.
pub struct CopyOutStateMachine {
    state: State,
    write_buffer: Vec<u8>,
    rows_affected: Option<u64>,
    pending_error: Option<Error>,
    /// When set, CopyData frames are discarded instead of delivered
    /// (binary-format refusal: the stream must still be consumed).
    discarding: bool,
    transaction_status: TransactionStatus,
}

impl CopyOutStateMachine {
    /// Create a new copy-out state machine.
    pub fn new() -> Self {
        Self {
            state: State::Initial,
            write_buffer: Vec::new(),
            rows_affected: None,
            pending_error: None,
            discarding: false,
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// Get the transaction status from the final ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Take the outcome after `step` returned [`Action::Finished`].
    pub fn take_result(&mut self) -> Result<u64> {
        match self.pending_error.take() {
            Some(e) => Err(e),
            None => Ok(self.rows_affected.unwrap_or(0)),
        }
    }

    /// Start the exchange by issuing the COPY statement.
    pub fn start(&mut self, sql: &str) -> Action<'_> {
        self.write_buffer.clear();
        write_query(&mut self.write_buffer, sql);
        self.state = State::WaitingCopyOutResponse;
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
            self.state = State::WaitingCompletion;
            return Ok(Action::NeedPacket);
        }

        match self.state {
            State::WaitingCopyOutResponse => self.handle_copy_out_response(buffer_set),
            State::Receiving => self.handle_data(buffer_set),
            State::WaitingCompletion => self.handle_completion(buffer_set),
            _ => Err(Error::Protocol(format!(
                "Unexpected message '{}' in copy-out state {:?}",
                type_byte as char, self.state
            ))),
        }
    }

    fn handle_copy_out_response<'buf>(
        &'buf mut self,
        buffer_set: &'buf mut BufferSet,
    ) -> Result<Action<'buf>> {
        match buffer_set.type_byte {
            msg_type::COPY_OUT_RESPONSE => {
                let response = CopyOutResponse::parse(&buffer_set.read_buffer)?;
                if response.is_binary() {
                    // Cannot abort a copy-out from the frontend; consume the
                    // stream and surface the refusal at the end.
                    self.pending_error =
                        Some(Error::Unsupported("binary COPY format".into()));
                    self.discarding = true;
                }
                self.state = State::Receiving;
                Ok(Action::NeedPacket)
            }
            msg_type::COPY_IN_RESPONSE => Err(Error::Protocol(
                "server entered copy-in mode for a COPY TO statement".into(),
            )),
            msg_type::ROW_DESCRIPTION | msg_type::EMPTY_QUERY_RESPONSE => {
                if self.pending_error.is_none() {
                    self.pending_error = Some(Error::InvalidUsage(
                        "statement did not initiate COPY TO STDOUT".into(),
                    ));
                }
                self.state = State::WaitingCompletion;
                Ok(Action::NeedPacket)
            }
            other => Err(Error::Protocol(format!(
                "Unexpected message awaiting CopyOutResponse: '{}'",
                other as char
            ))),
        }
    }

    fn handle_data<'buf>(&'buf mut self, buffer_set: &'buf mut BufferSet) -> Result<Action<'buf>> {
        match buffer_set.type_byte {
            msg_type::COPY_DATA => {
                if self.discarding {
                    return Ok(Action::NeedPacket);
                }
                Ok(Action::CopyChunk(&buffer_set.read_buffer))
            }
            msg_type::COPY_DONE => {
                self.state = State::WaitingCompletion;
                Ok(Action::NeedPacket)
            }
            other => Err(Error::Protocol(format!(
                "Unexpected message in copy-out data stream: '{}'",
                other as char
            ))),
        }
    }

    fn handle_completion<'buf>(
        &'buf mut self,
        buffer_set: &'buf mut BufferSet,
    ) -> Result<Action<'buf>> {
        match buffer_set.type_byte {
            msg_type::COMMAND_COMPLETE => {
                let complete = CommandComplete::parse(&buffer_set.read_buffer)?;
                self.rows_affected = complete.rows_affected();
                Ok(Action::NeedPacket)
            }
            msg_type::ROW_DESCRIPTION | msg_type::DATA_ROW | msg_type::EMPTY_QUERY_RESPONSE => {
                Ok(Action::NeedPacket)
            }
            msg_type::READY_FOR_QUERY => {
                let ready = ReadyForQuery::parse(&buffer_set.read_buffer)?;
                self.transaction_status = ready.transaction_status().unwrap_or_default();
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            other => Err(Error::Protocol(format!(
                "Unexpected message awaiting COPY completion: '{}'",
                other as char
            ))),
        }
    }
}

impl Default for CopyOutStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(buffer_set: &mut BufferSet, type_byte: u8, payload: &[u8]) {
        buffer_set.type_byte = type_byte;
        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.extend_from_slice(payload);
    }

    #[test]
    fn test_happy_path_delivers_chunks() {
        let mut sm = CopyOutStateMachine::new();
        let mut buffers = BufferSet::new();

        assert!(matches!(sm.start("COPY t TO STDOUT"), Action::WritePacket(_)));

        msg(&mut buffers, b'H', &[0, 0, 1, 0, 0]);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));

        msg(&mut buffers, b'd', b"1\tone\n");
        match sm.step(&mut buffers).unwrap() {
            Action::CopyChunk(data) => assert_eq!(data, b"1\tone\n"),
            other => panic!("expected CopyChunk, got {other:?}"),
        }

        msg(&mut buffers, b'c', &[]);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));
        msg(&mut buffers, b'C', b"COPY 1\0");
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));
        msg(&mut buffers, b'Z', &[b'I']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));

        assert_eq!(sm.take_result().unwrap(), 1);
    }

    #[test]
    fn test_binary_stream_is_discarded_then_rejected() {
        let mut sm = CopyOutStateMachine::new();
        let mut buffers = BufferSet::new();

        sm.start("COPY t TO STDOUT (FORMAT binary)");
        msg(&mut buffers, b'H', &[1, 0, 1, 0, 1]);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));

        // Binary frames are consumed, not delivered
        msg(&mut buffers, b'd', b"PGCOPY\n\xff\r\n\0");
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));

        msg(&mut buffers, b'c', &[]);
        sm.step(&mut buffers).unwrap();
        msg(&mut buffers, b'C', b"COPY 1\0");
        sm.step(&mut buffers).unwrap();
        msg(&mut buffers, b'Z', &[b'I']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));

        assert!(matches!(sm.take_result(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_error_mid_stream_is_drained() {
        let mut sm = CopyOutStateMachine::new();
        let mut buffers = BufferSet::new();

        sm.start("COPY t TO STDOUT");
        msg(&mut buffers, b'H', &[0, 0, 1, 0, 0]);
        sm.step(&mut buffers).unwrap();

        msg(&mut buffers, b'd', b"1\tone\n");
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::CopyChunk(_)));

        msg(&mut buffers, b'E', b"SVERROR\0C57014\0Mcanceled\0\0");
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));
        msg(&mut buffers, b'Z', &[b'I']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));

        let err = sm.take_result().unwrap_err();
        assert_eq!(err.sqlstate(), Some("57014"));
    }
}
