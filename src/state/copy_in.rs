//! COPY FROM STDIN state machine.
//!
//! Drives one copy-in exchange: Query → CopyInResponse → CopyData frames →
//! CopyDone (or CopyFail) → CommandComplete → ReadyForQuery.
//!
//! Server errors are recorded and the machine keeps consuming messages until
//! ReadyForQuery, so a failed COPY never leaves the connection mid-exchange.
//! The recorded outcome is retrieved with [`CopyInStateMachine::take_result`].

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::backend::{CommandComplete, CopyInResponse, ErrorResponse, ReadyForQuery, msg_type};
use crate::protocol::frontend::{write_copy_data, write_copy_done, write_copy_fail, write_query};
use crate::protocol::types::TransactionStatus;

use super::action::Action;
use super::parse_async_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingCopyInResponse,
    Streaming,
    WaitingCompletion,
    Finished,
}

/// COPY FROM STDIN state machine.
pub struct CopyInStateMachine {
    state: State,
    write_buffer: Vec<u8>,
    rows_affected: Option<u64>,
    pending_error: Option<Error>,
    transaction_status: TransactionStatus,
}

impl CopyInStateMachine {
    /// Create a new copy-in state machine.
    pub fn new() -> Self {
        Self {
            state: State::Initial,
            write_buffer: Vec::new(),
            rows_affected: None,
            pending_error: None,
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// Get the transaction status from the final ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Returns true once copy-in mode is established and data may be pushed.
    pub fn is_streaming(&self) -> bool {
        self.state == State::Streaming
    }

    /// Take the outcome after `step` returned [`Action::Finished`]:
    /// the `COPY n` row count on success, the recorded error otherwise.
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
        self.state = State::WaitingCopyInResponse;
        Action::WritePacket(&self.write_buffer)
    }

    /// Frame a chunk of encoded row data as CopyData.
    ///
    /// Only valid while streaming.
    pub fn data(&mut self, chunk: &[u8]) -> Action<'_> {
        self.write_buffer.clear();
        write_copy_data(&mut self.write_buffer, chunk);
        Action::WritePacket(&self.write_buffer)
    }

    /// End the data stream successfully with CopyDone.
    pub fn finish(&mut self) -> Action<'_> {
        self.write_buffer.clear();
        write_copy_done(&mut self.write_buffer);
        self.state = State::WaitingCompletion;
        Action::WritePacket(&self.write_buffer)
    }

    /// Abort the data stream with CopyFail.
    ///
    /// The server will respond with an ErrorResponse for the COPY statement;
    /// that error is recorded and available from `take_result`.
    pub fn fail(&mut self, message: &str) -> Action<'_> {
        self.write_buffer.clear();
        write_copy_fail(&mut self.write_buffer, message);
        self.state = State::WaitingCompletion;
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
            // Keep consuming until ReadyForQuery
            self.state = State::WaitingCompletion;
            return Ok(Action::NeedPacket);
        }

        match self.state {
            State::WaitingCopyInResponse => self.handle_copy_in_response(buffer_set),
            State::WaitingCompletion => self.handle_completion(buffer_set),
            _ => Err(Error::Protocol(format!(
                "Unexpected message '{}' in copy-in state {:?}",
                type_byte as char, self.state
            ))),
        }
    }

    fn handle_copy_in_response<'buf>(
        &'buf mut self,
        buffer_set: &'buf mut BufferSet,
    ) -> Result<Action<'buf>> {
        match buffer_set.type_byte {
            msg_type::COPY_IN_RESPONSE => {
                let response = CopyInResponse::parse(&buffer_set.read_buffer)?;
                if response.is_binary() {
                    // This layer speaks text format only. Refuse cleanly so the
                    // server aborts instead of waiting for binary frames.
                    self.pending_error =
                        Some(Error::Unsupported("binary COPY format".into()));
                    return Ok(self.fail("binary COPY format is not supported"));
                }
                self.state = State::Streaming;
                Ok(Action::ReadyToSend)
            }
            msg_type::COPY_OUT_RESPONSE => Err(Error::Protocol(
                "server entered copy-out mode for a COPY FROM statement".into(),
            )),
            msg_type::ROW_DESCRIPTION | msg_type::EMPTY_QUERY_RESPONSE => {
                // The statement was not a COPY FROM after all. Record the
                // misuse and drain the ordinary result until ReadyForQuery.
                if self.pending_error.is_none() {
                    self.pending_error = Some(Error::InvalidUsage(
                        "statement did not initiate COPY FROM STDIN".into(),
                    ));
                }
                self.state = State::WaitingCompletion;
                Ok(Action::NeedPacket)
            }
            other => Err(Error::Protocol(format!(
                "Unexpected message awaiting CopyInResponse: '{}'",
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
            // Tolerated while draining a non-COPY statement's result
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

impl Default for CopyInStateMachine {
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
    fn test_happy_path() {
        let mut sm = CopyInStateMachine::new();
        let mut buffers = BufferSet::new();

        assert!(matches!(sm.start("COPY t FROM STDIN"), Action::WritePacket(_)));

        msg(&mut buffers, b'G', &[0, 0, 1, 0, 0]);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::ReadyToSend));
        assert!(sm.is_streaming());

        assert!(matches!(sm.data(b"a\n"), Action::WritePacket(_)));
        assert!(matches!(sm.finish(), Action::WritePacket(_)));

        msg(&mut buffers, b'C', b"COPY 1\0");
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));

        msg(&mut buffers, b'Z', &[b'T']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));
        assert_eq!(sm.take_result().unwrap(), 1);
        assert_eq!(sm.transaction_status(), TransactionStatus::InTransaction);
    }

    #[test]
    fn test_binary_format_is_refused_with_copy_fail() {
        let mut sm = CopyInStateMachine::new();
        let mut buffers = BufferSet::new();

        sm.start("COPY t FROM STDIN (FORMAT binary)");
        msg(&mut buffers, b'G', &[1, 0, 1, 0, 1]);

        // The machine answers with a CopyFail frame
        match sm.step(&mut buffers).unwrap() {
            Action::WritePacket(data) => assert_eq!(data[0], b'f'),
            other => panic!("expected WritePacket, got {other:?}"),
        }

        // Server aborts the COPY, then goes ready
        msg(&mut buffers, b'E', b"SVERROR\0C57014\0Mcanceled\0\0");
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));
        msg(&mut buffers, b'Z', &[b'I']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));

        // The original refusal wins over the server's abort response
        assert!(matches!(sm.take_result(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_server_error_is_drained_to_ready() {
        let mut sm = CopyInStateMachine::new();
        let mut buffers = BufferSet::new();

        sm.start("COPY missing FROM STDIN");
        msg(&mut buffers, b'E', b"SVERROR\0C42P01\0Mno such table\0\0");
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));
        msg(&mut buffers, b'Z', &[b'I']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));

        let err = sm.take_result().unwrap_err();
        assert_eq!(err.sqlstate(), Some("42P01"));
    }

    #[test]
    fn test_non_copy_statement_is_invalid_usage() {
        let mut sm = CopyInStateMachine::new();
        let mut buffers = BufferSet::new();

        sm.start("SELECT 1");
        msg(&mut buffers, b'T', &[0, 0]);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));
        msg(&mut buffers, b'D', &[0, 0]);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));
        msg(&mut buffers, b'C', b"SELECT 1\0");
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::NeedPacket));
        msg(&mut buffers, b'Z', &[b'I']);
        assert!(matches!(sm.step(&mut buffers).unwrap(), Action::Finished));

        assert!(matches!(sm.take_result(), Err(Error::InvalidUsage(_))));
    }

    #[test]
    fn test_notification_during_copy_is_surfaced() {
        let mut sm = CopyInStateMachine::new();
        let mut buffers = BufferSet::new();

        sm.start("COPY t FROM STDIN");

        let mut payload = 7_u32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"jobs\0\0");
        msg(&mut buffers, b'A', &payload);

        match sm.step(&mut buffers).unwrap() {
            Action::AsyncMessage(super::super::AsyncMessage::Notification { channel, .. }) => {
                assert_eq!(channel, "jobs");
            }
            other => panic!("expected AsyncMessage, got {other:?}"),
        }
    }
}
