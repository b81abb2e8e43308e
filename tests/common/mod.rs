//! Scripted transport for driving sessions without a server.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use pg_extras::buffer_set::BufferSet;
use pg_extras::error::{Error, Result};
use pg_extras::{TransactionStatus, Transport};

/// A transport that replays a scripted sequence of backend messages and
/// records every frontend byte a session sends.
pub struct MockTransport {
    responses: VecDeque<(u8, Vec<u8>)>,
    /// Raw bytes the session wrote, in order.
    pub sent: Vec<u8>,
    /// Timeouts passed to `poll_readable`, in order.
    pub polls: Vec<Option<Duration>>,
    backend_pid: u32,
    transaction_status: TransactionStatus,
}

impl MockTransport {
    pub fn new(transaction_status: TransactionStatus) -> Self {
        Self {
            responses: VecDeque::new(),
            sent: Vec::new(),
            polls: Vec::new(),
            backend_pid: 4242,
            transaction_status,
        }
    }

    pub fn script(
        transaction_status: TransactionStatus,
        messages: Vec<(u8, Vec<u8>)>,
    ) -> Self {
        let mut transport = Self::new(transaction_status);
        transport.responses.extend(messages);
        transport
    }

    pub fn push(&mut self, message: (u8, Vec<u8>)) {
        self.responses.push_back(message);
    }
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.sent.extend_from_slice(bytes);
        Ok(())
    }

    fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        let (type_byte, payload) = self
            .responses
            .pop_front()
            .ok_or(Error::ConnectionBroken)?;
        buffer_set.type_byte = type_byte;
        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.extend_from_slice(&payload);
        Ok(())
    }

    fn poll_readable(&mut self, timeout: Option<Duration>) -> Result<bool> {
        self.polls.push(timeout);
        Ok(!self.responses.is_empty())
    }

    fn backend_pid(&self) -> u32 {
        self.backend_pid
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    fn set_transaction_status(&mut self, status: TransactionStatus) {
        self.transaction_status = status;
    }
}

// === Backend message builders ===

pub fn ready(status: u8) -> (u8, Vec<u8>) {
    (b'Z', vec![status])
}

pub fn command_complete(tag: &str) -> (u8, Vec<u8>) {
    let mut payload = tag.as_bytes().to_vec();
    payload.push(0);
    (b'C', payload)
}

fn copy_response(type_byte: u8, binary: bool, columns: u16) -> (u8, Vec<u8>) {
    let mut payload = vec![u8::from(binary)];
    payload.extend_from_slice(&columns.to_be_bytes());
    for _ in 0..columns {
        payload.extend_from_slice(&u16::from(binary).to_be_bytes());
    }
    (type_byte, payload)
}

pub fn copy_in_response(binary: bool, columns: u16) -> (u8, Vec<u8>) {
    copy_response(b'G', binary, columns)
}

pub fn copy_out_response(binary: bool, columns: u16) -> (u8, Vec<u8>) {
    copy_response(b'H', binary, columns)
}

pub fn copy_data(bytes: &[u8]) -> (u8, Vec<u8>) {
    (b'd', bytes.to_vec())
}

pub fn copy_done() -> (u8, Vec<u8>) {
    (b'c', Vec::new())
}

pub fn error_response(code: &str, message: &str) -> (u8, Vec<u8>) {
    let mut payload = Vec::new();
    payload.push(b'S');
    payload.extend_from_slice(b"ERROR\0");
    payload.push(b'C');
    payload.extend_from_slice(code.as_bytes());
    payload.push(0);
    payload.push(b'M');
    payload.extend_from_slice(message.as_bytes());
    payload.push(0);
    payload.push(0);
    (b'E', payload)
}

pub fn notice_response(message: &str) -> (u8, Vec<u8>) {
    let mut payload = Vec::new();
    payload.push(b'S');
    payload.extend_from_slice(b"NOTICE\0");
    payload.push(b'M');
    payload.extend_from_slice(message.as_bytes());
    payload.push(0);
    payload.push(0);
    (b'N', payload)
}

pub fn notification(pid: u32, channel: &str, payload: &str) -> (u8, Vec<u8>) {
    let mut body = pid.to_be_bytes().to_vec();
    body.extend_from_slice(channel.as_bytes());
    body.push(0);
    body.extend_from_slice(payload.as_bytes());
    body.push(0);
    (b'A', body)
}

pub fn function_result(value: Option<&[u8]>) -> (u8, Vec<u8>) {
    let mut payload = Vec::new();
    match value {
        Some(bytes) => {
            payload.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
            payload.extend_from_slice(bytes);
        }
        None => payload.extend_from_slice(&(-1_i32).to_be_bytes()),
    }
    (b'V', payload)
}

pub fn int4_result(value: i32) -> (u8, Vec<u8>) {
    function_result(Some(&value.to_be_bytes()))
}

pub fn int8_result(value: i64) -> (u8, Vec<u8>) {
    function_result(Some(&value.to_be_bytes()))
}

/// Split the recorded frontend bytes back into (type byte, payload) frames.
pub fn sent_frames(sent: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut frames = Vec::new();
    let mut i = 0;
    while i < sent.len() {
        let type_byte = sent[i];
        let length = u32::from_be_bytes(sent[i + 1..i + 5].try_into().unwrap()) as usize;
        frames.push((type_byte, sent[i + 5..i + 1 + length].to_vec()));
        i += 1 + length;
    }
    frames
}
