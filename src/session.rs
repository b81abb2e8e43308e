//! Session layering COPY, large-object, and NOTIFY operations over a
//! [`Transport`].

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::buffer_set::BufferSet;
use crate::copy::text::{decode_row, encode_row};
use crate::copy::{CopyDirection, CopyFormat, Row};
use crate::error::{Error, Result};
use crate::large_object::{LargeObject, LargeObjectMode, fn_oid, int4_result};
use crate::notify::Notification;
use crate::protocol::types::{Oid, TransactionStatus};
use crate::state::{
    Action, AsyncMessage, CopyInStateMachine, CopyOutStateMachine, FunctionCallStateMachine,
    parse_async_message,
};
use crate::transport::Transport;

/// Target size of one CopyData frame when batching encoded rows.
const COPY_CHUNK_SIZE: usize = 8192;

/// Data source for a copy-in exchange.
///
/// One closed set of variants consumed by a single framing algorithm, so the
/// COPY logic is not duplicated per source shape.
enum CopySource<'a> {
    Rows(std::slice::Iter<'a, Row>),
    Reader(&'a mut dyn BufRead),
}

impl CopySource<'_> {
    /// Append the next chunk of line data to `out`. Returns `Ok(false)` when
    /// the source is exhausted.
    fn next_chunk(&mut self, out: &mut Vec<u8>, format: &CopyFormat) -> Result<bool> {
        match self {
            CopySource::Rows(iter) => {
                let mut wrote = false;
                while out.len() < COPY_CHUNK_SIZE {
                    let Some(row) = iter.next() else { break };
                    encode_row(out, row, format)?;
                    wrote = true;
                }
                Ok(wrote)
            }
            CopySource::Reader(reader) => {
                let buf = reader.fill_buf()?;
                if buf.is_empty() {
                    return Ok(false);
                }
                out.extend_from_slice(buf);
                let n = buf.len();
                reader.consume(n);
                Ok(true)
            }
        }
    }
}

/// Data sink for a copy-out exchange.
enum CopySink<'a> {
    Rows(&'a mut Vec<Row>),
    Writer(&'a mut dyn Write),
}

/// Feed one CopyData payload into the sink. Row sinks assemble complete
/// lines across chunk boundaries in `pending`.
fn consume_chunk(
    sink: &mut CopySink<'_>,
    chunk: &[u8],
    pending: &mut Vec<u8>,
    format: &CopyFormat,
) -> Result<()> {
    match sink {
        CopySink::Writer(writer) => {
            writer.write_all(chunk)?;
            Ok(())
        }
        CopySink::Rows(rows) => {
            pending.extend_from_slice(chunk);
            let mut start = 0;
            while let Some(pos) = memchr::memchr(b'\n', &pending[start..]) {
                let line = &pending[start..start + pos];
                decode_line(rows, line, format)?;
                start += pos + 1;
            }
            pending.drain(..start);
            Ok(())
        }
    }
}

fn decode_line(rows: &mut Vec<Row>, line: &[u8], format: &CopyFormat) -> Result<()> {
    // Pre-protocol-3 dumps end with a lone "\." line; v3 servers end with
    // CopyDone instead, but tolerate the marker either way.
    if line == b"\\." {
        return Ok(());
    }
    rows.push(decode_row(line, format)?);
    Ok(())
}

/// Transport failures brand the session broken; these wrappers are the only
/// places that set the flag, so local source and sink errors never trip it.
fn send_frame<T: Transport>(transport: &mut T, broken: &mut bool, bytes: &[u8]) -> Result<()> {
    mark_on_failure(broken, transport.send(bytes))
}

fn read_frame<T: Transport>(
    transport: &mut T,
    broken: &mut bool,
    buffer_set: &mut BufferSet,
) -> Result<()> {
    mark_on_failure(broken, transport.read_message(buffer_set))
}

fn poll_frame<T: Transport>(
    transport: &mut T,
    broken: &mut bool,
    wait: Option<Duration>,
) -> Result<bool> {
    mark_on_failure(broken, transport.poll_readable(wait))
}

fn mark_on_failure<R>(broken: &mut bool, result: Result<R>) -> Result<R> {
    if let Err(e) = &result
        && e.is_connection_broken()
    {
        *broken = true;
    }
    result
}

fn route_async(notifications: &mut VecDeque<Notification>, msg: AsyncMessage) {
    match msg {
        AsyncMessage::Notification {
            pid,
            channel,
            payload,
        } => notifications.push_back(Notification::from_wire(pid, channel, payload)),
        AsyncMessage::Notice(fields) => {
            tracing::debug!(message = fields.message.as_deref().unwrap_or(""), "server notice");
        }
        AsyncMessage::ParameterChanged { name, value } => {
            tracing::debug!(%name, %value, "server parameter changed");
        }
    }
}

/// Extension-feature session over one PostgreSQL connection.
///
/// Wraps a [`Transport`] handed over by the base driver and layers the COPY
/// sub-protocol, large-object streaming, and NOTIFY polling on top of it.
/// All operations are synchronous and assume exclusive use of the
/// connection for their duration.
pub struct Session<T: Transport> {
    transport: T,
    buffer_set: BufferSet,
    notifications: VecDeque<Notification>,
    /// Bumped whenever a transaction is observed to end; large-object
    /// handles capture the value at open and refuse to outlive it.
    lo_epoch: u64,
    is_broken: bool,
}

impl<T: Transport> Session<T> {
    /// Create a session over an established connection.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer_set: BufferSet::new(),
            notifications: VecDeque::new(),
            lo_epoch: 0,
            is_broken: false,
        }
    }

    /// Give the connection back to the caller.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Process ID of the server backend for this connection.
    ///
    /// Established at connection time; no I/O is performed.
    pub fn backend_pid(&self) -> u32 {
        self.transport.backend_pid()
    }

    /// Current transaction status as last observed on the wire.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transport.transaction_status()
    }

    /// Check if currently in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transport.transaction_status().in_transaction()
    }

    /// Check if the connection is broken.
    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    pub(crate) fn lo_epoch(&self) -> u64 {
        self.lo_epoch
    }

    fn guarded<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.is_broken {
            return Err(Error::ConnectionBroken);
        }
        f(self)
    }

    fn require_transaction(&self, what: &str) -> Result<()> {
        if !self.transport.transaction_status().in_transaction() {
            return Err(Error::InvalidUsage(format!(
                "{what} requires an open transaction"
            )));
        }
        Ok(())
    }

    /// Record a transaction status reported by ReadyForQuery. Leaving a
    /// transaction invalidates every outstanding large-object handle.
    fn note_transaction_status(&mut self, status: TransactionStatus) {
        if self.transport.transaction_status().in_transaction()
            && status == TransactionStatus::Idle
        {
            self.lo_epoch += 1;
        }
        self.transport.set_transaction_status(status);
    }

    fn write_action(&mut self, action: Action<'_>) -> Result<()> {
        match action {
            Action::WritePacket(data) => send_frame(&mut self.transport, &mut self.is_broken, data),
            other => Err(Error::Protocol(format!(
                "Expected a write action, got {other:?}"
            ))),
        }
    }

    // === COPY FROM STDIN ===

    /// Bulk-load in-memory rows into `table` via `COPY ... FROM STDIN`.
    ///
    /// Returns the server-reported number of rows copied.
    pub fn copy_from_rows(&mut self, table: &str, rows: &[Row], format: &CopyFormat) -> Result<u64> {
        self.guarded(|s| s.copy_in(table, format, &mut CopySource::Rows(rows.iter())))
    }

    /// Bulk-load pre-formatted COPY text lines from a reader.
    ///
    /// The reader's bytes are forwarded as-is; they must already be in the
    /// COPY text format described by `format`.
    pub fn copy_from_reader<R: BufRead>(
        &mut self,
        table: &str,
        mut reader: R,
        format: &CopyFormat,
    ) -> Result<u64> {
        self.guarded(|s| s.copy_in(table, format, &mut CopySource::Reader(&mut reader)))
    }

    /// Bulk-load a file of COPY text lines into `table`.
    pub fn copy_from_file<P: AsRef<Path>>(
        &mut self,
        table: &str,
        path: P,
        format: &CopyFormat,
    ) -> Result<u64> {
        let file = File::open(path)?;
        self.copy_from_reader(table, BufReader::new(file), format)
    }

    fn copy_in(
        &mut self,
        table: &str,
        format: &CopyFormat,
        source: &mut CopySource<'_>,
    ) -> Result<u64> {
        let sql = format.statement(table, CopyDirection::FromStdin)?;
        let mut sm = CopyInStateMachine::new();
        self.write_action(sm.start(&sql))?;

        // Wait for the server to enter copy-in mode
        let ready = loop {
            read_frame(&mut self.transport, &mut self.is_broken, &mut self.buffer_set)?;
            match sm.step(&mut self.buffer_set)? {
                Action::NeedPacket => {}
                Action::WritePacket(data) => {
                    send_frame(&mut self.transport, &mut self.is_broken, data)?;
                }
                Action::AsyncMessage(msg) => route_async(&mut self.notifications, msg),
                Action::ReadyToSend => break true,
                Action::Finished => break false,
                Action::CopyChunk(_) => {
                    return Err(Error::Protocol(
                        "copy data received during copy-in setup".into(),
                    ));
                }
            }
        };
        if !ready {
            // Refused (server error, non-COPY statement, binary format)
            let result = sm.take_result();
            self.note_transaction_status(sm.transaction_status());
            return result;
        }

        // Stream the source. A source failure must abort with CopyFail, never
        // leave the copy dangling.
        let mut chunk = Vec::with_capacity(COPY_CHUNK_SIZE);
        let mut last_byte = b'\n';
        loop {
            chunk.clear();
            match source.next_chunk(&mut chunk, format) {
                Ok(true) => {
                    if let Some(&byte) = chunk.last() {
                        last_byte = byte;
                        self.write_action(sm.data(&chunk))?;
                    }
                }
                Ok(false) => break,
                Err(e) => {
                    self.write_action(sm.fail(&e.to_string()))?;
                    self.drive_copy_in_finish(&mut sm)?;
                    // The server's abort response is expected; surface the
                    // original source error instead.
                    let _ = sm.take_result();
                    self.note_transaction_status(sm.transaction_status());
                    return Err(e);
                }
            }
        }
        if last_byte != b'\n' {
            // The server treats a missing final newline as an unterminated
            // line; complete it for raw readers.
            self.write_action(sm.data(b"\n"))?;
        }

        self.write_action(sm.finish())?;
        self.drive_copy_in_finish(&mut sm)?;
        let result = sm.take_result();
        self.note_transaction_status(sm.transaction_status());
        result
    }

    fn drive_copy_in_finish(&mut self, sm: &mut CopyInStateMachine) -> Result<()> {
        loop {
            read_frame(&mut self.transport, &mut self.is_broken, &mut self.buffer_set)?;
            match sm.step(&mut self.buffer_set)? {
                Action::NeedPacket => {}
                Action::WritePacket(data) => {
                    send_frame(&mut self.transport, &mut self.is_broken, data)?;
                }
                Action::AsyncMessage(msg) => route_async(&mut self.notifications, msg),
                Action::Finished => return Ok(()),
                other => {
                    return Err(Error::Protocol(format!(
                        "Unexpected action finishing copy-in: {other:?}"
                    )));
                }
            }
        }
    }

    // === COPY TO STDOUT ===

    /// Dump `table` via `COPY ... TO STDOUT` into decoded in-memory rows.
    pub fn copy_to_rows(&mut self, table: &str, format: &CopyFormat) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        self.guarded(|s| s.copy_out(table, format, &mut CopySink::Rows(&mut rows)))?;
        Ok(rows)
    }

    /// Dump `table` as raw COPY text lines into a writer.
    ///
    /// Returns the server-reported number of rows copied.
    pub fn copy_to_writer<W: Write>(
        &mut self,
        table: &str,
        mut writer: W,
        format: &CopyFormat,
    ) -> Result<u64> {
        self.guarded(|s| s.copy_out(table, format, &mut CopySink::Writer(&mut writer)))
    }

    /// Dump `table` as COPY text lines into a file, creating or truncating it.
    pub fn copy_to_file<P: AsRef<Path>>(
        &mut self,
        table: &str,
        path: P,
        format: &CopyFormat,
    ) -> Result<u64> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let count = self.copy_to_writer(table, &mut writer, format)?;
        writer.flush()?;
        Ok(count)
    }

    fn copy_out(
        &mut self,
        table: &str,
        format: &CopyFormat,
        sink: &mut CopySink<'_>,
    ) -> Result<u64> {
        let sql = format.statement(table, CopyDirection::ToStdout)?;
        let mut sm = CopyOutStateMachine::new();
        self.write_action(sm.start(&sql))?;

        let mut pending = Vec::new();
        let mut sink_error: Option<Error> = None;
        loop {
            read_frame(&mut self.transport, &mut self.is_broken, &mut self.buffer_set)?;
            match sm.step(&mut self.buffer_set)? {
                Action::NeedPacket => {}
                Action::WritePacket(data) => {
                    send_frame(&mut self.transport, &mut self.is_broken, data)?;
                }
                Action::AsyncMessage(msg) => route_async(&mut self.notifications, msg),
                Action::CopyChunk(chunk) => {
                    // A sink failure cannot abort a copy-out; keep draining
                    // and surface the error once the exchange completes.
                    if sink_error.is_none() {
                        if let Err(e) = consume_chunk(sink, chunk, &mut pending, format) {
                            sink_error = Some(e);
                        }
                    }
                }
                Action::Finished => break,
                Action::ReadyToSend => {
                    return Err(Error::Protocol(
                        "copy-in acknowledgment during copy-out".into(),
                    ));
                }
            }
        }

        let result = sm.take_result();
        self.note_transaction_status(sm.transaction_status());
        let count = result?;
        if let Some(e) = sink_error {
            return Err(e);
        }
        if !pending.is_empty() {
            // Final line without a trailing newline
            if let CopySink::Rows(rows) = sink {
                decode_line(rows, &pending, format)?;
            }
        }
        Ok(count)
    }

    // === Large objects ===

    /// Allocate a new, empty large object and return its OID.
    ///
    /// Requires an open transaction, like every large-object operation.
    pub fn create_large_object(&mut self) -> Result<Oid> {
        self.guarded(|s| {
            s.require_transaction("creating a large object")?;
            let mode = (fn_oid::INV_READ | fn_oid::INV_WRITE).to_be_bytes();
            let result = s.fast_path_call(fn_oid::LO_CREAT, &[Some(&mode)])?;
            let oid = int4_result(result)? as u32;
            if oid == 0 {
                return Err(Error::Protocol("lo_creat returned an invalid OID".into()));
            }
            Ok(oid)
        })
    }

    /// Open an existing large object, returning a seekable stream handle.
    ///
    /// The handle is only valid within the current transaction; once that
    /// transaction ends, every operation on it fails with
    /// [`Error::InvalidHandle`]. Missing objects and ACL rejections surface
    /// as [`Error::Server`] (see [`Error::is_undefined_object`] and
    /// [`Error::is_insufficient_privilege`]).
    pub fn open_large_object(
        &mut self,
        oid: Oid,
        mode: LargeObjectMode,
    ) -> Result<LargeObject<'_, T>> {
        if self.is_broken {
            return Err(Error::ConnectionBroken);
        }
        let fd = self.open_large_object_fd(oid, mode)?;
        Ok(LargeObject::new(self, oid, fd))
    }

    fn open_large_object_fd(&mut self, oid: Oid, mode: LargeObjectMode) -> Result<i32> {
        self.require_transaction("opening a large object")?;
        let oid_arg = oid.to_be_bytes();
        let mode_arg = mode.flags().to_be_bytes();
        let result = self.fast_path_call(fn_oid::LO_OPEN, &[Some(&oid_arg), Some(&mode_arg)])?;
        let fd = int4_result(result)?;
        if fd < 0 {
            return Err(Error::Protocol(format!(
                "lo_open returned invalid descriptor {fd}"
            )));
        }
        Ok(fd)
    }

    /// Delete a large object by OID.
    ///
    /// Fails with a server-reported conflict if the object is open in a
    /// conflicting way (see [`Error::is_object_in_use`]).
    pub fn unlink_large_object(&mut self, oid: Oid) -> Result<()> {
        self.guarded(|s| {
            let oid_arg = oid.to_be_bytes();
            let result = s.fast_path_call(fn_oid::LO_UNLINK, &[Some(&oid_arg)])?;
            int4_result(result)?;
            Ok(())
        })
    }

    /// Issue one fast-path function call and return its binary result.
    pub(crate) fn fast_path_call(
        &mut self,
        fn_oid: Oid,
        args: &[Option<&[u8]>],
    ) -> Result<Option<Vec<u8>>> {
        let mut sm = FunctionCallStateMachine::new();
        self.write_action(sm.start(fn_oid, args))?;
        loop {
            read_frame(&mut self.transport, &mut self.is_broken, &mut self.buffer_set)?;
            match sm.step(&mut self.buffer_set)? {
                Action::NeedPacket => {}
                Action::WritePacket(data) => {
                    send_frame(&mut self.transport, &mut self.is_broken, data)?;
                }
                Action::AsyncMessage(msg) => route_async(&mut self.notifications, msg),
                Action::Finished => break,
                other => {
                    return Err(Error::Protocol(format!(
                        "Unexpected action in function call: {other:?}"
                    )));
                }
            }
        }
        let result = sm.take_result();
        self.note_transaction_status(sm.transaction_status());
        result
    }

    // === Notifications ===

    /// Fetch the next asynchronous notification, waiting up to `timeout`.
    ///
    /// Timeout convention: `None` waits indefinitely; `Some(Duration::ZERO)`
    /// is an immediate non-blocking check; any other value is an upper bound
    /// on the wait. Returns `Ok(None)` when the timeout elapses with no
    /// event, which is a normal outcome, not an error.
    ///
    /// An event already queued from a previous protocol read is returned
    /// immediately, regardless of the timeout.
    pub fn get_notify(&mut self, timeout: Option<Duration>) -> Result<Option<Notification>> {
        if let Some(notification) = self.notifications.pop_front() {
            return Ok(Some(notification));
        }
        self.guarded(|s| s.poll_notify(timeout))
    }

    fn poll_notify(&mut self, timeout: Option<Duration>) -> Result<Option<Notification>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let wait = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if !poll_frame(&mut self.transport, &mut self.is_broken, wait)? {
                return Ok(None);
            }
            read_frame(&mut self.transport, &mut self.is_broken, &mut self.buffer_set)?;
            let parsed =
                parse_async_message(self.buffer_set.type_byte, &self.buffer_set.read_buffer)?;
            match parsed {
                Some(AsyncMessage::Notification {
                    pid,
                    channel,
                    payload,
                }) => return Ok(Some(Notification::from_wire(pid, channel, payload))),
                Some(other) => route_async(&mut self.notifications, other),
                None => {
                    // Nothing but async traffic is legal on an idle connection
                    return Err(Error::Protocol(format!(
                        "Unexpected message '{}' while polling for notifications",
                        self.buffer_set.type_byte as char
                    )));
                }
            }
        }
    }
}
