//! Transport seam between this crate and the base driver's connection.
//!
//! The base driver owns connection establishment, authentication, and the
//! general protocol state; this crate only needs the byte stream, framed
//! message reads, readiness polling, and the connection facts established at
//! startup (backend PID, transaction status). [`Transport`] captures exactly
//! that contract, and [`StreamTransport`] implements it over an
//! already-authenticated TCP or Unix socket.

use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::types::TransactionStatus;

/// Connection contract required by [`Session`](crate::Session).
///
/// All operations assume exclusive use of the underlying connection; nothing
/// here is safe to share between threads.
pub trait Transport {
    /// Write all bytes and flush.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read one whole protocol message (type byte + payload) into the buffer
    /// set, blocking until it is complete.
    fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()>;

    /// Wait until at least one byte is readable.
    ///
    /// `None` blocks indefinitely; `Some(Duration::ZERO)` is an immediate
    /// non-blocking check. Returns `Ok(false)` when the timeout elapsed with
    /// nothing to read.
    fn poll_readable(&mut self, timeout: Option<Duration>) -> Result<bool>;

    /// Process ID of the server backend, from startup's BackendKeyData.
    fn backend_pid(&self) -> u32;

    /// Current transaction status as last reported by ReadyForQuery.
    fn transaction_status(&self) -> TransactionStatus;

    /// Record a transaction status observed on the wire.
    fn set_transaction_status(&mut self, status: TransactionStatus);
}

/// Buffered byte stream over TCP or a Unix socket.
pub enum Stream {
    /// TCP connection
    Tcp(BufReader<TcpStream>),
    /// Unix domain socket connection
    Unix(BufReader<UnixStream>),
}

impl Stream {
    /// Wrap a connected TCP stream.
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    /// Wrap a connected Unix socket stream.
    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::new(stream))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.read_exact(buf),
            Stream::Unix(r) => r.read_exact(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().write_all(buf),
            Stream::Unix(r) => r.get_mut().write_all(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().flush(),
            Stream::Unix(r) => r.get_mut().flush(),
        }
    }

    fn has_buffered(&self) -> bool {
        match self {
            Stream::Tcp(r) => !r.buffer().is_empty(),
            Stream::Unix(r) => !r.buffer().is_empty(),
        }
    }

    fn poll_socket(&self, timeout: Option<Duration>) -> Result<Option<u8>> {
        match self {
            Stream::Tcp(r) => poll_read_one(r.get_ref(), timeout),
            Stream::Unix(r) => poll_read_one(r.get_ref(), timeout),
        }
    }
}

/// The socket operations needed for readiness polling, implemented by both
/// socket types (std has no common trait for them).
trait Pollable {
    fn read_one(&self, byte: &mut [u8; 1]) -> std::io::Result<usize>;
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;
    fn set_nonblocking(&self, nonblocking: bool) -> std::io::Result<()>;
}

impl Pollable for TcpStream {
    fn read_one(&self, byte: &mut [u8; 1]) -> std::io::Result<usize> {
        Read::read(&mut &*self, byte)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> std::io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }
}

impl Pollable for UnixStream {
    fn read_one(&self, byte: &mut [u8; 1]) -> std::io::Result<usize> {
        Read::read(&mut &*self, byte)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> std::io::Result<()> {
        UnixStream::set_nonblocking(self, nonblocking)
    }
}

/// Read one byte off the socket under the requested wait mode. The byte is
/// the next message's type byte; the caller must hold it for `read_message`.
/// A zero-length read means the server closed the connection.
fn poll_read_one<S: Pollable>(sock: &S, timeout: Option<Duration>) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    let result = match timeout {
        Some(Duration::ZERO) => {
            // set_read_timeout rejects a zero duration; use non-blocking mode
            sock.set_nonblocking(true)?;
            let result = sock.read_one(&mut byte);
            sock.set_nonblocking(false)?;
            result
        }
        Some(wait) => {
            sock.set_read_timeout(Some(wait))?;
            let result = sock.read_one(&mut byte);
            sock.set_read_timeout(None)?;
            result
        }
        None => sock.read_one(&mut byte),
    };

    match result {
        Ok(0) => Err(Error::ConnectionBroken),
        Ok(_) => Ok(Some(byte[0])),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// [`Transport`] over an established, authenticated PostgreSQL connection.
///
/// The base driver hands over the socket after startup completes, along with
/// the backend PID from BackendKeyData and the current transaction status.
pub struct StreamTransport {
    stream: Stream,
    // Type byte consumed by a readiness poll, owed to the next read_message.
    pushback: Option<u8>,
    backend_pid: u32,
    transaction_status: TransactionStatus,
}

impl StreamTransport {
    /// Create a transport over an established connection.
    pub fn new(stream: Stream, backend_pid: u32, transaction_status: TransactionStatus) -> Self {
        Self {
            stream,
            pushback: None,
            backend_pid,
            transaction_status,
        }
    }
}

impl Transport for StreamTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        // Type byte, unless a poll already pulled it off the socket
        buffer_set.type_byte = match self.pushback.take() {
            Some(byte) => byte,
            None => {
                let mut type_byte = [0u8; 1];
                self.stream.read_exact(&mut type_byte)?;
                type_byte[0]
            }
        };

        // Length (4 bytes, big-endian, includes itself)
        let mut length_bytes = [0u8; 4];
        self.stream.read_exact(&mut length_bytes)?;
        let length = u32::from_be_bytes(length_bytes);

        if length < 4 {
            return Err(Error::Protocol(format!("Invalid message length: {length}")));
        }

        let payload_len = (length - 4) as usize;
        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.resize(payload_len, 0);
        self.stream.read_exact(&mut buffer_set.read_buffer)?;

        Ok(())
    }

    fn poll_readable(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if self.pushback.is_some() || self.stream.has_buffered() {
            return Ok(true);
        }
        match self.stream.poll_socket(timeout)? {
            Some(byte) => {
                self.pushback = Some(byte);
                Ok(true)
            }
            None => Ok(false),
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_pair() -> (StreamTransport, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        (
            StreamTransport::new(Stream::unix(ours), 7, TransactionStatus::Idle),
            theirs,
        )
    }

    #[test]
    fn poll_then_read_keeps_the_message_intact() {
        let (mut transport, mut server) = transport_pair();
        server.write_all(b"Z\x00\x00\x00\x05T").unwrap();

        assert!(transport.poll_readable(Some(Duration::ZERO)).unwrap());
        // A second poll must not consume further bytes
        assert!(transport.poll_readable(Some(Duration::ZERO)).unwrap());

        let mut buffer_set = BufferSet::new();
        transport.read_message(&mut buffer_set).unwrap();
        assert_eq!(buffer_set.type_byte, b'Z');
        assert_eq!(buffer_set.read_buffer, b"T");
    }

    #[test]
    fn poll_with_zero_timeout_reports_nothing_to_read() {
        let (mut transport, _server) = transport_pair();
        assert!(!transport.poll_readable(Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn poll_detects_a_closed_peer() {
        let (mut transport, server) = transport_pair();
        drop(server);
        let err = transport.poll_readable(Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, Error::ConnectionBroken));
    }
}
