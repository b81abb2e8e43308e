//! Large-object streaming handles built on the fast-path function-call
//! protocol.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::protocol::types::Oid;
use crate::session::Session;
use crate::transport::Transport;

/// Server-side function OIDs and flags for the large-object facility.
///
/// These OIDs are pinned in `pg_proc` and stable across every supported
/// server version, so they are not looked up at runtime.
pub(crate) mod fn_oid {
    use crate::protocol::types::Oid;

    pub const LO_CREAT: Oid = 957;
    pub const LO_OPEN: Oid = 952;
    pub const LO_CLOSE: Oid = 953;
    pub const LO_READ: Oid = 954;
    pub const LO_WRITE: Oid = 955;
    pub const LO_UNLINK: Oid = 964;
    pub const LO_LSEEK64: Oid = 3170;
    pub const LO_TELL64: Oid = 3171;

    /// `INV_READ` open flag from `libpq/libpq-fs.h`.
    pub const INV_READ: i32 = 0x0004_0000;
    /// `INV_WRITE` open flag from `libpq/libpq-fs.h`.
    pub const INV_WRITE: i32 = 0x0002_0000;
}

/// Largest byte count one loread/lowrite call can carry.
const MAX_TRANSFER: usize = i32::MAX as usize;

/// Decode a fast-path result that must be a 4-byte integer.
pub(crate) fn int4_result(value: Option<Vec<u8>>) -> Result<i32> {
    let bytes = value.ok_or_else(|| Error::Protocol("function returned NULL".into()))?;
    let bytes: [u8; 4] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::Protocol(format!("expected int4 result, got {} bytes", bytes.len())))?;
    Ok(i32::from_be_bytes(bytes))
}

/// Decode a fast-path result that must be an 8-byte integer.
fn int8_result(value: Option<Vec<u8>>) -> Result<i64> {
    let bytes = value.ok_or_else(|| Error::Protocol("function returned NULL".into()))?;
    let bytes: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::Protocol(format!("expected int8 result, got {} bytes", bytes.len())))?;
    Ok(i64::from_be_bytes(bytes))
}

/// Access mode for [`Session::open_large_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LargeObjectMode {
    Read,
    Write,
    ReadWrite,
}

impl LargeObjectMode {
    pub(crate) fn flags(self) -> i32 {
        match self {
            LargeObjectMode::Read => fn_oid::INV_READ,
            LargeObjectMode::Write => fn_oid::INV_WRITE,
            LargeObjectMode::ReadWrite => fn_oid::INV_READ | fn_oid::INV_WRITE,
        }
    }
}

/// An open large object, usable as a seekable byte stream.
///
/// Borrows the session exclusively, so no other operation can interleave
/// with the stream. The handle is scoped to the transaction it was opened
/// in: when that transaction ends, the server discards the descriptor, and
/// this handle starts failing with [`Error::InvalidHandle`] rather than
/// touching a descriptor the server may have reassigned.
///
/// Implements [`std::io::Read`], [`std::io::Write`], and [`std::io::Seek`]
/// for use with generic stream code.
pub struct LargeObject<'conn, T: Transport> {
    session: &'conn mut Session<T>,
    oid: Oid,
    fd: i32,
    epoch: u64,
    closed: bool,
}

impl<'conn, T: Transport> LargeObject<'conn, T> {
    pub(crate) fn new(session: &'conn mut Session<T>, oid: Oid, fd: i32) -> Self {
        let epoch = session.lo_epoch();
        Self {
            session,
            oid,
            fd,
            epoch,
            closed: false,
        }
    }

    /// OID of the underlying large object.
    pub fn oid(&self) -> Oid {
        self.oid
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidHandle("large object already closed".into()));
        }
        if self.session.is_broken() {
            return Err(Error::ConnectionBroken);
        }
        if self.epoch != self.session.lo_epoch() {
            return Err(Error::InvalidHandle(
                "the transaction owning this large object has ended".into(),
            ));
        }
        Ok(())
    }

    fn call(&mut self, fn_oid: Oid, args: &[Option<&[u8]>]) -> Result<Option<Vec<u8>>> {
        self.ensure_valid()?;
        self.session.fast_path_call(fn_oid, args)
    }

    /// Read up to `max` bytes from the current position.
    ///
    /// An empty result means end of object. Short reads are normal near the
    /// end; `max` is honored exactly, never rounded.
    pub fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let len = i32::try_from(max)
            .map_err(|_| Error::InvalidUsage(format!("read of {max} bytes exceeds int4 range")))?
            .to_be_bytes();
        let fd = self.fd.to_be_bytes();
        let result = self.call(fn_oid::LO_READ, &[Some(&fd), Some(&len)])?;
        result.ok_or_else(|| Error::Protocol("loread returned NULL".into()))
    }

    /// Write `data` at the current position, returning the byte count the
    /// server accepted.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if data.len() > MAX_TRANSFER {
            return Err(Error::InvalidUsage(format!(
                "write of {} bytes exceeds int4 range",
                data.len()
            )));
        }
        let fd = self.fd.to_be_bytes();
        let result = self.call(fn_oid::LO_WRITE, &[Some(&fd), Some(data)])?;
        let written = int4_result(result)?;
        if written < 0 {
            return Err(Error::Protocol(format!("lowrite returned {written}")));
        }
        Ok(written as usize)
    }

    /// Reposition the stream, returning the new offset from the start.
    ///
    /// Uses the 64-bit seek family, so objects larger than 2 GiB address
    /// correctly.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let (offset, whence): (i64, i32) = match pos {
            SeekFrom::Start(n) => (
                i64::try_from(n).map_err(|_| {
                    Error::InvalidUsage(format!("seek offset {n} exceeds int8 range"))
                })?,
                0,
            ),
            SeekFrom::Current(n) => (n, 1),
            SeekFrom::End(n) => (n, 2),
        };
        let fd = self.fd.to_be_bytes();
        let offset_arg = offset.to_be_bytes();
        let whence_arg = whence.to_be_bytes();
        let result = self.call(
            fn_oid::LO_LSEEK64,
            &[Some(&fd), Some(&offset_arg), Some(&whence_arg)],
        )?;
        let position = int8_result(result)?;
        if position < 0 {
            return Err(Error::Protocol(format!("lo_lseek64 returned {position}")));
        }
        Ok(position as u64)
    }

    /// Current offset from the start of the object.
    pub fn tell(&mut self) -> Result<u64> {
        let fd = self.fd.to_be_bytes();
        let result = self.call(fn_oid::LO_TELL64, &[Some(&fd)])?;
        let position = int8_result(result)?;
        if position < 0 {
            return Err(Error::Protocol(format!("lo_tell64 returned {position}")));
        }
        Ok(position as u64)
    }

    /// Close the descriptor on the server and release the session borrow.
    ///
    /// Dropping the handle also closes it, but only `close` reports a
    /// failure to do so.
    pub fn close(mut self) -> Result<()> {
        let fd = self.fd.to_be_bytes();
        let result = self.call(fn_oid::LO_CLOSE, &[Some(&fd)]);
        self.closed = true;
        result.map(|_| ())
    }
}

// Manual impl; deriving would demand T: Debug for no reason.
impl<T: Transport> std::fmt::Debug for LargeObject<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LargeObject")
            .field("oid", &self.oid)
            .field("fd", &self.fd)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Drop for LargeObject<'_, T> {
    fn drop(&mut self) {
        if self.closed || self.ensure_valid().is_err() {
            return;
        }
        let fd = self.fd.to_be_bytes();
        if let Err(e) = self.session.fast_path_call(fn_oid::LO_CLOSE, &[Some(&fd)]) {
            tracing::debug!(oid = self.oid, error = %e, "implicit large-object close failed");
        }
    }
}

impl<T: Transport> Read for LargeObject<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = LargeObject::read(self, buf.len()).map_err(io::Error::other)?;
        if bytes.len() > buf.len() {
            return Err(io::Error::other(Error::Protocol(format!(
                "loread returned {} bytes for a {}-byte request",
                bytes.len(),
                buf.len()
            ))));
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }
}

impl<T: Transport> Write for LargeObject<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        LargeObject::write(self, buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Transport> Seek for LargeObject<'_, T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        LargeObject::seek(self, pos).map_err(io::Error::other)
    }
}
