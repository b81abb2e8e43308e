//! PostgreSQL driver extensions: COPY bulk transfer, large-object streams,
//! and asynchronous notifications.
//!
//! # Features
//!
//! - **COPY sub-protocol**: Bulk load from in-memory rows, files, or any
//!   reader; bulk dump to decoded rows, files, or any writer
//! - **Large objects**: Seekable byte streams over the fast-path function
//!   call protocol, with `std::io` trait impls
//! - **Notifications**: `LISTEN`/`NOTIFY` event polling with non-blocking,
//!   bounded, and indefinite waits
//! - **Sans-I/O state machines**: Protocol logic is separated from I/O, so
//!   the exchange layer is testable without a server
//!
//! # Example
//!
//! ```no_run
//! use std::net::TcpStream;
//! use std::time::Duration;
//!
//! use pg_extras::{CopyFormat, Session, Stream, StreamTransport, TransactionStatus};
//!
//! fn main() -> pg_extras::error::Result<()> {
//!     // The base driver hands over an authenticated connection along with
//!     // the backend PID and transaction status it negotiated.
//!     let socket = TcpStream::connect("localhost:5432")?;
//!     let transport = StreamTransport::new(Stream::tcp(socket), 12345, TransactionStatus::Idle);
//!     let mut session = Session::new(transport);
//!
//!     let rows = vec![
//!         vec![Some("1".to_string()), Some("alice".to_string())],
//!         vec![Some("2".to_string()), None],
//!     ];
//!     let copied = session.copy_from_rows("users", &rows, &CopyFormat::default())?;
//!     println!("copied {copied} rows");
//!
//!     if let Some(event) = session.get_notify(Some(Duration::from_secs(5)))? {
//!         println!("{} says {:?}", event.channel, event.payload);
//!     }
//!     Ok(())
//! }
//! ```

pub mod buffer_set;
pub mod copy;
pub mod error;
pub mod large_object;
pub mod notify;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

pub use buffer_set::BufferSet;
pub use copy::{CopyDirection, CopyFormat, Row};
pub use error::{Error, Result};
pub use large_object::{LargeObject, LargeObjectMode};
pub use notify::Notification;
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use session::Session;
pub use transport::{Stream, StreamTransport, Transport};
