//! Action types for state machine I/O requests.

use crate::error::ErrorFields;

/// Action requested by a state machine.
///
/// The caller performs the requested I/O and then calls `step()` again with
/// the next message.
#[derive(Debug)]
pub enum Action<'a> {
    /// Write these bytes to the server and flush, then read the next message.
    WritePacket(&'a [u8]),

    /// Read the next message into the buffer set and call `step()` again.
    NeedPacket,

    /// The server acknowledged copy-in mode.
    ///
    /// The caller may now push data frames and finish with done or fail.
    ReadyToSend,

    /// A CopyData payload arrived during copy-out.
    ///
    /// The caller consumes the chunk, then reads the next message.
    CopyChunk(&'a [u8]),

    /// An asynchronous message was received.
    ///
    /// The caller should route the message (e.g. queue a notification),
    /// read the next message, then call `step()` again.
    AsyncMessage(AsyncMessage),

    /// The state machine has finished successfully.
    Finished,
}

/// Asynchronous message from the server.
///
/// These can arrive at any time, interleaved with any response stream.
#[derive(Debug, Clone)]
pub enum AsyncMessage {
    /// Notification from LISTEN/NOTIFY.
    Notification {
        /// PID of the notifying backend process
        pid: u32,
        /// Channel name
        channel: String,
        /// Notification payload (empty if none was given)
        payload: String,
    },

    /// Non-fatal notice/warning from server.
    Notice(ErrorFields),

    /// Server parameter value changed.
    ParameterChanged {
        /// Parameter name
        name: String,
        /// New value
        value: String,
    },
}
