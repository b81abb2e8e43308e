//! Buffer set for state machine operations.

/// Buffer set for state machine operations.
///
/// One instance is reused across all protocol exchanges on a session so that
/// message payloads do not reallocate per message.
pub struct BufferSet {
    /// Read buffer for the payload of the last incoming message
    pub read_buffer: Vec<u8>,
    /// Type byte of the last message read
    pub type_byte: u8,
}

impl BufferSet {
    /// Create a new buffer set.
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            type_byte: 0,
        }
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
