//! Asynchronous notification events (LISTEN/NOTIFY).

/// One asynchronous notification delivered by the server.
///
/// Produced outside the request/response cycle; each event is observed by
/// exactly one [`get_notify`](crate::Session::get_notify) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Process ID of the notifying backend.
    pub pid: u32,
    /// Channel name the notification was sent on.
    pub channel: String,
    /// Payload, or `None` when NOTIFY was issued without one.
    pub payload: Option<String>,
}

impl Notification {
    pub(crate) fn from_wire(pid: u32, channel: String, payload: String) -> Self {
        Self {
            pid,
            channel,
            payload: if payload.is_empty() {
                None
            } else {
                Some(payload)
            },
        }
    }
}
