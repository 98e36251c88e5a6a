use std::{error, fmt, io, sync::Arc};

/// Unified error taxonomy surfaced at the connection/consumer/handshake
/// boundary. Manual `Display`/`Error`, no `thiserror` — one enum, matched
/// explicitly at every terminal point.
#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// Malformed or invalid upgrade request; surfaces as HTTP 400/404.
    HandshakeError(String),
    /// Frame parser rejected a negotiated version or extension.
    ProtocolError(String),
    /// A write was attempted with no transport attached.
    ConnectionReset,
    /// Cooperative request abort raised from a `pre_request` listener.
    AbortEvent,
    /// Graceful close exceeded its bound; the transport was aborted.
    CloseTimeout,
    /// A syscall failed on read, write, bind, or close.
    Transport(Arc<io::Error>),
    /// `start_request` called on a consumer that does not implement it.
    Unimplemented,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::HandshakeError(msg) => write!(f, "handshake error: {msg}"),
            ErrorKind::ProtocolError(msg) => write!(f, "protocol error: {msg}"),
            ErrorKind::ConnectionReset => write!(f, "connection reset: no transport attached"),
            ErrorKind::AbortEvent => write!(f, "request aborted"),
            ErrorKind::CloseTimeout => write!(f, "graceful close exceeded its timeout"),
            ErrorKind::Transport(err) => write!(f, "transport error: {err}"),
            ErrorKind::Unimplemented => write!(f, "operation not implemented by this consumer"),
        }
    }
}

impl error::Error for ErrorKind {}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Transport(Arc::new(err))
    }
}
