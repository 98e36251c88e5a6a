//! Shared protocol state: transport handle, peer address, session id, and
//! the tri-state close/abort machine every [`crate::connection::Connection`]
//! embeds.
use crate::events::Many;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, AsyncReadExt};

/// Monotonic per-producer session identifier, used only for
/// identification and as a `tracing` span field.
pub type Session = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseState {
    Open,
    Closing,
    Closed,
}

/// Minimal socket abstraction so `ProtocolBase` is not hardwired to
/// `tokio::net::TcpStream`; any `AsyncRead + AsyncWrite` half qualifies.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// State shared by every protocol object bound to a transport: the socket
/// handle itself, addressing, the close/abort state machine, and the
/// connection-owned pending-write buffer flow control writes into while
/// paused (see `crate::flow`), rather than reaching into the transport's
/// own internals.
pub struct ProtocolBase<T> {
    pub transport: Option<T>,
    pub address: Option<SocketAddr>,
    pub session: Session,
    pub close_state: CloseState,
    pub connection_made: Many<Session>,
    pub connection_lost: Many<Session>,
    pending: Vec<u8>,
}

impl<T: Transport> ProtocolBase<T> {
    pub fn new(session: Session) -> Self {
        ProtocolBase {
            transport: None,
            address: None,
            session,
            close_state: CloseState::Open,
            connection_made: Many::new(),
            connection_lost: Many::new(),
            pending: Vec::new(),
        }
    }

    /// Attaches the accepted transport and fires `connection_made`.
    pub fn attach(&mut self, transport: T, address: Option<SocketAddr>) {
        self.transport = Some(transport);
        self.address = address;
        self.connection_made.fire(&self.session);
    }

    pub fn is_closed(&self) -> bool {
        self.close_state == CloseState::Closed
    }

    pub fn is_open(&self) -> bool {
        self.close_state == CloseState::Open
    }

    /// Appends to the connection-owned pending-write buffer instead of
    /// writing through while paused by flow control.
    pub fn buffer_pending(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    pub async fn write_through(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self.transport.as_mut() {
            Some(transport) => transport.write_all(data).await,
            None => Ok(()),
        }
    }

    /// Reads into `buf`. Returns `Ok(0)` both on EOF and when no transport
    /// is attached, so callers can treat "never connected" and "peer
    /// closed" identically.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.transport.as_mut() {
            Some(transport) => transport.read(buf).await,
            None => Ok(0),
        }
    }

    /// Idempotent: the first call transitions `Open -> Closing` and returns
    /// `true`; later calls return `false` without effect.
    pub fn begin_close(&mut self) -> bool {
        if self.close_state != CloseState::Open {
            return false;
        }
        self.close_state = CloseState::Closing;
        true
    }

    /// Idempotent: transitions to `Closed`, drops the transport, and fires
    /// `connection_lost` exactly once no matter how many times it's called.
    pub fn finish_close(&mut self) {
        if self.close_state == CloseState::Closed {
            return;
        }
        self.close_state = CloseState::Closed;
        self.transport = None;
        self.connection_lost.fire(&self.session);
    }

    /// Hard abort: identical to `finish_close` from the caller's
    /// perspective, kept as a distinct name for call-site clarity when the
    /// transport is assumed to be in a bad state rather than idle-closed.
    pub fn abort(&mut self) {
        self.finish_close();
    }
}
