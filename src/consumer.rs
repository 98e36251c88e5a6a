//! Stateful per-request handler bound to a [`crate::connection::Connection`].
use crate::errors::ErrorKind;
use crate::events::{Many, OneShot};
use tokio::sync::mpsc;
use tracing::debug;

/// A message sent from a `Consumer` to the `Connection` task that owns its
/// transport. Decouples consumer logic (which may run arbitrary async code)
/// from the single task doing the actual socket I/O.
pub enum ConnectionMsg {
    Write(Vec<u8>),
    Close,
}

/// A handle a `Consumer` holds to write to (or close) its owning
/// `Connection`, independent of the transport's concrete type.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<ConnectionMsg>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<ConnectionMsg>) -> Self {
        ConnectionHandle { tx }
    }

    pub fn write(&self, data: Vec<u8>) -> Result<(), ErrorKind> {
        self.tx
            .send(ConnectionMsg::Write(data))
            .map_err(|_| ErrorKind::ConnectionReset)
    }

    pub fn close(&self) -> Result<(), ErrorKind> {
        self.tx
            .send(ConnectionMsg::Close)
            .map_err(|_| ErrorKind::ConnectionReset)
    }
}

/// Shared bookkeeping every `Consumer` implementation embeds: the event
/// registry plus the detach flag the owning `Connection` checks after
/// `post_request` fires.
pub struct ConsumerBase {
    pub pre_request: OneShot<()>,
    pub post_request: OneShot<Option<ErrorKind>>,
    pub data_received_event: Many<usize>,
    pub data_processed: Many<usize>,
    pub data_received_count: u64,
    pub connection: Option<ConnectionHandle>,
    attached: bool,
}

impl ConsumerBase {
    pub fn new() -> Self {
        ConsumerBase {
            pre_request: OneShot::new(),
            post_request: OneShot::new(),
            data_received_event: Many::new(),
            data_processed: Many::new(),
            data_received_count: 0,
            connection: None,
            attached: true,
        }
    }

    pub fn attached(&self) -> bool {
        self.attached
    }

    fn detach(&mut self) {
        self.attached = false;
    }
}

impl Default for ConsumerBase {
    fn default() -> Self {
        Self::new()
    }
}

/// A per-request handler bound to exactly one connection at a time.
///
/// Server-side consumers implement `data_received` only; `start_request`
/// is reserved for client-mode consumers, which must emit the initial
/// outbound bytes themselves.
pub trait Consumer: Send + 'static {
    fn base(&self) -> &ConsumerBase;
    fn base_mut(&mut self) -> &mut ConsumerBase;

    /// Client-side only. The default is a server-mode consumer's
    /// unimplemented stub.
    async fn start_request(&mut self) -> Result<(), ErrorKind> {
        Err(ErrorKind::Unimplemented)
    }

    /// Server-side. Returns the number of trailing unconsumed bytes so the
    /// owning `Connection` can re-slice and continue routing.
    async fn data_received(&mut self, data: &[u8]) -> Result<usize, ErrorKind>;

    /// Fires `pre_request`; if a listener aborts, logs at `debug` and
    /// returns without invoking `start_request`.
    async fn start(&mut self, has_request: bool) {
        if let Err(err) = self.base().pre_request.fire(()) {
            debug!(?err, "pre_request aborted, skipping start_request");
            return;
        }
        if has_request {
            if let Err(err) = self.start_request().await {
                self.finished(Some(err));
            }
        }
    }

    /// Fires `post_request` with the terminal error (if any) and detaches
    /// from the owning connection. Idempotent: `post_request` fires at
    /// most once regardless of how many times `finished` is called.
    fn finished(&mut self, exc: Option<ErrorKind>) {
        if self.base().post_request.fired() {
            return;
        }
        let _ = self.base().post_request.fire(exc);
        self.base_mut().detach();
    }

    /// Routes one chunk of bytes through the shared bookkeeping: lazily
    /// fires `start` on the first call, then `data_processed`, and
    /// returns the unconsumed tail for the caller to keep routing.
    async fn data_received_internal<'d>(&mut self, data: &'d [u8]) -> &'d [u8] {
        if !self.base().pre_request.fired() {
            self.start(false).await;
            if self.base().post_request.fired() {
                return &data[data.len()..];
            }
        }

        match self.data_received(data).await {
            Ok(leftover) => {
                let consumed = data.len() - leftover.min(data.len());
                self.base_mut().data_received_count += 1;
                self.base().data_processed.fire(&consumed);
                &data[consumed..]
            }
            Err(err) => {
                self.finished(Some(err));
                &data[data.len()..]
            }
        }
    }
}
