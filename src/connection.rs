//! A [`Connection`] owns a transport and routes incoming bytes to a
//! *current consumer*, rebuilding it on completion. [`Connection::upgrade`]
//! swaps the consumer factory mid-stream — the mechanism behind the
//! WebSocket handshake-to-frames handoff.
use crate::consumer::{Consumer, ConnectionHandle, ConnectionMsg};
use crate::errors::ErrorKind;
use crate::events::Many;
use crate::flow::FlowControl;
use crate::limits::{ConnLimits, FlowLimits, IdleLimits};
use crate::protocol::{ProtocolBase, Session, Transport};
use crate::timeout::IdleTimeout;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Zero-argument factory producing a fresh `Consumer`. Boxed because
/// `upgrade` replaces it with a factory of a *different* concrete type
/// bound by the same `Consumer` trait (HTTP consumer -> WebSocket consumer).
pub type ConsumerFactory<C> = Arc<dyn Fn() -> C + Send + Sync>;

pub struct Connection<C: Consumer, T: Transport> {
    protocol: ProtocolBase<T>,
    current_consumer: Option<C>,
    consumer_factory: ConsumerFactory<C>,
    conn_limits: ConnLimits,
    flow: FlowControl,
    idle: IdleTimeout,
    processed: u64,
    write_tx: mpsc::UnboundedSender<ConnectionMsg>,
    write_rx: mpsc::UnboundedReceiver<ConnectionMsg>,
    /// Repeated-event listeners copied onto every consumer built on this
    /// connection (inherited from the owning `Producer`/server).
    pub data_received_many: Many<usize>,
    pub data_processed_many: Many<usize>,
}

impl<C: Consumer, T: Transport> Connection<C, T> {
    pub fn new(
        session: Session,
        consumer_factory: ConsumerFactory<C>,
        conn_limits: ConnLimits,
        flow_limits: FlowLimits,
        idle_limits: IdleLimits,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        Connection {
            protocol: ProtocolBase::new(session),
            current_consumer: None,
            consumer_factory,
            conn_limits,
            flow: FlowControl::new(flow_limits),
            idle: IdleTimeout::new(idle_limits),
            processed: 0,
            write_tx,
            write_rx,
            data_received_many: Many::new(),
            data_processed_many: Many::new(),
        }
    }

    pub fn protocol(&self) -> &ProtocolBase<T> {
        &self.protocol
    }

    pub fn session(&self) -> Session {
        self.protocol.session
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn attach(&mut self, transport: T, address: Option<std::net::SocketAddr>) {
        self.protocol.attach(transport, address);
    }

    /// The central mid-stream switch: from now on, the *next* consumer
    /// built on this connection comes from `new_factory`. If a consumer
    /// is currently attached, it keeps running unaffected — the swap only
    /// takes effect once that consumer's `post_request` has fired. If no
    /// consumer is attached, one is built from `new_factory` immediately.
    pub fn upgrade(&mut self, new_factory: ConsumerFactory<C>) {
        self.consumer_factory = new_factory;
        if self.current_consumer.is_none() {
            self.current_consumer = Some(self.build_consumer());
        }
    }

    fn build_consumer(&self) -> C {
        let mut consumer = (self.consumer_factory)();
        consumer.base_mut().connection = Some(ConnectionHandle::new(self.write_tx.clone()));
        consumer
            .base()
            .data_received_event
            .copy_many_times_events(&self.data_received_many);
        consumer
            .base()
            .data_processed
            .copy_many_times_events(&self.data_processed_many);
        consumer
    }

    /// Routes `data` through the current consumer, building a fresh one
    /// when the slot is empty, and rotating to the next consumer whenever
    /// the current one fires `post_request`.
    pub async fn data_received(&mut self, data: &[u8]) {
        self.idle.reset();
        let mut remaining = data;
        while !remaining.is_empty() && !self.protocol.is_closed() {
            if self.current_consumer.is_none() {
                self.current_consumer = Some(self.build_consumer());
            }
            let consumer = self.current_consumer.as_mut().expect("built above");
            remaining = consumer.data_received_internal(remaining).await;

            if consumer.base().post_request.fired() {
                self.processed += 1;
                self.current_consumer = None;
                if self.processed as usize >= self.conn_limits.max_requests_per_connection {
                    self.close().await;
                    break;
                }
            }
        }
    }

    /// Writes `data`, respecting flow control: while paused it's appended
    /// to the connection-owned pending buffer instead of syscalled through.
    pub async fn write(&mut self, data: &[u8]) {
        self.idle.reset();
        self.protocol.buffer_pending(data);
        if !self.flow.paused() {
            self.flush_pending().await;
        }
        let _ = self.flow.observe(self.protocol.pending_len());
    }

    async fn flush_pending(&mut self) {
        let chunk = self.protocol.take_pending();
        if chunk.is_empty() {
            return;
        }
        let outcome = tokio::time::timeout(
            self.conn_limits.socket_write_timeout,
            self.protocol.write_through(&chunk),
        )
        .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(session = self.protocol.session, %err, "write failed, aborting connection");
                self.connection_lost(Some(err.into())).await;
            }
            Err(_elapsed) => {
                warn!(session = self.protocol.session, "write exceeded socket_write_timeout, aborting connection");
                self.connection_lost(Some(ErrorKind::CloseTimeout)).await;
            }
        }
    }

    /// Graceful close: idempotent, flushes pending bytes best-effort, then
    /// tears down as `connection_lost`.
    pub async fn close(&mut self) {
        if !self.protocol.begin_close() {
            return;
        }
        self.flush_pending().await;
        self.connection_lost(None).await;
    }

    /// Hard abort: tears down immediately without attempting to flush.
    pub async fn abort(&mut self) {
        self.connection_lost(Some(ErrorKind::CloseTimeout)).await;
    }

    /// Finishes the attached consumer (if any) with `exc`, guaranteeing its
    /// `post_request` fires exactly once even on abrupt disconnect, then
    /// finalizes the protocol state.
    async fn connection_lost(&mut self, exc: Option<ErrorKind>) {
        if let Some(consumer) = self.current_consumer.as_mut() {
            consumer.finished(exc);
        }
        self.current_consumer = None;
        self.protocol.finish_close();
    }

    /// Drives the connection's full lifetime: reads bytes and routes them,
    /// drains consumer-submitted writes, and enforces the idle timer, until
    /// the transport is closed. Returns the number of requests this
    /// connection completed, for the owning producer's counters.
    pub async fn run(mut self) -> u64 {
        let mut buf = vec![0u8; 8192];
        loop {
            if self.protocol.is_closed() {
                break;
            }
            tokio::select! {
                biased;
                result = self.protocol.read(&mut buf) => {
                    match result {
                        Ok(0) => { self.connection_lost(None).await; break; }
                        Ok(n) => { self.data_received(&buf[..n]).await; }
                        Err(err) => { self.connection_lost(Some(err.into())).await; break; }
                    }
                }
                msg = self.write_rx.recv() => {
                    match msg {
                        Some(ConnectionMsg::Write(data)) => self.write(&data).await,
                        Some(ConnectionMsg::Close) => { self.close().await; }
                        None => {}
                    }
                }
                _ = self.idle.wait_expired() => {
                    debug!(session = self.protocol.session, "idle timeout, closing");
                    self.close().await;
                    if !self.protocol.is_closed() {
                        warn!(session = self.protocol.session, "close exceeded grace period, aborting");
                        self.abort().await;
                    }
                    break;
                }
            }
        }
        self.processed
    }
}
