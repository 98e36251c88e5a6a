//! `TcpServer`: bind, accept, track concurrent connections, and close
//! gracefully with a bounded wait before abandoning stragglers.
use super::{ClientsInfo, Info, ServerInfo, SocketInfo};
use crate::connection::{Connection, ConsumerFactory};
use crate::consumer::Consumer;
use crate::events::{Many, OneShot};
use crate::limits::{ConnLimits, FlowLimits, IdleLimits, ProducerLimits, ServerLimits};
use crate::producer::{Producer, ProducerState};
use crate::protocol::Session;
use crossbeam::queue::SegQueue;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

const STATE_INIT: u8 = 0;
const STATE_SERVING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// A connection-oriented TCP server: `Init -> Serving -> Closed`. Each
/// accepted socket gets its own `tokio::spawn`ed `Connection` task; server
/// state (counters, the concurrent-connection set) lives behind atomics
/// and a small async mutex so it can be shared as `Arc<TcpServer<C>>`
/// across the accept loop and any number of external callers of `close()`.
pub struct TcpServer<C: Consumer> {
    producer: ProducerState,
    producer_limits: ProducerLimits,
    server_limits: ServerLimits,
    conn_limits: ConnLimits,
    flow_limits: FlowLimits,
    idle_limits: IdleLimits,
    consumer_factory: ConsumerFactory<C>,
    data_received_many: Many<usize>,
    data_processed_many: Many<usize>,
    state: AtomicU8,
    connected_clients: AtomicU64,
    processed_clients: AtomicU64,
    /// Accepted sockets held back once `max_connections` is reached,
    /// admitted as running connections finish. Bounded by
    /// `max_pending_connections`; beyond that, new accepts are dropped.
    pending: SegQueue<(TcpStream, SocketAddr)>,
    pending_count: AtomicUsize,
    concurrent: AsyncMutex<HashMap<Session, oneshot::Receiver<()>>>,
    started: AsyncMutex<Option<Instant>>,
    local_addr: AsyncMutex<Option<SocketAddr>>,
    pub start: OneShot<()>,
    pub stop: OneShot<()>,
}

impl<C: Consumer> Producer for TcpServer<C> {
    fn state(&self) -> &ProducerState {
        &self.producer
    }
    fn limits(&self) -> &ProducerLimits {
        &self.producer_limits
    }
}

impl<C: Consumer> TcpServer<C> {
    pub fn builder() -> TcpServerBuilder<C> {
        TcpServerBuilder::new()
    }

    pub fn info(&self) -> Info {
        Info {
            server: ServerInfo {
                uptime_in_seconds: 0, // filled by `info_async`; see its doc for why
                sockets: Vec::new(),
                max_requests: self.producer_limits.max_requests,
                keep_alive: self.server_limits.keep_alive,
            },
            clients: ClientsInfo {
                processed_clients: self.processed_clients.load(Ordering::SeqCst),
                connected_clients: self.connected_clients.load(Ordering::SeqCst),
                requests_processed: self.producer.requests_processed(),
            },
        }
    }

    /// `Info` with the fields that require awaiting an async mutex
    /// (uptime, bound address) filled in. Split from `info()` so the
    /// common case — just the atomics — never needs `.await`.
    pub async fn info_async(&self) -> Info {
        let mut info = self.info();
        if let Some(started) = *self.started.lock().await {
            info.server.uptime_in_seconds = started.elapsed().as_secs();
        }
        if let Some(addr) = *self.local_addr.lock().await {
            info.server.sockets.push(SocketInfo {
                address: addr.to_string(),
            });
        }
        info
    }

    /// Binds `addr` and serves until `close()` is called. Fires `start`
    /// one tick after the listening socket is up (via `yield_now`), so
    /// listeners bound immediately after this call still observe it.
    pub async fn start_serving(self: &Arc<Self>, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        *self.local_addr.lock().await = listener.local_addr().ok();
        *self.started.lock().await = Some(Instant::now());
        self.state.store(STATE_SERVING, Ordering::SeqCst);

        let this = self.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let _ = this.start.fire(());
        });

        loop {
            if self.state.load(Ordering::SeqCst) == STATE_CLOSED {
                break;
            }
            match listener.accept().await {
                Ok((stream, addr)) => self.clone().accept_connection(stream, addr).await,
                Err(err) => warn!(%err, "accept failed"),
            }
        }
        Ok(())
    }

    /// Admits `stream` if `max_connections` hasn't been reached, queues it
    /// up to `max_pending_connections` if it has, or drops it without a
    /// response once both are exhausted.
    async fn accept_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        if (self.connected_clients.load(Ordering::SeqCst) as usize) < self.server_limits.max_connections {
            self.spawn_connection(stream, addr).await;
            return;
        }
        if self.pending_count.load(Ordering::SeqCst) >= self.server_limits.max_pending_connections {
            warn!(%addr, "max_connections and max_pending_connections both reached, dropping connection");
            return;
        }
        debug!(%addr, "max_connections reached, queuing connection");
        self.pending_count.fetch_add(1, Ordering::SeqCst);
        self.pending.push((stream, addr));
    }

    /// Pops one queued connection, if any, and spawns it now that a slot
    /// has freed up. Called after every connection's `run()` completes.
    async fn admit_pending(self: Arc<Self>) {
        if (self.connected_clients.load(Ordering::SeqCst) as usize) >= self.server_limits.max_connections {
            return;
        }
        if let Some((stream, addr)) = self.pending.pop() {
            self.pending_count.fetch_sub(1, Ordering::SeqCst);
            self.spawn_connection(stream, addr).await;
        }
    }

    async fn spawn_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        if self.max_requests_reached() {
            info!("max_requests reached, initiating graceful close");
            let this = self.clone();
            tokio::spawn(async move { this.close().await });
        }

        let session = self.producer.next_session();
        let mut connection = Connection::<C, TcpStream>::new(
            session,
            self.consumer_factory.clone(),
            self.conn_limits.clone(),
            self.flow_limits,
            self.idle_limits,
        );
        connection
            .data_received_many
            .copy_many_times_events(&self.data_received_many);
        connection
            .data_processed_many
            .copy_many_times_events(&self.data_processed_many);
        connection.attach(stream, Some(addr));

        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        connection
            .protocol()
            .connection_lost
            .bind(Arc::new(move |_session: &Session| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                Ok(())
            }));

        let this = self.clone();
        this.connected_clients.fetch_add(1, Ordering::SeqCst);
        self.concurrent.lock().await.insert(session, rx);

        tokio::spawn(async move {
            let processed = connection.run().await;
            this.producer.record_processed(processed);
            this.connected_clients.fetch_sub(1, Ordering::SeqCst);
            this.processed_clients.fetch_add(1, Ordering::SeqCst);
            debug!(session, "connection closed");
            this.admit_pending().await;
        });
    }

    /// Stops accepting and closes every live connection, waiting up to
    /// `ServerLimits::close_timeout` before abandoning stragglers. Fires
    /// `stop` unconditionally once the wait ends.
    pub async fn close(self: &Arc<Self>) {
        if self.state.swap(STATE_CLOSED, Ordering::SeqCst) == STATE_CLOSED {
            return;
        }

        // TODO: completed entries accumulate here between close() calls on
        // a long-running server; prune on each connection_lost instead of
        // only draining at close time.
        let receivers: Vec<_> = {
            let mut guard = self.concurrent.lock().await;
            std::mem::take(&mut *guard).into_values().collect()
        };

        let mut joins = tokio::task::JoinSet::new();
        for rx in receivers {
            joins.spawn(async move {
                let _ = rx.await;
            });
        }

        let drained = tokio::time::timeout(self.server_limits.close_timeout, async {
            while joins.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!("graceful close exceeded its timeout; abandoning remaining connections");
        }

        let _ = self.stop.fire(());
    }
}

pub struct TcpServerBuilder<C: Consumer> {
    producer_limits: ProducerLimits,
    server_limits: ServerLimits,
    conn_limits: ConnLimits,
    flow_limits: FlowLimits,
    idle_limits: IdleLimits,
    consumer_factory: Option<ConsumerFactory<C>>,
}

impl<C: Consumer> TcpServerBuilder<C> {
    pub fn new() -> Self {
        TcpServerBuilder {
            producer_limits: ProducerLimits::default(),
            server_limits: ServerLimits::default(),
            conn_limits: ConnLimits::default(),
            flow_limits: FlowLimits::default(),
            idle_limits: IdleLimits::default(),
            consumer_factory: None,
        }
    }

    pub fn consumer_factory(mut self, factory: ConsumerFactory<C>) -> Self {
        self.consumer_factory = Some(factory);
        self
    }

    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = limits;
        self
    }

    pub fn conn_limits(mut self, limits: ConnLimits) -> Self {
        self.conn_limits = limits;
        self
    }

    pub fn flow_limits(mut self, limits: FlowLimits) -> Self {
        self.flow_limits = limits;
        self
    }

    pub fn idle_limits(mut self, limits: IdleLimits) -> Self {
        self.idle_limits = limits;
        self
    }

    pub fn producer_limits(mut self, limits: ProducerLimits) -> Self {
        self.producer_limits = limits;
        self
    }

    /// # Panics
    /// If no `consumer_factory` was set.
    pub fn build(self) -> Arc<TcpServer<C>> {
        Arc::new(TcpServer {
            producer: ProducerState::new(),
            producer_limits: self.producer_limits,
            server_limits: self.server_limits,
            conn_limits: self.conn_limits,
            flow_limits: self.flow_limits,
            idle_limits: self.idle_limits,
            consumer_factory: self
                .consumer_factory
                .expect("TcpServerBuilder::build called without a consumer_factory"),
            data_received_many: Many::new(),
            data_processed_many: Many::new(),
            state: AtomicU8::new(STATE_INIT),
            connected_clients: AtomicU64::new(0),
            processed_clients: AtomicU64::new(0),
            pending: SegQueue::new(),
            pending_count: AtomicUsize::new(0),
            concurrent: AsyncMutex::new(HashMap::new()),
            started: AsyncMutex::new(None),
            local_addr: AsyncMutex::new(None),
            start: OneShot::new(),
            stop: OneShot::new(),
        })
    }
}

impl<C: Consumer> Default for TcpServerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
