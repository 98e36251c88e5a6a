//! `DatagramServer`: same `Init -> Serving -> Closed` lifecycle as
//! `TcpServer`, but connectionless — each datagram gets its own ephemeral
//! consumer rather than a persistent `Connection`.
use crate::connection::ConsumerFactory;
use crate::consumer::{Consumer, ConnectionHandle, ConnectionMsg};
use crate::events::{Many, OneShot};
use crate::limits::ProducerLimits;
use crate::producer::{Producer, ProducerState};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::warn;

const STATE_INIT: u8 = 0;
const STATE_SERVING: u8 = 1;
const STATE_CLOSED: u8 = 2;

pub struct DatagramServer<C: Consumer> {
    producer: ProducerState,
    producer_limits: ProducerLimits,
    consumer_factory: ConsumerFactory<C>,
    data_received_many: Many<usize>,
    data_processed_many: Many<usize>,
    state: AtomicU8,
    local_addr: AsyncMutex<Option<SocketAddr>>,
    pub start: OneShot<()>,
    pub stop: OneShot<()>,
}

impl<C: Consumer> Producer for DatagramServer<C> {
    fn state(&self) -> &ProducerState {
        &self.producer
    }
    fn limits(&self) -> &ProducerLimits {
        &self.producer_limits
    }
}

impl<C: Consumer> DatagramServer<C> {
    pub fn builder() -> DatagramServerBuilder<C> {
        DatagramServerBuilder::new()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Binds `addr` and serves datagrams until `close()` is called.
    pub async fn create_endpoint(
        self: &Arc<Self>,
        addr: impl ToSocketAddrs,
    ) -> std::io::Result<()> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        *self.local_addr.lock().await = socket.local_addr().ok();
        self.state.store(STATE_SERVING, Ordering::SeqCst);

        let this = self.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let _ = this.start.fire(());
        });

        let mut buf = vec![0u8; 64 * 1024];
        loop {
            if self.state.load(Ordering::SeqCst) == STATE_CLOSED {
                break;
            }
            match socket.recv_from(&mut buf).await {
                Ok((n, peer)) => {
                    let datagram = buf[..n].to_vec();
                    self.clone().spawn_datagram(socket.clone(), datagram, peer);
                }
                Err(err) => warn!(%err, "datagram recv failed"),
            }
        }
        Ok(())
    }

    fn spawn_datagram(self: Arc<Self>, socket: Arc<UdpSocket>, data: Vec<u8>, peer: std::net::SocketAddr) {
        tokio::spawn(async move {
            self.producer.next_session();

            let mut consumer = (self.consumer_factory)();
            let (tx, mut rx) = mpsc::unbounded_channel();
            consumer.base_mut().connection = Some(ConnectionHandle::new(tx));
            consumer
                .base()
                .data_received_event
                .copy_many_times_events(&self.data_received_many);
            consumer
                .base()
                .data_processed
                .copy_many_times_events(&self.data_processed_many);

            let _ = consumer.data_received_internal(&data).await;

            while let Ok(msg) = rx.try_recv() {
                if let ConnectionMsg::Write(bytes) = msg {
                    let _ = socket.send_to(&bytes, peer).await;
                }
            }
            self.producer.record_processed(1);
        });
    }

    /// Stops the receive loop and fires `stop`. There is no per-datagram
    /// state to drain — in-flight handlers finish on their own.
    pub async fn close(self: &Arc<Self>) {
        if self.state.swap(STATE_CLOSED, Ordering::SeqCst) == STATE_CLOSED {
            return;
        }
        let _ = self.stop.fire(());
    }
}

pub struct DatagramServerBuilder<C: Consumer> {
    producer_limits: ProducerLimits,
    consumer_factory: Option<ConsumerFactory<C>>,
}

impl<C: Consumer> DatagramServerBuilder<C> {
    pub fn new() -> Self {
        DatagramServerBuilder {
            producer_limits: ProducerLimits::default(),
            consumer_factory: None,
        }
    }

    pub fn consumer_factory(mut self, factory: ConsumerFactory<C>) -> Self {
        self.consumer_factory = Some(factory);
        self
    }

    pub fn producer_limits(mut self, limits: ProducerLimits) -> Self {
        self.producer_limits = limits;
        self
    }

    /// # Panics
    /// If no `consumer_factory` was set.
    pub fn build(self) -> Arc<DatagramServer<C>> {
        Arc::new(DatagramServer {
            producer: ProducerState::new(),
            producer_limits: self.producer_limits,
            consumer_factory: self
                .consumer_factory
                .expect("DatagramServerBuilder::build called without a consumer_factory"),
            data_received_many: Many::new(),
            data_processed_many: Many::new(),
            state: AtomicU8::new(STATE_INIT),
            local_addr: AsyncMutex::new(None),
            start: OneShot::new(),
            stop: OneShot::new(),
        })
    }
}

impl<C: Consumer> Default for DatagramServerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ConsumerBase;
    use crate::errors::ErrorKind;
    use std::time::Duration;
    use tokio::net::UdpSocket as ClientSocket;

    struct Upper {
        base: ConsumerBase,
    }

    impl Upper {
        fn new() -> Self {
            Upper {
                base: ConsumerBase::new(),
            }
        }
    }

    impl Consumer for Upper {
        fn base(&self) -> &ConsumerBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut ConsumerBase {
            &mut self.base
        }
        async fn data_received(&mut self, data: &[u8]) -> Result<usize, ErrorKind> {
            let reply = data.to_ascii_uppercase();
            if let Some(conn) = self.base.connection.clone() {
                let _ = conn.write(reply);
            }
            self.finished(None);
            Ok(0)
        }
    }

    #[tokio::test]
    async fn echoes_uppercased_datagram() {
        let server = DatagramServer::builder()
            .consumer_factory(Arc::new(Upper::new))
            .build();

        let srv = server.clone();
        tokio::spawn(async move {
            let _ = srv.create_endpoint("127.0.0.1:0").await;
        });
        server.start.waiter().await;
        let addr = server.local_addr().await.unwrap();

        let client = ClientSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"hello", addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"HELLO");

        server.close().await;
    }
}
