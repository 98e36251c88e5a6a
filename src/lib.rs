//! linkwire - a connection-oriented async network I/O framework.
//!
//! A small set of cooperating abstractions for accepting incoming TCP or
//! datagram traffic, binding each socket to a stateful protocol handler,
//! and routing received bytes through a pluggable *consumer* that parses
//! and responds — including mid-stream protocol upgrades, the flagship
//! case being the WebSocket handshake-to-framed-message handoff.
//!
//! # Protocol Support
//!
//! - **TCP**: connection-oriented, keep-alive request multiplexing on one
//!   socket via consumer rotation.
//! - **Datagram**: connectionless, one ephemeral consumer per packet.
//! - **WebSocket**: [`ws`] provides an RFC 6455 handshake validator and
//!   frame codec; [`upgrade::UpgradableConsumer`] drives an HTTP request
//!   straight into a WebSocket connection on the same socket.
//! - **HTTP/1.x**: [`http1`] is a minimal keep-alive request/response
//!   consumer, sufficient to exercise the rest of the stack end to end.
//!
//! # Features
//!
//! ## Flow control & timeouts
//! - **Back-pressure** via [`flow::FlowControl`] high/low watermarks over
//!   the connection's own pending-write buffer.
//! - **Idle timeouts** via [`timeout::IdleTimeout`], escalating to a hard
//!   abort if a graceful close doesn't complete in time.
//!
//! ## Production Ready
//! - **Graceful shutdown** — [`server::tcp::TcpServer::close`] drains live
//!   connections up to a configured timeout before abandoning stragglers.
//! - **Structured logging** via `tracing` at every state transition.
//! - **Typed, documented configuration** in [`limits`], with sane defaults
//!   and `..Default::default()` struct-update ergonomics.
//!
//! # Quick Start
//!
//! ```no_run
//! use linkwire::consumer::{Consumer, ConsumerBase};
//! use linkwire::errors::ErrorKind;
//! use linkwire::server::tcp::TcpServer;
//! use std::sync::Arc;
//!
//! struct EchoLine {
//!     base: ConsumerBase,
//! }
//!
//! impl Consumer for EchoLine {
//!     fn base(&self) -> &ConsumerBase { &self.base }
//!     fn base_mut(&mut self) -> &mut ConsumerBase { &mut self.base }
//!
//!     async fn data_received(&mut self, data: &[u8]) -> Result<usize, ErrorKind> {
//!         if let Some(pos) = data.iter().position(|&b| b == b'\n') {
//!             if let Some(conn) = self.base.connection.clone() {
//!                 let _ = conn.write(data[..=pos].to_vec());
//!             }
//!             self.finished(None);
//!             Ok(data.len() - pos - 1)
//!         } else {
//!             Ok(0)
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = TcpServer::builder()
//!         .consumer_factory(Arc::new(|| EchoLine { base: ConsumerBase::new() }))
//!         .build();
//!     server.start_serving("127.0.0.1:8080").await.unwrap();
//! }
//! ```
pub mod connection;
pub mod consumer;
pub mod errors;
pub mod events;
pub mod flow;
pub mod http1;
pub mod limits;
pub mod producer;
pub mod protocol;
pub mod server;
pub mod timeout;
pub mod upgrade;
pub mod ws;

pub use crate::connection::{Connection, ConsumerFactory};
pub use crate::consumer::{Consumer, ConsumerBase};
pub use crate::errors::ErrorKind;
pub use crate::producer::{Producer, ProducerState};
pub use crate::protocol::{CloseState, ProtocolBase, Session, Transport};
pub use crate::server::{
    datagram::DatagramServer,
    tcp::TcpServer,
    ClientsInfo, Info, ServerInfo, SocketInfo,
};
