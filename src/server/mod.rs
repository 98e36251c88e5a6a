//! Server lifecycle managers: [`tcp::TcpServer`] (connection-oriented) and
//! [`datagram::DatagramServer`] (connectionless), plus the introspection
//! shape both serialize via `serde`.
pub mod datagram;
pub mod tcp;

use serde::Serialize;

/// `Server::info()` snapshot, matching the shape the distilled source's
/// `info()` call produces.
#[derive(Debug, Serialize)]
pub struct Info {
    pub server: ServerInfo,
    pub clients: ClientsInfo,
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub uptime_in_seconds: u64,
    pub sockets: Vec<SocketInfo>,
    pub max_requests: Option<u64>,
    pub keep_alive: u64,
}

#[derive(Debug, Serialize)]
pub struct SocketInfo {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct ClientsInfo {
    pub processed_clients: u64,
    pub connected_clients: u64,
    pub requests_processed: u64,
}
