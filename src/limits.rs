//! Typed configuration for every tunable in the crate.
//!
//! Every struct here derives `Clone` and ships a documented `Default`.
//! Fields are public so callers can use struct-update syntax
//! (`ServerLimits { max_connections: 1000, ..Default::default() }`)
//! without a builder.
use std::time::Duration;

/// Server-level limits: how many connections to accept and how long to
/// wait for them to drain on shutdown.
///
/// # Handler
/// Each accepted connection is driven by its own [`tokio::spawn`]ed task —
/// there is no fixed worker pool to size; `max_connections` instead bounds
/// how many such tasks may be live at once, with further accepts queued
/// (or rejected once `max_pending_connections` is also exceeded).
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Maximum number of concurrent connections (default: `10_000`).
    ///
    /// Once reached, further accepted sockets are queued rather than
    /// immediately spawned; see `max_pending_connections`.
    pub max_connections: usize,

    /// Maximum number of accepted-but-not-yet-spawned connections held in
    /// the admission queue (default: `256`). Exceeding this drops the new
    /// connection without a response.
    pub max_pending_connections: usize,

    /// Maximum number of sessions this server will mint before initiating
    /// its own graceful close (default: `None`, unbounded).
    ///
    /// Existing connections are allowed to finish; no new ones are
    /// accepted once the cap is reached.
    pub max_requests: Option<u64>,

    /// Keep-alive window in seconds; `0` closes the connection after one
    /// consumer cycle (default: `75`).
    pub keep_alive: u64,

    /// Bound on how long `close()` waits for live connections to report
    /// `connection_lost` before abandoning them (default: `5 seconds`).
    pub close_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_pending_connections: 256,
            max_requests: None,
            keep_alive: 75,
            close_timeout: Duration::from_secs(5),

            _priv: (),
        }
    }
}

/// Connection-level write timeout and request cap.
///
/// There is deliberately no `socket_read_timeout` here: a read that's been
/// pending for a while is indistinguishable from a connection that's
/// legitimately idle between keep-alive requests, which is exactly what
/// [`IdleLimits::timeout`] already governs. A write that hangs, by
/// contrast, means the peer has stopped draining its receive buffer, which
/// is a real fault worth bounding independently.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum duration to wait for a write to complete (default: `3 seconds`).
    /// Exceeding it aborts the connection, mirroring a write error.
    pub socket_write_timeout: Duration,

    /// Maximum number of consumer cycles allowed per connection
    /// (default: `1000`). The connection closes after processing this many.
    pub max_requests_per_connection: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    fn default() -> Self {
        Self {
            socket_write_timeout: Duration::from_secs(3),
            max_requests_per_connection: 1000,

            _priv: (),
        }
    }
}

/// Watermarks for [`crate::flow::FlowControl`].
///
/// `low_limit` must be `<= high_limit`; violating this is a caller bug, not
/// a runtime error, so it is not validated at construction (mirrors the
/// rest of this module: limits are trusted configuration, not input).
#[derive(Debug, Clone, Copy)]
pub struct FlowLimits {
    /// Buffered-bytes threshold at or above which writes pause (default: `64 KB`).
    pub high_limit: usize,
    /// Buffered-bytes threshold at or below which writes resume (default: `16 KB`).
    pub low_limit: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for FlowLimits {
    fn default() -> Self {
        Self {
            high_limit: 64 * 1024,
            low_limit: 16 * 1024,

            _priv: (),
        }
    }
}

/// Idle-connection timer configuration.
#[derive(Debug, Clone, Copy)]
pub struct IdleLimits {
    /// Maximum interval without I/O before a soft close is fired
    /// (default: `30 seconds`). `Duration::ZERO` disables the timer.
    pub timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for IdleLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),

            _priv: (),
        }
    }
}

/// Producer-level session accounting limits.
#[derive(Debug, Clone, Copy)]
pub struct ProducerLimits {
    /// Hard cap on sessions this producer will mint (default: `None`).
    pub max_requests: Option<u64>,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ProducerLimits {
    fn default() -> Self {
        Self {
            max_requests: None,

            _priv: (),
        }
    }
}

/// Parsing limits for the reference HTTP/1.x consumer.
///
/// # Trade-off
/// Small limits reject legitimate large requests early and cheaply; large
/// limits accommodate bigger payloads at the cost of per-connection memory.
#[derive(Debug, Clone, Copy)]
pub struct ReqLimits {
    /// Maximum request-line length in bytes (default: `2048`).
    pub line_size: usize,
    /// Maximum number of headers per request (default: `32`).
    pub header_count: usize,
    /// Maximum single header line length in bytes (default: `4096`).
    pub header_line_size: usize,
    /// Maximum request body size in bytes (default: `1 MB`).
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            line_size: 2048,
            header_count: 32,
            header_line_size: 4096,
            body_size: 1024 * 1024,

            _priv: (),
        }
    }
}

/// Buffer sizing for the reference HTTP/1.x consumer's responses.
#[derive(Debug, Clone, Copy)]
pub struct RespLimits {
    /// Initial response buffer capacity (default: `1024 B`).
    pub default_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            default_capacity: 1024,

            _priv: (),
        }
    }
}
