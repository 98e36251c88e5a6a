//! WebSocket upgrade, frame codec, and the `Consumer` that bridges them to
//! application code.
pub mod consumer;
pub mod frame;
pub mod handshake;

pub use consumer::{WebSocketConsumer, WsHandle, WsHandler};
pub use frame::{DefaultFrameParser, Frame, FrameParser, OpCode, OutboundFrame};
pub use handshake::{accept_key, upgrade, HandshakeResponse};
