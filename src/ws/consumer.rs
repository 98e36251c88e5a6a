//! Bridges the frame codec to application code: `WebSocketConsumer` is a
//! `Consumer` that decodes frames and dispatches them to a `WsHandler`.
use super::frame::{FrameParser, OpCode, OutboundFrame};
use crate::consumer::{Consumer, ConsumerBase, ConnectionHandle};
use crate::errors::ErrorKind;
use std::sync::Arc;

/// The handle a `WsHandler` callback gets for writing back to the same
/// connection the incoming frame arrived on. Carries its own copy of the
/// negotiated `FrameParser` so it can encode independent of whatever the
/// consumer's own instance is doing mid-decode.
#[derive(Clone)]
pub struct WsHandle<P: FrameParser> {
    connection: ConnectionHandle,
    parser: P,
}

impl<P: FrameParser> WsHandle<P> {
    /// Encodes and writes one outbound frame. Writing a close frame also
    /// closes the owning connection, mirroring the effect of receiving one.
    pub fn write_frame(&self, frame: OutboundFrame) -> Result<(), ErrorKind> {
        let is_close = matches!(frame, OutboundFrame::Close);
        let bytes = self.parser.encode(frame);
        self.connection.write(bytes)?;
        if is_close {
            self.connection.close()?;
        }
        Ok(())
    }
}

/// Application callbacks for one upgraded connection. Every method is
/// handed a [`WsHandle`] so it can write frames back on the same
/// connection; all have empty default bodies so a handler only needs to
/// override what it cares about.
pub trait WsHandler: Send + Sync + 'static {
    type Parser: FrameParser;

    async fn on_open(&self, _ws: &WsHandle<Self::Parser>) {}
    async fn on_message(&self, _ws: &WsHandle<Self::Parser>, _text: String) {}
    async fn on_bytes(&self, _ws: &WsHandle<Self::Parser>, _data: Vec<u8>) {}
    async fn on_ping(&self, _ws: &WsHandle<Self::Parser>, _data: Vec<u8>) {}
    async fn on_pong(&self, _ws: &WsHandle<Self::Parser>, _data: Vec<u8>) {}
    async fn on_close(&self, _ws: &WsHandle<Self::Parser>) {}
}

/// A `Consumer` that owns a negotiated `FrameParser` and forwards decoded
/// frames to an `Arc<H>` handler shared across every connection a server
/// mints (the handler itself carries no per-connection state).
pub struct WebSocketConsumer<P: FrameParser, H: WsHandler<Parser = P>> {
    base: ConsumerBase,
    parser: P,
    handler: Arc<H>,
    opened: bool,
}

impl<P: FrameParser, H: WsHandler<Parser = P>> WebSocketConsumer<P, H> {
    pub fn new(parser: P, handler: Arc<H>) -> Self {
        WebSocketConsumer {
            base: ConsumerBase::new(),
            parser,
            handler,
            opened: false,
        }
    }

    /// Encodes and writes one outbound frame via the owning connection.
    /// Writing a close frame also marks this consumer finished, mirroring
    /// the effect of receiving one.
    pub fn write_frame(&mut self, frame: OutboundFrame) -> Result<(), ErrorKind> {
        let is_close = matches!(frame, OutboundFrame::Close);
        let bytes = self.parser.encode(frame);
        let conn = self
            .base
            .connection
            .clone()
            .ok_or(ErrorKind::ConnectionReset)?;
        conn.write(bytes)?;
        if is_close {
            self.finished(None);
        }
        Ok(())
    }

    fn handle(&self) -> Result<WsHandle<P>, ErrorKind> {
        Ok(WsHandle {
            connection: self.base.connection.clone().ok_or(ErrorKind::ConnectionReset)?,
            parser: self.parser.clone(),
        })
    }

    async fn dispatch(&mut self, frame: super::frame::Frame) {
        let Ok(ws) = self.handle() else { return };

        if !self.opened && frame.opcode != OpCode::Close {
            self.opened = true;
            self.handler.on_open(&ws).await;
        }
        match frame.opcode {
            OpCode::Close => {
                self.finished(None);
                self.handler.on_close(&ws).await;
            }
            OpCode::Text => {
                if let Ok(text) = String::from_utf8(frame.payload) {
                    self.handler.on_message(&ws, text).await;
                }
            }
            OpCode::Binary => self.handler.on_bytes(&ws, frame.payload).await,
            OpCode::Ping => self.handler.on_ping(&ws, frame.payload).await,
            OpCode::Pong => self.handler.on_pong(&ws, frame.payload).await,
            OpCode::Continuation => {}
        }
    }
}

impl<P: FrameParser, H: WsHandler<Parser = P>> Consumer for WebSocketConsumer<P, H> {
    fn base(&self) -> &ConsumerBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ConsumerBase {
        &mut self.base
    }

    async fn data_received(&mut self, data: &[u8]) -> Result<usize, ErrorKind> {
        let (frames, leftover) = self.parser.decode(data);
        for frame in frames {
            self.dispatch(frame).await;
            if self.base.post_request.fired() {
                break;
            }
        }
        Ok(leftover)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::frame::DefaultFrameParser;
    use crate::consumer::{ConnectionHandle, ConnectionMsg};
    use tokio::sync::mpsc;

    struct Echo;

    impl WsHandler for Echo {
        type Parser = DefaultFrameParser;
    }

    fn masked_text(payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut out = vec![0x81, 0x80 | payload.len() as u8];
        out.extend_from_slice(&key);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        out
    }

    #[tokio::test]
    async fn text_frame_invokes_on_message_and_consumes_all_bytes() {
        struct Recorder {
            last: std::sync::Mutex<Option<String>>,
        }
        impl WsHandler for Recorder {
            type Parser = DefaultFrameParser;

            async fn on_message(&self, _ws: &WsHandle<DefaultFrameParser>, text: String) {
                *self.last.lock().unwrap() = Some(text);
            }
        }

        let parser = DefaultFrameParser::negotiate("13", &[], &[]).unwrap();
        let handler = Arc::new(Recorder {
            last: std::sync::Mutex::new(None),
        });
        let mut consumer = WebSocketConsumer::new(parser, handler.clone());
        consumer.base_mut().connection = Some(ConnectionHandle::new(mpsc::unbounded_channel().0));
        let wire = masked_text(b"hi", [1, 2, 3, 4]);
        let leftover = consumer.data_received(&wire).await.unwrap();
        assert_eq!(leftover, 0);
        assert_eq!(handler.last.lock().unwrap().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn close_frame_marks_the_consumer_finished() {
        let parser = DefaultFrameParser::negotiate("13", &[], &[]).unwrap();
        let mut consumer = WebSocketConsumer::new(parser, Arc::new(Echo));
        consumer.base_mut().connection = Some(ConnectionHandle::new(mpsc::unbounded_channel().0));
        let wire = vec![0x88, 0x80, 0, 0, 0, 0]; // masked empty close frame
        consumer.data_received(&wire).await.unwrap();
        assert!(consumer.base().post_request.fired());
    }

    #[tokio::test]
    async fn close_as_first_frame_never_triggers_on_open() {
        struct Recorder {
            opened: std::sync::atomic::AtomicBool,
        }
        impl WsHandler for Recorder {
            type Parser = DefaultFrameParser;

            async fn on_open(&self, _ws: &WsHandle<DefaultFrameParser>) {
                self.opened.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let parser = DefaultFrameParser::negotiate("13", &[], &[]).unwrap();
        let handler = Arc::new(Recorder {
            opened: std::sync::atomic::AtomicBool::new(false),
        });
        let mut consumer = WebSocketConsumer::new(parser, handler.clone());
        consumer.base_mut().connection = Some(ConnectionHandle::new(mpsc::unbounded_channel().0));
        let wire = vec![0x88, 0x80, 0, 0, 0, 0]; // masked empty close frame
        consumer.data_received(&wire).await.unwrap();
        assert!(!handler.opened.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn write_frame_sends_bytes_through_the_connection_handle() {
        let parser = DefaultFrameParser::negotiate("13", &[], &[]).unwrap();
        let mut consumer = WebSocketConsumer::new(parser, Arc::new(Echo));
        let (tx, mut rx) = mpsc::unbounded_channel();
        consumer.base_mut().connection = Some(ConnectionHandle::new(tx));
        consumer
            .write_frame(OutboundFrame::Text("hi".to_string()))
            .unwrap();
        match rx.try_recv().unwrap() {
            ConnectionMsg::Write(bytes) => assert_eq!(bytes, vec![0x81, 0x02, b'h', b'i']),
            ConnectionMsg::Close => panic!("expected a write"),
        }
    }
}
