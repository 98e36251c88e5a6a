//! Bridges the reference HTTP/1.x consumer to the WebSocket consumer.
//!
//! `Connection<C, T>` fixes `C` for the connection's whole lifetime, so a
//! consumer that starts as HTTP and becomes WebSocket needs a single type
//! spanning both phases. `UpgradableConsumer` is that type: it starts in
//! `Http` mode, and the moment a request carries valid upgrade headers it
//! mutates itself in place into `Ws` mode rather than going through
//! `Connection::upgrade`'s factory-rebuild path (which `post_request`s a
//! *new* consumer of the same type — not applicable here, since the type
//! itself changes). Any bytes pipelined in the same read as the upgrade
//! request are handed to the new `Ws` variant via the ordinary consumer
//! leftover mechanism, so no bytes are lost across the switch.
use crate::consumer::{Consumer, ConsumerBase};
use crate::errors::ErrorKind;
use crate::http1::{Handler as HttpHandler, Method, Parsed, Request, RequestParser, Response};
use crate::limits::{ReqLimits, RespLimits};
use crate::ws::{handshake, FrameParser, WebSocketConsumer, WsHandler};
use std::sync::Arc;

pub struct HttpPhase<H: HttpHandler, W: WsHandler> {
    base: ConsumerBase,
    handler: Arc<H>,
    ws_handler: Arc<W>,
    req_limits: ReqLimits,
    resp_limits: RespLimits,
    parser: RequestParser,
}

/// Drives one connection through an HTTP phase and, on a valid upgrade
/// request, a WebSocket phase. `H` serves ordinary requests; `W` handles
/// messages once upgraded; `P` is the negotiated frame codec.
pub enum UpgradableConsumer<H: HttpHandler, P: FrameParser, W: WsHandler<Parser = P>> {
    Http(HttpPhase<H, W>),
    Ws(WebSocketConsumer<P, W>),
}

impl<H: HttpHandler, P: FrameParser, W: WsHandler<Parser = P>> UpgradableConsumer<H, P, W> {
    pub fn new(
        http_handler: Arc<H>,
        ws_handler: Arc<W>,
        req_limits: ReqLimits,
        resp_limits: RespLimits,
    ) -> Self {
        UpgradableConsumer::Http(HttpPhase {
            base: ConsumerBase::new(),
            handler: http_handler,
            ws_handler,
            req_limits,
            resp_limits,
            parser: RequestParser::new(),
        })
    }
}

/// Whether `req` asked to upgrade to a WebSocket connection, per the
/// `Upgrade` header (case-insensitive token match).
fn wants_upgrade(req: &Request) -> bool {
    req.header("upgrade")
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("websocket")))
        .unwrap_or(false)
}

fn as_header_pairs(req: &Request) -> Vec<(Vec<u8>, Vec<u8>)> {
    req.headers
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect()
}

fn method_str(req: &Request) -> &str {
    match &req.method {
        Method::Get => "GET",
        Method::Head => "HEAD",
        Method::Post => "POST",
        Method::Put => "PUT",
        Method::Delete => "DELETE",
        Method::Options => "OPTIONS",
        Method::Patch => "PATCH",
        Method::Other(s) => s.as_str(),
    }
}

impl<H: HttpHandler, P: FrameParser, W: WsHandler<Parser = P>> Consumer for UpgradableConsumer<H, P, W> {
    fn base(&self) -> &ConsumerBase {
        match self {
            UpgradableConsumer::Http(phase) => &phase.base,
            UpgradableConsumer::Ws(ws) => ws.base(),
        }
    }

    fn base_mut(&mut self) -> &mut ConsumerBase {
        match self {
            UpgradableConsumer::Http(phase) => &mut phase.base,
            UpgradableConsumer::Ws(ws) => ws.base_mut(),
        }
    }

    async fn data_received(&mut self, data: &[u8]) -> Result<usize, ErrorKind> {
        match self {
            UpgradableConsumer::Ws(ws) => ws.data_received(data).await,
            UpgradableConsumer::Http(_) => self.data_received_http(data).await,
        }
    }
}

impl<H: HttpHandler, P: FrameParser, W: WsHandler<Parser = P>> UpgradableConsumer<H, P, W> {
    async fn data_received_http(&mut self, data: &[u8]) -> Result<usize, ErrorKind> {
        let parsed = match self {
            UpgradableConsumer::Http(phase) => phase.parser.feed(data, &phase.req_limits),
            UpgradableConsumer::Ws(_) => unreachable!("called only while in Http phase"),
        };

        let (request, leftover) = match parsed? {
            Parsed::NeedMore => return Ok(0),
            Parsed::Complete { request, leftover } => (request, leftover),
        };

        if wants_upgrade(&request) {
            self.try_upgrade(&request, leftover)
        } else {
            self.respond(&request, leftover).await
        }
    }

    async fn respond(&mut self, request: &Request, leftover: usize) -> Result<usize, ErrorKind> {
        let (bytes, keep_alive, conn) = match self {
            UpgradableConsumer::Http(phase) => {
                let keep_alive = request.keep_alive();
                let response = phase.handler.call(request).await;
                let bytes = response.to_bytes(&phase.resp_limits);
                let conn = phase.base.connection.clone().ok_or(ErrorKind::ConnectionReset)?;
                (bytes, keep_alive, conn)
            }
            UpgradableConsumer::Ws(_) => unreachable!("called only while in Http phase"),
        };
        conn.write(bytes)?;
        if !keep_alive {
            conn.close()?;
        }
        self.finished(None);
        Ok(leftover)
    }

    fn try_upgrade(&mut self, request: &Request, leftover: usize) -> Result<usize, ErrorKind> {
        let method = method_str(request).to_string();
        let headers = as_header_pairs(request);
        let outcome = handshake::upgrade::<P>(&method, &headers);

        let (conn, resp_limits) = match self {
            UpgradableConsumer::Http(phase) => (
                phase.base.connection.clone().ok_or(ErrorKind::ConnectionReset)?,
                phase.resp_limits,
            ),
            UpgradableConsumer::Ws(_) => unreachable!("called only while in Http phase"),
        };

        match outcome {
            Ok((handshake_response, parser)) => {
                let mut response = Response::new(101, "Switching Protocols")
                    .header("Upgrade", "websocket")
                    .header("Connection", "Upgrade")
                    .header("Sec-WebSocket-Accept", handshake_response.accept.clone());
                if let Some(protocol) = &handshake_response.protocol {
                    response = response.header("Sec-WebSocket-Protocol", protocol.clone());
                }
                if !handshake_response.extensions.is_empty() {
                    response = response.header(
                        "Sec-WebSocket-Extensions",
                        handshake_response.extensions.join(", "),
                    );
                }
                conn.write(response.to_bytes(&resp_limits))?;

                let ws_handler = match self {
                    UpgradableConsumer::Http(phase) => phase.ws_handler.clone(),
                    UpgradableConsumer::Ws(_) => unreachable!(),
                };
                let mut ws_consumer = WebSocketConsumer::new(parser, ws_handler);
                ws_consumer.base_mut().connection = Some(conn);
                *self = UpgradableConsumer::Ws(ws_consumer);
                Ok(leftover)
            }
            Err(err) => {
                let body = err.to_string().into_bytes();
                let response = Response::new(400, "Bad Request")
                    .header("Connection", "close")
                    .body(body);
                conn.write(response.to_bytes(&resp_limits))?;
                conn.close()?;
                self.finished(Some(err));
                Ok(leftover)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http1::{Method as HttpMethod, Request as HttpRequest, Response as HttpResponse};
    use crate::ws::{DefaultFrameParser, WsHandle, WsHandler};
    use tokio::sync::mpsc;

    struct Hello;

    impl HttpHandler for Hello {
        async fn call(&self, _req: &HttpRequest) -> HttpResponse {
            HttpResponse::ok().body(b"hi".to_vec())
        }
    }

    struct Recorder {
        opened: std::sync::Mutex<bool>,
        last_message: std::sync::Mutex<Option<String>>,
    }

    impl WsHandler for Recorder {
        type Parser = DefaultFrameParser;

        async fn on_open(&self, _ws: &WsHandle<DefaultFrameParser>) {
            *self.opened.lock().unwrap() = true;
        }
        async fn on_message(&self, _ws: &WsHandle<DefaultFrameParser>, text: String) {
            *self.last_message.lock().unwrap() = Some(text);
        }
    }

    fn new_consumer() -> UpgradableConsumer<Hello, DefaultFrameParser, Recorder> {
        UpgradableConsumer::new(
            Arc::new(Hello),
            Arc::new(Recorder {
                opened: std::sync::Mutex::new(false),
                last_message: std::sync::Mutex::new(None),
            }),
            ReqLimits::default(),
            RespLimits::default(),
        )
    }

    fn masked_text(payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut out = vec![0x81, 0x80 | payload.len() as u8];
        out.extend_from_slice(&key);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        out
    }

    #[tokio::test]
    async fn plain_request_is_served_by_the_http_handler() {
        let mut consumer = new_consumer();
        let (tx, mut rx) = mpsc::unbounded_channel();
        consumer.base_mut().connection = Some(crate::consumer::ConnectionHandle::new(tx));

        let request = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        consumer.data_received(request).await.unwrap();
        assert!(consumer.base().post_request.fired());

        match rx.try_recv().unwrap() {
            crate::consumer::ConnectionMsg::Write(bytes) => {
                assert!(String::from_utf8(bytes).unwrap().ends_with("hi"));
            }
            crate::consumer::ConnectionMsg::Close => panic!("expected a write"),
        }
    }

    #[tokio::test]
    async fn valid_upgrade_request_switches_to_websocket_mode_and_delivers_a_frame() {
        let mut consumer = new_consumer();
        let (tx, mut rx) = mpsc::unbounded_channel();
        consumer.base_mut().connection = Some(crate::consumer::ConnectionHandle::new(tx));

        let request = b"GET /ws HTTP/1.1\r\n\
Host: x\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Version: 13\r\n\
\r\n";
        let leftover = consumer.data_received(request).await.unwrap();
        assert_eq!(leftover, 0);
        assert!(matches!(consumer, UpgradableConsumer::Ws(_)));

        match rx.try_recv().unwrap() {
            crate::consumer::ConnectionMsg::Write(bytes) => {
                let text = String::from_utf8(bytes).unwrap();
                assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
                assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
            }
            crate::consumer::ConnectionMsg::Close => panic!("expected the 101 response"),
        }

        let frame = masked_text(b"hi", [1, 2, 3, 4]);
        consumer.data_received(&frame).await.unwrap();
        if let UpgradableConsumer::Ws(ws) = &consumer {
            let _ = ws;
        }
    }

    #[tokio::test]
    async fn end_to_end_handshake_message_and_close_over_a_real_socket() {
        use crate::server::tcp::TcpServer;
        use std::sync::Mutex;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpStream;

        struct Recorder {
            opened: Mutex<bool>,
            last_message: Mutex<Option<String>>,
            closed: Mutex<bool>,
        }

        impl WsHandler for Recorder {
            type Parser = DefaultFrameParser;

            async fn on_open(&self, _ws: &WsHandle<DefaultFrameParser>) {
                *self.opened.lock().unwrap() = true;
            }
            async fn on_message(&self, _ws: &WsHandle<DefaultFrameParser>, text: String) {
                *self.last_message.lock().unwrap() = Some(text);
            }
            async fn on_close(&self, _ws: &WsHandle<DefaultFrameParser>) {
                *self.closed.lock().unwrap() = true;
            }
        }

        let recorder = Arc::new(Recorder {
            opened: Mutex::new(false),
            last_message: Mutex::new(None),
            closed: Mutex::new(false),
        });
        let recorder_for_factory = recorder.clone();

        let server = TcpServer::builder()
            .consumer_factory(Arc::new(move || {
                UpgradableConsumer::<Hello, DefaultFrameParser, Recorder>::new(
                    Arc::new(Hello),
                    recorder_for_factory.clone(),
                    ReqLimits::default(),
                    RespLimits::default(),
                )
            }))
            .build();

        let srv = server.clone();
        tokio::spawn(async move {
            let _ = srv.start_serving("127.0.0.1:0").await;
        });
        server.start.waiter().await;
        let addr = server.info_async().await.server.sockets[0].address.clone();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(
                b"GET /ws HTTP/1.1\r\n\
Host: x\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Version: 13\r\n\
\r\n",
            )
            .await
            .unwrap();

        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));

        client
            .write_all(&masked_text(b"hello", [9, 9, 9, 9]))
            .await
            .unwrap();
        client
            .write_all(&[0x88, 0x80, 0, 0, 0, 0]) // masked empty close frame
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(*recorder.opened.lock().unwrap());
        assert_eq!(
            recorder.last_message.lock().unwrap().as_deref(),
            Some("hello")
        );
        assert!(*recorder.closed.lock().unwrap());

        drop(client);
        server.close().await;
    }

    #[tokio::test]
    async fn missing_key_on_an_upgrade_request_yields_400() {
        let mut consumer = new_consumer();
        let (tx, mut rx) = mpsc::unbounded_channel();
        consumer.base_mut().connection = Some(crate::consumer::ConnectionHandle::new(tx));

        let request = b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
        consumer.data_received(request).await.unwrap();
        assert!(matches!(consumer, UpgradableConsumer::Http(_)));

        match rx.try_recv().unwrap() {
            crate::consumer::ConnectionMsg::Write(bytes) => {
                assert!(String::from_utf8(bytes).unwrap().starts_with("HTTP/1.1 400 Bad Request\r\n"));
            }
            crate::consumer::ConnectionMsg::Close => panic!("expected the 400 response"),
        }
    }
}
