//! WebSocket echo server: any `GET` carrying upgrade headers is switched to
//! framed mode, after which every text message is sent straight back.
use linkwire::http1::{Handler, Request, Response};
use linkwire::limits::{ReqLimits, RespLimits};
use linkwire::server::tcp::TcpServer;
use linkwire::upgrade::UpgradableConsumer;
use linkwire::ws::{DefaultFrameParser, OutboundFrame, WsHandle, WsHandler};
use std::sync::Arc;

struct NotFound;

impl Handler for NotFound {
    async fn call(&self, _req: &Request) -> Response {
        Response::new(404, "Not Found")
    }
}

struct Echo;

impl WsHandler for Echo {
    type Parser = DefaultFrameParser;

    async fn on_message(&self, ws: &WsHandle<DefaultFrameParser>, text: String) {
        tracing::info!(%text, "echoing message");
        if let Err(err) = ws.write_frame(OutboundFrame::Text(text)) {
            tracing::warn!(%err, "failed to echo message");
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let server = TcpServer::builder()
        .consumer_factory(Arc::new(|| {
            UpgradableConsumer::<NotFound, DefaultFrameParser, Echo>::new(
                Arc::new(NotFound),
                Arc::new(Echo),
                ReqLimits::default(),
                RespLimits::default(),
            )
        }))
        .build();

    server.start_serving("127.0.0.1:8081").await.unwrap();
}
