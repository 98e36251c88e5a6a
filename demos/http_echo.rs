//! Minimal HTTP/1.x keep-alive echo server: `POST`s get their body echoed
//! back, anything else gets a 404.
use linkwire::http1::{Handler, Http1Consumer, Method, Request, Response};
use linkwire::limits::{ReqLimits, RespLimits};
use linkwire::server::tcp::TcpServer;
use std::sync::Arc;

struct Echo;

impl Handler for Echo {
    async fn call(&self, req: &Request) -> Response {
        match req.method {
            Method::Post => Response::ok().body(req.body.clone()),
            _ => Response::new(404, "Not Found"),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let server = TcpServer::builder()
        .consumer_factory(Arc::new(|| {
            Http1Consumer::new(Arc::new(Echo), ReqLimits::default(), RespLimits::default())
        }))
        .build();

    server.start_serving("127.0.0.1:8080").await.unwrap();
}
