//! Incremental, buffer-based HTTP/1.x request parsing bound to a
//! `Consumer`. Unlike a zero-copy pull parser reading straight off the
//! socket, this accumulates bytes across `data_received` calls inside
//! `RequestParser` — the natural fit for a consumer that only ever sees
//! whatever chunk the owning `Connection` last read, which may split a
//! request line, a header, or the body across calls.
use super::message::{Request, Response};
use super::parser::{Parsed, RequestParser};
use crate::consumer::{Consumer, ConsumerBase};
use crate::errors::ErrorKind;
use crate::limits::{ReqLimits, RespLimits};
use std::sync::Arc;

/// Request handler invoked once per complete request. Mirrors the shape of
/// a conventional per-request callback: borrow the request, return the
/// response to send.
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, req: &Request) -> Response;
}

pub struct Http1Consumer<H: Handler> {
    base: ConsumerBase,
    handler: Arc<H>,
    req_limits: ReqLimits,
    resp_limits: RespLimits,
    parser: RequestParser,
}

impl<H: Handler> Http1Consumer<H> {
    pub fn new(handler: Arc<H>, req_limits: ReqLimits, resp_limits: RespLimits) -> Self {
        Http1Consumer {
            base: ConsumerBase::new(),
            handler,
            req_limits,
            resp_limits,
            parser: RequestParser::new(),
        }
    }

    async fn dispatch(&mut self, req: Request) -> Result<(), ErrorKind> {
        let keep_alive = req.keep_alive();
        let response = self.handler.call(&req).await;
        let bytes = response.to_bytes(&self.resp_limits);

        let conn = self.base.connection.clone().ok_or(ErrorKind::ConnectionReset)?;
        conn.write(bytes)?;
        if !keep_alive {
            conn.close()?;
        }
        Ok(())
    }
}

impl<H: Handler> Consumer for Http1Consumer<H> {
    fn base(&self) -> &ConsumerBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut ConsumerBase {
        &mut self.base
    }

    async fn data_received(&mut self, data: &[u8]) -> Result<usize, ErrorKind> {
        match self.parser.feed(data, &self.req_limits)? {
            Parsed::NeedMore => Ok(0),
            Parsed::Complete { request, leftover } => {
                self.dispatch(request).await?;
                self.finished(None);
                Ok(leftover)
            }
        }
    }
}
