//! The incremental request-line/header/body state machine, factored out of
//! [`super::consumer::Http1Consumer`] so the upgrade bridge in
//! [`crate::upgrade`] can parse a request without also inheriting
//! `Http1Consumer`'s unconditional dispatch-to-handler behavior.
use super::message::{Method, Request, Version};
use crate::errors::ErrorKind;
use crate::limits::ReqLimits;
use memchr::memchr;

enum State {
    RequestLine,
    Headers,
    Body,
    Done,
}

pub enum Parsed {
    NeedMore,
    /// `leftover` is the number of trailing bytes of the most recent `feed`
    /// call not consumed by this request (e.g. a pipelined next request).
    Complete { request: Request, leftover: usize },
}

/// Single-use: construct one per request, call `feed` until it reports
/// `Complete`, then discard it.
pub struct RequestParser {
    buf: Vec<u8>,
    state: State,
    method: Option<Method>,
    path: Option<String>,
    version: Option<Version>,
    headers: Vec<(String, String)>,
    content_length: usize,
}

impl RequestParser {
    pub fn new() -> Self {
        RequestParser {
            buf: Vec::new(),
            state: State::RequestLine,
            method: None,
            path: None,
            version: None,
            headers: Vec::new(),
            content_length: 0,
        }
    }

    fn take_line(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, ErrorKind> {
        match memchr(b'\n', &self.buf) {
            Some(pos) => Ok(Some(self.buf.drain(..=pos).collect())),
            None if self.buf.len() > max_len => {
                Err(ErrorKind::ProtocolError(format!("line exceeds {max_len} bytes")))
            }
            None => Ok(None),
        }
    }

    pub fn feed(&mut self, data: &[u8], limits: &ReqLimits) -> Result<Parsed, ErrorKind> {
        self.buf.extend_from_slice(data);

        loop {
            match self.state {
                State::RequestLine => match self.take_line(limits.line_size)? {
                    Some(line) => {
                        let (method, path, version) = Request::parse_line(&line)
                            .ok_or_else(|| ErrorKind::ProtocolError("malformed request line".into()))?;
                        self.method = Some(method);
                        self.path = Some(path);
                        self.version = Some(version);
                        self.state = State::Headers;
                    }
                    None => return Ok(Parsed::NeedMore),
                },
                State::Headers => match self.take_line(limits.header_line_size)? {
                    Some(line) => {
                        if line == b"\r\n" || line == b"\n" {
                            self.state = State::Body;
                        } else {
                            if self.headers.len() >= limits.header_count {
                                return Err(ErrorKind::ProtocolError("too many headers".into()));
                            }
                            let trimmed = line
                                .strip_suffix(b"\r\n")
                                .or_else(|| line.strip_suffix(b"\n"))
                                .unwrap_or(&line);
                            let text = std::str::from_utf8(trimmed)
                                .map_err(|_| ErrorKind::ProtocolError("header is not UTF-8".into()))?;
                            let (name, value) = text
                                .split_once(':')
                                .ok_or_else(|| ErrorKind::ProtocolError("malformed header".into()))?;
                            self.headers.push((name.trim().to_string(), value.trim().to_string()));
                        }
                    }
                    None => return Ok(Parsed::NeedMore),
                },
                State::Body => {
                    self.content_length = self
                        .headers
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, v)| v.parse().ok())
                        .unwrap_or(0);
                    if self.content_length > limits.body_size {
                        return Err(ErrorKind::ProtocolError("body exceeds configured limit".into()));
                    }
                    if self.buf.len() < self.content_length {
                        return Ok(Parsed::NeedMore);
                    }
                    self.state = State::Done;
                }
                State::Done => {
                    let leftover = self.buf.split_off(self.content_length);
                    let body = std::mem::take(&mut self.buf);
                    let request = Request {
                        method: self.method.take().expect("request line parsed before Done"),
                        path: self.path.take().expect("request line parsed before Done"),
                        version: self.version.take().expect("request line parsed before Done"),
                        headers: std::mem::take(&mut self.headers),
                        body,
                    };
                    return Ok(Parsed::Complete {
                        request,
                        leftover: leftover.len(),
                    });
                }
            }
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}
