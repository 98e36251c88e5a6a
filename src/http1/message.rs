//! Request/response types for the reference HTTP/1.x consumer.
use crate::limits::RespLimits;

/// HTTP request methods.
///
/// # References
/// - [RFC 7231, Section 4](https://datatracker.ietf.org/doc/html/rfc7231#section-4)
/// - [RFC 5789](https://datatracker.ietf.org/doc/html/rfc5789) (PATCH method)
///
/// `TRACE` and `CONNECT` are not recognized; either is reported as
/// `Method::Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
    Other(String),
}

impl Method {
    fn parse(raw: &[u8]) -> Self {
        match raw {
            b"GET" => Method::Get,
            b"HEAD" => Method::Head,
            b"POST" => Method::Post,
            b"PUT" => Method::Put,
            b"DELETE" => Method::Delete,
            b"OPTIONS" => Method::Options,
            b"PATCH" => Method::Patch,
            other => Method::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    fn parse(raw: &[u8]) -> Option<Self> {
        match raw {
            b"HTTP/1.0" => Some(Version::Http10),
            b"HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// A fully parsed request. Headers preserve their original order and
/// casing; lookups are case-insensitive linear scans, which is fine at the
/// header counts this consumer allows (`ReqLimits::header_count`).
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub version: Version,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub(crate) fn parse_line(line: &[u8]) -> Option<(Method, String, Version)> {
        let line = line.strip_suffix(b"\r\n").or_else(|| line.strip_suffix(b"\n"))?;
        let mut parts = line.split(|&b| b == b' ');
        let method = Method::parse(parts.next()?);
        let path = std::str::from_utf8(parts.next()?).ok()?.to_string();
        let version = Version::parse(parts.next()?)?;
        Some((method, path, version))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn keep_alive(&self) -> bool {
        match self.header("connection") {
            Some(value) => !value.eq_ignore_ascii_case("close"),
            None => self.version == Version::Http11,
        }
    }
}

/// A response under construction. `to_bytes` is the only way to get wire
/// bytes out; there is no streaming body support.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub version: Version,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, reason: &'static str) -> Self {
        Response {
            status,
            reason,
            version: Version::Http11,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Response::new(200, "OK")
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub(crate) fn to_bytes(&self, resp_limits: &RespLimits) -> Vec<u8> {
        let mut out = Vec::with_capacity(resp_limits.default_capacity);
        out.extend_from_slice(self.version.as_str().as_bytes());
        out.extend_from_slice(format!(" {} {}\r\n", self.status, self.reason).as_bytes());
        let has_content_length = self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-length"));
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        if !has_content_length {
            out.extend_from_slice(format!("content-length: {}\r\n", self.body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_request_line() {
        let (method, path, version) = Request::parse_line(b"GET /foo HTTP/1.1\r\n").unwrap();
        assert_eq!(method, Method::Get);
        assert_eq!(path, "/foo");
        assert_eq!(version, Version::Http11);
    }

    #[test]
    fn unknown_method_is_other() {
        let (method, ..) = Request::parse_line(b"PROPFIND / HTTP/1.1\r\n").unwrap();
        assert_eq!(method, Method::Other("PROPFIND".to_string()));
    }

    #[test]
    fn response_adds_content_length_when_absent() {
        let resp = Response::ok().body(b"hi".to_vec());
        let bytes = resp.to_bytes(&RespLimits::default());
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("content-length: 2\r\n"));
        assert!(text.ends_with("hi"));
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        let req10 = Request {
            method: Method::Get,
            path: "/".into(),
            version: Version::Http10,
            headers: Vec::new(),
            body: Vec::new(),
        };
        assert!(!req10.keep_alive());

        let req11 = Request {
            version: Version::Http11,
            ..req10
        };
        assert!(req11.keep_alive());
    }
}
