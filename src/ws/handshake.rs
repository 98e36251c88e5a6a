//! RFC 6455 opening handshake: validates an upgrade request's headers and
//! computes the `Sec-WebSocket-Accept` response value.
use super::frame::FrameParser;
use crate::errors::ErrorKind;
use base64::{engine::general_purpose, Engine as _};
use sha1::{Digest, Sha1};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub struct HandshakeResponse {
    pub accept: String,
    pub protocol: Option<String>,
    pub extensions: Vec<String>,
}

/// Validates `method`/`headers` as a WebSocket upgrade request and
/// negotiates a frame parser of type `P`. Headers are looked up
/// case-insensitively; `Connection`/`Upgrade` are matched as
/// comma-separated token lists per RFC 7230.
pub fn upgrade<P: FrameParser>(
    method: &str,
    headers: &[(Vec<u8>, Vec<u8>)],
) -> Result<(HandshakeResponse, P), ErrorKind> {
    if !method.eq_ignore_ascii_case("GET") {
        return Err(ErrorKind::HandshakeError(format!(
            "upgrade request must use GET, got {method}"
        )));
    }

    let upgrade_header = header(headers, b"upgrade")
        .ok_or_else(|| ErrorKind::HandshakeError("missing Upgrade header".into()))?;
    if !contains_token(upgrade_header, "websocket") {
        return Err(ErrorKind::HandshakeError(
            "Upgrade header must contain \"websocket\"".into(),
        ));
    }

    let connection_header = header(headers, b"connection")
        .ok_or_else(|| ErrorKind::HandshakeError("missing Connection header".into()))?;
    if !contains_token(connection_header, "upgrade") {
        return Err(ErrorKind::HandshakeError(
            "Connection header must contain \"upgrade\"".into(),
        ));
    }

    let key = header(headers, b"sec-websocket-key")
        .ok_or_else(|| ErrorKind::HandshakeError("missing Sec-WebSocket-Key".into()))?;
    let key = std::str::from_utf8(key)
        .map_err(|_| ErrorKind::HandshakeError("Sec-WebSocket-Key is not valid UTF-8".into()))?;
    let decoded = general_purpose::STANDARD
        .decode(key)
        .map_err(|_| ErrorKind::HandshakeError("Sec-WebSocket-Key is not valid base64".into()))?;
    if decoded.len() != 16 {
        return Err(ErrorKind::HandshakeError(
            "Sec-WebSocket-Key must decode to 16 bytes".into(),
        ));
    }

    let version = header(headers, b"sec-websocket-version")
        .and_then(|v| std::str::from_utf8(v).ok())
        .unwrap_or("13");
    let protocols = header(headers, b"sec-websocket-protocol")
        .and_then(|v| std::str::from_utf8(v).ok())
        .map(split_csv)
        .unwrap_or_default();
    let extensions = header(headers, b"sec-websocket-extensions")
        .and_then(|v| std::str::from_utf8(v).ok())
        .map(split_csv)
        .unwrap_or_default();

    let parser = P::negotiate(version, &protocols, &extensions)?;

    let response = HandshakeResponse {
        accept: accept_key(key),
        protocol: parser.protocols().first().cloned(),
        extensions: parser.extensions().to_vec(),
    };
    Ok((response, parser))
}

/// `base64(sha1(key + GUID))`, per RFC 6455 section 4.2.2 step 5.4.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

fn header<'h>(headers: &'h [(Vec<u8>, Vec<u8>)], name: &[u8]) -> Option<&'h [u8]> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_slice())
}

fn contains_token(value: &[u8], token: &str) -> bool {
    std::str::from_utf8(value)
        .map(|s| s.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::frame::DefaultFrameParser;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(Vec<u8>, Vec<u8>)> {
        pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn rfc6455_test_vector_produces_the_documented_accept_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn valid_upgrade_request_succeeds() {
        let headers = headers(&[
            ("Host", "example.com"),
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
            ("Sec-WebSocket-Version", "13"),
        ]);
        let (response, _parser) = upgrade::<DefaultFrameParser>("GET", &headers).unwrap();
        assert_eq!(response.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(response.protocol.is_none());
    }

    #[test]
    fn rejects_non_get_method() {
        let headers = headers(&[
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
        ]);
        assert!(upgrade::<DefaultFrameParser>("POST", &headers).is_err());
    }

    #[test]
    fn rejects_missing_key() {
        let headers = headers(&[("Upgrade", "websocket"), ("Connection", "Upgrade")]);
        assert!(upgrade::<DefaultFrameParser>("GET", &headers).is_err());
    }

    #[test]
    fn rejects_key_of_wrong_decoded_length() {
        let headers = headers(&[
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            ("Sec-WebSocket-Key", "dG9vc2hvcnQ="),
        ]);
        assert!(upgrade::<DefaultFrameParser>("GET", &headers).is_err());
    }

    #[test]
    fn negotiates_the_first_offered_subprotocol() {
        let headers = headers(&[
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
            ("Sec-WebSocket-Protocol", "chat, superchat"),
        ]);
        let (response, _parser) = upgrade::<DefaultFrameParser>("GET", &headers).unwrap();
        assert_eq!(response.protocol.as_deref(), Some("chat"));
    }
}
