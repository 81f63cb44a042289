//! HTTP Upgrade handshake negotiation across every draft this server
//! understands: Hixie-75, Hybi-00, Hybi-07, Hybi-10, and RFC6455.
//!
//! Draft is classified from the header set exactly as the four-way
//! branch in a hand-rolled C parser would: presence of
//! `Sec-WebSocket-Version` wins first (7/8/13), then `Sec-WebSocket-Key1`
//! + `Key2` implies Hybi-00, and a bare Upgrade/Connection/Host/Origin set
//! with none of the above falls back to Hixie-75.

use crate::acl::Acl;
use crate::codec::Draft;
use crate::error::Error;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use md5::{Digest as Md5Digest, Md5};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, AsyncBufReadExt, BufReader};

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub struct HandshakeRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub key3: Option<[u8; 8]>,
}

impl HandshakeRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

/// Reads one HTTP request off `reader`: the request line, headers up to
/// the blank-line terminator, and — when the header set identifies a
/// Hybi-00 handshake — the trailing 8 raw "key3" bytes that follow the
/// terminator instead of being sent as a header line.
///
/// Accepts a bare `\n\n` terminator in addition to `\r\n\r\n` when
/// `lenient_terminator` is set, for very old Hixie-75 clients that don't
/// send CRLF-terminated lines.
pub async fn read_request<R>(
    reader: &mut BufReader<R>,
    lenient_terminator: bool,
) -> Result<HandshakeRequest, Error>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut raw = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::IncompleteHTTPRequest);
        }
        raw.push_str(&line);
        let terminated = raw.ends_with("\r\n\r\n") || (lenient_terminator && raw.ends_with("\n\n"));
        if terminated {
            break;
        }
    }

    let mut header_buf = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut header_buf);
    match req.parse(raw.as_bytes()) {
        Ok(httparse::Status::Complete(_)) | Ok(httparse::Status::Partial) => {}
        Err(e) => return Err(Error::HttpParseError { source: e }),
    }

    let method = req.method.unwrap_or("").to_string();
    let path = req.path.unwrap_or("").to_string();
    let mut headers = HashMap::new();
    for h in req.headers.iter() {
        if h.name.is_empty() {
            continue;
        }
        headers.insert(
            h.name.to_ascii_lowercase(),
            String::from_utf8_lossy(h.value).trim().to_string(),
        );
    }

    let looks_like_hybi00 = headers.contains_key("sec-websocket-key1")
        && headers.contains_key("sec-websocket-key2");

    let key3 = if looks_like_hybi00 {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).await?;
        Some(buf)
    } else {
        None
    };

    Ok(HandshakeRequest {
        method,
        path,
        headers,
        key3,
    })
}

pub fn classify_draft(request: &HandshakeRequest) -> Result<Draft, Error> {
    if let Some(version) = request.header("sec-websocket-version") {
        return match version {
            "13" => Ok(Draft::Rfc6455),
            "8" => Ok(Draft::Hybi10),
            "7" => Ok(Draft::Hybi07),
            _ => Err(Error::NoUpgrade),
        };
    }

    if request.header("sec-websocket-key1").is_some() && request.header("sec-websocket-key2").is_some()
    {
        return Ok(Draft::Hybi00);
    }

    if request.header("upgrade").is_some()
        && request.header("connection").is_some()
        && request.header("host").is_some()
        && request.header("origin").is_some()
    {
        return Ok(Draft::Hixie75);
    }

    Err(Error::InvalidHTTPHandshake)
}

fn digits_divided_by_spaces(raw: &str) -> Result<u32, Error> {
    let mut digits = String::new();
    let mut spaces: u64 = 0;
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if ch == ' ' {
            spaces += 1;
        }
    }
    if spaces < 1 || digits.is_empty() {
        return Err(Error::InvalidHybi00Key);
    }
    let value: u64 = digits.parse().map_err(|_| Error::InvalidHybi00Key)?;
    if value % spaces != 0 {
        return Err(Error::InvalidHybi00Key);
    }
    let divided = value / spaces;
    u32::try_from(divided).map_err(|_| Error::InvalidHybi00Key)
}

/// Computes the 16-byte Hybi-00 accept payload: MD5 over
/// `key1_be(4) || key2_be(4) || key3(8)`, per RFC 6455 Appendix A's
/// description of the legacy handshake.
pub fn hybi00_accept(key1: &str, key2: &str, key3: &[u8; 8]) -> Result<[u8; 16], Error> {
    let k1 = digits_divided_by_spaces(key1)?;
    let k2 = digits_divided_by_spaces(key2)?;
    if k1 == 0 || k2 == 0 {
        return Err(Error::InvalidHybi00Key);
    }
    let mut buf = [0u8; 16];
    buf[0..4].copy_from_slice(&k1.to_be_bytes());
    buf[4..8].copy_from_slice(&k2.to_be_bytes());
    buf[8..16].copy_from_slice(key3);

    let mut hasher = Md5::new();
    hasher.update(buf);
    Ok(hasher.finalize().into())
}

pub fn rfc6455_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Runs ACL checks (Host for every draft; Origin additionally for
/// Hixie-75, matching the original's stricter legacy-draft gate) and
/// writes the byte-exact response preamble for the negotiated draft.
/// Returns the negotiated draft on success.
pub async fn negotiate<R, W>(
    reader: &mut BufReader<R>,
    writer: &mut W,
    acl: &Acl,
    port: u16,
    lenient_terminator: bool,
) -> Result<Draft, Error>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = read_request(reader, lenient_terminator).await?;
    let draft = classify_draft(&request)?;

    if let Some(host) = request.header("host") {
        if !acl.host_allowed(host, port) {
            let host = host.to_string();
            write_error_response(writer, 403, "Forbidden").await?;
            return Err(Error::HostNotAllowed(host));
        }
    } else {
        return Err(Error::NoHostHeaderPresent);
    }

    if draft == Draft::Hixie75 {
        let origin = request.header("origin").ok_or(Error::NoHostHeaderPresent)?;
        if !acl.origin_allowed(origin) {
            let origin = origin.to_string();
            write_error_response(writer, 403, "Forbidden").await?;
            return Err(Error::OriginNotAllowed(origin));
        }
    }

    match draft {
        Draft::Rfc6455 | Draft::Hybi07 | Draft::Hybi10 => {
            let key = request.header("sec-websocket-key").ok_or(Error::NoSecWebsocketKey)?;
            let accept = rfc6455_accept(key);
            let upgrade = request.header("upgrade").ok_or(Error::NoUpgradeHeaderPresent)?;
            if !request
                .header("connection")
                .map(|c| c.to_ascii_lowercase().contains("upgrade"))
                .unwrap_or(false)
            {
                return Err(Error::NoConnectionHeaderPresent);
            }
            let mut response = String::new();
            response.push_str("HTTP/1.1 101 Switching Protocols\r\n");
            response.push_str("Upgrade: ");
            response.push_str(upgrade);
            response.push_str("\r\n");
            response.push_str("Connection: Upgrade\r\n");
            if let Some(protocol) = request.header("sec-websocket-protocol") {
                response.push_str("Sec-WebSocket-Protocol: ");
                response.push_str(protocol);
                response.push_str("\r\n");
            }
            response.push_str("Sec-WebSocket-Accept: ");
            response.push_str(&accept);
            response.push_str("\r\n\r\n");
            writer.write_all(response.as_bytes()).await?;
        }
        Draft::Hybi00 => {
            let key1 = request.header("sec-websocket-key1").ok_or(Error::NoHybi00Keys)?;
            let key2 = request.header("sec-websocket-key2").ok_or(Error::NoHybi00Keys)?;
            let key3 = request.key3.ok_or(Error::NoHybi00Keys)?;
            let accept = hybi00_accept(key1, key2, &key3)?;
            let upgrade = request.header("upgrade").ok_or(Error::NoUpgradeHeaderPresent)?;
            let origin = request.header("origin").ok_or(Error::NoHostHeaderPresent)?;
            let host = request.header("host").ok_or(Error::NoHostHeaderPresent)?;

            let mut response = Vec::new();
            response.extend_from_slice(b"HTTP/1.1 101 WebSocket Protocol Handshake\r\n");
            response.extend_from_slice(b"Upgrade: ");
            response.extend_from_slice(upgrade.as_bytes());
            response.extend_from_slice(b"\r\n");
            response.extend_from_slice(b"Connection: Upgrade\r\n");
            response.extend_from_slice(b"Sec-WebSocket-Origin: ");
            response.extend_from_slice(origin.as_bytes());
            response.extend_from_slice(b"\r\n");
            response.extend_from_slice(b"Sec-WebSocket-Location: ws://");
            response.extend_from_slice(host.as_bytes());
            response.extend_from_slice(request.path.as_bytes());
            response.extend_from_slice(b"\r\n");
            if let Some(protocol) = request.header("sec-websocket-protocol") {
                response.extend_from_slice(b"Sec-WebSocket-Protocol: ");
                response.extend_from_slice(protocol.as_bytes());
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(b"\r\n");
            response.extend_from_slice(&accept);
            writer.write_all(&response).await?;
        }
        Draft::Hixie75 => {
            let upgrade = request.header("upgrade").ok_or(Error::NoUpgradeHeaderPresent)?;
            let origin = request.header("origin").ok_or(Error::NoHostHeaderPresent)?;
            let host = request.header("host").ok_or(Error::NoHostHeaderPresent)?;

            let mut response = String::new();
            response.push_str("HTTP/1.1 101 Web Socket Protocol Handshake\r\n");
            response.push_str("Upgrade: ");
            response.push_str(upgrade);
            response.push_str("\r\n");
            response.push_str("Connection: Upgrade\r\n");
            response.push_str("WebSocket-Origin: ");
            response.push_str(origin);
            response.push_str("\r\n");
            response.push_str("WebSocket-Location: ws://");
            response.push_str(host);
            response.push_str(&request.path);
            response.push_str("\r\n\r\n");
            writer.write_all(response.as_bytes()).await?;
        }
    }

    Ok(draft)
}

async fn write_error_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: u16,
    reason: &str,
) -> Result<(), Error> {
    let response = format!("HTTP/1.1 {status} {reason}\r\nConnection: close\r\n\r\n");
    writer.write_all(response.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6455_accept_matches_known_vector() {
        // RFC 6455 §1.3 worked example.
        assert_eq!(
            rfc6455_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn hybi00_accept_matches_appendix_b_vector() {
        // RFC 6455 Appendix B's worked Hybi-00 example.
        let key3 = *b"^n:ds[4U";
        let accept =
            hybi00_accept("4 @1  46546xW%0l 1 5", "12998 5 Y3 1  .P00", &key3).unwrap();
        assert_eq!(accept, *b"fQJ,fN/4F4!~K~MH");
    }

    #[test]
    fn classify_prefers_version_header() {
        let mut headers = HashMap::new();
        headers.insert("sec-websocket-version".to_string(), "13".to_string());
        let req = HandshakeRequest {
            method: "GET".into(),
            path: "/".into(),
            headers,
            key3: None,
        };
        assert_eq!(classify_draft(&req).unwrap(), Draft::Rfc6455);
    }

    #[test]
    fn classify_falls_back_to_hixie75() {
        let mut headers = HashMap::new();
        headers.insert("upgrade".to_string(), "WebSocket".to_string());
        headers.insert("connection".to_string(), "Upgrade".to_string());
        headers.insert("host".to_string(), "example.com".to_string());
        headers.insert("origin".to_string(), "http://example.com".to_string());
        let req = HandshakeRequest {
            method: "GET".into(),
            path: "/".into(),
            headers,
            key3: None,
        };
        assert_eq!(classify_draft(&req).unwrap(), Draft::Hixie75);
    }
}
