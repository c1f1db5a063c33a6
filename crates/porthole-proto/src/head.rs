//! Textual sub-encodings carried as frame payloads
//!
//! An `OPEN_STREAM` payload is shaped like an HTTP/1.1 request head: a request
//! line followed by `Name: Value` lines, CRLF-separated, terminated by an
//! empty line. A `RESPONSE_HEADERS` payload uses a status line instead. Bodies
//! never appear here; they travel as separate `STREAM_DATA` frames.
//!
//! Decoding is lenient. These payloads come from a half-trusted peer, so
//! missing pieces default instead of failing: a frame must never take the
//! connection down.

use bytes::Bytes;
use std::collections::HashMap;

/// Decoded `OPEN_STREAM` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    /// Header names are lower-cased during decoding
    pub headers: HashMap<String, String>,
}

/// Decoded `RESPONSE_HEADERS` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Header names are lower-cased during decoding
    pub headers: HashMap<String, String>,
}

/// Serialize a request head as an `OPEN_STREAM` payload
pub fn encode_open_stream(method: &str, path: &str, headers: &HashMap<String, String>) -> Bytes {
    let mut out = String::new();
    out.push_str(method);
    out.push(' ');
    out.push_str(path);
    out.push_str(" HTTP/1.1\r\n");
    push_header_lines(&mut out, headers);
    Bytes::from(out)
}

/// Parse an `OPEN_STREAM` payload. A missing path defaults to `/`.
pub fn decode_open_stream(payload: &[u8]) -> RequestHead {
    let text = String::from_utf8_lossy(payload);
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("/").to_string();

    RequestHead {
        method,
        path,
        headers: parse_header_lines(lines),
    }
}

/// Serialize a status code and headers as a `RESPONSE_HEADERS` payload
pub fn encode_response_headers(status: u16, headers: &HashMap<String, String>) -> Bytes {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    push_header_lines(&mut out, headers);
    Bytes::from(out)
}

/// Parse a `RESPONSE_HEADERS` payload. A malformed or missing status line
/// defaults to 200.
pub fn decode_response_headers(payload: &[u8]) -> ResponseHead {
    let text = String::from_utf8_lossy(payload);
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or("");
    let status = status_line
        .split(' ')
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);

    ResponseHead {
        status,
        headers: parse_header_lines(lines),
    }
}

fn push_header_lines(out: &mut String, headers: &HashMap<String, String>) {
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
}

fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in lines {
        // name must be non-empty, so a leading colon is not a header
        if let Some(colon) = line.find(':') {
            if colon > 0 {
                let name = line[..colon].trim().to_ascii_lowercase();
                let value = line[colon + 1..].trim().to_string();
                headers.insert(name, value);
            }
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_open_stream_round_trip() {
        let sent = headers(&[("host", "quiet-lime-7.example.dev"), ("accept", "*/*")]);
        let payload = encode_open_stream("GET", "/api/items?page=2", &sent);
        let head = decode_open_stream(&payload);

        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/api/items?page=2");
        assert_eq!(head.headers, sent);
    }

    #[test]
    fn test_decode_lower_cases_header_names() {
        let payload = encode_open_stream(
            "POST",
            "/upload",
            &headers(&[("Content-Type", "application/json"), ("X-Custom", "1")]),
        );
        let head = decode_open_stream(&payload);

        assert_eq!(
            head.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(head.headers.get("x-custom").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_open_stream_missing_path_defaults() {
        let head = decode_open_stream(b"GET");
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/");
        assert!(head.headers.is_empty());
    }

    #[test]
    fn test_open_stream_empty_payload() {
        let head = decode_open_stream(b"");
        assert_eq!(head.method, "");
        assert_eq!(head.path, "/");
    }

    #[test]
    fn test_response_headers_round_trip() {
        let sent = headers(&[("content-type", "text/html"), ("set-cookie", "a=1, b=2")]);
        let payload = encode_response_headers(404, &sent);
        let head = decode_response_headers(&payload);

        assert_eq!(head.status, 404);
        assert_eq!(head.headers, sent);
    }

    #[test]
    fn test_response_headers_malformed_status_defaults_to_200() {
        let head = decode_response_headers(b"HTTP/1.1 abc\r\nx: y\r\n\r\n");
        assert_eq!(head.status, 200);
        assert_eq!(head.headers.get("x").map(String::as_str), Some("y"));

        let head = decode_response_headers(b"");
        assert_eq!(head.status, 200);
    }

    #[test]
    fn test_header_line_without_name_is_skipped() {
        let head = decode_open_stream(b"GET / HTTP/1.1\r\n: nameless\r\nok: yes\r\n\r\n");
        assert_eq!(head.headers.len(), 1);
        assert_eq!(head.headers.get("ok").map(String::as_str), Some("yes"));
    }
}
