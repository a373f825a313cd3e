//! Incremental HTTP/1.x framing: header-block location, selected-header
//! extraction, and request-line validation.
//!
//! `parse_headers` is the only function that looks at raw bytes; it leaves
//! `validate_request` (and the caller in [`crate::connection`]) working with
//! already-extracted fields instead of re-scanning the buffer.

use crate::buffer::Endpoint;
use crate::config::ProxyConfig;
use crate::errors::ErrorKind;
use crate::http::types::{eq_ignore_case, slice_to_usize, Version};
use crate::limits::MAX_BODY_SIZE;
use memchr::memmem;

/// Which side a header block was read from — the two sides reject
/// oversized/malformed input with different status codes (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

/// Outcome of [`parse_headers`].
pub enum HeaderOutcome {
    /// `CRLF CRLF` not yet seen and the buffer is not full; read more.
    NeedMore,
    Ok(RequestHead),
    Error(ErrorKind),
}

/// Everything pulled out of one message's header block.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Offset/len of the first line, e.g. `GET /path HTTP/1.1` or
    /// `HTTP/1.1 200 OK`.
    pub first_line: (usize, usize),
    /// Parsed HTTP version from the first line, if it was a request line.
    pub version: Option<Version>,
    /// Request path, client side only.
    pub path: (usize, usize),
    /// Raw `Host` header value, client side only.
    pub host: Option<(usize, usize)>,
    /// Explicit `Connection` header verdict: `Some(true)` = keep-alive,
    /// `Some(false)` = close, `None` = not present.
    pub keep_alive: Option<bool>,
    pub content_length: Option<usize>,
    pub chunked: bool,
}

/// Locates `CRLF CRLF`, records `endpoint.headers`, and extracts the
/// request-line fields plus the `Connection`/`Content-Length`/
/// `Transfer-Encoding`/`Host` headers.
///
/// Method validation happens in [`validate_request`]; this function only
/// tokenizes the first line far enough to hand back `path`/`version`.
pub fn parse_headers(endpoint: &mut Endpoint, side: Side) -> HeaderOutcome {
    let received = endpoint.received();
    let Some(terminator) = memmem::find(received, b"\r\n\r\n") else {
        return if endpoint.is_full() {
            HeaderOutcome::Error(match side {
                Side::Client => ErrorKind::HeadersTooLarge,
                Side::Upstream => ErrorKind::UpstreamFramingFailed,
            })
        } else {
            HeaderOutcome::NeedMore
        };
    };
    let headers_end = terminator + 4;
    endpoint.headers = (0, headers_end);
    endpoint.headers_found = true;

    let block = &endpoint.buffer[..terminator];
    let Some(first_line_end) = memmem::find(block, b"\r\n") else {
        return HeaderOutcome::Error(ErrorKind::MalformedRequestLine);
    };
    let first_line = &block[..first_line_end];

    let (path, version) = match side {
        Side::Client => match tokenize_request_line(first_line) {
            Some((_method, path, version_token)) => match Version::from_bytes(version_token) {
                Some((version, _)) => (path_offset(first_line, path), Some(version)),
                None => return HeaderOutcome::Error(ErrorKind::VersionNotSupported),
            },
            None => return HeaderOutcome::Error(ErrorKind::MalformedRequestLine),
        },
        Side::Upstream => ((0, 0), None),
    };

    let mut head = RequestHead {
        first_line: (0, first_line_end),
        version,
        path,
        host: None,
        keep_alive: None,
        content_length: None,
        chunked: false,
    };

    let header_lines = &block[first_line_end + 2..];
    for line in header_lines.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let name = &line[..colon];
        let mut value = &line[colon + 1..];
        while value.first() == Some(&b' ') {
            value = &value[1..];
        }

        if eq_ignore_case(name, b"connection") {
            if eq_ignore_case(value, b"close") {
                head.keep_alive = Some(false);
            } else if eq_ignore_case(value, b"keep-alive") {
                head.keep_alive = Some(true);
            }
            // Any other token (e.g. `Upgrade`) is left unrecognized; it
            // does not override the version-default keep-alive behavior.
        } else if eq_ignore_case(name, b"content-length") {
            let Some(n) = slice_to_usize(value) else {
                return HeaderOutcome::Error(match side {
                    Side::Client => ErrorKind::InvalidContentLength,
                    Side::Upstream => ErrorKind::UpstreamFramingFailed,
                });
            };
            if n > MAX_BODY_SIZE {
                return HeaderOutcome::Error(match side {
                    Side::Client => ErrorKind::BodyTooLarge,
                    Side::Upstream => ErrorKind::UpstreamFramingFailed,
                });
            }
            head.content_length = Some(n);
        } else if eq_ignore_case(name, b"transfer-encoding") {
            if !eq_ignore_case(value, b"chunked") {
                return HeaderOutcome::Error(ErrorKind::UnsupportedTransferEncoding);
            }
            head.chunked = true;
        } else if side == Side::Client && eq_ignore_case(name, b"host") {
            // `value` is a subslice of `block`, which starts at buffer
            // offset 0, so pointer arithmetic gives the absolute offset.
            let value_start = value.as_ptr() as usize - block.as_ptr() as usize;
            head.host = Some((value_start, value.len()));
        }
    }

    if head.content_length.is_some() && head.chunked {
        return HeaderOutcome::Error(ErrorKind::ConflictingBodyFraming);
    }

    endpoint.content_len = head.content_length.unwrap_or(0);
    endpoint.chunked = head.chunked;
    endpoint.to_read = head.content_length.unwrap_or(0);

    HeaderOutcome::Ok(head)
}

/// Splits a first line into method, path, and raw version token around
/// spaces, without interpreting the version token — a line with fewer than
/// three tokens is malformed; a line with three tokens but an unrecognized
/// version is a distinct failure the caller reports as 505.
fn tokenize_request_line(line: &[u8]) -> Option<(&[u8], &[u8], &[u8])> {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let method = parts.next()?;
    let path = parts.next()?;
    let version_token = parts.next()?;
    Some((method, path, version_token))
}

fn path_offset(first_line: &[u8], path: &[u8]) -> (usize, usize) {
    let offset = path.as_ptr() as usize - first_line.as_ptr() as usize;
    (offset, path.len())
}

/// Verdict of validating a fully-framed client request line plus headers.
pub enum Verdict {
    Ok,
    Redirect,
    Error(ErrorKind),
}

/// Checks method, version, and `Host` against the configured canonical
/// host. Assumes `head` came from [`parse_headers`] on the client side.
pub fn validate_request(endpoint: &Endpoint, head: &RequestHead, config: &ProxyConfig) -> Verdict {
    let first_line = {
        let (off, len) = head.first_line;
        &endpoint.buffer[off..off + len]
    };
    let Some((method, _path, _version_token)) = tokenize_request_line(first_line) else {
        return Verdict::Error(ErrorKind::MalformedRequestLine);
    };
    if method != b"GET" {
        return Verdict::Error(ErrorKind::MethodNotAllowed);
    }
    if head.version.is_none() {
        return Verdict::Error(ErrorKind::VersionNotSupported);
    }

    let Some((host_off, host_len)) = head.host else {
        return Verdict::Error(ErrorKind::MissingHost);
    };
    let host = &endpoint.buffer[host_off..host_off + host_len];
    let Ok(host_str) = std::str::from_utf8(host) else {
        return Verdict::Error(ErrorKind::MissingHost);
    };

    if config.host_matches(host_str) {
        Verdict::Ok
    } else {
        Verdict::Redirect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(ep: &mut Endpoint, data: &[u8]) {
        ep.buffer[..data.len()].copy_from_slice(data);
        ep.read_index = data.len();
    }

    fn config() -> ProxyConfig {
        ProxyConfig::builder()
            .port(80)
            .canonical_host("example.com")
            .upstream("example.com:8080")
            .build()
            .unwrap()
    }

    #[test]
    fn need_more_before_terminator_seen() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"GET / HTTP/1.1\r\nHost: example.com\r\n");
        assert!(matches!(parse_headers(&mut ep, Side::Client), HeaderOutcome::NeedMore));
        assert!(!ep.headers_found);
    }

    #[test]
    fn parses_method_path_version_and_host() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"GET /foo HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let HeaderOutcome::Ok(head) = parse_headers(&mut ep, Side::Client) else {
            panic!("expected Ok");
        };
        assert!(ep.headers_found);
        assert_eq!(head.version, Some(Version::Http11));
        let (off, len) = head.path;
        assert_eq!(&ep.buffer[off..off + len], b"/foo");
        let (hoff, hlen) = head.host.unwrap();
        assert_eq!(&ep.buffer[hoff..hoff + hlen], b"example.com");
    }

    #[test]
    fn rejects_conflicting_body_framing_headers() {
        let mut ep = Endpoint::new();
        fill(
            &mut ep,
            b"GET / HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n",
        );
        assert!(matches!(
            parse_headers(&mut ep, Side::Client),
            HeaderOutcome::Error(ErrorKind::ConflictingBodyFraming)
        ));
    }

    #[test]
    fn rejects_non_chunked_transfer_encoding() {
        let mut ep = Endpoint::new();
        fill(
            &mut ep,
            b"GET / HTTP/1.1\r\nHost: example.com\r\nTransfer-Encoding: gzip\r\n\r\n",
        );
        assert!(matches!(
            parse_headers(&mut ep, Side::Client),
            HeaderOutcome::Error(ErrorKind::UnsupportedTransferEncoding)
        ));
    }

    #[test]
    fn rejects_oversized_headers_without_terminator() {
        let mut ep = Endpoint::new();
        let mut data = b"GET / HTTP/1.1\r\n".to_vec();
        data.resize(crate::limits::BUFFER_SIZE - 1, b'X');
        fill(&mut ep, &data);
        assert!(matches!(
            parse_headers(&mut ep, Side::Client),
            HeaderOutcome::Error(ErrorKind::HeadersTooLarge)
        ));
    }

    #[test]
    fn validate_request_accepts_matching_host() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let HeaderOutcome::Ok(head) = parse_headers(&mut ep, Side::Client) else {
            panic!();
        };
        assert!(matches!(validate_request(&ep, &head, &config()), Verdict::Ok));
    }

    #[test]
    fn validate_request_redirects_on_host_mismatch() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"GET /x HTTP/1.1\r\nHost: other.com\r\n\r\n");
        let HeaderOutcome::Ok(head) = parse_headers(&mut ep, Side::Client) else {
            panic!();
        };
        assert!(matches!(validate_request(&ep, &head, &config()), Verdict::Redirect));
    }

    #[test]
    fn rejects_unrecognized_version_distinctly_from_malformed_line() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"GET / HTTP/9.9\r\nHost: example.com\r\n\r\n");
        assert!(matches!(
            parse_headers(&mut ep, Side::Client),
            HeaderOutcome::Error(ErrorKind::VersionNotSupported)
        ));

        let mut ep = Endpoint::new();
        fill(&mut ep, b"GET /\r\nHost: example.com\r\n\r\n");
        assert!(matches!(
            parse_headers(&mut ep, Side::Client),
            HeaderOutcome::Error(ErrorKind::MalformedRequestLine)
        ));
    }

    #[test]
    fn upstream_body_framing_faults_report_500() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"HTTP/1.1 200 OK\r\nContent-Length: abc\r\n\r\n");
        assert!(matches!(
            parse_headers(&mut ep, Side::Upstream),
            HeaderOutcome::Error(ErrorKind::UpstreamFramingFailed)
        ));

        let mut ep = Endpoint::new();
        let oversized = MAX_BODY_SIZE + 1;
        fill(
            &mut ep,
            format!("HTTP/1.1 200 OK\r\nContent-Length: {oversized}\r\n\r\n").as_bytes(),
        );
        assert!(matches!(
            parse_headers(&mut ep, Side::Upstream),
            HeaderOutcome::Error(ErrorKind::UpstreamFramingFailed)
        ));
    }

    #[test]
    fn validate_request_rejects_non_get_method() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"POST / HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let HeaderOutcome::Ok(head) = parse_headers(&mut ep, Side::Client) else {
            panic!();
        };
        assert!(matches!(
            validate_request(&ep, &head, &config()),
            Verdict::Error(ErrorKind::MethodNotAllowed)
        ));
    }
}
