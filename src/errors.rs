use std::{error, fmt};

/// Every way a connection can end up in `WRITE_ERROR` instead of serving a
/// response, plus the status line and canned HTML body each one renders.
///
/// The status/body table is generated once by [`http_status!`] instead of
/// nine hand-written match arms; `Connection::render_status` adds the
/// headers that must be computed at write time (`Date`, `Content-Length`,
/// `Location`).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    MethodNotAllowed,
    MalformedRequestLine,
    VersionNotSupported,
    MissingHost,
    HeadersTooLarge,
    BodyTooLarge,
    UnsupportedTransferEncoding,
    ConflictingBodyFraming,
    InvalidContentLength,
    UpstreamConnectFailed,
    UpstreamIo,
    UpstreamFramingFailed,
    RequestTimedOut,
    ResponseTimedOut,
    ConnectionTimedOut,
    Internal,
}

macro_rules! http_status {
    ($($name:ident => $code:literal, $reason:literal, $title:literal, $body:literal;)*) => {
        impl ErrorKind {
            /// Numeric status code, e.g. `431`.
            pub const fn status_code(&self) -> u16 {
                match self { $(Self::$name => $code,)* }
            }

            /// Reason phrase, e.g. `"Request Header Fields Too Large"`.
            pub const fn reason_phrase(&self) -> &'static str {
                match self { $(Self::$name => $reason,)* }
            }

            /// Rendered HTML body for this error page.
            pub const fn html_body(&self) -> &'static str {
                match self {
                    $(Self::$name => concat!(
                        "<html><head><title>", $title, "</title></head><body>",
                        $body, "</body></html>",
                    ),)*
                }
            }
        }
    };
}

http_status! {
    MethodNotAllowed => 405, "Method Not Allowed", "405 Method Not Allowed", "Only GET is supported.";
    MalformedRequestLine => 400, "Bad Request", "400 Bad Request", "Malformed request line.";
    VersionNotSupported => 505, "HTTP Version Not Supported", "505 HTTP Version Not Supported", "Unrecognized HTTP version.";
    MissingHost => 400, "Bad Request", "400 Bad Request", "Missing Host header.";
    HeadersTooLarge => 431, "Request Header Fields Too Large", "431 Request Header Fields Too Large", "Header block exceeds the size limit.";
    BodyTooLarge => 413, "Payload Too Large", "413 Payload Too Large", "Request body exceeds the size limit.";
    UnsupportedTransferEncoding => 411, "Length Required", "411 Length Required", "Only chunked transfer encoding is supported.";
    ConflictingBodyFraming => 400, "Bad Request", "400 Bad Request", "Content-Length and Transfer-Encoding both present.";
    InvalidContentLength => 400, "Bad Request", "400 Bad Request", "Malformed Content-Length header.";
    UpstreamConnectFailed => 500, "Internal Server Error", "500 Internal Server Error", "Could not reach the upstream server.";
    UpstreamIo => 500, "Internal Server Error", "500 Internal Server Error", "Upstream connection failed.";
    UpstreamFramingFailed => 500, "Internal Server Error", "500 Internal Server Error", "Upstream sent a malformed response.";
    RequestTimedOut => 408, "Request Timeout", "408 Request Timeout", "Timed out waiting for the request.";
    ResponseTimedOut => 504, "Gateway Timeout", "504 Gateway Timeout", "Timed out waiting for the upstream response.";
    ConnectionTimedOut => 500, "Internal Server Error", "500 Internal Server Error", "Connection exceeded its overall lifetime.";
    Internal => 500, "Internal Server Error", "500 Internal Server Error", "Internal error.";
}

impl error::Error for ErrorKind {}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code(), self.reason_phrase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_status_table() {
        assert_eq!(ErrorKind::MethodNotAllowed.status_code(), 405);
        assert_eq!(ErrorKind::HeadersTooLarge.status_code(), 431);
        assert_eq!(ErrorKind::BodyTooLarge.status_code(), 413);
        assert_eq!(ErrorKind::UnsupportedTransferEncoding.status_code(), 411);
        assert_eq!(ErrorKind::VersionNotSupported.status_code(), 505);
        assert_eq!(ErrorKind::ConflictingBodyFraming.status_code(), 400);
        assert_eq!(ErrorKind::RequestTimedOut.status_code(), 408);
        assert_eq!(ErrorKind::ResponseTimedOut.status_code(), 504);
        assert_eq!(ErrorKind::ConnectionTimedOut.status_code(), 500);
    }

    #[test]
    fn html_body_contains_title() {
        assert!(ErrorKind::HeadersTooLarge
            .html_body()
            .contains("431 Request Header Fields Too Large"));
    }
}
