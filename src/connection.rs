//! The per-connection state machine: one `Connection` owns a client socket,
//! an upstream socket opened fresh for each request/response exchange, and
//! drives itself from `ReadRequest` to `CloseConn` by repeatedly matching
//! on `self.state` and `.await`ing exactly one socket operation per step.
//!
//! There is no outer dispatcher loop polling a readiness set: the async
//! runtime's reactor fills that role, so a synchronous state (one with no
//! I/O of its own, e.g. `VerifyRequest`) simply falls through to the next
//! `match` arm within the same `run` iteration instead of returning control
//! anywhere.

use crate::buffer::Endpoint;
use crate::config::ProxyConfig;
use crate::errors::ErrorKind;
use crate::http::framer::{self, HeaderOutcome, Side, Verdict};
use crate::http::types::Version;
use crate::timeout::{ConnSlot, TimeoutType};
use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Discrete phase driving what a `Connection` does next. `AcceptClient` has
/// no representation here: it is the moment a `Connection` value is
/// constructed, owned by the dispatcher's accept loop instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ReadRequest,
    VerifyRequest,
    ConnectUpstream,
    WriteRequest,
    ReadResponse,
    WriteResponse,
    CheckConn,
    WriteError,
    CloseConn,
}

pub struct Connection {
    client: TcpStream,
    upstream: Option<TcpStream>,
    client_buf: Endpoint,
    upstream_buf: Endpoint,
    pub state: State,
    pub status: u16,
    keep_alive: bool,
    response_complete: bool,
    pub client_addr: SocketAddr,
    pub self_ref: u32,
}

enum IoExit {
    Bytes(usize),
    TimedOut(TimeoutType),
}

async fn guarded_read(stream: &mut TcpStream, buf: &mut [u8], slot: &ConnSlot<'_>) -> std::io::Result<IoExit> {
    tokio::select! {
        ty = slot.expired() => Ok(IoExit::TimedOut(ty)),
        res = stream.read(buf) => res.map(IoExit::Bytes),
    }
}

async fn guarded_write(stream: &mut TcpStream, buf: &[u8], slot: &ConnSlot<'_>) -> std::io::Result<IoExit> {
    tokio::select! {
        ty = slot.expired() => Ok(IoExit::TimedOut(ty)),
        res = stream.write(buf) => res.map(IoExit::Bytes),
    }
}

fn timeout_error(ty: TimeoutType) -> ErrorKind {
    match ty {
        TimeoutType::RequestRead | TimeoutType::RequestWrite => ErrorKind::RequestTimedOut,
        TimeoutType::ResponseRead | TimeoutType::ResponseWrite => ErrorKind::ResponseTimedOut,
        TimeoutType::Connection => ErrorKind::ConnectionTimedOut,
    }
}

impl Connection {
    pub fn new(client: TcpStream, client_addr: SocketAddr, self_ref: u32) -> Self {
        Self {
            client,
            upstream: None,
            client_buf: Endpoint::new(),
            upstream_buf: Endpoint::new(),
            state: State::ReadRequest,
            status: 0,
            keep_alive: false,
            response_complete: false,
            client_addr,
            self_ref,
        }
    }

    /// Drives the state machine to `CloseConn`. Called once by the
    /// dispatcher per accepted flow; returns when the connection is done,
    /// one way or another.
    pub async fn run(&mut self, config: &ProxyConfig, slot: &mut ConnSlot<'_>) {
        slot.start_conn_timeout(None);
        loop {
            match self.state {
                State::ReadRequest => self.read_request(slot).await,
                State::VerifyRequest => self.verify_request(config),
                State::ConnectUpstream => self.connect_upstream(config).await,
                State::WriteRequest => self.write_request(slot).await,
                State::ReadResponse => self.read_response(slot).await,
                State::WriteResponse => self.write_response(slot).await,
                State::CheckConn => self.check_conn(slot),
                State::WriteError => self.write_error(slot).await,
                State::CloseConn => break,
            }
        }
    }

    fn fail(&mut self, err: ErrorKind) {
        self.status = err.status_code();
        self.render_status(err.status_code(), err.reason_phrase(), err.html_body(), None);
    }

    fn fail_timeout(&mut self, ty: TimeoutType) {
        self.fail(timeout_error(ty));
    }

    fn drop_connection(&mut self) {
        self.state = State::CloseConn;
    }

    fn redirect(&mut self, location: &str) {
        let body = format!(
            "<html><head><title>301 Moved Permanently</title></head><body>Redirecting to {location}</body></html>"
        );
        self.status = 301;
        self.render_status(301, "Moved Permanently", &body, Some(location));
    }

    /// Renders a status line, banner headers, and `body` into
    /// `upstream_buf`, the scratch buffer `WriteResponse`-style writes draw
    /// from, and arms `WriteError` to deliver it.
    fn render_status(&mut self, status: u16, reason: &str, body: &str, location: Option<&str>) {
        let date = httpdate::fmt_http_date(SystemTime::now());
        let mut head = format!(
            "HTTP/1.1 {status} {reason}\r\n\
             Server: Proxy-C/{} (Unix)\r\n\
             Date: {date}\r\n\
             Content-Type: text/html\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n",
            env!("CARGO_PKG_VERSION"),
            body.len(),
        );
        if let Some(loc) = location {
            head.push_str(&format!("Location: {loc}\r\n"));
        }
        head.push_str("\r\n");

        let buf = &mut self.upstream_buf;
        buf.rewind_body_buffer();
        let head = head.into_bytes();
        let total = head.len() + body.len();
        buf.buffer[..head.len()].copy_from_slice(&head);
        buf.buffer[head.len()..total].copy_from_slice(body.as_bytes());
        buf.read_index = total;
        buf.write_index = 0;
        self.keep_alive = false;
        self.state = State::WriteError;
    }

    async fn read_request(&mut self, slot: &mut ConnSlot<'_>) {
        slot.start_state_timeout(TimeoutType::RequestRead);
        loop {
            if !self.client_buf.headers_found {
                match framer::parse_headers(&mut self.client_buf, Side::Client) {
                    HeaderOutcome::NeedMore => {}
                    HeaderOutcome::Error(e) => {
                        self.fail(e);
                        return;
                    }
                    HeaderOutcome::Ok(_) => {
                        if self.discard_client_body() {
                            slot.remove_state_timeout();
                            self.state = State::VerifyRequest;
                            return;
                        }
                    }
                }
            } else if self.discard_client_body() {
                slot.remove_state_timeout();
                self.state = State::VerifyRequest;
                return;
            }

            if self.client_buf.headers_found && self.client_buf.chunked && self.client_buf.is_full() {
                self.fail(ErrorKind::BodyTooLarge);
                return;
            }

            match guarded_read(&mut self.client, &mut self.client_buf.buffer[self.client_buf.read_index..], slot).await {
                Ok(IoExit::Bytes(0)) => {
                    self.drop_connection();
                    return;
                }
                Ok(IoExit::Bytes(n)) => self.client_buf.read_index += n,
                Ok(IoExit::TimedOut(ty)) => {
                    self.fail_timeout(ty);
                    return;
                }
                Err(_) => {
                    self.drop_connection();
                    return;
                }
            }
        }
    }

    /// Accounts for (and discards) any declared request body. Returns
    /// `true` once the body is fully accounted for — which, since headers
    /// are only just located the first time this runs, may already be true
    /// on the very first call if the whole body arrived in the same read.
    fn discard_client_body(&mut self) -> bool {
        let ep = &mut self.client_buf;
        if ep.chunked {
            return ep.find_last_chunk();
        }
        if ep.content_len == 0 {
            return true;
        }
        let (off, len) = ep.headers;
        let header_end = off + len;
        let available = ep.read_index.saturating_sub(header_end);
        if available >= ep.to_read {
            let body_end = header_end + ep.to_read;
            if ep.read_index > body_end {
                ep.next_index = body_end;
            }
            ep.to_read = 0;
            return true;
        }
        // Not all here yet. Record what arrived and, if the buffer is
        // about to fill, fold it into the countdown and reclaim the space
        // since none of it is kept.
        if ep.is_full() {
            ep.to_read -= available;
            ep.read_index = header_end;
        }
        false
    }

    fn verify_request(&mut self, config: &ProxyConfig) {
        let head = match framer::parse_headers(&mut self.client_buf, Side::Client) {
            HeaderOutcome::Ok(head) => head,
            HeaderOutcome::Error(e) => {
                self.fail(e);
                return;
            }
            HeaderOutcome::NeedMore => unreachable!("headers were already located in read_request"),
        };

        match framer::validate_request(&self.client_buf, &head, config) {
            Verdict::Ok => {
                self.keep_alive = head
                    .keep_alive
                    .unwrap_or_else(|| head.version.as_ref().map(Version::default_keep_alive).unwrap_or(false));
                self.state = State::ConnectUpstream;
            }
            Verdict::Redirect => self.redirect(config.canonical_location()),
            Verdict::Error(e) => self.fail(e),
        }
    }

    async fn connect_upstream(&mut self, config: &ProxyConfig) {
        match TcpStream::connect((config.upstream.host.as_str(), config.upstream.port)).await {
            Ok(stream) => {
                self.upstream = Some(stream);
                self.state = State::WriteRequest;
            }
            Err(_) => self.fail(ErrorKind::UpstreamConnectFailed),
        }
    }

    async fn write_request(&mut self, slot: &mut ConnSlot<'_>) {
        slot.start_state_timeout(TimeoutType::RequestWrite);
        let (off, len) = self.client_buf.headers;
        let header_end = off + len;
        loop {
            if self.client_buf.write_index >= header_end {
                slot.remove_state_timeout();
                self.state = State::ReadResponse;
                return;
            }
            let Some(upstream) = self.upstream.as_mut() else {
                self.fail(ErrorKind::Internal);
                return;
            };
            match guarded_write(upstream, &self.client_buf.buffer[self.client_buf.write_index..header_end], slot).await {
                Ok(IoExit::Bytes(0)) => {
                    self.fail(ErrorKind::UpstreamIo);
                    return;
                }
                Ok(IoExit::Bytes(n)) => self.client_buf.write_index += n,
                Ok(IoExit::TimedOut(ty)) => {
                    self.fail_timeout(ty);
                    return;
                }
                Err(_) => {
                    self.fail(ErrorKind::UpstreamIo);
                    return;
                }
            }
        }
    }

    async fn read_response(&mut self, slot: &mut ConnSlot<'_>) {
        slot.start_state_timeout(TimeoutType::ResponseRead);
        loop {
            if !self.upstream_buf.headers_found {
                match framer::parse_headers(&mut self.upstream_buf, Side::Upstream) {
                    HeaderOutcome::NeedMore => {}
                    HeaderOutcome::Error(e) => {
                        self.fail(e);
                        return;
                    }
                    HeaderOutcome::Ok(head) => {
                        self.keep_alive = self.keep_alive && head.keep_alive.unwrap_or(true);
                        let (off, len) = self.upstream_buf.headers;
                        let header_end = off + len;
                        let already = self.upstream_buf.read_index.saturating_sub(header_end);
                        if !self.upstream_buf.chunked {
                            self.upstream_buf.to_read = self.upstream_buf.to_read.saturating_sub(already);
                            if self.upstream_buf.to_read == 0 {
                                self.response_complete = true;
                                slot.remove_state_timeout();
                                self.state = State::WriteResponse;
                                return;
                            }
                        }
                    }
                }
            } else if self.body_complete() {
                self.response_complete = true;
                slot.remove_state_timeout();
                self.state = State::WriteResponse;
                return;
            }

            if self.upstream_buf.is_full() {
                if !self.upstream_buf.headers_found {
                    self.fail(ErrorKind::UpstreamFramingFailed);
                    return;
                }
                self.response_complete = false;
                slot.remove_state_timeout();
                self.state = State::WriteResponse;
                return;
            }

            let read_index = self.upstream_buf.read_index;
            let Some(upstream) = self.upstream.as_mut() else {
                self.fail(ErrorKind::Internal);
                return;
            };
            match guarded_read(upstream, &mut self.upstream_buf.buffer[read_index..], slot).await {
                Ok(IoExit::Bytes(0)) => {
                    self.fail(ErrorKind::UpstreamFramingFailed);
                    return;
                }
                Ok(IoExit::Bytes(n)) => self.upstream_buf.read_index += n,
                Ok(IoExit::TimedOut(ty)) => {
                    self.fail_timeout(ty);
                    return;
                }
                Err(_) => {
                    self.fail(ErrorKind::UpstreamFramingFailed);
                    return;
                }
            }
        }
    }

    /// Whether the response body accumulated so far completes the message,
    /// for a header block already located on a previous call.
    fn body_complete(&mut self) -> bool {
        let ep = &mut self.upstream_buf;
        if ep.chunked {
            return ep.find_last_chunk();
        }
        let (off, len) = ep.headers;
        let header_end = off + len;
        let available = ep.read_index.saturating_sub(header_end);
        available >= ep.to_read
    }

    async fn write_response(&mut self, slot: &mut ConnSlot<'_>) {
        slot.start_state_timeout(TimeoutType::ResponseWrite);
        let end = if self.upstream_buf.next_index != 0 {
            self.upstream_buf.next_index
        } else {
            self.upstream_buf.read_index
        };
        loop {
            if self.upstream_buf.write_index >= end {
                break;
            }
            match guarded_write(&mut self.client, &self.upstream_buf.buffer[self.upstream_buf.write_index..end], slot).await {
                Ok(IoExit::Bytes(0)) => {
                    self.drop_connection();
                    return;
                }
                Ok(IoExit::Bytes(n)) => self.upstream_buf.write_index += n,
                Ok(IoExit::TimedOut(ty)) => {
                    self.fail_timeout(ty);
                    return;
                }
                Err(_) => {
                    self.drop_connection();
                    return;
                }
            }
        }
        slot.remove_state_timeout();

        if self.response_complete {
            self.upstream = None;
            self.state = State::CheckConn;
        } else {
            self.upstream_buf.rewind_body_buffer();
            self.state = State::ReadResponse;
        }
    }

    fn check_conn(&mut self, slot: &mut ConnSlot<'_>) {
        if self.keep_alive {
            self.reset_conn(slot);
        } else {
            self.drop_connection();
        }
    }

    /// Pulls any pipelined next request to the front of `client_buf`, clears
    /// per-exchange state, and re-arms the connection timeout.
    fn reset_conn(&mut self, slot: &mut ConnSlot<'_>) {
        self.client_buf.pull();
        self.upstream_buf = Endpoint::new();
        self.status = 0;
        self.keep_alive = false;
        self.response_complete = false;
        slot.start_conn_timeout(None);
        self.state = State::ReadRequest;
    }

    async fn write_error(&mut self, slot: &mut ConnSlot<'_>) {
        slot.start_state_timeout(TimeoutType::ResponseWrite);
        loop {
            if self.upstream_buf.write_index >= self.upstream_buf.read_index {
                break;
            }
            match guarded_write(
                &mut self.client,
                &self.upstream_buf.buffer[self.upstream_buf.write_index..self.upstream_buf.read_index],
                slot,
            )
            .await
            {
                Ok(IoExit::Bytes(0)) => break,
                Ok(IoExit::Bytes(n)) => self.upstream_buf.write_index += n,
                Ok(IoExit::TimedOut(_)) => break,
                Err(_) => break,
            }
        }
        self.drop_connection();
    }
}
