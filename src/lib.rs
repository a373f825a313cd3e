//! proxy-c-rs — a single-process, event-driven HTTP/1.x reverse proxy for
//! one configured origin.
//!
//! A client connects, sends a `GET` request, and the proxy validates the
//! request line and `Host` header, opens a connection to the configured
//! upstream, forwards the request, and streams the response back —
//! optionally keeping the client connection alive for a pipelined follow-up
//! exchange. Requests that fail validation are answered locally with a
//! generated error or redirect page; the upstream is never contacted for
//! those.
//!
//! The binary entry point lives in `src/bin/proxyd.rs`; this crate exposes
//! the core as a library so it can be embedded or driven from a different
//! front end.
//!
//! ```no_run
//! use proxy_c_rs::{Dispatcher, ProxyConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ProxyConfig::builder()
//!         .port(8080)
//!         .canonical_host("example.com")
//!         .upstream("127.0.0.1:9000")
//!         .build()
//!         .unwrap();
//!     Dispatcher::new(config)
//!         .run(async { let _ = tokio::signal::ctrl_c().await; })
//!         .await
//!         .unwrap();
//! }
//! ```
pub mod buffer;
pub mod config;
pub mod conn_table;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod http;
pub mod limits;
pub mod timeout;

pub use crate::{
    config::{ConfigError, ProxyConfig, ProxyConfigBuilder, Upstream},
    connection::Connection,
    dispatcher::Dispatcher,
    errors::ErrorKind,
};
