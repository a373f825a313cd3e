//! Accept loop: binds the listener, enforces the connection-table capacity
//! at accept time, and spawns one task per flow running a `Connection` to
//! completion.

use crate::config::ProxyConfig;
use crate::conn_table::ActiveConnections;
use crate::connection::Connection;
use crate::limits::TimeoutLimits;
use crate::timeout::{ConnSlot, TimeoutWheel};
use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Shared, immutable-after-setup state handed to every connection task.
pub struct Dispatcher {
    config: Arc<ProxyConfig>,
    table: Arc<ActiveConnections>,
    timeouts: Arc<TimeoutWheel>,
}

impl Dispatcher {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config: Arc::new(config),
            table: Arc::new(ActiveConnections::new()),
            timeouts: Arc::new(TimeoutWheel::new(TimeoutLimits::default())),
        }
    }

    fn bind_addr(&self) -> SocketAddr {
        let ip = if self.config.accept_all {
            Ipv6Addr::UNSPECIFIED
        } else {
            Ipv6Addr::LOCALHOST
        };
        SocketAddr::V6(SocketAddrV6::new(ip, self.config.port, 0, 0))
    }

    /// Builds the dual-stack listening socket: `IPV6_V6ONLY=0` so IPv4
    /// clients are accepted on the same socket, `SO_REUSEADDR=1` for fast
    /// restarts, and a 5s read/write timeout on the listening socket itself
    /// independent of any per-connection timeout.
    fn make_listener(&self) -> io::Result<TcpListener> {
        use socket2::{Domain, Socket, Type};

        let socket = Socket::new(Domain::IPV6, Type::STREAM, None)?;
        socket.set_only_v6(false)?;
        socket.set_reuse_address(true)?;
        socket.set_read_timeout(Some(Duration::from_secs(5)))?;
        socket.set_write_timeout(Some(Duration::from_secs(5)))?;
        socket.set_nonblocking(true)?;
        socket.bind(&self.bind_addr().into())?;
        socket.listen(crate::limits::BACKLOG)?;
        TcpListener::from_std(socket.into())
    }

    /// Runs the accept loop until `shutdown` resolves. Returns once every
    /// spawned connection task has also observed the signal and stopped
    /// accepting new work; in-flight connections are not forcibly killed,
    /// they drain on their own `CLOSE_CONN` transition.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> io::Result<()> {
        let listener = self.make_listener()?;
        log::debug!("listening on {}", self.bind_addr());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::debug!("shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.dispatch(stream, addr),
                        Err(e) => {
                            log::debug!("accept failed: {e}");
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let Some(slot) = self.table.activate() else {
            if self.config.log_warnings {
                log::warn!("connection table full ({} slots); rejecting {addr}", self.table.capacity());
            }
            drop(stream);
            return;
        };

        let config = Arc::clone(&self.config);
        let table = Arc::clone(&self.table);
        let timeouts = Arc::clone(&self.timeouts);

        tokio::spawn(async move {
            let mut conn_slot = ConnSlot::new(&timeouts);
            let mut connection = Connection::new(stream, addr, slot);
            connection.run(&config, &mut conn_slot).await;
            table.deactivate(slot);
            log::trace!("connection {slot} ({addr}) closed");
        });
    }
}
