//! Listener binding with sequential `auto_port` probing and socket option
//! setup via direct `socket2` calls.

use crate::config::ServerConfig;
use socket2::{Domain, Protocol, Socket, Type};
use std::{io, net::SocketAddr};
use tokio::net::TcpListener;

/// Binds a listener per `config`. If `auto_port` is set, tries `config.port`
/// and then `config.port + 1 ..= config.port + max_port_attempts` until one
/// succeeds; otherwise binds exactly `config.port` or fails immediately.
pub fn bind(config: &ServerConfig) -> io::Result<TcpListener> {
    if !config.auto_port {
        return bind_one(config, config.port);
    }

    let mut last_err = None;
    for attempt in 0..=config.max_port_attempts {
        let port = config.port.saturating_add(attempt);
        match bind_one(config, port) {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "no port available")))
}

fn bind_one(config: &ServerConfig, port: u16) -> io::Result<TcpListener> {
    let addr: SocketAddr = format!("{}:{}", config.address, port)
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid address: {e}")))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(target_os = "windows")))]
    if config.reuse_port {
        socket.set_reuse_port(true)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(config.max_pending_connections as i32)?;

    TcpListener::from_std(socket.into())
}

/// Applies per-connection socket options once a stream is accepted.
pub fn configure_stream(stream: &tokio::net::TcpStream, config: &ServerConfig) -> io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)
}
