//! Per-connection read/parse/dispatch/write loop.
//!
//! Each accepted connection gets one arena per request (returned to the
//! pool between requests on the same keep-alive connection), a reusable
//! read buffer, and runs requests sequentially until the peer closes the
//! connection, sends `Connection: close`, the per-connection keep-alive
//! timeout elapses, or `max_requests_per_connection` is reached.

use crate::{
    arena::ArenaPool,
    config::ServerConfig,
    context::Context,
    errors::{ClientProtocolError, ErrorKind},
    http::{request, response::Response, types::Version},
    router::ParamList,
    server::App,
};
use memchr::memmem;
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

pub async fn serve(
    mut stream: TcpStream,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
    app: Arc<App>,
) {
    app.stats.connection_opened();

    if let Err(e) = run(&mut stream, client_addr, server_addr, &app).await {
        tracing::debug!(error = %e, "connection closed");
    }

    app.stats.connection_closed();
}

async fn run(
    stream: &mut TcpStream,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
    app: &App,
) -> std::io::Result<()> {
    let config = &app.config;
    let arena_pool = ArenaPool::new(1);
    let mut read_buf: Vec<u8> = Vec::with_capacity(config.read_buffer_size);
    let mut requests_served: u64 = 0;

    loop {
        let head_end = match read_until_headers_end(stream, &mut read_buf, config).await? {
            Some(pos) => pos,
            None => return Ok(()), // peer closed before sending a full request
        };

        let arena = arena_pool.acquire();
        let limits = config.request_limits.into_parse_limits(config.max_body_size);

        let content_length = peek_content_length(&read_buf[..head_end]);
        let body_start = head_end + HEADER_TERMINATOR.len();
        if content_length.is_some_and(|len| len > config.max_body_size) {
            let err = ErrorKind::from(ClientProtocolError::BodyTooLarge);
            stream.write_all(&err.as_http(Version::Http11, true)).await?;
            return Ok(());
        }
        ensure_body_read(stream, &mut read_buf, body_start, content_length, config.max_body_size).await?;
        let head = &read_buf[..head_end];
        let body = &read_buf[body_start..body_start + content_length.unwrap_or(0)];

        let outcome = request::parse(head, body, &arena, &limits);
        let consumed_to = body_start + content_length.unwrap_or(0);

        let keep_alive = match outcome {
            Ok(req) => {
                let (route, params) = match app.router.matches(req.method(), req.url().path()) {
                    Ok((route, params)) => (Some(route), params),
                    Err(_) => (None, ParamList::default()),
                };
                let mut ctx = Context::new(&req, &arena, params);
                app.inject_extensions(&mut ctx);
                let resp = dispatch(app, route, &mut ctx);
                let keep_alive = resp.version() == Version::Http11 && req.keep_alive_requested();
                stream.write_all(&resp.serialize()).await?;
                app.stats.request_served();
                keep_alive
            }
            Err(err) => {
                let json = matches!(&err, ErrorKind::ClientProtocol(_));
                stream.write_all(&err.as_http(Version::Http11, json)).await?;
                false
            }
        };

        read_buf.drain(..consumed_to);
        requests_served += 1;

        if !keep_alive {
            return Ok(());
        }
        if let Some(max) = app.max_requests_per_connection {
            if requests_served >= max {
                return Ok(());
            }
        }
    }
}

fn dispatch(app: &App, route: Option<crate::router::RouteId>, ctx: &mut Context<'_>) -> Response {
    match route.and_then(|r| app.handlers.get(&r)) {
        Some(handler) => app.chain.run(ctx, handler.as_ref()),
        None => app.chain.run(ctx, &app.not_found),
    }
}

/// Reads from `stream` into `buf` until `\r\n\r\n` is found, bounded by the
/// connection's keep-alive timeout and a header-size ceiling. Returns the
/// offset of the terminator's start, or `None` on a clean EOF before any
/// bytes were read (the idle-keepalive-close case).
async fn read_until_headers_end(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
    config: &ServerConfig,
) -> std::io::Result<Option<usize>> {
    let deadline = config.keepalive_timeout();
    let max_header_bytes = config.request_limits.header_count
        * (config.request_limits.header_name_size + config.request_limits.header_value_size)
        + config.request_limits.url_size
        + 256;

    loop {
        if let Some(pos) = memmem::find(buf, HEADER_TERMINATOR) {
            return Ok(Some(pos));
        }
        if buf.len() > max_header_bytes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                ClientProtocolError::HeaderTooLarge,
            ));
        }

        let mut chunk = [0u8; 4096];
        let read = match timeout(deadline, stream.read(&mut chunk)).await {
            Ok(result) => result?,
            Err(_) => {
                if buf.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "keepalive timeout"));
            }
        };
        if read == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..read]);
    }
}

/// Reads exactly `content_length` bytes of body past `body_start`. The
/// caller has already rejected any declared length over `max_body_size`;
/// this loop re-checks the same ceiling against bytes actually buffered so
/// a malformed or lying `Content-Length` can never grow `buf` past it.
async fn ensure_body_read(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
    body_start: usize,
    content_length: Option<usize>,
    max_body_size: usize,
) -> std::io::Result<()> {
    let Some(len) = content_length else { return Ok(()) };
    let needed = body_start + len;
    while buf.len() < needed {
        if buf.len() - body_start >= max_body_size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                ClientProtocolError::BodyTooLarge,
            ));
        }
        let mut chunk = [0u8; 4096];
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-body",
            ));
        }
        buf.extend_from_slice(&chunk[..read]);
    }
    Ok(())
}

fn peek_content_length(head: &[u8]) -> Option<usize> {
    let needle = b"content-length:";
    for line in head.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() >= needle.len() && line[..needle.len()].eq_ignore_ascii_case(needle) {
            let value = std::str::from_utf8(&line[needle.len()..]).ok()?.trim();
            return value.parse().ok();
        }
    }
    None
}
