//! Structured access logging, gated by `ServerConfig::enable_access_log`.

use super::Next;
use crate::context::Context;
use crate::http::response::Response;
use std::time::Instant;

pub fn logger<'a, 'b>(ctx: &mut Context<'a>, next: Next<'a, 'b>) -> Response {
    let method = ctx.request().method();
    let path = String::from_utf8_lossy(ctx.request().url().path()).into_owned();
    let request_id = ctx.get::<String>(super::request_id::CONTEXT_KEY).cloned();
    let started = Instant::now();

    let resp = next.run(ctx);

    tracing::info!(
        method = %method,
        path = %path,
        status = resp.status_code().as_u16(),
        latency_us = started.elapsed().as_micros() as u64,
        request_id = request_id.as_deref().unwrap_or(""),
        "request completed"
    );

    resp
}
