//! Minimal `identity`/`gzip` negotiation over `Accept-Encoding`. Not a full
//! content-negotiation stack (no brotli/zstd, no per-route opt-out) — the
//! spec's compression slot asks for *a* middleware here, not a specific
//! algorithm set.

use super::Next;
use crate::{context::Context, http::response::Response};
use flate2::{write::GzEncoder, Compression};
use std::io::Write;

const MIN_BODY_SIZE: usize = 256;

pub fn compression<'a, 'b>(ctx: &mut Context<'a>, next: Next<'a, 'b>) -> Response {
    let accepts_gzip = ctx
        .request()
        .header(b"accept-encoding")
        .map(|v| {
            String::from_utf8_lossy(v)
                .split(',')
                .any(|enc| enc.trim().eq_ignore_ascii_case("gzip"))
        })
        .unwrap_or(false);

    let mut resp = next.run(ctx);

    if accepts_gzip && !resp.has_header("content-encoding") && resp.body_bytes().len() >= MIN_BODY_SIZE {
        if let Some(compressed) = gzip(resp.body_bytes()) {
            resp.replace_body(compressed);
            resp.header("content-encoding", "gzip");
            resp.header("vary", "accept-encoding");
        }
    }

    resp
}

fn gzip(body: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::fast());
    encoder.write_all(body).ok()?;
    encoder.finish().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::ArenaPool, http::request, middleware::Chain, router::ParamList};

    #[test]
    fn compresses_when_accepted_and_large_enough() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"GET / HTTP/1.1\r\nAccept-Encoding: gzip, deflate\r\n";
        let req = request::parse(head, b"", &arena, &Default::default()).unwrap();
        let mut ctx = Context::new(&req, &arena, ParamList::default());

        let chain = Chain::new().push(compression);
        let body = "x".repeat(1024);
        let resp = chain.run(&mut ctx, &|ctx| {
            let mut resp = ctx.response();
            resp.body(body.clone());
            resp
        });

        assert_eq!(resp.header_value("content-encoding"), Some("gzip"));
        assert!(resp.body_bytes().len() < 1024);
    }

    #[test]
    fn leaves_small_bodies_uncompressed() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"GET / HTTP/1.1\r\nAccept-Encoding: gzip\r\n";
        let req = request::parse(head, b"", &arena, &Default::default()).unwrap();
        let mut ctx = Context::new(&req, &arena, ParamList::default());

        let chain = Chain::new().push(compression);
        let resp = chain.run(&mut ctx, &|ctx| {
            let mut resp = ctx.response();
            resp.body("short");
            resp
        });

        assert!(resp.header_value("content-encoding").is_none());
    }
}
