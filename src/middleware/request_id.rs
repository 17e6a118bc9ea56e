//! Stamps every request with a unique id, reused by the logger and exposed
//! to handlers via the context.

use super::Next;
use crate::{context::Context, http::response::Response};
use rand::RngCore;

pub const CONTEXT_KEY: &str = "request_id";
const HEADER: &str = "x-request-id";

pub fn request_id<'a, 'b>(ctx: &mut Context<'a>, next: Next<'a, 'b>) -> Response {
    let id = match ctx.request().header(HEADER.as_bytes()) {
        Some(existing) => String::from_utf8_lossy(existing).into_owned(),
        None => generate(),
    };
    ctx.insert(CONTEXT_KEY, id.clone());
    let mut resp = next.run(ctx);
    resp.header(HEADER, id);
    resp
}

fn generate() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::ArenaPool, http::request, middleware::Chain, router::ParamList};

    #[test]
    fn generates_and_echoes_request_id() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"GET / HTTP/1.1\r\n";
        let req = request::parse(head, b"", &arena, &Default::default()).unwrap();
        let mut ctx = Context::new(&req, &arena, ParamList::default());

        let chain = Chain::new().push(request_id);
        let resp = chain.run(&mut ctx, &|ctx| {
            let mut resp = ctx.response();
            resp.body(());
            resp
        });

        assert!(resp.header_value(HEADER).is_some());
    }
}
