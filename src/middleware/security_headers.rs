//! Injects a conservative set of browser security headers onto every
//! response.

use super::Next;
use crate::{context::Context, http::response::Response};

pub fn security_headers<'a, 'b>(ctx: &mut Context<'a>, next: Next<'a, 'b>) -> Response {
    let mut resp = next.run(ctx);
    resp.header("x-content-type-options", "nosniff");
    resp.header("x-frame-options", "DENY");
    resp.header("referrer-policy", "no-referrer");
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::ArenaPool, http::request, middleware::Chain, router::ParamList};

    #[test]
    fn adds_headers_to_response() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"GET / HTTP/1.1\r\n";
        let req = request::parse(head, b"", &arena, &Default::default()).unwrap();
        let mut ctx = Context::new(&req, &arena, ParamList::default());

        let chain = Chain::new().push(security_headers);
        let resp = chain.run(&mut ctx, &|ctx| {
            let mut resp = ctx.response();
            resp.body(());
            resp
        });

        assert_eq!(resp.header_value("x-content-type-options"), Some("nosniff"));
        assert_eq!(resp.header_value("x-frame-options"), Some("DENY"));
    }
}
