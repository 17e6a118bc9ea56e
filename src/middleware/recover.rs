//! Converts a panicking downstream middleware/handler into a 500 response
//! instead of taking down the worker thread.

use super::Next;
use crate::{
    context::Context,
    http::types::StatusCode,
};
use std::panic::{catch_unwind, AssertUnwindSafe};

pub fn recover<'a, 'b>(ctx: &mut Context<'a>, next: Next<'a, 'b>) -> crate::http::response::Response {
    match catch_unwind(AssertUnwindSafe(|| next.run(&mut *ctx))) {
        Ok(resp) => resp,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            tracing::error!(panic = %message, "recovered from handler panic");
            let mut resp = crate::http::response::Response::new(ctx.request().version());
            resp.status(StatusCode::InternalServerError);
            resp.content_type("application/json");
            resp.body(serde_json::json!({"error": "Internal Server Error"}));
            resp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::ArenaPool, http::request, middleware::Chain};

    #[test]
    fn panicking_handler_becomes_500() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"GET / HTTP/1.1\r\n";
        let req = request::parse(head, b"", &arena, &Default::default()).unwrap();
        let mut ctx = Context::new(&req, &arena, crate::router::ParamList::default());

        let chain = Chain::new().push(recover);
        let resp = chain.run(&mut ctx, &|_ctx| panic!("boom"));

        assert_eq!(resp.status_code(), StatusCode::InternalServerError);
    }
}
