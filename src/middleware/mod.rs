//! Ordered pre/post request hooks wrapping the matched handler.
//!
//! A middleware is a plain function `(Context, Next) -> Response`; it may
//! inspect/mutate the context, short-circuit by not calling `next`, or
//! post-process the `Response` `next` produces. Registration order is
//! execution order on the request path and reverse order on the response
//! path, because each middleware wraps the next one rather than being
//! invoked from a flat loop. Middlewares are plain `fn` items rather than
//! closures so the compiler treats their context lifetime as late-bound —
//! the same trick that lets a plain function satisfy a `for<'a> Fn(&'a _)`
//! bound without extra annotation.

mod compression;
mod cors;
mod logger;
mod rate_limit;
mod recover;
mod request_id;
mod security_headers;
mod trusted_host;

pub use compression::compression;
pub use cors::{cors, CorsConfig};
pub use logger::logger;
pub use rate_limit::{rate_limit, RateLimitConfig};
pub use recover::recover;
pub use request_id::request_id;
pub use security_headers::security_headers;
pub use trusted_host::trusted_host;

use crate::{context::Context, http::response::Response};
use std::sync::Arc;

/// The remaining chain: middlewares still to run (`'b`-borrowed from the
/// owning [`Chain`] for the duration of this dispatch) plus the terminal
/// handler, all operating on a request whose arena-borrowed data has the
/// independent lifetime `'a`.
pub struct Next<'a, 'b> {
    remaining: &'b [Arc<dyn Middleware>],
    handler: &'b (dyn Fn(&mut Context<'a>) -> Response + Sync),
}

impl<'a, 'b> Next<'a, 'b> {
    pub fn run(self, ctx: &mut Context<'a>) -> Response {
        match self.remaining.split_first() {
            Some((mw, rest)) => {
                let next = Next {
                    remaining: rest,
                    handler: self.handler,
                };
                mw.call(ctx, next)
            }
            None => (self.handler)(ctx),
        }
    }
}

pub trait Middleware: Send + Sync {
    fn call<'a, 'b>(&self, ctx: &mut Context<'a>, next: Next<'a, 'b>) -> Response;
}

impl<F> Middleware for F
where
    F: for<'a, 'b> Fn(&mut Context<'a>, Next<'a, 'b>) -> Response + Send + Sync,
{
    fn call<'a, 'b>(&self, ctx: &mut Context<'a>, next: Next<'a, 'b>) -> Response {
        self(ctx, next)
    }
}

/// An ordered, immutable-once-built chain of middleware terminated by a
/// handler. Built once at server start, shared read-only across workers.
pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn push(mut self, mw: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(mw));
        self
    }

    pub fn run<'a>(&self, ctx: &mut Context<'a>, handler: &(dyn Fn(&mut Context<'a>) -> Response + Sync)) -> Response {
        let next = Next {
            remaining: &self.middlewares,
            handler,
        };
        next.run(ctx)
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}
