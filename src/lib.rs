//! webforge - a multi-threaded HTTP/1.1 framework with an arena-backed
//! request lifecycle, a trie router, an ordered middleware chain, and
//! integrated response caching, WebSocket, GraphQL and session subsystems.
//!
//! # Quick start
//!
//! ```no_run
//! use webforge::{App, Context, Response, StatusCode, Method};
//!
//! fn hello(ctx: &mut Context<'_>) -> Response {
//!     let mut resp = ctx.response();
//!     resp.status(StatusCode::Ok);
//!     resp.body("hello");
//!     resp
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let app = App::builder()
//!         .route(Method::Get, "/hello", hello)
//!         .unwrap()
//!         .build();
//!     std::sync::Arc::new(app).serve().await
//! }
//! ```

pub mod arena;
pub mod cache;
pub mod config;
pub mod context;
pub mod errors;
pub mod graphql;
pub(crate) mod http {
    pub mod query;
    pub mod request;
    pub mod response;
    pub mod types;
}
pub mod middleware;
pub mod router;
pub mod server;
pub mod session;
pub mod websocket;

#[cfg(test)]
pub(crate) mod tools {
    use std::str::from_utf8;

    #[inline]
    pub(crate) fn str_2<'a>(value: (&'a [u8], &'a [u8])) -> (&'a str, &'a str) {
        (from_utf8(value.0).unwrap(), from_utf8(value.1).unwrap())
    }
}

pub use crate::{
    arena::{Arena, ArenaGuard, ArenaPool},
    cache::{CacheStats, ResponseCache},
    config::{CacheConfig, GraphQlConfig, HubConfig, ServerConfig, SessionConfig},
    context::Context,
    errors::ErrorKind,
    graphql::GraphQlState,
    http::{
        query,
        request::Request,
        response::{Handled, Response, WriteBuffer},
        types::{Method, StatusCode, Url, Version},
    },
    middleware::{Chain, Middleware, Next},
    router::{RouteId, Router},
    server::{App, AppBuilder, ConnectionFilter, PoolStats},
    session::{Session, SessionManager},
    websocket::{ConnectionId, Hub, Message},
};
