//! Per-request context threaded through the middleware chain to the handler.
//!
//! `Context` pairs the parsed request with its arena and the route's
//! captured path parameters, plus a small scratch map middleware use to pass
//! data downstream (the authenticated session, a request id, a parsed
//! claim set) without widening the handler signature for every concern.

use crate::{
    arena::Arena,
    http::{request::Request, response::Response},
    router::ParamList,
};
use std::any::Any;
use std::collections::HashMap;

/// Everything a handler needs: the request, its route captures, a scratch
/// slot for middleware-produced values, and the arena backing all of it.
pub struct Context<'a> {
    request: &'a Request<'a>,
    arena: &'a Arena,
    params: ParamList<'a>,
    extensions: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl<'a> Context<'a> {
    pub fn new(request: &'a Request<'a>, arena: &'a Arena, params: ParamList<'a>) -> Self {
        Self {
            request,
            arena,
            params,
            extensions: HashMap::new(),
        }
    }

    pub fn request(&self) -> &'a Request<'a> {
        self.request
    }

    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    pub fn param(&self, name: &str) -> Option<&'a [u8]> {
        self.params.get(name)
    }

    pub fn params(&self) -> &ParamList<'a> {
        &self.params
    }

    /// Stores a value under `key`, overwriting any previous value. Used by
    /// middleware to publish something later middleware or the handler
    /// reads back with [`Context::get`].
    pub fn insert<T: Any + Send + Sync>(&mut self, key: &'static str, value: T) {
        self.extensions.insert(key, Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &'static str) -> Option<&T> {
        self.extensions.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn response(&self) -> Response {
        Response::new(self.request.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::ArenaPool, http::request};

    #[test]
    fn params_and_extensions_roundtrip() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"GET /users/1 HTTP/1.1\r\n";
        let request = request::parse(head, b"", &arena, &Default::default()).unwrap();

        let mut router = crate::router::Router::new();
        let id = router.register(crate::http::types::Method::Get, "/users/{id}").unwrap();
        let (matched, params) = router.matches(crate::http::types::Method::Get, request.url().path()).unwrap();
        assert_eq!(matched, id);

        let mut ctx = Context::new(&request, &arena, params);
        assert_eq!(ctx.param("id"), Some(b"1".as_slice()));

        ctx.insert("request_id", "abc-123".to_string());
        assert_eq!(ctx.get::<String>("request_id").map(|s| s.as_str()), Some("abc-123"));
        assert!(ctx.get::<u32>("request_id").is_none());
    }
}
