//! Cross-Origin Resource Sharing: reflects an allowed origin and answers
//! preflight `OPTIONS` requests without reaching the handler.

use super::Next;
use crate::{
    context::Context,
    http::{response::Response, types::Method},
};

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: vec![Method::Get, Method::Post, Method::Put, Method::Patch, Method::Delete],
            allowed_headers: vec!["content-type".to_string(), "authorization".to_string()],
            allow_credentials: false,
            max_age_seconds: 600,
        }
    }
}

pub fn cors(config: CorsConfig) -> impl for<'a, 'b> Fn(&mut Context<'a>, Next<'a, 'b>) -> Response + Send + Sync {
    move |ctx: &mut Context<'_>, next: Next<'_, '_>| {
        let origin = ctx
            .request()
            .header(b"origin")
            .map(|o| String::from_utf8_lossy(o).into_owned());

        let allowed_origin = match &origin {
            Some(o) if config.allowed_origins.iter().any(|a| a == "*" || a == o) => Some(o.clone()),
            _ => None,
        };

        if ctx.request().method() == Method::Options {
            let mut resp = Response::new(ctx.request().version());
            if let Some(origin) = &allowed_origin {
                apply_cors_headers(&mut resp, origin, &config);
            }
            resp.no_content();
            return resp;
        }

        let mut resp = next.run(ctx);
        if let Some(origin) = &allowed_origin {
            apply_cors_headers(&mut resp, origin, &config);
        }
        resp
    }
}

fn apply_cors_headers(resp: &mut Response, origin: &str, config: &CorsConfig) {
    resp.header("access-control-allow-origin", origin.to_string());
    resp.header(
        "access-control-allow-methods",
        config
            .allowed_methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    );
    resp.header("access-control-allow-headers", config.allowed_headers.join(", "));
    resp.header("access-control-max-age", config.max_age_seconds.to_string());
    if config.allow_credentials {
        resp.header("access-control-allow-credentials", "true");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::ArenaPool, http::request, middleware::Chain, router::ParamList};

    fn parse<'a>(arena: &'a crate::arena::Arena, raw: &[u8]) -> request::Request<'a> {
        request::parse(raw, b"", arena, &Default::default()).unwrap()
    }

    #[test]
    fn preflight_short_circuits_with_cors_headers() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let req = parse(&arena, b"OPTIONS / HTTP/1.1\r\nOrigin: https://example.com\r\n");
        let mut ctx = Context::new(&req, &arena, ParamList::default());

        let config = CorsConfig {
            allowed_origins: vec!["https://example.com".to_string()],
            ..Default::default()
        };
        let chain = Chain::new().push(cors(config));
        let resp = chain.run(&mut ctx, &|ctx| {
            let mut resp = ctx.response();
            resp.body("should not run");
            resp
        });

        assert_eq!(
            resp.header_value("access-control-allow-origin"),
            Some("https://example.com")
        );
        assert!(resp.body_bytes().is_empty());
    }

    #[test]
    fn disallowed_origin_gets_no_cors_headers() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let req = parse(&arena, b"GET / HTTP/1.1\r\nOrigin: https://evil.example\r\n");
        let mut ctx = Context::new(&req, &arena, ParamList::default());

        let config = CorsConfig {
            allowed_origins: vec!["https://example.com".to_string()],
            ..Default::default()
        };
        let chain = Chain::new().push(cors(config));
        let resp = chain.run(&mut ctx, &|ctx| {
            let mut resp = ctx.response();
            resp.body("ok");
            resp
        });

        assert!(resp.header_value("access-control-allow-origin").is_none());
    }
}
