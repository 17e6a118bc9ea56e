//! Fixed-window rate limiting, keyed by a header (normally the upstream
//! proxy's `X-Forwarded-For`) or a constant bucket when none is configured.

use super::Next;
use crate::{
    context::Context,
    errors::ErrorKind,
    http::{response::Response, types::StatusCode},
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub key_header: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            key_header: Some("x-forwarded-for".to_string()),
        }
    }
}

struct Bucket {
    count: u32,
    window_start: Instant,
}

#[derive(Clone)]
struct SharedState {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
}

pub fn rate_limit(
    config: RateLimitConfig,
) -> impl for<'a, 'b> Fn(&mut Context<'a>, Next<'a, 'b>) -> Response + Send + Sync {
    let state = SharedState {
        config,
        buckets: Arc::new(Mutex::new(HashMap::new())),
    };

    move |ctx: &mut Context<'_>, next: Next<'_, '_>| {
        let key = state
            .config
            .key_header
            .as_deref()
            .and_then(|h| ctx.request().header(h.as_bytes()))
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_else(|| "global".to_string());

        let allowed = {
            let mut buckets = state.buckets.lock();
            let now = Instant::now();
            let bucket = buckets.entry(key).or_insert_with(|| Bucket {
                count: 0,
                window_start: now,
            });
            if now.duration_since(bucket.window_start) >= state.config.window {
                bucket.count = 0;
                bucket.window_start = now;
            }
            bucket.count += 1;
            bucket.count <= state.config.max_requests
        };

        if allowed {
            next.run(ctx)
        } else {
            let err = ErrorKind::RateLimit;
            let mut resp = Response::new(ctx.request().version());
            resp.status(StatusCode::TooManyRequests);
            resp.content_type("application/json");
            resp.body(err.to_json_body(false, "rate limited"));
            resp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::ArenaPool, http::request, middleware::Chain, router::ParamList};

    #[test]
    fn trips_after_max_requests() {
        let pool = ArenaPool::new(1);
        let config = RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
            key_header: None,
        };
        let chain = Chain::new().push(rate_limit(config));

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let arena = pool.acquire();
            let head = b"GET / HTTP/1.1\r\n";
            let req = request::parse(head, b"", &arena, &Default::default()).unwrap();
            let mut ctx = Context::new(&req, &arena, ParamList::default());
            let resp = chain.run(&mut ctx, &|ctx| {
                let mut resp = ctx.response();
                resp.body(());
                resp
            });
            statuses.push(resp.status_code());
        }

        assert_eq!(statuses[0], StatusCode::Ok);
        assert_eq!(statuses[1], StatusCode::Ok);
        assert_eq!(statuses[2], StatusCode::TooManyRequests);
    }
}
