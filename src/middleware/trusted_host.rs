//! Rejects requests whose `Host` header is not in an allow-list.

use super::Next;
use crate::{
    context::Context,
    errors::{AuthError, ErrorKind},
    http::{response::Response, types::StatusCode},
};

/// Returns a middleware rejecting any request whose `Host` header isn't in
/// `allowed_hosts`. An empty list disables the check (every host passes).
pub fn trusted_host(
    allowed_hosts: Vec<String>,
) -> impl for<'a, 'b> Fn(&mut Context<'a>, Next<'a, 'b>) -> Response + Send + Sync {
    move |ctx: &mut Context<'_>, next: Next<'_, '_>| {
        if allowed_hosts.is_empty() {
            return next.run(ctx);
        }
        let host = ctx
            .request()
            .header(b"host")
            .map(|h| String::from_utf8_lossy(h).into_owned());
        let allowed = host
            .as_deref()
            .map(|h| allowed_hosts.iter().any(|a| a == h))
            .unwrap_or(false);

        if allowed {
            next.run(ctx)
        } else {
            let err = ErrorKind::Auth(AuthError::TrustedHostRejected);
            let mut resp = Response::new(ctx.request().version());
            resp.status(StatusCode::Forbidden);
            resp.content_type("application/json");
            resp.body(err.to_json_body(true, "Forbidden"));
            resp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arena::ArenaPool, http::request, middleware::Chain, router::ParamList};

    fn run_with_host(allowed: Vec<String>, host_header: &[u8]) -> Response {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = [b"GET / HTTP/1.1\r\nHost: ".as_slice(), host_header, b"\r\n"].concat();
        let req = request::parse(&head, b"", &arena, &Default::default()).unwrap();
        let mut ctx = Context::new(&req, &arena, ParamList::default());

        let chain = Chain::new().push(trusted_host(allowed));
        chain.run(&mut ctx, &|ctx| {
            let mut resp = ctx.response();
            resp.body(());
            resp
        })
    }

    #[test]
    fn allows_listed_host() {
        let resp = run_with_host(vec!["example.com".to_string()], b"example.com");
        assert_eq!(resp.status_code(), crate::http::types::StatusCode::Ok);
    }

    #[test]
    fn rejects_unlisted_host() {
        let resp = run_with_host(vec!["example.com".to_string()], b"evil.com");
        assert_eq!(resp.status_code(), crate::http::types::StatusCode::Forbidden);
    }

    #[test]
    fn empty_allow_list_permits_all_hosts() {
        let resp = run_with_host(vec![], b"anything");
        assert_eq!(resp.status_code(), crate::http::types::StatusCode::Ok);
    }
}
