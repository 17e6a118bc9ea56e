//! Server assembly: wires a [`Router`], a [`middleware::Chain`], a handler
//! registry, an optional [`ConnectionFilter`], and the accept loop together
//! into one launchable object.

pub(crate) mod acceptor;
pub(crate) mod connection;
pub(crate) mod filter;
pub(crate) mod pool;

pub use filter::ConnectionFilter;
pub use pool::PoolStats;

use crate::{
    cache::ResponseCache,
    config::ServerConfig,
    context::Context,
    errors::ErrorKind,
    graphql::{executor::ResolverContext, GraphQlState},
    http::{
        response::Response,
        types::{Method, StatusCode},
    },
    middleware::Chain,
    router::{Router, RouteId},
    session::SessionManager,
    websocket::Hub,
};
use std::{collections::HashMap, io, sync::Arc};
use tokio::net::TcpListener;

pub type HandlerFn = Arc<dyn for<'a> Fn(&mut Context<'a>) -> Response + Send + Sync>;

pub(crate) const CACHE_KEY: &str = "webforge.cache";
pub(crate) const HUB_KEY: &str = "webforge.websocket_hub";
pub(crate) const SESSIONS_KEY: &str = "webforge.sessions";
pub(crate) const GRAPHQL_KEY: &str = "webforge.graphql";

/// Assembled, ready-to-launch server state. Built once via [`AppBuilder`],
/// then shared (`Arc<App>`) across every accepted connection.
pub struct App {
    pub(crate) config: ServerConfig,
    pub(crate) router: Router,
    pub(crate) chain: Chain,
    pub(crate) handlers: HashMap<RouteId, HandlerFn>,
    pub(crate) not_found: Box<dyn for<'a> Fn(&mut Context<'a>) -> Response + Send + Sync>,
    pub(crate) filter: Option<Arc<dyn ConnectionFilter>>,
    pub(crate) stats: PoolStats,
    pub(crate) max_requests_per_connection: Option<u64>,
    pub(crate) cache: Option<Arc<ResponseCache>>,
    pub(crate) websocket_hub: Option<Arc<Hub>>,
    pub(crate) sessions: Option<Arc<SessionManager>>,
    pub(crate) graphql: Option<Arc<GraphQlState>>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    pub fn websocket_hub(&self) -> Option<&Arc<Hub>> {
        self.websocket_hub.as_ref()
    }

    pub fn sessions(&self) -> Option<&Arc<SessionManager>> {
        self.sessions.as_ref()
    }

    pub fn graphql(&self) -> Option<&Arc<GraphQlState>> {
        self.graphql.as_ref()
    }

    /// Publishes the shared subsystems configured on this app into a
    /// request's [`Context`] scratch map, the same channel middleware use
    /// to hand data to a handler, so a handler reaches the cache, the
    /// WebSocket hub, the session store or the GraphQL state with
    /// `ctx.get::<Arc<T>>(..)` instead of a widened handler signature.
    pub(crate) fn inject_extensions<'a>(&self, ctx: &mut Context<'a>) {
        if let Some(cache) = &self.cache {
            ctx.insert(CACHE_KEY, cache.clone());
        }
        if let Some(hub) = &self.websocket_hub {
            ctx.insert(HUB_KEY, hub.clone());
        }
        if let Some(sessions) = &self.sessions {
            ctx.insert(SESSIONS_KEY, sessions.clone());
        }
        if let Some(graphql) = &self.graphql {
            ctx.insert(GRAPHQL_KEY, graphql.clone());
        }
    }

    /// Binds the listener and runs the accept loop until [`App::shutdown`]
    /// flips [`PoolStats::running`] off. `num_threads = Some(0)` serves every
    /// connection inline on the accepting task, so the loop only ever has
    /// one request in flight; any other value bounds the number of
    /// concurrently spawned connection tasks at [`ServerConfig::resolved_worker_count`].
    pub async fn serve(self: Arc<Self>) -> io::Result<()> {
        let listener = acceptor::bind(&self.config)?;
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "listening");

        let inline = self.config.num_threads == Some(0);
        let worker_slots = (!inline).then(|| Arc::new(tokio::sync::Semaphore::new(self.config.resolved_worker_count())));

        while self.stats.is_running() {
            let (stream, client_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            if self.stats.active_connections() >= self.config.max_connections {
                drop(stream);
                continue;
            }

            if let Err(e) = acceptor::configure_stream(&stream, &self.config) {
                tracing::debug!(error = %e, "failed to configure accepted stream");
            }

            if let Some(filter) = self.filter.clone() {
                if !admit(filter.as_ref(), client_addr, local_addr, &stream).await {
                    continue;
                }
            }

            let app = self.clone();
            match &worker_slots {
                None => connection::serve(stream, client_addr, local_addr, app).await,
                Some(slots) => {
                    let permit = slots.clone().acquire_owned().await.expect("semaphore never closed");
                    tokio::spawn(async move {
                        connection::serve(stream, client_addr, local_addr, app).await;
                        drop(permit);
                    });
                }
            }
        }

        Ok(())
    }

    pub fn shutdown(&self) {
        self.stats.stop();
    }
}

async fn admit(
    filter: &dyn ConnectionFilter,
    client_addr: std::net::SocketAddr,
    server_addr: std::net::SocketAddr,
    stream: &tokio::net::TcpStream,
) -> bool {
    let mut error_response = Response::new(crate::http::types::Version::Http11);
    error_response.status(StatusCode::Forbidden);

    if filter.filter(client_addr, server_addr, &mut error_response).is_err() {
        return reject(stream, &error_response).await;
    }
    if filter
        .filter_async(client_addr, server_addr, &mut error_response)
        .await
        .is_err()
    {
        return reject(stream, &error_response).await;
    }
    true
}

async fn reject(stream: &tokio::net::TcpStream, response: &Response) -> bool {
    use tokio::io::AsyncWriteExt;
    loop {
        stream.writable().await.ok();
        match stream.try_write(&response.serialize()) {
            Ok(_) | Err(_) => break,
        }
    }
    false
}

#[derive(Default)]
pub struct AppBuilder {
    config: ServerConfig,
    router: Router,
    chain: Chain,
    handlers: HashMap<RouteId, HandlerFn>,
    filter: Option<Arc<dyn ConnectionFilter>>,
    max_requests_per_connection: Option<u64>,
    cache: Option<Arc<ResponseCache>>,
    websocket_hub: Option<Arc<Hub>>,
    sessions: Option<Arc<SessionManager>>,
    graphql: Option<Arc<GraphQlState>>,
}

impl AppBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a route and its handler together so the registry can never
    /// hold a [`RouteId`] the router doesn't know about.
    pub fn route<F>(
        mut self,
        method: crate::http::types::Method,
        pattern: &str,
        handler: F,
    ) -> Result<Self, crate::errors::ErrorKind>
    where
        F: for<'a> Fn(&mut Context<'a>) -> Response + Send + Sync + 'static,
    {
        let id = self.router.register(method, pattern)?;
        self.handlers.insert(id, Arc::new(handler));
        Ok(self)
    }

    pub fn mount(mut self, prefix: &str, sub: Router, tags: Vec<String>) -> Result<Self, crate::errors::ErrorKind> {
        self.router.mount(prefix, sub, tags)?;
        Ok(self)
    }

    pub fn middleware(mut self, mw: impl crate::middleware::Middleware + 'static) -> Self {
        self.chain = self.chain.push(mw);
        self
    }

    pub fn filter(mut self, filter: impl ConnectionFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn max_requests_per_connection(mut self, max: u64) -> Self {
        self.max_requests_per_connection = Some(max);
        self
    }

    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn websocket_hub(mut self, hub: Hub) -> Self {
        self.websocket_hub = Some(Arc::new(hub));
        self
    }

    pub fn sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(Arc::new(sessions));
        self
    }

    pub fn graphql(mut self, graphql: GraphQlState) -> Self {
        self.graphql = Some(Arc::new(graphql));
        self
    }

    pub fn build(self) -> App {
        let AppBuilder {
            config,
            mut router,
            chain,
            mut handlers,
            filter,
            max_requests_per_connection,
            cache,
            websocket_hub,
            sessions,
            graphql,
        } = self;

        if !config.disable_reserved_routes {
            register_reserved_route(&mut router, &mut handlers, Method::Get, "/health", Arc::new(health_handler));
            if graphql.is_some() {
                register_reserved_route(&mut router, &mut handlers, Method::Post, "/graphql", Arc::new(graphql_handler));
            }
        }

        App {
            config,
            router,
            chain,
            handlers,
            not_found: Box::new(not_found_handler),
            filter,
            stats: PoolStats::new(),
            max_requests_per_connection,
            cache,
            websocket_hub,
            sessions,
            graphql,
        }
    }
}

/// Registers a reserved route unless the caller already registered the
/// same `(method, pattern)` themselves, in which case the caller's route
/// wins and the reserved one is skipped.
fn register_reserved_route(
    router: &mut Router,
    handlers: &mut HashMap<RouteId, HandlerFn>,
    method: Method,
    pattern: &str,
    handler: HandlerFn,
) {
    match router.register_tagged(method, pattern, vec!["reserved".to_string()]) {
        Ok(id) => {
            handlers.insert(id, handler);
        }
        Err(_) => tracing::debug!(pattern, "reserved route already registered by caller, skipping"),
    }
}

fn health_handler(ctx: &mut Context<'_>) -> Response {
    let mut resp = ctx.response();
    resp.status(StatusCode::Ok);
    resp.content_type("application/json");
    resp.body(br#"{"status":"ok"}"#.to_vec());
    resp
}

/// Reserved `/graphql` handler: runs the request body through the full
/// GraphQL pipeline using the [`GraphQlState`] and, when configured, the
/// response cache published into [`Context`] by [`App::inject_extensions`].
fn graphql_handler(ctx: &mut Context<'_>) -> Response {
    let mut resp = ctx.response();
    resp.content_type("application/json");

    let Some(state) = ctx.get::<Arc<GraphQlState>>(GRAPHQL_KEY) else {
        resp.status(StatusCode::InternalServerError);
        resp.body(br#"{"error":"GRAPHQL_NOT_CONFIGURED","message":"no GraphQL state registered"}"#.to_vec());
        return resp;
    };
    let cache = ctx.get::<Arc<ResponseCache>>(CACHE_KEY);
    let resolver_ctx = ResolverContext::default();

    match crate::graphql::run_request(
        ctx.request().body(),
        &state.schema,
        &state.registry,
        &state.config,
        &state.persisted,
        cache,
        &resolver_ctx,
    ) {
        Ok(result) => {
            resp.status(StatusCode::Ok);
            resp.body(result.to_json(&state.config).to_string().into_bytes());
        }
        Err(err) => {
            let kind = ErrorKind::from(err);
            resp.status(kind.status());
            resp.body(kind.to_json_body(state.config.mask_errors, "request could not be processed"));
        }
    }
    resp
}

fn not_found_handler(ctx: &mut Context<'_>) -> Response {
    let mut resp = ctx.response();
    resp.status(StatusCode::NotFound);
    resp.content_type("application/json");
    resp.body(br#"{"error":"NOT_FOUND","message":"no route matches the request path"}"#.to_vec());
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::types::Method;

    fn hello(ctx: &mut Context<'_>) -> Response {
        let mut resp = ctx.response();
        resp.status(StatusCode::Ok);
        resp.body(b"hello".to_vec());
        resp
    }

    #[test]
    fn builder_registers_route_and_handler_together() {
        let app = App::builder()
            .route(Method::Get, "/hello", hello)
            .unwrap()
            .build();
        assert_eq!(app.router.matches(Method::Get, b"/hello").unwrap().0 .0, 0);
        assert_eq!(app.handlers.len(), 1);
    }
}
