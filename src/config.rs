//! Server and subsystem configuration.
//!
//! A plain-struct-with-`Default` shape: `ServerConfig` for the
//! connection/worker layer, plus one config struct per subsystem (cache,
//! WebSocket hub, GraphQL, session) built the same way.

use crate::http::request::ParseLimits;
use std::time::Duration;

/// Top-level server configuration. Defaults match the external-interface
/// defaults exactly.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub max_body_size: usize,
    /// `None` = auto-derive as `max(1, 2*cores - 1)`; `Some(0)` = accept and
    /// serve on the calling task; `Some(n)` = exactly `n` worker tasks.
    pub num_threads: Option<usize>,
    pub enable_access_log: bool,
    pub auto_port: bool,
    pub max_port_attempts: u16,
    pub read_buffer_size: usize,
    pub keepalive_timeout_ms: u64,
    pub max_connections: usize,
    pub max_pending_connections: usize,
    pub tcp_nodelay: bool,
    pub reuse_port: bool,
    pub disable_reserved_routes: bool,
    pub request_limits: RequestLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8000,
            max_body_size: 10 * 1024 * 1024,
            num_threads: None,
            enable_access_log: true,
            auto_port: true,
            max_port_attempts: 100,
            read_buffer_size: 16 * 1024,
            keepalive_timeout_ms: 5000,
            max_connections: 10_000,
            max_pending_connections: 1024,
            tcp_nodelay: true,
            reuse_port: true,
            disable_reserved_routes: false,
            request_limits: RequestLimits::default(),
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout_ms)
    }

    /// `2*cores - 1`, floored at 1 — the documented auto-derivation formula
    /// used when `num_threads` is left `None`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.num_threads {
            Some(n) => n,
            None => (2 * num_cpus::get()).saturating_sub(1).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub url_size: usize,
    pub url_parts: usize,
    pub url_query_parts: usize,
    pub header_count: usize,
    pub header_name_size: usize,
    pub header_value_size: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            url_size: 2048,
            url_parts: 16,
            url_query_parts: 32,
            header_count: 64,
            header_name_size: 128,
            header_value_size: 4096,
        }
    }
}

impl RequestLimits {
    pub(crate) fn into_parse_limits(self, max_body_size: usize) -> ParseLimits {
        ParseLimits {
            url_size: self.url_size,
            url_parts: self.url_parts,
            url_query_parts: self.url_query_parts,
            header_count: self.header_count,
            header_name_size: self.header_name_size,
            header_value_size: self.header_value_size,
            max_body_size,
        }
    }
}

/// Fluent builder over [`ServerConfig`]; `.build()` never fails because
/// every field has a documented default. The listener and handlers are
/// supplied separately to `App::builder()` rather than living on this
/// config struct.
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

macro_rules! builder_setters {
    ($($field:ident: $ty:ty),+ $(,)?) => {
        impl ServerConfigBuilder {
            $(
                pub fn $field(mut self, value: $ty) -> Self {
                    self.config.$field = value;
                    self
                }
            )+
        }
    };
}

builder_setters! {
    address: String,
    port: u16,
    max_body_size: usize,
    enable_access_log: bool,
    auto_port: bool,
    max_port_attempts: u16,
    read_buffer_size: usize,
    keepalive_timeout_ms: u64,
    max_connections: usize,
    max_pending_connections: usize,
    tcp_nodelay: bool,
    reuse_port: bool,
    disable_reserved_routes: bool,
    request_limits: RequestLimits,
}

impl ServerConfigBuilder {
    pub fn num_threads(mut self, value: usize) -> Self {
        self.config.num_threads = Some(value);
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Eviction policy for the response cache; selected at construction and
/// unchanged thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Fifo,
    Random,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_body_size: usize,
    pub eviction_policy: EvictionPolicy,
    pub cacheable_methods: Vec<crate::http::types::Method>,
    pub cacheable_status_codes: Vec<u16>,
    pub enable_stats: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        use crate::http::types::Method;
        Self {
            max_entries: 10_000,
            max_body_size: 2 * 1024 * 1024,
            eviction_policy: EvictionPolicy::Lru,
            cacheable_methods: vec![Method::Get, Method::Head],
            cacheable_status_codes: vec![200, 203, 204, 206, 300, 301, 404, 410],
            enable_stats: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub max_connections: usize,
    pub max_message_size: usize,
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub send_queue_capacity: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_message_size: 1024 * 1024,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
            send_queue_capacity: 256,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphQlConfig {
    pub max_depth: u32,
    pub max_complexity: u32,
    pub default_field_complexity: u32,
    pub list_multiplier: u32,
    pub ignore_introspection_for_depth: bool,
    pub enable_introspection: Option<bool>,
    pub persisted_queries_only: bool,
    pub mask_errors: bool,
    pub include_error_codes: bool,
    pub enable_tracing_extension: bool,
    pub max_batch_size: usize,
    pub keep_alive_interval_ms: u64,
    pub ack_timeout_ms: u64,
    pub enable_cache: bool,
}

impl Default for GraphQlConfig {
    fn default() -> Self {
        Self {
            max_depth: 15,
            max_complexity: 1000,
            default_field_complexity: 1,
            list_multiplier: 10,
            ignore_introspection_for_depth: true,
            enable_introspection: None,
            persisted_queries_only: false,
            mask_errors: true,
            include_error_codes: true,
            enable_tracing_extension: false,
            max_batch_size: 10,
            keep_alive_interval_ms: 20_000,
            ack_timeout_ms: 5_000,
            enable_cache: true,
        }
    }
}

impl GraphQlConfig {
    /// Resolves the open question in spec.md §9: explicit
    /// `enable_introspection` wins; otherwise introspection is allowed
    /// exactly when persisted queries are not mandatory.
    pub fn resolved_introspection(&self) -> bool {
        self.enable_introspection.unwrap_or(!self.persisted_queries_only)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub id_length: usize,
    pub path: String,
    pub domain: Option<String>,
    pub max_age_seconds: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    pub cleanup_interval_seconds: u64,
    pub csrf_header_name: String,
    pub csrf_form_field: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session_id".to_string(),
            id_length: 32,
            path: "/".to_string(),
            domain: None,
            max_age_seconds: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            cleanup_interval_seconds: 300,
            csrf_header_name: "X-CSRF-Token".to_string(),
            csrf_form_field: "csrf_token".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fields_match_external_interface() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.address, "127.0.0.1");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.max_body_size, 10 * 1024 * 1024);
        assert!(cfg.num_threads.is_none());
        assert!(cfg.enable_access_log);
        assert!(cfg.auto_port);
        assert_eq!(cfg.max_port_attempts, 100);
        assert_eq!(cfg.read_buffer_size, 16 * 1024);
        assert_eq!(cfg.keepalive_timeout_ms, 5000);
        assert_eq!(cfg.max_connections, 10_000);
        assert!(cfg.tcp_nodelay);
        assert!(cfg.reuse_port);
        assert!(!cfg.disable_reserved_routes);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = ServerConfig::builder().port(9090).num_threads(4).build();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.resolved_worker_count(), 4);
    }

    #[test]
    fn introspection_open_question_resolution() {
        let mut gql = GraphQlConfig::default();
        assert!(gql.resolved_introspection()); // persisted_queries_only=false -> allowed
        gql.persisted_queries_only = true;
        assert!(!gql.resolved_introspection());
        gql.enable_introspection = Some(true);
        assert!(gql.resolved_introspection()); // explicit wins
    }
}
