//! GraphQL execution pipeline: ingest -> parse -> validate -> cache probe
//! -> execute -> mask -> serialize, plus request batching and the
//! `graphql-ws`/`graphql-transport-ws` subscription transport surface.

pub mod ast;
pub mod executor;
pub mod persisted;
pub mod schema;
pub mod validate;
pub mod value;

use crate::{cache::ResponseCache, config::GraphQlConfig, errors::ValidationError};
use executor::{ExecutionError, ResolverContext, ResolverRegistry};
use persisted::PersistedQueryStore;
use schema::Schema;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use value::Value;

#[derive(Debug, Deserialize, Default)]
pub struct PersistedQueryExtension {
    #[serde(rename = "persistedQuery")]
    pub persisted_query: Option<PersistedQueryRef>,
}

#[derive(Debug, Deserialize)]
pub struct PersistedQueryRef {
    pub version: u32,
    #[serde(rename = "sha256Hash")]
    pub sha256_hash: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct GraphQlRequest {
    pub query: Option<String>,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "operationName")]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub extensions: PersistedQueryExtension,
}

#[derive(Debug)]
pub struct GraphQlResponse {
    pub data: Option<Value>,
    pub errors: Vec<ExecutionError>,
}

/// Bundles everything a request handler needs to run a GraphQL operation,
/// so the server can hand callers a single shared value instead of four.
pub struct GraphQlState {
    pub schema: Schema,
    pub registry: ResolverRegistry,
    pub persisted: PersistedQueryStore,
    pub config: GraphQlConfig,
}

impl GraphQlState {
    pub fn new(schema: Schema, registry: ResolverRegistry, config: GraphQlConfig) -> Self {
        Self {
            schema,
            registry,
            persisted: PersistedQueryStore::new(),
            config,
        }
    }
}

impl GraphQlResponse {
    pub fn to_json(&self, config: &GraphQlConfig) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        if let Some(data) = &self.data {
            body.insert("data".to_string(), data.clone().into());
        }
        if !self.errors.is_empty() {
            let errors: Vec<serde_json::Value> = self
                .errors
                .iter()
                .map(|e| {
                    let mut obj = serde_json::Map::new();
                    let message = if config.mask_errors {
                        "internal error".to_string()
                    } else {
                        e.message.clone()
                    };
                    obj.insert("message".to_string(), serde_json::Value::String(message));
                    obj.insert(
                        "locations".to_string(),
                        serde_json::json!([{"line": e.location.line, "column": e.location.column}]),
                    );
                    obj.insert("path".to_string(), serde_json::json!(e.path));
                    if config.include_error_codes {
                        obj.insert("extensions".to_string(), serde_json::json!({"code": "RESOLVER_ERROR"}));
                    }
                    serde_json::Value::Object(obj)
                })
                .collect();
            body.insert("errors".to_string(), serde_json::Value::Array(errors));
        }
        serde_json::Value::Object(body)
    }
}

/// Ingests a raw JSON body, running it through the full pipeline up to and
/// including serialization. `parent` is the root value handed to every
/// top-level resolver (typically `Value::Null`).
pub fn run_request(
    body: &[u8],
    schema: &Schema,
    registry: &ResolverRegistry,
    config: &GraphQlConfig,
    persisted: &PersistedQueryStore,
    cache: Option<&Arc<ResponseCache>>,
    ctx: &ResolverContext,
) -> Result<GraphQlResponse, ValidationError> {
    let parsed: GraphQlRequest =
        serde_json::from_slice(body).map_err(|e| ValidationError::SchemaViolation(e.to_string()))?;

    let query = resolve_query_text(&parsed, config, persisted)?;
    let doc = ast::parse(&query).map_err(|e| ValidationError::SchemaViolation(e.to_string()))?;
    validate::validate(&doc, schema, config)?;

    let variables: HashMap<String, Value> = parsed
        .variables
        .iter()
        .map(|(k, v)| (k.clone(), json_to_value(v)))
        .collect();

    let is_query = matches!(doc.operation, ast::OperationType::Query);
    let cache_key = cache_fingerprint(&query, &parsed.variables, &parsed.operation_name);

    if is_query && config.enable_cache {
        if let Some(cache) = cache {
            if let Some(cached) = cache.get(&cache_key) {
                let data: serde_json::Value = serde_json::from_slice(&cached.body).unwrap_or(serde_json::Value::Null);
                return Ok(GraphQlResponse {
                    data: Some(json_to_value(&data)),
                    errors: Vec::new(),
                });
            }
        }
    }

    let root_type = match doc.operation {
        ast::OperationType::Mutation => schema.mutation_type.as_deref().unwrap_or(schema.query_type.as_str()),
        _ => schema.query_type.as_str(),
    };
    let outcome = executor::execute(&doc.selection_set, root_type, &Value::Null, &variables, schema, registry, ctx);

    if is_query && config.enable_cache && outcome.errors.is_empty() {
        if let Some(cache) = cache {
            let body: serde_json::Value = outcome.data.clone().into();
            if let Ok(bytes) = serde_json::to_vec(&body) {
                let _ = cache.set(
                    cache_key,
                    crate::cache::CachedResponse {
                        status: crate::http::types::StatusCode::Ok,
                        headers: Vec::new(),
                        body: bytes,
                    },
                    Duration::from_secs(60),
                );
            }
        }
    }

    Ok(GraphQlResponse {
        data: Some(outcome.data),
        errors: outcome.errors,
    })
}

/// Processes a batch request (a JSON array of operations) in request
/// order, each run through the full pipeline independently, bounded by
/// `max_batch_size`.
pub fn run_batch(
    bodies: &[&[u8]],
    schema: &Schema,
    registry: &ResolverRegistry,
    config: &GraphQlConfig,
    persisted: &PersistedQueryStore,
    cache: Option<&Arc<ResponseCache>>,
    ctx: &ResolverContext,
) -> Result<Vec<GraphQlResponse>, ValidationError> {
    if bodies.len() > config.max_batch_size {
        return Err(ValidationError::SchemaViolation(format!(
            "batch of {} exceeds max_batch_size={}",
            bodies.len(),
            config.max_batch_size
        )));
    }
    bodies
        .iter()
        .map(|body| run_request(body, schema, registry, config, persisted, cache, ctx))
        .collect()
}

fn resolve_query_text(
    request: &GraphQlRequest,
    config: &GraphQlConfig,
    persisted: &PersistedQueryStore,
) -> Result<String, ValidationError> {
    if let Some(reference) = &request.extensions.persisted_query {
        return match persisted.get(&reference.sha256_hash) {
            Some(text) => Ok(text),
            None => match &request.query {
                Some(text) if text.len() > 0 => {
                    persisted
                        .register_with_hash(&reference.sha256_hash, text)
                        .map_err(|_| ValidationError::SchemaViolation("persisted query hash mismatch".to_string()))?;
                    Ok(text.clone())
                }
                _ => Err(ValidationError::PersistedQueryNotAllowed),
            },
        };
    }
    if config.persisted_queries_only {
        return Err(ValidationError::PersistedQueryNotAllowed);
    }
    request.query.clone().ok_or_else(|| ValidationError::SchemaViolation("missing query".to_string()))
}

fn cache_fingerprint(query: &str, variables: &serde_json::Map<String, serde_json::Value>, operation_name: &Option<String>) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update(serde_json::to_string(variables).unwrap_or_default().as_bytes());
    hasher.update(operation_name.as_deref().unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(fields) => {
            Value::Object(fields.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect())
        }
    }
}

/// Subscription transport constants for the `graphql-ws`/
/// `graphql-transport-ws` protocols, spoken over an upgraded WebSocket.
pub mod subscription {
    pub const SUBPROTOCOL_LEGACY: &str = "graphql-ws";
    pub const SUBPROTOCOL_TRANSPORT: &str = "graphql-transport-ws";

    #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ClientMessage {
        ConnectionInit,
        Subscribe { id: String, payload: SubscribePayload },
        Complete { id: String },
    }

    #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct SubscribePayload {
        pub query: String,
        #[serde(default)]
        pub variables: serde_json::Map<String, serde_json::Value>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ServerMessage {
        ConnectionAck,
        Next { id: String, payload: serde_json::Value },
        Error { id: String, payload: Vec<String> },
        Complete { id: String },
        Ping,
        Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{FieldDef, ObjectType};
    use std::sync::Arc as StdArc;

    fn registry() -> ResolverRegistry {
        let mut registry = ResolverRegistry::default();
        registry.register(
            "Query",
            "ping",
            StdArc::new(|_, _, _| Ok(Value::String("pong".to_string()))),
        );
        registry
    }

    fn schema() -> Schema {
        Schema::new("Query").with_type(ObjectType::new("Query").field(FieldDef::new("ping", "String")))
    }

    #[test]
    fn runs_an_inline_query_end_to_end() {
        let body = br#"{"query": "{ ping }"}"#;
        let response = run_request(
            body,
            &schema(),
            &registry(),
            &GraphQlConfig::default(),
            &PersistedQueryStore::new(),
            None,
            &ResolverContext::default(),
        )
        .unwrap();
        assert!(response.errors.is_empty());
        let json = response.to_json(&GraphQlConfig::default());
        assert_eq!(json, serde_json::json!({"data": {"ping": "pong"}}));
    }

    #[test]
    fn non_persisted_query_rejected_when_persisted_only() {
        let body = br#"{"query": "{ ping }"}"#;
        let config = GraphQlConfig { persisted_queries_only: true, ..GraphQlConfig::default() };
        let err = run_request(
            body,
            &schema(),
            &registry(),
            &config,
            &PersistedQueryStore::new(),
            None,
            &ResolverContext::default(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::PersistedQueryNotAllowed);
    }

    #[test]
    fn first_sighting_of_a_persisted_hash_registers_it() {
        let persisted = PersistedQueryStore::new();
        let hash = PersistedQueryStore::hash_of("{ ping }");
        let body = format!(
            r#"{{"query": "{{ ping }}", "extensions": {{"persistedQuery": {{"version": 1, "sha256Hash": "{hash}"}}}}}}"#
        );
        let response = run_request(
            body.as_bytes(),
            &schema(),
            &registry(),
            &GraphQlConfig::default(),
            &persisted,
            None,
            &ResolverContext::default(),
        )
        .unwrap();
        assert!(response.errors.is_empty());
        assert!(persisted.contains(&hash));

        // second request can omit the query text now that it's registered
        let body2 = format!(r#"{{"extensions": {{"persistedQuery": {{"version": 1, "sha256Hash": "{hash}"}}}}}}"#);
        let response2 = run_request(
            body2.as_bytes(),
            &schema(),
            &registry(),
            &GraphQlConfig::default(),
            &persisted,
            None,
            &ResolverContext::default(),
        )
        .unwrap();
        assert!(response2.errors.is_empty());
    }

    #[test]
    fn batch_over_limit_is_rejected() {
        let bodies: Vec<&[u8]> = vec![br#"{"query":"{ ping }"}"#; 3];
        let config = GraphQlConfig { max_batch_size: 2, ..GraphQlConfig::default() };
        let err = run_batch(
            &bodies,
            &schema(),
            &registry(),
            &config,
            &PersistedQueryStore::new(),
            None,
            &ResolverContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::SchemaViolation(_)));
    }
}
