//! Resolver dispatch. A resolver is looked up by `(type_name, field_name)`,
//! receives the parent value, an arguments map, and an opaque context, and
//! returns a [`Value`] or an error message. Errors are collected with the
//! response-path segments that produced them rather than aborting the
//! whole operation, so partial data survives per-field failures.

use super::ast::{ArgValue, Field};
use super::schema::Schema;
use super::value::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Opaque per-execution context, handed to every resolver. Carries
/// arbitrary caller state (an authenticated user, a database handle) via
/// the same typed-scratch-map idiom [`crate::context::Context`] uses for
/// middleware state.
#[derive(Default)]
pub struct ResolverContext {
    data: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl ResolverContext {
    pub fn insert<T: Any + Send + Sync>(&mut self, key: &'static str, value: T) {
        self.data.insert(key, Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &'static str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref())
    }
}

pub type Resolver =
    Arc<dyn Fn(&Value, &HashMap<String, Value>, &ResolverContext) -> Result<Value, String> + Send + Sync>;

#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<(String, String), Resolver>,
}

impl ResolverRegistry {
    pub fn register(&mut self, type_name: impl Into<String>, field_name: impl Into<String>, resolver: Resolver) {
        self.resolvers.insert((type_name.into(), field_name.into()), resolver);
    }

    fn get(&self, type_name: &str, field_name: &str) -> Option<&Resolver> {
        self.resolvers.get(&(type_name.to_string(), field_name.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionError {
    pub message: String,
    pub path: Vec<String>,
    pub location: super::ast::Location,
}

pub struct ExecutionOutcome {
    pub data: Value,
    pub errors: Vec<ExecutionError>,
}

/// Walks `fields` against `type_name`, resolving each against `registry`
/// and recursing into nested selection sets using the resolved value as
/// the next parent. A resolver error is recorded with its path and the
/// field's position in the response is set to `null`, per the
/// partial-data-with-errors rule.
pub fn execute(
    fields: &[Field],
    type_name: &str,
    parent: &Value,
    variables: &HashMap<String, Value>,
    schema: &Schema,
    registry: &ResolverRegistry,
    ctx: &ResolverContext,
) -> ExecutionOutcome {
    let mut data = BTreeMap::new();
    let mut errors = Vec::new();
    execute_into(fields, type_name, parent, variables, schema, registry, ctx, &mut Vec::new(), &mut data, &mut errors);
    ExecutionOutcome {
        data: Value::Object(data),
        errors,
    }
}

fn execute_into(
    fields: &[Field],
    type_name: &str,
    parent: &Value,
    variables: &HashMap<String, Value>,
    schema: &Schema,
    registry: &ResolverRegistry,
    ctx: &ResolverContext,
    path: &mut Vec<String>,
    out: &mut BTreeMap<String, Value>,
    errors: &mut Vec<ExecutionError>,
) {
    for field in fields {
        path.push(field.response_key().to_string());

        if field.name == "__typename" {
            out.insert(field.response_key().to_string(), Value::String(type_name.to_string()));
            path.pop();
            continue;
        }

        let child_type = schema
            .field(type_name, &field.name)
            .map(|d| d.type_name.as_str())
            .unwrap_or(&field.name);
        let args = resolve_arguments(&field.arguments, variables);
        match registry.get(type_name, &field.name) {
            None => {
                errors.push(ExecutionError {
                    message: format!("no resolver registered for {type_name}.{}", field.name),
                    path: path.clone(),
                    location: field.location,
                });
                out.insert(field.response_key().to_string(), Value::Null);
            }
            Some(resolver) => match resolver(parent, &args, ctx) {
                Err(message) => {
                    errors.push(ExecutionError {
                        message,
                        path: path.clone(),
                        location: field.location,
                    });
                    out.insert(field.response_key().to_string(), Value::Null);
                }
                Ok(value) if field.selection_set.is_empty() => {
                    out.insert(field.response_key().to_string(), value);
                }
                Ok(Value::List(items)) => {
                    let mut list = Vec::with_capacity(items.len());
                    for (index, item) in items.iter().enumerate() {
                        path.push(index.to_string());
                        let mut child = BTreeMap::new();
                        execute_into(&field.selection_set, child_type, item, variables, schema, registry, ctx, path, &mut child, errors);
                        list.push(Value::Object(child));
                        path.pop();
                    }
                    out.insert(field.response_key().to_string(), Value::List(list));
                }
                Ok(value) => {
                    let mut child = BTreeMap::new();
                    execute_into(&field.selection_set, child_type, &value, variables, schema, registry, ctx, path, &mut child, errors);
                    out.insert(field.response_key().to_string(), Value::Object(child));
                }
            },
        }
        path.pop();
    }
}

fn resolve_arguments(arguments: &[(String, ArgValue)], variables: &HashMap<String, Value>) -> HashMap<String, Value> {
    arguments
        .iter()
        .map(|(name, value)| (name.clone(), resolve_value(value, variables)))
        .collect()
}

fn resolve_value(value: &ArgValue, variables: &HashMap<String, Value>) -> Value {
    match value {
        ArgValue::Int(n) => Value::Int(*n),
        ArgValue::Float(n) => Value::Float(*n),
        ArgValue::String(s) => Value::String(s.clone()),
        ArgValue::Boolean(b) => Value::Boolean(*b),
        ArgValue::Null => Value::Null,
        ArgValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        ArgValue::List(items) => Value::List(items.iter().map(|v| resolve_value(v, variables)).collect()),
        ArgValue::Object(fields) => {
            Value::Object(fields.iter().map(|(k, v)| (k.clone(), resolve_value(v, variables))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::{
        ast::parse,
        schema::{FieldDef, ObjectType},
    };

    fn schema() -> Schema {
        Schema::new("Query").with_type(
            ObjectType::new("Query")
                .field(FieldDef::new("user", "User"))
                .field(FieldDef::new("broken", "String"))
                .field(FieldDef::new("ghost", "String")),
        )
    }

    fn registry() -> ResolverRegistry {
        let mut registry = ResolverRegistry::default();
        registry.register("Query", "user", Arc::new(|_parent, args, _ctx| {
            let id = args.get("id").cloned().unwrap_or(Value::Null);
            let mut obj = BTreeMap::new();
            obj.insert("id".to_string(), id);
            obj.insert("name".to_string(), Value::String("ada".to_string()));
            Ok(Value::Object(obj))
        }));
        registry.register("User", "name", Arc::new(|parent, _args, _ctx| {
            Ok(parent.as_object().and_then(|o| o.get("name")).cloned().unwrap_or(Value::Null))
        }));
        registry.register("Query", "broken", Arc::new(|_, _, _| Err("boom".to_string())));
        registry
    }

    #[test]
    fn resolves_nested_field_from_parent_value() {
        let doc = parse("{ user(id: 1) { name } }").unwrap();
        let outcome = execute(&doc.selection_set, "Query", &Value::Null, &HashMap::new(), &schema(), &registry(), &ResolverContext::default());
        assert!(outcome.errors.is_empty());
        let json: serde_json::Value = outcome.data.into();
        assert_eq!(json, serde_json::json!({"user": {"name": "ada"}}));
    }

    #[test]
    fn resolver_error_becomes_null_plus_path() {
        let doc = parse("{ broken }").unwrap();
        let outcome = execute(&doc.selection_set, "Query", &Value::Null, &HashMap::new(), &schema(), &registry(), &ResolverContext::default());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].path, vec!["broken".to_string()]);
        let json: serde_json::Value = outcome.data.into();
        assert_eq!(json, serde_json::json!({"broken": null}));
    }

    #[test]
    fn missing_resolver_is_reported_without_panicking() {
        let doc = parse("{ ghost }").unwrap();
        let outcome = execute(&doc.selection_set, "Query", &Value::Null, &HashMap::new(), &schema(), &registry(), &ResolverContext::default());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].message.contains("ghost"));
    }
}
