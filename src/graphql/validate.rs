//! Depth, complexity, and introspection-gate validation, run after parsing
//! and before execution.

use super::ast::{Document, Field};
use super::schema::Schema;
use crate::{config::GraphQlConfig, errors::ValidationError};

pub fn validate(doc: &Document, schema: &Schema, config: &GraphQlConfig) -> Result<(), ValidationError> {
    let root_type = match doc.operation {
        super::ast::OperationType::Mutation => {
            schema.mutation_type.as_deref().unwrap_or(schema.query_type.as_str())
        }
        _ => schema.query_type.as_str(),
    };

    if !config.resolved_introspection() && contains_introspection(&doc.selection_set) {
        return Err(ValidationError::IntrospectionDisabled);
    }

    let depth = max_depth(&doc.selection_set, config.ignore_introspection_for_depth);
    if depth > config.max_depth {
        return Err(ValidationError::DepthLimitExceeded { max: config.max_depth });
    }

    let complexity = total_complexity(&doc.selection_set, schema, root_type, config);
    if complexity > config.max_complexity {
        return Err(ValidationError::ComplexityLimitExceeded { max: config.max_complexity });
    }

    Ok(())
}

fn contains_introspection(fields: &[Field]) -> bool {
    fields
        .iter()
        .any(|f| f.is_introspection() || contains_introspection(&f.selection_set))
}

fn max_depth(fields: &[Field], ignore_introspection: bool) -> u32 {
    fields
        .iter()
        .filter(|f| !(ignore_introspection && f.is_introspection()))
        .map(|f| 1 + max_depth(&f.selection_set, ignore_introspection))
        .max()
        .unwrap_or(0)
}

fn total_complexity(fields: &[Field], schema: &Schema, type_name: &str, config: &GraphQlConfig) -> u32 {
    fields
        .iter()
        .map(|field| {
            if field.is_introspection() {
                return 0;
            }
            let def = schema.field(type_name, &field.name);
            let base = def.map(|d| d.complexity).unwrap_or(config.default_field_complexity);
            let multiplier = if def.map(|d| d.is_list).unwrap_or(false) {
                config.list_multiplier
            } else {
                1
            };
            let child_type = def.map(|d| d.type_name.as_str()).unwrap_or(type_name);
            let children = total_complexity(&field.selection_set, schema, child_type, config);
            (base + children) * multiplier
        })
        .sum()
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
                .field(FieldDef::new("users", "User").list().complexity(2))
                .field(FieldDef::new("__schema", "__Schema")),
        )
    }

    #[test]
    fn depth_within_limit_passes() {
        let doc = parse("{ user { id } }").unwrap();
        let config = GraphQlConfig { max_depth: 3, ..GraphQlConfig::default() };
        assert!(validate(&doc, &schema(), &config).is_ok());
    }

    #[test]
    fn depth_over_limit_is_rejected() {
        let doc = parse("{ user { friends { friends { id } } } }").unwrap();
        let config = GraphQlConfig { max_depth: 2, ..GraphQlConfig::default() };
        assert_eq!(validate(&doc, &schema(), &config), Err(ValidationError::DepthLimitExceeded { max: 2 }));
    }

    #[test]
    fn list_field_multiplies_complexity() {
        let doc = parse("{ users { id } }").unwrap();
        let config = GraphQlConfig { max_complexity: 5, list_multiplier: 10, ..GraphQlConfig::default() };
        // users: complexity 2 + child(id, default 1) = 3, * list_multiplier(10) = 30 > 5
        assert_eq!(
            validate(&doc, &schema(), &config),
            Err(ValidationError::ComplexityLimitExceeded { max: 5 })
        );
    }

    #[test]
    fn introspection_gate_blocks_schema_field() {
        let doc = parse("{ __schema { id } }").unwrap();
        let config = GraphQlConfig { enable_introspection: Some(false), ..GraphQlConfig::default() };
        assert_eq!(validate(&doc, &schema(), &config), Err(ValidationError::IntrospectionDisabled));
    }

    #[test]
    fn introspection_ignored_for_depth_when_configured() {
        let doc = parse("{ __schema { queryType { fields { name } } } }").unwrap();
        let config = GraphQlConfig {
            max_depth: 1,
            ignore_introspection_for_depth: true,
            ..GraphQlConfig::default()
        };
        assert!(validate(&doc, &schema(), &config).is_ok());
    }
}
