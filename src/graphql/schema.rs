//! Type-by-name schema registry. Types and fields are looked up by name at
//! every step (never cached by pointer/index) so the registry can be
//! rebuilt or extended between requests without invalidating anything a
//! prior request captured — the resolution in spec.md §9 over storing
//! direct object references.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub type_name: String,
    pub is_list: bool,
    pub complexity: u32,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_list: false,
            complexity: 1,
        }
    }

    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    pub fn complexity(mut self, value: u32) -> Self {
        self.complexity = value;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectType {
    pub name: String,
    pub fields: HashMap<String, FieldDef>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: HashMap::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

#[derive(Debug, Default)]
pub struct Schema {
    pub types: HashMap<String, ObjectType>,
    pub query_type: String,
    pub mutation_type: Option<String>,
}

impl Schema {
    pub fn new(query_type: impl Into<String>) -> Self {
        Self {
            types: HashMap::new(),
            query_type: query_type.into(),
            mutation_type: None,
        }
    }

    pub fn with_type(mut self, ty: ObjectType) -> Self {
        self.types.insert(ty.name.clone(), ty);
        self
    }

    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.mutation_type = Some(name.into());
        self
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.types.get(type_name)?.fields.get(field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_fields_by_type_and_field_name() {
        let schema = Schema::new("Query").with_type(
            ObjectType::new("Query")
                .field(FieldDef::new("user", "User"))
                .field(FieldDef::new("users", "User").list().complexity(2)),
        );
        assert_eq!(schema.field("Query", "user").unwrap().is_list, false);
        assert!(schema.field("Query", "users").unwrap().is_list);
        assert_eq!(schema.field("Query", "users").unwrap().complexity, 2);
        assert!(schema.field("Query", "missing").is_none());
    }
}
