//! The schema model consumed by the compiler and the merge engine.
//!
//! [`ClientSchema`] wraps an already-validated `apollo_compiler::Schema` and
//! adds the lookups the selection-set compiler needs: possible runtime types
//! for abstract types, type-condition checks, and declared-field resolution.
//! It is cheap to clone and never mutated after construction.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::ast;
use apollo_compiler::collections::HashMap;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::schema::Implementers;
use apollo_compiler::name;
use apollo_compiler::validation::Valid;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use indexmap::IndexSet;

use crate::error::CompilationError;

/// A validated schema plus cached membership data, shared by reference.
#[derive(Clone)]
pub struct ClientSchema {
    schema: Arc<Valid<Schema>>,
    implementers_map: Arc<HashMap<Name, Implementers>>,
}

impl fmt::Debug for ClientSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSchema").finish_non_exhaustive()
    }
}

impl PartialEq for ClientSchema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema)
    }
}

impl Eq for ClientSchema {}

impl ClientSchema {
    pub fn new(schema: Valid<Schema>) -> Self {
        let implementers_map = schema.implementers_map();
        Self {
            schema: Arc::new(schema),
            implementers_map: Arc::new(implementers_map),
        }
    }

    /// Parse and validate an SDL document.
    pub fn parse(sdl: &str, path: &str) -> Result<Self, CompilationError> {
        let schema = Schema::parse_and_validate(sdl, path).map_err(|invalid| {
            CompilationError::InvalidSchema {
                message: invalid.errors.to_string(),
            }
        })?;
        Ok(Self::new(schema))
    }

    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    /// Whether the named type can carry a selection set.
    pub fn is_composite(&self, name: &str) -> bool {
        matches!(
            self.schema.types.get(name),
            Some(ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_))
        )
    }

    /// The concrete object types a value of the named type can be at runtime:
    /// the type itself for objects, implementing objects for interfaces,
    /// members for unions.
    pub fn possible_runtime_types(
        &self,
        name: &Name,
    ) -> Result<IndexSet<Name>, CompilationError> {
        match self.schema.types.get(name.as_str()) {
            Some(ExtendedType::Object(_)) => Ok(IndexSet::from([name.clone()])),
            Some(ExtendedType::Interface(_)) => Ok(self
                .implementers_map
                .get(name)
                .map(|implementers| implementers.objects.iter().cloned().collect())
                .unwrap_or_default()),
            Some(ExtendedType::Union(union_)) => Ok(union_
                .members
                .iter()
                .map(|member| member.name.clone())
                .collect()),
            _ => Err(CompilationError::internal(format!(
                "\"{name}\" is not a composite type"
            ))),
        }
    }

    /// Whether a value of concrete type `concrete` satisfies the type
    /// condition `condition`.
    pub fn type_condition_applies(&self, condition: &str, concrete: &str) -> bool {
        condition == concrete || self.schema.is_subtype(condition, concrete)
    }

    /// Resolve a declared field on a composite type, searching the type's own
    /// fields; `__typename` resolves on every composite type.
    pub fn field_definition(
        &self,
        parent: &Name,
        field_name: &str,
    ) -> Option<Node<FieldDefinition>> {
        if field_name == "__typename" {
            return Some(Node::new(FieldDefinition {
                description: None,
                name: name!("__typename"),
                arguments: Vec::new(),
                ty: ast::Type::NonNullNamed(name!("String")),
                directives: Default::default(),
            }));
        }
        self.schema
            .type_field(parent.as_str(), field_name)
            .ok()
            .map(|component| component.node.clone())
    }

    /// The root object type for the given operation kind, if the schema
    /// defines one.
    pub fn root_operation(&self, operation_type: ast::OperationType) -> Option<&Name> {
        self.schema.root_operation(operation_type)
    }
}
