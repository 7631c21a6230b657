//! The intermediate representation consumed by code generation and by the
//! runtime merge engine's fragment bookkeeping.
//!
//! An [`Entity`] is one addressable object position in the response tree
//! (`allAnimals`, `allAnimals.predators`, ...). Each entity carries one
//! [`ScopedSelectionSet`] per distinct type condition encountered at that
//! position, including the unconditional scope. Both are deduplicated by
//! construction: one entity per field path, one scope per (path, condition)
//! pair.

use std::fmt;

use apollo_compiler::ast;
use apollo_compiler::Name;
use indexmap::IndexMap;
use indexmap::IndexSet;
use itertools::Itertools;
use serde::Serialize;

use crate::compiler::field_map::FieldMap;

/// The response-key path from the operation root to an entity. List indexes
/// are not part of a field path; `allAnimals.predators` is one path no matter
/// how many animals the response holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join("."))
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// The kind of root an operation executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub(crate) fn supports_root_defer(&self) -> bool {
        matches!(self, OperationKind::Query)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

impl From<ast::OperationType> for OperationKind {
    fn from(value: ast::OperationType) -> Self {
        match value {
            ast::OperationType::Query => OperationKind::Query,
            ast::OperationType::Mutation => OperationKind::Mutation,
            ast::OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

/// Controls which sources fold into a scope's merged field list.
///
/// `ancestors` folds fields visible on every concrete type of a scope (the
/// unconditional scope) into each conditional scope; `siblings` folds fields
/// from other conditional scopes whose condition is implied by the target
/// scope's; `named_fragments` lets fragment-sourced fields participate in that
/// folding. With everything disabled each scope only lists the fields authored
/// directly under its own type condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldMergingConfig {
    pub ancestors: bool,
    pub siblings: bool,
    pub named_fragments: bool,
}

impl FieldMergingConfig {
    pub const ALL: Self = Self {
        ancestors: true,
        siblings: true,
        named_fragments: true,
    };

    pub const NONE: Self = Self {
        ancestors: false,
        siblings: false,
        named_fragments: false,
    };
}

impl Default for FieldMergingConfig {
    fn default() -> Self {
        Self::ALL
    }
}

/// A compile-time-interned identifier for a named fragment or a
/// type-condition scope. Runtime "is fragment X fulfilled" checks are set
/// membership over these dense ids, no type reflection involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FragmentId(pub u32);

/// What a [`FragmentId`] was assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FragmentSource {
    /// A named fragment definition.
    Named(Name),
    /// An inline type-condition scope at a specific entity position.
    TypeCondition { path: FieldPath, condition: Name },
}

impl fmt::Display for FragmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentSource::Named(name) => write!(f, "fragment {name}"),
            FragmentSource::TypeCondition { path, condition } => {
                if path.is_root() {
                    write!(f, "... on {condition}")
                } else {
                    write!(f, "... on {condition} at {path}")
                }
            }
        }
    }
}

/// Interning table assigning each distinct fragment source a dense id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentRegistry {
    sources: IndexSet<FragmentSource>,
}

impl FragmentRegistry {
    pub(crate) fn intern(&mut self, source: FragmentSource) -> FragmentId {
        let (index, _) = self.sources.insert_full(source);
        FragmentId(index as u32)
    }

    pub fn get(&self, source: &FragmentSource) -> Option<FragmentId> {
        self.sources
            .get_index_of(source)
            .map(|index| FragmentId(index as u32))
    }

    pub fn source(&self, id: FragmentId) -> Option<&FragmentSource> {
        self.sources.get_index(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FragmentId, &FragmentSource)> {
        self.sources
            .iter()
            .enumerate()
            .map(|(index, source)| (FragmentId(index as u32), source))
    }
}

/// A `@defer` application gating one scope or named fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferSite {
    pub label: Option<String>,
    /// The fragment (named or type-condition scope) whose fields are gated
    /// behind this defer.
    pub fragment: FragmentId,
}

/// The merged field list visible at an entity for one type condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedSelectionSet {
    /// `None` is the unconditional scope: fields visible on every concrete
    /// type possible at this position.
    pub type_condition: Option<Name>,
    pub fields: FieldMap,
    /// Fragments and type-condition scopes whose full field requirements are
    /// satisfiable by this scope's data.
    pub fulfilled_fragments: IndexSet<FragmentId>,
    /// Defer applications attached to this scope.
    pub defers: Vec<DeferSite>,
    /// Response keys authored directly under this scope's own condition,
    /// before any folding. Used to decide whether other scopes satisfy this
    /// scope's requirements.
    pub(crate) own_keys: IndexSet<Name>,
}

impl ScopedSelectionSet {
    pub(crate) fn new(type_condition: Option<Name>) -> Self {
        Self {
            type_condition,
            fields: FieldMap::default(),
            fulfilled_fragments: IndexSet::new(),
            defers: Vec::new(),
            own_keys: IndexSet::new(),
        }
    }
}

/// One addressable object position in the response tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub path: FieldPath,
    pub declared_type: Name,
    /// Scopes in encounter order, the unconditional scope first when present.
    pub scopes: IndexMap<Option<Name>, ScopedSelectionSet>,
    /// Child entities keyed by response key.
    pub children: IndexMap<Name, Entity>,
}

impl Entity {
    /// The unconditional scope, if any selection applies to every concrete
    /// type at this position.
    pub fn unconditional_scope(&self) -> Option<&ScopedSelectionSet> {
        self.scopes.get(&None)
    }

    pub fn scope(&self, condition: &str) -> Option<&ScopedSelectionSet> {
        self.scopes
            .iter()
            .find(|(key, _)| key.as_ref().is_some_and(|name| name == condition))
            .map(|(_, scope)| scope)
    }

    /// Depth-first traversal over this entity and all descendants.
    pub fn descendants(&self) -> Vec<&Entity> {
        let mut stack = vec![self];
        let mut out = Vec::new();
        while let Some(entity) = stack.pop() {
            out.push(entity);
            stack.extend(entity.children.values());
        }
        out
    }
}
