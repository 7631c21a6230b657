//! Deferred-fragment resolution.
//!
//! Every `@defer` application in a compiled operation is addressed by a
//! [`DeferredFragmentIdentifier`]: the label plus the field path of the entity
//! the defer applies to. Incremental payloads arrive tagged with the same pair
//! and are routed through the [`DeferManifest`] built here.

use std::fmt;
use std::ops::Deref;

use apollo_compiler::Name;
use indexmap::IndexMap;
use serde::Serialize;

use crate::compiler::ir::Entity;
use crate::compiler::ir::FieldPath;
use crate::compiler::ir::FragmentId;
use crate::compiler::ir::OperationKind;
use crate::error::CompilationError;

/// The stable address of one `@defer` application within an operation.
///
/// No two defers in the same operation may share a `(label, field_path)`
/// pair; the label exists precisely to disambiguate sibling defers at the
/// same path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeferredFragmentIdentifier {
    pub label: Option<String>,
    pub field_path: FieldPath,
}

impl fmt::Display for DeferredFragmentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label}@{}", self.field_path),
            None => write!(f, "@{}", self.field_path),
        }
    }
}

/// What a deferred payload resolves to: the scope holding the gated fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferRef {
    pub entity_path: FieldPath,
    pub type_condition: Option<Name>,
    /// The interned fragment whose fulfillment the payload establishes.
    pub fragment: FragmentId,
}

/// Lookup table from deferred-fragment identifier to target scope, rendered
/// into generated code and consulted at runtime when incremental payloads
/// arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeferManifest {
    entries: IndexMap<DeferredFragmentIdentifier, DeferRef>,
}

impl Deref for DeferManifest {
    type Target = IndexMap<DeferredFragmentIdentifier, DeferRef>;

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl DeferManifest {
    /// Find the manifest entry matching an incremental payload's label and
    /// field path.
    pub fn resolve(
        &self,
        label: Option<&str>,
        field_path: &FieldPath,
    ) -> Option<(&DeferredFragmentIdentifier, &DeferRef)> {
        self.entries
            .iter()
            .find(|(id, _)| id.label.as_deref() == label && &id.field_path == field_path)
    }
}

/// Walk the compiled entity tree and build the defer manifest, rejecting
/// label collisions and defers on non-deferrable roots.
pub(crate) fn resolve_deferred_fragments(
    root: &Entity,
    root_kind: OperationKind,
) -> Result<DeferManifest, CompilationError> {
    let mut manifest = DeferManifest::default();
    for entity in root.descendants() {
        for scope in entity.scopes.values() {
            for site in &scope.defers {
                if entity.path.is_root() && !root_kind.supports_root_defer() {
                    return Err(CompilationError::InvalidDeferPlacement { root_kind });
                }
                let identifier = DeferredFragmentIdentifier {
                    label: site.label.clone(),
                    field_path: entity.path.clone(),
                };
                let target = DeferRef {
                    entity_path: entity.path.clone(),
                    type_condition: scope.type_condition.clone(),
                    fragment: site.fragment,
                };
                if manifest.entries.insert(identifier.clone(), target).is_some() {
                    return Err(CompilationError::DuplicateDeferLabel {
                        label: identifier.label,
                        path: identifier.field_path,
                    });
                }
            }
        }
    }
    Ok(manifest)
}
