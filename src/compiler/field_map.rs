//! The ordered merged-field map backing a scope's field list.
//!
//! A field map does not contain two entries for the same response key: inserts
//! with an already-present key merge into the existing entry. Because merging
//! enforces invariants (identical argument lists, weaker-optionality), the
//! underlying map is only mutable through [`FieldMap::insert_merging`].

use std::ops::Deref;

use apollo_compiler::ast;
use apollo_compiler::Name;
use apollo_compiler::Node;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::compiler::ir::FragmentId;
use crate::error::CompilationError;

/// One field of a scope's merged field list.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedField {
    pub name: Name,
    pub response_key: Name,
    /// The field's declared (wrapped) type.
    pub ty: ast::Type,
    pub arguments: Vec<Node<ast::Argument>>,
    /// True when any source selection of this field is gated by a
    /// variable-dependent `@include`/`@skip`. Generated code must type the
    /// field as optional.
    pub conditional: bool,
    /// True when every source selection of this field sits behind `@defer`;
    /// the field is absent from the initial payload.
    pub deferred: bool,
    /// Set when the field reaches this scope exclusively through one named
    /// fragment. Direct selections and multi-source merges clear it.
    pub from_fragment: Option<FragmentId>,
}

impl MergedField {
    /// A canonical rendering of the argument list, used to decide whether two
    /// selections of the same response key are mergeable. Arguments are
    /// compared order-insensitively.
    pub(crate) fn argument_fingerprint(&self) -> String {
        self.arguments
            .iter()
            .map(|argument| {
                format!(
                    "{}:{}",
                    argument.name,
                    argument.value.serialize().no_indent()
                )
            })
            .sorted()
            .join(",")
    }
}

/// Ordered map from response key to merged field. First occurrence wins the
/// position; later inserts with the same key merge in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap(IndexMap<Name, MergedField>);

impl Deref for FieldMap {
    type Target = IndexMap<Name, MergedField>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FieldMap {
    /// Insert a field, merging with any existing entry for the same response
    /// key.
    ///
    /// Merge rules:
    /// - argument lists must be identical (order-insensitive), otherwise the
    ///   selection is ambiguous;
    /// - a conditional source makes the merged field conditional (weaker
    ///   typing wins);
    /// - the merged field is deferred only if every source defers it;
    /// - fragment attribution survives only while all sources agree.
    pub(crate) fn insert_merging(
        &mut self,
        type_name: &Name,
        field: MergedField,
    ) -> Result<(), CompilationError> {
        match self.0.entry(field.response_key.clone()) {
            indexmap::map::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.name != field.name
                    || existing.argument_fingerprint() != field.argument_fingerprint()
                {
                    return Err(CompilationError::AmbiguousField {
                        type_name: type_name.clone(),
                        response_key: field.response_key,
                    });
                }
                existing.conditional |= field.conditional;
                existing.deferred &= field.deferred;
                if existing.from_fragment != field.from_fragment {
                    existing.from_fragment = None;
                }
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(field);
            }
        }
        Ok(())
    }

    /// Whether every key in `keys` is present in this map.
    pub(crate) fn contains_keys<'a>(
        &self,
        mut keys: impl Iterator<Item = &'a Name>,
    ) -> bool {
        keys.all(|key| self.0.contains_key(key))
    }

    pub fn response_keys(&self) -> impl Iterator<Item = &Name> {
        self.0.keys()
    }
}

impl<'a> IntoIterator for &'a FieldMap {
    type Item = (&'a Name, &'a MergedField);
    type IntoIter = indexmap::map::Iter<'a, Name, MergedField>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
