//! Response paths, as carried by incremental delivery payloads.
//!
//! A [`Path`] addresses one node in a concrete response: a sequence of object
//! keys and list indexes, serialized as a JSON array (`["allAnimals", 0,
//! "predators"]`). Stripping the indexes yields the [`FieldPath`] the compiler
//! uses to address entities, which is how payloads are matched against the
//! defer manifest.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::compiler::ir::FieldPath;

/// One step in a response path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// A list index.
    Index(usize),
    /// An object response key.
    Key(String),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => write!(f, "{key}"),
        }
    }
}

/// The address of one node within a concrete response tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    /// The entity address this path points at: its object keys, with list
    /// indexes dropped.
    pub fn to_field_path(&self) -> FieldPath {
        self.0
            .iter()
            .filter_map(|element| match element {
                PathElement::Key(key) => Some(key.clone()),
                PathElement::Index(_) => None,
            })
            .collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.0 {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    /// Parse a `/`-separated path, reading all-digit segments as indexes.
    fn from(value: &str) -> Self {
        Path(
            value
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| {
                    segment
                        .parse::<usize>()
                        .map(PathElement::Index)
                        .unwrap_or_else(|_| PathElement::Key(segment.to_string()))
                })
                .collect(),
        )
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<T: IntoIterator<Item = PathElement>>(iter: T) -> Self {
        Path(iter.into_iter().collect())
    }
}
