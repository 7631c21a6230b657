//! Runtime response handling: the incremental-delivery wire types and the
//! merge engine that folds payloads into one response tree.

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;

pub mod merge;
pub mod path;

pub use merge::ExecutionStatus;
pub use merge::OperationExecution;
pub use merge::ResponseNode;
pub use path::Path;
pub use path::PathElement;

/// One payload of a (possibly incremental) GraphQL response.
///
/// The primary payload carries no `path`; incremental payloads carry the
/// `path` and `label` identifying the deferred fragment they complete. The
/// final payload of a response sets `has_next` to `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<Path>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub has_next: Option<bool>,
}

impl Payload {
    /// Whether this is the primary payload of a response.
    pub fn is_primary(&self) -> bool {
        self.path.is_none()
    }
}

/// A GraphQL execution error carried in a payload's `errors` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Error {
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<Path>,
}

#[buildstructor::buildstructor]
impl Payload {
    /// Convenience constructor, mostly for tests.
    #[builder]
    pub fn new(
        label: Option<String>,
        data: Option<Value>,
        path: Option<Path>,
        errors: Vec<Error>,
        has_next: Option<bool>,
    ) -> Self {
        Self {
            label,
            data,
            path,
            errors,
            has_next,
        }
    }
}
