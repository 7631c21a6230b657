//! Error types for compilation and incremental merging.

use apollo_compiler::Name;
use thiserror::Error;

use crate::compiler::ir::FieldPath;
use crate::compiler::ir::OperationKind;
use crate::response::merge::ExecutionStatus;
use crate::response::path::Path;

/// Errors raised while compiling an operation into its IR.
///
/// All variants are terminal for the offending operation: no partial IR is
/// returned, and other operations in the same document are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    /// A field was requested on a type that does not declare it, directly or
    /// through interface/union membership.
    #[error("cannot query field \"{field_name}\" on type \"{type_name}\"")]
    UndefinedField { type_name: Name, field_name: Name },

    /// The same response key was selected several times with incompatible
    /// argument lists under the same type condition.
    #[error(
        "field \"{response_key}\" on type \"{type_name}\" is selected multiple times with conflicting arguments"
    )]
    AmbiguousField { type_name: Name, response_key: Name },

    /// A fragment spread referenced a fragment that is not defined in the
    /// document.
    #[error("unknown fragment \"{name}\"")]
    UndefinedFragment { name: Name },

    /// Two `@defer` directives at the same field path share a label, which
    /// would make incremental payloads ambiguous.
    #[error("duplicate @defer label {label:?} at path \"{path}\"")]
    DuplicateDeferLabel {
        label: Option<String>,
        path: FieldPath,
    },

    /// `@defer` was applied in the root selection set of an operation whose
    /// root does not support incremental delivery.
    #[error("@defer is not allowed on the root selection set of a {root_kind} operation")]
    InvalidDeferPlacement { root_kind: OperationKind },

    /// A type condition named a type the schema does not define as an object,
    /// interface, or union.
    #[error("unknown type \"{name}\" in type condition")]
    UnknownType { name: Name },

    /// The operation named for compilation does not exist in the document.
    #[error("no operation named {name:?} in the document")]
    UnknownOperation { name: Option<String> },

    /// The operation document failed to parse.
    #[error("invalid document: {message}")]
    InvalidDocument { message: String },

    /// The schema document itself failed to parse or validate.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// An internal invariant was broken. This indicates a bug in the compiler
    /// rather than in the operation being compiled.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CompilationError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Errors raised while merging response payloads at runtime.
///
/// A merge error transitions the execution to the `Failed` state; data merged
/// by earlier payloads stays accessible, marked incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// An incremental payload was addressed to a path that does not resolve
    /// against the currently materialized tree.
    #[error("incremental payload path \"{path}\" does not resolve against the current response")]
    UnresolvedPath { path: Path },

    /// An incremental payload was missing a required part, or its shape did
    /// not match the node it was addressed to.
    #[error("malformed incremental payload: {reason}")]
    MalformedPayload { reason: String },

    /// A payload arrived after the execution reached a terminal state.
    #[error("cannot apply a payload to an execution in the {status} state")]
    InvalidState { status: ExecutionStatus },
}
