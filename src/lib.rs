//! Selection-set compilation and incremental response merging for GraphQL
//! clients.
//!
//! This crate is the engine underneath a generated client SDK. Ahead of time,
//! [`compiler::compile_operation`] turns a parsed operation (with fragments,
//! type conditions and `@include`/`@skip`/`@defer` directives) into a tree of
//! [`compiler::Entity`] nodes whose scoped selection sets drive code
//! generation. At runtime, [`response::OperationExecution`] merges the initial
//! payload and any number of labeled, path-addressed incremental payloads into
//! a copy-on-write object graph, tracking which deferred fragments each node
//! has received.
//!
//! Parsing of SDL and executable documents is delegated to `apollo-compiler`;
//! this crate starts from the AST.

#![warn(
    rustdoc::broken_intra_doc_links,
    unreachable_pub,
    unreachable_patterns,
    unused,
    unused_qualifications,
    dead_code,
    while_true,
    unconditional_panic,
    clippy::all
)]

pub mod compiler;
pub mod error;
pub mod response;
pub mod schema;

pub use crate::compiler::compile_operation;
pub use crate::compiler::CompiledOperation;
pub use crate::compiler::Operation;
pub use crate::compiler::FieldMergingConfig;
pub use crate::error::CompilationError;
pub use crate::error::MergeError;
pub use crate::response::OperationExecution;
pub use crate::schema::ClientSchema;
