//! The incremental response merge engine.
//!
//! An [`OperationExecution`] owns the materialized response tree for one
//! operation and folds payloads into it as they arrive: the primary payload
//! establishes the tree, incremental payloads merge into the node their path
//! addresses. The tree is built from [`Arc`]ed nodes and mutated through
//! [`Arc::make_mut`], so a snapshot handed out before a merge is never
//! modified by later payloads.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::IndexSet;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use crate::compiler::defer::DeferredFragmentIdentifier;
use crate::compiler::ir::FieldPath;
use crate::compiler::ir::FragmentId;
use crate::compiler::CompiledOperation;
use crate::error::MergeError;
use crate::response::path::Path;
use crate::response::path::PathElement;
use crate::response::Error;
use crate::response::Payload;

/// The lifecycle of one operation's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// No payload received yet.
    Pending,
    /// The primary payload has been merged; deferred payloads are expected.
    Initial,
    /// At least one incremental payload has been merged.
    Merging,
    /// The final payload (`hasNext: false`) has been merged.
    Complete,
    /// A payload could not be merged. Previously merged data stays readable.
    Failed,
    /// The client stopped the response before it completed.
    Aborted,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Initial => "initial",
            ExecutionStatus::Merging => "merging",
            ExecutionStatus::Complete => "complete",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Aborted => "aborted",
        };
        f.write_str(status)
    }
}

/// An object node of the materialized tree: its merged fields plus the
/// fragments that incremental payloads have fulfilled on it. The fulfilled
/// set only ever grows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectNode {
    fields: IndexMap<ByteString, Arc<ResponseNode>>,
    fulfilled: IndexSet<FragmentId>,
}

impl ObjectNode {
    pub fn get(&self, key: &str) -> Option<&ResponseNode> {
        self.fields.get(&ByteString::from(key)).map(Arc::as_ref)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(ByteString::as_str)
    }

    pub fn fulfilled(&self) -> &IndexSet<FragmentId> {
        &self.fulfilled
    }

    pub fn is_fulfilled(&self, id: FragmentId) -> bool {
        self.fulfilled.contains(&id)
    }
}

/// One node of the materialized response tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseNode {
    Object(ObjectNode),
    List(Vec<Arc<ResponseNode>>),
    Scalar(Value),
}

impl ResponseNode {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => ResponseNode::Object(ObjectNode {
                fields: map
                    .into_iter()
                    .map(|(key, value)| (key, Arc::new(Self::from_value(value))))
                    .collect(),
                fulfilled: IndexSet::new(),
            }),
            Value::Array(items) => ResponseNode::List(
                items
                    .into_iter()
                    .map(|item| Arc::new(Self::from_value(item)))
                    .collect(),
            ),
            scalar => ResponseNode::Scalar(scalar),
        }
    }

    /// Render the tree back into a JSON value, dropping fragment bookkeeping.
    pub fn to_value(&self) -> Value {
        match self {
            ResponseNode::Object(object) => Value::Object(
                object
                    .fields
                    .iter()
                    .map(|(key, node)| (key.clone(), node.to_value()))
                    .collect(),
            ),
            ResponseNode::List(items) => {
                Value::Array(items.iter().map(|item| item.to_value()).collect())
            }
            ResponseNode::Scalar(value) => value.clone(),
        }
    }

    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            ResponseNode::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Resolve a path against this node without touching the tree.
    pub fn node_at(&self, path: &Path) -> Option<&ResponseNode> {
        let mut current = self;
        for element in path.iter() {
            current = match (current, element) {
                (ResponseNode::Object(object), PathElement::Key(key)) => {
                    object.get(key.as_str())?
                }
                (ResponseNode::List(items), PathElement::Index(index)) => {
                    items.get(*index)?.as_ref()
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve a path for mutation, copying every node along the way that is
    /// shared with an earlier snapshot.
    fn make_mut_at<'a>(root: &'a mut Arc<ResponseNode>, path: &Path) -> Option<&'a mut Self> {
        let mut current = Arc::make_mut(root);
        for element in path.iter() {
            current = match (current, element) {
                (ResponseNode::Object(object), PathElement::Key(key)) => Arc::make_mut(
                    object.fields.get_mut(&ByteString::from(key.as_str()))?,
                ),
                (ResponseNode::List(items), PathElement::Index(index)) => {
                    Arc::make_mut(items.get_mut(*index)?)
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Merge a payload value into this node. Objects merge key by key, lists
    /// merge per index with extra items appended, anything else is replaced by
    /// the incoming value. Re-applying the same value is a no-op.
    fn merge_value(&mut self, value: &Value) {
        match (&mut *self, value) {
            (ResponseNode::Object(object), Value::Object(map)) => {
                for (key, item) in map.iter() {
                    match object.fields.entry(key.clone()) {
                        indexmap::map::Entry::Occupied(mut entry) => {
                            Arc::make_mut(entry.get_mut()).merge_value(item);
                        }
                        indexmap::map::Entry::Vacant(entry) => {
                            entry.insert(Arc::new(Self::from_value(item.clone())));
                        }
                    }
                }
            }
            (ResponseNode::List(items), Value::Array(incoming)) => {
                for (index, item) in incoming.iter().enumerate() {
                    match items.get_mut(index) {
                        Some(existing) => Arc::make_mut(existing).merge_value(item),
                        None => items.push(Arc::new(Self::from_value(item.clone()))),
                    }
                }
            }
            _ => *self = Self::from_value(value.clone()),
        }
    }
}

/// The runtime state of one operation: the compiled IR it executes, the
/// materialized tree, and which deferred fragments have arrived.
#[derive(Debug, Clone)]
pub struct OperationExecution {
    compiled: Arc<CompiledOperation>,
    status: ExecutionStatus,
    root: Option<Arc<ResponseNode>>,
    fulfilled: IndexSet<DeferredFragmentIdentifier>,
    errors: Vec<Error>,
}

impl OperationExecution {
    pub fn new(compiled: Arc<CompiledOperation>) -> Self {
        Self {
            compiled,
            status: ExecutionStatus::Pending,
            root: None,
            fulfilled: IndexSet::new(),
            errors: Vec::new(),
        }
    }

    pub fn compiled(&self) -> &CompiledOperation {
        &self.compiled
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// A snapshot of the current tree. Later merges never mutate it.
    pub fn root(&self) -> Option<Arc<ResponseNode>> {
        self.root.clone()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// The deferred fragments whose payloads have been merged so far.
    pub fn fulfilled(&self) -> &IndexSet<DeferredFragmentIdentifier> {
        &self.fulfilled
    }

    pub fn is_fulfilled(&self, label: Option<&str>, field_path: &FieldPath) -> bool {
        self.fulfilled
            .iter()
            .any(|id| id.label.as_deref() == label && &id.field_path == field_path)
    }

    /// Merge one payload into the tree and return a snapshot of the result.
    ///
    /// The primary payload must come first and exactly once; incremental
    /// payloads must address a node the tree already holds. Any merge failure
    /// moves the execution to `Failed`, keeping already-merged data readable.
    #[tracing::instrument(skip_all, level = "debug", fields(
        path = ?payload.path,
        label = ?payload.label,
    ))]
    pub fn apply(&mut self, payload: &Payload) -> Result<Arc<ResponseNode>, MergeError> {
        if self.status.is_terminal() {
            return Err(MergeError::InvalidState {
                status: self.status,
            });
        }

        match (&payload.path, self.status) {
            (None, ExecutionStatus::Pending) => self.apply_primary(payload)?,
            // A trailing payload carrying only `hasNext`/`errors`.
            (None, _) if payload.data.is_none() => {}
            (None, _) => {
                return Err(self.fail(MergeError::MalformedPayload {
                    reason: "unexpected second primary payload".to_string(),
                }));
            }
            (Some(_), ExecutionStatus::Pending) => {
                return Err(self.fail(MergeError::MalformedPayload {
                    reason: "incremental payload received before the primary payload".to_string(),
                }));
            }
            (Some(path), _) => {
                let path = path.clone();
                self.apply_incremental(&path, payload)?;
            }
        }

        self.errors.extend(payload.errors.iter().cloned());
        if payload.has_next == Some(false) {
            self.status = ExecutionStatus::Complete;
            tracing::debug!("response complete");
        } else if payload.has_next.is_none() && self.all_defers_fulfilled() {
            // A transport that never sets `hasNext` still completes once every
            // deferred fragment has arrived (trivially so without defers).
            self.status = ExecutionStatus::Complete;
            tracing::debug!("response complete, all deferred fragments fulfilled");
        }
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Err(self.fail(MergeError::MalformedPayload {
                reason: "response carried no data".to_string(),
            })),
        }
    }

    /// Move the execution to `Aborted`: the caller will feed no further
    /// payloads. Returns `false` when the execution already reached a
    /// terminal state.
    pub fn abort(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ExecutionStatus::Aborted;
        true
    }

    fn apply_primary(&mut self, payload: &Payload) -> Result<(), MergeError> {
        let data = match &payload.data {
            Some(data @ Value::Object(_)) => data,
            Some(_) => {
                return Err(self.fail(MergeError::MalformedPayload {
                    reason: "primary payload data is not an object".to_string(),
                }));
            }
            None => {
                return Err(self.fail(MergeError::MalformedPayload {
                    reason: "primary payload carried no data".to_string(),
                }));
            }
        };
        self.root = Some(Arc::new(ResponseNode::from_value(data.clone())));
        self.status = ExecutionStatus::Initial;
        Ok(())
    }

    fn apply_incremental(&mut self, path: &Path, payload: &Payload) -> Result<(), MergeError> {
        let Some(data) = &payload.data else {
            return Err(self.fail(MergeError::MalformedPayload {
                reason: format!("incremental payload at \"{path}\" carried no data"),
            }));
        };

        // Resolve read-only first: a dangling path must fail the execution
        // without disturbing the tree.
        match &self.root {
            Some(root) if root.node_at(path).is_some() => {}
            _ => {
                return Err(self.fail(MergeError::UnresolvedPath { path: path.clone() }));
            }
        }

        let Some(root) = self.root.as_mut() else {
            return Err(MergeError::UnresolvedPath { path: path.clone() });
        };
        let target = match ResponseNode::make_mut_at(root, path) {
            Some(target) => target,
            // Unreachable after the read-only resolution above.
            None => return Err(MergeError::UnresolvedPath { path: path.clone() }),
        };
        target.merge_value(data);

        if let Some((identifier, defer_ref)) = self
            .compiled
            .defer_manifest
            .resolve(payload.label.as_deref(), &path.to_field_path())
        {
            if let ResponseNode::Object(object) = target {
                object.fulfilled.insert(defer_ref.fragment);
            }
            let identifier = identifier.clone();
            tracing::debug!(fragment = %identifier, "deferred fragment fulfilled");
            self.fulfilled.insert(identifier);
        }
        self.status = ExecutionStatus::Merging;
        Ok(())
    }

    fn all_defers_fulfilled(&self) -> bool {
        self.compiled
            .defer_manifest
            .keys()
            .all(|identifier| self.fulfilled.contains(identifier))
    }

    fn fail(&mut self, error: MergeError) -> MergeError {
        self.status = ExecutionStatus::Failed;
        error
    }
}
