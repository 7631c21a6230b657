//! The selection-set compiler.
//!
//! Takes a parsed operation (plus the fragments it references), walks its
//! selection tree against a [`ClientSchema`], and produces the IR described in
//! [`ir`]: a tree of entities with per-type-condition scoped selection sets,
//! merged according to a [`FieldMergingConfig`], annotated with fulfilled
//! fragments and a defer manifest.
//!
//! Compilation is purely functional over its inputs: it only reads the schema
//! and the operation, and either returns a complete [`CompiledOperation`] or
//! fails with the first [`CompilationError`] encountered. Nothing partial is
//! ever returned.

use apollo_compiler::ast;
use apollo_compiler::Name;
use apollo_compiler::Node;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::error::CompilationError;
use crate::schema::ClientSchema;

pub mod defer;
pub mod field_map;
pub mod ir;
#[cfg(test)]
mod tests;

pub use defer::DeferManifest;
pub use defer::DeferredFragmentIdentifier;
pub use field_map::FieldMap;
pub use field_map::MergedField;
pub use ir::Entity;
pub use ir::FieldMergingConfig;
pub use ir::FieldPath;
pub use ir::FragmentId;
pub use ir::FragmentRegistry;
pub use ir::OperationKind;
pub use ir::ScopedSelectionSet;

use ir::DeferSite;
use ir::FragmentSource;

/// A statically-unresolvable directive condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Condition {
    Yes,
    No,
    Variable(Name),
}

impl Condition {
    fn parse(directive: &ast::Directive) -> Option<Self> {
        match directive.specified_argument_by_name("if")?.as_ref() {
            ast::Value::Boolean(true) => Some(Condition::Yes),
            ast::Value::Boolean(false) => Some(Condition::No),
            ast::Value::Variable(variable) => Some(Condition::Variable(variable.clone())),
            _ => None,
        }
    }
}

/// The combined `@include`/`@skip` state of a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

impl IncludeSkip {
    fn parse(directives: &ast::DirectiveList) -> Self {
        let mut include = None;
        let mut skip = None;
        for directive in directives.iter() {
            if include.is_none() && directive.name == "include" {
                include = Condition::parse(directive);
            }
            if skip.is_none() && directive.name == "skip" {
                skip = Condition::parse(directive);
            }
        }
        Self {
            include: include.unwrap_or(Condition::Yes),
            skip: skip.unwrap_or(Condition::No),
        }
    }

    /// The selection can never be part of the response.
    fn statically_skipped(&self) -> bool {
        matches!(self.skip, Condition::Yes) || matches!(self.include, Condition::No)
    }

    /// The selection's presence depends on variable values.
    fn is_conditional(&self) -> bool {
        matches!(self.include, Condition::Variable(_))
            || matches!(self.skip, Condition::Variable(_))
    }
}

/// A `@defer` application that is not statically disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeferDirective {
    pub(crate) label: Option<String>,
}

impl DeferDirective {
    /// Returns `None` when there is no `@defer` or it is `@defer(if: false)`.
    fn parse(directives: &ast::DirectiveList) -> Option<Self> {
        let directive = directives.iter().find(|d| d.name == "defer")?;
        if Condition::parse(directive) == Some(Condition::No) {
            return None;
        }
        let label = directive
            .specified_argument_by_name("label")
            .and_then(|value| value.as_str())
            .map(str::to_owned);
        Some(Self { label })
    }
}

/// A selection in the compilation result: the AST shape the compiler consumes,
/// with directive annotations already interpreted and statically-skipped
/// selections dropped.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selection {
    Field(FieldNode),
    InlineFragment(InlineFragmentNode),
    FragmentSpread(SpreadNode),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldNode {
    pub(crate) name: Name,
    pub(crate) alias: Option<Name>,
    pub(crate) arguments: Vec<Node<ast::Argument>>,
    pub(crate) include_skip: IncludeSkip,
    pub(crate) selections: Vec<Selection>,
}

impl FieldNode {
    pub(crate) fn response_key(&self) -> &Name {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InlineFragmentNode {
    pub(crate) type_condition: Option<Name>,
    pub(crate) include_skip: IncludeSkip,
    pub(crate) defer: Option<DeferDirective>,
    pub(crate) selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpreadNode {
    pub(crate) name: Name,
    pub(crate) include_skip: IncludeSkip,
    pub(crate) defer: Option<DeferDirective>,
}

impl Selection {
    fn from_ast(selection: &ast::Selection) -> Option<Self> {
        match selection {
            ast::Selection::Field(field) => {
                let include_skip = IncludeSkip::parse(&field.directives);
                if include_skip.statically_skipped() {
                    return None;
                }
                Some(Selection::Field(FieldNode {
                    name: field.name.clone(),
                    alias: field.alias.clone(),
                    arguments: field.arguments.clone(),
                    include_skip,
                    selections: Self::from_ast_set(&field.selection_set),
                }))
            }
            ast::Selection::InlineFragment(inline) => {
                let include_skip = IncludeSkip::parse(&inline.directives);
                if include_skip.statically_skipped() {
                    return None;
                }
                Some(Selection::InlineFragment(InlineFragmentNode {
                    type_condition: inline.type_condition.clone(),
                    include_skip,
                    defer: DeferDirective::parse(&inline.directives),
                    selections: Self::from_ast_set(&inline.selection_set),
                }))
            }
            ast::Selection::FragmentSpread(spread) => {
                let include_skip = IncludeSkip::parse(&spread.directives);
                if include_skip.statically_skipped() {
                    return None;
                }
                Some(Selection::FragmentSpread(SpreadNode {
                    name: spread.fragment_name.clone(),
                    include_skip,
                    defer: DeferDirective::parse(&spread.directives),
                }))
            }
        }
    }

    fn from_ast_set(selections: &[ast::Selection]) -> Vec<Self> {
        selections.iter().filter_map(Self::from_ast).collect()
    }
}

/// A named fragment definition in the compilation result.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FragmentDef {
    pub(crate) type_condition: Name,
    pub(crate) selections: Vec<Selection>,
}

/// The named fragments of a document, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Fragments {
    map: IndexMap<Name, FragmentDef>,
}

impl Fragments {
    fn from_ast(document: &ast::Document) -> Self {
        let mut map = IndexMap::new();
        for definition in &document.definitions {
            if let ast::Definition::FragmentDefinition(fragment) = definition {
                map.insert(
                    fragment.name.clone(),
                    FragmentDef {
                        type_condition: fragment.type_condition.clone(),
                        selections: Selection::from_ast_set(&fragment.selection_set),
                    },
                );
            }
        }
        Self { map }
    }

    fn get(&self, name: &str) -> Option<&FragmentDef> {
        self.map.get(name)
    }
}

/// A parsed operation plus the fragments it may reference: the compilation
/// result the compiler consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub(crate) schema: ClientSchema,
    pub(crate) root_kind: OperationKind,
    pub(crate) name: Option<Name>,
    pub(crate) selections: Vec<Selection>,
    pub(crate) fragments: Fragments,
}

impl Operation {
    /// Build an operation from a parsed document, selecting by name (or the
    /// first operation when `operation_name` is `None`).
    pub fn from_document(
        schema: ClientSchema,
        document: &ast::Document,
        operation_name: Option<&str>,
    ) -> Result<Self, CompilationError> {
        let operation = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                ast::Definition::OperationDefinition(operation) => Some(operation),
                _ => None,
            })
            .find(|operation| match operation_name {
                Some(name) => operation.name.as_deref() == Some(name),
                None => true,
            })
            .ok_or_else(|| CompilationError::UnknownOperation {
                name: operation_name.map(str::to_owned),
            })?;

        Ok(Self {
            schema,
            root_kind: operation.operation_type.into(),
            name: operation.name.clone(),
            selections: Selection::from_ast_set(&operation.selection_set),
            fragments: Fragments::from_ast(document),
        })
    }

    /// Parse a source string and build the named operation from it.
    pub fn parse(
        schema: ClientSchema,
        source_text: &str,
        path: &str,
        operation_name: Option<&str>,
    ) -> Result<Self, CompilationError> {
        let document = ast::Document::parse(source_text, path).map_err(|invalid| {
            CompilationError::InvalidDocument {
                message: invalid.errors.to_string(),
            }
        })?;
        Self::from_document(schema, &document, operation_name)
    }
}

/// The output of compilation: the IR consumed by code generation and, through
/// the defer manifest and fragment registry, by the runtime merge engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledOperation {
    pub name: Option<Name>,
    pub root_kind: OperationKind,
    pub root_type: Name,
    pub root: Entity,
    pub fragments: FragmentRegistry,
    pub defer_manifest: DeferManifest,
}

/// Compile an operation into its IR.
///
/// Fails with the first error encountered: an undefined field or fragment, an
/// ambiguous field selection, a duplicate defer label, or a defer on a
/// non-deferrable root.
#[tracing::instrument(skip_all, level = "debug", fields(operation = ?operation.name))]
pub fn compile_operation(
    operation: &Operation,
    config: &FieldMergingConfig,
) -> Result<CompiledOperation, CompilationError> {
    let root_type = operation
        .schema
        .root_operation(match operation.root_kind {
            OperationKind::Query => ast::OperationType::Query,
            OperationKind::Mutation => ast::OperationType::Mutation,
            OperationKind::Subscription => ast::OperationType::Subscription,
        })
        .ok_or_else(|| {
            CompilationError::internal(format!(
                "schema defines no {} root type",
                operation.root_kind
            ))
        })?
        .clone();

    let mut compiler = Compiler {
        schema: &operation.schema,
        fragments: &operation.fragments,
        config,
        registry: FragmentRegistry::default(),
    };
    let root = compiler.compile_entity(
        FieldPath::default(),
        root_type.clone(),
        &operation.selections,
    )?;
    let defer_manifest = defer::resolve_deferred_fragments(&root, operation.root_kind)?;
    tracing::debug!(
        entities = root.descendants().len(),
        defers = defer_manifest.len(),
        "compiled operation"
    );

    Ok(CompiledOperation {
        name: operation.name.clone(),
        root_kind: operation.root_kind,
        root_type,
        root,
        fragments: compiler.registry,
        defer_manifest,
    })
}

/// Flags inherited from enclosing selections while collecting one entity.
#[derive(Debug, Clone, Copy, Default)]
struct Inherited {
    conditional: bool,
    deferred: bool,
    from_fragment: Option<FragmentId>,
}

/// A scope under collection: its key at the entity plus the exact set of
/// concrete types a selection in it can apply to. Nested type conditions
/// shrink the set; the key stays the innermost condition name.
#[derive(Debug, Clone)]
struct ScopeRef {
    condition: Option<Name>,
    possible: IndexSet<Name>,
}

/// A named fragment spread at an entity, recorded for fulfilled-fragment
/// computation.
struct SpreadRecord {
    id: FragmentId,
    possible: IndexSet<Name>,
    top_keys: IndexSet<Name>,
}

/// Sub-selections addressed to one child position, accumulated across all
/// scopes so that the child compiles into exactly one entity per path.
struct ChildDraft {
    type_name: Name,
    selections: Vec<Selection>,
}

struct Compiler<'a> {
    schema: &'a ClientSchema,
    fragments: &'a Fragments,
    config: &'a FieldMergingConfig,
    registry: FragmentRegistry,
}

struct EntityBuilder {
    path: FieldPath,
    declared_type: Name,
    scopes: IndexMap<Option<Name>, ScopedSelectionSet>,
    /// The union of possible-type sets that contributed to each scope.
    scope_possible: IndexMap<Option<Name>, IndexSet<Name>>,
    children: IndexMap<Name, ChildDraft>,
    spreads: Vec<SpreadRecord>,
    /// Spreads already collected at this entity, by (enclosing scope, name),
    /// with whether every spread so far was deferred.
    seen_spreads: IndexMap<(Option<Name>, Name), bool>,
    /// Spreads currently being inlined, to stop on fragment cycles.
    active_spreads: IndexSet<Name>,
}

impl<'a> Compiler<'a> {
    fn compile_entity(
        &mut self,
        path: FieldPath,
        declared_type: Name,
        selections: &[Selection],
    ) -> Result<Entity, CompilationError> {
        let declared_possible = self.schema.possible_runtime_types(&declared_type)?;
        let mut builder = EntityBuilder {
            path,
            declared_type,
            scopes: IndexMap::new(),
            scope_possible: IndexMap::new(),
            children: IndexMap::new(),
            spreads: Vec::new(),
            seen_spreads: IndexMap::new(),
            active_spreads: IndexSet::new(),
        };
        let root_scope = ScopeRef {
            condition: None,
            possible: declared_possible,
        };
        self.collect(&mut builder, selections, &root_scope, Inherited::default())?;
        self.finalize(builder)
    }

    /// Step 1 and 2 of compilation: walk the selections applicable at one
    /// entity, inlining fragment spreads, and partition them into scopes by
    /// effective type condition.
    fn collect(
        &mut self,
        builder: &mut EntityBuilder,
        selections: &[Selection],
        scope: &ScopeRef,
        inherited: Inherited,
    ) -> Result<(), CompilationError> {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    self.collect_field(builder, field, scope, inherited)?;
                }
                Selection::InlineFragment(inline) => {
                    let Some(effective) =
                        self.narrowed_scope(scope, inline.type_condition.as_ref())?
                    else {
                        // No concrete type satisfies the nested condition.
                        continue;
                    };
                    let mut child = Inherited {
                        conditional: inherited.conditional || inline.include_skip.is_conditional(),
                        ..inherited
                    };
                    if let Some(defer) = &inline.defer {
                        let gated = effective
                            .condition
                            .clone()
                            .unwrap_or_else(|| builder.declared_type.clone());
                        let fragment = self.registry.intern(FragmentSource::TypeCondition {
                            path: builder.path.clone(),
                            condition: gated,
                        });
                        builder.scope_mut(&effective).defers.push(DeferSite {
                            label: defer.label.clone(),
                            fragment,
                        });
                        child.deferred = true;
                    }
                    self.collect(builder, &inline.selections, &effective, child)?;
                }
                Selection::FragmentSpread(spread) => {
                    self.collect_spread(builder, spread, scope, inherited)?;
                }
            }
        }
        Ok(())
    }

    fn collect_field(
        &mut self,
        builder: &mut EntityBuilder,
        field: &FieldNode,
        scope: &ScopeRef,
        inherited: Inherited,
    ) -> Result<(), CompilationError> {
        let lookup_type = scope
            .condition
            .clone()
            .unwrap_or_else(|| builder.declared_type.clone());
        let definition = self
            .schema
            .field_definition(&lookup_type, &field.name)
            .ok_or_else(|| CompilationError::UndefinedField {
                type_name: lookup_type.clone(),
                field_name: field.name.clone(),
            })?;

        let response_key = field.response_key().clone();
        let merged = MergedField {
            name: field.name.clone(),
            response_key: response_key.clone(),
            ty: definition.ty.clone(),
            arguments: field.arguments.clone(),
            conditional: inherited.conditional || field.include_skip.is_conditional(),
            deferred: inherited.deferred,
            from_fragment: inherited.from_fragment,
        };

        let target = builder.scope_mut(scope);
        target.own_keys.insert(response_key.clone());
        target.fields.insert_merging(&lookup_type, merged)?;

        if !field.selections.is_empty() {
            let child = builder
                .children
                .entry(response_key)
                .or_insert_with(|| ChildDraft {
                    type_name: definition.ty.inner_named_type().clone(),
                    selections: Vec::new(),
                });
            child.selections.extend(field.selections.iter().cloned());
        }
        Ok(())
    }

    fn collect_spread(
        &mut self,
        builder: &mut EntityBuilder,
        spread: &SpreadNode,
        scope: &ScopeRef,
        inherited: Inherited,
    ) -> Result<(), CompilationError> {
        let fragment = self
            .fragments
            .get(&spread.name)
            .ok_or_else(|| CompilationError::UndefinedFragment {
                name: spread.name.clone(),
            })?
            .clone();

        let Some(effective) = self.narrowed_scope(scope, Some(&fragment.type_condition))? else {
            // The fragment's condition can never hold at this entity.
            return Ok(());
        };
        if !builder.active_spreads.insert(spread.name.clone()) {
            // Fragment cycle; the document is invalid but must not hang us.
            return Ok(());
        }

        let id = self
            .registry
            .intern(FragmentSource::Named(spread.name.clone()));
        let deferred_here = spread.defer.is_some();

        // Repeated spreads of one fragment under one scope keep a single
        // fulfillment record and defer site. Fields fold again below so that
        // `deferred` ends up set only when every spread defers it, whatever
        // order the spreads were written in.
        let key = (scope.condition.clone(), spread.name.clone());
        match builder.seen_spreads.get(&key).copied() {
            Some(previously_deferred) => {
                if previously_deferred && !deferred_here {
                    builder
                        .scope_mut(&effective)
                        .defers
                        .retain(|site| site.fragment != id);
                    builder.seen_spreads.insert(key, false);
                }
            }
            None => {
                builder.seen_spreads.insert(key, deferred_here);
                let mut visited = IndexSet::new();
                let top_keys = self.top_level_keys(&fragment.selections, &mut visited)?;
                builder.spreads.push(SpreadRecord {
                    id,
                    possible: effective.possible.clone(),
                    top_keys,
                });
                if let Some(defer) = &spread.defer {
                    builder.scope_mut(&effective).defers.push(DeferSite {
                        label: defer.label.clone(),
                        fragment: id,
                    });
                }
            }
        }

        let child = Inherited {
            conditional: inherited.conditional || spread.include_skip.is_conditional(),
            deferred: inherited.deferred || deferred_here,
            from_fragment: Some(id),
        };
        let collected = self.collect(builder, &fragment.selections, &effective, child);
        builder.active_spreads.shift_remove(&spread.name);
        collected
    }

    /// Narrow a scope by a nested type condition, tracking the intersection of
    /// possible concrete types. A condition that excludes nothing normalizes
    /// away (the enclosing scope stands, keeping the (path, condition) dedup
    /// invariant); one that excludes everything returns `None` and the branch
    /// is dropped.
    fn narrowed_scope(
        &self,
        current: &ScopeRef,
        new: Option<&Name>,
    ) -> Result<Option<ScopeRef>, CompilationError> {
        let Some(new) = new else {
            return Ok(Some(current.clone()));
        };
        if !self.schema.is_composite(new) {
            return Err(CompilationError::UnknownType { name: new.clone() });
        }
        let new_possible = self.schema.possible_runtime_types(new)?;
        let narrowed: IndexSet<Name> = current
            .possible
            .intersection(&new_possible)
            .cloned()
            .collect();
        if narrowed.is_empty() {
            return Ok(None);
        }
        if narrowed.len() == current.possible.len() {
            return Ok(Some(current.clone()));
        }
        Ok(Some(ScopeRef {
            condition: Some(new.clone()),
            possible: narrowed,
        }))
    }

    /// The response keys a fragment requires at its top level: its direct
    /// fields plus those of nested unconditional groups and spreads.
    fn top_level_keys(
        &self,
        selections: &[Selection],
        visited: &mut IndexSet<Name>,
    ) -> Result<IndexSet<Name>, CompilationError> {
        let mut keys = IndexSet::new();
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    keys.insert(field.response_key().clone());
                }
                Selection::InlineFragment(inline) => {
                    if inline.type_condition.is_none() {
                        keys.extend(self.top_level_keys(&inline.selections, visited)?);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if visited.insert(spread.name.clone()) {
                        let fragment = self.fragments.get(&spread.name).ok_or_else(|| {
                            CompilationError::UndefinedFragment {
                                name: spread.name.clone(),
                            }
                        })?;
                        keys.extend(self.top_level_keys(&fragment.selections, visited)?);
                    }
                }
            }
        }
        Ok(keys)
    }

    /// Steps 3 to 5: fold fields across scopes according to the merging
    /// configuration, compute fulfilled fragments, and recurse into children.
    fn finalize(&mut self, builder: EntityBuilder) -> Result<Entity, CompilationError> {
        let EntityBuilder {
            path,
            declared_type,
            scopes,
            scope_possible,
            children,
            spreads,
            ..
        } = builder;

        // The unconditional scope leads; conditional scopes keep encounter
        // order.
        let mut ordered: IndexMap<Option<Name>, ScopedSelectionSet> = IndexMap::new();
        if let Some(unconditional) = scopes.get(&None) {
            ordered.insert(None, unconditional.clone());
        }
        for (condition, scope) in &scopes {
            if condition.is_some() {
                ordered.insert(condition.clone(), scope.clone());
            }
        }

        // Fulfillment requirements: each conditional scope's own keys under
        // its condition, plus each named fragment's top-level keys. Computed
        // before folding; folding never changes own keys.
        let mut condition_ids: IndexMap<Name, FragmentId> = IndexMap::new();
        for condition in ordered.keys().flatten() {
            let id = self.registry.intern(FragmentSource::TypeCondition {
                path: path.clone(),
                condition: condition.clone(),
            });
            condition_ids.insert(condition.clone(), id);
        }
        // Each requirement carries the concrete types it applies to, as
        // narrowed during collection.
        let requirements: Vec<(IndexSet<Name>, IndexSet<Name>, FragmentId)> = ordered
            .iter()
            .filter_map(|(condition, scope)| {
                condition.as_ref().map(|name| {
                    (
                        scope_possible[condition].clone(),
                        scope.own_keys.clone(),
                        condition_ids[name],
                    )
                })
            })
            .chain(
                spreads
                    .iter()
                    .map(|record| (record.possible.clone(), record.top_keys.clone(), record.id)),
            )
            .collect();

        let possible = scope_possible;

        // Folding reads from the pre-fold snapshot so that the result does
        // not depend on scope iteration order.
        let sources = ordered.clone();
        for (condition, scope) in ordered.iter_mut() {
            if condition.is_none() {
                continue;
            }
            let target_possible = &possible[condition];
            let lookup_type = condition.clone().unwrap_or_else(|| declared_type.clone());

            if self.config.ancestors {
                if let Some(ancestor) = sources.get(&None) {
                    self.fold_fields(scope, ancestor, &lookup_type)?;
                }
            }
            if self.config.siblings {
                for (sibling_condition, sibling) in &sources {
                    if sibling_condition.is_none() || sibling_condition == condition {
                        continue;
                    }
                    if target_possible.is_subset(&possible[sibling_condition]) {
                        self.fold_fields(scope, sibling, &lookup_type)?;
                    }
                }
            }
        }

        // Fulfilled fragments: a scope satisfies a named fragment or another
        // scope's condition when its type condition implies the other's and
        // its merged fields cover the other's requirements.
        for (condition, scope) in ordered.iter_mut() {
            let applicable = &possible[condition];
            for (required_possible, required_keys, id) in &requirements {
                if applicable.is_subset(required_possible)
                    && scope.fields.contains_keys(required_keys.iter())
                {
                    scope.fulfilled_fragments.insert(*id);
                }
            }
        }

        let mut compiled_children = IndexMap::new();
        for (response_key, child) in children {
            if self.schema.is_composite(&child.type_name) {
                let entity = self.compile_entity(
                    path.child(&response_key),
                    child.type_name,
                    &child.selections,
                )?;
                compiled_children.insert(response_key, entity);
            } else if let Some(field_name) = child.selections.iter().find_map(|selection| {
                match selection {
                    Selection::Field(field) => Some(field.name.clone()),
                    _ => None,
                }
            }) {
                // Sub-selections on a leaf type.
                return Err(CompilationError::UndefinedField {
                    type_name: child.type_name,
                    field_name,
                });
            }
        }

        Ok(Entity {
            path,
            declared_type,
            scopes: ordered,
            children: compiled_children,
        })
    }

    fn fold_fields(
        &self,
        target: &mut ScopedSelectionSet,
        source: &ScopedSelectionSet,
        lookup_type: &Name,
    ) -> Result<(), CompilationError> {
        for (_, field) in &source.fields {
            if field.from_fragment.is_some() && !self.config.named_fragments {
                continue;
            }
            target.fields.insert_merging(lookup_type, field.clone())?;
        }
        Ok(())
    }
}

impl EntityBuilder {
    fn scope_mut(&mut self, scope: &ScopeRef) -> &mut ScopedSelectionSet {
        self.scope_possible
            .entry(scope.condition.clone())
            .and_modify(|set| set.extend(scope.possible.iter().cloned()))
            .or_insert_with(|| scope.possible.clone());
        self.scopes
            .entry(scope.condition.clone())
            .or_insert_with(|| ScopedSelectionSet::new(scope.condition.clone()))
    }
}
