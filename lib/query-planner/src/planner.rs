use std::sync::Arc;

use graphql_parser::query::Document;
use lattice_composer::composed_schema::{ComposedField, EntityKey, ObjectType};
use lattice_composer::selection::FieldSelection;
use lattice_composer::{ComposedSchema, TypeNode};
use tracing::{debug, instrument};

use crate::ast::normalize::normalize_operation;
use crate::ast::operation::{OperationDefinition, OperationKind, VariableDefinition};
use crate::ast::selection_set::{FieldNode, InlineFragmentNode, SelectionItem, SelectionSet};
use crate::ast::value::Value;
use crate::error::PlanError;
use crate::plan_nodes::{FetchNode, NodeId, PathSegment, QueryPlan};

/// Tie-break used when more than one subgraph can resolve a field reached
/// through an entity jump.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OwnershipPolicy {
    /// Prefer a subgraph that shares an entity key with the subgraph the
    /// walk is currently in, falling back to declaration order.
    #[default]
    KeyLocality,
    /// Always take the first subgraph that declared the field.
    DeclarationOrder,
}

pub struct Planner {
    schema: Arc<ComposedSchema>,
    policy: OwnershipPolicy,
}

impl Planner {
    pub fn new(schema: Arc<ComposedSchema>, policy: OwnershipPolicy) -> Self {
        Planner { schema, policy }
    }

    pub fn schema(&self) -> &Arc<ComposedSchema> {
        &self.schema
    }

    /// Plans a normalized operation into a fetch DAG. Planning is a pure
    /// function of the schema, the policy and the operation shape, so the
    /// same input always yields an identical plan.
    #[instrument(level = "debug", skip_all, fields(operation_name = operation.name.as_deref()))]
    pub fn plan(&self, operation: &OperationDefinition) -> Result<QueryPlan, PlanError> {
        let mut builder = PlanBuilder {
            schema: self.schema.as_ref(),
            policy: self.policy,
            operation,
            steps: Vec::new(),
            root_steps: Vec::new(),
            entity_groups: Vec::new(),
        };
        builder.plan_roots()?;
        let plan = builder.finish();
        debug!(nodes = plan.nodes.len(), roots = plan.root_ids.len(), "query planned");
        Ok(plan)
    }

    /// Convenience for callers holding a raw parsed document.
    pub fn plan_document(
        &self,
        document: &Document<'_, String>,
        operation_name: Option<&str>,
    ) -> Result<QueryPlan, PlanError> {
        let operation = normalize_operation(document, operation_name)?;
        self.plan(&operation)
    }
}

/// A fetch under construction. Becomes a [`FetchNode`] once the walk is done
/// and the operation document can be rendered.
struct FetchStep {
    subgraph: String,
    kind: OperationKind,
    parent_type: Option<String>,
    requires: Vec<FieldSelection>,
    response_path: Vec<PathSegment>,
    selection: SelectionSet,
    variable_usages: Vec<String>,
    depends_on: Vec<NodeId>,
}

struct PlanBuilder<'s> {
    schema: &'s ComposedSchema,
    policy: OwnershipPolicy,
    operation: &'s OperationDefinition,
    steps: Vec<FetchStep>,
    /// Root step ids in creation order, used for mutation sequencing.
    root_steps: Vec<usize>,
    /// Reuse table for entity fetches: (parent step, response path, target
    /// subgraph, parent type) -> step id.
    entity_groups: Vec<(usize, Vec<PathSegment>, String, String, usize)>,
}

impl<'s> PlanBuilder<'s> {
    fn plan_roots(&mut self) -> Result<(), PlanError> {
        let root_type = match self.operation.kind {
            OperationKind::Query => self.schema.query_type.clone(),
            OperationKind::Mutation => self.schema.mutation_type.clone().ok_or_else(|| {
                PlanError::InvalidQuery("the schema does not define a mutation type".to_string())
            })?,
        };

        let items = self.operation.selection_set.items.clone();
        let mut pending_typenames: Vec<FieldNode> = Vec::new();
        self.plan_root_items(&items, &root_type, &mut pending_typenames)?;

        if !pending_typenames.is_empty() {
            // An operation selecting only __typename plans to zero fetches;
            // the response shaping pass answers it from the schema.
            if let Some(step) = self.root_steps.first().copied() {
                for typename in pending_typenames {
                    self.append_field(step, &[], &typename);
                }
            }
        }

        if self.operation.kind == OperationKind::Mutation {
            for window in 0..self.root_steps.len().saturating_sub(1) {
                let (prev, next) = (self.root_steps[window], self.root_steps[window + 1]);
                self.steps[next].depends_on.push(prev);
            }
        }

        Ok(())
    }

    fn plan_root_items(
        &mut self,
        items: &[SelectionItem],
        root_type: &str,
        pending_typenames: &mut Vec<FieldNode>,
    ) -> Result<(), PlanError> {
        let schema = self.schema;
        for item in items {
            match item {
                SelectionItem::Field(field) if field.name == "__typename" => {
                    match self.root_steps.first().copied() {
                        Some(step) => {
                            self.append_field(step, &[], field);
                        }
                        None => pending_typenames.push(field.clone()),
                    }
                }
                SelectionItem::Field(field) => {
                    let composed = schema.field(root_type, &field.name).ok_or_else(|| {
                        PlanError::InvalidQuery(format!(
                            "unknown field \"{}.{}\"",
                            root_type, field.name
                        ))
                    })?;
                    let owner =
                        composed.owners.first().cloned().ok_or(PlanError::Unresolvable {
                            type_name: root_type.to_string(),
                            field_name: field.name.clone(),
                        })?;
                    let field_type = composed.type_node.clone();

                    let step = self.root_step_for(&owner);
                    let idx = self.append_field(step, &[], field);
                    self.descend(
                        step,
                        vec![idx],
                        field,
                        root_type,
                        &field_type,
                        &[],
                        &owner,
                        composed,
                    )?;
                }
                SelectionItem::InlineFragment(fragment) => {
                    if fragment.type_condition != root_type {
                        return Err(PlanError::InvalidQuery(format!(
                            "fragment on \"{}\" cannot be spread at the operation root",
                            fragment.type_condition
                        )));
                    }
                    self.plan_root_items(&fragment.selections.items, root_type, pending_typenames)?;
                }
            }
        }
        Ok(())
    }

    /// Finds a root step executing against `subgraph`, or opens one. For
    /// mutations only the most recent step may be reused, preserving the
    /// serial execution order GraphQL requires for root mutation fields.
    fn root_step_for(&mut self, subgraph: &str) -> usize {
        let reusable = match self.operation.kind {
            OperationKind::Query => self
                .root_steps
                .iter()
                .copied()
                .find(|&step| self.steps[step].subgraph == subgraph),
            OperationKind::Mutation => self
                .root_steps
                .last()
                .copied()
                .filter(|&step| self.steps[step].subgraph == subgraph),
        };

        reusable.unwrap_or_else(|| {
            self.steps.push(FetchStep {
                subgraph: subgraph.to_string(),
                kind: self.operation.kind,
                parent_type: None,
                requires: Vec::new(),
                response_path: Vec::new(),
                selection: SelectionSet::default(),
                variable_usages: Vec::new(),
                depends_on: Vec::new(),
            });
            let step = self.steps.len() - 1;
            self.root_steps.push(step);
            step
        })
    }

    /// Validates the leaf/composite shape of a just-appended field and, for
    /// composites, walks into its selection set.
    #[allow(clippy::too_many_arguments)]
    fn descend(
        &mut self,
        step: usize,
        cursor: Vec<usize>,
        field: &FieldNode,
        parent_type: &str,
        field_type: &TypeNode,
        response_path: &[PathSegment],
        subgraph: &str,
        composed: &ComposedField,
    ) -> Result<(), PlanError> {
        let inner = field_type.inner_type().to_string();
        let is_leaf = self.schema.is_leaf_type(&inner);

        if is_leaf && !field.selections.is_empty() {
            return Err(PlanError::InvalidQuery(format!(
                "field \"{}.{}\" of leaf type {} cannot have a selection set",
                parent_type, field.name, inner
            )));
        }
        if !is_leaf && field.selections.is_empty() {
            return Err(PlanError::InvalidQuery(format!(
                "field \"{}.{}\" of composite type {} must have a selection set",
                parent_type, field.name, inner
            )));
        }
        if is_leaf {
            return Ok(());
        }

        let mut child_path = response_path.to_vec();
        child_path.push(PathSegment::Field(field.response_key().to_string()));
        for _ in 0..list_depth(field_type) {
            child_path.push(PathSegment::List);
        }

        let provided = composed
            .provides
            .get(subgraph)
            .map(|selections| selections.as_slice())
            .unwrap_or(&[]);

        self.visit_selection_set(&field.selections, &inner, step, cursor, &child_path, provided)
    }

    fn visit_selection_set(
        &mut self,
        selection_set: &SelectionSet,
        type_name: &str,
        step: usize,
        cursor: Vec<usize>,
        response_path: &[PathSegment],
        provided: &[FieldSelection],
    ) -> Result<(), PlanError> {
        let schema = self.schema;
        for item in &selection_set.items {
            match item {
                SelectionItem::Field(field) if field.name == "__typename" => {
                    self.append_field(step, &cursor, field);
                }
                SelectionItem::Field(field) => {
                    let object = schema.object_type(type_name).ok_or_else(|| {
                        PlanError::InvalidQuery(format!(
                            "type \"{}\" does not support field selections",
                            type_name
                        ))
                    })?;
                    let composed = object.fields.get(&field.name).ok_or_else(|| {
                        PlanError::InvalidQuery(format!(
                            "unknown field \"{}.{}\"",
                            type_name, field.name
                        ))
                    })?;

                    let current = self.steps[step].subgraph.clone();
                    let provided_entry = provided.iter().find(|entry| entry.name == field.name);
                    let resolvable_here = provided_entry.is_some()
                        || composed.owners.iter().any(|owner| owner == &current);

                    if resolvable_here {
                        let idx = self.append_field(step, &cursor, field);
                        let mut child_cursor = cursor.clone();
                        child_cursor.push(idx);
                        // A @provides selection narrows what the current
                        // subgraph can serve under this field.
                        match provided_entry {
                            Some(entry) if !entry.selections.is_empty() => {
                                let inner = composed.type_node.inner_type().to_string();
                                let mut child_path = response_path.to_vec();
                                child_path
                                    .push(PathSegment::Field(field.response_key().to_string()));
                                for _ in 0..list_depth(&composed.type_node) {
                                    child_path.push(PathSegment::List);
                                }
                                self.visit_selection_set(
                                    &field.selections,
                                    &inner,
                                    step,
                                    child_cursor,
                                    &child_path,
                                    &entry.selections,
                                )?;
                            }
                            _ => {
                                self.descend(
                                    step,
                                    child_cursor,
                                    field,
                                    type_name,
                                    &composed.type_node.clone(),
                                    response_path,
                                    &current,
                                    composed,
                                )?;
                            }
                        }
                    } else {
                        self.plan_entity_jump(
                            step,
                            &cursor,
                            field,
                            type_name,
                            object,
                            composed,
                            &current,
                            response_path,
                        )?;
                    }
                }
                SelectionItem::InlineFragment(fragment) => {
                    if !schema.types.contains_key(&fragment.type_condition) {
                        return Err(PlanError::InvalidQuery(format!(
                            "unknown type \"{}\" in fragment condition",
                            fragment.type_condition
                        )));
                    }
                    if fragment.type_condition == type_name {
                        self.visit_selection_set(
                            &fragment.selections,
                            type_name,
                            step,
                            cursor.clone(),
                            response_path,
                            provided,
                        )?;
                    } else {
                        let set = Self::selection_at(&mut self.steps[step].selection, &cursor);
                        let idx = set.push(SelectionItem::InlineFragment(InlineFragmentNode {
                            type_condition: fragment.type_condition.clone(),
                            selections: SelectionSet::default(),
                        }));
                        let mut child_cursor = cursor.clone();
                        child_cursor.push(idx);
                        self.visit_selection_set(
                            &fragment.selections,
                            &fragment.type_condition,
                            step,
                            child_cursor,
                            response_path,
                            &[],
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The current subgraph cannot resolve `field`, so the walk leaves it:
    /// pick a target subgraph, widen the current fetch with the entity key
    /// (and any `@requires` fields), and route the field through a dependent
    /// `_entities` fetch.
    #[allow(clippy::too_many_arguments)]
    fn plan_entity_jump(
        &mut self,
        step: usize,
        cursor: &[usize],
        field: &FieldNode,
        type_name: &str,
        object: &ObjectType,
        composed: &ComposedField,
        current: &str,
        response_path: &[PathSegment],
    ) -> Result<(), PlanError> {
        let (target, key) =
            self.choose_jump(current, object, composed).ok_or(PlanError::Unresolvable {
                type_name: type_name.to_string(),
                field_name: field.name.clone(),
            })?;
        let key_fields = key.fields.clone();
        let requires = composed.requires.clone();
        let field_type = composed.type_node.clone();

        {
            let set = Self::selection_at(&mut self.steps[step].selection, cursor);
            set.ensure_typename();
            for selection in &key_fields {
                set.ensure_field(selection);
            }
            if let Some(required) = &requires {
                for selection in required {
                    set.ensure_field(selection);
                }
            }
        }

        let dep_step = self.entity_step_for(step, response_path, &target, type_name, &key_fields);
        if let Some(required) = &requires {
            merge_field_selections(&mut self.steps[dep_step].requires, required);
        }

        let idx = self.append_field(dep_step, &[], field);
        self.descend(
            dep_step,
            vec![idx],
            field,
            type_name,
            &field_type,
            response_path,
            &target,
            composed,
        )
    }

    /// Ranks the subgraphs declaring the field. A candidate is feasible when
    /// the entity declares a key that candidate resolves; a key shared with
    /// the current subgraph is preferred when one exists.
    fn choose_jump<'a>(
        &self,
        current: &str,
        object: &'a ObjectType,
        composed: &ComposedField,
    ) -> Option<(String, &'a EntityKey)> {
        let mut feasible: Vec<(&String, &'a EntityKey)> = Vec::new();
        for owner in &composed.owners {
            let key = object
                .keys
                .iter()
                .find(|key| {
                    key.subgraphs.iter().any(|s| s == owner)
                        && key.subgraphs.iter().any(|s| s == current)
                })
                .or_else(|| object.keys.iter().find(|key| key.subgraphs.iter().any(|s| s == owner)));
            if let Some(key) = key {
                feasible.push((owner, key));
            }
        }

        let chosen = match self.policy {
            OwnershipPolicy::KeyLocality => feasible
                .iter()
                .find(|(_, key)| key.subgraphs.iter().any(|s| s == current))
                .or_else(|| feasible.first()),
            OwnershipPolicy::DeclarationOrder => feasible.first(),
        };
        chosen.map(|&(subgraph, key)| (subgraph.clone(), key))
    }

    fn entity_step_for(
        &mut self,
        parent_step: usize,
        response_path: &[PathSegment],
        subgraph: &str,
        type_name: &str,
        key_fields: &[FieldSelection],
    ) -> usize {
        if let Some((.., step)) = self.entity_groups.iter().find(|(parent, path, target, ty, _)| {
            *parent == parent_step
                && path == response_path
                && target == subgraph
                && ty == type_name
        }) {
            return *step;
        }

        self.steps.push(FetchStep {
            subgraph: subgraph.to_string(),
            kind: OperationKind::Query,
            parent_type: Some(type_name.to_string()),
            requires: key_fields.to_vec(),
            response_path: response_path.to_vec(),
            selection: SelectionSet::default(),
            variable_usages: Vec::new(),
            depends_on: vec![parent_step],
        });
        let step = self.steps.len() - 1;
        self.entity_groups.push((
            parent_step,
            response_path.to_vec(),
            subgraph.to_string(),
            type_name.to_string(),
            step,
        ));
        step
    }

    /// Appends a field at `cursor` inside the step's selection, records the
    /// variables its arguments reference, and returns the new item's index.
    fn append_field(&mut self, step: usize, cursor: &[usize], field: &FieldNode) -> usize {
        let mut usages = Vec::new();
        for (_, value) in &field.arguments {
            value.collect_variable_usages(&mut usages);
        }
        for usage in usages {
            if !self.steps[step].variable_usages.contains(&usage) {
                self.steps[step].variable_usages.push(usage);
            }
        }

        let set = Self::selection_at(&mut self.steps[step].selection, cursor);
        set.push(SelectionItem::Field(FieldNode {
            name: field.name.clone(),
            alias: field.alias.clone(),
            arguments: field.arguments.clone(),
            selections: SelectionSet::default(),
        }))
    }

    fn selection_at<'a>(root: &'a mut SelectionSet, cursor: &[usize]) -> &'a mut SelectionSet {
        let mut set = root;
        for &idx in cursor {
            set = match &mut set.items[idx] {
                SelectionItem::Field(field) => &mut field.selections,
                SelectionItem::InlineFragment(fragment) => &mut fragment.selections,
            };
        }
        set
    }

    fn finish(self) -> QueryPlan {
        let operation = self.operation;
        let mut nodes: Vec<FetchNode> = Vec::with_capacity(self.steps.len());

        for (id, step) in self.steps.into_iter().enumerate() {
            let rendered = match &step.parent_type {
                None => render_root_operation(&step, operation),
                Some(parent_type) => render_entity_operation(&step, parent_type, operation),
            };
            let requires = step.parent_type.as_ref().map(|_| step.requires.clone());
            let mut output_keys: Vec<String> = Vec::new();
            for item in &step.selection.items {
                if let SelectionItem::Field(field) = item {
                    let key = field.response_key();
                    if key != "__typename" && !output_keys.iter().any(|k| k == key) {
                        output_keys.push(key.to_string());
                    }
                }
            }
            nodes.push(FetchNode {
                id,
                subgraph_name: step.subgraph,
                operation: rendered,
                operation_kind: step.kind,
                parent_type: step.parent_type,
                requires,
                response_path: step.response_path,
                output_keys,
                variable_usages: step.variable_usages,
                depends_on: step.depends_on,
                dependents: Vec::new(),
            });
        }

        for id in 0..nodes.len() {
            for dep in nodes[id].depends_on.clone() {
                nodes[dep].dependents.push(id);
            }
        }
        let root_ids = nodes
            .iter()
            .filter(|node| node.depends_on.is_empty())
            .map(|node| node.id)
            .collect();

        QueryPlan { nodes, root_ids }
    }
}

fn used_variable_definitions(
    step: &FetchStep,
    operation: &OperationDefinition,
) -> Vec<VariableDefinition> {
    operation
        .variable_definitions
        .iter()
        .filter(|definition| step.variable_usages.contains(&definition.name))
        .cloned()
        .collect()
}

fn render_root_operation(step: &FetchStep, operation: &OperationDefinition) -> String {
    OperationDefinition {
        kind: step.kind,
        name: None,
        variable_definitions: used_variable_definitions(step, operation),
        selection_set: step.selection.clone(),
    }
    .to_string()
}

fn render_entity_operation(
    step: &FetchStep,
    parent_type: &str,
    operation: &OperationDefinition,
) -> String {
    let representations_type = TypeNode::NonNull(Box::new(TypeNode::List(Box::new(
        TypeNode::NonNull(Box::new(TypeNode::Named("_Any".to_string()))),
    ))));
    let mut variable_definitions = vec![VariableDefinition {
        name: "representations".to_string(),
        variable_type: representations_type,
        default_value: None,
    }];
    variable_definitions.extend(used_variable_definitions(step, operation));

    let entities = FieldNode {
        name: "_entities".to_string(),
        alias: None,
        arguments: vec![(
            "representations".to_string(),
            Value::Variable("representations".to_string()),
        )],
        selections: SelectionSet {
            items: vec![SelectionItem::InlineFragment(InlineFragmentNode {
                type_condition: parent_type.to_string(),
                selections: step.selection.clone(),
            })],
        },
    };

    OperationDefinition {
        kind: OperationKind::Query,
        name: None,
        variable_definitions,
        selection_set: SelectionSet {
            items: vec![SelectionItem::Field(entities)],
        },
    }
    .to_string()
}

fn list_depth(node: &TypeNode) -> usize {
    match node {
        TypeNode::List(inner) => 1 + list_depth(inner),
        TypeNode::NonNull(inner) => list_depth(inner),
        TypeNode::Named(_) => 0,
    }
}

fn merge_field_selections(into: &mut Vec<FieldSelection>, add: &[FieldSelection]) {
    for selection in add {
        match into.iter_mut().find(|existing| existing.name == selection.name) {
            Some(existing) => merge_field_selections(&mut existing.selections, &selection.selections),
            None => into.push(selection.clone()),
        }
    }
}
