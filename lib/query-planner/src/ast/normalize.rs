use graphql_parser::query::{
    Definition, Document, FragmentDefinition, OperationDefinition as ParserOperation,
    Selection as ParserSelection, SelectionSet as ParserSelectionSet, TypeCondition,
};
use rustc_hash::FxHashMap;

use crate::error::PlanError;

use super::operation::{OperationDefinition, OperationKind, VariableDefinition};
use super::selection_set::{FieldNode, InlineFragmentNode, SelectionItem, SelectionSet};
use super::value::Value;

/// Picks one executable operation out of `document` and rewrites it into a
/// self-contained [`OperationDefinition`]: fragment spreads are inlined as
/// typed inline fragments, so later passes never look at the document again.
pub fn normalize_operation(
    document: &Document<'_, String>,
    operation_name: Option<&str>,
) -> Result<OperationDefinition, PlanError> {
    let mut fragments: FxHashMap<&str, &FragmentDefinition<'_, String>> = FxHashMap::default();
    let mut operations: Vec<&ParserOperation<'_, String>> = Vec::new();

    for definition in &document.definitions {
        match definition {
            Definition::Fragment(fragment) => {
                fragments.insert(fragment.name.as_str(), fragment);
            }
            Definition::Operation(operation) => operations.push(operation),
        }
    }

    let operation = select_operation(&operations, operation_name)?;

    let (kind, name, variable_definitions, selection_set) = match operation {
        ParserOperation::SelectionSet(selection_set) => {
            (OperationKind::Query, None, &[][..], selection_set)
        }
        ParserOperation::Query(query) => (
            OperationKind::Query,
            query.name.as_deref(),
            query.variable_definitions.as_slice(),
            &query.selection_set,
        ),
        ParserOperation::Mutation(mutation) => (
            OperationKind::Mutation,
            mutation.name.as_deref(),
            mutation.variable_definitions.as_slice(),
            &mutation.selection_set,
        ),
        ParserOperation::Subscription(_) => return Err(PlanError::SubscriptionsNotSupported),
    };

    let mut active_fragments = Vec::new();
    let selection_set = convert_selection_set(selection_set, &fragments, &mut active_fragments)?;

    Ok(OperationDefinition {
        kind,
        name: name.map(|n| n.to_string()),
        variable_definitions: variable_definitions
            .iter()
            .map(|definition| VariableDefinition {
                name: definition.name.clone(),
                variable_type: (&definition.var_type).into(),
                default_value: definition.default_value.as_ref().map(Value::from),
            })
            .collect(),
        selection_set,
    })
}

fn select_operation<'a, 'd>(
    operations: &[&'a ParserOperation<'d, String>],
    operation_name: Option<&str>,
) -> Result<&'a ParserOperation<'d, String>, PlanError> {
    match operation_name {
        Some(wanted) => operations
            .iter()
            .find(|operation| match operation {
                ParserOperation::Query(query) => query.name.as_deref() == Some(wanted),
                ParserOperation::Mutation(mutation) => mutation.name.as_deref() == Some(wanted),
                ParserOperation::Subscription(subscription) => {
                    subscription.name.as_deref() == Some(wanted)
                }
                ParserOperation::SelectionSet(_) => false,
            })
            .copied()
            .ok_or_else(|| PlanError::OperationNotFound(wanted.to_string())),
        None => match operations {
            [] => Err(PlanError::EmptyDocument),
            [single] => Ok(single),
            _ => Err(PlanError::AmbiguousOperation),
        },
    }
}

fn convert_selection_set(
    selection_set: &ParserSelectionSet<'_, String>,
    fragments: &FxHashMap<&str, &FragmentDefinition<'_, String>>,
    active_fragments: &mut Vec<String>,
) -> Result<SelectionSet, PlanError> {
    let mut result = SelectionSet::default();

    for selection in &selection_set.items {
        match selection {
            ParserSelection::Field(field) => {
                merge_field(
                    &mut result,
                    FieldNode {
                        name: field.name.clone(),
                        alias: field.alias.clone(),
                        arguments: field
                            .arguments
                            .iter()
                            .map(|(name, value)| (name.clone(), Value::from(value)))
                            .collect(),
                        selections: convert_selection_set(
                            &field.selection_set,
                            fragments,
                            active_fragments,
                        )?,
                    },
                )?;
            }
            ParserSelection::InlineFragment(inline) => {
                let selections =
                    convert_selection_set(&inline.selection_set, fragments, active_fragments)?;
                match &inline.type_condition {
                    Some(TypeCondition::On(type_name)) => {
                        result.push(SelectionItem::InlineFragment(InlineFragmentNode {
                            type_condition: type_name.clone(),
                            selections,
                        }));
                    }
                    // A bare `... { }` only groups directives, splice it away.
                    None => merge_selection_items(&mut result, selections.items)?,
                }
            }
            ParserSelection::FragmentSpread(spread) => {
                if active_fragments.iter().any(|name| name == &spread.fragment_name) {
                    return Err(PlanError::InvalidQuery(format!(
                        "fragment \"{}\" spreads itself",
                        spread.fragment_name
                    )));
                }
                let fragment = fragments.get(spread.fragment_name.as_str()).ok_or_else(|| {
                    PlanError::InvalidQuery(format!(
                        "unknown fragment \"{}\"",
                        spread.fragment_name
                    ))
                })?;

                active_fragments.push(spread.fragment_name.clone());
                let selections =
                    convert_selection_set(&fragment.selection_set, fragments, active_fragments)?;
                active_fragments.pop();

                let TypeCondition::On(type_name) = &fragment.type_condition;
                result.push(SelectionItem::InlineFragment(InlineFragmentNode {
                    type_condition: type_name.clone(),
                    selections,
                }));
            }
        }
    }

    Ok(result)
}

/// Standard field merging: two selections of the same response key collapse
/// into one field whose child selections are merged recursively. Two
/// different fields aliased to the same key cannot merge.
fn merge_field(set: &mut SelectionSet, field: FieldNode) -> Result<(), PlanError> {
    let duplicate = set.items.iter().position(|item| {
        matches!(item, SelectionItem::Field(existing) if existing.response_key() == field.response_key())
    });

    let Some(idx) = duplicate else {
        set.push(SelectionItem::Field(field));
        return Ok(());
    };
    if let SelectionItem::Field(existing) = &mut set.items[idx] {
        if existing.name != field.name {
            return Err(PlanError::InvalidQuery(format!(
                "fields \"{}\" and \"{}\" both respond to key \"{}\" and cannot merge",
                existing.name,
                field.name,
                field.response_key()
            )));
        }
        merge_selection_items(&mut existing.selections, field.selections.items)?;
    }
    Ok(())
}

fn merge_selection_items(
    set: &mut SelectionSet,
    items: Vec<SelectionItem>,
) -> Result<(), PlanError> {
    for item in items {
        match item {
            SelectionItem::Field(field) => merge_field(set, field)?,
            fragment => {
                set.push(fragment);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphql_parser::parse_query;

    #[test]
    fn inlines_fragment_spreads() {
        let document = parse_query(
            r#"
            query ProductPage($id: ID!) {
                product(id: $id) { ...details }
            }
            fragment details on Product { name price }
            "#,
        )
        .unwrap();

        let operation = normalize_operation(&document, None).unwrap();
        assert_eq!(
            operation.to_string(),
            "query ProductPage($id: ID!) {product(id: $id) {... on Product {name price}}}"
        );
    }

    #[test]
    fn merges_duplicate_field_selections() {
        let document = parse_query(
            "{ product(id: 1) { name } product(id: 1) { name price } }",
        )
        .unwrap();

        let operation = normalize_operation(&document, None).unwrap();
        assert_eq!(
            operation.to_string(),
            "query {product(id: 1) {name price}}"
        );
    }

    #[test]
    fn rejects_colliding_aliases() {
        let document = parse_query("{ product(id: 1) { n: name n: price } }").unwrap();

        let error = normalize_operation(&document, None).unwrap_err();
        assert!(matches!(error, PlanError::InvalidQuery(message) if message.contains("cannot merge")));
    }

    #[test]
    fn rejects_circular_fragments() {
        let document = parse_query(
            r#"
            { product(id: 1) { ...a } }
            fragment a on Product { ...b }
            fragment b on Product { ...a }
            "#,
        )
        .unwrap();

        let error = normalize_operation(&document, None).unwrap_err();
        assert!(matches!(error, PlanError::InvalidQuery(message) if message.contains("spreads itself")));
    }

    #[test]
    fn requires_a_name_with_multiple_operations() {
        let document = parse_query("query A { a } query B { b }").unwrap();

        assert!(matches!(
            normalize_operation(&document, None),
            Err(PlanError::AmbiguousOperation)
        ));
        assert!(matches!(
            normalize_operation(&document, Some("C")),
            Err(PlanError::OperationNotFound(_))
        ));

        let operation = normalize_operation(&document, Some("B")).unwrap();
        assert_eq!(operation.name.as_deref(), Some("B"));
    }

    #[test]
    fn rejects_subscriptions() {
        let document = parse_query("subscription { events }").unwrap();
        assert!(matches!(
            normalize_operation(&document, None),
            Err(PlanError::SubscriptionsNotSupported)
        ));
    }
}
