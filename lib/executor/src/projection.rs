use lattice_composer::{ComposedSchema, SchemaMetadata, TypeNode};
use lattice_query_planner::ast::selection_set::{SelectionItem, SelectionSet};
use lattice_query_planner::{OperationDefinition, OperationKind};
use serde_json::{Map, Value};
use tracing::warn;

use crate::deep_merge::deep_merge_objects;
use crate::response::GraphQLError;

/// Outcome of shaping one value. `Nulled` means the value was replaced by
/// `null` because of a non-null violation below it; the error is already
/// recorded, callers only decide how far the null cascades.
#[derive(PartialEq)]
enum Shaped {
    Ok,
    Nulled,
}

/// Final response shaping: trims the merged data down to exactly what the
/// client selected, fills in `__typename` and missing fields, validates
/// enums, and cascades `null` through non-nullable positions the way the
/// spec's error propagation demands.
pub fn project_by_operation(
    data: &mut Value,
    errors: &mut Vec<GraphQLError>,
    operation: &OperationDefinition,
    schema: &ComposedSchema,
) {
    let root_type = match operation.kind {
        OperationKind::Query => schema.query_type.as_str(),
        OperationKind::Mutation => schema.mutation_type.as_deref().unwrap_or("Mutation"),
    };
    let root_type_node = TypeNode::Named(root_type.to_string());
    let mut path = Vec::new();
    project_typed(
        data,
        &root_type_node,
        &operation.selection_set,
        &schema.metadata,
        errors,
        &mut path,
    );
}

fn project_typed(
    value: &mut Value,
    type_node: &TypeNode,
    selections: &SelectionSet,
    metadata: &SchemaMetadata,
    errors: &mut Vec<GraphQLError>,
    path: &mut Vec<Value>,
) -> Shaped {
    match type_node {
        TypeNode::NonNull(inner) => {
            match project_typed(value, inner, selections, metadata, errors, path) {
                Shaped::Nulled => Shaped::Nulled,
                Shaped::Ok if value.is_null() => {
                    errors.push(GraphQLError::at_path(
                        "Cannot return null for non-nullable field",
                        path.clone(),
                    ));
                    Shaped::Nulled
                }
                Shaped::Ok => Shaped::Ok,
            }
        }
        TypeNode::List(inner) => {
            let Value::Array(items) = value else {
                return Shaped::Ok;
            };
            for (index, item) in items.iter_mut().enumerate() {
                path.push(Value::Number(index.into()));
                let shaped = project_typed(item, inner, selections, metadata, errors, path);
                path.pop();
                if shaped == Shaped::Nulled && matches!(inner.as_ref(), TypeNode::NonNull(_)) {
                    *value = Value::Null;
                    return Shaped::Nulled;
                }
            }
            Shaped::Ok
        }
        TypeNode::Named(name) => match value {
            Value::Object(obj) => {
                match project_object(obj, selections, name, metadata, errors, path) {
                    Some(new_obj) => {
                        *obj = new_obj;
                        Shaped::Ok
                    }
                    None => {
                        *value = Value::Null;
                        Shaped::Nulled
                    }
                }
            }
            Value::String(s) => {
                if let Some(enum_values) = metadata.enum_values.get(name) {
                    if !enum_values.contains(s) {
                        errors.push(GraphQLError::at_path(
                            format!("Value is not a valid value for enum '{}'", name),
                            path.clone(),
                        ));
                        *value = Value::Null;
                        return Shaped::Nulled;
                    }
                }
                Shaped::Ok
            }
            _ => Shaped::Ok,
        },
    }
}

fn project_object(
    obj: &mut Map<String, Value>,
    selections: &SelectionSet,
    declared_type: &str,
    metadata: &SchemaMetadata,
    errors: &mut Vec<GraphQLError>,
    path: &mut Vec<Value>,
) -> Option<Map<String, Value>> {
    let runtime_type = match obj.get("__typename") {
        Some(Value::String(type_name)) => type_name,
        _ => declared_type,
    }
    .to_string();

    let field_types = metadata
        .type_fields
        .get(&runtime_type)
        .or_else(|| metadata.type_fields.get(declared_type));

    let mut new_obj = Map::new();
    for selection in &selections.items {
        match selection {
            SelectionItem::Field(field) => {
                let response_key = field.response_key().to_string();
                if field.name == "__typename" {
                    new_obj.insert(response_key, Value::String(runtime_type.clone()));
                    continue;
                }
                let Some(field_type) =
                    field_types.and_then(|fields| fields.get(&field.name))
                else {
                    warn!(
                        field = %field.name,
                        type_name = %runtime_type,
                        "field not found in schema, skipping projection"
                    );
                    continue;
                };

                let mut value = obj
                    .get_mut(&response_key)
                    .map(std::mem::take)
                    .unwrap_or(Value::Null);

                path.push(Value::String(response_key.clone()));
                let shaped =
                    project_typed(&mut value, field_type, &field.selections, metadata, errors, path);
                path.pop();

                if shaped == Shaped::Nulled && matches!(field_type, TypeNode::NonNull(_)) {
                    return None;
                }
                new_obj.insert(response_key, value);
            }
            SelectionItem::InlineFragment(fragment) => {
                if metadata
                    .entity_satisfies_type_condition(&runtime_type, &fragment.type_condition)
                {
                    let projected = project_object(
                        obj,
                        &fragment.selections,
                        &runtime_type,
                        metadata,
                        errors,
                        path,
                    )?;
                    deep_merge_objects(&mut new_obj, projected);
                }
            }
        }
    }
    Some(new_obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphql_parser::parse_query;
    use lattice_composer::{compose, SubgraphSchema};
    use lattice_query_planner::normalize_operation;
    use serde_json::json;

    fn schema() -> ComposedSchema {
        let sdl = r#"
            type Query {
              product(id: ID!): Product
            }

            type Product @key(fields: "id") {
              id: ID!
              name: String!
              price: Int
            }
        "#;
        let subgraph = SubgraphSchema::parse("products", "http://products.local", sdl).unwrap();
        compose(&[subgraph]).unwrap()
    }

    fn operation(query: &str) -> OperationDefinition {
        normalize_operation(&parse_query(query).unwrap(), None).unwrap()
    }

    #[test]
    fn trims_data_to_the_selection() {
        let schema = schema();
        let operation = operation("{ product(id: 1) { name } }");
        let mut data = json!({"product": {"id": "1", "name": "Widget", "price": 10}});
        let mut errors = Vec::new();

        project_by_operation(&mut data, &mut errors, &operation, &schema);

        assert_eq!(data, json!({"product": {"name": "Widget"}}));
        assert!(errors.is_empty());
    }

    #[test]
    fn merges_repeated_selections_of_the_same_field() {
        let schema = schema();
        let operation = operation("{ product(id: 1) { name } product(id: 1) { price } }");
        let mut data = json!({"product": {"name": "Table", "price": 10}});
        let mut errors = Vec::new();

        project_by_operation(&mut data, &mut errors, &operation, &schema);

        assert_eq!(data, json!({"product": {"name": "Table", "price": 10}}));
        assert!(errors.is_empty());
    }

    #[test]
    fn fills_typename_from_schema() {
        let schema = schema();
        let operation = operation("{ product(id: 1) { __typename name } }");
        let mut data = json!({"product": {"name": "Widget"}});
        let mut errors = Vec::new();

        project_by_operation(&mut data, &mut errors, &operation, &schema);

        assert_eq!(
            data,
            json!({"product": {"__typename": "Product", "name": "Widget"}})
        );
    }

    #[test]
    fn bubbles_null_through_non_nullable_fields() {
        let schema = schema();
        let operation = operation("{ product(id: 1) { name price } }");
        let mut data = json!({"product": {"name": null, "price": 10}});
        let mut errors = Vec::new();

        project_by_operation(&mut data, &mut errors, &operation, &schema);

        // Product.name is String!, so the product object becomes null and
        // the violation is reported at its path.
        assert_eq!(data, json!({"product": null}));
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].path,
            Some(vec![json!("product"), json!("name")])
        );
    }

    #[test]
    fn nullable_fields_absorb_missing_data() {
        let schema = schema();
        let operation = operation("{ product(id: 1) { name price } }");
        let mut data = json!({"product": {"name": "Widget"}});
        let mut errors = Vec::new();

        project_by_operation(&mut data, &mut errors, &operation, &schema);

        assert_eq!(data, json!({"product": {"name": "Widget", "price": null}}));
        assert!(errors.is_empty());
    }
}
