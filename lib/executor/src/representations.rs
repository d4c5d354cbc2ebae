use lattice_composer::selection::FieldSelection;
use lattice_composer::SchemaMetadata;
use serde_json::{json, Map, Value};
use tracing::warn;

/// Builds the `_entities` representation for one parent object: `__typename`
/// plus the entity key and any `@requires` fields. Returns `None` when the
/// parent value cannot identify an entity, so the fetch skips it.
pub fn project_representation(
    entity: &Value,
    parent_type: &str,
    requires: &[FieldSelection],
    metadata: &SchemaMetadata,
) -> Option<Value> {
    let obj = entity.as_object()?;
    let type_name = obj
        .get("__typename")
        .and_then(Value::as_str)
        .unwrap_or(parent_type);
    if !metadata.entity_satisfies_type_condition(type_name, parent_type) {
        return None;
    }

    let mut projected = Map::new();
    projected.insert("__typename".to_string(), json!(type_name));
    project_fields(obj, requires, &mut projected);

    if projected.len() == 1 {
        return None;
    }
    Some(Value::Object(projected))
}

fn project_fields(source: &Map<String, Value>, selections: &[FieldSelection], out: &mut Map<String, Value>) {
    for selection in selections {
        let Some(value) = source.get(&selection.name) else {
            continue;
        };
        if selection.selections.is_empty() {
            if !value.is_null() {
                out.insert(selection.name.clone(), value.clone());
            }
        } else if let Some(projected) = project_composite(value, &selection.selections) {
            out.insert(selection.name.clone(), projected);
        }
    }
}

fn project_composite(value: &Value, selections: &[FieldSelection]) -> Option<Value> {
    match value {
        Value::Object(obj) => {
            let mut projected = Map::new();
            project_fields(obj, selections, &mut projected);
            if projected.is_empty() {
                None
            } else {
                Some(Value::Object(projected))
            }
        }
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| project_composite(item, selections).unwrap_or(Value::Null))
                .collect(),
        )),
        _ => None,
    }
}

/// Checks a returned entity against the representation it was fetched for.
/// Only fields present on both sides can be compared; a mismatch means the
/// subgraph answered for a different entity and the merge must be skipped.
pub fn entity_matches_representation(entity: &Value, representation: &Value) -> bool {
    let (Some(entity), Some(representation)) = (entity.as_object(), representation.as_object())
    else {
        return true;
    };
    for (key, expected) in representation {
        if key == "__typename" {
            continue;
        }
        if let Some(actual) = entity.get(key) {
            if !actual.is_null() && actual != expected {
                warn!(field = %key, "entity key mismatch in subgraph response");
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_composer::selection::parse_field_set;
    use rustc_hash::FxHashMap;

    fn metadata() -> SchemaMetadata {
        SchemaMetadata {
            possible_types: FxHashMap::default(),
            enum_values: FxHashMap::default(),
            type_fields: FxHashMap::default(),
        }
    }

    #[test]
    fn projects_key_and_typename() {
        let entity = json!({"__typename": "Product", "id": "1", "name": "Widget"});
        let requires = parse_field_set("id").unwrap();

        let projected =
            project_representation(&entity, "Product", &requires, &metadata()).unwrap();
        assert_eq!(projected, json!({"__typename": "Product", "id": "1"}));
    }

    #[test]
    fn skips_entities_without_key_data() {
        let requires = parse_field_set("id").unwrap();
        assert!(project_representation(&Value::Null, "Product", &requires, &metadata()).is_none());
        assert!(project_representation(
            &json!({"__typename": "Product", "id": null}),
            "Product",
            &requires,
            &metadata()
        )
        .is_none());
    }

    #[test]
    fn projects_nested_required_fields() {
        let entity = json!({
            "__typename": "Product",
            "id": "1",
            "dimensions": {"size": 2, "weight": 3, "extra": true}
        });
        let requires = parse_field_set("id dimensions { size weight }").unwrap();

        let projected =
            project_representation(&entity, "Product", &requires, &metadata()).unwrap();
        assert_eq!(
            projected,
            json!({
                "__typename": "Product",
                "id": "1",
                "dimensions": {"size": 2, "weight": 3}
            })
        );
    }

    #[test]
    fn detects_mismatched_entities() {
        let representation = json!({"__typename": "Product", "id": "1"});
        assert!(entity_matches_representation(
            &json!({"id": "1", "reviews": []}),
            &representation
        ));
        assert!(!entity_matches_representation(
            &json!({"id": "2"}),
            &representation
        ));
        // Entities that do not echo the key cannot be checked.
        assert!(entity_matches_representation(
            &json!({"reviews": []}),
            &representation
        ));
    }
}
