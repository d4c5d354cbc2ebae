use lattice_query_planner::PathSegment;
use serde_json::Value;

/// Walks `data` along a fetch node's response path and collects mutable
/// references to every value sitting at the destination. A `List` segment
/// fans out over array elements; missing segments simply yield nothing.
pub fn traverse_and_collect<'a>(
    data: &'a mut Value,
    path: &[PathSegment],
) -> Vec<&'a mut Value> {
    match (data, path) {
        (Value::Array(arr), []) => arr.iter_mut().collect(),
        (data, []) => vec![data],
        (Value::Object(obj), [PathSegment::Field(name), rest @ ..]) => obj
            .get_mut(name)
            .map(|value| traverse_and_collect(value, rest))
            .unwrap_or_default(),
        (Value::Array(arr), [PathSegment::List, rest @ ..]) => arr
            .iter_mut()
            .flat_map(|item| traverse_and_collect(item, rest))
            .collect(),
        _ => Vec::new(),
    }
}

/// Renders a response path as GraphQL error path segments. List positions
/// cannot be narrowed to an index after fan-out, so they are omitted.
pub fn path_to_error_path(path: &[PathSegment]) -> Vec<Value> {
    path.iter()
        .filter_map(|segment| match segment {
            PathSegment::Field(name) => Some(Value::String(name.clone())),
            PathSegment::List => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str) -> PathSegment {
        PathSegment::Field(name.to_string())
    }

    #[test]
    fn collects_a_single_object() {
        let mut data = json!({"product": {"id": "1"}});
        let found = traverse_and_collect(&mut data, &[field("product")]);
        assert_eq!(found.len(), 1);
        assert_eq!(*found[0], json!({"id": "1"}));
    }

    #[test]
    fn fans_out_over_lists() {
        let mut data = json!({"topProducts": [{"id": "1"}, {"id": "2"}]});
        let found = traverse_and_collect(&mut data, &[field("topProducts"), PathSegment::List]);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn missing_paths_yield_nothing() {
        let mut data = json!({"product": null});
        let found = traverse_and_collect(&mut data, &[field("missing")]);
        assert!(found.is_empty());
    }
}
