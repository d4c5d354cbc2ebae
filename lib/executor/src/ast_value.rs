use std::collections::HashMap;

use lattice_query_planner::ast::value::Value as AstValue;
use serde_json::{Map, Number, Value};

/// Converts an AST literal into a runtime JSON value, resolving variable
/// references against the coerced variable map.
pub fn to_json(value: &AstValue, variables: &HashMap<String, Value>) -> Value {
    match value {
        AstValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        AstValue::Int(i) => Value::Number((*i).into()),
        AstValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        AstValue::String(s) => Value::String(s.clone()),
        AstValue::Boolean(b) => Value::Bool(*b),
        AstValue::Null => Value::Null,
        AstValue::Enum(e) => Value::String(e.clone()),
        AstValue::List(items) => {
            Value::Array(items.iter().map(|item| to_json(item, variables)).collect())
        }
        AstValue::Object(fields) => {
            let mut map = Map::new();
            for (key, field_value) in fields {
                map.insert(key.clone(), to_json(field_value, variables));
            }
            Value::Object(map)
        }
    }
}
