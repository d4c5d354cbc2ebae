use std::collections::HashMap;

use lattice_composer::{SchemaMetadata, TypeNode};
use lattice_query_planner::OperationDefinition;
use serde_json::{Map, Value};

use crate::ast_value;

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct VariableError {
    pub message: String,
}

impl VariableError {
    fn new(message: String) -> VariableError {
        VariableError { message }
    }
}

/// Coerces the request's variables against the operation's definitions:
/// applies defaults, rejects missing non-nullable variables and validates
/// values against the composed schema's types.
pub fn collect_variables(
    operation: &OperationDefinition,
    provided: Option<&Map<String, Value>>,
    metadata: &SchemaMetadata,
) -> Result<Option<HashMap<String, Value>>, VariableError> {
    if operation.variable_definitions.is_empty() {
        return Ok(None);
    }

    let mut collected = HashMap::new();
    for definition in &operation.variable_definitions {
        if let Some(value) = provided.and_then(|vars| vars.get(&definition.name)) {
            validate_runtime_value(value, &definition.variable_type, metadata).map_err(
                |message| {
                    VariableError::new(format!("Variable '{}': {}", definition.name, message))
                },
            )?;
            collected.insert(definition.name.clone(), value.clone());
            continue;
        }
        if let Some(default_value) = &definition.default_value {
            let coerced = ast_value::to_json(default_value, &HashMap::new());
            validate_runtime_value(&coerced, &definition.variable_type, metadata).map_err(
                |message| {
                    VariableError::new(format!("Variable '{}': {}", definition.name, message))
                },
            )?;
            collected.insert(definition.name.clone(), coerced);
            continue;
        }
        if definition.variable_type.is_non_null() {
            return Err(VariableError::new(format!(
                "Variable '{}' is non-nullable but no value was provided",
                definition.name
            )));
        }
    }

    if collected.is_empty() {
        Ok(None)
    } else {
        Ok(Some(collected))
    }
}

fn validate_runtime_value(
    value: &Value,
    type_node: &TypeNode,
    metadata: &SchemaMetadata,
) -> Result<(), String> {
    match type_node {
        TypeNode::NonNull(inner) => {
            if value.is_null() {
                return Err("value cannot be null for a non-nullable type".to_string());
            }
            validate_runtime_value(value, inner, metadata)
        }
        TypeNode::List(inner) => match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                for item in items {
                    validate_runtime_value(item, inner, metadata)?;
                }
                Ok(())
            }
            other => Err(format!("expected a list, got {}", other)),
        },
        TypeNode::Named(name) => {
            if value.is_null() {
                return Ok(());
            }
            if let Some(enum_values) = metadata.enum_values.get(name) {
                return match value {
                    Value::String(s) if enum_values.contains(s) => Ok(()),
                    other => Err(format!(
                        "'{}' is not a valid value for enum '{}'",
                        other, name
                    )),
                };
            }
            match name.as_str() {
                "String" => value
                    .is_string()
                    .then_some(())
                    .ok_or_else(|| format!("expected a String, got {}", value)),
                "Int" => value
                    .as_i64()
                    .map(|_| ())
                    .ok_or_else(|| format!("expected an Int, got {}", value)),
                "Float" => value
                    .as_f64()
                    .map(|_| ())
                    .ok_or_else(|| format!("expected a Float, got {}", value)),
                "Boolean" => value
                    .is_boolean()
                    .then_some(())
                    .ok_or_else(|| format!("expected a Boolean, got {}", value)),
                "ID" => (value.is_string() || value.as_i64().is_some())
                    .then_some(())
                    .ok_or_else(|| format!("expected an ID, got {}", value)),
                // Custom scalars and input objects accept what the subgraph
                // accepts.
                _ => Ok(()),
            }
        }
    }
}

/// Narrows the request variables to the ones a single fetch node references.
pub fn variables_for_node(
    usages: &[String],
    variables: Option<&HashMap<String, Value>>,
) -> Option<HashMap<String, Value>> {
    let variables = variables?;
    let narrowed: HashMap<String, Value> = usages
        .iter()
        .filter_map(|name| variables.get(name).map(|value| (name.clone(), value.clone())))
        .collect();
    if narrowed.is_empty() {
        None
    } else {
        Some(narrowed)
    }
}
