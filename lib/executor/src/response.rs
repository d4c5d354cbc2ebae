use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A GraphQL response, from a subgraph or assembled by the gateway.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExecutionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, Value>>,
}

impl ExecutionResult {
    pub fn from_error_message(message: impl Into<String>) -> ExecutionResult {
        ExecutionResult {
            data: None,
            errors: Some(vec![GraphQLError::new(message)]),
            extensions: None,
        }
    }

    pub fn from_errors(errors: Vec<GraphQLError>) -> ExecutionResult {
        ExecutionResult {
            data: None,
            errors: if errors.is_empty() { None } else { Some(errors) },
            extensions: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<GraphQLErrorLocation>>,
    /// Path segments are strings for fields and numbers for list indices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, Value>>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> GraphQLError {
        GraphQLError {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }

    pub fn at_path(message: impl Into<String>, path: Vec<Value>) -> GraphQLError {
        GraphQLError {
            message: message.into(),
            locations: None,
            path: Some(path),
            extensions: None,
        }
    }

    pub fn with_extension(mut self, key: &str, value: Value) -> GraphQLError {
        self.extensions
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value);
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GraphQLErrorLocation {
    pub line: usize,
    pub column: usize,
}

/// The request sent to a single subgraph for one fetch node.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<HashMap<String, Value>>,
}
