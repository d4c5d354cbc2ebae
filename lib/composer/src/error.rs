use crate::selection::FieldSetParseError;
use crate::subgraph_schema::SubgraphSchemaParseError;

/// Composition is all-or-nothing: any of these aborts the epoch and leaves
/// the previously published schema (if any) active.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("no subgraph schemas were provided")]
    NoSubgraphs,

    #[error("no subgraph declares a Query root type")]
    NoQueryRoot,

    #[error(transparent)]
    SubgraphParse(#[from] SubgraphSchemaParseError),

    #[error(transparent)]
    FieldSet(#[from] FieldSetParseError),

    #[error("type '{type_name}' is declared as {left_kind} in subgraph '{left_subgraph}' but as {right_kind} in subgraph '{right_subgraph}'")]
    ConflictingTypeKinds {
        type_name: String,
        left_kind: &'static str,
        left_subgraph: String,
        right_kind: &'static str,
        right_subgraph: String,
    },

    #[error("enum '{type_name}' is not structurally identical across subgraphs '{left_subgraph}' and '{right_subgraph}'")]
    IncompatibleEnum {
        type_name: String,
        left_subgraph: String,
        right_subgraph: String,
    },

    #[error("field '{type_name}.{field_name}' is declared as '{existing}' in subgraph '{existing_subgraph}' but as '{conflicting}' in subgraph '{conflicting_subgraph}'")]
    FieldTypeMismatch {
        type_name: String,
        field_name: String,
        existing: String,
        existing_subgraph: String,
        conflicting: String,
        conflicting_subgraph: String,
    },

    #[error("invalid @key on type '{type_name}' in subgraph '{subgraph}': field path '{field_path}' does not exist")]
    InvalidKeyFieldPath {
        type_name: String,
        subgraph: String,
        field_path: String,
    },

    #[error("@requires on '{type_name}.{field_name}' in subgraph '{subgraph}' references unknown field '{referenced}'")]
    UnknownRequiresField {
        type_name: String,
        field_name: String,
        subgraph: String,
        referenced: String,
    },

    #[error("@provides on '{type_name}.{field_name}' in subgraph '{subgraph}' references unknown field '{referenced}' of type '{provided_type}'")]
    UnknownProvidesField {
        type_name: String,
        field_name: String,
        subgraph: String,
        referenced: String,
        provided_type: String,
    },

    #[error("entity key '{key_fields}' on type '{type_name}' is not resolvable by any declaring subgraph")]
    UnresolvableKey {
        type_name: String,
        key_fields: String,
    },
}

impl CompositionError {
    /// The type names involved in the failure, for error reports.
    pub fn offending_types(&self) -> Vec<&str> {
        match self {
            CompositionError::ConflictingTypeKinds { type_name, .. }
            | CompositionError::IncompatibleEnum { type_name, .. }
            | CompositionError::FieldTypeMismatch { type_name, .. }
            | CompositionError::InvalidKeyFieldPath { type_name, .. }
            | CompositionError::UnknownRequiresField { type_name, .. }
            | CompositionError::UnknownProvidesField { type_name, .. }
            | CompositionError::UnresolvableKey { type_name, .. } => vec![type_name.as_str()],
            _ => Vec::new(),
        }
    }
}
