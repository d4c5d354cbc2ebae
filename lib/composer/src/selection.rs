//! A minimal field-selection tree used by `@key`, `@requires` and `@provides`
//! field sets, and later by the planner when projecting entity representations.

use std::fmt::{Display, Formatter, Result as FmtResult};

use graphql_parser::query::{Definition, OperationDefinition, Selection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<FieldSelection>,
}

impl FieldSelection {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selections: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FieldSetParseError {
    #[error("invalid field set '{field_set}': {reason}")]
    Invalid { field_set: String, reason: String },
    #[error("field set '{field_set}' contains unsupported selections (only plain fields are allowed)")]
    UnsupportedSelection { field_set: String },
}

/// Parses a federation `fields:` argument, e.g. `"id"` or `"dimensions { size weight }"`,
/// into a selection tree.
pub fn parse_field_set(field_set: &str) -> Result<Vec<FieldSelection>, FieldSetParseError> {
    let wrapped = format!("{{ {} }}", field_set);
    let document =
        graphql_parser::parse_query::<String>(&wrapped).map_err(|err| FieldSetParseError::Invalid {
            field_set: field_set.to_string(),
            reason: err.to_string(),
        })?;

    let selection_set = document
        .definitions
        .iter()
        .find_map(|definition| match definition {
            Definition::Operation(OperationDefinition::SelectionSet(selection_set)) => {
                Some(selection_set)
            }
            Definition::Operation(OperationDefinition::Query(query)) => Some(&query.selection_set),
            _ => None,
        })
        .ok_or_else(|| FieldSetParseError::Invalid {
            field_set: field_set.to_string(),
            reason: "empty selection".to_string(),
        })?;

    convert_selections(&selection_set.items, field_set)
}

fn convert_selections(
    items: &[Selection<'_, String>],
    field_set: &str,
) -> Result<Vec<FieldSelection>, FieldSetParseError> {
    items
        .iter()
        .map(|selection| match selection {
            Selection::Field(field) => Ok(FieldSelection {
                name: field.name.clone(),
                selections: convert_selections(&field.selection_set.items, field_set)?,
            }),
            _ => Err(FieldSetParseError::UnsupportedSelection {
                field_set: field_set.to_string(),
            }),
        })
        .collect()
}

impl Display for FieldSelection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name)?;
        if !self.selections.is_empty() {
            write!(f, " {{ ")?;
            for (index, inner) in self.selections.iter().enumerate() {
                if index > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", inner)?;
            }
            write!(f, " }}")?;
        }
        Ok(())
    }
}

pub fn display_field_set(selections: &[FieldSelection]) -> String {
    selections
        .iter()
        .map(|selection| selection.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
