use std::fmt::Display;

use lattice_composer::selection::FieldSelection;
use serde::{Deserialize, Serialize};

use super::value::Value;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionSet {
    pub items: Vec<SelectionItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SelectionItem {
    Field(FieldNode),
    InlineFragment(InlineFragmentNode),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldNode {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Vec<(String, Value)>,
    pub selections: SelectionSet,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InlineFragmentNode {
    pub type_condition: String,
    pub selections: SelectionSet,
}

impl FieldNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        FieldNode {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
            selections: SelectionSet::default(),
        }
    }

    pub fn typename() -> Self {
        FieldNode::leaf("__typename")
    }

    /// The key under which this field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl SelectionSet {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends `item` and returns its index, for cursor-based navigation.
    pub fn push(&mut self, item: SelectionItem) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut FieldNode> {
        self.items.iter_mut().find_map(|item| match item {
            SelectionItem::Field(field) if field.alias.is_none() && field.name == name => {
                Some(field)
            }
            _ => None,
        })
    }

    /// Makes sure an unaliased, argument-free field named `selection.name`
    /// exists here, recursively covering the nested selections. Used to widen
    /// a fetch with entity key and required fields.
    pub fn ensure_field(&mut self, selection: &FieldSelection) {
        let field = match self.field_mut(&selection.name) {
            Some(existing) => existing,
            None => {
                let idx = self.push(SelectionItem::Field(FieldNode::leaf(&selection.name)));
                match &mut self.items[idx] {
                    SelectionItem::Field(field) => field,
                    _ => unreachable!("just pushed a field"),
                }
            }
        };

        for child in &selection.selections {
            field.selections.ensure_field(child);
        }
    }

    pub fn ensure_typename(&mut self) {
        if self.field_mut("__typename").is_none() {
            self.push(SelectionItem::Field(FieldNode::typename()));
        }
    }
}

impl Display for SelectionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.items.is_empty() {
            return Ok(());
        }

        write!(f, "{{")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", item)?;
        }
        write!(f, "}}")
    }
}

impl Display for SelectionItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionItem::Field(field) => write!(f, "{}", field),
            SelectionItem::InlineFragment(fragment) => write!(f, "{}", fragment),
        }
    }
}

impl Display for FieldNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{}: ", alias)?;
        }
        write!(f, "{}", self.name)?;

        if !self.arguments.is_empty() {
            write!(f, "(")?;
            for (i, (name, value)) in self.arguments.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", name, value)?;
            }
            write!(f, ")")?;
        }

        if !self.selections.is_empty() {
            write!(f, " {}", self.selections)?;
        }

        Ok(())
    }
}

impl Display for InlineFragmentNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "... on {} {}", self.type_condition, self.selections)
    }
}
