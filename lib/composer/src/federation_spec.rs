//! Extraction of federation directives (`@key`, `@requires`, `@provides`,
//! `@external`) from subgraph schema documents.

use graphql_parser::schema::{Directive, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDirective {
    pub fields: String,
}

impl KeyDirective {
    pub const NAME: &str = "key";
}

impl From<&Directive<'_, String>> for KeyDirective {
    fn from(directive: &Directive<'_, String>) -> Self {
        Self {
            fields: string_argument(directive, "fields").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiresDirective {
    pub fields: String,
}

impl RequiresDirective {
    pub const NAME: &str = "requires";
}

impl From<&Directive<'_, String>> for RequiresDirective {
    fn from(directive: &Directive<'_, String>) -> Self {
        Self {
            fields: string_argument(directive, "fields").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidesDirective {
    pub fields: String,
}

impl ProvidesDirective {
    pub const NAME: &str = "provides";
}

impl From<&Directive<'_, String>> for ProvidesDirective {
    fn from(directive: &Directive<'_, String>) -> Self {
        Self {
            fields: string_argument(directive, "fields").unwrap_or_default(),
        }
    }
}

pub struct ExternalDirective {}

impl ExternalDirective {
    pub const NAME: &str = "external";
}

pub fn extract_directives<'a, 'd, T>(directives: &'a [Directive<'d, String>], name: &str) -> Vec<T>
where
    T: From<&'a Directive<'d, String>>,
{
    directives
        .iter()
        .filter(|directive| directive.name == name)
        .map(T::from)
        .collect()
}

pub fn has_directive(directives: &[Directive<'_, String>], name: &str) -> bool {
    directives.iter().any(|directive| directive.name == name)
}

fn string_argument(directive: &Directive<'_, String>, arg: &str) -> Option<String> {
    directive
        .arguments
        .iter()
        .find(|(arg_name, _)| arg_name == arg)
        .and_then(|(_, arg_value)| match arg_value {
            Value::String(value) => Some(value.clone()),
            Value::Enum(value) => Some(value.clone()),
            _ => None,
        })
}
